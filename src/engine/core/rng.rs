// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Jerry Snitselaar and contributors

// ABOUTME: Deterministic RNG wrapper replacing the source's GSL Mersenne-Twister state
// ABOUTME: Draws used throughout Birth, SeedBank dispersal, and Treefall angle sampling

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Single process-wide random stream. Two `SimRng`s built from the same seed and
/// driven through the same call sequence produce bit-identical draws, which is what
/// the determinism law in spec section 8 requires.
#[derive(Clone)]
pub struct SimRng {
    inner: ChaCha8Rng,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Uniform draw in `[0, 1)`.
    pub fn uniform01(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }

    /// Uniform integer draw in `[0, bound)`.
    pub fn uniform_index(&mut self, bound: u32) -> u32 {
        self.inner.gen_range(0..bound)
    }

    /// Uniform angle draw in `[0, 2*pi)`.
    pub fn uniform_angle(&mut self) -> f64 {
        self.uniform01() * std::f64::consts::TAU as f64
    }

    /// Rayleigh-distributed radius with scale `sigma`, via inverse CDF sampling:
    /// `r = sigma * sqrt(-2 * ln(1 - U))`. Matches the source's dispersal-distance draw.
    pub fn rayleigh(&mut self, sigma: f64) -> f64 {
        let u = self.uniform01();
        sigma * (-2.0 * (1.0 - u).ln()).sqrt()
    }

    /// `-ln(U)` draw used by Ct's treefall-onset formula (`sqrt(-ln U)` per spec 4.4).
    pub fn neg_log_uniform(&mut self) -> f64 {
        -self.uniform01().max(1e-12).ln()
    }

    /// Multinomial(n, p) via sequential conditional binomials, per the design notes'
    /// replacement for GSL's `gsl_ran_multinomial`: draw each category's count from
    /// `Binomial(remaining_n, p_i / remaining_p)`, then shrink the remaining pool.
    pub fn multinomial(&mut self, n: u64, probabilities: &[f64]) -> Vec<u64> {
        let mut counts = vec![0u64; probabilities.len()];
        let mut remaining_n = n;
        let mut remaining_p: f64 = probabilities.iter().sum();
        for (i, &p) in probabilities.iter().enumerate() {
            if remaining_n == 0 || remaining_p <= 0.0 {
                break;
            }
            let conditional_p = (p / remaining_p).clamp(0.0, 1.0);
            let draw = self.binomial(remaining_n, conditional_p);
            counts[i] = draw;
            remaining_n -= draw;
            remaining_p -= p;
        }
        counts
    }

    /// Binomial(n, p) by direct Bernoulli summation. `n` here is always a per-site
    /// seed count, small enough that this is not a performance concern.
    pub fn binomial(&mut self, n: u64, p: f64) -> u64 {
        if p <= 0.0 {
            return 0;
        }
        if p >= 1.0 {
            return n;
        }
        (0..n).filter(|_| self.uniform01() < p).count() as u64
    }

    /// Multivariate lognormal draw for (N, P, LMA) intraspecific variation, using a
    /// Cholesky factorization of the supplied 3x3 covariance matrix. Falls back to
    /// independent lognormal draws per-dimension when the matrix is near-singular
    /// (spec 4.4's "fall back to independent draws if matrix is singular").
    pub fn multivariate_lognormal_3(&mut self, mean_log: [f64; 3], covariance: [[f64; 3]; 3]) -> [f64; 3] {
        match cholesky_3x3(&covariance) {
            Some(l) => {
                let z = [self.standard_normal(), self.standard_normal(), self.standard_normal()];
                let mut out = [0.0; 3];
                for i in 0..3 {
                    let mut s = 0.0;
                    for j in 0..=i {
                        s += l[i][j] * z[j];
                    }
                    out[i] = (mean_log[i] + s).exp();
                }
                out
            }
            None => {
                let mut out = [0.0; 3];
                for i in 0..3 {
                    let sigma = covariance[i][i].max(0.0).sqrt();
                    out[i] = (mean_log[i] + sigma * self.standard_normal()).exp();
                }
                out
            }
        }
    }

    /// Standard normal draw via Box-Muller.
    pub fn standard_normal(&mut self) -> f64 {
        let u1 = self.uniform01().max(1e-12);
        let u2 = self.uniform01();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU as f64 * u2).cos()
    }

    /// Lognormal intraspecific multiplier with mean ~1 (log-mean chosen so the
    /// untransformed mean is 1), as used for height/CR/CD/dbhmax multipliers.
    pub fn lognormal_mult(&mut self, sigma: f64) -> f64 {
        let mu = -0.5 * sigma * sigma;
        (mu + sigma * self.standard_normal()).exp()
    }

    /// Normal deviate offset from zero, clamped below at `floor`, used for the wsg
    /// intraspecific deviation (spec section 3: "normal, >= 0.05 after offset").
    pub fn normal_offset(&mut self, mean: f64, sigma: f64, floor: f64) -> f64 {
        (mean + sigma * self.standard_normal()).max(floor)
    }
}

/// Cholesky decomposition of a symmetric positive-definite 3x3 matrix. Returns
/// `None` if a diagonal pivot is non-positive (near-singular or not PD).
fn cholesky_3x3(m: &[[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let mut l = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..=i {
            let mut s = 0.0;
            for k in 0..j {
                s += l[i][k] * l[j][k];
            }
            if i == j {
                let val = m[i][i] - s;
                if val <= 1e-12 {
                    return None;
                }
                l[i][j] = val.sqrt();
            } else {
                l[i][j] = (m[i][j] - s) / l[j][j];
            }
        }
    }
    Some(l)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinism_same_seed_same_draws() {
        let mut a = SimRng::new(42);
        let mut b = SimRng::new(42);
        for _ in 0..50 {
            assert_eq!(a.uniform01(), b.uniform01());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = SimRng::new(1);
        let mut b = SimRng::new(2);
        let draws_a: Vec<f64> = (0..10).map(|_| a.uniform01()).collect();
        let draws_b: Vec<f64> = (0..10).map(|_| b.uniform01()).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn multinomial_conserves_total() {
        let mut rng = SimRng::new(7);
        let probs = [0.2, 0.3, 0.5];
        for _ in 0..20 {
            let counts = rng.multinomial(100, &probs);
            assert_eq!(counts.iter().sum::<u64>(), 100);
        }
    }

    #[test]
    fn rayleigh_nonnegative() {
        let mut rng = SimRng::new(3);
        for _ in 0..200 {
            assert!(rng.rayleigh(10.0) >= 0.0);
        }
    }

    #[test]
    fn cholesky_recovers_known_matrix() {
        let m = [[4.0, 2.0, 0.0], [2.0, 5.0, 1.0], [0.0, 1.0, 3.0]];
        let l = cholesky_3x3(&m).expect("matrix is positive-definite");
        // Reconstruct L * L^T and compare to the original.
        let mut recon = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                let mut s = 0.0;
                for k in 0..3 {
                    s += l[i][k] * l[j][k];
                }
                recon[i][j] = s;
            }
        }
        for i in 0..3 {
            for j in 0..3 {
                assert!((recon[i][j] - m[i][j]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn cholesky_rejects_singular() {
        let m = [[1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0]];
        assert!(cholesky_3x3(&m).is_none());
    }

    #[test]
    fn lognormal_mult_is_positive() {
        let mut rng = SimRng::new(11);
        for _ in 0..100 {
            assert!(rng.lognormal_mult(0.2) > 0.0);
        }
    }
}
