//! Shared helpers for integration tests
#![allow(dead_code)]

use ndarray::Array2;

/// Initialize logging once per test binary
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic 64-bit LCG so synthetic speckle is reproducible
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Uniform sample in (0, 1)
    pub fn uniform(&mut self) -> f64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.state >> 11) as f64 + 0.5) / (1u64 << 53) as f64
    }

    /// Unit-mean gamma sample with integer shape `looks`
    pub fn gamma(&mut self, looks: usize) -> f64 {
        let sum: f64 = (0..looks).map(|_| -self.uniform().ln()).sum();
        sum / looks as f64
    }

    /// Multiply `clean` by independent L-look speckle, row by row
    pub fn speckle(&mut self, clean: &Array2<f64>, looks: usize) -> Array2<f64> {
        let (rows, cols) = clean.dim();
        let mut noisy = Array2::zeros((rows, cols));
        for i in 0..rows {
            for j in 0..cols {
                noisy[[i, j]] = clean[[i, j]] * self.gamma(looks);
            }
        }
        noisy
    }
}

/// Two-level scene: 1.0 on the left half, 4.0 on the right
pub fn step_scene(rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(_, j)| if j < cols / 2 { 1.0 } else { 4.0 })
}

/// Mean squared error in dB/10 (log10) units
pub fn log_mse(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x.log10() - y.log10()).powi(2))
        .sum();
    sum / a.len() as f64
}
