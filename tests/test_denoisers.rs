mod common;

use approx::assert_relative_eq;
use common::{init_logging, step_scene, Lcg};
use ndarray::Array2;
use rabasar::{
    despeckle_with, AdmmConfig, Bm3d, Denoise, LogImage, Regularizer, SarResult, SolverHooks,
    Termination, TvBregman, TvBregmanParams,
};

/// Leaves its input untouched
struct Passthrough;

impl Denoise for Passthrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn denoise(&self, image: &LogImage, _strength: f64) -> SarResult<LogImage> {
        Ok(image.clone())
    }
}

#[test]
fn test_custom_denoiser_plugs_in() {
    init_logging();

    let mut rng = Lcg::new(31);
    let noisy = rng.speckle(&step_scene(8, 8), 4);
    let regularizer = Regularizer::new(Passthrough, 1.0).unwrap();

    let output = despeckle_with(&noisy, 4.0, &regularizer, &AdmmConfig::default(), SolverHooks::new())
        .unwrap();

    // with no smoothing the observation is already the fixed point
    assert_eq!(output.termination, Termination::Converged);
    for (a, b) in output.image.iter().zip(noisy.iter()) {
        assert_relative_eq!(*a, *b, max_relative = 1e-9);
    }
}

#[test]
fn test_denoisers_smooth_log_speckle() {
    let clean = step_scene(24, 24).mapv(f64::log10);
    let mut rng = Lcg::new(32);
    let noisy = rng.speckle(&step_scene(24, 24), 8).mapv(f64::log10);

    let mse = |a: &Array2<f64>| -> f64 {
        a.iter()
            .zip(clean.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            / a.len() as f64
    };

    let tv = TvBregman::with_params(TvBregmanParams {
        max_iterations: 50,
        ..TvBregmanParams::default()
    });
    let smoothed = tv.denoise(&noisy, 5.0).unwrap();
    assert!(mse(&smoothed) < mse(&noisy));

    let bm3d = Bm3d::new();
    let smoothed = bm3d.denoise(&noisy, 0.1).unwrap();
    assert!(mse(&smoothed) < mse(&noisy));
}
