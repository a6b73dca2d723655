//! Plug-and-play ADMM loop shared by the single-image and ratio despecklers.
//!
//! Works in the log domain, where speckle becomes additive. Each outer
//! iteration denoises `x - u`, updates the scaled dual `u`, takes a few Newton
//! steps on the speckle likelihood and adapts the coupling penalty beta.
//! See Deledalle et al., "MuLoG, or How to apply Gaussian denoisers to
//! multi-channel SAR speckle reduction?" (2017) and Chan et al.,
//! "Plug-and-Play ADMM for Image Restoration" (2016).

use crate::core::likelihood::{newton_solve, LikelihoodModel};
use crate::core::penalty::{AdaptivePenalty, PenaltyConfig};
use crate::denoise::{Denoise, Regularizer};
use crate::types::{validate_positive, LogImage, SarError, SarRealImage, SarResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Logarithm used for the log-domain transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogBase {
    /// `log10` in, powers of ten out
    #[default]
    Ten,
    /// `ln` in, `exp` out
    Natural,
}

impl LogBase {
    #[inline]
    pub fn to_log(&self, value: f64) -> f64 {
        match self {
            LogBase::Ten => value.log10(),
            LogBase::Natural => value.ln(),
        }
    }

    #[inline]
    pub fn from_log(&self, value: f64) -> f64 {
        match self {
            LogBase::Ten => 10f64.powf(value),
            LogBase::Natural => value.exp(),
        }
    }
}

/// ADMM solver configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdmmConfig {
    /// Upper bound on outer iterations
    pub max_admm_iterations: usize,
    /// Newton steps per outer iteration
    pub newton_iterations: usize,
    /// Internal iteration budget handed to iterative denoisers (TV)
    pub denoiser_iterations: usize,
    /// Stop once the combined residual drops below this
    pub convergence_crit: f64,
    /// Adaptive penalty constants
    pub penalty: PenaltyConfig,
    /// Log transform applied to the input and inverted on output
    pub log_base: LogBase,
}

impl Default for AdmmConfig {
    fn default() -> Self {
        Self {
            max_admm_iterations: 10,
            newton_iterations: 3,
            denoiser_iterations: 10,
            convergence_crit: 1e-5,
            penalty: PenaltyConfig::default(),
            log_base: LogBase::default(),
        }
    }
}

impl AdmmConfig {
    pub fn validate(&self) -> SarResult<()> {
        if self.convergence_crit.is_nan() || self.convergence_crit < 0.0 {
            return Err(SarError::InvalidParameter(format!(
                "convergence_crit must be non-negative, got {}",
                self.convergence_crit
            )));
        }
        self.penalty.validate()
    }
}

/// How the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Residual fell below `convergence_crit`
    Converged,
    /// Iteration budget used up
    Exhausted,
    /// Cancellation flag was raised
    Cancelled,
}

/// Per-iteration diagnostics passed to the progress callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationReport {
    /// 1-based outer iteration
    pub iteration: usize,
    pub max_iterations: usize,
    /// Combined residual of this iteration
    pub residual: f64,
    /// Beta used during this iteration
    pub beta: f64,
    /// Whether the controller raised beta for the next iteration
    pub beta_increased: bool,
}

/// Restored image plus convergence diagnostics
#[derive(Debug, Clone)]
pub struct DespeckleOutput {
    /// Restored image, linear scale
    pub image: SarRealImage,
    /// Combined residual norm per completed outer iteration
    pub residuals: Vec<f64>,
    /// Beta used in each completed outer iteration
    pub betas: Vec<f64>,
    /// Completed outer iterations
    pub iterations: usize,
    pub termination: Termination,
}

/// Optional progress reporting and cooperative cancellation
#[derive(Default)]
pub struct SolverHooks<'a> {
    progress: Option<Box<dyn FnMut(&IterationReport) + 'a>>,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> SolverHooks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` once after every outer iteration
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&IterationReport) + 'a,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Stop before the next outer iteration once `flag` is set
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.map_or(false, |flag| flag.load(Ordering::Relaxed))
    }

    fn report(&mut self, report: &IterationReport) {
        if let Some(progress) = self.progress.as_mut() {
            progress(report);
        }
    }
}

/// Run the plug-and-play ADMM loop.
///
/// `image` is the linear-scale observation (intensity or ratio) and must be
/// strictly positive everywhere; fill gaps first. `x_init` is an optional warm
/// start in the log domain.
pub fn run_admm<M, D>(
    image: &SarRealImage,
    model: &M,
    regularizer: &Regularizer<D>,
    config: &AdmmConfig,
    x_init: Option<&LogImage>,
    mut hooks: SolverHooks<'_>,
) -> SarResult<DespeckleOutput>
where
    M: LikelihoodModel + ?Sized,
    D: Denoise,
{
    config.validate()?;
    validate_positive(image)?;

    let shape = image.dim();
    if let Some(x0) = x_init {
        if x0.dim() != shape {
            return Err(SarError::ShapeMismatch {
                expected: shape,
                found: x0.dim(),
            });
        }
        if let Some(((row, col), &value)) = x0.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(SarError::InvalidParameter(format!(
                "warm start is not finite at ({}, {}): {}",
                row, col, value
            )));
        }
    }

    let mut penalty = AdaptivePenalty::new(model.initial_beta()?, config.penalty)?;
    let log_base = config.log_base;

    log::info!(
        "Despeckling {}x{} image: {} model, {} denoiser (weight {}), initial beta {:.4}",
        shape.0,
        shape.1,
        model.name(),
        regularizer.denoiser.name(),
        regularizer.weight,
        penalty.beta()
    );

    let obs = image.mapv(|v| log_base.to_log(v));
    let mut x = match x_init {
        Some(x0) => x0.clone(),
        None => obs.clone(),
    };

    let capacity = config.max_admm_iterations.min(1024);
    let mut residuals = Vec::with_capacity(capacity);
    let mut betas = Vec::with_capacity(capacity);
    let mut termination = Termination::Exhausted;

    if config.max_admm_iterations > 0 {
        let mut z = denoise_checked(regularizer, &x, regularizer.weight)?;
        let mut u = &z - &x;

        for k in 0..config.max_admm_iterations {
            if hooks.cancelled() {
                log::warn!("Despeckling cancelled after {} iterations", k);
                termination = Termination::Cancelled;
                break;
            }

            let beta = penalty.beta();

            let z_next = denoise_checked(regularizer, &(&x - &u), regularizer.weight * beta)?;
            let u_next = &u + &z_next - &x;
            let target = &z_next + &u_next;
            let x_next = newton_solve(model, &x, &target, &obs, beta, config.newton_iterations, k + 1)?;

            // Sum of primal, dual and auxiliary changes. PnP-ADMM has no canonical stopping rule.
            let residual = distance(&x, &x_next) + distance(&u, &u_next) + distance(&z, &z_next);
            let beta_increased = penalty.update(residual);

            x = x_next;
            u = u_next;
            z = z_next;
            residuals.push(residual);
            betas.push(beta);

            log::debug!(
                "ADMM iteration {}/{}: residual {:.6e}, beta {:.4}{}",
                k + 1,
                config.max_admm_iterations,
                residual,
                beta,
                if beta_increased { " (raised)" } else { "" }
            );

            hooks.report(&IterationReport {
                iteration: k + 1,
                max_iterations: config.max_admm_iterations,
                residual,
                beta,
                beta_increased,
            });

            if residual < config.convergence_crit {
                termination = Termination::Converged;
                break;
            }
        }
    }

    log::info!(
        "Despeckling finished: {:?} after {} iterations (final residual {:?})",
        termination,
        residuals.len(),
        residuals.last()
    );

    Ok(DespeckleOutput {
        image: x.mapv(|v| log_base.from_log(v)),
        iterations: residuals.len(),
        residuals,
        betas,
        termination,
    })
}

fn denoise_checked<D: Denoise>(
    regularizer: &Regularizer<D>,
    image: &LogImage,
    strength: f64,
) -> SarResult<LogImage> {
    let denoised = regularizer.denoiser.denoise(image, strength)?;
    if denoised.dim() != image.dim() {
        return Err(SarError::ShapeMismatch {
            expected: image.dim(),
            found: denoised.dim(),
        });
    }
    Ok(denoised)
}

/// Frobenius norm of `a - b`
fn distance(a: &LogImage, b: &LogImage) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(p, q)| (p - q) * (p - q))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::likelihood::SingleImageGamma;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use std::cell::Cell;

    /// Denoiser that returns its input and counts calls
    struct Identity<'a> {
        calls: &'a Cell<usize>,
    }

    impl Denoise for Identity<'_> {
        fn name(&self) -> &str {
            "identity"
        }

        fn denoise(&self, image: &LogImage, _strength: f64) -> SarResult<LogImage> {
            self.calls.set(self.calls.get() + 1);
            Ok(image.clone())
        }
    }

    /// Denoiser that pulls every pixel toward the image mean
    struct MeanShrink;

    impl Denoise for MeanShrink {
        fn name(&self) -> &str {
            "mean-shrink"
        }

        fn denoise(&self, image: &LogImage, _strength: f64) -> SarResult<LogImage> {
            let mean = image.mean().unwrap_or(0.0);
            Ok(image.mapv(|v| 0.5 * (v + mean)))
        }
    }

    struct Cropping;

    impl Denoise for Cropping {
        fn name(&self) -> &str {
            "cropping"
        }

        fn denoise(&self, image: &LogImage, _strength: f64) -> SarResult<LogImage> {
            Ok(Array2::zeros((1, 1)).mapv(|v: f64| v + image[[0, 0]]))
        }
    }

    fn textured_image() -> SarRealImage {
        Array2::from_shape_fn((6, 6), |(i, j)| 0.5 + 0.1 * ((i * 5 + j * 3) % 7) as f64)
    }

    #[test]
    fn test_log_base_round_trip() {
        for base in [LogBase::Ten, LogBase::Natural] {
            assert_relative_eq!(base.from_log(base.to_log(0.37)), 0.37, epsilon = 1e-14);
        }
        assert_relative_eq!(LogBase::Ten.to_log(100.0), 2.0);
    }

    #[test]
    fn test_zero_iterations_returns_input() {
        let calls = Cell::new(0);
        let regularizer = Regularizer::new(Identity { calls: &calls }, 1.0).unwrap();
        let model = SingleImageGamma::new(4.0).unwrap();
        let config = AdmmConfig {
            max_admm_iterations: 0,
            ..AdmmConfig::default()
        };
        let image = textured_image();

        let output = run_admm(&image, &model, &regularizer, &config, None, SolverHooks::new()).unwrap();
        for (a, b) in output.image.iter().zip(image.iter()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-12);
        }
        assert!(output.residuals.is_empty());
        assert_eq!(output.termination, Termination::Exhausted);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_identity_denoiser_converges_immediately() {
        // With an identity prior the observation is already a fixed point.
        let calls = Cell::new(0);
        let regularizer = Regularizer::new(Identity { calls: &calls }, 1.0).unwrap();
        let model = SingleImageGamma::new(4.0).unwrap();
        let image = textured_image();

        let output = run_admm(
            &image,
            &model,
            &regularizer,
            &AdmmConfig::default(),
            None,
            SolverHooks::new(),
        )
        .unwrap();

        assert_eq!(output.termination, Termination::Converged);
        assert_eq!(output.residuals.len(), 1);
        assert_eq!(output.residuals[0], 0.0);
        // one initialisation call plus one per iteration
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_trace_bounds_and_monotone_beta() {
        let regularizer = Regularizer::new(MeanShrink, 0.1).unwrap();
        let model = SingleImageGamma::new(2.0).unwrap();
        let config = AdmmConfig {
            max_admm_iterations: 8,
            convergence_crit: 0.0,
            ..AdmmConfig::default()
        };

        let output = run_admm(
            &textured_image(),
            &model,
            &regularizer,
            &config,
            None,
            SolverHooks::new(),
        )
        .unwrap();

        assert_eq!(output.residuals.len(), 8);
        assert_eq!(output.betas.len(), 8);
        assert_eq!(output.termination, Termination::Exhausted);
        assert!(output.residuals.iter().all(|&r| r >= 0.0 && r.is_finite()));
        assert!(output.betas.windows(2).all(|w| w[1] >= w[0]));
        assert!(output.image.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_huge_convergence_crit_stops_after_one_iteration() {
        let regularizer = Regularizer::new(MeanShrink, 0.1).unwrap();
        let model = SingleImageGamma::new(2.0).unwrap();
        let config = AdmmConfig {
            convergence_crit: f64::MAX,
            ..AdmmConfig::default()
        };

        let output = run_admm(
            &textured_image(),
            &model,
            &regularizer,
            &config,
            None,
            SolverHooks::new(),
        )
        .unwrap();
        assert_eq!(output.residuals.len(), 1);
        assert_eq!(output.termination, Termination::Converged);
    }

    #[test]
    fn test_progress_callback_sees_every_iteration() {
        let regularizer = Regularizer::new(MeanShrink, 0.1).unwrap();
        let model = SingleImageGamma::new(2.0).unwrap();
        let config = AdmmConfig {
            max_admm_iterations: 4,
            convergence_crit: 0.0,
            ..AdmmConfig::default()
        };

        let mut seen = Vec::new();
        let hooks = SolverHooks::new().with_progress(|report: &IterationReport| {
            seen.push((report.iteration, report.residual))
        });
        let output = run_admm(&textured_image(), &model, &regularizer, &config, None, hooks).unwrap();

        assert_eq!(seen.len(), 4);
        assert_eq!(seen.iter().map(|s| s.0).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(seen.iter().map(|s| s.1).collect::<Vec<_>>(), output.residuals);
    }

    #[test]
    fn test_cancel_flag_stops_before_first_iteration() {
        let regularizer = Regularizer::new(MeanShrink, 0.1).unwrap();
        let model = SingleImageGamma::new(2.0).unwrap();
        let flag = AtomicBool::new(true);
        let image = textured_image();

        let output = run_admm(
            &image,
            &model,
            &regularizer,
            &AdmmConfig::default(),
            None,
            SolverHooks::new().with_cancel_flag(&flag),
        )
        .unwrap();
        assert_eq!(output.termination, Termination::Cancelled);
        assert!(output.residuals.is_empty());
        for (a, b) in output.image.iter().zip(image.iter()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_rejects_non_positive_pixels_before_denoising() {
        let calls = Cell::new(0);
        let regularizer = Regularizer::new(Identity { calls: &calls }, 1.0).unwrap();
        let model = SingleImageGamma::new(4.0).unwrap();
        let mut image = textured_image();
        image[[2, 3]] = -1.0;

        let err = run_admm(
            &image,
            &model,
            &regularizer,
            &AdmmConfig::default(),
            None,
            SolverHooks::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SarError::InvalidDomain { row: 2, col: 3, .. }));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_warm_start_shape_is_checked() {
        let regularizer = Regularizer::new(MeanShrink, 0.1).unwrap();
        let model = SingleImageGamma::new(2.0).unwrap();
        let warm = Array2::zeros((2, 2));
        let err = run_admm(
            &textured_image(),
            &model,
            &regularizer,
            &AdmmConfig::default(),
            Some(&warm),
            SolverHooks::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SarError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_denoiser_shape_change_is_an_error() {
        let regularizer = Regularizer::new(Cropping, 0.1).unwrap();
        let model = SingleImageGamma::new(2.0).unwrap();
        let err = run_admm(
            &textured_image(),
            &model,
            &regularizer,
            &AdmmConfig::default(),
            None,
            SolverHooks::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SarError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_config_validation() {
        let config = AdmmConfig {
            convergence_crit: f64::NAN,
            ..AdmmConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(AdmmConfig::default().validate().is_ok());
    }
}
