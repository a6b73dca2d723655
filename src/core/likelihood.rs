//! Newton solvers for the Gamma data-fidelity sub-problem of the ADMM loop.
//!
//! Each pixel independently minimises
//!
//! ```text
//! beta/2 (x - a)² + NLL(obs | x)
//! ```
//!
//! where `a = z + u` is the denoiser target and `NLL` is the negative
//! log-likelihood of the observed (log-domain) pixel under the speckle model.

use crate::core::penalty::{initial_beta_ratio, initial_beta_single};
use crate::types::{validate_positive_scalar, LogImage, SarError, SarResult};
use ndarray::Zip;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Smallest denominator magnitude a Newton step may divide by.
pub const DENOMINATOR_FLOOR: f64 = 1e-12;

/// Per-pixel speckle likelihood model.
pub trait LikelihoodModel: Sync {
    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// Penalty parameter the ADMM loop starts from
    fn initial_beta(&self) -> SarResult<f64>;

    /// Gradient and Hessian of the pixel objective, returned as the Newton
    /// `(numerator, denominator)` pair.
    fn newton_terms(&self, x: f64, target: f64, obs: f64, beta: f64) -> (f64, f64);
}

/// Gamma speckle on a single image with `L` looks.
#[derive(Debug, Clone, Copy)]
pub struct SingleImageGamma {
    pub looks: f64,
}

impl SingleImageGamma {
    pub fn new(looks: f64) -> SarResult<Self> {
        validate_positive_scalar("ENL L", looks)?;
        Ok(Self { looks })
    }
}

impl LikelihoodModel for SingleImageGamma {
    fn name(&self) -> &'static str {
        "single-image"
    }

    fn initial_beta(&self) -> SarResult<f64> {
        initial_beta_single(self.looks)
    }

    #[inline]
    fn newton_terms(&self, x: f64, target: f64, obs: f64, beta: f64) -> (f64, f64) {
        let l = self.looks;
        let e = (obs - x).exp();
        let numerator = beta * (x - target) + l * (1.0 - e);
        let denominator = beta + l * e;
        (numerator, denominator)
    }
}

/// Ratio of two Gamma variables: numerator with `L` looks over a reference
/// with `Lm` looks (e.g. a temporal average).
#[derive(Debug, Clone, Copy)]
pub struct RatioGamma {
    pub looks: f64,
    pub reference_looks: f64,
}

impl RatioGamma {
    pub fn new(looks: f64, reference_looks: f64) -> SarResult<Self> {
        validate_positive_scalar("ENL L", looks)?;
        validate_positive_scalar("ENL Lm", reference_looks)?;
        Ok(Self {
            looks,
            reference_looks,
        })
    }
}

impl LikelihoodModel for RatioGamma {
    fn name(&self) -> &'static str {
        "ratio"
    }

    fn initial_beta(&self) -> SarResult<f64> {
        initial_beta_ratio(self.looks, self.reference_looks)
    }

    #[inline]
    fn newton_terms(&self, x: f64, target: f64, obs: f64, beta: f64) -> (f64, f64) {
        let l = self.looks;
        let lm = self.reference_looks;
        let e = (obs - x).exp();
        let c = (lm + l) * e / (lm + l * e);
        let numerator = beta * (x - target) + l * (1.0 - c);
        let denominator = beta + l * c * (1.0 - l / (lm + l) * c);
        (numerator, denominator)
    }
}

/// Floor the magnitude of a Newton denominator, keeping its sign.
///
/// NaN passes through untouched so the caller's finiteness check catches it.
#[inline]
pub fn stabilize_denominator(denominator: f64) -> (f64, bool) {
    if denominator.abs() < DENOMINATOR_FLOOR {
        (DENOMINATOR_FLOOR.copysign(denominator), true)
    } else {
        (denominator, false)
    }
}

/// Run `iterations` Newton steps from `x` toward `target` given the
/// log-domain observation `obs`.
///
/// `admm_iteration` is only used to label errors and log messages.
pub fn newton_solve<M: LikelihoodModel + ?Sized>(
    model: &M,
    x: &LogImage,
    target: &LogImage,
    obs: &LogImage,
    beta: f64,
    iterations: usize,
    admm_iteration: usize,
) -> SarResult<LogImage> {
    if x.dim() != target.dim() || x.dim() != obs.dim() {
        return Err(SarError::ShapeMismatch {
            expected: obs.dim(),
            found: if x.dim() != obs.dim() { x.dim() } else { target.dim() },
        });
    }

    let clamped = AtomicUsize::new(0);
    let step = |&xi: &f64, &ti: &f64, &oi: &f64| -> f64 {
        let (numerator, denominator) = model.newton_terms(xi, ti, oi, beta);
        let (denominator, was_clamped) = stabilize_denominator(denominator);
        if was_clamped {
            clamped.fetch_add(1, Ordering::Relaxed);
        }
        xi - numerator / denominator
    };

    let mut current = x.clone();
    for _ in 0..iterations {
        #[cfg(feature = "parallel")]
        let next = Zip::from(&current).and(target).and(obs).par_map_collect(step);
        #[cfg(not(feature = "parallel"))]
        let next = Zip::from(&current).and(target).and(obs).map_collect(step);
        current = next;
    }

    let clamped = clamped.into_inner();
    if clamped > 0 {
        log::warn!(
            "{} Newton step clamped {} near-zero denominators in ADMM iteration {}",
            model.name(),
            clamped,
            admm_iteration
        );
    }

    if let Some(((row, col), value)) = current.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(SarError::NumericInstability {
            iteration: admm_iteration,
            detail: format!(
                "{} Newton iterate became {} at ({}, {})",
                model.name(),
                value,
                row,
                col
            ),
        });
    }

    Ok(current)
}
