use crate::core::special::trigamma;
use crate::types::{validate_positive_scalar, SarError, SarResult};
use serde::{Deserialize, Serialize};

/// Tuning constants for the adaptive penalty ratchet.
///
/// Defaults follow the plug-and-play ADMM schedule of Chan et al., as used by MuLoG.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyConfig {
    /// Residual contraction expected per iteration
    pub eta: f64,
    /// Multiplicative increase applied to beta when the residual stalls
    pub gamma: f64,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            eta: 0.95,
            gamma: 1.05,
        }
    }
}

impl PenaltyConfig {
    pub fn validate(&self) -> SarResult<()> {
        validate_positive_scalar("penalty eta", self.eta)?;
        if !(self.gamma.is_finite() && self.gamma >= 1.0) {
            return Err(SarError::InvalidParameter(format!(
                "penalty gamma must be finite and >= 1 so beta never decreases, got {}",
                self.gamma
            )));
        }
        Ok(())
    }
}

/// Initial penalty for the single-image Gamma model: `(1 + 2/L) / ψ1(L)`.
pub fn initial_beta_single(looks: f64) -> SarResult<f64> {
    validate_positive_scalar("ENL L", looks)?;
    Ok((1.0 + 2.0 / looks) / trigamma(looks)?)
}

/// Initial penalty for the ratio model: `(1 + 2/L + 2/Lm) / ψ1(L)`.
pub fn initial_beta_ratio(looks: f64, reference_looks: f64) -> SarResult<f64> {
    validate_positive_scalar("ENL L", looks)?;
    validate_positive_scalar("ENL Lm", reference_looks)?;
    Ok((1.0 + 2.0 / looks + 2.0 / reference_looks) / trigamma(looks)?)
}

/// Adaptive penalty controller.
///
/// One-sided ratchet: beta is multiplied by `gamma` whenever the combined
/// residual fails to shrink below `eta` times the previous one, and is never
/// decreased.
#[derive(Debug, Clone)]
pub struct AdaptivePenalty {
    config: PenaltyConfig,
    beta: f64,
    previous_residual: f64,
}

impl AdaptivePenalty {
    pub fn new(initial_beta: f64, config: PenaltyConfig) -> SarResult<Self> {
        validate_positive_scalar("initial beta", initial_beta)?;
        config.validate()?;
        Ok(Self {
            config,
            beta: initial_beta,
            previous_residual: f64::INFINITY,
        })
    }

    /// Current coupling strength
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Feed the residual of the iteration that just finished.
    ///
    /// Returns `true` if beta was increased.
    pub fn update(&mut self, residual: f64) -> bool {
        let increased = residual > self.config.eta * self.previous_residual;
        if increased {
            self.beta *= self.config.gamma;
        }
        self.previous_residual = residual;
        increased
    }
}
