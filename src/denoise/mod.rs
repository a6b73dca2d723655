//! Plug-and-play denoisers used as the proximal step of the ADMM loop.
//!
//! A regularizer is picked once from configuration (`"tv"` or `"bm3d"` plus a
//! [`RegularizerParams`] block) and handed to the solver as a [`Regularizer`].
//! Any other type implementing [`Denoise`] can be plugged in the same way.

pub mod bm3d;
pub mod tv_bregman;

pub use bm3d::{Bm3d, Bm3dParams};
pub use tv_bregman::{TvBregman, TvBregmanParams};

use crate::types::{validate_positive_scalar, LogImage, SarError, SarResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A proximal denoising operator.
///
/// Implementations must return an array of the same shape and be
/// deterministic for identical inputs.
pub trait Denoise {
    /// Short identifier for log messages
    fn name(&self) -> &str;

    /// Denoise `image` at the given strength
    fn denoise(&self, image: &LogImage, strength: f64) -> SarResult<LogImage>;
}

impl<D: Denoise + ?Sized> Denoise for &D {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn denoise(&self, image: &LogImage, strength: f64) -> SarResult<LogImage> {
        (**self).denoise(image, strength)
    }
}

/// Supported regularizer families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegularizerKind {
    /// Total variation, split-Bregman solver
    TotalVariation,
    /// Block-matching 3D collaborative filtering
    Bm3d,
}

impl RegularizerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegularizerKind::TotalVariation => "tv",
            RegularizerKind::Bm3d => "bm3d",
        }
    }
}

impl fmt::Display for RegularizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RegularizerKind {
    type Err = SarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tv" => Ok(RegularizerKind::TotalVariation),
            "bm3d" => Ok(RegularizerKind::Bm3d),
            _ => Err(SarError::UnsupportedRegularizer(s.to_string())),
        }
    }
}

/// Regularizer options as supplied by the caller.
///
/// `weight` is required for every regularizer; `isotropic` only affects TV
/// and defaults to `true`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegularizerParams {
    pub weight: Option<f64>,
    pub isotropic: Option<bool>,
}

impl RegularizerParams {
    pub fn with_weight(weight: f64) -> Self {
        Self {
            weight: Some(weight),
            isotropic: None,
        }
    }

    pub fn isotropic(mut self, isotropic: bool) -> Self {
        self.isotropic = Some(isotropic);
        self
    }
}

/// Concrete denoiser selected from configuration
#[derive(Debug, Clone)]
pub enum Denoiser {
    TotalVariation(TvBregman),
    Bm3d(Bm3d),
}

impl Denoise for Denoiser {
    fn name(&self) -> &str {
        match self {
            Denoiser::TotalVariation(tv) => tv.name(),
            Denoiser::Bm3d(bm3d) => bm3d.name(),
        }
    }

    fn denoise(&self, image: &LogImage, strength: f64) -> SarResult<LogImage> {
        match self {
            Denoiser::TotalVariation(tv) => tv.denoise(image, strength),
            Denoiser::Bm3d(bm3d) => bm3d.denoise(image, strength),
        }
    }
}

/// A denoiser paired with its base strength.
///
/// The ADMM loop calls the denoiser at `weight` for initialisation and at
/// `weight * beta` afterwards.
#[derive(Debug, Clone)]
pub struct Regularizer<D> {
    pub denoiser: D,
    pub weight: f64,
}

impl<D: Denoise> Regularizer<D> {
    pub fn new(denoiser: D, weight: f64) -> SarResult<Self> {
        validate_positive_scalar("regularizer weight", weight)?;
        Ok(Self { denoiser, weight })
    }
}

impl Regularizer<Denoiser> {
    /// Build the regularizer named by `regularizer` from its parameter block.
    ///
    /// Fails with `UnsupportedRegularizer` for unknown names and
    /// `MissingParameter` when `weight` is absent.
    pub fn from_config(
        regularizer: &str,
        params: &RegularizerParams,
        denoiser_iterations: usize,
    ) -> SarResult<Self> {
        let kind: RegularizerKind = regularizer.parse()?;
        Self::from_kind(kind, params, denoiser_iterations)
    }

    pub fn from_kind(
        kind: RegularizerKind,
        params: &RegularizerParams,
        denoiser_iterations: usize,
    ) -> SarResult<Self> {
        let weight = params
            .weight
            .ok_or_else(|| SarError::MissingParameter("weight".to_string()))?;

        let denoiser = match kind {
            RegularizerKind::TotalVariation => Denoiser::TotalVariation(TvBregman::with_params(
                TvBregmanParams {
                    max_iterations: denoiser_iterations,
                    isotropic: params.isotropic.unwrap_or(true),
                    ..TvBregmanParams::default()
                },
            )),
            RegularizerKind::Bm3d => {
                if params.isotropic.is_some() {
                    log::debug!("'isotropic' only applies to tv and is ignored for bm3d");
                }
                Denoiser::Bm3d(Bm3d::new())
            }
        };

        log::debug!("Configured {} regularizer with weight {}", kind, weight);
        Regularizer::new(denoiser, weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_regularizer_kind() {
        assert_eq!("tv".parse::<RegularizerKind>().unwrap(), RegularizerKind::TotalVariation);
        assert_eq!(" BM3D ".parse::<RegularizerKind>().unwrap(), RegularizerKind::Bm3d);
        match "foo".parse::<RegularizerKind>() {
            Err(SarError::UnsupportedRegularizer(name)) => assert_eq!(name, "foo"),
            other => panic!("expected UnsupportedRegularizer, got {:?}", other),
        }
    }

    #[test]
    fn test_from_config_requires_weight() {
        let params = RegularizerParams::default();
        assert!(matches!(
            Regularizer::from_config("tv", &params, 10),
            Err(SarError::MissingParameter(_))
        ));
    }

    #[test]
    fn test_unknown_name_wins_over_missing_weight() {
        let params = RegularizerParams::default();
        assert!(matches!(
            Regularizer::from_config("median", &params, 10),
            Err(SarError::UnsupportedRegularizer(_))
        ));
    }

    #[test]
    fn test_from_config_tv_options() {
        let params = RegularizerParams::with_weight(0.3).isotropic(false);
        let regularizer = Regularizer::from_config("tv", &params, 25).unwrap();
        assert_eq!(regularizer.weight, 0.3);
        match regularizer.denoiser {
            Denoiser::TotalVariation(tv) => {
                assert_eq!(tv.params().max_iterations, 25);
                assert!(!tv.params().isotropic);
            }
            other => panic!("expected TV denoiser, got {:?}", other),
        }
    }

    #[test]
    fn test_from_config_rejects_non_positive_weight() {
        let params = RegularizerParams::with_weight(0.0);
        assert!(matches!(
            Regularizer::from_config("bm3d", &params, 10),
            Err(SarError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_default_isotropic_is_true() {
        let params = RegularizerParams::with_weight(1.0);
        match Regularizer::from_config("tv", &params, 10).unwrap().denoiser {
            Denoiser::TotalVariation(tv) => assert!(tv.params().isotropic),
            other => panic!("expected TV denoiser, got {:?}", other),
        }
    }
}
