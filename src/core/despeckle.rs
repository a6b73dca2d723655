//! Despeckling entry points.
//!
//! `despeckle` restores a single intensity image with `L` looks.
//! `despeckle_ratio` restores `I / I_ref` where the reference (typically a
//! temporal average of the stack) has `Lm` looks.
//!
//! Both validate the regularizer before touching the image, so an unknown
//! name or a missing `weight` fails without running any denoiser.

use crate::core::admm::{run_admm, AdmmConfig, DespeckleOutput, SolverHooks};
use crate::core::likelihood::{RatioGamma, SingleImageGamma};
use crate::denoise::{Denoise, Regularizer, RegularizerParams};
use crate::types::{LogImage, SarRealImage, SarResult};

/// Despeckle one image with the regularizer named by `regularizer` (`"tv"` or `"bm3d"`).
pub fn despeckle(
    image: &SarRealImage,
    looks: f64,
    regularizer: &str,
    params: &RegularizerParams,
    config: &AdmmConfig,
) -> SarResult<DespeckleOutput> {
    let regularizer = Regularizer::from_config(regularizer, params, config.denoiser_iterations)?;
    despeckle_with(image, looks, &regularizer, config, SolverHooks::new())
}

/// Despeckle one image with an already constructed regularizer.
pub fn despeckle_with<D: Denoise>(
    image: &SarRealImage,
    looks: f64,
    regularizer: &Regularizer<D>,
    config: &AdmmConfig,
    hooks: SolverHooks<'_>,
) -> SarResult<DespeckleOutput> {
    let model = SingleImageGamma::new(looks)?;
    run_admm(image, &model, regularizer, config, None, hooks)
}

/// Despeckle a ratio image. `x_init` is an optional warm start in the log domain.
pub fn despeckle_ratio(
    ratio: &SarRealImage,
    looks: f64,
    reference_looks: f64,
    regularizer: &str,
    params: &RegularizerParams,
    config: &AdmmConfig,
    x_init: Option<&LogImage>,
) -> SarResult<DespeckleOutput> {
    let regularizer = Regularizer::from_config(regularizer, params, config.denoiser_iterations)?;
    despeckle_ratio_with(
        ratio,
        looks,
        reference_looks,
        &regularizer,
        config,
        x_init,
        SolverHooks::new(),
    )
}

/// Despeckle a ratio image with an already constructed regularizer.
pub fn despeckle_ratio_with<D: Denoise>(
    ratio: &SarRealImage,
    looks: f64,
    reference_looks: f64,
    regularizer: &Regularizer<D>,
    config: &AdmmConfig,
    x_init: Option<&LogImage>,
    hooks: SolverHooks<'_>,
) -> SarResult<DespeckleOutput> {
    let model = RatioGamma::new(looks, reference_looks)?;
    run_admm(ratio, &model, regularizer, config, x_init, hooks)
}
