//! rabasar: ratio-based multitemporal SAR despeckling
//!
//! Removes speckle from SAR intensity images with a plug-and-play ADMM solver
//! in the log domain. A time series is denoised by despeckling the ratio of
//! each acquisition to a temporal reference image, then multiplying back.
//! The proximal step is a pluggable denoiser (split-Bregman total variation
//! or BM3D).

pub mod types;
pub mod core;
pub mod denoise;
pub mod preprocess;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{LogImage, SarError, SarMask, SarReal, SarRealImage, SarResult};

pub use crate::core::{
    despeckle, despeckle_ratio, despeckle_ratio_with, despeckle_with, AdmmConfig,
    DespeckleOutput, IterationReport, LogBase, PenaltyConfig, SolverHooks, Termination,
};

pub use denoise::{
    Bm3d, Bm3dParams, Denoise, Denoiser, Regularizer, RegularizerKind, RegularizerParams,
    TvBregman, TvBregmanParams,
};

pub use preprocess::{enl_image, enl_mask, enl_mode, fill_gaps};
