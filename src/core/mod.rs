//! Core despeckling solver modules

pub mod special;
pub mod penalty;
pub mod likelihood;
pub mod admm;
pub mod despeckle;

// Re-export main types
pub use special::trigamma;
pub use penalty::{AdaptivePenalty, PenaltyConfig, initial_beta_single, initial_beta_ratio};
pub use likelihood::{LikelihoodModel, SingleImageGamma, RatioGamma, newton_solve, DENOMINATOR_FLOOR};
pub use admm::{
    run_admm, AdmmConfig, DespeckleOutput, IterationReport, LogBase, SolverHooks, Termination,
};
pub use despeckle::{despeckle, despeckle_with, despeckle_ratio, despeckle_ratio_with};
