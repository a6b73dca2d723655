//! Helpers for preparing inputs to the despeckling solver

pub mod enl;
pub mod interpolate;

pub use enl::{enl_image, enl_mask, enl_mode};
pub use interpolate::fill_gaps;
