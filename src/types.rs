use ndarray::Array2;

/// Real-valued intensity or ratio data (linear scale)
pub type SarReal = f64;

/// 2D real SAR image (rows x cols), linear scale
pub type SarRealImage = Array2<SarReal>;

/// 2D image in the log domain the solver iterates in
pub type LogImage = Array2<SarReal>;

/// Boolean mask, `true` marks pixels to ignore
pub type SarMask = Array2<bool>;

/// Error types for despeckling
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("Unsupported regularizer '{0}': only 'tv' and 'bm3d' are implemented")]
    UnsupportedRegularizer(String),

    #[error("Missing regularizer parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid input domain at ({row}, {col}): value {value} is not strictly positive and finite")]
    InvalidDomain { row: usize, col: usize, value: f64 },

    #[error("Numeric instability in iteration {iteration}: {detail}")]
    NumericInstability { iteration: usize, detail: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for despeckling operations
pub type SarResult<T> = Result<T, SarError>;

/// Check that every pixel is strictly positive and finite.
///
/// The log transform in the solver is undefined anywhere else, so this runs
/// before any state is built. Reports the first offending pixel in row-major order.
pub fn validate_positive(image: &SarRealImage) -> SarResult<()> {
    if image.is_empty() {
        return Err(SarError::InvalidParameter("image has no pixels".to_string()));
    }

    for ((row, col), &value) in image.indexed_iter() {
        if !(value.is_finite() && value > 0.0) {
            return Err(SarError::InvalidDomain { row, col, value });
        }
    }
    Ok(())
}

/// Check that a scalar parameter is strictly positive and finite.
pub fn validate_positive_scalar(name: &str, value: f64) -> SarResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SarError::InvalidParameter(format!(
            "{} must be positive and finite, got {}",
            name, value
        )))
    }
}
