//! Effective number of looks (ENL) estimation.
//!
//! The per-pixel ENL is `E² / V` over a square window, and the scene ENL is
//! the mode of its histogram. The result is what `despeckle` expects as `looks`.

use crate::types::{SarError, SarMask, SarRealImage, SarResult};
use ndarray::Array2;

/// Lower clip applied to the local variance
pub const VARIANCE_FLOOR: f64 = 1e-4;

/// Histogram bin width used by [`enl_mode`]
pub const ENL_BIN_WIDTH: f64 = 0.1;

/// Upper bound on the number of histogram bins in [`enl_mode`]
pub const MAX_ENL_BINS: usize = 1 << 20;

/// Per-pixel ENL over an odd `window_size × window_size` window.
///
/// NaN pixels (and pixels where `mask` is true) are ignored by the local
/// statistics and stay NaN in the output. The border is edge-extended.
/// The local variance is clipped to `[1e-4, 1/enl_max]` and the ENL to `[0, enl_max]`.
pub fn enl_image(
    image: &SarRealImage,
    window_size: usize,
    enl_max: f64,
    mask: Option<&SarMask>,
) -> SarResult<SarRealImage> {
    if window_size == 0 || window_size % 2 == 0 {
        return Err(SarError::InvalidParameter(format!(
            "window_size must be odd, got {}",
            window_size
        )));
    }
    if !(enl_max > 0.0) || !enl_max.is_finite() {
        return Err(SarError::InvalidParameter(format!(
            "enl_max must be positive, got {}",
            enl_max
        )));
    }
    if let Some(mask) = mask {
        if mask.dim() != image.dim() {
            return Err(SarError::ShapeMismatch {
                expected: image.dim(),
                found: mask.dim(),
            });
        }
    }

    let (height, width) = image.dim();
    log::debug!(
        "Computing ENL image {}x{} with {}x{} window",
        height,
        width,
        window_size,
        window_size
    );

    let valid = |i: usize, j: usize| -> Option<f64> {
        let masked = mask.map_or(false, |m| m[[i, j]]);
        let v = image[[i, j]];
        if masked || v.is_nan() {
            None
        } else {
            Some(v)
        }
    };

    // Summed-area tables over the edge-extended image
    let half = window_size / 2;
    let (ph, pw) = (height + 2 * half, width + 2 * half);
    let mut sum = Array2::<f64>::zeros((ph + 1, pw + 1));
    let mut sum_sq = Array2::<f64>::zeros((ph + 1, pw + 1));
    let mut count = Array2::<f64>::zeros((ph + 1, pw + 1));

    for pi in 0..ph {
        let i = pi.saturating_sub(half).min(height.saturating_sub(1));
        for pj in 0..pw {
            let j = pj.saturating_sub(half).min(width.saturating_sub(1));
            let (v, n) = match valid(i, j) {
                Some(v) => (v, 1.0),
                None => (0.0, 0.0),
            };
            sum[[pi + 1, pj + 1]] = v + sum[[pi, pj + 1]] + sum[[pi + 1, pj]] - sum[[pi, pj]];
            sum_sq[[pi + 1, pj + 1]] =
                v * v + sum_sq[[pi, pj + 1]] + sum_sq[[pi + 1, pj]] - sum_sq[[pi, pj]];
            count[[pi + 1, pj + 1]] =
                n + count[[pi, pj + 1]] + count[[pi + 1, pj]] - count[[pi, pj]];
        }
    }

    let window = |table: &Array2<f64>, i: usize, j: usize| -> f64 {
        let (i1, j1) = (i + window_size, j + window_size);
        table[[i1, j1]] - table[[i, j1]] - table[[i1, j]] + table[[i, j]]
    };

    let variance_ceiling = 1.0 / enl_max;
    let enl = Array2::from_shape_fn((height, width), |(i, j)| {
        if valid(i, j).is_none() {
            return f64::NAN;
        }
        let n = window(&count, i, j);
        let mean = window(&sum, i, j) / n;
        let mean_sq = window(&sum_sq, i, j) / n;
        let variance = (mean_sq - mean * mean)
            .max(VARIANCE_FLOOR)
            .min(variance_ceiling);
        (mean * mean / variance).clamp(0.0, enl_max)
    });

    Ok(enl)
}

/// Mode of the ENL histogram with 0.1-wide bins starting at `enl_min`.
///
/// The top of the histogram is `min(ceil(max ENL), enl_max)`. NaN values are ignored.
/// Returns the left edge of the most populated bin.
pub fn enl_mode(enl_image: &SarRealImage, enl_min: f64, enl_max: f64) -> SarResult<f64> {
    if !(enl_min >= 1.0) {
        return Err(SarError::InvalidParameter(format!(
            "enl_min must be >= 1, got {}",
            enl_min
        )));
    }
    if !enl_max.is_finite() {
        return Err(SarError::InvalidParameter(format!(
            "enl_max must be finite, got {}",
            enl_max
        )));
    }

    let values: Vec<f64> = enl_image.iter().copied().filter(|v| !v.is_nan()).collect();
    let data_max = values
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if values.is_empty() {
        return Err(SarError::Processing("No valid ENL values found".to_string()));
    }

    let top = data_max.ceil().min(enl_max);
    if !(top > enl_min) {
        return Err(SarError::InvalidParameter(format!(
            "ENL histogram range [{}, {}] is empty",
            enl_min, top
        )));
    }

    let bins = ((top - enl_min) / ENL_BIN_WIDTH).round();
    if !(bins >= 1.0 && bins <= MAX_ENL_BINS as f64) {
        return Err(SarError::InvalidParameter(format!(
            "ENL histogram range [{}, {}] gives {} bins, expected 1 to {}",
            enl_min, top, bins, MAX_ENL_BINS
        )));
    }
    let n_bins = bins as usize;
    let bin_width = (top - enl_min) / n_bins as f64;
    let mut counts = vec![0usize; n_bins];

    for v in values {
        if v < enl_min || v > top {
            continue;
        }
        // last bin is closed on the right
        let bin = (((v - enl_min) / bin_width).floor() as usize).min(n_bins - 1);
        counts[bin] += 1;
    }

    // first maximum wins
    let mut best = 0;
    for (bin, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = bin;
        }
    }

    let mode = enl_min + best as f64 * bin_width;
    log::info!("Estimated ENL mode: {:.1}", mode);
    Ok(mode)
}

/// Mask of pixels to leave out of ENL estimation (true = ignore).
///
/// Covers NaN pixels, pixels whose backscatter is below `db_min` dB and any
/// pixel flagged in `additional_mask`. Non-positive pixels have no dB value
/// and are masked as well.
pub fn enl_mask(
    image: &SarRealImage,
    db_min: f64,
    additional_mask: Option<&SarMask>,
) -> SarResult<SarMask> {
    if let Some(extra) = additional_mask {
        if extra.dim() != image.dim() {
            return Err(SarError::ShapeMismatch {
                expected: image.dim(),
                found: extra.dim(),
            });
        }
    }

    let mut mask = image.mapv(|v| v.is_nan() || !(v > 0.0) || 10.0 * v.log10() < db_min);
    if let Some(extra) = additional_mask {
        mask.zip_mut_with(extra, |m, &e| *m |= e);
    }

    let masked = mask.iter().filter(|&&m| m).count();
    log::debug!("ENL mask excludes {} of {} pixels", masked, mask.len());
    Ok(mask)
}
