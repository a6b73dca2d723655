//! Block-matching 3D (BM3D) collaborative filtering.
//!
//! Two passes, after Dabov et al., "Image Denoising by Sparse 3-D
//! Transform-Domain Collaborative Filtering" (2007):
//!
//! 1. group similar patches of the noisy image, hard-threshold the group in a
//!    3-D transform domain and aggregate a basic estimate;
//! 2. regroup using the basic estimate as pilot and apply an empirical Wiener
//!    filter to the noisy groups.
//!
//! The 3-D transform is a 2-D FFT per patch followed by a 1-D FFT across the
//! group. There is no randomness: matching ties are broken by position and
//! aggregation runs in reference order, so output is reproducible.

use crate::denoise::Denoise;
use crate::types::{LogImage, SarError, SarResult};
use ndarray::{s, Array2, Array3, Axis, Zip};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Number of reference patches filtered before their estimates are aggregated
const REFERENCE_CHUNK: usize = 2048;

/// BM3D parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm3dParams {
    /// Patch side length (clipped to the image size)
    pub patch_size: usize,
    /// Stride between reference patches
    pub step: usize,
    /// Side of the square search window centred on the reference
    pub search_window: usize,
    /// Maximum patches per group, including the reference
    pub max_matches: usize,
    /// Hard-threshold multiplier on the coefficient noise level
    pub hard_threshold: f64,
}

impl Default for Bm3dParams {
    fn default() -> Self {
        Self {
            patch_size: 8,
            step: 3,
            search_window: 19,
            max_matches: 16,
            hard_threshold: 2.7,
        }
    }
}

impl Bm3dParams {
    pub fn validate(&self) -> SarResult<()> {
        if self.patch_size == 0 || self.step == 0 || self.max_matches == 0 {
            return Err(SarError::InvalidParameter(format!(
                "BM3D patch_size, step and max_matches must be non-zero: {:?}",
                self
            )));
        }
        if !(self.hard_threshold.is_finite() && self.hard_threshold > 0.0) {
            return Err(SarError::InvalidParameter(format!(
                "BM3D hard_threshold must be positive, got {}",
                self.hard_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    HardThreshold,
    Wiener,
}

/// Filtered group ready for aggregation
struct GroupEstimate {
    positions: Vec<(usize, usize)>,
    patches: Array3<f64>,
    weight: f64,
}

struct FftPlans {
    patch_forward: Arc<dyn Fft<f64>>,
    patch_inverse: Arc<dyn Fft<f64>>,
    /// Indexed by group size - 1
    group_forward: Vec<Arc<dyn Fft<f64>>>,
    group_inverse: Vec<Arc<dyn Fft<f64>>>,
}

impl FftPlans {
    fn new(patch: usize, max_group: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        Self {
            patch_forward: planner.plan_fft_forward(patch),
            patch_inverse: planner.plan_fft_inverse(patch),
            group_forward: (1..=max_group).map(|k| planner.plan_fft_forward(k)).collect(),
            group_inverse: (1..=max_group).map(|k| planner.plan_fft_inverse(k)).collect(),
        }
    }

    fn forward(&self, group: &mut Array3<Complex<f64>>) {
        let k = group.len_of(Axis(0));
        fft_along_axis(group, Axis(1), &self.patch_forward);
        fft_along_axis(group, Axis(2), &self.patch_forward);
        fft_along_axis(group, Axis(0), &self.group_forward[k - 1]);
    }

    fn inverse(&self, group: &mut Array3<Complex<f64>>) {
        let k = group.len_of(Axis(0));
        fft_along_axis(group, Axis(0), &self.group_inverse[k - 1]);
        fft_along_axis(group, Axis(1), &self.patch_inverse);
        fft_along_axis(group, Axis(2), &self.patch_inverse);
        let scale = 1.0 / group.len() as f64;
        group.mapv_inplace(|v| v * scale);
    }
}

/// BM3D denoiser; `strength` is the noise standard deviation
#[derive(Debug, Clone, Default)]
pub struct Bm3d {
    params: Bm3dParams,
}

impl Bm3d {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: Bm3dParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &Bm3dParams {
        &self.params
    }

    /// Denoise `image` assuming additive white noise of standard deviation `sigma`.
    pub fn apply(&self, image: &Array2<f64>, sigma: f64) -> SarResult<Array2<f64>> {
        self.params.validate()?;
        if !(sigma.is_finite() && sigma >= 0.0) {
            return Err(SarError::InvalidParameter(format!(
                "BM3D sigma must be non-negative and finite, got {}",
                sigma
            )));
        }

        let (rows, cols) = image.dim();
        if sigma == 0.0 || rows == 0 || cols == 0 {
            return Ok(image.clone());
        }

        let basic = self.run_stage(image, image, sigma, Stage::HardThreshold);
        let estimate = self.run_stage(image, &basic, sigma, Stage::Wiener);
        Ok(estimate)
    }

    fn run_stage(
        &self,
        noisy: &Array2<f64>,
        pilot: &Array2<f64>,
        sigma: f64,
        stage: Stage,
    ) -> Array2<f64> {
        let (rows, cols) = noisy.dim();
        let patch = self.params.patch_size.min(rows).min(cols);
        let plans = FftPlans::new(patch, self.params.max_matches);

        let references: Vec<(usize, usize)> = grid_positions(rows, patch, self.params.step)
            .into_iter()
            .flat_map(|r| {
                grid_positions(cols, patch, self.params.step)
                    .into_iter()
                    .map(move |c| (r, c))
            })
            .collect();

        log::trace!(
            "BM3D {:?} stage: {} reference patches of {}x{}",
            stage,
            references.len(),
            patch,
            patch
        );

        let mut numerator = Array2::<f64>::zeros((rows, cols));
        let mut denominator = Array2::<f64>::zeros((rows, cols));

        for chunk in references.chunks(REFERENCE_CHUNK) {
            let filter = |&reference: &(usize, usize)| {
                self.filter_group(noisy, pilot, reference, patch, sigma, stage, &plans)
            };

            #[cfg(feature = "parallel")]
            let estimates: Vec<GroupEstimate> = chunk.par_iter().map(filter).collect();
            #[cfg(not(feature = "parallel"))]
            let estimates: Vec<GroupEstimate> = chunk.iter().map(filter).collect();

            for estimate in estimates {
                for (idx, &(r, c)) in estimate.positions.iter().enumerate() {
                    let values = estimate.patches.index_axis(Axis(0), idx);
                    numerator
                        .slice_mut(s![r..r + patch, c..c + patch])
                        .scaled_add(estimate.weight, &values);
                    denominator
                        .slice_mut(s![r..r + patch, c..c + patch])
                        .mapv_inplace(|d| d + estimate.weight);
                }
            }
        }

        Zip::from(&numerator)
            .and(&denominator)
            .and(noisy)
            .map_collect(|&n, &d, &f| if d > 0.0 { n / d } else { f })
    }

    #[allow(clippy::too_many_arguments)]
    fn filter_group(
        &self,
        noisy: &Array2<f64>,
        pilot: &Array2<f64>,
        reference: (usize, usize),
        patch: usize,
        sigma: f64,
        stage: Stage,
        plans: &FftPlans,
    ) -> GroupEstimate {
        let positions = match_patches(
            pilot,
            reference,
            patch,
            self.params.search_window,
            self.params.max_matches,
        );

        let mut group = stack_group(noisy, &positions, patch);
        plans.forward(&mut group);

        let coefficients = group.len() as f64;
        let weight = match stage {
            Stage::HardThreshold => {
                let threshold = self.params.hard_threshold * sigma * coefficients.sqrt();
                let mut retained = 0usize;
                group.mapv_inplace(|v| {
                    if v.norm() < threshold {
                        Complex::new(0.0, 0.0)
                    } else {
                        retained += 1;
                        v
                    }
                });
                1.0 / retained.max(1) as f64
            }
            Stage::Wiener => {
                let mut pilot_group = stack_group(pilot, &positions, patch);
                plans.forward(&mut pilot_group);

                let noise_power = sigma * sigma * coefficients;
                let mut energy = 0.0;
                Zip::from(&mut group).and(&pilot_group).for_each(|v, p| {
                    let power = p.norm_sqr();
                    let shrinkage = power / (power + noise_power);
                    *v *= shrinkage;
                    energy += shrinkage * shrinkage;
                });
                1.0 / energy.max(1e-12)
            }
        };

        plans.inverse(&mut group);

        GroupEstimate {
            positions,
            patches: group.mapv(|v| v.re),
            weight,
        }
    }
}

impl Denoise for Bm3d {
    fn name(&self) -> &str {
        "bm3d"
    }

    fn denoise(&self, image: &LogImage, strength: f64) -> SarResult<LogImage> {
        self.apply(image, strength)
    }
}

/// Patch origins along one axis: every `step`, plus the last valid origin so
/// the whole axis is covered.
fn grid_positions(len: usize, patch: usize, step: usize) -> Vec<usize> {
    let last = len - patch;
    let mut positions: Vec<usize> = (0..=last).step_by(step).collect();
    if positions.last() != Some(&last) {
        positions.push(last);
    }
    positions
}

/// Up to `max_matches` patch origins most similar to `reference` (mean squared
/// difference) inside the search window. The reference itself is always included.
fn match_patches(
    image: &Array2<f64>,
    reference: (usize, usize),
    patch: usize,
    search_window: usize,
    max_matches: usize,
) -> Vec<(usize, usize)> {
    let (rows, cols) = image.dim();
    let (r0, c0) = reference;
    let half = search_window / 2;
    let r_range = r0.saturating_sub(half)..=(r0 + half).min(rows - patch);
    let c_range = c0.saturating_sub(half)..=(c0 + half).min(cols - patch);

    let reference_patch = image.slice(s![r0..r0 + patch, c0..c0 + patch]);
    let area = (patch * patch) as f64;

    let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
    for r in r_range {
        for c in c_range.clone() {
            let candidate = image.slice(s![r..r + patch, c..c + patch]);
            let distance = reference_patch
                .iter()
                .zip(candidate.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                / area;
            candidates.push((distance, r, c));
        }
    }

    candidates.sort_by(|a, b| {
        a.0.total_cmp(&b.0)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });
    candidates.truncate(max_matches);

    if !candidates.iter().any(|&(_, r, c)| (r, c) == reference) {
        candidates.pop();
        candidates.insert(0, (0.0, r0, c0));
    }

    candidates.into_iter().map(|(_, r, c)| (r, c)).collect()
}

fn stack_group(image: &Array2<f64>, positions: &[(usize, usize)], patch: usize) -> Array3<Complex<f64>> {
    let mut group = Array3::<Complex<f64>>::zeros((positions.len(), patch, patch));
    for (idx, &(r, c)) in positions.iter().enumerate() {
        let source = image.slice(s![r..r + patch, c..c + patch]);
        group
            .index_axis_mut(Axis(0), idx)
            .zip_mut_with(&source, |dst, &src| *dst = Complex::new(src, 0.0));
    }
    group
}

fn fft_along_axis(data: &mut Array3<Complex<f64>>, axis: Axis, plan: &Arc<dyn Fft<f64>>) {
    let mut buffer: Vec<Complex<f64>> = Vec::with_capacity(data.len_of(axis));
    for mut lane in data.lanes_mut(axis) {
        buffer.clear();
        buffer.extend(lane.iter().copied());
        plan.process(&mut buffer);
        for (dst, src) in lane.iter_mut().zip(buffer.iter()) {
            *dst = *src;
        }
    }
}
