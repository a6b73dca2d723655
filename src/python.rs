//! Python bindings (enabled with the `python` feature)

use crate::core::{self as solver, AdmmConfig};
use crate::denoise::RegularizerParams;
use crate::preprocess;
use crate::types::SarError;
use numpy::{PyArray2, PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

impl From<SarError> for PyErr {
    fn from(err: SarError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

fn admm_config(
    max_admm_iterations: usize,
    newton_iterations: usize,
    denoiser_iterations: usize,
    convergence_crit: f64,
) -> AdmmConfig {
    AdmmConfig {
        max_admm_iterations,
        newton_iterations,
        denoiser_iterations,
        convergence_crit,
        ..AdmmConfig::default()
    }
}

/// Despeckle a single linear-scale image. Returns `(image, residuals)`.
#[pyfunction]
#[pyo3(signature = (
    image,
    looks,
    regularizer = "tv",
    weight = None,
    isotropic = None,
    max_admm_iterations = 10,
    newton_iterations = 3,
    denoiser_iterations = 10,
    convergence_crit = 1e-5,
))]
#[allow(clippy::too_many_arguments)]
fn despeckle<'py>(
    py: Python<'py>,
    image: PyReadonlyArray2<'py, f64>,
    looks: f64,
    regularizer: &str,
    weight: Option<f64>,
    isotropic: Option<bool>,
    max_admm_iterations: usize,
    newton_iterations: usize,
    denoiser_iterations: usize,
    convergence_crit: f64,
) -> PyResult<(&'py PyArray2<f64>, Vec<f64>)> {
    let image = image.as_array().to_owned();
    let params = RegularizerParams { weight, isotropic };
    let config = admm_config(
        max_admm_iterations,
        newton_iterations,
        denoiser_iterations,
        convergence_crit,
    );
    let regularizer = regularizer.to_string();

    let output = py.allow_threads(move || {
        solver::despeckle(&image, looks, &regularizer, &params, &config)
    })?;
    Ok((output.image.to_pyarray(py), output.residuals))
}

/// Despeckle a ratio image `I / I_ref`. Returns `(image, residuals)`.
#[pyfunction]
#[pyo3(signature = (
    ratio,
    looks,
    reference_looks,
    regularizer = "tv",
    weight = None,
    isotropic = None,
    max_admm_iterations = 10,
    newton_iterations = 3,
    denoiser_iterations = 10,
    x_init = None,
    convergence_crit = 1e-5,
))]
#[allow(clippy::too_many_arguments)]
fn despeckle_ratio<'py>(
    py: Python<'py>,
    ratio: PyReadonlyArray2<'py, f64>,
    looks: f64,
    reference_looks: f64,
    regularizer: &str,
    weight: Option<f64>,
    isotropic: Option<bool>,
    max_admm_iterations: usize,
    newton_iterations: usize,
    denoiser_iterations: usize,
    x_init: Option<PyReadonlyArray2<'py, f64>>,
    convergence_crit: f64,
) -> PyResult<(&'py PyArray2<f64>, Vec<f64>)> {
    let ratio = ratio.as_array().to_owned();
    let x_init = x_init.map(|x| x.as_array().to_owned());
    let params = RegularizerParams { weight, isotropic };
    let config = admm_config(
        max_admm_iterations,
        newton_iterations,
        denoiser_iterations,
        convergence_crit,
    );
    let regularizer = regularizer.to_string();

    let output = py.allow_threads(move || {
        solver::despeckle_ratio(
            &ratio,
            looks,
            reference_looks,
            &regularizer,
            &params,
            &config,
            x_init.as_ref(),
        )
    })?;
    Ok((output.image.to_pyarray(py), output.residuals))
}

/// Fill NaN pixels with their nearest valid neighbour.
#[pyfunction]
fn fill_gaps<'py>(py: Python<'py>, image: PyReadonlyArray2<'py, f64>) -> PyResult<&'py PyArray2<f64>> {
    let filled = preprocess::fill_gaps(&image.as_array().to_owned())?;
    Ok(filled.to_pyarray(py))
}

/// Estimate the scene ENL: per-pixel ENL image, masked by `db_min`, then its mode.
#[pyfunction]
#[pyo3(signature = (image, window_size = 7, enl_min = 1.0, enl_max = 20.0, db_min = -18.0))]
fn estimate_enl(
    image: PyReadonlyArray2<f64>,
    window_size: usize,
    enl_min: f64,
    enl_max: f64,
    db_min: f64,
) -> PyResult<f64> {
    let image = image.as_array().to_owned();
    let mask = preprocess::enl_mask(&image, db_min, None)?;
    let enl = preprocess::enl_image(&image, window_size, enl_max, Some(&mask))?;
    Ok(preprocess::enl_mode(&enl, enl_min, enl_max)?)
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(despeckle, m)?)?;
    m.add_function(wrap_pyfunction!(despeckle_ratio, m)?)?;
    m.add_function(wrap_pyfunction!(fill_gaps, m)?)?;
    m.add_function(wrap_pyfunction!(estimate_enl, m)?)?;
    Ok(())
}
