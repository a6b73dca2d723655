use crate::types::{SarError, SarResult};
use ndarray::Array2;
use num_traits::Float;

/// Fill NaN pixels with the value of the nearest valid pixel (Euclidean distance).
///
/// Runs the two-pass exact distance transform of Felzenszwalb & Huttenlocher,
/// tracking the index of the nearest valid pixel, in O(rows * cols).
/// Returns `InvalidDomain` if every pixel is NaN.
pub fn fill_gaps<T: Float>(image: &Array2<T>) -> SarResult<Array2<T>> {
    let (rows, cols) = image.dim();
    if rows == 0 || cols == 0 {
        return Ok(image.clone());
    }

    let gaps = image.iter().filter(|v| v.is_nan()).count();
    if gaps == 0 {
        return Ok(image.clone());
    }
    if gaps == image.len() {
        return Err(SarError::InvalidDomain {
            row: 0,
            col: 0,
            value: f64::NAN,
        });
    }

    log::debug!("Filling {} no-data pixels by nearest neighbour", gaps);

    // Pass 1: nearest valid row within each column
    let mut nearest_row = Array2::<Option<usize>>::from_elem((rows, cols), None);
    for c in 0..cols {
        let mut last = None;
        for r in 0..rows {
            if !image[[r, c]].is_nan() {
                last = Some(r);
            }
            nearest_row[[r, c]] = last;
        }
        let mut next = None;
        for r in (0..rows).rev() {
            if !image[[r, c]].is_nan() {
                next = Some(r);
            }
            nearest_row[[r, c]] = match (nearest_row[[r, c]], next) {
                (Some(above), Some(below)) => {
                    if r - above <= below - r {
                        Some(above)
                    } else {
                        Some(below)
                    }
                }
                (above, below) => above.or(below),
            };
        }
    }

    // Pass 2: lower envelope of parabolas along each row
    let mut filled = image.clone();
    let mut column_cost = vec![f64::INFINITY; cols];
    let mut sites: Vec<usize> = Vec::with_capacity(cols);
    let mut bounds: Vec<f64> = Vec::with_capacity(cols + 1);

    for r in 0..rows {
        for c in 0..cols {
            column_cost[c] = match nearest_row[[r, c]] {
                Some(nr) => {
                    let d = r.abs_diff(nr) as f64;
                    d * d
                }
                None => f64::INFINITY,
            };
        }

        sites.clear();
        bounds.clear();
        bounds.push(f64::NEG_INFINITY);

        let intersect = |q: usize, p: usize| -> f64 {
            let (qf, pf) = (q as f64, p as f64);
            ((column_cost[q] + qf * qf) - (column_cost[p] + pf * pf)) / (2.0 * qf - 2.0 * pf)
        };

        for q in (0..cols).filter(|&q| column_cost[q].is_finite()) {
            while let Some(&p) = sites.last() {
                let s = intersect(q, p);
                if s <= bounds[sites.len() - 1] {
                    sites.pop();
                    bounds.pop();
                } else {
                    sites.push(q);
                    bounds.push(s);
                    break;
                }
            }
            if sites.is_empty() {
                sites.push(q);
                bounds.truncate(1);
            }
        }

        let mut k = 0;
        for c in 0..cols {
            while k + 1 < sites.len() && bounds[k + 1] < c as f64 {
                k += 1;
            }
            let site = sites[k];
            if let Some(source_row) = nearest_row[[r, site]] {
                filled[[r, c]] = image[[source_row, site]];
            }
        }
    }

    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force_distance(image: &Array2<f64>, r: usize, c: usize) -> f64 {
        image
            .indexed_iter()
            .filter(|(_, v)| !v.is_nan())
            .map(|((i, j), _)| {
                let di = i as f64 - r as f64;
                let dj = j as f64 - c as f64;
                di * di + dj * dj
            })
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn test_no_gaps_is_identity() {
        let image = Array2::from_shape_fn((3, 4), |(i, j)| (i * 4 + j) as f32);
        assert_eq!(fill_gaps(&image).unwrap(), image);
    }

    #[test]
    fn test_single_valid_pixel_fills_everything() {
        let mut image = Array2::from_elem((5, 6), f64::NAN);
        image[[3, 1]] = 7.5;
        let filled = fill_gaps(&image).unwrap();
        assert!(filled.iter().all(|&v| v == 7.5));
    }

    #[test]
    fn test_fills_from_nearest_neighbour() {
        let mut image = Array2::from_elem((1, 7), f64::NAN);
        image[[0, 0]] = 1.0;
        image[[0, 6]] = 2.0;
        let filled = fill_gaps(&image).unwrap();
        assert_eq!(filled.row(0).to_vec(), vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_matches_brute_force_distance() {
        // distinct values so the source pixel can be identified
        let mut image = Array2::from_shape_fn((9, 11), |(i, j)| (i * 11 + j) as f64);
        for ((i, j), v) in image.indexed_iter_mut() {
            if (i * 7 + j * 3) % 5 != 0 || (i > 2 && i < 7 && j > 3 && j < 9) {
                *v = f64::NAN;
            }
        }
        let filled = fill_gaps(&image).unwrap();

        for ((r, c), &value) in filled.indexed_iter() {
            assert!(!value.is_nan());
            let source = value as usize;
            let (si, sj) = (source / 11, source % 11);
            assert!(!image[[si, sj]].is_nan());
            let di = si as f64 - r as f64;
            let dj = sj as f64 - c as f64;
            assert_eq!(di * di + dj * dj, brute_force_distance(&image, r, c));
        }
    }

    #[test]
    fn test_all_gaps_is_an_error() {
        let image = Array2::from_elem((2, 2), f64::NAN);
        assert!(matches!(fill_gaps(&image), Err(SarError::InvalidDomain { .. })));
    }
}
