//! Exact Euclidean distance transform
//!
//! Distance from every cell to the nearest feature cell (any cell that is not
//! no-data), computed with two separable passes of the lower-envelope
//! algorithm. East-west and north-south resolutions may differ.
//!
//! Reference:
//! Felzenszwalb, P.F. & Huttenlocher, D.P. (2012). Distance transforms of
//! sampled functions. Theory of Computing 8, 415-428.

use crate::maybe_rayon::*;
use rengis_core::raster::Raster;
use rengis_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Distance metric of the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Straight-line distance in map units
    #[default]
    Euclidean,
    /// Squared distance in map units squared
    Squared,
}

/// Parameters for the distance transform
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceParams {
    pub metric: DistanceMetric,
}

/// Output of the distance transform
#[derive(Debug, Clone)]
pub struct DistanceResult {
    /// Distance to the nearest feature, 0 on feature cells
    pub distance: Raster<f64>,
    /// Value of the nearest feature
    pub value: Raster<f64>,
}

/// One-dimensional squared distance transform of `f` sampled every `spacing`.
///
/// Returns the transformed values and, for each sample, the index of the
/// sample whose parabola is minimal there. Infinite samples never own a
/// parabola; if every sample is infinite the result is infinite with no owner.
fn lower_envelope(f: &[f64], spacing: f64) -> (Vec<f64>, Vec<Option<usize>>) {
    let n = f.len();
    let mut out = vec![f64::INFINITY; n];
    let mut owner = vec![None; n];

    let sites: Vec<usize> = (0..n).filter(|&i| f[i].is_finite()).collect();
    if sites.is_empty() {
        return (out, owner);
    }

    let pos = |i: usize| i as f64 * spacing;
    let intersect = |p: usize, q: usize| {
        ((f[q] + pos(q) * pos(q)) - (f[p] + pos(p) * pos(p))) / (2.0 * (pos(q) - pos(p)))
    };

    // v: parabolas in the envelope; z: boundaries between them
    let mut v: Vec<usize> = Vec::with_capacity(sites.len());
    let mut z: Vec<f64> = Vec::with_capacity(sites.len() + 1);
    v.push(sites[0]);
    z.push(f64::NEG_INFINITY);

    for &q in &sites[1..] {
        let mut s = intersect(v[v.len() - 1], q);
        while v.len() > 1 && s <= z[z.len() - 1] {
            v.pop();
            z.pop();
            s = intersect(v[v.len() - 1], q);
        }
        v.push(q);
        z.push(s);
    }
    z.push(f64::INFINITY);

    let mut k = 0;
    for i in 0..n {
        let x = pos(i);
        while z[k + 1] < x {
            k += 1;
        }
        let d = x - pos(v[k]);
        out[i] = d * d + f[v[k]];
        owner[i] = Some(v[k]);
    }

    (out, owner)
}

/// Compute the distance from every cell to the nearest non-no-data cell.
///
/// Feature cells get exactly 0 and their own value. Fails with
/// [`Error::MissingInput`] when the grid holds no feature cell.
pub fn euclidean_distance(features: &Raster<f64>, params: &DistanceParams) -> Result<DistanceResult> {
    if features.valid_count() == 0 {
        return Err(Error::missing("features", "grid holds no feature cells"));
    }

    let (rows, cols) = features.shape();
    let (ew_res, ns_res) = features.transform().resolution();

    // Pass 1: along each row
    let row_pass: Vec<(Vec<f64>, Vec<Option<usize>>)> = (0..rows)
        .into_par_iter()
        .map(|row| {
            let f: Vec<f64> = (0..cols)
                .map(|col| {
                    let v = unsafe { features.value_unchecked(row, col) };
                    if v.is_nan() { f64::INFINITY } else { 0.0 }
                })
                .collect();
            lower_envelope(&f, ew_res)
        })
        .collect();

    // Pass 2: along each column over the row-pass result
    let col_pass: Vec<(Vec<f64>, Vec<Option<usize>>)> = (0..cols)
        .into_par_iter()
        .map(|col| {
            let f: Vec<f64> = (0..rows).map(|row| row_pass[row].0[col]).collect();
            lower_envelope(&f, ns_res)
        })
        .collect();

    let mut distance = vec![f64::NAN; rows * cols];
    let mut value = vec![f64::NAN; rows * cols];
    for (col, (d2, owner_rows)) in col_pass.iter().enumerate() {
        for row in 0..rows {
            let idx = row * cols + col;
            // Every cell has an owner once at least one feature exists
            let Some(src_row) = owner_rows[row] else { continue };
            let Some(src_col) = row_pass[src_row].1[col] else { continue };

            distance[idx] = match params.metric {
                DistanceMetric::Euclidean => d2[row].sqrt(),
                DistanceMetric::Squared => d2[row],
            };
            value[idx] = unsafe { features.value_unchecked(src_row, src_col) };
        }
    }

    Ok(DistanceResult {
        distance: features.derive(distance, Some(f64::NAN))?,
        value: features.derive(value, Some(f64::NAN))?,
    })
}
