//! Resampling onto a region grid
//!
//! - **Nearest**: value of the source cell under each output cell center
//! - **WeightedMean**: area-weighted mean of every source cell overlapping an
//!   output cell (aggregation, e.g. 2 m DEM to 10 m)

use crate::maybe_rayon::*;
use rengis_core::crs::crs_compatible;
use rengis_core::raster::{Raster, Region};
use rengis_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Resampling method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleMethod {
    #[default]
    Nearest,
    WeightedMean,
}

impl std::str::FromStr for ResampleMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "nearest" | "near" => Ok(ResampleMethod::Nearest),
            "weighted" | "weighted_mean" | "average" => Ok(ResampleMethod::WeightedMean),
            _ => Err(Error::InvalidParameter {
                name: "method",
                value: s.to_string(),
                reason: "expected nearest or weighted".into(),
            }),
        }
    }
}

/// Source cells overlapping one output cell along one axis, with the
/// overlap length in source cells.
fn axis_weights(start: f64, end: f64, len: usize) -> Vec<(usize, f64)> {
    let lo = start.floor().max(0.0) as usize;
    let hi = (end.ceil().max(0.0) as usize).min(len);
    (lo..hi)
        .filter_map(|i| {
            let w = end.min(i as f64 + 1.0) - start.max(i as f64);
            (w > 1e-12).then_some((i, w))
        })
        .collect()
}

/// Resample `raster` onto the grid of `region`.
///
/// Output cells outside the source extent are no-data. Weighted means skip
/// no-data source cells and renormalize over the valid overlap.
pub fn resample(raster: &Raster<f64>, region: &Region, method: ResampleMethod) -> Result<Raster<f64>> {
    let gt = raster.transform();
    if !gt.is_north_up() {
        return Err(Error::Algorithm("resampling requires a north-up grid".into()));
    }
    if !crs_compatible(raster.crs(), region.crs()) {
        return Err(Error::GridMismatch {
            left: "region".into(),
            right: "source".into(),
            reason: "CRS differs".into(),
        });
    }

    let (src_rows, src_cols) = raster.shape();
    let rows = region.rows();
    let cols = region.cols();
    let target = region.transform();
    let (src_ew, src_ns) = gt.resolution();

    let output_data: Vec<f64> = match method {
        ResampleMethod::Nearest => (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = vec![f64::NAN; cols];
                for (col, out) in row_data.iter_mut().enumerate() {
                    let (x, y) = target.pixel_to_geo(col, row);
                    let (fc, fr) = gt.geo_to_pixel(x, y);
                    if fc >= 0.0 && fr >= 0.0 {
                        let (sc, sr) = (fc.floor() as usize, fr.floor() as usize);
                        if sr < src_rows && sc < src_cols {
                            *out = unsafe { raster.value_unchecked(sr, sc) };
                        }
                    }
                }
                row_data
            })
            .collect(),
        ResampleMethod::WeightedMean => {
            // Column overlaps are the same for every output row
            let col_weights: Vec<Vec<(usize, f64)>> = (0..cols)
                .map(|col| {
                    let x0 = region.west + col as f64 * region.ew_res;
                    let start = (x0 - gt.origin_x) / src_ew;
                    let end = (x0 + region.ew_res - gt.origin_x) / src_ew;
                    axis_weights(start, end, src_cols)
                })
                .collect();

            (0..rows)
                .into_par_iter()
                .flat_map(|row| {
                    let y0 = region.north - row as f64 * region.ns_res;
                    let start = (gt.origin_y - y0) / src_ns;
                    let end = (gt.origin_y - (y0 - region.ns_res)) / src_ns;
                    let row_weights = axis_weights(start, end, src_rows);

                    let mut row_data = vec![f64::NAN; cols];
                    for (out, cw) in row_data.iter_mut().zip(&col_weights) {
                        let mut sum = 0.0;
                        let mut weight = 0.0;
                        for &(sr, wr) in &row_weights {
                            for &(sc, wc) in cw {
                                let v = unsafe { raster.value_unchecked(sr, sc) };
                                if !v.is_nan() {
                                    sum += v * wr * wc;
                                    weight += wr * wc;
                                }
                            }
                        }
                        if weight > 0.0 {
                            *out = sum / weight;
                        }
                    }
                    row_data
                })
                .collect()
        }
    };

    let mut output = Raster::from_vec(output_data, rows, cols)?;
    output.set_transform(target);
    output.set_crs(region.crs().cloned());
    output.set_nodata(Some(f64::NAN));
    Ok(output)
}
