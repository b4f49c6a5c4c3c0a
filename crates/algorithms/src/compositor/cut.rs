//! Bringing an aligned layer into the region

use crate::maybe_rayon::*;
use rengis_core::crs::crs_compatible;
use rengis_core::raster::{Raster, Region};
use rengis_core::{Error, Result};

/// Crop or extend `raster` to `region`, optionally masking.
///
/// The raster must share the region's resolution and grid lines. Cells outside
/// the source, and cells where `mask` is no-data, become no-data.
pub fn cut(raster: &Raster<f64>, region: &Region, mask: Option<&Raster<f64>>) -> Result<Raster<f64>> {
    let mismatch = |reason: String| Error::GridMismatch {
        left: "region".into(),
        right: "source".into(),
        reason,
    };

    let gt = raster.transform();
    if !gt.is_north_up() {
        return Err(mismatch("source grid is rotated".into()));
    }
    let (ew, ns) = gt.resolution();
    let tol = 1e-9 * ew.max(ns).max(1.0);
    if (ew - region.ew_res).abs() > tol || (ns - region.ns_res).abs() > tol {
        return Err(mismatch(format!(
            "resolution {}x{} vs {}x{}",
            region.ew_res, region.ns_res, ew, ns
        )));
    }
    if !crs_compatible(region.crs(), raster.crs()) {
        return Err(mismatch("CRS differs".into()));
    }

    let col_shift = (region.west - gt.origin_x) / ew;
    let row_shift = (gt.origin_y - region.north) / ns;
    if (col_shift - col_shift.round()).abs() > 1e-6 || (row_shift - row_shift.round()).abs() > 1e-6 {
        return Err(mismatch(format!(
            "origin ({}, {}) is not on the region's grid lines",
            gt.origin_x, gt.origin_y
        )));
    }
    let col_off = col_shift.round() as isize;
    let row_off = row_shift.round() as isize;

    if let Some(m) = mask {
        region.ensure_matches(m, "mask")?;
    }

    let (src_rows, src_cols) = raster.shape();
    let rows = region.rows();
    let cols = region.cols();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            let sr = row as isize + row_off;
            if sr < 0 || sr as usize >= src_rows {
                return row_data;
            }
            for (col, out) in row_data.iter_mut().enumerate() {
                let sc = col as isize + col_off;
                if sc < 0 || sc as usize >= src_cols {
                    continue;
                }
                let masked = mask.is_some_and(|m| unsafe { m.value_unchecked(row, col) }.is_nan());
                if !masked {
                    *out = unsafe { raster.value_unchecked(sr as usize, sc as usize) };
                }
            }
            row_data
        })
        .collect();

    let mut output = Raster::from_vec(data, rows, cols)?;
    output.set_transform(region.transform());
    output.set_crs(region.crs().cloned());
    output.set_nodata(Some(f64::NAN));
    Ok(output)
}
