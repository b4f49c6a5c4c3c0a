//! Patching: merge grids, filling no-data from later inputs

use crate::maybe_rayon::*;
use rengis_core::raster::Raster;
use rengis_core::{Error, Result};

/// Merge grids cell by cell: each cell takes the first input value that is
/// not no-data. All inputs must share the same grid.
pub fn patch(rasters: &[&Raster<f64>]) -> Result<Raster<f64>> {
    let (first, rest) = rasters
        .split_first()
        .ok_or_else(|| Error::missing("patch", "no input grids"))?;
    for (i, &r) in rest.iter().enumerate() {
        first.ensure_same_grid("input 1", r, &format!("input {}", i + 2))?;
    }

    let (rows, cols) = first.shape();
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    rasters
                        .iter()
                        .map(|r| unsafe { r.value_unchecked(row, col) })
                        .find(|v| !v.is_nan())
                        .unwrap_or(f64::NAN)
                })
                .collect::<Vec<f64>>()
        })
        .collect();

    first.derive(data, Some(f64::NAN))
}
