//! Slope calculation from DEMs
//!
//! Calculates the rate of change of elevation using the Horn (1981) method,
//! which uses a 3x3 neighborhood to compute partial derivatives. East-west
//! and north-south resolutions are taken separately.

use crate::maybe_rayon::*;
use rengis_core::raster::Raster;
use rengis_core::{Algorithm, Error, Result};

/// Units for slope output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlopeUnits {
    /// Degrees (0-90)
    #[default]
    Degrees,
    /// Percent rise (100 at 45 degrees)
    Percent,
}

/// Parameters for slope calculation
#[derive(Debug, Clone)]
pub struct SlopeParams {
    pub units: SlopeUnits,
    /// Multiplier applied to elevations, for DEMs whose z units differ
    /// from the map units
    pub z_factor: f64,
    /// Estimate cells on the grid edge and next to no-data instead of
    /// leaving them no-data
    pub edges: bool,
}

impl Default for SlopeParams {
    fn default() -> Self {
        Self {
            units: SlopeUnits::Degrees,
            z_factor: 1.0,
            edges: false,
        }
    }
}

/// Slope algorithm
#[derive(Debug, Clone, Default)]
pub struct Slope;

impl Algorithm for Slope {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = SlopeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Slope"
    }

    fn description(&self) -> &'static str {
        "Calculate slope (rate of change of elevation) from a DEM using Horn's method"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        slope(&input, &params)
    }
}

/// Horn gradient at `(row, col)` as rise per map unit towards east and
/// towards south.
///
/// ```text
/// a b c
/// d e f
/// g h i
/// ```
///
/// dz/dx = ((c + 2f + i) - (a + 2d + g)) / (8 * ew_res)
/// dz/dy = ((g + 2h + i) - (a + 2b + c)) / (8 * ns_res)
///
/// `None` when the center is no-data. Without `edges` it is also `None` on
/// the grid edge and next to no-data; with `edges`, neighbors outside the
/// grid take the nearest edge cell and no-data neighbors take `e`.
pub(crate) fn horn_gradient(
    dem: &Raster<f64>,
    row: usize,
    col: usize,
    (ew_res, ns_res): (f64, f64),
    edges: bool,
) -> Option<(f64, f64)> {
    let (rows, cols) = dem.shape();
    let e = unsafe { dem.value_unchecked(row, col) };
    if e.is_nan() {
        return None;
    }

    let mut z = [e; 9];
    for (k, zk) in z.iter_mut().enumerate() {
        let nr = row as isize + (k / 3) as isize - 1;
        let nc = col as isize + (k % 3) as isize - 1;
        let inside = nr >= 0 && nc >= 0 && (nr as usize) < rows && (nc as usize) < cols;
        if !inside && !edges {
            return None;
        }
        let r = nr.clamp(0, rows as isize - 1) as usize;
        let c = nc.clamp(0, cols as isize - 1) as usize;
        let v = unsafe { dem.value_unchecked(r, c) };
        if v.is_nan() {
            if !edges {
                return None;
            }
        } else {
            *zk = v;
        }
    }

    let [a, b, c, d, _, f, g, h, i] = z;
    let dz_dx = ((c + 2.0 * f + i) - (a + 2.0 * d + g)) / (8.0 * ew_res);
    let dz_dy = ((g + 2.0 * h + i) - (a + 2.0 * b + c)) / (8.0 * ns_res);
    Some((dz_dx, dz_dy))
}

/// Calculate slope from a DEM
///
/// slope = atan(z_factor * sqrt(dz/dx² + dz/dy²))
///
/// # Returns
/// Raster with slope values in the requested units, no-data (NaN) where
/// the gradient is undefined
pub fn slope(dem: &Raster<f64>, params: &SlopeParams) -> Result<Raster<f64>> {
    if !(params.z_factor.is_finite() && params.z_factor > 0.0) {
        return Err(Error::InvalidParameter {
            name: "z_factor",
            value: params.z_factor.to_string(),
            reason: "must be a positive number".into(),
        });
    }

    let (rows, cols) = dem.shape();
    let resolution = dem.transform().resolution();

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];

            for (col, out) in row_data.iter_mut().enumerate() {
                let Some((dz_dx, dz_dy)) = horn_gradient(dem, row, col, resolution, params.edges)
                else {
                    continue;
                };
                let rise = params.z_factor * (dz_dx * dz_dx + dz_dy * dz_dy).sqrt();
                *out = match params.units {
                    SlopeUnits::Degrees => rise.atan().to_degrees(),
                    SlopeUnits::Percent => rise * 100.0,
                };
            }

            row_data
        })
        .collect();

    dem.derive(output_data, Some(f64::NAN))
}
