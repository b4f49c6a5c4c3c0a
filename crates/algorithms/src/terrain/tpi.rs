//! Topographic Position Index (TPI)
//!
//! TPI measures the difference between the elevation of a cell and the mean
//! elevation of the moving window around it:
//!
//!   TPI = z_center - mean(z_window)
//!
//! - Positive TPI → cell is higher than surroundings (ridge, hilltop)
//! - Negative TPI → cell is lower than surroundings (valley, depression)
//! - Near-zero TPI → cell is at the same level (flat area or mid-slope)
//!
//! The window mean includes the center cell and skips no-data cells.
//! Multi-scale relief is obtained by running several window sizes.
//! Reference: Weiss (2001) "Topographic Position and Landforms Analysis"

use crate::maybe_rayon::*;
use crate::statistics::EdgeMode;
use rengis_core::raster::{Raster, Window, WindowSize};
use rengis_core::{Algorithm, Error, Result, Workspace};
use tracing::info;

/// Parameters for TPI calculation
#[derive(Debug, Clone)]
pub struct TpiParams {
    /// Window side length in cells (3 → 3x3, 31 → 31x31, ...)
    pub size: WindowSize,
    /// Use a circular window instead of a square one
    pub circular: bool,
    pub edge: EdgeMode,
}

impl TpiParams {
    /// Square window of `size` cells, no-data at the edges
    pub fn new(size: WindowSize) -> Self {
        Self {
            size,
            circular: false,
            edge: EdgeMode::NoData,
        }
    }

    /// Square window reaching `radius` map units on a grid of `cell_size`
    pub fn from_radius(radius: f64, cell_size: f64) -> Result<Self> {
        Ok(Self::new(WindowSize::from_radius(radius, cell_size)?))
    }

    fn window(&self) -> Window {
        Window {
            size: self.size,
            circular: self.circular,
        }
    }
}

/// TPI algorithm
#[derive(Debug, Clone, Default)]
pub struct Tpi;

impl Algorithm for Tpi {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = TpiParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "TPI"
    }

    fn description(&self) -> &'static str {
        "Topographic Position Index: elevation relative to window mean"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        tpi(&input, &params)
    }
}

/// Calculate Topographic Position Index
///
/// # Arguments
/// * `dem` - Input DEM raster
/// * `params` - Window size, shape and edge handling
///
/// # Returns
/// Raster with TPI values (same units as input elevation). No-data where the
/// center is no-data, and where the window leaves the grid under
/// [`EdgeMode::NoData`].
pub fn tpi(dem: &Raster<f64>, params: &TpiParams) -> Result<Raster<f64>> {
    if dem.valid_count() == 0 {
        return Err(Error::missing("elevation", "grid holds no valid cells"));
    }

    let (rows, cols) = dem.shape();
    let half = params.size.half();
    let offsets = params.window().offsets();

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];

            for (col, out) in row_data.iter_mut().enumerate() {
                if !params.edge.admits(row, col, half, rows, cols) {
                    continue;
                }
                let center = unsafe { dem.value_unchecked(row, col) };
                if center.is_nan() {
                    continue;
                }

                // Summing deviations from the center keeps flat windows at
                // exactly zero
                let mut deviation = 0.0;
                let mut count = 0u32;
                for &(dr, dc) in &offsets {
                    let nr = row as isize + dr;
                    let nc = col as isize + dc;
                    if nr < 0 || nc < 0 || nr as usize >= rows || nc as usize >= cols {
                        continue;
                    }
                    let nv = unsafe { dem.value_unchecked(nr as usize, nc as usize) };
                    if !nv.is_nan() {
                        deviation += nv - center;
                        count += 1;
                    }
                }

                *out = (0.0 - deviation) / count as f64;
            }

            row_data
        })
        .collect();

    dem.derive(output_data, Some(f64::NAN))
}

/// Compute TPI of workspace layer `input` and store it as `output`.
///
/// Nothing else is added to the workspace.
pub fn relief_index(ws: &mut Workspace, input: &str, output: &str, params: &TpiParams) -> Result<()> {
    let dem = ws.raster(input)?;
    info!(
        "Relief index {} -> {} (window {}{})",
        input,
        output,
        params.size.get(),
        if params.circular { ", circular" } else { "" }
    );
    let result = tpi(dem, params)?;
    ws.insert(output, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rengis_core::{GeoTransform, Region};

    fn size(n: i64) -> WindowSize {
        WindowSize::new(n).unwrap()
    }

    #[test]
    fn test_tpi_flat_surface_is_exactly_zero() {
        let mut dem = Raster::filled(10, 10, 347.3);
        dem.set_transform(GeoTransform::new(0.0, 10.0, 1.0, -1.0));

        let result = tpi(&dem, &TpiParams::new(size(5))).unwrap();
        for row in 2..8 {
            for col in 2..8 {
                assert_eq!(result.get(row, col).unwrap(), 0.0);
            }
        }
    }

    #[test]
    fn test_tpi_peak() {
        // Center peak: 100 surrounded by 50
        let mut dem = Raster::filled(5, 5, 50.0);
        dem.set_transform(GeoTransform::new(0.0, 5.0, 1.0, -1.0));
        dem.set(2, 2, 100.0).unwrap();

        let result = tpi(&dem, &TpiParams::new(size(3))).unwrap();
        // window mean = (8 * 50 + 100) / 9
        assert_relative_eq!(result.get(2, 2).unwrap(), 100.0 - 500.0 / 9.0, epsilon = 1e-10);
        // neighbor sees the peak in its window
        assert_relative_eq!(result.get(1, 1).unwrap(), 50.0 - 500.0 / 9.0, epsilon = 1e-10);
    }

    #[test]
    fn test_tpi_valley() {
        let mut dem = Raster::filled(5, 5, 50.0);
        dem.set_transform(GeoTransform::new(0.0, 5.0, 1.0, -1.0));
        dem.set(2, 2, 10.0).unwrap();

        let result = tpi(&dem, &TpiParams::new(size(3))).unwrap();
        assert_relative_eq!(result.get(2, 2).unwrap(), 10.0 - 410.0 / 9.0, epsilon = 1e-10);
    }

    #[test]
    fn test_tpi_edges_are_nodata() {
        let dem = Raster::filled(7, 7, 1.0);
        let result = tpi(&dem, &TpiParams::new(size(5))).unwrap();
        assert!(result.get(1, 3).unwrap().is_nan());
        assert!(result.get(3, 5).unwrap().is_nan());
        assert_eq!(result.get(2, 2).unwrap(), 0.0);
        assert_eq!(result.valid_count(), 9);
    }

    #[test]
    fn test_tpi_partial_edges() {
        let mut dem = Raster::filled(3, 3, 0.0);
        dem.set(0, 0, 4.0).unwrap();
        let params = TpiParams {
            edge: EdgeMode::Partial,
            ..TpiParams::new(size(3))
        };
        let result = tpi(&dem, &params).unwrap();
        // corner window holds 4 cells: 4, 0, 0, 0
        assert_relative_eq!(result.get(0, 0).unwrap(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_tpi_skips_nodata() {
        let mut dem = Raster::filled(3, 3, 10.0);
        dem.set(0, 0, f64::NAN).unwrap();
        dem.set(2, 2, 18.0).unwrap();
        let result = tpi(&dem, &TpiParams::new(size(3))).unwrap();
        // mean over 8 valid cells = (7 * 10 + 18) / 8 = 11
        assert_relative_eq!(result.get(1, 1).unwrap(), -1.0, epsilon = 1e-12);

        dem.set(1, 1, f64::NAN).unwrap();
        let result = tpi(&dem, &TpiParams::new(size(3))).unwrap();
        assert!(result.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_tpi_circular_window() {
        let mut dem = Raster::filled(5, 5, 0.0);
        dem.set(0, 0, 90.0).unwrap();
        let params = TpiParams {
            circular: true,
            ..TpiParams::new(size(5))
        };
        let result = tpi(&dem, &params).unwrap();
        // corner is outside the radius-2 circle
        assert_eq!(result.get(2, 2).unwrap(), 0.0);
    }

    #[test]
    fn test_tpi_deterministic() {
        let data: Vec<f64> = (0..400)
            .map(|i| ((i as f64) * 0.37).sin() * 120.0 + (i % 17) as f64)
            .collect();
        let dem = Raster::from_vec(data, 20, 20).unwrap();
        let params = TpiParams::new(size(7));

        let a = tpi(&dem, &params).unwrap();
        let b = tpi(&dem, &params).unwrap();
        for (x, y) in a.data().iter().zip(b.data().iter()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn test_tpi_all_nodata_is_missing_input() {
        let dem = Raster::filled(4, 4, f64::NAN);
        assert!(matches!(
            tpi(&dem, &TpiParams::new(size(3))),
            Err(Error::MissingInput { .. })
        ));
    }

    #[test]
    fn test_relief_index_stores_only_output() {
        let mut dem = Raster::filled(5, 5, 50.0);
        dem.set_transform(GeoTransform::new(0.0, 50.0, 10.0, -10.0));
        let mut ws = Workspace::new(Region::from_raster(&dem));
        ws.insert("dem_10m", dem).unwrap();

        let params = TpiParams::from_radius(10.0, 10.0).unwrap();
        relief_index(&mut ws, "dem_10m", "tpi_10m", &params).unwrap();

        assert_eq!(ws.names().collect::<Vec<_>>(), vec!["dem_10m", "tpi_10m"]);
        assert!(matches!(
            relief_index(&mut ws, "missing", "out", &params),
            Err(Error::MissingInput { .. })
        ));
    }
}
