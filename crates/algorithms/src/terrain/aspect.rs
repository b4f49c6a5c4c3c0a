//! Aspect calculation from DEMs
//!
//! Calculates the direction the slope faces (steepest descent) using the
//! Horn (1981) gradient shared with [`slope`](super::slope()).

use super::slope::{horn_gradient, slope, SlopeParams};
use crate::maybe_rayon::*;
use rengis_core::raster::Raster;
use rengis_core::{Algorithm, Error, Result, Workspace};
use tracing::info;

/// Gradients below this on both axes are flat
const FLAT_THRESHOLD: f64 = 1e-10;

/// Angle convention for [`AspectOutput::Degrees`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectConvention {
    /// Clockwise from north: 0 = North, 90 = East, 180 = South, 270 = West.
    /// Flat cells are no-data.
    #[default]
    Compass,
    /// Counter-clockwise from east: 90 = North, 180 = West, 270 = South,
    /// 360 = East. Flat cells are 0.
    Grass,
}

impl AspectConvention {
    /// Express a compass bearing in this convention
    pub fn from_compass(self, bearing: f64) -> f64 {
        match self {
            Self::Compass => bearing,
            Self::Grass => {
                let ccw = (450.0 - bearing) % 360.0;
                if ccw == 0.0 { 360.0 } else { ccw }
            }
        }
    }

    fn flat(self) -> f64 {
        match self {
            Self::Compass => f64::NAN,
            Self::Grass => 0.0,
        }
    }
}

/// Output format for aspect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectOutput {
    /// Angle in degrees, in the chosen [`AspectConvention`]
    #[default]
    Degrees,
    /// Four directions: 1 = N, 2 = E, 3 = S, 4 = W (90° sectors centered
    /// on each direction). Flat cells are no-data.
    Cardinal,
    /// Eight directions, 1 = N clockwise to 8 = NW. Flat cells are no-data.
    Octant,
}

/// Parameters for aspect calculation
#[derive(Debug, Clone, Copy, Default)]
pub struct AspectParams {
    pub convention: AspectConvention,
    pub output: AspectOutput,
    /// Estimate cells on the grid edge and next to no-data
    pub edges: bool,
}

/// Aspect algorithm
#[derive(Debug, Clone, Default)]
pub struct Aspect;

impl Algorithm for Aspect {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = AspectParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Aspect"
    }

    fn description(&self) -> &'static str {
        "Calculate aspect (direction of steepest descent) from a DEM"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        aspect(&input, &params)
    }
}

/// Calculate aspect from a DEM
///
/// The returned raster uses NaN as no-data. Cells without a defined gradient
/// are no-data; flat cells follow the convention (see [`AspectConvention`]).
pub fn aspect(dem: &Raster<f64>, params: &AspectParams) -> Result<Raster<f64>> {
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

                if dz_dx.abs() < FLAT_THRESHOLD && dz_dy.abs() < FLAT_THRESHOLD {
                    if params.output == AspectOutput::Degrees {
                        *out = params.convention.flat();
                    }
                    continue;
                }

                // Descent direction: east = -dz/dx, north = +dz/dy because
                // dz/dy is taken towards the south
                let mut bearing = (-dz_dx).atan2(dz_dy).to_degrees();
                if bearing < 0.0 {
                    bearing += 360.0;
                }
                if bearing >= 360.0 {
                    bearing = 0.0;
                }

                *out = match params.output {
                    AspectOutput::Degrees => params.convention.from_compass(bearing),
                    AspectOutput::Cardinal => sector(bearing, 4),
                    AspectOutput::Octant => sector(bearing, 8),
                };
            }

            row_data
        })
        .collect();

    dem.derive(output_data, Some(f64::NAN))
}

/// Compute slope and/or aspect of workspace layer `input`.
///
/// Both grids are computed before either is stored, so a failure leaves the
/// workspace unchanged.
pub fn slope_aspect(
    ws: &mut Workspace,
    input: &str,
    slope_output: Option<(&str, &SlopeParams)>,
    aspect_output: Option<(&str, &AspectParams)>,
) -> Result<()> {
    if slope_output.is_none() && aspect_output.is_none() {
        return Err(Error::InvalidParameter {
            name: "output",
            value: input.to_string(),
            reason: "neither slope nor aspect requested".into(),
        });
    }
    for name in [slope_output.map(|(n, _)| n), aspect_output.map(|(n, _)| n)]
        .into_iter()
        .flatten()
    {
        if !ws.overwrite && ws.contains(name) {
            return Err(Error::OutputExists(name.to_string()));
        }
    }

    let dem = ws.raster(input)?;
    info!("Slope/aspect of {}", input);
    let slope_grid = slope_output
        .map(|(name, params)| slope(dem, params).map(|g| (name, g)))
        .transpose()?;
    let aspect_grid = aspect_output
        .map(|(name, params)| aspect(dem, params).map(|g| (name, g)))
        .transpose()?;

    for (name, grid) in slope_grid.into_iter().chain(aspect_grid) {
        ws.insert(name, grid)?;
    }
    Ok(())
}

/// 1-based sector of `bearing` among `n` sectors centered on north,
/// numbered clockwise
fn sector(bearing: f64, n: u32) -> f64 {
    let width = 360.0 / n as f64;
    let index = ((bearing + width / 2.0) / width).floor() as u32 % n;
    (index + 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rengis_core::GeoTransform;

    fn plane(f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
        let mut dem = Raster::new(10, 10);
        dem.set_transform(GeoTransform::new(0.0, 100.0, 10.0, -10.0));
        for row in 0..10 {
            for col in 0..10 {
                dem.set(row, col, f(row, col)).unwrap();
            }
        }
        dem
    }

    fn degrees(convention: AspectConvention) -> AspectParams {
        AspectParams {
            convention,
            ..Default::default()
        }
    }

    #[test]
    fn test_aspect_north_slope() {
        // Higher in the south, so the slope faces north
        let dem = plane(|row, _| row as f64);
        let compass = aspect(&dem, &degrees(AspectConvention::Compass)).unwrap();
        let grass = aspect(&dem, &degrees(AspectConvention::Grass)).unwrap();
        assert_relative_eq!(compass.get(5, 5).unwrap(), 0.0, epsilon = 1e-10);
        assert_relative_eq!(grass.get(5, 5).unwrap(), 90.0, epsilon = 1e-10);
    }

    #[test]
    fn test_aspect_east_slope() {
        // Higher in the west, so the slope faces east
        let dem = plane(|_, col| -(col as f64));
        let compass = aspect(&dem, &degrees(AspectConvention::Compass)).unwrap();
        let grass = aspect(&dem, &degrees(AspectConvention::Grass)).unwrap();
        assert_relative_eq!(compass.get(5, 5).unwrap(), 90.0, epsilon = 1e-10);
        assert_relative_eq!(grass.get(5, 5).unwrap(), 360.0, epsilon = 1e-10);
    }

    #[test]
    fn test_aspect_south_west_slopes() {
        let south = plane(|row, _| -(row as f64));
        let west = plane(|_, col| col as f64);
        let grass = degrees(AspectConvention::Grass);
        assert_relative_eq!(aspect(&south, &grass).unwrap().get(5, 5).unwrap(), 270.0, epsilon = 1e-10);
        assert_relative_eq!(aspect(&west, &grass).unwrap().get(5, 5).unwrap(), 180.0, epsilon = 1e-10);
        assert_relative_eq!(
            aspect(&west, &AspectParams::default()).unwrap().get(5, 5).unwrap(),
            270.0,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_aspect_diagonal() {
        // Falls towards the north-east
        let dem = plane(|row, col| row as f64 - col as f64);
        let result = aspect(&dem, &AspectParams::default()).unwrap();
        assert_relative_eq!(result.get(4, 4).unwrap(), 45.0, epsilon = 1e-10);
    }

    #[test]
    fn test_aspect_flat() {
        let dem = plane(|_, _| 100.0);
        let compass = aspect(&dem, &degrees(AspectConvention::Compass)).unwrap();
        let grass = aspect(&dem, &degrees(AspectConvention::Grass)).unwrap();
        assert!(compass.get(5, 5).unwrap().is_nan());
        assert_eq!(grass.get(5, 5).unwrap(), 0.0);

        let classes = AspectParams {
            convention: AspectConvention::Grass,
            output: AspectOutput::Cardinal,
            ..Default::default()
        };
        assert!(aspect(&dem, &classes).unwrap().get(5, 5).unwrap().is_nan());
    }

    #[test]
    fn test_aspect_cardinal_classes() {
        let cardinal = AspectParams {
            output: AspectOutput::Cardinal,
            ..Default::default()
        };
        let north = plane(|row, _| row as f64);
        let east = plane(|_, col| -(col as f64));
        let south = plane(|row, _| -(row as f64));
        let west = plane(|_, col| col as f64);
        for (dem, class) in [(north, 1.0), (east, 2.0), (south, 3.0), (west, 4.0)] {
            assert_eq!(aspect(&dem, &cardinal).unwrap().get(5, 5).unwrap(), class);
        }
    }

    #[test]
    fn test_sector_boundaries() {
        assert_eq!(sector(0.0, 4), 1.0);
        assert_eq!(sector(44.9, 4), 1.0);
        assert_eq!(sector(45.0, 4), 2.0);
        assert_eq!(sector(315.0, 4), 1.0);
        assert_eq!(sector(314.9, 4), 4.0);
        assert_eq!(sector(22.5, 8), 2.0);
        assert_eq!(sector(337.4, 8), 8.0);
    }

    #[test]
    fn test_slope_aspect_stores_requested_layers() {
        let mut ws = Workspace::new(rengis_core::Region::from_raster(&plane(|_, _| 0.0)));
        ws.insert("dem", plane(|row, _| row as f64)).unwrap();

        let grass = degrees(AspectConvention::Grass);
        slope_aspect(
            &mut ws,
            "dem",
            Some(("dem_slope", &SlopeParams::default())),
            Some(("dem_aspect", &grass)),
        )
        .unwrap();
        assert_relative_eq!(ws.raster("dem_aspect").unwrap().get(5, 5).unwrap(), 90.0, epsilon = 1e-10);
        assert!(ws.raster("dem_slope").unwrap().get(5, 5).unwrap() > 0.0);

        // Taken names fail before anything is written
        let err = slope_aspect(&mut ws, "dem", None, Some(("dem_aspect", &grass))).unwrap_err();
        assert!(matches!(err, Error::OutputExists(_)));
        assert!(matches!(
            slope_aspect(&mut ws, "dem", None, None),
            Err(Error::InvalidParameter { .. })
        ));
        assert_eq!(ws.len(), 3);
    }

    #[test]
    fn test_aspect_edges_are_nodata() {
        let dem = plane(|row, _| row as f64);
        let result = aspect(&dem, &AspectParams::default()).unwrap();
        assert!(result.get(0, 5).unwrap().is_nan());

        let estimated = aspect(
            &dem,
            &AspectParams {
                edges: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_relative_eq!(estimated.get(0, 5).unwrap(), 0.0, epsilon = 1e-10);
    }
}
