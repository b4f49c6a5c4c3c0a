//! Processing region: the explicit extent, resolution and CRS that
//! operations are evaluated against.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crs::{crs_compatible, CRS};
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};

/// A north-up computational region.
///
/// Bounds always fall on cell edges, so `rows * ns_res == north - south`
/// and `cols * ew_res == east - west`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    /// North-south cell size (positive)
    pub ns_res: f64,
    /// East-west cell size (positive)
    pub ew_res: f64,
    #[serde(default)]
    pub crs: Option<CRS>,
}

impl Region {
    /// Region covering exactly the cells of a raster
    pub fn from_raster<T: RasterElement>(raster: &Raster<T>) -> Self {
        let (west, south, east, north) = raster.bounds();
        let (ew_res, ns_res) = raster.transform().resolution();
        Self {
            north,
            south,
            east,
            west,
            ns_res,
            ew_res,
            crs: raster.crs().cloned(),
        }
    }

    /// Region covering `(west, south, east, north)`, grown outward to the
    /// grid lines of `reference` and using its resolution and CRS.
    pub fn aligned<T: RasterElement>(
        bounds: (f64, f64, f64, f64),
        reference: &Raster<T>,
    ) -> Result<Self> {
        let (west, south, east, north) = bounds;
        if !(west < east && south < north) {
            return Err(Error::InvalidParameter {
                name: "bounds",
                value: format!("{:?}", bounds),
                reason: "expected west < east and south < north".into(),
            });
        }

        let gt = reference.transform();
        if !gt.is_north_up() {
            return Err(Error::Algorithm(
                "alignment requires a north-up reference grid".into(),
            ));
        }
        let (ew_res, ns_res) = gt.resolution();
        let ox = gt.origin_x;
        let oy = gt.origin_y;

        // Tolerance keeps bounds that already sit on a grid line in place
        let eps = 1e-9;
        let row_north = (oy - north) / ns_res;
        let row_south = (oy - south) / ns_res;

        Ok(Self {
            west: ox + ((west - ox) / ew_res + eps).floor() * ew_res,
            east: ox + ((east - ox) / ew_res - eps).ceil() * ew_res,
            north: oy - (row_north + eps).floor() * ns_res,
            south: oy - (row_south - eps).ceil() * ns_res,
            ns_res,
            ew_res,
            crs: reference.crs().cloned(),
        })
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        ((self.north - self.south) / self.ns_res).round().max(0.0) as usize
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        ((self.east - self.west) / self.ew_res).round().max(0.0) as usize
    }

    /// Area of one cell in square map units
    pub fn cell_area(&self) -> f64 {
        self.ns_res * self.ew_res
    }

    /// Geotransform of the region's upper-left corner
    pub fn transform(&self) -> GeoTransform {
        GeoTransform::new(self.west, self.north, self.ew_res, -self.ns_res)
    }

    /// Region CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Fail with [`Error::GridMismatch`] unless `raster` covers exactly this region
    pub fn ensure_matches<T: RasterElement>(&self, raster: &Raster<T>, name: &str) -> Result<()> {
        let mismatch = |reason: String| Error::GridMismatch {
            left: "region".into(),
            right: name.to_string(),
            reason,
        };
        if (self.rows(), self.cols()) != raster.shape() {
            return Err(mismatch(format!(
                "shape {}x{} vs {}x{}",
                self.rows(),
                self.cols(),
                raster.rows(),
                raster.cols()
            )));
        }
        if let Some(diff) = self.transform().difference(raster.transform()) {
            return Err(mismatch(diff));
        }
        if !crs_compatible(self.crs(), raster.crs()) {
            let id = |c: Option<&CRS>| c.map_or("none".to_string(), CRS::identifier);
            return Err(mismatch(format!("CRS {} vs {}", id(self.crs()), id(raster.crs()))));
        }
        Ok(())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} s={} e={} w={} nsres={} ewres={} rows={} cols={}",
            self.north,
            self.south,
            self.east,
            self.west,
            self.ns_res,
            self.ew_res,
            self.rows(),
            self.cols()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> Raster<f64> {
        let mut r = Raster::filled(100, 100, 0.0);
        r.set_transform(GeoTransform::new(0.0, 1000.0, 10.0, -10.0));
        r
    }

    #[test]
    fn test_region_from_raster() {
        let region = Region::from_raster(&reference());
        assert_eq!(region.rows(), 100);
        assert_eq!(region.cols(), 100);
        assert_eq!(region.north, 1000.0);
        assert_eq!(region.south, 0.0);
    }

    #[test]
    fn test_aligned_grows_to_grid_lines() {
        let region = Region::aligned((12.0, 103.0, 47.0, 188.0), &reference()).unwrap();
        assert_eq!(region.west, 10.0);
        assert_eq!(region.east, 50.0);
        assert_eq!(region.south, 100.0);
        assert_eq!(region.north, 190.0);
        assert_eq!(region.cols(), 4);
        assert_eq!(region.rows(), 9);
    }

    #[test]
    fn test_aligned_keeps_exact_bounds() {
        let region = Region::aligned((20.0, 100.0, 60.0, 200.0), &reference()).unwrap();
        assert_eq!(region.west, 20.0);
        assert_eq!(region.east, 60.0);
        assert_eq!(region.south, 100.0);
        assert_eq!(region.north, 200.0);
    }

    #[test]
    fn test_region_matches_own_raster() {
        let raster = reference();
        let region = Region::from_raster(&raster);
        assert!(region.ensure_matches(&raster, "dem").is_ok());
    }

    #[test]
    fn test_region_mismatch_names_layer() {
        let raster = reference();
        let region = Region::aligned((20.0, 100.0, 60.0, 200.0), &raster).unwrap();
        match region.ensure_matches(&raster, "dem") {
            Err(Error::GridMismatch { left, right, reason }) => {
                assert_eq!(left, "region");
                assert_eq!(right, "dem");
                assert!(reason.starts_with("shape"), "{reason}");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let mut reprojected = raster.clone();
        reprojected.set_crs(Some(CRS::from_epsg(4326)));
        let mut region = Region::from_raster(&raster);
        region.crs = Some(CRS::sweref99_tm());
        assert!(region.ensure_matches(&reprojected, "dem").is_err());
    }
}
