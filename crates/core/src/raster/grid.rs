//! Main Raster type

use crate::crs::{CRS, crs_compatible};
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement, Region};
use ndarray::{Array2, ArrayView2};

/// A georeferenced 2D raster grid.
///
/// `Raster<T>` stores values of type `T` in a 2D grid with associated
/// geographic metadata (transform and CRS). Grids are never combined unless
/// [`Raster::grid_difference`] reports them identical.
///
/// # Example
///
/// ```ignore
/// use rengis_core::Raster;
///
/// let mut raster: Raster<f64> = Raster::filled(3, 3, 41.0);
/// raster.set(1, 1, 42.0)?;
/// assert_eq!(raster.get(1, 1)?, 42.0);
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    /// Raster data stored in row-major order (row, col)
    data: Array2<T>,
    /// Affine transformation
    transform: GeoTransform,
    /// Coordinate reference system
    crs: Option<CRS>,
    /// No-data value
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Create an empty raster covering a region, filled with `value`
    pub fn for_region(region: &Region, value: T) -> Self {
        let mut raster = Self::filled(region.rows(), region.cols(), value);
        raster.transform = region.transform();
        raster.crs = region.crs().cloned();
        raster
    }

    /// Create a raster with the same georeferencing but a different data type
    pub fn with_same_meta<U: RasterElement>(&self, rows: usize, cols: usize) -> Raster<U> {
        Raster {
            data: Array2::zeros((rows, cols)),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        }
    }

    /// Create a raster with the same georeferencing and the given row-major data.
    ///
    /// Used by the per-row kernels that collect their output into a `Vec`.
    pub fn derive<U: RasterElement>(&self, data: Vec<U>, nodata: Option<U>) -> Result<Raster<U>> {
        let (rows, cols) = self.shape();
        let mut output = self.with_same_meta::<U>(rows, cols);
        output.data = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        output.nodata = nodata;
        Ok(output)
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Get value at (row, col) without bounds checking
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    pub unsafe fn get_unchecked(&self, row: usize, col: usize) -> T {
        unsafe { *self.data.uget((row, col)) }
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Get a view of the underlying data
    pub fn view(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Get the no-data value
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Set the no-data value
    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// The region (extent, resolution, CRS) this raster covers
    pub fn region(&self) -> Region {
        Region::from_raster(self)
    }

    /// Convert pixel coordinates to geographic coordinates of the cell center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    /// Convert geographic coordinates to fractional pixel coordinates
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        self.transform.geo_to_pixel(x, y)
    }

    // Grid identity

    /// Describe how `other`'s grid differs from this one (shape, transform,
    /// CRS), or `None` when both grids can be combined cell by cell.
    pub fn grid_difference<U: RasterElement>(&self, other: &Raster<U>) -> Option<String> {
        if self.shape() != other.shape() {
            return Some(format!(
                "shape {}x{} vs {}x{}",
                self.rows(),
                self.cols(),
                other.rows(),
                other.cols()
            ));
        }
        if let Some(diff) = self.transform.difference(&other.transform) {
            return Some(diff);
        }
        if !crs_compatible(self.crs(), other.crs()) {
            let name = |c: Option<&CRS>| c.map_or("none".to_string(), CRS::identifier);
            return Some(format!("CRS {} vs {}", name(self.crs()), name(other.crs())));
        }
        None
    }

    /// Fail with [`Error::GridMismatch`] unless both grids are identical in
    /// extent, resolution and CRS. Names are used for the error message only.
    pub fn ensure_same_grid<U: RasterElement>(
        &self,
        name: &str,
        other: &Raster<U>,
        other_name: &str,
    ) -> Result<()> {
        match self.grid_difference(other) {
            None => Ok(()),
            Some(reason) => Err(Error::GridMismatch {
                left: name.to_string(),
                right: other_name.to_string(),
                reason,
            }),
        }
    }

    // Value checks

    /// Check if a value is no-data
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Number of cells holding valid data
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| !self.is_nodata(v)).count()
    }

    // Statistics

    /// Calculate basic statistics (min, max, mean, count of valid cells)
    pub fn statistics(&self) -> RasterStatistics<T> {
        let mut min: Option<T> = None;
        let mut max: Option<T> = None;
        let mut sum: f64 = 0.0;
        let mut count: usize = 0;

        for &value in self.data.iter() {
            if self.is_nodata(value) {
                continue;
            }

            if min.is_none_or(|m| value < m) {
                min = Some(value);
            }
            if max.is_none_or(|m| value > m) {
                max = Some(value);
            }

            if let Some(v) = value.to_f64() {
                sum += v;
                count += 1;
            }
        }

        RasterStatistics {
            min,
            max,
            mean: (count > 0).then(|| sum / count as f64),
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }

    /// Convert to an `f64` grid with NaN as the only no-data marker
    pub fn to_f64_grid(&self) -> Raster<f64> {
        let data: Vec<f64> = self
            .data
            .iter()
            .map(|&v| {
                if self.is_nodata(v) {
                    f64::NAN
                } else {
                    v.to_f64().unwrap_or(f64::NAN)
                }
            })
            .collect();
        let mut out = self.with_same_meta::<f64>(self.rows(), self.cols());
        out.data = Array2::from_shape_vec(self.shape(), data)
            .unwrap_or_else(|_| Array2::from_elem(self.shape(), f64::NAN));
        out.nodata = Some(f64::NAN);
        out
    }
}

impl Raster<f64> {
    /// Cell value with any no-data sentinel mapped to NaN
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    pub unsafe fn value_unchecked(&self, row: usize, col: usize) -> f64 {
        let v = unsafe { self.get_unchecked(row, col) };
        if self.is_nodata(v) { f64::NAN } else { v }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone)]
pub struct RasterStatistics<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}
