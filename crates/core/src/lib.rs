//! # rengis core
//!
//! Core types and I/O for preparing habitat-model raster layers.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced grid with no-data handling and grid-identity checks
//! - `Region`: explicit processing extent and resolution
//! - `CategoryTable` / `ColorTable`: class labels and display colors
//! - `Workspace`: named layers, replacing an ambient GIS mapset
//! - Native GeoTIFF I/O

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod workspace;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{
    CategoryTable, ColorTable, GeoTransform, Raster, RasterElement, Region, Rgb, Window,
    WindowSize,
};
pub use workspace::{GridSource, Layer, Workspace};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::Algorithm;
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement, Region, WindowSize};
    pub use crate::workspace::Workspace;
}

/// Core trait for the raster algorithms.
///
/// Algorithms are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(
        &self,
        input: Self::Input,
        params: Self::Params,
    ) -> std::result::Result<Self::Output, Self::Error>;
}
