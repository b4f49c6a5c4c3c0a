//! Raster data structures and operations

mod category;
mod element;
mod geotransform;
mod grid;
mod neighborhood;
mod region;

pub use category::{Category, CategoryTable, ColorTable, Rgb};
pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
pub use neighborhood::{Window, WindowSize};
pub use region::Region;
