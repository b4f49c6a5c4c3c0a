//! Statistical operations on raster data
//!
//! - **focal**: Moving window (focal) statistics
//! - **resample**: Nearest and area-weighted resampling onto a region

pub mod focal;
pub mod resample;

pub use focal::{focal_statistics, EdgeMode, FocalParams, FocalStatistic};
pub use resample::{resample, ResampleMethod};
