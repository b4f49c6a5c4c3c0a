//! Terrain analysis algorithms
//!
//! Algorithms for analyzing Digital Elevation Models (DEMs):
//! - TPI: Topographic Position Index at any odd window size
//! - Slope and aspect: Horn 3x3 derivatives
//! - Viewshed: cumulative visibility from observer points

mod aspect;
mod slope;
mod tpi;
mod viewshed;

pub use aspect::{aspect, slope_aspect, Aspect, AspectConvention, AspectOutput, AspectParams};
pub use slope::{slope, Slope, SlopeParams, SlopeUnits};
pub use tpi::{relief_index, tpi, Tpi, TpiParams};
pub use viewshed::{
    any_visible, binary_visibility, cumulative_viewshed, Observer, ViewshedParams,
};
