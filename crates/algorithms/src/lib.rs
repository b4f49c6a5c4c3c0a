//! # rengis algorithms
//!
//! Raster algorithms for preparing habitat-model layers.
//!
//! ## Available Algorithm Categories
//!
//! - **terrain**: Topographic Position Index, slope, aspect, cumulative viewshed
//! - **statistics**: Focal statistics, resampling
//! - **distance**: Euclidean distance transform
//! - **reclass**: Rule-table reclassification
//! - **compositor**: Staged overwrites, cut, patch, area reports, batch runner

mod maybe_rayon;

pub mod compositor;
pub mod distance;
pub mod reclass;
pub mod statistics;
pub mod terrain;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::compositor::{
        apply_stages, composite, cut, patch, run_batch, AreaReport, BatchSummary, Comparison,
        Composite, LayerDescriptor, Predicate, RuleStage, Treatment,
    };
    pub use crate::distance::{distance_to_features, euclidean_distance, DistanceParams};
    pub use crate::reclass::{reclassify, ReclassTable};
    pub use crate::statistics::{focal_statistics, resample, EdgeMode, FocalParams, FocalStatistic, ResampleMethod};
    pub use crate::terrain::{
        any_visible, aspect, binary_visibility, cumulative_viewshed, relief_index, slope,
        slope_aspect, tpi, AspectConvention, AspectOutput, AspectParams, Observer, SlopeParams,
        SlopeUnits, Tpi, TpiParams, ViewshedParams,
    };
    pub use rengis_core::prelude::*;
}
