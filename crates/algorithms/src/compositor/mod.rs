//! Categorical layer compositing
//!
//! - **rules**: stage predicates and their JSON form
//! - **stages**: staged-overwrite reclassification and layer annotation
//! - **cut**: bringing aligned layers into the region
//! - **patch**: first-non-no-data merge
//! - **report**: per-class area tables
//! - **batch**: ordered per-layer preparation with log-and-continue

mod batch;
mod cut;
mod patch;
mod report;
mod rules;
mod stages;

pub use batch::{run_batch, BatchSummary, LayerDescriptor, LayerFailure, LayerOutcome, Treatment};
pub use cut::cut;
pub use patch::patch;
pub use report::{AreaReport, AreaRow};
pub use rules::{Comparison, Predicate, RuleStage};
pub use stages::{apply_stages, composite, composite_raster, Composite};
