//! Reclassification of categorical rasters
//!
//! - **table**: `r.reclass` style rule tables (first matching rule wins)

mod table;

pub use table::{reclassify, ReclassInput, ReclassRule, ReclassTable};
