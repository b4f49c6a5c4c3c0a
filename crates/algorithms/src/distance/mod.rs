//! Distance-to-feature analysis
//!
//! - **euclidean**: exact Euclidean distance transform with nearest-feature values

mod euclidean;

pub use euclidean::{euclidean_distance, DistanceMetric, DistanceParams, DistanceResult};

use rengis_core::{Result, Workspace};
use tracing::info;

/// Distance from every cell to the nearest feature of workspace layer
/// `input`, stored as `output`. The nearest-feature value grid is stored as
/// `value_output` when given.
pub fn distance_to_features(
    ws: &mut Workspace,
    input: &str,
    output: &str,
    value_output: Option<&str>,
    params: &DistanceParams,
) -> Result<()> {
    let features = ws.raster(input)?;
    info!("Distance to features of {} -> {}", input, output);
    let result = euclidean_distance(features, params)?;

    ws.insert(output, result.distance)?;
    if let Some(name) = value_output {
        ws.insert(name, result.value)?;
    }
    Ok(())
}
