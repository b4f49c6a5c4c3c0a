//! Per-layer batch preparation
//!
//! Each [`LayerDescriptor`] names a source layer, its output name and the
//! treatment it gets. Layers run in order against one workspace. A failing
//! layer is logged and skipped, and the batch carries on.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::cut::cut;
use super::patch::patch;
use super::report::AreaReport;
use super::stages::{annotate, composite_raster, Composite};
use crate::distance::{euclidean_distance, DistanceParams};
use crate::statistics::{resample, ResampleMethod};
use rengis_core::raster::Raster;
use rengis_core::workspace::TEMP_PREFIX;
use rengis_core::{Error, GridSource, Result, Workspace};

/// What happens to a layer once it is on the region grid
#[derive(Debug, Clone)]
pub enum Treatment {
    /// Store as is
    Cut,
    /// Distance to the layer's non-no-data cells
    Distance(DistanceParams),
    /// Table reclass and staged overwrites
    Reclassify(Box<Composite>),
    /// Fill the layer's no-data cells from another layer
    MergeFallback { fallback: String },
}

/// One layer of a batch
#[derive(Debug, Clone)]
pub struct LayerDescriptor {
    /// Workspace layer to read
    pub source: String,
    /// Name of the result layer
    pub output: String,
    /// Resample onto the region instead of cutting
    pub resample: Option<ResampleMethod>,
    pub treatment: Treatment,
}

impl LayerDescriptor {
    pub fn new(source: impl Into<String>, output: impl Into<String>, treatment: Treatment) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            resample: None,
            treatment,
        }
    }

    pub fn with_resample(mut self, method: ResampleMethod) -> Self {
        self.resample = Some(method);
        self
    }
}

/// A layer that was produced
#[derive(Debug, Clone)]
pub struct LayerOutcome {
    pub layer: String,
    pub report: Option<AreaReport>,
}

/// A layer that was skipped
#[derive(Debug)]
pub struct LayerFailure {
    pub layer: String,
    pub error: Error,
}

/// Result of [`run_batch`]
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<LayerOutcome>,
    pub failed: Vec<LayerFailure>,
}

impl BatchSummary {
    pub fn failed_names(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.layer.as_str()).collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Workspace grids as seen from the region: layers off the region grid are
/// served cut into it.
struct RegionGrids<'a> {
    ws: &'a Workspace,
    aligned: BTreeMap<String, Raster<f64>>,
}

impl<'a> RegionGrids<'a> {
    fn new<'n>(ws: &'a Workspace, names: impl IntoIterator<Item = &'n str>) -> Result<Self> {
        let region = ws.region();
        let mut aligned = BTreeMap::new();
        for name in names {
            // Missing grids are reported by the stage that uses them
            let Some(grid) = ws.grid(name) else { continue };
            if region.ensure_matches(grid, name).is_err() {
                debug!("cutting {} into the region", name);
                let cut_grid = cut(grid, region, None).map_err(|e| rename_mismatch(e, name))?;
                aligned.insert(name.to_string(), cut_grid);
            }
        }
        Ok(Self { ws, aligned })
    }
}

impl GridSource for RegionGrids<'_> {
    fn grid(&self, name: &str) -> Option<&Raster<f64>> {
        self.aligned.get(name).or_else(|| self.ws.grid(name))
    }
}

fn rename_mismatch(err: Error, name: &str) -> Error {
    match err {
        Error::GridMismatch { left, reason, .. } => Error::GridMismatch {
            left,
            right: name.to_string(),
            reason,
        },
        other => other,
    }
}

/// Bring layer `name` onto the region grid, masked by `mask`.
fn prepare(
    ws: &Workspace,
    name: &str,
    method: Option<ResampleMethod>,
    mask: Option<&Raster<f64>>,
) -> Result<Raster<f64>> {
    let region = ws.region();
    let source = ws.raster(name)?;

    let prepared = match method {
        Some(method) => {
            let resampled = resample(source, region, method)?;
            cut(&resampled, region, mask)
        }
        None => cut(source, region, mask),
    };
    prepared.map_err(|e| rename_mismatch(e, name))
}

/// Mask layer `name` on the region grid, cut into it when needed
fn region_mask(ws: &Workspace, name: &str) -> Result<Raster<f64>> {
    let region = ws.region();
    let mask = ws.raster(name)?;
    if region.ensure_matches(mask, name).is_ok() {
        return Ok(mask.clone());
    }
    debug!("cutting mask {} into the region", name);
    cut(mask, region, None).map_err(|e| rename_mismatch(e, name))
}

/// Per-layer copy of a mask error
fn mask_failure(err: &Error) -> Error {
    match err {
        Error::GridMismatch { left, right, reason } => Error::GridMismatch {
            left: left.clone(),
            right: right.clone(),
            reason: reason.clone(),
        },
        Error::MissingInput { name, reason } => Error::missing(name.as_str(), reason.as_str()),
        other => Error::Algorithm(format!("mask: {}", other)),
    }
}

/// Blank the cells where `mask` is no-data
fn apply_mask(ws: &Workspace, raster: Raster<f64>, mask: Option<&Raster<f64>>) -> Result<Raster<f64>> {
    match mask {
        Some(m) => cut(&raster, ws.region(), Some(m)),
        None => Ok(raster),
    }
}

fn run_layer(ws: &mut Workspace, mask: Option<&Raster<f64>>, layer: &LayerDescriptor) -> Result<LayerOutcome> {
    let prepared = prepare(ws, &layer.source, layer.resample, mask)?;
    let output = layer.output.as_str();

    if let Treatment::Cut = layer.treatment {
        ws.insert(output, prepared)?;
        return Ok(LayerOutcome {
            layer: output.to_string(),
            report: None,
        });
    }

    let temp = Workspace::temp_name(output);
    if ws.remove(&temp).is_some() {
        debug!("removed stale {}", temp);
    }

    let report = ws.with_temporary(&temp, prepared, |ws| match &layer.treatment {
        Treatment::Cut => Ok(None),
        Treatment::Distance(params) => {
            let result = euclidean_distance(ws.raster(&temp)?, params)?;
            let distance = apply_mask(ws, result.distance, mask)?;
            ws.insert(output, distance)?;
            Ok(None)
        }
        Treatment::Reclassify(recipe) => {
            let raster = {
                let names = recipe.stages.iter().flat_map(|s| s.grids());
                let grids = RegionGrids::new(ws, names)?;
                composite_raster(ws.raster(&temp)?, &layer.source, recipe, &grids)?
            };
            // Stages may write into cells the mask blanked
            let raster = apply_mask(ws, raster, mask)?;
            let (annotated, report) = annotate(ws, output, raster, recipe)?;
            ws.insert_layer(output, annotated)?;
            Ok(report)
        }
        Treatment::MergeFallback { fallback } => {
            let filler = prepare(ws, fallback, layer.resample, mask)?;
            let merged = patch(&[ws.raster(&temp)?, &filler])?;
            ws.insert(output, merged)?;
            Ok(None)
        }
    })?;

    Ok(LayerOutcome {
        layer: output.to_string(),
        report,
    })
}

/// Run every layer in order, skipping those that fail.
///
/// Outputs overwrite existing layers of the same name. When `mask` names a
/// layer, cells where it is no-data become no-data in every output. A mask
/// off the region grid is cut into it first; if that fails, every layer
/// fails with the same error. Any `temp_*` layers left in the workspace are
/// removed at the end.
pub fn run_batch(ws: &mut Workspace, mask: Option<&str>, layers: &[LayerDescriptor]) -> BatchSummary {
    let previous_overwrite = ws.overwrite;
    ws.overwrite = true;

    let mask_grid = mask.map(|name| region_mask(&*ws, name)).transpose();
    if let Err(e) = &mask_grid {
        warn!("Mask {} unusable: {}", mask.unwrap_or_default(), e);
    }

    let mut summary = BatchSummary::default();
    for (i, layer) in layers.iter().enumerate() {
        info!(
            "Layer {}/{}: {} -> {}",
            i + 1,
            layers.len(),
            layer.source,
            layer.output
        );
        let result = match &mask_grid {
            Ok(m) => run_layer(ws, m.as_ref(), layer),
            Err(e) => Err(mask_failure(e)),
        };
        match result {
            Ok(outcome) => summary.succeeded.push(outcome),
            Err(error) => {
                warn!("Skipping layer {}: {}", layer.output, error);
                summary.failed.push(LayerFailure {
                    layer: layer.output.clone(),
                    error,
                });
            }
        }
    }

    let removed = ws.remove_where(|name| name.starts_with(TEMP_PREFIX));
    if removed > 0 {
        debug!("removed {} temporary layers", removed);
    }
    ws.overwrite = previous_overwrite;

    info!(
        "Batch finished: {} succeeded, {} failed",
        summary.succeeded.len(),
        summary.failed.len()
    );
    if !summary.failed.is_empty() {
        warn!("Failed layers: {}", summary.failed_names().join(", "));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::rules::{Comparison, Predicate, RuleStage};
    use rengis_core::{GeoTransform, Region};

    fn on_grid(values: Vec<f64>, rows: usize, cols: usize, res: f64) -> Raster<f64> {
        let mut r = Raster::from_vec(values, rows, cols).unwrap();
        r.set_transform(GeoTransform::new(0.0, rows as f64 * res, res, -res));
        r
    }

    fn workspace() -> Workspace {
        let region = Region {
            north: 30.0,
            south: 0.0,
            east: 30.0,
            west: 0.0,
            ns_res: 10.0,
            ew_res: 10.0,
            crs: None,
        };
        Workspace::new(region)
    }

    #[test]
    fn test_batch_continues_after_failure() {
        let mut ws = workspace();
        ws.insert("roads", on_grid(vec![f64::NAN, 1.0, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN], 3, 3, 10.0))
            .unwrap();
        ws.insert("smd_25m", on_grid(vec![1.0; 4], 2, 2, 25.0)).unwrap();
        ws.insert("nmd", on_grid(vec![41.0; 9], 3, 3, 10.0)).unwrap();

        let layers = vec![
            LayerDescriptor::new("roads", "dist_roads", Treatment::Distance(DistanceParams::default())),
            LayerDescriptor::new("smd_25m", "smd", Treatment::Cut),
            LayerDescriptor::new("missing", "nothing", Treatment::Cut),
            LayerDescriptor::new("nmd", "nmd_cut", Treatment::Cut),
        ];
        let summary = run_batch(&mut ws, None, &layers);

        assert_eq!(summary.failed_names(), vec!["smd", "nothing"]);
        assert!(matches!(summary.failed[0].error, Error::GridMismatch { .. }));
        assert!(matches!(summary.failed[1].error, Error::MissingInput { .. }));
        assert_eq!(summary.succeeded.len(), 2);
        assert_eq!(ws.raster("dist_roads").unwrap().get(0, 0).unwrap(), 10.0);
        assert!(ws.contains("nmd_cut"));
        assert!(!ws.names().any(|n| n.starts_with(TEMP_PREFIX)));
        assert!(!ws.overwrite);
    }

    #[test]
    fn test_batch_reclassify_reports_stage() {
        let mut ws = workspace();
        ws.insert("nmd", on_grid(vec![41.0; 9], 3, 3, 10.0)).unwrap();
        let recipe = Composite {
            stages: vec![
                RuleStage::new(Predicate::current(Comparison::Eq(41.0)), 3),
                RuleStage::new(Predicate::not_null("urban"), 51),
            ],
            ..Default::default()
        };
        let layers = [LayerDescriptor::new("nmd", "landcover", Treatment::Reclassify(Box::new(recipe)))];
        let summary = run_batch(&mut ws, None, &layers);
        assert!(matches!(
            summary.failed[0].error,
            Error::RuleReferencesMissingGrid { stage: 2, .. }
        ));
        assert!(!ws.contains("temp_landcover"));
    }

    #[test]
    fn test_batch_cuts_aux_grid_on_the_fly() {
        let mut ws = workspace();
        ws.insert("nmd", on_grid(vec![41.0; 9], 3, 3, 10.0)).unwrap();
        // larger aux grid on the same lines: 4x4 from (0, 40)
        let mut smd = on_grid(vec![0.0; 16], 4, 4, 10.0);
        smd.set(1, 0, 59.0).unwrap();
        ws.insert("smd", smd).unwrap();

        let recipe = Composite {
            stages: vec![RuleStage::new(
                Predicate::current(Comparison::Eq(41.0)).and(Predicate::grid("smd", Comparison::Eq(59.0))),
                201,
            )],
            report: true,
            ..Default::default()
        };
        let layers = [LayerDescriptor::new("nmd", "landcover", Treatment::Reclassify(Box::new(recipe)))];
        let summary = run_batch(&mut ws, None, &layers);

        assert!(summary.is_success(), "{:?}", summary.failed);
        let out = ws.raster("landcover").unwrap();
        // smd row 1 (y 20..30) is region row 0
        assert_eq!(out.get(0, 0).unwrap(), 201.0);
        assert_eq!(out.get(1, 1).unwrap(), 41.0);
        let report = summary.succeeded[0].report.as_ref().unwrap();
        assert_eq!(report.row(201).unwrap().cells, 1);
    }

    #[test]
    fn test_batch_mask_and_fallback() {
        let nan = f64::NAN;
        let mut ws = workspace();
        ws.insert("lichen_local", on_grid(vec![1.0, nan, 1.0, nan, nan, nan, 1.0, 1.0, 1.0], 3, 3, 10.0))
            .unwrap();
        ws.insert("lichen_sweden", on_grid(vec![2.0; 9], 3, 3, 10.0)).unwrap();
        ws.insert("area", on_grid(vec![1.0, 1.0, nan, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0], 3, 3, 10.0))
            .unwrap();

        let layers = [LayerDescriptor::new(
            "lichen_local",
            "lichen",
            Treatment::MergeFallback {
                fallback: "lichen_sweden".into(),
            },
        )];
        let summary = run_batch(&mut ws, Some("area"), &layers);
        assert!(summary.is_success());

        let out = ws.raster("lichen").unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 1.0);
        assert_eq!(out.get(0, 1).unwrap(), 2.0);
        assert!(out.get(0, 2).unwrap().is_nan());
    }

    #[test]
    fn test_batch_resamples_source() {
        let mut ws = workspace();
        // 6x6 cells of 5 m over the region
        let data: Vec<f64> = (0..36).map(|i| (i % 2) as f64).collect();
        ws.insert("dem_5m", on_grid(data, 6, 6, 5.0)).unwrap();

        let layers = [LayerDescriptor::new("dem_5m", "dem_10m", Treatment::Cut)
            .with_resample(ResampleMethod::WeightedMean)];
        let summary = run_batch(&mut ws, None, &layers);
        assert!(summary.is_success());
        let dem = ws.raster("dem_10m").unwrap();
        assert_eq!(dem.shape(), (3, 3));
        assert_eq!(dem.get(1, 1).unwrap(), 0.5);
    }
    #[test]
    fn test_batch_mask_blanks_distance_output() {
        let nan = f64::NAN;
        let mut ws = workspace();
        ws.insert("roads", on_grid(vec![1.0, nan, nan, nan, nan, nan, nan, nan, nan], 3, 3, 10.0))
            .unwrap();
        ws.insert("area", on_grid(vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, nan], 3, 3, 10.0))
            .unwrap();

        let layers = [LayerDescriptor::new("roads", "dist_roads", Treatment::Distance(DistanceParams::default()))];
        let summary = run_batch(&mut ws, Some("area"), &layers);
        assert!(summary.is_success(), "{:?}", summary.failed);

        let dist = ws.raster("dist_roads").unwrap();
        assert!(dist.get(2, 2).unwrap().is_nan());
        assert_eq!(dist.get(2, 1).unwrap(), (500.0f64).sqrt());
    }

    #[test]
    fn test_batch_mask_larger_than_region() {
        let nan = f64::NAN;
        let mut ws = workspace();
        // 4x4 from (0, 40): row 1 of the mask is region row 0
        let mut area = on_grid(vec![1.0; 16], 4, 4, 10.0);
        area.set(1, 0, nan).unwrap();
        ws.insert("area", area).unwrap();
        ws.insert("nmd", on_grid(vec![41.0; 9], 3, 3, 10.0)).unwrap();

        let recipe = Composite {
            stages: vec![RuleStage::new(Predicate::Always, 3)],
            ..Default::default()
        };
        let layers = [
            LayerDescriptor::new("nmd", "nmd_cut", Treatment::Cut),
            LayerDescriptor::new("nmd", "everywhere", Treatment::Reclassify(Box::new(recipe))),
        ];
        let summary = run_batch(&mut ws, Some("area"), &layers);
        assert!(summary.is_success(), "{:?}", summary.failed);

        let cut_out = ws.raster("nmd_cut").unwrap();
        assert!(cut_out.get(0, 0).unwrap().is_nan());
        assert_eq!(cut_out.get(0, 1).unwrap(), 41.0);
        let staged = ws.raster("everywhere").unwrap();
        assert!(staged.get(0, 0).unwrap().is_nan());
        assert_eq!(staged.get(2, 2).unwrap(), 3.0);
    }

    #[test]
    fn test_batch_unusable_mask_fails_every_layer() {
        let mut ws = workspace();
        ws.insert("nmd", on_grid(vec![41.0; 9], 3, 3, 10.0)).unwrap();
        ws.insert("area_25m", on_grid(vec![1.0; 4], 2, 2, 25.0)).unwrap();

        let layers = [
            LayerDescriptor::new("nmd", "a", Treatment::Cut),
            LayerDescriptor::new("nmd", "b", Treatment::Cut),
        ];
        let summary = run_batch(&mut ws, Some("area_25m"), &layers);
        assert_eq!(summary.failed_names(), vec!["a", "b"]);
        assert!(summary
            .failed
            .iter()
            .all(|f| matches!(&f.error, Error::GridMismatch { right, .. } if right == "area_25m")));
    }
}

