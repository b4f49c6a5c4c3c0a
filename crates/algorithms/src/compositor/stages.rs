//! Staged-overwrite reclassification
//!
//! The working grid starts as the base grid; each stage in order replaces
//! the cells its predicate selects:
//!
//! ```text
//! W := B
//! for each stage: W := if(predicate(W, grids...), replacement, W)
//! ```
//!
//! Later stages see, and may overwrite, the results of earlier ones.

use tracing::debug;

use super::report::AreaReport;
use super::rules::{Bound, RuleStage};
use crate::maybe_rayon::*;
use crate::reclass::{reclassify, ReclassTable};
use rengis_core::raster::{CategoryTable, ColorTable, Raster};
use rengis_core::{Error, GridSource, Layer, Result, Workspace};

/// Run `stages` over `base`, reading named grids from `grids`.
///
/// Every referenced grid is resolved and checked against the base grid
/// before any cell is evaluated. Errors:
/// - [`Error::RuleReferencesMissingGrid`] with the 1-based stage index
/// - [`Error::GridMismatch`] when a referenced grid is on another grid
pub fn apply_stages<S>(
    base: &Raster<f64>,
    base_name: &str,
    stages: &[RuleStage],
    grids: &S,
) -> Result<Raster<f64>>
where
    S: GridSource + ?Sized,
{
    for (i, stage) in stages.iter().enumerate() {
        for name in stage.grids() {
            let grid = grids.grid(name).ok_or_else(|| Error::RuleReferencesMissingGrid {
                stage: i + 1,
                grid: name.to_string(),
            })?;
            base.ensure_same_grid(base_name, grid, name)?;
        }
    }

    let bound: Vec<(Bound<'_>, f64)> = stages
        .iter()
        .enumerate()
        .map(|(i, stage)| {
            debug!(
                "stage {}: -> {}{}",
                i + 1,
                stage.replacement,
                stage.note.as_deref().map(|n| format!(" ({})", n)).unwrap_or_default()
            );
            stage
                .predicate
                .bind(&|name| grids.grid(name))
                .map(|b| (b, stage.replacement as f64))
                .map_err(|name| Error::RuleReferencesMissingGrid {
                    stage: i + 1,
                    grid: name.to_string(),
                })
        })
        .collect::<Result<_>>()?;

    let (rows, cols) = base.shape();
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    // Predicates only read the same cell, so running every
                    // stage per cell equals one full pass per stage
                    let mut w = unsafe { base.value_unchecked(row, col) };
                    for (pred, replacement) in &bound {
                        if unsafe { pred.eval(w, row, col) } {
                            w = *replacement;
                        }
                    }
                    w
                })
                .collect::<Vec<f64>>()
        })
        .collect();

    base.derive(data, Some(f64::NAN))
}

/// Full recipe for a categorical output layer
#[derive(Debug, Clone, Default)]
pub struct Composite {
    /// Table reclassification applied to the base before the stages
    pub table: Option<ReclassTable>,
    pub stages: Vec<RuleStage>,
    /// Class labels of the output; defaults to the table's labels
    pub categories: Option<CategoryTable>,
    /// Layer whose color table the output takes
    pub colors_from: Option<String>,
    /// Produce an area report
    pub report: bool,
}

/// Table reclass plus stages, without touching any workspace
pub fn composite_raster<S>(
    base: &Raster<f64>,
    base_name: &str,
    recipe: &Composite,
    grids: &S,
) -> Result<Raster<f64>>
where
    S: GridSource + ?Sized,
{
    match &recipe.table {
        Some(table) => {
            let reclassified = reclassify(base, table)?;
            apply_stages(&reclassified, base_name, &recipe.stages, grids)
        }
        None => apply_stages(base, base_name, &recipe.stages, grids),
    }
}

/// Attach categories and colors to a composited grid and build its report.
pub(crate) fn annotate(
    ws: &Workspace,
    output: &str,
    raster: Raster<f64>,
    recipe: &Composite,
) -> Result<(Layer, Option<AreaReport>)> {
    let categories = recipe
        .categories
        .clone()
        .or_else(|| recipe.table.as_ref().map(ReclassTable::categories))
        .filter(|c| !c.is_empty());

    let colors: Option<ColorTable> = match &recipe.colors_from {
        Some(name) => {
            let reference = ws.layer(name)?;
            reference
                .colors
                .clone()
                .or_else(|| reference.categories.as_ref().map(CategoryTable::colors))
        }
        None => categories.as_ref().map(CategoryTable::colors),
    }
    .filter(|c| !c.is_empty());

    let report = recipe
        .report
        .then(|| AreaReport::new(output, &raster, categories.as_ref()));

    Ok((
        Layer {
            raster,
            categories,
            colors,
        },
        report,
    ))
}

/// Composite workspace layer `input` into `output`.
///
/// Returns the area report when the recipe asks for one.
pub fn composite(
    ws: &mut Workspace,
    input: &str,
    output: &str,
    recipe: &Composite,
) -> Result<Option<AreaReport>> {
    let base = ws.raster(input)?;
    let raster = composite_raster(base, input, recipe, &*ws)?;
    let (layer, report) = annotate(ws, output, raster, recipe)?;
    ws.insert_layer(output, layer)?;
    Ok(report)
}
