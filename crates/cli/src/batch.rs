//! `rengis batch`: import, prepare, export

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use rengis_algorithms::compositor::{cut, run_batch, BatchSummary, LayerFailure, LayerOutcome, Treatment};
use rengis_algorithms::terrain::{any_visible, binary_visibility, cumulative_viewshed};
use rengis_core::io::{write_geotiff, GeoTiffOptions, SampleFormat};
use rengis_core::{Layer, Region, Workspace};

use crate::config::{read_categories, BatchConfig, ViewshedConfig};
use crate::{read_raster, spinner};

/// Run the batch described by `config_path`; returns whether every layer
/// was produced and exported.
pub fn run(config_path: &Path) -> Result<bool> {
    let start = Instant::now();
    let config = BatchConfig::load(config_path)?;
    let descriptors = config.descriptors()?;

    let mut inputs = Vec::with_capacity(config.inputs.len());
    for (name, path) in &config.inputs {
        let mut layer = Layer::new(read_raster(path)?);
        if let Some(csv) = config.categories.get(name) {
            let categories = read_categories(csv)?;
            layer.colors = Some(categories.colors()).filter(|c| !c.is_empty());
            layer.categories = Some(categories);
        }
        inputs.push((name.as_str(), layer));
    }

    let region = build_region(&config, &inputs)?;
    info!("Region: {}", region);

    let mut ws = Workspace::new(region);
    for (name, layer) in inputs {
        ws.insert_layer(name, layer)?;
    }

    let mut summary = run_batch(&mut ws, config.mask.as_deref(), &descriptors);

    let mut integer_layers: BTreeSet<String> = descriptors
        .iter()
        .filter(|d| matches!(d.treatment, Treatment::Reclassify(_)))
        .map(|d| d.output.clone())
        .collect();

    ws.overwrite = true;
    let mut visible = Vec::new();
    for group in &config.viewsheds {
        match run_viewshed(&mut ws, group) {
            Ok(produced) => {
                integer_layers.insert(group.name.clone());
                visible.push(group.name.clone());
                summary.succeeded.extend(produced.into_iter().map(|layer| LayerOutcome {
                    layer,
                    report: None,
                }));
            }
            Err(error) => {
                warn!("Skipping viewshed {}: {}", group.name, error);
                summary.failed.push(LayerFailure {
                    layer: group.name.clone(),
                    error,
                });
            }
        }
    }

    if let Some(union) = &config.viewshed_union
        && !visible.is_empty()
    {
        match union_viewsheds(&mut ws, union, &visible) {
            Ok(()) => {
                integer_layers.insert(union.clone());
                summary.succeeded.push(LayerOutcome {
                    layer: union.clone(),
                    report: None,
                });
            }
            Err(error) => {
                warn!("Skipping viewshed union {}: {}", union, error);
                summary.failed.push(LayerFailure {
                    layer: union.clone(),
                    error,
                });
            }
        }
    }

    let exported = export(&config, &ws, &summary, &integer_layers)?;
    print_summary(&summary, exported, start.elapsed());
    Ok(summary.is_success() && exported == summary.succeeded.len())
}

fn build_region(config: &BatchConfig, inputs: &[(&str, Layer)]) -> Result<Region> {
    let reference = inputs
        .iter()
        .find(|(name, _)| *name == config.region.align_to)
        .map(|(_, layer)| &layer.raster)
        .with_context(|| format!("Input '{}' not loaded", config.region.align_to))?;

    match config.region.bounds {
        Some([west, south, east, north]) => Region::aligned((west, south, east, north), reference)
            .context("Failed to build region"),
        None => Ok(Region::from_raster(reference)),
    }
}

/// Binary visibility of one observer group; returns the layers it stored
fn run_viewshed(ws: &mut Workspace, group: &ViewshedConfig) -> rengis_core::Result<Vec<String>> {
    info!(
        "Viewshed {} from {} ({} observers)",
        group.name,
        group.dem,
        group.observers.len()
    );
    let dem = cut(ws.raster(&group.dem)?, ws.region(), None)?;
    let counts = cumulative_viewshed(&dem, &group.observers, &group.params)?;
    let binary = binary_visibility(&counts, group.min_observers)?;

    let mut produced = vec![group.name.clone()];
    ws.insert(&group.name, binary)?;
    if group.keep_counts {
        let name = format!("{}_count", group.name);
        ws.insert(&name, counts)?;
        produced.push(name);
    }
    Ok(produced)
}

/// Store the union of the binary viewsheds `visible` as `union`
fn union_viewsheds(ws: &mut Workspace, union: &str, visible: &[String]) -> rengis_core::Result<()> {
    let grids = visible
        .iter()
        .map(|name| ws.raster(name))
        .collect::<rengis_core::Result<Vec<_>>>()?;
    let any = any_visible(&grids)?;
    ws.insert(union, any)
}

/// Write every produced layer to the output directory; returns how many
/// made it.
fn export(
    config: &BatchConfig,
    ws: &Workspace,
    summary: &BatchSummary,
    integer_layers: &BTreeSet<String>,
) -> Result<usize> {
    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;

    let pb = spinner("Writing outputs...");
    let mut exported = 0;
    for outcome in &summary.succeeded {
        match export_layer(config, ws, outcome, integer_layers.contains(&outcome.layer)) {
            Ok(()) => exported += 1,
            Err(e) => warn!("Export of {} failed: {:#}", outcome.layer, e),
        }
    }
    pb.finish_and_clear();
    Ok(exported)
}

fn export_layer(
    config: &BatchConfig,
    ws: &Workspace,
    outcome: &LayerOutcome,
    integer: bool,
) -> Result<()> {
    let layer = ws.layer(&outcome.layer)?;
    let path = config.output_dir.join(format!("{}.tif", outcome.layer));
    if path.exists() && !config.overwrite {
        anyhow::bail!("{} exists and overwrite is disabled", path.display());
    }

    let options = GeoTiffOptions {
        sample_format: if integer || layer.categories.is_some() {
            SampleFormat::Int32
        } else {
            SampleFormat::Float32
        },
        world_file: config.export.world_file,
    };
    write_geotiff(&layer.raster, &path, &options)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    if let Some(categories) = &layer.categories {
        let csv = path.with_extension("csv");
        fs::write(&csv, categories.to_csv(layer.colors.as_ref()))
            .with_context(|| format!("Failed to write {}", csv.display()))?;
    }
    if let Some(report) = &outcome.report {
        let txt = config.output_dir.join(format!("{}_report.txt", outcome.layer));
        fs::write(&txt, report.to_string())
            .with_context(|| format!("Failed to write {}", txt.display()))?;
        println!("{}", report);
    }
    Ok(())
}

fn print_summary(summary: &BatchSummary, exported: usize, elapsed: std::time::Duration) {
    println!(
        "Batch finished: {} layers produced, {} exported, {} failed",
        summary.succeeded.len(),
        exported,
        summary.failed.len()
    );
    for failure in &summary.failed {
        println!("  FAILED {}: {}", failure.layer, failure.error);
    }
    println!("  Processing time: {:.2?}", elapsed);
}
