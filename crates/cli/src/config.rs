//! Batch configuration file.
//!
//! Serde models for the JSON document read by `rengis batch`. Relative
//! paths are resolved against the directory holding the config file.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rengis_algorithms::compositor::{Composite, LayerDescriptor, RuleStage, Treatment};
use rengis_algorithms::distance::{DistanceMetric, DistanceParams};
use rengis_algorithms::reclass::ReclassTable;
use rengis_algorithms::statistics::ResampleMethod;
use rengis_algorithms::terrain::{Observer, ViewshedParams};
use rengis_core::CategoryTable;

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Top level of a batch config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Input layer name -> GeoTIFF path
    pub inputs: BTreeMap<String, PathBuf>,

    /// Input layer name -> categories CSV (`code,label[,r:g:b]`)
    #[serde(default)]
    pub categories: BTreeMap<String, PathBuf>,

    pub region: RegionConfig,

    /// Layer whose no-data cells blank every prepared layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,

    #[serde(default)]
    pub layers: Vec<LayerConfig>,

    #[serde(default)]
    pub viewsheds: Vec<ViewshedConfig>,

    /// Name of the union of all binary viewsheds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewshed_union: Option<String>,

    pub output_dir: PathBuf,

    /// Replace files already present in `output_dir`
    #[serde(default = "default_true")]
    pub overwrite: bool,

    #[serde(default)]
    pub export: ExportConfig,
}

fn default_true() -> bool {
    true
}

/// Processing region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Input whose grid (origin, resolution, CRS) the region follows
    pub align_to: String,

    /// `[west, south, east, north]`; the whole `align_to` grid when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<[f64; 4]>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Write `.tfw` world files next to the GeoTIFFs
    #[serde(default)]
    pub world_file: bool,
}

/// One prepared layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerConfig {
    pub source: String,
    pub output: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resample: Option<ResampleMethod>,

    pub treatment: TreatmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreatmentConfig {
    Cut,
    Distance {
        #[serde(default)]
        metric: DistanceMetric,
    },
    Reclassify {
        /// Rule table file
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rules: Option<PathBuf>,
        #[serde(default)]
        stages: Vec<RuleStage>,
        /// Output categories CSV; defaults to the rule table labels
        #[serde(default, skip_serializing_if = "Option::is_none")]
        categories: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        colors_from: Option<String>,
        #[serde(default)]
        report: bool,
    },
    MergeFallback {
        fallback: String,
    },
}

/// Cumulative viewshed for one group of observers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewshedConfig {
    /// Output layer name (binary visibility)
    pub name: String,
    /// DEM layer, prepared by an earlier layer or taken from the inputs
    pub dem: String,
    pub observers: Vec<Observer>,
    #[serde(default)]
    pub params: ViewshedParams,
    #[serde(default = "default_min_observers")]
    pub min_observers: u32,
    /// Also export the observer counts as `<name>_count`
    #[serde(default)]
    pub keep_counts: bool,
}

fn default_min_observers() -> u32 {
    2
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl BatchConfig {
    /// Read and parse `path`, resolving relative paths against its directory
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: BatchConfig = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.inputs.values_mut().for_each(resolve);
        self.categories.values_mut().for_each(resolve);
        resolve(&mut self.output_dir);
        for layer in &mut self.layers {
            if let TreatmentConfig::Reclassify {
                rules, categories, ..
            } = &mut layer.treatment
            {
                rules.iter_mut().for_each(resolve);
                categories.iter_mut().for_each(resolve);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.inputs.contains_key(&self.region.align_to) {
            bail!(
                "region.align_to '{}' is not one of the inputs",
                self.region.align_to
            );
        }
        if let Some(mask) = &self.mask
            && !self.inputs.contains_key(mask)
        {
            bail!("mask '{}' is not one of the inputs", mask);
        }
        if self.viewshed_union.is_some() && self.viewsheds.is_empty() {
            bail!("viewshed_union is set but no viewsheds are configured");
        }
        Ok(())
    }

    /// Layer descriptors for the batch runner, with rule tables and
    /// category files loaded
    pub fn descriptors(&self) -> Result<Vec<LayerDescriptor>> {
        self.layers.iter().map(LayerConfig::descriptor).collect()
    }
}

impl LayerConfig {
    fn descriptor(&self) -> Result<LayerDescriptor> {
        let treatment = match &self.treatment {
            TreatmentConfig::Cut => Treatment::Cut,
            TreatmentConfig::Distance { metric } => {
                Treatment::Distance(DistanceParams { metric: *metric })
            }
            TreatmentConfig::MergeFallback { fallback } => Treatment::MergeFallback {
                fallback: fallback.clone(),
            },
            TreatmentConfig::Reclassify {
                rules,
                stages,
                categories,
                colors_from,
                report,
            } => {
                let table = rules.as_deref().map(read_rules).transpose()?;
                let categories = categories.as_deref().map(read_categories).transpose()?;
                Treatment::Reclassify(Box::new(Composite {
                    table,
                    stages: stages.clone(),
                    categories,
                    colors_from: colors_from.clone(),
                    report: *report,
                }))
            }
        };

        let descriptor = LayerDescriptor::new(&self.source, &self.output, treatment);
        Ok(match self.resample {
            Some(method) => descriptor.with_resample(method),
            None => descriptor,
        })
    }
}

pub fn read_rules(path: &Path) -> Result<ReclassTable> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read rules {}", path.display()))?;
    ReclassTable::parse(&text).with_context(|| format!("Invalid rules {}", path.display()))
}

pub fn read_categories(path: &Path) -> Result<CategoryTable> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read categories {}", path.display()))?;
    CategoryTable::parse(&text, ',')
        .with_context(|| format!("Invalid categories {}", path.display()))
}
