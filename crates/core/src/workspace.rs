//! Workspace: named layers plus the active region.
//!
//! Every operation receives the workspace explicitly; there is no ambient
//! "current mapset" or "current region".

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::raster::{CategoryTable, ColorTable, Raster, Region};

/// Prefix of temporary layer names
pub const TEMP_PREFIX: &str = "temp_";

/// A named grid with its display metadata
#[derive(Debug, Clone)]
pub struct Layer {
    pub raster: Raster<f64>,
    pub categories: Option<CategoryTable>,
    pub colors: Option<ColorTable>,
}

impl Layer {
    pub fn new(raster: Raster<f64>) -> Self {
        Self {
            raster,
            categories: None,
            colors: None,
        }
    }
}

/// Lookup of grids by name, the seam between evaluation code and storage.
pub trait GridSource {
    fn grid(&self, name: &str) -> Option<&Raster<f64>>;
}

impl GridSource for BTreeMap<String, Raster<f64>> {
    fn grid(&self, name: &str) -> Option<&Raster<f64>> {
        self.get(name)
    }
}

/// The workspace holds all named layers and the processing region.
#[derive(Debug, Clone)]
pub struct Workspace {
    region: Region,
    layers: BTreeMap<String, Layer>,
    /// Replace existing layers on insert instead of failing
    pub overwrite: bool,
}

impl Workspace {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            layers: BTreeMap::new(),
            overwrite: false,
        }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn set_region(&mut self, region: Region) {
        self.region = region;
    }

    /// Store a grid under `name`.
    ///
    /// Fails with [`Error::OutputExists`] if the name is taken and overwrite
    /// is disabled.
    pub fn insert(&mut self, name: &str, raster: Raster<f64>) -> Result<()> {
        self.insert_layer(name, Layer::new(raster))
    }

    pub fn insert_layer(&mut self, name: &str, layer: Layer) -> Result<()> {
        if !self.overwrite && self.layers.contains_key(name) {
            return Err(Error::OutputExists(name.to_string()));
        }
        self.layers.insert(name.to_string(), layer);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    /// Layer by name, or [`Error::MissingInput`]
    pub fn layer(&self, name: &str) -> Result<&Layer> {
        self.layers
            .get(name)
            .ok_or_else(|| Error::missing(name, "not found in workspace"))
    }

    pub fn layer_mut(&mut self, name: &str) -> Result<&mut Layer> {
        self.layers
            .get_mut(name)
            .ok_or_else(|| Error::missing(name, "not found in workspace"))
    }

    /// Grid by name, or [`Error::MissingInput`]
    pub fn raster(&self, name: &str) -> Result<&Raster<f64>> {
        self.layer(name).map(|l| &l.raster)
    }

    /// Remove a layer, returning it if it existed
    pub fn remove(&mut self, name: &str) -> Option<Layer> {
        self.layers.remove(name)
    }

    /// Remove every layer whose name satisfies `pred`; returns how many went
    pub fn remove_where<F>(&mut self, pred: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let before = self.layers.len();
        self.layers.retain(|name, _| !pred(name));
        before - self.layers.len()
    }

    /// Layer names in ascending order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Name for a temporary derived from `base`
    pub fn temp_name(base: &str) -> String {
        format!("{}{}", TEMP_PREFIX, base)
    }

    /// Register `raster` as temporary layer `name`, run `f`, then remove the
    /// temporary whether or not `f` succeeded.
    ///
    /// Any stale layer of the same name (left by an aborted run) is replaced.
    pub fn with_temporary<R, F>(&mut self, name: &str, raster: Raster<f64>, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        self.layers.insert(name.to_string(), Layer::new(raster));
        let result = f(self);
        self.layers.remove(name);
        result
    }
}

impl GridSource for Workspace {
    fn grid(&self, name: &str) -> Option<&Raster<f64>> {
        self.layers.get(name).map(|l| &l.raster)
    }
}
