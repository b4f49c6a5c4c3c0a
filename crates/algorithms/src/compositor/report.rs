//! Per-class area report of a categorical grid

use std::collections::BTreeMap;
use std::fmt;

use rengis_core::raster::{CategoryTable, Raster};

/// One class in an [`AreaReport`]
#[derive(Debug, Clone, PartialEq)]
pub struct AreaRow {
    pub code: i64,
    pub label: String,
    pub cells: usize,
    pub area_km2: f64,
    /// Share of all valid cells, 0-100
    pub percent: f64,
}

/// Cell counts, areas and shares per class, no-data excluded, ordered by
/// class code
#[derive(Debug, Clone, PartialEq)]
pub struct AreaReport {
    pub layer: String,
    pub rows: Vec<AreaRow>,
    pub total_cells: usize,
    pub total_km2: f64,
}

impl AreaReport {
    /// Tabulate `raster`, labelling classes from `categories` when given.
    ///
    /// Values are rounded to the nearest integer class code.
    pub fn new(layer: &str, raster: &Raster<f64>, categories: Option<&CategoryTable>) -> Self {
        let (ew, ns) = raster.transform().resolution();
        let cell_km2 = ew * ns / 1e6;

        let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
        for &v in raster.data().iter() {
            if !raster.is_nodata(v) && !v.is_nan() {
                *counts.entry(v.round() as i64).or_default() += 1;
            }
        }

        let total_cells: usize = counts.values().sum();
        let rows = counts
            .into_iter()
            .map(|(code, cells)| AreaRow {
                code,
                label: categories
                    .and_then(|c| c.label(code))
                    .unwrap_or_default()
                    .to_string(),
                cells,
                area_km2: cells as f64 * cell_km2,
                percent: if total_cells > 0 {
                    100.0 * cells as f64 / total_cells as f64
                } else {
                    0.0
                },
            })
            .collect();

        Self {
            layer: layer.to_string(),
            rows,
            total_cells,
            total_km2: total_cells as f64 * cell_km2,
        }
    }

    pub fn row(&self, code: i64) -> Option<&AreaRow> {
        self.rows.iter().find(|r| r.code == code)
    }
}

impl fmt::Display for AreaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|r| r.label.len())
            .max()
            .unwrap_or(0)
            .max(5);

        writeln!(f, "Area report: {}", self.layer)?;
        writeln!(
            f,
            "{:>8}  {:<width$}  {:>12}  {:>14}  {:>8}",
            "code", "label", "cells", "km2", "%"
        )?;
        for r in &self.rows {
            writeln!(
                f,
                "{:>8}  {:<width$}  {:>12}  {:>14.6}  {:>8.2}",
                r.code, r.label, r.cells, r.area_km2, r.percent
            )?;
        }
        writeln!(
            f,
            "{:>8}  {:<width$}  {:>12}  {:>14.6}  {:>8.2}",
            "total", "", self.total_cells, self.total_km2, 100.0
        )
    }
}
