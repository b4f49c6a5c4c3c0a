//! Focal (moving window) statistics
//!
//! Computes statistics within a moving window centered on each cell.
//! Supports: Mean, StdDev, Min, Max, Sum, Count, Median.

use crate::maybe_rayon::*;
use rengis_core::raster::{Raster, Window, WindowSize};
use rengis_core::Result;

/// Available focal statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocalStatistic {
    /// Arithmetic mean of valid cells
    Mean,
    /// Standard deviation (population)
    StdDev,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
    /// Sum of values
    Sum,
    /// Count of valid (non-NaN) values
    Count,
    /// Median value
    Median,
}

/// What to do with cells whose window reaches past the grid edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeMode {
    /// Output no-data
    #[default]
    NoData,
    /// Use the part of the window that lies inside the grid
    Partial,
}

impl EdgeMode {
    /// Whether the cell at (row, col) gets a value under this mode
    pub(crate) fn admits(self, row: usize, col: usize, half: usize, rows: usize, cols: usize) -> bool {
        match self {
            EdgeMode::Partial => true,
            EdgeMode::NoData => {
                row >= half && col >= half && row + half < rows && col + half < cols
            }
        }
    }
}

/// Parameters for focal statistics
#[derive(Debug, Clone)]
pub struct FocalParams {
    pub window: Window,
    pub statistic: FocalStatistic,
    pub edge: EdgeMode,
}

impl FocalParams {
    /// Square window, no-data at the edges
    pub fn new(size: WindowSize, statistic: FocalStatistic) -> Self {
        Self {
            window: Window::square(size),
            statistic,
            edge: EdgeMode::NoData,
        }
    }
}

/// Compute focal statistics on a raster.
///
/// No-data cells inside the window are skipped; a window with no valid cell
/// yields no-data.
pub fn focal_statistics(raster: &Raster<f64>, params: &FocalParams) -> Result<Raster<f64>> {
    let (rows, cols) = raster.shape();
    let half = params.window.size.half();
    let offsets = params.window.offsets();

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            let mut values: Vec<f64> = Vec::with_capacity(offsets.len());

            for (col, out) in row_data.iter_mut().enumerate() {
                if !params.edge.admits(row, col, half, rows, cols) {
                    continue;
                }

                values.clear();
                for &(dr, dc) in &offsets {
                    let nr = row as isize + dr;
                    let nc = col as isize + dc;
                    if nr >= 0 && nc >= 0 && (nr as usize) < rows && (nc as usize) < cols {
                        let v = unsafe { raster.value_unchecked(nr as usize, nc as usize) };
                        if !v.is_nan() {
                            values.push(v);
                        }
                    }
                }

                if !values.is_empty() {
                    *out = compute_statistic(&mut values, params.statistic);
                }
            }

            row_data
        })
        .collect();

    raster.derive(output_data, Some(f64::NAN))
}

fn compute_statistic(values: &mut [f64], stat: FocalStatistic) -> f64 {
    let n = values.len() as f64;

    match stat {
        FocalStatistic::Mean => values.iter().sum::<f64>() / n,
        FocalStatistic::StdDev => {
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
            var.sqrt()
        }
        FocalStatistic::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        FocalStatistic::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        FocalStatistic::Sum => values.iter().sum::<f64>(),
        FocalStatistic::Count => n,
        FocalStatistic::Median => {
            values.sort_by(f64::total_cmp);
            let mid = values.len() / 2;
            if values.len() % 2 == 0 {
                (values[mid - 1] + values[mid]) / 2.0
            } else {
                values[mid]
            }
        }
    }
}
