//! Cumulative viewshed analysis
//!
//! Counts, for every cell, how many observers can see a target standing on
//! it. Visibility from one observer is found by tracing Bresenham-style rays
//! from the observer to every cell on the perimeter of the search square.
//!
//! Reference:
//! Franklin, W.R. & Ray, C. (1994). Higher isn't necessarily better:
//! visibility algorithms and experiments. GIS/LIS.

use crate::maybe_rayon::*;
use rengis_core::raster::Raster;
use rengis_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Observer location in map coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observer {
    pub x: f64,
    pub y: f64,
}

impl std::str::FromStr for Observer {
    type Err = Error;

    /// Parse `"x,y"`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidParameter {
            name: "observer",
            value: s.to_string(),
            reason: "expected x,y".into(),
        };
        let (x, y) = s.split_once(',').ok_or_else(invalid)?;
        Ok(Observer {
            x: x.trim().parse().map_err(|_| invalid())?,
            y: y.trim().parse().map_err(|_| invalid())?,
        })
    }
}

/// Parameters for viewshed analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewshedParams {
    /// Observer height above ground (map units, default 1.7)
    pub observer_height: f64,
    /// Target height above ground (map units, default 0.0)
    pub target_height: f64,
    /// Maximum visibility distance in map units (None = whole grid)
    pub max_distance: Option<f64>,
}

impl Default for ViewshedParams {
    fn default() -> Self {
        Self {
            observer_height: 1.7,
            target_height: 0.0,
            max_distance: None,
        }
    }
}

struct RayContext<'a> {
    dem: &'a Raster<f64>,
    obs_r: isize,
    obs_c: isize,
    obs_z: f64,
    target_height: f64,
    ew_res: f64,
    ns_res: f64,
    max_distance: f64,
}

/// Count how many `observers` see each cell.
///
/// Cells that are no-data in the DEM are no-data in the output. Observers
/// outside the grid or on a no-data cell are an error.
pub fn cumulative_viewshed(
    dem: &Raster<f64>,
    observers: &[Observer],
    params: &ViewshedParams,
) -> Result<Raster<f64>> {
    if observers.is_empty() {
        return Err(Error::missing("observers", "no observer points given"));
    }
    let (rows, cols) = dem.shape();
    let mut counts = vec![0u32; rows * cols];

    for observer in observers {
        for (r, c) in visible_cells(dem, observer, params)? {
            counts[r * cols + c] += 1;
        }
    }

    let data: Vec<f64> = counts
        .iter()
        .zip(dem.data().iter())
        .map(|(&n, &z)| if dem.is_nodata(z) { f64::NAN } else { n as f64 })
        .collect();
    dem.derive(data, Some(f64::NAN))
}

/// Cells visible from one observer, observer cell included, deduplicated
fn visible_cells(
    dem: &Raster<f64>,
    observer: &Observer,
    params: &ViewshedParams,
) -> Result<Vec<(usize, usize)>> {
    let (rows, cols) = dem.shape();
    let (fc, fr) = dem.geo_to_pixel(observer.x, observer.y);
    if !(fc >= 0.0 && fr >= 0.0 && (fr as usize) < rows && (fc as usize) < cols) {
        return Err(Error::InvalidParameter {
            name: "observer",
            value: format!("{},{}", observer.x, observer.y),
            reason: "outside the elevation grid".into(),
        });
    }
    let (obs_row, obs_col) = (fr.floor() as usize, fc.floor() as usize);

    let ground = unsafe { dem.value_unchecked(obs_row, obs_col) };
    if ground.is_nan() {
        return Err(Error::Algorithm(format!(
            "observer {},{} is on a no-data cell",
            observer.x, observer.y
        )));
    }

    let (ew_res, ns_res) = dem.transform().resolution();
    let max_distance = params.max_distance.unwrap_or(f64::INFINITY);
    let r = match params.max_distance {
        Some(d) => (d / ew_res.min(ns_res)).ceil().max(1.0) as isize,
        None => rows.max(cols) as isize,
    };

    let ctx = RayContext {
        dem,
        obs_r: obs_row as isize,
        obs_c: obs_col as isize,
        obs_z: ground + params.observer_height,
        target_height: params.target_height,
        ew_res,
        ns_res,
        max_distance,
    };

    // Perimeter targets of the search square
    let (obs_r, obs_c) = (ctx.obs_r, ctx.obs_c);
    let mut targets: Vec<(isize, isize)> = Vec::new();
    for c in (obs_c - r)..=(obs_c + r) {
        targets.push((obs_r - r, c));
        targets.push((obs_r + r, c));
    }
    for row in (obs_r - r + 1)..=(obs_r + r - 1) {
        targets.push((row, obs_c - r));
        targets.push((row, obs_c + r));
    }

    let rays: Vec<Vec<(usize, usize)>> = targets
        .into_par_iter()
        .map(|(tr, tc)| trace_ray(&ctx, tr, tc))
        .collect();

    let mut seen = vec![false; rows * cols];
    seen[obs_row * cols + obs_col] = true;
    let mut cells = vec![(obs_row, obs_col)];
    for (r, c) in rays.into_iter().flatten() {
        if !seen[r * cols + c] {
            seen[r * cols + c] = true;
            cells.push((r, c));
        }
    }
    Ok(cells)
}

/// Trace a ray from the observer toward a perimeter target, returning the
/// cells on it that are visible.
fn trace_ray(ctx: &RayContext<'_>, target_r: isize, target_c: isize) -> Vec<(usize, usize)> {
    let (rows, cols) = ctx.dem.shape();
    let mut visible = Vec::new();
    let mut horizon = f64::NEG_INFINITY;

    let dr = target_r - ctx.obs_r;
    let dc = target_c - ctx.obs_c;
    let steps = dr.unsigned_abs().max(dc.unsigned_abs());

    if steps == 0 {
        return visible;
    }

    let step_r = dr as f64 / steps as f64;
    let step_c = dc as f64 / steps as f64;

    for s in 1..=steps {
        let cr = (ctx.obs_r as f64 + step_r * s as f64).round() as isize;
        let cc = (ctx.obs_c as f64 + step_c * s as f64).round() as isize;

        if cr < 0 || cc < 0 || (cr as usize) >= rows || (cc as usize) >= cols {
            break;
        }

        let (r, c) = (cr as usize, cc as usize);
        let z = unsafe { ctx.dem.value_unchecked(r, c) };
        if z.is_nan() {
            break;
        }

        let dy = (cr - ctx.obs_r) as f64 * ctx.ns_res;
        let dx = (cc - ctx.obs_c) as f64 * ctx.ew_res;
        let dist = (dx * dx + dy * dy).sqrt();

        if dist < f64::EPSILON {
            continue;
        }
        if dist > ctx.max_distance {
            break;
        }

        // Target seen over the highest terrain so far; the terrain itself
        // then raises the horizon
        if (z + ctx.target_height - ctx.obs_z) / dist >= horizon {
            visible.push((r, c));
        }
        horizon = horizon.max((z - ctx.obs_z) / dist);
    }

    visible
}

/// 1 where at least `min_observers` observers see the cell, 0 elsewhere,
/// no-data preserved.
pub fn binary_visibility(counts: &Raster<f64>, min_observers: u32) -> Result<Raster<f64>> {
    let threshold = f64::from(min_observers);
    let data: Vec<f64> = counts
        .data()
        .iter()
        .map(|&n| {
            if counts.is_nodata(n) {
                f64::NAN
            } else if n >= threshold {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    counts.derive(data, Some(f64::NAN))
}

/// Union of binary visibility grids: 1 where any grid is 1, else 0.
///
/// A cell is no-data only when it is no-data in every input.
pub fn any_visible(grids: &[&Raster<f64>]) -> Result<Raster<f64>> {
    let (first, rest) = grids
        .split_first()
        .ok_or_else(|| Error::missing("visibility", "no grids to combine"))?;
    for (i, &g) in rest.iter().enumerate() {
        first.ensure_same_grid("visibility 1", g, &format!("visibility {}", i + 2))?;
    }

    let (rows, cols) = first.shape();
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    let mut all_null = true;
                    for g in grids {
                        let v = unsafe { g.value_unchecked(row, col) };
                        if !v.is_nan() {
                            all_null = false;
                            if v == 1.0 {
                                return 1.0;
                            }
                        }
                    }
                    if all_null { f64::NAN } else { 0.0 }
                })
                .collect::<Vec<f64>>()
        })
        .collect();
    first.derive(data, Some(f64::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rengis_core::GeoTransform;

    fn flat_dem() -> Raster<f64> {
        let mut dem = Raster::filled(11, 11, 100.0);
        dem.set_transform(GeoTransform::new(0.0, 110.0, 10.0, -10.0));
        dem
    }

    fn center() -> Observer {
        Observer { x: 55.0, y: 55.0 }
    }

    #[test]
    fn test_flat_terrain_all_visible() {
        let counts = cumulative_viewshed(&flat_dem(), &[center()], &ViewshedParams::default()).unwrap();
        for row in 0..11 {
            for col in 0..11 {
                assert_eq!(counts.get(row, col).unwrap(), 1.0, "cell ({row}, {col})");
            }
        }
    }

    #[test]
    fn test_wall_blocks_view() {
        let mut dem = flat_dem();
        for row in 0..11 {
            dem.set(row, 7, 500.0).unwrap();
        }
        let counts = cumulative_viewshed(&dem, &[center()], &ViewshedParams::default()).unwrap();
        assert_eq!(counts.get(5, 7).unwrap(), 1.0, "wall face is visible");
        assert_eq!(counts.get(5, 9).unwrap(), 0.0, "behind the wall is hidden");
        assert_eq!(counts.get(5, 2).unwrap(), 1.0);
    }

    #[test]
    fn test_tall_target_seen_over_wall() {
        let mut dem = flat_dem();
        dem.set(5, 7, 120.0).unwrap();
        let params = ViewshedParams {
            observer_height: 150.0,
            target_height: 1.1,
            max_distance: None,
        };
        let counts = cumulative_viewshed(&dem, &[center()], &params).unwrap();
        assert_eq!(counts.get(5, 9).unwrap(), 1.0);
    }

    #[test]
    fn test_counts_accumulate_and_threshold() {
        let observers = [center(), Observer { x: 15.0, y: 95.0 }];
        let counts = cumulative_viewshed(&flat_dem(), &observers, &ViewshedParams::default()).unwrap();
        assert_eq!(counts.get(5, 5).unwrap(), 2.0);

        let binary = binary_visibility(&counts, 2).unwrap();
        assert_eq!(binary.get(5, 5).unwrap(), 1.0);
        let binary = binary_visibility(&counts, 3).unwrap();
        assert_eq!(binary.get(5, 5).unwrap(), 0.0);
    }

    #[test]
    fn test_max_distance_limits_view() {
        let params = ViewshedParams {
            max_distance: Some(25.0),
            ..Default::default()
        };
        let counts = cumulative_viewshed(&flat_dem(), &[center()], &params).unwrap();
        assert_eq!(counts.get(5, 7).unwrap(), 1.0);
        assert_eq!(counts.get(5, 10).unwrap(), 0.0);
    }

    #[test]
    fn test_observer_outside_grid() {
        let result = cumulative_viewshed(
            &flat_dem(),
            &[Observer { x: -5.0, y: 55.0 }],
            &ViewshedParams::default(),
        );
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn test_any_visible_union() {
        let a = Raster::from_vec(vec![1.0, 0.0, f64::NAN, 0.0], 2, 2).unwrap();
        let b = Raster::from_vec(vec![0.0, 1.0, f64::NAN, f64::NAN], 2, 2).unwrap();
        let u = any_visible(&[&a, &b]).unwrap();
        assert_eq!(u.get(0, 0).unwrap(), 1.0);
        assert_eq!(u.get(0, 1).unwrap(), 1.0);
        assert!(u.get(1, 0).unwrap().is_nan());
        assert_eq!(u.get(1, 1).unwrap(), 0.0);
    }

    #[test]
    fn test_observer_parse() {
        let o: Observer = "500010.5, 7000020".parse().unwrap();
        assert_eq!(o.x, 500010.5);
        assert_eq!(o.y, 7000020.0);
        assert!("12".parse::<Observer>().is_err());
    }
}
