//! rengis CLI - habitat-model layer preparation

mod batch;
mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rengis_algorithms::compositor::{patch, AreaReport};
use rengis_algorithms::distance::{euclidean_distance, DistanceMetric, DistanceParams};
use rengis_algorithms::reclass::reclassify;
use rengis_algorithms::statistics::{
    focal_statistics, resample, EdgeMode, FocalParams, FocalStatistic, ResampleMethod,
};
use rengis_algorithms::terrain::{
    aspect, binary_visibility, cumulative_viewshed, slope, tpi, AspectConvention, AspectOutput,
    AspectParams, Observer, SlopeParams, SlopeUnits, TpiParams, ViewshedParams,
};
use rengis_core::io::{read_geotiff, write_geotiff, GeoTiffOptions, SampleFormat};
use rengis_core::{Raster, Region, Window, WindowSize};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "rengis")]
#[command(author, version, about = "Habitat-model raster layer preparation", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Topographic Position Index (neighborhood relief)
    Tpi {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Window side length in cells (odd, >= 3)
        #[arg(short, long, required_unless_present = "radius", conflicts_with = "radius")]
        size: Option<i64>,
        /// Window radius in map units
        #[arg(short, long)]
        radius: Option<f64>,
        /// Circular instead of square window
        #[arg(long)]
        circular: bool,
        /// Compute edge cells from the part of the window inside the grid
        #[arg(long)]
        partial_edges: bool,
    },
    /// Slope from a DEM (Horn 3x3)
    Slope {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Output units: degrees, percent
        #[arg(short, long, default_value = "degrees")]
        units: String,
        /// Z-factor for unit conversion
        #[arg(short, long, default_value = "1.0")]
        z_factor: f64,
        /// Estimate cells on the edge and next to no-data
        #[arg(short, long)]
        edges: bool,
    },
    /// Aspect (direction the slope faces) from a DEM
    Aspect {
        /// Input DEM file
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Angle convention: compass (clockwise from north), grass (counter-clockwise from east)
        #[arg(short, long, default_value = "compass")]
        convention: String,
        /// Output format: degrees, cardinal (1-4 N E S W), octant (1-8)
        #[arg(short, long, default_value = "degrees")]
        format: String,
        /// Estimate cells on the edge and next to no-data
        #[arg(short, long)]
        edges: bool,
    },
    /// Moving-window statistics
    Neighbors {
        /// Input raster
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Window side length in cells (odd, >= 3)
        #[arg(short, long, default_value = "3")]
        size: i64,
        /// Statistic: mean, min, max, sum, count, stddev, median
        #[arg(long, default_value = "mean")]
        stat: String,
        /// Circular instead of square window
        #[arg(long)]
        circular: bool,
    },
    /// Reclassify with a rule table
    Reclass {
        /// Input raster
        input: PathBuf,
        /// Output file (class codes)
        output: PathBuf,
        /// Rule table (`41 thru 42 = 41 Open land`, `* = NULL`)
        #[arg(long)]
        rules: PathBuf,
        /// Also write an area report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Distance to the nearest non-no-data cell
    Distance {
        /// Input feature raster
        input: PathBuf,
        /// Output distance file
        output: PathBuf,
        /// Also write the value of the nearest feature
        #[arg(long)]
        value: Option<PathBuf>,
        /// Output squared distances
        #[arg(long)]
        squared: bool,
    },
    /// Merge rasters, first non-no-data value wins
    Patch {
        /// Output file
        output: PathBuf,
        /// Input rasters in priority order
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,
    },
    /// Resample onto the grid of a reference raster
    Resample {
        /// Input raster
        input: PathBuf,
        /// Output file
        output: PathBuf,
        /// Raster whose grid the output takes
        #[arg(long)]
        reference: PathBuf,
        /// Method: nearest, weighted
        #[arg(short, long, default_value = "nearest")]
        method: String,
    },
    /// Per-class area report of a categorical raster
    Report {
        /// Input raster
        input: PathBuf,
        /// Categories CSV (`code,label[,r:g:b]`)
        #[arg(long)]
        categories: Option<PathBuf>,
    },
    /// Cumulative viewshed from observer points
    Viewshed {
        /// Input DEM file
        dem: PathBuf,
        /// Output file
        output: PathBuf,
        /// Observer points as "x,y;x,y;..."
        #[arg(long)]
        observers: String,
        /// Observer height above ground
        #[arg(long, default_value = "1.7")]
        observer_height: f64,
        /// Target height above ground
        #[arg(long, default_value = "0.0")]
        target_height: f64,
        /// Maximum visibility distance
        #[arg(long)]
        max_distance: Option<f64>,
        /// Write 1 where at least this many observers see the cell instead of counts
        #[arg(long)]
        min_observers: Option<u32>,
    },
    /// Run a JSON-configured batch
    Batch {
        /// Batch config file
        config: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_raster(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input {}: {} x {}", path.display(), raster.cols(), raster.rows());
    Ok(raster)
}

fn write_result(raster: &Raster<f64>, path: &Path, sample_format: SampleFormat) -> Result<()> {
    let pb = spinner("Writing output...");
    let options = GeoTiffOptions {
        sample_format,
        ..Default::default()
    };
    write_geotiff(raster, path, &options)
        .with_context(|| format!("Failed to write output {}", path.display()))?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn parse_statistic(s: &str) -> Result<FocalStatistic> {
    Ok(match s.to_lowercase().as_str() {
        "mean" | "average" => FocalStatistic::Mean,
        "min" | "minimum" => FocalStatistic::Min,
        "max" | "maximum" => FocalStatistic::Max,
        "sum" => FocalStatistic::Sum,
        "count" => FocalStatistic::Count,
        "stddev" | "std" => FocalStatistic::StdDev,
        "median" => FocalStatistic::Median,
        _ => bail!("Unknown statistic: {}. Use mean, min, max, sum, count, stddev, median", s),
    })
}

fn parse_slope_units(s: &str) -> Result<SlopeUnits> {
    Ok(match s.to_lowercase().as_str() {
        "degrees" | "deg" | "d" => SlopeUnits::Degrees,
        "percent" | "pct" | "%" => SlopeUnits::Percent,
        _ => bail!("Unknown units: {}. Use degrees or percent", s),
    })
}

fn parse_aspect(convention: &str, format: &str) -> Result<(AspectConvention, AspectOutput)> {
    let convention = match convention.to_lowercase().as_str() {
        "compass" | "north" => AspectConvention::Compass,
        "grass" | "east" => AspectConvention::Grass,
        _ => bail!("Unknown convention: {}. Use compass or grass", convention),
    };
    let output = match format.to_lowercase().as_str() {
        "degrees" | "deg" | "d" => AspectOutput::Degrees,
        "cardinal" | "nesw" => AspectOutput::Cardinal,
        "octant" | "compass8" => AspectOutput::Octant,
        _ => bail!("Unknown format: {}. Use degrees, cardinal or octant", format),
    };
    Ok((convention, output))
}

fn parse_observers(s: &str) -> Result<Vec<Observer>> {
    s.split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<Observer>().with_context(|| format!("Invalid observer '{}'", p)))
        .collect()
}

fn layer_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = setup_logging(cli.verbose) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    match execute(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(command: Commands) -> Result<bool> {
    match command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster = read_raster(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let (ew, ns) = raster.transform().resolution();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {} x {}", ew, ns);
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
            );
        }

        // ── Relief ───────────────────────────────────────────────────
        Commands::Tpi {
            input,
            output,
            size,
            radius,
            circular,
            partial_edges,
        } => {
            let dem = read_raster(&input)?;
            let mut params = match (size, radius) {
                (Some(size), _) => TpiParams::new(WindowSize::new(size)?),
                (None, Some(radius)) => TpiParams::from_radius(radius, dem.cell_size())?,
                (None, None) => bail!("either --size or --radius is required"),
            };
            params.circular = circular;
            if partial_edges {
                params.edge = EdgeMode::Partial;
            }
            info!("TPI window: {} cells", params.size.get());

            let start = Instant::now();
            let result = tpi(&dem, &params).context("Failed to calculate TPI")?;
            let elapsed = start.elapsed();
            write_result(&result, &output, SampleFormat::Float32)?;
            done("TPI", &output, elapsed);
        }

        Commands::Slope {
            input,
            output,
            units,
            z_factor,
            edges,
        } => {
            let params = SlopeParams {
                units: parse_slope_units(&units)?,
                z_factor,
                edges,
            };
            let dem = read_raster(&input)?;

            let start = Instant::now();
            let result = slope(&dem, &params).context("Failed to calculate slope")?;
            let elapsed = start.elapsed();
            write_result(&result, &output, SampleFormat::Float32)?;
            done("Slope", &output, elapsed);
        }

        Commands::Aspect {
            input,
            output,
            convention,
            format,
            edges,
        } => {
            let (convention, output_format) = parse_aspect(&convention, &format)?;
            let params = AspectParams {
                convention,
                output: output_format,
                edges,
            };
            let dem = read_raster(&input)?;

            let start = Instant::now();
            let result = aspect(&dem, &params).context("Failed to calculate aspect")?;
            let elapsed = start.elapsed();
            let sample_format = match output_format {
                AspectOutput::Degrees => SampleFormat::Float32,
                AspectOutput::Cardinal | AspectOutput::Octant => SampleFormat::Int32,
            };
            write_result(&result, &output, sample_format)?;
            done("Aspect", &output, elapsed);
        }

        Commands::Neighbors {
            input,
            output,
            size,
            stat,
            circular,
        } => {
            let statistic = parse_statistic(&stat)?;
            let size = WindowSize::new(size)?;
            let raster = read_raster(&input)?;
            let mut params = FocalParams::new(size, statistic);
            if circular {
                params.window = Window::circle(size);
            }

            let start = Instant::now();
            let result = focal_statistics(&raster, &params).context("Failed to compute focal statistics")?;
            let elapsed = start.elapsed();
            write_result(&result, &output, SampleFormat::Float32)?;
            done("Focal statistics", &output, elapsed);
        }

        // ── Categorical ──────────────────────────────────────────────
        Commands::Reclass {
            input,
            output,
            rules,
            report,
        } => {
            let table = config::read_rules(&rules)?;
            let raster = read_raster(&input)?;

            let start = Instant::now();
            let result = reclassify(&raster, &table).context("Failed to reclassify")?;
            let elapsed = start.elapsed();
            write_result(&result, &output, SampleFormat::Int32)?;

            let categories = table.categories();
            if !categories.is_empty() {
                let csv = output.with_extension("csv");
                fs::write(&csv, categories.to_csv(None))
                    .with_context(|| format!("Failed to write {}", csv.display()))?;
            }
            if let Some(path) = report {
                let tabulated = AreaReport::new(&layer_name(&output), &result, Some(&categories));
                fs::write(&path, tabulated.to_string())
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            done("Reclassification", &output, elapsed);
        }

        Commands::Distance {
            input,
            output,
            value,
            squared,
        } => {
            let features = read_raster(&input)?;
            let params = DistanceParams {
                metric: if squared {
                    DistanceMetric::Squared
                } else {
                    DistanceMetric::Euclidean
                },
            };

            let start = Instant::now();
            let result = euclidean_distance(&features, &params).context("Failed to compute distance")?;
            let elapsed = start.elapsed();
            write_result(&result.distance, &output, SampleFormat::Float32)?;
            if let Some(path) = value {
                write_result(&result.value, &path, SampleFormat::Float32)?;
            }
            done("Distance", &output, elapsed);
        }

        Commands::Patch { output, inputs } => {
            let rasters = inputs
                .iter()
                .map(|p| read_raster(p))
                .collect::<Result<Vec<_>>>()?;
            let refs: Vec<&Raster<f64>> = rasters.iter().collect();

            let start = Instant::now();
            let result = patch(&refs).context("Failed to patch")?;
            let elapsed = start.elapsed();
            write_result(&result, &output, SampleFormat::Float32)?;
            done("Patch", &output, elapsed);
        }

        Commands::Resample {
            input,
            output,
            reference,
            method,
        } => {
            let method: ResampleMethod = method.parse()?;
            let raster = read_raster(&input)?;
            let region = Region::from_raster(&read_raster(&reference)?);

            let start = Instant::now();
            let result = resample(&raster, &region, method).context("Failed to resample")?;
            let elapsed = start.elapsed();
            write_result(&result, &output, SampleFormat::Float32)?;
            done("Resample", &output, elapsed);
        }

        Commands::Report { input, categories } => {
            let raster = read_raster(&input)?;
            let categories = categories.as_deref().map(config::read_categories).transpose()?;
            let report = AreaReport::new(&layer_name(&input), &raster, categories.as_ref());
            print!("{}", report);
        }

        Commands::Viewshed {
            dem,
            output,
            observers,
            observer_height,
            target_height,
            max_distance,
            min_observers,
        } => {
            let observers = parse_observers(&observers)?;
            let dem = read_raster(&dem)?;
            let params = ViewshedParams {
                observer_height,
                target_height,
                max_distance,
            };

            let start = Instant::now();
            let counts = cumulative_viewshed(&dem, &observers, &params)
                .context("Failed to compute viewshed")?;
            let elapsed = start.elapsed();
            match min_observers {
                Some(n) => {
                    let binary = binary_visibility(&counts, n)?;
                    write_result(&binary, &output, SampleFormat::Int32)?;
                }
                None => write_result(&counts, &output, SampleFormat::Float32)?,
            }
            done("Viewshed", &output, elapsed);
        }

        // ── Batch ────────────────────────────────────────────────────
        Commands::Batch { config } => return batch::run(&config),
    }

    Ok(true)
}
