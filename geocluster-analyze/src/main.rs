mod constants;

use anyhow::{bail, Context, Result};
use clap::Parser;
use geocluster_core::{
    density_grid, BackendKind, ClusterConfig, ClusterEngine, ClusterExport, ClusterResult,
    ClusterSummary, DensityGrid, LocationPoint, Notice, SignificanceAnalyzer, SignificanceCriteria,
};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use constants::*;

#[derive(Parser, Debug)]
#[command(about = "Cluster JSONL location points and label significant places")]
struct Args {
    /// JSONL file, one location point per line.
    #[arg(long)]
    points: PathBuf,

    /// JSON cluster config; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    epsilon_m: Option<f64>,

    #[arg(long)]
    min_samples: Option<usize>,

    /// Datasets smaller than this are returned as noise.
    #[arg(long)]
    min_points: Option<usize>,

    #[arg(long)]
    visit_gap_hours: Option<f64>,

    #[arg(long)]
    backend: Option<BackendKind>,

    /// Also compute a density grid with this many cells per side.
    #[arg(long)]
    grid: Option<usize>,

    /// Report which clusters pass the significant-location filter.
    #[arg(long)]
    significant: bool,

    #[arg(long, default_value_t = DEFAULT_MIN_VISITS)]
    min_visits: usize,

    #[arg(long, default_value_t = DEFAULT_MIN_DURATION_MINUTES)]
    min_duration_minutes: i64,

    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
struct Params {
    epsilon_meters: f64,
    min_samples: usize,
    min_dataset_size: usize,
    visit_gap_seconds: i64,
    requested_backend: BackendKind,
    backend: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct AnalysisOutput {
    params: Params,
    points: usize,
    notices: Vec<Notice>,
    summary: ClusterSummary,
    clusters: Vec<ClusterExport>,
    noise: Vec<LocationPoint>,
    significant: Option<Vec<usize>>,
    grid: Option<DensityGrid>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let cfg = build_config(&args)?;

    let points = load_jsonl(&args.points)?;
    info!("loaded {} points from {}", points.len(), args.points.display());

    let mut engine = ClusterEngine::new(cfg.clone()).context("invalid cluster config")?;
    let analyzer = engine.analyzer();
    let mut result = engine.cluster(&points).clone();
    result.annotate(&analyzer);

    let summary = ClusterSummary::from_result(&result);
    let significant = if args.significant {
        let criteria = SignificanceCriteria {
            min_duration: chrono_minutes(args.min_duration_minutes)?,
            min_visits: args.min_visits,
        };
        Some(significant_ids(&result, &analyzer, &criteria))
    } else {
        None
    };
    let grid = args.grid.map(|resolution| density_grid(&points, resolution));

    if args.json {
        let output = AnalysisOutput {
            params: Params {
                epsilon_meters: cfg.epsilon_meters,
                min_samples: cfg.min_samples,
                min_dataset_size: cfg.min_dataset_size,
                visit_gap_seconds: cfg.visit_gap_seconds,
                requested_backend: cfg.backend,
                backend: result.backend,
            },
            points: points.len(),
            notices: result.notices.clone(),
            summary,
            clusters: result.exports(&analyzer),
            noise: result.noise.clone(),
            significant,
            grid,
        };
        let text = serde_json::to_string_pretty(&output)
            .unwrap_or_else(|_| "{\"error\":\"failed to serialize\"}".to_string());
        println!("{text}");
        return Ok(());
    }

    print_notices(&result.notices);
    println!(
        "Points: {}  backend: {}  epsilon: {:.1}m  min_samples: {}",
        points.len(),
        result.backend,
        cfg.epsilon_meters,
        cfg.min_samples
    );
    print_summary(&summary, &result);
    if let Some(ids) = &significant {
        print_significant(ids);
    }
    if let Some(grid) = &grid {
        print_grid(grid);
    }
    Ok(())
}

fn build_config(args: &Args) -> Result<ClusterConfig> {
    let mut cfg = match &args.config {
        Some(path) => ClusterConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ClusterConfig::default().with_min_dataset_size(DEFAULT_MIN_POINTS),
    };
    if let Some(eps) = args.epsilon_m {
        cfg.epsilon_meters = eps;
    }
    if let Some(min_samples) = args.min_samples {
        cfg.min_samples = min_samples;
    }
    if let Some(min_points) = args.min_points {
        cfg.min_dataset_size = min_points;
    }
    if let Some(hours) = args.visit_gap_hours {
        if !hours.is_finite() || hours < 0.0 {
            bail!("--visit-gap-hours must be a non-negative number");
        }
        cfg.visit_gap_seconds = (hours * SECS_PER_HOUR).round() as i64;
    }
    if let Some(backend) = args.backend {
        cfg.backend = backend;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn chrono_minutes(minutes: i64) -> Result<chrono::Duration> {
    chrono::Duration::try_minutes(minutes)
        .filter(|d| *d >= chrono::Duration::zero())
        .context("--min-duration-minutes out of range")
}

fn load_jsonl(path: &Path) -> Result<Vec<LocationPoint>> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LocationPoint>(&line) {
            Ok(point) => out.push(point),
            Err(err) => warn!("skipping line {}: {}", lineno + 1, err),
        }
    }
    Ok(out)
}

fn significant_ids(
    result: &ClusterResult,
    analyzer: &SignificanceAnalyzer,
    criteria: &SignificanceCriteria,
) -> Vec<usize> {
    result
        .clusters
        .iter()
        .enumerate()
        .filter(|(_, c)| analyzer.is_significant(c, criteria))
        .map(|(i, _)| i)
        .collect()
}

fn print_notices(notices: &[Notice]) {
    for n in notices {
        println!("[!!] {}", n);
    }
}

fn print_summary(summary: &ClusterSummary, result: &ClusterResult) {
    println!(
        "\nClusters: {}  clustered: {}  noise: {}",
        summary.num_clusters, summary.total_clustered_locations, summary.total_noise_points
    );
    for (overview, cluster) in summary.clusters.iter().zip(result.clusters.iter()) {
        let label = cluster
            .significance()
            .map(|s| s.label.as_str())
            .unwrap_or("-");
        let visits = cluster.significance().map(|s| s.visits).unwrap_or(0);
        println!(
            "- #{} size={} center=({:.5}, {:.5}) radius={:.1}m visits={} label=\"{}\"",
            overview.id,
            overview.size,
            overview.center.latitude,
            overview.center.longitude,
            overview.radius_meters,
            visits,
            label
        );
        if let (Some(start), Some(end)) = (overview.time_span.start, overview.time_span.end) {
            println!("  span: {} .. {}", start.to_rfc3339(), end.to_rfc3339());
        }
        if let Some(source) = &overview.most_common_source {
            println!("  top source: {} ({} sources)", source, overview.sources.len());
        }
    }
}

fn print_significant(ids: &[usize]) {
    if ids.is_empty() {
        println!("\nSignificant locations: none");
        return;
    }
    let list: Vec<String> = ids.iter().map(|i| format!("#{i}")).collect();
    println!("\nSignificant locations: {}", list.join(", "));
}

fn print_grid(grid: &DensityGrid) {
    let Some(bounds) = grid.bounds else {
        println!("\nDensity grid: no valid points");
        return;
    };
    println!(
        "\nDensity grid {}x{}: lat[{:.4},{:.4}] lon[{:.4},{:.4}]",
        grid.resolution,
        grid.resolution,
        bounds.min_lat,
        bounds.max_lat,
        bounds.min_lon,
        bounds.max_lon
    );
    if let Some((i, j, count)) = grid.peak() {
        if let Some((lat, lon)) = grid.cell_center(i, j) {
            println!("  peak cell ({i},{j}) count={count} at ({lat:.4}, {lon:.4})");
        }
    }
}
