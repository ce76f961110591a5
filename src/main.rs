use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info, warn};
use rayon::prelude::*;

use fiber_sight_rust_lib::config::Config;
use fiber_sight_rust_lib::image_io::{get_json_files_in_dir, load_image_input};
use fiber_sight_rust_lib::pipeline::process_image;

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "FiberSight - Muscle fiber nucleation and typing")]
struct Args {
    /// Path to input file or directory
    #[clap(short, long)]
    input: Option<String>,

    /// Path to output directory
    #[clap(short, long)]
    output: Option<String>,

    /// Path to configuration file
    #[clap(short, long, default_value = "config.toml")]
    config: String,

    /// Marker positivity threshold in percent (overwrites config)
    #[clap(short = 't', long)]
    threshold: Option<f64>,

    /// Nearest fibers tested per nucleus (overwrites config)
    #[clap(short = 'k', long)]
    candidates: Option<usize>,

    /// Write the default configuration to the config path and exit
    #[clap(long)]
    init_config: bool,

    /// Enable debug mode (save label images and log more info)
    #[clap(short, long)]
    debug: bool,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn analyze_file(path: &Path, config: &Config, debug: bool) -> Result<()> {
    info!("Processing: {}", path.display());
    let input = load_image_input(path)?;
    process_image(input, config, debug)
        .with_context(|| format!("Failed to analyse {}", path.display()))?;
    Ok(())
}

/// Main function
fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    if args.init_config {
        Config::default().save_to_file(&args.config)?;
        info!("Wrote default configuration to {}", args.config);
        return Ok(());
    }

    let mut config = if Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        warn!("Config file {} not found, using defaults", args.config);
        Config::default()
    };

    // Override config with command-line arguments
    if let Some(input) = args.input.clone() {
        config.input_path = input;
    }

    if let Some(output) = args.output.clone() {
        config.output_base_dir = output;
    }

    if let Some(threshold) = args.threshold {
        config.positivity_threshold = threshold;
    }

    if let Some(candidates) = args.candidates {
        config.nearest_fiber_candidates = candidates;
    }

    config.validate().context("Invalid configuration")?;

    let start_time = Instant::now();

    if args.debug {
        fs::create_dir_all(PathBuf::from(&config.output_base_dir).join("debug"))?;
    }

    let input_path = PathBuf::from(&config.input_path);

    if input_path.is_file() {
        analyze_file(&input_path, &config, args.debug)?;
    } else if input_path.is_dir() {
        info!("Processing directory: {}", input_path.display());
        let json_files = get_json_files_in_dir(&input_path)?;
        info!("Found {} image descriptions", json_files.len());

        let failures = AtomicUsize::new(0);
        let run = |path: &PathBuf| {
            if let Err(e) = analyze_file(path, &config, args.debug) {
                error!("{:#}", e);
                failures.fetch_add(1, Ordering::Relaxed);
            }
        };

        if config.use_parallel {
            json_files.par_iter().for_each(run);
        } else {
            json_files.iter().for_each(run);
        }

        let failed = failures.into_inner();
        if failed > 0 {
            warn!("{} of {} images failed", failed, json_files.len());
        }
    } else {
        bail!("Invalid input path: {}", input_path.display());
    }

    info!("Processing completed in {:.2} seconds", start_time.elapsed().as_secs_f64());

    Ok(())
}
