use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::Parser;
use log::{error, info, warn};
use rayon::prelude::*;

use scalar_vision_lib::config::Config;
use scalar_vision_lib::image_io::{get_raster_files_in_dir, load_input};
use scalar_vision_lib::output::{write_batch_csv, ImageSummary};
use scalar_vision_lib::pipeline::process_image;

const DEFAULT_CONFIG: &str = "config.toml";

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "scalar_vision - scalar-field image analysis")]
struct Args {
    /// Path to input file or directory
    #[clap(short, long)]
    input: Option<String>,

    /// Path to output directory
    #[clap(short, long)]
    output: Option<String>,

    /// Path to configuration file
    #[clap(short, long, default_value = DEFAULT_CONFIG)]
    config: String,

    /// Enable debug mode (save intermediate images and log more detail)
    #[clap(short, long)]
    debug: bool,
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if args.config == DEFAULT_CONFIG && !Path::new(DEFAULT_CONFIG).exists() {
        info!("No {} found, using built-in defaults", DEFAULT_CONFIG);
        Config::default()
    } else {
        Config::from_file(&args.config).with_context(|| format!("loading {}", args.config))?
    };

    // Override config with command-line arguments
    if let Some(input) = args.input.clone() {
        config.input_path = input;
    }
    if let Some(output) = args.output.clone() {
        config.output_base_dir = output;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn process_path(path: &Path, config: &Config, debug: bool) -> anyhow::Result<ImageSummary> {
    let input = load_input(path).with_context(|| format!("loading {}", path.display()))?;
    let summary = process_image(input, config, debug).with_context(|| format!("processing {}", path.display()))?;
    Ok(summary)
}

/// Main function
fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let config = load_config(&args)?;
    let start_time = Instant::now();
    let input_path = PathBuf::from(&config.input_path);

    if input_path.is_file() {
        info!("Processing single file: {}", input_path.display());
        process_path(&input_path, &config, args.debug)?;
    } else if input_path.is_dir() {
        info!("Processing directory: {}", input_path.display());
        let files = get_raster_files_in_dir(&input_path)?;
        info!("Found {} raster files", files.len());

        let run = |path: &PathBuf| match process_path(path, &config, args.debug) {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("{:#}", e);
                None
            }
        };

        let results: Vec<Option<ImageSummary>> = if config.use_parallel {
            files.par_iter().map(run).collect()
        } else {
            files.iter().map(run).collect()
        };

        let failed = results.iter().filter(|r| r.is_none()).count();
        let summaries: Vec<ImageSummary> = results.into_iter().flatten().collect();

        if !summaries.is_empty() {
            let csv_path = write_batch_csv(&summaries, &config.output_base_dir)?;
            info!("Batch summary written to {}", csv_path.display());
        }

        if failed > 0 {
            error!("{} of {} files failed", failed, files.len());
            if summaries.is_empty() {
                bail!("no input could be processed");
            }
        }
    } else {
        bail!("input path {} is neither a file nor a directory", input_path.display());
    }

    info!("Processing completed in {:.2} seconds", start_time.elapsed().as_secs_f64());
    Ok(())
}
