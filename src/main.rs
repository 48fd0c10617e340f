//! plate-gate - License-plate access control
//!
//! Checks gate images against the authorized-plate database using OCR output
//! produced ahead of time (`<image>.ocr.json`) and optional YOLO plate labels
//! (`<image>.txt`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use plate_gate::access::{render_annotation, AccessResolver};
use plate_gate::batch::{ground_truth, BatchRunner};
use plate_gate::config::{self, AppConfig};
use plate_gate::plates::{Matcher, PlateIndex, PlateRegistry};
use plate_gate::storage::{self, read_reference_table, ReferenceColumns};
use plate_gate::vision::{LabelSidecar, OcrSidecar, SourceImage};

/// plate-gate - License-plate access control
#[derive(Parser, Debug)]
#[command(name = "plate-gate")]
#[command(about = "Grant or deny gate access by matching plate OCR against a plate database")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check one image and print the decision as JSON
    Check {
        /// Image to check
        image: PathBuf,

        /// Save a copy of the image with the decision box drawn on it
        #[arg(long)]
        annotated_out: Option<PathBuf>,

        /// Ignore YOLO label files and read the full image
        #[arg(long)]
        no_labels: bool,
    },

    /// Evaluate every listed image in a folder against the database
    Batch {
        /// Folder of images named as in the reference table
        dir: PathBuf,

        /// Write the per-image results as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => storage::default_config_path()?,
    };

    match args.command {
        Command::Check {
            image,
            annotated_out,
            no_labels,
        } => {
            let config = load_or_create_config(&config_path, args.config.is_some())?;
            run_check(&config, &image, annotated_out.as_deref(), no_labels)
        }
        Command::Batch { dir, report } => {
            let config = load_or_create_config(&config_path, args.config.is_some())?;
            run_batch(&config, &dir, report.as_deref())
        }
        Command::Config { action } => run_config(action, &config_path, args.config.is_some()),
    }
}

/// Load configuration from file or fall back to defaults.
///
/// An explicitly given file must exist and parse.
fn load_or_create_config(path: &Path, explicit: bool) -> Result<AppConfig> {
    if explicit || path.exists() {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    info!("Using default configuration");
    Ok(AppConfig::default())
}

/// Resolver over the sidecar adapters, configured from `config`
fn build_resolver<'a>(
    config: &AppConfig,
    ocr: &'a OcrSidecar,
    labels: Option<&'a LabelSidecar>,
) -> AccessResolver<'a> {
    let mut resolver = AccessResolver::new(ocr)
        .with_matcher(Matcher::with_config(config.matching.clone()))
        .with_config(config.resolver.clone());

    if let Some(labels) = labels {
        resolver = resolver.with_regions(labels);
    }
    if let Some(dir) = config.database.image_lookup_dir() {
        resolver = resolver.with_image_dir(dir);
    }

    resolver
}

fn run_check(config: &AppConfig, image: &Path, annotated_out: Option<&Path>, no_labels: bool) -> Result<()> {
    let index = PlateIndex::load_or_empty(&config.database);

    let ocr = OcrSidecar::new();
    let labels = LabelSidecar::new();
    let resolver = build_resolver(config, &ocr, (!no_labels).then_some(&labels));

    let record = resolver.check_path(image, &index);
    println!("{}", serde_json::to_string_pretty(&record)?);

    if let Some(out) = annotated_out {
        if record.success {
            let source = SourceImage::open(image)?;
            render_annotation(&source.image, &record, config.resolver.box_thickness)
                .save(out)
                .with_context(|| format!("Failed to save annotated image {:?}", out))?;
            info!("Annotated image saved to {:?}", out);
        }
    }

    Ok(())
}

fn run_batch(config: &AppConfig, dir: &Path, report_path: Option<&Path>) -> Result<()> {
    let columns = ReferenceColumns {
        plate: config.database.plate_column.clone(),
        image_filename: config.database.file_column.clone(),
    };
    let rows = read_reference_table(&config.database.csv_path, &columns)?;
    let registry = PlateRegistry::new(PlateIndex::from_rows(&rows, config.database.duplicate_policy)?);
    let truth = ground_truth(&rows);

    let ocr = OcrSidecar::new();
    let labels = LabelSidecar::new();
    let resolver = build_resolver(config, &ocr, Some(&labels));

    let report = BatchRunner::new(&resolver, config.batch.workers).run(dir, &truth, &registry)?;
    print!("{}", report.to_table());

    if let Some(path) = report_path {
        report.save_json(path)?;
        info!("Report written to {:?}", path);
    }

    Ok(())
}

fn run_config(action: ConfigAction, path: &Path, explicit: bool) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!("{:?} already exists (use --force to overwrite)", path);
            }
            config::save_config(&AppConfig::default(), path)?;
            println!("Wrote default configuration to {}", path.display());
        }
        ConfigAction::Show => {
            let config = load_or_create_config(path, explicit)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
