//! Batch MRZ detection over a directory of scanned documents.
//!
//! ```bash
//! mrz-fingerprint build-catalog fonts/ -o catalog.json
//! mrz-fingerprint scan scans/ --catalog catalog.json --report report.json
//! mrz-fingerprint scan scans/ --catalog catalog.json --save-masks masks/ --save-crops mrz/
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use log::{error, info};

use mrz_fingerprint::detector::{BatchReport, ImageOutcome};
use mrz_fingerprint::models::MrzCode;
use mrz_fingerprint::utils::FontSelection;
use mrz_fingerprint::{Config, FingerprintCatalog, LetterStats, MrzDetector, Result};

#[derive(Parser)]
#[command(name = "mrz-fingerprint")]
#[command(about = "Locates and validates MRZ bands with font fingerprints")]
struct Cli {
    /// JSON configuration file; missing keys keep their defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect and validate the MRZ of every image in a directory
    Scan(ScanArgs),
    /// Train a catalog from font sample sheets and save it
    BuildCatalog {
        /// Directory holding one sub-directory of sample sheets per font
        fonts: PathBuf,
        /// Output catalog file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Directory of .png / .jpg images
    images: PathBuf,

    /// Font sample directory to train the catalog from
    #[arg(long, conflicts_with = "catalog", required_unless_present = "catalog")]
    fonts: Option<PathBuf>,

    /// Previously saved catalog
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Always read the MRZ with this font
    #[arg(long)]
    font: Option<String>,

    /// Similarity a glyph needs to count as matched
    #[arg(long)]
    match_threshold: Option<f64>,

    /// How many ranked fonts to keep per image
    #[arg(long)]
    top_fonts: Option<usize>,

    /// Write the full batch report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Save every page mask here as .bmp
    #[arg(long)]
    save_masks: Option<PathBuf>,

    /// Save every cropped MRZ band here as .png
    #[arg(long)]
    save_crops: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    }
}

fn print_image(outcome: &ImageOutcome) {
    match outcome {
        ImageOutcome::Skipped { filename, reason, .. } => {
            println!("not able to find mrz for {} ({})", filename, reason);
        }
        ImageOutcome::Analyzed(report) => {
            println!("for file {}:", report.filename);
            for font in &report.fonts {
                println!(
                    "---------- {} -- Total similarity: {:.4} - Total found: {} - Total not found: {}",
                    font.font_name,
                    font.mean_similarity(),
                    font.total_found,
                    font.total_not_found
                );
            }
            let result = &report.result;
            match result.code {
                MrzCode::Correct => println!("file: {} is correct!", report.filename),
                code => println!(
                    "file: {} {} ({})",
                    report.filename,
                    code,
                    result.diagnostics.error_information.as_deref().unwrap_or("")
                ),
            }
            for line in &result.diagnostics.lines {
                println!("    {}", line);
            }
        }
    }
}

fn print_summary(report: &BatchReport) {
    println!();
    println!("MRZ not found: {}", report.not_found);
    if !report.unreadable.is_empty() {
        println!("Unreadable: {}", report.unreadable.join(", "));
    }
    for (code, count) in &report.counters {
        println!("{:>18} ({}): {}", code.as_str(), code.code(), count);
    }

    println!();
    println!("Letter statistics:");
    for (label, count) in report.letter_stats.iter() {
        println!(
            "  {}  correct: {:>5}  incorrect: {:>5}",
            label, count.correct, count.incorrect
        );
    }
    let totals = report.letter_stats.totals();
    println!("  all correct: {:>5}  incorrect: {:>5}", totals.correct, totals.incorrect);
}

fn scan(mut config: Config, args: ScanArgs) -> Result<()> {
    if let Some(font) = args.font {
        config.matching.font_selection = FontSelection::Named(font);
    }
    if let Some(threshold) = args.match_threshold {
        config.matching.threshold = threshold;
    }
    if let Some(top_fonts) = args.top_fonts {
        config.matching.top_fonts = top_fonts;
    }
    if args.save_masks.is_some() {
        config.output.masks_dir = args.save_masks;
    }
    if args.save_crops.is_some() {
        config.output.crops_dir = args.save_crops;
    }
    config.validate()?;

    let catalog = match (&args.catalog, &args.fonts) {
        (Some(path), _) => FingerprintCatalog::load(path, &config)?,
        (None, Some(fonts)) => FingerprintCatalog::from_font_directory(fonts, &config)?,
        (None, None) => {
            return Err(mrz_fingerprint::MrzError::InvalidConfig(
                "either --fonts or --catalog is required".to_string(),
            ))
        }
    };
    info!("Catalog holds {} fingerprints", catalog.len());

    let detector = MrzDetector::new(config, Arc::new(catalog), Arc::new(LetterStats::new()))?;
    let report = detector.run_directory(&args.images)?;

    for outcome in &report.images {
        print_image(outcome);
    }
    print_summary(&report);

    if let Some(path) = args.report {
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        info!("Report written to {}", path.display());
    }
    Ok(())
}

fn build_catalog(config: Config, fonts: PathBuf, output: PathBuf) -> Result<()> {
    let catalog = FingerprintCatalog::from_font_directory(&fonts, &config)?;
    catalog.save(&output)?;
    println!(
        "Saved {} fingerprints of {} fonts to {}",
        catalog.len(),
        catalog.font_names().count(),
        output.display()
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = load_config(cli.config.as_ref()).and_then(|config| match cli.command {
        Command::Scan(args) => scan(config, args),
        Command::BuildCatalog { fonts, output } => build_catalog(config, fonts, output),
    });

    if let Err(e) = outcome {
        error!("{}", e);
        std::process::exit(1);
    }
}
