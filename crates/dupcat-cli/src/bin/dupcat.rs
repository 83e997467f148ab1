//! dupcat - find duplicate video/image files by perceptual fingerprint.
//!
//! Usage:
//!   dupcat scan --config config.toml      # enumerate, fingerprint, save, compare, rank
//!   dupcat compare --config config.toml   # compare + rank only, using an existing catalog
//!   dupcat subclip --config config.toml   # find sub-clip matches in the existing catalog

use anyhow::Result;
use clap::{Parser, Subcommand};
use dupcat_cli::output::{print_json_results, print_json_subclip_matches};
use dupcat_core::{CatalogStore, DuplicateComparator, FfmpegDecoder, ScanEngine, ScanSettings, SubClipMatcher};

#[derive(Parser, Debug)]
#[command(name = "dupcat")]
#[command(about = "Find duplicate video and image files", long_about = None)]
struct Args {
    /// Path to the scan settings file (TOML). Defaults to config.toml.
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enumerate, fingerprint, save, compare, and rank.
    Scan,
    /// Compare and rank using fingerprints already in the catalog.
    Compare,
    /// Find sub-clip matches among catalog entries.
    Subclip,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { log::LevelFilter::Info } else { log::LevelFilter::Warn };
    env_logger::Builder::from_default_env().filter_level(level).init();

    let settings = ScanSettings::load(std::path::Path::new(&args.config))?;
    let decoder = FfmpegDecoder::new();
    let engine = ScanEngine::new(&decoder);

    match args.command {
        Command::Scan => {
            let result = engine.start_search(
                &settings,
                &|progress| {
                    log::info!(
                        "{}/{} elapsed={:?} eta={:?} current={:?}",
                        progress.processed,
                        progress.total,
                        progress.elapsed,
                        progress.estimated_remaining,
                        progress.current_path
                    );
                },
                &|event| log::info!("scan event: {:?}", event),
            )?;
            print_json_results(&result);
        }
        Command::Compare => {
            let result = engine.start_compare(&settings)?;
            print_json_results(&result);
        }
        Command::Subclip => {
            let catalog = CatalogStore::load(&settings.catalog_path())?;
            let comparator = DuplicateComparator::new(&settings);
            let eligible = comparator.eligible(catalog.iter());
            let matcher = SubClipMatcher::new(&settings);
            let matches = matcher.find_matches(&eligible);
            print_json_subclip_matches(&matches);
        }
    }

    Ok(())
}
