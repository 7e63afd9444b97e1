mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use crate::commands::{ChunkStats, RegionInfo, VerifyReport, WorldStats};
use crate::config::HystoreConfig;

#[derive(Parser, Debug)]
#[clap(about, version, author)]
struct Args {
    /// TOML configuration file. Defaults apply when it does not exist.
    #[clap(long, default_value = "hystore.toml")]
    config: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the header and occupancy of one region file.
    Info { region: PathBuf },
    /// Decode present chunks of a world and print per-chunk statistics.
    Analyze {
        world: PathBuf,
        /// Stop after this many chunks.
        #[clap(long)]
        limit: Option<usize>,
    },
    /// Decode every stored chunk of a world and report failures.
    Verify { world: PathBuf },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match HystoreConfig::load_or_default(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", args.config.display());
            return ExitCode::FAILURE;
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    match run(args.command, &config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Run one command; `Ok(false)` means it completed but found problems.
fn run(command: Command, config: &HystoreConfig) -> Result<bool, Box<dyn std::error::Error>> {
    match command {
        Command::Info { region } => {
            let info = commands::region_info(&region, &config.storage)?;
            print_info(&region, &info);
            Ok(true)
        }
        Command::Analyze { world, limit } => {
            info!(world = %world.display(), "analyzing world");
            let stats = commands::analyze_world(&world, config.storage, limit)?;
            print_stats(&stats);
            Ok(true)
        }
        Command::Verify { world } => {
            info!(world = %world.display(), "verifying world");
            let report = commands::verify_world(&world, config.storage)?;
            print_report(&report);
            Ok(report.failures.is_empty())
        }
    }
}

fn print_info(path: &std::path::Path, info: &RegionInfo) {
    println!("{}", path.display());
    println!("  version:         {}", info.header.version);
    println!("  blob count:      {}", info.header.blob_count);
    println!("  segment size:    {}", info.header.segment_size);
    println!("  chunks stored:   {}", info.chunks);
    println!("  segments in use: {}", info.segments_in_use);
    println!("  file length:     {}", info.file_len);
}

fn print_chunk(stats: &ChunkStats) {
    let environments: Vec<String> = stats
        .environments
        .iter()
        .map(|(name, count)| format!("{name}={count}"))
        .collect();
    println!(
        "chunk {:>5} {:>5}  blocks {:>7}  fluids {:>7}  height {}..{}  env [{}]",
        stats.x,
        stats.z,
        stats.blocks,
        stats.fluids,
        stats.min_height,
        stats.max_height,
        environments.join(", ")
    );
}

fn print_stats(stats: &WorldStats) {
    for chunk in &stats.chunks {
        print_chunk(chunk);
    }
    println!();
    println!(
        "{} chunks{}",
        stats.chunks.len(),
        if stats.truncated { " (limit reached)" } else { "" }
    );
    println!("  blocks: {}", stats.total_blocks());
    println!("  fluids: {}", stats.total_fluids());
    for (name, count) in stats.environments() {
        println!("  {name}: {count} columns");
    }
}

fn print_report(report: &VerifyReport) {
    for failure in &report.failures {
        match failure.chunk {
            Some((x, z)) => println!("chunk {x} {z}: {}", failure.error),
            None => println!(
                "region {} {}: {}",
                failure.region.0, failure.region.1, failure.error
            ),
        }
    }
    println!(
        "{} regions, {} chunks ok, {} failures",
        report.regions,
        report.chunks_ok,
        report.failures.len()
    );
}
