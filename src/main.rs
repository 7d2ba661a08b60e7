mod cli;
mod logging;
mod reporter;

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use cli::{CacheCommand, Cli, Commands, IngestArgs};
use colored::*;
use dotenv::dotenv;
use export_ingest::cache::DiskCache;
use export_ingest::engine::EntryOutcome;
use export_ingest::{AppConfig, IngestEngine};
use reporter::CliReporter;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match export_ingest::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Ingest(ingest_args)) => run_ingest(config, &ingest_args),
        Some(Commands::Detect { root }) => run_detect(config, &root),
        Some(Commands::Cache(command)) => run_cache(&config, command),
        Some(Commands::PrintConfig) => print_config(&config),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn run_ingest(mut config: AppConfig, args: &IngestArgs) -> anyhow::Result<()> {
    if args.concurrency.is_some() {
        config.concurrency = args.concurrency;
    }
    if args.no_cache {
        config.cache.bypass = true;
    }

    let engine = IngestEngine::new(config);
    let reporter = CliReporter::new();
    let result = engine.run(&args.root, &reporter)?;
    let manifest = &result.manifest;

    println!();
    info!(
        "Detect: {}, Parse: {}",
        format!("{:.2}s", result.detect_duration.as_secs_f64()).green(),
        format!("{:.2}s", result.parse_duration.as_secs_f64()).green(),
    );
    for (category, batch) in &result.batches {
        info!(
            "{:>12}: {} records, {} warnings",
            category.as_str(),
            format!("{}", batch.records.len()).cyan(),
            format!("{}", batch.warnings.len()).yellow(),
        );
    }
    info!(
        "{} files succeeded, {} failed, {} cancelled",
        format!("{}", manifest.succeeded()).green(),
        format!("{}", manifest.failed()).red(),
        format!("{}", manifest.cancelled()).yellow(),
    );
    info!(
        "Cache: {} memory hits, {} disk hits, {} parsed",
        manifest.cache.memory_hits, manifest.cache.disk_hits, manifest.cache.computed,
    );

    for entry in &manifest.entries {
        if let EntryOutcome::Failed { message, attempts, .. } = &entry.outcome {
            warn!("{} ({} attempts): {}", entry.path.display(), attempts, message);
        }
    }
    for message in &manifest.cache_warnings {
        warn!("{}", message);
    }
    if !manifest.validation.is_valid() {
        warn!(
            "Export is missing: {}",
            manifest.validation.missing.join(", ").red()
        );
    }

    if let Some(path) = &args.manifest {
        fs::write(path, manifest.to_json()?)
            .with_context(|| format!("writing manifest to {}", path.display()))?;
        info!("Manifest written to {}", path.display());
    }

    Ok(())
}

fn run_detect(config: AppConfig, root: &Path) -> anyhow::Result<()> {
    let engine = IngestEngine::new(config);
    let detection = engine.detect(root)?;

    println!("{}", detection.root.display().to_string().bold());
    for (category, files) in &detection.files {
        println!("  {} ({})", category.as_str().cyan(), files.len());
        for file in files {
            println!(
                "    {:?} {}",
                file.generation,
                file.path
                    .strip_prefix(&detection.root)
                    .unwrap_or(&file.path)
                    .display()
            );
        }
    }
    if !detection.unknown.is_empty() {
        println!("  {} ({})", "unknown".yellow(), detection.unknown.len());
        for path in &detection.unknown {
            println!("    {}", path.display());
        }
    }
    println!("  media files: {}", detection.media_files);

    match detection.validation.to_result() {
        Ok(()) => println!("{}", "Export structure is valid".green()),
        Err(err) => println!("{}", err.to_string().red()),
    }
    Ok(())
}

fn run_cache(config: &AppConfig, command: CacheCommand) -> anyhow::Result<()> {
    let Some(path) = &config.cache.disk_path else {
        bail!("no persistent cache configured (cache.disk_path)");
    };
    let cache = DiskCache::open(path)?;

    match command {
        CacheCommand::Count => {
            info!("Counting persistent cache entries...");
            println!("{} entries in {}", cache.count_keys()?, cache.path().display());
        }
        CacheCommand::Clear => {
            if prompt_confirm("Are you SURE you want to delete every cached result?", Some(false))? {
                let removed = cache.clear_all()?;
                println!("Removed {} entries", removed);
            }
        }
        CacheCommand::Sweep { older_than_days } => {
            let age = days_to_duration(older_than_days);
            let removed = cache.sweep_older_than(age)?;
            println!("Removed {} entries older than {} days", removed, older_than_days);
        }
    }
    Ok(())
}

fn days_to_duration(days: u64) -> Duration {
    Duration::from_secs(days.saturating_mul(24 * 60 * 60))
}

fn print_config(config: &AppConfig) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(config).context("rendering configuration")?;
    println!("{}", rendered);
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
