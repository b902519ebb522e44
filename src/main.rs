//! trophy-crawler - Quota-Constrained Parallel BFS Player Crawler
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use trophy_crawler::config::{CliArgs, CrawlConfig, OutputFormat};
use trophy_crawler::crawler::{BfsDriver, CrawlEvent, TerminationReason};
use trophy_crawler::error::WorkerError;
use trophy_crawler::output::{stream_records, stream_refreshes, ResultWriter};
use trophy_crawler::progress::{print_header, print_summary, ProgressReporter};
use trophy_crawler::seed::load_seeds;
use trophy_crawler::source::HttpSource;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = CrawlConfig::from_args(args).context("Invalid configuration")?;

    let seeds = load_seeds(&config.input_path).context("Failed to load seed players")?;
    if !seeds.rejected.is_empty() {
        warn!(
            rejected = seeds.rejected.len(),
            "Some seed records were malformed and skipped"
        );
    }

    let quota = Arc::new(config.allocator().context("Invalid quota configuration")?);
    let source = Arc::new(HttpSource::new(&config.http).context("Failed to create HTTP client")?);

    if config.output_format != OutputFormat::Sqlite {
        info!("Using {} output format", format_name(config.output_format));
    }
    let writer = ResultWriter::create(&config.output_path, config.output_format)
        .context("Failed to open output")?;

    // Print header
    if config.show_progress {
        print_header(
            &config.input_path.display().to_string(),
            config.strategy,
            config.total_quota,
            config.settings.workers,
            &config.output_path.display().to_string(),
        );
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            abandon(writer);
            return Err(WorkerError::InitFailed {
                reason: e.to_string(),
            })
            .context("Failed to create async runtime");
        }
    };

    let driver = BfsDriver::new(config.settings.clone(), quota, source);

    // Setup signal handler for graceful shutdown
    let shutdown_flag = driver.shutdown_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing in-flight players...");
        shutdown_flag.store(true, Ordering::SeqCst);
    }) {
        abandon(writer);
        return Err(e).context("Failed to set signal handler");
    }

    // Create progress reporter
    let progress = if config.show_progress {
        ProgressReporter::new()
    } else {
        ProgressReporter::hidden()
    };
    progress.set_status("Admitting seed players...");

    let seed_origin = seeds.origin.clone();
    let handle = writer.handle();
    let outcome = runtime.block_on(driver.run_with(seeds, |event| match event {
        CrawlEvent::Progress(p) => {
            if config.show_progress {
                progress.update(p);
            } else {
                info!("{}", p.status_line());
            }
        }
        CrawlEvent::Seeded(records) => {
            if let Some(ref h) = handle {
                stream_records(h, records);
            }
        }
        CrawlEvent::LevelComplete {
            admitted,
            refreshes,
            ..
        } => {
            if let Some(ref h) = handle {
                stream_records(h, admitted);
                stream_refreshes(h, refreshes);
            }
        }
        CrawlEvent::State(_) => {}
    }));
    progress.finish_and_clear();

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            abandon(writer);
            return Err(e).context("Crawl failed");
        }
    };

    writer
        .finish(&seed_origin, &result)
        .context("Failed to write crawl output")?;

    // Print summary
    if config.show_progress {
        print_summary(&result.summary, &config.output_path.display().to_string());
    }

    if result.summary.termination == TerminationReason::Interrupted {
        info!("Crawl was interrupted before completion");
    }

    if result.summary.failed_fetches > 0 {
        info!(
            failed = result.summary.failed_fetches,
            "Crawl completed with failed fetches"
        );
    }

    Ok(())
}

fn abandon(writer: ResultWriter) {
    if let Err(e) = writer.abandon() {
        warn!(error = %e, "Failed to close output cleanly");
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("trophy_crawler=debug,warn")
    } else {
        EnvFilter::new("trophy_crawler=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}

fn format_name(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Sqlite => "SQLite",
        OutputFormat::Json => "JSON",
    }
}
