// src/main.rs
// =============================================================================
// This is the entry point of site-mirror.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Set up logging (stderr, so stdout only carries the report)
// 3. Build and validate the Config, create the destination directory
// 4. Mirror the site
// 5. Print the report and exit (0 = mirror finished, 2 = error)
// =============================================================================

mod cli;     // src/cli.rs - command-line parsing
mod config;  // src/config.rs - validated run settings
mod error;   // src/error.rs - error types
mod mirror;  // src/mirror/ - the crawler itself
mod stats;   // src/stats.rs - per-worker counters

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use mirror::CrawlReport;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            // {:#} prints the whole context chain on one line
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let json = cli.json;
    let config = cli.into_config().context("invalid arguments")?;
    config
        .prepare_destination()
        .context("cannot prepare destination")?;

    let src = config.src.clone();
    let report = mirror::mirror_site(config)
        .await
        .with_context(|| format!("mirroring {} failed", src))?;

    print_report(&report, json)
}

// RUST_LOG wins when set; otherwise our own events at info (debug with -v)
// and everyone else's at warn
fn setup_logging(verbose: bool) {
    let default = if verbose {
        "site_mirror=debug,warn"
    } else {
        "site_mirror=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_report(report: &CrawlReport, json: bool) -> Result<()> {
    if json {
        let json_output = serde_json::to_string_pretty(report)?;
        println!("{}", json_output);
    } else {
        print_table(report);
    }
    Ok(())
}

fn print_table(report: &CrawlReport) {
    println!("{:<10} {:>10} {:>10} {:>10}", "WORKER", "PAGES", "GETS", "HEADS");
    println!("{}", "=".repeat(43));

    for w in &report.workers {
        println!("{:<10} {:>10} {:>10} {:>10}", w.worker, w.pages, w.gets, w.heads);
    }

    println!("{}", "-".repeat(43));
    println!(
        "{:<10} {:>10} {:>10} {:>10}",
        "total", report.pages, report.gets, report.heads
    );
    println!();
    println!("Summary:");
    println!("   Paths claimed: {}", report.claimed);
    println!("   Downloaded:    {}", report.gets);
    println!("   HEAD checks:   {}", report.heads);
}
