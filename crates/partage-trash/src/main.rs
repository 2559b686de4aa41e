//! partage-trash - purges expired partage uploads
//!
//! Meant to run from cron or a systemd timer. Each run is a single pass over
//! the metadata directory; any I/O failure ends the run with a non-zero exit
//! status, leaving deletions made so far in place.

mod cli;
mod error;

use crate::cli::Args;
use crate::error::Result;
use clap::Parser;
use partage_store::{human_bytes, BlobStore, MetadataStore, SweepReport, Sweeper};
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::from_default_env()
        .add_directive(format!("partage_trash={}", level).parse()?)
        .add_directive(format!("partage_store={}", level).parse()?);

    // Use JSON format for Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    match run(&args).await {
        Ok(report) => {
            if report.scanned > 0 {
                info!("{}", summary(&report));
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Sweep aborted");
            Err(e)
        }
    }
}

async fn run(args: &Args) -> Result<SweepReport> {
    info!(
        files_dir = ?args.files_dir,
        meta_dir = ?args.meta_dir,
        strict = args.strict,
        grace_secs = args.grace_secs,
        "Sweeping expired files"
    );

    let sweeper = Sweeper::new(
        BlobStore::new(args.files_dir.clone()),
        MetadataStore::new(args.meta_dir.clone()),
    )
    .with_policy(args.corrupt_policy())
    .with_grace(args.grace_secs);

    Ok(sweeper.sweep().await?)
}

/// One line report, e.g. `2/5 file(s) deleted (remaining: 1.5 MiB)`
fn summary(report: &SweepReport) -> String {
    let mut line = format!(
        "{}/{} file(s) deleted (remaining: {})",
        report.deleted,
        report.scanned,
        human_bytes(report.retained_bytes)
    );
    if report.skipped > 0 {
        line.push_str(&format!(", {} unreadable record(s) skipped", report.skipped));
    }
    line
}
