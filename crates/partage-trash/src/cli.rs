//! Command line flags

use clap::Parser;
use partage_store::CorruptPolicy;
use std::path::PathBuf;

/// Delete partage uploads whose expiry has passed
#[derive(Debug, Parser)]
#[command(name = "partage-trash", version)]
pub struct Args {
    /// Directory containing files
    #[arg(short = 'f', long = "files", default_value = "./files")]
    pub files_dir: PathBuf,

    /// Directory containing metadata
    #[arg(short = 'm', long = "meta", default_value = "./meta")]
    pub meta_dir: PathBuf,

    /// Verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Stop at the first unreadable metadata record instead of skipping it
    #[arg(long)]
    pub strict: bool,

    /// Seconds to keep expired files before deleting them
    #[arg(short = 'g', long = "grace", default_value_t = 0)]
    pub grace_secs: i64,
}

impl Args {
    pub fn corrupt_policy(&self) -> CorruptPolicy {
        if self.strict {
            CorruptPolicy::Abort
        } else {
            CorruptPolicy::Skip
        }
    }
}
