use crate::config::{AppConfig, OutputFormat};
use clap::Parser;
use std::path::PathBuf;

/// Batch-convert PNG and JPEG images
#[derive(Debug, Parser)]
#[command(name = "imgconverter", version, about)]
pub struct Cli {
    /// Image files or directories to convert
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Encoder quality, 0-100
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub quality: Option<u8>,

    /// Target format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Number of parallel workers (0 = one per CPU)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Suffix added to converted file names
    #[arg(long)]
    pub suffix: Option<String>,

    /// Retry failed files this many times
    #[arg(long, default_value_t = 0)]
    pub retries: u32,

    /// Give up on a single file after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print a JSON summary instead of text
    #[arg(long)]
    pub json: bool,

    /// Use this config file instead of the default one
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Overlay command-line flags on the loaded configuration
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(quality) = self.quality {
            config.conversion.quality = quality;
        }
        if let Some(format) = self.format {
            config.conversion.format = format;
        }
        if let Some(workers) = self.workers {
            config.performance.workers = workers;
        }
        if let Some(timeout) = self.timeout {
            config.performance.job_timeout_secs = timeout;
        }
        if let Some(output) = &self.output {
            config.output.directory = output.to_string_lossy().to_string();
        }
        if let Some(suffix) = &self.suffix {
            config.output.suffix = suffix.clone();
        }
    }
}
