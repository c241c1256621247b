use super::OutputFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Conversion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Encoder quality (0-100)
    pub quality: u8,
    /// Target format
    pub format: OutputFormat,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            quality: 80,
            format: OutputFormat::default(),
        }
    }
}

/// Performance configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Number of parallel workers, 0 = one per CPU
    pub workers: usize,
    /// Seconds before an in-flight job is considered stuck, 0 = never
    pub job_timeout_secs: u64,
}

impl PerformanceConfig {
    /// Resolved pool size, at least 1
    pub fn pool_size(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory converted files are written to
    pub directory: String,
    /// Suffix appended to the file stem
    pub suffix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "converted".to_string(),
            suffix: String::new(),
        }
    }
}
