use serde::{Deserialize, Serialize};

/// Target formats the converter can produce. Both are lossy and honour the
/// quality setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Webp,
    Jpeg,
}

impl OutputFormat {
    /// File extension for converted files
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
        }
    }

    /// Display name for reports
    pub fn display_name(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "WebP",
            OutputFormat::Jpeg => "JPEG",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
