use crate::config::OutputFormat;
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Session-unique identifier of a work unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    /// Build an id from the file name, the current time and a random salt, so
    /// two submissions of the same file never collide.
    pub fn generate(name: &str) -> Self {
        let salt = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}-{}-{}",
            name,
            Utc::now().timestamp_millis(),
            &salt[..12]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Input image types the converter accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeType {
    Png,
    Jpeg,
}

impl MimeType {
    /// Parse a MIME type or bare subtype; anything but PNG/JPEG yields `None`
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        let subtype = value.strip_prefix("image/").unwrap_or(&value);
        match subtype {
            "png" => Some(MimeType::Png),
            "jpeg" | "jpg" | "pjpeg" => Some(MimeType::Jpeg),
            _ => None,
        }
    }

    /// Guess from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::parse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MimeType::Png => "image/png",
            MimeType::Jpeg => "image/jpeg",
        }
    }
}

/// Check if a path looks like a convertible image
pub fn is_image_file(path: &Path) -> bool {
    MimeType::from_path(path).is_some()
}

/// One file handed over by the input side, before validation
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub size: u64,
    pub payload: Bytes,
    pub mime: String,
}

impl InputFile {
    pub fn new(name: impl Into<String>, payload: impl Into<Bytes>, mime: impl Into<String>) -> Self {
        let payload = payload.into();
        Self {
            name: name.into(),
            size: payload.len() as u64,
            payload,
            mime: mime.into(),
        }
    }
}

/// Status of a work unit, without attached data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Pending,
    Converting,
    Done,
    Error,
}

/// How a status is shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusBadge {
    pub symbol: &'static str,
    pub label: &'static str,
}

impl StatusKind {
    pub fn badge(&self) -> StatusBadge {
        match self {
            StatusKind::Pending => StatusBadge {
                symbol: "○",
                label: "Waiting",
            },
            StatusKind::Converting => StatusBadge {
                symbol: "▶",
                label: "Converting",
            },
            StatusKind::Done => StatusBadge {
                symbol: "✓",
                label: "Done",
            },
            StatusKind::Error => StatusBadge {
                symbol: "✗",
                label: "Error",
            },
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.badge().label)
    }
}

/// Conversion state of a work unit
#[derive(Debug, Clone)]
pub enum UnitStatus {
    /// Waiting to be dispatched
    Pending,
    /// Running on a pool slot
    Converting,
    /// Converted; the encoded payload lives here and nowhere else
    Done { output: Bytes, size: u64 },
    /// Failed with a user-facing message
    Error { message: String },
}

impl UnitStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            UnitStatus::Pending => StatusKind::Pending,
            UnitStatus::Converting => StatusKind::Converting,
            UnitStatus::Done { .. } => StatusKind::Done,
            UnitStatus::Error { .. } => StatusKind::Error,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        UnitStatus::Error {
            message: message.into(),
        }
    }

    /// Whether moving from `self` to `next` follows the lifecycle
    pub fn can_transition_to(&self, next: &UnitStatus) -> bool {
        use StatusKind::*;
        matches!(
            (self.kind(), next.kind()),
            (Pending, Converting)
                | (Pending, Error)
                | (Converting, Done)
                | (Converting, Error)
                | (Error, Pending)
                | (Error, Converting)
                | (Error, Error)
        )
    }
}

/// Change notification for display subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub id: UnitId,
    pub name: String,
    pub status: StatusKind,
}

/// One submitted image and its conversion state
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub id: UnitId,
    pub name: String,
    pub mime: MimeType,
    pub original_size: u64,
    pub status: UnitStatus,
}

impl WorkUnit {
    /// Create a new pending unit
    pub fn new(name: impl Into<String>, mime: MimeType, original_size: u64) -> Self {
        let name = name.into();
        Self {
            id: UnitId::generate(&name),
            name,
            mime,
            original_size,
            status: UnitStatus::Pending,
        }
    }

    pub fn kind(&self) -> StatusKind {
        self.status.kind()
    }

    pub fn converted_size(&self) -> Option<u64> {
        match &self.status {
            UnitStatus::Done { size, .. } => Some(*size),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            UnitStatus::Error { message } => Some(message),
            _ => None,
        }
    }

    /// Name of the converted file, e.g. `photo.png` -> `photo_small.webp`
    pub fn output_name(&self, format: OutputFormat, suffix: &str) -> String {
        let stem = Path::new(&self.name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.name.clone());
        format!("{}{}.{}", stem, suffix, format.extension())
    }

    /// Calculate size reduction if the unit is converted
    pub fn size_reduction(&self) -> Option<(u64, f64)> {
        match self.converted_size() {
            Some(output) if self.original_size > 0 => {
                let saved = self.original_size.saturating_sub(output);
                let percent = (saved as f64 / self.original_size as f64) * 100.0;
                Some((saved, percent))
            }
            _ => None,
        }
    }
}
