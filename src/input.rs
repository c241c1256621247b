//! Turns command-line paths into input files for the controller.

use crate::error::AppError;
use crate::queue::{InputFile, MimeType, is_image_file};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const UNKNOWN_MIME: &str = "application/octet-stream";

/// Expand inputs into file paths.
///
/// Files are taken as given; directories contribute the PNG/JPEG files they
/// contain, descending into subdirectories only when `recursive` is set.
pub fn collect_paths(inputs: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let max_depth = if recursive { usize::MAX } else { 1 };
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .max_depth(max_depth)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| is_image_file(p))
                .collect();
            found.sort();
            debug!("Found {} images in {}", found.len(), input.display());
            paths.extend(found);
        } else if input.exists() {
            paths.push(input.clone());
        } else {
            warn!("Input does not exist: {}", input.display());
        }
    }

    paths
}

/// Read one file into memory, deriving its MIME type from the extension
pub fn read_input(path: &Path) -> Result<InputFile, AppError> {
    let data = std::fs::read(path).map_err(|source| AppError::ReadInput {
        path: path.to_path_buf(),
        source,
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let mime = MimeType::from_path(path)
        .map(|m| m.as_str())
        .unwrap_or(UNKNOWN_MIME);

    Ok(InputFile::new(name, Bytes::from(data), mime))
}

/// Read every path, skipping (and logging) files that cannot be read
pub fn read_inputs(paths: &[PathBuf]) -> Vec<InputFile> {
    paths
        .iter()
        .filter_map(|path| match read_input(path) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("{}", e);
                None
            }
        })
        .collect()
}
