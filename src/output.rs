//! Writes converted files to disk, one file per unit.

use crate::error::AppError;
use crate::queue::ExportEntry;
use crate::utils::disk_space;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Write every export into `dir`, creating it if needed. Name clashes get a
/// numeric suffix (`photo.jpg`, `photo-1.jpg`, ...). Returns the written paths.
pub fn write_exports(dir: &Path, exports: &[ExportEntry]) -> Result<Vec<PathBuf>, AppError> {
    std::fs::create_dir_all(dir)?;

    let required: u64 = exports.iter().map(|e| e.payload.len() as u64).sum();
    disk_space::ensure_space_for_exports(dir, required)?;

    let mut taken = HashSet::new();
    let mut written = Vec::with_capacity(exports.len());
    for export in exports {
        let name = unique_name(&export.output_name, &mut taken, dir);
        let path = dir.join(&name);
        std::fs::write(&path, &export.payload)?;
        written.push(path);
    }

    info!("Wrote {} files to {}", written.len(), dir.display());
    Ok(written)
}

fn unique_name(name: &str, taken: &mut HashSet<String>, dir: &Path) -> String {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut candidate = name.to_string();
    let mut counter = 1;
    while taken.contains(&candidate) || dir.join(&candidate).exists() {
        candidate = format!("{}-{}{}", stem, counter, ext);
        counter += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::UnitId;
    use bytes::Bytes;

    fn export(name: &str, data: &'static [u8]) -> ExportEntry {
        ExportEntry {
            id: UnitId::from(name),
            output_name: name.to_string(),
            payload: Bytes::from_static(data),
        }
    }

    #[test]
    fn test_writes_files_and_deduplicates_names() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let exports = vec![
            export("photo.jpg", b"one"),
            export("photo.jpg", b"two"),
            export("other.jpg", b"three"),
        ];

        let written = write_exports(&out, &exports).unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["photo.jpg", "photo-1.jpg", "other.jpg"]);
        assert_eq!(std::fs::read(out.join("photo-1.jpg")).unwrap(), b"two");
    }

    #[test]
    fn test_existing_files_are_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("photo.jpg"), b"keep").unwrap();

        let written = write_exports(dir.path(), &[export("photo.jpg", b"new")]).unwrap();
        assert_eq!(written[0], dir.path().join("photo-1.jpg"));
        assert_eq!(std::fs::read(dir.path().join("photo.jpg")).unwrap(), b"keep");
    }
}
