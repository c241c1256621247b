use crate::error::AppError;
use std::path::Path;

/// Free bytes on the filesystem holding `dir`, if the platform can tell
#[cfg(unix)]
pub fn available_space(dir: &Path) -> Option<u64> {
    use nix::sys::statvfs::statvfs;
    let stat = statvfs(dir).ok()?;
    Some(stat.blocks_available() as u64 * stat.fragment_size() as u64)
}

#[cfg(not(unix))]
pub fn available_space(_dir: &Path) -> Option<u64> {
    None
}

/// Fail before writing converted files into `dir` when they cannot fit.
/// Unknown free space passes.
pub fn ensure_space_for_exports(dir: &Path, required: u64) -> Result<(), AppError> {
    match available_space(dir) {
        Some(available) if available <= required => Err(AppError::InsufficientSpace {
            path: dir.to_path_buf(),
            required,
        }),
        _ => Ok(()),
    }
}
