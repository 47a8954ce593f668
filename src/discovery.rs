//! Local media discovery.

use std::path::{Path, PathBuf};

use crate::error::DiscoveryError;

/// Extensions accepted as uploadable video, compared case-insensitively.
pub const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "mov", "avi", "wmv", "flv", "webm", "mkv"];

/// Whether the path has one of the supported video extensions.
pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.iter().any(|v| e.eq_ignore_ascii_case(v)))
        .unwrap_or(false)
}

/// List video files directly inside `dir`, sorted by path.
pub fn discover_media(dir: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    if !dir.is_dir() {
        return Err(DiscoveryError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }
    let io_err = |source| DiscoveryError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut found = vec![];
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && is_video(&path) {
            found.push(path);
        }
    }
    found.sort();
    tracing::info!("discovered {} video(s) in {}", found.len(), dir.display());
    Ok(found)
}
