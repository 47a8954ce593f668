//! Canonical path identity used to deduplicate queued media.

use std::{
    fmt,
    path::{Component, Path, PathBuf},
};

/// Normalized absolute path of a media file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathKey(PathBuf);

impl PathKey {
    /// Canonicalize `path`, resolving symlinks when the file exists.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if let Ok(real) = std::fs::canonicalize(path) {
            return Self(real);
        }
        // Missing files still need a stable key: absolutize and drop `.`/`..` lexically.
        let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        Self(normalize_lexically(&abs))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// File name for display, falling back to the full path.
    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.0.display().to_string())
    }

    /// File stem, used for hashtag placeholders.
    pub fn file_stem(&self) -> String {
        self.0
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for PathKey {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_and_dotted_paths_share_a_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"x").expect("write");

        let dotted = dir.path().join("sub").join("..").join(".").join("clip.mp4");
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");

        assert_eq!(PathKey::new(&file), PathKey::new(&dotted));
    }

    #[test]
    fn missing_file_is_normalized_lexically() {
        let key = PathKey::new("/tmp/none/../videos/./a.mp4");
        assert_eq!(key.as_path(), Path::new("/tmp/videos/a.mp4"));
        assert_eq!(key.file_name(), "a.mp4");
        assert_eq!(key.file_stem(), "a");
    }

    #[test]
    fn relative_missing_path_becomes_absolute() {
        let key = PathKey::new("does-not-exist-here.mov");
        assert!(key.as_path().is_absolute());
    }
}
