//! Media file descriptor
//!
//! Supplied by the media catalog. The scheduler only reads `duration` and
//! passes `path` through to the playback device.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// A playable media file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Full path of the file on disk
    pub path: PathBuf,

    /// Display name
    pub name: String,

    /// Total play duration
    pub duration: Duration,

    /// Thumbnail image, when the catalog produced one
    pub thumbnail: Option<PathBuf>,
}

impl MediaFile {
    /// Create a descriptor named after the file stem
    pub fn new(path: impl Into<PathBuf>, duration: Duration) -> Self {
        let path = path.into();
        let name = display_name(&path);
        Self {
            path,
            name,
            duration,
            thumbnail: None,
        }
    }

    /// Override the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach a thumbnail
    pub fn with_thumbnail(mut self, thumbnail: impl Into<PathBuf>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }
}

fn display_name(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
