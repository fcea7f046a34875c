//! Debug dump hooks for intermediate pipeline stages
//!
//! Pipelines report intermediate buffers (edge maps, masks, markers) to a
//! [`DebugSink`]. The default sink discards them; [`DirectoryDebugSink`]
//! writes each stage as a PNG so a run can be inspected afterwards.

use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Receiver for intermediate images produced while segmenting
pub trait DebugSink {
    /// Record an intermediate image under a short stage name
    fn dump(&self, stage: &str, image: &DynamicImage);
}

/// Sink that discards every dump
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpDebugSink;

impl DebugSink for NoOpDebugSink {
    fn dump(&self, _stage: &str, _image: &DynamicImage) {}
}

/// Sink that writes `<prefix>_<stage>.png` files into a directory
#[derive(Debug, Clone)]
pub struct DirectoryDebugSink {
    dir: PathBuf,
    prefix: String,
}

impl DirectoryDebugSink {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(dir: P, prefix: S) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a given stage is written to
    #[must_use]
    pub fn stage_path(&self, stage: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.png", self.prefix, stage))
    }
}

impl DebugSink for DirectoryDebugSink {
    fn dump(&self, stage: &str, image: &DynamicImage) {
        let path = self.stage_path(stage);
        // Dumps are best effort and never fail the pipeline
        match crate::services::ImageIOService::save_png(image, &path) {
            Ok(()) => debug!(stage, path = %path.display(), "Wrote debug dump"),
            Err(e) => warn!(stage, error = %e, "Failed to write debug dump"),
        }
    }
}
