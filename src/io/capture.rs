//! Frame capture
//!
//! The camera itself is external; it keeps writing its latest still frame
//! to a file which is read on demand when the operator scans.

use crate::domain::types::CapturedImage;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Supplies a still frame on demand, or nothing if none is available
pub trait FrameSource: Send + Sync {
    fn capture(&self) -> Option<CapturedImage>;
}

/// Reads the most recent frame from a file
pub struct FileFrameSource {
    path: PathBuf,
}

impl FileFrameSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for FileFrameSource {
    fn capture(&self) -> Option<CapturedImage> {
        match std::fs::read(&self.path) {
            Ok(data) if data.is_empty() => {
                warn!(path = %self.path.display(), "capture_frame_empty");
                None
            }
            Ok(data) => {
                debug!(path = %self.path.display(), bytes = %data.len(), "frame_captured");
                Some(CapturedImage::new(data))
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "capture_frame_unavailable");
                None
            }
        }
    }
}
