//! Still images as frames: document photos, uploaded selfies, test stills.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use veriface_core::{Frame, FrameSource, FrameSourceError};

#[derive(Error, Debug)]
pub enum StillImageError {
    #[error("failed to load image {path}: {source}")]
    Load {
        path: String,
        source: image::ImageError,
    },
}

/// Decode an image file into a grayscale frame with sequence 0.
pub fn load_frame(path: &Path) -> Result<Frame, StillImageError> {
    let img = image::open(path)
        .map_err(|source| StillImageError::Load {
            path: path.display().to_string(),
            source,
        })?
        .to_luma8();
    let (width, height) = img.dimensions();
    tracing::debug!(path = %path.display(), width, height, "loaded still image");
    Ok(Frame::new(img.into_raw(), width, height, 0))
}

enum Still {
    Path(PathBuf),
    Decoded(Frame),
}

/// Yields the same image on every pull, with increasing sequence numbers.
///
/// A path-backed source decodes on `start`, so a missing or corrupt file
/// surfaces as an acquisition failure.
pub struct StillImageSource {
    still: Still,
    current: Option<Frame>,
    next_sequence: u64,
}

impl StillImageSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            still: Still::Path(path.into()),
            current: None,
            next_sequence: 0,
        }
    }

    pub fn from_frame(frame: Frame) -> Self {
        Self {
            still: Still::Decoded(frame),
            current: None,
            next_sequence: 0,
        }
    }
}

#[async_trait]
impl FrameSource for StillImageSource {
    async fn start(&mut self) -> Result<(), FrameSourceError> {
        let frame = match &self.still {
            Still::Decoded(frame) => frame.clone(),
            Still::Path(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || load_frame(&path))
                    .await
                    .map_err(|e| FrameSourceError::Unavailable(format!("decode task failed: {e}")))?
                    .map_err(|e| FrameSourceError::Unavailable(e.to_string()))?
            }
        };
        self.current = Some(frame);
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Frame, FrameSourceError> {
        let still = self.current.as_ref().ok_or(FrameSourceError::NotStarted)?;
        let frame = Frame::new(still.data.clone(), still.width, still.height, self.next_sequence);
        self.next_sequence += 1;
        Ok(frame)
    }

    fn stop(&mut self) {
        self.current = None;
    }

    fn is_active(&self) -> bool {
        self.current.is_some()
    }
}
