//! Frame type and the `FrameSource` abstraction with scoped acquisition.

use async_trait::async_trait;
use std::time::Instant;
use thiserror::Error;

/// Fraction of near-black pixels above which a frame counts as dark.
const DARK_FRAME_THRESHOLD: f32 = 0.95;

/// A grayscale frame handed to the face model.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic per-source sequence number.
    pub sequence: u64,
    pub captured_at: Instant,
    pub is_dark: bool,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        let is_dark = is_dark_frame(&data, DARK_FRAME_THRESHOLD);
        Self {
            data,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
            is_dark,
        }
    }

    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }
}

/// Returns true if more than `threshold_pct` of pixels are below 32.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

#[derive(Error, Debug)]
pub enum FrameSourceError {
    #[error("frame source unavailable: {0}")]
    Unavailable(String),
    #[error("frame capture failed: {0}")]
    Capture(String),
    #[error("frame source not started")]
    NotStarted,
}

/// Something that yields frames on pull: a live camera, a still image,
/// or a recorded fixture.
#[async_trait]
pub trait FrameSource: Send {
    /// Acquire the underlying resource.
    async fn start(&mut self) -> Result<(), FrameSourceError>;

    /// Pull the next frame. Only valid between `start` and `stop`.
    async fn next_frame(&mut self) -> Result<Frame, FrameSourceError>;

    /// Release the underlying resource. Must be idempotent.
    fn stop(&mut self);

    fn is_active(&self) -> bool;
}

/// A started frame source. Dropping the guard stops the source.
pub struct ActiveSource<'a, S: FrameSource + ?Sized> {
    source: &'a mut S,
}

impl<'a, S: FrameSource + ?Sized> ActiveSource<'a, S> {
    pub async fn acquire(source: &'a mut S) -> Result<Self, FrameSourceError> {
        if let Err(e) = source.start().await {
            // start may have partially acquired before failing
            source.stop();
            return Err(e);
        }
        Ok(Self { source })
    }

    pub async fn next_frame(&mut self) -> Result<Frame, FrameSourceError> {
        self.source.next_frame().await
    }
}

impl<S: FrameSource + ?Sized> Drop for ActiveSource<'_, S> {
    fn drop(&mut self) {
        self.source.stop();
        tracing::debug!("frame source released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingSource {
        active: bool,
        starts: usize,
        stops: usize,
        fail_start: bool,
    }

    #[async_trait]
    impl FrameSource for CountingSource {
        async fn start(&mut self) -> Result<(), FrameSourceError> {
            self.starts += 1;
            if self.fail_start {
                return Err(FrameSourceError::Unavailable("denied".into()));
            }
            self.active = true;
            Ok(())
        }

        async fn next_frame(&mut self) -> Result<Frame, FrameSourceError> {
            if !self.active {
                return Err(FrameSourceError::NotStarted);
            }
            Ok(Frame::new(vec![128], 1, 1, 0))
        }

        fn stop(&mut self) {
            self.active = false;
            self.stops += 1;
        }

        fn is_active(&self) -> bool {
            self.active
        }
    }

    fn counting(fail_start: bool) -> CountingSource {
        CountingSource { active: false, starts: 0, stops: 0, fail_start }
    }

    #[tokio::test]
    async fn test_guard_releases_on_drop() {
        let mut src = counting(false);
        {
            let mut active = ActiveSource::acquire(&mut src).await.unwrap();
            assert!(active.next_frame().await.is_ok());
        }
        assert!(!src.is_active());
        assert_eq!(src.stops, 1);
    }

    #[tokio::test]
    async fn test_guard_failed_start_still_stops() {
        let mut src = counting(true);
        let err = ActiveSource::acquire(&mut src).await.err();
        assert!(matches!(err, Some(FrameSourceError::Unavailable(_))));
        assert_eq!(src.starts, 1);
        assert_eq!(src.stops, 1);
    }

    #[test]
    fn test_dark_frame_detection() {
        assert!(is_dark_frame(&[0u8; 100], DARK_FRAME_THRESHOLD));
        assert!(!is_dark_frame(&[128u8; 100], DARK_FRAME_THRESHOLD));
        assert!(is_dark_frame(&[], DARK_FRAME_THRESHOLD));

        let mut borderline = vec![10u8; 940];
        borderline.extend(vec![128u8; 60]);
        assert!(!is_dark_frame(&borderline, DARK_FRAME_THRESHOLD));
    }

    #[test]
    fn test_frame_new_flags_dark() {
        assert!(Frame::new(vec![0; 16], 4, 4, 0).is_dark);
        let f = Frame::new(vec![200; 16], 4, 4, 3);
        assert!(!f.is_dark);
        assert_eq!(f.sequence, 3);
        assert!((f.avg_brightness() - 200.0).abs() < 1e-6);
    }
}
