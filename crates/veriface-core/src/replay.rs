//! Recorded-fixture adapters for deterministic replay.
//!
//! A [`Fixture`] scripts what the face model "sees" on each frame.
//! [`FixtureSource`] produces placeholder frames numbered 0, 1, 2, …, and
//! [`FixtureModel`] answers for each frame by its sequence number, so a
//! liveness session or comparison can be replayed without camera or model.

use crate::frame::{Frame, FrameSource, FrameSourceError};
use crate::model::{FaceModel, ModelError};
use crate::types::{Expressions, FaceDescriptor, FaceLandmarks, FaceRegion, Point};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Placeholder pixel value: mid grey, never dark.
const FIXTURE_PIXEL: u8 = 128;

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("failed to read fixture {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid fixture: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Scripted per-frame model output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub frames: Vec<FixtureFrame>,
    /// Past the end of `frames`, keep answering with the last frame
    /// instead of "no face".
    #[serde(default)]
    pub repeat_last: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureFrame {
    /// `None` means no face is detected on this frame.
    #[serde(default)]
    pub face: Option<FixtureFace>,
    /// When set, every inference call on this frame fails with this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureFace {
    pub region: FaceRegion,
    pub landmarks: Vec<Point>,
    #[serde(default)]
    pub expressions: Expressions,
    pub descriptor: FaceDescriptor,
}

impl Fixture {
    pub fn from_json(src: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(src)?)
    }

    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let src = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&src)
    }

    fn frame(&self, sequence: u64) -> Option<&FixtureFrame> {
        let idx = usize::try_from(sequence).ok()?;
        match self.frames.get(idx) {
            Some(f) => Some(f),
            None if self.repeat_last => self.frames.last(),
            None => None,
        }
    }
}

/// Face model that replays a [`Fixture`].
#[derive(Debug)]
pub struct FixtureModel {
    fixture: Fixture,
    ready: AtomicBool,
    unavailable_from: Option<u64>,
}

impl FixtureModel {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            fixture,
            ready: AtomicBool::new(true),
            unavailable_from: None,
        }
    }

    /// Go unavailable on the first frame with sequence `>= sequence`,
    /// like a model whose backend dies mid-session.
    pub fn unavailable_from(mut self, sequence: u64) -> Self {
        self.unavailable_from = Some(sequence);
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    fn face(&self, frame: &Frame) -> Result<Option<&FixtureFace>, ModelError> {
        if self.unavailable_from.is_some_and(|from| frame.sequence >= from) {
            self.set_ready(false);
        }
        if !self.is_ready() {
            return Err(ModelError::Unavailable);
        }
        let Some(scripted) = self.fixture.frame(frame.sequence) else {
            return Ok(None);
        };
        if let Some(msg) = &scripted.inference_error {
            return Err(ModelError::InferenceFailed(msg.clone()));
        }
        Ok(scripted.face.as_ref())
    }

    fn require_face(&self, frame: &Frame) -> Result<&FixtureFace, ModelError> {
        self.face(frame)?.ok_or_else(|| {
            ModelError::InferenceFailed(format!("no scripted face for frame {}", frame.sequence))
        })
    }
}

#[async_trait]
impl FaceModel for FixtureModel {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn detect(&self, frame: &Frame) -> Result<Option<FaceRegion>, ModelError> {
        Ok(self.face(frame)?.map(|f| f.region.clone()))
    }

    async fn landmarks(&self, frame: &Frame, _: &FaceRegion) -> Result<FaceLandmarks, ModelError> {
        let face = self.require_face(frame)?;
        Ok(FaceLandmarks { points: face.landmarks.clone() })
    }

    async fn descriptor(
        &self,
        frame: &Frame,
        _: &FaceRegion,
    ) -> Result<FaceDescriptor, ModelError> {
        Ok(self.require_face(frame)?.descriptor.clone())
    }

    async fn expressions(&self, frame: &Frame, _: &FaceRegion) -> Result<Expressions, ModelError> {
        Ok(self.require_face(frame)?.expressions.clone())
    }
}

/// Endless source of placeholder frames numbered from zero.
#[derive(Debug, Default)]
pub struct FixtureSource {
    next_sequence: u64,
    active: bool,
    denied: Option<String>,
    fail_after: Option<u64>,
    starts: usize,
    stops: usize,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose acquisition always fails, like a denied camera.
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            denied: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Serve `frames` frames, then fail every capture, like a camera
    /// unplugged mid-session.
    pub fn fail_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Frames handed out so far.
    pub fn frames_served(&self) -> u64 {
        self.next_sequence
    }

    pub fn starts(&self) -> usize {
        self.starts
    }

    pub fn stops(&self) -> usize {
        self.stops
    }
}

#[async_trait]
impl FrameSource for FixtureSource {
    async fn start(&mut self) -> Result<(), FrameSourceError> {
        self.starts += 1;
        if let Some(reason) = &self.denied {
            return Err(FrameSourceError::Unavailable(reason.clone()));
        }
        self.active = true;
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Frame, FrameSourceError> {
        if !self.active {
            return Err(FrameSourceError::NotStarted);
        }
        if self.fail_after.is_some_and(|n| self.next_sequence >= n) {
            return Err(FrameSourceError::Capture(format!(
                "device lost after {} frames",
                self.next_sequence
            )));
        }
        let frame = Frame::new(vec![FIXTURE_PIXEL], 1, 1, self.next_sequence);
        self.next_sequence += 1;
        Ok(frame)
    }

    fn stop(&mut self) {
        if self.active {
            tracing::debug!(frames = self.next_sequence, "fixture source stopped");
        }
        self.active = false;
        self.stops += 1;
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
