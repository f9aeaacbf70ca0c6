//! Face model capability consumed by the liveness runner and matcher.
//!
//! Detection, landmark, descriptor and expression inference are treated as
//! a black box. Implementations are loaded by the caller and injected by
//! construction; the engine only checks readiness and reads outputs.

use crate::frame::Frame;
use crate::types::{Expressions, FaceDescriptor, FaceLandmarks, FaceRegion};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("face model not ready")]
    Unavailable,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

#[async_trait]
pub trait FaceModel: Send + Sync {
    /// Whether weights are loaded. Every entry point checks this first.
    fn is_ready(&self) -> bool;

    /// Detect a single face. `Ok(None)` means no face in the frame.
    async fn detect(&self, frame: &Frame) -> Result<Option<FaceRegion>, ModelError>;

    async fn landmarks(
        &self,
        frame: &Frame,
        face: &FaceRegion,
    ) -> Result<FaceLandmarks, ModelError>;

    async fn descriptor(
        &self,
        frame: &Frame,
        face: &FaceRegion,
    ) -> Result<FaceDescriptor, ModelError>;

    async fn expressions(
        &self,
        frame: &Frame,
        face: &FaceRegion,
    ) -> Result<Expressions, ModelError>;
}
