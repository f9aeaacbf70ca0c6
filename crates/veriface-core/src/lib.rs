//! veriface-core — Liveness challenges and face matching for KYC checks.
//!
//! Runs challenge-response liveness sessions over a pluggable frame source
//! and compares selfie/document face descriptors. Face inference is an
//! injected [`FaceModel`] capability.

pub mod challenge;
pub mod config;
pub mod frame;
pub mod matcher;
pub mod model;
pub mod replay;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use challenge::{Challenge, ChallengeKind};
pub use config::{Config, LivenessConfig};
pub use frame::{ActiveSource, Frame, FrameSource, FrameSourceError};
pub use matcher::{Confidence, FaceComparisonResult, FaceMatcher, MatchError, MatchThresholds};
pub use model::{FaceModel, ModelError};
pub use session::{
    cancellation, CancelHandle, CancelSignal, LivenessResult, LivenessRunner, SessionError,
    SessionOutcome, SessionState,
};
pub use types::{Expressions, FaceDescriptor, FaceLandmarks, FaceRegion, LandmarkSnapshot, Point};
