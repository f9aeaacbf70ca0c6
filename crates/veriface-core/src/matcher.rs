//! Selfie vs. document photo comparison by descriptor distance.
//!
//! The distance cutoffs are calibrated for the descriptor space of the
//! deployed face model. A different embedding model needs its own cutoffs.

use crate::frame::Frame;
use crate::model::{FaceModel, ModelError};
use crate::types::FaceDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Below this distance the match is high confidence.
pub const HIGH_CONFIDENCE_DISTANCE: f64 = 0.4;
/// Below this distance the faces match.
pub const MATCH_DISTANCE: f64 = 0.6;

/// Distance reported when either image has no face.
const NO_FACE_DISTANCE: f64 = 1.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("face model not ready")]
    ModelUnavailable,
    #[error("descriptor length mismatch: selfie {selfie}, document {document}")]
    DescriptorMismatch { selfie: usize, document: usize },
    #[error("inference failed: {0}")]
    Inference(String),
}

impl From<ModelError> for MatchError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Unavailable => MatchError::ModelUnavailable,
            ModelError::InferenceFailed(msg) => MatchError::Inference(msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Distance cutoffs for tiering and the match verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchThresholds {
    pub high_confidence: f64,
    pub match_distance: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            high_confidence: HIGH_CONFIDENCE_DISTANCE,
            match_distance: MATCH_DISTANCE,
        }
    }
}

impl MatchThresholds {
    pub fn tier(&self, distance: f64) -> Confidence {
        if distance < self.high_confidence {
            Confidence::High
        } else if distance < self.match_distance {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    pub fn is_match(&self, distance: f64) -> bool {
        distance < self.match_distance
    }
}

/// Confidence tier for a distance using the default cutoffs.
pub fn confidence_tier(distance: f64) -> Confidence {
    MatchThresholds::default().tier(distance)
}

/// Match verdict for a distance using the default cutoff.
pub fn is_match(distance: f64) -> bool {
    MatchThresholds::default().is_match(distance)
}

/// Presentation similarity in [0, 100]. Not used for the verdict.
pub fn similarity(distance: f64) -> f64 {
    ((1.0 - distance) * 100.0).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceComparisonResult {
    pub matched: bool,
    pub distance: f64,
    pub similarity: f64,
    pub confidence: Confidence,
    pub timestamp: DateTime<Utc>,
}

impl FaceComparisonResult {
    /// Result when either side has no detectable face.
    pub fn no_face() -> Self {
        Self {
            matched: false,
            distance: NO_FACE_DISTANCE,
            similarity: 0.0,
            confidence: Confidence::Low,
            timestamp: Utc::now(),
        }
    }
}

/// Strategy for comparing two face descriptors.
pub trait Matcher {
    fn compare(
        &self,
        selfie: &FaceDescriptor,
        document: &FaceDescriptor,
    ) -> Result<FaceComparisonResult, MatchError>;
}

/// Euclidean distance matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher {
    pub thresholds: MatchThresholds,
}

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        selfie: &FaceDescriptor,
        document: &FaceDescriptor,
    ) -> Result<FaceComparisonResult, MatchError> {
        if selfie.len() != document.len() {
            return Err(MatchError::DescriptorMismatch {
                selfie: selfie.len(),
                document: document.len(),
            });
        }

        let distance = selfie.euclidean_distance(document);
        Ok(FaceComparisonResult {
            matched: self.thresholds.is_match(distance),
            distance,
            similarity: similarity(distance),
            confidence: self.thresholds.tier(distance),
            timestamp: Utc::now(),
        })
    }
}

/// Compares a selfie against a document photo using the injected model.
pub struct FaceMatcher<M: Matcher = EuclideanMatcher> {
    model: Arc<dyn FaceModel>,
    matcher: M,
}

impl FaceMatcher<EuclideanMatcher> {
    pub fn new(model: Arc<dyn FaceModel>) -> Self {
        Self::with_thresholds(model, MatchThresholds::default())
    }

    pub fn with_thresholds(model: Arc<dyn FaceModel>, thresholds: MatchThresholds) -> Self {
        Self {
            model,
            matcher: EuclideanMatcher { thresholds },
        }
    }
}

impl<M: Matcher> FaceMatcher<M> {
    pub fn with_matcher(model: Arc<dyn FaceModel>, matcher: M) -> Self {
        Self { model, matcher }
    }

    /// Detect and describe the face in each image, then compare.
    ///
    /// A missing face on either side yields [`FaceComparisonResult::no_face`].
    pub async fn compare_frames(
        &self,
        selfie: &Frame,
        document: &Frame,
    ) -> Result<FaceComparisonResult, MatchError> {
        if !self.model.is_ready() {
            return Err(MatchError::ModelUnavailable);
        }

        let Some(selfie_desc) = self.describe(selfie).await? else {
            tracing::info!(side = "selfie", "no face detected; comparison fails");
            return Ok(FaceComparisonResult::no_face());
        };
        let Some(document_desc) = self.describe(document).await? else {
            tracing::info!(side = "document", "no face detected; comparison fails");
            return Ok(FaceComparisonResult::no_face());
        };

        self.compare_descriptors(&selfie_desc, &document_desc)
    }

    pub fn compare_descriptors(
        &self,
        selfie: &FaceDescriptor,
        document: &FaceDescriptor,
    ) -> Result<FaceComparisonResult, MatchError> {
        let result = self.matcher.compare(selfie, document)?;
        tracing::info!(
            matched = result.matched,
            distance = result.distance,
            confidence = ?result.confidence,
            "face comparison complete"
        );
        Ok(result)
    }

    async fn describe(&self, frame: &Frame) -> Result<Option<FaceDescriptor>, MatchError> {
        let Some(face) = self.model.detect(frame).await? else {
            return Ok(None);
        };
        let descriptor = self.model.descriptor(frame, &face).await?;
        Ok(Some(descriptor))
    }
}
