//! Liveness challenges and their per-frame evaluators.
//!
//! Every evaluator is a pure function of the current observation and, for
//! `Nod`, the previous landmark snapshot. Thresholds are raw pixel values
//! in the detector's coordinate space.

use crate::types::{FaceObservation, LandmarkSnapshot};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// --- Named constants (pixel space, not normalized) ---
const HEAD_TURN_THRESHOLD_PX: f32 = 15.0;
const SMILE_HAPPY_THRESHOLD: f32 = 0.7;
const BLINK_EYE_HEIGHT_PX: f32 = 5.0;
const NOD_DISPLACEMENT_PX: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    TurnLeft,
    TurnRight,
    Smile,
    Blink,
    Nod,
}

impl ChallengeKind {
    /// Production sequence. `Blink` and `Nod` are available but not included.
    pub const DEFAULT_SEQUENCE: [ChallengeKind; 3] =
        [ChallengeKind::TurnLeft, ChallengeKind::TurnRight, ChallengeKind::Smile];

    pub fn label(self) -> &'static str {
        match self {
            ChallengeKind::TurnLeft => "Turn left",
            ChallengeKind::TurnRight => "Turn right",
            ChallengeKind::Smile => "Smile",
            ChallengeKind::Blink => "Blink",
            ChallengeKind::Nod => "Nod",
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            ChallengeKind::TurnLeft => "Slowly turn your head to the left",
            ChallengeKind::TurnRight => "Slowly turn your head to the right",
            ChallengeKind::Smile => "Smile at the camera",
            ChallengeKind::Blink => "Blink both eyes",
            ChallengeKind::Nod => "Nod your head up and down",
        }
    }

    /// Whether evaluation reads expression probabilities.
    pub fn needs_expressions(self) -> bool {
        matches!(self, ChallengeKind::Smile)
    }

    fn as_str(self) -> &'static str {
        match self {
            ChallengeKind::TurnLeft => "turn_left",
            ChallengeKind::TurnRight => "turn_right",
            ChallengeKind::Smile => "smile",
            ChallengeKind::Blink => "blink",
            ChallengeKind::Nod => "nod",
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown challenge kind: {0}")]
pub struct UnknownChallenge(pub String);

impl FromStr for ChallengeKind {
    type Err = UnknownChallenge;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "turn_left" => Ok(ChallengeKind::TurnLeft),
            "turn_right" => Ok(ChallengeKind::TurnRight),
            "smile" => Ok(ChallengeKind::Smile),
            "blink" => Ok(ChallengeKind::Blink),
            "nod" => Ok(ChallengeKind::Nod),
            other => Err(UnknownChallenge(other.to_string())),
        }
    }
}

/// One challenge within a session.
///
/// `completed` can only go from false to true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub kind: ChallengeKind,
    pub label: String,
    pub instruction: String,
    completed: bool,
}

impl Challenge {
    pub fn new(kind: ChallengeKind) -> Self {
        Self {
            kind,
            label: kind.label().to_string(),
            instruction: kind.instruction().to_string(),
            completed: false,
        }
    }

    pub fn completed(&self) -> bool {
        self.completed
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }
}

/// Decide pass/fail for one challenge on one frame.
///
/// `current` is `None` when no face was detected; that never passes.
pub fn evaluate(
    kind: ChallengeKind,
    current: Option<&FaceObservation>,
    previous: Option<&LandmarkSnapshot>,
) -> bool {
    let Some(obs) = current else {
        return false;
    };
    let snap = &obs.snapshot;

    match kind {
        ChallengeKind::TurnLeft => snap.head_turn() < -HEAD_TURN_THRESHOLD_PX,
        ChallengeKind::TurnRight => snap.head_turn() > HEAD_TURN_THRESHOLD_PX,
        ChallengeKind::Smile => obs
            .expressions
            .as_ref()
            .is_some_and(|e| e.happy > SMILE_HAPPY_THRESHOLD),
        ChallengeKind::Blink => {
            snap.left_eye_height() < BLINK_EYE_HEIGHT_PX
                && snap.right_eye_height() < BLINK_EYE_HEIGHT_PX
        }
        ChallengeKind::Nod => match previous {
            // Snapshots must arrive in strict temporal order.
            Some(prev) if prev.sequence < snap.sequence => {
                (snap.nose_tip().y - prev.nose_tip().y).abs() > NOD_DISPLACEMENT_PX
            }
            _ => false,
        },
    }
}
