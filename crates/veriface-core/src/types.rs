use serde::{Deserialize, Serialize};

/// Number of points in the landmark layout the engine expects.
pub const LANDMARK_COUNT: usize = 68;

const NOSE_START: usize = 27;
const LEFT_EYE_START: usize = 36;
const RIGHT_EYE_START: usize = 42;

/// A 2D point in frame pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Region of a detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Full 68-point facial landmark set.
///
/// Layout: jaw 0–16, brows 17–26, nose 27–35, left eye 36–41,
/// right eye 42–47, mouth 48–67.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub points: Vec<Point>,
}

/// Expression probabilities for one face, each in [0, 1].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Expressions {
    pub neutral: f32,
    pub happy: f32,
    pub sad: f32,
    pub angry: f32,
    pub fearful: f32,
    pub disgusted: f32,
    pub surprised: f32,
}

/// Nose and eye landmarks captured from one frame.
///
/// `sequence` is the frame sequence the landmarks came from; relative
/// evaluators use it to reject snapshots delivered out of order.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSnapshot {
    pub sequence: u64,
    pub nose: [Point; 9],
    pub left_eye: [Point; 6],
    pub right_eye: [Point; 6],
}

impl LandmarkSnapshot {
    /// Extract the nose/eye subsets from a full landmark set.
    ///
    /// Returns `None` when the set has fewer than 68 points.
    pub fn from_landmarks(sequence: u64, landmarks: &FaceLandmarks) -> Option<Self> {
        let pts = &landmarks.points;
        if pts.len() < LANDMARK_COUNT {
            return None;
        }
        Some(Self {
            sequence,
            nose: std::array::from_fn(|i| pts[NOSE_START + i]),
            left_eye: std::array::from_fn(|i| pts[LEFT_EYE_START + i]),
            right_eye: std::array::from_fn(|i| pts[RIGHT_EYE_START + i]),
        })
    }

    /// Nose tip (point 30).
    pub fn nose_tip(&self) -> Point {
        self.nose[3]
    }

    /// Horizontal offset of the nose tip from the midpoint between the
    /// left eye's first corner (point 36) and the right eye's fourth
    /// point (45). Negative when the head is turned left.
    pub fn head_turn(&self) -> f32 {
        let eye_mid_x = (self.left_eye[0].x + self.right_eye[3].x) / 2.0;
        self.nose_tip().x - eye_mid_x
    }

    /// Vertical lid span of the left eye (points 37 and 41).
    pub fn left_eye_height(&self) -> f32 {
        (self.left_eye[1].y - self.left_eye[5].y).abs()
    }

    /// Vertical lid span of the right eye (points 43 and 47).
    pub fn right_eye_height(&self) -> f32 {
        (self.right_eye[1].y - self.right_eye[5].y).abs()
    }
}

/// Per-frame model output the challenge evaluators read.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceObservation {
    pub snapshot: LandmarkSnapshot,
    /// Only fetched for challenges that need them.
    pub expressions: Option<Expressions>,
}

/// Face descriptor (embedding) produced by the face model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDescriptor {
    pub values: Vec<f32>,
    /// Model that produced this descriptor, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl FaceDescriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model: None }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance between two descriptors, accumulated in f64.
    ///
    /// Callers must check lengths first; extra trailing values are ignored.
    pub fn euclidean_distance(&self, other: &FaceDescriptor) -> f64 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| {
                let d = f64::from(*a) - f64::from(*b);
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::neutral_landmarks;

    #[test]
    fn test_snapshot_requires_68_points() {
        let short = FaceLandmarks { points: vec![Point::default(); 67] };
        assert!(LandmarkSnapshot::from_landmarks(0, &short).is_none());
    }

    #[test]
    fn test_snapshot_subsets() {
        let mut lms = neutral_landmarks();
        lms.points[30] = Point::new(1.0, 2.0);
        lms.points[36] = Point::new(3.0, 4.0);
        lms.points[47] = Point::new(5.0, 6.0);
        let snap = LandmarkSnapshot::from_landmarks(7, &lms).unwrap();
        assert_eq!(snap.sequence, 7);
        assert_eq!(snap.nose_tip(), Point::new(1.0, 2.0));
        assert_eq!(snap.left_eye[0], Point::new(3.0, 4.0));
        assert_eq!(snap.right_eye[5], Point::new(5.0, 6.0));
    }

    #[test]
    fn test_neutral_face_signals() {
        let snap = LandmarkSnapshot::from_landmarks(0, &neutral_landmarks()).unwrap();
        assert!(snap.head_turn().abs() < 1e-6);
        assert!((snap.left_eye_height() - 10.0).abs() < 1e-6);
        assert!((snap.right_eye_height() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance() {
        let a = FaceDescriptor::new(vec![0.0, 0.0]);
        let b = FaceDescriptor::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-12);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_descriptor_json_omits_missing_model() {
        let d = FaceDescriptor::new(vec![0.5]);
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, r#"{"values":[0.5]}"#);
    }
}
