//! Synthetic faces for unit tests.

use crate::replay::FixtureFace;
use crate::types::{
    Expressions, FaceDescriptor, FaceLandmarks, FaceObservation, FaceRegion, LandmarkSnapshot,
    Point, LANDMARK_COUNT,
};

const CENTER: Point = Point::new(320.0, 180.0);
const EYE_Y: f32 = 160.0;
const LEFT_EYE_X: f32 = 290.0;
const RIGHT_EYE_X: f32 = 350.0;
const OPEN_EYE_HEIGHT: f32 = 10.0;

pub(crate) fn neutral_landmarks() -> FaceLandmarks {
    FaceBuilder::new().landmarks()
}

/// Builds a 68-point face around a fixed centre with adjustable pose.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FaceBuilder {
    turn: f32,
    nose_dy: f32,
    left_eye_height: f32,
    right_eye_height: f32,
}

impl FaceBuilder {
    pub(crate) fn new() -> Self {
        Self {
            turn: 0.0,
            nose_dy: 0.0,
            left_eye_height: OPEN_EYE_HEIGHT,
            right_eye_height: OPEN_EYE_HEIGHT,
        }
    }

    /// Horizontal nose offset in pixels; equals the resulting head turn.
    pub(crate) fn turn(mut self, px: f32) -> Self {
        self.turn = px;
        self
    }

    pub(crate) fn nose_y_offset(mut self, px: f32) -> Self {
        self.nose_dy = px;
        self
    }

    pub(crate) fn eye_heights(mut self, left: f32, right: f32) -> Self {
        self.left_eye_height = left;
        self.right_eye_height = right;
        self
    }

    pub(crate) fn landmarks(&self) -> FaceLandmarks {
        let mut points = vec![CENTER; LANDMARK_COUNT];

        for (i, p) in points.iter_mut().enumerate().take(36).skip(27) {
            *p = Point::new(CENTER.x + self.turn, CENTER.y - 10.0 + (i - 27) as f32 + self.nose_dy);
        }
        points[30] = Point::new(CENTER.x + self.turn, CENTER.y + self.nose_dy);

        for p in &mut points[36..42] {
            *p = Point::new(LEFT_EYE_X, EYE_Y);
        }
        points[37].y = EYE_Y - self.left_eye_height / 2.0;
        points[41].y = EYE_Y + self.left_eye_height / 2.0;

        for p in &mut points[42..48] {
            *p = Point::new(RIGHT_EYE_X, EYE_Y);
        }
        points[43].y = EYE_Y - self.right_eye_height / 2.0;
        points[47].y = EYE_Y + self.right_eye_height / 2.0;

        FaceLandmarks { points }
    }

    pub(crate) fn snapshot(&self, sequence: u64) -> LandmarkSnapshot {
        LandmarkSnapshot::from_landmarks(sequence, &self.landmarks())
            .expect("builder always produces 68 points")
    }

    pub(crate) fn fixture(&self, happy: f32) -> FixtureFace {
        FixtureFace {
            region: region(),
            landmarks: self.landmarks().points,
            expressions: Expressions { happy, ..Default::default() },
            descriptor: FaceDescriptor::new(vec![0.1, 0.2, 0.3]),
        }
    }
}

pub(crate) fn region() -> FaceRegion {
    FaceRegion { x: 220.0, y: 80.0, width: 200.0, height: 200.0, confidence: 0.99 }
}

pub(crate) fn observation(builder: FaceBuilder, sequence: u64) -> FaceObservation {
    FaceObservation { snapshot: builder.snapshot(sequence), expressions: None }
}
