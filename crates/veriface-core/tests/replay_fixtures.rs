//! End-to-end liveness and matching over JSON fixtures.

use serde_json::{json, Value};
use std::sync::Arc;
use veriface_core::replay::{Fixture, FixtureModel, FixtureSource};
use veriface_core::{
    CancelSignal, ChallengeKind, Confidence, FaceMatcher, Frame, FrameSource, LivenessConfig,
    LivenessRunner, SessionOutcome,
};

/// 68 points with eyes at y=160 (x 290 / 350), nose tip at (320 + turn, 180).
fn landmarks(turn: f32) -> Value {
    let points: Vec<Value> = (0..68)
        .map(|i| {
            let (x, y) = match i {
                30 => (320.0 + turn, 180.0),
                27..=35 => (320.0 + turn, 170.0 + (i - 27) as f32),
                37 | 43 => (if i == 37 { 290.0 } else { 350.0 }, 155.0),
                41 | 47 => (if i == 41 { 290.0 } else { 350.0 }, 165.0),
                36..=41 => (290.0, 160.0),
                42..=47 => (350.0, 160.0),
                _ => (320.0, 180.0),
            };
            json!({ "x": x, "y": y })
        })
        .collect();
    Value::Array(points)
}

fn face(turn: f32, happy: f32, descriptor: &[f32]) -> Value {
    json!({
        "face": {
            "region": { "x": 220.0, "y": 80.0, "width": 200.0, "height": 200.0, "confidence": 0.98 },
            "landmarks": landmarks(turn),
            "expressions": { "happy": happy },
            "descriptor": { "values": descriptor }
        }
    })
}

fn fast() -> LivenessConfig {
    LivenessConfig {
        poll_interval_ms: 1,
        attempts_per_challenge: 4,
        settle_delay_ms: 1,
        ..LivenessConfig::default()
    }
}

async fn run(fixture: Value) -> veriface_core::LivenessResult {
    let fixture = Fixture::from_json(&fixture.to_string()).expect("fixture parses");
    let mut runner = LivenessRunner::new(Arc::new(FixtureModel::new(fixture)), fast());
    let mut source = FixtureSource::new();
    let outcome = runner.run(&mut source, CancelSignal::never()).await.expect("session runs");
    assert!(!source.is_active());
    match outcome {
        SessionOutcome::Completed(r) => r,
        SessionOutcome::Cancelled(c) => panic!("unexpected cancellation: {c:?}"),
    }
}

#[tokio::test]
async fn replay_turn_right_exhausted() {
    let frames = vec![
        face(-25.0, 0.0, &[0.0]),
        face(0.0, 0.0, &[0.0]),
        face(0.0, 0.0, &[0.0]),
        face(0.0, 0.0, &[0.0]),
        face(0.0, 0.0, &[0.0]),
        face(0.0, 0.92, &[0.0]),
    ];
    let result = run(json!({ "frames": frames })).await;

    let kinds: Vec<ChallengeKind> = result.challenges.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, ChallengeKind::DEFAULT_SEQUENCE.to_vec());
    assert_eq!(result.completed_count(), 2);
    assert_eq!(result.score, 67);
    assert!(result.passed);
}

#[tokio::test]
async fn replay_static_photo_fails() {
    // A still photo: same neutral face on every frame.
    let result = run(json!({ "frames": [face(0.0, 0.1, &[0.0])], "repeat_last": true })).await;
    assert_eq!(result.score, 0);
    assert!(!result.passed);
}

#[tokio::test]
async fn replay_result_serializes() {
    let result = run(json!({ "frames": [] })).await;
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["score"], 0);
    assert_eq!(json["passed"], false);
    assert_eq!(json["challenges"][0]["kind"], "turn_left");
    assert_eq!(json["challenges"][0]["completed"], false);
}

#[tokio::test]
async fn replay_selfie_document_comparison() {
    let fixture = json!({
        "frames": [face(0.0, 0.0, &[0.1, 0.2, 0.3]), face(0.0, 0.0, &[0.1, 0.2, 0.8])]
    });
    let fixture = Fixture::from_json(&fixture.to_string()).unwrap();
    let matcher = FaceMatcher::new(Arc::new(FixtureModel::new(fixture)));

    let selfie = Frame::new(vec![128], 1, 1, 0);
    let document = Frame::new(vec![128], 1, 1, 1);
    let result = matcher.compare_frames(&selfie, &document).await.unwrap();

    assert!((result.distance - 0.5).abs() < 1e-6);
    assert_eq!(result.confidence, Confidence::Medium);
    assert!(result.matched);
    assert!((result.similarity - 50.0).abs() < 1e-4);
}
