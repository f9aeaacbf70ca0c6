//! Challenge-response liveness session.
//!
//! A [`LivenessRunner`] walks a fixed sequence of challenges against a
//! [`FrameSource`]. Each challenge is polled until it passes or its attempt
//! budget runs out; either way the runner moves on after a settle delay.
//! One runner per verification attempt.

use crate::challenge::{self, Challenge, ChallengeKind};
use crate::config::LivenessConfig;
use crate::frame::{ActiveSource, Frame, FrameSource, FrameSourceError};
use crate::model::{FaceModel, ModelError};
use crate::types::{FaceObservation, LandmarkSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("face model not ready")]
    ModelUnavailable,
    #[error("frame source: {0}")]
    ResourceAcquisition(#[from] FrameSourceError),
    #[error("liveness session already run")]
    AlreadyRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Running { challenge_index: usize },
    Completed,
    Cancelled,
    Failed,
}

/// Outcome of a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessResult {
    pub session_id: Uuid,
    pub passed: bool,
    /// `round(100 * completed / total)`.
    pub score: u8,
    pub challenges: Vec<Challenge>,
    pub timestamp: DateTime<Utc>,
}

impl LivenessResult {
    pub fn completed_count(&self) -> usize {
        self.challenges.iter().filter(|c| c.completed()).count()
    }
}

/// Progress at the moment a session was cancelled. Not a verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct CancelledSession {
    pub session_id: Uuid,
    pub completed: usize,
    /// Challenges that had started when the cancellation arrived.
    pub attempted: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed(LivenessResult),
    Cancelled(CancelledSession),
}

/// Compute the integer score and pass verdict for a challenge tally.
pub fn score(completed: usize, total: usize, pass_ratio: f64) -> (u8, bool) {
    if total == 0 {
        return (0, false);
    }
    let ratio = completed as f64 / total as f64;
    ((ratio * 100.0).round() as u8, ratio >= pass_ratio)
}

/// Caller side of a cancellation pair.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Runner side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancellation is requested. Pends forever if the
    /// handle is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        if let Some(rx) = self.rx.as_mut() {
            if rx.wait_for(|c| *c).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}

/// Mutable per-session state threaded through challenge evaluation.
#[derive(Debug)]
struct LivenessSession {
    id: Uuid,
    challenges: Vec<Challenge>,
    /// Most recent in-order landmark snapshot, read by relative evaluators.
    previous: Option<LandmarkSnapshot>,
    completed: usize,
}

impl LivenessSession {
    fn new(kinds: &[ChallengeKind]) -> Self {
        Self {
            id: Uuid::new_v4(),
            challenges: kinds.iter().copied().map(Challenge::new).collect(),
            previous: None,
            completed: 0,
        }
    }

    fn record(&mut self, snapshot: &LandmarkSnapshot) {
        let newer = self
            .previous
            .as_ref()
            .map_or(true, |prev| prev.sequence < snapshot.sequence);
        if newer {
            self.previous = Some(snapshot.clone());
        }
    }

    fn complete(&mut self, idx: usize) {
        let challenge = &mut self.challenges[idx];
        if !challenge.completed() {
            challenge.mark_completed();
            self.completed += 1;
        }
    }
}

/// Drives one liveness session.
pub struct LivenessRunner {
    model: Arc<dyn FaceModel>,
    config: LivenessConfig,
    session: LivenessSession,
    state: SessionState,
}

impl LivenessRunner {
    pub fn new(model: Arc<dyn FaceModel>, config: LivenessConfig) -> Self {
        let session = LivenessSession::new(&config.challenges);
        Self {
            model,
            config,
            session,
            state: SessionState::NotStarted,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn challenges(&self) -> &[Challenge] {
        &self.session.challenges
    }

    /// Run the full challenge sequence against `source`.
    ///
    /// The source is started here and stopped before returning, on every
    /// path. Infrastructure failures are errors; failed gestures are data.
    pub async fn run<S>(
        &mut self,
        source: &mut S,
        cancel: CancelSignal,
    ) -> Result<SessionOutcome, SessionError>
    where
        S: FrameSource + ?Sized,
    {
        if self.state != SessionState::NotStarted {
            return Err(SessionError::AlreadyRun);
        }
        if !self.model.is_ready() {
            self.state = SessionState::Failed;
            return Err(SessionError::ModelUnavailable);
        }

        let span = tracing::info_span!(
            "liveness",
            session = %self.session.id,
            challenges = self.session.challenges.len()
        );
        self.run_acquired(source, cancel).instrument(span).await
    }

    async fn run_acquired<S>(
        &mut self,
        source: &mut S,
        mut cancel: CancelSignal,
    ) -> Result<SessionOutcome, SessionError>
    where
        S: FrameSource + ?Sized,
    {
        let mut active = match ActiveSource::acquire(source).await {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(error = %e, "frame source acquisition failed");
                self.state = SessionState::Failed;
                return Err(SessionError::ResourceAcquisition(e));
            }
        };

        let driven = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = self.drive(&mut active) => Some(r),
        };
        // Release the source before reporting anything.
        drop(active);

        match driven {
            None => {
                let cancelled = CancelledSession {
                    session_id: self.session.id,
                    completed: self.session.completed,
                    attempted: self.attempted(),
                };
                self.state = SessionState::Cancelled;
                tracing::info!(
                    completed = cancelled.completed,
                    attempted = cancelled.attempted,
                    "liveness session cancelled"
                );
                Ok(SessionOutcome::Cancelled(cancelled))
            }
            Some(Err(e)) => {
                self.state = SessionState::Failed;
                tracing::warn!(error = %e, "liveness session aborted");
                Err(e)
            }
            Some(Ok(())) => {
                self.state = SessionState::Completed;
                Ok(SessionOutcome::Completed(self.result()))
            }
        }
    }

    fn attempted(&self) -> usize {
        match self.state {
            SessionState::Running { challenge_index } => challenge_index + 1,
            SessionState::NotStarted => 0,
            _ => self.session.challenges.len(),
        }
    }

    fn result(&self) -> LivenessResult {
        let total = self.session.challenges.len();
        let (score, passed) = score(self.session.completed, total, self.config.pass_ratio);
        tracing::info!(
            completed = self.session.completed,
            total,
            score,
            passed,
            "liveness session complete"
        );
        LivenessResult {
            session_id: self.session.id,
            passed,
            score,
            challenges: self.session.challenges.clone(),
            timestamp: Utc::now(),
        }
    }

    async fn drive<S>(&mut self, source: &mut ActiveSource<'_, S>) -> Result<(), SessionError>
    where
        S: FrameSource + ?Sized,
    {
        let total = self.session.challenges.len();
        for idx in 0..total {
            self.state = SessionState::Running { challenge_index: idx };
            let kind = self.session.challenges[idx].kind;

            let passed = self.poll_challenge(source, idx, kind).await?;
            tracing::info!(challenge = %kind, passed, "challenge finished");

            if idx + 1 < total {
                tokio::time::sleep(self.config.settle_delay()).await;
            }
        }
        Ok(())
    }

    /// Poll one challenge until it passes or the attempt budget is spent.
    async fn poll_challenge<S>(
        &mut self,
        source: &mut ActiveSource<'_, S>,
        idx: usize,
        kind: ChallengeKind,
    ) -> Result<bool, SessionError>
    where
        S: FrameSource + ?Sized,
    {
        let budget = self.config.attempts_per_challenge;
        for attempt in 1..=budget {
            let frame = source.next_frame().await?;
            let observation = self.observe(&frame, kind).await?;

            let passed = challenge::evaluate(
                kind,
                observation.as_ref(),
                self.session.previous.as_ref(),
            );
            if let Some(obs) = &observation {
                self.session.record(&obs.snapshot);
            }
            tracing::trace!(
                challenge = %kind,
                attempt,
                seq = frame.sequence,
                face = observation.is_some(),
                passed,
                "poll"
            );

            if passed {
                self.session.complete(idx);
                return Ok(true);
            }
            if attempt < budget {
                tokio::time::sleep(self.config.poll_interval()).await;
            }
        }

        tracing::debug!(challenge = %kind, budget, "attempt budget exhausted");
        Ok(false)
    }

    /// Run the model on one frame. Misses and per-frame inference failures
    /// yield `None`; only an unavailable model is an error.
    async fn observe(
        &self,
        frame: &Frame,
        kind: ChallengeKind,
    ) -> Result<Option<FaceObservation>, SessionError> {
        if frame.is_dark {
            tracing::debug!(seq = frame.sequence, "skipping dark frame");
            return Ok(None);
        }

        match self.infer(frame, kind).await {
            Ok(obs) => Ok(obs),
            Err(ModelError::Unavailable) => Err(SessionError::ModelUnavailable),
            Err(ModelError::InferenceFailed(msg)) => {
                tracing::warn!(seq = frame.sequence, error = %msg, "inference failed; frame skipped");
                Ok(None)
            }
        }
    }

    async fn infer(
        &self,
        frame: &Frame,
        kind: ChallengeKind,
    ) -> Result<Option<FaceObservation>, ModelError> {
        let Some(face) = self.model.detect(frame).await? else {
            return Ok(None);
        };
        let landmarks = self.model.landmarks(frame, &face).await?;
        let snapshot = LandmarkSnapshot::from_landmarks(frame.sequence, &landmarks).ok_or_else(
            || {
                ModelError::InferenceFailed(format!(
                    "expected 68 landmarks, got {}",
                    landmarks.points.len()
                ))
            },
        )?;
        let expressions = if kind.needs_expressions() {
            Some(self.model.expressions(frame, &face).await?)
        } else {
            None
        };
        Ok(Some(FaceObservation { snapshot, expressions }))
    }
}
