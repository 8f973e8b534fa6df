//! Sequence recording and playback.
//!
//! [`SequenceRecorder`] snapshots the pose the operator is looking at into an
//! ordered list of [`MotionStep`]s. [`SequencePlayer`] replays a stored
//! [`Sequence`] as a cancellable loop: it hands the whole sequence to the
//! actuation service once, then walks the steps locally so the committed pose
//! tracks the arm, waiting a settle period after each step.
//!
//! Playback holds the interaction lock for its whole duration. The lock is
//! released exactly once when the run completes, is cancelled, or its future
//! is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use armctl_middleware::ActuationService;
use armctl_types::{ArmError, LockOwner, MotionStep, Sequence};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::synchronizer::PoseSynchronizer;

// ─────────────────────────────────────────────────────────────────────────────
// Recording
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered buffer of steps being recorded.
#[derive(Debug, Default, Clone)]
pub struct SequenceRecorder {
    steps: Vec<MotionStep>,
}

impl SequenceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the active pose (preview if staged, committed otherwise) and
    /// the current speed. Returns the new step's index.
    pub fn record(&mut self, sync: &PoseSynchronizer) -> Result<usize, ArmError> {
        let (pose, speed) = sync.active_pose();
        self.push(MotionStep::new(pose, speed))
    }

    /// Append an explicit step.
    pub fn push(&mut self, step: MotionStep) -> Result<usize, ArmError> {
        step.pose.ensure_in_range()?;
        self.steps.push(step);
        Ok(self.steps.len() - 1)
    }

    pub fn remove_step(&mut self, index: usize) -> Result<MotionStep, ArmError> {
        if index >= self.steps.len() {
            return Err(ArmError::IndexOutOfBounds {
                index,
                len: self.steps.len(),
            });
        }
        Ok(self.steps.remove(index))
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    pub fn steps(&self) -> &[MotionStep] {
        &self.steps
    }

    /// Build a named sequence from the recorded steps without clearing them.
    pub fn to_sequence(&self, name: &str) -> Result<Sequence, ArmError> {
        Sequence::new(name, self.steps.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Playback
// ─────────────────────────────────────────────────────────────────────────────

/// Timing of a playback run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackConfig {
    /// Wait after each step before the next one.
    pub settle: Duration,
    /// Countdown ticks before motion starts; `0` starts immediately.
    pub countdown_from: u32,
    pub countdown_tick: Duration,
    /// Extra pause after the last tick.
    pub countdown_go: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(550),
            countdown_from: 0,
            countdown_tick: Duration::from_secs(1),
            countdown_go: Duration::from_millis(500),
        }
    }
}

/// Progress notifications emitted during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Countdown { run: u64, remaining: u32 },
    Step { run: u64, index: usize, total: usize, step: MotionStep },
    Finished(PlaybackReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackOutcome {
    Completed,
    Cancelled,
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackReport {
    pub run: u64,
    pub sequence: String,
    pub steps_applied: usize,
    pub outcome: PlaybackOutcome,
}

/// Releases the playback lock when dropped.
struct LockRelease {
    sync: PoseSynchronizer,
    owner: LockOwner,
}

impl Drop for LockRelease {
    fn drop(&mut self) {
        if let Err(e) = self.sync.release_lock(self.owner) {
            warn!(owner = %self.owner, error = %e, "playback lock already gone");
        }
    }
}

/// A run started with [`SequencePlayer::start`].
pub struct PlaybackHandle {
    run: u64,
    cancel: CancellationToken,
    task: JoinHandle<Result<PlaybackReport, ArmError>>,
}

impl PlaybackHandle {
    pub fn run_id(&self) -> u64 {
        self.run
    }

    /// Ask the run to stop before its next step.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<PlaybackReport, ArmError> {
        self.task
            .await
            .map_err(|e| ArmError::Channel(format!("playback task failed: {e}")))?
    }
}

/// Drives recorded sequences. Cheap to clone; clones share the run counter.
#[derive(Clone)]
pub struct SequencePlayer {
    service: Arc<dyn ActuationService>,
    sync: PoseSynchronizer,
    config: PlaybackConfig,
    next_run: Arc<AtomicU64>,
    events: Option<mpsc::UnboundedSender<PlaybackEvent>>,
}

impl SequencePlayer {
    pub fn new(
        service: Arc<dyn ActuationService>,
        sync: PoseSynchronizer,
        config: PlaybackConfig,
    ) -> Self {
        Self {
            service,
            sync,
            config,
            next_run: Arc::new(AtomicU64::new(1)),
            events: None,
        }
    }

    /// Send progress notifications to `events`.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<PlaybackEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> PlaybackConfig {
        self.config
    }

    /// Validate the sequence and take the lock for a fresh run.
    fn begin(&self, sequence: &Sequence) -> Result<(u64, LockRelease), ArmError> {
        sequence.validate()?;
        if let Some(bad) = sequence.steps.iter().find(|step| !step.pose.in_range()) {
            return Err(ArmError::OutOfActuatorRange {
                values: bad.pose.values(),
            });
        }
        let run = self.next_run.fetch_add(1, Ordering::Relaxed);
        let owner = LockOwner::Playback(run);
        self.sync.acquire_lock(owner)?;
        Ok((
            run,
            LockRelease {
                sync: self.sync.clone(),
                owner,
            },
        ))
    }

    /// Play `sequence` to completion or cancellation.
    pub async fn play(
        &self,
        sequence: &Sequence,
        cancel: CancellationToken,
    ) -> Result<PlaybackReport, ArmError> {
        let (run, lock) = self.begin(sequence)?;
        self.run(run, lock, sequence.clone(), cancel).await
    }

    /// Take the lock now and play on a background task.
    ///
    /// Fails immediately if the lock is held or the sequence is invalid.
    pub fn start(
        &self,
        sequence: Sequence,
        cancel: CancellationToken,
    ) -> Result<PlaybackHandle, ArmError> {
        let (run, lock) = self.begin(&sequence)?;
        let player = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { player.run(run, lock, sequence, token).await });
        Ok(PlaybackHandle { run, cancel, task })
    }

    async fn run(
        &self,
        run: u64,
        lock: LockRelease,
        sequence: Sequence,
        cancel: CancellationToken,
    ) -> Result<PlaybackReport, ArmError> {
        let total = sequence.steps.len();
        info!(run, sequence = %sequence.name, steps = total, "playback started");

        let mut report = PlaybackReport {
            run,
            sequence: sequence.name.clone(),
            steps_applied: 0,
            outcome: PlaybackOutcome::Cancelled,
        };

        if !self.countdown(run, &cancel).await {
            return Ok(self.finish(report, lock));
        }

        let service = Arc::clone(&self.service);
        let steps = sequence.steps.clone();
        tokio::spawn(async move {
            if let Err(e) = service.execute_sequence(&steps).await {
                warn!(run, error = %e, "remote sequence execution failed");
            }
        });

        for (index, step) in sequence.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(self.finish(report, lock));
            }
            self.sync.drive_committed(lock.owner, step)?;
            report.steps_applied += 1;
            self.emit(PlaybackEvent::Step {
                run,
                index,
                total,
                step: *step,
            });
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.config.settle) => {}
            }
        }

        // Every step was applied; a cancel during the last settle only cuts
        // the wait short.
        report.outcome = PlaybackOutcome::Completed;
        Ok(self.finish(report, lock))
    }

    /// Returns `false` if cancelled during the countdown.
    async fn countdown(&self, run: u64, cancel: &CancellationToken) -> bool {
        if self.config.countdown_from == 0 {
            return !cancel.is_cancelled();
        }
        for remaining in (1..=self.config.countdown_from).rev() {
            self.emit(PlaybackEvent::Countdown { run, remaining });
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.config.countdown_tick) => {}
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.countdown_go) => true,
        }
    }

    fn finish(&self, report: PlaybackReport, lock: LockRelease) -> PlaybackReport {
        drop(lock);
        info!(
            run = report.run,
            applied = report.steps_applied,
            outcome = ?report.outcome,
            "playback finished"
        );
        self.emit(PlaybackEvent::Finished(report.clone()));
        report
    }

    fn emit(&self, event: PlaybackEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
