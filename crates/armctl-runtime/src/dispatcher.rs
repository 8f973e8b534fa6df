//! [`CommandDispatcher`] – debounced, fire-and-forget pose commands.
//!
//! Callers hand over commands without waiting. A background task applies a
//! trailing debounce: a command is only sent once the debounce window passes
//! without a newer one arriving, so a burst of slider or jog updates turns
//! into a single command carrying the last pose.
//!
//! Sends run on the dispatcher task one at a time, so they are issued and
//! completed in order. A send that fails or times out is logged and counted;
//! it is not retried because the next state change supersedes it. A successful
//! send promotes the pose in the [`PoseSynchronizer`]. Commands whose window
//! closes while a playback run holds the interaction lock are dropped
//! unsent.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use armctl_middleware::{ActuationService, EventBus, Topic};
use armctl_types::{ActuatorPose, ArmError, Event, EventPayload};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::synchronizer::PoseSynchronizer;

const SOURCE: &str = "armctl-runtime::dispatcher";

/// A pose to send and the speed to send it with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoseCommand {
    pub pose: ActuatorPose,
    pub speed: u8,
}

impl PoseCommand {
    pub fn new(pose: ActuatorPose, speed: u8) -> Self {
        Self { pose, speed }
    }
}

/// Timing of the dispatcher task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Quiet period required before the latest command is sent.
    pub debounce: Duration,
    /// Upper bound on a single `set_pose` round-trip.
    pub send_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            send_timeout: Duration::from_secs(2),
        }
    }
}

/// Counters since the dispatcher started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Commands accepted by [`CommandDispatcher::dispatch`].
    pub requested: u64,
    /// Commands dropped because a newer one arrived within the window.
    pub coalesced: u64,
    pub sent: u64,
    pub failed: u64,
    /// Out-of-range commands refused at the door.
    pub refused: u64,
    /// Commands dropped because playback held the lock when they came due.
    pub preempted: u64,
}

#[derive(Default)]
struct Counters {
    requested: AtomicU64,
    coalesced: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    refused: AtomicU64,
    preempted: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn stats(&self) -> DispatchStats {
        DispatchStats {
            requested: self.requested.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            refused: self.refused.load(Ordering::Relaxed),
            preempted: self.preempted.load(Ordering::Relaxed),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CommandDispatcher
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to the dispatcher task. Dropping it (or calling
/// [`shutdown`][Self::shutdown]) flushes any pending command and stops the
/// task.
pub struct CommandDispatcher {
    tx: mpsc::UnboundedSender<PoseCommand>,
    counters: Arc<Counters>,
    task: JoinHandle<()>,
}

impl CommandDispatcher {
    /// Spawn the dispatcher task on the current Tokio runtime.
    ///
    /// When `alerts` is given, failed sends are also published on
    /// [`Topic::SystemAlerts`].
    pub fn spawn(
        service: Arc<dyn ActuationService>,
        sync: PoseSynchronizer,
        config: DispatcherConfig,
        alerts: Option<EventBus>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let worker = Worker {
            service,
            sync,
            config,
            alerts,
            counters: Arc::clone(&counters),
        };
        let task = tokio::spawn(worker.run(rx));
        Self { tx, counters, task }
    }

    /// Queue a command. Never blocks; out-of-range poses are refused.
    pub fn dispatch(&self, command: PoseCommand) -> Result<(), ArmError> {
        if let Err(e) = command.pose.ensure_in_range() {
            Counters::bump(&self.counters.refused);
            return Err(e);
        }
        self.tx
            .send(command)
            .map_err(|_| ArmError::Channel("dispatcher task has stopped".to_string()))?;
        Counters::bump(&self.counters.requested);
        Ok(())
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.stats()
    }

    /// Close the queue, send whatever is still pending and wait for the task.
    pub async fn shutdown(self) {
        let Self { tx, task, .. } = self;
        drop(tx);
        if let Err(e) = task.await {
            warn!(error = %e, "dispatcher task ended abnormally");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker task
// ─────────────────────────────────────────────────────────────────────────────

struct Worker {
    service: Arc<dyn ActuationService>,
    sync: PoseSynchronizer,
    config: DispatcherConfig,
    alerts: Option<EventBus>,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<PoseCommand>) {
        let mut pending: Option<PoseCommand> = None;
        loop {
            let Some(command) = pending.take() else {
                match rx.recv().await {
                    Some(command) => pending = Some(command),
                    None => break,
                }
                continue;
            };

            // The sleep is rebuilt on every pass, so each newer command
            // restarts the window.
            tokio::select! {
                next = rx.recv() => match next {
                    Some(newer) => {
                        Counters::bump(&self.counters.coalesced);
                        debug!(dropped = %command.pose, "coalesced pose command");
                        pending = Some(newer);
                    }
                    None => {
                        self.send(command).await;
                        break;
                    }
                },
                _ = tokio::time::sleep(self.config.debounce) => {
                    self.send(command).await;
                }
            }
        }
        debug!("dispatcher task stopped");
    }

    async fn send(&self, command: PoseCommand) {
        if let Some(owner) = self.sync.playback_owner() {
            Counters::bump(&self.counters.preempted);
            debug!(%owner, pose = %command.pose, "pose command dropped during playback");
            return;
        }

        let result = tokio::time::timeout(
            self.config.send_timeout,
            self.service.set_pose(&command.pose, command.speed),
        )
        .await;

        let failure = match result {
            Ok(Ok(())) => {
                Counters::bump(&self.counters.sent);
                let outcome = self.sync.promote(&command.pose, command.speed);
                debug!(pose = %command.pose, speed = command.speed, ?outcome, "pose command sent");
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("no answer within {:?}", self.config.send_timeout),
        };

        Counters::bump(&self.counters.failed);
        warn!(pose = %command.pose, error = %failure, "pose command failed; not retrying");
        if let Some(bus) = &self.alerts {
            let event = Event::new(
                SOURCE,
                EventPayload::Alert {
                    component: "dispatcher".to_string(),
                    message: failure,
                },
            );
            let _ = bus.publish_to(Topic::SystemAlerts, event);
        }
    }
}
