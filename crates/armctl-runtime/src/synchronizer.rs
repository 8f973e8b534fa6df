//! [`PoseSynchronizer`] – the single owner of the arm's local pose state.
//!
//! Three writers compete for the pose: the operator (through the solver and
//! the dispatcher), the hardware (through state pushes) and sequence playback.
//! The synchronizer arbitrates between them with one rule: whoever holds the
//! interaction lock wins, regardless of arrival order.
//!
//! # States
//!
//! | Phase | Meaning |
//! |---|---|
//! | [`SyncPhase::Idle`] | No preview, no lock |
//! | [`SyncPhase::PreviewPending`] | A staged pose awaits dispatch and promotion |
//! | [`SyncPhase::InteractionLocked`] | Operator drag or playback is driving; pushes are discarded |
//!
//! Every operation is one short critical section that never awaits, so
//! operations never interleave. Each change is broadcast as a
//! [`SyncSnapshot`] for renderers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use armctl_types::{
    ActuatorPose, ArmError, LockOwner, MAX_SPEED, MotionStep, PoseSnapshot,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const SNAPSHOT_CAPACITY: usize = 128;

// ─────────────────────────────────────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncPhase {
    Idle,
    PreviewPending,
    InteractionLocked,
}

/// Read-only copy of the synchronizer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncSnapshot {
    /// Increments on every change.
    pub revision: u64,
    pub committed: ActuatorPose,
    pub preview: Option<ActuatorPose>,
    pub lock: Option<LockOwner>,
    pub speed: u8,
}

impl SyncSnapshot {
    pub fn phase(&self) -> SyncPhase {
        if self.lock.is_some() {
            SyncPhase::InteractionLocked
        } else if self.preview.is_some() {
            SyncPhase::PreviewPending
        } else {
            SyncPhase::Idle
        }
    }

    /// The pose a renderer should draw and whether it is a preview.
    pub fn displayed(&self) -> (ActuatorPose, bool) {
        match self.preview {
            Some(preview) => (preview, true),
            None => (self.committed, false),
        }
    }
}

/// What happened to an external state push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Applied,
    /// Dropped because the lock is held.
    Discarded(LockOwner),
    /// Dropped because the reported values are out of range.
    Rejected,
}

/// What happened to a promotion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoteOutcome {
    /// The sent pose is now committed; `preview_cleared` is false when a
    /// newer preview was staged while the send was in flight.
    Committed { preview_cleared: bool },
    /// A playback run owns the committed pose.
    Ignored,
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal state
// ─────────────────────────────────────────────────────────────────────────────

struct SyncState {
    revision: u64,
    committed: ActuatorPose,
    preview: Option<ActuatorPose>,
    lock: Option<LockOwner>,
    speed: u8,
}

impl SyncState {
    fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            revision: self.revision,
            committed: self.committed,
            preview: self.preview,
            lock: self.lock,
            speed: self.speed,
        }
    }

    fn playback_owner(&self) -> Option<LockOwner> {
        self.lock.filter(|owner| matches!(owner, LockOwner::Playback(_)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PoseSynchronizer
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable handle to the shared pose state.
#[derive(Clone)]
pub struct PoseSynchronizer {
    state: Arc<Mutex<SyncState>>,
    changes: broadcast::Sender<SyncSnapshot>,
}

impl PoseSynchronizer {
    pub fn new(initial: PoseSnapshot) -> Self {
        let (changes, _) = broadcast::channel(SNAPSHOT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(SyncState {
                revision: 0,
                committed: initial.pose,
                preview: None,
                lock: None,
                speed: initial.speed,
            })),
            changes,
        }
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bump the revision and broadcast; called with the guard still held so
    /// subscribers observe changes in order.
    fn publish(&self, state: &mut SyncState) {
        state.revision += 1;
        // No subscribers is fine.
        let _ = self.changes.send(state.snapshot());
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.state().snapshot()
    }

    /// The playback run holding the lock, if any.
    pub fn playback_owner(&self) -> Option<LockOwner> {
        self.state().playback_owner()
    }

    /// Stream of every state change.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncSnapshot> {
        self.changes.subscribe()
    }

    /// The preview if one is staged, otherwise the committed pose, together
    /// with the current speed.
    pub fn active_pose(&self) -> (ActuatorPose, u8) {
        let state = self.state();
        (state.preview.unwrap_or(state.committed), state.speed)
    }

    /// Stage a candidate pose. Refused for out-of-range poses and while a
    /// playback run holds the lock.
    pub fn stage_preview(&self, pose: ActuatorPose) -> Result<(), ArmError> {
        let pose = pose.ensure_in_range()?;
        let mut state = self.state();
        if let Some(held_by) = state.playback_owner() {
            return Err(ArmError::LockContention { held_by });
        }
        state.preview = Some(pose);
        self.publish(&mut state);
        Ok(())
    }

    /// Drop the staged preview, e.g. when the current target became
    /// unreachable. Returns `true` if there was one.
    pub fn discard_preview(&self) -> bool {
        let mut state = self.state();
        if state.preview.take().is_some() {
            self.publish(&mut state);
            true
        } else {
            false
        }
    }

    /// Set the speed used for subsequent commands, clamped to the scale.
    pub fn set_speed(&self, speed: u8) -> Result<u8, ArmError> {
        let mut state = self.state();
        if let Some(held_by) = state.playback_owner() {
            return Err(ArmError::LockContention { held_by });
        }
        state.speed = speed.min(MAX_SPEED);
        let applied = state.speed;
        self.publish(&mut state);
        Ok(applied)
    }

    /// Take the interaction lock. Re-acquiring as the current owner is a
    /// no-op; any other owner is refused.
    pub fn acquire_lock(&self, owner: LockOwner) -> Result<(), ArmError> {
        let mut state = self.state();
        match state.lock {
            Some(current) if current == owner => Ok(()),
            Some(held_by) => {
                debug!(%owner, %held_by, "lock contention");
                Err(ArmError::LockContention { held_by })
            }
            None => {
                state.lock = Some(owner);
                self.publish(&mut state);
                info!(%owner, "interaction lock acquired");
                Ok(())
            }
        }
    }

    /// Release the lock; only its owner may. Any stale preview is cleared.
    pub fn release_lock(&self, owner: LockOwner) -> Result<(), ArmError> {
        let mut state = self.state();
        if state.lock != Some(owner) {
            return Err(ArmError::NotLockOwner { requested: owner });
        }
        state.lock = None;
        state.preview = None;
        self.publish(&mut state);
        info!(%owner, "interaction lock released");
        Ok(())
    }

    /// Record that `sent` reached the actuation service.
    pub fn promote(&self, sent: &ActuatorPose, speed: u8) -> PromoteOutcome {
        let mut state = self.state();
        if let Some(owner) = state.playback_owner() {
            debug!(%owner, pose = %sent, "promotion ignored during playback");
            return PromoteOutcome::Ignored;
        }
        state.committed = *sent;
        state.speed = speed.min(MAX_SPEED);
        let preview_cleared = state.preview.as_ref() == Some(sent);
        if preview_cleared {
            state.preview = None;
        }
        self.publish(&mut state);
        PromoteOutcome::Committed { preview_cleared }
    }

    /// Apply hardware-observed state unless someone holds the lock.
    pub fn apply_external_push(&self, push: PoseSnapshot) -> PushOutcome {
        if !push.pose.in_range() {
            warn!(pose = %push.pose, "rejected out-of-range state push");
            return PushOutcome::Rejected;
        }
        let mut state = self.state();
        if let Some(owner) = state.lock {
            debug!(%owner, pose = %push.pose, "state push discarded while locked");
            return PushOutcome::Discarded(owner);
        }
        state.committed = push.pose;
        state.speed = push.speed;
        state.preview = None;
        self.publish(&mut state);
        PushOutcome::Applied
    }

    /// Direct write by the lock holder, used by playback.
    pub fn drive_committed(&self, owner: LockOwner, step: &MotionStep) -> Result<(), ArmError> {
        let pose = step.pose.ensure_in_range()?;
        let mut state = self.state();
        if state.lock != Some(owner) {
            return Err(ArmError::NotLockOwner { requested: owner });
        }
        state.committed = pose;
        state.speed = step.speed;
        state.preview = None;
        self.publish(&mut state);
        Ok(())
    }
}

impl Default for PoseSynchronizer {
    fn default() -> Self {
        Self::new(PoseSnapshot::default())
    }
}
