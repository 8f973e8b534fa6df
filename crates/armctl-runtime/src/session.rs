//! [`ArmSession`] – the operator-facing façade over the runtime pieces.
//!
//! A session owns one [`PoseSynchronizer`], one [`CommandDispatcher`], a
//! [`SequencePlayer`], the step recorder and the [`MotionLibrary`]. Every
//! operator action funnels through the same path:
//!
//! 1. work out the candidate [`ActuatorPose`] (solver + calibration for
//!    Cartesian moves, direct edits for joints and the gripper);
//! 2. stage it as the preview;
//! 3. hand it to the dispatcher, which promotes it once the actuation service
//!    accepts it.
//!
//! Unreachable or out-of-range targets discard the preview so nothing stale is
//! shown or sent.

use std::sync::Arc;

use armctl_kinematics::{
    ElbowConfiguration, GripperPosition, ServoCalibration, forward_from_pose, solve_with,
};
use armctl_memory::{MotionLibrary, SavedPoint};
use armctl_middleware::{ActuationService, EventBus};
use armctl_types::{
    ActuatorPose, ArmError, ArmGeometry, CartesianTarget, DEFAULT_SPEED, LockOwner, MotionStep,
    PoseSnapshot, Sequence,
};
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::{CommandDispatcher, DispatchStats, DispatcherConfig, PoseCommand};
use crate::render::{PoseRenderer, spawn_renderer};
use crate::sequence::{
    PlaybackConfig, PlaybackEvent, PlaybackHandle, PlaybackReport, SequencePlayer,
    SequenceRecorder,
};
use crate::synchronizer::{PoseSynchronizer, PushOutcome, SyncPhase};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`ArmSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub geometry: ArmGeometry,
    pub calibration: ServoCalibration,
    pub elbow: ElbowConfiguration,
    pub dispatcher: DispatcherConfig,
    pub playback: PlaybackConfig,
    pub gripper_open: i32,
    pub gripper_closed: i32,
    /// Lowest z a jog may reach, in mm.
    pub jog_z_floor: f64,
    pub initial: PoseSnapshot,
    /// SQLite file for the motion library. `None` uses an in-memory database.
    pub persistence_path: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            geometry: ArmGeometry::default(),
            calibration: ServoCalibration::default(),
            elbow: ElbowConfiguration::default(),
            dispatcher: DispatcherConfig::default(),
            playback: PlaybackConfig::default(),
            gripper_open: 90,
            gripper_closed: 120,
            jog_z_floor: -50.0,
            initial: PoseSnapshot::default(),
            persistence_path: None,
        }
    }
}

/// Cartesian degree of freedom for [`ArmSession::jog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
    Pitch,
    Roll,
}

impl Axis {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "x" => Some(Axis::X),
            "y" => Some(Axis::Y),
            "z" => Some(Axis::Z),
            "pitch" | "p" => Some(Axis::Pitch),
            "roll" | "r" => Some(Axis::Roll),
            _ => None,
        }
    }

    /// `target` moved by `delta` along this axis; z never drops below
    /// `z_floor`.
    pub fn apply(self, target: CartesianTarget, delta: f64, z_floor: f64) -> CartesianTarget {
        let mut next = target;
        match self {
            Axis::X => next.x += delta,
            Axis::Y => next.y += delta,
            Axis::Z => next.z = (next.z + delta).max(z_floor),
            Axis::Pitch => next.pitch_deg += delta,
            Axis::Roll => next.roll_deg += delta,
        }
        next
    }
}

/// Point-in-time view of the session, suitable for display or JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub phase: SyncPhase,
    pub committed: ActuatorPose,
    pub preview: Option<ActuatorPose>,
    pub lock: Option<LockOwner>,
    pub speed: u8,
    pub target: CartesianTarget,
    /// Where the committed pose puts the tool.
    pub tool: GripperPosition,
    pub recorded_steps: usize,
    pub playing: Option<u64>,
    pub dispatch: DispatchStats,
}

// ─────────────────────────────────────────────────────────────────────────────
// ArmSession
// ─────────────────────────────────────────────────────────────────────────────

pub struct ArmSession {
    config: SessionConfig,
    service: Arc<dyn ActuationService>,
    sync: PoseSynchronizer,
    dispatcher: CommandDispatcher,
    player: SequencePlayer,
    recorder: SequenceRecorder,
    library: MotionLibrary,
    target: CartesianTarget,
    playback: Option<PlaybackHandle>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ArmSession {
    /// Build a session on the current Tokio runtime.
    ///
    /// `alerts` receives dispatch failures on the system-alerts topic.
    pub fn new(
        config: SessionConfig,
        service: Arc<dyn ActuationService>,
        alerts: Option<EventBus>,
    ) -> Result<Self, ArmError> {
        config.geometry.validate()?;

        let library = match &config.persistence_path {
            Some(path) => {
                info!(path = %path, "opening motion library");
                MotionLibrary::open(path)?
            }
            None => {
                warn!("no persistence path configured; sequences and points are kept in memory");
                MotionLibrary::open_in_memory()?
            }
        };

        let sync = PoseSynchronizer::new(config.initial);
        let dispatcher = CommandDispatcher::spawn(
            Arc::clone(&service),
            sync.clone(),
            config.dispatcher,
            alerts,
        );
        let player = SequencePlayer::new(Arc::clone(&service), sync.clone(), config.playback);
        let target = forward_from_pose(
            &config.initial.pose,
            &config.calibration,
            &config.geometry,
        )
        .as_target();

        Ok(Self {
            config,
            service,
            sync,
            dispatcher,
            player,
            recorder: SequenceRecorder::new(),
            library,
            target,
            playback: None,
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    /// Report playback progress on `events`.
    pub fn with_playback_events(mut self, events: mpsc::UnboundedSender<PlaybackEvent>) -> Self {
        self.player = self.player.with_events(events);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn synchronizer(&self) -> &PoseSynchronizer {
        &self.sync
    }

    /// Token that stops any playback and marks the session as shutting down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Feed the service's state pushes into the synchronizer.
    pub async fn listen_for_pushes(&mut self) {
        let mut pushes = self.service.state_stream().await;
        let sync = self.sync.clone();
        let stop = self.shutdown.clone();
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    next = pushes.next() => match next {
                        Some(push) => {
                            let outcome = sync.apply_external_push(push);
                            debug!(?outcome, "state push");
                        }
                        None => break,
                    },
                }
            }
        }));
    }

    /// Draw every state change with `renderer`.
    pub fn attach_renderer<R: PoseRenderer>(&mut self, renderer: R) {
        self.tasks.push(spawn_renderer(self.sync.subscribe(), renderer));
    }

    // ── Cartesian control ────────────────────────────────────────────────────

    pub fn target(&self) -> CartesianTarget {
        self.target
    }

    /// Solve `target`, stage the resulting pose and dispatch it.
    pub fn set_target(&mut self, target: CartesianTarget) -> Result<ActuatorPose, ArmError> {
        let solution = solve_with(&target, &self.config.geometry, self.config.elbow);
        if !solution.is_valid() {
            self.sync.discard_preview();
            debug!(?target, "target unreachable");
            return Err(ArmError::Unreachable);
        }

        let gripper = self.sync.active_pose().0.gripper();
        let pose = self.config.calibration.map(&solution, gripper);
        if !pose.in_range() {
            self.sync.discard_preview();
            debug!(?target, %pose, "target outside actuator range");
            return Err(ArmError::OutOfActuatorRange {
                values: pose.values(),
            });
        }

        self.stage(pose)?;
        self.target = target;
        Ok(pose)
    }

    /// Move the current target along one axis.
    pub fn jog(&mut self, axis: Axis, delta: f64) -> Result<ActuatorPose, ArmError> {
        let next = axis.apply(self.target, delta, self.config.jog_z_floor);
        self.set_target(next)
    }

    // ── Direct actuator control ──────────────────────────────────────────────

    /// Set one actuator channel (0–4 joints, 5 gripper) on top of the active
    /// pose.
    pub fn set_joint(&mut self, index: usize, value: i32) -> Result<ActuatorPose, ArmError> {
        let (current, _) = self.sync.active_pose();
        let pose = current.with_channel(index, value)?.ensure_in_range()?;
        self.stage(pose)?;
        Ok(pose)
    }

    pub fn set_gripper(&mut self, value: i32) -> Result<ActuatorPose, ArmError> {
        let (current, _) = self.sync.active_pose();
        let pose = current.with_gripper(value).ensure_in_range()?;
        self.stage(pose)?;
        Ok(pose)
    }

    pub fn open_gripper(&mut self) -> Result<ActuatorPose, ArmError> {
        self.set_gripper(self.config.gripper_open)
    }

    pub fn close_gripper(&mut self) -> Result<ActuatorPose, ArmError> {
        self.set_gripper(self.config.gripper_closed)
    }

    /// Returns the speed actually applied after clamping.
    pub fn set_speed(&mut self, speed: u8) -> Result<u8, ArmError> {
        self.sync.set_speed(speed)
    }

    /// All joints to neutral at the default speed.
    pub fn home(&mut self) -> Result<ActuatorPose, ArmError> {
        self.sync.set_speed(DEFAULT_SPEED)?;
        let pose = ActuatorPose::home();
        self.stage(pose)?;
        self.target = forward_from_pose(
            &pose,
            &self.config.calibration,
            &self.config.geometry,
        )
        .as_target();
        Ok(pose)
    }

    fn stage(&self, pose: ActuatorPose) -> Result<(), ArmError> {
        self.sync.stage_preview(pose)?;
        let speed = self.sync.snapshot().speed;
        self.dispatcher.dispatch(PoseCommand::new(pose, speed))
    }

    // ── Interaction lock ─────────────────────────────────────────────────────

    /// Start an operator drag: state pushes are ignored until
    /// [`end_drag`][Self::end_drag].
    pub fn begin_drag(&self) -> Result<(), ArmError> {
        self.sync.acquire_lock(LockOwner::Operator)
    }

    pub fn end_drag(&self) -> Result<(), ArmError> {
        self.sync.release_lock(LockOwner::Operator)
    }

    /// Apply a hardware state push directly.
    pub fn apply_push(&self, push: PoseSnapshot) -> PushOutcome {
        self.sync.apply_external_push(push)
    }

    // ── Recording ────────────────────────────────────────────────────────────

    pub fn record_step(&mut self) -> Result<usize, ArmError> {
        let index = self.recorder.record(&self.sync)?;
        info!(index, "step recorded");
        Ok(index)
    }

    pub fn remove_step(&mut self, index: usize) -> Result<MotionStep, ArmError> {
        self.recorder.remove_step(index)
    }

    pub fn clear_steps(&mut self) {
        self.recorder.clear();
    }

    pub fn recorded_steps(&self) -> &[MotionStep] {
        self.recorder.steps()
    }

    // ── Sequence library ─────────────────────────────────────────────────────

    /// Store the recorded steps under `name` and start a fresh recording.
    pub fn save_sequence(&mut self, name: &str) -> Result<Sequence, ArmError> {
        let sequence = self.recorder.to_sequence(name)?;
        self.library.put_sequence(&sequence)?;
        self.recorder.clear();
        info!(name = %sequence.name, steps = sequence.len(), "sequence saved");
        Ok(sequence)
    }

    pub fn sequence(&self, name: &str) -> Result<Sequence, ArmError> {
        self.library
            .get_sequence(name)?
            .ok_or_else(|| ArmError::NotFound(format!("sequence '{name}'")))
    }

    pub fn list_sequences(&self) -> Result<Vec<Sequence>, ArmError> {
        Ok(self.library.list_sequences()?)
    }

    pub fn delete_sequence(&self, name: &str) -> Result<bool, ArmError> {
        Ok(self.library.delete_sequence(name)?)
    }

    // ── Playback ─────────────────────────────────────────────────────────────

    /// Start playing a stored sequence in the background. Returns the run id.
    pub fn play_sequence(&mut self, name: &str) -> Result<u64, ArmError> {
        let sequence = self.sequence(name)?;
        let handle = self
            .player
            .start(sequence, self.shutdown.child_token())?;
        let run = handle.run_id();
        if let Some(previous) = self.playback.replace(handle) {
            // Only reachable once the previous run released the lock.
            debug!(run = previous.run_id(), "replacing finished playback handle");
        }
        Ok(run)
    }

    pub fn is_playing(&self) -> bool {
        self.playback.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ask the current run to stop. Returns `false` if nothing was playing.
    pub fn stop_playback(&self) -> bool {
        match &self.playback {
            Some(handle) if !handle.is_finished() => {
                handle.cancel();
                true
            }
            _ => false,
        }
    }

    /// Wait for the current run, if any, and return its report.
    pub async fn wait_playback(&mut self) -> Result<Option<PlaybackReport>, ArmError> {
        match self.playback.take() {
            Some(handle) => handle.join().await.map(Some),
            None => Ok(None),
        }
    }

    /// Stage step `index` of a stored sequence as the next pose, with the
    /// step's speed.
    pub fn go_to_step(&mut self, name: &str, index: usize) -> Result<MotionStep, ArmError> {
        let sequence = self.sequence(name)?;
        let step = *sequence.steps.get(index).ok_or(ArmError::IndexOutOfBounds {
            index,
            len: sequence.len(),
        })?;
        self.sync.set_speed(step.speed)?;
        self.stage(step.pose)?;
        Ok(step)
    }

    // ── Points ───────────────────────────────────────────────────────────────

    /// Save the current Cartesian target under `name`.
    pub fn save_point(&self, name: &str) -> Result<SavedPoint, ArmError> {
        self.library.put_point(name, &self.target)?;
        self.library
            .get_point(name.trim())?
            .ok_or_else(|| ArmError::NotFound(format!("point '{name}'")))
    }

    /// Move to a saved point.
    pub fn load_point(&mut self, name: &str) -> Result<ActuatorPose, ArmError> {
        let point = self
            .library
            .get_point(name)?
            .ok_or_else(|| ArmError::NotFound(format!("point '{name}'")))?;
        self.set_target(point.target)
    }

    pub fn list_points(&self) -> Result<Vec<SavedPoint>, ArmError> {
        Ok(self.library.list_points()?)
    }

    pub fn delete_point(&self, name: &str) -> Result<bool, ArmError> {
        Ok(self.library.delete_point(name)?)
    }

    // ── Status / shutdown ────────────────────────────────────────────────────

    pub fn status(&self) -> SessionStatus {
        let snapshot = self.sync.snapshot();
        SessionStatus {
            phase: snapshot.phase(),
            committed: snapshot.committed,
            preview: snapshot.preview,
            lock: snapshot.lock,
            speed: snapshot.speed,
            target: self.target,
            tool: forward_from_pose(
                &snapshot.committed,
                &self.config.calibration,
                &self.config.geometry,
            ),
            recorded_steps: self.recorder.steps().len(),
            playing: self
                .playback
                .as_ref()
                .filter(|h| !h.is_finished())
                .map(PlaybackHandle::run_id),
            dispatch: self.dispatcher.stats(),
        }
    }

    /// Stop playback, flush the dispatcher and stop background tasks.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Err(e) = self.wait_playback().await {
            warn!(error = %e, "playback ended with an error during shutdown");
        }
        self.dispatcher.shutdown().await;
        for task in self.tasks {
            task.abort();
        }
        info!("session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::PlaybackOutcome;
    use crate::testing::MockActuator;
    use armctl_middleware::LoopbackActuator;
    use std::time::Duration;

    fn reachable() -> CartesianTarget {
        CartesianTarget::new(100.0, 100.0, 40.0, -90.0, 15.0)
    }

    fn session_with(mock: &Arc<MockActuator>) -> ArmSession {
        ArmSession::new(SessionConfig::default(), mock.clone(), None).unwrap()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn reachable_target_is_previewed_then_committed() {
        let mock = Arc::new(MockActuator::default());
        let mut session = session_with(&mock);

        let pose = session.set_target(reachable()).unwrap();
        assert_eq!(pose.values(), [135, 23, 20, 4, 15, 90]);
        assert_eq!(session.status().preview, Some(pose));
        assert_eq!(session.target(), reachable());

        settle().await;
        let status = session.status();
        assert_eq!(status.committed, pose);
        assert_eq!(status.preview, None);
        assert_eq!(mock.sent_poses(), vec![(pose, 50)]);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_target_discards_preview() {
        let mock = Arc::new(MockActuator::default());
        let mut session = session_with(&mock);
        session.set_joint(0, 10).unwrap();
        assert!(session.status().preview.is_some());

        assert_eq!(
            session.set_target(CartesianTarget::default()),
            Err(ArmError::Unreachable)
        );
        assert_eq!(session.status().preview, None);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_solution_is_refused() {
        let mock = Arc::new(MockActuator::default());
        let mut session = session_with(&mock);
        let err = session
            .set_target(CartesianTarget::new(0.0, 150.0, 50.0, -90.0, 0.0))
            .unwrap_err();
        assert_eq!(
            err,
            ArmError::OutOfActuatorRange {
                values: [180, 29, 33, -4, 0, 90]
            }
        );
        settle().await;
        assert!(mock.sent_poses().is_empty());
    }

    #[test]
    fn jog_clamps_z_to_floor() {
        let t = Axis::Z.apply(reachable(), -500.0, -50.0);
        assert_eq!(t.z, -50.0);
        let t = Axis::X.apply(reachable(), 10.0, -50.0);
        assert_eq!(t.x, 110.0);
        assert_eq!(Axis::parse("Pitch"), Some(Axis::Pitch));
        assert_eq!(Axis::parse("w"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn jog_moves_from_current_target() {
        let mock = Arc::new(MockActuator::default());
        let mut session = session_with(&mock);
        session.set_target(reachable()).unwrap();
        let pose = session.jog(Axis::Z, -10.0).unwrap();
        assert_eq!(pose.values(), [135, 24, 15, 9, 15, 90]);
        assert_eq!(session.target().z, 30.0);
        let pose = session.jog(Axis::Roll, 15.0).unwrap();
        assert_eq!(pose.channel(4), Some(30));
    }

    #[tokio::test(start_paused = true)]
    async fn initial_target_matches_initial_pose() {
        let mock = Arc::new(MockActuator::default());
        let session = session_with(&mock);
        let target = session.target();
        assert!((target.x - 355.0).abs() < 1e-9);
        assert!((target.z - 100.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn gripper_and_joint_edits_build_on_active_pose() {
        let mock = Arc::new(MockActuator::default());
        let mut session = session_with(&mock);
        session.set_joint(0, 45).unwrap();
        let pose = session.close_gripper().unwrap();
        assert_eq!(pose.values(), [45, 90, 90, 90, 90, 120]);
        assert_eq!(session.open_gripper().unwrap().gripper(), 90);
        assert!(matches!(
            session.set_joint(9, 10),
            Err(ArmError::IndexOutOfBounds { index: 9, .. })
        ));
        assert!(matches!(
            session.set_gripper(200),
            Err(ArmError::OutOfActuatorRange { .. })
        ));

        settle().await;
        // Three edits in one window: only the last goes out.
        assert_eq!(mock.sent_poses().len(), 1);
        assert_eq!(mock.sent_poses()[0].0.gripper(), 90);
    }

    #[tokio::test(start_paused = true)]
    async fn home_resets_pose_and_speed() {
        let mock = Arc::new(MockActuator::default());
        let mut session = session_with(&mock);
        session.set_speed(90).unwrap();
        session.set_joint(2, 10).unwrap();
        settle().await;

        session.home().unwrap();
        settle().await;
        let status = session.status();
        assert_eq!(status.committed, ActuatorPose::home());
        assert_eq!(status.speed, 50);
        assert!((status.target.x - 355.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn drag_lock_shields_from_pushes() {
        let mock = Arc::new(MockActuator::default());
        let session = session_with(&mock);
        let pushed = PoseSnapshot::new(ActuatorPose::new([10, 90, 90, 90, 0, 90]), 60);

        session.begin_drag().unwrap();
        assert_eq!(
            session.apply_push(pushed),
            PushOutcome::Discarded(LockOwner::Operator)
        );
        assert_eq!(session.status().committed, ActuatorPose::home());
        session.end_drag().unwrap();
        assert_eq!(session.apply_push(pushed), PushOutcome::Applied);
        assert_eq!(session.status().committed, pushed.pose);
    }

    #[tokio::test(start_paused = true)]
    async fn record_save_and_play() {
        let mock = Arc::new(MockActuator::default());
        let mut session = session_with(&mock);

        session.set_joint(0, 30).unwrap();
        session.record_step().unwrap();
        session.set_joint(0, 60).unwrap();
        session.record_step().unwrap();
        session.remove_step(0).unwrap();
        session.set_joint(0, 120).unwrap();
        session.record_step().unwrap();
        assert_eq!(session.recorded_steps().len(), 2);

        let saved = session.save_sequence("wave").unwrap();
        assert_eq!(saved.len(), 2);
        assert!(session.recorded_steps().is_empty());
        assert_eq!(session.list_sequences().unwrap().len(), 1);

        settle().await;
        let run = session.play_sequence("wave").unwrap();
        assert!(session.is_playing());
        assert_eq!(session.status().playing, Some(run));

        let report = session.wait_playback().await.unwrap().unwrap();
        assert_eq!(report.run, run);
        assert_eq!(report.steps_applied, 2);
        assert_eq!(report.outcome, PlaybackOutcome::Completed);
        assert_eq!(session.status().committed.channel(0), Some(120));
        assert_eq!(mock.sequences().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn operator_edits_refused_while_playing() {
        let mock = Arc::new(MockActuator::default());
        let mut session = session_with(&mock);
        session.record_step().unwrap();
        session.record_step().unwrap();
        session.save_sequence("still").unwrap();

        session.play_sequence("still").unwrap();
        assert!(matches!(
            session.set_joint(0, 10),
            Err(ArmError::LockContention { .. })
        ));
        assert!(matches!(
            session.play_sequence("still"),
            Err(ArmError::LockContention { .. })
        ));
        assert!(session.begin_drag().is_err());

        assert!(session.stop_playback());
        let report = session.wait_playback().await.unwrap().unwrap();
        assert_eq!(report.outcome, PlaybackOutcome::Cancelled);
        assert!(!session.stop_playback());
        session.set_joint(0, 10).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_token_cancels_playback() {
        let mock = Arc::new(MockActuator::default());
        let mut session = session_with(&mock);
        session.record_step().unwrap();
        session.record_step().unwrap();
        session.record_step().unwrap();
        session.save_sequence("long").unwrap();

        session.play_sequence("long").unwrap();
        session.shutdown_token().cancel();
        let report = session.wait_playback().await.unwrap().unwrap();
        assert_eq!(report.outcome, PlaybackOutcome::Cancelled);
        assert!(report.steps_applied < 3);
    }

    #[tokio::test(start_paused = true)]
    async fn go_to_step_uses_step_speed() {
        let mock = Arc::new(MockActuator::default());
        let mut session = session_with(&mock);
        session.set_speed(20).unwrap();
        session.set_joint(1, 45).unwrap();
        session.record_step().unwrap();
        session.save_sequence("one").unwrap();
        session.set_speed(80).unwrap();

        let step = session.go_to_step("one", 0).unwrap();
        assert_eq!(step.speed, 20);
        settle().await;
        assert_eq!(mock.sent_poses().last(), Some(&(step.pose, 20)));

        assert_eq!(
            session.go_to_step("one", 3),
            Err(ArmError::IndexOutOfBounds { index: 3, len: 1 })
        );
        assert!(matches!(
            session.go_to_step("missing", 0),
            Err(ArmError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn points_round_trip_through_library() {
        let mock = Arc::new(MockActuator::default());
        let mut session = session_with(&mock);
        session.set_target(reachable()).unwrap();
        let saved = session.save_point("bin").unwrap();
        assert_eq!(saved.target, reachable());

        session.home().unwrap();
        let pose = session.load_point("bin").unwrap();
        assert_eq!(pose.values(), [135, 23, 20, 4, 15, 90]);
        assert_eq!(session.list_points().unwrap().len(), 1);
        assert!(session.delete_point("bin").unwrap());
        assert!(matches!(
            session.load_point("bin"),
            Err(ArmError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_sequence_reports_presence() {
        let mock = Arc::new(MockActuator::default());
        let mut session = session_with(&mock);
        session.record_step().unwrap();
        session.save_sequence("tmp").unwrap();
        assert!(session.delete_sequence("tmp").unwrap());
        assert!(!session.delete_sequence("tmp").unwrap());
        assert!(matches!(
            session.play_sequence("tmp"),
            Err(ArmError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_tool_position() {
        let mock = Arc::new(MockActuator::default());
        let session = session_with(&mock);
        let status = session.status();
        assert_eq!(status.phase, SyncPhase::Idle);
        assert!((status.tool.x - 355.0).abs() < 1e-9);
        assert!(serde_json::to_string(&status).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn loopback_echo_commits_through_state_stream() {
        let bus = EventBus::default();
        let _commands = bus.subscribe_to(armctl_middleware::Topic::HardwareCommands);
        let loopback = Arc::new(LoopbackActuator::new(Arc::new(bus.clone())).with_echo(true));
        let mut session = ArmSession::new(SessionConfig::default(), loopback, None).unwrap();
        session.listen_for_pushes().await;

        let pose = session.set_joint(3, 100).unwrap();
        settle().await;
        assert_eq!(session.status().committed, pose);
        assert_eq!(session.status().dispatch.sent, 1);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_library_survives_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motions.db").to_string_lossy().to_string();
        let config = SessionConfig {
            persistence_path: Some(path),
            ..SessionConfig::default()
        };

        let mock = Arc::new(MockActuator::default());
        let mut first = ArmSession::new(config.clone(), mock.clone(), None).unwrap();
        first.record_step().unwrap();
        first.save_sequence("kept").unwrap();
        first.shutdown().await;

        let second = ArmSession::new(config, mock.clone(), None).unwrap();
        assert_eq!(second.sequence("kept").unwrap().len(), 1);
    }
}
