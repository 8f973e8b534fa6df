//! In-process actuation backend.
//!
//! [`LoopbackActuator`] bridges the engine and the internal [`EventBus`]:
//!
//! * **Outbound** – pose and sequence commands are serialised into
//!   controller frames and published on [`Topic::HardwareCommands`]. A
//!   serial or network writer subscribes there and forwards the lines.
//!
//! * **Inbound** – state lines read from the controller are parsed with
//!   [`ingest_state_line`][LoopbackActuator::ingest_state_line] and published
//!   on [`Topic::Telemetry`], which is what
//!   [`state_stream`][ActuationService::state_stream] yields.
//!
//! With echo enabled every accepted pose is reported straight back as a state
//! push, which is how the simulated arm behaves.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use armctl_types::{
    ActuatorPose, ArmError, Event, EventPayload, MotionStep, PoseSnapshot,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::adapter::ActuationService;
use crate::bus::{EventBus, Topic};
use crate::frames;

const SOURCE: &str = "armctl-middleware::loopback";

/// Actuation backend that speaks controller frames over the event bus.
pub struct LoopbackActuator {
    bus: Arc<EventBus>,
    echo_state: bool,
}

impl LoopbackActuator {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            echo_state: false,
        }
    }

    /// Report every accepted pose back on the telemetry topic.
    pub fn with_echo(mut self, echo_state: bool) -> Self {
        self.echo_state = echo_state;
        self
    }

    pub fn echoes_state(&self) -> bool {
        self.echo_state
    }

    /// Parse a controller state line and publish it as a state push.
    ///
    /// Returns the number of telemetry subscribers that received it.
    pub fn ingest_state_line(&self, line: &str) -> Result<usize, ArmError> {
        let snapshot = frames::parse_state_frame(line)?;
        self.publish_state(snapshot)
    }

    /// Publish an already-parsed state push.
    pub fn publish_state(&self, snapshot: PoseSnapshot) -> Result<usize, ArmError> {
        self.bus.publish_to(
            Topic::Telemetry,
            Event::new(format!("{SOURCE}/state"), EventPayload::StatePush(snapshot)),
        )
    }

    fn send_frame(&self, frame: String) -> Result<(), ArmError> {
        let event = Event::new(format!("{SOURCE}/command"), EventPayload::CommandFrame(frame));
        self.bus
            .publish_to(Topic::HardwareCommands, event)
            .map(|_| ())
            .map_err(|e| ArmError::Dispatch(e.to_string()))
    }
}

#[async_trait]
impl ActuationService for LoopbackActuator {
    async fn set_pose(&self, pose: &ActuatorPose, speed: u8) -> Result<(), ArmError> {
        let pose = pose.ensure_in_range()?;
        self.send_frame(frames::build_pose_frame(&pose, speed)?)?;
        if self.echo_state {
            // Nobody listening for state is not a failure of the command.
            if let Err(e) = self.publish_state(PoseSnapshot::new(pose, speed)) {
                debug!(error = %e, "state echo dropped");
            }
        }
        Ok(())
    }

    async fn execute_sequence(&self, steps: &[MotionStep]) -> Result<(), ArmError> {
        if steps.is_empty() {
            return Err(ArmError::EmptySequence);
        }
        self.send_frame(frames::build_sequence_frame(steps))
    }

    async fn state_stream(&self) -> BoxStream<'static, PoseSnapshot> {
        let rx = self.bus.subscribe_to(Topic::Telemetry);
        Box::pin(stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(Event {
                        payload: EventPayload::StatePush(snapshot),
                        ..
                    }) => return Some((snapshot, rx)),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(n)) => {
                        warn!(lagged_by = n, "state stream lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn make_adapter() -> (Arc<EventBus>, LoopbackActuator) {
        let bus = Arc::new(EventBus::default());
        let adapter = LoopbackActuator::new(Arc::clone(&bus));
        (bus, adapter)
    }

    #[tokio::test]
    async fn set_pose_publishes_controller_frame() {
        let (bus, adapter) = make_adapter();
        let mut rx = bus.subscribe_to(Topic::HardwareCommands);

        adapter
            .set_pose(&ActuatorPose::new([135, 23, 20, 4, 15, 90]), 60)
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.source, "armctl-middleware::loopback/command");
        match event.payload {
            EventPayload::CommandFrame(frame) => {
                assert_eq!(frame, r#"{"servos":[135,23,20,4,15,90],"velocidad":60}"#)
            }
            other => panic!("expected CommandFrame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn set_pose_without_writer_is_a_dispatch_failure() {
        let (_bus, adapter) = make_adapter();
        let err = adapter.set_pose(&ActuatorPose::home(), 50).await.unwrap_err();
        assert!(matches!(err, ArmError::Dispatch(_)));
    }

    #[tokio::test]
    async fn set_pose_refuses_out_of_range() {
        let (bus, adapter) = make_adapter();
        let _rx = bus.subscribe_to(Topic::HardwareCommands);
        let err = adapter
            .set_pose(&ActuatorPose::new([180, 29, 33, -4, 0, 90]), 50)
            .await
            .unwrap_err();
        assert!(matches!(err, ArmError::OutOfActuatorRange { .. }));
    }

    #[tokio::test]
    async fn execute_sequence_publishes_one_frame() {
        let (bus, adapter) = make_adapter();
        let mut rx = bus.subscribe_to(Topic::HardwareCommands);
        let steps = vec![
            MotionStep::new(ActuatorPose::home(), 50),
            MotionStep::new(ActuatorPose::new([100, 80, 70, 60, 50, 120]), 20),
        ];
        adapter.execute_sequence(&steps).await.unwrap();

        let event = rx.recv().await.unwrap();
        let EventPayload::CommandFrame(frame) = event.payload else {
            panic!("expected CommandFrame");
        };
        assert!(frame.contains("execute_sequence"));
        assert!(frame.contains("[100,80,70,60,50,120]"));
        assert!(matches!(
            adapter.execute_sequence(&[]).await,
            Err(ArmError::EmptySequence)
        ));
    }

    #[tokio::test]
    async fn echo_feeds_state_stream() {
        let (bus, adapter) = make_adapter();
        let adapter = adapter.with_echo(true);
        let _writer = bus.subscribe_to(Topic::HardwareCommands);
        let mut states = adapter.state_stream().await;

        let pose = ActuatorPose::new([100, 80, 70, 60, 50, 120]);
        adapter.set_pose(&pose, 40).await.unwrap();

        let snap = states.next().await.unwrap();
        assert_eq!(snap, PoseSnapshot::new(pose, 40));
    }

    #[tokio::test]
    async fn ingest_state_line_reaches_state_stream() {
        let (_bus, adapter) = make_adapter();
        let mut states = adapter.state_stream().await;

        let delivered = adapter
            .ingest_state_line(r#"{"servos":[90,90,90,90,90,120],"velocidad":50}"#)
            .unwrap();
        assert_eq!(delivered, 1);

        let snap = states.next().await.unwrap();
        assert_eq!(snap.pose.gripper(), 120);
    }

    #[test]
    fn ingest_state_line_rejects_garbage() {
        let (_bus, adapter) = make_adapter();
        assert!(matches!(
            adapter.ingest_state_line("{}"),
            Err(ArmError::Serialization(_))
        ));
    }
}
