//! The remote actuation seam.
//!
//! The engine never talks to a serial port or socket directly. It hands
//! poses and sequences to an [`ActuationService`] and consumes the state the
//! service reports back. [`LoopbackActuator`][crate::loopback::LoopbackActuator]
//! is the in-process implementation; real transports implement the same
//! trait.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use armctl_types::{ActuatorPose, ArmError, MotionStep, PoseSnapshot};

/// Every actuation backend must implement this trait.
///
/// # Contract
///
/// * `set_pose` – command a single in-range pose at the given speed. A
///   returned `Ok` means the command was accepted for delivery.
/// * `execute_sequence` – hand a whole recorded sequence to the controller
///   so it can run the steps on its own clock.
/// * `state_stream` – live stream of the state the hardware reports.
#[async_trait]
pub trait ActuationService: Send + Sync {
    async fn set_pose(&self, pose: &ActuatorPose, speed: u8) -> Result<(), ArmError>;

    async fn execute_sequence(&self, steps: &[MotionStep]) -> Result<(), ArmError>;

    async fn state_stream(&self) -> BoxStream<'static, PoseSnapshot>;
}
