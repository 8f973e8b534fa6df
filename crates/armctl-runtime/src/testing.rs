//! Test doubles shared by the runtime unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use armctl_middleware::ActuationService;
use armctl_types::{ActuatorPose, ArmError, MotionStep, PoseSnapshot};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};

/// Records every call; can be told to fail or to answer slowly.
#[derive(Default)]
pub(crate) struct MockActuator {
    poses: Mutex<Vec<(ActuatorPose, u8)>>,
    sequences: Mutex<Vec<Vec<MotionStep>>>,
    attempts: AtomicUsize,
    fail: bool,
    delay: Option<Duration>,
}

impl MockActuator {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn sent_poses(&self) -> Vec<(ActuatorPose, u8)> {
        self.poses.lock().unwrap().clone()
    }

    pub(crate) fn sequences(&self) -> Vec<Vec<MotionStep>> {
        self.sequences.lock().unwrap().clone()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActuationService for MockActuator {
    async fn set_pose(&self, pose: &ActuatorPose, speed: u8) -> Result<(), ArmError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(ArmError::Dispatch("mock refused".to_string()));
        }
        self.poses.lock().unwrap().push((*pose, speed));
        Ok(())
    }

    async fn execute_sequence(&self, steps: &[MotionStep]) -> Result<(), ArmError> {
        if self.fail {
            return Err(ArmError::Dispatch("mock refused".to_string()));
        }
        self.sequences.lock().unwrap().push(steps.to_vec());
        Ok(())
    }

    async fn state_stream(&self) -> BoxStream<'static, PoseSnapshot> {
        Box::pin(stream::empty())
    }
}
