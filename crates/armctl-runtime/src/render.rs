//! Feeding the synchronizer's snapshots to a display.
//!
//! A renderer only ever sees the pose to draw and whether it is a preview; it
//! cannot write back into the synchronizer.

use armctl_kinematics::{ServoCalibration, forward_from_pose};
use armctl_types::{ActuatorPose, ArmGeometry};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::synchronizer::SyncSnapshot;

/// Something that draws the arm.
pub trait PoseRenderer: Send + 'static {
    fn render(&mut self, pose: &ActuatorPose, is_preview: bool);
}

/// Drive `renderer` from a snapshot subscription until the synchronizer goes
/// away. Consecutive snapshots that would draw the same frame are skipped;
/// after a lag the renderer simply continues from the newest snapshot.
pub fn spawn_renderer<R: PoseRenderer>(
    mut changes: broadcast::Receiver<SyncSnapshot>,
    mut renderer: R,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last: Option<(ActuatorPose, bool)> = None;
        loop {
            match changes.recv().await {
                Ok(snapshot) => {
                    let frame = snapshot.displayed();
                    if last == Some(frame) {
                        continue;
                    }
                    renderer.render(&frame.0, frame.1);
                    last = Some(frame);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "renderer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("renderer stopped");
    })
}

/// Logs each frame with the tool position it corresponds to.
pub struct TracingRenderer {
    geometry: ArmGeometry,
    calibration: ServoCalibration,
}

impl TracingRenderer {
    pub fn new(geometry: ArmGeometry, calibration: ServoCalibration) -> Self {
        Self {
            geometry,
            calibration,
        }
    }
}

impl PoseRenderer for TracingRenderer {
    fn render(&mut self, pose: &ActuatorPose, is_preview: bool) {
        let tool = forward_from_pose(pose, &self.calibration, &self.geometry);
        debug!(
            %pose,
            preview = is_preview,
            x = tool.x,
            y = tool.y,
            z = tool.z,
            "frame"
        );
    }
}
