//! Forward kinematics in the solver's frame.

use armctl_types::{ActuatorPose, ArmGeometry, CartesianTarget, JOINT_COUNT};
use serde::{Deserialize, Serialize};

use crate::servo_map::ServoCalibration;

/// Tool position and orientation reached by a set of joint angles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GripperPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
}

impl GripperPosition {
    /// Euclidean distance between the two tool positions.
    pub fn distance_to(&self, x: f64, y: f64, z: f64) -> f64 {
        ((self.x - x).powi(2) + (self.y - y).powi(2) + (self.z - z).powi(2)).sqrt()
    }

    /// The Cartesian target that would reach this position again.
    pub fn as_target(&self) -> CartesianTarget {
        CartesianTarget::new(self.x, self.y, self.z, self.pitch_deg, self.roll_deg)
    }
}

/// Where the tool ends up for `angles_deg` (base, shoulder, elbow, wrist
/// pitch, wrist roll).
pub fn forward(angles_deg: &[f64; JOINT_COUNT], geometry: &ArmGeometry) -> GripperPosition {
    let base = angles_deg[0].to_radians();
    let shoulder = angles_deg[1].to_radians();
    let forearm = shoulder + angles_deg[2].to_radians();
    let tool = forearm + angles_deg[3].to_radians();

    let r = geometry.shoulder_length * shoulder.cos()
        + geometry.elbow_length * forearm.cos()
        + geometry.wrist_to_tool_length * tool.cos();
    let z = geometry.base_to_shoulder_height
        + geometry.shoulder_length * shoulder.sin()
        + geometry.elbow_length * forearm.sin()
        + geometry.wrist_to_tool_length * tool.sin();

    GripperPosition {
        x: r * base.cos(),
        y: r * base.sin(),
        z,
        pitch_deg: tool.to_degrees(),
        roll_deg: angles_deg[4],
    }
}

/// Forward kinematics of an actuator pose, through the inverse calibration.
pub fn forward_from_pose(
    pose: &ActuatorPose,
    calibration: &ServoCalibration,
    geometry: &ArmGeometry,
) -> GripperPosition {
    forward(&calibration.unmap(pose), geometry)
}
