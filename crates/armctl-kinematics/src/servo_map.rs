//! Servo calibration: solver angles to actuator units.
//!
//! Each joint is mapped with `value = round(offset + sign * angle)`. The
//! offsets and signs describe how the servos were mounted, so they are
//! configuration loaded alongside the geometry rather than constants.

use armctl_types::{ActuatorPose, CHANNEL_COUNT, JOINT_COUNT, JointSolution};
use serde::{Deserialize, Serialize};

/// Affine mapping for a single joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointCalibration {
    /// Actuator value that corresponds to a solver angle of zero.
    pub offset_deg: f64,
    /// `1.0` or `-1.0`; flips joints mounted against the solver convention.
    pub sign: f64,
}

impl JointCalibration {
    pub const fn new(offset_deg: f64, sign: f64) -> Self {
        Self { offset_deg, sign }
    }

    fn to_actuator(self, angle_deg: f64) -> i32 {
        (self.offset_deg + self.sign * angle_deg).round() as i32
    }

    fn to_angle(self, value: i32) -> f64 {
        (f64::from(value) - self.offset_deg) * self.sign
    }
}

/// Calibration for the five solved joints. The gripper is not calibrated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServoCalibration {
    pub joints: [JointCalibration; JOINT_COUNT],
}

impl Default for ServoCalibration {
    fn default() -> Self {
        Self {
            joints: [
                JointCalibration::new(90.0, 1.0),  // base
                JointCalibration::new(90.0, -1.0), // shoulder
                JointCalibration::new(90.0, 1.0),  // elbow
                JointCalibration::new(90.0, 1.0),  // wrist pitch
                JointCalibration::new(0.0, 1.0),   // wrist roll
            ],
        }
    }
}

impl ServoCalibration {
    /// Map solver angles plus a gripper value into an [`ActuatorPose`].
    ///
    /// The solution's validity is not consulted; callers must refuse an
    /// unreachable solution before mapping it.
    pub fn map(&self, solution: &JointSolution, gripper: i32) -> ActuatorPose {
        let angles = solution.angles_deg();
        let mut values = [0i32; CHANNEL_COUNT];
        for (slot, (cal, angle)) in values.iter_mut().zip(self.joints.iter().zip(angles)) {
            *slot = cal.to_actuator(angle);
        }
        values[JOINT_COUNT] = gripper;
        ActuatorPose::new(values)
    }

    /// Invert the mapping: actuator values back to solver angles. The
    /// gripper channel is ignored.
    pub fn unmap(&self, pose: &ActuatorPose) -> [f64; JOINT_COUNT] {
        let values = pose.values();
        let mut angles = [0.0; JOINT_COUNT];
        for (angle, (cal, value)) in angles.iter_mut().zip(self.joints.iter().zip(values)) {
            *angle = cal.to_angle(value);
        }
        angles
    }
}
