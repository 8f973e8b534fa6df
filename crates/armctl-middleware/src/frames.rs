//! JSON line frames understood by the servo controller.
//!
//! | Frame | Shape |
//! |---|---|
//! | Set pose / state push | `{"servos":[s1,s2,s3,s4,s5,gripper],"velocidad":n}` |
//! | Execute sequence | `{"op":"execute_sequence","steps":[<pose frame>, ...]}` |
//!
//! The controller firmware predates this crate; the field names are fixed.

use armctl_types::{ActuatorPose, ArmError, CHANNEL_COUNT, MotionStep, PoseSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Wire form of a pose command or a state report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoseFrame {
    pub servos: [i32; CHANNEL_COUNT],
    #[serde(rename = "velocidad")]
    pub speed: u8,
}

impl PoseFrame {
    pub fn new(pose: &ActuatorPose, speed: u8) -> Self {
        Self {
            servos: pose.values(),
            speed,
        }
    }
}

/// Serialise a single pose command.
pub fn build_pose_frame(pose: &ActuatorPose, speed: u8) -> Result<String, ArmError> {
    serde_json::to_string(&PoseFrame::new(pose, speed))
        .map_err(|e| ArmError::Serialization(e.to_string()))
}

/// Serialise a whole sequence for controller-side execution.
pub fn build_sequence_frame(steps: &[MotionStep]) -> String {
    let steps: Vec<PoseFrame> = steps
        .iter()
        .map(|step| PoseFrame::new(&step.pose, step.speed))
        .collect();
    json!({
        "op": "execute_sequence",
        "steps": steps,
    })
    .to_string()
}

/// Parse a state report line coming back from the controller.
///
/// Reports carrying values outside the actuator range are rejected.
pub fn parse_state_frame(line: &str) -> Result<PoseSnapshot, ArmError> {
    let frame: PoseFrame = serde_json::from_str(line.trim())
        .map_err(|e| ArmError::Serialization(e.to_string()))?;
    let pose = ActuatorPose::new(frame.servos).ensure_in_range()?;
    Ok(PoseSnapshot::new(pose, frame.speed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use armctl_types::MAX_SPEED;

    #[test]
    fn pose_frame_uses_controller_field_names() {
        let frame = build_pose_frame(&ActuatorPose::new([135, 23, 20, 4, 15, 120]), 50).unwrap();
        assert_eq!(frame, r#"{"servos":[135,23,20,4,15,120],"velocidad":50}"#);
    }

    #[test]
    fn sequence_frame_lists_steps_in_order() {
        let steps = [
            MotionStep::new(ActuatorPose::home(), 50),
            MotionStep::new(ActuatorPose::new([10, 20, 30, 40, 50, 60]), 80),
        ];
        let raw = build_sequence_frame(&steps);
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["op"], "execute_sequence");
        assert_eq!(value["steps"][1]["servos"][0], 10);
        assert_eq!(value["steps"][1]["velocidad"], 80);
        assert_eq!(value["steps"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn parse_state_frame_accepts_controller_report() {
        let snap = parse_state_frame("{\"servos\":[90,80,70,60,50,120],\"velocidad\":30}\n").unwrap();
        assert_eq!(snap.pose.values(), [90, 80, 70, 60, 50, 120]);
        assert_eq!(snap.speed, 30);
    }

    #[test]
    fn parse_state_frame_clamps_speed() {
        let snap = parse_state_frame(r#"{"servos":[90,90,90,90,90,90],"velocidad":255}"#).unwrap();
        assert_eq!(snap.speed, MAX_SPEED);
    }

    #[test]
    fn parse_state_frame_rejects_bad_input() {
        assert!(matches!(
            parse_state_frame(r#"{"servos":[90,90,90],"velocidad":50}"#),
            Err(ArmError::Serialization(_))
        ));
        assert!(matches!(
            parse_state_frame(r#"{"servos":[90,90,90,90,90,200],"velocidad":50}"#),
            Err(ArmError::OutOfActuatorRange { .. })
        ));
        assert!(parse_state_frame("not json").is_err());
    }
}
