//! Shared data model for the `armctl` workspace.
//!
//! Everything that crosses a crate boundary lives here: the arm geometry,
//! Cartesian targets, solver output, actuator poses, recorded motion and the
//! event envelope routed over the bus.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lowest value an actuator channel accepts.
pub const ACTUATOR_MIN: i32 = 0;
/// Highest value an actuator channel accepts.
pub const ACTUATOR_MAX: i32 = 180;
/// Number of solved joints (base, shoulder, elbow, wrist pitch, wrist roll).
pub const JOINT_COUNT: usize = 5;
/// Number of actuator channels: the solved joints plus the gripper.
pub const CHANNEL_COUNT: usize = JOINT_COUNT + 1;
/// Upper bound of the speed scale.
pub const MAX_SPEED: u8 = 100;
/// Speed used when nothing else has been chosen.
pub const DEFAULT_SPEED: u8 = 50;
/// Neutral actuator value; the home pose has every channel here.
pub const NEUTRAL: i32 = 90;

// ─────────────────────────────────────────────────────────────────────────────
// Geometry & targets
// ─────────────────────────────────────────────────────────────────────────────

/// Structural link lengths of the arm, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmGeometry {
    /// Height of the shoulder pivot above the base plane.
    pub base_to_shoulder_height: f64,
    /// Shoulder-to-elbow link.
    pub shoulder_length: f64,
    /// Elbow-to-wrist link.
    pub elbow_length: f64,
    /// Wrist pivot to the tool centre point.
    pub wrist_to_tool_length: f64,
}

impl ArmGeometry {
    /// Build a geometry, rejecting non-finite or non-positive lengths.
    pub fn new(
        base_to_shoulder_height: f64,
        shoulder_length: f64,
        elbow_length: f64,
        wrist_to_tool_length: f64,
    ) -> Result<Self, ArmError> {
        let geometry = Self {
            base_to_shoulder_height,
            shoulder_length,
            elbow_length,
            wrist_to_tool_length,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Check that every length is finite and strictly positive.
    pub fn validate(&self) -> Result<(), ArmError> {
        let lengths = [
            ("base_to_shoulder_height", self.base_to_shoulder_height),
            ("shoulder_length", self.shoulder_length),
            ("elbow_length", self.elbow_length),
            ("wrist_to_tool_length", self.wrist_to_tool_length),
        ];
        for (name, value) in lengths {
            if !value.is_finite() || value <= 0.0 {
                return Err(ArmError::InvalidGeometry(format!(
                    "{name} must be a positive length, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Longest wrist-centre distance the shoulder/elbow pair can span.
    pub fn planar_reach(&self) -> f64 {
        self.shoulder_length + self.elbow_length
    }
}

impl Default for ArmGeometry {
    fn default() -> Self {
        Self {
            base_to_shoulder_height: 100.0,
            shoulder_length: 105.0,
            elbow_length: 100.0,
            wrist_to_tool_length: 150.0,
        }
    }
}

/// Desired gripper pose in the base frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CartesianTarget {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Wrist elevation; `-90` points the tool straight down.
    pub pitch_deg: f64,
    pub roll_deg: f64,
}

impl CartesianTarget {
    pub fn new(x: f64, y: f64, z: f64, pitch_deg: f64, roll_deg: f64) -> Self {
        Self {
            x,
            y,
            z,
            pitch_deg,
            roll_deg,
        }
    }

    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.z, self.pitch_deg, self.roll_deg]
            .iter()
            .all(|v| v.is_finite())
    }
}

impl Default for CartesianTarget {
    fn default() -> Self {
        Self::new(0.0, 150.0, 150.0, -90.0, 0.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Solver output
// ─────────────────────────────────────────────────────────────────────────────

/// Joint angles produced by the geometry solver.
///
/// Angles are ordered base, shoulder, elbow, wrist pitch, wrist roll. An
/// invalid solution always carries zeroed angles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointSolution {
    angles_deg: [f64; JOINT_COUNT],
    valid: bool,
}

impl JointSolution {
    pub fn reachable(angles_deg: [f64; JOINT_COUNT]) -> Self {
        Self {
            angles_deg,
            valid: true,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            angles_deg: [0.0; JOINT_COUNT],
            valid: false,
        }
    }

    pub fn angles_deg(&self) -> [f64; JOINT_COUNT] {
        self.angles_deg
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actuator pose
// ─────────────────────────────────────────────────────────────────────────────

/// Six integer actuator values: five joints followed by the gripper.
///
/// `in_range` is derived from the values whenever a pose is built, including
/// on deserialisation, so it can never disagree with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; CHANNEL_COUNT]", into = "[i32; CHANNEL_COUNT]")]
pub struct ActuatorPose {
    values: [i32; CHANNEL_COUNT],
    in_range: bool,
}

impl ActuatorPose {
    pub fn new(values: [i32; CHANNEL_COUNT]) -> Self {
        let in_range = values
            .iter()
            .all(|v| (ACTUATOR_MIN..=ACTUATOR_MAX).contains(v));
        Self { values, in_range }
    }

    /// Every channel at [`NEUTRAL`].
    pub fn home() -> Self {
        Self::new([NEUTRAL; CHANNEL_COUNT])
    }

    pub fn values(&self) -> [i32; CHANNEL_COUNT] {
        self.values
    }

    pub fn in_range(&self) -> bool {
        self.in_range
    }

    pub fn channel(&self, index: usize) -> Option<i32> {
        self.values.get(index).copied()
    }

    pub fn gripper(&self) -> i32 {
        self.values[JOINT_COUNT]
    }

    /// Copy of this pose with one channel replaced.
    pub fn with_channel(&self, index: usize, value: i32) -> Result<Self, ArmError> {
        if index >= CHANNEL_COUNT {
            return Err(ArmError::IndexOutOfBounds {
                index,
                len: CHANNEL_COUNT,
            });
        }
        let mut values = self.values;
        values[index] = value;
        Ok(Self::new(values))
    }

    pub fn with_gripper(&self, value: i32) -> Self {
        let mut values = self.values;
        values[JOINT_COUNT] = value;
        Self::new(values)
    }

    /// `Ok(self)` when every channel is in range, the range error otherwise.
    pub fn ensure_in_range(self) -> Result<Self, ArmError> {
        if self.in_range {
            Ok(self)
        } else {
            Err(ArmError::OutOfActuatorRange {
                values: self.values,
            })
        }
    }
}

impl Default for ActuatorPose {
    fn default() -> Self {
        Self::home()
    }
}

impl From<[i32; CHANNEL_COUNT]> for ActuatorPose {
    fn from(values: [i32; CHANNEL_COUNT]) -> Self {
        Self::new(values)
    }
}

impl From<ActuatorPose> for [i32; CHANNEL_COUNT] {
    fn from(pose: ActuatorPose) -> Self {
        pose.values
    }
}

impl fmt::Display for ActuatorPose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.values;
        write!(
            f,
            "[{}, {}, {}, {}, {} | {}]",
            v[0], v[1], v[2], v[3], v[4], v[5]
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Motion
// ─────────────────────────────────────────────────────────────────────────────

fn clamped_speed<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = u8::deserialize(deserializer)?;
    Ok(raw.min(MAX_SPEED))
}

/// One recorded step: a pose and the speed to reach it with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionStep {
    pub pose: ActuatorPose,
    #[serde(deserialize_with = "clamped_speed")]
    pub speed: u8,
}

impl MotionStep {
    /// Speeds above [`MAX_SPEED`] are clamped.
    pub fn new(pose: ActuatorPose, speed: u8) -> Self {
        Self {
            pose,
            speed: speed.min(MAX_SPEED),
        }
    }
}

/// A named, ordered list of motion steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub name: String,
    pub steps: Vec<MotionStep>,
}

impl Sequence {
    /// Build a sequence that is valid for saving and playing.
    pub fn new(name: impl Into<String>, steps: Vec<MotionStep>) -> Result<Self, ArmError> {
        let sequence = Self {
            name: name.into().trim().to_string(),
            steps,
        };
        sequence.validate()?;
        Ok(sequence)
    }

    pub fn validate(&self) -> Result<(), ArmError> {
        if self.name.trim().is_empty() {
            return Err(ArmError::BlankName);
        }
        if self.steps.is_empty() {
            return Err(ArmError::EmptySequence);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Pose and speed as reported by the hardware side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoseSnapshot {
    pub pose: ActuatorPose,
    #[serde(deserialize_with = "clamped_speed")]
    pub speed: u8,
}

impl PoseSnapshot {
    pub fn new(pose: ActuatorPose, speed: u8) -> Self {
        Self {
            pose,
            speed: speed.min(MAX_SPEED),
        }
    }
}

impl Default for PoseSnapshot {
    fn default() -> Self {
        Self::new(ActuatorPose::home(), DEFAULT_SPEED)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Interaction lock
// ─────────────────────────────────────────────────────────────────────────────

/// Holder of the interaction lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockOwner {
    /// A human drag gesture is in progress.
    Operator,
    /// A sequence playback run, identified by its run id.
    Playback(u64),
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockOwner::Operator => write!(f, "operator"),
            LockOwner::Playback(run) => write!(f, "playback#{run}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event bus envelope
// ─────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "armctl-middleware::loopback"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Hardware-observed state.
    StatePush(PoseSnapshot),
    /// Serialised outbound wire frame.
    CommandFrame(String),
    Alert { component: String, message: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Workspace-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArmError {
    #[error("Target is outside the reachable workspace")]
    Unreachable,

    #[error("Actuator values out of range: {values:?}")]
    OutOfActuatorRange { values: [i32; CHANNEL_COUNT] },

    #[error("Interaction lock is held by {held_by}")]
    LockContention { held_by: LockOwner },

    #[error("{requested} does not hold the interaction lock")]
    NotLockOwner { requested: LockOwner },

    #[error("Sequence has no steps")]
    EmptySequence,

    #[error("Name must not be blank")]
    BlankName,

    #[error("Invalid arm geometry: {0}")]
    InvalidGeometry(String),

    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
