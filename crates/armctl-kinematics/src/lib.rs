//! `armctl-kinematics` – closed-form geometry for the 5-DOF arm.
//!
//! Pure functions with no state; everything here can be called from any
//! thread without coordination.
//!
//! # Modules
//!
//! - [`solver`] – [`solve`][solver::solve]: Cartesian gripper pose to joint
//!   angles, with explicit unreachability reporting.
//! - [`servo_map`] – [`ServoCalibration`][servo_map::ServoCalibration]: the
//!   per-joint affine transform from solver angles to integer actuator units.
//! - [`forward`] – [`forward`][forward::forward]: joint angles back to the
//!   gripper position, used to verify solutions and to report where an
//!   actuator pose puts the tool.
//!
//! # Frames
//!
//! | Quantity | Convention |
//! |---|---|
//! | Base angle | counter-clockwise from +X, degrees |
//! | Shoulder | elevation of the upper link above the horizontal |
//! | Elbow | relative to the upper link; negative bends the forearm down |
//! | Wrist pitch | relative to the forearm, chosen so the three sum to the tool pitch |
//! | Wrist roll | passthrough of the requested roll |

pub mod forward;
pub mod servo_map;
pub mod solver;

pub use forward::{GripperPosition, forward, forward_from_pose};
pub use servo_map::{JointCalibration, ServoCalibration};
pub use solver::{ElbowConfiguration, solve, solve_with};
