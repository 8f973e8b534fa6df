//! Geometric inverse kinematics.
//!
//! The arm is treated as a base yaw joint carrying a planar three-link chain
//! (shoulder, elbow, wrist pitch) plus a decoupled wrist roll. The tool pitch
//! fixes where the wrist pivot must sit; the shoulder/elbow pair then reaches
//! that wrist centre with the law of cosines.
//!
//! ```text
//!        elbow
//!         o
//!   a2  /   \  a3
//!      /     \
//!  shoulder   o wrist ── d5 ── tool
//!     |
//!  d1 |
//!   ──┴── base
//! ```
//!
//! Failure is never signalled with NaN: any target the chain cannot reach
//! yields [`JointSolution::unreachable`].

use std::f64::consts::PI;

use armctl_types::{ArmGeometry, CartesianTarget, JointSolution};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Which of the two law-of-cosines branches to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElbowConfiguration {
    /// Elbow above the shoulder-wrist line.
    #[default]
    ElbowUp,
    /// Mirror branch with the elbow below the shoulder-wrist line.
    ElbowDown,
}

/// Solve `target` with the default [`ElbowConfiguration::ElbowUp`] branch.
pub fn solve(target: &CartesianTarget, geometry: &ArmGeometry) -> JointSolution {
    solve_with(target, geometry, ElbowConfiguration::ElbowUp)
}

/// Solve `target` for the given elbow branch.
pub fn solve_with(
    target: &CartesianTarget,
    geometry: &ArmGeometry,
    elbow: ElbowConfiguration,
) -> JointSolution {
    if !target.is_finite() {
        trace!(?target, "non-finite target");
        return JointSolution::unreachable();
    }

    let a2 = geometry.shoulder_length;
    let a3 = geometry.elbow_length;
    let pitch = target.pitch_deg.to_radians();

    let base = target.y.atan2(target.x);

    // Wrist centre in the arm plane, relative to the shoulder pivot.
    let r_wc = target.x.hypot(target.y) - geometry.wrist_to_tool_length * pitch.cos();
    let z_wc =
        target.z - geometry.wrist_to_tool_length * pitch.sin() - geometry.base_to_shoulder_height;
    let h = r_wc.hypot(z_wc);

    let reach = geometry.planar_reach();
    if h > reach {
        trace!(h, reach, "wrist centre beyond reach");
        return JointSolution::unreachable();
    }

    let cos_alpha = (a2 * a2 + h * h - a3 * a3) / (2.0 * a2 * h);
    let cos_beta = (a2 * a2 + a3 * a3 - h * h) / (2.0 * a2 * a3);
    // h == 0 makes cos_alpha infinite or NaN.
    if !within_unit(cos_alpha) || !within_unit(cos_beta) {
        trace!(h, cos_alpha, cos_beta, "law of cosines out of domain");
        return JointSolution::unreachable();
    }

    let alpha = cos_alpha.acos();
    let beta = cos_beta.acos();
    let gamma = z_wc.atan2(r_wc);

    let (shoulder, elbow_angle) = match elbow {
        ElbowConfiguration::ElbowUp => (gamma + alpha, -(PI - beta)),
        ElbowConfiguration::ElbowDown => (gamma - alpha, PI - beta),
    };
    let wrist_pitch = pitch - shoulder - elbow_angle;

    JointSolution::reachable([
        base.to_degrees(),
        shoulder.to_degrees(),
        elbow_angle.to_degrees(),
        wrist_pitch.to_degrees(),
        target.roll_deg,
    ])
}

fn within_unit(c: f64) -> bool {
    c.is_finite() && c.abs() <= 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_angles(actual: [f64; 5], expected: [f64; 5]) {
        for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
            assert!((a - e).abs() < EPS, "joint {i}: got {a}, expected {e}");
        }
    }

    #[test]
    fn default_target_is_out_of_reach() {
        // Wrist centre lands 250 mm from the shoulder against a 205 mm reach.
        let sol = solve(&CartesianTarget::default(), &ArmGeometry::default());
        assert!(!sol.is_valid());
        assert_eq!(sol.angles_deg(), [0.0; 5]);
    }

    #[test]
    fn reachable_target_pinned_angles() {
        let target = CartesianTarget::new(0.0, 150.0, 50.0, -90.0, 0.0);
        let sol = solve(&target, &ArmGeometry::default());
        assert!(sol.is_valid());
        assert_angles(
            sol.angles_deg(),
            [
                90.0,
                61.372113734180424,
                -56.8776586375804,
                -94.49445509660002,
                0.0,
            ],
        );
    }

    #[test]
    fn diagonal_target_with_roll() {
        let target = CartesianTarget::new(100.0, 100.0, 40.0, -90.0, 15.0);
        let sol = solve(&target, &ArmGeometry::default());
        assert!(sol.is_valid());
        assert_angles(
            sol.angles_deg(),
            [
                45.0,
                66.64422502333065,
                -70.31159276973979,
                -86.33263225359084,
                15.0,
            ],
        );
    }

    #[test]
    fn elbow_down_branch() {
        let target = CartesianTarget::new(0.0, 150.0, 50.0, -90.0, 0.0);
        let sol = solve_with(&target, &ArmGeometry::default(), ElbowConfiguration::ElbowDown);
        assert!(sol.is_valid());
        assert_angles(
            sol.angles_deg(),
            [
                90.0,
                6.008021317779148,
                56.8776586375804,
                -152.88567995535954,
                0.0,
            ],
        );
    }

    #[test]
    fn exact_full_extension_is_valid() {
        // r_wc = 355 - 150 = 205, z_wc = 0: h equals a2 + a3 exactly.
        let target = CartesianTarget::new(355.0, 0.0, 100.0, 0.0, 0.0);
        let sol = solve(&target, &ArmGeometry::default());
        assert!(sol.is_valid());
        for angle in sol.angles_deg() {
            assert!(angle.abs() < EPS);
        }
    }

    #[test]
    fn just_past_full_extension_is_invalid() {
        let target = CartesianTarget::new(355.001, 0.0, 100.0, 0.0, 0.0);
        assert!(!solve(&target, &ArmGeometry::default()).is_valid());
    }

    #[test]
    fn wrist_centre_on_shoulder_is_invalid() {
        // Wrist centre coincides with the shoulder pivot: h == 0.
        let target = CartesianTarget::new(150.0, 0.0, 100.0, 0.0, 0.0);
        let sol = solve(&target, &ArmGeometry::default());
        assert!(!sol.is_valid());

        let equal_links = ArmGeometry::new(100.0, 100.0, 100.0, 150.0).unwrap();
        let sol = solve(&target, &equal_links);
        assert!(!sol.is_valid());
        assert!(sol.angles_deg().iter().all(|a| a.is_finite()));
    }

    #[test]
    fn too_close_for_the_links_is_invalid() {
        // h = 2 mm; 105 and 100 mm links cannot fold that tight.
        let target = CartesianTarget::new(152.0, 0.0, 100.0, 0.0, 0.0);
        assert!(!solve(&target, &ArmGeometry::default()).is_valid());
    }

    #[test]
    fn non_finite_input_is_invalid() {
        let g = ArmGeometry::default();
        for target in [
            CartesianTarget::new(f64::NAN, 0.0, 0.0, 0.0, 0.0),
            CartesianTarget::new(0.0, f64::INFINITY, 0.0, 0.0, 0.0),
            CartesianTarget::new(100.0, 100.0, 40.0, f64::NEG_INFINITY, 0.0),
            CartesianTarget::new(100.0, 100.0, 40.0, -90.0, f64::NAN),
        ] {
            let sol = solve(&target, &g);
            assert!(!sol.is_valid());
            assert!(sol.angles_deg().iter().all(|a| a.is_finite()));
        }
    }

    #[test]
    fn never_produces_nan() {
        let g = ArmGeometry::default();
        for x in (-400..=400).step_by(50) {
            for y in (-400..=400).step_by(50) {
                for z in (-200..=400).step_by(50) {
                    for pitch in [-90.0, -45.0, 0.0, 30.0] {
                        let t = CartesianTarget::new(x as f64, y as f64, z as f64, pitch, 5.0);
                        let sol = solve(&t, &g);
                        assert!(
                            sol.angles_deg().iter().all(|a| a.is_finite()),
                            "NaN for {t:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn roll_is_passthrough() {
        let g = ArmGeometry::default();
        let a = solve(&CartesianTarget::new(100.0, 100.0, 40.0, -90.0, 0.0), &g);
        let b = solve(&CartesianTarget::new(100.0, 100.0, 40.0, -90.0, 72.5), &g);
        assert_eq!(a.angles_deg()[..4], b.angles_deg()[..4]);
        assert_eq!(b.angles_deg()[4], 72.5);
    }

    #[test]
    fn elbow_configuration_deserializes_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            elbow: ElbowConfiguration,
        }
        let w: Wrapper = toml::from_str("elbow = \"elbow_down\"").unwrap();
        assert_eq!(w.elbow, ElbowConfiguration::ElbowDown);
    }
}
