use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tool pose in the robot base frame.
///
/// Position is in metres, orientation is the (rx, ry, rz) triple the arm
/// controller expects, in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotPose {
    pub position: na::Vector3<f64>,
    pub orientation: na::Vector3<f64>,
}

impl RobotPose {
    pub fn new(position: na::Vector3<f64>, orientation: na::Vector3<f64>) -> RobotPose {
        RobotPose {
            position,
            orientation,
        }
    }

    /// Same pose moved by `offset`, orientation untouched
    pub fn translated(&self, offset: na::Vector3<f64>) -> RobotPose {
        RobotPose::new(self.position + offset, self.orientation)
    }

    /// Same pose at a different height
    pub fn with_z(&self, z: f64) -> RobotPose {
        let mut position = self.position;
        position.z = z;
        RobotPose::new(position, self.orientation)
    }
}

impl fmt::Display for RobotPose {
    /// Formats as a URScript pose literal
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "p[{:.5}, {:.5}, {:.5}, {:.5}, {:.5}, {:.5}]",
            self.position.x,
            self.position.y,
            self.position.z,
            self.orientation.x,
            self.orientation.y,
            self.orientation.z
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn translated_keeps_orientation() {
        let pose = RobotPose::new(
            na::Vector3::new(0.3, -0.3, 0.25),
            na::Vector3::new(0.0, -3.14, 0.0),
        );
        let moved = pose.translated(na::Vector3::new(0.1, 0.0, 0.1));
        assert_relative_eq!(moved.position, na::Vector3::new(0.4, -0.3, 0.35));
        assert_relative_eq!(moved.orientation, pose.orientation);
    }

    #[test]
    fn with_z_only_changes_height() {
        let pose = RobotPose::new(na::Vector3::new(0.1, 0.2, 0.5), na::Vector3::zeros());
        let lowered = pose.with_z(0.3);
        assert_relative_eq!(lowered.position, na::Vector3::new(0.1, 0.2, 0.3));
    }

    #[test]
    fn displays_as_urscript_pose() {
        let pose = RobotPose::new(
            na::Vector3::new(0.13385, -0.48665, 0.50415),
            na::Vector3::new(0.0, 3.035, -0.785),
        );
        assert_eq!(
            pose.to_string(),
            "p[0.13385, -0.48665, 0.50415, 0.00000, 3.03500, -0.78500]"
        );
    }
}
