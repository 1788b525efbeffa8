use crate::detector::{ColorProfile, HsvRange};
use crate::pose::RobotPose;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error while accessing configuration")]
    IoError(#[from] std::io::Error),
    #[error("error while parsing json")]
    JsonError(#[from] serde_json::Error),
    #[error("error while parsing yaml")]
    YamlError(#[from] serde_yaml::Error),
}

type Result<T> = std::result::Result<T, ConfigError>;

/// Fixed camera to table calibration.
///
/// The quadrant biases are empirical and tuned against one physical rig.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CameraCalibration {
    pub image_width: u32,
    pub image_height: u32,
    /// metres covered by the full image width
    pub real_width: f64,
    /// metres covered by the full image height
    pub real_height: f64,
    /// Arm position the image is captured from
    pub base_position: Vector3<f64>,
    pub orientation: Vector3<f64>,
    /// pixel bias added to du left of (or on) the image centre
    pub left_bias_px: f64,
    /// pixel bias added to du right of the image centre
    pub right_bias_px: f64,
    /// pixel bias added to dv in every quadrant
    pub vertical_bias_px: f64,
}

impl Default for CameraCalibration {
    fn default() -> Self {
        CameraCalibration {
            image_width: 866,
            image_height: 650,
            real_width: 0.375,
            real_height: 0.285,
            base_position: Vector3::new(0.133, -0.486, 0.504),
            orientation: Vector3::new(0.0, -3.14, 0.0),
            left_bias_px: 70.0,
            right_bias_px: 200.0,
            vertical_bias_px: -10.0,
        }
    }
}

/// Home pose used for capturing images and resting between cycles.
///
/// Height is expressed relative to the capture height so the arm always
/// returns to the same safe plane.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HomeConfig {
    pub x: f64,
    pub y: f64,
    pub z_offset: f64,
    pub orientation: Vector3<f64>,
}

impl Default for HomeConfig {
    fn default() -> Self {
        HomeConfig {
            x: 0.13385,
            y: -0.48665,
            z_offset: 0.00015,
            orientation: Vector3::new(0.0, 3.035, -0.785),
        }
    }
}

/// Waits inserted after each command.
///
/// The motion channel never acknowledges completion, these have to cover the
/// physical move at the configured acceleration and velocity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SettleTimings {
    pub home_move: Duration,
    pub home_gripper_close: Duration,
    pub home_gripper_open: Duration,
    pub pick_start: Duration,
    pub pick_gripper_open: Duration,
    pub pick_approach: Duration,
    pub pick_descend: Duration,
    pub pick_grip: Duration,
    pub pick_retract: Duration,
    pub place_approach: Duration,
    pub place_descend: Duration,
    pub place_release: Duration,
    pub place_retract: Duration,
}

impl Default for SettleTimings {
    fn default() -> Self {
        SettleTimings {
            home_move: Duration::from_millis(2500),
            home_gripper_close: Duration::from_secs(1),
            home_gripper_open: Duration::from_secs(2),
            pick_start: Duration::from_millis(500),
            pick_gripper_open: Duration::from_secs(1),
            pick_approach: Duration::from_secs(3),
            pick_descend: Duration::from_secs(2),
            pick_grip: Duration::from_secs(1),
            pick_retract: Duration::from_secs(1),
            place_approach: Duration::from_secs(3),
            place_descend: Duration::from_secs(2),
            place_release: Duration::from_secs(1),
            place_retract: Duration::from_secs(1),
        }
    }
}

/// Acceleration and velocity pair for a single move
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct MoveSpeed {
    pub acceleration: f64,
    pub velocity: f64,
}

impl MoveSpeed {
    pub const fn new(acceleration: f64, velocity: f64) -> MoveSpeed {
        MoveSpeed {
            acceleration,
            velocity,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MotionParameters {
    pub home: MoveSpeed,
    pub pick_approach: MoveSpeed,
    pub pick_descend: MoveSpeed,
    pub pick_retract: MoveSpeed,
    pub place_approach: MoveSpeed,
    pub place_descend: MoveSpeed,
    pub place_retract: MoveSpeed,
    /// metres below the capture height of the approach point
    pub pick_approach_depth: f64,
    /// metres below the capture height of the grasp point
    pub pick_grasp_depth: f64,
    /// metres above the drop height of the place approach point
    pub place_clearance: f64,
}

impl Default for MotionParameters {
    fn default() -> Self {
        MotionParameters {
            home: MoveSpeed::new(1.0, 0.5),
            pick_approach: MoveSpeed::new(0.2, 0.5),
            pick_descend: MoveSpeed::new(0.5, 0.5),
            pick_retract: MoveSpeed::new(0.5, 0.5),
            place_approach: MoveSpeed::new(0.8, 0.5),
            place_descend: MoveSpeed::new(0.5, 0.5),
            place_retract: MoveSpeed::new(1.0, 0.8),
            pick_approach_depth: 0.20,
            pick_grasp_depth: 0.25,
            place_clearance: 0.10,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GripperConfig {
    /// 0 to 255
    pub speed: u8,
    pub open: u8,
    pub grip: u8,
    pub closed: u8,
}

impl Default for GripperConfig {
    fn default() -> Self {
        GripperConfig {
            speed: 255,
            open: 0,
            grip: 100,
            closed: 255,
        }
    }
}

/// Lateral offsets applied on successive placements
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlacementConfig {
    pub drop_position: Vector3<f64>,
    pub even_offset: f64,
    pub odd_offset: f64,
    pub cycle_length: u8,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        PlacementConfig {
            drop_position: Vector3::new(0.30, -0.30, 0.25),
            even_offset: 0.20,
            odd_offset: 0.10,
            cycle_length: 3,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RigConfig {
    pub robot_host: String,
    pub motion_port: u16,
    pub gripper_port: u16,
    pub camera_url: String,
    pub camera_timeout: Duration,
    pub calibration: CameraCalibration,
    pub home: HomeConfig,
    pub placement: PlacementConfig,
    pub colors: Vec<ColorProfile>,
    pub min_blob_area: f64,
    pub timings: SettleTimings,
    pub motion: MotionParameters,
    pub gripper: GripperConfig,
}

impl Default for RigConfig {
    fn default() -> Self {
        RigConfig {
            robot_host: String::from("192.168.1.13"),
            motion_port: 30002,
            gripper_port: 63352,
            camera_url: String::from("http://192.168.1.13:4242/current.jpg?annotations=off"),
            camera_timeout: Duration::from_secs(5),
            calibration: CameraCalibration::default(),
            home: HomeConfig::default(),
            placement: PlacementConfig::default(),
            colors: default_color_profiles(),
            min_blob_area: 500.0,
            timings: SettleTimings::default(),
            motion: MotionParameters::default(),
            gripper: GripperConfig::default(),
        }
    }
}

fn default_color_profiles() -> Vec<ColorProfile> {
    vec![
        ColorProfile::new(
            "red",
            vec![
                HsvRange::new([0, 120, 70], [10, 255, 255]),
                HsvRange::new([170, 120, 70], [180, 255, 255]),
            ],
        ),
        ColorProfile::new("green", vec![HsvRange::new([35, 45, 45], [89, 255, 255])]),
        ColorProfile::new(
            "yellow",
            vec![HsvRange::new([20, 100, 100], [30, 255, 255])],
        ),
    ]
}

impl RigConfig {
    /// Magpie comes with an included config file.
    ///
    /// This file is packaged with the binary
    /// This method retrieves this included version
    pub fn included() -> RigConfig {
        RigConfig::parse_json(include_str!("../config/rig.json"))
            .expect("included rig config is valid")
    }

    pub fn home_pose(&self) -> RobotPose {
        RobotPose::new(
            Vector3::new(
                self.home.x,
                self.home.y,
                self.calibration.base_position.z + self.home.z_offset,
            ),
            self.home.orientation,
        )
    }

    pub fn drop_pose(&self) -> RobotPose {
        RobotPose::new(
            self.placement.drop_position,
            self.calibration.orientation,
        )
    }

    pub fn color_labels(&self) -> Vec<&str> {
        self.colors.iter().map(|color| color.label.as_str()).collect()
    }

    pub fn parse_json(text: &str) -> Result<RigConfig> {
        let config: RigConfig = serde_json::from_str(text)?;
        Ok(config)
    }

    pub fn parse_yaml(text: &str) -> Result<RigConfig> {
        let config: RigConfig = serde_yaml::from_str(text)?;
        Ok(config)
    }

    pub fn serialize_to_json(&self) -> Result<String> {
        let json = serde_json::to_string_pretty(self)?;
        Ok(json)
    }

    pub fn serialize_to_yaml(&self) -> Result<String> {
        let yaml = serde_yaml::to_string(self)?;
        Ok(yaml)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.serialize_to_json()?)?;
        Ok(())
    }

    pub fn save_yaml(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.serialize_to_yaml()?)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<RigConfig> {
        let text = fs::read_to_string(path)?;
        RigConfig::parse_json(&text)
    }

    pub fn load_yaml(path: impl AsRef<Path>) -> Result<RigConfig> {
        let text = fs::read_to_string(path)?;
        RigConfig::parse_yaml(&text)
    }

    /// Picks the parser based on file extension, json is the fallback
    pub fn load(path: impl AsRef<Path>) -> Result<RigConfig> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => RigConfig::load_yaml(path),
            _ => RigConfig::load_json(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn check_included() {
        let config = RigConfig::included();
        assert_eq!(config, RigConfig::default());
    }

    #[test]
    fn serialize_to_json() {
        let config = RigConfig::default();
        let json = config.serialize_to_json().unwrap();
        let parsed_config = RigConfig::parse_json(&json).unwrap();
        assert_eq!(config, parsed_config);
    }

    #[test]
    fn serialize_to_yaml() {
        let config = RigConfig::default();
        let yaml = config.serialize_to_yaml().unwrap();
        let parsed_config = RigConfig::parse_yaml(&yaml).unwrap();
        assert_eq!(config, parsed_config);
    }

    #[test]
    fn home_height_follows_base() {
        let mut config = RigConfig::default();
        assert_relative_eq!(config.home_pose().position.z, 0.50415, epsilon = 1e-9);
        config.calibration.base_position.z = 0.6;
        assert_relative_eq!(config.home_pose().position.z, 0.60015, epsilon = 1e-9);
    }

    #[test]
    fn drop_pose_uses_pick_orientation() {
        let config = RigConfig::default();
        let drop = config.drop_pose();
        assert_relative_eq!(drop.orientation, config.calibration.orientation);
        assert_relative_eq!(drop.position, Vector3::new(0.30, -0.30, 0.25));
    }

    #[test]
    fn labels_keep_profile_order() {
        let config = RigConfig::default();
        assert_eq!(config.color_labels(), vec!["red", "green", "yellow"]);
    }

    #[test]
    fn load_picks_parser_by_extension() {
        let dir = std::env::temp_dir();
        let yaml_path = dir.join("magpie_rig_config_test.yaml");
        let json_path = dir.join("magpie_rig_config_test.json");
        let mut config = RigConfig::default();
        config.robot_host = String::from("10.0.0.7");
        config.save_yaml(&yaml_path).unwrap();
        config.save_json(&json_path).unwrap();
        assert_eq!(RigConfig::load(&yaml_path).unwrap(), config);
        assert_eq!(RigConfig::load(&json_path).unwrap(), config);
        let _ = fs::remove_file(yaml_path);
        let _ = fs::remove_file(json_path);
    }
}
