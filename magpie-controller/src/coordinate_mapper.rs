use crate::detector::Centroid;
use crate::pose::RobotPose;
use crate::rig_config::CameraCalibration;
use nalgebra as na;

/// Image quadrant of a pixel, points on a centre line count as left/top
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Quadrant {
    fn is_left(self) -> bool {
        matches!(self, Quadrant::TopLeft | Quadrant::BottomLeft)
    }

    fn is_top(self) -> bool {
        matches!(self, Quadrant::TopLeft | Quadrant::TopRight)
    }
}

/// Intermediate values of a single mapping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelOffset {
    pub quadrant: Quadrant,
    /// pixels from image centre
    pub du: f64,
    pub dv: f64,
    /// metres from base position
    pub dx: f64,
    pub dy: f64,
}

/// Empirical pixel to robot frame map for the fixed overhead camera.
///
/// This is a four quadrant piecewise linear correction fitted on the rig,
/// not a homography.
#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    calibration: CameraCalibration,
}

impl CoordinateMapper {
    pub fn new(calibration: CameraCalibration) -> CoordinateMapper {
        CoordinateMapper { calibration }
    }

    /// metres per pixel along x and y
    pub fn scale(&self) -> (f64, f64) {
        (
            self.calibration.real_width / self.calibration.image_width as f64,
            self.calibration.real_height / self.calibration.image_height as f64,
        )
    }

    pub fn center(&self) -> (u32, u32) {
        (
            self.calibration.image_width / 2,
            self.calibration.image_height / 2,
        )
    }

    pub fn quadrant(&self, px: u32, py: u32) -> Quadrant {
        let (cx, cy) = self.center();
        match (px <= cx, py <= cy) {
            (true, true) => Quadrant::TopLeft,
            (false, true) => Quadrant::TopRight,
            (true, false) => Quadrant::BottomLeft,
            (false, false) => Quadrant::BottomRight,
        }
    }

    pub fn map_pixel(&self, px: u32, py: u32) -> PixelOffset {
        let (sx, sy) = self.scale();
        let (cx, cy) = self.center();
        let du = px as f64 - cx as f64;
        let dv = py as f64 - cy as f64;
        let quadrant = self.quadrant(px, py);

        let x_bias = if quadrant.is_left() {
            self.calibration.left_bias_px
        } else {
            self.calibration.right_bias_px
        };
        let dx = (du + x_bias) * sx;
        // camera y runs against the robot y above the centre line
        let dy_magnitude = (dv + self.calibration.vertical_bias_px) * sy;
        let dy = if quadrant.is_top() {
            -dy_magnitude
        } else {
            dy_magnitude
        };

        PixelOffset {
            quadrant,
            du,
            dv,
            dx,
            dy,
        }
    }

    pub fn pixel_to_robot(&self, px: u32, py: u32) -> RobotPose {
        let offset = self.map_pixel(px, py);
        let base = self.calibration.base_position;
        let pose = RobotPose::new(
            na::Vector3::new(base.x + offset.dx, base.y + offset.dy, base.z),
            self.calibration.orientation,
        );
        tracing::info!(
            du = offset.du,
            dv = offset.dv,
            dx = offset.dx,
            dy = offset.dy,
            "Pixel to robot"
        );
        tracing::info!(
            x = pose.position.x,
            y = pose.position.y,
            z = pose.position.z,
            "Final target"
        );
        pose
    }

    pub fn centroid_to_robot(&self, centroid: Centroid) -> RobotPose {
        self.pixel_to_robot(centroid.x, centroid.y)
    }
}
