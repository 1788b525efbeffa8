use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::map::map_colors;
use imageproc::point::Point;
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DetectorError {
    #[error("frame has no pixels")]
    EmptyFrame,
}

type Result<T> = std::result::Result<T, DetectorError>;

/// Inclusive HSV bounds.
///
/// Hue is 0 to 180 (degrees halved), saturation and value are 0 to 255.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> HsvRange {
        HsvRange { lower, upper }
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        hsv.iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .all(|(value, (lower, upper))| lower <= value && value <= upper)
    }
}

/// Named colour class.
///
/// Hues that wrap around 0 need two ranges, everything else uses one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ColorProfile {
    pub label: String,
    pub ranges: Vec<HsvRange>,
}

impl ColorProfile {
    pub fn new(label: &str, ranges: Vec<HsvRange>) -> ColorProfile {
        ColorProfile {
            label: label.to_owned(),
            ranges,
        }
    }

    pub fn matches(&self, hsv: [u8; 3]) -> bool {
        self.ranges.iter().any(|range| range.contains(hsv))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Centroid {
    pub x: u32,
    pub y: u32,
}

impl Centroid {
    pub fn new(x: u32, y: u32) -> Centroid {
        Centroid { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Single colour blob that survived filtering
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub centroid: Centroid,
    /// area enclosed by the outer contour in px²
    pub area: f64,
    pub bounding_box: BoundingBox,
}

/// Result of one detection pass.
///
/// Holds one entry per profile in profile order, blobs within an entry are in
/// discovery order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Detection {
    entries: Vec<(String, Vec<Blob>)>,
}

impl Detection {
    pub fn new(entries: Vec<(String, Vec<Blob>)>) -> Detection {
        Detection { entries }
    }

    /// Detection containing only centroids, mostly useful for feeding the
    /// dispatcher without a frame
    pub fn from_centroids(entries: Vec<(&str, Vec<Centroid>)>) -> Detection {
        let entries = entries
            .into_iter()
            .map(|(label, centroids)| {
                let blobs = centroids
                    .into_iter()
                    .map(|centroid| Blob {
                        centroid,
                        area: 0.0,
                        bounding_box: BoundingBox {
                            x: centroid.x,
                            y: centroid.y,
                            width: 1,
                            height: 1,
                        },
                    })
                    .collect();
                (label.to_owned(), blobs)
            })
            .collect();
        Detection { entries }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    pub fn blobs(&self, label: &str) -> &[Blob] {
        self.entries
            .iter()
            .find(|(entry_label, _)| entry_label == label)
            .map(|(_, blobs)| blobs.as_slice())
            .unwrap_or(&[])
    }

    pub fn centroids(&self, label: &str) -> Vec<Centroid> {
        self.blobs(label).iter().map(|blob| blob.centroid).collect()
    }

    /// The blob acted on for a colour command
    pub fn first(&self, label: &str) -> Option<Centroid> {
        self.blobs(label).first().map(|blob| blob.centroid)
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.entries.iter().any(|(entry_label, _)| entry_label == label)
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, blobs)| blobs.len()).sum()
    }
}

pub struct ColorDetector {
    profiles: Vec<ColorProfile>,
    min_area: f64,
}

impl ColorDetector {
    pub fn new(profiles: Vec<ColorProfile>, min_area: f64) -> ColorDetector {
        ColorDetector { profiles, min_area }
    }

    pub fn from_config(config: &crate::rig_config::RigConfig) -> ColorDetector {
        ColorDetector::new(config.colors.clone(), config.min_blob_area)
    }

    pub fn profiles(&self) -> &[ColorProfile] {
        &self.profiles
    }

    /// Profile labels in detection order
    pub fn labels(&self) -> Vec<&str> {
        self.profiles
            .iter()
            .map(|profile| profile.label.as_str())
            .collect()
    }

    pub fn detect(&self, frame: &RgbImage) -> Result<Detection> {
        detect(frame, &self.profiles, self.min_area)
    }
}

/// Segments `frame` into blobs for every profile.
///
/// Fully recomputed on every call, nothing is carried between frames.
pub fn detect(frame: &RgbImage, profiles: &[ColorProfile], min_area: f64) -> Result<Detection> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(DetectorError::EmptyFrame);
    }
    let hsv: RgbImage = map_colors(frame, |pixel| Rgb(rgb_to_hsv(pixel.0)));

    let entries = profiles
        .iter()
        .map(|profile| {
            let mask = in_ranges(&hsv, profile);
            let blobs = find_blobs(&mask, min_area);
            tracing::debug!(color = %profile.label, count = blobs.len(), "Color segmented");
            (profile.label.clone(), blobs)
        })
        .collect();
    Ok(Detection::new(entries))
}

/// RGB to HSV using the 8 bit OpenCV convention
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(f32::from);
    let value = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = value - min;
    let saturation = if value == 0.0 {
        0.0
    } else {
        255.0 * delta / value
    };
    let mut hue = if delta == 0.0 {
        0.0
    } else if value == r {
        60.0 * (g - b) / delta
    } else if value == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }
    [
        (hue / 2.0).round().min(180.0) as u8,
        saturation.round() as u8,
        value as u8,
    ]
}

/// Binary mask, 255 where any of the profile's ranges matches
fn in_ranges(hsv: &RgbImage, profile: &ColorProfile) -> GrayImage {
    map_colors(hsv, |pixel| {
        if profile.matches(pixel.0) {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

fn find_blobs(mask: &GrayImage, min_area: f64) -> Vec<Blob> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(is_external)
        .filter_map(|contour| blob_from_contour(&contour.points, min_area))
        .collect()
}

/// Outer borders with no enclosing hole, anything nested inside a hole
/// belongs to the surrounding blob
fn is_external(contour: &Contour<i32>) -> bool {
    matches!(contour.border_type, BorderType::Outer) && contour.parent.is_none()
}

fn blob_from_contour(points: &[Point<i32>], min_area: f64) -> Option<Blob> {
    let moments = Moments::of_contour(points);
    if moments.area() < min_area {
        return None;
    }
    Some(Blob {
        centroid: moments.centroid()?,
        area: moments.area(),
        bounding_box: bounding_box(points)?,
    })
}

fn bounding_box(points: &[Point<i32>]) -> Option<BoundingBox> {
    let min_x = points.iter().map(|point| point.x).min()?;
    let max_x = points.iter().map(|point| point.x).max()?;
    let min_y = points.iter().map(|point| point.y).min()?;
    let max_y = points.iter().map(|point| point.y).max()?;
    Some(BoundingBox {
        x: min_x as u32,
        y: min_y as u32,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    })
}

/// Zeroth and first order moments of a closed contour
struct Moments {
    m00: f64,
    m10: f64,
    m01: f64,
}

impl Moments {
    fn of_contour(points: &[Point<i32>]) -> Moments {
        let mut moments = Moments {
            m00: 0.0,
            m10: 0.0,
            m01: 0.0,
        };
        if points.len() < 3 {
            return moments;
        }
        for (index, current) in points.iter().enumerate() {
            let next = points[(index + 1) % points.len()];
            let (xi, yi) = (current.x as f64, current.y as f64);
            let (xj, yj) = (next.x as f64, next.y as f64);
            let cross = xi * yj - xj * yi;
            moments.m00 += cross;
            moments.m10 += (xi + xj) * cross;
            moments.m01 += (yi + yj) * cross;
        }
        moments.m00 /= 2.0;
        moments.m10 /= 6.0;
        moments.m01 /= 6.0;
        moments
    }

    fn area(&self) -> f64 {
        self.m00.abs()
    }

    fn centroid(&self) -> Option<Centroid> {
        if self.m00 == 0.0 {
            return None;
        }
        Some(Centroid::new(
            (self.m10 / self.m00) as u32,
            (self.m01 / self.m00) as u32,
        ))
    }
}

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const MARKER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const MARKER_RADIUS: i32 = 4;
const LABEL_HEIGHT: f32 = 16.0;
/// clearance between the label's baseline and the top of its box
const LABEL_GAP: i32 = 10;
static LABEL_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Copy of `frame` with a box and label around every blob and a marker at
/// the centre of its box.
///
/// Purely for the operator, nothing reads this back.
pub fn annotate(frame: &RgbImage, detection: &Detection) -> RgbImage {
    let mut annotated = frame.clone();
    let font = Font::try_from_bytes(LABEL_FONT);
    if font.is_none() {
        tracing::warn!("Label font unreadable, annotating without labels");
    }
    for label in detection.labels() {
        for blob in detection.blobs(label) {
            let bbox = &blob.bounding_box;
            let (x, y) = (bbox.x as i32, bbox.y as i32);
            // two pixel outline
            draw_hollow_rect_mut(
                &mut annotated,
                Rect::at(x, y).of_size(bbox.width + 1, bbox.height + 1),
                BOX_COLOR,
            );
            if bbox.width > 1 && bbox.height > 1 {
                draw_hollow_rect_mut(
                    &mut annotated,
                    Rect::at(x + 1, y + 1).of_size(bbox.width - 1, bbox.height - 1),
                    BOX_COLOR,
                );
            }
            draw_filled_circle_mut(
                &mut annotated,
                (x + bbox.width as i32 / 2, y + bbox.height as i32 / 2),
                MARKER_RADIUS,
                MARKER_COLOR,
            );
            if let Some(font) = &font {
                draw_text_mut(
                    &mut annotated,
                    BOX_COLOR,
                    x,
                    y - LABEL_GAP - LABEL_HEIGHT as i32,
                    Scale::uniform(LABEL_HEIGHT),
                    font,
                    label,
                );
            }
        }
    }
    annotated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig_config::RigConfig;

    const RED: Rgb<u8> = Rgb([220, 20, 20]);
    const GREEN: Rgb<u8> = Rgb([20, 200, 40]);
    const YELLOW: Rgb<u8> = Rgb([230, 210, 20]);

    fn frame_with(squares: &[(u32, u32, u32, Rgb<u8>)]) -> RgbImage {
        let mut frame = RgbImage::new(200, 150);
        for &(left, top, size, color) in squares {
            for y in top..top + size {
                for x in left..left + size {
                    frame.put_pixel(x, y, color);
                }
            }
        }
        frame
    }

    fn detector() -> ColorDetector {
        ColorDetector::from_config(&RigConfig::default())
    }

    #[test]
    fn hsv_matches_opencv_primaries() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv([255, 255, 0]), [30, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0, 0, 0]);
        assert_eq!(rgb_to_hsv([128, 128, 128]), [0, 0, 128]);
    }

    #[test]
    fn hsv_wraps_magenta_reds_high() {
        let [hue, _, _] = rgb_to_hsv([255, 0, 20]);
        assert!(hue >= 170, "hue was {}", hue);
    }

    #[test]
    fn red_profile_covers_both_hue_ends() {
        let config = RigConfig::default();
        let red = &config.colors[0];
        assert!(red.matches([5, 200, 200]));
        assert!(red.matches([175, 200, 200]));
        assert!(!red.matches([90, 200, 200]));
    }

    #[test]
    fn single_red_square_yields_one_centroid() {
        let frame = frame_with(&[(40, 60, 30, RED)]);
        let detection = detector().detect(&frame).unwrap();
        let red = detection.centroids("red");
        assert_eq!(red.len(), 1);
        // true centre is 54.5, 74.5
        assert!((red[0].x as f64 - 54.5).abs() <= 1.0);
        assert!((red[0].y as f64 - 74.5).abs() <= 1.0);
        assert!(detection.centroids("green").is_empty());
        assert!(detection.centroids("yellow").is_empty());
    }

    #[test]
    fn contour_area_excludes_outer_half_pixels() {
        let frame = frame_with(&[(10, 10, 30, RED)]);
        let detection = detector().detect(&frame).unwrap();
        let blob = &detection.blobs("red")[0];
        assert_eq!(blob.area, 29.0 * 29.0);
        assert_eq!(
            blob.bounding_box,
            BoundingBox {
                x: 10,
                y: 10,
                width: 30,
                height: 30
            }
        );
    }

    #[test]
    fn small_speck_is_ignored() {
        let frame = frame_with(&[(100, 100, 5, GREEN)]);
        let detection = detector().detect(&frame).unwrap();
        assert!(detection.centroids("green").is_empty());
        assert_eq!(detection.total(), 0);
    }

    #[test]
    fn every_profile_has_an_entry() {
        let frame = frame_with(&[]);
        let detection = detector().detect(&frame).unwrap();
        let labels: Vec<&str> = detection.labels().collect();
        assert_eq!(labels, vec!["red", "green", "yellow"]);
        assert!(detection.contains_label("yellow"));
        assert!(!detection.contains_label("blue"));
    }

    #[test]
    fn blobs_follow_discovery_order() {
        let frame = frame_with(&[(120, 10, 30, GREEN), (10, 90, 30, GREEN), (10, 10, 30, YELLOW)]);
        let detection = detector().detect(&frame).unwrap();
        let green = detection.centroids("green");
        assert_eq!(green.len(), 2);
        // raster order of the first pixel, the upper blob comes first
        assert!(green[0].y < green[1].y);
        assert_eq!(detection.first("green"), Some(green[0]));
        assert_eq!(detection.centroids("yellow").len(), 1);
    }

    #[test]
    fn hollow_square_is_one_external_blob() {
        let mut frame = frame_with(&[(20, 20, 40, RED)]);
        for y in 30..50 {
            for x in 30..50 {
                frame.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        // a blob sitting inside the hole is swallowed by the outer contour
        for y in 38..42 {
            for x in 38..42 {
                frame.put_pixel(x, y, RED);
            }
        }
        let detection = detector().detect(&frame).unwrap();
        assert_eq!(detection.centroids("red").len(), 1);
        assert_eq!(detection.blobs("red")[0].area, 39.0 * 39.0);
    }

    #[test]
    fn blob_touching_border_is_detected() {
        let frame = frame_with(&[(0, 0, 30, YELLOW)]);
        let detection = detector().detect(&frame).unwrap();
        assert_eq!(detection.centroids("yellow"), vec![Centroid::new(14, 14)]);
    }

    #[test]
    fn diagonal_line_has_no_area() {
        let mut frame = RgbImage::new(100, 100);
        for i in 0..100 {
            frame.put_pixel(i, i, RED);
        }
        let detection = detect(&frame, &RigConfig::default().colors, 0.0).unwrap();
        assert!(detection.centroids("red").is_empty());
    }

    #[test]
    fn empty_frame_is_rejected() {
        let frame = RgbImage::new(0, 0);
        assert_eq!(
            detector().detect(&frame).unwrap_err(),
            DetectorError::EmptyFrame
        );
    }

    #[test]
    fn annotation_leaves_source_untouched() {
        let frame = frame_with(&[(40, 40, 30, RED)]);
        let detection = detector().detect(&frame).unwrap();
        let annotated = annotate(&frame, &detection);
        assert_eq!(annotated.dimensions(), frame.dimensions());
        assert_eq!(*annotated.get_pixel(40, 40), BOX_COLOR);
        assert_eq!(*annotated.get_pixel(41, 41), BOX_COLOR);
        assert_eq!(*annotated.get_pixel(70, 70), BOX_COLOR);
        assert_eq!(*annotated.get_pixel(55, 55), MARKER_COLOR);
        assert_eq!(*frame.get_pixel(40, 40), RED);

        // label text sits above the box, where the source frame is black
        let mut label_pixels = 0;
        for y in 10..38 {
            for x in 40..90 {
                if *annotated.get_pixel(x, y) != Rgb([0, 0, 0]) {
                    label_pixels += 1;
                }
            }
        }
        assert!(label_pixels > 20, "only {} label pixels", label_pixels);
        assert!((10..38).all(|y| (40..90).all(|x| *frame.get_pixel(x, y) == Rgb([0, 0, 0]))));
    }

    #[test]
    fn labels_follow_profile_order() {
        assert_eq!(detector().labels(), vec!["red", "green", "yellow"]);
    }

    #[test]
    fn moments_of_unit_square() {
        let moments = Moments::of_contour(&[
            Point::new(0, 0),
            Point::new(2, 0),
            Point::new(2, 2),
            Point::new(0, 2),
        ]);
        assert_eq!(moments.area(), 4.0);
        assert_eq!(moments.centroid(), Some(Centroid::new(1, 1)));
    }
}
