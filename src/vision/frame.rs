use chrono::{DateTime, Utc};
use image::GrayImage;

/// Raw 8-bit grayscale camera frame
pub type Frame = GrayImage;

/// One object found by the detection stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Bounding box origin (pixels)
    pub x: u32,
    pub y: u32,
    /// Bounding box size (pixels)
    pub width: u32,
    pub height: u32,
    /// Number of foreground pixels in the component
    pub area: u32,
    /// Center of mass
    pub centroid: (f64, f64),
}

/// Result of one successful vision update
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// Monotonic update counter, starting at 1
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    pub image: Frame,
    pub detections: Vec<Detection>,
    /// False when the routing plan was bypassed
    pub filtered: bool,
    /// Generation of the plan the frame went through
    pub plan_generation: u64,
}
