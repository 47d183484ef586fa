//! Object detection by connected-component region growing
//!
//! Foreground is every pixel at or above the threshold. Each unvisited
//! foreground pixel seeds a breadth-first grow over its 8 neighbors; the
//! grown region becomes a [`Detection`] if it is large enough. Detection is
//! stateless and never modifies the frame.

use super::frame::{Detection, Frame};
use crate::config::VisionSettings;
use std::collections::VecDeque;

/// Parameters for [`detect_objects`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorParams {
    pub threshold: u8,
    pub min_area: u32,
    pub max_detections: usize,
}

impl From<&VisionSettings> for DetectorParams {
    fn from(settings: &VisionSettings) -> Self {
        Self {
            threshold: settings.detection_threshold,
            min_area: settings.min_blob_area,
            max_detections: settings.max_detections,
        }
    }
}

/// Find bright objects, largest first
pub fn detect_objects(frame: &Frame, params: &DetectorParams) -> Vec<Detection> {
    let (w, h) = frame.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    let mut visited = vec![false; wu * hu];
    let mut detections = Vec::new();
    let is_foreground = |x: u32, y: u32| frame.get_pixel(x, y).0[0] >= params.threshold;

    for y in 0..h {
        for x in 0..w {
            let idx = y as usize * wu + x as usize;
            if visited[idx] || !is_foreground(x, y) {
                continue;
            }
            visited[idx] = true;
            let detection = grow_region(x, y, w, h, &mut visited, &is_foreground);
            if detection.area >= params.min_area {
                detections.push(detection);
            }
        }
    }

    detections.sort_by(|a, b| b.area.cmp(&a.area));
    detections.truncate(params.max_detections);
    detections
}

fn grow_region(
    seed_x: u32,
    seed_y: u32,
    w: u32,
    h: u32,
    visited: &mut [bool],
    is_foreground: &impl Fn(u32, u32) -> bool,
) -> Detection {
    let mut queue = VecDeque::from([(seed_x, seed_y)]);
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (seed_x, seed_y, seed_x, seed_y);
    let (mut sum_x, mut sum_y) = (0f64, 0f64);
    let mut area = 0u32;

    while let Some((x, y)) = queue.pop_front() {
        area += 1;
        sum_x += x as f64;
        sum_y += y as f64;
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);

        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let (nx, ny) = (nx as u32, ny as u32);
                let idx = ny as usize * w as usize + nx as usize;
                if !visited[idx] && is_foreground(nx, ny) {
                    visited[idx] = true;
                    queue.push_back((nx, ny));
                }
            }
        }
    }

    Detection {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
        area,
        centroid: (sum_x / area as f64, sum_y / area as f64),
    }
}
