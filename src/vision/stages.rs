//! Pixel operations for each routing [`Stage`]
//!
//! Stages are validated by the compiler, so applying one cannot fail. Every
//! operation works on 8-bit grayscale and returns a new frame; crop is the
//! only stage that changes the frame size.

use super::frame::Frame;
use crate::routing::{RoutingPlan, Stage};
use image::{imageops, Luma};

/// Run every stage of `plan` in order
pub fn apply_plan(frame: Frame, plan: &RoutingPlan) -> Frame {
    plan.stages()
        .iter()
        .fold(frame, |frame, stage| apply_stage(frame, stage))
}

/// Apply a single stage
pub fn apply_stage(frame: Frame, stage: &Stage) -> Frame {
    match *stage {
        Stage::Lowpass { kernel } => box_blur(&frame, kernel),
        Stage::Gaussian { sigma } => imageops::blur(&frame, sigma),
        Stage::Threshold { level, inverse } => map_pixels(frame, |v| {
            let above = v > level;
            if above != inverse {
                255
            } else {
                0
            }
        }),
        Stage::Invert => {
            let mut frame = frame;
            imageops::invert(&mut frame);
            frame
        }
        Stage::Gain { factor, offset } => map_pixels(frame, |v| {
            let scaled = v as f32 * factor + offset as f32;
            scaled.round().clamp(0.0, 255.0) as u8
        }),
        Stage::Erode { iterations } => {
            (0..iterations).fold(frame, |f, _| neighborhood(&f, u8::min))
        }
        Stage::Dilate { iterations } => {
            (0..iterations).fold(frame, |f, _| neighborhood(&f, u8::max))
        }
        Stage::Crop {
            x,
            y,
            width,
            height,
        } => crop(&frame, x, y, width, height),
    }
}

fn map_pixels(mut frame: Frame, f: impl Fn(u8) -> u8) -> Frame {
    for pixel in frame.pixels_mut() {
        pixel.0[0] = f(pixel.0[0]);
    }
    frame
}

/// Square box blur with edge clamping
fn box_blur(frame: &Frame, kernel: u32) -> Frame {
    if kernel <= 1 {
        return frame.clone();
    }
    let (w, h) = frame.dimensions();
    let r = (kernel / 2) as i64;
    let area = (kernel * kernel) as u32;
    Frame::from_fn(w, h, |x, y| {
        let mut sum = 0u32;
        for dy in -r..=r {
            for dx in -r..=r {
                let sx = clamp_coord(x as i64 + dx, w);
                let sy = clamp_coord(y as i64 + dy, h);
                sum += frame.get_pixel(sx, sy).0[0] as u32;
            }
        }
        Luma([((sum + area / 2) / area) as u8])
    })
}

/// 3x3 neighborhood reduction (min for erode, max for dilate)
fn neighborhood(frame: &Frame, reduce: fn(u8, u8) -> u8) -> Frame {
    let (w, h) = frame.dimensions();
    Frame::from_fn(w, h, |x, y| {
        let mut acc = frame.get_pixel(x, y).0[0];
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx >= 0 && ny >= 0 && (nx as u32) < w && (ny as u32) < h {
                    acc = reduce(acc, frame.get_pixel(nx as u32, ny as u32).0[0]);
                }
            }
        }
        Luma([acc])
    })
}

/// Crop clipped to the frame; never returns an empty frame
fn crop(frame: &Frame, x: u32, y: u32, width: u32, height: u32) -> Frame {
    let (w, h) = frame.dimensions();
    if w == 0 || h == 0 {
        return frame.clone();
    }
    let x = x.min(w - 1);
    let y = y.min(h - 1);
    let width = width.min(w - x).max(1);
    let height = height.min(h - y).max(1);
    imageops::crop_imm(frame, x, y, width, height).to_image()
}

fn clamp_coord(v: i64, len: u32) -> u32 {
    v.clamp(0, len as i64 - 1) as u32
}
