//! Synthetic camera for running without hardware
//!
//! Renders a dark, slightly noisy background with one bright disc moving on
//! a Lissajous path, which gives the filters and the detector something
//! realistic to work on. Faults can be injected through a
//! [`CameraControl`] handle.

use super::frame::Frame;
use super::source::FrameSource;
use crate::config::CameraSettings;
use crate::error::CaptureError;
use image::Luma;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const BACKGROUND_LEVEL: u8 = 20;
const NOISE_AMPLITUDE: u8 = 12;
const OBJECT_LEVEL: u8 = 230;

#[derive(Debug, Default)]
struct ControlState {
    fail_next: AtomicU32,
    disconnected: AtomicBool,
    capture_delay_us: AtomicU64,
    captures: AtomicU64,
}

/// Fault injection and counters for a [`SyntheticCamera`]
#[derive(Debug, Clone, Default)]
pub struct CameraControl {
    state: Arc<ControlState>,
}

impl CameraControl {
    /// Fail the next `count` captures with a timeout
    pub fn fail_next(&self, count: u32) {
        self.state.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.disconnected.store(!connected, Ordering::SeqCst);
    }

    /// Time each capture takes
    pub fn set_capture_delay(&self, delay: Duration) {
        self.state
            .capture_delay_us
            .store(delay.as_micros() as u64, Ordering::SeqCst);
    }

    /// Capture attempts so far, including failed ones
    pub fn captures(&self) -> u64 {
        self.state.captures.load(Ordering::SeqCst)
    }
}

/// Frame source that draws a moving bright object
#[derive(Debug)]
pub struct SyntheticCamera {
    settings: CameraSettings,
    frame_index: u64,
    noise_seed: u64,
    control: CameraControl,
}

impl SyntheticCamera {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            frame_index: 0,
            noise_seed: 0x9E37_79B9_7F4A_7C15,
            control: CameraControl::default(),
        }
    }

    pub fn control(&self) -> CameraControl {
        self.control.clone()
    }

    /// Object center for a frame index
    pub fn object_center(&self, frame_index: u64) -> (f64, f64) {
        let w = self.settings.width as f64;
        let h = self.settings.height as f64;
        let r = self.settings.object_radius as f64;
        let t = frame_index as f64 * 0.05;
        let cx = w / 2.0 + (w / 2.0 - r - 1.0).max(0.0) * (t * 1.3).sin();
        let cy = h / 2.0 + (h / 2.0 - r - 1.0).max(0.0) * (t * 0.7).cos();
        (cx, cy)
    }

    fn next_noise(&mut self) -> u8 {
        // xorshift keeps frames deterministic between runs
        let mut s = self.noise_seed;
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.noise_seed = s;
        (s % (NOISE_AMPLITUDE as u64 + 1)) as u8
    }

    fn render(&mut self) -> Frame {
        let (cx, cy) = self.object_center(self.frame_index);
        let radius = self.settings.object_radius as f64;
        let r2 = radius * radius;
        let mut frame = Frame::new(self.settings.width, self.settings.height);
        for y in 0..self.settings.height {
            for x in 0..self.settings.width {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                let value = if dx * dx + dy * dy <= r2 {
                    OBJECT_LEVEL
                } else {
                    BACKGROUND_LEVEL + self.next_noise()
                };
                frame.put_pixel(x, y, Luma([value]));
            }
        }
        frame
    }
}

impl FrameSource for SyntheticCamera {
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        let state = &self.control.state;
        state.captures.fetch_add(1, Ordering::SeqCst);

        let delay_us = state.capture_delay_us.load(Ordering::SeqCst);
        if delay_us > 0 {
            std::thread::sleep(Duration::from_micros(delay_us));
        }
        if state.disconnected.load(Ordering::SeqCst) {
            return Err(CaptureError::Unavailable(
                "synthetic camera disconnected".to_string(),
            ));
        }
        let pending = state.fail_next.load(Ordering::SeqCst);
        if pending > 0 {
            state.fail_next.store(pending - 1, Ordering::SeqCst);
            return Err(CaptureError::Timeout(delay_us / 1000));
        }

        let frame = self.render();
        self.frame_index += 1;
        Ok(frame)
    }

    fn name(&self) -> String {
        format!(
            "synthetic camera {}x{}",
            self.settings.width, self.settings.height
        )
    }
}
