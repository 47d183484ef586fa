//! FrameSource trait for camera capture
//!
//! Camera drivers are opaque capability providers. The pipeline calls
//! [`FrameSource::capture`] at most once at a time, from whichever context
//! runs [`crate::vision::VisionPipeline::update`].

use super::frame::Frame;
use crate::error::CaptureError;

/// Unified interface for frame sources
pub trait FrameSource: Send {
    /// Grab the next frame
    fn capture(&mut self) -> Result<Frame, CaptureError>;

    /// Human-readable source name for logs
    fn name(&self) -> String;
}
