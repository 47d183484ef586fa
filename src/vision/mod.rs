//! Camera vision: frame sources, routing stages, detection and sampling.
//!
//! A [`VisionPipeline`] owns the frame source and publishes the latest
//! [`ProcessedFrame`]; a [`ScheduledSampler`] ticks it at a fixed rate.

pub mod detector;
pub mod frame;
pub mod pipeline;
pub mod sampler;
pub mod source;
pub mod stages;
pub mod synthetic_camera;

pub use detector::{detect_objects, DetectorParams};
pub use frame::{Detection, Frame, ProcessedFrame};
pub use pipeline::{Backoff, UpdateOutcome, VisionPipeline, VisionState, VisionStats};
pub use sampler::{SamplerStats, ScheduledSampler, TickOutcome};
pub use source::FrameSource;
pub use stages::{apply_plan, apply_stage};
pub use synthetic_camera::{CameraControl, SyntheticCamera};
