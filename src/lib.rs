//! # magctl-rs: magnetic field actuator and vision control panel
//!
//! Core of a control panel that drives a three-axis coil system while a
//! camera watches the result. The hard part is the concurrency: a
//! foreground context takes user input and samples the camera at a fixed
//! rate, while a background worker applies the field target at its own,
//! reconfigurable rate. The hardware is returned to zero on every way a
//! worker session can end.
//!
//! ## Architecture
//!
//! - **Backend**: [`backend::FieldActuator`] serializes full-vector writes to
//!   the coil device; [`backend::WorkerController`] runs one worker thread per
//!   session with a cancel channel and a zeroing drop guard
//! - **Vision**: [`vision::VisionPipeline`] captures, filters and annotates
//!   frames; [`vision::ScheduledSampler`] ticks it with skip-on-overlap
//! - **Routing**: [`routing::RoutingCompiler`] turns routing text into an
//!   immutable [`routing::RoutingPlan`] that is swapped in whole
//! - **Panel**: [`app::ControlPanel`] owns every component and the ordered
//!   shutdown; [`console::Console`] parses text commands into panel inputs
//!
//! Shared values ([`types::FieldVector`], [`vision::VisionState`]) are
//! published through [`types::Published`], so readers always see a complete
//! value.
//!
//! ## Configuration
//!
//! Settings are read from `magctl.toml` in the platform config directory
//! (see [`config::default_path`]); every section is optional.
//!
//! ## Example
//!
//! ```ignore
//! use magctl_rs::{app::{ControlPanel, PanelInput}, config::AppConfig, types::Axis};
//!
//! let mut panel = ControlPanel::with_simulated_hardware(AppConfig::default());
//! panel.handle(PanelInput::SetFieldAxis(Axis::X, 0.5))?;
//! panel.handle(PanelInput::SetWorkerEnabled(true))?;
//! // ... drive panel.tick_sampler() from a ticker ...
//! panel.shutdown()?;
//! ```

pub mod app;
pub mod backend;
pub mod config;
pub mod console;
pub mod error;
pub mod logging;
pub mod routing;
pub mod types;
pub mod vision;

pub use app::{ControlPanel, PanelInput, PanelStatus};
pub use error::{MagCtlError, Result};
