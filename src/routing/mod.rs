//! Routing text compilation.
//!
//! The user edits a small text program naming the filter stages a camera
//! frame goes through, one per line. [`RoutingCompiler`] turns that text
//! into a [`RoutingPlan`] of tagged [`Stage`]s; all validation happens
//! here so applying a plan cannot fail.
//!
//! ```text
//! # smooth, then isolate the bright marker
//! lowpass 3
//! threshold 180
//! dilate 2
//! ```

pub mod compiled_plan;
pub mod compiler;
pub mod error;

pub use compiled_plan::{RoutingPlan, Stage};
pub use compiler::{RoutingCompiler, COMMENT_MARKER, MAX_STAGES};
pub use error::{CompileError, CompileResult};
