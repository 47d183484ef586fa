//! Integration tests for routing compilation and plan swapping
//!
//! These tests validate the all-or-nothing compile contract end to end:
//! a failed compile surfaces its line and leaves the active plan in place.

mod common;

use common::builders::synthetic_pipeline;
use magctl_rs::config::VisionSettings;
use magctl_rs::routing::{RoutingCompiler, Stage, MAX_STAGES};
use magctl_rs::vision::UpdateOutcome;

const MARKER_ROUTING: &str = "\
# smooth, then isolate the bright marker
lowpass 3

threshold 180
DILATE 2
crop 4 4 16 12
";

#[test]
fn test_unknown_stage_reports_line_and_keeps_plan() {
    let (pipeline, _) = synthetic_pipeline(VisionSettings::default());
    let active = RoutingCompiler::compile(["invert"]).unwrap();
    pipeline.swap_plan(active.clone());

    let err = RoutingCompiler::compile(["lowpass 3", "unknownStage"]).unwrap_err();
    assert_eq!(err.line, 2);
    assert!(err.message.contains("unknown stage"), "{}", err);

    // Nothing was swapped
    assert_eq!(*pipeline.plan(), active);
    assert_eq!(pipeline.state().plan_generation, 1);
}

#[test]
fn test_routing_text_compiles_to_ordered_stages() {
    let plan = RoutingCompiler::compile_text(MARKER_ROUTING).unwrap();
    assert_eq!(
        plan.stages(),
        &[
            Stage::Lowpass { kernel: 3 },
            Stage::Threshold {
                level: 180,
                inverse: false
            },
            Stage::Dilate { iterations: 2 },
            Stage::Crop {
                x: 4,
                y: 4,
                width: 16,
                height: 12
            },
        ]
    );
}

#[test]
fn test_compile_is_idempotent_through_display() {
    let plan = RoutingCompiler::compile_text(MARKER_ROUTING).unwrap();
    let again = RoutingCompiler::compile_text(MARKER_ROUTING).unwrap();
    assert_eq!(plan, again);

    let rendered = plan.to_string();
    assert_eq!(RoutingCompiler::compile(rendered.lines()).unwrap(), plan);
}

#[test]
fn test_detect_is_not_a_stage() {
    let err = RoutingCompiler::compile(["lowpass 3", "# comment", "detect"]).unwrap_err();
    assert_eq!(err.line, 3);
}

#[test]
fn test_stage_limit() {
    let lines = vec!["invert"; MAX_STAGES + 1];
    let err = RoutingCompiler::compile(&lines).unwrap_err();
    assert_eq!(err.line, MAX_STAGES + 1);

    assert!(RoutingCompiler::compile(&lines[..MAX_STAGES]).is_ok());
}

#[test]
fn test_swapped_plan_applies_on_next_update() {
    let (pipeline, _) = synthetic_pipeline(VisionSettings::default());

    let before = match pipeline.update().unwrap() {
        UpdateOutcome::Processed(frame) => frame,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(before.image.dimensions(), (32, 24));

    pipeline.swap_plan(RoutingCompiler::compile_text(MARKER_ROUTING).unwrap());
    let after = match pipeline.update().unwrap() {
        UpdateOutcome::Processed(frame) => frame,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(after.image.dimensions(), (16, 12));
    assert_eq!(after.plan_generation, 1);
    assert!(after.image.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
}
