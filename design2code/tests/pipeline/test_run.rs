//! Full pipeline runs against scripted collaborators

use super::common::*;
use design2code::messages;
use design2code::workflow::{Stage, WorkflowState};
use design2code_sdk::{PipelineEvent, TaskStatus};
use std::path::Path;

fn history(harness: &Harness, task_id: i64) -> Vec<String> {
    harness.service.registry().stage_history(task_id)
}

#[tokio::test]
async fn test_successful_run_packages_the_workspace() {
    let harness = HarnessBuilder::new().build();
    let created = harness.service.create(DESIGN_URL, "token", "alice");
    assert_eq!(created.status, TaskStatus::Creating);
    assert_eq!(created.message, messages::CREATE_OK);
    let task_id = created.task_id.unwrap();

    harness.service.wait(task_id).await;

    let report = harness.service.query(&task_id.to_string());
    assert_eq!(report.status, TaskStatus::Succeeded, "{:?}", report);
    assert_eq!(report.message, messages::QUERY_OK);
    assert_eq!(report.page_title.as_deref(), Some("Home"));
    assert_eq!(report.stage_message, "Packaging output");
    assert!(report.output.unwrap().contains("@Preview"));

    let archive = harness.output_dir.join(format!("Home_{}.zip", task_id));
    assert_eq!(report.output_locator, Some(archive.display().to_string()));

    let listing = read_listing(&archive);
    let has = |path: &str| listing.iter().any(|entry| entry == path);
    assert!(has("app/src/main/java/com/example/myapplication/Greeting.kt"), "{:?}", listing);
    assert!(has("app/src/main/res/drawable-xxhdpi/ic_star.png"));
    assert!(!has("app/src/main/res/drawable-xxhdpi/img_abc.png"));
    assert!(has(&format!(
        "app/src/test/snapshots/images/figma_screenshot_{}.png",
        task_id
    )));
    assert!(!has(&format!(
        "app/src/main/res/drawable-xxhdpi/figma_screenshot_{}.png",
        task_id
    )));
    assert!(has(&format!("{}.log", task_id)));

    // The workspace is released once packaged
    assert!(!harness.output_dir.join(task_id.to_string()).exists());

    assert_eq!(
        history(&harness, task_id),
        vec![
            "export_document",
            "init_workspace",
            "export_assets",
            "capture_screenshot",
            "recognize_components",
            "lookup_knowledge",
            "coder",
            "replace_tester",
            "compile",
            "preview",
            "cleanup",
            "evaluate",
            "finalize",
        ]
    );
    // One classification per fragment: icon, photo, body, skeleton
    assert_eq!(harness.generator.count("classify"), 4);
    assert_eq!(harness.generator.count("recognize_components"), 1);
}

#[tokio::test]
async fn test_compile_failure_goes_through_bugfix() {
    let mut builder = HarnessBuilder::new();
    builder.toolchain = FakeToolchain::failing_compiles(2);
    let harness = builder.build();

    let task_id = harness.service.create(DESIGN_URL, "token", "bob").task_id.unwrap();
    harness.service.wait(task_id).await;

    assert_eq!(
        harness.service.registry().get(task_id).unwrap().status,
        TaskStatus::Succeeded
    );
    let stages = history(&harness, task_id);
    let tail: Vec<&str> = stages[8..].iter().map(String::as_str).collect();
    assert_eq!(
        tail,
        vec![
            "compile", "bugfix", "compile", "bugfix", "compile", "preview", "cleanup", "evaluate",
            "finalize"
        ]
    );
    assert_eq!(harness.generator.count("bugfix"), 2);
}

#[tokio::test]
async fn test_failed_download_is_skipped() {
    let mut builder = HarnessBuilder::new();
    builder.design.failing.insert("1:1".to_string());
    let harness = builder.build();

    let task_id = harness.service.create(DESIGN_URL, "token", "carol").task_id.unwrap();
    harness.service.wait(task_id).await;

    let report = harness.service.query(&task_id.to_string());
    assert_eq!(report.status, TaskStatus::Succeeded);
    let listing = read_listing(Path::new(report.output_locator.as_deref().unwrap()));
    assert!(!listing.iter().any(|entry| entry.ends_with("ic_star.png")));
}

#[tokio::test]
async fn test_exhausted_coder_fails_the_task() {
    let mut builder = HarnessBuilder::new();
    builder.generator = FakeGenerator::with_coder_reply("fun Tiny() {}");
    let harness = builder.build();

    let task_id = harness.service.create(DESIGN_URL, "token", "dave").task_id.unwrap();
    harness.service.wait(task_id).await;

    let report = harness.service.query(&task_id.to_string());
    assert_eq!(report.status, TaskStatus::Failed);
    assert_eq!(report.message, messages::QUERY_FAIL);
    assert_eq!(report.stage_message, "Generating code (attempt 1)");
    assert!(report.output.is_none());

    let log = harness.output_dir.join(format!("{}.log", task_id));
    assert_eq!(report.output_locator, Some(log.display().to_string()));
    assert_eq!(harness.generator.count("coder"), 3);
    assert!(!harness.output_dir.join(task_id.to_string()).exists());

    let content = std::fs::read_to_string(&log).unwrap();
    let events: Vec<PipelineEvent> = content.lines().filter_map(PipelineEvent::from_line).collect();
    assert!(events.iter().any(|event| matches!(
        event,
        PipelineEvent::StageFailed { stage, .. } if stage == "coder"
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        PipelineEvent::TaskFinished { status: TaskStatus::Failed, .. }
    )));
}

#[tokio::test]
async fn test_step_limit_fails_the_task() {
    let mut builder = HarnessBuilder::new();
    builder.configure = Box::new(|config| config.step_limit = 5);
    let harness = builder.build();

    let task_id = harness.service.create(DESIGN_URL, "token", "erin").task_id.unwrap();
    harness.service.wait(task_id).await;

    let record = harness.service.registry().get(task_id).unwrap();
    assert_eq!(record.status, TaskStatus::Failed);
    assert!(record.ended_at.is_some());
    assert_eq!(history(&harness, task_id).len(), 5);
}

#[tokio::test]
async fn test_malformed_link_fails_in_first_stage() {
    let harness = HarnessBuilder::new().build();
    let task_id = harness
        .service
        .create("https://www.figma.com/design/KEY/Home", "token", "frank")
        .task_id
        .unwrap();
    harness.service.wait(task_id).await;

    let report = harness.service.query(&task_id.to_string());
    assert_eq!(report.status, TaskStatus::Failed);
    assert_eq!(report.stage_message, "Exporting design document");
    assert_eq!(harness.design.link_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rate_limited_coder_surfaces_a_retriable_error() {
    let mut builder = HarnessBuilder::new();
    builder.generator = FakeGenerator::rate_limited_coder();
    let harness = builder.build_engine();

    let task_id = harness.registry.create("gina", DESIGN_URL, "token", None).unwrap();
    let err = harness
        .engine
        .run(WorkflowState::new(task_id, DESIGN_URL, "token"))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Coder));
    assert!(err.is_retriable(), "{}", err);
    assert_eq!(harness.generator.count("coder"), 1);
}
