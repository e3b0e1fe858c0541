//! Submission surface: running limit, queries and listings

use super::common::*;
use design2code::messages;
use design2code_sdk::TaskStatus;

#[tokio::test]
async fn test_create_refuses_past_the_running_limit() {
    let mut builder = HarnessBuilder::new();
    builder.configure = Box::new(|config| config.max_running_per_owner = 2);
    let harness = builder.build();
    let registry = harness.service.registry();

    registry.create("alice", "busy-1", "token", None).unwrap();
    registry.create("alice", "busy-2", "token", None).unwrap();

    let refused = harness.service.create(DESIGN_URL, "token", "alice");
    assert_eq!(refused.status, TaskStatus::CreateFail);
    assert_eq!(refused.task_id, None);
    assert_eq!(refused.message, messages::create_limit_reached(2));

    // Other owners are unaffected
    let accepted = harness.service.create(DESIGN_URL, "token", "bob");
    assert_eq!(accepted.status, TaskStatus::Creating);
    harness.service.wait_all().await;
}

#[tokio::test]
async fn test_finished_tasks_free_the_limit() {
    let mut builder = HarnessBuilder::new();
    builder.configure = Box::new(|config| config.max_running_per_owner = 1);
    let harness = builder.build();
    let registry = harness.service.registry();

    let id = registry.create("alice", "old", "token", None).unwrap();
    registry.complete(id, TaskStatus::Failed, "old.log");

    let created = harness.service.create(DESIGN_URL, "token", "alice");
    assert_eq!(created.status, TaskStatus::Creating);
    harness.service.wait_all().await;
}

#[tokio::test]
async fn test_query_rejects_bad_ids() {
    let harness = HarnessBuilder::new().build();

    let invalid = harness.service.query("12ab");
    assert_eq!(invalid.status, TaskStatus::Unknown);
    assert_eq!(invalid.task_id, None);
    assert_eq!(invalid.message, messages::INVALID_TASK_ID);

    let unknown = harness.service.query("424242");
    assert_eq!(unknown.status, TaskStatus::Unknown);
    assert_eq!(unknown.task_id, Some(424242));
    assert_eq!(unknown.message, messages::QUERY_UNKNOWN_ID);
}

#[tokio::test]
async fn test_query_hides_output_until_succeeded() {
    let harness = HarnessBuilder::new().build();
    let registry = harness.service.registry();

    let id = registry.create("alice", DESIGN_URL, "token", None).unwrap();
    registry.append_stage(id, "coder");
    registry.set_output(id, "package com.example.myapplication");

    let running = harness.service.query(&id.to_string());
    assert_eq!(running.status, TaskStatus::Creating);
    assert_eq!(running.message, messages::QUERY_RUNNING);
    assert_eq!(running.stage_message, "Generating code (attempt 1)");
    assert!(running.output.is_none());

    registry.complete(id, TaskStatus::Succeeded, "/out/Home_1.zip");
    let done = harness.service.query(&format!(" {} ", id));
    assert_eq!(done.status, TaskStatus::Succeeded);
    assert_eq!(done.output.as_deref(), Some("package com.example.myapplication"));
    assert_eq!(done.output_locator.as_deref(), Some("/out/Home_1.zip"));
}

#[tokio::test]
async fn test_list_pages_newest_first() {
    let harness = HarnessBuilder::new().build();
    let registry = harness.service.registry();
    let ids: Vec<i64> = (0..3)
        .map(|i| registry.create("alice", &format!("design-{}", i), "token", None).unwrap())
        .collect();
    registry.create("bob", "other", "token", None).unwrap();

    let page = harness.service.list("alice", 0, 2);
    assert_eq!(page.total, 3);
    let listed: Vec<i64> = page.tasks.iter().map(|t| t.id).collect();
    assert_eq!(listed, vec![ids[2], ids[1]]);

    let rest = harness.service.list("alice", 2, 2);
    assert_eq!(rest.tasks.len(), 1);
    assert_eq!(rest.tasks[0].id, ids[0]);

    assert_eq!(harness.service.list("nobody", 0, 10).total, 0);
}

#[tokio::test]
async fn test_finished_handles_are_dropped_on_create() {
    let harness = HarnessBuilder::new().build();
    let first = harness.service.create(DESIGN_URL, "token", "ivan").task_id.unwrap();

    for _ in 0..500 {
        let status = harness.service.registry().get(first).unwrap().status;
        if !status.is_active() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    harness.service.create(DESIGN_URL, "token", "ivan");
    assert_eq!(harness.service.tracked_tasks(), 1);
    harness.service.wait_all().await;
    assert_eq!(harness.service.tracked_tasks(), 0);
}
