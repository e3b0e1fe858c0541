//! Task registry under concurrent use

use design2code::registry::{TaskRegistry, TaskUpdate};
use design2code_sdk::TaskStatus;
use std::collections::HashSet;

#[tokio::test]
async fn test_concurrent_creates_get_unique_ids() {
    let registry = TaskRegistry::new();
    let handles: Vec<_> = (0..32)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .create(&format!("owner-{}", i % 4), "design", "token", None)
                    .unwrap()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        assert!(ids.insert(handle.await.unwrap()));
    }
    assert_eq!(ids.len(), 32);
    assert_eq!(registry.count_running("owner-0"), 8);
}

#[test]
fn test_new_task_starts_creating() {
    let registry = TaskRegistry::new();
    let before = chrono::Utc::now();
    let id = registry.create("alice", "design", "token", None).unwrap();
    let record = registry.get(id).unwrap();

    assert_eq!(record.status, TaskStatus::Creating);
    assert!(record.created_at >= before);
    assert!(record.created_at <= chrono::Utc::now());
    assert!(record.ended_at.is_none());
    assert!(registry.stage_history(id).is_empty());
}

#[test]
fn test_running_count_tracks_status() {
    let registry = TaskRegistry::new();
    let a = registry.create("alice", "a", "t", None).unwrap();
    let b = registry.create("alice", "b", "t", None).unwrap();
    registry.update(a, TaskUpdate::status(TaskStatus::Running));
    assert_eq!(registry.count_running("alice"), 2);

    registry.complete(b, TaskStatus::Failed, "b.log");
    assert_eq!(registry.count_running("alice"), 1);
    registry.update(a, TaskUpdate::status(TaskStatus::AdminStop));
    assert_eq!(registry.count_running("alice"), 0);
}

#[test]
fn test_credential_is_not_serialized() {
    let registry = TaskRegistry::new();
    let id = registry.create("alice", "design", "figd_secret", None).unwrap();
    let json = serde_json::to_string(&registry.get(id).unwrap()).unwrap();
    assert!(!json.contains("figd_secret"));
    assert!(json.contains("\"owner\":\"alice\""));
}
