//! Runs against a real PostgreSQL: `DATABASE_URL=postgres://… cargo test -- --ignored`.
//! Each test registers its own uniquely named type, so runs can share a database.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DurationRound, TimeDelta, Utc};
use docket_core::app::{ClaimTask, CompleteTask, CreateTask, ListTasks};
use docket_core::domain::{StatusChange, StoreError, TaskHistory, TaskTypeId, TypeRegistration};
use docket_core::impls::NoopEventSink;
use docket_core::ports::{ManualClock, TaskStore};
use docket_core::{Broker, ErrorKind, TaskStatus};
use docket_pg::PgTaskStore;
use serde_json::json;
use ulid::Ulid;

struct Harness {
    broker: Broker,
    store: PgTaskStore,
    clock: Arc<ManualClock>,
    type_name: String,
}

async fn harness() -> Harness {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let store = PgTaskStore::connect(&url, 8).await.unwrap();
    store.migrate().await.unwrap();

    // whole microseconds, like TIMESTAMPTZ
    let start = Utc::now().duration_trunc(TimeDelta::seconds(1)).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let broker = Broker::builder()
        .store(store.clone())
        .clock(clock.clone())
        .event_sink(Arc::new(NoopEventSink))
        .build()
        .unwrap();

    Harness {
        broker,
        store,
        clock,
        type_name: format!("pg-test.{}", Ulid::new()),
    }
}

impl Harness {
    async fn register(&self) -> TaskTypeId {
        self.broker
            .register_type(TypeRegistration::new(
                self.type_name.clone(),
                "1",
                json!({"type": "object", "required": ["x"], "properties": {"x": {"type": "integer"}}}),
            ))
            .await
            .unwrap()
            .id
    }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn upsert_keeps_identity_and_reactivates() {
    let h = harness().await;
    let id = h.register().await;

    let off = h.broker.deactivate_type(&h.type_name).await.unwrap();
    assert!(!off.active);

    let again = h.register().await;
    assert_eq!(again, id);
    assert!(h.broker.task_type(&h.type_name).await.unwrap().active);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn duplicate_of_open_task_is_returned() {
    let h = harness().await;
    h.register().await;

    let first = h
        .broker
        .create_task(CreateTask::new(&h.type_name, json!({"x": 1})))
        .await
        .unwrap();
    let second = h
        .broker
        .create_task(CreateTask::new(&h.type_name, json!({"x": 1})))
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    let history = h.broker.task_history(first.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status_change, StatusChange::Created);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_identical_creates_insert_one_row() {
    let h = harness().await;
    h.register().await;

    let mut joins = Vec::new();
    for _ in 0..16 {
        let broker = h.broker.clone();
        let type_name = h.type_name.clone();
        joins.push(tokio::spawn(async move {
            broker
                .create_task(CreateTask::new(type_name, json!({"x": 9})))
                .await
        }));
    }

    let mut ids = HashSet::new();
    for join in joins {
        ids.insert(join.await.unwrap().unwrap().id);
    }
    assert_eq!(ids.len(), 1);

    let rows = h
        .broker
        .list_tasks(ListTasks {
            task_type: Some(h.type_name.clone()),
            ..ListTasks::default()
        })
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, TaskStatus::Pending);

    let id = ids.into_iter().next().unwrap();
    let history = h.broker.task_history(id).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_claims_are_exclusive() {
    let h = harness().await;
    let type_id = h.register().await;
    for x in 0..10 {
        h.broker
            .create_task(CreateTask::new(&h.type_name, json!({ "x": x })))
            .await
            .unwrap();
    }

    let mut joins = Vec::new();
    for w in 0..30 {
        let broker = h.broker.clone();
        joins.push(tokio::spawn(async move {
            broker
                .claim_task(ClaimTask::new(format!("w{w}"), type_id))
                .await
        }));
    }

    let mut ids = HashSet::new();
    for join in joins {
        if let Some(task) = join.await.unwrap().unwrap() {
            assert!(ids.insert(task.id), "task {} claimed twice", task.id);
        }
    }
    assert_eq!(ids.len(), 10);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn expired_claim_is_reclaimed_and_old_holder_rejected() {
    let h = harness().await;
    let type_id = h.register().await;
    let task = h
        .broker
        .create_task(CreateTask::new(&h.type_name, json!({"x": 1})))
        .await
        .unwrap();

    let timeout = Duration::from_secs(30);
    h.broker
        .claim_task(ClaimTask::new("w1", type_id).claim_timeout(timeout))
        .await
        .unwrap()
        .unwrap();
    assert!(
        h.broker
            .claim_task(ClaimTask::new("w2", type_id).claim_timeout(timeout))
            .await
            .unwrap()
            .is_none()
    );

    h.clock.advance(Duration::from_secs(31));
    let reclaimed = h
        .broker
        .claim_task(ClaimTask::new("w2", type_id).claim_timeout(timeout))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reclaimed.id, task.id);
    assert_eq!(reclaimed.attempts, 2);

    let err = h
        .broker
        .complete_task(CompleteTask::success(task.id, "w1", None))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotOwner);

    let done = h
        .broker
        .complete_task(CompleteTask::success(task.id, "w2", Some(json!({"ok": true}))))
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.result, Some(json!({"ok": true})));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn stale_revision_is_a_conflict() {
    let h = harness().await;
    let type_id = h.register().await;
    let created = h
        .broker
        .create_task(CreateTask::new(&h.type_name, json!({"x": 1})))
        .await
        .unwrap();
    h.broker
        .claim_task(ClaimTask::new("w1", type_id))
        .await
        .unwrap()
        .unwrap();

    let mut stale = h.store.task(created.id).await.unwrap().unwrap();
    let expected = stale.revision;
    stale.progress = Some(10);
    stale.revision += 1;
    let history = TaskHistory::new(Ulid::new().into(), stale.id, StatusChange::Progress, Utc::now());

    h.store.update_task(expected, &stale, &history).await.unwrap();
    let err = h
        .store
        .update_task(expected, &stale, &history)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn listing_is_newest_first_and_filtered() {
    let h = harness().await;
    h.register().await;
    for x in 0..3 {
        h.broker
            .create_task(CreateTask::new(&h.type_name, json!({ "x": x })))
            .await
            .unwrap();
        h.clock.advance(Duration::from_secs(1));
    }

    let tasks = h
        .broker
        .list_tasks(ListTasks {
            task_type: Some(h.type_name.clone()),
            status: Some(TaskStatus::Pending),
            limit: Some(2),
        })
        .await
        .unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(tasks[0].created_at > tasks[1].created_at);
    assert_eq!(tasks[0].parameters, json!({"x": 2}));
}
