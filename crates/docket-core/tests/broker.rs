use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use docket_core::app::{ClaimTask, CompleteTask, CreateTask, ListTasks, UpdateProgress};
use docket_core::domain::{StatusChange, TaskTypeId, TypeRegistration};
use docket_core::impls::{MemoryEventSink, MemoryTaskStore};
use docket_core::ports::ManualClock;
use docket_core::scheduling::{SortField, SortOrder, SortSpec};
use docket_core::{Broker, BrokerError, ErrorKind, TaskStatus};
use rstest::rstest;
use serde_json::{Value, json};

struct Harness {
    broker: Broker,
    clock: Arc<ManualClock>,
    events: Arc<MemoryEventSink>,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
    ));
    let events = Arc::new(MemoryEventSink::new());
    let broker = Broker::builder()
        .store(MemoryTaskStore::new())
        .clock(clock.clone())
        .event_sink(events.clone())
        .build()
        .unwrap();
    Harness {
        broker,
        clock,
        events,
    }
}

fn t_schema() -> Value {
    json!({
        "type": "object",
        "required": ["x"],
        "properties": { "x": { "type": "integer" } }
    })
}

async fn register_t(broker: &Broker) -> TaskTypeId {
    broker
        .register_type(TypeRegistration::new("t", "1", t_schema()))
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn concrete_scenario_retries_once_then_fails() {
    let h = harness();
    let type_id = register_t(&h.broker).await;

    let a = h
        .broker
        .create_task(CreateTask::new("t", json!({"x": 1})).max_attempts(2))
        .await
        .unwrap();
    assert_eq!(a.status, TaskStatus::Pending);
    assert_eq!(a.attempts, 0);

    let sort = SortSpec::parse(Some("priority"), None).unwrap();
    let claimed = h
        .broker
        .claim_task(ClaimTask::new("w1", type_id).sort(sort))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, a.id);
    assert_eq!(claimed.status, TaskStatus::Claimed);
    assert_eq!(claimed.attempts, 1);

    let retried = h
        .broker
        .complete_task(CompleteTask::failure(a.id, "w1", Some("boom".into())))
        .await
        .unwrap();
    assert_eq!(retried.status, TaskStatus::Pending);
    assert_eq!(retried.attempts, 1);
    assert!(retried.claimed_by.is_none());

    let again = h
        .broker
        .claim_task(ClaimTask::new("w1", type_id).sort(sort))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.attempts, 2);

    let failed = h
        .broker
        .complete_task(CompleteTask::failure(a.id, "w1", Some("boom".into())))
        .await
        .unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.attempts, failed.max_attempts);
    assert_eq!(failed.error_message.as_deref(), Some("boom"));
    assert!(failed.completed_at.is_some());

    let history = h.broker.task_history(a.id).await.unwrap();
    assert_eq!(
        history[2].message.as_deref(),
        Some("boom (attempt 1/2 failed)")
    );
    assert_eq!(
        history[4].message.as_deref(),
        Some("boom (max attempts reached: 2/2)")
    );
    let ledger: Vec<StatusChange> = history.into_iter().map(|row| row.status_change).collect();
    assert_eq!(
        ledger,
        vec![
            StatusChange::Created,
            StatusChange::Claimed,
            StatusChange::Retried,
            StatusChange::Claimed,
            StatusChange::Failed,
        ]
    );

    assert_eq!(
        h.events.names(),
        vec![
            "type_registered",
            "task_created",
            "task_claimed",
            "task_retried",
            "task_claimed",
            "task_failed",
        ]
    );
}

#[tokio::test]
async fn duplicate_creation_returns_the_open_task() {
    let h = harness();
    register_t(&h.broker).await;

    let first = h
        .broker
        .create_task(CreateTask::new("t", json!({"x": 1, "note": "a"})))
        .await
        .unwrap();
    // key order does not matter
    let second = h
        .broker
        .create_task(CreateTask::new("t", json!({"note": "a", "x": 1})))
        .await
        .unwrap();
    let other = h
        .broker
        .create_task(CreateTask::new("t", json!({"x": 2, "note": "a"})))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.dedup_key, second.dedup_key);
    assert_ne!(first.id, other.id);
    assert_ne!(first.dedup_key, other.dedup_key);

    let all = h.broker.list_tasks(ListTasks::default()).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(h.events.names().contains(&"task_deduplicated"));
}

#[tokio::test]
async fn duplicate_of_a_claimed_task_is_still_suppressed() {
    let h = harness();
    let type_id = register_t(&h.broker).await;

    let first = h
        .broker
        .create_task(CreateTask::new("t", json!({"x": 1})))
        .await
        .unwrap();
    h.broker
        .claim_task(ClaimTask::new("w1", type_id))
        .await
        .unwrap()
        .unwrap();

    let second = h
        .broker
        .create_task(CreateTask::new("t", json!({"x": 1})))
        .await
        .unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.status, TaskStatus::Claimed);
}

#[tokio::test]
async fn finished_task_releases_its_dedup_key() {
    let h = harness();
    let type_id = register_t(&h.broker).await;

    let first = h
        .broker
        .create_task(CreateTask::new("t", json!({"x": 1})))
        .await
        .unwrap();
    h.broker
        .claim_task(ClaimTask::new("w1", type_id))
        .await
        .unwrap()
        .unwrap();
    h.broker
        .complete_task(CompleteTask::success(first.id, "w1", Some(json!({"ok": true}))))
        .await
        .unwrap();

    let second = h
        .broker
        .create_task(CreateTask::new("t", json!({"x": 1})))
        .await
        .unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(second.status, TaskStatus::Pending);
}

#[tokio::test]
async fn invalid_parameters_list_every_failing_field() {
    let h = harness();
    h.broker
        .register_type(TypeRegistration::new(
            "typed",
            "1",
            json!({
                "type": "object",
                "required": ["x", "y"],
                "properties": {
                    "x": { "type": "integer" },
                    "y": { "type": "string" }
                }
            }),
        ))
        .await
        .unwrap();

    let err = h
        .broker
        .create_task(CreateTask::new("typed", json!({"x": "one"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);

    let fields: Vec<&str> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
    assert!(fields.contains(&"$.x"), "{fields:?}");
    assert!(fields.contains(&"$.y"), "{fields:?}");

    assert!(h.broker.list_tasks(ListTasks::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_and_inactive_types_reject_creation() {
    let h = harness();
    let type_id = register_t(&h.broker).await;

    let err = h
        .broker
        .create_task(CreateTask::new("missing", json!({})))
        .await
        .unwrap_err();
    assert_eq!(err, BrokerError::TypeNotFound("missing".to_string()));

    let queued = h
        .broker
        .create_task(CreateTask::new("t", json!({"x": 1})))
        .await
        .unwrap();
    let deactivated = h.broker.deactivate_type("t").await.unwrap();
    assert!(!deactivated.active);

    let err = h
        .broker
        .create_task(CreateTask::new("t", json!({"x": 2})))
        .await
        .unwrap_err();
    assert_eq!(err, BrokerError::TypeInactive("t".to_string()));

    // already queued work can still be drained
    let drained = h
        .broker
        .claim_task(ClaimTask::new("w1", type_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(drained.id, queued.id);

    // re-registering reactivates under the same id
    let again = h
        .broker
        .register_type(TypeRegistration::new("t", "2", t_schema()))
        .await
        .unwrap();
    assert!(again.active);
    assert_eq!(again.id, type_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_hand_each_task_to_one_worker() {
    let h = harness();
    let type_id = register_t(&h.broker).await;
    for x in 0..5 {
        h.broker
            .create_task(CreateTask::new("t", json!({ "x": x })))
            .await
            .unwrap();
    }

    let mut joins = Vec::new();
    for w in 0..20 {
        let broker = h.broker.clone();
        joins.push(tokio::spawn(async move {
            broker
                .claim_task(ClaimTask::new(format!("w{w}"), type_id))
                .await
        }));
    }

    let mut claimed = Vec::new();
    for join in joins {
        if let Some(task) = join.await.unwrap().unwrap() {
            claimed.push(task);
        }
    }

    assert_eq!(claimed.len(), 5);
    let ids: HashSet<_> = claimed.iter().map(|t| t.id).collect();
    assert_eq!(ids.len(), 5);
    assert!(claimed.iter().all(|t| t.attempts == 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_creates_leave_one_open_task() {
    let h = harness();
    register_t(&h.broker).await;

    let mut joins = Vec::new();
    for _ in 0..32 {
        let broker = h.broker.clone();
        joins.push(tokio::spawn(async move {
            broker
                .create_task(CreateTask::new("t", json!({"x": 42})))
                .await
        }));
    }

    let mut ids = HashSet::new();
    for join in joins {
        ids.insert(join.await.unwrap().unwrap().id);
    }
    assert_eq!(ids.len(), 1);

    let all = h.broker.list_tasks(ListTasks::default()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, TaskStatus::Pending);

    let created = h
        .events
        .names()
        .into_iter()
        .filter(|name| *name == "task_created")
        .count();
    assert_eq!(created, 1);
}

#[tokio::test]
async fn expired_claim_is_reclaimed_lazily() {
    let h = harness();
    let type_id = register_t(&h.broker).await;
    let task = h
        .broker
        .create_task(CreateTask::new("t", json!({"x": 1})))
        .await
        .unwrap();

    let timeout = Duration::from_secs(60);
    h.broker
        .claim_task(ClaimTask::new("w1", type_id).claim_timeout(timeout))
        .await
        .unwrap()
        .unwrap();

    let early = h
        .broker
        .claim_task(ClaimTask::new("w2", type_id).claim_timeout(timeout))
        .await
        .unwrap();
    assert!(early.is_none());

    h.clock.advance(Duration::from_secs(61));
    let reclaimed = h
        .broker
        .claim_task(ClaimTask::new("w2", type_id).claim_timeout(timeout))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reclaimed.id, task.id);
    assert_eq!(reclaimed.claimed_by.as_deref(), Some("w2"));
    assert_eq!(reclaimed.attempts, 2);

    // the first holder lost the task
    let err = h
        .broker
        .complete_task(CompleteTask::success(task.id, "w1", None))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotOwner);

    let last = h.broker.task_history(task.id).await.unwrap();
    assert_eq!(last.last().map(|r| r.status_change), Some(StatusChange::Reclaimed));
    assert!(h.events.names().contains(&"task_reclaimed"));
}

#[tokio::test]
async fn failures_never_exceed_max_attempts() {
    let h = harness();
    let type_id = register_t(&h.broker).await;
    let task = h
        .broker
        .create_task(CreateTask::new("t", json!({"x": 1})).max_attempts(3))
        .await
        .unwrap();

    let mut rounds = 0;
    while let Some(claimed) = h
        .broker
        .claim_task(ClaimTask::new("w1", type_id))
        .await
        .unwrap()
    {
        rounds += 1;
        assert!(claimed.attempts <= claimed.max_attempts);
        let done = h
            .broker
            .complete_task(CompleteTask::failure(claimed.id, "w1", None))
            .await
            .unwrap();
        if done.status == TaskStatus::Failed {
            break;
        }
        assert_eq!(done.status, TaskStatus::Pending);
    }

    assert_eq!(rounds, 3);
    let last = h.broker.task(task.id).await.unwrap();
    assert_eq!(last.status, TaskStatus::Failed);
    assert_eq!(last.attempts, 3);
}

#[tokio::test]
async fn no_retry_failure_is_final_immediately() {
    let h = harness();
    let type_id = register_t(&h.broker).await;
    let task = h
        .broker
        .create_task(CreateTask::new("t", json!({"x": 1})).max_attempts(5))
        .await
        .unwrap();
    h.broker
        .claim_task(ClaimTask::new("w1", type_id))
        .await
        .unwrap()
        .unwrap();

    let done = h
        .broker
        .complete_task(CompleteTask::failure(task.id, "w1", Some("bad input".into())).no_retry())
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.attempts, 1);
    assert_eq!(done.error_message.as_deref(), Some("bad input"));

    let history = h.broker.task_history(task.id).await.unwrap();
    let row = history.last().unwrap();
    assert_eq!(row.status_change, StatusChange::Failed);
    assert_eq!(
        row.message.as_deref(),
        Some("bad input (retry refused by worker)")
    );
}

#[tokio::test]
async fn wrong_worker_changes_nothing() {
    let h = harness();
    let type_id = register_t(&h.broker).await;
    let task = h
        .broker
        .create_task(CreateTask::new("t", json!({"x": 1})))
        .await
        .unwrap();

    // not yet claimed
    let err = h
        .broker
        .complete_task(CompleteTask::success(task.id, "w1", None))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotClaimed);

    h.broker
        .claim_task(ClaimTask::new("w1", type_id))
        .await
        .unwrap()
        .unwrap();
    let before = h.broker.task(task.id).await.unwrap();
    let history_before = h.broker.task_history(task.id).await.unwrap().len();

    let err = h
        .broker
        .complete_task(CompleteTask::success(task.id, "w2", None))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotOwner);

    let err = h
        .broker
        .update_progress(UpdateProgress {
            task_id: task.id,
            worker_id: "w2".into(),
            percent: 50,
            message: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotOwner);

    let after = h.broker.task(task.id).await.unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(after.claimed_by, before.claimed_by);
    assert_eq!(after.attempts, before.attempts);
    assert_eq!(after.progress, before.progress);
    assert_eq!(
        h.broker.task_history(task.id).await.unwrap().len(),
        history_before
    );
}

#[rstest]
#[case(-1)]
#[case(101)]
#[tokio::test]
async fn progress_out_of_bounds_is_rejected(#[case] percent: i64) {
    let h = harness();
    let type_id = register_t(&h.broker).await;
    let task = h
        .broker
        .create_task(CreateTask::new("t", json!({"x": 1})))
        .await
        .unwrap();
    h.broker
        .claim_task(ClaimTask::new("w1", type_id))
        .await
        .unwrap()
        .unwrap();

    let err = h
        .broker
        .update_progress(UpdateProgress {
            task_id: task.id,
            worker_id: "w1".into(),
            percent,
            message: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);
    assert_eq!(err.field_errors()[0].field, "percent");
}

#[tokio::test]
async fn progress_keeps_the_task_claimed() {
    let h = harness();
    let type_id = register_t(&h.broker).await;
    let task = h
        .broker
        .create_task(CreateTask::new("t", json!({"x": 1})))
        .await
        .unwrap();
    h.broker
        .claim_task(ClaimTask::new("w1", type_id))
        .await
        .unwrap()
        .unwrap();

    let updated = h
        .broker
        .update_progress(UpdateProgress {
            task_id: task.id,
            worker_id: "w1".into(),
            percent: 40,
            message: Some("halfway-ish".into()),
        })
        .await
        .unwrap();
    assert_eq!(updated.status, TaskStatus::Claimed);
    assert_eq!(updated.progress, Some(40));
    assert_eq!(updated.progress_message.as_deref(), Some("halfway-ish"));

    let history = h.broker.task_history(task.id).await.unwrap();
    let row = history.last().unwrap();
    assert_eq!(row.status_change, StatusChange::Progress);
    assert_eq!(row.message.as_deref(), Some("40% halfway-ish"));
}

#[rstest]
#[case(SortField::Priority, SortOrder::Desc, 5)]
#[case(SortField::Priority, SortOrder::Asc, 1)]
#[case(SortField::CreatedAt, SortOrder::Asc, 3)]
#[case(SortField::CreatedAt, SortOrder::Desc, 1)]
#[case(SortField::Id, SortOrder::Asc, 3)]
#[tokio::test]
async fn claim_order_follows_the_sort(
    #[case] field: SortField,
    #[case] order: SortOrder,
    #[case] expected_priority: i32,
) {
    let h = harness();
    let type_id = register_t(&h.broker).await;
    for (x, priority) in [(1, 3), (2, 5), (3, 1)] {
        h.broker
            .create_task(CreateTask::new("t", json!({ "x": x })).priority(priority))
            .await
            .unwrap();
        h.clock.advance(Duration::from_secs(1));
    }

    let first = h
        .broker
        .claim_task(ClaimTask::new("w1", type_id).sort(SortSpec { field, order }))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.priority, expected_priority);
}

#[tokio::test]
async fn claim_checks_its_inputs() {
    let h = harness();
    let type_id = register_t(&h.broker).await;

    let err = h
        .broker
        .claim_task(ClaimTask::new("", type_id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);

    let unknown: TaskTypeId = "01HZY3J7W6W5JQ0V1K3D2R9ZAB".parse().unwrap();
    let err = h
        .broker
        .claim_task(ClaimTask::new("w1", unknown))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeNotFound);

    assert!(matches!(
        SortSpec::parse(Some("name"), None),
        Err(BrokerError::InvalidSortField(_))
    ));

    // empty queue is not an error
    assert!(
        h.broker
            .claim_task(ClaimTask::new("w1", type_id))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn listing_filters_by_type_and_status() {
    let h = harness();
    let type_id = register_t(&h.broker).await;
    h.broker
        .register_type(TypeRegistration::new("other", "1", json!({})))
        .await
        .unwrap();

    for x in 0..3 {
        h.broker
            .create_task(CreateTask::new("t", json!({ "x": x })))
            .await
            .unwrap();
        h.clock.advance(Duration::from_secs(1));
    }
    h.broker
        .create_task(CreateTask::new("other", json!({})))
        .await
        .unwrap();
    h.broker
        .claim_task(ClaimTask::new("w1", type_id))
        .await
        .unwrap()
        .unwrap();

    let of_t = h
        .broker
        .list_tasks(ListTasks {
            task_type: Some("t".into()),
            ..ListTasks::default()
        })
        .await
        .unwrap();
    assert_eq!(of_t.len(), 3);
    assert!(of_t.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    let pending = h
        .broker
        .list_tasks(ListTasks {
            task_type: Some("t".into()),
            status: Some(TaskStatus::Pending),
            limit: None,
        })
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);

    let limited = h
        .broker
        .list_tasks(ListTasks {
            limit: Some(1),
            ..ListTasks::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);

    let err = h
        .broker
        .list_tasks(ListTasks {
            task_type: Some("nope".into()),
            ..ListTasks::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeNotFound);
}
