use cmig_content::ContentRecord;
use cmig_core::{PublishError, PublishQueue, PublishQueueConfig};
use cmig_test_utils::{record, FakeHub, HubCall};
use futures::future::join_all;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn limits(max_in_flight: usize, max_poll_attempts: u32) -> PublishQueueConfig {
    PublishQueueConfig {
        max_in_flight,
        poll_interval_ms: 100,
        max_poll_attempts,
    }
}

#[tokio::test(start_paused = true)]
async fn in_flight_jobs_stay_bounded() {
    let hub = Arc::new(FakeHub::new().with_publish_polls(2));
    let queue = PublishQueue::new(hub.clone(), limits(2, 10));
    let records: Vec<ContentRecord> = (0..6).map(|i| record(&format!("r{i}"), &[])).collect();

    let started = join_all(records.iter().map(|r| queue.submit(r))).await;
    assert!(started.iter().all(Result::is_ok));

    let report = queue.drain().await;

    assert_eq!(report.succeeded.len(), 6);
    assert!(report.failed.is_empty());
    assert_eq!(hub.publish_starts(), 6);
    assert!(hub.peak_in_flight() <= 2);
    assert!(queue.peak_in_flight() <= 2);
    assert_eq!(hub.in_flight(), 0);
    assert_eq!(queue.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn single_slot_publishes_in_submission_order() {
    let hub = Arc::new(FakeHub::new().with_publish_polls(1));
    let queue = PublishQueue::new(hub.clone(), limits(1, 10));

    for id in ["a", "b", "c"] {
        queue.submit(&record(id, &[])).await.unwrap();
    }
    let report = queue.drain().await;

    let labels: Vec<&str> = report.succeeded.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(labels, vec!["page a", "page b", "page c"]);
    assert_eq!(hub.peak_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_start_is_reported() {
    let hub = Arc::new(FakeHub::new().reject_publish("page a"));
    let queue = PublishQueue::new(hub.clone(), limits(4, 10));

    let err = queue.submit(&record("a", &[])).await.unwrap_err();
    assert_eq!(err, PublishError::StartRejected { status: 500 });
    queue.submit(&record("b", &[])).await.unwrap();

    let report = queue.drain().await;
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].label, "page a");
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(queue.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_job_is_reported() {
    let hub = Arc::new(FakeHub::new().fail_publish("page a"));
    let queue = PublishQueue::new(hub.clone(), limits(4, 10));

    queue.submit(&record("a", &[])).await.unwrap();
    let report = queue.drain().await;

    assert!(report.succeeded.is_empty());
    assert_eq!(
        report.failed[0].error,
        PublishError::JobFailed {
            location: "/jobs/job-1".to_string()
        }
    );
    assert_eq!(report.failed[0].id.as_deref(), Some("a"));
}

#[tokio::test(start_paused = true)]
async fn polling_gives_up_after_max_attempts() {
    let hub = Arc::new(FakeHub::new().with_publish_polls(100));
    let queue = PublishQueue::new(hub.clone(), limits(4, 3));

    queue.submit(&record("slow", &[])).await.unwrap();
    let report = queue.drain().await;

    assert_eq!(
        report.failed[0].error,
        PublishError::Exhausted {
            location: "/jobs/job-1".to_string(),
            attempts: 3
        }
    );
    assert_eq!(queue.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_poll_errors_are_retried() {
    let hub = Arc::new(FakeHub::new().with_flaky_polls(2).with_publish_polls(1));
    let queue = PublishQueue::new(hub.clone(), limits(4, 5));

    queue.submit(&record("a", &[])).await.unwrap();
    let report = queue.drain().await;

    assert!(report.failed.is_empty());
    assert_eq!(report.succeeded[0].label, "page a");
    assert_eq!(hub.in_flight(), 0);
    assert_eq!(queue.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn poll_errors_count_towards_max_attempts() {
    let hub = Arc::new(FakeHub::new().with_flaky_polls(10));
    let queue = PublishQueue::new(hub.clone(), limits(4, 3));

    queue.submit(&record("a", &[])).await.unwrap();
    let report = queue.drain().await;

    assert_eq!(
        report.failed[0].error,
        PublishError::Exhausted {
            location: "/jobs/job-1".to_string(),
            attempts: 3
        }
    );
    assert_eq!(queue.in_flight(), 0);
}

#[tokio::test]
async fn accepted_start_without_location_is_reported() {
    let hub = Arc::new(FakeHub::new().omit_location("page a"));
    let queue = PublishQueue::new(hub.clone(), limits(4, 10));

    let err = queue.submit(&record("a", &[])).await.unwrap_err();
    assert_eq!(err, PublishError::MissingLocation);

    let report = queue.drain().await;
    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed[0].label, "page a");
    assert_eq!(report.failed[0].error, PublishError::MissingLocation);
    assert_eq!(queue.in_flight(), 0);
}

#[tokio::test]
async fn record_without_id_is_not_started() {
    let hub = Arc::new(FakeHub::new());
    let queue = PublishQueue::new(hub.clone(), limits(4, 10));
    let draft = ContentRecord::new("draft", json!({}));

    let err = queue.submit(&draft).await.unwrap_err();

    assert_eq!(
        err,
        PublishError::NotCreated {
            label: "draft".to_string()
        }
    );
    assert_eq!(hub.count(|c| matches!(c, HubCall::StartPublish { .. })), 0);
    assert_eq!(queue.drain().await.failed.len(), 1);
}

#[tokio::test]
async fn drain_with_nothing_submitted_returns_at_once() {
    let hub = Arc::new(FakeHub::new());
    let queue = PublishQueue::new(hub, limits(4, 10));

    assert!(queue.drain().await.is_empty());
}
