//! Durable queue behaviour: claim ordering, retry backoff scheduling, and
//! terminal failure after exhausted attempts.

use sqlx::PgPool;
use tally_db::models::queue_job::{Backoff, EnqueueOptions};
use tally_db::models::status::QueueJobStatus;
use tally_db::repositories::QueueJobRepo;

/// Options with no backoff delay so retries are immediately claimable.
fn immediate_retry(max_attempts: i32) -> EnqueueOptions {
    EnqueueOptions {
        max_attempts,
        backoff: Backoff::Fixed { delay_ms: 0 },
        keep_completed: 100,
        keep_failed: 100,
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_increments_attempts_and_runs(pool: PgPool) {
    let payload = serde_json::json!({"uploadJobId": 1});
    let job = QueueJobRepo::enqueue(&pool, "file-processing", &payload, &immediate_retry(3))
        .await
        .unwrap();
    assert_eq!(job.status_id, QueueJobStatus::Pending.id());
    assert_eq!(job.attempts_made, 0);

    let claimed = QueueJobRepo::claim_next(&pool, "file-processing")
        .await
        .unwrap()
        .expect("entry should be claimable");
    assert_eq!(claimed.id, job.id);
    assert_eq!(claimed.status_id, QueueJobStatus::Running.id());
    assert_eq!(claimed.attempts_made, 1);

    // Nothing else to claim while the entry is running.
    assert!(QueueJobRepo::claim_next(&pool, "file-processing")
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn queues_are_isolated(pool: PgPool) {
    let payload = serde_json::json!({});
    QueueJobRepo::enqueue(&pool, "reconciliation", &payload, &immediate_retry(1))
        .await
        .unwrap();

    assert!(QueueJobRepo::claim_next(&pool, "file-processing")
        .await
        .unwrap()
        .is_none());
    assert!(QueueJobRepo::claim_next(&pool, "reconciliation")
        .await
        .unwrap()
        .is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn failed_attempt_is_rescheduled_then_goes_terminal(pool: PgPool) {
    let payload = serde_json::json!({});
    let job = QueueJobRepo::enqueue(&pool, "file-processing", &payload, &immediate_retry(2))
        .await
        .unwrap();

    // Attempt 1 fails: rescheduled as Retrying.
    QueueJobRepo::claim_next(&pool, "file-processing").await.unwrap().unwrap();
    let after_first = QueueJobRepo::fail(&pool, job.id, "decode error").await.unwrap();
    assert_eq!(after_first.status_id, QueueJobStatus::Retrying.id());
    assert_eq!(after_first.error_message.as_deref(), Some("decode error"));

    // Attempt 2 fails: attempts exhausted, terminal Failed.
    let second = QueueJobRepo::claim_next(&pool, "file-processing")
        .await
        .unwrap()
        .expect("retry should be claimable with zero backoff");
    assert_eq!(second.attempts_made, 2);
    let after_second = QueueJobRepo::fail(&pool, job.id, "decode error again").await.unwrap();
    assert_eq!(after_second.status_id, QueueJobStatus::Failed.id());
    assert!(after_second.completed_at.is_some());

    assert!(QueueJobRepo::claim_next(&pool, "file-processing")
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn backoff_delay_defers_the_retry(pool: PgPool) {
    let payload = serde_json::json!({});
    let options = EnqueueOptions {
        max_attempts: 3,
        backoff: Backoff::Exponential { delay_ms: 60_000 },
        keep_completed: 10,
        keep_failed: 10,
    };
    let job = QueueJobRepo::enqueue(&pool, "file-processing", &payload, &options)
        .await
        .unwrap();

    QueueJobRepo::claim_next(&pool, "file-processing").await.unwrap().unwrap();
    let failed = QueueJobRepo::fail(&pool, job.id, "transient").await.unwrap();
    assert_eq!(failed.status_id, QueueJobStatus::Retrying.id());
    assert!(failed.run_at > failed.created_at);

    // Not claimable until the backoff window elapses.
    assert!(QueueJobRepo::claim_next(&pool, "file-processing")
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn completed_history_is_pruned_to_cap(pool: PgPool) {
    let payload = serde_json::json!({});
    for _ in 0..5 {
        let job = QueueJobRepo::enqueue(&pool, "file-processing", &payload, &immediate_retry(1))
            .await
            .unwrap();
        QueueJobRepo::claim_next(&pool, "file-processing").await.unwrap().unwrap();
        QueueJobRepo::complete(&pool, job.id, &serde_json::json!({"ok": true}))
            .await
            .unwrap();
    }

    let pruned = QueueJobRepo::prune_history(&pool, "file-processing", 2, 10)
        .await
        .unwrap();
    assert_eq!(pruned, 3);

    let remaining: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)::BIGINT FROM queue_jobs WHERE queue = 'file-processing'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(remaining, 2);
}
