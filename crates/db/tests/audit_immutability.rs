//! The audit trail is append-only: every UPDATE or DELETE against an
//! existing entry must fail loudly, from any caller.

use sqlx::PgPool;
use tally_core::audit::{AuditAction, AuditEntityType, AuditSource};
use tally_db::models::audit_log::{AuditQuery, CreateAuditLog};
use tally_db::repositories::AuditLogRepo;

fn entry() -> CreateAuditLog {
    CreateAuditLog {
        record_id: None,
        upload_job_id: None,
        action: AuditAction::Upload,
        entity_type: AuditEntityType::UploadJob,
        old_value: None,
        new_value: Some(serde_json::json!({"fileName": "statement.csv"})),
        changed_by: 7,
        source: AuditSource::System,
        ip_address: Some("10.0.0.1".to_string()),
        user_agent: Some("worker".to_string()),
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn insert_and_query_round_trip(pool: PgPool) {
    let inserted = AuditLogRepo::insert(&pool, &entry()).await.unwrap();
    assert_eq!(inserted.action, "UPLOAD");
    assert_eq!(inserted.entity_type, "UploadJob");
    assert_eq!(inserted.source, "SYSTEM");

    let found = AuditLogRepo::query(
        &pool,
        &AuditQuery {
            changed_by: Some(7),
            ..AuditQuery::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, inserted.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn update_of_existing_entry_fails(pool: PgPool) {
    let inserted = AuditLogRepo::insert(&pool, &entry()).await.unwrap();

    let result = sqlx::query("UPDATE audit_logs SET action = 'DELETE' WHERE id = $1")
        .bind(inserted.id)
        .execute(&pool)
        .await;
    let err = result.expect_err("update must be rejected");
    assert!(err.to_string().contains("immutable"), "{err}");

    // The entry is untouched, timestamp included.
    let after = AuditLogRepo::query(&pool, &AuditQuery::default()).await.unwrap();
    assert_eq!(after[0].action, "UPLOAD");
    assert_eq!(after[0].timestamp, inserted.timestamp);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delete_of_existing_entry_fails(pool: PgPool) {
    let inserted = AuditLogRepo::insert(&pool, &entry()).await.unwrap();

    let result = sqlx::query("DELETE FROM audit_logs WHERE id = $1")
        .bind(inserted.id)
        .execute(&pool)
        .await;
    assert!(result.is_err(), "delete must be rejected");

    let count = AuditLogRepo::count(&pool, &AuditQuery::default()).await.unwrap();
    assert_eq!(count, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn timestamp_update_is_rejected(pool: PgPool) {
    let inserted = AuditLogRepo::insert(&pool, &entry()).await.unwrap();

    let result = sqlx::query("UPDATE audit_logs SET timestamp = NOW() WHERE id = $1")
        .bind(inserted.id)
        .execute(&pool)
        .await;
    assert!(result.is_err(), "timestamp must be immutable");
}
