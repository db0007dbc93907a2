use sqlx::PgPool;

/// Full bootstrap test: connect, migrate, verify schema.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_full_bootstrap(pool: PgPool) {
    // Health check
    tally_db::health_check(&pool).await.unwrap();

    // Verify both lookup tables exist and have seed data
    let tables = ["upload_job_statuses", "queue_job_statuses"];

    for table in tables {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("{table} query failed: {e}"));
        assert_eq!(count.0, 5, "{table} should have 5 seed rows");
    }
}

/// Verify every entity table exists.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_entity_tables_exist(pool: PgPool) {
    let tables = [
        "upload_jobs",
        "records",
        "matching_rules",
        "reconciliation_results",
        "audit_logs",
        "queue_jobs",
    ];

    for table in tables {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("{table} query failed: {e}"));
        assert_eq!(count.0, 0, "{table} should exist and start empty");
    }
}
