use sqlx::PgPool;

/// Connect, migrate, verify the import schema exists.
#[sqlx::test(migrations = "./migrations")]
async fn test_full_bootstrap(pool: PgPool) {
    leadimport_db::health_check(&pool).await.unwrap();

    let tables = ["users", "leads", "import_jobs", "import_rows", "lead_history"];

    for table in tables {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("{table} query failed: {e}"));
        assert_eq!(count.0, 0, "{table} should start empty");
    }
}
