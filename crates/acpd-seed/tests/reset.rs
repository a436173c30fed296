//! Reset engine tests against a live Postgres. Each test wipes and reseeds
//! the whole schema, so they must not interleave; point DATABASE_URL at a
//! scratch database and run with
//! `cargo test -p acpd-seed -- --ignored --test-threads=1`.

use acpd_seed::{reset_to_baseline, Baseline, RESET_DELETE_ORDER};
use acpd_store::{connect, run_migrations, StoreConfig, StoreError};
use sqlx::PgPool;

async fn scratch_pool() -> PgPool {
    let config = StoreConfig::from_env().expect("DATABASE_URL must point at a scratch database");
    let pool = connect(&config).await.expect("connecting to scratch database");
    run_migrations(&pool).await.expect("applying migrations");
    pool
}

async fn table_count(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .expect("counting rows")
}

#[tokio::test]
#[ignore]
async fn reset_is_idempotent() {
    let pool = scratch_pool().await;
    let baseline = Baseline::builtin().unwrap();

    let first = reset_to_baseline(&pool, &baseline).await.unwrap();
    let counts_after_first: Vec<i64> = {
        let mut counts = Vec::new();
        for table in RESET_DELETE_ORDER {
            counts.push(table_count(&pool, table).await);
        }
        counts
    };

    let second = reset_to_baseline(&pool, &baseline).await.unwrap();
    let counts_after_second: Vec<i64> = {
        let mut counts = Vec::new();
        for table in RESET_DELETE_ORDER {
            counts.push(table_count(&pool, table).await);
        }
        counts
    };

    assert_eq!(counts_after_first, counts_after_second);
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.periods_created, second.periods_created);
    assert_eq!(first.categories_created, second.categories_created);
}

#[tokio::test]
#[ignore]
async fn reset_populates_every_table() {
    let pool = scratch_pool().await;
    let baseline = Baseline::builtin().unwrap();
    let summary = reset_to_baseline(&pool, &baseline).await.unwrap();

    assert_eq!(summary.periods_created, 3);
    assert_eq!(summary.categories_created, 30);
    assert_eq!(summary.metrics_created, 15);
    assert_eq!(summary.opportunities_created, 24);
    assert_eq!(summary.recommendations_created, 6);
    assert_eq!(summary.kpis_created, 12);
    assert!(summary.drilldown_rows_created > 0);

    for table in RESET_DELETE_ORDER {
        assert!(
            table_count(&pool, table).await > 0,
            "{table} should not be empty after a reset"
        );
    }
}

#[tokio::test]
#[ignore]
async fn reset_leaves_one_active_period() {
    let pool = scratch_pool().await;
    let baseline = Baseline::builtin().unwrap();
    reset_to_baseline(&pool, &baseline).await.unwrap();

    let active: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM performance_periods WHERE is_active")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(active, 1);

    let key: String =
        sqlx::query_scalar("SELECT period_key FROM performance_periods WHERE is_active")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(key, "ytd");
}

#[tokio::test]
#[ignore]
async fn interleaved_reset_sweeps_abort_on_restrict_keys() {
    let pool = scratch_pool().await;
    let baseline = Baseline::builtin().unwrap();
    reset_to_baseline(&pool, &baseline).await.unwrap();

    // The front of the delete order, held open mid-sweep. Each statement in
    // READ COMMITTED takes a fresh snapshot, so rows committed after the
    // child sweep survive it and still reference their parent.
    let mut tx = pool.begin().await.unwrap();
    sqlx::query("DELETE FROM program_resources")
        .execute(&mut *tx)
        .await
        .unwrap();
    sqlx::query("DELETE FROM recommendation_cost_categories")
        .execute(&mut *tx)
        .await
        .unwrap();

    // A competing writer commits a recommendation with a resource while the
    // sweep above is in flight.
    let late_id: i64 = sqlx::query_scalar(
        "INSERT INTO recommendations (title, priority)
         VALUES ('Expand home-based palliative care referrals', 'low')
         RETURNING id",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO program_resources (recommendation_id, resource_type, title, content)
         VALUES ($1, 'best_practice', 'Referral triggers', 'Flag eligible members at discharge.')",
    )
    .bind(late_id)
    .execute(&pool)
    .await
    .unwrap();

    // The parent sweep sees the late row, whose child survived the earlier
    // sweep, so the RESTRICT key fails the whole reset instead of letting it
    // merge with the competing write.
    let err = sqlx::query("DELETE FROM recommendations")
        .execute(&mut *tx)
        .await
        .expect_err("parent sweep must trip the foreign key");
    assert!(matches!(
        StoreError::from(err),
        StoreError::ReferentialIntegrity(_)
    ));
    tx.rollback().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn seeded_recommendations_start_not_started() {
    let pool = scratch_pool().await;
    let baseline = Baseline::builtin().unwrap();
    reset_to_baseline(&pool, &baseline).await.unwrap();

    let other: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM recommendations WHERE status <> 'not_started'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(other, 0);

    let changed: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM recommendations WHERE status_changed_at IS NOT NULL",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(changed, 0);
}
