//! PostgreSQL store tests. They run only when `HARVEST_TEST_PG_URL` points at
//! a disposable database; otherwise they return immediately.

use std::sync::Arc;

use chrono::{Duration, Utc};
use harvest_core::config::PostgresConfig;
use harvest_core::{CloneOutcome, OutcomeStore, TaskSource};
use harvest_storage::PgStore;

async fn connect() -> Option<Arc<PgStore>> {
    let url = std::env::var("HARVEST_TEST_PG_URL").ok()?;
    let config = PostgresConfig {
        url: Some(url),
        host: "localhost".into(),
        port: 5432,
        database: "harvest_test".into(),
        username: None,
        password: None,
        ssl_mode: "prefer".into(),
        max_connections: 2,
    };
    let store = PgStore::connect(&config).await.unwrap();
    store.migrate().await.unwrap();
    sqlx::query("TRUNCATE all_gitlinks, git_files, git_metrics")
        .execute(store.pool())
        .await
        .unwrap();
    Some(Arc::new(store))
}

fn outcome(link: &str, success: bool, days_ago: i64) -> CloneOutcome {
    CloneOutcome {
        link: link.to_string(),
        file_path: "example.com/1/a/a/b".to_string(),
        success,
        message: (!success).then(|| "git exited with exit status: 128".to_string()),
        update_time: Utc::now() - Duration::days(days_ago),
        take_time_ms: 42,
        take_storage: success.then_some(1024),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn ranking_and_upserts_follow_clone_history() {
    let Some(store) = connect().await else {
        return;
    };
    let links: Vec<String> = [
        "https://example.com/a/new",
        "https://example.com/a/failed",
        "https://example.com/a/ok",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    assert_eq!(store.add_links(&links).await.unwrap(), 3);
    assert_eq!(store.add_links(&links).await.unwrap(), 0);

    let s = Arc::clone(&store);
    tokio::task::spawn_blocking(move || {
        s.record_clone(&outcome("https://example.com/a/failed", false, 10)).unwrap();
        s.record_clone(&outcome("https://example.com/a/ok", true, 1)).unwrap();

        let ranked = s.query(10).unwrap();
        assert_eq!(ranked, vec!["https://example.com/a/new", "https://example.com/a/failed"]);

        s.record_clone(&outcome("https://example.com/a/failed", false, 0)).unwrap();
        let record = s.clone_record("https://example.com/a/failed").unwrap().unwrap();
        assert_eq!(record.failed_times, 2);
        assert!(!record.success);

        s.record_clone(&outcome("https://example.com/a/failed", true, 0)).unwrap();
        let record = s.clone_record("https://example.com/a/failed").unwrap().unwrap();
        assert_eq!(record.failed_times, 0);
        assert!(record.last_success.is_some());
        assert_eq!(record.take_storage, Some(1024));
    })
    .await
    .unwrap();
}
