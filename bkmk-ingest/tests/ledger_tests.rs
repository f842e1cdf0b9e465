//! Ledger integration tests
//!
//! Claim contention, crash recovery across reopen, legacy databases and the
//! weekly aggregates.

mod helpers;

use bkmk_common::db::{init_database, DatabaseOptions};
use bkmk_ingest::db::{format_timestamp, Ledger, DIGEST_WINDOW_DAYS, HIGHLIGHT_LIMIT};
use bkmk_ingest::models::{ItemState, RecordPayload, TriageDecision, ValueTier};
use chrono::{Duration, Utc};
use helpers::{analysis_with, create_test_ledger, item, set_processed_at};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::TempDir;
use tokio::task::JoinSet;

async fn commit_analyzed(ledger: &Ledger, id: &str, category: &str, score: u8, tags: &[&str]) {
    let payload = RecordPayload {
        item: item(id),
        triage: TriageDecision::analyze_only(ValueTier::Medium),
        analysis: Some(analysis_with(category, score, tags)),
        skipped: false,
    };
    assert!(ledger.try_claim(id).await.unwrap());
    ledger
        .commit(id, ItemState::Completed, Some(category), None, &payload)
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_have_one_winner() {
    let (_dir, ledger) = create_test_ledger().await;

    let mut set = JoinSet::new();
    for _ in 0..8 {
        let ledger = ledger.clone();
        set.spawn(async move { ledger.try_claim("contested").await.unwrap() });
    }

    let mut winners = 0;
    while let Some(result) = set.join_next().await {
        if result.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let record = ledger.get("contested").await.unwrap().unwrap();
    assert_eq!(record.status, Some(ItemState::Processing));
}

#[tokio::test]
async fn test_failed_item_is_retried_then_handled() {
    let (_dir, ledger) = create_test_ledger().await;

    assert!(!ledger.is_handled("A").await.unwrap());
    assert!(ledger.try_claim("A").await.unwrap());
    ledger.release("A", ItemState::Failed).await.unwrap();
    assert!(!ledger.is_handled("A").await.unwrap());

    // Next pass picks it up again
    assert!(ledger.try_claim("A").await.unwrap());
    let payload = RecordPayload {
        item: item("A"),
        triage: TriageDecision::analyze_only(ValueTier::High),
        analysis: Some(analysis_with("rust", 7, &["async"])),
        skipped: false,
    };
    ledger
        .commit("A", ItemState::Completed, Some("rust"), Some("page-A"), &payload)
        .await
        .unwrap();

    assert!(ledger.is_handled("A").await.unwrap());
    assert!(!ledger.try_claim("A").await.unwrap());

    let record = ledger.get("A").await.unwrap().unwrap();
    assert_eq!(record.category.as_deref(), Some("rust"));
    assert_eq!(record.destination_ref.as_deref(), Some("page-A"));
    let decoded = record.decoded_payload().unwrap();
    assert_eq!(decoded.item.id, "A");
    assert_eq!(decoded.analysis.unwrap().tags, vec!["async".to_string()]);
}

#[tokio::test]
async fn test_claim_survives_restart_and_is_recovered() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bkmk.db");

    {
        let pool = init_database(&db_path, &DatabaseOptions::default())
            .await
            .unwrap();
        let ledger = Ledger::new(pool.clone());
        assert!(ledger.try_claim("in-flight").await.unwrap());
        pool.close().await;
    }

    let pool = init_database(&db_path, &DatabaseOptions::default())
        .await
        .unwrap();
    let ledger = Ledger::new(pool);

    // Fresh claim from the dead process still blocks
    assert!(!ledger.try_claim("in-flight").await.unwrap());

    assert_eq!(ledger.recover_abandoned_claims().await.unwrap(), 1);
    let record = ledger.get("in-flight").await.unwrap().unwrap();
    assert_eq!(record.status, Some(ItemState::Failed));
    assert!(ledger.try_claim("in-flight").await.unwrap());
}

#[tokio::test]
async fn test_legacy_rows_count_as_handled() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bkmk.db");

    {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE processed_items (item_id TEXT PRIMARY KEY, processed_at TEXT NOT NULL, category TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO processed_items VALUES ('legacy-1', ?, 'tools')")
            .bind(format_timestamp(Utc::now() - Duration::days(1)))
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;
    }

    let pool = init_database(&db_path, &DatabaseOptions::default())
        .await
        .unwrap();
    let ledger = Ledger::new(pool);

    let record = ledger.get("legacy-1").await.unwrap().unwrap();
    assert_eq!(record.status, None);
    assert!(record.is_handled());
    assert!(ledger.is_handled("legacy-1").await.unwrap());
    assert!(!ledger.try_claim("legacy-1").await.unwrap());
    assert_eq!(ledger.handled_count().await.unwrap(), 1);

    // Counted in the window under its category, without tags or highlights
    let weekly = ledger
        .weekly_stats(Utc::now() - Duration::days(DIGEST_WINDOW_DAYS))
        .await
        .unwrap();
    assert_eq!(weekly.total, 1);
    assert_eq!(weekly.by_category.get("tools"), Some(&1));
    assert!(weekly.top_tags.is_empty());
    assert!(weekly.highlights.is_empty());
}

#[tokio::test]
async fn test_weekly_stats_window_and_aggregates() {
    let (_dir, ledger) = create_test_ledger().await;

    commit_analyzed(&ledger, "w1", "rust", 9, &["async", "tokio"]).await;
    commit_analyzed(&ledger, "w2", "rust", 5, &["async"]).await;
    commit_analyzed(&ledger, "w3", "ai", 8, &["llm"]).await;
    commit_analyzed(&ledger, "old", "ai", 10, &["llm", "async"]).await;
    set_processed_at(
        &ledger,
        "old",
        &format_timestamp(Utc::now() - Duration::days(DIGEST_WINDOW_DAYS + 3)),
    )
    .await;

    // Claimed and failed rows are never part of the digest
    assert!(ledger.try_claim("pending").await.unwrap());
    assert!(ledger.try_claim("broken").await.unwrap());
    ledger.release("broken", ItemState::Failed).await.unwrap();

    let weekly = ledger
        .weekly_stats(Utc::now() - Duration::days(DIGEST_WINDOW_DAYS))
        .await
        .unwrap();

    assert_eq!(weekly.total, 3);
    assert_eq!(weekly.by_category.get("rust"), Some(&2));
    assert_eq!(weekly.by_category.get("ai"), Some(&1));

    assert_eq!(weekly.top_tags[0].tag, "async");
    assert_eq!(weekly.top_tags[0].count, 2);
    let tags: Vec<&str> = weekly.top_tags.iter().map(|t| t.tag.as_str()).collect();
    assert_eq!(tags, vec!["async", "llm", "tokio"]);

    let highlight_ids: Vec<&str> = weekly.highlights.iter().map(|h| h.item_id.as_str()).collect();
    assert_eq!(highlight_ids, vec!["w1", "w3"]);
    assert_eq!(weekly.highlights[0].relevance_score, 9);
    assert_eq!(
        weekly.highlights[0].url.as_deref(),
        Some("https://x.com/ferris/status/w1")
    );

    // All-time stats see every row
    let all_time = ledger.stats().await.unwrap();
    assert_eq!(all_time.total, 6);
}

#[tokio::test]
async fn test_highlights_are_capped() {
    let (_dir, ledger) = create_test_ledger().await;

    for i in 0..(HIGHLIGHT_LIMIT + 3) {
        commit_analyzed(&ledger, &format!("h{:02}", i), "rust", 9, &[]).await;
    }

    let weekly = ledger
        .weekly_stats(Utc::now() - Duration::days(DIGEST_WINDOW_DAYS))
        .await
        .unwrap();
    assert_eq!(weekly.total, (HIGHLIGHT_LIMIT + 3) as u64);
    assert_eq!(weekly.highlights.len(), HIGHLIGHT_LIMIT);
}

#[tokio::test]
async fn test_malformed_payload_still_counted() {
    let (_dir, ledger) = create_test_ledger().await;

    commit_analyzed(&ledger, "good", "rust", 8, &["async"]).await;
    sqlx::query(
        "INSERT INTO processed_items (item_id, status, processed_at, category, payload) VALUES (?, 'completed', ?, 'misc', 'not json')",
    )
    .bind("garbled")
    .bind(format_timestamp(Utc::now()))
    .execute(ledger.pool())
    .await
    .unwrap();

    let weekly = ledger
        .weekly_stats(Utc::now() - Duration::days(DIGEST_WINDOW_DAYS))
        .await
        .unwrap();
    assert_eq!(weekly.total, 2);
    assert_eq!(weekly.by_category.get("misc"), Some(&1));
    assert_eq!(weekly.highlights.len(), 1);
}
