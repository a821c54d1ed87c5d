//! Enrichment pipeline behavior over mocks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rollcall_core::enrich::EnrichmentPipeline;
use rollcall_core::models::Member;
use rollcall_core::progress::SilentReporter;
use tokio_util::sync::CancellationToken;

use super::common::{fast_config, test_channel, MockMemberStore, MockProviderClient};

fn human(id: i64) -> Member {
    Member::with_id(id)
}

fn bot(id: i64) -> Member {
    Member {
        is_bot: true,
        ..Member::with_id(id)
    }
}

#[tokio::test]
async fn test_bots_and_deleted_never_hit_the_detail_path() {
    let provider = MockProviderClient {
        bios: Arc::new(HashMap::from([
            (1, "human bio".to_string()),
            (2, "bot bio".to_string()),
            (3, "ghost bio".to_string()),
        ])),
        ..Default::default()
    };
    let store = MockMemberStore::new();
    store.seed(human(1));
    store.seed(bot(2));
    store.seed(Member {
        is_deleted: true,
        ..Member::with_id(3)
    });

    let pipeline = EnrichmentPipeline::new(provider.clone(), store.clone(), fast_config());
    let report = pipeline
        .enrich(&test_channel(), &CancellationToken::new(), &SilentReporter)
        .await
        .unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(report.enriched, 1);
    assert_eq!(report.skipped, 2);

    assert_eq!(store.get(1).unwrap().bio.as_deref(), Some("human bio"));
    assert!(store.get(2).unwrap().bio.is_none());
    assert!(store.get(3).unwrap().bio.is_none());

    // No detail call was ever issued for the bot or the deleted account.
    let calls = provider.calls.lock().unwrap();
    assert!(!calls.iter().any(|c| c.ends_with(":2") || c.ends_with(":3")));
}

#[tokio::test]
async fn test_only_missing_fields_are_fetched_and_written() {
    let joined = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
    let provider = MockProviderClient {
        bios: Arc::new(HashMap::from([(1, "should not be used".to_string())])),
        join_dates: Arc::new(HashMap::from([(1, joined)])),
        ..Default::default()
    };
    let store = MockMemberStore::new();
    store.seed(Member {
        bio: Some("original".to_string()),
        ..Member::with_id(1)
    });

    let pipeline = EnrichmentPipeline::new(provider.clone(), store.clone(), fast_config());
    let report = pipeline
        .enrich(&test_channel(), &CancellationToken::new(), &SilentReporter)
        .await
        .unwrap();

    assert_eq!(report.enriched, 1);
    let member = store.get(1).unwrap();
    assert_eq!(member.bio.as_deref(), Some("original"));
    assert_eq!(member.joined_at, Some(joined));

    // The bio endpoint was never called for a member that already has one.
    let calls = provider.calls.lock().unwrap();
    assert!(!calls.iter().any(|c| c.starts_with("member_detail")));
    assert!(calls.iter().any(|c| c.starts_with("membership_detail")));
}

#[tokio::test]
async fn test_throttle_surviving_the_retry_skips_the_member() {
    // Member 1 throttles both the initial call and the retry; member 2 is
    // clean. The pipeline pauses, skips member 1, and still enriches 2.
    let provider = MockProviderClient {
        bios: Arc::new(HashMap::from([
            (1, "unreachable".to_string()),
            (2, "reachable".to_string()),
        ])),
        detail_throttles: Arc::new(Mutex::new(HashMap::from([(1i64, 2usize)]))),
        ..Default::default()
    };
    let store = MockMemberStore::new();
    store.seed(human(1));
    store.seed(human(2));

    let pipeline = EnrichmentPipeline::new(provider, store.clone(), fast_config());
    let report = pipeline
        .enrich(&test_channel(), &CancellationToken::new(), &SilentReporter)
        .await
        .unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.enriched, 1);
    assert_eq!(report.skipped, 1);
    assert!(store.get(1).unwrap().bio.is_none());
    assert_eq!(store.get(2).unwrap().bio.as_deref(), Some("reachable"));

    // The skipped member is still in the needing-enrichment view for the
    // next pass.
    let pending = rollcall_core::traits::MemberStore::needing_enrichment(&store, 100)
        .await
        .unwrap();
    assert!(pending.iter().any(|c| c.member_id == 1));
}

#[tokio::test]
async fn test_write_back_failure_skips_only_that_member() {
    let provider = MockProviderClient {
        bios: Arc::new(HashMap::from([
            (1, "lost".to_string()),
            (2, "kept".to_string()),
        ])),
        ..Default::default()
    };
    let store = MockMemberStore::new();
    store.seed(human(1));
    store.seed(human(2));
    store.fail_update_for.lock().unwrap().insert(1);

    let pipeline = EnrichmentPipeline::new(provider, store.clone(), fast_config());
    let report = pipeline
        .enrich(&test_channel(), &CancellationToken::new(), &SilentReporter)
        .await
        .unwrap();

    // The failed write-back skipped member 1; the pass itself survived.
    assert_eq!(report.processed, 2);
    assert_eq!(report.enriched, 1);
    assert_eq!(report.skipped, 1);
    assert!(store.get(1).unwrap().bio.is_none());
    assert_eq!(store.get(2).unwrap().bio.as_deref(), Some("kept"));
}

#[tokio::test]
async fn test_pacing_runs_between_candidates() {
    let provider = MockProviderClient {
        bios: Arc::new(HashMap::from([
            (1, "a".to_string()),
            (2, "b".to_string()),
            (3, "c".to_string()),
        ])),
        ..Default::default()
    };
    let store = MockMemberStore::new();
    for id in 1..=3 {
        store.seed(human(id));
    }

    let config = fast_config().with_pacing(Duration::from_millis(20), Duration::from_millis(20));
    let pipeline = EnrichmentPipeline::new(provider, store, config);

    let start = std::time::Instant::now();
    let report = pipeline
        .enrich(&test_channel(), &CancellationToken::new(), &SilentReporter)
        .await
        .unwrap();

    assert_eq!(report.enriched, 3);
    // Three candidates, one mandatory pacing sleep each.
    assert!(start.elapsed() >= Duration::from_millis(60));
}
