//! CSV export flows, including partial export of a cancelled job.

use std::sync::Arc;
use std::time::Duration;

use rollcall_core::export::{ExportService, CSV_HEADER};
use rollcall_core::harvest::HarvestService;
use rollcall_core::models::Member;
use rollcall_core::progress::SilentReporter;

use super::common::{fast_config, raw, test_channel, MockMemberStore, MockProviderClient};

#[tokio::test]
async fn test_export_channel_writes_all_stored_members() {
    let store = MockMemberStore::new();
    store.seed(Member {
        username: Some("alice".to_string()),
        ..Member::with_id(1)
    });
    store.seed(Member::with_id(2));

    let dir = tempfile::tempdir().unwrap();
    let service = ExportService::new(store);
    let (path, count) = service
        .export_channel(&test_channel(), dir.path())
        .await
        .unwrap();

    assert_eq!(count, 2);
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("members_test_channel_2_"));

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], CSV_HEADER);
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("1,@alice,"));
    assert!(lines[2].starts_with("2,,"));
}

#[tokio::test]
async fn test_cancelled_job_partial_buffer_exports_to_csv() {
    let provider = MockProviderClient {
        full: Arc::new((1..=300).map(raw).collect()),
        page_delay: Duration::from_millis(20),
        ..Default::default()
    };
    let store = MockMemberStore::new();
    let service = Arc::new(HarvestService::with_config(
        provider,
        store.clone(),
        fast_config().with_page_size(10),
    ));
    let registry = service.registry().clone();

    let svc = service.clone();
    let task = tokio::spawn(async move {
        svc.harvest_channel(&test_channel(), 11, &SilentReporter)
            .await
    });
    tokio::time::sleep(Duration::from_millis(60)).await;
    registry.cancel(11);
    let result = task.await.unwrap().unwrap();

    let partial = registry.export_partial(11).unwrap();
    assert_eq!(partial.len(), result.discovered);

    let dir = tempfile::tempdir().unwrap();
    let exporter = ExportService::new(store);
    let path = exporter
        .export_partial(&test_channel(), &partial, dir.path())
        .unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    // Header plus one row per buffered member.
    assert_eq!(text.lines().count(), partial.len() + 1);
}
