//! End-to-end scenarios through `DataService`, against in-memory stores.
//!
//! Each test uses its own source name: object stores are resolved through
//! the process-wide bucket cache, which tests in one binary share.

use crate::credit_gate::{CreditGate, InMemoryCreditGate, UnmeteredGate};
use crate::error::AccessError;
use crate::metadata_store::{InMemoryMetadataStore, MetadataStore, ShardDescriptor};
use crate::utils::object_store_cache::install_memory_bucket;
use crate::{DataService, PageRequest, PagerConfig};
use chrono::{TimeZone, Utc};
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::sync::Arc;
use std::time::Duration;

fn descriptor(source: &str, file_name: &str, row_count: u64, age_rank: u32) -> ShardDescriptor {
    ShardDescriptor {
        source_name: source.to_string(),
        file_name: file_name.to_string(),
        row_count,
        search_keys: vec![],
        created_at: Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
            - chrono::Duration::hours(age_rank as i64),
    }
}

/// Shard rows numbered `first..=last`, each with a distinct URL.
fn numbered_csv(first: u64, last: u64) -> String {
    let mut csv = String::from("id,url,text\n");
    for n in first..=last {
        csv.push_str(&format!("row-{n},https://example.com/{n},text {n}\n"));
    }
    csv
}

/// Service over fresh in-memory stores, bucket wired into the cache.
async fn service_for(
    source: &str,
    shards: &[(&str, String)],
    descriptors: Vec<ShardDescriptor>,
) -> (DataService, Arc<InMemoryMetadataStore>, Arc<dyn ObjectStore>) {
    let metadata = Arc::new(InMemoryMetadataStore::new());
    for d in descriptors {
        metadata.insert(d).await;
    }

    let config = PagerConfig {
        min_unsearched_row_count: 0,
        ..PagerConfig::default()
    };
    let objects = install_memory_bucket(&config.bucket_for(source));
    for (file_name, csv) in shards {
        objects
            .put(
                &ObjectPath::from(format!("{source}/{file_name}")),
                csv.as_bytes().to_vec().into(),
            )
            .await
            .expect("seeding shard");
    }

    let service = DataService::with_config(
        Arc::clone(&metadata) as Arc<dyn MetadataStore>,
        Arc::new(UnmeteredGate),
        config,
    );
    (service, metadata, objects)
}

/// Poll until the detached repair task has deleted a descriptor.
async fn wait_for_descriptor_removal(metadata: &InMemoryMetadataStore, source: &str, file: &str) {
    for _ in 0..100 {
        if metadata.get(source, file).await.is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("descriptor '{file}' was never cleaned up");
}

#[tokio::test]
async fn first_page_reads_only_the_shards_it_needs() {
    let source = "feeds";
    let (service, metadata, objects) = service_for(
        source,
        &[
            ("one.csv", numbered_csv(1, 50)),
            ("hollow.csv", String::from("id,url,text\n")),
            ("three.csv", numbered_csv(51, 100)),
        ],
        vec![
            descriptor(source, "one.csv", 50, 0),
            descriptor(source, "hollow.csv", 0, 1),
            descriptor(source, "three.csv", 50, 2),
        ],
    )
    .await;

    let response = service
        .get_page(&PageRequest::latest(source, 1, 30), "any")
        .await
        .unwrap();

    // Thirty rows, contiguous index run from 1, out of the first shard only.
    assert_eq!(response.data.len(), 30);
    assert_eq!(response.data.first().map(|r| r.index), Some(1));
    assert_eq!(response.data.last().map(|r| r.index), Some(30));
    assert_eq!(response.files_read, 1);
    assert_eq!(
        response.data[0].url.as_deref(),
        Some("https://example.com/1")
    );

    // The zero-row shard is cleaned up in the background.
    wait_for_descriptor_removal(metadata.as_ref(), source, "hollow.csv").await;
    let gone = objects
        .get(&ObjectPath::from(format!("{source}/hollow.csv")))
        .await;
    assert!(matches!(gone, Err(object_store::Error::NotFound { .. })));
}

#[tokio::test]
async fn later_pages_continue_the_index_run_across_shards() {
    let source = "social";
    let (service, _metadata, _objects) = service_for(
        source,
        &[
            ("one.csv", numbered_csv(1, 40)),
            ("two.csv", numbered_csv(41, 80)),
        ],
        vec![
            descriptor(source, "one.csv", 40, 0),
            descriptor(source, "two.csv", 40, 1),
        ],
    )
    .await;

    let response = service
        .get_page(&PageRequest::latest(source, 2, 30), "any")
        .await
        .unwrap();

    assert_eq!(response.data.first().map(|r| r.index), Some(31));
    assert_eq!(response.data.last().map(|r| r.index), Some(60));
    // Page 2 straddles the shard boundary at row 40.
    assert_eq!(response.files_read, 2);
    assert_eq!(
        response.data.last().and_then(|r| r.url.clone()).as_deref(),
        Some("https://example.com/60")
    );
}

#[tokio::test]
async fn cross_shard_duplicate_collapses_and_backfills() {
    let source = "mirrored";
    // two.csv starts by repeating the last URL of one.csv.
    let mut two = String::from("id,url,text\n");
    two.push_str("row-5x,https://example.com/5,copy\n");
    two.push_str("row-6,https://example.com/6,text 6\n");
    two.push_str("row-7,https://example.com/7,text 7\n");

    let (service, _metadata, _objects) = service_for(
        source,
        &[("one.csv", numbered_csv(1, 5)), ("two.csv", two)],
        vec![
            descriptor(source, "one.csv", 5, 0),
            descriptor(source, "two.csv", 3, 1),
        ],
    )
    .await;

    let response = service
        .get_page(&PageRequest::latest(source, 1, 7), "any")
        .await
        .unwrap();

    // One copy of /5 survives; the backfill cycle pulled /7 into the page.
    let urls: Vec<_> = response
        .data
        .iter()
        .filter_map(|r| r.url.as_deref())
        .collect();
    let expected: Vec<String> = (1..=7).map(|n| format!("https://example.com/{n}")).collect();
    assert_eq!(urls, expected.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(response.data.last().map(|r| r.index), Some(7));
}

#[tokio::test]
async fn intra_shard_duplicate_triggers_a_background_rewrite() {
    let source = "selfdup";
    let mut two = String::from("id,url,text\n");
    two.push_str("row-5x,https://example.com/5,copy\n");
    two.push_str("row-6,https://example.com/6,text 6\n");
    two.push_str("row-6x,https://example.com/6,copy\n");

    let (service, metadata, objects) = service_for(
        source,
        &[("one.csv", numbered_csv(1, 5)), ("two.csv", two)],
        vec![
            descriptor(source, "one.csv", 5, 0),
            descriptor(source, "two.csv", 3, 1),
        ],
    )
    .await;

    let response = service
        .get_page(&PageRequest::latest(source, 1, 8), "any")
        .await
        .unwrap();

    // Six unique rows exist; both flagged duplicates came from two.csv.
    assert_eq!(response.data.len(), 6);

    // The rewrite only removes duplicates within the shard itself, so the
    // repeat of /6 goes while the cross-shard copy of /5 stays.
    for _ in 0..100 {
        if metadata.get(source, "two.csv").await.unwrap().row_count == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(metadata.get(source, "two.csv").await.unwrap().row_count, 2);
    let rewritten = objects
        .get(&ObjectPath::from(format!("{source}/two.csv")))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let body = std::str::from_utf8(&rewritten).unwrap();
    assert_eq!(body.matches("https://example.com/6").count(), 1);
    assert_eq!(body.matches("https://example.com/5").count(), 1);
}

#[tokio::test]
async fn short_final_page_at_end_of_data() {
    let source = "shortfinal";
    let (service, _metadata, _objects) = service_for(
        source,
        &[("one.csv", numbered_csv(1, 45))],
        vec![descriptor(source, "one.csv", 45, 0)],
    )
    .await;

    let response = service
        .get_page(&PageRequest::latest(source, 5, 10), "any")
        .await
        .unwrap();

    // Rows 41..=45 exist; the page runs short without erroring.
    assert_eq!(response.data.len(), 5);
    assert_eq!(response.data.first().map(|r| r.index), Some(41));
    assert_eq!(response.data.last().map(|r| r.index), Some(45));
}

#[tokio::test]
async fn page_past_the_end_of_data_is_empty() {
    let source = "pastend";
    let (service, _metadata, _objects) = service_for(
        source,
        &[("one.csv", numbered_csv(1, 10))],
        vec![descriptor(source, "one.csv", 10, 0)],
    )
    .await;

    let response = service
        .get_page(&PageRequest::latest(source, 3, 10), "any")
        .await
        .unwrap();

    assert!(response.data.is_empty());
    assert_eq!(response.files_read, 0);
}

#[tokio::test]
async fn gate_refusal_withholds_the_page() {
    let source = "gated";
    let metadata = Arc::new(InMemoryMetadataStore::new());
    metadata.insert(descriptor(source, "one.csv", 3, 0)).await;

    let config = PagerConfig {
        min_unsearched_row_count: 0,
        ..PagerConfig::default()
    };
    let objects = install_memory_bucket(&config.bucket_for(source));
    objects
        .put(
            &ObjectPath::from(format!("{source}/one.csv")),
            numbered_csv(1, 3).into_bytes().into(),
        )
        .await
        .unwrap();

    let gate = Arc::new(InMemoryCreditGate::new());
    gate.issue("metered-key", 2);
    let service = DataService::with_config(
        Arc::clone(&metadata) as Arc<dyn MetadataStore>,
        Arc::clone(&gate) as Arc<dyn CreditGate>,
        config,
    );
    let request = PageRequest::latest(source, 1, 3);

    assert!(service.get_page(&request, "metered-key").await.is_ok());
    assert!(service.get_page(&request, "metered-key").await.is_ok());
    assert_eq!(gate.remaining("metered-key"), Some(0));

    let exhausted = service.get_page(&request, "metered-key").await.unwrap_err();
    assert!(matches!(exhausted, AccessError::CreditGate(_)));

    let unknown = service.get_page(&request, "no-such-key").await.unwrap_err();
    assert!(matches!(unknown, AccessError::CreditGate(_)));
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_any_store_access() {
    let service = DataService::new(
        Arc::new(InMemoryMetadataStore::new()),
        Arc::new(UnmeteredGate),
    );

    let mut zero_size = PageRequest::latest("unwired", 1, 0);
    assert!(matches!(
        service.get_page(&zero_size, "any").await.unwrap_err(),
        AccessError::InvalidQuery(_)
    ));

    zero_size.page_size = 10;
    zero_size.page_number = 0;
    assert!(matches!(
        service.get_page(&zero_size, "any").await.unwrap_err(),
        AccessError::InvalidQuery(_)
    ));

    // A key that decoded to the empty string (an unencoded '#' upstream).
    zero_size.page_number = 1;
    zero_size.search_key = Some(String::new());
    assert!(matches!(
        service.get_page(&zero_size, "any").await.unwrap_err(),
        AccessError::InvalidQuery(_)
    ));
}
