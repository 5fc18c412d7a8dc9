
use crate::metadata_store::{InMemoryMetadataStore, ShardDescriptor};
use chrono::{TimeZone, Utc};
use object_store::path::Path as ObjectPath;
use object_store::{memory::InMemory, ObjectStore};
use std::sync::Arc;

/// Descriptor with a deterministic creation time derived from `age_rank`
/// (0 = newest), so default newest-first ordering matches ascending rank.
pub(crate) fn descriptor(
    source: &str,
    file_name: &str,
    row_count: u64,
    age_rank: u32,
    search_keys: &[&str],
) -> ShardDescriptor {
    ShardDescriptor {
        source_name: source.to_string(),
        file_name: file_name.to_string(),
        row_count,
        search_keys: search_keys.iter().map(|k| k.to_string()).collect(),
        created_at: Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
            - chrono::Duration::hours(age_rank as i64),
    }
}

/// Seed a metadata store with descriptors.
pub(crate) async fn seeded_store(descriptors: Vec<ShardDescriptor>) -> Arc<InMemoryMetadataStore> {
    let store = Arc::new(InMemoryMetadataStore::new());
    for d in descriptors {
        store.insert(d).await;
    }
    store
}

/// Build a shard file whose rows are `(url, text)` pairs.
pub(crate) fn shard_csv(rows: &[(&str, &str)]) -> Vec<u8> {
    let mut csv = String::from("url,text\n");
    for (url, text) in rows {
        csv.push_str(url);
        csv.push(',');
        csv.push_str(text);
        csv.push('\n');
    }
    csv.into_bytes()
}

/// In-memory object store preloaded with shard files under `prefix`.
pub(crate) async fn seeded_object_store(
    prefix: &str,
    shards: &[(&str, Vec<u8>)],
) -> Arc<dyn ObjectStore> {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    for (file_name, bytes) in shards {
        store
            .put(
                &ObjectPath::from(format!("{prefix}{file_name}")),
                bytes.clone().into(),
            )
            .await
            .expect("seeding in-memory shard");
    }
    store
}
