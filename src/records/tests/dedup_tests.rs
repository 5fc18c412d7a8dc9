use crate::records::{dedup_by_url, Record};

fn record(url: Option<&str>, shard: &str) -> Record {
    Record {
        url: url.map(str::to_string),
        ..Record::empty(shard)
    }
}

#[test]
fn first_occurrence_wins_across_shards() {
    let records = vec![
        record(Some("https://x/1"), "a.csv"),
        record(Some("https://x/2"), "a.csv"),
        record(Some("https://x/1"), "b.csv"),
    ];

    let (kept, duplicates) = dedup_by_url(records);

    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].shard_file, "a.csv");
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].shard_file, "b.csv");
    assert_eq!(duplicates[0].url.as_deref(), Some("https://x/1"));
}

#[test]
fn records_without_url_are_always_kept() {
    let records = vec![
        record(None, "a.csv"),
        record(None, "a.csv"),
        record(Some("https://x/1"), "b.csv"),
    ];

    let (kept, duplicates) = dedup_by_url(records);

    assert_eq!(kept.len(), 3);
    assert!(duplicates.is_empty());
}

#[test]
fn dedup_is_idempotent() {
    let records = vec![
        record(Some("https://x/1"), "a.csv"),
        record(Some("https://x/1"), "a.csv"),
        record(Some("https://x/2"), "b.csv"),
    ];

    let (kept, duplicates) = dedup_by_url(records);
    assert_eq!(duplicates.len(), 1);

    let (kept_again, duplicates_again) = dedup_by_url(kept.clone());
    assert_eq!(kept_again, kept);
    assert!(duplicates_again.is_empty());
}

#[test]
fn relative_order_of_survivors_is_preserved() {
    let records = vec![
        record(Some("https://x/3"), "a.csv"),
        record(Some("https://x/1"), "a.csv"),
        record(Some("https://x/3"), "b.csv"),
        record(Some("https://x/2"), "b.csv"),
    ];

    let (kept, _) = dedup_by_url(records);

    let urls: Vec<&str> = kept.iter().filter_map(|r| r.url.as_deref()).collect();
    assert_eq!(urls, vec!["https://x/3", "https://x/1", "https://x/2"]);
}
