//! Snapshot file layout, atomic replacement and backup restore

use std::io;

use listing_sync::store::{atomic, merge, PersistError, RecordStore};

use crate::support::listing;

#[test]
fn test_file_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("listings.csv");
    let store = RecordStore::new(&path);

    let mut sparse = listing("abc-1");
    sparse.price = None;
    sparse.location = None;
    store.persist(&[sparse.clone(), listing("abc-2")]).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("id,make,model,year,price,mileage,location,url,image_url,scraped_at")
    );
    let first = lines.next().unwrap();
    assert!(first.starts_with("abc-1,Toyota,RAV4 XLE,2022,unknown,12800,unknown,"));
    assert_eq!(lines.count(), 1);

    let loaded = store.load().unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].price, None);
    assert_eq!(loaded[0].location, None);
    assert!(loaded[0].same_content(&sparse));
}

#[test]
fn test_missing_snapshot_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new(dir.path().join("nested").join("listings.csv"));

    assert!(store.load().unwrap().is_empty());
    let metadata = store.metadata().unwrap();
    assert!(!metadata.exists);
    assert_eq!(metadata.rows, 0);
    assert!(!metadata.backup_present);

    // parent directories are created on first write
    store.persist(&[listing("a")]).unwrap();
    assert_eq!(store.metadata().unwrap().rows, 1);
}

#[test]
fn test_failed_write_leaves_primary_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("listings.csv");
    let store = RecordStore::new(&path);
    store.persist(&[listing("a"), listing("b")]).unwrap();
    let before = std::fs::read(&path).unwrap();

    let result = atomic::write_atomically(&path, Some(store.backup_path()), |writer| {
        writer.write_all(b"id,make\nhalf-written")?;
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    });

    assert!(matches!(result, Err(PersistError::Io { .. })));
    assert_eq!(std::fs::read(&path).unwrap(), before);
    assert!(!store.backup_path().exists());

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name != "listings.csv" && name != "listings.csv.lock")
        .collect();
    assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
}

#[test]
fn test_restore_previous_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new(dir.path().join("listings.csv"));

    assert!(matches!(store.restore_backup(), Err(PersistError::NoBackup(_))));

    store.persist(&[listing("a"), listing("b"), listing("c")]).unwrap();
    store.persist(&[listing("a")]).unwrap();
    assert_eq!(store.load().unwrap().len(), 1);
    assert!(store.metadata().unwrap().backup_present);

    assert_eq!(store.restore_backup().unwrap(), 3);
    assert_eq!(store.load().unwrap().len(), 3);
}

#[test]
fn test_corrupt_snapshot_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("listings.csv");
    std::fs::write(
        &path,
        "id,make,model,year,price,mileage,location,url,image_url,scraped_at\nx,Toyota,Camry,not-a-year,1,1,here,https://a/b,unknown,2024-01-01T00:00:00Z\n",
    )
    .unwrap();

    assert!(matches!(
        RecordStore::new(&path).load(),
        Err(PersistError::Csv { .. })
    ));
}

#[test]
fn test_merge_is_last_write_wins_in_first_seen_order() {
    let mut updated_b = listing("b");
    updated_b.price = Some(1);

    let merged = merge(
        vec![listing("a"), listing("b")],
        vec![listing("c"), updated_b.clone(), listing("c")],
    );

    let ids: Vec<&str> = merged.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(merged[1], updated_b);

    // merging the same batch twice changes nothing
    let again = merge(merged.clone(), vec![updated_b]);
    assert_eq!(again, merged);
}

fn by_id(listings: Vec<listing_sync::Listing>) -> std::collections::BTreeMap<String, listing_sync::Listing> {
    listings.into_iter().map(|l| (l.id.clone(), l)).collect()
}

#[test]
fn test_merge_of_disjoint_batches_is_order_independent() {
    let left = vec![listing("a-1"), listing("a-2")];
    let mut right = vec![listing("b-1"), listing("b-2"), listing("b-3")];
    right[1].price = Some(9_999);

    let forward = merge(left.clone(), right.clone());
    let backward = merge(right, left);

    assert_eq!(forward.len(), 5);
    assert_eq!(by_id(forward), by_id(backward));
}

#[test]
fn test_merge_shared_id_takes_the_new_record() {
    let mut old = listing("shared");
    old.price = Some(20_000);
    old.mileage = Some(10_000);
    let mut new = listing("shared");
    new.price = Some(18_500);
    new.mileage = None;

    let existing = vec![listing("e-1"), old, listing("e-2")];
    let incoming = vec![listing("n-1"), new.clone()];
    let merged = merge(existing, incoming.clone());

    let ids: Vec<&str> = merged.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, vec!["e-1", "shared", "e-2", "n-1"]);
    assert_eq!(merged[1], new);

    // merging the same batch again changes nothing
    assert_eq!(merge(merged.clone(), incoming), merged);
}
