// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 clipmenu contributors
//
// The literal end-to-end scenarios a clip store implementation must
// reproduce, plus the invariants they're meant to pin.

mod common;

use clipmenu::hash::hash_bytes;
use clipmenu::{ClipStore, DedupPolicy, IterDir, StoreError};

fn lines(store: &ClipStore, dir: IterDir) -> Vec<String> {
    store.ref_guard().unwrap().iter(dir).map(|s| s.line).collect()
}

#[test]
fn scenario_1_insert_digits_and_iterate_both_directions() {
    let mut store = common::open_store("scenario-1");
    for d in "0123456789".chars() {
        store.add(&d.to_string(), DedupPolicy::KeepAll).unwrap();
    }

    assert_eq!(lines(&store, IterDir::OldestFirst), (0..10).map(|i| i.to_string()).collect::<Vec<_>>());
    assert_eq!(
        lines(&store, IterDir::NewestFirst),
        (0..10).rev().map(|i| i.to_string()).collect::<Vec<_>>()
    );
}

#[test]
fn scenario_2_trim_keeps_newest_three_and_releases_the_rest() {
    let mut store = common::open_store("scenario-2");
    for d in "0123456789".chars() {
        store.add(&d.to_string(), DedupPolicy::KeepAll).unwrap();
    }

    store.trim(IterDir::NewestFirst, 3).unwrap();

    assert_eq!(store.len().unwrap(), 3);
    assert_eq!(lines(&store, IterDir::NewestFirst), vec!["9", "8", "7"]);

    let zero_hash = hash_bytes(b"0");
    let err = store.content_get(zero_hash).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(h) if h == zero_hash));
}

#[test]
fn scenario_3_replace_second_newest_slot() {
    let mut store = common::open_store("scenario-3");
    for d in "0123456789".chars() {
        store.add(&d.to_string(), DedupPolicy::KeepAll).unwrap();
    }

    store.replace(IterDir::NewestFirst, 1, "new").unwrap();

    let expected = ["9", "new", "7", "6", "5", "4", "3", "2", "1", "0"];
    assert_eq!(lines(&store, IterDir::NewestFirst), expected);

    let snip = store
        .ref_guard()
        .unwrap()
        .iter(IterDir::NewestFirst)
        .nth(1)
        .unwrap();
    let content = store.content_get(snip.hash).unwrap();
    assert_eq!(content.as_bytes(), b"new");
}

#[test]
fn scenario_4_keep_all_then_keep_last_dedup_ordering() {
    let mut store = common::open_store("scenario-4");

    store.add("duplicate", DedupPolicy::KeepAll).unwrap();
    store.add("duplicate", DedupPolicy::KeepAll).unwrap();
    assert_eq!(store.len().unwrap(), 2);
    let hashes: Vec<u64> = store.ref_guard().unwrap().iter(IterDir::OldestFirst).map(|s| s.hash).collect();
    assert_eq!(hashes[0], hashes[1]);

    store.add("duplicate", DedupPolicy::KeepLast).unwrap();
    assert_eq!(store.len().unwrap(), 1);

    store.add("A", DedupPolicy::KeepAll).unwrap();
    store.add("duplicate", DedupPolicy::KeepAll).unwrap();
    store.add("B", DedupPolicy::KeepAll).unwrap();
    store.add("duplicate", DedupPolicy::KeepLast).unwrap();

    assert_eq!(store.len().unwrap(), 3);
    assert_eq!(lines(&store, IterDir::NewestFirst), vec!["duplicate", "B", "A"]);
}

#[test]
fn scenario_6_cross_handle_visibility() {
    let (snip_path, content_dir) = common::temp_store_paths("scenario-6");
    let mut store_a = ClipStore::init(common::open_snip_file(&snip_path), content_dir.clone()).unwrap();
    let store_b = ClipStore::init(common::open_snip_file(&snip_path), content_dir).unwrap();

    store_a.add("X", DedupPolicy::KeepAll).unwrap();
    assert_eq!(lines(&store_b, IterDir::OldestFirst), vec!["X"]);

    let mut store_b = store_b;
    store_b.trim(IterDir::NewestFirst, 0).unwrap();
    assert!(store_a.is_empty().unwrap());
}

#[test]
fn content_reference_integrity_after_trim_to_zero() {
    let mut store = common::open_store("content-ref-integrity");
    let hashes: Vec<u64> = ["alpha", "beta", "gamma"]
        .iter()
        .map(|s| store.add(s, DedupPolicy::KeepAll).unwrap())
        .collect();

    store.trim(IterDir::NewestFirst, 0).unwrap();

    assert_eq!(store.len().unwrap(), 0);
    for hash in hashes {
        assert!(matches!(store.content_get(hash).unwrap_err(), StoreError::NotFound(_)));
    }
}

#[test]
fn keep_last_idempotence_matches_direct_hash() {
    let mut store = common::open_store("keep-last-idempotence");
    let mut hash = 0;
    for _ in 0..5 {
        hash = store.add("stable value", DedupPolicy::KeepLast).unwrap();
    }
    assert_eq!(store.len().unwrap(), 1);
    assert_eq!(hash, hash_bytes(b"stable value"));
}
