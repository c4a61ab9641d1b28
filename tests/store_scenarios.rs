// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios against the public `Store` API and real temp
//! files, covering the concrete walkthroughs this store's durability
//! model is built around.

use pagekv::Store;
use tempfile::tempdir;

#[test]
fn empty_then_single_insert_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db.pk");

    let mut store = Store::open(&path).unwrap();
    assert_eq!(store.get(b"hello").unwrap(), None);
    store.set(b"hello", b"world").unwrap();
    store.close().unwrap();

    let store = Store::open(&path).unwrap();
    assert_eq!(store.get(b"hello").unwrap(), Some(b"world".to_vec()));
}

#[test]
fn two_inserts_and_an_overwrite() {
    let dir = tempdir().unwrap();
    let mut store = Store::open(dir.path().join("db.pk")).unwrap();

    store.set(b"a", b"1").unwrap();
    store.set(b"b", b"2").unwrap();
    store.set(b"a", b"3").unwrap();

    assert_eq!(store.get(b"a").unwrap(), Some(b"3".to_vec()));
    assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
    assert_eq!(store.get(b"c").unwrap(), None);
}

#[test]
fn bulk_insert_triggers_splits_and_every_key_is_still_queryable() {
    let dir = tempdir().unwrap();
    let mut store = Store::open(dir.path().join("db.pk")).unwrap();

    let mut keys: Vec<u32> = (0..1000).collect();
    // A fixed but non-sorted permutation: insertion order independent of
    // key order is the case that actually exercises mid-tree splits.
    keys.sort_by_key(|k| k.wrapping_mul(2654435761));

    let value = vec![b'x'; 1000];
    for &k in &keys {
        let key = format!("{:08}", k);
        store.set(key.as_bytes(), &value).unwrap();
    }
    for &k in &keys {
        let key = format!("{:08}", k);
        assert_eq!(store.get(key.as_bytes()).unwrap(), Some(value.clone()));
    }
}

#[test]
fn deleting_down_to_an_underfull_leaf_triggers_a_merge() {
    let dir = tempdir().unwrap();
    let mut store = Store::open(dir.path().join("db.pk")).unwrap();

    // Big enough values that a modest number of entries overflows a
    // single leaf and forces a split into (at least) two siblings.
    let value = vec![b'v'; 1500];
    let keys: Vec<String> = (0..40).map(|i| format!("key-{:04}", i)).collect();
    for k in &keys {
        store.set(k.as_bytes(), &value).unwrap();
    }

    // Delete most of the keys; the remaining handful should end up
    // consolidated back into fewer, non-underfull nodes, and every
    // surviving key must still resolve correctly.
    for k in keys.iter().take(35) {
        assert!(store.delete(k.as_bytes()).unwrap());
    }
    for k in keys.iter().take(35) {
        assert_eq!(store.get(k.as_bytes()).unwrap(), None);
    }
    for k in keys.iter().skip(35) {
        assert_eq!(store.get(k.as_bytes()).unwrap(), Some(value.clone()));
    }
}

#[test]
fn idempotent_delete_returns_false_on_second_call() {
    let dir = tempdir().unwrap();
    let mut store = Store::open(dir.path().join("db.pk")).unwrap();
    store.set(b"k", b"v").unwrap();
    assert!(store.delete(b"k").unwrap());
    assert!(!store.delete(b"k").unwrap());
}

#[test]
fn opening_a_file_with_a_bad_signature_is_a_fatal_format_error() {
    use std::io::Write;
    let dir = tempdir().unwrap();
    let path = dir.path().join("db.pk");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(&[0xEE; 4096])
        .unwrap();
    assert!(Store::open(&path).is_err());
}

#[test]
fn oversized_key_and_value_are_rejected_without_mutating_the_store() {
    let dir = tempdir().unwrap();
    let mut store = Store::open(dir.path().join("db.pk")).unwrap();
    store.set(b"k", b"v").unwrap();

    let big_key = vec![b'k'; pagekv::BTREE_MAX_KEY_SIZE + 1];
    assert!(store.set(&big_key, b"v").is_err());
    let big_val = vec![b'v'; pagekv::BTREE_MAX_VAL_SIZE + 1];
    assert!(store.set(b"other", &big_val).is_err());

    // The earlier, valid write must be unaffected by the rejected ones.
    assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    assert_eq!(store.get(b"other").unwrap(), None);
}

#[test]
fn empty_key_coexists_with_the_internal_sentinel() {
    let dir = tempdir().unwrap();
    let mut store = Store::open(dir.path().join("db.pk")).unwrap();
    store.set(b"", b"root-value").unwrap();
    store.set(b"mid", b"mid-value").unwrap();
    assert_eq!(store.get(b"").unwrap(), Some(b"root-value".to_vec()));
    assert_eq!(store.get(b"mid").unwrap(), Some(b"mid-value".to_vec()));
}

#[test]
fn get_of_empty_key_is_none_when_the_user_never_set_it() {
    let dir = tempdir().unwrap();
    let mut store = Store::open(dir.path().join("db.pk")).unwrap();
    store.set(b"a", b"1").unwrap();
    assert_eq!(store.get(b"").unwrap(), None);
}

#[test]
fn empty_key_presence_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db.pk");

    let mut store = Store::open(&path).unwrap();
    store.set(b"", b"root-value").unwrap();
    store.close().unwrap();

    let mut store = Store::open(&path).unwrap();
    assert_eq!(store.get(b"").unwrap(), Some(b"root-value".to_vec()));

    store.delete(b"").unwrap();
    store.close().unwrap();

    let store = Store::open(&path).unwrap();
    assert_eq!(store.get(b"").unwrap(), None);
}

#[test]
fn deleting_empty_key_does_not_strand_smaller_later_inserts() {
    let dir = tempdir().unwrap();
    let mut store = Store::open(dir.path().join("db.pk")).unwrap();

    store.set(b"", b"v").unwrap();
    store.set(b"b", b"v2").unwrap();
    assert!(store.delete(b"").unwrap());
    store.set(b"a", b"v3").unwrap();

    assert_eq!(store.get(b"").unwrap(), None);
    assert_eq!(store.get(b"a").unwrap(), Some(b"v3".to_vec()));
    assert_eq!(store.get(b"b").unwrap(), Some(b"v2".to_vec()));
}
