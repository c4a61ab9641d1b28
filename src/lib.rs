// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! pagekv — an embedded, single-file, copy-on-write key/value store.
//!
//! A B+ tree of fixed 4096-byte pages lives inside one memory-mapped
//! file. Every write builds replacement pages along the path from the
//! root instead of mutating pages in place, and a single meta page
//! commits a transaction by publishing a new root after the rest of the
//! transaction's pages are durable.
//!
//! ## Quick Start
//!
//! ```rust
//! use pagekv::Store;
//!
//! # fn main() -> Result<(), pagekv::StoreError> {
//! let dir = tempfile::tempdir().unwrap();
//! let mut store = Store::open(dir.path().join("example.pk"))?;
//! store.set(b"hello", b"world")?;
//! assert_eq!(store.get(b"hello")?, Some(b"world".to_vec()));
//! store.delete(b"hello")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **btree**: the raw page codec and the copy-on-write B+ tree engine
//!   built on it, parameterised over a [`btree::Pages`] seam so it can be
//!   tested independently of any real file.
//! - **freelist**: a persistent FIFO of reclaimed page numbers, so
//!   deleted pages get reused instead of growing the file forever.
//! - **pager**: owns the file descriptor and its growing memory-mapped
//!   regions, and the raw allocate/read/overwrite primitives everything
//!   else is built on.
//! - **meta**: the single page that makes a transaction durable.
//! - **store**: the public `Open`/`Close`/`Get`/`Set`/`Del` façade, and
//!   the commit coordinator tying the pieces above together.

pub mod btree;
pub mod error;
pub mod freelist;
pub mod meta;
pub mod pager;
pub mod store;

pub use btree::{BTree, NodeType, Pages, BTREE_MAX_KEY_SIZE, BTREE_MAX_VAL_SIZE, PAGE_SIZE};
pub use error::{StoreError, StoreResult};
pub use freelist::FreeList;
pub use meta::Meta;
pub use pager::{FaultPoint, PageManager, PagerOptions};
pub use store::Store;
