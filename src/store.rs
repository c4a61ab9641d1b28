// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The public façade: `Open`, `Close`, `Get`, `Set`, `Del`.
//!
//! Every mutation goes through the same commit coordinator — unlike a
//! prior revision of this protocol, `Del` is not allowed to bypass the
//! revert-on-failure path that `Set` uses. A commit is:
//!
//! 1. Write every pending/staged-overwrite data page and `fsync`.
//! 2. Rewrite the meta page in place (new root, new page count, the free
//!    list's cursors as of just before this transaction) and `fsync` again.
//! 3. Advance the free list's `max_seq`, making this transaction's frees
//!    poppable by a future one.
//!
//! If step 1 fails, the page manager is marked `failed` and the in-memory
//! tree and free list revert to the last durable snapshot; the next
//! commit heals by rewriting the meta page before making further
//! progress.

use std::fs::File;
use std::path::Path;

use crate::btree::tree::BTree;
use crate::error::StoreResult;
use crate::meta::Meta;
use crate::pager::{FaultPoint, PageManager, PagerOptions};

/// An open, single-file, copy-on-write key/value store.
pub struct Store {
    pager: PageManager,
    meta: Meta,
    tree: BTree,
}

fn fsync_parent_dir(path: &Path) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

impl Store {
    /// Opens `path`, creating it (and initializing a fresh meta page) if
    /// it does not already exist.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_options(path, PagerOptions::default())
    }

    pub fn open_with_options(path: impl AsRef<Path>, options: PagerOptions) -> StoreResult<Self> {
        let path = path.as_ref();
        let is_new = path
            .metadata()
            .map(|metadata| metadata.len() == 0)
            .unwrap_or(true);

        let mut pager = PageManager::open(path, options)?;

        let meta = if is_new {
            let meta = Meta::new_empty();
            pager.core_mut().write_meta_page(&meta.to_bytes())?;
            pager.core_mut().sync()?;
            fsync_parent_dir(path)?;
            log::info!("initialized new store at {}", path.display());
            meta
        } else {
            let raw = pager.core().read_meta_page()?;
            let meta = Meta::from_bytes(&raw)?;
            log::info!(
                "opened existing store at {} (root={}, page_used={})",
                path.display(),
                meta.root,
                meta.page_used
            );
            meta
        };

        pager.core_mut().set_flushed(meta.page_used);
        pager.free_list = meta.free_list;
        let tree = BTree::with_empty_key_flag(meta.root, meta.empty_key_present);

        Ok(Store { pager, meta, tree })
    }

    /// Flushes and fsyncs once more. Not strictly required — every commit
    /// already fsyncs twice — but gives callers an explicit point to
    /// confirm the store is quiescent before dropping it.
    pub fn close(mut self) -> StoreResult<()> {
        self.pager.core_mut().sync()
    }

    /// Arms a one-shot fault at `point`, so the next matching commit step
    /// fails instead of succeeding. Test-only; never called in production
    /// code, and hidden from generated docs.
    #[doc(hidden)]
    pub fn inject_fault(&mut self, point: FaultPoint) {
        self.pager.core_mut().inject_fault(point);
    }

    /// Looks up `key`. Returns `None` if it is not present.
    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.tree.get(&self.pager, key)
    }

    /// Inserts or overwrites `key` with `value`.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.heal_if_needed()?;
        let snapshot = self.meta;
        let result = self
            .tree
            .insert(&mut self.pager, key, value)
            .and_then(|()| self.commit());
        if let Err(err) = result {
            self.revert(snapshot);
            return Err(err);
        }
        Ok(())
    }

    /// Removes `key`. Returns `true` if it was present.
    pub fn delete(&mut self, key: &[u8]) -> StoreResult<bool> {
        self.heal_if_needed()?;
        let snapshot = self.meta;
        let result = self
            .tree
            .delete(&mut self.pager, key)
            .and_then(|existed| self.commit().map(|()| existed));
        match result {
            Ok(existed) => Ok(existed),
            Err(err) => {
                self.revert(snapshot);
                Err(err)
            }
        }
    }

    fn heal_if_needed(&mut self) -> StoreResult<()> {
        if self.pager.core().failed {
            log::warn!("previous commit failed mid-flight; re-publishing last durable meta");
            self.pager.core_mut().write_meta_page(&self.meta.to_bytes())?;
            self.pager.core_mut().sync_at(FaultPoint::MetaSync)?;
            self.pager.core_mut().failed = false;
        }
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        let new_flushed = self.pager.core_mut().flush_data_pages()?;
        self.pager.core_mut().set_flushed(new_flushed);

        let meta = Meta {
            root: self.tree.root,
            page_used: new_flushed,
            free_list: self.pager.free_list,
            empty_key_present: self.tree.has_empty_key,
        };
        if let Err(err) = self.pager.core_mut().write_meta_page(&meta.to_bytes()) {
            self.pager.core_mut().failed = true;
            return Err(err);
        }
        if let Err(err) = self.pager.core_mut().sync_at(FaultPoint::MetaSync) {
            self.pager.core_mut().failed = true;
            return Err(err);
        }

        self.pager.free_list.set_max_seq();
        self.meta = Meta {
            free_list: self.pager.free_list,
            ..meta
        };
        log::debug!(
            "committed: root={}, page_used={}, free_list={:?}",
            self.meta.root,
            self.meta.page_used,
            self.meta.free_list
        );
        Ok(())
    }

    fn revert(&mut self, snapshot: Meta) {
        log::warn!(
            "operation failed before commit; reverting in-memory state to root={}",
            snapshot.root
        );
        self.pager.core_mut().discard_uncommitted();
        // A failure between the data-page flush and the meta rewrite can
        // have already advanced the in-memory `flushed` counter past what
        // the (unwritten) meta page still claims; pin it back so a later
        // successful commit doesn't orphan the now-invisible pages it
        // skips over.
        self.pager.core_mut().set_flushed(snapshot.page_used);
        self.pager.free_list = snapshot.free_list;
        self.tree = BTree::with_empty_key_flag(snapshot.root, snapshot.empty_key_present);
        self.meta = snapshot;
    }
}
