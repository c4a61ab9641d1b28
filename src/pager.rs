// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The page manager: owns the backing file descriptor and its growing
//! memory-mapped regions, and provides the raw page read/append/overwrite
//! primitives the B+ tree and free list are built on.
//!
//! Pages are never written in place until a commit flushes them. Between
//! commits, freshly allocated pages live in `pending` (addressed by
//! pointers `>= flushed`) and in-place edits to already-durable pages live
//! in `overwrites`, keyed by the page pointer they will eventually
//! replace. [`PageManager::flush`] is the only place either map is
//! written back to the file.

use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::MmapMut;
use std::collections::HashMap;

use crate::btree::page::PAGE_SIZE;
use crate::btree::tree::Pages as TreePages;
use crate::error::{StoreError, StoreResult};
use crate::freelist::{FreeList, RawPages};

/// Initial size of the memory-mapped region, doubled every time the file
/// needs to grow past its current capacity.
const INITIAL_MMAP_SIZE: u64 = 64 * 1024 * 1024;

/// One of the four durability steps of the commit protocol, named so a
/// test harness can interrupt exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// Step 4: writing pending/staged-overwrite pages into the mmap.
    DataWrite,
    /// Step 5: fsyncing the data pages.
    DataSync,
    /// Step 6: rewriting the meta page in place.
    MetaWrite,
    /// Step 7: fsyncing the meta page.
    MetaSync,
}

/// Tunable knobs for [`PageManager::open`].
///
/// Keeps the one real tunable (how aggressively to pre-grow the mmap)
/// behind a validated constructor rather than a bag of public fields, the
/// same way the rest of this codebase shapes small configuration types.
#[derive(Debug, Clone, Copy)]
pub struct PagerOptions {
    initial_mmap_size: u64,
}

impl PagerOptions {
    /// Creates pager options with a custom initial mmap size.
    ///
    /// ## Error Conditions
    /// - `initial_mmap_size` is not a multiple of [`PAGE_SIZE`], or is `0`.
    pub fn new(initial_mmap_size: u64) -> StoreResult<Self> {
        if initial_mmap_size == 0 || initial_mmap_size as usize % PAGE_SIZE != 0 {
            return Err(StoreError::InvariantViolation {
                detail: format!(
                    "initial_mmap_size {} must be a non-zero multiple of PAGE_SIZE",
                    initial_mmap_size
                ),
            });
        }
        Ok(PagerOptions { initial_mmap_size })
    }

    pub fn initial_mmap_size(&self) -> u64 {
        self.initial_mmap_size
    }
}

impl Default for PagerOptions {
    fn default() -> Self {
        PagerOptions {
            initial_mmap_size: INITIAL_MMAP_SIZE,
        }
    }
}

/// The raw file/mmap half of the page manager, holding everything except
/// the free list's own cursor bookkeeping. Split out from [`PageManager`]
/// so free list operations can borrow this and the cursor as two
/// independent fields instead of needing `&mut PageManager` twice over.
pub struct PagerCore {
    file: File,
    mmap: MmapMut,
    mmap_pages: u64,
    options: PagerOptions,
    /// Number of pages considered durable as of the last successful
    /// commit. Pointers `< flushed` live on disk; pointers `>= flushed`
    /// are addressed relative to this via `pending`.
    flushed: u64,
    pending: Vec<Vec<u8>>,
    overwrites: HashMap<u64, Vec<u8>>,
    /// Set when a commit's data-writing phase failed partway through.
    /// The next commit must heal (rewrite + fsync the meta page) before
    /// making further progress; see [`crate::commit`].
    pub failed: bool,
    /// A one-shot fault to raise the next time the matching commit step
    /// runs, for crash-safety tests. `None` in production.
    fault: Option<FaultPoint>,
}

impl PagerCore {
    fn open(path: &Path, options: PagerOptions) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let file_len = file.metadata()?.len();
        let mmap_len = file_len.max(options.initial_mmap_size);
        file.set_len(mmap_len)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        log::debug!(
            "opened page file {:?}: {} bytes mapped, {} bytes on disk",
            path,
            mmap_len,
            file_len
        );

        Ok(PagerCore {
            file,
            mmap,
            mmap_pages: mmap_len / PAGE_SIZE as u64,
            options,
            flushed: (file_len / PAGE_SIZE as u64).max(1),
            pending: Vec::new(),
            overwrites: HashMap::new(),
            failed: false,
            fault: None,
        })
    }

    /// Arms a one-shot fault at `point`; the next commit step that matches
    /// it fails instead of succeeding, and the fault disarms itself.
    /// Exists for crash-safety tests; never called in production.
    #[doc(hidden)]
    pub fn inject_fault(&mut self, point: FaultPoint) {
        self.fault = Some(point);
    }

    fn maybe_fail(&mut self, point: FaultPoint) -> StoreResult<()> {
        if self.fault == Some(point) {
            self.fault = None;
            return Err(StoreError::IoError {
                operation: format!("{:?}", point),
                reason: "injected fault".to_string(),
            });
        }
        Ok(())
    }

    /// Pages considered durable, including page 0 (the meta page).
    pub fn flushed(&self) -> u64 {
        self.flushed
    }

    pub fn set_flushed(&mut self, flushed: u64) {
        self.flushed = flushed;
    }

    fn grow_to(&mut self, min_pages: u64) -> StoreResult<()> {
        if min_pages <= self.mmap_pages {
            return Ok(());
        }
        let mut new_pages = self.mmap_pages.max(1);
        while new_pages < min_pages {
            new_pages *= 2;
        }
        let new_len = new_pages * PAGE_SIZE as u64;
        self.file.set_len(new_len)?;
        self.mmap = unsafe { MmapMut::map_mut(&self.file)? };
        log::info!(
            "grew page file mmap from {} to {} pages",
            self.mmap_pages,
            new_pages
        );
        self.mmap_pages = new_pages;
        Ok(())
    }

    fn page_slice(&self, ptr: u64) -> StoreResult<&[u8]> {
        if ptr >= self.mmap_pages {
            return Err(StoreError::PageOutOfBounds {
                ptr,
                mapped_pages: self.mmap_pages,
            });
        }
        let start = ptr as usize * PAGE_SIZE;
        Ok(&self.mmap[start..start + PAGE_SIZE])
    }

    /// Reads the meta page (page 0) directly from the mmap, bypassing the
    /// pending/overwrite staging (the meta page is never staged — it is
    /// rewritten in place as the dedicated last step of commit).
    pub fn read_meta_page(&self) -> StoreResult<Vec<u8>> {
        Ok(self.page_slice(0)?.to_vec())
    }

    pub fn write_meta_page(&mut self, meta: &[u8]) -> StoreResult<()> {
        self.maybe_fail(FaultPoint::MetaWrite)?;
        self.grow_to(1)?;
        let start = 0usize;
        self.mmap[start..start + meta.len()].copy_from_slice(meta);
        Ok(())
    }

    /// Fsyncs the data region. Callers passing [`FaultPoint::MetaSync`]
    /// are fsyncing after the meta page rewrite; everything else fsyncs
    /// after a data-page write, i.e. [`FaultPoint::DataSync`].
    pub fn sync_at(&mut self, point: FaultPoint) -> StoreResult<()> {
        self.maybe_fail(point)?;
        self.mmap.flush()?;
        Ok(())
    }

    pub fn sync(&mut self) -> StoreResult<()> {
        self.sync_at(FaultPoint::DataSync)
    }

    /// Writes every pending and staged-overwrite page to its slot in the
    /// mmap and fsyncs. Does not touch the meta page. On success, returns
    /// the new `flushed` count (the caller commits it after the meta page
    /// is durably rewritten to point at the new root).
    pub fn flush_data_pages(&mut self) -> StoreResult<u64> {
        let new_flushed = self.flushed + self.pending.len() as u64;
        if let Err(err) = self.grow_to(new_flushed) {
            self.failed = true;
            return Err(err);
        }
        if let Err(err) = self.maybe_fail(FaultPoint::DataWrite) {
            self.failed = true;
            return Err(err);
        }

        for (i, page) in self.pending.iter().enumerate() {
            let ptr = self.flushed + i as u64;
            let start = ptr as usize * PAGE_SIZE;
            self.mmap[start..start + PAGE_SIZE].copy_from_slice(page);
        }
        for (&ptr, page) in self.overwrites.iter() {
            if ptr >= self.mmap_pages {
                self.failed = true;
                return Err(StoreError::PageOutOfBounds {
                    ptr,
                    mapped_pages: self.mmap_pages,
                });
            }
            let start = ptr as usize * PAGE_SIZE;
            self.mmap[start..start + PAGE_SIZE].copy_from_slice(page);
        }

        if let Err(err) = self.sync_at(FaultPoint::DataSync) {
            self.failed = true;
            return Err(err);
        }

        self.pending.clear();
        self.overwrites.clear();
        Ok(new_flushed)
    }

    /// Discards any not-yet-flushed pending/overwrite pages, used when a
    /// commit fails and the in-memory state must revert to the last
    /// durable meta snapshot.
    pub fn discard_uncommitted(&mut self) {
        self.pending.clear();
        self.overwrites.clear();
    }
}

impl RawPages for PagerCore {
    fn read_raw(&self, ptr: u64) -> StoreResult<Vec<u8>> {
        if let Some(page) = self.overwrites.get(&ptr) {
            return Ok(page.clone());
        }
        if ptr >= self.flushed {
            let idx = (ptr - self.flushed) as usize;
            return self
                .pending
                .get(idx)
                .cloned()
                .ok_or(StoreError::PageOutOfBounds {
                    ptr,
                    mapped_pages: self.mmap_pages,
                });
        }
        Ok(self.page_slice(ptr)?.to_vec())
    }

    fn append_raw(&mut self, page: Vec<u8>) -> StoreResult<u64> {
        let ptr = self.flushed + self.pending.len() as u64;
        self.pending.push(page);
        Ok(ptr)
    }

    fn stage_overwrite(&mut self, ptr: u64, page: Vec<u8>) -> StoreResult<()> {
        if ptr >= self.flushed {
            let idx = (ptr - self.flushed) as usize;
            if let Some(slot) = self.pending.get_mut(idx) {
                *slot = page;
                return Ok(());
            }
            return Err(StoreError::PageOutOfBounds {
                ptr,
                mapped_pages: self.mmap_pages,
            });
        }
        self.overwrites.insert(ptr, page);
        Ok(())
    }
}

/// The full page manager: raw page I/O plus the free list that recycles
/// reclaimed pages. Implements [`TreePages`] by routing `free` through
/// the free list's tail and preferring a popped pointer over a fresh
/// append on every `allocate`.
pub struct PageManager {
    pub(crate) core: PagerCore,
    pub free_list: FreeList,
}

impl PageManager {
    pub fn open(path: &Path, options: PagerOptions) -> StoreResult<Self> {
        let core = PagerCore::open(path, options)?;
        Ok(PageManager {
            core,
            free_list: FreeList::default(),
        })
    }

    pub fn core(&self) -> &PagerCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut PagerCore {
        &mut self.core
    }
}

impl TreePages for PageManager {
    fn read(&self, ptr: u64) -> StoreResult<Vec<u8>> {
        self.core.read_raw(ptr)
    }

    fn allocate(&mut self, page: Vec<u8>) -> StoreResult<u64> {
        let popped = self.free_list.pop_head(&mut self.core)?;
        if popped != 0 {
            self.core.stage_overwrite(popped, page)?;
            Ok(popped)
        } else {
            self.core.append_raw(page)
        }
    }

    fn free(&mut self, ptr: u64) -> StoreResult<()> {
        self.free_list.push_tail(&mut self.core, ptr)
    }
}
