// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Error types for the store.
//!
//! Provides structured error handling with detailed context for debugging,
//! mirroring the flat-enum-plus-`Display` convention used throughout this
//! codebase rather than a boxed `dyn Error` or string-typed scheme.

use std::fmt;

/// Standard `Result` type for all store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error types produced by the page codec, B+ tree engine, free list, page
/// manager, and commit coordinator.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// I/O error during file, mmap, or fsync operations.
    IoError { operation: String, reason: String },

    /// The on-disk meta page's signature does not match `META_SIGNATURE`.
    ///
    /// Fatal and non-recoverable: the store refuses to operate on a file it
    /// does not recognise.
    BadSignature { found: String },

    /// A page index was out of the range the caller is permitted to use.
    IndexOutOfRange {
        operation: String,
        index: u32,
        nkeys: u32,
    },

    /// A page number referenced a location beyond every mapped mmap region.
    PageOutOfBounds { ptr: u64, mapped_pages: u64 },

    /// A page's `type` field held neither `NodeType::Internal` nor
    /// `NodeType::Leaf`.
    BadPageType { ptr: u64, raw_type: u16 },

    /// `key` exceeded `BTREE_MAX_KEY_SIZE` or `value` exceeded
    /// `BTREE_MAX_VAL_SIZE`.
    EntryTooLarge {
        key_len: usize,
        val_len: usize,
        max_key: usize,
        max_val: usize,
    },

    /// `nodeSplit3` produced a left-left node still larger than one page.
    ///
    /// Provably impossible if entry size limits are respected; indicates a
    /// bug in the splitting code or a corrupt node.
    SplitOverflow { bytes: usize },

    /// Two siblings being merged held an equal key.
    DuplicateKeyOnMerge { key_len: usize },

    /// A node delete/merge traversal reached a state the engine's own
    /// invariants say is impossible (e.g. a merge candidate with no sibling
    /// and more than one remaining child).
    InvariantViolation { detail: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError { operation, reason } => {
                write!(f, "I/O error during '{}': {}", operation, reason)
            }
            Self::BadSignature { found } => {
                write!(f, "bad meta page signature: {:?}", found)
            }
            Self::IndexOutOfRange {
                operation,
                index,
                nkeys,
            } => {
                write!(
                    f,
                    "index {} out of range during '{}' (nkeys={})",
                    index, operation, nkeys
                )
            }
            Self::PageOutOfBounds { ptr, mapped_pages } => {
                write!(
                    f,
                    "page {} exceeds mapped range of {} pages",
                    ptr, mapped_pages
                )
            }
            Self::BadPageType { ptr, raw_type } => {
                write!(f, "page {} has invalid type tag {}", ptr, raw_type)
            }
            Self::EntryTooLarge {
                key_len,
                val_len,
                max_key,
                max_val,
            } => {
                write!(
                    f,
                    "entry too large: key={}B (max {}B), value={}B (max {}B)",
                    key_len, max_key, val_len, max_val
                )
            }
            Self::SplitOverflow { bytes } => {
                write!(f, "split left node still {} bytes after two splits", bytes)
            }
            Self::DuplicateKeyOnMerge { key_len } => {
                write!(
                    f,
                    "duplicate {}-byte key found across sibling nodes during merge",
                    key_len
                )
            }
            Self::InvariantViolation { detail } => {
                write!(f, "invariant violation: {}", detail)
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::IoError {
            operation: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}
