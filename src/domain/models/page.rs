//! Pagination and query result types shared by list and search.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::agent::ChainPrefix;

pub const MIN_LIMIT: u32 = 1;
pub const MAX_LIMIT: u32 = 100;
pub const MAX_OFFSET: u32 = 100_000;
pub const DEFAULT_LIMIT: u32 = 20;

/// Requested window into a result set. Values are clamped, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: u32,
    pub offset: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl PageRequest {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }

    /// Clamp `limit` to `[1, 100]` and `offset` to `[0, 100000]`.
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(MIN_LIMIT, MAX_LIMIT),
            offset: self.offset.min(MAX_OFFSET),
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Assemble a page from an already-clamped request.
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let has_more = u64::from(request.offset) + (items.len() as u64) < total;
        Self {
            items,
            total,
            limit: request.limit,
            offset: request.offset,
            has_more,
        }
    }

    pub fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), 0, request)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Filters applied to a free-text search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub chain_prefix: Option<ChainPrefix>,
    pub page: PageRequest,
}

impl SearchFilter {
    pub fn with_chain(mut self, chain_prefix: ChainPrefix) -> Self {
        self.chain_prefix = Some(chain_prefix);
        self
    }

    pub fn with_page(mut self, limit: u32, offset: u32) -> Self {
        self.page = PageRequest::new(limit, offset);
        self
    }
}

/// Snapshot of store occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Physical rows, including expired rows not yet evicted.
    pub total: u64,
    /// Live rows per chain prefix.
    pub by_chain: BTreeMap<ChainPrefix, u64>,
    /// Rows past their expiry that are still on disk.
    pub expired_count: u64,
    /// Database size in bytes.
    pub storage_size: u64,
}
