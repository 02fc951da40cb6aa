//! Process memory footprint from procfs
//!
//! Reads `/proc/self/statm`, whose second field is the resident set size in
//! pages.

use super::{MemoryFootprint, MemoryProbe};
use crate::error::ProbeError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Page size assumed when converting statm pages to bytes
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Memory probe backed by a statm file
pub struct ProcStatmProbe {
    statm_path: PathBuf,
    page_size: u64,
}

impl ProcStatmProbe {
    pub fn new(statm_path: impl Into<PathBuf>) -> Self {
        Self {
            statm_path: statm_path.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    pub async fn is_available(&self) -> bool {
        fs::metadata(&self.statm_path).await.is_ok()
    }
}

/// Parse the resident page count out of statm contents
pub fn parse_statm_resident_pages(path: &Path, content: &str) -> Result<u64, ProbeError> {
    let field = content
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| ProbeError::Parse {
            path: path.to_path_buf(),
            detail: format!("expected at least two fields, got '{}'", content.trim()),
        })?;

    field.parse().map_err(|_| ProbeError::Parse {
        path: path.to_path_buf(),
        detail: format!("resident pages is not an integer: '{field}'"),
    })
}

#[async_trait]
impl MemoryProbe for ProcStatmProbe {
    async fn read_footprint(&self) -> Result<MemoryFootprint> {
        let content = fs::read_to_string(&self.statm_path)
            .await
            .with_context(|| format!("Failed to read {}", self.statm_path.display()))?;
        let pages = parse_statm_resident_pages(&self.statm_path, &content)?;

        // Native code has no managed heap; the whole resident set is native.
        Ok(MemoryFootprint {
            managed_heap_bytes: 0,
            native_heap_bytes: pages * self.page_size,
        })
    }
}
