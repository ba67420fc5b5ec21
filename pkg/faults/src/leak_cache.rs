use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::buffer::{BYTES_PER_MB, ResourceBuffer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportMetadata {
    pub report_type: String,
    pub date_range: String,
    pub size_mb: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct CachedReport {
    pub id: String,
    pub payload: ResourceBuffer,
    pub metadata: ReportMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSummary {
    pub id: String,
    pub metadata: ReportMetadata,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
}

impl CacheStats {
    pub fn total_size_mb(&self) -> u64 {
        self.total_bytes / BYTES_PER_MB as u64
    }
}

/// Process-lifetime report store. Entries are immutable once inserted;
/// `clear` is the administrative reset.
pub trait ReportCache: Send + Sync {
    fn put(&self, report: CachedReport);
    fn get(&self, id: &str) -> Option<Arc<CachedReport>>;
    fn list(&self) -> Vec<ReportSummary>;
    fn stats(&self) -> CacheStats;
    /// Removes every entry in one step and returns how many were dropped.
    fn clear(&self) -> usize;
}

/// The leak: no capacity, no expiry, nothing ever evicted.
#[derive(Debug, Default)]
pub struct UnboundedReportCache {
    entries: RwLock<HashMap<String, Arc<CachedReport>>>,
}

impl UnboundedReportCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportCache for UnboundedReportCache {
    fn put(&self, report: CachedReport) {
        let id = report.id.clone();
        self.entries.write().insert(id, Arc::new(report));
    }

    fn get(&self, id: &str) -> Option<Arc<CachedReport>> {
        self.entries.read().get(id).cloned()
    }

    fn list(&self) -> Vec<ReportSummary> {
        let entries = self.entries.read();
        sorted_summaries(entries.values())
    }

    fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        stats_of(entries.values())
    }

    fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *self.entries.write());
        // Payloads are released here, after the write lock is gone.
        drained.len()
    }
}

/// FIFO-capped variant with the same contract, for harnesses that need the
/// report endpoints without the unbounded growth.
#[derive(Debug)]
pub struct BoundedReportCache {
    capacity: usize,
    inner: RwLock<BoundedInner>,
}

#[derive(Debug, Default)]
struct BoundedInner {
    entries: HashMap<String, Arc<CachedReport>>,
    insertion_order: VecDeque<String>,
}

impl BoundedReportCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(BoundedInner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl ReportCache for BoundedReportCache {
    fn put(&self, report: CachedReport) {
        let id = report.id.clone();
        let mut inner = self.inner.write();
        if inner.entries.insert(id.clone(), Arc::new(report)).is_none() {
            inner.insertion_order.push_back(id);
        }
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.insertion_order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
    }

    fn get(&self, id: &str) -> Option<Arc<CachedReport>> {
        self.inner.read().entries.get(id).cloned()
    }

    fn list(&self) -> Vec<ReportSummary> {
        let inner = self.inner.read();
        sorted_summaries(inner.entries.values())
    }

    fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        stats_of(inner.entries.values())
    }

    fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *self.inner.write());
        drained.entries.len()
    }
}

fn sorted_summaries<'a>(entries: impl Iterator<Item = &'a Arc<CachedReport>>) -> Vec<ReportSummary> {
    let mut summaries: Vec<ReportSummary> = entries
        .map(|report| ReportSummary {
            id: report.id.clone(),
            metadata: report.metadata.clone(),
        })
        .collect();
    summaries.sort_by(|a, b| {
        a.metadata
            .created_at
            .cmp(&b.metadata.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    summaries
}

fn stats_of<'a>(entries: impl Iterator<Item = &'a Arc<CachedReport>>) -> CacheStats {
    let mut stats = CacheStats::default();
    for report in entries {
        stats.entries += 1;
        stats.total_bytes += report.payload.len() as u64;
    }
    stats
}
