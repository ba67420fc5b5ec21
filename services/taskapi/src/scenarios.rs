use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use chrono::Utc;
use faults::{
    CachedReport, CancellationToken, LatencyInjector, LatencyPolicy, ReportCache, ReportMetadata,
    UnboundedReportCache, allocate, churn, memory,
};
use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    api::{
        BatchExportItem, BatchExportRequest, BatchExportResponse, CacheCleared, CacheStatsResponse,
        GenerateReportRequest, GeneratedReport, PressureResult, ReportDetail, ReportExportResponse,
        ReportListing, ReportLookup, ReportMissing, SearchResponse, SearchStats, StressResponse,
        TaskExportResponse,
    },
    profile::{DateRange, PressureLimits, PressureProfile, ReportKind, clamp_count, clamp_mb},
    search::{CATEGORIES, SearchCorpus, page_of},
};

const COMPLETED: &str = "completed";
pub const MAX_SEARCH_PAGE_SIZE: usize = 100;

/// Runs the named pressure scenarios on top of the fault primitives. All
/// state is internally synchronized, so one engine is shared by every worker.
pub struct PressureEngine {
    profile: PressureProfile,
    limits: PressureLimits,
    reports: Box<dyn ReportCache>,
    search_latency: LatencyInjector,
    batch_delay: LatencyPolicy,
    corpus: SearchCorpus,
    cancel: CancellationToken,
    scenario_sequence: AtomicU64,
    report_sequence: AtomicU64,
    metrics: PressureMetrics,
}

impl PressureEngine {
    pub fn new(profile: PressureProfile, limits: PressureLimits) -> Self {
        let batch_delay = profile
            .batch_item_delay()
            .map(|delay| LatencyPolicy::probabilistic_only(delay.chance_percent, delay.window))
            .unwrap_or_default();
        Self {
            profile,
            limits,
            reports: Box::new(UnboundedReportCache::new()),
            search_latency: LatencyInjector::new(profile.search_latency()),
            batch_delay,
            corpus: SearchCorpus::seeded(),
            cancel: CancellationToken::new(),
            scenario_sequence: AtomicU64::new(0),
            report_sequence: AtomicU64::new(0),
            metrics: PressureMetrics::default(),
        }
    }

    pub fn with_report_cache(mut self, reports: Box<dyn ReportCache>) -> Self {
        self.reports = reports;
        self
    }

    pub fn with_search_latency(mut self, policy: LatencyPolicy) -> Self {
        self.search_latency = LatencyInjector::new(policy);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn profile(&self) -> PressureProfile {
        self.profile
    }

    pub fn limits(&self) -> PressureLimits {
        self.limits
    }

    /// Token that interrupts in-flight injected delays.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn metrics(&self) -> PressureMetricsSnapshot {
        let cache = self.reports.stats();
        PressureMetricsSnapshot {
            task_exports: self.metrics.task_exports.load(Ordering::Relaxed),
            report_exports: self.metrics.report_exports.load(Ordering::Relaxed),
            batch_exports: self.metrics.batch_exports.load(Ordering::Relaxed),
            stress_runs: self.metrics.stress_runs.load(Ordering::Relaxed),
            reports_generated: self.metrics.reports_generated.load(Ordering::Relaxed),
            searches: self.metrics.searches.load(Ordering::Relaxed),
            allocated_mb_total: self.metrics.allocated_mb_total.load(Ordering::Relaxed),
            clamped_requests: self.metrics.clamped_requests.load(Ordering::Relaxed),
            injected_delays: self.metrics.injected_delays.load(Ordering::Relaxed),
            injected_delay_ms_total: self.metrics.injected_delay_ms_total.load(Ordering::Relaxed),
            interrupted_delays: self.metrics.interrupted_delays.load(Ordering::Relaxed),
            cache_clears: self.metrics.cache_clears.load(Ordering::Relaxed),
            cache_entries: cache.entries as u64,
            cache_bytes: cache.total_bytes,
        }
    }

    pub fn export_tasks(&self, format: &str, records: i64) -> TaskExportResponse {
        let started = Instant::now();
        let (size_mb, clamped) =
            clamp_mb(self.profile.task_export_mb(records), self.limits.max_export_mb);
        self.observe_clamp("export-tasks", clamped, size_mb);
        let checksum = churn(size_mb);
        debug!(size_mb, checksum, "task export buffer processed");
        let processing_time_ms = elapsed_ms(started);
        self.metrics.task_exports.fetch_add(1, Ordering::Relaxed);
        TaskExportResponse {
            format: format.to_string(),
            records,
            data_size_mb: size_mb,
            processing_time_ms,
            export_id: format!("EXP-{}", short_uuid()),
            clamped,
            result: self.finish("export-tasks", u64::from(size_mb), processing_time_ms),
        }
    }

    pub fn export_reports(&self, format: &str, date_range: &str) -> ReportExportResponse {
        let started = Instant::now();
        let requested = self
            .profile
            .report_export_mb(DateRange::parse_lenient(date_range));
        let (size_mb, clamped) = clamp_mb(i64::from(requested), self.limits.max_export_mb);
        self.observe_clamp("export-reports", clamped, size_mb);
        let checksum = churn(size_mb);
        debug!(size_mb, checksum, "report export buffer processed");
        let processing_time_ms = elapsed_ms(started);
        self.metrics.report_exports.fetch_add(1, Ordering::Relaxed);
        ReportExportResponse {
            format: format.to_string(),
            date_range: date_range.to_string(),
            data_size_mb: size_mb,
            processing_time_ms,
            clamped,
            result: self.finish("export-reports", u64::from(size_mb), processing_time_ms),
        }
    }

    /// One buffer per requested type, each released before the next one is
    /// allocated. The type list is truncated to the configured ceiling.
    pub fn batch_export(&self, request: BatchExportRequest) -> BatchExportResponse {
        let started = Instant::now();
        let mut clamped = request.types.len() > self.limits.max_batch_types;
        if clamped {
            warn!(
                requested = request.types.len(),
                ceiling = self.limits.max_batch_types,
                "batch export type list truncated"
            );
        }
        let mut rng = rand::thread_rng();
        let mut exports = Vec::new();
        let mut total_size_mb = 0u64;
        let mut injected_delay_ms = 0u64;
        let mut interrupted = false;
        for (index, export_type) in request
            .types
            .into_iter()
            .take(self.limits.max_batch_types)
            .enumerate()
        {
            let requested = rng.gen_range(self.profile.batch_item_mb());
            let (size_mb, item_clamped) =
                clamp_mb(i64::from(requested), self.limits.max_batch_item_mb);
            clamped |= item_clamped;
            churn(size_mb);
            total_size_mb += u64::from(size_mb);

            let planned = self.batch_delay.plan(index as u64 + 1, &mut rng);
            let outcome = self.cancel.sleep(planned.duration);
            if !planned.duration.is_zero() {
                self.observe_delay(outcome.slept.as_millis() as u64, outcome.interrupted);
            }
            injected_delay_ms += outcome.slept.as_millis() as u64;
            interrupted |= outcome.interrupted;

            exports.push(BatchExportItem {
                export_id: format!(
                    "BATCH-{}-{}-{}",
                    export_type.to_uppercase(),
                    unix_timestamp_millis(),
                    index + 1
                ),
                export_type,
                size_mb,
                delay_ms: outcome.slept.as_millis() as u64,
            });
        }
        if clamped {
            self.metrics.clamped_requests.fetch_add(1, Ordering::Relaxed);
        }
        let processing_time_ms = elapsed_ms(started);
        self.metrics.batch_exports.fetch_add(1, Ordering::Relaxed);
        BatchExportResponse {
            exports,
            total_size_mb,
            processing_time_ms,
            injected_delay_ms,
            interrupted,
            clamped,
            result: self.finish("export-batch", total_size_mb, processing_time_ms),
        }
    }

    pub fn stress(&self, size_mb: Option<i64>, iterations: Option<i64>) -> StressResponse {
        let started = Instant::now();
        let (default_size, default_iterations) = self.profile.stress_defaults();
        let (size_mb, size_clamped) =
            clamp_mb(size_mb.unwrap_or(default_size), self.limits.max_stress_mb);
        let (iterations, iterations_clamped) = clamp_count(
            iterations.unwrap_or(default_iterations),
            self.limits.max_stress_iterations,
        );
        let clamped = size_clamped || iterations_clamped;
        self.observe_clamp("export-stress", clamped, size_mb);
        for _ in 0..iterations {
            churn(size_mb);
        }
        let total_allocated_mb = u64::from(size_mb) * u64::from(iterations);
        let processing_time_ms = elapsed_ms(started);
        self.metrics.stress_runs.fetch_add(1, Ordering::Relaxed);
        let result = self.finish("export-stress", total_allocated_mb, processing_time_ms);
        StressResponse {
            size_mb,
            iterations,
            total_allocated_mb,
            processing_time_ms,
            current_heap_used_mb: result.heap_used_mb,
            clamped,
            result,
        }
    }

    /// Allocates the report payload and parks it in the report cache, where
    /// it stays until the cache is cleared.
    pub fn generate_report(&self, request: GenerateReportRequest) -> GeneratedReport {
        let started = Instant::now();
        let kind = ReportKind::parse_lenient(&request.report_type);
        let (size_mb, clamped) = clamp_mb(
            i64::from(self.profile.report_mb(kind)),
            self.limits.max_report_mb,
        );
        self.observe_clamp("report-generate", clamped, size_mb);
        let sequence = self.report_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let report_id = format!("RPT-{}-{sequence}", short_uuid());
        let created_at = Utc::now();
        self.reports.put(CachedReport {
            id: report_id.clone(),
            payload: allocate(size_mb),
            metadata: ReportMetadata {
                report_type: request.report_type.clone(),
                date_range: request.date_range.clone(),
                size_mb,
                created_at,
            },
        });
        self.metrics.reports_generated.fetch_add(1, Ordering::Relaxed);
        let cache = self.reports.stats();
        info!(
            report_id = %report_id,
            size_mb,
            cached_reports = cache.entries,
            cache_size_mb = cache.total_size_mb(),
            "report cached"
        );
        GeneratedReport {
            report_id,
            report_type: request.report_type,
            date_range: request.date_range,
            size_mb,
            data_size_mb: size_mb,
            created_at,
            clamped,
            result: self.finish("report-generate", u64::from(size_mb), elapsed_ms(started)),
        }
    }

    pub fn list_reports(&self) -> Vec<ReportListing> {
        self.reports
            .list()
            .into_iter()
            .map(|summary| ReportListing {
                report_id: summary.id,
                report_type: summary.metadata.report_type,
                date_range: summary.metadata.date_range,
                size_mb: summary.metadata.size_mb,
                created_at: summary.metadata.created_at,
            })
            .collect()
    }

    pub fn report_detail(&self, report_id: &str) -> ReportLookup {
        match self.reports.get(report_id) {
            Some(report) => ReportLookup::Found(ReportDetail {
                report_id: report.id.clone(),
                report_type: report.metadata.report_type.clone(),
                date_range: report.metadata.date_range.clone(),
                size_mb: report.metadata.size_mb,
                size_bytes: report.payload.len(),
                created_at: report.metadata.created_at,
            }),
            None => ReportLookup::Missing(ReportMissing {
                report_id: report_id.to_string(),
                exists: false,
            }),
        }
    }

    pub fn cache_stats(&self) -> CacheStatsResponse {
        let cache = self.reports.stats();
        let memory = memory::sample();
        CacheStatsResponse {
            cached_reports: cache.entries,
            cache_size_mb: cache.total_size_mb(),
            heap_used_mb: memory.used_mb(),
            heap_max_mb: memory.max_mb(),
            heap_usage_percent: memory.usage_percent(),
        }
    }

    pub fn clear_cache(&self) -> CacheCleared {
        let cleared_reports = self.reports.clear();
        self.metrics.cache_clears.fetch_add(1, Ordering::Relaxed);
        info!(cleared_reports, "report cache cleared");
        CacheCleared {
            cleared_reports,
            message: "Cache cleared, memory released",
        }
    }

    /// Static-corpus search behind the latency injector. `page` is clamped
    /// to at least 1 and `size` to `1..=MAX_SEARCH_PAGE_SIZE`.
    pub fn search(&self, query: &str, page: usize, size: usize) -> SearchResponse {
        let started = Instant::now();
        let page = page.max(1);
        let size = size.clamp(1, MAX_SEARCH_PAGE_SIZE);
        let delay = self.search_latency.inject(&self.cancel);
        if !delay.planned.is_zero() {
            self.observe_delay(delay.slept_ms(), delay.interrupted);
        }
        let hits = self.corpus.matching(query);
        let results = page_of(&hits, page, size)
            .into_iter()
            .cloned()
            .collect();
        self.metrics.searches.fetch_add(1, Ordering::Relaxed);
        let result = self.finish("search", 0, elapsed_ms(started));
        SearchResponse {
            query: query.to_string(),
            page,
            size,
            total: hits.len(),
            results,
            took_ms: started.elapsed().as_millis() as u64,
            injected_delay_ms: delay.slept_ms(),
            delay_source: delay.source.label(),
            call_sequence: delay.sequence,
            interrupted: delay.interrupted,
            result,
        }
    }

    pub fn suggest(&self, prefix: &str) -> Vec<&'static str> {
        self.corpus.suggest(prefix)
    }

    pub fn search_stats(&self) -> SearchStats {
        SearchStats {
            total_documents: self.corpus.len(),
            categories: CATEGORIES.to_vec(),
            search_calls: self.search_latency.calls_observed(),
        }
    }

    fn finish(&self, scenario: &str, allocated_mb: u64, elapsed_ms: u64) -> PressureResult {
        let sequence = self.scenario_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.metrics
            .allocated_mb_total
            .fetch_add(allocated_mb, Ordering::Relaxed);
        let heap_used_mb = memory::sample().used_mb();
        info!(
            scenario,
            sequence,
            allocated_mb,
            elapsed_ms,
            heap_used_mb,
            profile = self.profile.as_str(),
            "pressure scenario completed"
        );
        PressureResult {
            scenario_id: format!("{scenario}-{sequence}"),
            allocated_mb,
            elapsed_ms,
            heap_used_mb,
            status: COMPLETED,
        }
    }

    fn observe_clamp(&self, scenario: &str, clamped: bool, size_mb: u32) {
        if clamped {
            self.metrics.clamped_requests.fetch_add(1, Ordering::Relaxed);
            warn!(scenario, size_mb, "request clamped to scenario ceiling");
        }
    }

    fn observe_delay(&self, slept_ms: u64, interrupted: bool) {
        self.metrics.injected_delays.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .injected_delay_ms_total
            .fetch_add(slept_ms, Ordering::Relaxed);
        if interrupted {
            self.metrics
                .interrupted_delays
                .fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Default)]
struct PressureMetrics {
    task_exports: AtomicU64,
    report_exports: AtomicU64,
    batch_exports: AtomicU64,
    stress_runs: AtomicU64,
    reports_generated: AtomicU64,
    searches: AtomicU64,
    allocated_mb_total: AtomicU64,
    clamped_requests: AtomicU64,
    injected_delays: AtomicU64,
    injected_delay_ms_total: AtomicU64,
    interrupted_delays: AtomicU64,
    cache_clears: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PressureMetricsSnapshot {
    pub task_exports: u64,
    pub report_exports: u64,
    pub batch_exports: u64,
    pub stress_runs: u64,
    pub reports_generated: u64,
    pub searches: u64,
    pub allocated_mb_total: u64,
    pub clamped_requests: u64,
    pub injected_delays: u64,
    pub injected_delay_ms_total: u64,
    pub interrupted_delays: u64,
    pub cache_clears: u64,
    pub cache_entries: u64,
    pub cache_bytes: u64,
}

/// Whole milliseconds, rounded up so any measurable work reports at least 1.
fn elapsed_ms(started: Instant) -> u64 {
    (started.elapsed().as_micros() as u64).div_ceil(1000)
}

fn short_uuid() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

fn unix_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis() as u64)
        .unwrap_or(0)
}
