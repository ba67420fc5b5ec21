use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use store::StoreError;
use thiserror::Error;

use crate::search::SearchDocument;

/// Uniform JSON envelope for every `/api` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            count: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
            count: None,
        }
    }

    pub fn failure_with_data(data: T, message: impl Into<String>) -> Self {
        Self {
            data: Some(data),
            ..Self::failure(message)
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error("Invalid value '{value}' for parameter '{name}'. Expected type: {expected}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("Required parameter '{0}' is not present")]
    MissingParameter(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Endpoint not found: {0}")]
    NotFound(String),
    #[error("Method {0} is not supported for this endpoint")]
    MethodNotAllowed(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidBody(_) | Self::InvalidParameter { .. } | Self::MissingParameter(_) => {
                400
            }
            Self::Store(StoreError::Validation(_)) => 400,
            Self::Store(StoreError::MissingTask(_)) => 404,
            Self::NotFound(_) => 404,
            Self::MethodNotAllowed(_) => 405,
            Self::Internal(_) => 500,
        }
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchExportRequest {
    pub types: Vec<String>,
}

impl Default for BatchExportRequest {
    fn default() -> Self {
        Self {
            types: vec!["tasks".to_string(), "reports".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateReportRequest {
    #[serde(rename = "type")]
    pub report_type: String,
    pub date_range: String,
}

impl Default for GenerateReportRequest {
    fn default() -> Self {
        Self {
            report_type: "summary".to_string(),
            date_range: "last_week".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pressure payloads
// ---------------------------------------------------------------------------

/// Common trailer of every pressure scenario response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PressureResult {
    pub scenario_id: String,
    #[serde(rename = "allocatedMB")]
    pub allocated_mb: u64,
    pub elapsed_ms: u64,
    #[serde(rename = "heapUsedMB")]
    pub heap_used_mb: u64,
    pub status: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExportResponse {
    pub format: String,
    pub records: i64,
    #[serde(rename = "dataSizeMB")]
    pub data_size_mb: u32,
    pub processing_time_ms: u64,
    pub export_id: String,
    pub clamped: bool,
    #[serde(flatten)]
    pub result: PressureResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportExportResponse {
    pub format: String,
    pub date_range: String,
    #[serde(rename = "dataSizeMB")]
    pub data_size_mb: u32,
    pub processing_time_ms: u64,
    pub clamped: bool,
    #[serde(flatten)]
    pub result: PressureResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchExportItem {
    #[serde(rename = "type")]
    pub export_type: String,
    #[serde(rename = "sizeMB")]
    pub size_mb: u32,
    pub export_id: String,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchExportResponse {
    pub exports: Vec<BatchExportItem>,
    #[serde(rename = "totalSizeMB")]
    pub total_size_mb: u64,
    pub processing_time_ms: u64,
    pub injected_delay_ms: u64,
    pub interrupted: bool,
    pub clamped: bool,
    #[serde(flatten)]
    pub result: PressureResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StressResponse {
    #[serde(rename = "sizeMB")]
    pub size_mb: u32,
    pub iterations: u32,
    #[serde(rename = "totalAllocatedMB")]
    pub total_allocated_mb: u64,
    pub processing_time_ms: u64,
    #[serde(rename = "currentHeapUsedMB")]
    pub current_heap_used_mb: u64,
    pub clamped: bool,
    #[serde(flatten)]
    pub result: PressureResult,
}

// ---------------------------------------------------------------------------
// Report cache payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedReport {
    pub report_id: String,
    #[serde(rename = "type")]
    pub report_type: String,
    pub date_range: String,
    #[serde(rename = "sizeMB")]
    pub size_mb: u32,
    #[serde(rename = "dataSizeMB")]
    pub data_size_mb: u32,
    pub created_at: DateTime<Utc>,
    pub clamped: bool,
    #[serde(flatten)]
    pub result: PressureResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportListing {
    pub report_id: String,
    #[serde(rename = "type")]
    pub report_type: String,
    pub date_range: String,
    #[serde(rename = "sizeMB")]
    pub size_mb: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetail {
    pub report_id: String,
    #[serde(rename = "type")]
    pub report_type: String,
    pub date_range: String,
    #[serde(rename = "sizeMB")]
    pub size_mb: u32,
    pub size_bytes: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMissing {
    pub report_id: String,
    pub exists: bool,
}

/// Outcome of a report lookup. A miss is a normal answer, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportLookup {
    Found(ReportDetail),
    Missing(ReportMissing),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsResponse {
    pub cached_reports: usize,
    #[serde(rename = "cacheSizeMB")]
    pub cache_size_mb: u64,
    #[serde(rename = "heapUsedMB")]
    pub heap_used_mb: u64,
    #[serde(rename = "heapMaxMB")]
    pub heap_max_mb: u64,
    pub heap_usage_percent: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheCleared {
    pub cleared_reports: usize,
    pub message: &'static str,
}

// ---------------------------------------------------------------------------
// Search payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub page: usize,
    pub size: usize,
    pub total: usize,
    pub results: Vec<SearchDocument>,
    pub took_ms: u64,
    pub injected_delay_ms: u64,
    pub delay_source: &'static str,
    pub call_sequence: u64,
    pub interrupted: bool,
    #[serde(flatten)]
    pub result: PressureResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    pub total_documents: usize,
    pub categories: Vec<&'static str>,
    pub search_calls: u64,
}

// ---------------------------------------------------------------------------
// Service surface payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub high_priority: usize,
    pub medium_priority: usize,
    pub low_priority: usize,
}

impl From<store::TaskCounts> for TaskStats {
    fn from(counts: store::TaskCounts) -> Self {
        Self {
            total: counts.total,
            pending: counts.pending,
            in_progress: counts.in_progress,
            completed: counts.completed,
            high_priority: counts.high_priority,
            medium_priority: counts.medium_priority,
            low_priority: counts.low_priority,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub application: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub runtime: String,
    pub os_name: &'static str,
    pub server_time: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub pressure_profile: &'static str,
    pub memory: MemoryInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInfo {
    #[serde(rename = "totalMB")]
    pub total_mb: u64,
    #[serde(rename = "freeMB")]
    pub free_mb: u64,
    #[serde(rename = "usedMB")]
    pub used_mb: u64,
    #[serde(rename = "maxMB")]
    pub max_mb: u64,
}

impl From<faults::MemorySnapshot> for MemoryInfo {
    fn from(snapshot: faults::MemorySnapshot) -> Self {
        Self {
            total_mb: snapshot.total_mb(),
            free_mb: snapshot.free_mb(),
            used_mb: snapshot.used_mb(),
            max_mb: snapshot.max_mb(),
        }
    }
}
