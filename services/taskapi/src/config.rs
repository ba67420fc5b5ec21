use std::{path::PathBuf, str::FromStr};

use tracing::warn;

use crate::profile::{PressureLimits, PressureProfile};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_FAIL_DEPLOY_MARKER: &str = "fail_deploy.flag";
pub const FAIL_DEPLOY_FLAG_ENV: &str = "TASKAPI_FAIL_DEPLOY";
const QUEUE_SLOTS_PER_WORKER: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportRuntime {
    #[default]
    Std,
    Axum,
}

impl TransportRuntime {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Std => "std",
            Self::Axum => "axum",
        }
    }
}

/// Everything the binary reads from the environment, resolved once at
/// startup. Unparseable values fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub http_workers: usize,
    pub http_queue_capacity: usize,
    pub transport_runtime: TransportRuntime,
    pub pressure_profile: PressureProfile,
    pub limits: PressureLimits,
    pub fail_deploy_marker: PathBuf,
    pub search_latency_enabled: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let http_workers = default_http_workers();
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            http_workers,
            http_queue_capacity: http_workers * QUEUE_SLOTS_PER_WORKER,
            transport_runtime: TransportRuntime::Std,
            pressure_profile: PressureProfile::Standard,
            limits: PressureLimits::default(),
            fail_deploy_marker: PathBuf::from(DEFAULT_FAIL_DEPLOY_MARKER),
            search_latency_enabled: true,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let defaults = PressureLimits::default();
        let http_workers = parse_env_first::<usize>(&["TASKAPI_HTTP_WORKERS"])
            .filter(|workers| *workers > 0)
            .unwrap_or_else(default_http_workers);
        let http_queue_capacity = parse_env_first::<usize>(&["TASKAPI_HTTP_QUEUE_CAPACITY"])
            .filter(|capacity| *capacity > 0)
            .unwrap_or(http_workers * QUEUE_SLOTS_PER_WORKER);
        Self {
            bind_addr: env_with_fallback("TASKAPI_BIND", "BIND_ADDR")
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            http_workers,
            http_queue_capacity,
            transport_runtime: parse_transport_runtime(
                std::env::var("TASKAPI_TRANSPORT_RUNTIME").ok().as_deref(),
            ),
            pressure_profile: parse_pressure_profile(
                std::env::var("TASKAPI_PRESSURE_PROFILE").ok().as_deref(),
            ),
            limits: PressureLimits {
                max_export_mb: positive_env("TASKAPI_MAX_EXPORT_MB")
                    .unwrap_or(defaults.max_export_mb),
                max_batch_item_mb: positive_env("TASKAPI_MAX_BATCH_ITEM_MB")
                    .unwrap_or(defaults.max_batch_item_mb),
                max_batch_types: parse_env_first::<usize>(&["TASKAPI_MAX_BATCH_TYPES"])
                    .filter(|value| *value > 0)
                    .unwrap_or(defaults.max_batch_types),
                max_stress_mb: positive_env("TASKAPI_MAX_STRESS_MB")
                    .unwrap_or(defaults.max_stress_mb),
                max_stress_iterations: positive_env("TASKAPI_MAX_STRESS_ITERATIONS")
                    .unwrap_or(defaults.max_stress_iterations),
                max_report_mb: positive_env("TASKAPI_MAX_REPORT_MB")
                    .unwrap_or(defaults.max_report_mb),
            },
            fail_deploy_marker: std::env::var("TASKAPI_FAIL_DEPLOY_MARKER")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_FAIL_DEPLOY_MARKER)),
            search_latency_enabled: !matches!(
                std::env::var("TASKAPI_SEARCH_LATENCY")
                    .map(|value| value.trim().to_ascii_lowercase())
                    .as_deref(),
                Ok("off" | "none" | "false" | "disabled" | "0")
            ),
        }
    }
}

pub fn env_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .or_else(|| std::env::var(fallback).ok())
}

pub fn parse_env_first<T>(keys: &[&str]) -> Option<T>
where
    T: FromStr,
{
    for key in keys {
        if let Ok(value) = std::env::var(key)
            && let Ok(parsed) = value.trim().parse::<T>()
        {
            return Some(parsed);
        }
    }
    None
}

fn positive_env(key: &str) -> Option<u32> {
    parse_env_first::<u32>(&[key]).filter(|value| *value > 0)
}

pub fn default_http_workers() -> usize {
    std::thread::available_parallelism()
        .map(|parallelism| parallelism.get().clamp(4, 64))
        .unwrap_or(4)
}

pub fn parse_transport_runtime(raw: Option<&str>) -> TransportRuntime {
    match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
        Some("axum") => TransportRuntime::Axum,
        _ => TransportRuntime::Std,
    }
}

pub fn parse_pressure_profile(raw: Option<&str>) -> PressureProfile {
    let Some(raw) = raw else {
        return PressureProfile::Standard;
    };
    match raw.parse() {
        Ok(profile) => profile,
        Err(err) => {
            warn!(error = %err, "falling back to standard pressure profile");
            PressureProfile::Standard
        }
    }
}
