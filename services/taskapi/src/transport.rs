use std::{
    collections::HashMap,
    net::{TcpListener, TcpStream},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
        mpsc,
    },
    time::{Duration, Instant},
};

use chrono::Utc;
use faults::{CancellationToken, LatencyPolicy};
use store::TaskStore;
use tracing::{debug, error, warn};

use crate::{
    api::{MemoryInfo, ServiceInfo},
    config::ServiceConfig,
    scenarios::PressureEngine,
};

mod http;
mod pressure_routes;
mod request;
mod routes;
mod server_runtime;
mod task_routes;

pub(crate) use http::{HttpRequest, HttpResponse};
use http::{render_response_text, write_backpressure_response, write_response};
pub(crate) use request::split_target;
use request::{parse_content_length, parse_query, parse_request_line, read_http_request};
pub(crate) use routes::handle_request;
pub use server_runtime::serve_http_with_workers;

pub(crate) const MAX_HTTP_BODY_BYTES: usize = 1024 * 1024;
const SOCKET_TIMEOUT_SECS: u64 = 5;

const APPLICATION_NAME: &str = "taskapi";
const APPLICATION_DESCRIPTION: &str =
    "Task management API with fault-injection and resource-pressure scenarios";

pub(crate) type SharedRuntime = Arc<ServiceRuntime>;

/// State shared by every transport worker. The task store and the pressure
/// engine synchronize internally, so the runtime is handed out behind a
/// plain `Arc`.
pub struct ServiceRuntime {
    tasks: TaskStore,
    engine: PressureEngine,
    started_at: Instant,
    requests_total: AtomicU64,
    client_errors_total: AtomicU64,
    server_errors_total: AtomicU64,
    backpressure: Option<Arc<TransportBackpressureMetrics>>,
}

impl ServiceRuntime {
    pub fn new(tasks: TaskStore, engine: PressureEngine) -> Self {
        Self {
            tasks,
            engine,
            started_at: Instant::now(),
            requests_total: AtomicU64::new(0),
            client_errors_total: AtomicU64::new(0),
            server_errors_total: AtomicU64::new(0),
            backpressure: None,
        }
    }

    /// Seeded task store plus a pressure engine built from `config`.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let mut engine = PressureEngine::new(config.pressure_profile, config.limits);
        if !config.search_latency_enabled {
            engine = engine.with_search_latency(LatencyPolicy::disabled());
        }
        Self::new(TaskStore::seeded(), engine)
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn engine(&self) -> &PressureEngine {
        &self.engine
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.engine.cancellation().clone()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn set_transport_backpressure_metrics(&mut self, metrics: Arc<TransportBackpressureMetrics>) {
        self.backpressure = Some(metrics);
    }

    fn observe_response(&self, status: u16) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        match status {
            400..=499 => {
                self.client_errors_total.fetch_add(1, Ordering::Relaxed);
            }
            500.. => {
                self.server_errors_total.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub(crate) fn info(&self) -> ServiceInfo {
        ServiceInfo {
            application: APPLICATION_NAME,
            version: env!("CARGO_PKG_VERSION"),
            description: APPLICATION_DESCRIPTION,
            runtime: format!("rust/{}", std::env::consts::ARCH),
            os_name: std::env::consts::OS,
            server_time: Utc::now(),
            uptime_seconds: self.uptime().as_secs(),
            pressure_profile: self.engine.profile().as_str(),
            memory: MemoryInfo::from(faults::memory::sample()),
        }
    }

    pub(crate) fn metrics_text(&self) -> String {
        let pressure = self.engine.metrics();
        let (queue_depth, queue_capacity, queue_rejects) = match self.backpressure.as_ref() {
            Some(metrics) => (
                metrics.queue_depth.load(Ordering::Relaxed),
                metrics.queue_capacity,
                metrics.queue_full_reject_total.load(Ordering::Relaxed),
            ),
            None => (0, 0, 0),
        };
        format!(
            "# TYPE taskapi_http_requests_total counter\n\
taskapi_http_requests_total {}\n\
# TYPE taskapi_http_client_errors_total counter\n\
taskapi_http_client_errors_total {}\n\
# TYPE taskapi_http_server_errors_total counter\n\
taskapi_http_server_errors_total {}\n\
# TYPE taskapi_tasks gauge\n\
taskapi_tasks {}\n\
# TYPE taskapi_scenario_runs_total counter\n\
taskapi_scenario_runs_total{{scenario=\"export_tasks\"}} {}\n\
taskapi_scenario_runs_total{{scenario=\"export_reports\"}} {}\n\
taskapi_scenario_runs_total{{scenario=\"export_batch\"}} {}\n\
taskapi_scenario_runs_total{{scenario=\"stress\"}} {}\n\
taskapi_scenario_runs_total{{scenario=\"report_generate\"}} {}\n\
taskapi_scenario_runs_total{{scenario=\"search\"}} {}\n\
# TYPE taskapi_allocated_mb_total counter\n\
taskapi_allocated_mb_total {}\n\
# TYPE taskapi_clamped_requests_total counter\n\
taskapi_clamped_requests_total {}\n\
# TYPE taskapi_injected_delays_total counter\n\
taskapi_injected_delays_total {}\n\
# TYPE taskapi_injected_delay_ms_total counter\n\
taskapi_injected_delay_ms_total {}\n\
# TYPE taskapi_interrupted_delays_total counter\n\
taskapi_interrupted_delays_total {}\n\
# TYPE taskapi_report_cache_entries gauge\n\
taskapi_report_cache_entries {}\n\
# TYPE taskapi_report_cache_bytes gauge\n\
taskapi_report_cache_bytes {}\n\
# TYPE taskapi_report_cache_clears_total counter\n\
taskapi_report_cache_clears_total {}\n\
# TYPE taskapi_transport_queue_depth gauge\n\
taskapi_transport_queue_depth {}\n\
# TYPE taskapi_transport_queue_capacity gauge\n\
taskapi_transport_queue_capacity {}\n\
# TYPE taskapi_transport_queue_full_reject_total counter\n\
taskapi_transport_queue_full_reject_total {}\n\
# TYPE taskapi_uptime_seconds gauge\n\
taskapi_uptime_seconds {}\n",
            self.requests_total.load(Ordering::Relaxed),
            self.client_errors_total.load(Ordering::Relaxed),
            self.server_errors_total.load(Ordering::Relaxed),
            self.tasks.len(),
            pressure.task_exports,
            pressure.report_exports,
            pressure.batch_exports,
            pressure.stress_runs,
            pressure.reports_generated,
            pressure.searches,
            pressure.allocated_mb_total,
            pressure.clamped_requests,
            pressure.injected_delays,
            pressure.injected_delay_ms_total,
            pressure.interrupted_delays,
            pressure.cache_entries,
            pressure.cache_bytes,
            pressure.cache_clears,
            queue_depth,
            queue_capacity,
            queue_rejects,
            self.uptime().as_secs(),
        )
    }
}

#[derive(Debug)]
pub(crate) struct TransportBackpressureMetrics {
    pub(crate) queue_depth: AtomicUsize,
    pub(crate) queue_capacity: usize,
    pub(crate) queue_full_reject_total: AtomicU64,
}

impl TransportBackpressureMetrics {
    pub(crate) fn new(queue_capacity: usize) -> Self {
        Self {
            queue_depth: AtomicUsize::new(0),
            queue_capacity,
            queue_full_reject_total: AtomicU64::new(0),
        }
    }

    pub(crate) fn observe_enqueued(&self) {
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn observe_dequeued(&self) {
        let _ = self
            .queue_depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |value| {
                Some(value.saturating_sub(1))
            });
    }

    pub(crate) fn observe_rejected(&self) {
        self.queue_full_reject_total.fetch_add(1, Ordering::Relaxed);
    }
}

/// Parses one complete raw HTTP/1.1 request and renders the raw response.
pub fn handle_http_request_bytes(
    runtime: &Arc<ServiceRuntime>,
    raw_request: &[u8],
) -> Result<Vec<u8>, String> {
    let request_text =
        std::str::from_utf8(raw_request).map_err(|_| "request must be valid UTF-8".to_string())?;
    let (header_block, body) = request_text
        .split_once("\r\n\r\n")
        .ok_or_else(|| "missing HTTP header terminator".to_string())?;

    let mut lines = header_block.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| "missing request line".to_string())?;
    let (method, target) = parse_request_line(request_line)?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| "invalid HTTP header".to_string())?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    let content_length = parse_content_length(&headers)?;
    if content_length != body.len() {
        return Err("content-length does not match body size".to_string());
    }

    let request = HttpRequest {
        method,
        target,
        headers,
        body: body.as_bytes().to_vec(),
    };
    let response = handle_request(runtime, &request);
    Ok(render_response_text(&response).into_bytes())
}

fn handle_connection(runtime: &SharedRuntime, mut stream: TcpStream) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)))?;
    stream.set_write_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)))?;

    let request = match read_http_request(&mut stream) {
        Ok(Some(request)) => request,
        Ok(None) => return Ok(()),
        Err(err) => {
            debug!(error = %err, "rejecting malformed HTTP request");
            return write_response(&mut stream, HttpResponse::bad_request(&err));
        }
    };

    let response = handle_request(runtime, &request);
    write_response(&mut stream, response)
}
