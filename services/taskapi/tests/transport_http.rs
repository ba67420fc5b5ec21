use std::{
    io::{Read, Write},
    net::{TcpListener, TcpStream},
    sync::Arc,
    time::Duration,
};

use faults::{BoundedReportCache, LatencyPolicy};
use serde_json::Value;
use store::TaskStore;
use taskapi::{
    profile::{PressureLimits, PressureProfile},
    scenarios::PressureEngine,
    transport::{ServiceRuntime, handle_http_request_bytes, serve_http_with_workers},
};

fn quiet_engine() -> PressureEngine {
    PressureEngine::new(PressureProfile::Standard, PressureLimits::default())
        .with_search_latency(LatencyPolicy::disabled())
}

fn sample_runtime() -> Arc<ServiceRuntime> {
    Arc::new(ServiceRuntime::new(TaskStore::seeded(), quiet_engine()))
}

fn send(runtime: &Arc<ServiceRuntime>, request: &str) -> String {
    let response = handle_http_request_bytes(runtime, request.as_bytes())
        .expect("request should parse and return response");
    String::from_utf8(response).expect("response should be UTF-8")
}

fn json_body(response: &str) -> Value {
    let (_, body) = response
        .split_once("\r\n\r\n")
        .expect("response should carry a body");
    serde_json::from_str(body).expect("body should be json")
}

fn post_json(path: &str, body: &str) -> String {
    format!(
        "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn get(path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
}

#[test]
fn transport_full_report_is_cached_and_visible_in_stats() {
    let runtime = sample_runtime();
    let response = send(
        &runtime,
        &post_json(
            "/api/reports/generate",
            r#"{"type":"full","dateRange":"last_year"}"#,
        ),
    );
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("\"dataSizeMB\":20"));
    let first_id = json_body(&response)["data"]["reportId"].clone();

    let second = send(
        &runtime,
        &post_json(
            "/api/reports/generate",
            r#"{"type":"full","dateRange":"last_year"}"#,
        ),
    );
    assert_ne!(json_body(&second)["data"]["reportId"], first_id);

    let stats = json_body(&send(&runtime, &get("/api/reports/stats")));
    assert!(stats["data"]["cachedReports"].as_u64().unwrap_or(0) >= 1);
    assert!(stats["data"]["cacheSizeMB"].as_u64().unwrap_or(0) >= 20);
}

#[test]
fn transport_stress_export_reports_total_and_elapsed() {
    let runtime = sample_runtime();
    let response = send(&runtime, &get("/api/export/stress?sizeMB=10&iterations=5"));
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("\"totalAllocatedMB\":50"));
    let body = json_body(&response);
    assert!(body["data"]["processingTimeMs"].as_u64().unwrap_or(0) > 0);
}

#[test]
fn transport_stress_export_clamps_oversized_requests() {
    let limits = PressureLimits {
        max_stress_mb: 4,
        max_stress_iterations: 2,
        ..PressureLimits::default()
    };
    let engine = PressureEngine::new(PressureProfile::Standard, limits)
        .with_search_latency(LatencyPolicy::disabled());
    let runtime = Arc::new(ServiceRuntime::new(TaskStore::new(), engine));

    let body = json_body(&send(
        &runtime,
        &get("/api/export/stress?sizeMB=100000&iterations=999"),
    ));
    assert_eq!(body["data"]["sizeMB"], 4);
    assert_eq!(body["data"]["iterations"], 2);
    assert_eq!(body["data"]["totalAllocatedMB"], 8);
    assert_eq!(body["data"]["clamped"], true);
}

#[test]
fn transport_bounded_cache_evicts_oldest_report() {
    let engine = quiet_engine().with_report_cache(Box::new(BoundedReportCache::new(1)));
    let runtime = Arc::new(ServiceRuntime::new(TaskStore::new(), engine));

    for _ in 0..3 {
        send(&runtime, &post_json("/api/reports/generate", "{}"));
    }
    let stats = json_body(&send(&runtime, &get("/api/reports/stats")));
    assert_eq!(stats["data"]["cachedReports"], 1);
    assert_eq!(stats["data"]["cacheSizeMB"], 5);
}

#[test]
fn transport_metrics_endpoint_returns_prometheus_payload() {
    let runtime = sample_runtime();
    let response = send(&runtime, &get("/metrics"));
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("Content-Type: text/plain; version=0.0.4; charset=utf-8"));
    assert!(response.contains("taskapi_report_cache_entries 0"));
    assert!(response.contains("taskapi_transport_queue_capacity 0"));
}

#[test]
fn transport_rejects_oversized_body_via_content_length_guard() {
    let runtime = sample_runtime();
    let request = "POST /api/tasks HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 1048577\r\n\r\n";
    let err = handle_http_request_bytes(&runtime, request.as_bytes())
        .expect_err("oversized content-length should be rejected");
    assert!(err.contains("exceeds max body size"));
}

#[test]
fn transport_task_lifecycle_over_raw_http() {
    let runtime = sample_runtime();
    let created = send(
        &runtime,
        &post_json(
            "/api/tasks",
            r#"{"title":"Patch kernel","priority":"HIGH"}"#,
        ),
    );
    assert!(created.starts_with("HTTP/1.1 201 Created"));
    let id = json_body(&created)["data"]["id"]
        .as_u64()
        .expect("created task should carry an id");

    let high = json_body(&send(&runtime, &get("/api/tasks?priority=high")));
    assert_eq!(high["count"], 3);

    let delete = format!("DELETE /api/tasks/{id} HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert!(send(&runtime, &delete).starts_with("HTTP/1.1 200 OK"));
    let again = send(&runtime, &delete);
    assert!(again.starts_with("HTTP/1.1 404 Not Found"));
    assert!(again.contains(&format!("Task not found with id: {id}")));
}

#[test]
fn transport_unknown_route_and_wrong_method() {
    let runtime = sample_runtime();
    assert!(send(&runtime, &get("/api/missing")).starts_with("HTTP/1.1 404 Not Found"));
    let wrong = send(
        &runtime,
        "DELETE /api/export/stress HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );
    assert!(wrong.starts_with("HTTP/1.1 405 Method Not Allowed"));
}

#[test]
fn transport_serves_requests_over_tcp() {
    let probe = TcpListener::bind("127.0.0.1:0").expect("probe bind should succeed");
    let addr = probe.local_addr().expect("probe addr should resolve");
    drop(probe);

    let runtime = ServiceRuntime::new(TaskStore::seeded(), quiet_engine());
    let bind_addr = addr.to_string();
    std::thread::spawn(move || serve_http_with_workers(runtime, &bind_addr, 2, 4));

    let mut stream = None;
    for _ in 0..50 {
        if let Ok(connected) = TcpStream::connect(addr) {
            stream = Some(connected);
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    let mut stream = stream.expect("server should accept connections");
    stream
        .write_all(get("/api/tasks/stats").as_bytes())
        .expect("request write should succeed");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .expect("response read should succeed");
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(json_body(&response)["data"]["total"], 4);
}
