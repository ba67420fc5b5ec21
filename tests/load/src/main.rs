use std::{
    collections::BTreeMap,
    io::{Read, Write},
    net::{TcpStream, ToSocketAddrs},
    path::PathBuf,
    sync::mpsc,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
    Stress,
    ExportTasks,
    ExportReports,
    Batch,
    Report,
    Search,
    Custom,
}

impl Scenario {
    fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stress" => Ok(Self::Stress),
            "export-tasks" => Ok(Self::ExportTasks),
            "export-reports" => Ok(Self::ExportReports),
            "batch" => Ok(Self::Batch),
            "report" => Ok(Self::Report),
            "search" => Ok(Self::Search),
            "custom" => Ok(Self::Custom),
            _ => Err(format!(
                "Unsupported --scenario '{raw}' (allowed: stress, export-tasks, export-reports, batch, report, search, custom)"
            )),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Stress => "stress",
            Self::ExportTasks => "export-tasks",
            Self::ExportReports => "export-reports",
            Self::Batch => "batch",
            Self::Report => "report",
            Self::Search => "search",
            Self::Custom => "custom",
        }
    }

    /// Method, path and body template a scenario sends unless overridden.
    fn preset(self) -> (&'static str, &'static str, Option<&'static str>) {
        match self {
            Self::Stress => ("GET", "/api/export/stress?sizeMB=10&iterations=5", None),
            Self::ExportTasks => ("GET", "/api/export/tasks?format=csv&records=10000", None),
            Self::ExportReports => (
                "GET",
                "/api/export/reports?format=json&dateRange=last_month",
                None,
            ),
            Self::Batch => (
                "POST",
                "/api/export/batch",
                Some(r#"{"types":["tasks","reports","audit-%WORKER%"]}"#),
            ),
            Self::Report => (
                "POST",
                "/api/reports/generate",
                Some(r#"{"type":"summary","dateRange":"last_week"}"#),
            ),
            Self::Search => ("GET", "/api/search?query=configure&page=1&size=10", None),
            Self::Custom => ("GET", "/health", None),
        }
    }
}

#[derive(Debug, Clone)]
struct Config {
    addr: String,
    scenario: Scenario,
    path: String,
    method: String,
    body_template: Option<String>,
    content_type: String,
    concurrency: usize,
    requests_per_worker: usize,
    warmup_requests: usize,
    connect_timeout_ms: u64,
    read_timeout_ms: u64,
    allow_backpressure: bool,
    summary_out: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct WorkerStats {
    success: usize,
    rejected: usize,
    failed: usize,
    latencies_ms: Vec<f64>,
    status_counts: BTreeMap<u16, usize>,
    sample_errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct LoadSummary {
    run_epoch_secs: u64,
    scenario: &'static str,
    addr: String,
    method: String,
    path: String,
    concurrency: usize,
    requests_per_worker: usize,
    total_requests: usize,
    successful_requests: usize,
    rejected_requests: usize,
    failed_requests: usize,
    status_counts: BTreeMap<u16, usize>,
    elapsed_seconds: f64,
    throughput_rps: f64,
    latency_avg_ms: f64,
    latency_p50_ms: f64,
    latency_p95_ms: f64,
    latency_p99_ms: f64,
    latency_max_ms: f64,
}

fn main() {
    let config = match parse_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(config) {
        eprintln!("pressure-load failed: {err}");
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<(), String> {
    for warmup_idx in 0..config.warmup_requests {
        let _ = run_single_request(&config, 0, warmup_idx)?;
    }

    let total_requests = config.concurrency * config.requests_per_worker;
    let started_at = Instant::now();
    let (tx, rx) = mpsc::channel::<WorkerStats>();

    std::thread::scope(|scope| {
        for worker_idx in 0..config.concurrency {
            let tx = tx.clone();
            let config = config.clone();
            scope.spawn(move || {
                let mut stats = WorkerStats::default();
                for request_idx in 0..config.requests_per_worker {
                    let req_started = Instant::now();
                    let outcome = run_single_request(&config, worker_idx, request_idx);
                    let elapsed_ms = req_started.elapsed().as_secs_f64() * 1000.0;
                    record_outcome(&mut stats, outcome, elapsed_ms);
                }
                let _ = tx.send(stats);
            });
        }
    });
    drop(tx);

    let elapsed_seconds = started_at.elapsed().as_secs_f64();
    let mut merged = WorkerStats::default();
    for stats in rx {
        merge_stats(&mut merged, stats);
    }

    if merged.success == 0 {
        return Err("no successful requests".to_string());
    }

    let summary = summarize(&config, total_requests, elapsed_seconds, &mut merged);
    print_summary(&summary);
    if let Some(path) = config.summary_out.as_ref() {
        let payload = serde_json::to_string_pretty(&summary)
            .map_err(|e| format!("summary encoding failed: {e}"))?;
        std::fs::write(path, payload)
            .map_err(|e| format!("failed writing summary '{}': {e}", path.display()))?;
        println!("summary_out: {}", path.display());
    }

    let hard_failures = if config.allow_backpressure {
        merged.failed
    } else {
        merged.failed + merged.rejected
    };
    if hard_failures > 0 {
        for err in merged.sample_errors {
            println!("error_sample: {err}");
        }
        return Err(format!("{hard_failures} requests failed"));
    }

    Ok(())
}

fn record_outcome(stats: &mut WorkerStats, outcome: Result<u16, String>, elapsed_ms: f64) {
    match outcome {
        Ok(status) => {
            *stats.status_counts.entry(status).or_default() += 1;
            match status {
                200..=299 => {
                    stats.success += 1;
                    stats.latencies_ms.push(elapsed_ms);
                }
                503 => stats.rejected += 1,
                _ => {
                    stats.failed += 1;
                    if stats.sample_errors.len() < 4 {
                        stats
                            .sample_errors
                            .push(format!("unexpected HTTP status code: {status}"));
                    }
                }
            }
        }
        Err(err) => {
            stats.failed += 1;
            if stats.sample_errors.len() < 4 {
                stats.sample_errors.push(err);
            }
        }
    }
}

fn merge_stats(into: &mut WorkerStats, stats: WorkerStats) {
    into.success += stats.success;
    into.rejected += stats.rejected;
    into.failed += stats.failed;
    into.latencies_ms.extend(stats.latencies_ms);
    for (status, count) in stats.status_counts {
        *into.status_counts.entry(status).or_default() += count;
    }
    for err in stats.sample_errors {
        if into.sample_errors.len() >= 10 {
            break;
        }
        into.sample_errors.push(err);
    }
}

fn summarize(
    config: &Config,
    total_requests: usize,
    elapsed_seconds: f64,
    stats: &mut WorkerStats,
) -> LoadSummary {
    stats.latencies_ms.sort_by(|a, b| a.total_cmp(b));
    let latencies = &stats.latencies_ms;
    let avg_ms = if latencies.is_empty() {
        0.0
    } else {
        latencies.iter().sum::<f64>() / latencies.len() as f64
    };
    LoadSummary {
        run_epoch_secs: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        scenario: config.scenario.as_str(),
        addr: config.addr.clone(),
        method: config.method.clone(),
        path: config.path.clone(),
        concurrency: config.concurrency,
        requests_per_worker: config.requests_per_worker,
        total_requests,
        successful_requests: stats.success,
        rejected_requests: stats.rejected,
        failed_requests: stats.failed,
        status_counts: stats.status_counts.clone(),
        elapsed_seconds,
        throughput_rps: stats.success as f64 / elapsed_seconds.max(0.0001),
        latency_avg_ms: avg_ms,
        latency_p50_ms: percentile(latencies, 0.50),
        latency_p95_ms: percentile(latencies, 0.95),
        latency_p99_ms: percentile(latencies, 0.99),
        latency_max_ms: latencies.last().copied().unwrap_or(0.0),
    }
}

fn print_summary(summary: &LoadSummary) {
    println!("Pressure load run");
    println!("scenario: {}", summary.scenario);
    println!("addr: {}", summary.addr);
    println!("path: {}", summary.path);
    println!("method: {}", summary.method);
    println!("concurrency: {}", summary.concurrency);
    println!("requests_per_worker: {}", summary.requests_per_worker);
    println!("total_requests: {}", summary.total_requests);
    println!("successful_requests: {}", summary.successful_requests);
    println!("rejected_requests: {}", summary.rejected_requests);
    println!("failed_requests: {}", summary.failed_requests);
    for (status, count) in &summary.status_counts {
        println!("status_{status}: {count}");
    }
    println!(
        "success_rate_pct: {:.2}",
        (summary.successful_requests as f64 / summary.total_requests.max(1) as f64) * 100.0
    );
    println!("elapsed_seconds: {:.4}", summary.elapsed_seconds);
    println!("throughput_rps: {:.2}", summary.throughput_rps);
    println!("latency_avg_ms: {:.4}", summary.latency_avg_ms);
    println!("latency_p50_ms: {:.4}", summary.latency_p50_ms);
    println!("latency_p95_ms: {:.4}", summary.latency_p95_ms);
    println!("latency_p99_ms: {:.4}", summary.latency_p99_ms);
    println!("latency_max_ms: {:.4}", summary.latency_max_ms);
}

fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (((sorted.len() - 1) as f64) * quantile).round() as usize;
    sorted[idx]
}

fn run_single_request(config: &Config, worker_idx: usize, request_idx: usize) -> Result<u16, String> {
    let addr = config.addr.as_str();
    let mut addrs = addr
        .to_socket_addrs()
        .map_err(|e| format!("unable to resolve addr '{addr}': {e}"))?;
    let socket_addr = addrs
        .next()
        .ok_or_else(|| format!("unable to resolve addr '{addr}'"))?;

    let mut stream = TcpStream::connect_timeout(
        &socket_addr,
        Duration::from_millis(config.connect_timeout_ms),
    )
    .map_err(|e| format!("connect failed: {e}"))?;
    stream
        .set_read_timeout(Some(Duration::from_millis(config.read_timeout_ms)))
        .map_err(|e| format!("set_read_timeout failed: {e}"))?;
    stream
        .set_write_timeout(Some(Duration::from_millis(config.read_timeout_ms)))
        .map_err(|e| format!("set_write_timeout failed: {e}"))?;

    let request_body = config
        .body_template
        .as_ref()
        .map(|template| render_body_template(template, worker_idx, request_idx))
        .unwrap_or_default();
    let request = build_http_request(
        &config.method,
        addr,
        &config.path,
        &request_body,
        &config.content_type,
    );
    stream
        .write_all(request.as_bytes())
        .map_err(|e| format!("write failed: {e}"))?;

    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .map_err(|e| format!("read failed: {e}"))?;
    parse_status_code(&response)
}

fn build_http_request(
    method: &str,
    addr: &str,
    path: &str,
    request_body: &str,
    content_type: &str,
) -> String {
    if request_body.is_empty() {
        return format!(
            "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\nAccept: application/json\r\n\r\n"
        );
    }

    format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\nAccept: application/json\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n{}",
        request_body.len(),
        request_body
    )
}

fn render_body_template(template: &str, worker_idx: usize, request_idx: usize) -> String {
    let now_epoch_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_else(|_| "0".to_string());
    template
        .replace("%WORKER%", &worker_idx.to_string())
        .replace("%REQUEST%", &request_idx.to_string())
        .replace("%EPOCH_MS%", &now_epoch_ms)
}

fn parse_status_code(response: &[u8]) -> Result<u16, String> {
    let line_end = response
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or_else(|| "invalid HTTP response: missing status line terminator".to_string())?;
    let status_line = std::str::from_utf8(&response[..line_end])
        .map_err(|_| "invalid HTTP response: status line not UTF-8".to_string())?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| "invalid HTTP response: missing status code".to_string())?;
    status
        .parse::<u16>()
        .map_err(|_| "invalid HTTP response: status code parse failed".to_string())
}

fn parse_args<I>(args: I) -> Result<Config, String>
where
    I: Iterator<Item = String>,
{
    let mut scenario = Scenario::Stress;
    let mut path = None;
    let mut method = None;
    let mut body_template = None;
    let mut config = Config {
        addr: "127.0.0.1:8080".to_string(),
        scenario,
        path: String::new(),
        method: String::new(),
        body_template: None,
        content_type: "application/json".to_string(),
        concurrency: 8,
        requests_per_worker: 20,
        warmup_requests: 2,
        connect_timeout_ms: 2_000,
        read_timeout_ms: 60_000,
        allow_backpressure: false,
        summary_out: None,
    };

    let mut args = args.peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--addr" => {
                config.addr = args
                    .next()
                    .ok_or_else(|| "Missing value for --addr".to_string())?;
            }
            "--scenario" => {
                let raw = args
                    .next()
                    .ok_or_else(|| "Missing value for --scenario".to_string())?;
                scenario = Scenario::parse(&raw)?;
            }
            "--path" => {
                path = Some(
                    args.next()
                        .ok_or_else(|| "Missing value for --path".to_string())?,
                );
            }
            "--method" => {
                let raw = args
                    .next()
                    .ok_or_else(|| "Missing value for --method".to_string())?;
                method = Some(parse_method(&raw)?);
            }
            "--body" => {
                body_template = Some(
                    args.next()
                        .ok_or_else(|| "Missing value for --body".to_string())?,
                );
            }
            "--content-type" => {
                config.content_type = args
                    .next()
                    .ok_or_else(|| "Missing value for --content-type".to_string())?;
            }
            "--concurrency" => {
                config.concurrency = parse_usize_arg(&mut args, "--concurrency")?;
            }
            "--requests-per-worker" => {
                config.requests_per_worker = parse_usize_arg(&mut args, "--requests-per-worker")?;
            }
            "--warmup-requests" => {
                config.warmup_requests =
                    parse_usize_allow_zero_arg(&mut args, "--warmup-requests")?;
            }
            "--connect-timeout-ms" => {
                config.connect_timeout_ms = parse_u64_arg(&mut args, "--connect-timeout-ms")?;
            }
            "--read-timeout-ms" => {
                config.read_timeout_ms = parse_u64_arg(&mut args, "--read-timeout-ms")?;
            }
            "--allow-backpressure" => config.allow_backpressure = true,
            "--summary-out" => {
                config.summary_out = Some(PathBuf::from(
                    args.next()
                        .ok_or_else(|| "Missing value for --summary-out".to_string())?,
                ));
            }
            "--help" | "-h" => return Err(usage_text().to_string()),
            _ => return Err(format!("Unknown argument '{arg}'.\n\n{}", usage_text())),
        }
    }

    let (preset_method, preset_path, preset_body) = scenario.preset();
    config.scenario = scenario;
    config.method = method.unwrap_or_else(|| preset_method.to_string());
    config.path = path.unwrap_or_else(|| preset_path.to_string());
    config.body_template = body_template.or_else(|| preset_body.map(str::to_string));

    if !config.path.starts_with('/') {
        return Err("--path must start with '/'".to_string());
    }
    if matches!(config.method.as_str(), "POST" | "PUT") && config.body_template.is_none() {
        return Err(format!("--method {} requires --body payload", config.method));
    }

    Ok(config)
}

fn parse_method(raw: &str) -> Result<String, String> {
    let normalized = raw.trim().to_ascii_uppercase();
    match normalized.as_str() {
        "GET" | "POST" | "PUT" | "DELETE" => Ok(normalized),
        _ => Err(format!(
            "Unsupported --method '{raw}' (allowed: GET, POST, PUT, DELETE)"
        )),
    }
}

fn parse_usize_arg<I>(args: &mut I, flag: &str) -> Result<usize, String>
where
    I: Iterator<Item = String>,
{
    let value = parse_usize_allow_zero_arg(args, flag)?;
    if value == 0 {
        return Err(format!("{flag} must be > 0"));
    }
    Ok(value)
}

fn parse_usize_allow_zero_arg<I>(args: &mut I, flag: &str) -> Result<usize, String>
where
    I: Iterator<Item = String>,
{
    let raw = args
        .next()
        .ok_or_else(|| format!("Missing value for {flag}"))?;
    raw.parse::<usize>()
        .map_err(|_| format!("Invalid value for {flag}: {raw}"))
}

fn parse_u64_arg<I>(args: &mut I, flag: &str) -> Result<u64, String>
where
    I: Iterator<Item = String>,
{
    let raw = args
        .next()
        .ok_or_else(|| format!("Missing value for {flag}"))?;
    let value = raw
        .parse::<u64>()
        .map_err(|_| format!("Invalid value for {flag}: {raw}"))?;
    if value == 0 {
        return Err(format!("{flag} must be > 0"));
    }
    Ok(value)
}

fn usage_text() -> &'static str {
    "Usage: cargo run -p pressure-load -- [--addr HOST:PORT] [--scenario stress|export-tasks|export-reports|batch|report|search|custom] [--path /api/...] [--method GET|POST|PUT|DELETE] [--body '{...}'] [--content-type MIME] [--concurrency N] [--requests-per-worker N] [--warmup-requests N] [--connect-timeout-ms N] [--read-timeout-ms N] [--allow-backpressure] [--summary-out PATH]"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> impl Iterator<Item = String> {
        raw.iter()
            .map(|value| value.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn defaults_target_the_stress_scenario() {
        let config = parse_args(args(&[])).expect("defaults should parse");
        assert_eq!(config.scenario, Scenario::Stress);
        assert_eq!(config.method, "GET");
        assert_eq!(config.path, "/api/export/stress?sizeMB=10&iterations=5");
        assert!(config.body_template.is_none());
    }

    #[test]
    fn report_scenario_posts_a_json_body() {
        let config = parse_args(args(&["--scenario", "report"])).expect("scenario should parse");
        assert_eq!(config.method, "POST");
        assert_eq!(config.path, "/api/reports/generate");
        assert!(config.body_template.is_some_and(|body| body.contains("summary")));
    }

    #[test]
    fn explicit_path_overrides_scenario_preset() {
        let config = parse_args(args(&["--scenario", "search", "--path", "/api/search?query=x"]))
            .expect("override should parse");
        assert_eq!(config.path, "/api/search?query=x");
        assert_eq!(config.method, "GET");
    }

    #[test]
    fn post_without_body_is_rejected() {
        let err = parse_args(args(&["--scenario", "custom", "--method", "post"]))
            .expect_err("post without body should fail");
        assert!(err.contains("requires --body"));
    }

    #[test]
    fn unknown_scenario_is_rejected() {
        let err = parse_args(args(&["--scenario", "meltdown"])).expect_err("scenario should fail");
        assert!(err.contains("Unsupported --scenario"));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = parse_args(args(&["--concurrency", "0"])).expect_err("zero should fail");
        assert!(err.contains("must be > 0"));
    }

    #[test]
    fn status_code_parses_from_status_line() {
        assert_eq!(parse_status_code(b"HTTP/1.1 503 Service Unavailable\r\n\r\n"), Ok(503));
        assert!(parse_status_code(b"garbage").is_err());
    }

    #[test]
    fn percentile_picks_nearest_rank() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 0.50), 3.0);
        assert_eq!(percentile(&sorted, 0.99), 5.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn backpressure_rejections_are_counted_apart_from_failures() {
        let mut stats = WorkerStats::default();
        record_outcome(&mut stats, Ok(200), 4.0);
        record_outcome(&mut stats, Ok(503), 1.0);
        record_outcome(&mut stats, Ok(500), 1.0);
        record_outcome(&mut stats, Err("connect failed".to_string()), 1.0);
        assert_eq!(stats.success, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.status_counts.get(&503), Some(&1));
        assert_eq!(stats.latencies_ms, vec![4.0]);
    }

    #[test]
    fn body_template_substitutes_worker_and_request() {
        let body = render_body_template(r#"{"w":%WORKER%,"r":%REQUEST%}"#, 3, 7);
        assert_eq!(body, r#"{"w":3,"r":7}"#);
    }
}
