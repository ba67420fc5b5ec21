use std::sync::Arc;

use faults::{DeployGate, EnvFlagMarker, FileMarker};
use taskapi::{
    config::{FAIL_DEPLOY_FLAG_ENV, ServiceConfig, TransportRuntime},
    transport::{ServiceRuntime, handle_http_request_bytes, serve_http_with_workers},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(err) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("taskapi failed to initialise logging: {err}");
    }

    let serve_mode = std::env::args().any(|arg| arg == "--serve");
    let config = ServiceConfig::from_env();

    let gate = DeployGate::new(vec![
        Box::new(FileMarker::new(&config.fail_deploy_marker)),
        Box::new(EnvFlagMarker::new(FAIL_DEPLOY_FLAG_ENV)),
    ]);
    if let Err(err) = gate.check() {
        error!(error = %err, "taskapi startup aborted");
        std::process::exit(1);
    }

    let runtime = ServiceRuntime::from_config(&config);
    info!(
        profile = config.pressure_profile.as_str(),
        transport = config.transport_runtime.as_str(),
        search_latency = config.search_latency_enabled,
        max_export_mb = config.limits.max_export_mb,
        max_stress_mb = config.limits.max_stress_mb,
        max_report_mb = config.limits.max_report_mb,
        "taskapi configured"
    );

    if !serve_mode {
        let runtime = Arc::new(runtime);
        match handle_http_request_bytes(&runtime, b"GET /health HTTP/1.1\r\n\r\n") {
            Ok(response) if response.starts_with(b"HTTP/1.1 200") => info!(
                tasks = runtime.tasks().len(),
                "taskapi ready (self check passed, start with --serve to listen)"
            ),
            Ok(_) => {
                error!("taskapi self check returned a non-200 response");
                std::process::exit(1);
            }
            Err(err) => {
                error!(error = %err, "taskapi self check failed");
                std::process::exit(1);
            }
        }
        return;
    }

    info!(
        bind_addr = %config.bind_addr,
        workers = config.http_workers,
        queue_capacity = config.http_queue_capacity,
        "taskapi transport listening on http://{}",
        config.bind_addr
    );
    match config.transport_runtime {
        TransportRuntime::Std => {
            if let Err(err) = serve_http_with_workers(
                runtime,
                &config.bind_addr,
                config.http_workers,
                config.http_queue_capacity,
            ) {
                error!(error = %err, "taskapi transport failed");
                std::process::exit(1);
            }
        }
        TransportRuntime::Axum => {
            #[cfg(feature = "async-transport")]
            {
                if let Err(err) = taskapi::transport_axum::serve_http_with_axum(
                    runtime,
                    &config.bind_addr,
                    config.http_workers,
                ) {
                    error!(error = %err, "taskapi transport failed");
                    std::process::exit(1);
                }
            }
            #[cfg(not(feature = "async-transport"))]
            {
                drop(runtime);
                error!("taskapi transport runtime 'axum' requires build feature 'async-transport'");
                std::process::exit(2);
            }
        }
    }
}
