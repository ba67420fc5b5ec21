use super::*;

/// Blocking thread-pool transport. Accepted connections go through a bounded
/// queue; when it is full the connection is answered with a 503 right away.
pub fn serve_http_with_workers(
    mut runtime: ServiceRuntime,
    bind_addr: &str,
    worker_count: usize,
    queue_capacity: usize,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr)?;
    let worker_count = worker_count.max(1);
    let queue_capacity = queue_capacity.max(1);
    let backpressure_metrics = Arc::new(TransportBackpressureMetrics::new(queue_capacity));
    runtime.set_transport_backpressure_metrics(Arc::clone(&backpressure_metrics));
    let runtime: SharedRuntime = Arc::new(runtime);
    let (tx, rx) = mpsc::sync_channel::<TcpStream>(queue_capacity);
    let rx = Arc::new(Mutex::new(rx));

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let runtime = Arc::clone(&runtime);
            let rx = Arc::clone(&rx);
            let backpressure_metrics = Arc::clone(&backpressure_metrics);
            scope.spawn(move || {
                loop {
                    let stream = {
                        let guard = match rx.lock() {
                            Ok(guard) => guard,
                            Err(_) => break,
                        };
                        match guard.recv() {
                            Ok(stream) => {
                                backpressure_metrics.observe_dequeued();
                                stream
                            }
                            Err(_) => break,
                        }
                    };
                    if let Err(err) = handle_connection(&runtime, stream) {
                        warn!(error = %err, "taskapi transport error");
                    }
                }
            });
        }

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    backpressure_metrics.observe_enqueued();
                    match tx.try_send(stream) {
                        Ok(()) => {}
                        Err(mpsc::TrySendError::Full(stream)) => {
                            backpressure_metrics.observe_dequeued();
                            backpressure_metrics.observe_rejected();
                            if let Err(err) =
                                write_backpressure_response(stream, SOCKET_TIMEOUT_SECS)
                            {
                                warn!(error = %err, "taskapi backpressure response failed");
                            }
                        }
                        Err(mpsc::TrySendError::Disconnected(_)) => {
                            backpressure_metrics.observe_dequeued();
                            error!("taskapi transport worker queue closed");
                            break;
                        }
                    }
                }
                Err(err) => warn!(error = %err, "taskapi transport accept error"),
            }
        }
        drop(tx);
    });

    Ok(())
}
