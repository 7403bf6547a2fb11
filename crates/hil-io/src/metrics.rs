//! Prometheus metrics for the HIL bridge.
//!
//! Step synchronization, telemetry health and the latest port values.

use hil_spine::ports::{INPUT_PORTS, OUTPUT_PORTS};
use hil_spine::{ActuatorInputs, ExecutionStats, SensorOutputs, StepReport, WaitOutcome};
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn register_counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("valid counter definition");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("counter registered once");
    counter
}

fn register_gauge(name: &str, help: &str) -> Gauge {
    let gauge = Gauge::new(name, help).expect("valid gauge definition");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("gauge registered once");
    gauge
}

fn register_int_gauge(name: &str, help: &str) -> IntGauge {
    let gauge = IntGauge::new(name, help).expect("valid gauge definition");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("gauge registered once");
    gauge
}

// ============================================================================
// Synchronization Metrics
// ============================================================================

/// Steps that reached the board
pub static STEPS_EXECUTED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_counter("hil_steps_executed_total", "Simulation steps pushed to the board")
});

/// Steps that gave up waiting for telemetry
pub static SYNC_TIMEOUTS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_counter(
        "hil_sync_timeouts_total",
        "Steps that reused cached sensor values after the telemetry wait timed out",
    )
});

/// Time each step spent waiting for telemetry, in microseconds
pub static WAIT_DURATION_US: LazyLock<Histogram> = LazyLock::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            "hil_telemetry_wait_microseconds",
            "Time each step spent waiting for telemetry",
        )
        .buckets(vec![
            50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 25000.0, 100000.0,
        ]),
    )
    .expect("valid histogram definition");
    REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("histogram registered once");
    histogram
});

/// Telemetry frames that arrived with no step waiting
pub static DISCARDED_CALLBACKS: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge(
        "hil_discarded_telemetry_callbacks",
        "Telemetry callbacks that found no armed wait gate",
    )
});

/// Telemetry frames that released a waiting step
pub static TELEMETRY_RELEASES: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge(
        "hil_telemetry_releases",
        "Telemetry callbacks that released a waiting step",
    )
});

/// Disable requests sent at shutdown before the board confirmed
pub static DRAIN_ATTEMPTS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_counter(
        "hil_telemetry_drain_attempts_total",
        "Telemetry disable requests sent at shutdown",
    )
});

/// Board session status (1 = connected, 0 = released or unreachable)
pub static BOARD_CONNECTED: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge(
        "hil_board_connected",
        "Board session status (1=connected, 0=released or unreachable)",
    )
});

// ============================================================================
// Port Metrics
// ============================================================================

/// One gauge per host input port, in port order
pub static ACTUATOR_GAUGES: LazyLock<Vec<Gauge>> = LazyLock::new(|| {
    INPUT_PORTS
        .iter()
        .map(|port| register_gauge(port.metric, &format!("Host port {}", port.key)))
        .collect()
});

/// One gauge per host output port, in port order
pub static SENSOR_GAUGES: LazyLock<Vec<Gauge>> = LazyLock::new(|| {
    OUTPUT_PORTS
        .iter()
        .map(|port| register_gauge(port.metric, &format!("Host port {}", port.key)))
        .collect()
});

pub fn record_step(inputs: &ActuatorInputs, report: &StepReport) {
    let values = inputs.digital.iter().chain(inputs.duty.iter());
    for (gauge, value) in ACTUATOR_GAUGES.iter().zip(values) {
        gauge.set(*value);
    }

    let Some(outcome) = report.outcome else {
        return;
    };
    STEPS_EXECUTED.inc();
    WAIT_DURATION_US.observe(outcome.waited().as_micros() as f64);
    if let WaitOutcome::TimedOut { .. } = outcome {
        SYNC_TIMEOUTS.inc();
    }
}

pub fn record_outputs(outputs: &SensorOutputs) {
    for (gauge, value) in SENSOR_GAUGES.iter().zip(outputs.to_port_vector()) {
        gauge.set(value);
    }
}

pub fn record_shutdown(stats: &ExecutionStats) {
    DRAIN_ATTEMPTS.inc_by(stats.drain_attempts);
    DISCARDED_CALLBACKS.set(stats.discarded_callbacks as i64);
    TELEMETRY_RELEASES.set(stats.telemetry_releases as i64);
    BOARD_CONNECTED.set(0.0);
}

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            match request.url() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let metric_families = REGISTRY.gather();
                    let mut buffer = Vec::new();

                    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        let _ = request.respond(
                            Response::from_string("Internal Server Error").with_status_code(500),
                        );
                        continue;
                    }

                    let mut response = Response::from_data(buffer);
                    if let Ok(header) = tiny_http::Header::from_bytes(
                        &b"Content-Type"[..],
                        &b"text/plain; version=0.0.4"[..],
                    ) {
                        response = response.with_header(header);
                    }
                    let _ = request.respond(response);
                }
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    // Ready once the board is connected and a step went through
                    if BOARD_CONNECTED.get() > 0.0 && STEPS_EXECUTED.get() > 0 {
                        let _ = request.respond(Response::from_string("Ready"));
                    } else {
                        let _ = request
                            .respond(Response::from_string("Not Ready").with_status_code(503));
                    }
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = STEPS_EXECUTED.get();
    let _ = SYNC_TIMEOUTS.get();
    let _ = WAIT_DURATION_US.get_sample_count();
    let _ = DISCARDED_CALLBACKS.get();
    let _ = TELEMETRY_RELEASES.get();
    let _ = DRAIN_ATTEMPTS.get();
    let _ = BOARD_CONNECTED.get();
    let _ = ACTUATOR_GAUGES.len();
    let _ = SENSOR_GAUGES.len();
}
