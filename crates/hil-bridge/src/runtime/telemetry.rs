use hil_io::metrics::{init_metrics, record_outputs, serve_metrics, BOARD_CONNECTED};
use hil_spine::SnapshotExchange;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

pub fn mark_connected() {
    BOARD_CONNECTED.set(1.0);
}

/// Copies the latest published cycle into the sensor gauges until `stop`.
pub fn start_metrics_updater(
    exchange: Arc<SnapshotExchange>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut last_step = 0u64;
        while !stop.load(Ordering::Relaxed) {
            let snapshot = exchange.read();
            if snapshot.step > last_step {
                record_outputs(&snapshot.outputs);
                last_step = snapshot.step;
            }
            thread::sleep(Duration::from_millis(200));
        }
        record_outputs(&exchange.read().outputs);
    })
}
