use crate::infra::audit::{AuditEventType, AuditLogger, ConfiguredDetails, TerminatedDetails};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::driver::{run_block, RunObserver};
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use hil_io::metrics::{record_shutdown, record_step};
use hil_io::SimulatedBoard;
use hil_spine::{
    ActuatorInputs, BridgeError, CycleSnapshot, LifecycleController, LifecycleState, ParamValue,
    SensorOutputs, SnapshotExchange, StepReport, Tick, TimeBase,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

const EXIT_CONFIGURATION: u8 = 1;
const EXIT_CONNECTION: u8 = 2;

struct BridgeObserver {
    audit: Option<Arc<AuditLogger>>,
    timebase: TimeBase,
    exchange: Arc<SnapshotExchange>,
    serial_port: String,
}

impl BridgeObserver {
    fn audit(&self, event: AuditEventType, details: serde_json::Value) {
        audit(self.audit.as_deref(), &self.timebase, event, details);
    }
}

impl RunObserver for BridgeObserver {
    fn configured(&mut self, sample_time_s: f64) {
        telemetry::mark_connected();
        let details = ConfiguredDetails {
            serial_port: self.serial_port.clone(),
            sample_period_ms: (sample_time_s * 1000.0).round() as u64,
        };
        self.audit(
            AuditEventType::Configured,
            serde_json::to_value(details).unwrap_or_default(),
        );
    }

    fn tick(
        &mut self,
        _tick: &Tick,
        inputs: &ActuatorInputs,
        report: &StepReport,
        outputs: &SensorOutputs,
    ) {
        record_step(inputs, report);
        let (wait_us, timed_out) = report
            .outcome
            .map(|o| (o.waited().as_micros() as u64, o.is_timeout()))
            .unwrap_or_default();
        self.exchange.publish(CycleSnapshot {
            timestamp_us: self.timebase.now_us(),
            step: report.step,
            outputs: *outputs,
            wait_us,
            timed_out,
        });
    }
}

fn audit(
    logger: Option<&AuditLogger>,
    timebase: &TimeBase,
    event: AuditEventType,
    details: serde_json::Value,
) {
    if let Some(logger) = logger {
        if let Err(e) = logger.log_event(timebase.now_us(), timebase.unix_us(), event, details) {
            warn!(error = %e, "Failed to write audit entry");
        }
    }
}

pub fn run_from_args() -> ExitCode {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }
    run(config)
}

pub fn run(config: RuntimeConfig) -> ExitCode {
    init_tracing(config.json_logs);

    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let timebase = TimeBase::new();
    let audit_logger = match init_audit_logger(config.audit_path.as_ref()) {
        Ok(logger) => logger,
        Err(code) => return code,
    };
    let audit_ref = audit_logger.as_deref();

    audit(
        audit_ref,
        &timebase,
        AuditEventType::BridgeStart,
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "telemetry": format!("{:?}", config.telemetry),
            "metrics_enabled": config.metrics_addr.is_some(),
        }),
    );

    let params = match config.load_params() {
        Ok(params) => params,
        Err(e) => {
            error!(error = %e, "Failed to load block parameters");
            audit(
                audit_ref,
                &timebase,
                AuditEventType::ConfigurationRejected,
                serde_json::json!({ "error": e.to_string() }),
            );
            return ExitCode::from(EXIT_CONFIGURATION);
        }
    };
    let serial_port = match params.first() {
        Some(ParamValue::Text(port)) => port.clone(),
        _ => String::new(),
    };

    let board =
        SimulatedBoard::new(config.telemetry).with_connect_result(!config.board_offline);
    let mut block = LifecycleController::new(board);

    let stop = Arc::new(AtomicBool::new(false));
    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        let stop_timer = Arc::clone(&stop);
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(seconds));
            stop_timer.store(true, Ordering::Relaxed);
        });
    }

    let exchange = Arc::new(SnapshotExchange::new());
    let updater_stop = Arc::new(AtomicBool::new(false));
    let updater = telemetry::start_metrics_updater(Arc::clone(&exchange), Arc::clone(&updater_stop));

    let mut observer = BridgeObserver {
        audit: audit_logger.clone(),
        timebase,
        exchange,
        serial_port: serial_port.clone(),
    };

    info!(port = %serial_port, ticks = ?config.ticks, "Starting hardware-in-the-loop run");
    let result = run_block(&mut block, params, config.ticks, &stop, &mut observer);

    updater_stop.store(true, Ordering::Relaxed);
    let _ = updater.join();

    let stats = block.stats().clone();
    record_shutdown(&stats);

    let exit = match &result {
        Ok(summary) => {
            info!(
                ticks = summary.ticks,
                sync_timeouts = stats.sync_timeouts,
                max_wait_us = stats.max_wait_us,
                drain_attempts = stats.drain_attempts,
                discarded_callbacks = stats.discarded_callbacks,
                "Run complete"
            );
            ExitCode::SUCCESS
        }
        Err(e @ BridgeError::ConnectionFailure { .. }) => {
            error!(error = %e, "Board unreachable");
            audit(
                audit_ref,
                &timebase,
                AuditEventType::ConnectionFailed,
                serde_json::json!({ "port": serial_port, "error": e.to_string() }),
            );
            ExitCode::from(EXIT_CONNECTION)
        }
        Err(e) => {
            error!(error = %e, "Block rejected its configuration");
            audit(
                audit_ref,
                &timebase,
                AuditEventType::ConfigurationRejected,
                serde_json::json!({ "error": e.to_string() }),
            );
            ExitCode::from(EXIT_CONFIGURATION)
        }
    };

    if block.state() == LifecycleState::Terminated {
        let details = TerminatedDetails {
            ticks: result.as_ref().map(|s| s.ticks).unwrap_or(0),
            sync_timeouts: stats.sync_timeouts,
            max_wait_us: stats.max_wait_us,
            drain_attempts: stats.drain_attempts,
            discarded_callbacks: stats.discarded_callbacks,
        };
        audit(
            audit_ref,
            &timebase,
            AuditEventType::Terminated,
            serde_json::to_value(details).unwrap_or_default(),
        );
    }

    audit(
        audit_ref,
        &timebase,
        AuditEventType::BridgeShutdown,
        serde_json::json!({ "steps": stats.steps }),
    );
    exit
}

fn init_audit_logger(audit_path: Option<&PathBuf>) -> Result<Option<Arc<AuditLogger>>, ExitCode> {
    let Some(path) = audit_path else {
        return Ok(None);
    };
    match AuditLogger::new(path) {
        Ok(logger) => {
            info!(path = %path.display(), "Audit logging enabled");
            Ok(Some(Arc::new(logger)))
        }
        Err(e) => {
            error!(error = %e, path = %path.display(), "Audit logging requested but failed to initialize");
            Err(ExitCode::FAILURE)
        }
    }
}
