use hil_io::TelemetryMode;
use hil_spine::{default_params, ParamValue};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read parameter file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parameter file {path} is not a JSON array of numbers and strings: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub params_path: Option<PathBuf>,
    pub port: String,
    pub sample_ms: u64,
    pub ticks: Option<u64>,
    pub run_seconds: Option<u64>,
    pub telemetry: TelemetryMode,
    pub board_offline: bool,
    pub json_logs: bool,
    pub metrics_addr: Option<String>,
    pub audit_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            params_path: None,
            port: "sim".to_string(),
            sample_ms: 10,
            ticks: None,
            run_seconds: None,
            telemetry: TelemetryMode::Periodic,
            board_offline: false,
            json_logs: false,
            metrics_addr: None,
            audit_path: None,
        }
    }
}

fn parse_telemetry(value: &str) -> Option<TelemetryMode> {
    match value {
        "periodic" => Some(TelemetryMode::Periodic),
        "silent" => Some(TelemetryMode::Silent),
        other => other
            .strip_prefix("reply:")
            .and_then(|ms| ms.parse::<u64>().ok())
            .map(|ms| TelemetryMode::ReplyAfter(Duration::from_millis(ms))),
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--params" => {
                    if i + 1 < args.len() {
                        cfg.params_path = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--port" => {
                    if i + 1 < args.len() {
                        cfg.port = args[i + 1].clone();
                        i += 1;
                    }
                }
                "--sample-ms" => {
                    if i + 1 < args.len() {
                        cfg.sample_ms = args[i + 1].parse().unwrap_or(10);
                        i += 1;
                    }
                }
                "--ticks" => {
                    if i + 1 < args.len() {
                        cfg.ticks = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--run-seconds" => {
                    if i + 1 < args.len() {
                        cfg.run_seconds = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--telemetry" => {
                    if i + 1 < args.len() {
                        if let Some(mode) = parse_telemetry(&args[i + 1]) {
                            cfg.telemetry = mode;
                        }
                        i += 1;
                    }
                }
                "--board-offline" => {
                    cfg.board_offline = true;
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--metrics-addr" => {
                    if i + 1 < args.len() {
                        cfg.metrics_addr = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--audit-log" => {
                    if i + 1 < args.len() {
                        cfg.audit_path = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        cfg
    }

    /// The block parameter list: from `--params` when given, otherwise the
    /// default list for `--port` and `--sample-ms`.
    pub fn load_params(&self) -> Result<Vec<ParamValue>, ConfigError> {
        let Some(path) = &self.params_path else {
            return Ok(default_params(&self.port, self.sample_ms));
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.clone(),
            source,
        })
    }

    pub fn print_help() {
        println!(
            r#"hil-bridge - Hardware-in-the-loop bridge for a DAQ I/O board

USAGE:
    hil-bridge [OPTIONS]

OPTIONS:
    --params <PATH>         JSON array with the 25 block parameters
    --port <ID>             Serial port when no parameter file is given [default: sim]
    --sample-ms <MS>        Step period when no parameter file is given [default: 10]
    --ticks <N>             Stop after N simulation steps
    --run-seconds <SECS>    Stop after a fixed wall-clock duration
    --telemetry <MODE>      Simulated board telemetry: periodic|silent|reply:<ms> [default: periodic]
    --board-offline         Simulate a board that does not answer the connection
    --json-logs             Output logs in JSON format (for log aggregation)
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --audit-log <PATH>      Enable lifecycle audit logging to specified JSONL file
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,hil_spine=trace)

EXAMPLES:
    # One second of 10 ms steps against the simulated board
    hil-bridge --ticks 100

    # Board that answers each transaction after 2 ms, with metrics
    hil-bridge --telemetry reply:2 --metrics-addr 0.0.0.0:9090 --run-seconds 30
"#
        );
    }
}
