pub mod metrics;
pub mod sim_board;

pub use metrics::{init_metrics, serve_metrics};
pub use sim_board::{BoardCommand, JournalEntry, SimulatedBoard, TelemetryMode};
