mod app;
mod config;
mod driver;
mod logging;
mod telemetry;

pub use app::run_from_args;

