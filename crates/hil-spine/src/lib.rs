pub mod board_config;
pub mod error;
pub mod hal;
pub mod host;
pub mod lifecycle;
pub mod params;
pub mod ports;
pub mod sync;
#[cfg(test)]
mod test_device;
pub mod timebase;

pub use board_config::{
    BoardConfiguration, EncoderDirection, EncoderMode, EncoderResolution, EncoderSetup,
    SamplePeriod,
};
pub use error::{BridgeError, BridgeResult};
pub use hal::{Channel, DaqDevice, Encoder, PinState, SyncMode, TelemetryCallback};
pub use host::{HostBlock, Tick};
pub use lifecycle::{ExecutionStats, LifecycleController, LifecycleState, StepReport};
pub use params::{default_params, ParamList, ParamPosition, ParamValue, PARAM_COUNT};
pub use ports::{ActuatorInputs, BlockSizes, SensorOutputs};
pub use sync::{wait_for_telemetry, CycleSnapshot, SnapshotExchange, WaitGate, WaitOutcome};
pub use timebase::{ElapsedClock, TimeBase};
