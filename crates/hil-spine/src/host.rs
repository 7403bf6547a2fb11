use crate::error::BridgeResult;
use crate::hal::DaqDevice;
use crate::lifecycle::{LifecycleController, StepReport};
use crate::params::{sample_period_ms, ParamList, ParamValue, PARAM_COUNT};
use crate::ports::{ActuatorInputs, BlockSizes, SensorOutputs, INPUT_PORTS, OUTPUT_PORTS};

/// One discrete tick of the host's fixed-step schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub index: u64,
    pub time_s: f64,
}

impl Tick {
    pub fn at(index: u64, period_s: f64) -> Self {
        Self {
            index,
            time_s: index as f64 * period_s,
        }
    }
}

/// The callbacks a fixed-step host makes into a hardware block.
///
/// The host calls `sizes` and `compute_sample_time` while compiling the
/// model, `configure` once at start, then `output` and `step` every tick and
/// `terminate` at the end. Calls never overlap.
pub trait HostBlock {
    fn sizes(&self) -> BlockSizes;
    fn compute_sample_time(&self, params: &[ParamValue]) -> BridgeResult<f64>;
    fn configure(&mut self, params: ParamList) -> BridgeResult<()>;
    fn initialize_conditions(&mut self);
    fn step(&mut self, tick: &Tick, inputs: &ActuatorInputs) -> BridgeResult<StepReport>;
    fn output(&mut self, tick: &Tick) -> BridgeResult<SensorOutputs>;
    fn terminate(&mut self) -> BridgeResult<()>;
}

impl<D: DaqDevice> HostBlock for LifecycleController<D> {
    fn sizes(&self) -> BlockSizes {
        BlockSizes {
            params: PARAM_COUNT,
            tunable_params: 0,
            inputs: INPUT_PORTS.len(),
            input_width: 1,
            direct_feedthrough: false,
            outputs: OUTPUT_PORTS.len(),
            output_width: 1,
            continuous_states: 0,
            discrete_states: 1,
            sample_times: 1,
        }
    }

    fn compute_sample_time(&self, params: &[ParamValue]) -> BridgeResult<f64> {
        Ok(sample_period_ms(params)? as f64 / 1000.0)
    }

    fn configure(&mut self, params: ParamList) -> BridgeResult<()> {
        LifecycleController::configure(self, params)
    }

    fn initialize_conditions(&mut self) {
        LifecycleController::initialize_conditions(self);
    }

    fn step(&mut self, _tick: &Tick, inputs: &ActuatorInputs) -> BridgeResult<StepReport> {
        LifecycleController::step(self, inputs)
    }

    fn output(&mut self, tick: &Tick) -> BridgeResult<SensorOutputs> {
        LifecycleController::output(self, tick.time_s)
    }

    fn terminate(&mut self) -> BridgeResult<()> {
        LifecycleController::terminate(self)
    }
}
