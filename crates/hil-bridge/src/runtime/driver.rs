//! Fixed-step host stand-in that drives a [`HostBlock`] through its
//! callbacks the way a simulation engine would.

use hil_spine::{
    ActuatorInputs, BridgeResult, HostBlock, ParamList, ParamValue, SensorOutputs, StepReport,
    Tick,
};
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// The hooks let the runtime audit and export each phase without the driver
/// knowing about either.
pub trait RunObserver {
    fn configured(&mut self, _sample_time_s: f64) {}
    fn tick(
        &mut self,
        _tick: &Tick,
        _inputs: &ActuatorInputs,
        _report: &StepReport,
        _outputs: &SensorOutputs,
    ) {
    }
}

impl RunObserver for () {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
}

/// Actuator signals of the built-in stimulus model: a 1 Hz square wave and
/// its complement on the first two pins, the tick parity on the third, and
/// phase-shifted sine duties between 0 and 100 percent.
pub fn stimulus(tick: &Tick) -> ActuatorInputs {
    let square = if tick.time_s.fract() < 0.5 { 1.0 } else { 0.0 };
    let parity = (tick.index % 2) as f64;
    let duty = std::array::from_fn(|ch| {
        let phase = TAU * (tick.time_s + ch as f64 * 0.25);
        50.0 + 50.0 * phase.sin()
    });
    ActuatorInputs {
        digital: [square, 1.0 - square, parity],
        duty,
    }
}

/// Run one simulation: compile-time queries, `configure`, then `output` and
/// `step` for every tick until `max_ticks` or `stop`, then `terminate`.
///
/// A configuration error is returned before any hardware is touched. A
/// connection failure or a failed tick still terminates the block before
/// returning.
pub fn run_block<B: HostBlock + ?Sized>(
    block: &mut B,
    params: Vec<ParamValue>,
    max_ticks: Option<u64>,
    stop: &AtomicBool,
    observer: &mut dyn RunObserver,
) -> BridgeResult<RunSummary> {
    let sizes = block.sizes();
    debug!(
        params = sizes.params,
        inputs = sizes.inputs,
        outputs = sizes.outputs,
        "Block sizes"
    );
    let period_s = block.compute_sample_time(&params)?;

    if let Err(e) = block.configure(ParamList::new(params)) {
        if !e.is_configuration_error() {
            block.terminate()?;
        }
        return Err(e);
    }
    block.initialize_conditions();
    observer.configured(period_s);
    info!(period_s, "Block configured, stepping");

    match drive_ticks(block, period_s, max_ticks, stop, observer) {
        Ok(ticks) => {
            block.terminate()?;
            Ok(RunSummary { ticks })
        }
        Err(e) => {
            if let Err(park) = block.terminate() {
                warn!(error = %park, "Terminate after a failed tick also failed");
            }
            Err(e)
        }
    }
}

/// Host order within a tick: `output` reads the sensors, then `step` pushes
/// the actuators and waits for the board.
fn drive_ticks<B: HostBlock + ?Sized>(
    block: &mut B,
    period_s: f64,
    max_ticks: Option<u64>,
    stop: &AtomicBool,
    observer: &mut dyn RunObserver,
) -> BridgeResult<u64> {
    let mut index = 0u64;
    while !stop.load(Ordering::Relaxed) && max_ticks.map_or(true, |max| index < max) {
        let tick = Tick::at(index, period_s);
        let outputs = block.output(&tick)?;
        let inputs = stimulus(&tick);
        let report = block.step(&tick, &inputs)?;
        observer.tick(&tick, &inputs, &report, &outputs);
        index += 1;
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hil_io::{JournalEntry, SimulatedBoard, TelemetryMode};
    use hil_spine::{
        default_params, BlockSizes, BridgeError, LifecycleController, LifecycleState,
    };
    use std::time::Duration;

    /// Host block that records the callbacks it receives and can fail a
    /// chosen step.
    #[derive(Default)]
    struct ScriptedBlock {
        calls: Vec<String>,
        fail_step_at: Option<u64>,
    }

    impl HostBlock for ScriptedBlock {
        fn sizes(&self) -> BlockSizes {
            BlockSizes {
                params: 25,
                tunable_params: 0,
                inputs: 7,
                input_width: 1,
                direct_feedthrough: false,
                outputs: 11,
                output_width: 1,
                continuous_states: 0,
                discrete_states: 1,
                sample_times: 1,
            }
        }

        fn compute_sample_time(&self, _params: &[ParamValue]) -> BridgeResult<f64> {
            Ok(0.01)
        }

        fn configure(&mut self, _params: ParamList) -> BridgeResult<()> {
            self.calls.push("configure".to_string());
            Ok(())
        }

        fn initialize_conditions(&mut self) {
            self.calls.push("initialize".to_string());
        }

        fn step(&mut self, tick: &Tick, _inputs: &ActuatorInputs) -> BridgeResult<StepReport> {
            self.calls.push(format!("step {}", tick.index));
            if self.fail_step_at == Some(tick.index) {
                return Err(BridgeError::LifecycleViolation {
                    operation: "step",
                    state: LifecycleState::Terminated,
                });
            }
            Ok(StepReport {
                step: tick.index + 1,
                outcome: None,
            })
        }

        fn output(&mut self, tick: &Tick) -> BridgeResult<SensorOutputs> {
            self.calls.push(format!("output {}", tick.index));
            Ok(SensorOutputs::default())
        }

        fn terminate(&mut self) -> BridgeResult<()> {
            self.calls.push("terminate".to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Counting {
        configured: u32,
        ticks: Vec<u64>,
    }

    impl RunObserver for Counting {
        fn configured(&mut self, _sample_time_s: f64) {
            self.configured += 1;
        }

        fn tick(
            &mut self,
            tick: &Tick,
            _inputs: &ActuatorInputs,
            _report: &StepReport,
            _outputs: &SensorOutputs,
        ) {
            self.ticks.push(tick.index);
        }
    }

    #[test]
    fn stimulus_stays_in_range() {
        for index in 0..200 {
            let inputs = stimulus(&Tick::at(index, 0.01));
            assert!(inputs.duty.iter().all(|d| (0.0..=100.0).contains(d)));
            assert_eq!(inputs.digital[0] + inputs.digital[1], 1.0);
        }
        assert_eq!(stimulus(&Tick::at(0, 0.01)).digital, [1.0, 0.0, 0.0]);
        assert_eq!(stimulus(&Tick::at(60, 0.01)).digital[0], 0.0);
    }

    #[test]
    fn each_tick_reads_outputs_before_stepping() {
        let mut block = ScriptedBlock::default();
        let stop = AtomicBool::new(false);

        run_block(&mut block, Vec::new(), Some(2), &stop, &mut ()).unwrap();

        assert_eq!(
            block.calls,
            vec![
                "configure",
                "initialize",
                "output 0",
                "step 0",
                "output 1",
                "step 1",
                "terminate"
            ]
        );
    }

    #[test]
    fn failed_tick_still_terminates_the_block() {
        let mut block = ScriptedBlock {
            fail_step_at: Some(1),
            ..Default::default()
        };
        let stop = AtomicBool::new(false);

        let err = run_block(&mut block, Vec::new(), Some(5), &stop, &mut ()).unwrap_err();

        assert!(matches!(err, BridgeError::LifecycleViolation { .. }));
        assert_eq!(block.calls.last().map(String::as_str), Some("terminate"));
        assert!(!block.calls.iter().any(|c| c == "output 2"));
    }

    #[test]
    fn runs_the_requested_number_of_ticks() {
        let board = SimulatedBoard::new(TelemetryMode::ReplyAfter(Duration::from_micros(300)));
        let mut block = LifecycleController::new(board.clone()).with_drain_delay(Duration::ZERO);
        let stop = AtomicBool::new(false);
        let mut observer = Counting::default();

        let summary = run_block(
            &mut block,
            default_params("sim", 2),
            Some(5),
            &stop,
            &mut observer,
        )
        .unwrap();

        assert_eq!(summary.ticks, 5);
        assert_eq!(observer.configured, 1);
        assert_eq!(observer.ticks, vec![0, 1, 2, 3, 4]);
        assert_eq!(block.state(), LifecycleState::Terminated);
        assert_eq!(block.step_count(), 5);
        assert!(matches!(
            board.journal().last(),
            Some(JournalEntry::Disconnect)
        ));
    }

    #[test]
    fn stop_flag_ends_the_run_before_the_first_tick() {
        let mut block = LifecycleController::new(SimulatedBoard::new(TelemetryMode::Periodic))
            .with_drain_delay(Duration::ZERO);
        let stop = AtomicBool::new(true);

        let summary = run_block(&mut block, default_params("sim", 2), None, &stop, &mut ()).unwrap();

        assert_eq!(summary.ticks, 0);
        assert_eq!(block.state(), LifecycleState::Terminated);
    }

    #[test]
    fn configuration_error_touches_no_hardware() {
        let board = SimulatedBoard::new(TelemetryMode::Periodic);
        let mut block = LifecycleController::new(board.clone());
        let stop = AtomicBool::new(false);
        let mut params = default_params("sim", 2);
        params.truncate(24);
        let mut observer = Counting::default();

        let err = run_block(&mut block, params, Some(3), &stop, &mut observer).unwrap_err();

        assert!(matches!(err, BridgeError::ConfigurationMismatch { .. }));
        assert!(board.journal().is_empty());
        assert_eq!(observer.configured, 0);
    }

    #[test]
    fn unreachable_board_is_terminated_and_reported() {
        let board = SimulatedBoard::new(TelemetryMode::Periodic).with_connect_result(false);
        let mut block = LifecycleController::new(board.clone());
        let stop = AtomicBool::new(false);

        let err = run_block(&mut block, default_params("COM9", 2), Some(3), &stop, &mut ())
            .unwrap_err();

        assert!(matches!(err, BridgeError::ConnectionFailure { .. }));
        assert!(board.commands().is_empty());
        assert_eq!(board.journal().len(), 1);
        assert_eq!(block.state(), LifecycleState::Terminated);
    }
}
