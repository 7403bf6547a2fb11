use log::{debug, info, warn};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::board_config::BoardConfiguration;
use crate::error::{BridgeError, BridgeResult};
use crate::hal::{Channel, DaqDevice, Encoder, PinState, SyncMode};
use crate::params::{ParamList, Unvalidated};
use crate::ports::{ActuatorInputs, SensorOutputs};
use crate::sync::{wait_for_telemetry, WaitGate, WaitOutcome};
use crate::timebase::ElapsedClock;

/// Pause between telemetry-disable attempts at shutdown.
pub const DRAIN_RETRY_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unconfigured,
    Configured,
    Stepping,
    Terminated,
    /// The board did not answer at Configure. Steps and outputs are no-ops.
    Unusable,
}

#[derive(Clone, Default, Debug)]
pub struct ExecutionStats {
    pub steps: u64,
    pub sync_timeouts: u64,
    pub last_wait_us: u64,
    pub max_wait_us: u64,
    pub drain_attempts: u64,
    pub telemetry_releases: u64,
    pub discarded_callbacks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub step: u64,
    /// `None` when the step was skipped because the board is unusable.
    pub outcome: Option<WaitOutcome>,
}

/// Owns the board session and its configuration for one block instance.
pub struct LifecycleController<D: DaqDevice> {
    device: Option<D>,
    config: Option<BoardConfiguration>,
    state: LifecycleState,
    gate: Arc<WaitGate>,
    step_counter: u64,
    elapsed: ElapsedClock,
    stats: ExecutionStats,
    drain_delay: Duration,
}

impl<D: DaqDevice> LifecycleController<D> {
    pub fn new(device: D) -> Self {
        Self {
            device: Some(device),
            config: None,
            state: LifecycleState::Unconfigured,
            gate: Arc::new(WaitGate::new()),
            step_counter: 0,
            elapsed: ElapsedClock::new(),
            stats: ExecutionStats::default(),
            drain_delay: DRAIN_RETRY_DELAY,
        }
    }

    pub fn with_drain_delay(mut self, delay: Duration) -> Self {
        self.drain_delay = delay;
        self
    }

    pub fn configure(&mut self, params: ParamList<Unvalidated>) -> BridgeResult<()> {
        if self.state != LifecycleState::Unconfigured {
            return Err(self.violation("configure"));
        }
        let params = params.validate()?;
        let config = BoardConfiguration::from_params(&params)?;
        let Some(device) = self.device.as_mut() else {
            return Err(self.violation("configure"));
        };

        if !device.connect(&config.serial_port, SyncMode::Manual) {
            warn!(
                "board on {} did not answer, block is unusable until the simulation ends",
                config.serial_port
            );
            let port = config.serial_port.clone();
            self.config = Some(config);
            self.state = LifecycleState::Unusable;
            return Err(BridgeError::ConnectionFailure { port });
        }

        device.pwm_set_frequency(config.pwm_frequency_hz);
        for (encoder, setup) in Encoder::ALL.into_iter().zip(config.encoders.iter()) {
            device.encoder_set_mode(encoder, setup.mode);
            device.encoder_set_direction(encoder, setup.direction);
            device.encoder_set_resolution(encoder, setup.resolution);
            device.encoder_set_filter(encoder, setup.filter);
            if setup.reset_on_start {
                device.encoder_reset(encoder);
            }
        }

        let gate = Arc::clone(&self.gate);
        device.enable_auto_read(
            config.sample_period.as_duration(),
            Arc::new(move || {
                gate.release();
            }),
        );
        device.sync();

        info!(
            "board on {} configured: period {} ms, pwm {} Hz",
            config.serial_port,
            config.sample_period.as_millis(),
            config.pwm_frequency_hz
        );
        self.config = Some(config);
        self.state = LifecycleState::Configured;
        Ok(())
    }

    /// Resets the step counter, the block's only discrete state.
    pub fn initialize_conditions(&mut self) {
        self.step_counter = 0;
    }

    pub fn step(&mut self, inputs: &ActuatorInputs) -> BridgeResult<StepReport> {
        match self.state {
            LifecycleState::Configured | LifecycleState::Stepping => {}
            LifecycleState::Unusable => {
                return Ok(StepReport {
                    step: self.step_counter,
                    outcome: None,
                });
            }
            _ => return Err(self.violation("step")),
        }
        let (Some(device), Some(config)) = (self.device.as_mut(), self.config.as_ref()) else {
            return Err(self.violation("step"));
        };

        for (channel, value) in Channel::DIGITAL.into_iter().zip(inputs.digital) {
            device.digital_write(channel, PinState::from_signal(value));
        }
        for (channel, duty) in Channel::ALL.into_iter().zip(inputs.duty) {
            device.pwm_set_duty(channel, duty);
        }

        // Armed before the flush so a reply to this very transaction is never missed.
        self.gate.arm();
        device.sync();
        self.step_counter += 1;

        let outcome = wait_for_telemetry(&self.gate, config.sample_period.sync_timeout());
        let waited_us = outcome.waited().as_micros() as u64;
        self.stats.steps += 1;
        self.stats.last_wait_us = waited_us;
        self.stats.max_wait_us = self.stats.max_wait_us.max(waited_us);
        self.stats.telemetry_releases = self.gate.releases();
        self.stats.discarded_callbacks = self.gate.discarded();
        if outcome.is_timeout() {
            self.stats.sync_timeouts += 1;
            debug!(
                "step {}: no telemetry within {} us, reusing cached sensor values",
                self.step_counter, waited_us
            );
        }

        self.state = LifecycleState::Stepping;
        Ok(StepReport {
            step: self.step_counter,
            outcome: Some(outcome),
        })
    }

    pub fn output(&mut self, sim_time_s: f64) -> BridgeResult<SensorOutputs> {
        let mut outputs = SensorOutputs::default();
        match (self.state, self.device.as_ref()) {
            (LifecycleState::Configured | LifecycleState::Stepping, Some(device)) => {
                for (slot, channel) in outputs.digital.iter_mut().zip(Channel::DIGITAL) {
                    *slot = device.digital_read(channel).as_signal();
                }
                for (slot, encoder) in outputs.encoders.iter_mut().zip(Encoder::ALL) {
                    *slot = device.encoder_read(encoder) as f64;
                }
                for (slot, channel) in outputs.analog.iter_mut().zip(Channel::ALL) {
                    *slot = device.analog_read(channel);
                }
            }
            (LifecycleState::Unusable, _) => {}
            _ => return Err(self.violation("output")),
        }
        outputs.elapsed_s = self.elapsed.sample(sim_time_s).as_secs_f64();
        Ok(outputs)
    }

    /// Parks the board in its final state, stops telemetry and releases the
    /// session. Blocks until the board confirms telemetry is off.
    pub fn terminate(&mut self) -> BridgeResult<()> {
        if self.state == LifecycleState::Terminated {
            return Err(self.violation("terminate"));
        }
        let reachable = matches!(
            self.state,
            LifecycleState::Configured | LifecycleState::Stepping
        );

        if let (true, Some(device), Some(config)) =
            (reachable, self.device.as_mut(), self.config.as_ref())
        {
            for (channel, level) in Channel::DIGITAL.into_iter().zip(config.final_digital) {
                device.digital_write(channel, level);
            }
            for (channel, duty) in Channel::ALL.into_iter().zip(config.final_duty) {
                device.pwm_set_duty(channel, duty);
            }
            device.sync();

            while device.is_auto_read_enabled() {
                device.disable_auto_read();
                device.sync();
                self.stats.drain_attempts += 1;
                thread::sleep(self.drain_delay);
            }
            device.disconnect();
            info!(
                "board on {} parked after {} steps ({} sync timeouts)",
                config.serial_port, self.stats.steps, self.stats.sync_timeouts
            );
        }

        self.stats.telemetry_releases = self.gate.releases();
        self.stats.discarded_callbacks = self.gate.discarded();
        self.device = None;
        self.config = None;
        self.state = LifecycleState::Terminated;
        Ok(())
    }

    fn violation(&self, operation: &'static str) -> BridgeError {
        BridgeError::LifecycleViolation {
            operation,
            state: self.state,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn config(&self) -> Option<&BoardConfiguration> {
        self.config.as_ref()
    }

    pub fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }

    pub fn step_count(&self) -> u64 {
        self.step_counter
    }

    pub fn gate(&self) -> &WaitGate {
        &self.gate
    }
}
