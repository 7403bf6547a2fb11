use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{BridgeError, BridgeResult};
use crate::hal::PinState;
use crate::params::{ParamList, ParamPosition, Validated};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncoderMode {
    Disabled,
    Quadrature,
    PulseCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncoderDirection {
    Normal,
    Reversed,
}

/// Edges counted per quadrature cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncoderResolution {
    X1,
    X2,
    X4,
}

impl EncoderMode {
    const CHOICES: [EncoderMode; 3] = [
        EncoderMode::Disabled,
        EncoderMode::Quadrature,
        EncoderMode::PulseCount,
    ];
}

impl EncoderDirection {
    const CHOICES: [EncoderDirection; 2] = [EncoderDirection::Normal, EncoderDirection::Reversed];
}

impl EncoderResolution {
    const CHOICES: [EncoderResolution; 3] = [
        EncoderResolution::X1,
        EncoderResolution::X2,
        EncoderResolution::X4,
    ];

    pub fn edges_per_cycle(self) -> i64 {
        match self {
            EncoderResolution::X1 => 1,
            EncoderResolution::X2 => 2,
            EncoderResolution::X4 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncoderSetup {
    pub mode: EncoderMode,
    pub reset_on_start: bool,
    pub direction: EncoderDirection,
    pub resolution: EncoderResolution,
    /// Digital input filter depth, in timer clock samples.
    pub filter: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplePeriod {
    ms: u64,
}

impl SamplePeriod {
    /// Longest accepted step period, one hour.
    pub const MAX_MS: u64 = 3_600_000;

    pub fn from_millis(ms: u64) -> BridgeResult<Self> {
        if ms == 0 {
            return Err(BridgeError::invalid(
                ParamPosition::SamplePeriodMs,
                "sample period must be at least 1 ms",
            ));
        }
        if ms > Self::MAX_MS {
            return Err(BridgeError::invalid(
                ParamPosition::SamplePeriodMs,
                format!("sample period of {ms} ms exceeds {} ms", Self::MAX_MS),
            ));
        }
        Ok(Self { ms })
    }

    pub fn as_millis(&self) -> u64 {
        self.ms
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.ms)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.ms as f64 / 1000.0
    }

    /// How long a step may wait for telemetry: 110% of the period.
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_micros(self.ms.saturating_mul(1100))
    }
}

/// Everything the board needs at setup and at shutdown.
///
/// Built once from a validated parameter list; nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardConfiguration {
    pub serial_port: String,
    pub sample_period: SamplePeriod,
    pub final_digital: [PinState; 3],
    pub pwm_frequency_hz: f64,
    pub final_duty: [f64; 4],
    pub encoders: [EncoderSetup; 3],
}

impl BoardConfiguration {
    pub fn from_params(params: &ParamList<Validated>) -> BridgeResult<Self> {
        let serial_port = params.text(ParamPosition::SerialPort)?.to_string();
        let sample_period =
            SamplePeriod::from_millis(params.integer(ParamPosition::SamplePeriodMs)?)?;

        let mut final_digital = [PinState::Low; 3];
        for (slot, position) in final_digital.iter_mut().zip(ParamPosition::FINAL_GPIO) {
            *slot = [PinState::Low, PinState::High][params.selector(position, 2)?];
        }

        let pwm_frequency_hz = params.number(ParamPosition::PwmFrequency)?;
        if pwm_frequency_hz <= 0.0 {
            return Err(BridgeError::invalid(
                ParamPosition::PwmFrequency,
                format!("PWM frequency must be positive, got {pwm_frequency_hz}"),
            ));
        }

        let mut final_duty = [0.0; 4];
        for (slot, position) in final_duty.iter_mut().zip(ParamPosition::FINAL_DUTY) {
            *slot = params.number(position)?;
        }

        let mut encoders = Vec::with_capacity(3);
        for [mode, reset, direction, resolution, filter] in ParamPosition::ENCODERS {
            encoders.push(EncoderSetup {
                mode: EncoderMode::CHOICES[params.selector(mode, EncoderMode::CHOICES.len())?],
                reset_on_start: params.flag(reset)?,
                direction: EncoderDirection::CHOICES
                    [params.selector(direction, EncoderDirection::CHOICES.len())?],
                resolution: EncoderResolution::CHOICES
                    [params.selector(resolution, EncoderResolution::CHOICES.len())?],
                filter: u32::try_from(params.integer(filter)?)
                    .map_err(|_| BridgeError::invalid(filter, "filter depth out of range"))?,
            });
        }
        let encoders: [EncoderSetup; 3] = encoders
            .try_into()
            .map_err(|_| BridgeError::invalid(ParamPosition::Enc1Mode, "encoder table"))?;

        Ok(Self {
            serial_port,
            sample_period,
            final_digital,
            pwm_frequency_hz,
            final_duty,
            encoders,
        })
    }
}
