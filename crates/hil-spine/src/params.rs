use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

use crate::error::{BridgeError, BridgeResult};

pub const PARAM_COUNT: usize = 25;

#[derive(Debug, Clone, Copy)]
pub struct Unvalidated;

#[derive(Debug, Clone, Copy)]
pub struct Validated;

/// A single mask parameter as handed over by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamPosition {
    SerialPort = 0,
    SamplePeriodMs,
    GpioOutCh1FinalState,
    GpioOutCh2FinalState,
    GpioOutCh3FinalState,
    PwmFrequency,
    PwmCh1FinalDuty,
    PwmCh2FinalDuty,
    PwmCh3FinalDuty,
    PwmCh4FinalDuty,
    Enc1Mode,
    Enc1ResetCount,
    Enc1Direction,
    Enc1Resolution,
    Enc1Filter,
    Enc2Mode,
    Enc2ResetCount,
    Enc2Direction,
    Enc2Resolution,
    Enc2Filter,
    Enc3Mode,
    Enc3ResetCount,
    Enc3Direction,
    Enc3Resolution,
    Enc3Filter,
}

impl ParamPosition {
    pub const FINAL_GPIO: [ParamPosition; 3] = [
        ParamPosition::GpioOutCh1FinalState,
        ParamPosition::GpioOutCh2FinalState,
        ParamPosition::GpioOutCh3FinalState,
    ];

    pub const FINAL_DUTY: [ParamPosition; 4] = [
        ParamPosition::PwmCh1FinalDuty,
        ParamPosition::PwmCh2FinalDuty,
        ParamPosition::PwmCh3FinalDuty,
        ParamPosition::PwmCh4FinalDuty,
    ];

    /// Mode, reset flag, direction, resolution and filter of each encoder.
    pub const ENCODERS: [[ParamPosition; 5]; 3] = [
        [
            ParamPosition::Enc1Mode,
            ParamPosition::Enc1ResetCount,
            ParamPosition::Enc1Direction,
            ParamPosition::Enc1Resolution,
            ParamPosition::Enc1Filter,
        ],
        [
            ParamPosition::Enc2Mode,
            ParamPosition::Enc2ResetCount,
            ParamPosition::Enc2Direction,
            ParamPosition::Enc2Resolution,
            ParamPosition::Enc2Filter,
        ],
        [
            ParamPosition::Enc3Mode,
            ParamPosition::Enc3ResetCount,
            ParamPosition::Enc3Direction,
            ParamPosition::Enc3Resolution,
            ParamPosition::Enc3Filter,
        ],
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Fixed-position parameter list.
///
/// Only a `ParamList<Validated>` exposes field accessors, and the count check
/// is the one thing `validate` does, so no field is ever read from a list of
/// the wrong length.
#[derive(Debug, Clone)]
pub struct ParamList<State = Unvalidated> {
    values: Vec<ParamValue>,
    _state: PhantomData<State>,
}

impl ParamList<Unvalidated> {
    pub fn new(values: Vec<ParamValue>) -> Self {
        Self {
            values,
            _state: PhantomData,
        }
    }

    pub fn validate(self) -> BridgeResult<ParamList<Validated>> {
        if self.values.len() != PARAM_COUNT {
            return Err(BridgeError::ConfigurationMismatch {
                expected: PARAM_COUNT,
                actual: self.values.len(),
            });
        }
        Ok(ParamList {
            values: self.values,
            _state: PhantomData,
        })
    }
}

impl ParamList<Validated> {
    fn get(&self, position: ParamPosition) -> &ParamValue {
        // Validated lists always hold PARAM_COUNT entries.
        &self.values[position.index()]
    }

    pub fn text(&self, position: ParamPosition) -> BridgeResult<&str> {
        match self.get(position) {
            ParamValue::Text(text) if !text.trim().is_empty() => Ok(text.trim()),
            ParamValue::Text(_) => Err(BridgeError::invalid(position, "empty string")),
            ParamValue::Number(value) => Err(BridgeError::invalid(
                position,
                format!("expected a string, got {value}"),
            )),
        }
    }

    pub fn number(&self, position: ParamPosition) -> BridgeResult<f64> {
        match self.get(position) {
            ParamValue::Number(value) if value.is_finite() => Ok(*value),
            ParamValue::Number(value) => Err(BridgeError::invalid(
                position,
                format!("non-finite value {value}"),
            )),
            ParamValue::Text(text) => Err(BridgeError::invalid(
                position,
                format!("expected a number, got {text:?}"),
            )),
        }
    }

    /// Non-negative integer; fractional parts are truncated like a cast would.
    pub fn integer(&self, position: ParamPosition) -> BridgeResult<u64> {
        let value = self.number(position)?;
        if value < 0.0 {
            return Err(BridgeError::invalid(
                position,
                format!("expected a non-negative integer, got {value}"),
            ));
        }
        Ok(value.trunc() as u64)
    }

    /// 1-based popup selection turned into a 0-based index below `choices`.
    pub fn selector(&self, position: ParamPosition, choices: usize) -> BridgeResult<usize> {
        let value = self.number(position)?.trunc();
        if value < 1.0 || value > choices as f64 {
            return Err(BridgeError::invalid(
                position,
                format!("selection {value} outside 1..={choices}"),
            ));
        }
        Ok(value as usize - 1)
    }

    pub fn flag(&self, position: ParamPosition) -> BridgeResult<bool> {
        Ok(self.number(position)? > 0.0)
    }
}

/// Reads the sample period without validating the rest of the list.
///
/// The host asks for the sample time before it hands the list to Configure,
/// so only this one position is extracted here.
pub fn sample_period_ms(values: &[ParamValue]) -> BridgeResult<u64> {
    let position = ParamPosition::SamplePeriodMs;
    match values.get(position.index()) {
        Some(ParamValue::Number(value)) if value.is_finite() && *value >= 1.0 => {
            Ok(value.trunc() as u64)
        }
        Some(other) => Err(BridgeError::invalid(
            position,
            format!("expected a period of at least 1 ms, got {other:?}"),
        )),
        None => Err(BridgeError::ConfigurationMismatch {
            expected: PARAM_COUNT,
            actual: values.len(),
        }),
    }
}

/// A complete list: outputs parked low at zero duty, encoders in X4 quadrature
/// with their counts reset on start.
pub fn default_params(port: &str, sample_period_ms: u64) -> Vec<ParamValue> {
    let mut values = vec![ParamValue::from(port), ParamValue::Number(sample_period_ms as f64)];
    // Final GPIO states: low.
    values.extend([1.0, 1.0, 1.0].map(ParamValue::Number));
    // PWM frequency and final duties.
    values.push(ParamValue::Number(1000.0));
    values.extend([0.0, 0.0, 0.0, 0.0].map(ParamValue::Number));
    for _ in 0..3 {
        // mode, reset, direction, resolution, filter
        values.extend([2.0, 1.0, 1.0, 3.0, 0.0].map(ParamValue::Number));
    }
    values
}
