use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::board_config::{EncoderDirection, EncoderMode, EncoderResolution};

/// Invoked by the device whenever a fresh telemetry frame has been decoded.
/// Runs on the transport's own execution context, never on the caller's.
pub type TelemetryCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Ch1,
    Ch2,
    Ch3,
    Ch4,
}

impl Channel {
    pub const DIGITAL: [Channel; 3] = [Channel::Ch1, Channel::Ch2, Channel::Ch3];
    pub const ALL: [Channel; 4] = [Channel::Ch1, Channel::Ch2, Channel::Ch3, Channel::Ch4];

    pub fn index(self) -> usize {
        match self {
            Channel::Ch1 => 0,
            Channel::Ch2 => 1,
            Channel::Ch3 => 2,
            Channel::Ch4 => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoder {
    Enc1,
    Enc2,
    Enc3,
}

impl Encoder {
    pub const ALL: [Encoder; 3] = [Encoder::Enc1, Encoder::Enc2, Encoder::Enc3];

    pub fn index(self) -> usize {
        match self {
            Encoder::Enc1 => 0,
            Encoder::Enc2 => 1,
            Encoder::Enc3 => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PinState {
    #[default]
    Low,
    High,
}

impl PinState {
    /// Host signals are reals; anything strictly positive drives the pin high.
    pub fn from_signal(value: f64) -> Self {
        if value > 0.0 {
            PinState::High
        } else {
            PinState::Low
        }
    }

    pub fn as_signal(self) -> f64 {
        match self {
            PinState::Low => 0.0,
            PinState::High => 1.0,
        }
    }
}

/// Whether every setter goes out on the bus immediately or waits for `sync()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Manual,
    Automatic,
}

/// Synchronous facade over the I/O board.
///
/// Setters are buffered and only reach the board on `sync()`, which commits
/// them as one bus transaction (when connected in `SyncMode::Manual`).
/// Getters return the values cached from the last telemetry frame.
pub trait DaqDevice: Send {
    fn connect(&mut self, port: &str, mode: SyncMode) -> bool;
    fn disconnect(&mut self);

    fn digital_write(&mut self, channel: Channel, level: PinState);
    fn digital_read(&self, channel: Channel) -> PinState;

    fn pwm_set_frequency(&mut self, hz: f64);
    fn pwm_set_duty(&mut self, channel: Channel, percent: f64);

    fn encoder_set_mode(&mut self, encoder: Encoder, mode: EncoderMode);
    fn encoder_set_direction(&mut self, encoder: Encoder, direction: EncoderDirection);
    fn encoder_set_resolution(&mut self, encoder: Encoder, resolution: EncoderResolution);
    fn encoder_set_filter(&mut self, encoder: Encoder, depth: u32);
    fn encoder_reset(&mut self, encoder: Encoder);
    fn encoder_read(&self, encoder: Encoder) -> i64;

    /// Volts.
    fn analog_read(&self, channel: Channel) -> f64;

    fn enable_auto_read(&mut self, period: Duration, on_data: TelemetryCallback);
    fn disable_auto_read(&mut self);
    fn is_auto_read_enabled(&self) -> bool;

    fn sync(&mut self);
}
