//! Recording fake board for unit tests.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::board_config::{EncoderDirection, EncoderMode, EncoderResolution};
use crate::hal::{Channel, DaqDevice, Encoder, PinState, SyncMode, TelemetryCallback};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect(String, SyncMode),
    Disconnect,
    DigitalWrite(Channel, PinState),
    PwmFrequency(f64),
    PwmDuty(Channel, f64),
    EncoderMode(Encoder, EncoderMode),
    EncoderDirection(Encoder, EncoderDirection),
    EncoderResolution(Encoder, EncoderResolution),
    EncoderFilter(Encoder, u32),
    EncoderReset(Encoder),
    EnableAutoRead(Duration),
    DisableAutoRead,
    Sync,
}

#[derive(Default)]
struct Shared {
    calls: Vec<Call>,
    callback: Option<TelemetryCallback>,
    auto_read: bool,
    pending_disable: bool,
    disable_lag: u32,
}

/// Cloneable handle; every clone sees the same call log.
#[derive(Clone)]
pub struct RecordingDevice {
    shared: Arc<Mutex<Shared>>,
    connect_result: bool,
    reply_after: Option<Duration>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            connect_result: true,
            reply_after: None,
        }
    }

    pub fn offline() -> Self {
        Self {
            connect_result: false,
            ..Self::new()
        }
    }

    /// Answer every sync with one telemetry callback after `delay`.
    pub fn replying_after(delay: Duration) -> Self {
        Self {
            reply_after: Some(delay),
            ..Self::new()
        }
    }

    pub fn with_disable_lag(self, lag: u32) -> Self {
        self.lock().disable_lag = lag;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap()
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn fire(&self) {
        let callback = self.lock().callback.clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl DaqDevice for RecordingDevice {
    fn connect(&mut self, port: &str, mode: SyncMode) -> bool {
        self.record(Call::Connect(port.to_string(), mode));
        self.connect_result
    }

    fn disconnect(&mut self) {
        self.record(Call::Disconnect);
    }

    fn digital_write(&mut self, channel: Channel, level: PinState) {
        self.record(Call::DigitalWrite(channel, level));
    }

    fn digital_read(&self, channel: Channel) -> PinState {
        if channel == Channel::Ch2 {
            PinState::High
        } else {
            PinState::Low
        }
    }

    fn pwm_set_frequency(&mut self, hz: f64) {
        self.record(Call::PwmFrequency(hz));
    }

    fn pwm_set_duty(&mut self, channel: Channel, percent: f64) {
        self.record(Call::PwmDuty(channel, percent));
    }

    fn encoder_set_mode(&mut self, encoder: Encoder, mode: EncoderMode) {
        self.record(Call::EncoderMode(encoder, mode));
    }

    fn encoder_set_direction(&mut self, encoder: Encoder, direction: EncoderDirection) {
        self.record(Call::EncoderDirection(encoder, direction));
    }

    fn encoder_set_resolution(&mut self, encoder: Encoder, resolution: EncoderResolution) {
        self.record(Call::EncoderResolution(encoder, resolution));
    }

    fn encoder_set_filter(&mut self, encoder: Encoder, depth: u32) {
        self.record(Call::EncoderFilter(encoder, depth));
    }

    fn encoder_reset(&mut self, encoder: Encoder) {
        self.record(Call::EncoderReset(encoder));
    }

    fn encoder_read(&self, encoder: Encoder) -> i64 {
        100 * (encoder.index() as i64 + 1)
    }

    fn analog_read(&self, channel: Channel) -> f64 {
        0.5 * (channel.index() as f64 + 1.0)
    }

    fn enable_auto_read(&mut self, period: Duration, on_data: TelemetryCallback) {
        self.record(Call::EnableAutoRead(period));
        let mut shared = self.lock();
        shared.callback = Some(on_data);
        shared.auto_read = true;
    }

    fn disable_auto_read(&mut self) {
        self.record(Call::DisableAutoRead);
        self.lock().pending_disable = true;
    }

    fn is_auto_read_enabled(&self) -> bool {
        self.lock().auto_read
    }

    fn sync(&mut self) {
        self.record(Call::Sync);
        let callback = {
            let mut shared = self.lock();
            if shared.pending_disable {
                shared.pending_disable = false;
                if shared.disable_lag == 0 {
                    shared.auto_read = false;
                } else {
                    shared.disable_lag -= 1;
                }
            }
            shared.callback.clone()
        };
        if let (Some(delay), Some(callback)) = (self.reply_after, callback) {
            thread::spawn(move || {
                thread::sleep(delay);
                callback();
            });
        }
    }
}
