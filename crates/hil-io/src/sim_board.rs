use hil_spine::{
    Channel, DaqDevice, Encoder, EncoderDirection, EncoderMode, EncoderResolution, PinState,
    SyncMode, TelemetryCallback,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info};

/// Full-scale analog input voltage of the loopback wiring.
pub const ANALOG_FULL_SCALE_V: f64 = 3.3;

/// When the simulated board pushes telemetry frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryMode {
    /// One frame per auto-read period, independent of the host.
    Periodic,
    /// One frame after each bus transaction, once the delay has passed.
    ReplyAfter(Duration),
    /// Never answers.
    Silent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoardCommand {
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
}

#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    Connect { port: String, mode: SyncMode },
    Command(BoardCommand),
    Sync,
    Disconnect,
}

#[derive(Debug, Clone, Copy)]
struct EncoderState {
    mode: EncoderMode,
    direction: EncoderDirection,
    resolution: EncoderResolution,
    filter: u32,
    count: i64,
}

impl Default for EncoderState {
    fn default() -> Self {
        Self {
            mode: EncoderMode::Disabled,
            direction: EncoderDirection::Normal,
            resolution: EncoderResolution::X1,
            filter: 0,
            count: 0,
        }
    }
}

struct BoardState {
    connected: bool,
    sync_mode: SyncMode,
    pending: Vec<BoardCommand>,
    journal: Vec<JournalEntry>,

    digital_out: [PinState; 3],
    duty: [f64; 4],
    pwm_frequency_hz: f64,
    encoders: [EncoderState; 3],

    // Values as of the last telemetry frame.
    digital_in: [PinState; 3],
    analog_in: [f64; 4],
    encoder_counts: [i64; 3],

    auto_read: Option<Duration>,
    callback: Option<TelemetryCallback>,
    periodic_task: Option<JoinHandle<()>>,
    disable_lag: u32,
    frames: u64,
}

impl BoardState {
    fn new(disable_lag: u32) -> Self {
        Self {
            connected: false,
            sync_mode: SyncMode::Manual,
            pending: Vec::new(),
            journal: Vec::new(),
            digital_out: [PinState::Low; 3],
            duty: [0.0; 4],
            pwm_frequency_hz: 0.0,
            encoders: [EncoderState::default(); 3],
            digital_in: [PinState::Low; 3],
            analog_in: [0.0; 4],
            encoder_counts: [0; 3],
            auto_read: None,
            callback: None,
            periodic_task: None,
            disable_lag,
            frames: 0,
        }
    }

    /// Loopback wiring: inputs mirror outputs, each encoder is driven by the
    /// PWM channel with the same number.
    fn capture_frame(&mut self) {
        self.digital_in = self.digital_out;
        for (analog, duty) in self.analog_in.iter_mut().zip(self.duty) {
            *analog = duty.clamp(0.0, 100.0) * ANALOG_FULL_SCALE_V / 100.0;
        }
        for (encoder, duty) in self.encoders.iter_mut().zip(self.duty) {
            if encoder.mode == EncoderMode::Disabled {
                continue;
            }
            let sign = match encoder.direction {
                EncoderDirection::Normal => 1,
                EncoderDirection::Reversed => -1,
            };
            let pulses = (duty / 10.0).round() as i64;
            encoder.count += sign * pulses * encoder.resolution.edges_per_cycle();
        }
        for (count, encoder) in self.encoder_counts.iter_mut().zip(self.encoders) {
            *count = encoder.count;
        }
        self.frames += 1;
    }
}

fn lock(state: &Mutex<BoardState>) -> MutexGuard<'_, BoardState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Takes one frame and notifies the host side.
fn push_frame(state: &Mutex<BoardState>) {
    let callback = {
        let mut state = lock(state);
        if state.auto_read.is_none() {
            return;
        }
        state.capture_frame();
        state.callback.clone()
    };
    if let Some(callback) = callback {
        callback();
    }
}

/// In-process stand-in for the serial I/O board.
///
/// Clones share one board, so a test can keep a handle for inspection after
/// handing another to the controller. Telemetry is pushed from the board's
/// own tokio runtime, started at `connect`.
#[derive(Clone)]
pub struct SimulatedBoard {
    state: Arc<Mutex<BoardState>>,
    runtime: Arc<Mutex<Option<Runtime>>>,
    connect_result: bool,
    telemetry: TelemetryMode,
}

impl SimulatedBoard {
    pub fn new(telemetry: TelemetryMode) -> Self {
        Self {
            state: Arc::new(Mutex::new(BoardState::new(0))),
            runtime: Arc::new(Mutex::new(None)),
            connect_result: true,
            telemetry,
        }
    }

    /// `false` makes the board unreachable.
    pub fn with_connect_result(mut self, reachable: bool) -> Self {
        self.connect_result = reachable;
        self
    }

    /// Ignore the first `lag` telemetry-disable requests.
    pub fn with_disable_lag(self, lag: u32) -> Self {
        lock(&self.state).disable_lag = lag;
        self
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        lock(&self.state).journal.clone()
    }

    /// Journaled bus commands only, in the order they reached the board.
    pub fn commands(&self) -> Vec<BoardCommand> {
        lock(&self.state)
            .journal
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::Command(command) => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_journal(&self) {
        lock(&self.state).journal.clear();
    }

    pub fn frames(&self) -> u64 {
        lock(&self.state).frames
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    pub fn pwm_frequency_hz(&self) -> f64 {
        lock(&self.state).pwm_frequency_hz
    }

    pub fn applied_digital(&self) -> [PinState; 3] {
        lock(&self.state).digital_out
    }

    pub fn applied_duty(&self) -> [f64; 4] {
        lock(&self.state).duty
    }

    pub fn encoder_filter(&self, encoder: Encoder) -> u32 {
        lock(&self.state).encoders[encoder.index()].filter
    }

    /// Pushes a frame right now, from the calling thread.
    pub fn fire_telemetry(&self) {
        push_frame(&self.state);
    }

    fn submit(&mut self, command: BoardCommand) {
        let automatic = {
            let mut state = lock(&self.state);
            state.pending.push(command);
            state.sync_mode == SyncMode::Automatic
        };
        if automatic {
            self.sync();
        }
    }

    fn spawn_periodic(&self, period: Duration) -> Option<JoinHandle<()>> {
        let runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
        let state = Arc::clone(&self.state);
        runtime.as_ref().map(|runtime| {
            runtime.spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick completes immediately.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    push_frame(&state);
                }
            })
        })
    }

    fn spawn_reply(&self, delay: Duration) {
        let runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(runtime) = runtime.as_ref() {
            let state = Arc::clone(&self.state);
            runtime.spawn(async move {
                sleep(delay).await;
                push_frame(&state);
            });
        }
    }

    fn apply(&self, state: &mut BoardState, command: &BoardCommand) {
        match *command {
            BoardCommand::DigitalWrite(channel, level) => {
                if let Some(slot) = state.digital_out.get_mut(channel.index()) {
                    *slot = level;
                }
            }
            BoardCommand::PwmFrequency(hz) => state.pwm_frequency_hz = hz,
            BoardCommand::PwmDuty(channel, percent) => state.duty[channel.index()] = percent,
            BoardCommand::EncoderMode(encoder, mode) => {
                state.encoders[encoder.index()].mode = mode;
            }
            BoardCommand::EncoderDirection(encoder, direction) => {
                state.encoders[encoder.index()].direction = direction;
            }
            BoardCommand::EncoderResolution(encoder, resolution) => {
                state.encoders[encoder.index()].resolution = resolution;
            }
            BoardCommand::EncoderFilter(encoder, depth) => {
                state.encoders[encoder.index()].filter = depth;
            }
            BoardCommand::EncoderReset(encoder) => {
                state.encoders[encoder.index()].count = 0;
                state.encoder_counts[encoder.index()] = 0;
            }
            BoardCommand::EnableAutoRead(period) => {
                state.auto_read = Some(period);
                if self.telemetry == TelemetryMode::Periodic && state.periodic_task.is_none() {
                    state.periodic_task = self.spawn_periodic(period);
                }
            }
            BoardCommand::DisableAutoRead => {
                if state.disable_lag > 0 {
                    state.disable_lag -= 1;
                    debug!("simulated board ignored a telemetry disable request");
                } else {
                    state.auto_read = None;
                    if let Some(task) = state.periodic_task.take() {
                        task.abort();
                    }
                }
            }
        }
    }
}

impl Default for SimulatedBoard {
    fn default() -> Self {
        Self::new(TelemetryMode::Periodic)
    }
}

impl DaqDevice for SimulatedBoard {
    fn connect(&mut self, port: &str, mode: SyncMode) -> bool {
        lock(&self.state).journal.push(JournalEntry::Connect {
            port: port.to_string(),
            mode,
        });
        if !self.connect_result {
            error!(port, "simulated board is offline");
            return false;
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("sim-board-telemetry")
            .enable_time()
            .build();
        match runtime {
            Ok(runtime) => {
                *self.runtime.lock().unwrap_or_else(PoisonError::into_inner) = Some(runtime);
            }
            Err(e) => {
                error!(port, error = %e, "failed to start simulated board runtime");
                return false;
            }
        }

        let mut state = lock(&self.state);
        state.connected = true;
        state.sync_mode = mode;
        info!(port, ?mode, telemetry = ?self.telemetry, "simulated board connected");
        true
    }

    fn disconnect(&mut self) {
        {
            let mut state = lock(&self.state);
            state.journal.push(JournalEntry::Disconnect);
            state.connected = false;
            state.auto_read = None;
            state.callback = None;
            if let Some(task) = state.periodic_task.take() {
                task.abort();
            }
        }
        if let Some(runtime) = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            runtime.shutdown_background();
        }
    }

    fn digital_write(&mut self, channel: Channel, level: PinState) {
        self.submit(BoardCommand::DigitalWrite(channel, level));
    }

    fn digital_read(&self, channel: Channel) -> PinState {
        lock(&self.state)
            .digital_in
            .get(channel.index())
            .copied()
            .unwrap_or_default()
    }

    fn pwm_set_frequency(&mut self, hz: f64) {
        self.submit(BoardCommand::PwmFrequency(hz));
    }

    fn pwm_set_duty(&mut self, channel: Channel, percent: f64) {
        self.submit(BoardCommand::PwmDuty(channel, percent));
    }

    fn encoder_set_mode(&mut self, encoder: Encoder, mode: EncoderMode) {
        self.submit(BoardCommand::EncoderMode(encoder, mode));
    }

    fn encoder_set_direction(&mut self, encoder: Encoder, direction: EncoderDirection) {
        self.submit(BoardCommand::EncoderDirection(encoder, direction));
    }

    fn encoder_set_resolution(&mut self, encoder: Encoder, resolution: EncoderResolution) {
        self.submit(BoardCommand::EncoderResolution(encoder, resolution));
    }

    fn encoder_set_filter(&mut self, encoder: Encoder, depth: u32) {
        self.submit(BoardCommand::EncoderFilter(encoder, depth));
    }

    fn encoder_reset(&mut self, encoder: Encoder) {
        self.submit(BoardCommand::EncoderReset(encoder));
    }

    fn encoder_read(&self, encoder: Encoder) -> i64 {
        lock(&self.state).encoder_counts[encoder.index()]
    }

    fn analog_read(&self, channel: Channel) -> f64 {
        lock(&self.state).analog_in[channel.index()]
    }

    fn enable_auto_read(&mut self, period: Duration, on_data: TelemetryCallback) {
        lock(&self.state).callback = Some(on_data);
        self.submit(BoardCommand::EnableAutoRead(period));
    }

    fn disable_auto_read(&mut self) {
        self.submit(BoardCommand::DisableAutoRead);
    }

    fn is_auto_read_enabled(&self) -> bool {
        lock(&self.state).auto_read.is_some()
    }

    fn sync(&mut self) {
        let reply = {
            let mut state = lock(&self.state);
            if !state.connected {
                debug!("sync on a disconnected simulated board dropped");
                state.pending.clear();
                return;
            }
            let pending = std::mem::take(&mut state.pending);
            for command in &pending {
                self.apply(&mut state, command);
                state.journal.push(JournalEntry::Command(command.clone()));
            }
            state.journal.push(JournalEntry::Sync);
            state.auto_read.is_some()
        };
        if let (true, TelemetryMode::ReplyAfter(delay)) = (reply, self.telemetry) {
            self.spawn_reply(delay);
        }
    }
}
