use hil_io::{BoardCommand, JournalEntry, SimulatedBoard, TelemetryMode};
use hil_spine::{
    default_params, ActuatorInputs, BridgeError, Channel, Encoder, LifecycleController,
    LifecycleState, ParamList, ParamPosition, ParamValue, PinState, SyncMode, WaitOutcome,
};
use std::thread;
use std::time::{Duration, Instant};

fn configure(board: &SimulatedBoard, values: Vec<ParamValue>) -> LifecycleController<SimulatedBoard> {
    let mut controller =
        LifecycleController::new(board.clone()).with_drain_delay(Duration::from_millis(1));
    controller
        .configure(ParamList::new(values))
        .expect("board configured");
    controller
}

fn drive(duty: f64) -> ActuatorInputs {
    ActuatorInputs {
        digital: [1.0, 0.0, 1.0],
        duty: [duty, duty, duty, duty],
    }
}

#[test]
fn reply_two_ms_into_the_step_releases_the_wait() {
    let board = SimulatedBoard::new(TelemetryMode::ReplyAfter(Duration::from_millis(2)));
    let mut controller = configure(&board, default_params("sim", 10));
    // Let the answer to the setup transaction land before the first step.
    thread::sleep(Duration::from_millis(5));

    let start = Instant::now();
    let report = controller.step(&drive(50.0)).unwrap();
    let elapsed = start.elapsed();

    let Some(WaitOutcome::Released { waited }) = report.outcome else {
        panic!("expected telemetry before the timeout, got {:?}", report.outcome);
    };
    assert!(waited >= Duration::from_millis(1));
    assert!(elapsed < Duration::from_millis(11));

    let outputs = controller.output(0.01).unwrap();
    assert_eq!(outputs.digital, [1.0, 0.0, 1.0]);
    assert!((outputs.analog[0] - 1.65).abs() < 1e-9);
    // Encoders were reset and set to X4 quadrature; 50% duty adds 5 cycles.
    assert_eq!(outputs.encoders, [20.0, 20.0, 20.0]);
    controller.terminate().unwrap();
}

#[test]
fn silent_board_never_blocks_a_step() {
    let board = SimulatedBoard::new(TelemetryMode::Silent);
    let mut controller = configure(&board, default_params("sim", 4));
    controller.output(0.0).unwrap();

    for _ in 0..3 {
        let start = Instant::now();
        let report = controller.step(&drive(30.0)).unwrap();
        assert!(report.outcome.unwrap().is_timeout());
        assert!(start.elapsed() < Duration::from_micros(4400) + Duration::from_millis(10));
    }
    assert_eq!(controller.stats().sync_timeouts, 3);

    // Nothing came back, so the cached values are still the initial ones.
    let outputs = controller.output(0.012).unwrap();
    assert_eq!(outputs.digital, [0.0; 3]);
    assert!(outputs.elapsed_s > 0.0);
    controller.terminate().unwrap();
}

#[test]
fn periodic_telemetry_paces_the_steps() {
    let board = SimulatedBoard::new(TelemetryMode::Periodic);
    let mut controller = configure(&board, default_params("sim", 5));

    let start = Instant::now();
    let mut last_elapsed = 0.0;
    for index in 0..10u64 {
        let outputs = controller.output(index as f64 * 0.005).unwrap();
        assert!(outputs.elapsed_s >= last_elapsed);
        last_elapsed = outputs.elapsed_s;
        let report = controller.step(&drive(10.0)).unwrap();
        assert_eq!(report.step, index + 1);
    }
    let total = start.elapsed();
    assert!(total >= Duration::from_millis(25));
    assert!(total < Duration::from_millis(200));
    assert!(board.frames() >= 5);
    assert!(controller.stats().sync_timeouts < 10);
    controller.terminate().unwrap();
    assert!(!board.is_connected());
}

#[test]
fn unreachable_board_receives_no_setup() {
    let board = SimulatedBoard::new(TelemetryMode::Periodic).with_connect_result(false);
    let mut controller = LifecycleController::new(board.clone());
    let res = controller.configure(ParamList::new(default_params("COM7", 10)));
    assert!(matches!(res, Err(BridgeError::ConnectionFailure { ref port }) if port == "COM7"));
    assert_eq!(controller.state(), LifecycleState::Unusable);

    let report = controller.step(&drive(80.0)).unwrap();
    assert!(report.outcome.is_none());
    controller.output(0.0).unwrap();
    controller.terminate().unwrap();

    assert_eq!(
        board.journal(),
        vec![JournalEntry::Connect {
            port: "COM7".to_string(),
            mode: SyncMode::Manual
        }]
    );
}

#[test]
fn setup_reaches_the_board_in_one_transaction() {
    let board = SimulatedBoard::new(TelemetryMode::Silent);
    let mut values = default_params("sim", 10);
    values[ParamPosition::PwmFrequency.index()] = ParamValue::Number(20_000.0);
    values[ParamPosition::Enc2Filter.index()] = ParamValue::Number(6.0);
    let mut controller = configure(&board, values);

    let journal = board.journal();
    let syncs = journal.iter().filter(|e| **e == JournalEntry::Sync).count();
    assert_eq!(syncs, 1);
    assert_eq!(journal.last(), Some(&JournalEntry::Sync));
    assert_eq!(board.pwm_frequency_hz(), 20_000.0);
    assert_eq!(board.encoder_filter(Encoder::Enc2), 6);
    assert!(board
        .commands()
        .contains(&BoardCommand::EnableAutoRead(Duration::from_millis(10))));
    controller.terminate().unwrap();
}

#[test]
fn late_duplicate_frames_do_not_release_the_next_step() {
    let board = SimulatedBoard::new(TelemetryMode::Silent);
    let mut controller = configure(&board, default_params("sim", 3));

    controller.step(&drive(0.0)).unwrap();
    let discarded = controller.gate().discarded();
    board.fire_telemetry();
    board.fire_telemetry();
    assert_eq!(controller.gate().discarded(), discarded + 2);

    let report = controller.step(&drive(0.0)).unwrap();
    assert!(report.outcome.unwrap().is_timeout());
    controller.terminate().unwrap();
}

#[test]
fn shutdown_parks_outputs_then_drains_telemetry() {
    let board = SimulatedBoard::new(TelemetryMode::Periodic).with_disable_lag(2);
    let mut values = default_params("sim", 5);
    values[ParamPosition::GpioOutCh1FinalState.index()] = ParamValue::Number(2.0);
    values[ParamPosition::PwmCh2FinalDuty.index()] = ParamValue::Number(5.0);
    let mut controller = configure(&board, values);
    controller.step(&drive(90.0)).unwrap();
    board.clear_journal();

    controller.terminate().unwrap();

    let commands = board.commands();
    let first_disable = commands
        .iter()
        .position(|c| *c == BoardCommand::DisableAutoRead)
        .expect("telemetry disabled");
    let final_writes: Vec<_> = commands
        .iter()
        .filter(|c| matches!(c, BoardCommand::DigitalWrite(..) | BoardCommand::PwmDuty(..)))
        .collect();
    assert_eq!(final_writes.len(), 7);
    assert_eq!(first_disable, 7);
    assert_eq!(
        commands[0],
        BoardCommand::DigitalWrite(Channel::Ch1, PinState::High)
    );
    assert_eq!(board.applied_duty(), [0.0, 5.0, 0.0, 0.0]);
    assert_eq!(controller.stats().drain_attempts, 3);
    assert_eq!(board.journal().last(), Some(&JournalEntry::Disconnect));
    assert_eq!(controller.state(), LifecycleState::Terminated);
}
