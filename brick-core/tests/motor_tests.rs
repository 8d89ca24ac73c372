mod common;

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use brick_core::utils::{
    actor::Session,
    error::{ArgumentError, DeviceError},
    sim::{Call, Device, SimBrick},
    Motor, MotorKind, MotorPort, RobotConfig,
};
use common::{fast_config, init_tracing, WAIT};

fn open(
    brick: &SimBrick,
    session: &Session,
    port: MotorPort,
    config: &RobotConfig,
) -> Motor {
    Motor::open(Arc::new(brick.clone()), port, MotorKind::Large, session.token(), config).unwrap()
}

/// Calls on the motor after its open.
fn motor_calls(
    brick: &SimBrick,
    port: MotorPort,
) -> Vec<Call> {
    brick.calls(Device::Motor(port)).into_iter().skip(1).collect()
}

#[test]
fn test_commands_reach_handle_in_issue_order() {
    init_tracing();
    let brick = SimBrick::new();
    let session = Session::new();
    let motor = open(&brick, &session, MotorPort::A, &fast_config());

    motor.forward().unwrap();
    motor.set_speed(200).unwrap();
    motor.backward().unwrap();
    motor.stop().unwrap();
    motor.tacho_count().unwrap();

    assert_eq!(
        motor_calls(&brick, MotorPort::A),
        vec![
            Call::Forward,
            Call::SetSpeed(200),
            Call::Backward,
            Call::Stop { immediate: true },
            Call::TachoCount,
        ]
    );
    motor.close();
}

#[test]
fn test_negative_speed_is_rejected_before_queueing() {
    init_tracing();
    let brick = SimBrick::new();
    let session = Session::new();
    let motor = open(&brick, &session, MotorPort::A, &fast_config());

    let err = motor.set_speed(-1).unwrap_err();
    assert!(matches!(err, DeviceError::Argument(ArgumentError::NegativeSpeed(-1))));
    assert!(!err.is_fatal());

    motor.close();
    assert!(!motor_calls(&brick, MotorPort::A).iter().any(|c| matches!(c, Call::SetSpeed(_))));
}

#[test]
fn test_tacho_count_round_trip() {
    init_tracing();
    let brick = SimBrick::new();
    brick.set_tacho(MotorPort::C, 42);
    let session = Session::new();
    let motor = open(&brick, &session, MotorPort::C, &fast_config());

    assert_eq!(motor.tacho_count().unwrap(), 42);
    motor.reset_tacho_count().unwrap();
    assert_eq!(motor.tacho_count().unwrap(), 0);
    motor.close();
}

#[test]
fn test_readings() {
    init_tracing();
    let brick = SimBrick::new();
    let session = Session::new();
    let motor = open(&brick, &session, MotorPort::B, &fast_config());

    motor.set_speed(500).unwrap();
    assert_eq!(motor.speed().unwrap(), 500);
    assert_eq!(motor.max_speed().unwrap(), 740.0);
    assert!(!motor.is_stalled().unwrap());
    brick.set_stalled(MotorPort::B, true);
    assert!(motor.is_stalled().unwrap());
    motor.close();
}

#[test]
fn test_sync_rotation_blocks_until_motion_completes() {
    init_tracing();
    let brick = SimBrick::new();
    brick.set_motion_time(Duration::from_millis(60));
    let session = Session::new();
    let motor = open(&brick, &session, MotorPort::A, &fast_config());

    let start = Instant::now();
    motor.rotate(90, false).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(60));
    assert!(!brick.motor_moving(MotorPort::A));
    assert_eq!(motor.tacho_count().unwrap(), 90);

    motor.rotate_to(-30, false).unwrap();
    assert_eq!(motor.tacho_count().unwrap(), -30);
    motor.close();
}

#[test]
fn test_async_rotation_returns_while_moving() {
    init_tracing();
    let brick = SimBrick::new();
    brick.set_motion_time(Duration::from_millis(200));
    let session = Session::new();
    let motor = open(&brick, &session, MotorPort::A, &fast_config());

    motor.rotate(180, true).unwrap();
    assert!(motor.is_moving().unwrap());
    motor.close();
}

#[test]
fn test_close_waits_for_motion_to_finish() {
    init_tracing();
    let brick = SimBrick::new();
    brick.set_motion_time(Duration::from_millis(100));
    let session = Session::new();
    let motor = open(&brick, &session, MotorPort::D, &fast_config());

    motor.rotate(360, true).unwrap();
    motor.close();

    let calls = motor_calls(&brick, MotorPort::D);
    assert_eq!(calls.last(), Some(&Call::Close));
    assert!(calls.contains(&Call::IsMoving));
    assert!(!calls.iter().any(|c| matches!(c, Call::Stop { .. })));
    assert!(!brick.motor_moving(MotorPort::D));
    assert!(!motor.is_open());
}

#[test]
fn test_close_brakes_rotation_that_outlasts_window() {
    init_tracing();
    let brick = SimBrick::new();
    brick.set_motion_time(Duration::from_secs(2));
    let config = RobotConfig {
        motion_settle_timeout_ms: 30,
        ..fast_config()
    };
    let session = Session::new();
    let motor = open(&brick, &session, MotorPort::A, &config);

    motor.rotate(3600, true).unwrap();
    let start = Instant::now();
    motor.close();
    assert!(start.elapsed() < Duration::from_secs(1));

    let calls = motor_calls(&brick, MotorPort::A);
    let brake = calls.iter().position(|c| *c == Call::Stop { immediate: false });
    let close = calls.iter().position(|c| *c == Call::Close);
    assert!(brake.is_some() && close.is_some() && brake < close, "{calls:?}");
    assert!(calls[..brake.unwrap()].contains(&Call::IsMoving), "{calls:?}");
}

#[test]
fn test_close_brakes_continuous_motion_at_once() {
    init_tracing();
    let brick = SimBrick::new();
    let config = RobotConfig {
        motion_settle_timeout_ms: 10_000,
        ..fast_config()
    };
    let session = Session::new();
    let motor = open(&brick, &session, MotorPort::B, &config);

    motor.backward().unwrap();
    let start = Instant::now();
    motor.close();
    assert!(start.elapsed() < Duration::from_secs(2));

    assert_eq!(
        motor_calls(&brick, MotorPort::B),
        vec![Call::Backward, Call::Stop { immediate: false }, Call::IsMoving, Call::Close]
    );
    assert!(!brick.motor_moving(MotorPort::B));
}

#[test]
fn test_double_close_releases_handle_once() {
    init_tracing();
    let brick = SimBrick::new();
    let session = Session::new();
    let motor = open(&brick, &session, MotorPort::B, &fast_config());

    motor.close();
    motor.clone().close();

    let closes = motor_calls(&brick, MotorPort::B).into_iter().filter(|c| *c == Call::Close).count();
    assert_eq!(closes, 1);
    assert!(motor.worker().join().is_ok());
}

#[test]
fn test_commands_after_close_are_rejected() {
    init_tracing();
    let brick = SimBrick::new();
    let session = Session::new();
    let motor = open(&brick, &session, MotorPort::B, &fast_config());
    motor.close();

    assert!(matches!(motor.forward(), Err(DeviceError::Closed(_))));
    assert!(matches!(motor.tacho_count(), Err(DeviceError::Closed(_))));
}

#[test]
fn test_transport_failure_is_fatal() {
    init_tracing();
    let brick = SimBrick::new();
    let session = Session::new();
    let motor = open(&brick, &session, MotorPort::C, &fast_config());

    brick.fail_calls(Device::Motor(MotorPort::C));
    let err = motor.tacho_count().unwrap_err();
    assert!(matches!(err, DeviceError::Transport { ref port, .. } if port == "C"), "{err:?}");
    assert!(motor.worker().join().is_err());

    brick.heal(Device::Motor(MotorPort::C));
    assert!(motor.forward().unwrap_err().is_fatal());
}

#[test]
fn test_open_failure_names_port_and_device() {
    init_tracing();
    let brick = SimBrick::new();
    brick.fail_open(Device::Motor(MotorPort::A));
    let session = Session::new();

    let err = Motor::open(
        Arc::new(brick.clone()),
        MotorPort::A,
        MotorKind::Medium,
        session.token(),
        &fast_config(),
    )
    .unwrap_err();
    assert!(matches!(err, DeviceError::Open { ref port, ref device, .. } if port == "A" && device == "motor (M)"));
}

#[test]
fn test_ports_do_not_block_each_other() {
    init_tracing();
    let brick = SimBrick::new();
    brick.set_motion_time(Duration::from_millis(400));
    let session = Session::new();
    let a = open(&brick, &session, MotorPort::A, &fast_config());
    let b = open(&brick, &session, MotorPort::B, &fast_config());

    let rotating = {
        let a = a.clone();
        thread::spawn(move || a.rotate(720, false))
    };
    assert!(brick.wait_for(WAIT, |journal| {
        journal.iter().any(|e| e.device == Device::Motor(MotorPort::A) && matches!(e.call, Call::Rotate { .. }))
    }));

    let start = Instant::now();
    b.forward().unwrap();
    assert_eq!(b.tacho_count().unwrap(), 0);
    assert!(start.elapsed() < Duration::from_millis(300));
    assert!(!rotating.is_finished());

    rotating.join().unwrap().unwrap();
    a.close();
    b.stop().unwrap();
    b.close();
}
