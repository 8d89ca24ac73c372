mod common;

use std::sync::Arc;

use brick_core::utils::{
    actor::{live_actors, release_all, Session},
    sim::{Call, Device, SimBrick},
    Motor, MotorKind, MotorPort,
};
use common::{fast_config, init_tracing};

// Kept alone in its own test binary: the registry is process-wide.
#[test]
fn test_release_all_closes_every_live_actor() {
    init_tracing();
    let brick = SimBrick::new();
    let session = Session::new();
    let motors: Vec<Motor> = [MotorPort::A, MotorPort::B, MotorPort::C]
        .into_iter()
        .map(|port| {
            Motor::open(Arc::new(brick.clone()), port, MotorKind::Large, session.token(), &fast_config()).unwrap()
        })
        .collect();
    motors[2].close();
    assert_eq!(live_actors(), 2);

    assert_eq!(release_all(), 2);
    assert!(motors.iter().all(|m| !m.is_open()));
    assert_eq!(live_actors(), 0);
    for port in [MotorPort::A, MotorPort::B, MotorPort::C] {
        assert_eq!(brick.calls(Device::Motor(port)).last(), Some(&Call::Close));
    }

    assert_eq!(release_all(), 0);
    assert!(session.is_active());

    // A running motor whose last proxy is dropped is still released.
    let motor = Motor::open(Arc::new(brick.clone()), MotorPort::D, MotorKind::Large, session.token(), &fast_config())
        .unwrap();
    let worker = motor.worker();
    motor.forward().unwrap();
    drop(motor);

    assert!(worker.is_finished());
    assert_eq!(
        brick.calls(Device::Motor(MotorPort::D)),
        vec![Call::Open, Call::Forward, Call::Stop { immediate: false }, Call::IsMoving, Call::Close]
    );
    assert!(!brick.motor_moving(MotorPort::D));
    assert_eq!(live_actors(), 0);
    assert_eq!(release_all(), 0);
}
