mod common;

use std::sync::Arc;

use brick_core::utils::{
    actor::{live_actors, release_on_exit},
    sim::{Call, Device, SimBrick},
    MotorPort, Robot, SensorPort,
};
use common::{fast_config, init_tracing};

// Own test binary: the guard releases every actor in the process.
#[test]
fn test_exit_guard_releases_remaining_actors() {
    init_tracing();
    let brick = SimBrick::new();
    let robot = Robot::new(Arc::new(brick.clone()), fast_config());
    let motor = robot.large_motor(MotorPort::A).unwrap();
    let sonar = robot.ultrasonic_sensor(SensorPort::S3).unwrap();
    motor.forward().unwrap();

    {
        let _guard = release_on_exit();
        assert_eq!(live_actors(), 2);
    }

    assert!(!motor.is_open());
    assert!(!sonar.is_open());
    assert_eq!(live_actors(), 0);
    assert_eq!(brick.calls(Device::Motor(MotorPort::A)).last(), Some(&Call::Close));
    assert_eq!(brick.calls(Device::Sensor(SensorPort::S3)).last(), Some(&Call::Close));
    assert!(robot.motor_ports().is_empty());
    assert!(!robot.is_closed());
}
