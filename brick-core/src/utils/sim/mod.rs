//! In-process simulated brick.
//!
//! [`SimBrick`] implements [`DeviceHandleFactory`] with fake handles that
//! record every call in a shared journal, return programmable readings and
//! can be told to fail. Motors model motion with a fixed duration so close
//! and `is_moving` behave like the real thing.
//!
//! ```rust
//! use brick_core::utils::{
//!     handle::MotorHandle,
//!     sim::{Call, Device, SimBrick},
//!     DeviceHandleFactory, MotorKind, MotorPort,
//! };
//!
//! let brick = SimBrick::new();
//! let mut motor = brick.open_motor(MotorPort::B, MotorKind::Medium).unwrap();
//! motor.forward().unwrap();
//! assert_eq!(brick.calls(Device::Motor(MotorPort::B)), vec![Call::Open, Call::Forward]);
//! ```

mod clock;

pub use clock::ManualClock;

use std::{
    collections::VecDeque,
    fmt,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use hashbrown::{HashMap, HashSet};
use parking_lot::{Condvar, Mutex};

use crate::utils::{
    controllers::{Button, MotorKind, MotorPort, SensorPort, SensorType},
    handle::{
        AudioHandle, ColorSensorHandle, DeviceHandleFactory, GyroSensorHandle, KeypadHandle,
        MotorHandle, SensorHandle, TransportError, TransportResult, UltrasonicSensorHandle,
    },
};

/// Which simulated device a call went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Motor(MotorPort),
    Sensor(SensorPort),
    Audio,
    Keypad,
}

impl fmt::Display for Device {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Device::Motor(port) => write!(f, "motor {port}"),
            Device::Sensor(port) => write!(f, "sensor {port}"),
            Device::Audio => f.write_str("audio"),
            Device::Keypad => f.write_str("keypad"),
        }
    }
}

/// A handle call as recorded in the journal.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open,
    Close,
    // motor
    Forward,
    Backward,
    Stop { immediate: bool },
    SetSpeed(u32),
    Speed,
    MaxSpeed,
    IsMoving,
    IsStalled,
    Rotate { degrees: i32, immediate: bool },
    RotateTo { degrees: i32, immediate: bool },
    ResetTachoCount,
    TachoCount,
    // sensors
    SampleSize,
    SetMode(u8),
    FetchSample,
    FetchColorId,
    FetchAmbient,
    FetchRed,
    FetchRgb,
    SetFloodlight(i32),
    Floodlight,
    ResetGyro,
    FetchRate,
    FetchAngle,
    FetchAngleAndRate,
    FetchDistance,
    FetchListen,
    Enable,
    Disable,
    IsEnabled,
    // audio
    Volume,
    SetVolume(i32),
    PlayTone { frequency_hz: i32, duration_ms: i32 },
    // keypad
    DiscardEvents,
    WaitForPressAndRelease(String),
    WaitForAnyPress,
}

impl Call {
    /// Whether this call reads a sensor value.
    pub fn is_fetch(&self) -> bool {
        matches!(
            self,
            Call::FetchSample
                | Call::FetchColorId
                | Call::FetchAmbient
                | Call::FetchRed
                | Call::FetchRgb
                | Call::FetchRate
                | Call::FetchAngle
                | Call::FetchAngleAndRate
                | Call::FetchDistance
                | Call::FetchListen
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub device: Device,
    pub call: Call,
}

#[derive(Debug, Clone, Copy)]
enum Motion {
    Idle,
    Running,
    Until(Instant),
}

#[derive(Debug)]
struct SimMotor {
    kind: MotorKind,
    speed: u32,
    tacho: i32,
    motion: Motion,
    stalled: bool,
}

impl SimMotor {
    fn new(kind: MotorKind) -> Self {
        Self {
            kind,
            speed: 360,
            tacho: 0,
            motion: Motion::Idle,
            stalled: false,
        }
    }

    fn is_moving(&mut self) -> bool {
        match self.motion {
            Motion::Running => true,
            Motion::Until(end) if Instant::now() < end => true,
            _ => {
                self.motion = Motion::Idle;
                false
            }
        }
    }
}

#[derive(Debug)]
struct SimSensor {
    kind: SensorType,
    mode: u8,
    floodlight: i32,
    enabled: bool,
    readings: HashMap<u8, Vec<f32>>,
}

impl SimSensor {
    fn new(kind: SensorType) -> Self {
        Self {
            kind,
            mode: 0,
            floodlight: -1,
            enabled: true,
            readings: HashMap::new(),
        }
    }

    fn reading(
        &self,
        mode: u8,
    ) -> Vec<f32> {
        self.readings
            .get(&mode)
            .cloned()
            .unwrap_or_else(|| vec![0.0; default_sample_size(self.kind, mode)])
    }
}

fn default_sample_size(
    kind: SensorType,
    mode: u8,
) -> usize {
    match (kind, mode) {
        (SensorType::Color, 2) => 3,
        (SensorType::Gyro, 0) => 2,
        _ => 1,
    }
}

#[derive(Debug, Default)]
struct Faults {
    open: HashSet<Device>,
    calls: HashSet<Device>,
}

#[derive(Debug)]
struct SimState {
    journal: Mutex<Vec<Event>>,
    journal_changed: Condvar,
    motors: Mutex<HashMap<MotorPort, SimMotor>>,
    sensors: Mutex<HashMap<SensorPort, SimSensor>>,
    volume: Mutex<i32>,
    keys: Mutex<VecDeque<i32>>,
    key_pressed: Condvar,
    faults: Mutex<Faults>,
    motion_time: Mutex<Duration>,
}

impl SimState {
    fn record(
        &self,
        device: Device,
        call: Call,
    ) -> TransportResult<()> {
        self.journal.lock().push(Event { device, call });
        self.journal_changed.notify_all();
        if self.faults.lock().calls.contains(&device) {
            return Err(TransportError::new(format!("simulated failure on {device}")));
        }
        Ok(())
    }

    fn check_open(
        &self,
        device: Device,
    ) -> TransportResult<()> {
        if self.faults.lock().open.contains(&device) {
            return Err(TransportError::new(format!("no device attached at {device}")));
        }
        self.record(device, Call::Open)
    }

    fn motor<T>(
        &self,
        port: MotorPort,
        f: impl FnOnce(&mut SimMotor) -> T,
    ) -> T {
        let mut motors = self.motors.lock();
        f(motors.entry(port).or_insert_with(|| SimMotor::new(MotorKind::Large)))
    }

    fn sensor<T>(
        &self,
        port: SensorPort,
        f: impl FnOnce(&mut SimSensor) -> T,
    ) -> T {
        let mut sensors = self.sensors.lock();
        f(sensors.entry(port).or_insert_with(|| SimSensor::new(SensorType::Touch)))
    }
}

/// Simulated brick. Clones share the same devices and journal.
#[derive(Debug, Clone)]
pub struct SimBrick {
    state: Arc<SimState>,
}

impl Default for SimBrick {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBrick {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SimState {
                journal: Mutex::new(Vec::new()),
                journal_changed: Condvar::new(),
                motors: Mutex::new(HashMap::new()),
                sensors: Mutex::new(HashMap::new()),
                volume: Mutex::new(50),
                keys: Mutex::new(VecDeque::new()),
                key_pressed: Condvar::new(),
                faults: Mutex::new(Faults::default()),
                motion_time: Mutex::new(Duration::from_millis(20)),
            }),
        }
    }

    /// Every call made so far, in order.
    pub fn journal(&self) -> Vec<Event> {
        self.state.journal.lock().clone()
    }

    /// Calls made on one device, in order.
    pub fn calls(
        &self,
        device: Device,
    ) -> Vec<Call> {
        self.state
            .journal
            .lock()
            .iter()
            .filter(|e| e.device == device)
            .map(|e| e.call.clone())
            .collect()
    }

    pub fn clear_journal(&self) {
        self.state.journal.lock().clear();
    }

    /// Block until `predicate` holds for the journal or `timeout` passes.
    pub fn wait_for(
        &self,
        timeout: Duration,
        predicate: impl Fn(&[Event]) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut journal = self.state.journal.lock();
        while !predicate(&journal) {
            if self
                .state
                .journal_changed
                .wait_until(&mut journal, deadline)
                .timed_out()
            {
                return predicate(&journal);
            }
        }
        true
    }

    /// How long a motor rotation takes.
    pub fn set_motion_time(
        &self,
        duration: Duration,
    ) {
        *self.state.motion_time.lock() = duration;
    }

    pub fn set_tacho(
        &self,
        port: MotorPort,
        degrees: i32,
    ) {
        self.state.motor(port, |m| m.tacho = degrees);
    }

    pub fn set_stalled(
        &self,
        port: MotorPort,
        stalled: bool,
    ) {
        self.state.motor(port, |m| m.stalled = stalled);
    }

    /// Whether the simulated motor is currently in motion.
    pub fn motor_moving(
        &self,
        port: MotorPort,
    ) -> bool {
        self.state.motor(port, SimMotor::is_moving)
    }

    /// Program the values returned for `mode` of the sensor on `port`.
    pub fn set_sample(
        &self,
        port: SensorPort,
        mode: u8,
        values: Vec<f32>,
    ) {
        self.state.sensor(port, |s| {
            s.readings.insert(mode, values);
        });
    }

    /// Currently selected mode of the sensor on `port`.
    pub fn sensor_mode(
        &self,
        port: SensorPort,
    ) -> u8 {
        self.state.sensor(port, |s| s.mode)
    }

    pub fn floodlight(
        &self,
        port: SensorPort,
    ) -> i32 {
        self.state.sensor(port, |s| s.floodlight)
    }

    pub fn volume(&self) -> i32 {
        *self.state.volume.lock()
    }

    /// Make opening `device` fail until [`SimBrick::heal`] is called.
    pub fn fail_open(
        &self,
        device: Device,
    ) {
        self.state.faults.lock().open.insert(device);
    }

    /// Make every call on `device` fail until [`SimBrick::heal`] is called.
    pub fn fail_calls(
        &self,
        device: Device,
    ) {
        self.state.faults.lock().calls.insert(device);
    }

    pub fn heal(
        &self,
        device: Device,
    ) {
        let mut faults = self.state.faults.lock();
        faults.open.remove(&device);
        faults.calls.remove(&device);
    }

    /// Queue a key press; `mask` is a bit set of button ids.
    pub fn press(
        &self,
        mask: i32,
    ) {
        self.state.keys.lock().push_back(mask);
        self.state.key_pressed.notify_all();
    }

    fn motor_handle(
        &self,
        port: MotorPort,
    ) -> SimMotorHandle {
        SimMotorHandle {
            port,
            state: Arc::clone(&self.state),
        }
    }

    fn sensor_handle(
        &self,
        port: SensorPort,
        kind: SensorType,
    ) -> TransportResult<SimSensorHandle> {
        self.state.check_open(Device::Sensor(port))?;
        self.state.sensor(port, |s| {
            s.kind = kind;
            s.mode = 0;
        });
        Ok(SimSensorHandle {
            port,
            state: Arc::clone(&self.state),
        })
    }
}

impl DeviceHandleFactory for SimBrick {
    fn open_motor(
        &self,
        port: MotorPort,
        kind: MotorKind,
    ) -> TransportResult<Box<dyn MotorHandle>> {
        self.state.check_open(Device::Motor(port))?;
        self.state.motor(port, |m| m.kind = kind);
        Ok(Box::new(self.motor_handle(port)))
    }

    fn open_touch_sensor(
        &self,
        port: SensorPort,
    ) -> TransportResult<Box<dyn SensorHandle>> {
        Ok(Box::new(self.sensor_handle(port, SensorType::Touch)?))
    }

    fn open_color_sensor(
        &self,
        port: SensorPort,
    ) -> TransportResult<Box<dyn ColorSensorHandle>> {
        Ok(Box::new(self.sensor_handle(port, SensorType::Color)?))
    }

    fn open_gyro_sensor(
        &self,
        port: SensorPort,
    ) -> TransportResult<Box<dyn GyroSensorHandle>> {
        Ok(Box::new(self.sensor_handle(port, SensorType::Gyro)?))
    }

    fn open_ultrasonic_sensor(
        &self,
        port: SensorPort,
    ) -> TransportResult<Box<dyn UltrasonicSensorHandle>> {
        Ok(Box::new(self.sensor_handle(port, SensorType::Ultrasonic)?))
    }

    fn open_audio(&self) -> TransportResult<Box<dyn AudioHandle>> {
        self.state.check_open(Device::Audio)?;
        Ok(Box::new(SimAudioHandle {
            state: Arc::clone(&self.state),
        }))
    }

    fn open_keypad(&self) -> TransportResult<Box<dyn KeypadHandle>> {
        self.state.check_open(Device::Keypad)?;
        Ok(Box::new(SimKeypadHandle {
            state: Arc::clone(&self.state),
        }))
    }
}

struct SimMotorHandle {
    port: MotorPort,
    state: Arc<SimState>,
}

impl SimMotorHandle {
    fn record(
        &self,
        call: Call,
    ) -> TransportResult<()> {
        self.state.record(Device::Motor(self.port), call)
    }

    fn start_rotation(
        &self,
        target: impl FnOnce(i32) -> i32,
        immediate_return: bool,
    ) {
        let duration = *self.state.motion_time.lock();
        let end = Instant::now() + duration;
        self.state.motor(self.port, |m| {
            m.tacho = target(m.tacho);
            m.motion = Motion::Until(end);
        });
        if !immediate_return {
            thread::sleep(duration);
            self.state.motor(self.port, |m| m.motion = Motion::Idle);
        }
    }
}

impl MotorHandle for SimMotorHandle {
    fn forward(&mut self) -> TransportResult<()> {
        self.record(Call::Forward)?;
        self.state.motor(self.port, |m| m.motion = Motion::Running);
        Ok(())
    }

    fn backward(&mut self) -> TransportResult<()> {
        self.record(Call::Backward)?;
        self.state.motor(self.port, |m| m.motion = Motion::Running);
        Ok(())
    }

    fn stop(
        &mut self,
        immediate_return: bool,
    ) -> TransportResult<()> {
        self.record(Call::Stop {
            immediate: immediate_return,
        })?;
        self.state.motor(self.port, |m| m.motion = Motion::Idle);
        Ok(())
    }

    fn set_speed(
        &mut self,
        speed: u32,
    ) -> TransportResult<()> {
        self.record(Call::SetSpeed(speed))?;
        self.state.motor(self.port, |m| m.speed = speed);
        Ok(())
    }

    fn speed(&mut self) -> TransportResult<u32> {
        self.record(Call::Speed)?;
        Ok(self.state.motor(self.port, |m| m.speed))
    }

    fn max_speed(&mut self) -> TransportResult<f32> {
        self.record(Call::MaxSpeed)?;
        Ok(self.state.motor(self.port, |m| match m.kind {
            MotorKind::Large => 740.0,
            MotorKind::Medium => 1050.0,
        }))
    }

    fn is_moving(&mut self) -> TransportResult<bool> {
        self.record(Call::IsMoving)?;
        Ok(self.state.motor(self.port, SimMotor::is_moving))
    }

    fn is_stalled(&mut self) -> TransportResult<bool> {
        self.record(Call::IsStalled)?;
        Ok(self.state.motor(self.port, |m| m.stalled))
    }

    fn rotate(
        &mut self,
        degrees: i32,
        immediate_return: bool,
    ) -> TransportResult<()> {
        self.record(Call::Rotate {
            degrees,
            immediate: immediate_return,
        })?;
        self.start_rotation(|tacho| tacho + degrees, immediate_return);
        Ok(())
    }

    fn rotate_to(
        &mut self,
        degrees: i32,
        immediate_return: bool,
    ) -> TransportResult<()> {
        self.record(Call::RotateTo {
            degrees,
            immediate: immediate_return,
        })?;
        self.start_rotation(|_| degrees, immediate_return);
        Ok(())
    }

    fn reset_tacho_count(&mut self) -> TransportResult<()> {
        self.record(Call::ResetTachoCount)?;
        self.state.motor(self.port, |m| m.tacho = 0);
        Ok(())
    }

    fn tacho_count(&mut self) -> TransportResult<i32> {
        self.record(Call::TachoCount)?;
        Ok(self.state.motor(self.port, |m| m.tacho))
    }

    fn close(&mut self) -> TransportResult<()> {
        self.record(Call::Close)
    }
}

struct SimSensorHandle {
    port: SensorPort,
    state: Arc<SimState>,
}

impl SimSensorHandle {
    fn record(
        &self,
        call: Call,
    ) -> TransportResult<()> {
        self.state.record(Device::Sensor(self.port), call)
    }

    fn fetch(
        &self,
        call: Call,
        mode: u8,
    ) -> TransportResult<Vec<f32>> {
        self.record(call)?;
        Ok(self.state.sensor(self.port, |s| s.reading(mode)))
    }
}

impl SensorHandle for SimSensorHandle {
    fn sample_size(&mut self) -> TransportResult<usize> {
        self.record(Call::SampleSize)?;
        Ok(self.state.sensor(self.port, |s| s.reading(s.mode).len()))
    }

    fn set_current_mode(
        &mut self,
        mode: u8,
    ) -> TransportResult<()> {
        self.record(Call::SetMode(mode))?;
        self.state.sensor(self.port, |s| s.mode = mode);
        Ok(())
    }

    fn fetch_sample(
        &mut self,
        sample: &mut [f32],
        offset: usize,
    ) -> TransportResult<()> {
        self.record(Call::FetchSample)?;
        let values = self.state.sensor(self.port, |s| s.reading(s.mode));
        let Some(dest) = sample.get_mut(offset..) else {
            return Err(TransportError::new("sample offset out of range"));
        };
        for (slot, value) in dest.iter_mut().zip(values) {
            *slot = value;
        }
        Ok(())
    }

    fn close(&mut self) -> TransportResult<()> {
        self.record(Call::Close)
    }
}

impl ColorSensorHandle for SimSensorHandle {
    fn fetch_color_id(&mut self) -> TransportResult<Vec<f32>> {
        self.fetch(Call::FetchColorId, 0)
    }

    fn fetch_ambient(&mut self) -> TransportResult<Vec<f32>> {
        self.fetch(Call::FetchAmbient, 3)
    }

    fn fetch_red(&mut self) -> TransportResult<Vec<f32>> {
        self.fetch(Call::FetchRed, 1)
    }

    fn fetch_rgb(&mut self) -> TransportResult<Vec<f32>> {
        self.fetch(Call::FetchRgb, 2)
    }

    fn set_floodlight(
        &mut self,
        color_id: i32,
    ) -> TransportResult<()> {
        self.record(Call::SetFloodlight(color_id))?;
        self.state.sensor(self.port, |s| s.floodlight = color_id);
        Ok(())
    }

    fn floodlight(&mut self) -> TransportResult<i32> {
        self.record(Call::Floodlight)?;
        Ok(self.state.sensor(self.port, |s| s.floodlight))
    }
}

impl GyroSensorHandle for SimSensorHandle {
    fn reset(&mut self) -> TransportResult<()> {
        self.record(Call::ResetGyro)?;
        self.state.sensor(self.port, |s| {
            s.readings.remove(&0);
            s.readings.remove(&1);
        });
        Ok(())
    }

    fn fetch_rate(&mut self) -> TransportResult<Vec<f32>> {
        self.fetch(Call::FetchRate, 2)
    }

    fn fetch_angle(&mut self) -> TransportResult<Vec<f32>> {
        self.fetch(Call::FetchAngle, 1)
    }

    fn fetch_angle_and_rate(&mut self) -> TransportResult<Vec<f32>> {
        self.fetch(Call::FetchAngleAndRate, 0)
    }
}

impl UltrasonicSensorHandle for SimSensorHandle {
    fn fetch_distance(&mut self) -> TransportResult<Vec<f32>> {
        self.fetch(Call::FetchDistance, 0)
    }

    fn fetch_listen(&mut self) -> TransportResult<Vec<f32>> {
        self.fetch(Call::FetchListen, 1)
    }

    fn enable(&mut self) -> TransportResult<()> {
        self.record(Call::Enable)?;
        self.state.sensor(self.port, |s| s.enabled = true);
        Ok(())
    }

    fn disable(&mut self) -> TransportResult<()> {
        self.record(Call::Disable)?;
        self.state.sensor(self.port, |s| s.enabled = false);
        Ok(())
    }

    fn is_enabled(&mut self) -> TransportResult<bool> {
        self.record(Call::IsEnabled)?;
        Ok(self.state.sensor(self.port, |s| s.enabled))
    }
}

struct SimAudioHandle {
    state: Arc<SimState>,
}

impl AudioHandle for SimAudioHandle {
    fn volume(&mut self) -> TransportResult<i32> {
        self.state.record(Device::Audio, Call::Volume)?;
        Ok(*self.state.volume.lock())
    }

    fn set_volume(
        &mut self,
        volume: i32,
    ) -> TransportResult<()> {
        self.state.record(Device::Audio, Call::SetVolume(volume))?;
        *self.state.volume.lock() = volume;
        Ok(())
    }

    fn play_tone(
        &mut self,
        frequency_hz: i32,
        duration_ms: i32,
    ) -> TransportResult<()> {
        self.state.record(
            Device::Audio,
            Call::PlayTone {
                frequency_hz,
                duration_ms,
            },
        )
    }
}

struct SimKeypadHandle {
    state: Arc<SimState>,
}

impl SimKeypadHandle {
    fn next_press(&self) -> i32 {
        let mut keys = self.state.keys.lock();
        loop {
            if let Some(mask) = keys.pop_front() {
                return mask;
            }
            self.state.key_pressed.wait(&mut keys);
        }
    }
}

impl KeypadHandle for SimKeypadHandle {
    fn discard_events(&mut self) -> TransportResult<()> {
        self.state.record(Device::Keypad, Call::DiscardEvents)?;
        self.state.keys.lock().clear();
        Ok(())
    }

    fn wait_for_press_and_release(
        &mut self,
        key: &str,
    ) -> TransportResult<()> {
        self.state
            .record(Device::Keypad, Call::WaitForPressAndRelease(key.to_owned()))?;
        let id = Button::ALL
            .into_iter()
            .find(|b| b.key_name() == key)
            .map(Button::id)
            .ok_or_else(|| TransportError::new(format!("unknown key {key}")))?;
        while self.next_press() & id == 0 {}
        Ok(())
    }

    fn wait_for_any_press(&mut self) -> TransportResult<i32> {
        self.state.record(Device::Keypad, Call::WaitForAnyPress)?;
        Ok(self.next_press())
    }
}
