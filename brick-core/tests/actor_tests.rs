mod common;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use brick_core::utils::{
    actor::{Command, CommandError, DeviceActor, Executor, Session},
    config::RobotConfig,
    error::DeviceError,
    handle::TransportError,
};
use common::{fast_config, init_tracing};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Push,
    Count,
    Bogus,
    Fail,
    Slow,
    Panic,
}

/// Executor that appends pushed values to a shared log.
#[derive(Default, Clone)]
struct Recorder {
    log: Arc<Mutex<Vec<i32>>>,
    released: Arc<AtomicUsize>,
    absent: bool,
}

impl Executor for Recorder {
    type Kind = Op;
    type Value = i32;
    type Handle = ();

    fn label(&self) -> String {
        "T1".into()
    }

    fn device(&self) -> String {
        "recorder".into()
    }

    fn open(&mut self) -> Result<(), TransportError> {
        if self.absent {
            return Err(TransportError::new("nothing attached"));
        }
        Ok(())
    }

    fn execute(
        &mut self,
        _handle: &mut (),
        command: &Command<Op, i32>,
    ) -> Result<(), CommandError> {
        match command.kind() {
            Some(Op::Push) => {
                let value = command.input().unwrap_or(-1);
                self.log.lock().push(value);
                command.clear();
            }
            Some(Op::Count) | None => command.fill(self.log.lock().len() as i32),
            Some(Op::Bogus) => return Err(CommandError::Malformed("bogus".into())),
            Some(Op::Fail) => return Err(TransportError::new("link lost").into()),
            Some(Op::Slow) => {
                thread::sleep(Duration::from_millis(50));
                command.clear();
            }
            Some(Op::Panic) => panic!("recorder blew up"),
        }
        Ok(())
    }

    fn release(
        &mut self,
        _handle: (),
        _config: &RobotConfig,
    ) -> Result<(), TransportError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn push(value: i32) -> Command<Op, i32> {
    Command::with_input(Some(Op::Push), value)
}

#[test]
fn test_commands_run_in_issue_order() {
    init_tracing();
    let session = Session::new();
    let recorder = Recorder::default();
    let actor = DeviceActor::spawn(recorder.clone(), session.token(), &fast_config()).unwrap();

    for i in 0..100 {
        actor.enqueue(push(i)).unwrap();
    }
    assert_eq!(actor.request(Some(Op::Count)).unwrap(), 100);
    assert_eq!(*recorder.log.lock(), (0..100).collect::<Vec<_>>());
    actor.close();
}

#[test]
fn test_sync_action_returns_after_it_was_applied() {
    init_tracing();
    let session = Session::new();
    let recorder = Recorder::default();
    let actor = DeviceActor::spawn(recorder.clone(), session.token(), &fast_config()).unwrap();

    actor.perform(Some(Op::Push), 7).unwrap();
    assert_eq!(*recorder.log.lock(), vec![7]);
    actor.close();
}

#[test]
fn test_malformed_command_is_skipped() {
    init_tracing();
    let session = Session::new();
    let actor = DeviceActor::spawn(Recorder::default(), session.token(), &fast_config()).unwrap();

    actor.enqueue(Command::new(Some(Op::Bogus))).unwrap();
    actor.enqueue(push(1)).unwrap();
    assert_eq!(actor.request(None).unwrap(), 1);
    assert!(actor.is_running());
    actor.close();
}

#[test]
fn test_skipped_command_releases_sync_caller() {
    init_tracing();
    let session = Session::new();
    let config = RobotConfig {
        reply_timeout_ms: None,
        ..fast_config()
    };
    let actor = DeviceActor::spawn(Recorder::default(), session.token(), &config).unwrap();

    let waiter = {
        let actor = Arc::clone(&actor);
        thread::spawn(move || actor.request(Some(Op::Bogus)))
    };
    let err = waiter.join().unwrap().unwrap_err();
    assert!(matches!(err, DeviceError::Rejected { ref port, ref reason } if port == "T1" && reason == "bogus"));
    assert!(!err.is_fatal());

    let err = actor.perform(Some(Op::Bogus), 3).unwrap_err();
    assert!(matches!(err, DeviceError::Rejected { .. }), "{err:?}");
    assert!(actor.is_running());
    actor.perform(Some(Op::Push), 4).unwrap();
    actor.close();
}

#[test]
fn test_transport_failure_kills_actor_and_wakes_waiters() {
    init_tracing();
    let session = Session::new();
    let recorder = Recorder::default();
    let actor = DeviceActor::spawn(recorder.clone(), session.token(), &fast_config()).unwrap();

    actor.enqueue(Command::new(Some(Op::Slow))).unwrap();
    actor.enqueue(Command::new(Some(Op::Fail))).unwrap();
    let waited = actor.request(Some(Op::Count));
    assert!(matches!(waited, Err(DeviceError::Transport { .. })), "{waited:?}");

    let joined = actor.worker().join();
    assert!(matches!(joined, Err(DeviceError::Transport { .. })));
    assert!(!actor.is_running());
    assert_eq!(recorder.released.load(Ordering::SeqCst), 1);

    let late = actor.enqueue(push(1));
    assert!(matches!(late, Err(DeviceError::Transport { .. })));
    assert!(late.unwrap_err().is_fatal());
}

#[test]
fn test_worker_panic_rejects_later_commands() {
    init_tracing();
    let session = Session::new();
    let recorder = Recorder::default();
    let actor = DeviceActor::spawn(recorder.clone(), session.token(), &fast_config()).unwrap();

    actor.enqueue(Command::new(Some(Op::Panic))).unwrap();
    let joined = actor.worker().join();
    assert!(matches!(joined, Err(DeviceError::Transport { .. })), "{joined:?}");

    let late = actor.enqueue(push(1));
    assert!(matches!(late, Err(DeviceError::Transport { .. })), "{late:?}");
    assert!(matches!(actor.request(None), Err(DeviceError::Transport { .. })));
    assert!(recorder.log.lock().is_empty());
    actor.close();
}

#[test]
fn test_dropping_last_reference_closes_actor() {
    init_tracing();
    let session = Session::new();
    let recorder = Recorder::default();
    let actor = DeviceActor::spawn(recorder.clone(), session.token(), &fast_config()).unwrap();
    let worker = actor.worker();

    actor.enqueue(push(5)).unwrap();
    drop(actor);

    assert!(worker.is_finished());
    assert!(worker.join().is_ok());
    assert_eq!(*recorder.log.lock(), vec![5]);
    assert_eq!(recorder.released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_enqueue_after_close_is_rejected() {
    init_tracing();
    let session = Session::new();
    let actor = DeviceActor::spawn(Recorder::default(), session.token(), &fast_config()).unwrap();
    actor.close();

    assert!(matches!(actor.enqueue(push(1)), Err(DeviceError::Closed(label)) if label == "T1"));
    assert!(matches!(actor.request(None), Err(DeviceError::Closed(_))));
    assert!(actor.worker().join().is_ok());
}

#[test]
fn test_close_finishes_queued_commands_first() {
    init_tracing();
    let session = Session::new();
    let recorder = Recorder::default();
    let actor = DeviceActor::spawn(recorder.clone(), session.token(), &fast_config()).unwrap();

    actor.enqueue(Command::new(Some(Op::Slow))).unwrap();
    for i in 0..3 {
        actor.enqueue(push(i)).unwrap();
    }
    actor.close();

    assert_eq!(*recorder.log.lock(), vec![0, 1, 2]);
    assert_eq!(recorder.released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_close_is_idempotent_across_threads() {
    init_tracing();
    let session = Session::new();
    let recorder = Recorder::default();
    let actor = DeviceActor::spawn(recorder.clone(), session.token(), &fast_config()).unwrap();
    actor.enqueue(Command::new(Some(Op::Slow))).unwrap();

    let closers: Vec<_> = (0..4)
        .map(|_| {
            let actor = Arc::clone(&actor);
            thread::spawn(move || actor.close())
        })
        .collect();
    for closer in closers {
        closer.join().unwrap();
    }
    actor.close();

    assert!(!actor.is_running());
    assert_eq!(recorder.released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_session_end_tears_actor_down() {
    init_tracing();
    let session = Session::new();
    let recorder = Recorder::default();
    let actor = DeviceActor::spawn(recorder.clone(), session.token(), &fast_config()).unwrap();

    drop(session);
    assert!(actor.worker().join().is_ok());
    assert_eq!(recorder.released.load(Ordering::SeqCst), 1);
    assert!(matches!(actor.enqueue(push(1)), Err(DeviceError::Closed(_))));
}

#[test]
fn test_open_failure_is_returned_to_caller() {
    init_tracing();
    let session = Session::new();
    let recorder = Recorder {
        absent: true,
        ..Recorder::default()
    };
    let err = DeviceActor::spawn(recorder, session.token(), &fast_config()).err().unwrap();
    match err {
        DeviceError::Open { port, device, source } => {
            assert_eq!(port, "T1");
            assert_eq!(device, "recorder");
            assert_eq!(source.message(), "nothing attached");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_reply_wait_is_bounded_by_timeout() {
    init_tracing();
    let session = Session::new();
    let config = RobotConfig {
        reply_timeout_ms: Some(20),
        ..fast_config()
    };
    let actor = DeviceActor::spawn(Recorder::default(), session.token(), &config).unwrap();

    actor.enqueue(Command::new(Some(Op::Slow))).unwrap();
    assert!(matches!(actor.request(None), Err(DeviceError::Timeout(_))));
    actor.close();
}

#[test]
fn test_on_stop_hooks_run_when_worker_exits() {
    init_tracing();
    let session = Session::new();
    let actor = DeviceActor::spawn(Recorder::default(), session.token(), &fast_config()).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&fired);
    actor.on_stop(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    actor.close();
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    let counter = Arc::clone(&fired);
    actor.on_stop(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(fired.load(Ordering::SeqCst), 2);
    assert!(actor.worker().is_finished());
}
