//! The per-device actor: one worker thread draining an ordered command queue
//! against an exclusively owned device handle.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle, ThreadId},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use super::{
    command::{Command, Reply},
    session::SessionToken,
    shutdown::{self, Release},
    CommandError, Executor,
};
use crate::utils::{config::RobotConfig, error::DeviceError, handle::TransportError};

static NEXT_ACTOR_ID: AtomicU64 = AtomicU64::new(1);

type Hook = Box<dyn FnOnce() + Send>;

struct Inbox<K, V> {
    queue: VecDeque<Command<K, V>>,
    kill_requested: bool,
    /// Set by the worker when a command killed it, before teardown starts.
    failure: Option<DeviceError>,
}

struct Queue<K, V> {
    inbox: Mutex<Inbox<K, V>>,
    wake: Condvar,
}

#[derive(Debug, Clone)]
enum WorkerState {
    Running,
    Stopped(Option<DeviceError>),
}

/// Worker status shared between the actor, its worker and any observers.
struct Lifecycle {
    label: String,
    state: Mutex<WorkerState>,
    changed: Condvar,
    on_stop: Mutex<Vec<Hook>>,
}

impl Lifecycle {
    fn finish(
        &self,
        failure: Option<DeviceError>,
    ) {
        {
            let mut state = self.state.lock();
            if matches!(*state, WorkerState::Stopped(_)) {
                return;
            }
            *state = WorkerState::Stopped(failure);
        }
        self.changed.notify_all();
        let hooks: Vec<Hook> = self.on_stop.lock().drain(..).collect();
        for hook in hooks {
            hook();
        }
    }

    fn is_running(&self) -> bool {
        matches!(*self.state.lock(), WorkerState::Running)
    }

    fn failure(&self) -> Option<DeviceError> {
        match &*self.state.lock() {
            WorkerState::Stopped(failure) => failure.clone(),
            WorkerState::Running => None,
        }
    }

    fn wait_stopped(&self) -> Option<DeviceError> {
        let mut state = self.state.lock();
        loop {
            if let WorkerState::Stopped(failure) = &*state {
                return failure.clone();
            }
            self.changed.wait(&mut state);
        }
    }
}

/// Marks the actor dead even if the worker unwinds.
struct StopGuard<K, V> {
    lifecycle: Arc<Lifecycle>,
    queue: Arc<Queue<K, V>>,
}

impl<K, V> Drop for StopGuard<K, V> {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }
        let failure = DeviceError::Transport {
            port: self.lifecycle.label.clone(),
            source: TransportError::new("device worker panicked"),
        };
        let discarded = {
            let mut inbox = self.queue.inbox.lock();
            inbox.kill_requested = true;
            inbox.failure = Some(failure.clone());
            inbox.queue.drain(..).count()
        };
        self.queue.wake.notify_all();
        tracing::error!(port = %self.lifecycle.label, discarded, "device worker panicked");
        self.lifecycle.finish(Some(failure));
    }
}

/// Observer handle for an actor's worker thread.
#[derive(Clone)]
pub struct WorkerHandle {
    lifecycle: Arc<Lifecycle>,
}

impl WorkerHandle {
    /// Block until the worker has exited. Returns the failure that killed it,
    /// if any.
    pub fn join(&self) -> Result<(), DeviceError> {
        match self.lifecycle.wait_stopped() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    pub fn is_finished(&self) -> bool {
        !self.lifecycle.is_running()
    }

    pub fn label(&self) -> &str {
        &self.lifecycle.label
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("label", &self.lifecycle.label)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Serializes every operation on one device.
///
/// The actor owns a single worker thread which drains the queue in FIFO
/// order. The device handle lives only on that thread, so no caller ever
/// touches it directly.
///
/// Dropping the last reference closes the actor like [`DeviceActor::close`].
pub struct DeviceActor<E: Executor> {
    id: u64,
    queue: Arc<Queue<E::Kind, E::Value>>,
    lifecycle: Arc<Lifecycle>,
    thread: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    config: RobotConfig,
}

impl<E: Executor> DeviceActor<E> {
    /// Open the device on the calling thread and start the worker.
    ///
    /// A failed open is returned to the caller; no worker is started.
    pub fn spawn(
        mut executor: E,
        session: SessionToken,
        config: &RobotConfig,
    ) -> Result<Arc<Self>, DeviceError> {
        let label = executor.label();
        let handle = executor.open().map_err(|source| DeviceError::Open {
            port: label.clone(),
            device: executor.device(),
            source,
        })?;

        let queue = Arc::new(Queue {
            inbox: Mutex::new(Inbox {
                queue: VecDeque::new(),
                kill_requested: false,
                failure: None,
            }),
            wake: Condvar::new(),
        });
        let lifecycle = Arc::new(Lifecycle {
            label: label.clone(),
            state: Mutex::new(WorkerState::Running),
            changed: Condvar::new(),
            on_stop: Mutex::new(Vec::new()),
        });

        let worker = Worker {
            executor,
            handle: Some(handle),
            queue: Arc::clone(&queue),
            session,
            config: config.clone(),
            label: label.clone(),
        };
        let guard = StopGuard {
            lifecycle: Arc::clone(&lifecycle),
            queue: Arc::clone(&queue),
        };
        let thread = thread::Builder::new()
            .name(format!("brick-{label}"))
            .spawn(move || {
                let _guard = guard;
                let lifecycle = Arc::clone(&_guard.lifecycle);
                let failure = worker.run();
                lifecycle.finish(failure);
            })
            .map_err(|e| DeviceError::Open {
                port: label.clone(),
                device: "worker thread".into(),
                source: TransportError::new(e.to_string()),
            })?;

        tracing::info!(port = %label, "device actor started");
        let actor = Arc::new(Self {
            id: NEXT_ACTOR_ID.fetch_add(1, Ordering::Relaxed),
            queue,
            lifecycle,
            worker_id: thread.thread().id(),
            thread: Mutex::new(Some(thread)),
            config: config.clone(),
        });
        let weak: std::sync::Weak<dyn Release> = Arc::downgrade(&actor) as _;
        shutdown::register(weak);
        Ok(actor)
    }

    /// Unique id of this actor, never reused within the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.lifecycle.label
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Append a command to the tail of the queue and wake the worker.
    ///
    /// Rejected once the actor is closing, closed or dead.
    pub fn enqueue(
        &self,
        command: Command<E::Kind, E::Value>,
    ) -> Result<(), DeviceError> {
        {
            let mut inbox = self.queue.inbox.lock();
            if inbox.kill_requested {
                return Err(inbox.failure.clone().unwrap_or_else(|| self.unavailable()));
            }
            tracing::trace!(port = %self.label(), ?command, "enqueue");
            inbox.queue.push_back(command);
        }
        self.queue.wake.notify_one();
        Ok(())
    }

    /// Enqueue a read and block until the worker fills the reply.
    pub fn request(
        &self,
        kind: Option<E::Kind>,
    ) -> Result<E::Value, DeviceError> {
        let command = Command::new(kind);
        let reply = command.reply();
        self.enqueue(command)?;
        self.await_reply(&reply, |reply, slice| reply.wait_filled(slice))
    }

    /// Enqueue an action carrying `input` and block until the worker has
    /// applied it.
    pub fn perform(
        &self,
        kind: Option<E::Kind>,
        input: E::Value,
    ) -> Result<(), DeviceError> {
        let command = Command::with_input(kind, input);
        let reply = command.reply();
        self.enqueue(command)?;
        self.await_reply(&reply, |reply, slice| {
            reply.wait_cleared(slice).map(|cleared| cleared.then_some(()))
        })
    }

    fn await_reply<T>(
        &self,
        reply: &Reply<E::Value>,
        mut poll: impl FnMut(&Reply<E::Value>, Duration) -> Result<Option<T>, String>,
    ) -> Result<T, DeviceError> {
        let slice = self.config.reply_poll();
        let deadline = self.config.reply_timeout().map(|t| Instant::now() + t);
        let rejected = |reason: String| DeviceError::Rejected {
            port: self.label().to_owned(),
            reason,
        };
        loop {
            if let Some(value) = poll(reply, slice).map_err(rejected)? {
                return Ok(value);
            }
            if !self.lifecycle.is_running() {
                // The worker may have answered just before exiting.
                return poll(reply, Duration::ZERO)
                    .map_err(rejected)?
                    .ok_or_else(|| self.unavailable());
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!(port = %self.label(), "reply wait timed out");
                return Err(DeviceError::Timeout(self.label().to_owned()));
            }
        }
    }

    /// Stop accepting commands, let the worker finish what was already
    /// queued, release the device and wait for the worker to exit.
    ///
    /// Idempotent. Safe to call from several threads.
    pub fn close(&self) {
        let first = {
            let mut inbox = self.queue.inbox.lock();
            !std::mem::replace(&mut inbox.kill_requested, true)
        };
        if first {
            tracing::info!(port = %self.label(), "close requested");
        }
        self.queue.wake.notify_all();

        if thread::current().id() == self.worker_id {
            // Closing from inside a stop hook on the worker itself.
            return;
        }
        let thread = self.thread.lock().take();
        match thread {
            Some(thread) => {
                if thread.join().is_err() {
                    tracing::error!(port = %self.label(), "device worker panicked");
                }
            }
            None => {
                self.lifecycle.wait_stopped();
            }
        }
    }

    pub fn worker(&self) -> WorkerHandle {
        WorkerHandle {
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }

    /// The failure that killed the worker, if it died.
    pub fn failure(&self) -> Option<DeviceError> {
        self.lifecycle.failure()
    }

    /// Run `hook` once the worker has stopped and released the device. Runs
    /// immediately if it already has.
    pub fn on_stop(
        &self,
        hook: impl FnOnce() + Send + 'static,
    ) {
        {
            let mut hooks = self.lifecycle.on_stop.lock();
            if self.lifecycle.is_running() {
                hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }

    fn unavailable(&self) -> DeviceError {
        self.lifecycle
            .failure()
            .unwrap_or_else(|| DeviceError::Closed(self.label().to_owned()))
    }
}

impl<E: Executor> Drop for DeviceActor<E> {
    fn drop(&mut self) {
        if self.lifecycle.is_running() {
            tracing::debug!(port = %self.label(), "last proxy dropped, closing");
        }
        self.close();
    }
}

impl<E: Executor> Release for DeviceActor<E> {
    fn label(&self) -> &str {
        DeviceActor::label(self)
    }

    fn is_running(&self) -> bool {
        DeviceActor::is_running(self)
    }

    fn close(&self) {
        DeviceActor::close(self);
    }
}

/// State owned by the worker thread.
struct Worker<E: Executor> {
    executor: E,
    handle: Option<E::Handle>,
    queue: Arc<Queue<E::Kind, E::Value>>,
    session: SessionToken,
    config: RobotConfig,
    label: String,
}

impl<E: Executor> Worker<E> {
    fn run(mut self) -> Option<DeviceError> {
        let outcome = self.drain_until_killed();
        if let Err(failure) = &outcome {
            let mut inbox = self.queue.inbox.lock();
            inbox.kill_requested = true;
            inbox.failure = Some(failure.clone());
        }
        let released = self.release();
        let discarded = self.queue.inbox.lock().queue.drain(..).count();
        if discarded > 0 {
            tracing::warn!(port = %self.label, discarded, "dropped commands queued at teardown");
        }
        tracing::info!(port = %self.label, "device actor stopped");
        outcome.err().or(released.err())
    }

    fn drain_until_killed(&mut self) -> Result<(), DeviceError> {
        loop {
            if !self.session.is_alive() {
                tracing::warn!(port = %self.label, "owning session ended, releasing device");
                self.queue.inbox.lock().kill_requested = true;
                return Ok(());
            }

            let batch: Vec<_> = self.queue.inbox.lock().queue.drain(..).collect();
            for command in batch {
                self.execute(&command)?;
            }

            let mut inbox = self.queue.inbox.lock();
            if inbox.queue.is_empty() {
                if inbox.kill_requested {
                    return Ok(());
                }
                self.queue.wake.wait_for(&mut inbox, self.config.idle_timeout());
            }
        }
    }

    fn execute(
        &mut self,
        command: &Command<E::Kind, E::Value>,
    ) -> Result<(), DeviceError> {
        if self.handle.is_none() {
            tracing::debug!(port = %self.label, "reopening device handle");
            let handle = self.executor.open().map_err(|source| DeviceError::Open {
                port: self.label.clone(),
                device: self.executor.device(),
                source,
            })?;
            self.handle = Some(handle);
        }
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };

        tracing::trace!(port = %self.label, ?command, "execute");
        match self.executor.execute(handle, command) {
            Ok(()) => Ok(()),
            Err(CommandError::Malformed(reason)) => {
                tracing::warn!(port = %self.label, ?command, %reason, "skipping command");
                command.reject(reason);
                Ok(())
            }
            Err(CommandError::Transport(source)) => {
                tracing::error!(port = %self.label, ?command, error = %source, "device call failed");
                Err(DeviceError::Transport {
                    port: self.label.clone(),
                    source,
                })
            }
        }
    }

    fn release(&mut self) -> Result<(), DeviceError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.executor
            .release(handle, &self.config)
            .map_err(|source| {
                tracing::error!(port = %self.label, error = %source, "failed to release device");
                DeviceError::Transport {
                    port: self.label.clone(),
                    source,
                }
            })
    }
}
