//! Process-wide registry of live actors.
//!
//! Every actor registers itself on spawn. [`release_all`] closes whatever is
//! still running. Closing is idempotent, so calling it after a normal
//! shutdown is harmless.
//!
//! Hold the guard from [`release_on_exit`] in `main` to release everything
//! when `main` returns or unwinds. Signals are left to the embedding
//! program: its handler (for example a `tokio::signal::ctrl_c` task) calls
//! [`release_all`] before exiting.

use std::sync::Weak;

use lazy_static::lazy_static;
use parking_lot::Mutex;

/// Type-erased view of an actor for shutdown.
pub(crate) trait Release: Send + Sync {
    fn label(&self) -> &str;
    fn is_running(&self) -> bool;
    fn close(&self);
}

lazy_static! {
    static ref LIVE_ACTORS: Mutex<Vec<Weak<dyn Release>>> = Mutex::new(Vec::new());
}

pub(crate) fn register(actor: Weak<dyn Release>) {
    let mut live = LIVE_ACTORS.lock();
    live.retain(|weak| weak.upgrade().is_some_and(|a| a.is_running()));
    live.push(actor);
}

/// Number of registered actors whose worker is still running.
pub fn live_actors() -> usize {
    LIVE_ACTORS
        .lock()
        .iter()
        .filter(|weak| weak.upgrade().is_some_and(|a| a.is_running()))
        .count()
}

/// Close every actor that is still running and return how many were closed.
pub fn release_all() -> usize {
    let snapshot: Vec<_> = LIVE_ACTORS.lock().drain(..).collect();
    let mut released = 0;
    for actor in snapshot.iter().filter_map(Weak::upgrade) {
        if actor.is_running() {
            tracing::info!(port = actor.label(), "releasing actor at shutdown");
            actor.close();
            released += 1;
        }
    }
    released
}

/// Releases every live actor when dropped.
#[must_use = "actors are released when the guard is dropped"]
#[derive(Debug)]
pub struct ReleaseGuard {
    _private: (),
}

/// Install a guard that runs [`release_all`] when it goes out of scope.
pub fn release_on_exit() -> ReleaseGuard {
    ReleaseGuard { _private: () }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let released = release_all();
        tracing::info!(released, "released device actors on exit");
    }
}
