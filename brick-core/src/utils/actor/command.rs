//! Queued commands and their single-slot reply cell.
//!
//! A command carries a kind (`None` is the family's default read) and a
//! payload slot. The slot is written by the worker and only read by the
//! issuing caller. Two waiting polarities share the one slot:
//!
//! - a read is created `Unset` and completes once the worker fills it;
//! - an action is created holding its input and completes once the worker
//!   clears it again.
//!
//! A command the worker skips is marked rejected so neither kind of waiter
//! is left behind.

use std::{fmt, mem, sync::Arc, time::Duration};

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
enum SlotState<V> {
    Unset,
    Filled(V),
    Cleared,
    Rejected(String),
}

#[derive(Debug)]
struct ReplySlot<V> {
    state: Mutex<SlotState<V>>,
    changed: Condvar,
}

impl<V> ReplySlot<V> {
    fn new(state: SlotState<V>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            changed: Condvar::new(),
        })
    }

    fn set(
        &self,
        state: SlotState<V>,
    ) {
        *self.state.lock() = state;
        self.changed.notify_all();
    }
}

/// One unit of work for a device actor.
pub struct Command<K, V> {
    kind: Option<K>,
    slot: Arc<ReplySlot<V>>,
}

impl<K, V> Command<K, V> {
    /// A command whose slot starts unset: the worker fills it with a reply.
    pub fn new(kind: Option<K>) -> Self {
        Self {
            kind,
            slot: ReplySlot::new(SlotState::Unset),
        }
    }

    /// A command carrying `input`: the worker clears the slot when done.
    pub fn with_input(
        kind: Option<K>,
        input: V,
    ) -> Self {
        Self {
            kind,
            slot: ReplySlot::new(SlotState::Filled(input)),
        }
    }

    /// Caller-side view of this command's slot.
    pub fn reply(&self) -> Reply<V> {
        Reply {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Store a reply value.
    pub fn fill(
        &self,
        value: V,
    ) {
        self.slot.set(SlotState::Filled(value));
    }

    /// Signal that a mutating action has been applied.
    pub fn clear(&self) {
        self.slot.set(SlotState::Cleared);
    }

    /// Signal that the command was skipped without touching the device.
    pub fn reject(
        &self,
        reason: impl Into<String>,
    ) {
        self.slot.set(SlotState::Rejected(reason.into()));
    }
}

impl<K: Copy, V> Command<K, V> {
    pub fn kind(&self) -> Option<K> {
        self.kind
    }
}

impl<K, V: Clone> Command<K, V> {
    /// The input value, while the slot still holds it.
    pub fn input(&self) -> Option<V> {
        match &*self.slot.state.lock() {
            SlotState::Filled(value) => Some(value.clone()),
            _ => None,
        }
    }
}

impl<K: fmt::Debug, V> fmt::Debug for Command<K, V> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Command").field("kind", &self.kind).finish_non_exhaustive()
    }
}

/// Read-only handle the issuing caller keeps while the command is queued.
pub struct Reply<V> {
    slot: Arc<ReplySlot<V>>,
}

impl<V> Reply<V> {
    /// Take a filled value, resetting the slot to unset.
    pub fn try_take(&self) -> Option<V> {
        let mut state = self.slot.state.lock();
        Self::take_filled(&mut *state)
    }

    pub fn is_cleared(&self) -> bool {
        matches!(*self.slot.state.lock(), SlotState::Cleared)
    }

    pub fn is_unset(&self) -> bool {
        matches!(*self.slot.state.lock(), SlotState::Unset)
    }

    /// Why the worker skipped this command, if it did.
    pub fn rejection(&self) -> Option<String> {
        match &*self.slot.state.lock() {
            SlotState::Rejected(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Wait at most `slice` for a value and take it. `Ok(None)` while the
    /// command is still pending, `Err` with the reason once it was rejected.
    pub(crate) fn wait_filled(
        &self,
        slice: Duration,
    ) -> Result<Option<V>, String> {
        let mut state = self.slot.state.lock();
        if !matches!(*state, SlotState::Filled(_) | SlotState::Rejected(_)) {
            self.slot.changed.wait_for(&mut state, slice);
        }
        if let SlotState::Rejected(reason) = &*state {
            return Err(reason.clone());
        }
        Ok(Self::take_filled(&mut *state))
    }

    /// Wait at most `slice` for the slot to be cleared.
    pub(crate) fn wait_cleared(
        &self,
        slice: Duration,
    ) -> Result<bool, String> {
        let mut state = self.slot.state.lock();
        if !matches!(*state, SlotState::Cleared | SlotState::Rejected(_)) {
            self.slot.changed.wait_for(&mut state, slice);
        }
        match &*state {
            SlotState::Rejected(reason) => Err(reason.clone()),
            other => Ok(matches!(other, SlotState::Cleared)),
        }
    }

    fn take_filled(state: &mut SlotState<V>) -> Option<V> {
        match mem::replace(state, SlotState::Unset) {
            SlotState::Filled(value) => Some(value),
            other => {
                *state = other;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_slot_transitions_unset_filled_unset() {
        let cmd: Command<u8, i32> = Command::new(Some(1));
        let reply = cmd.reply();
        assert!(reply.is_unset());
        assert_eq!(cmd.input(), None);

        cmd.fill(42);
        assert_eq!(reply.try_take(), Some(42));
        assert!(reply.is_unset());
        assert_eq!(reply.try_take(), None);
    }

    #[test]
    fn action_slot_holds_input_until_cleared() {
        let cmd: Command<u8, Vec<f32>> = Command::with_input(None, vec![6.0]);
        let reply = cmd.reply();
        assert_eq!(cmd.input(), Some(vec![6.0]));
        assert!(!reply.is_cleared());

        cmd.clear();
        assert!(reply.is_cleared());
        assert_eq!(cmd.input(), None);
    }

    #[test]
    fn wait_filled_wakes_on_fill_from_other_thread() {
        let cmd: Command<(), u32> = Command::new(None);
        let reply = cmd.reply();
        let worker = std::thread::spawn(move || cmd.fill(7));
        let mut got = None;
        for _ in 0..500 {
            got = reply.wait_filled(Duration::from_millis(10)).unwrap();
            if got.is_some() {
                break;
            }
        }
        worker.join().unwrap();
        assert_eq!(got, Some(7));
    }

    #[test]
    fn wait_cleared_times_out_when_untouched() {
        let cmd: Command<(), u32> = Command::with_input(None, 1);
        assert_eq!(cmd.reply().wait_cleared(Duration::from_millis(5)), Ok(false));
    }

    #[test]
    fn rejected_slot_releases_both_waiters() {
        let read: Command<(), u32> = Command::new(None);
        read.reject("no such reading");
        assert_eq!(read.reply().wait_filled(Duration::ZERO), Err("no such reading".to_owned()));

        let action: Command<(), u32> = Command::with_input(None, 3);
        let reply = action.reply();
        action.reject("bad payload");
        assert_eq!(reply.wait_cleared(Duration::ZERO), Err("bad payload".to_owned()));
        assert_eq!(reply.rejection().as_deref(), Some("bad payload"));
        assert_eq!(action.input(), None);
    }
}
