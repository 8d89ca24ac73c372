//! Session lifetime tokens.
//!
//! A [`Session`] stands for the controlling program. Actors get a
//! [`SessionToken`] at construction and tear themselves down once the session
//! has ended, which happens on [`Session::end`] or when the session is dropped.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};

#[derive(Debug, Default)]
struct SessionState {
    ended: AtomicBool,
}

/// Owner side of a session. Not cloneable: exactly one owner ends it.
#[derive(Debug, Default)]
pub struct Session {
    state: Arc<SessionState>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> SessionToken {
        SessionToken {
            state: Arc::downgrade(&self.state),
        }
    }

    pub fn end(&self) {
        if !self.state.ended.swap(true, Ordering::AcqRel) {
            tracing::debug!("session ended");
        }
    }

    pub fn is_active(&self) -> bool {
        !self.state.ended.load(Ordering::Acquire)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.end();
    }
}

/// Observer side of a session, held by every actor.
#[derive(Debug, Clone)]
pub struct SessionToken {
    state: Weak<SessionState>,
}

impl SessionToken {
    pub fn is_alive(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|state| !state.ended.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_expires_on_end() {
        let session = Session::new();
        let token = session.token();
        assert!(token.is_alive());
        session.end();
        assert!(!token.is_alive());
        assert!(!session.is_active());
    }

    #[test]
    fn token_expires_on_drop() {
        let token = {
            let session = Session::new();
            session.token()
        };
        assert!(!token.is_alive());
    }
}
