//! Session registry for routing inbound events by session id.
//!
//! Ids are assigned sequentially starting from 1 and are never reused
//! within one connection, so an id that was handed out but is no longer
//! registered always belongs to a member that has left.

use std::collections::HashMap;
use std::fmt;

use crate::error::{EnsembleError, Result};
use crate::member::SharedSession;

/// Locally allocated identifier of one group membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(i32);

impl SessionId {
    /// Wrap a raw id read from the wire.
    #[inline]
    pub fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Raw value written to the wire.
    #[inline]
    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of looking up an inbound session id.
pub(crate) enum Lookup {
    /// Registered session.
    Live(SharedSession),
    /// Allocated earlier, removed after its exit.
    Departed,
    /// Never allocated by this connection.
    Unknown,
}

/// Registry mapping session ids to session state.
pub(crate) struct SessionRegistry {
    sessions: HashMap<SessionId, SharedSession>,
    /// Next session id to assign.
    next_id: i32,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            next_id: 1, // Start from 1, 0 is reserved
        }
    }

    /// Hand out the next id.
    pub(crate) fn allocate(&mut self) -> Result<SessionId> {
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or_else(|| {
            EnsembleError::InvalidArgument("session ids exhausted".to_string())
        })?;
        Ok(SessionId(id))
    }

    pub(crate) fn insert(&mut self, id: SessionId, session: SharedSession) {
        self.sessions.insert(id, session);
    }

    pub(crate) fn remove(&mut self, id: SessionId) -> Option<SharedSession> {
        self.sessions.remove(&id)
    }

    pub(crate) fn lookup(&self, id: SessionId) -> Lookup {
        match self.sessions.get(&id) {
            Some(session) => Lookup::Live(session.clone()),
            None if self.was_allocated(id) => Lookup::Departed,
            None => Lookup::Unknown,
        }
    }

    /// Whether `id` was ever handed out by this registry.
    fn was_allocated(&self, id: SessionId) -> bool {
        id.0 >= 1 && id.0 < self.next_id
    }

    /// Number of registered sessions.
    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }
}
