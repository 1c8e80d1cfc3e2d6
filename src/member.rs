//! Group members and their lifecycle.
//!
//! A [`Member`] is one membership in one group, multiplexed with any number
//! of others over a single [`Connection`]. Its status moves through
//!
//! ```text
//! Pre ─join─► Joining ─VIEW─► Normal ◄─VIEW── Blocked
//!                               │  └─block_ok──►  │
//!                               └──leave──► Leaving ◄──leave──┘
//!                                              │
//!                                            EXIT
//!                                              ▼
//!                                             Left
//! ```
//!
//! Requests are only accepted in the states the service expects them in;
//! anything else is rejected with [`EnsembleError::InvalidState`] before a
//! byte is written.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::connection::Connection;
use crate::error::{EnsembleError, Result};
use crate::join_ops::{check_text, JoinOptions};
use crate::protocol::{limits, Downcall};
use crate::registry::SessionId;
use crate::view::View;

/// Lifecycle status of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberStatus {
    /// Created, not yet joined.
    Pre,
    /// Join sent, waiting for the first view.
    Joining,
    /// In a view; may send.
    Normal,
    /// Acknowledged a block; waiting for the next view.
    Blocked,
    /// Leave sent, waiting for the exit.
    Leaving,
    /// Exit received.
    Left,
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// State shared between member handles and the connection's registry.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) id: Option<SessionId>,
    pub(crate) status: MemberStatus,
    pub(crate) view: Option<Arc<View>>,
}

pub(crate) type SharedSession = Arc<Mutex<SessionState>>;

impl SessionState {
    pub(crate) fn shared() -> SharedSession {
        Arc::new(Mutex::new(SessionState {
            id: None,
            status: MemberStatus::Pre,
            view: None,
        }))
    }

    pub(crate) fn require_normal(&self, operation: &'static str) -> Result<()> {
        if self.status != MemberStatus::Normal {
            return Err(EnsembleError::InvalidState {
                operation,
                status: self.status,
            });
        }
        Ok(())
    }

    /// Check ranks against the current view.
    pub(crate) fn check_ranks(&self, ranks: &[usize]) -> Result<()> {
        let nmembers = self.view.as_ref().map_or(0, |v| v.nmembers);
        let in_view = |r: usize| self.view.as_ref().is_some_and(|v| v.contains_rank(r));
        match ranks.iter().find(|&&r| !in_view(r)) {
            Some(r) => Err(EnsembleError::InvalidArgument(format!(
                "rank {} outside view of {} members",
                r, nmembers
            ))),
            None => Ok(()),
        }
    }
}

pub(crate) fn lock_session(session: &SharedSession) -> MutexGuard<'_, SessionState> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

fn check_rank_list(operation: &str, ranks: &[usize]) -> Result<()> {
    if ranks.is_empty() {
        return Err(EnsembleError::InvalidArgument(format!(
            "{} needs at least one rank",
            operation
        )));
    }
    if ranks.len() > limits::DESTINATIONS {
        return Err(EnsembleError::InvalidArgument(format!(
            "{} accepts at most {} ranks, got {}",
            operation,
            limits::DESTINATIONS,
            ranks.len()
        )));
    }
    Ok(())
}

fn check_nonempty(field: &str, text: &str, max: usize) -> Result<()> {
    if text.is_empty() {
        return Err(EnsembleError::InvalidArgument(format!(
            "{} must not be empty",
            field
        )));
    }
    check_text(field, text, max)
}

/// Handle to one group membership.
///
/// Cheap to clone; clones refer to the same membership.
#[derive(Clone)]
pub struct Member {
    conn: Connection,
    state: SharedSession,
}

impl Member {
    pub(crate) fn new(conn: Connection, state: SharedSession) -> Self {
        Self { conn, state }
    }

    pub(crate) fn session(&self) -> &SharedSession {
        &self.state
    }

    /// Session id, assigned by `join`.
    pub fn id(&self) -> Option<SessionId> {
        lock_session(&self.state).id
    }

    pub fn status(&self) -> MemberStatus {
        lock_session(&self.state).status
    }

    /// Most recent view, if one has been installed.
    pub fn current_view(&self) -> Option<Arc<View>> {
        lock_session(&self.state).view.clone()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Join a group. Legal once, from `Pre`.
    pub async fn join(&self, opts: &JoinOptions) -> Result<()> {
        self.conn.join(self, opts).await
    }

    /// Leave the group. The member becomes `Left` when the exit arrives.
    pub async fn leave(&self) -> Result<()> {
        self.conn
            .issue(self, Downcall::Leave, None, |state| match state.status {
                MemberStatus::Normal | MemberStatus::Blocked => Ok(Some(MemberStatus::Leaving)),
                status => Err(EnsembleError::InvalidState {
                    operation: "leave",
                    status,
                }),
            })
            .await
    }

    /// Multicast to the whole group.
    pub async fn cast(&self, data: impl Into<Bytes>) -> Result<()> {
        self.conn
            .issue(self, Downcall::Cast, Some(data.into()), |state| {
                state.require_normal("cast")?;
                Ok(None)
            })
            .await
    }

    /// Send to the members at `ranks`.
    pub async fn send(&self, ranks: &[usize], data: impl Into<Bytes>) -> Result<()> {
        self.conn
            .issue(self, Downcall::Send(ranks), Some(data.into()), |state| {
                state.require_normal("send")?;
                check_rank_list("send", ranks)?;
                state.check_ranks(ranks)?;
                Ok(None)
            })
            .await
    }

    /// Send to the member at `rank`.
    pub async fn send1(&self, rank: usize, data: impl Into<Bytes>) -> Result<()> {
        self.conn
            .issue(self, Downcall::Send1(rank), Some(data.into()), |state| {
                state.require_normal("send1")?;
                state.check_ranks(&[rank])?;
                Ok(None)
            })
            .await
    }

    /// Report the members at `ranks` as failed.
    pub async fn suspect(&self, ranks: &[usize]) -> Result<()> {
        self.conn
            .issue(self, Downcall::Suspect(ranks), None, |state| {
                state.require_normal("suspect")?;
                check_rank_list("suspect", ranks)?;
                state.check_ranks(ranks)?;
                Ok(None)
            })
            .await
    }

    /// Signal that state transfer in a transfer view is complete.
    pub async fn xfer_done(&self) -> Result<()> {
        self.simple(Downcall::XferDone, "xfer_done").await
    }

    /// Switch the group to a new protocol stack.
    pub async fn change_protocol(&self, protocol: &str) -> Result<()> {
        self.conn
            .issue(self, Downcall::Protocol(protocol), None, |state| {
                state.require_normal("change_protocol")?;
                check_nonempty("protocol", protocol, limits::PROTOCOL)?;
                Ok(None)
            })
            .await
    }

    /// Switch the group to the stack built from `properties`.
    pub async fn change_properties(&self, properties: &str) -> Result<()> {
        self.conn
            .issue(self, Downcall::Properties(properties), None, |state| {
                state.require_normal("change_properties")?;
                check_nonempty("properties", properties, limits::PROPERTIES)?;
                Ok(None)
            })
            .await
    }

    /// Ask the service to install a new view now.
    pub async fn prompt(&self) -> Result<()> {
        self.simple(Downcall::Prompt, "prompt").await
    }

    /// Ask the service to rekey the group.
    pub async fn rekey(&self) -> Result<()> {
        self.simple(Downcall::Rekey, "rekey").await
    }

    /// Acknowledge a block. No sends are accepted until the next view.
    pub async fn block_ok(&self) -> Result<()> {
        self.conn
            .issue(self, Downcall::BlockOk, None, |state| {
                state.require_normal("block_ok")?;
                Ok(Some(MemberStatus::Blocked))
            })
            .await
    }

    async fn simple(&self, call: Downcall<'_>, operation: &'static str) -> Result<()> {
        self.conn
            .issue(self, call, None, |state| {
                state.require_normal(operation)?;
                Ok(None)
            })
            .await
    }
}

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for Member {}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock_session(&self.state);
        f.debug_struct("Member")
            .field("id", &state.id)
            .field("status", &state.status)
            .finish()
    }
}
