//! Group views and the events delivered to a member.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::member::Member;
use crate::protocol::limits;

/// Identifier of a view: logical time plus the endpoint that installed it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewId {
    pub ltime: i32,
    pub coordinator: String,
}

impl ViewId {
    pub fn new(ltime: i32, coordinator: impl Into<String>) -> Self {
        Self {
            ltime,
            coordinator: coordinator.into(),
        }
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.ltime, self.coordinator)
    }
}

/// Snapshot of group membership as seen by one member.
///
/// Ranks index into `members` and `addresses`; both always hold exactly
/// `nmembers` entries and `rank < nmembers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    /// Service version string.
    pub version: String,
    pub group: String,
    /// Protocol stack in use.
    pub protocol: String,
    pub coordinator_rank: usize,
    pub ltime: i32,
    /// Whether this view is in the primary partition.
    pub primary: bool,
    pub uses_group_daemon: bool,
    /// Whether this is a state-transfer view.
    pub transfer_view: bool,
    /// Views merged to form this one.
    pub merged_view_ids: Vec<ViewId>,
    pub parameters: String,
    /// Seconds since the group was created.
    pub uptime: f64,
    /// Member endpoints, by rank.
    pub members: Vec<String>,
    /// Member addresses, by rank.
    pub addresses: Vec<String>,
    /// This member's endpoint.
    pub endpoint: String,
    /// This member's address.
    pub address: String,
    /// This member's rank.
    pub rank: usize,
    /// Stable display name of this member.
    pub name: String,
    pub nmembers: usize,
    pub view_id: ViewId,
    pub am_coordinator: bool,
    pub key: Option<[u8; limits::KEY]>,
}

impl View {
    /// Whether `rank` names a member of this view.
    #[inline]
    pub fn contains_rank(&self, rank: usize) -> bool {
        rank < self.nmembers
    }
}

/// A notification from the service, decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A new view was installed.
    View(Arc<View>),
    /// Multicast from the member at `origin`.
    Cast { origin: usize, data: Bytes },
    /// Point-to-point message from the member at `origin`.
    Send { origin: usize, data: Bytes },
    /// Periodic timer tick, in seconds.
    Heartbeat { time: f64 },
    /// Stop sending; answer with `Member::block_ok`.
    Block,
    /// The member has left the group.
    Exit,
}

impl Event {
    /// Short name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::View(_) => "view",
            Event::Cast { .. } => "cast",
            Event::Send { .. } => "send",
            Event::Heartbeat { .. } => "heartbeat",
            Event::Block => "block",
            Event::Exit => "exit",
        }
    }
}

/// An event together with the member it was addressed to.
#[derive(Debug, Clone)]
pub struct Message {
    pub member: Member,
    pub event: Event,
}
