//! Connection to the service and the receive loop.
//!
//! One [`Connection`] owns one socket to the service and carries any number
//! of [`Member`]s. Any task may issue requests through a member; one task
//! drains notifications with [`Connection::recv`].
//!
//! # Example
//!
//! ```ignore
//! use ensemble_client::{Connection, Event, JoinOptions};
//!
//! #[tokio::main]
//! async fn main() -> ensemble_client::Result<()> {
//!     let conn = Connection::connect().await?;
//!     let member = conn.member();
//!     member.join(&JoinOptions::new("chat")).await?;
//!
//!     loop {
//!         let msg = conn.recv().await?;
//!         match msg.event {
//!             Event::View(view) => println!("{} members", view.nmembers),
//!             Event::Cast { origin, data } => println!("{}: {:?}", origin, data),
//!             Event::Block => msg.member.block_ok().await?,
//!             Event::Exit => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Locking
//!
//! Outbound frames are serialized by a writer lock held for the whole
//! validate-encode-flush sequence of a request. Inbound frames are read under
//! a separate reader lock, so a `recv` waiting for data never stalls senders.
//! The session registry and each member's state sit behind short-lived
//! synchronous locks that are never held across an await.
//!
//! # Cancellation
//!
//! Dropping a request or `recv` future before its frame starts is harmless.
//! Dropping it while a frame is partly written or partly read leaves the
//! stream out of step, so the connection is marked failed, any status change
//! the request made is undone, and every later call returns
//! [`EnsembleError::ConnectionClosed`].

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{EnsembleError, Result};
use crate::join_ops::JoinOptions;
use crate::member::{lock_session, Member, MemberStatus, SessionState, SharedSession};
use crate::protocol::{
    decode_event, decode_routing, Downcall, WireReader, DEFAULT_MAX_HEADER_SIZE,
    DEFAULT_MAX_PAYLOAD_SIZE,
};
use crate::registry::{Lookup, SessionId, SessionRegistry};
use crate::transport::{self, FrameReader, FrameWriter};
use crate::view::{Event, Message};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Builder for configuring and opening a [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    addr: SocketAddr,
    nodelay: bool,
    max_header_size: u32,
    max_payload_size: u32,
}

impl ConnectionBuilder {
    /// Create a builder targeting the service on this host.
    pub fn new() -> Self {
        Self {
            addr: transport::default_service_addr(),
            nodelay: true,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Service address.
    ///
    /// Default: 127.0.0.1:5002
    pub fn addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Service port on the configured host.
    pub fn port(mut self, port: u16) -> Self {
        self.addr.set_port(port);
        self
    }

    /// Set `TCP_NODELAY` on the socket.
    ///
    /// Default: true
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }

    /// Largest inbound header accepted.
    ///
    /// Default: 1 MiB
    pub fn max_header_size(mut self, size: u32) -> Self {
        self.max_header_size = size;
        self
    }

    /// Largest inbound payload accepted.
    ///
    /// Default: 1 GiB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Open a TCP connection to the service.
    pub async fn connect(self) -> Result<Connection> {
        let stream = transport::connect(self.addr, self.nodelay).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(self.from_halves(Box::new(read_half), Box::new(write_half)))
    }

    /// Use an already-open stream to the service.
    pub fn attach<S>(self, stream: S) -> Connection
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        self.from_halves(Box::new(read_half), Box::new(write_half))
    }

    fn from_halves(self, reader: BoxedReader, writer: BoxedWriter) -> Connection {
        Connection {
            shared: Arc::new(Shared {
                writer: AsyncMutex::new(FrameWriter::new(writer)),
                reader: AsyncMutex::new(FrameReader::with_limits(
                    reader,
                    self.max_header_size,
                    self.max_payload_size,
                )),
                registry: Mutex::new(SessionRegistry::new()),
                failed: AtomicBool::new(false),
            }),
        }
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Shared {
    writer: AsyncMutex<FrameWriter<BoxedWriter>>,
    reader: AsyncMutex<FrameReader<BoxedReader>>,
    registry: Mutex<SessionRegistry>,
    /// Set by the first fatal error.
    failed: AtomicBool,
}

/// A connection to the service, shared by all of its members.
///
/// Cheap to clone; clones refer to the same socket.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Create a new connection builder.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Connect to the service on this host with default settings.
    pub async fn connect() -> Result<Self> {
        ConnectionBuilder::new().connect().await
    }

    /// Create a member that has not joined anything yet.
    pub fn member(&self) -> Member {
        Member::new(self.clone(), SessionState::shared())
    }

    /// Number of members between join and exit.
    pub fn session_count(&self) -> usize {
        self.registry().len()
    }

    /// Whether a fatal error has made this connection unusable.
    pub fn is_failed(&self) -> bool {
        self.shared.failed.load(Ordering::Acquire)
    }

    /// Check for pending input without waiting.
    ///
    /// Returns `true` if `recv` has data (or an error, such as end of stream)
    /// to report, and `false` if nothing has arrived or another task is
    /// currently inside `recv`.
    pub async fn poll(&self) -> bool {
        if self.is_failed() {
            return true;
        }
        match self.shared.reader.try_lock() {
            Ok(mut reader) => reader.has_input().await,
            Err(_) => false,
        }
    }

    /// Wait up to `timeout` for input.
    ///
    /// Returns `false` if nothing arrived in time or another task is
    /// currently inside `recv`.
    pub async fn poll_timeout(&self, timeout: Duration) -> bool {
        if self.is_failed() {
            return true;
        }
        let Ok(mut reader) = self.shared.reader.try_lock() else {
            return false;
        };
        let waited = tokio::time::timeout(timeout, reader.wait_for_input()).await;
        waited.is_ok()
    }

    /// Wait for the next event addressed to one of this connection's members.
    ///
    /// Events for members that have already exited are dropped. Concurrent
    /// calls are served one after another. Cancelling while no message has
    /// started to arrive is safe; cancelling part-way through one fails the
    /// connection.
    pub async fn recv(&self) -> Result<Message> {
        self.ensure_open()?;
        let mut reader = self.shared.reader.lock().await;
        loop {
            self.ensure_open()?;
            reader.wait_for_input().await.map_err(|e| self.fail(e))?;

            let in_flight = InFlight::arm(self, Rollback::Nothing);
            let payload = reader.read_begin().await.map_err(|e| self.fail(e))?;
            let dispatched = self
                .dispatch(reader.header(), payload)
                .map_err(|e| self.fail(e))?;
            in_flight.complete();

            if let Some(msg) = dispatched {
                return Ok(msg);
            }
        }
    }

    /// Decode one inbound message and apply its state transition.
    fn dispatch(&self, header: &[u8], payload: Bytes) -> Result<Option<Message>> {
        let mut r = WireReader::new(header);
        let (id, up) = decode_routing(&mut r)?;

        let session = match self.registry().lookup(id) {
            Lookup::Live(session) => session,
            Lookup::Departed => {
                tracing::warn!("Dropping {:?} for departed session {}", up, id);
                return Ok(None);
            }
            Lookup::Unknown => {
                return Err(EnsembleError::Protocol(format!(
                    "Event for unknown session {}",
                    id
                )));
            }
        };

        let event = decode_event(up, &mut r, payload)?;
        r.finish()?;
        tracing::trace!("Session {} received {}", id, event.kind());

        let exited = {
            let mut state = lock_session(&session);
            match &event {
                Event::View(view) => {
                    state.status = match state.status {
                        MemberStatus::Joining | MemberStatus::Normal | MemberStatus::Blocked => {
                            MemberStatus::Normal
                        }
                        MemberStatus::Leaving => MemberStatus::Leaving,
                        status => {
                            return Err(EnsembleError::Protocol(format!(
                                "View for session {} while {}",
                                id, status
                            )))
                        }
                    };
                    tracing::debug!(
                        "Session {} installed view {} with {} members, rank {}",
                        id,
                        view.view_id,
                        view.nmembers,
                        view.rank
                    );
                    state.view = Some(view.clone());
                    false
                }
                Event::Cast { origin, .. } | Event::Send { origin, .. } => {
                    let nmembers = state.view.as_ref().map_or(0, |v| v.nmembers);
                    if *origin >= nmembers {
                        return Err(EnsembleError::Protocol(format!(
                            "Origin {} outside view of {} members",
                            origin, nmembers
                        )));
                    }
                    false
                }
                Event::Exit => {
                    if state.status != MemberStatus::Leaving {
                        return Err(EnsembleError::Protocol(format!(
                            "Exit for session {} while {}",
                            id, state.status
                        )));
                    }
                    state.status = MemberStatus::Left;
                    true
                }
                Event::Heartbeat { .. } | Event::Block => false,
            }
        };

        if exited {
            self.registry().remove(id);
            tracing::debug!("Session {} left", id);
        }

        Ok(Some(Message {
            member: Member::new(self.clone(), session),
            event,
        }))
    }

    /// Send a join request for `member`.
    pub(crate) async fn join(&self, member: &Member, opts: &JoinOptions) -> Result<()> {
        {
            let state = lock_session(member.session());
            if state.status != MemberStatus::Pre {
                return Err(EnsembleError::InvalidState {
                    operation: "join",
                    status: state.status,
                });
            }
        }
        opts.validate()?;

        self.ensure_open()?;
        let mut writer = self.shared.writer.lock().await;
        self.ensure_open()?;

        let id = {
            let mut state = lock_session(member.session());
            if state.status != MemberStatus::Pre {
                return Err(EnsembleError::InvalidState {
                    operation: "join",
                    status: state.status,
                });
            }
            let id = self.registry().allocate()?;
            writer.reset();
            if let Err(e) = Downcall::Join(opts).encode(id, writer.header_mut()) {
                writer.reset();
                return Err(e);
            }
            state.id = Some(id);
            state.status = MemberStatus::Joining;
            drop(state);
            self.registry().insert(id, member.session().clone());
            tracing::debug!("Session {} joining group {}", id, opts.group_name);
            id
        };

        let in_flight = InFlight::arm(
            self,
            Rollback::Join {
                session: member.session().clone(),
                id,
            },
        );
        writer.write_end().await.map_err(|e| self.fail(e))?;
        in_flight.complete();
        Ok(())
    }

    /// Send a request for an already-joined member.
    ///
    /// `prepare` validates the member's state and arguments and returns the
    /// status to move to once the request is encoded. The move is undone if
    /// the frame does not reach the socket in full.
    pub(crate) async fn issue<F>(
        &self,
        member: &Member,
        call: Downcall<'_>,
        payload: Option<Bytes>,
        prepare: F,
    ) -> Result<()>
    where
        F: FnOnce(&SessionState) -> Result<Option<MemberStatus>>,
    {
        self.ensure_open()?;
        let mut writer = self.shared.writer.lock().await;
        self.ensure_open()?;

        let rollback = {
            let mut state = lock_session(member.session());
            let next = prepare(&*state)?;
            let id = state.id.ok_or(EnsembleError::InvalidState {
                operation: "send a request",
                status: state.status,
            })?;

            writer.reset();
            let encoded = call
                .encode(id, writer.header_mut())
                .and_then(|_| match payload {
                    Some(data) => writer.attach_payload(data),
                    None => Ok(()),
                });
            if let Err(e) = encoded {
                writer.reset();
                return Err(e);
            }

            tracing::trace!("Session {} sending {:?}", id, call.down_type());
            match next {
                Some(status) => {
                    tracing::debug!("Session {} {} -> {}", id, state.status, status);
                    let from = std::mem::replace(&mut state.status, status);
                    Rollback::Status {
                        session: member.session().clone(),
                        from,
                        to: status,
                    }
                }
                None => Rollback::Nothing,
            }
        };

        let in_flight = InFlight::arm(self, rollback);
        writer.write_end().await.map_err(|e| self.fail(e))?;
        in_flight.complete();
        Ok(())
    }

    fn registry(&self) -> MutexGuard<'_, SessionRegistry> {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_failed() {
            return Err(EnsembleError::ConnectionClosed);
        }
        Ok(())
    }

    fn mark_failed(&self, reason: impl fmt::Display) {
        if !self.shared.failed.swap(true, Ordering::AcqRel) {
            tracing::error!("Connection failed: {}", reason);
        }
    }

    /// Mark the connection failed if `err` is fatal, and pass it on.
    fn fail(&self, err: EnsembleError) -> EnsembleError {
        if err.is_fatal() {
            self.mark_failed(&err);
        }
        err
    }
}

/// What to undo for a frame that never fully reached the socket.
enum Rollback {
    Nothing,
    Status {
        session: SharedSession,
        from: MemberStatus,
        to: MemberStatus,
    },
    Join {
        session: SharedSession,
        id: SessionId,
    },
}

/// Armed while a frame is partly on the wire.
///
/// Dropped armed (the future was cancelled or the I/O failed), it fails the
/// connection and applies its rollback.
struct InFlight<'a> {
    conn: &'a Connection,
    rollback: Rollback,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn arm(conn: &'a Connection, rollback: Rollback) -> Self {
        Self {
            conn,
            rollback,
            armed: true,
        }
    }

    fn complete(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.conn.mark_failed("frame interrupted");
        match std::mem::replace(&mut self.rollback, Rollback::Nothing) {
            Rollback::Nothing => {}
            Rollback::Status { session, from, to } => {
                let mut state = lock_session(&session);
                if state.status == to {
                    state.status = from;
                }
            }
            Rollback::Join { session, id } => {
                {
                    let mut state = lock_session(&session);
                    state.id = None;
                    state.status = MemberStatus::Pre;
                }
                self.conn.registry().remove(id);
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("sessions", &self.session_count())
            .field("failed", &self.is_failed())
            .finish()
    }
}
