//! # ensemble-client
//!
//! Async Rust client for the Ensemble group communication service.
//!
//! This crate lets a process join, talk in, and leave process groups
//! managed by a local Ensemble service. Membership agreement, message
//! ordering and failure detection all happen in the service; the client
//! speaks its binary protocol over one TCP connection and keeps every
//! member's lifecycle in step with the virtual synchrony model.
//!
//! ## Architecture
//!
//! - **Protocol**: primitive codec, frame precursor, request and
//!   notification layouts
//! - **Transport**: framed reads and writes over the socket
//! - **Connection**: one socket multiplexing many members, with a
//!   receive loop that routes notifications by session id
//!
//! ## Example
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
//!     while let Ok(msg) = conn.recv().await {
//!         match msg.event {
//!             Event::View(_) => msg.member.cast("Hello").await?,
//!             Event::Block => msg.member.block_ok().await?,
//!             Event::Exit => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod protocol;
pub mod transport;

mod connection;
mod join_ops;
mod member;
mod registry;
mod view;

pub use connection::{Connection, ConnectionBuilder};
pub use error::{EnsembleError, Result};
pub use join_ops::{JoinOptions, DEFAULT_HEARTBEAT_RATE, DEFAULT_PROPERTIES, DEFAULT_TRANSPORTS};
pub use member::{Member, MemberStatus};
pub use registry::SessionId;
pub use view::{Event, Message, View, ViewId};
