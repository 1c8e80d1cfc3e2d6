//! Transport module - framed byte stream to the service.
//!
//! Provides:
//! - [`FrameWriter`] for outbound messages
//! - [`FrameReader`] for inbound messages
//! - TCP connect to the local service

mod reader;
mod tcp;
mod writer;

pub use reader::FrameReader;
pub use tcp::{connect, default_service_addr};
pub use writer::{FrameWriter, SHRINK_THRESHOLD, SHRUNK_CAPACITY};
