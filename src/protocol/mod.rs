//! Protocol module - wire format, primitive codec, and message layouts.
//!
//! This module implements the binary protocol spoken with the service:
//! - 8-byte frame precursor and message tags
//! - primitive value codec for headers
//! - request encoders and notification decoders

mod codec;
mod downcall;
mod upcall;
mod wire_format;

pub use codec::{time_from_wire, time_to_wire, WireReader, WireWriter, INITIAL_HEADER_CAPACITY};
pub use downcall::Downcall;
pub use upcall::{decode_event, decode_routing, decode_view, encode_view};
pub use wire_format::{
    limits, DownType, Precursor, UpType, DEFAULT_MAX_HEADER_SIZE, DEFAULT_MAX_PAYLOAD_SIZE,
    DEFAULT_PORT, PRECURSOR_SIZE,
};

#[cfg(test)]
pub(crate) use upcall::tests::sample_view;
