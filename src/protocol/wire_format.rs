//! Wire format constants, message tags and the frame precursor.
//!
//! Every message on the wire starts with an 8-byte precursor:
//! ```text
//! ┌────────────┬─────────────┬────────────────┬─────────────────┐
//! │ Header len │ Payload len │ Header         │ Payload         │
//! │ 4 bytes    │ 4 bytes     │ header_len     │ payload_len     │
//! │ int32 BE   │ int32 BE    │                │ (may be absent) │
//! └────────────┴─────────────┴────────────────┴─────────────────┘
//! ```
//!
//! The header itself starts with `[int32 session id][int32 tag]` in both
//! directions. All multi-byte integers are Big Endian.

use crate::error::{EnsembleError, Result};

/// Precursor size in bytes (two int32 lengths).
pub const PRECURSOR_SIZE: usize = 8;

/// Default maximum header size accepted from the service (1 MiB).
pub const DEFAULT_MAX_HEADER_SIZE: u32 = 1 << 20;

/// Default maximum payload size accepted from the service (1 GiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 1 << 30;

/// Well-known service port on the loopback interface.
pub const DEFAULT_PORT: u16 = 5002;

/// Maximum encoded sizes of individual header fields, in bytes.
pub mod limits {
    pub const TRANSPORT: usize = 32;
    pub const PROTOCOL: usize = 256;
    pub const GROUP_NAME: usize = 64;
    pub const PROPERTIES: usize = 128;
    pub const PARAMETERS: usize = 256;
    pub const ENDPOINT: usize = 48;
    pub const ADDRESS: usize = 48;
    pub const PRINCIPAL: usize = 32;
    /// Security keys are either absent or exactly this long.
    pub const KEY: usize = 32;
    /// Endpoint plus a 24-byte suffix.
    pub const NAME: usize = ENDPOINT + 24;
    pub const VERSION: usize = 8;
    /// Ranks accepted by a single send or suspect.
    pub const DESTINATIONS: usize = 10;
}

/// Requests from the client to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DownType {
    Join = 0,
    Cast = 1,
    Send = 2,
    Send1 = 3,
    Suspect = 4,
    XferDone = 5,
    Protocol = 6,
    Properties = 7,
    Leave = 8,
    Prompt = 9,
    Rekey = 10,
    BlockOk = 11,
}

impl DownType {
    /// Tag value written to the header.
    #[inline]
    pub fn tag(self) -> i32 {
        self as i32
    }
}

/// Notifications from the service to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum UpType {
    View = 0,
    Cast = 1,
    Send = 2,
    Heartbeat = 3,
    Block = 4,
    Exit = 5,
}

impl UpType {
    /// Tag value read from the header.
    #[inline]
    pub fn tag(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for UpType {
    type Error = EnsembleError;

    fn try_from(tag: i32) -> Result<Self> {
        match tag {
            0 => Ok(UpType::View),
            1 => Ok(UpType::Cast),
            2 => Ok(UpType::Send),
            3 => Ok(UpType::Heartbeat),
            4 => Ok(UpType::Block),
            5 => Ok(UpType::Exit),
            other => Err(EnsembleError::Protocol(format!(
                "Unknown upcall tag {}",
                other
            ))),
        }
    }
}

/// Decoded frame precursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precursor {
    /// Header length in bytes.
    pub header_len: i32,
    /// Payload length in bytes (0 = no payload).
    pub payload_len: i32,
}

impl Precursor {
    /// Create a new precursor.
    pub fn new(header_len: i32, payload_len: i32) -> Self {
        Self {
            header_len,
            payload_len,
        }
    }

    /// Encode precursor to bytes (Big Endian).
    pub fn encode(&self) -> [u8; PRECURSOR_SIZE] {
        let mut buf = [0u8; PRECURSOR_SIZE];
        buf[0..4].copy_from_slice(&self.header_len.to_be_bytes());
        buf[4..8].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    /// Decode precursor from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < PRECURSOR_SIZE {
            return None;
        }
        Some(Self {
            header_len: i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            payload_len: i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }

    /// Validate an inbound precursor.
    ///
    /// Checks:
    /// - Header is present (every message carries at least id and tag)
    /// - Payload length is not negative
    /// - Neither length exceeds its configured maximum
    pub fn validate(&self, max_header_size: u32, max_payload_size: u32) -> Result<()> {
        if self.header_len <= 0 {
            return Err(EnsembleError::Protocol(format!(
                "Header length {} must be positive",
                self.header_len
            )));
        }

        if self.payload_len < 0 {
            return Err(EnsembleError::Protocol(format!(
                "Payload length {} is negative",
                self.payload_len
            )));
        }

        if self.header_len as u32 > max_header_size {
            return Err(EnsembleError::Protocol(format!(
                "Header size {} exceeds maximum {}",
                self.header_len, max_header_size
            )));
        }

        if self.payload_len as u32 > max_payload_size {
            return Err(EnsembleError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_len, max_payload_size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precursor_big_endian_byte_order() {
        let bytes = Precursor::new(0x01020304, 5).encode();
        assert_eq!(bytes, [1, 2, 3, 4, 0, 0, 0, 5]);
        assert_eq!(Precursor::decode(&bytes), Some(Precursor::new(0x01020304, 5)));
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(Precursor::decode(&[0u8; 7]).is_none());
    }

    #[test]
    fn test_validate_zero_header_rejected() {
        let err = Precursor::new(0, 0)
            .validate(DEFAULT_MAX_HEADER_SIZE, DEFAULT_MAX_PAYLOAD_SIZE)
            .unwrap_err();
        assert!(err.to_string().contains("must be positive"));
    }

    #[test]
    fn test_validate_negative_payload_rejected() {
        let result = Precursor::new(8, -1).validate(DEFAULT_MAX_HEADER_SIZE, DEFAULT_MAX_PAYLOAD_SIZE);
        assert!(matches!(result, Err(EnsembleError::Protocol(_))));
    }

    #[test]
    fn test_validate_oversize() {
        assert!(Precursor::new(200, 0).validate(100, 100).is_err());
        let err = Precursor::new(8, 101).validate(100, 100).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
        assert!(Precursor::new(100, 100).validate(100, 100).is_ok());
    }

    #[test]
    fn test_downcall_tags() {
        assert_eq!(DownType::Join.tag(), 0);
        assert_eq!(DownType::Send1.tag(), 3);
        assert_eq!(DownType::Leave.tag(), 8);
        assert_eq!(DownType::BlockOk.tag(), 11);
    }

    #[test]
    fn test_upcall_tags() {
        for up in [
            UpType::View,
            UpType::Cast,
            UpType::Send,
            UpType::Heartbeat,
            UpType::Block,
            UpType::Exit,
        ] {
            assert_eq!(UpType::try_from(up.tag()).unwrap(), up);
        }
        assert!(UpType::try_from(6).is_err());
        assert!(UpType::try_from(-1).is_err());
    }

    #[test]
    fn test_name_limit() {
        assert_eq!(limits::NAME, 72);
    }
}
