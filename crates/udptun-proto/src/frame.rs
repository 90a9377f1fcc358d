use bytes::Bytes;

use crate::{
    constants::{FLAG_DATA, FLAG_KEEPALIVE, HEADER_LEN, MAGIC, VERSION},
    error::ProtoError,
};

/// Frame header (wire format).
///
/// Encoding rules:
/// - Fixed size: exactly `HEADER_LEN` bytes.
/// - Integer fields are big-endian.
/// - Layout is defined by `encode_into()` / `decode()` offsets below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Per-frame flags: `FLAG_DATA` and/or `FLAG_KEEPALIVE`.
    pub flags: u8,

    /// Opaque correlation token. Assigned by the client per local UDP peer;
    /// the server echoes it back unchanged on replies. 0 on keepalives.
    pub session_id: u64,

    /// UDP destination port at the upstream side. Must be nonzero on data
    /// frames; the codec enforces this at encode time.
    pub dst_port: u16,

    /// Payload length in bytes. Always equals the transmitted payload length.
    pub payload_len: u16,
}

impl Header {
    /// Header size in bytes for the current wire layout.
    pub const LEN: usize = HEADER_LEN;

    /// Encode this header into `out` using the current fixed wire layout.
    ///
    /// Offsets (bytes):
    /// - 0..4   magic
    /// - 4      version
    /// - 5      flags
    /// - 6..14  session_id (u64 BE)
    /// - 14..16 dst_port (u16 BE)
    /// - 16..18 payload_len (u16 BE)
    pub fn encode_into(&self, out: &mut [u8; HEADER_LEN]) {
        out[0..4].copy_from_slice(&MAGIC);
        out[4] = VERSION;
        out[5] = self.flags;
        out[6..14].copy_from_slice(&self.session_id.to_be_bytes());
        out[14..16].copy_from_slice(&self.dst_port.to_be_bytes());
        out[16..18].copy_from_slice(&self.payload_len.to_be_bytes());
    }

    /// Decode a fixed-size header buffer.
    ///
    /// Validates magic and version only. The declared payload length is
    /// checked by the codec against its configured maximum before any
    /// payload bytes are read from the stream.
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Result<Header, ProtoError> {
        if buf[0..4] != MAGIC {
            return Err(ProtoError::BadMagic);
        }
        let version = buf[4];
        if version != VERSION {
            return Err(ProtoError::UnsupportedVersion(version));
        }
        Ok(Header {
            flags: buf[5],
            session_id: u64::from_be_bytes(buf[6..14].try_into().expect("slice length is 8")),
            dst_port: u16::from_be_bytes(buf[14..16].try_into().expect("slice length is 2")),
            payload_len: u16::from_be_bytes(buf[16..18].try_into().expect("slice length is 2")),
        })
    }
}

/// One logical tunnel message, independent of its wire serialization.
///
/// Immutable once constructed and consumed once; for frames built through
/// the constructors, `header.payload_len` matches `payload.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub payload: Bytes,
}

impl Frame {
    /// Data frame addressed at `dst_port` on the upstream side.
    pub fn data(session_id: u64, dst_port: u16, payload: Bytes) -> Self {
        Self {
            header: Header {
                flags: FLAG_DATA,
                session_id,
                dst_port,
                payload_len: payload.len() as u16,
            },
            payload,
        }
    }

    /// Empty keepalive frame (session id 0, no destination).
    pub fn keepalive() -> Self {
        Self {
            header: Header {
                flags: FLAG_KEEPALIVE,
                session_id: 0,
                dst_port: 0,
                payload_len: 0,
            },
            payload: Bytes::new(),
        }
    }

    pub fn is_data(&self) -> bool {
        self.header.flags & FLAG_DATA != 0
    }

    pub fn is_keepalive(&self) -> bool {
        self.header.flags & FLAG_KEEPALIVE != 0
    }
}
