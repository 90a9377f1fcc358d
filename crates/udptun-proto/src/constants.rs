/// Magic bytes at the beginning of every frame.
/// Used to quickly reject unrelated or corrupted data.
pub const MAGIC: [u8; 4] = *b"UDPC";

/// Wire-format protocol version.
/// Bump this only for breaking changes to the header layout or trailer.
pub const VERSION: u8 = 1;

/// Fixed header length in bytes (wire format).
pub const HEADER_LEN: usize = 18;

/// Authentication tag length in bytes (HMAC-SHA256).
pub const TAG_LEN: usize = 32;

/// Trailer length in bytes: a one-byte tag-length field plus the tag.
pub const TRAILER_LEN: usize = 1 + TAG_LEN;

/// Default maximum payload size in bytes.
/// Kept below typical path MTU to reduce fragmentation risk on the UDP side.
pub const DEFAULT_MAX_PAYLOAD: usize = 1200;

/// Hard payload ceiling implied by the 16-bit `payload_len` field.
pub const ABSOLUTE_MAX_PAYLOAD: usize = u16::MAX as usize;

/// Frame carries application data and a meaningful session id / dst port.
pub const FLAG_DATA: u8 = 0x01;

/// Empty frame sent on an idle connection to keep it alive.
pub const FLAG_KEEPALIVE: u8 = 0x02;
