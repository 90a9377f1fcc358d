//! Wire codec: serialization plus symmetric authentication.
//!
//! Every frame on the wire is `[header][payload][tag_len][tag]`, where the
//! tag is HMAC-SHA256 over header ‖ payload, keyed by the shared token. The
//! trailer itself is not covered by the tag.

use bytes::Bytes;
use ring::hmac;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    constants::{ABSOLUTE_MAX_PAYLOAD, DEFAULT_MAX_PAYLOAD, HEADER_LEN, TAG_LEN, TRAILER_LEN},
    error::ProtoError,
    frame::{Frame, Header},
};

fn effective_max(max_payload: usize) -> usize {
    if max_payload == 0 {
        DEFAULT_MAX_PAYLOAD
    } else {
        max_payload.min(ABSOLUTE_MAX_PAYLOAD)
    }
}

/// Serialize and sign a frame.
///
/// Rejects payloads over `max_payload` (capped at the 16-bit wire limit) and
/// data frames with destination port 0. Deterministic for valid input: the
/// same frame and token always produce the same bytes.
pub fn encode(frame: &Frame, token: &str, max_payload: usize) -> Result<Vec<u8>, ProtoError> {
    let max_payload = effective_max(max_payload);
    if frame.payload.len() > max_payload {
        return Err(ProtoError::PayloadTooLarge(frame.payload.len()));
    }
    if frame.is_data() && frame.header.dst_port == 0 {
        return Err(ProtoError::InvalidDstPort);
    }

    let mut header = frame.header;
    header.payload_len = frame.payload.len() as u16;

    let mut out = Vec::with_capacity(HEADER_LEN + frame.payload.len() + TRAILER_LEN);
    let mut hbuf = [0u8; HEADER_LEN];
    header.encode_into(&mut hbuf);
    out.extend_from_slice(&hbuf);
    out.extend_from_slice(&frame.payload);

    let key = hmac::Key::new(hmac::HMAC_SHA256, token.as_bytes());
    let tag = hmac::sign(&key, &out);
    out.push(TAG_LEN as u8);
    out.extend_from_slice(tag.as_ref());
    Ok(out)
}

/// Read and authenticate exactly one frame from `reader`.
///
/// The declared payload length is validated against `max_payload` before any
/// payload bytes are read, so a hostile length field cannot force a large
/// allocation. Tag comparison is constant-time (`ring::hmac::verify`).
///
/// Short reads surface as [`ProtoError::Io`], distinct from protocol
/// validation errors. Either way the stream is left mid-frame and the
/// protocol has no resync marker, so any error here means the caller must
/// close the connection and establish a new one.
pub async fn decode_from<R>(
    reader: &mut R,
    token: &str,
    max_payload: usize,
) -> Result<Frame, ProtoError>
where
    R: AsyncRead + Unpin,
{
    let max_payload = effective_max(max_payload);

    let mut hbuf = [0u8; HEADER_LEN];
    reader.read_exact(&mut hbuf).await?;
    let header = Header::decode(&hbuf)?;
    if header.payload_len as usize > max_payload {
        return Err(ProtoError::PayloadTooLarge(header.payload_len as usize));
    }

    let mut payload = vec![0u8; header.payload_len as usize];
    reader.read_exact(&mut payload).await?;

    let mut trailer = [0u8; TRAILER_LEN];
    reader.read_exact(&mut trailer).await?;
    if trailer[0] != TAG_LEN as u8 {
        return Err(ProtoError::BadTrailer(trailer[0]));
    }

    let key = hmac::Key::new(hmac::HMAC_SHA256, token.as_bytes());
    let mut signed = Vec::with_capacity(HEADER_LEN + payload.len());
    signed.extend_from_slice(&hbuf);
    signed.extend_from_slice(&payload);
    hmac::verify(&key, &signed, &trailer[1..]).map_err(|_| ProtoError::BadAuth)?;

    Ok(Frame {
        header,
        payload: Bytes::from(payload),
    })
}
