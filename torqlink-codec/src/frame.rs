//! Frame header and control frame encoding

use crate::error::CodecError;
use torqlink_core::Mid;

/// Header length in characters
pub const HEADER_LENGTH: usize = 20;

/// Frame terminator
pub const NUL: u8 = 0x00;

/// Revision used for every control frame this client sends
pub const DEFAULT_REVISION: &str = "001";

/// Largest value the 4-digit length field can carry
pub const MAX_FRAME_LENGTH: usize = 9999;

/// Decoded frame header
///
/// Values are kept as the raw ASCII text from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total length field (offset 0, 4 characters)
    pub length: String,
    /// Message type (offset 4, 4 characters)
    pub mid: Mid,
    /// Revision (offset 8, 3 characters)
    pub revision: String,
    /// Filler and sequence/ack field (offset 11, 9 characters)
    pub ack_field: String,
}

impl FrameHeader {
    /// Decode the header from a frame already stripped of its terminator
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        if payload.len() < HEADER_LENGTH {
            return Err(CodecError::FrameTooShort {
                expected: HEADER_LENGTH,
                actual: payload.len(),
            });
        }

        let text = |start: usize, end: usize| String::from_utf8_lossy(&payload[start..end]).into_owned();
        Ok(Self {
            length: text(0, 4),
            mid: Mid::from_code(&text(4, 8)),
            revision: text(8, 11),
            ack_field: text(11, HEADER_LENGTH),
        })
    }
}

/// Encode a frame
///
/// Total length is `20 + data.len()`. The header is the zero-padded length,
/// the MID, the revision, a literal `0` filler and eight `0` characters for
/// the sequence/ack field. The NUL terminator is appended.
///
/// # Errors
/// Returns [`CodecError::InvalidHeaderField`] if `mid` is not 4 characters or
/// `revision` is not 3, and [`CodecError::DataTooLong`] if the total length
/// does not fit in four digits.
pub fn encode(mid: &str, revision: &str, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    check_width("message type", mid, 4)?;
    check_width("revision", revision, 3)?;
    if HEADER_LENGTH + data.len() > MAX_FRAME_LENGTH {
        return Err(CodecError::DataTooLong(data.len()));
    }
    Ok(assemble(mid, revision, data))
}

fn check_width(field: &'static str, value: &str, width: usize) -> Result<(), CodecError> {
    if value.len() != width || !value.is_ascii() {
        return Err(CodecError::InvalidHeaderField {
            field,
            width,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn assemble(mid: &str, revision: &str, data: &[u8]) -> Vec<u8> {
    let length = HEADER_LENGTH + data.len();
    let mut frame = Vec::with_capacity(length + 1);
    frame.extend_from_slice(format!("{:04}{}{}0{}", length, mid, revision, "0".repeat(8)).as_bytes());
    frame.extend_from_slice(data);
    frame.push(NUL);
    frame
}

fn control(mid: Mid) -> Vec<u8> {
    assemble(mid.code(), DEFAULT_REVISION, &[])
}

/// MID 0001, communication start
pub fn login_request() -> Vec<u8> {
    control(Mid::CommunicationStart)
}

/// MID 0003, communication stop
pub fn communication_stop() -> Vec<u8> {
    control(Mid::CommunicationStop)
}

/// MID 0060, subscribe to last tightening results
pub fn result_subscribe() -> Vec<u8> {
    control(Mid::ResultSubscribe)
}

/// MID 0062, acknowledge a received tightening result
pub fn result_ack() -> Vec<u8> {
    control(Mid::ResultAck)
}

/// MID 9999, keep alive
pub fn keep_alive() -> Vec<u8> {
    control(Mid::KeepAlive)
}
