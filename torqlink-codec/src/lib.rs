//! Message codec for the tightening-controller open protocol
//!
//! Frames are ASCII, terminated by a single NUL byte, and start with a
//! 20-character header:
//!
//! | Offset | Field                          | Width |
//! |--------|--------------------------------|-------|
//! | 0      | total length (zero-padded)     | 4     |
//! | 4      | message type (MID)             | 4     |
//! | 8      | revision                       | 3     |
//! | 11     | filler + sequence/ack          | 9     |
//!
//! The codec is stateless: [`encode`] builds outgoing control frames and
//! [`decode`] turns a raw frame into a [`ParsedMessage`], including the two
//! fixed-offset result layouts of MID 0061.

pub mod error;
pub mod frame;
pub mod layout;
pub mod message;

pub use error::CodecError;
pub use frame::{
    communication_stop, encode, keep_alive, login_request, result_ack, result_subscribe,
    FrameHeader, DEFAULT_REVISION, HEADER_LENGTH, MAX_FRAME_LENGTH, NUL,
};
pub use message::{decode, MessageData, ParsedMessage};
