//! Frame decoding into typed messages

use crate::error::CodecError;
use crate::frame::{FrameHeader, NUL};
use crate::layout::{self, ResultLayout, Span};
use torqlink_core::{FieldValue, Mid, ResultRecord, TighteningResult};

/// Payload of a decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum MessageData {
    /// Any MID other than 0061; not parsed further
    Opaque,
    /// MID 0061 decoded with one of the two result layouts
    Result(ResultRecord),
    /// MID 0061 whose length matches no layout
    Error(CodecError),
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub header: FrameHeader,
    pub data: MessageData,
}

impl ParsedMessage {
    /// Message type of this frame
    pub fn mid(&self) -> &Mid {
        &self.header.mid
    }

    /// The result record, if this is a well-formed MID 0061
    pub fn result(&self) -> Option<&ResultRecord> {
        match &self.data {
            MessageData::Result(record) => Some(record),
            _ => None,
        }
    }
}

/// Decode one raw frame
///
/// The trailing NUL (if present) and every space are removed first; all
/// offsets apply to the stripped text. Only MID 0061 frames are parsed past
/// the header.
///
/// # Errors
/// Returns [`CodecError::FrameTooShort`] if the stripped frame cannot hold a
/// header. A result frame of unexpected length is not an `Err`; it is reported
/// as [`MessageData::Error`] so the caller still sees the header.
pub fn decode(raw: &[u8]) -> Result<ParsedMessage, CodecError> {
    let raw = raw.strip_suffix(&[NUL]).unwrap_or(raw);
    let payload: Vec<u8> = raw.iter().copied().filter(|b| *b != b' ').collect();

    let header = FrameHeader::decode(&payload)?;
    if header.mid != Mid::ResultData {
        return Ok(ParsedMessage {
            header,
            data: MessageData::Opaque,
        });
    }

    let data = match layout::classify(payload.len()) {
        Some(layout) => MessageData::Result(decode_result(&payload, layout)),
        None => MessageData::Error(CodecError::UnexpectedResultLength(payload.len())),
    };
    Ok(ParsedMessage { header, data })
}

#[derive(Clone, Copy)]
enum Scale {
    None,
    /// Wire value is in hundredths
    Hundredths,
}

fn raw_field(payload: &[u8], span: Span) -> String {
    payload
        .get(span.start..span.end)
        .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
        .unwrap_or_default()
}

fn field(payload: &[u8], span: Span, scale: Scale) -> FieldValue {
    let raw = raw_field(payload, span);
    convert(&raw, scale)
}

fn convert(raw: &str, scale: Scale) -> FieldValue {
    match raw.parse::<f64>() {
        Ok(value) => match scale {
            Scale::None => FieldValue::Number(value),
            Scale::Hundredths => FieldValue::Number(value / 100.0),
        },
        Err(_) => FieldValue::Text(raw.to_string()),
    }
}

fn decode_result(payload: &[u8], layout: &ResultLayout) -> ResultRecord {
    let plain = |span| field(payload, span, Scale::None);
    let torque = |span| field(payload, span, Scale::Hundredths);

    let status = raw_field(payload, layout.tightening_status);
    let id_code = match layout.id_code {
        Some(span) => plain(span),
        None => FieldValue::Text("-".to_string()),
    };

    ResultRecord {
        mode: layout.mode,
        cell_id: plain(layout.cell_id),
        channel_id: plain(layout.channel_id),
        controller_name: plain(layout.controller_name),
        id_code,
        job_number: plain(layout.job_number),
        program_number: plain(layout.program_number),
        ok_limit: plain(layout.ok_limit),
        ok_value: plain(layout.ok_value),
        tightening_result: TighteningResult::from_status(&status),
        tightening_status: convert(&status, Scale::None),
        torque_status: plain(layout.torque_status),
        angle_status: plain(layout.angle_status),
        min_torque: torque(layout.min_torque),
        max_torque: torque(layout.max_torque),
        target_torque: torque(layout.target_torque),
        actual_torque: torque(layout.actual_torque),
        min_angle: plain(layout.min_angle),
        max_angle: plain(layout.max_angle),
        target_angle: plain(layout.target_angle),
        actual_angle: plain(layout.actual_angle),
        timestamp: plain(layout.timestamp),
        last_change: plain(layout.last_change),
        counter_status: plain(layout.counter_status),
        tightening_id: plain(layout.tightening_id),
    }
}
