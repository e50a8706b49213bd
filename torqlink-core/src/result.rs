//! Tightening result record (MID 0061 payload)
//!
//! A [`ResultRecord`] is produced once per decoded result frame and is never
//! mutated afterwards. Consumers share it behind an `Arc`; publishing a newer
//! result replaces the whole record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single field extracted from a result frame
///
/// The controller sends every field as fixed-width ASCII. Fields that parse as
/// a number are kept as numbers (torque already scaled); anything else keeps its
/// trimmed text verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric value, if the field parsed as a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    /// Text value, if the field did not parse as a number
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Number(_) => None,
            FieldValue::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(v) => write!(f, "{}", v),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

/// Result-record layout, selected by the stripped frame length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultMode {
    /// Frame length >= 205, carries an id-code segment
    Automatic,
    /// Frame length 196 or 197, no id-code segment
    Manual,
}

impl ResultMode {
    /// Human-readable label including the length rule
    pub fn label(&self) -> &'static str {
        match self {
            ResultMode::Automatic => "Automatic (Length >= 205)",
            ResultMode::Manual => "Manual (Length <= 197)",
        }
    }
}

impl fmt::Display for ResultMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Derived tightening outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TighteningResult {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "NOK")]
    Nok,
}

impl TighteningResult {
    /// `OK` iff the raw tightening status is exactly `"1"`
    pub fn from_status(raw: &str) -> Self {
        if raw == "1" {
            TighteningResult::Ok
        } else {
            TighteningResult::Nok
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TighteningResult::Ok => "OK",
            TighteningResult::Nok => "NOK",
        }
    }
}

impl fmt::Display for TighteningResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded last-tightening-result payload
///
/// Torque fields are in physical units (wire value / 100); angle fields are in
/// degrees as sent. In [`ResultMode::Manual`] the id-code is always `"-"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultRecord {
    pub mode: ResultMode,
    #[serde(rename = "CellID")]
    pub cell_id: FieldValue,
    #[serde(rename = "ChannelID")]
    pub channel_id: FieldValue,
    pub controller_name: FieldValue,
    #[serde(rename = "IDCode")]
    pub id_code: FieldValue,
    pub job_number: FieldValue,
    pub program_number: FieldValue,
    #[serde(rename = "OKLimit")]
    pub ok_limit: FieldValue,
    #[serde(rename = "OKValue")]
    pub ok_value: FieldValue,
    pub tightening_status: FieldValue,
    pub torque_status: FieldValue,
    pub angle_status: FieldValue,
    pub min_torque: FieldValue,
    pub max_torque: FieldValue,
    pub target_torque: FieldValue,
    pub actual_torque: FieldValue,
    pub min_angle: FieldValue,
    pub max_angle: FieldValue,
    pub target_angle: FieldValue,
    pub actual_angle: FieldValue,
    pub timestamp: FieldValue,
    pub last_change: FieldValue,
    pub counter_status: FieldValue,
    #[serde(rename = "TighteningID")]
    pub tightening_id: FieldValue,
    pub tightening_result: TighteningResult,
}

impl ResultRecord {
    /// Whether the controller judged this tightening OK
    pub fn is_ok(&self) -> bool {
        self.tightening_result == TighteningResult::Ok
    }

    /// One-line summary used when a new result is stored
    pub fn summary(&self) -> String {
        format!(
            "Mode: {} | ID Code: {} | Result: {} | Actual Torque: {} | Actual Angle: {}",
            self.mode,
            self.id_code,
            self.tightening_result,
            format_measure(&self.actual_torque),
            format_measure(&self.actual_angle),
        )
    }
}

fn format_measure(value: &FieldValue) -> String {
    match value {
        FieldValue::Number(v) => format!("{:.2}", v),
        FieldValue::Text(s) => s.clone(),
    }
}
