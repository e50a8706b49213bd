//! Message type identifiers (MIDs)
//!
//! Only the handful of MIDs this client sends or recognizes are modelled;
//! everything else arrives as [`Mid::Other`].

use std::fmt;

/// Message type identifier carried at offset 4 of every frame header
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mid {
    /// 0001 - communication start (login request)
    CommunicationStart,
    /// 0002 - communication start acknowledge
    CommunicationStartAck,
    /// 0003 - communication stop
    CommunicationStop,
    /// 0005 - command accepted
    CommandAccepted,
    /// 0060 - last tightening result subscribe
    ResultSubscribe,
    /// 0061 - last tightening result data
    ResultData,
    /// 0062 - last tightening result acknowledge
    ResultAck,
    /// 9999 - keep alive
    KeepAlive,
    /// Any other four-character code
    Other(String),
}

impl Mid {
    /// Four-character wire code
    pub fn code(&self) -> &str {
        match self {
            Mid::CommunicationStart => "0001",
            Mid::CommunicationStartAck => "0002",
            Mid::CommunicationStop => "0003",
            Mid::CommandAccepted => "0005",
            Mid::ResultSubscribe => "0060",
            Mid::ResultData => "0061",
            Mid::ResultAck => "0062",
            Mid::KeepAlive => "9999",
            Mid::Other(code) => code,
        }
    }

    /// Map a wire code to a MID
    pub fn from_code(code: &str) -> Self {
        match code {
            "0001" => Mid::CommunicationStart,
            "0002" => Mid::CommunicationStartAck,
            "0003" => Mid::CommunicationStop,
            "0005" => Mid::CommandAccepted,
            "0060" => Mid::ResultSubscribe,
            "0061" => Mid::ResultData,
            "0062" => Mid::ResultAck,
            "9999" => Mid::KeepAlive,
            other => Mid::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Mid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MID {}", self.code())
    }
}
