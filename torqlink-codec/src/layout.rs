//! Fixed-offset layouts of the MID 0061 result record
//!
//! Offsets index the frame after the terminator and every space have been
//! removed. The manual layout has no id-code segment, so every field after
//! the controller name sits 9 characters earlier than in the automatic one.

use torqlink_core::ResultMode;

/// Minimum stripped length of an automatic-mode frame
pub const AUTOMATIC_MIN_LENGTH: usize = 205;

/// Stripped lengths accepted for a manual-mode frame
pub const MANUAL_LENGTHS: std::ops::RangeInclusive<usize> = 196..=197;

/// Half-open character range of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

const fn span(start: usize, end: usize) -> Span {
    Span { start, end }
}

/// Field offsets for one result-record mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLayout {
    pub mode: ResultMode,
    pub cell_id: Span,
    pub channel_id: Span,
    pub controller_name: Span,
    /// `None` when the layout carries no id-code
    pub id_code: Option<Span>,
    pub job_number: Span,
    pub program_number: Span,
    pub ok_limit: Span,
    pub ok_value: Span,
    pub tightening_status: Span,
    pub torque_status: Span,
    pub angle_status: Span,
    pub min_torque: Span,
    pub max_torque: Span,
    pub target_torque: Span,
    pub actual_torque: Span,
    pub min_angle: Span,
    pub max_angle: Span,
    pub target_angle: Span,
    pub actual_angle: Span,
    pub timestamp: Span,
    pub last_change: Span,
    pub counter_status: Span,
    pub tightening_id: Span,
}

pub const AUTOMATIC: ResultLayout = ResultLayout {
    mode: ResultMode::Automatic,
    cell_id: span(22, 26),
    channel_id: span(28, 30),
    controller_name: span(32, 47),
    id_code: Some(span(49, 58)),
    job_number: span(60, 62),
    program_number: span(64, 67),
    ok_limit: span(69, 73),
    ok_value: span(75, 79),
    tightening_status: span(81, 82),
    torque_status: span(84, 85),
    angle_status: span(87, 88),
    min_torque: span(90, 96),
    max_torque: span(98, 104),
    target_torque: span(106, 112),
    actual_torque: span(114, 120),
    min_angle: span(122, 127),
    max_angle: span(129, 134),
    target_angle: span(136, 141),
    actual_angle: span(143, 148),
    timestamp: span(150, 169),
    last_change: span(171, 190),
    counter_status: span(192, 193),
    tightening_id: span(195, 205),
};

pub const MANUAL: ResultLayout = ResultLayout {
    mode: ResultMode::Manual,
    cell_id: span(22, 26),
    channel_id: span(28, 30),
    controller_name: span(32, 47),
    id_code: None,
    job_number: span(51, 53),
    program_number: span(55, 58),
    ok_limit: span(60, 64),
    ok_value: span(66, 70),
    tightening_status: span(72, 73),
    torque_status: span(75, 76),
    angle_status: span(78, 79),
    min_torque: span(81, 87),
    max_torque: span(89, 95),
    target_torque: span(97, 103),
    actual_torque: span(105, 111),
    min_angle: span(113, 118),
    max_angle: span(120, 125),
    target_angle: span(127, 132),
    actual_angle: span(134, 139),
    timestamp: span(141, 160),
    last_change: span(162, 181),
    counter_status: span(183, 184),
    tightening_id: span(186, 196),
};

/// Pick the layout for a stripped frame length
pub fn classify(length: usize) -> Option<&'static ResultLayout> {
    if length >= AUTOMATIC_MIN_LENGTH {
        Some(&AUTOMATIC)
    } else if MANUAL_LENGTHS.contains(&length) {
        Some(&MANUAL)
    } else {
        None
    }
}

impl ResultLayout {
    /// End offset of the last field; every accepted frame is at least this long
    pub fn extent(&self) -> usize {
        self.tightening_id.end
    }
}
