use crate::{ParamId, Timestamp};

/// Discriminant stored alongside each input-log record so a shard scanner
/// can dispatch without guessing at payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordTag {
    SeriesDecl = 1,
    Write = 2,
}

impl RecordTag {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(RecordTag::SeriesDecl),
            2 => Some(RecordTag::Write),
            _ => None,
        }
    }
}

/// One entry in the input log: either a name->id declaration or a write.
#[derive(Debug, Clone, PartialEq)]
pub enum InputRecord {
    SeriesDecl {
        id: ParamId,
        canonical_name: String,
    },
    Write {
        id: ParamId,
        timestamp: Timestamp,
        value: f64,
    },
}

impl InputRecord {
    pub fn tag(&self) -> RecordTag {
        match self {
            InputRecord::SeriesDecl { .. } => RecordTag::SeriesDecl,
            InputRecord::Write { .. } => RecordTag::Write,
        }
    }
}
