//! Glove identification from the HID report map.

use crate::types::{GloveFlags, Handedness};
use std::fmt;

/// HID usage page the glove declares in its report map.
pub const GLOVE_USAGE_PAGE: u8 = 0x03;
/// HID usage the glove declares in its report map.
pub const GLOVE_USAGE: u8 = 0x04;

const USAGE_PAGE_INDEX: usize = 1;
const USAGE_INDEX: usize = 3;

/// Why a report map was not accepted as a glove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    TooShort { len: usize },
    UsagePage(u8),
    Usage(u8),
    /// The peripheral has no HID service or no report characteristics.
    NotHid,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TooShort { len } => write!(f, "report map too short ({} bytes)", len),
            Rejection::UsagePage(p) => write!(f, "usage page 0x{:02x}, expected 0x{:02x}", p, GLOVE_USAGE_PAGE),
            Rejection::Usage(u) => write!(f, "usage 0x{:02x}, expected 0x{:02x}", u, GLOVE_USAGE),
            Rejection::NotHid => f.write_str("no HID report service"),
        }
    }
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub is_glove: bool,
    pub reason: Option<Rejection>,
}

/// Check whether a HID report map belongs to a glove.
pub fn validate(descriptor: &[u8]) -> Identity {
    let reason = match (descriptor.get(USAGE_PAGE_INDEX), descriptor.get(USAGE_INDEX)) {
        (Some(&page), Some(&usage)) => {
            if page != GLOVE_USAGE_PAGE {
                Some(Rejection::UsagePage(page))
            } else if usage != GLOVE_USAGE {
                Some(Rejection::Usage(usage))
            } else {
                None
            }
        }
        _ => Some(Rejection::TooShort { len: descriptor.len() }),
    };

    Identity {
        is_glove: reason.is_none(),
        reason,
    }
}

/// Handedness from the first byte of the feature report.
pub fn handedness(feature_first_byte: Option<u8>) -> Handedness {
    match feature_first_byte {
        Some(b) if GloveFlags::from_bits_truncate(b).contains(GloveFlags::HANDEDNESS) => {
            Handedness::Right
        }
        Some(_) => Handedness::Left,
        None => Handedness::Unknown,
    }
}

/// Flags byte of the feature report, if it has been read.
pub fn flags(feature_report: Option<&[u8]>) -> Option<GloveFlags> {
    feature_report
        .and_then(|r| r.first())
        .map(|&b| GloveFlags::from_bits_truncate(b))
}
