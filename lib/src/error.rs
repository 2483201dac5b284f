use std::io;

use thiserror::Error;

pub type Result<T, E = DecodeError> = std::result::Result<T, E>;

/// Failure while decoding a model. Every variant is fatal to the decode call.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The buffer ends before a structurally declared length.
    #[error("truncated {what} at offset {offset:#x}")]
    Truncation { offset: u64, what: String },
    /// A record consumed more or fewer bytes than its header promised,
    /// or parallel arrays disagree in length.
    #[error("corrupt data at offset {offset:#x}: {message}")]
    StructuralCorruption { offset: u64, message: String },
    /// A sub-version selector with no known record layout.
    #[error("unsupported {what} version {value} at offset {offset:#x}")]
    UnsupportedVersion { offset: u64, what: &'static str, value: i32 },
    /// The hierarchy descriptor references objects that were not decoded.
    #[error("malformed hierarchy: {0}")]
    MalformedHierarchy(String),
}

impl DecodeError {
    pub fn truncated(offset: u64, what: impl Into<String>) -> Self {
        Self::Truncation { offset, what: what.into() }
    }

    pub fn corrupt(offset: u64, message: impl Into<String>) -> Self {
        Self::StructuralCorruption { offset, message: message.into() }
    }

    /// Byte offset the error was raised at, if it is tied to one.
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::Truncation { offset, .. }
            | Self::StructuralCorruption { offset, .. }
            | Self::UnsupportedVersion { offset, .. } => Some(*offset),
            Self::MalformedHierarchy(_) => None,
        }
    }

    /// Translates a binrw failure while reading `what` at `offset`.
    pub(crate) fn from_binrw(err: binrw::Error, offset: u64, what: &str) -> Self {
        match err {
            binrw::Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Self::truncated(offset, what)
            }
            binrw::Error::Backtrace(bt) => Self::from_binrw(*bt.error, offset, what),
            binrw::Error::BadMagic { pos, .. } => Self::corrupt(pos, format!("bad {what} magic")),
            e => Self::corrupt(offset, format!("invalid {what}: {e}")),
        }
    }
}
