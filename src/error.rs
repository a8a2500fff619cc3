//! Error taxonomy shared by the encoder, the session and the batch reader.

use std::time::Duration;

/// Errors raised while building forms, talking to the scanner, or validating records.
///
/// `InvalidParameter` is always raised before any byte is written. `MalformedRecord`
/// is the only recoverable variant: the batch reader hands it to the corrector and
/// re-reads instead of stopping.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Scanner rejected command {command_index} ({command})")]
    ProtocolRejected { command_index: usize, command: String },
    #[error("No response terminator within {0:?}")]
    ChannelTimeout(Duration),
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
    #[error("Session faulted; reset before {0}")]
    SessionFaulted(&'static str),
    #[error("Malformed record: {0}")]
    MalformedRecord(#[from] RecordFault),
    #[error("Parse: {0}")]
    Parse(String),
    #[error("Config: {0}")]
    Config(String),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ScanError::InvalidParameter(msg.into())
    }

    /// True for errors after which the batch may continue with a re-read.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ScanError::MalformedRecord(_))
    }
}

/// Why a scanned record was refused by the validator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordFault {
    #[error("unreadable marks in field(s) {fields:?}")]
    Unreadable { fields: Vec<usize> },
    #[error("identifier field {field} is missing")]
    MissingIdentifier { field: usize },
    #[error("bad identifier {value:?} in field {field}")]
    BadIdentifier { field: usize, value: String },
    #[error("field {field} is blank")]
    Incomplete { field: usize },
    #[error("non-ASCII byte 0x{byte:02x} at offset {offset} in {text:?}")]
    Garbled { offset: usize, byte: u8, text: String },
}
