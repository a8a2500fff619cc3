//! Encode commands to wire text and decode framed responses.
//!
//! Commands go out as `ESC <text> CR`; responses come back as `<text> CR`. An empty
//! response acknowledges, a lone `BEL` rejects, anything else is payload the codec
//! passes through untouched. The protocol is ASCII; any other byte in a response
//! is reported as a garbled record rather than replaced.

use crate::channel::Channel;
use crate::error::{RecordFault, ScanError};
use crate::geometry::{FixedValue, FormIdentifier, MultipleChoice, RandomInput};
use std::fmt;
use std::io;
use std::time::{Duration, Instant};

pub const ESC: u8 = 0x1b;
pub const CR: u8 = 0x0d;
pub const BEL: u8 = 0x07;

/// One scanner command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reset,
    Threshold { darkness: u8, contrast: u8 },
    FormStart { lines: u32, cols: u32 },
    FormEnd,
    /// `width` is the column count the mask is padded to.
    Identifier { identifier: FormIdentifier, width: u32 },
    Fixed(FixedValue),
    /// End coordinates are derived by the builder and carried verbatim.
    MultipleChoice {
        field: MultipleChoice,
        line_end: u32,
        col_end: u32,
    },
    RandomInput(RandomInput),
    Read,
}

impl Command {
    /// Wire text without framing.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// `ESC text CR`, ready for the channel.
    pub fn frame(&self) -> Vec<u8> {
        let text = self.encode();
        let mut out = Vec::with_capacity(text.len() + 2);
        out.push(ESC);
        out.extend_from_slice(text.as_bytes());
        out.push(CR);
        out
    }

    /// Short name used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Reset => "reset",
            Command::Threshold { .. } => "threshold",
            Command::FormStart { .. } => "form_start",
            Command::FormEnd => "form_end",
            Command::Identifier { .. } => "identifier",
            Command::Fixed(_) => "fixed",
            Command::MultipleChoice { .. } => "multiple_choice",
            Command::RandomInput(_) => "random_input",
            Command::Read => "read",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Reset => write!(f, "SRST"),
            Command::Threshold { darkness, contrast } => write!(f, "THR={} {}", darkness, contrast),
            Command::FormStart { lines, cols } => write!(f, "FRM=FS {} 0 {} N N N", lines, cols),
            Command::FormEnd => write!(f, "FRM=LS"),
            Command::Identifier { identifier, width } => write!(
                f,
                "FRM=ID 1 {} {} {}",
                identifier.orientation(),
                identifier.position(),
                identifier.wire_mask(*width)
            ),
            Command::Fixed(v) => write!(f, "FRM=IN {} {}", v.size(), v.literal()),
            Command::MultipleChoice { field, line_end, col_end } => write!(
                f,
                "FRM=MC N N {} 1 {} {} {} {} {} {} {} {}",
                field.mark_size(),
                field.line_start(),
                field.col_start(),
                line_end,
                col_end,
                field.orientation(),
                field.field_size(),
                field.num_values(),
                field.values()
            ),
            Command::RandomInput(ri) => {
                write!(f, "FRM=RI N N {}", ri.field_len())?;
                for e in ri.entries() {
                    write!(f, " {} {} {} {}", e.size, e.line, e.col, e.value)?;
                }
                Ok(())
            }
            Command::Read => write!(f, "READ 0 Y"),
        }
    }
}

/// A decoded response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ack,
    Rejected,
    Payload(String),
}

/// Classify the bytes of one response (terminator already stripped).
pub fn decode_response(buf: &[u8]) -> Result<Response, ScanError> {
    match buf {
        [] => Ok(Response::Ack),
        [BEL] => Ok(Response::Rejected),
        _ => match buf.iter().position(|b| !b.is_ascii()) {
            Some(offset) => Err(RecordFault::Garbled {
                offset,
                byte: buf[offset],
                text: String::from_utf8_lossy(buf).into_owned(),
            }
            .into()),
            None => Ok(Response::Payload(buf.iter().map(|&b| char::from(b)).collect())),
        },
    }
}

/// Read one response: bytes up to and excluding the first CR.
///
/// The whole response must arrive within `timeout`. Bytes after the CR are left
/// in the channel.
pub fn read_response<C: Channel + ?Sized>(channel: &mut C, timeout: Duration) -> Result<Response, ScanError> {
    let deadline = Instant::now() + timeout;
    let mut buf = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ScanError::ChannelTimeout(timeout));
        }
        let byte = channel.recv_byte(remaining).map_err(|e| channel_error(e, timeout))?;
        if byte == CR {
            break;
        }
        buf.push(byte);
    }
    decode_response(&buf)
}

/// Map a channel I/O failure, on either direction, to the session error taxonomy.
pub(crate) fn channel_error(e: io::Error, timeout: Duration) -> ScanError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ScanError::ChannelTimeout(timeout),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe => {
            ScanError::ChannelClosed(e.to_string())
        }
        _ => ScanError::Io(e),
    }
}
