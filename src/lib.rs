//! # omrscan: form programming and batch reading for OMR scanners
//!
//! Drives an optical-mark-recognition ("bubble sheet") scanner that speaks a
//! line-oriented text protocol over a byte channel. The crate does two jobs:
//!
//! - **Form definitions**: describe a sheet's fields as typed geometry, let the
//!   builder derive end coordinates, and encode the result as the scanner's
//!   `FRM=` command sequence.
//! - **Batch reads**: upload a definition, then read sheets one at a time until
//!   the scanner reports an empty hopper, validating each delimited record and
//!   appending accepted ones to a sink.
//!
//! ## Wire protocol
//!
//! Commands are framed `ESC <text> CR`; responses `<text> CR`. An empty response
//! acknowledges, a lone `BEL` rejects, `!` ends a batch, anything else is a record.
//!
//! ```text
//! SRST
//! FRM=FS 21 0 48 N N N
//! FRM=ID 1 L 21 0100000000XXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX
//! FRM=IN 1 I
//! FRM=MC N N 1 1 20 15 11 9 C 4 10 0123456789
//! FRM=LS
//! READ 0 Y
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use omrscan::{BatchReader, FileSink, RatingSheet, RecordValidator, Session, StreamChannel};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let port = std::fs::OpenOptions::new().read(true).write(true).open("/dev/ttyUSB0")?;
//! let channel = StreamChannel::new(port.try_clone()?, port)?;
//! let mut session = Session::new(channel);
//! let layout = RatingSheet::student().layout()?;
//! session.upload(&layout.definition)?;
//! let validator = RecordValidator::new(layout.policy)?;
//! let mut sink = FileSink::open("scandata")?;
//! let mut fix = |fault: &omrscan::RecordFault, _: &omrscan::ScanRecord| -> std::io::Result<()> {
//!     eprintln!("{}", fault);
//!     Ok(())
//! };
//! BatchReader::new(&mut session, &validator).run(&mut sink, &mut fix)?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod form;
pub mod geometry;
pub mod layout;
pub mod logging;
pub mod parser;
pub mod record;
pub mod session;
pub mod validate;

pub use batch::{BatchReader, BatchSummary, Corrector, FileSink, RecordSink};
pub use channel::{CancelHandle, Channel, MemoryChannel, StreamChannel};
pub use codec::{Command, Response};
pub use config::ScannerConfig;
pub use error::{RecordFault, ScanError};
pub use form::{FormBuilder, FormDefinition, SpacingTerm};
pub use geometry::{FieldGeometry, FixedValue, FormIdentifier, MultipleChoice, Orientation, RandomEntry, RandomInput};
pub use layout::{FormLayout, RatingSheet};
pub use parser::parse_command;
pub use record::ScanRecord;
pub use session::{ReadOutcome, Session, SessionConfig, SessionState, SharedSession};
pub use validate::{RecordValidator, ValidationPolicy};
