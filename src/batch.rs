//! Batch reading: pull sheets until the scanner reports an empty hopper.
//!
//! Each record is validated; accepted ones go to the [`RecordSink`], refused ones
//! go to the [`Corrector`] (an operator fixing the sheet) and the read is repeated.
//! Only fatal session or I/O errors end a batch early.

use crate::channel::Channel;
use crate::error::{RecordFault, ScanError};
use crate::record::ScanRecord;
use crate::session::{ReadOutcome, Session};
use crate::validate::RecordValidator;
use log::{info, warn};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Append-only store for accepted records.
pub trait RecordSink {
    fn append(&mut self, record: &ScanRecord) -> io::Result<()>;
}

impl RecordSink for Vec<String> {
    fn append(&mut self, record: &ScanRecord) -> io::Result<()> {
        self.push(record.text().to_string());
        Ok(())
    }
}

/// Appends `<record>\r\n` to a file, flushing after each record.
pub struct FileSink {
    file: File,
}

impl FileSink {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(FileSink { file })
    }
}

impl RecordSink for FileSink {
    fn append(&mut self, record: &ScanRecord) -> io::Result<()> {
        write!(self.file, "{}\r\n", record.text())?;
        self.file.flush()
    }
}

/// Called with a refused record before it is read again. Returning an error
/// stops the batch.
pub trait Corrector {
    fn correct(&mut self, fault: &RecordFault, record: &ScanRecord) -> io::Result<()>;
}

impl<F> Corrector for F
where
    F: FnMut(&RecordFault, &ScanRecord) -> io::Result<()>,
{
    fn correct(&mut self, fault: &RecordFault, record: &ScanRecord) -> io::Result<()> {
        self(fault, record)
    }
}

/// Counters for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub accepted: usize,
    /// Unreadable fields blanked across accepted records.
    pub sanitized: usize,
    pub auto_filled: usize,
    pub corrections: usize,
}

pub struct BatchReader<'a, C: Channel> {
    session: &'a mut Session<C>,
    validator: &'a RecordValidator,
}

impl<'a, C: Channel> BatchReader<'a, C> {
    pub fn new(session: &'a mut Session<C>, validator: &'a RecordValidator) -> Self {
        BatchReader { session, validator }
    }

    /// Read until end of batch.
    pub fn run<S, K>(&mut self, sink: &mut S, corrector: &mut K) -> Result<BatchSummary, ScanError>
    where
        S: RecordSink + ?Sized,
        K: Corrector + ?Sized,
    {
        let mut summary = BatchSummary::default();
        loop {
            let text = match self.session.read_next() {
                Ok(ReadOutcome::EndOfBatch) => break,
                Ok(ReadOutcome::Record(text)) => text,
                Err(ScanError::MalformedRecord(fault)) => {
                    let shown = match &fault {
                        RecordFault::Garbled { text, .. } => text.clone(),
                        _ => String::new(),
                    };
                    warn!("event=record_refused fault={:?}", fault.to_string());
                    summary.corrections += 1;
                    corrector.correct(&fault, &ScanRecord::new(shown, self.validator.policy().separator))?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let record = ScanRecord::new(text, self.validator.policy().separator);
            match self.validator.validate(&record) {
                Ok(v) => {
                    sink.append(&v.record)?;
                    summary.accepted += 1;
                    summary.sanitized += v.sanitized;
                    if v.auto_filled {
                        summary.auto_filled += 1;
                    }
                }
                Err(fault) => {
                    warn!("event=record_refused fault={:?} record={:?}", fault.to_string(), record.text());
                    summary.corrections += 1;
                    corrector.correct(&fault, &record)?;
                }
            }
        }
        info!(
            "event=batch_done accepted={} sanitized={} auto_filled={} corrections={}",
            summary.accepted, summary.sanitized, summary.auto_filled, summary.corrections
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::validate::ValidationPolicy;

    #[test]
    fn file_sink_appends_crlf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scandata");
        {
            let mut sink = FileSink::open(&path).unwrap();
            sink.append(&ScanRecord::new("I,3401", ',')).unwrap();
        }
        {
            let mut sink = FileSink::open(&path).unwrap();
            sink.append(&ScanRecord::new("I,9901", ',')).unwrap();
        }
        let data = std::fs::read_to_string(&path).unwrap();
        assert_eq!(data, "I,3401\r\nI,9901\r\n");
    }

    #[test]
    fn refused_record_is_corrected_and_reread() {
        let mut ch = MemoryChannel::new();
        ch.push_payload("I,0000");
        ch.push_payload("I,3401");
        ch.push_payload("!");
        let mut session = Session::new(ch);
        let validator = RecordValidator::new(ValidationPolicy::default()).unwrap();
        let mut sink: Vec<String> = Vec::new();
        let mut faults = Vec::new();
        let mut corrector = |f: &RecordFault, _: &ScanRecord| -> io::Result<()> {
            faults.push(f.clone());
            Ok(())
        };
        let summary = BatchReader::new(&mut session, &validator)
            .run(&mut sink, &mut corrector)
            .unwrap();
        assert_eq!(sink, vec!["I,3401".to_string()]);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.corrections, 1);
        assert_eq!(faults.len(), 1);
        assert_eq!(session.channel().sent_commands().len(), 3);
    }

    #[test]
    fn garbled_record_goes_to_corrector() {
        let mut ch = MemoryChannel::new();
        ch.push_payload("I,34\u{fffd}1");
        ch.push_payload("I,3401");
        ch.push_payload("!");
        let mut session = Session::new(ch);
        let validator = RecordValidator::new(ValidationPolicy::default()).unwrap();
        let mut sink: Vec<String> = Vec::new();
        let mut faults = Vec::new();
        let mut corrector = |f: &RecordFault, r: &ScanRecord| -> io::Result<()> {
            faults.push((f.clone(), r.text().to_string()));
            Ok(())
        };
        let summary = BatchReader::new(&mut session, &validator)
            .run(&mut sink, &mut corrector)
            .unwrap();
        assert_eq!(sink, vec!["I,3401".to_string()]);
        assert_eq!(summary.corrections, 1);
        assert!(matches!(faults[0].0, RecordFault::Garbled { offset: 4, .. }));
        assert_eq!(faults[0].1, "I,34\u{fffd}1");
    }

    #[test]
    fn corrector_error_stops_batch() {
        let mut ch = MemoryChannel::new();
        ch.push_payload("I,0000");
        let mut session = Session::new(ch);
        let validator = RecordValidator::new(ValidationPolicy::default()).unwrap();
        let mut sink: Vec<String> = Vec::new();
        let mut corrector = |_: &RecordFault, _: &ScanRecord| -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Interrupted, "operator quit"))
        };
        let r = BatchReader::new(&mut session, &validator).run(&mut sink, &mut corrector);
        assert!(matches!(r, Err(ScanError::Io(_))));
    }
}
