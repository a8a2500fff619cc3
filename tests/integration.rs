//! Integration tests: upload, batch reading, validation and persistence against
//! scripted and simulated scanners.

use omrscan::codec::CR;
use omrscan::validate::ValidationPolicy;
use omrscan::{
    BatchReader, FileSink, FormDefinition, MemoryChannel, RatingSheet, ReadOutcome, RecordFault, RecordValidator, ScanError,
    ScanRecord, Session, SessionState, SharedSession, StreamChannel,
};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::mpsc;
use std::thread;

const GOOD: &str = "S,3401,567,2,10,09,08,07,06,05,04,03,02,01,-07";
const GOOD_2: &str = "S,9902,123,5,00,00,00,00,00,00,00,00,00,10,-10";

fn encoded(def: &FormDefinition) -> Vec<String> {
    def.commands().iter().map(|c| c.encode()).collect()
}

#[test]
fn test_upload_sends_reset_then_definition() {
    let layout = RatingSheet::student().layout().expect("layout");
    let n = layout.definition.len();
    let mut ch = MemoryChannel::new();
    ch.push_acks(n + 1);
    let mut session = Session::new(ch);
    session.upload(&layout.definition).expect("upload");
    let sent = session.channel().sent_commands();
    assert_eq!(sent.len(), n + 1);
    assert_eq!(sent[0], "SRST");
    assert_eq!(&sent[1..], encoded(&layout.definition).as_slice());
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_upload_stops_at_first_rejection() {
    let layout = RatingSheet::instructor().layout().expect("layout");
    let n = layout.definition.len();
    let all = encoded(&layout.definition);
    for k in 1..=n {
        let mut ch = MemoryChannel::new();
        ch.push_acks(k);
        ch.push_rejection();
        ch.push_acks(n - k);
        let mut session = Session::new(ch);
        match session.upload(&layout.definition) {
            Err(ScanError::ProtocolRejected { command_index, command }) => {
                assert_eq!(command_index, k);
                assert_eq!(command, all[k - 1]);
            }
            other => panic!("k={}: expected rejection, got {:?}", k, other),
        }
        let sent = session.channel().sent_commands();
        assert_eq!(sent.len(), k + 1, "k={}", k);
        assert_eq!(&sent[1..], &all[..k]);
        assert_eq!(session.state(), SessionState::Faulted);
    }
}

#[test]
fn test_rejected_reset_aborts_upload() {
    let layout = RatingSheet::instructor().layout().expect("layout");
    let mut ch = MemoryChannel::new();
    ch.push_rejection();
    let mut session = Session::new(ch);
    let r = session.upload(&layout.definition);
    assert!(matches!(r, Err(ScanError::ProtocolRejected { command_index: 0, .. })));
    assert_eq!(session.channel().sent_frames().len(), 1);
}

#[test]
fn test_upload_can_rerun_after_fault() {
    let layout = RatingSheet::instructor().layout().expect("layout");
    let n = layout.definition.len();
    let mut ch = MemoryChannel::new();
    ch.push_acks(3);
    ch.push_rejection();
    ch.push_acks(n + 1);
    let mut session = Session::new(ch);
    assert!(session.upload(&layout.definition).is_err());
    session.upload(&layout.definition).expect("second upload");
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_upload_after_read_timeout_ignores_late_record_tail() {
    let def = FormDefinition::parse("FRM=FS 3 0 48 N N N\nFRM=IN 1 I\nFRM=LS").expect("definition");
    let mut ch = MemoryChannel::new();
    ch.push_inbound(b"S,34");
    let mut session = Session::new(ch);
    assert!(matches!(session.read_next(), Err(ScanError::ChannelTimeout(_))));
    assert_eq!(session.state(), SessionState::Faulted);

    // The rest of the record shows up after the read gave up.
    session.channel_mut().push_inbound(b"01,567\r");
    session.channel_mut().push_acks(2);
    session.channel_mut().push_rejection();
    match session.upload(&def) {
        Err(ScanError::ProtocolRejected { command_index, command }) => {
            assert_eq!(command_index, 2);
            assert_eq!(command, "FRM=IN 1 I");
        }
        other => panic!("expected rejection of the fixed value, got {:?}", other),
    }
    assert_eq!(
        session.channel().sent_commands(),
        vec!["READ 0 Y", "SRST", "FRM=FS 3 0 48 N N N", "FRM=IN 1 I"]
    );
    assert_eq!(session.state(), SessionState::Faulted);
}

#[test]
fn test_end_of_batch_leaves_following_record() {
    let mut ch = MemoryChannel::new();
    ch.push_inbound(format!("!\r{}\r", GOOD).as_bytes());
    let mut session = Session::new(ch);
    assert_eq!(session.read_next().expect("read"), ReadOutcome::EndOfBatch);
    assert_eq!(session.channel().pending_inbound(), GOOD.len() + 1);
    assert_eq!(session.read_next().expect("read"), ReadOutcome::Record(GOOD.to_string()));
}

#[test]
fn test_batch_with_corrections_and_auto_fill() {
    let layout = RatingSheet::student().layout().expect("layout");
    let validator = RecordValidator::new(layout.policy).expect("validator");
    let mut ch = MemoryChannel::new();
    ch.push_payload(GOOD);
    ch.push_payload("S,3401,567,2,10,??,08,07,06,05,04,03,02,01,-07");
    ch.push_payload("S,3401,567,2,10,09,08,07,06,05,04,03,02,01,-07");
    ch.push_payload("S,0000,567,2,10,09,08,07,06,05,04,03,02,01,-07");
    ch.push_payload("S,9902,123,5,00,00,00,  ,00,00,00,00,00,10,-10");
    ch.push_payload("S,9902,123,5,00,00,00,00,00,00,00,00,00,10,   ");
    ch.push_payload("!");
    let mut session = Session::new(ch);

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scandata");
    let mut sink = FileSink::open(&path).expect("sink");
    let mut faults = Vec::new();
    let mut corrector = |f: &RecordFault, _: &ScanRecord| -> io::Result<()> {
        faults.push(f.clone());
        Ok(())
    };
    let summary = BatchReader::new(&mut session, &validator)
        .run(&mut sink, &mut corrector)
        .expect("batch");

    assert_eq!(summary.accepted, 3);
    assert_eq!(summary.corrections, 3);
    assert_eq!(summary.auto_filled, 1);
    assert_eq!(
        faults,
        vec![
            RecordFault::Unreadable { fields: vec![5] },
            RecordFault::BadIdentifier {
                field: 1,
                value: "0000".to_string()
            },
            RecordFault::Incomplete { field: 7 },
        ]
    );
    let data = std::fs::read_to_string(&path).expect("read back");
    assert_eq!(
        data,
        format!(
            "{}\r\n{}\r\n{}\r\n",
            GOOD,
            GOOD,
            "S,9902,123,5,00,00,00,00,00,00,00,00,00,10,000"
        )
    );
    assert!(session.channel().sent_commands().iter().all(|c| c == "READ 0 Y"));
}

#[test]
fn test_unreadable_below_threshold_is_sanitized_in_batch() {
    let policy = ValidationPolicy {
        max_unreadable: 2,
        ..RatingSheet::student().policy()
    };
    let validator = RecordValidator::new(policy).expect("validator");
    let mut ch = MemoryChannel::new();
    ch.push_payload("S,3401,???,2,10,09,08,07,06,05,04,03,02,01,-07");
    ch.push_payload("!");
    let mut session = Session::new(ch);
    let mut sink: Vec<String> = Vec::new();
    let mut corrector = |_: &RecordFault, _: &ScanRecord| -> io::Result<()> { panic!("no correction expected") };
    let summary = BatchReader::new(&mut session, &validator)
        .run(&mut sink, &mut corrector)
        .expect("batch");
    assert_eq!(summary.sanitized, 1);
    assert_eq!(sink, vec!["S,3401,   ,2,10,09,08,07,06,05,04,03,02,01,-07".to_string()]);
}

#[test]
fn test_batch_stops_on_read_timeout() {
    let validator = RecordValidator::new(RatingSheet::student().policy()).expect("validator");
    let mut ch = MemoryChannel::new();
    ch.push_payload(GOOD);
    let mut session = Session::new(ch);
    let mut sink: Vec<String> = Vec::new();
    let mut corrector = |_: &RecordFault, _: &ScanRecord| -> io::Result<()> { Ok(()) };
    let r = BatchReader::new(&mut session, &validator).run(&mut sink, &mut corrector);
    assert!(matches!(r, Err(ScanError::ChannelTimeout(_))));
    assert_eq!(sink.len(), 1);
    assert_eq!(session.state(), SessionState::Faulted);
}

#[test]
fn test_shared_session_serializes_readers() {
    let mut ch = MemoryChannel::new();
    let records: Vec<String> = (1..=40).map(|i| format!("S,34{:02},567", i % 9 + 1)).collect();
    for r in &records {
        ch.push_payload(r);
    }
    let shared = SharedSession::new(Session::new(ch));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let s = shared.clone();
            thread::spawn(move || {
                (0..10)
                    .map(|_| match s.read_next().expect("read") {
                        ReadOutcome::Record(r) => r,
                        ReadOutcome::EndOfBatch => panic!("unexpected end of batch"),
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let mut got: Vec<String> = handles.into_iter().flat_map(|h| h.join().expect("join")).collect();
    let mut want = records.clone();
    got.sort();
    want.sort();
    assert_eq!(got, want);
    assert_eq!(shared.lock().channel().sent_frames().len(), 40);
}

/// Simulated scanner behind real `Read`/`Write` halves: acknowledges every
/// configuration command and answers reads from a queue, then `!`.
struct SimWriter {
    replies: mpsc::Sender<Vec<u8>>,
    pending: Vec<u8>,
    sheets: VecDeque<String>,
}

impl Write for SimWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(end) = self.pending.iter().position(|&b| b == CR) {
            let frame: Vec<u8> = self.pending.drain(..=end).collect();
            let text = &frame[1..frame.len() - 1];
            let mut reply = if text == b"READ 0 Y" {
                self.sheets.pop_front().unwrap_or_else(|| "!".to_string()).into_bytes()
            } else {
                Vec::new()
            };
            reply.push(CR);
            let _ = self.replies.send(reply);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct SimReader {
    replies: mpsc::Receiver<Vec<u8>>,
    buf: VecDeque<u8>,
}

impl Read for SimReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.buf.is_empty() {
            match self.replies.recv() {
                Ok(bytes) => self.buf.extend(bytes),
                Err(_) => return Ok(0),
            }
        }
        let n = out.len().min(self.buf.len());
        for (slot, b) in out.iter_mut().zip(self.buf.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}

#[test]
fn test_stream_channel_against_simulated_scanner() {
    let (tx, rx) = mpsc::channel();
    let writer = SimWriter {
        replies: tx,
        pending: Vec::new(),
        sheets: VecDeque::from(vec![GOOD.to_string(), GOOD_2.to_string()]),
    };
    let reader = SimReader {
        replies: rx,
        buf: VecDeque::new(),
    };
    let channel = StreamChannel::new(reader, writer).expect("channel");
    let mut session = Session::new(channel);

    let layout = RatingSheet::student().layout().expect("layout");
    session.upload(&layout.definition).expect("upload");
    session.set_threshold(50, 40).expect("threshold");

    let validator = RecordValidator::new(layout.policy).expect("validator");
    let mut sink: Vec<String> = Vec::new();
    let mut corrector = |_: &RecordFault, _: &ScanRecord| -> io::Result<()> { Ok(()) };
    let summary = BatchReader::new(&mut session, &validator)
        .run(&mut sink, &mut corrector)
        .expect("batch");
    assert_eq!(summary.accepted, 2);
    assert_eq!(sink, vec![GOOD.to_string(), GOOD_2.to_string()]);
}
