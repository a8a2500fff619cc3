//! Byte channels the session talks through.
//!
//! The session needs two things from a channel: write a whole frame, and hand back
//! the next inbound byte or give up after a timeout. [`StreamChannel`] adapts any
//! blocking `Read`/`Write` pair (a tty, a socket) by moving reads onto a dedicated
//! thread; [`MemoryChannel`] is a scripted in-process scanner for tests and dry runs.

use log::debug;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Frame-level transport to the scanner.
pub trait Channel {
    /// Write one complete frame.
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Next inbound byte. Fails with `TimedOut` when nothing arrives within `timeout`,
    /// and with `UnexpectedEof` or `ConnectionAborted` once the channel is closed.
    fn recv_byte(&mut self, timeout: Duration) -> io::Result<u8>;

    /// Drop everything already received but not yet read. Returns the number of
    /// bytes dropped.
    fn discard_input(&mut self) -> usize;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        (**self).send(frame)
    }

    fn recv_byte(&mut self, timeout: Duration) -> io::Result<u8> {
        (**self).recv_byte(timeout)
    }

    fn discard_input(&mut self) -> usize {
        (**self).discard_input()
    }
}

const READ_CHUNK: usize = 64;

enum Inbound {
    Byte(u8),
    Failed(io::Error),
    /// Cancellation aimed at the exchange with this epoch.
    Cancel(u64),
}

/// Channel over a blocking reader and writer.
///
/// A background thread owns the reader and forwards bytes; the thread exits on
/// EOF, on a read error, or once the channel is dropped and the next byte arrives.
pub struct StreamChannel<W: Write> {
    writer: W,
    inbound: Receiver<Inbound>,
    cancel: Sender<Inbound>,
    /// Bumped on every send; a cancel only hits the exchange it was issued in.
    epoch: Arc<AtomicU64>,
    /// Reader failure seen while discarding; reported by every later read.
    closed: Option<(io::ErrorKind, String)>,
}

impl<W: Write> StreamChannel<W> {
    pub fn new<R: Read + Send + 'static>(reader: R, writer: W) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let cancel = tx.clone();
        thread::Builder::new()
            .name("omrscan-reader".to_string())
            .spawn(move || pump(reader, tx))?;
        Ok(StreamChannel {
            writer,
            inbound: rx,
            cancel,
            epoch: Arc::new(AtomicU64::new(0)),
            closed: None,
        })
    }

    /// Handle that unblocks a pending read from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel.clone(),
            epoch: Arc::clone(&self.epoch),
        }
    }
}

fn pump<R: Read>(mut reader: R, tx: Sender<Inbound>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                let _ = tx.send(Inbound::Failed(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "scanner channel closed",
                )));
                return;
            }
            Ok(n) => {
                for &b in &buf[..n] {
                    if tx.send(Inbound::Byte(b)).is_err() {
                        return;
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("event=reader_exit error={}", e);
                let _ = tx.send(Inbound::Failed(e));
                return;
            }
        }
    }
}

impl<W: Write> Channel for StreamChannel<W> {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.writer.write_all(frame)?;
        self.writer.flush()
    }

    fn recv_byte(&mut self, timeout: Duration) -> io::Result<u8> {
        if let Some((kind, msg)) = &self.closed {
            return Err(io::Error::new(*kind, msg.clone()));
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.inbound.recv_timeout(remaining) {
                Ok(Inbound::Byte(b)) => return Ok(b),
                Ok(Inbound::Failed(e)) => return Err(e),
                Ok(Inbound::Cancel(epoch)) if epoch == self.epoch.load(Ordering::SeqCst) => {
                    return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "read cancelled"));
                }
                Ok(Inbound::Cancel(epoch)) => debug!("event=stale_cancel_ignored epoch={}", epoch),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "no byte from scanner"));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "scanner reader stopped"));
                }
            }
        }
    }

    fn discard_input(&mut self) -> usize {
        let mut dropped = 0;
        loop {
            match self.inbound.try_recv() {
                Ok(Inbound::Byte(_)) => dropped += 1,
                Ok(Inbound::Failed(e)) => {
                    if self.closed.is_none() {
                        self.closed = Some((e.kind(), e.to_string()));
                    }
                }
                Ok(Inbound::Cancel(_)) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return dropped,
            }
        }
    }
}

/// Cancels reads on a [`StreamChannel`].
#[derive(Clone)]
pub struct CancelHandle {
    tx: Sender<Inbound>,
    epoch: Arc<AtomicU64>,
}

impl CancelHandle {
    /// The pending read of the current exchange fails with `ConnectionAborted`.
    /// Once the next command is sent, the cancellation no longer applies.
    pub fn cancel(&self) {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let _ = self.tx.send(Inbound::Cancel(epoch));
    }
}

/// In-memory channel: records outbound frames and plays back a scripted scanner.
///
/// Scripted replies (`push_acks`, `push_rejection`, `push_payload`) are released one
/// per sent frame, the way a scanner answers a command. `push_inbound` puts bytes
/// on the line immediately, e.g. a late tail of an earlier response. Nothing on
/// the line behaves like a silent scanner and times out at once.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    inbound: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    closed: bool,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes already on the line, readable without sending anything.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    /// Script `n` acknowledgements.
    pub fn push_acks(&mut self, n: usize) {
        for _ in 0..n {
            self.replies.push_back(vec![crate::codec::CR]);
        }
    }

    pub fn push_rejection(&mut self) {
        self.replies.push_back(vec![crate::codec::BEL, crate::codec::CR]);
    }

    /// Script a text reply followed by its terminator.
    pub fn push_payload(&mut self, text: &str) {
        let mut reply = text.as_bytes().to_vec();
        reply.push(crate::codec::CR);
        self.replies.push_back(reply);
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Bytes on the line and not yet read.
    pub fn pending_inbound(&self) -> usize {
        self.inbound.len()
    }

    /// Scripted replies not yet released.
    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    /// Raw frames written so far.
    pub fn sent_frames(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// Written frames with `ESC`/`CR` framing removed.
    pub fn sent_commands(&self) -> Vec<String> {
        self.sent
            .iter()
            .map(|f| {
                let body = f.strip_prefix(&[crate::codec::ESC]).unwrap_or(f.as_slice());
                let body = body.strip_suffix(&[crate::codec::CR]).unwrap_or(body);
                String::from_utf8_lossy(body).into_owned()
            })
            .collect()
    }
}

impl Channel for MemoryChannel {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "memory channel closed"));
        }
        self.sent.push(frame.to_vec());
        if let Some(reply) = self.replies.pop_front() {
            self.inbound.extend(reply);
        }
        Ok(())
    }

    fn recv_byte(&mut self, _timeout: Duration) -> io::Result<u8> {
        if let Some(b) = self.inbound.pop_front() {
            return Ok(b);
        }
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "memory channel closed"));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "memory channel empty"))
    }

    fn discard_input(&mut self) -> usize {
        let dropped = self.inbound.len();
        self.inbound.clear();
        dropped
    }
}
