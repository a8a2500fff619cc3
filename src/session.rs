//! Device session: strict request/response exchange with one scanner.
//!
//! The session owns its channel. Each operation sends a single command and frames
//! the reply before anything else is written; the scanner protocol has no request
//! ids, so there is never more than one command in flight.

use crate::channel::Channel;
use crate::codec::{channel_error, read_response, Command, Response};
use crate::error::ScanError;
use crate::form::FormDefinition;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_END_OF_BATCH: &str = "!";
pub const MAX_THRESHOLD: u8 = 99;

/// Session tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Upper bound for one complete response to arrive.
    pub response_timeout: Duration,
    /// Payload the scanner sends when the hopper is empty.
    pub end_of_batch: String,
    /// Pause between definition commands during upload (some units need it).
    pub command_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            end_of_batch: DEFAULT_END_OF_BATCH.to_string(),
            command_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingResponse,
    Faulted,
}

/// Result of one read command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Record(String),
    EndOfBatch,
}

pub struct Session<C: Channel> {
    channel: C,
    config: SessionConfig,
    state: SessionState,
}

impl<C: Channel> Session<C> {
    pub fn new(channel: C) -> Self {
        Self::with_config(channel, SessionConfig::default())
    }

    pub fn with_config(channel: C, config: SessionConfig) -> Self {
        Session {
            channel,
            config,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Send one command and frame its response. Rejection, timeout and channel
    /// loss leave the session faulted. A garbled but terminated response keeps
    /// the framing in step and leaves the session usable.
    fn exchange(&mut self, command: &Command) -> Result<Response, ScanError> {
        debug!("event=command_sent kind={} text={:?}", command.kind(), command.encode());
        self.state = SessionState::AwaitingResponse;
        if let Err(e) = self.channel.send(&command.frame()) {
            let e = channel_error(e, self.config.response_timeout);
            warn!("event=send_failed kind={} error={}", command.kind(), e);
            self.fault();
            return Err(e);
        }
        match read_response(&mut self.channel, self.config.response_timeout) {
            Ok(Response::Rejected) => {
                self.fault();
                Ok(Response::Rejected)
            }
            Ok(r) => {
                self.state = SessionState::Idle;
                Ok(r)
            }
            Err(e @ ScanError::MalformedRecord(_)) => {
                self.state = SessionState::Idle;
                Err(e)
            }
            Err(e) => {
                warn!("event=exchange_failed kind={} error={}", command.kind(), e);
                self.fault();
                Err(e)
            }
        }
    }

    /// Enter `Faulted` and drop whatever the scanner already sent for the failed
    /// exchange.
    fn fault(&mut self) {
        self.state = SessionState::Faulted;
        let dropped = self.channel.discard_input();
        if dropped > 0 {
            debug!("event=input_discarded bytes={}", dropped);
        }
    }

    /// Send a configuration command that must be acknowledged.
    fn expect_ack(&mut self, command: &Command, command_index: usize) -> Result<(), ScanError> {
        match self.exchange(command)? {
            Response::Ack => Ok(()),
            Response::Payload(text) => {
                debug!("event=ack_with_text kind={} text={:?}", command.kind(), text);
                Ok(())
            }
            Response::Rejected => Err(ScanError::ProtocolRejected {
                command_index,
                command: command.encode(),
            }),
        }
    }

    fn ensure_usable(&self, operation: &'static str) -> Result<(), ScanError> {
        if self.state == SessionState::Faulted {
            return Err(ScanError::SessionFaulted(operation));
        }
        Ok(())
    }

    /// Clear the scanner's form definition. Allowed from any state.
    ///
    /// Input that arrived after an earlier failed exchange (the late tail of a
    /// timed-out record, say) is dropped first so the reset reads its own reply.
    pub fn reset(&mut self) -> Result<(), ScanError> {
        let stale = self.channel.discard_input();
        if stale > 0 {
            warn!("event=stale_input_discarded bytes={}", stale);
        }
        self.expect_ack(&Command::Reset, 0)?;
        info!("event=scanner_reset status=ok");
        Ok(())
    }

    /// Set mark darkness and contrast, both 0-99. Out-of-range values fail
    /// before anything is sent.
    pub fn set_threshold(&mut self, darkness: u8, contrast: u8) -> Result<(), ScanError> {
        if darkness > MAX_THRESHOLD || contrast > MAX_THRESHOLD {
            return Err(ScanError::invalid(format!(
                "threshold darkness {} contrast {} must be within 0-{}",
                darkness, contrast, MAX_THRESHOLD
            )));
        }
        self.ensure_usable("set_threshold")?;
        self.expect_ack(&Command::Threshold { darkness, contrast }, 1)?;
        info!("event=threshold_set darkness={} contrast={}", darkness, contrast);
        Ok(())
    }

    /// Reset, then send every definition command, each acknowledged before the next.
    ///
    /// The first rejection aborts with `ProtocolRejected { command_index }`, where
    /// the index is 1-based into the definition (0 is the reset). The scanner is
    /// then partially programmed; upload again from scratch.
    pub fn upload(&mut self, definition: &FormDefinition) -> Result<(), ScanError> {
        self.reset()?;
        for (i, command) in definition.commands().iter().enumerate() {
            if i > 0 && !self.config.command_delay.is_zero() {
                thread::sleep(self.config.command_delay);
            }
            if let Err(e) = self.expect_ack(command, i + 1) {
                warn!("event=upload_aborted command_index={} error={}", i + 1, e);
                return Err(e);
            }
        }
        info!(
            "event=form_uploaded commands={} lines={} columns={}",
            definition.len(),
            definition.lines(),
            definition.columns()
        );
        Ok(())
    }

    /// Ask for the next sheet.
    pub fn read_next(&mut self) -> Result<ReadOutcome, ScanError> {
        self.ensure_usable("read_next")?;
        match self.exchange(&Command::Read)? {
            Response::Rejected => Err(ScanError::ProtocolRejected {
                command_index: 1,
                command: Command::Read.encode(),
            }),
            Response::Payload(text) if text == self.config.end_of_batch => {
                info!("event=end_of_batch");
                Ok(ReadOutcome::EndOfBatch)
            }
            Response::Payload(text) => Ok(ReadOutcome::Record(text)),
            Response::Ack => Ok(ReadOutcome::Record(String::new())),
        }
    }
}

/// A session shared between threads; each call holds the channel for its whole
/// exchange.
pub struct SharedSession<C: Channel> {
    inner: Arc<Mutex<Session<C>>>,
}

impl<C: Channel> Clone for SharedSession<C> {
    fn clone(&self) -> Self {
        SharedSession {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Channel> SharedSession<C> {
    pub fn new(session: Session<C>) -> Self {
        SharedSession {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Exclusive access for a multi-step operation.
    pub fn lock(&self) -> MutexGuard<'_, Session<C>> {
        // A panic mid-exchange already faulted or idled the session; keep using it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reset(&self) -> Result<(), ScanError> {
        self.lock().reset()
    }

    pub fn set_threshold(&self, darkness: u8, contrast: u8) -> Result<(), ScanError> {
        self.lock().set_threshold(darkness, contrast)
    }

    pub fn upload(&self, definition: &FormDefinition) -> Result<(), ScanError> {
        self.lock().upload(definition)
    }

    pub fn read_next(&self) -> Result<ReadOutcome, ScanError> {
        self.lock().read_next()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state()
    }
}
