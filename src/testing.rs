//! In-memory transport and input sink shared by the unit tests

use crate::AvctpError;
use crate::input::InputSink;
use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;
use embedded_io::{ErrorKind, ErrorType, Read, Write};

#[derive(Default)]
struct TransportState {
    incoming: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    write_limit: Option<usize>,
    fail_writes: bool,
}

/// Packet-bounded transport backed by shared queues. Clones share state.
#[derive(Clone, Default)]
pub struct MockTransport(Rc<RefCell<TransportState>>);

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one inbound frame
    pub fn push(&self, frame: &[u8]) {
        self.0.borrow_mut().incoming.push_back(frame.to_vec());
    }

    /// Frames written so far, one entry per write call
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.0.borrow().written.clone()
    }

    /// Accept at most `limit` bytes per write
    pub fn limit_writes(&self, limit: usize) {
        self.0.borrow_mut().write_limit = Some(limit);
    }

    /// Make every following write fail
    pub fn fail_writes(&self) {
        self.0.borrow_mut().fail_writes = true;
    }
}

impl ErrorType for MockTransport {
    type Error = ErrorKind;
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let Some(frame) = self.0.borrow_mut().incoming.pop_front() else {
            return Ok(0);
        };
        let length = frame.len().min(buf.len());
        buf[..length].copy_from_slice(&frame[..length]);
        Ok(length)
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut state = self.0.borrow_mut();
        if state.fail_writes {
            return Err(ErrorKind::BrokenPipe);
        }
        let length = state.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        state.written.push(buf[..length].to_vec());
        Ok(length)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Default)]
struct SinkState {
    device: Option<String>,
    keys: Vec<(u16, bool)>,
    closed: bool,
}

/// Input sink recording every key edge. Clones share state.
#[derive(Clone, Default)]
pub struct MockInputSink(Rc<RefCell<SinkState>>);

impl MockInputSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<(u16, bool)> {
        self.0.borrow().keys.clone()
    }

    pub fn device(&self) -> Option<String> {
        self.0.borrow().device.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.0.borrow().closed
    }
}

impl InputSink for MockInputSink {
    fn open(&mut self, device: &str) -> Result<(), AvctpError> {
        self.0.borrow_mut().device = Some(device.to_string());
        Ok(())
    }

    fn send_key(&mut self, key: u16, pressed: bool) {
        self.0.borrow_mut().keys.push((key, pressed));
    }

    fn close(&mut self) {
        self.0.borrow_mut().closed = true;
    }
}
