//! AVCTP Channel Management
//!
//! A channel wraps one connected L2CAP transport (control or browsing). It owns
//! the frame buffer, the transaction label counter, the FIFO of queued requests,
//! the single in-flight request and the set of answered requests that are still
//! listening for continuation responses.

use crate::constants::{CONTROL_HEADER_LENGTH, DEFAULT_MTU, REQUEST_TIMEOUT_MS, TRANSACTION_LABELS};
use crate::handler::{BrowsingRegistration, PduRegistration};
use crate::packet::{self, AvcHeader, AvctpHeader, MessageType};
use crate::pending::{Delivery, PendingRequest, PendingState, RequestPayload};
use crate::AvctpError;
use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;
use embedded_io::{Error as _, Read, Write};
use heapless::FnvIndexMap;

/// Capacity of the processed set, one slot per transaction label
const MAX_PROCESSED: usize = TRANSACTION_LABELS as usize;

/// AVCTP channel kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelKind {
    /// Control channel (AV/C commands)
    Control,
    /// Browsing channel (AVRCP browsing PDUs)
    Browsing,
}

/// Channel configuration negotiated during L2CAP setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelConfig {
    /// Largest frame the peer may send to us
    pub imtu: u16,
    /// Largest frame we may send to the peer
    pub omtu: u16,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            imtu: DEFAULT_MTU,
            omtu: DEFAULT_MTU,
        }
    }
}

impl ChannelConfig {
    /// Size of the shared receive/transmit buffer
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        usize::from(core::cmp::max(self.imtu, self.omtu))
    }
}

/// Answer to a passthrough press issued by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PassthroughAck {
    pub code: u8,
    pub op: Option<u8>,
}

/// AVCTP channel
pub(crate) struct Channel<T> {
    kind: ChannelKind,
    transport: T,
    config: ChannelConfig,
    /// Single buffer shared by receive, reply and send
    pub buffer: Vec<u8>,
    /// Next candidate transaction label
    transaction: u8,
    queue: VecDeque<PendingRequest>,
    pending: Option<PendingRequest>,
    processed: FnvIndexMap<u8, PendingRequest, MAX_PROCESSED>,
    process_scheduled: bool,
    broken: bool,
    /// Opcode handlers (control channel)
    pub pdu_handlers: Vec<PduRegistration>,
    /// PDU handler (browsing channel)
    pub browsing_handler: Option<BrowsingRegistration>,
}

impl<T: Read + Write> Channel<T> {
    /// Create a channel over an already connected transport
    pub fn new(kind: ChannelKind, transport: T, config: ChannelConfig) -> Self {
        Self {
            kind,
            transport,
            config,
            buffer: vec![0; config.buffer_size()],
            transaction: 0,
            queue: VecDeque::new(),
            pending: None,
            processed: FnvIndexMap::new(),
            process_scheduled: false,
            broken: false,
            pdu_handlers: Vec::new(),
            browsing_handler: None,
        }
    }

    /// Negotiated configuration
    pub const fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Whether a transport write failed and the channel must be torn down
    pub const fn is_broken(&self) -> bool {
        self.broken
    }

    /// Whether a deferred queue tick is outstanding
    pub const fn process_scheduled(&self) -> bool {
        self.process_scheduled
    }

    /// Whether a request is waiting for its response
    #[cfg(test)]
    pub fn in_flight(&self) -> Option<u8> {
        self.pending.as_ref().map(|request| request.transaction)
    }

    /// Number of requests waiting in the queue
    #[cfg(test)]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn label_in_use(&self, label: u8) -> bool {
        self.processed.contains_key(&label)
            || self.pending.as_ref().is_some_and(|p| p.transaction == label)
            || self.queue.iter().any(|p| p.transaction == label)
    }

    /// Allocate the next transaction label not used by a live request
    pub fn allocate_transaction(&mut self) -> u8 {
        for _ in 0..TRANSACTION_LABELS {
            if !self.label_in_use(self.transaction) {
                break;
            }
            self.transaction = (self.transaction + 1) % TRANSACTION_LABELS;
        }

        let transaction = self.transaction;
        self.transaction = (transaction + 1) % TRANSACTION_LABELS;
        transaction
    }

    /// Queue a request and schedule a queue tick. Returns its transaction label.
    pub fn enqueue(&mut self, payload: RequestPayload) -> u8 {
        let transaction = self.allocate_transaction();
        self.queue.push_back(PendingRequest::new(transaction, payload));
        self.process_scheduled = true;
        transaction
    }

    /// Check that a frame carrying `operands` bytes fits the output MTU
    ///
    /// # Errors
    /// `Overflow` if it does not.
    pub fn check_length(&self, with_avc: bool, operands: usize) -> Result<(), AvctpError> {
        if packet::header_length(with_avc) + operands > usize::from(self.config.omtu) {
            return Err(AvctpError::Overflow);
        }
        Ok(())
    }

    /// Send one frame with a single transport write.
    ///
    /// # Errors
    /// `Overflow` if the frame exceeds the output MTU; transport failures mark
    /// the channel broken.
    pub fn send(
        &mut self,
        transaction: u8,
        message_type: MessageType,
        avc: Option<&AvcHeader>,
        operands: &[u8],
    ) -> Result<(), AvctpError> {
        self.check_length(avc.is_some(), operands.len())?;

        let avctp = AvctpHeader::new(transaction, message_type);
        let length = packet::encode_frame(&mut self.buffer, &avctp, avc, operands)?;

        self.write_frame(length)
    }

    /// Write the first `length` bytes of the buffer
    ///
    /// # Errors
    /// Any transport error or short write; both mark the channel broken.
    pub fn write_frame(&mut self, length: usize) -> Result<(), AvctpError> {
        match self.transport.write(&self.buffer[..length]) {
            Ok(written) if written == length => Ok(()),
            Ok(written) => {
                error!(
                    "[AVCTP] {:?}: short write {} of {}",
                    self.kind,
                    written,
                    length
                );
                self.broken = true;
                Err(AvctpError::PartialWrite)
            }
            Err(e) => {
                error!("[AVCTP] {:?}: write failed", self.kind);
                self.broken = true;
                Err(AvctpError::Transport(e.kind()))
            }
        }
    }

    /// Read one frame into the buffer and return its length
    ///
    /// # Errors
    /// `Disconnected` on end of stream, `Transport` on read failure.
    pub fn receive(&mut self) -> Result<usize, AvctpError> {
        let limit = core::cmp::min(usize::from(self.config.imtu), self.buffer.len());
        match self.transport.read(&mut self.buffer[..limit]) {
            Ok(0) => Err(AvctpError::Disconnected),
            Ok(length) => Ok(length),
            Err(e) => Err(AvctpError::Transport(e.kind())),
        }
    }

    fn send_request(&mut self, request: &PendingRequest) -> Result<(), AvctpError> {
        match &request.payload {
            RequestPayload::Control {
                code,
                subunit,
                opcode,
                operands,
                ..
            } => {
                let avc = AvcHeader::new(*code, *subunit, *opcode);
                self.send(request.transaction, MessageType::Command, Some(&avc), operands)
            }
            RequestPayload::Browsing { operands, .. } => {
                self.send(request.transaction, MessageType::Command, None, operands)
            }
        }
    }

    /// Queue tick: send the next request unless one is already in flight.
    ///
    /// Requests whose send fails are destroyed with their failure outcome and the
    /// next one is tried. The first request sent gets a response deadline.
    pub fn process_queue(&mut self, now: u64) {
        self.process_scheduled = false;

        if self.pending.is_some() || self.broken {
            return;
        }

        while let Some(mut request) = self.queue.pop_front() {
            match self.send_request(&request) {
                Ok(()) => {
                    trace!(
                        "[AVCTP] {:?}: transaction {} in flight",
                        self.kind,
                        request.transaction
                    );
                    request.start(now + REQUEST_TIMEOUT_MS);
                    self.pending = Some(request);
                    return;
                }
                Err(e) => {
                    warn!(
                        "[AVCTP] {:?}: transaction {} not sent: {:?}",
                        self.kind,
                        request.transaction,
                        e
                    );
                    request.fail(e);
                    request.destroy();
                    if self.broken {
                        return;
                    }
                }
            }
        }
    }

    /// Response deadline of the in-flight request
    pub fn next_deadline(&self) -> Option<(u64, u8)> {
        let request = self.pending.as_ref()?;
        request.timeout.map(|deadline| (deadline, request.transaction))
    }

    /// Fail the in-flight request if it is still `transaction` and its
    /// deadline has passed at `now`.
    ///
    /// Returns `false` for stale timeouts, including ones armed for an earlier
    /// request that used the same label.
    pub fn expire(&mut self, transaction: u8, now: u64) -> bool {
        let Some(mut request) = self.pending.take_if(|p| {
            p.transaction == transaction
                && p.state == PendingState::InFlight
                && p.timeout.is_some_and(|deadline| deadline <= now)
        }) else {
            return false;
        };

        debug!(
            "[AVCTP] {:?}: transaction {} timed out",
            self.kind,
            transaction
        );

        request.fail(AvctpError::Timeout);
        request.destroy();
        self.process_scheduled = true;
        true
    }

    /// Move the in-flight request to the processed set if `transaction` answers it
    fn settle_in_flight(&mut self, transaction: u8) {
        let Some(mut request) = self
            .pending
            .take_if(|p| p.transaction == transaction && p.state == PendingState::InFlight)
        else {
            return;
        };

        request.answered();
        self.process_scheduled = true;

        match self.processed.insert(transaction, request) {
            Ok(Some(stale)) => stale.destroy(),
            Ok(None) => {}
            Err((_, request)) => request.destroy(),
        }
    }

    fn finish(&mut self, transaction: u8) {
        if let Some(request) = self.processed.remove(&transaction) {
            request.destroy();
        }
    }

    /// Route a control response frame of `length` bytes to its request
    pub fn correlate_control(
        &mut self,
        transaction: u8,
        avc: &AvcHeader,
        length: usize,
    ) -> Option<PassthroughAck> {
        self.settle_in_flight(transaction);

        let Some(request) = self.processed.get_mut(&transaction) else {
            debug!(
                "[AVCTP] control: dropping unmatched response {}",
                transaction
            );
            return None;
        };

        let operands = &self.buffer[CONTROL_HEADER_LENGTH..length];
        match request.deliver_control(avc.code, avc.subunit_type, operands) {
            Delivery::KeepListening => None,
            Delivery::Done => {
                self.finish(transaction);
                None
            }
            Delivery::Passthrough { code, op } => {
                self.finish(transaction);
                Some(PassthroughAck { code, op })
            }
        }
    }

    /// Route a browsing response frame of `length` bytes to its request
    pub fn correlate_browsing(&mut self, transaction: u8, length: usize) {
        self.settle_in_flight(transaction);

        let Some(request) = self.processed.get_mut(&transaction) else {
            debug!(
                "[AVCTP] browsing: dropping unmatched response {}",
                transaction
            );
            return;
        };

        let operands = &self.buffer[AvctpHeader::SIZE..length];
        if let Delivery::KeepListening = request.deliver_browsing(operands) {
            return;
        }
        self.finish(transaction);
    }

    /// Tear the channel down, failing every queued, in-flight and processed request
    pub fn close(mut self) {
        debug!("[AVCTP] {:?}: closing channel", self.kind);

        if let Some(mut request) = self.pending.take() {
            request.fail(AvctpError::Disconnected);
            request.destroy();
        }

        while let Some(mut request) = self.queue.pop_front() {
            request.fail(AvctpError::Disconnected);
            request.destroy();
        }

        let labels: heapless::Vec<u8, MAX_PROCESSED> = self.processed.keys().copied().collect();
        for label in labels {
            if let Some(mut request) = self.processed.remove(&label) {
                request.fail(AvctpError::Disconnected);
                request.destroy();
            }
        }
    }
}
