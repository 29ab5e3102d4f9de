//! Pending Request Bookkeeping
//!
//! A pending request is one transaction issued by the local side. It moves from
//! the channel's queue to the in-flight slot and, once answered, to the processed
//! set, where it stays while its handler still expects continuation responses.

use crate::constants::ctype;
use crate::AvctpError;
use alloc::boxed::Box;
use alloc::vec::Vec;

/// Response to a control channel request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlResponse<'a> {
    /// AV/C response code
    pub code: u8,
    /// Subunit type of the response
    pub subunit: u8,
    /// Response operands (empty on failure)
    pub operands: &'a [u8],
}

/// Handler for control channel responses.
///
/// Returns `true` while more responses are expected for the same transaction.
/// On timeout or teardown it is called once with `REJECTED` and no operands.
pub type ControlResponseHandler = Box<dyn FnMut(&ControlResponse<'_>) -> bool>;

/// Handler for browsing channel responses.
///
/// Receives `None` on timeout or teardown. Returns `true` while more responses
/// are expected for the same transaction.
pub type BrowsingResponseHandler = Box<dyn FnMut(Option<&[u8]>) -> bool>;

/// Lifecycle of a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PendingState {
    /// Waiting in the channel queue
    Queued,
    /// Sent, owns the channel's response timeout
    InFlight,
    /// Answered at least once, still listening for continuations
    Processed,
}

/// What happens when a control response arrives
pub(crate) enum ControlCompletion {
    /// Nobody is interested in the response
    Ignore,
    /// Passthrough press issued by the session's key state machine
    Passthrough,
    /// Caller supplied handler
    Handler(ControlResponseHandler),
}

/// Request payload, one variant per channel kind
pub(crate) enum RequestPayload {
    Control {
        code: u8,
        subunit: u8,
        opcode: u8,
        operands: Vec<u8>,
        completion: ControlCompletion,
    },
    Browsing {
        operands: Vec<u8>,
        handler: Option<BrowsingResponseHandler>,
    },
}

/// Outcome of delivering a response to a pending request
pub(crate) enum Delivery {
    /// Keep the request in the processed set
    KeepListening,
    /// The request is finished
    Done,
    /// A passthrough press was answered; the session must update its key state
    Passthrough { code: u8, op: Option<u8> },
}

/// Pending request
pub(crate) struct PendingRequest {
    /// Transaction label
    pub transaction: u8,
    /// Lifecycle state
    pub state: PendingState,
    /// Response deadline in milliseconds, present only while in flight
    pub timeout: Option<u64>,
    /// Failure recorded before destruction
    pub error: Option<AvctpError>,
    /// What to send and who to tell
    pub payload: RequestPayload,
}

impl PendingRequest {
    /// Create new queued request
    pub fn new(transaction: u8, payload: RequestPayload) -> Self {
        Self {
            transaction,
            state: PendingState::Queued,
            timeout: None,
            error: None,
            payload,
        }
    }

    /// Mark request as sent with a response deadline
    pub fn start(&mut self, deadline: u64) {
        self.state = PendingState::InFlight;
        self.timeout = Some(deadline);
    }

    /// Mark request as answered and cancel its timeout
    pub fn answered(&mut self) {
        self.state = PendingState::Processed;
        self.timeout = None;
    }

    /// Mark request as failed
    pub fn fail(&mut self, error: AvctpError) {
        self.timeout = None;
        self.error = Some(error);
    }

    /// Deliver a control channel response
    pub fn deliver_control(&mut self, code: u8, subunit: u8, operands: &[u8]) -> Delivery {
        match &mut self.payload {
            RequestPayload::Control { completion, .. } => match completion {
                ControlCompletion::Ignore => Delivery::Done,
                ControlCompletion::Passthrough => Delivery::Passthrough {
                    code,
                    op: operands.first().copied(),
                },
                ControlCompletion::Handler(handler) => {
                    let response = ControlResponse {
                        code,
                        subunit,
                        operands,
                    };
                    if handler(&response) {
                        Delivery::KeepListening
                    } else {
                        Delivery::Done
                    }
                }
            },
            RequestPayload::Browsing { .. } => Delivery::Done,
        }
    }

    /// Deliver a browsing channel response
    pub fn deliver_browsing(&mut self, operands: &[u8]) -> Delivery {
        match &mut self.payload {
            RequestPayload::Browsing {
                handler: Some(handler),
                ..
            } => {
                if handler(Some(operands)) {
                    Delivery::KeepListening
                } else {
                    Delivery::Done
                }
            }
            _ => Delivery::Done,
        }
    }

    /// Destroy the request, reporting the failure outcome if an error was recorded
    pub fn destroy(mut self) {
        let Some(error) = self.error else {
            return;
        };

        debug!(
            "[AVCTP] transaction {} failed: {:?}",
            self.transaction,
            error
        );

        match &mut self.payload {
            RequestPayload::Control {
                subunit,
                completion: ControlCompletion::Handler(handler),
                ..
            } => {
                let response = ControlResponse {
                    code: ctype::REJECTED,
                    subunit: *subunit,
                    operands: &[],
                };
                handler(&response);
            }
            RequestPayload::Browsing {
                handler: Some(handler),
                ..
            } => {
                handler(None);
            }
            _ => {}
        }
    }
}
