//! Handler Registrations
//!
//! Profile layers plug into the engine by registering handlers: one per AV/C
//! opcode on the control channel, a single PDU handler on the browsing channel and
//! a single passthrough-command handler per session. Every registration yields an
//! opaque [`HandlerId`] used to unregister it later.

use alloc::boxed::Box;
use core::num::NonZeroU32;

/// Opaque identifier of a handler registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandlerId(NonZeroU32);

impl HandlerId {
    /// Raw non-zero value of the identifier
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

/// Inbound control command handed to an opcode handler.
///
/// The handler may rewrite `code` and `subunit` to shape the AV/C response header
/// and may overwrite `operands`, which spans the rest of the channel buffer. The
/// first `operand_count` bytes hold the command operands.
#[derive(Debug)]
pub struct ControlPdu<'a> {
    /// Transaction label of the command
    pub transaction: u8,
    /// Command type on entry, response code on exit
    pub code: u8,
    /// Subunit type on entry, response subunit type on exit
    pub subunit: u8,
    /// Operand buffer, reused for the response operands
    pub operands: &'a mut [u8],
    /// Number of command operands
    pub operand_count: usize,
}

/// Inbound browsing command handed to the browsing PDU handler
#[derive(Debug)]
pub struct BrowsingPdu<'a> {
    /// Transaction label of the command
    pub transaction: u8,
    /// Operand buffer, reused for the response operands
    pub operands: &'a mut [u8],
    /// Number of command operands
    pub operand_count: usize,
}

/// Control opcode handler. Returns the number of response operand bytes.
pub type ControlPduHandler = Box<dyn FnMut(&mut ControlPdu<'_>) -> usize>;

/// Browsing PDU handler. Returns the number of response operand bytes.
pub type BrowsingPduHandler = Box<dyn FnMut(&mut BrowsingPdu<'_>) -> usize>;

/// Passthrough command handler, called with the raw key code and the pressed
/// state. Returns `true` if it consumed the key.
pub type PassthroughHandler = Box<dyn FnMut(u8, bool) -> bool>;

/// Handler bound to a control channel opcode
pub(crate) enum ControlHandler {
    /// Built-in PASS THROUGH handler
    Passthrough,
    /// Built-in UNIT INFO handler
    UnitInfo,
    /// Built-in SUBUNIT INFO handler
    SubunitInfo,
    /// Handler registered by a profile
    Custom(ControlPduHandler),
}

/// Control channel opcode registration
pub(crate) struct PduRegistration {
    pub id: HandlerId,
    pub opcode: u8,
    pub handler: ControlHandler,
}

/// Browsing channel registration
pub(crate) struct BrowsingRegistration {
    pub id: HandlerId,
    pub handler: BrowsingPduHandler,
}

/// Passthrough handler registration
pub(crate) struct PassthroughRegistration {
    pub id: HandlerId,
    pub handler: PassthroughHandler,
}

/// Per-session source of handler identifiers
#[derive(Debug, Default)]
pub(crate) struct HandlerIds {
    last: u32,
}

impl HandlerIds {
    /// Allocate the next identifier, skipping zero on wrap-around
    pub fn allocate(&mut self) -> HandlerId {
        self.last = self.last.wrapping_add(1);
        if self.last == 0 {
            self.last = 1;
        }
        // `last` is never zero here
        HandlerId(NonZeroU32::new(self.last).unwrap_or(NonZeroU32::MIN))
    }
}
