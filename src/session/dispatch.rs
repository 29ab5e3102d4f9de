//! Inbound frame dispatch
//!
//! Responses are correlated with pending requests by transaction label.
//! Commands are routed to the handler registered for their opcode and answered
//! in place: the reply is built in the receive buffer and written back with one
//! transport write.

use super::Session;
use super::passthrough::{self, KeyActions};
use crate::AvctpError;
use crate::constants::{CONTROL_HEADER_LENGTH, ctype, subunit};
use crate::handler::{BrowsingPdu, ControlHandler, ControlPdu};
use crate::packet::{AvcHeader, AvctpHeader, MessageType, PacketType};
use embedded_io::{Read, Write};

/// First UNIT INFO response operand
const UNIT_INFO_UNIT_TYPE: u8 = 0x07;

/// Built-in UNIT INFO handler
pub(crate) fn handle_unit_info(pdu: &mut ControlPdu<'_>) -> usize {
    if pdu.code != ctype::STATUS {
        pdu.code = ctype::REJECTED;
        return 0;
    }

    pdu.code = ctype::STABLE;
    if pdu.operand_count >= 1 {
        pdu.operands[0] = UNIT_INFO_UNIT_TYPE;
    }
    if pdu.operand_count >= 2 {
        pdu.operands[1] = subunit::PANEL << 3;
    }

    debug!("[AVCTP] reply to UNIT INFO");
    pdu.operand_count
}

/// Built-in SUBUNIT INFO handler
pub(crate) fn handle_subunit_info(pdu: &mut ControlPdu<'_>) -> usize {
    if pdu.code != ctype::STATUS {
        pdu.code = ctype::REJECTED;
        return 0;
    }

    pdu.code = ctype::STABLE;
    if pdu.operand_count >= 2 {
        pdu.operands[1] = subunit::PANEL << 3;
    }

    debug!("[AVCTP] reply to SUBUNIT INFO");
    pdu.operand_count
}

impl<T: Read + Write> Session<T> {
    /// Read and process one control channel frame.
    ///
    /// An error means the control channel is unusable and the session must shut down.
    pub(super) fn control_readable(&mut self) -> Result<(), AvctpError> {
        let Some(control) = self.control.as_mut() else {
            return Ok(());
        };

        let length = control.receive()?;
        let mut avctp = AvctpHeader::decode(&control.buffer[..length]).map_err(|_| {
            error!("[AVCTP] too small control packet ({} bytes)", length);
            AvctpError::MalformedFrame
        })?;
        if length < CONTROL_HEADER_LENGTH {
            error!("[AVCTP] too small control packet ({} bytes)", length);
            return Err(AvctpError::MalformedFrame);
        }
        let mut avc = AvcHeader::decode(&control.buffer[AvctpHeader::SIZE..length])
            .map_err(|_| AvctpError::MalformedFrame)?;

        trace!(
            "[AVCTP] control rx transaction {} {:?} opcode {:#x}",
            avctp.transaction,
            avctp.message_type,
            avc.opcode
        );

        if avctp.message_type == MessageType::Response {
            if avctp.packet_type != PacketType::Single {
                debug!("[AVCTP] dropping fragmented response");
                return Ok(());
            }
            if let Some(ack) = control.correlate_control(avctp.transaction, &avc, length) {
                self.passthrough_answered(ack);
            }
            return Ok(());
        }

        avctp.message_type = MessageType::Response;

        let reply_length = if avctp.packet_type != PacketType::Single {
            avc.code = ctype::NOT_IMPLEMENTED;
            CONTROL_HEADER_LENGTH
        } else if !avctp.is_remote_control() {
            avctp.invalid_pid = true;
            AvctpHeader::SIZE
        } else {
            CONTROL_HEADER_LENGTH + self.dispatch_command(avctp.transaction, &mut avc, length)
        };

        let Some(control) = self.control.as_mut() else {
            return Ok(());
        };
        control.buffer[..AvctpHeader::SIZE].copy_from_slice(&avctp.encode());
        if reply_length >= CONTROL_HEADER_LENGTH {
            control.buffer[AvctpHeader::SIZE..CONTROL_HEADER_LENGTH]
                .copy_from_slice(&avc.encode());
        }
        control.write_frame(reply_length)
    }

    /// Run the handler bound to the command's opcode and return the reply operand length
    fn dispatch_command(&mut self, transaction: u8, avc: &mut AvcHeader, length: usize) -> usize {
        let mut actions = KeyActions::new();
        let now = self.now;

        let Self {
            control,
            keys,
            passthrough: passthrough_handler,
            ..
        } = self;
        let Some(control) = control.as_mut() else {
            return 0;
        };
        let limit = usize::from(control.config().omtu).saturating_sub(CONTROL_HEADER_LENGTH);

        let Some(registration) = control
            .pdu_handlers
            .iter_mut()
            .find(|r| r.opcode == avc.opcode)
        else {
            debug!("[AVCTP] handler not found for {:#x}", avc.opcode);
            avc.code = ctype::NOT_IMPLEMENTED;
            return 0;
        };

        let mut pdu = ControlPdu {
            transaction,
            code: avc.code,
            subunit: avc.subunit_type,
            operands: &mut control.buffer[CONTROL_HEADER_LENGTH..],
            operand_count: length - CONTROL_HEADER_LENGTH,
        };

        let written = match &mut registration.handler {
            ControlHandler::Passthrough => passthrough::handle_panel_passthrough(
                keys,
                passthrough_handler.as_mut(),
                &mut pdu,
                now,
                &mut actions,
            ),
            ControlHandler::UnitInfo => handle_unit_info(&mut pdu),
            ControlHandler::SubunitInfo => handle_subunit_info(&mut pdu),
            ControlHandler::Custom(handler) => handler(&mut pdu),
        };

        avc.code = pdu.code & 0x0F;
        avc.subunit_type = pdu.subunit & 0x1F;
        let mut written = written.min(pdu.operands.len());
        if written > limit {
            warn!(
                "[AVCTP] reply to {:#x} exceeds the output MTU ({} > {})",
                avc.opcode,
                written,
                limit
            );
            avc.code = ctype::REJECTED;
            written = 0;
        }

        self.apply(actions);
        written
    }

    /// Read and process one browsing channel frame.
    ///
    /// An error means the browsing channel must be detached.
    pub(super) fn browsing_readable(&mut self) -> Result<(), AvctpError> {
        let Some(browsing) = self.browsing.as_mut() else {
            return Ok(());
        };

        let length = browsing.receive()?;
        let mut avctp = AvctpHeader::decode(&browsing.buffer[..length]).map_err(|_| {
            error!("[AVCTP] too small browsing packet ({} bytes)", length);
            AvctpError::MalformedFrame
        })?;
        let limit = usize::from(browsing.config().omtu).saturating_sub(AvctpHeader::SIZE);
        if avctp.packet_type != PacketType::Single {
            error!("[AVCTP] fragmented browsing packet");
            return Err(AvctpError::MalformedFrame);
        }

        if avctp.message_type == MessageType::Response {
            browsing.correlate_browsing(avctp.transaction, length);
            return Ok(());
        }

        avctp.message_type = MessageType::Response;

        let reply_length = if !avctp.is_remote_control() {
            avctp.invalid_pid = true;
            AvctpHeader::SIZE
        } else if let Some(registration) = browsing.browsing_handler.as_mut() {
            let mut pdu = BrowsingPdu {
                transaction: avctp.transaction,
                operands: &mut browsing.buffer[AvctpHeader::SIZE..],
                operand_count: length - AvctpHeader::SIZE,
            };
            let written = (registration.handler)(&mut pdu).min(pdu.operands.len());
            if written > limit {
                warn!(
                    "[AVCTP] browsing reply exceeds the output MTU ({} > {})",
                    written,
                    limit
                );
                AvctpHeader::SIZE
            } else {
                AvctpHeader::SIZE + written
            }
        } else {
            debug!("[AVCTP] browsing handler not found");
            AvctpHeader::SIZE
        };

        browsing.buffer[..AvctpHeader::SIZE].copy_from_slice(&avctp.encode());
        browsing.write_frame(reply_length)
    }
}
