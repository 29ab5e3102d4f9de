//! AVCTP Session
//!
//! A [`Session`] is the top-level handle for one remote device. It owns the
//! mandatory control channel, the optional browsing channel, every handler
//! registration, the passthrough key state and the input sink.
//!
//! ## Driving a session
//!
//! The session performs no I/O on its own. The owner reports readiness and
//! timer expiry through [`Session::handle_event`], and calls [`Session::poll`]
//! with the current time to run deferred queue ticks and expired timers.
//! [`Session::next_deadline`] tells when `poll` must be called next.
//!
//! ```rust,ignore
//! let mut session = Session::new(transport, SessionOptions::default());
//! session.send_passthrough(op::PLAY)?;
//! loop {
//!     session.poll(clock.now_ms());
//!     // wait for readability or session.next_deadline()
//!     session.handle_event(Event::Readable(ChannelKind::Control), clock.now_ms());
//! }
//! ```
//!
//! ## Handlers
//!
//! Handlers receive only the data they are called for, never the session.
//! Requests issued from inside a handler are not supported.

mod dispatch;
mod passthrough;

use crate::AvctpError;
use crate::channel::{Channel, ChannelConfig, ChannelKind, PassthroughAck};
use crate::constants::{DEFAULT_VERSION, ctype, op, opcode, subunit};
use crate::handler::{
    BrowsingPdu, BrowsingRegistration, ControlHandler, ControlPdu, HandlerId, HandlerIds,
    PassthroughRegistration, PduRegistration,
};
use crate::input::{self, InputSink};
use crate::packet::{AvcHeader, MessageType};
use crate::pending::{ControlCompletion, ControlResponse, RequestPayload};
use crate::processor::Event;
use alloc::boxed::Box;
use alloc::vec;
use embedded_io::{Read, Write};
use passthrough::{KeyAction, KeyActions, KeyState};

/// Session configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionOptions {
    /// AVRCP version advertised by the profile layer
    pub version: u16,
    /// Negotiated MTUs of the control channel
    pub control: ChannelConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION,
            control: ChannelConfig::default(),
        }
    }
}

/// Timer owned by a request or by the key state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    Request(ChannelKind, u8),
    Key,
}

/// AVCTP session with one remote device
pub struct Session<T: Read + Write> {
    control: Option<Channel<T>>,
    browsing: Option<Channel<T>>,
    keys: KeyState,
    sink: Option<Box<dyn InputSink>>,
    passthrough: Option<PassthroughRegistration>,
    ids: HandlerIds,
    version: u16,
    /// Time of the latest event or timer, in milliseconds
    now: u64,
}

impl<T: Read + Write> Session<T> {
    /// Create a session over a connected control channel transport.
    ///
    /// The built-in PASS THROUGH, UNIT INFO and SUBUNIT INFO handlers are
    /// registered immediately; see [`Session::builtin_handler`].
    pub fn new(transport: T, options: SessionOptions) -> Self {
        info!(
            "[AVCTP] new session, version {:#x}, imtu {}, omtu {}",
            options.version,
            options.control.imtu,
            options.control.omtu
        );

        let mut session = Self {
            control: Some(Channel::new(
                ChannelKind::Control,
                transport,
                options.control,
            )),
            browsing: None,
            keys: KeyState::default(),
            sink: None,
            passthrough: None,
            ids: HandlerIds::default(),
            version: options.version,
            now: 0,
        };

        session.add_pdu_handler(opcode::PASSTHROUGH, ControlHandler::Passthrough);
        session.add_pdu_handler(opcode::UNITINFO, ControlHandler::UnitInfo);
        session.add_pdu_handler(opcode::SUBUNITINFO, ControlHandler::SubunitInfo);
        session
    }

    /// Attach the browsing channel
    ///
    /// # Errors
    /// `AlreadyConnected` if a browsing channel exists, `NotConnected` after shutdown.
    pub fn connect_browsing(
        &mut self,
        transport: T,
        config: ChannelConfig,
    ) -> Result<(), AvctpError> {
        if self.control.is_none() {
            return Err(AvctpError::NotConnected);
        }
        if self.browsing.is_some() {
            return Err(AvctpError::AlreadyConnected);
        }

        info!(
            "[AVCTP] browsing connected, imtu {}, omtu {}",
            config.imtu,
            config.omtu
        );
        self.browsing = Some(Channel::new(ChannelKind::Browsing, transport, config));
        Ok(())
    }

    /// Tear the session down.
    ///
    /// Every queued, in-flight and processed request is failed once, the key
    /// timer is cancelled and the input sink is closed. Calling it again is a
    /// no-op.
    pub fn shutdown(&mut self) {
        if self.control.is_some() {
            info!("[AVCTP] session shutdown");
        }

        self.detach_browsing();
        if let Some(control) = self.control.take() {
            control.close();
        }

        self.keys.clear();

        if let Some(mut sink) = self.sink.take() {
            debug!("[AVCTP] closing input sink");
            sink.close();
        }
    }

    /// Whether the control channel is connected
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.control.is_some()
    }

    /// Whether the browsing channel is connected
    #[must_use]
    pub const fn is_browsing_connected(&self) -> bool {
        self.browsing.is_some()
    }

    /// AVRCP version given at creation
    #[must_use]
    pub const fn version(&self) -> u16 {
        self.version
    }

    /// Activate device quirks for `name` and attach an input sink for `address`
    ///
    /// # Errors
    /// Whatever the sink's `open` returns; the sink is not attached then.
    pub fn init_input<S: InputSink + 'static>(
        &mut self,
        name: &str,
        address: &str,
        mut sink: S,
    ) -> Result<(), AvctpError> {
        self.keys.apply_device_quirks(name);

        if let Err(e) = sink.open(address) {
            error!("[AVCTP] input sink for {} unavailable: {:?}", address, e);
            return Err(e);
        }

        if let Some(mut previous) = self.sink.replace(Box::new(sink)) {
            previous.close();
        }
        Ok(())
    }

    fn add_pdu_handler(&mut self, opcode: u8, handler: ControlHandler) -> Option<HandlerId> {
        let control = self.control.as_mut()?;
        if control.pdu_handlers.iter().any(|r| r.opcode == opcode) {
            return None;
        }

        let id = self.ids.allocate();
        control.pdu_handlers.push(PduRegistration {
            id,
            opcode,
            handler,
        });
        Some(id)
    }

    /// Register a handler for commands carrying `opcode`.
    ///
    /// Returns `None` if the opcode already has a handler or the session is shut down.
    pub fn register_pdu_handler<F>(&mut self, opcode: u8, handler: F) -> Option<HandlerId>
    where
        F: FnMut(&mut ControlPdu<'_>) -> usize + 'static,
    {
        self.add_pdu_handler(opcode, ControlHandler::Custom(Box::new(handler)))
    }

    /// Remove an opcode handler, including the built-in ones
    pub fn unregister_pdu_handler(&mut self, id: HandlerId) -> bool {
        let Some(control) = self.control.as_mut() else {
            return false;
        };
        let Some(index) = control.pdu_handlers.iter().position(|r| r.id == id) else {
            return false;
        };

        control.pdu_handlers.remove(index);
        true
    }

    /// Identifier of the built-in handler bound to `opcode`, if still registered
    #[must_use]
    pub fn builtin_handler(&self, opcode: u8) -> Option<HandlerId> {
        self.control
            .as_ref()?
            .pdu_handlers
            .iter()
            .find(|r| r.opcode == opcode && !matches!(r.handler, ControlHandler::Custom(_)))
            .map(|r| r.id)
    }

    /// Register the browsing channel's PDU handler.
    ///
    /// Returns `None` without a browsing channel or if a handler is registered.
    pub fn register_browsing_pdu_handler<F>(&mut self, handler: F) -> Option<HandlerId>
    where
        F: FnMut(&mut BrowsingPdu<'_>) -> usize + 'static,
    {
        let browsing = self.browsing.as_mut()?;
        if browsing.browsing_handler.is_some() {
            return None;
        }

        let id = self.ids.allocate();
        browsing.browsing_handler = Some(BrowsingRegistration {
            id,
            handler: Box::new(handler),
        });
        Some(id)
    }

    /// Remove the browsing PDU handler
    pub fn unregister_browsing_pdu_handler(&mut self, id: HandlerId) -> bool {
        self.browsing
            .as_mut()
            .and_then(|browsing| browsing.browsing_handler.take_if(|r| r.id == id))
            .is_some()
    }

    /// Register the handler offered every peer passthrough key while no key is held.
    ///
    /// Returns `None` if one is registered or the session is shut down.
    pub fn register_passthrough_handler<F>(&mut self, handler: F) -> Option<HandlerId>
    where
        F: FnMut(u8, bool) -> bool + 'static,
    {
        if self.control.is_none() || self.passthrough.is_some() {
            return None;
        }

        let id = self.ids.allocate();
        self.passthrough = Some(PassthroughRegistration {
            id,
            handler: Box::new(handler),
        });
        Some(id)
    }

    /// Remove the passthrough handler
    pub fn unregister_passthrough_handler(&mut self, id: HandlerId) -> bool {
        self.passthrough.take_if(|r| r.id == id).is_some()
    }

    /// Press a passthrough key on the peer, releasing any held key first
    ///
    /// # Errors
    /// `NotConnected` after shutdown.
    pub fn send_passthrough(&mut self, avc: u8) -> Result<(), AvctpError> {
        if self.control.is_none() {
            return Err(AvctpError::NotConnected);
        }

        debug!("[AVCTP] send passthrough {}", input::op_name(avc));
        let mut actions = KeyActions::new();
        self.keys.press(avc, &mut actions);
        self.apply(actions);
        Ok(())
    }

    /// Release the held key and cancel its timer
    ///
    /// # Errors
    /// `NotConnected` after shutdown.
    pub fn release_passthrough(&mut self) -> Result<(), AvctpError> {
        if self.control.is_none() {
            return Err(AvctpError::NotConnected);
        }

        let mut actions = KeyActions::new();
        self.keys.release_held(&mut actions);
        self.apply(actions);
        Ok(())
    }

    /// Send a vendor-dependent response with a caller-chosen transaction label.
    ///
    /// The frame is written immediately and bypasses the request queue.
    ///
    /// # Errors
    /// `NotConnected`, `InvalidParameter` for a label above 15, `Overflow`, or
    /// a transport failure (which also shuts the session down).
    pub fn send_vendordep(
        &mut self,
        transaction: u8,
        code: u8,
        subunit: u8,
        operands: &[u8],
    ) -> Result<(), AvctpError> {
        let control = self.control.as_mut().ok_or(AvctpError::NotConnected)?;
        if transaction > 0x0F {
            return Err(AvctpError::InvalidParameter);
        }

        let avc = AvcHeader::new(code, subunit, opcode::VENDORDEP);
        let result = control.send(transaction, MessageType::Response, Some(&avc), operands);
        self.reap();
        result
    }

    /// Queue a vendor-dependent command. Returns its transaction label.
    ///
    /// `handler` gets every response; it returns `true` while it expects more
    /// (INTERIM then CHANGED). On timeout or teardown it is called once with
    /// `REJECTED` and no operands.
    ///
    /// # Errors
    /// `NotConnected`, or `Overflow` if the frame cannot fit the output MTU.
    pub fn send_vendordep_req<F>(
        &mut self,
        code: u8,
        subunit: u8,
        operands: &[u8],
        handler: F,
    ) -> Result<u8, AvctpError>
    where
        F: FnMut(&ControlResponse<'_>) -> bool + 'static,
    {
        let control = self.control.as_mut().ok_or(AvctpError::NotConnected)?;
        control.check_length(true, operands.len())?;

        Ok(control.enqueue(RequestPayload::Control {
            code,
            subunit,
            opcode: opcode::VENDORDEP,
            operands: operands.to_vec(),
            completion: ControlCompletion::Handler(Box::new(handler)),
        }))
    }

    /// Queue a browsing command. Returns its transaction label.
    ///
    /// `handler` gets the response operands, or `None` on timeout or teardown.
    ///
    /// # Errors
    /// `NotConnected` without a browsing channel, `Overflow` if the frame
    /// cannot fit the output MTU.
    pub fn send_browsing_req<F>(&mut self, operands: &[u8], handler: F) -> Result<u8, AvctpError>
    where
        F: FnMut(Option<&[u8]>) -> bool + 'static,
    {
        let browsing = self.browsing.as_mut().ok_or(AvctpError::NotConnected)?;
        browsing.check_length(false, operands.len())?;

        Ok(browsing.enqueue(RequestPayload::Browsing {
            operands: operands.to_vec(),
            handler: Some(Box::new(handler)),
        }))
    }

    /// Process one event at time `now` (milliseconds)
    pub fn handle_event(&mut self, event: Event, now: u64) {
        self.now = self.now.max(now);

        match event {
            Event::Readable(ChannelKind::Control) => {
                if let Err(e) = self.control_readable() {
                    warn!("[AVCTP] control channel failed: {:?}", e);
                    self.shutdown();
                }
            }
            Event::Readable(ChannelKind::Browsing) => {
                if let Err(e) = self.browsing_readable() {
                    warn!("[AVCTP] browsing channel failed: {:?}", e);
                    self.detach_browsing();
                }
            }
            Event::RequestTimeout {
                channel,
                transaction,
            } => {
                let now = self.now;
                if let Some(channel) = self.channel_mut(channel) {
                    channel.expire(transaction, now);
                }
            }
            Event::KeyTimer => {
                if self.keys.deadline().is_some_and(|deadline| deadline <= self.now) {
                    self.fire_key_timer();
                }
            }
            Event::ProcessQueue(kind) => {
                let now = self.now;
                if let Some(channel) = self.channel_mut(kind) {
                    channel.process_queue(now);
                }
            }
            Event::Shutdown => self.shutdown(),
        }

        self.reap();
    }

    /// Fire every timer due at `now` in deadline order, then run deferred queue ticks.
    ///
    /// Work triggered by a timer happens at that timer's deadline, so a request
    /// sent after a timeout may itself expire within the same call.
    pub fn poll(&mut self, now: u64) {
        while let Some((deadline, timer)) = self.next_timer() {
            if deadline > now {
                break;
            }

            self.now = self.now.max(deadline);
            match timer {
                Timer::Request(kind, transaction) => {
                    if let Some(channel) = self.channel_mut(kind) {
                        channel.expire(transaction, deadline);
                    }
                }
                Timer::Key => self.fire_key_timer(),
            }
            self.run_scheduled();
        }

        self.now = self.now.max(now);
        self.run_scheduled();
    }

    /// Time at which [`Session::poll`] must be called next
    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        let timer = self.next_timer().map(|(deadline, _)| deadline);
        let scheduled = [&self.control, &self.browsing]
            .into_iter()
            .flatten()
            .any(Channel::process_scheduled);

        if scheduled {
            Some(timer.map_or(self.now, |deadline| deadline.min(self.now)))
        } else {
            timer
        }
    }

    fn next_timer(&self) -> Option<(u64, Timer)> {
        let control = self
            .control
            .as_ref()
            .and_then(Channel::next_deadline)
            .map(|(deadline, tid)| (deadline, Timer::Request(ChannelKind::Control, tid)));
        let browsing = self
            .browsing
            .as_ref()
            .and_then(Channel::next_deadline)
            .map(|(deadline, tid)| (deadline, Timer::Request(ChannelKind::Browsing, tid)));
        let key = self.keys.deadline().map(|deadline| (deadline, Timer::Key));

        [control, browsing, key]
            .into_iter()
            .flatten()
            .min_by_key(|(deadline, _)| *deadline)
    }

    fn run_scheduled(&mut self) {
        let now = self.now;
        for channel in [self.control.as_mut(), self.browsing.as_mut()]
            .into_iter()
            .flatten()
        {
            if channel.process_scheduled() {
                channel.process_queue(now);
            }
        }
        self.reap();
    }

    fn channel_mut(&mut self, kind: ChannelKind) -> Option<&mut Channel<T>> {
        match kind {
            ChannelKind::Control => self.control.as_mut(),
            ChannelKind::Browsing => self.browsing.as_mut(),
        }
    }

    fn detach_browsing(&mut self) {
        if let Some(browsing) = self.browsing.take() {
            debug!("[AVCTP] browsing disconnected");
            browsing.close();
        }
    }

    /// Tear down channels whose transport failed
    fn reap(&mut self) {
        if self.control.as_ref().is_some_and(Channel::is_broken) {
            self.shutdown();
        } else if self.browsing.as_ref().is_some_and(Channel::is_broken) {
            self.detach_browsing();
        }
    }

    fn fire_key_timer(&mut self) {
        let mut actions = KeyActions::new();
        self.keys.expire(self.now, &mut actions);
        self.apply(actions);
    }

    fn passthrough_answered(&mut self, ack: PassthroughAck) {
        if ack.code != ctype::ACCEPTED {
            return;
        }
        let Some(avc) = ack.op else {
            return;
        };

        let mut actions = KeyActions::new();
        self.keys.press_accepted(avc, self.now, &mut actions);
        self.apply(actions);
    }

    fn queue_passthrough(&mut self, operand: u8, completion: ControlCompletion) {
        let Some(control) = self.control.as_mut() else {
            return;
        };

        control.enqueue(RequestPayload::Control {
            code: ctype::CONTROL,
            subunit: subunit::PANEL,
            opcode: opcode::PASSTHROUGH,
            operands: vec![operand, 0],
            completion,
        });
    }

    fn apply(&mut self, actions: KeyActions) {
        for action in actions {
            match action {
                KeyAction::Press(avc) => {
                    self.queue_passthrough(avc, ControlCompletion::Passthrough);
                }
                KeyAction::Release(avc) => {
                    self.queue_passthrough(avc | op::RELEASED, ControlCompletion::Ignore);
                }
                KeyAction::Key { code, pressed } => {
                    if let Some(sink) = self.sink.as_mut() {
                        sink.send_key(code, pressed);
                    }
                }
            }
        }
    }
}

impl<T: Read + Write> Drop for Session<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::key;
    use crate::testing::{MockInputSink, MockTransport};
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    type Responses = Rc<RefCell<Vec<(u8, u8, Vec<u8>)>>>;

    fn session() -> (Session<MockTransport>, MockTransport) {
        let transport = MockTransport::new();
        let session = Session::new(transport.clone(), SessionOptions::default());
        (session, transport)
    }

    fn response(transaction: u8, code: u8, opcode: u8, operands: &[u8]) -> Vec<u8> {
        let mut frame = vec![(transaction << 4) | 0x02, 0x11, 0x0E, code, 0x48, opcode];
        frame.extend_from_slice(operands);
        frame
    }

    fn vendordep(session: &mut Session<MockTransport>, responses: &Responses) -> u8 {
        let responses = responses.clone();
        session
            .send_vendordep_req(
                ctype::STATUS,
                subunit::PANEL,
                &[0x00, 0x19, 0x58, 0x10],
                move |rsp: &ControlResponse<'_>| {
                    responses
                        .borrow_mut()
                        .push((rsp.code, rsp.subunit, rsp.operands.to_vec()));
                    false
                },
            )
            .unwrap()
    }

    fn receive(
        session: &mut Session<MockTransport>,
        transport: &MockTransport,
        frame: &[u8],
        now: u64,
    ) {
        transport.push(frame);
        session.handle_event(Event::Readable(ChannelKind::Control), now);
        session.poll(now);
    }

    #[test]
    fn test_session_defaults() {
        let (session, _) = session();
        assert!(session.is_connected());
        assert!(!session.is_browsing_connected());
        assert_eq!(session.version(), 0x0103);
        assert!(session.builtin_handler(opcode::PASSTHROUGH).is_some());
        assert!(session.builtin_handler(opcode::UNITINFO).is_some());
        assert!(session.builtin_handler(opcode::SUBUNITINFO).is_some());
        assert_eq!(session.next_deadline(), None);
    }

    #[test]
    fn test_vendordep_request_accepted() {
        let (mut session, transport) = session();
        let responses = Responses::default();

        assert_eq!(vendordep(&mut session, &responses), 0);
        assert_eq!(session.next_deadline(), Some(0));
        session.poll(0);
        assert_eq!(
            transport.written(),
            vec![vec![0x00, 0x11, 0x0E, ctype::STATUS, 0x48, 0x00, 0x00, 0x19, 0x58, 0x10]]
        );
        assert_eq!(session.next_deadline(), Some(2_000));

        receive(
            &mut session,
            &transport,
            &response(0, ctype::ACCEPTED, opcode::VENDORDEP, &[0x01]),
            10,
        );

        assert_eq!(
            *responses.borrow(),
            vec![(ctype::ACCEPTED, subunit::PANEL, vec![0x01])]
        );
        assert_eq!(session.next_deadline(), None);
    }

    #[test]
    fn test_timeout_reports_rejected_and_sends_next() {
        let (mut session, transport) = session();
        let responses = Responses::default();

        vendordep(&mut session, &responses);
        vendordep(&mut session, &responses);
        session.poll(0);
        assert_eq!(transport.written().len(), 1);

        session.poll(1_999);
        assert!(responses.borrow().is_empty());

        session.poll(2_000);
        assert_eq!(
            *responses.borrow(),
            vec![(ctype::REJECTED, subunit::PANEL, vec![])]
        );
        assert_eq!(transport.written().len(), 2);
        assert_eq!(transport.written()[1][0] >> 4, 1);
        assert_eq!(session.next_deadline(), Some(4_000));
    }

    #[test]
    fn test_timeouts_cascade_within_one_poll() {
        let (mut session, _transport) = session();
        let responses = Responses::default();

        vendordep(&mut session, &responses);
        vendordep(&mut session, &responses);
        session.poll(0);
        session.poll(5_000);

        assert_eq!(responses.borrow().len(), 2);
        assert_eq!(session.next_deadline(), None);
    }

    #[test]
    fn test_fast_forward_repeats_release_then_press() {
        let (mut session, transport) = session();

        session.send_passthrough(op::FAST_FORWARD).unwrap();
        session.poll(0);
        assert_eq!(
            transport.written()[0],
            vec![0x00, 0x11, 0x0E, ctype::CONTROL, 0x48, opcode::PASSTHROUGH, 0x49, 0x00]
        );

        receive(
            &mut session,
            &transport,
            &response(0, ctype::ACCEPTED, opcode::PASSTHROUGH, &[0x49, 0x00]),
            100,
        );
        assert_eq!(transport.written().len(), 1);
        assert_eq!(session.next_deadline(), Some(2_100));

        session.poll(2_100);
        let written = transport.written();
        assert_eq!(written.len(), 2);
        assert_eq!(&written[1][..], &[0x10, 0x11, 0x0E, 0x00, 0x48, 0x7C, 0xC9, 0x00]);

        receive(
            &mut session,
            &transport,
            &response(1, ctype::ACCEPTED, opcode::PASSTHROUGH, &[0xC9, 0x00]),
            2_150,
        );
        let written = transport.written();
        assert_eq!(written.len(), 3);
        assert_eq!(&written[2][..], &[0x20, 0x11, 0x0E, 0x00, 0x48, 0x7C, 0x49, 0x00]);

        // The repeated press is answered while the key is still held
        receive(
            &mut session,
            &transport,
            &response(2, ctype::ACCEPTED, opcode::PASSTHROUGH, &[0x49, 0x00]),
            2_200,
        );
        assert_eq!(transport.written().len(), 3);
        assert_eq!(session.next_deadline(), Some(4_100));
    }

    #[test]
    fn test_release_passthrough_stops_repeat() {
        let (mut session, transport) = session();

        session.send_passthrough(op::REWIND).unwrap();
        session.poll(0);
        receive(
            &mut session,
            &transport,
            &response(0, ctype::ACCEPTED, opcode::PASSTHROUGH, &[0x48, 0x00]),
            10,
        );

        session.release_passthrough().unwrap();
        session.poll(20);

        let written = transport.written();
        assert_eq!(written.len(), 2);
        assert_eq!(&written[1][6..], &[0xC8, 0x00]);
        assert_eq!(session.next_deadline(), Some(2_020));
    }

    #[test]
    fn test_accepted_press_is_released_immediately() {
        let (mut session, transport) = session();

        session.send_passthrough(op::PLAY).unwrap();
        session.poll(0);
        receive(
            &mut session,
            &transport,
            &response(0, ctype::ACCEPTED, opcode::PASSTHROUGH, &[0x44, 0x00]),
            10,
        );

        let written = transport.written();
        assert_eq!(written.len(), 2);
        assert_eq!(&written[1][6..], &[0xC4, 0x00]);
    }

    #[test]
    fn test_rejected_press_changes_nothing() {
        let (mut session, transport) = session();

        session.send_passthrough(op::FAST_FORWARD).unwrap();
        session.poll(0);
        receive(
            &mut session,
            &transport,
            &response(0, ctype::REJECTED, opcode::PASSTHROUGH, &[0x49, 0x00]),
            10,
        );

        assert_eq!(transport.written().len(), 1);
        assert_eq!(session.next_deadline(), None);
    }

    #[test]
    fn test_peer_key_auto_release() {
        let (mut session, transport) = session();
        let sink = MockInputSink::new();
        session
            .init_input("Headset", "00:11:22:33:44:55", sink.clone())
            .unwrap();
        assert_eq!(sink.device().as_deref(), Some("00:11:22:33:44:55"));

        transport.push(&[0x00, 0x11, 0x0E, ctype::CONTROL, 0x48, 0x7C, op::PLAY, 0x00]);
        session.handle_event(Event::Readable(ChannelKind::Control), 0);
        assert_eq!(sink.keys(), vec![(key::PLAY_CD, true)]);

        session.poll(1_999);
        assert_eq!(sink.keys().len(), 1);

        session.poll(2_000);
        assert_eq!(sink.keys(), vec![(key::PLAY_CD, true), (key::PLAY_CD, false)]);
        assert_eq!(session.next_deadline(), None);
    }

    #[test]
    fn test_quirked_key_press_is_press_and_release() {
        let (mut session, transport) = session();
        let sink = MockInputSink::new();
        session
            .init_input("Nokia CK-20W", "00:11:22:33:44:55", sink.clone())
            .unwrap();

        transport.push(&[0x00, 0x11, 0x0E, ctype::CONTROL, 0x48, 0x7C, op::FORWARD, 0x00]);
        session.handle_event(Event::Readable(ChannelKind::Control), 0);
        assert_eq!(
            sink.keys(),
            vec![(key::NEXT_SONG, true), (key::NEXT_SONG, false)]
        );
        assert_eq!(session.next_deadline(), None);

        transport.push(&[
            0x10,
            0x11,
            0x0E,
            ctype::CONTROL,
            0x48,
            0x7C,
            op::FORWARD | op::RELEASED,
            0x00,
        ]);
        session.handle_event(Event::Readable(ChannelKind::Control), 50);
        assert_eq!(sink.keys().len(), 2);
        assert_eq!(transport.written()[1][3], ctype::ACCEPTED);
    }

    #[test]
    fn test_passthrough_handler_consumes_peer_key() {
        let (mut session, transport) = session();
        let sink = MockInputSink::new();
        session.init_input("Headset", "addr", sink.clone()).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let id = session
            .register_passthrough_handler(move |avc, pressed| {
                log.borrow_mut().push((avc, pressed));
                true
            })
            .unwrap();
        assert!(session.register_passthrough_handler(|_, _| false).is_none());

        transport.push(&[0x00, 0x11, 0x0E, ctype::CONTROL, 0x48, 0x7C, op::VOLUME_UP, 0x00]);
        session.handle_event(Event::Readable(ChannelKind::Control), 0);

        assert_eq!(*seen.borrow(), vec![(op::VOLUME_UP, true)]);
        assert!(sink.keys().is_empty());
        assert_eq!(transport.written()[0][3], ctype::ACCEPTED);

        assert!(session.unregister_passthrough_handler(id));
        assert!(!session.unregister_passthrough_handler(id));
    }

    #[test]
    fn test_send_vendordep_response_bypasses_queue() {
        let (mut session, transport) = session();
        let responses = Responses::default();
        vendordep(&mut session, &responses);

        session
            .send_vendordep(5, ctype::STABLE, subunit::PANEL, &[0x01])
            .unwrap();

        assert_eq!(
            transport.written(),
            vec![vec![0x52, 0x11, 0x0E, ctype::STABLE, 0x48, 0x00, 0x01]]
        );
        assert_eq!(
            session.send_vendordep(16, ctype::STABLE, subunit::PANEL, &[0x01]),
            Err(AvctpError::InvalidParameter)
        );
    }

    #[test]
    fn test_oversized_frames_return_overflow() {
        let transport = MockTransport::new();
        let mut session = Session::new(
            transport.clone(),
            SessionOptions {
                control: ChannelConfig { imtu: 672, omtu: 10 },
                ..SessionOptions::default()
            },
        );

        assert_eq!(
            session.send_vendordep(0, ctype::STABLE, subunit::PANEL, &[0; 5]),
            Err(AvctpError::Overflow)
        );
        assert_eq!(
            session.send_vendordep_req(ctype::STATUS, subunit::PANEL, &[0; 5], |_| false),
            Err(AvctpError::Overflow)
        );
        session.poll(0);

        assert!(transport.written().is_empty());
        assert!(session.is_connected());
    }

    #[test]
    fn test_write_failure_shuts_session_down() {
        let (mut session, transport) = session();
        let responses = Responses::default();
        vendordep(&mut session, &responses);
        transport.limit_writes(3);

        assert_eq!(
            session.send_vendordep(0, ctype::STABLE, subunit::PANEL, &[0x01]),
            Err(AvctpError::PartialWrite)
        );
        assert!(!session.is_connected());
        assert_eq!(
            *responses.borrow(),
            vec![(ctype::REJECTED, subunit::PANEL, vec![])]
        );
    }

    #[test]
    fn test_registration_rules() {
        let (mut session, _) = session();

        assert!(session.register_pdu_handler(opcode::PASSTHROUGH, |_| 0).is_none());
        let builtin = session.builtin_handler(opcode::PASSTHROUGH).unwrap();
        assert!(session.unregister_pdu_handler(builtin));
        assert!(!session.unregister_pdu_handler(builtin));
        assert!(session.builtin_handler(opcode::PASSTHROUGH).is_none());

        let id = session.register_pdu_handler(opcode::PASSTHROUGH, |_| 0).unwrap();
        assert_ne!(id, builtin);
        assert!(session.builtin_handler(opcode::PASSTHROUGH).is_none());

        assert!(session.register_browsing_pdu_handler(|_| 0).is_none());
        session
            .connect_browsing(MockTransport::new(), ChannelConfig::default())
            .unwrap();
        let browsing = session.register_browsing_pdu_handler(|_| 0).unwrap();
        assert!(session.register_browsing_pdu_handler(|_| 0).is_none());
        assert!(!session.unregister_browsing_pdu_handler(id));
        assert!(session.unregister_browsing_pdu_handler(browsing));
    }

    #[test]
    fn test_connection_errors() {
        let (mut session, _) = session();

        assert_eq!(
            session.send_browsing_req(&[0x71], |_| false),
            Err(AvctpError::NotConnected)
        );
        session
            .connect_browsing(MockTransport::new(), ChannelConfig::default())
            .unwrap();
        assert_eq!(
            session.connect_browsing(MockTransport::new(), ChannelConfig::default()),
            Err(AvctpError::AlreadyConnected)
        );

        session.shutdown();
        assert!(!session.is_connected());
        assert!(!session.is_browsing_connected());
        assert_eq!(session.send_passthrough(op::PLAY), Err(AvctpError::NotConnected));
        assert_eq!(session.release_passthrough(), Err(AvctpError::NotConnected));
        assert_eq!(
            session.send_vendordep(0, ctype::STABLE, subunit::PANEL, &[]),
            Err(AvctpError::NotConnected)
        );
        assert_eq!(
            session.connect_browsing(MockTransport::new(), ChannelConfig::default()),
            Err(AvctpError::NotConnected)
        );
        assert!(session.register_pdu_handler(0x40, |_| 0).is_none());
        assert!(session.register_passthrough_handler(|_, _| true).is_none());
    }

    #[test]
    fn test_shutdown_fails_requests_and_closes_sink() {
        let (mut session, _transport) = session();
        let sink = MockInputSink::new();
        session.init_input("Headset", "addr", sink.clone()).unwrap();
        let responses = Responses::default();

        vendordep(&mut session, &responses);
        vendordep(&mut session, &responses);
        session.poll(0);

        session.handle_event(Event::Shutdown, 10);
        assert_eq!(responses.borrow().len(), 2);
        assert!(sink.is_closed());

        session.shutdown();
        assert_eq!(responses.borrow().len(), 2);
    }

    #[test]
    fn test_drop_fails_pending_requests() {
        let transport = MockTransport::new();
        let responses = Responses::default();
        {
            let mut session = Session::new(transport.clone(), SessionOptions::default());
            vendordep(&mut session, &responses);
        }

        assert_eq!(
            *responses.borrow(),
            vec![(ctype::REJECTED, subunit::PANEL, vec![])]
        );
    }

    #[test]
    fn test_control_end_of_stream_shuts_down() {
        let (mut session, _transport) = session();
        let responses = Responses::default();
        vendordep(&mut session, &responses);

        session.handle_event(Event::Readable(ChannelKind::Control), 0);

        assert!(!session.is_connected());
        assert_eq!(responses.borrow().len(), 1);
    }

    #[test]
    fn test_browsing_request_response() {
        let (mut session, _) = session();
        let browsing = MockTransport::new();
        session
            .connect_browsing(browsing.clone(), ChannelConfig::default())
            .unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();

        let transaction = session
            .send_browsing_req(&[0x71, 0x00, 0x00], move |data: Option<&[u8]>| {
                log.borrow_mut().push(data.map(<[u8]>::to_vec));
                false
            })
            .unwrap();
        assert_eq!(transaction, 0);
        session.poll(0);
        assert_eq!(browsing.written(), vec![vec![0x00, 0x11, 0x0E, 0x71, 0x00, 0x00]]);

        browsing.push(&[0x02, 0x11, 0x0E, 0x71, 0x04]);
        session.handle_event(Event::Readable(ChannelKind::Browsing), 10);

        assert_eq!(*seen.borrow(), vec![Some(vec![0x71, 0x04])]);
    }

    #[test]
    fn test_browsing_teardown_fails_browsing_requests_only() {
        let (mut session, transport) = session();
        let browsing = MockTransport::new();
        session
            .connect_browsing(browsing.clone(), ChannelConfig::default())
            .unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        session
            .send_browsing_req(&[0x71], move |data: Option<&[u8]>| {
                log.borrow_mut().push(data.is_none());
                false
            })
            .unwrap();
        let responses = Responses::default();
        vendordep(&mut session, &responses);
        session.poll(0);

        // End of stream on the browsing transport
        session.handle_event(Event::Readable(ChannelKind::Browsing), 10);

        assert!(!session.is_browsing_connected());
        assert!(session.is_connected());
        assert_eq!(*seen.borrow(), vec![true]);
        assert!(responses.borrow().is_empty());
        assert_eq!(transport.written().len(), 1);
    }

    #[test]
    fn test_stale_timer_events_are_ignored() {
        let (mut session, transport) = session();
        let responses = Responses::default();
        vendordep(&mut session, &responses);
        session.poll(0);

        session.handle_event(
            Event::RequestTimeout {
                channel: ChannelKind::Control,
                transaction: 4,
            },
            2_000,
        );
        session.handle_event(Event::KeyTimer, 2_000);
        assert!(responses.borrow().is_empty());

        session.handle_event(
            Event::RequestTimeout {
                channel: ChannelKind::Control,
                transaction: 0,
            },
            2_000,
        );
        assert_eq!(responses.borrow().len(), 1);
        assert_eq!(transport.written().len(), 1);
    }

    #[test]
    fn test_early_timeout_for_reused_label_is_ignored() {
        let (mut session, transport) = session();
        let responses = Responses::default();
        vendordep(&mut session, &responses);
        session.poll(0);

        session.handle_event(
            Event::RequestTimeout {
                channel: ChannelKind::Control,
                transaction: 0,
            },
            10,
        );
        assert!(responses.borrow().is_empty());
        assert!(session.is_connected());
        assert_eq!(session.next_deadline(), Some(2_000));

        session.poll(2_000);
        assert_eq!(responses.borrow().len(), 1);
        assert_eq!(transport.written().len(), 1);
    }

    #[test]
    fn test_process_queue_event_sends_request() {
        let (mut session, transport) = session();
        let responses = Responses::default();
        vendordep(&mut session, &responses);

        session.handle_event(Event::ProcessQueue(ChannelKind::Control), 0);
        assert_eq!(transport.written().len(), 1);
        assert_eq!(session.next_deadline(), Some(2_000));
    }
}
