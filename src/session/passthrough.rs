//! Passthrough key handling
//!
//! One key may be held at a time. A key pressed by the peer is held with an
//! auto-release timer and released towards the input sink when it fires. A
//! REWIND or FAST FORWARD press issued locally and accepted by the peer is held
//! with a repeat timer that re-sends release and press on every expiry.

use crate::constants::{AVC_PRESS_TIMEOUT_MS, QUIRK_NO_RELEASE, ctype, op, subunit};
use crate::handler::{ControlPdu, PassthroughRegistration};
use crate::input;

/// Work produced by the key state machine, applied by the session in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum KeyAction {
    /// Queue a passthrough press request
    Press(u8),
    /// Queue a passthrough release request
    Release(u8),
    /// Forward a key edge to the input sink
    Key { code: u16, pressed: bool },
}

pub(crate) type KeyActions = heapless::Vec<KeyAction, 4>;

/// Currently held key and the role of its timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Held {
    /// Pressed by the peer, auto-released towards the input sink
    Peer { key: u16, deadline: u64 },
    /// Pressed locally, repeated towards the peer
    Local { op: u8, deadline: u64 },
}

fn push(actions: &mut KeyActions, action: KeyAction) {
    if actions.push(action).is_err() {
        warn!("[AVCTP] key action dropped: {:?}", action);
    }
}

pub(crate) struct KeyState {
    held: Option<Held>,
    quirks: [u8; 256],
}

impl Default for KeyState {
    fn default() -> Self {
        Self {
            held: None,
            quirks: [0; 256],
        }
    }
}

impl KeyState {
    /// Deadline of the armed key timer
    pub fn deadline(&self) -> Option<u64> {
        self.held.map(|held| match held {
            Held::Peer { deadline, .. } | Held::Local { deadline, .. } => deadline,
        })
    }

    /// Whether a key is held with its timer armed
    pub fn is_armed(&self) -> bool {
        self.held.is_some()
    }

    /// Locally held key
    pub fn local_key(&self) -> Option<u8> {
        match self.held {
            Some(Held::Local { op, .. }) => Some(op),
            _ => None,
        }
    }

    /// Quirk flags of a passthrough operation
    pub fn quirks(&self, avc: u8) -> u8 {
        self.quirks[usize::from(avc)]
    }

    /// Activate the quirks registered for a device display name
    pub fn apply_device_quirks(&mut self, name: &str) {
        let Some(device) = input::device_quirks(name) else {
            return;
        };

        debug!("[AVCTP] applying key quirks for {}", device.name);
        for &avc in device.no_release {
            self.quirks[usize::from(avc)] |= QUIRK_NO_RELEASE;
        }
    }

    /// Cancel the timer and release the held key towards whoever pressed it
    pub fn release_held(&mut self, actions: &mut KeyActions) {
        match self.held.take() {
            Some(Held::Peer { key, .. }) => push(
                actions,
                KeyAction::Key {
                    code: key,
                    pressed: false,
                },
            ),
            Some(Held::Local { op, .. }) => push(actions, KeyAction::Release(op)),
            None => {}
        }
    }

    /// Local press of `avc`, releasing any held key first
    pub fn press(&mut self, avc: u8, actions: &mut KeyActions) {
        self.release_held(actions);
        push(actions, KeyAction::Press(avc & !op::RELEASED));
    }

    /// The peer accepted a local press of `avc`
    pub fn press_accepted(&mut self, avc: u8, now: u64, actions: &mut KeyActions) {
        let avc = avc & !op::RELEASED;
        if self.held.is_some() {
            if self.local_key() == Some(avc) {
                return;
            }
            self.release_held(actions);
        }

        if avc == op::FAST_FORWARD || avc == op::REWIND {
            self.held = Some(Held::Local {
                op: avc,
                deadline: now + AVC_PRESS_TIMEOUT_MS,
            });
        } else {
            push(actions, KeyAction::Release(avc));
        }
    }

    /// Key edge received from the peer for a mapped key
    pub fn peer_key(
        &mut self,
        key: &input::KeyMapping,
        pressed: bool,
        now: u64,
        actions: &mut KeyActions,
    ) {
        if self.quirks(key.avc) & QUIRK_NO_RELEASE != 0 {
            if !pressed {
                debug!("[AVCTP] ignoring release of {}", key.name);
                return;
            }

            debug!("[AVCTP] treating {} press as press + release", key.name);
            push(
                actions,
                KeyAction::Key {
                    code: key.key,
                    pressed: true,
                },
            );
            push(
                actions,
                KeyAction::Key {
                    code: key.key,
                    pressed: false,
                },
            );
            return;
        }

        if pressed {
            self.release_held(actions);
            self.held = Some(Held::Peer {
                key: key.key,
                deadline: now + AVC_PRESS_TIMEOUT_MS,
            });
        } else {
            self.held = None;
        }

        push(
            actions,
            KeyAction::Key {
                code: key.key,
                pressed,
            },
        );
    }

    /// Key timer expiry
    pub fn expire(&mut self, now: u64, actions: &mut KeyActions) {
        match self.held {
            Some(Held::Peer { key, .. }) => {
                debug!("[AVCTP] key press timeout");
                self.held = None;
                push(
                    actions,
                    KeyAction::Key {
                        code: key,
                        pressed: false,
                    },
                );
            }
            Some(Held::Local { op, .. }) => {
                push(actions, KeyAction::Release(op));
                push(actions, KeyAction::Press(op));
                self.held = Some(Held::Local {
                    op,
                    deadline: now + AVC_PRESS_TIMEOUT_MS,
                });
            }
            None => {}
        }
    }

    /// Forget the held key without emitting anything
    pub fn clear(&mut self) {
        self.held = None;
    }
}

/// Built-in PASS THROUGH command handler
pub(crate) fn handle_panel_passthrough(
    keys: &mut KeyState,
    handler: Option<&mut PassthroughRegistration>,
    pdu: &mut ControlPdu<'_>,
    now: u64,
    actions: &mut KeyActions,
) -> usize {
    if pdu.code != ctype::CONTROL || pdu.subunit != subunit::PANEL {
        pdu.code = ctype::REJECTED;
        return 0;
    }

    if pdu.operand_count == 0 {
        pdu.code = ctype::ACCEPTED;
        return 0;
    }

    let raw = pdu.operands[0];
    let avc = raw & !op::RELEASED;
    let pressed = raw & op::RELEASED == 0;

    if !keys.is_armed()
        && let Some(registration) = handler
        && (registration.handler)(avc, pressed)
    {
        pdu.code = ctype::ACCEPTED;
        return pdu.operand_count;
    }

    let Some(key) = input::lookup(avc) else {
        debug!("[AVCTP] unknown button {:#x} pressed={}", avc, pressed);
        pdu.code = ctype::NOT_IMPLEMENTED;
        return 0;
    };

    debug!("[AVCTP] {} pressed={}", key.name, pressed);
    keys.peer_key(key, pressed, now, actions);

    pdu.code = ctype::ACCEPTED;
    pdu.operand_count
}
