//! Input Sink and Key Tables
//!
//! Passthrough keys pressed by the peer are translated into Linux input key codes
//! and forwarded to an [`InputSink`]. The sink itself (uinput device, HID bridge,
//! test recorder) lives outside the engine.

use crate::AvctpError;
use crate::constants::op;

/// Receiver of key edges decoded from passthrough commands
pub trait InputSink {
    /// Attach the sink to the device identified by `device` (its address string)
    ///
    /// # Errors
    /// Returns `AvctpError::InputUnavailable` if the sink cannot be created
    fn open(&mut self, device: &str) -> Result<(), AvctpError> {
        let _ = device;
        Ok(())
    }

    /// Deliver one key edge
    fn send_key(&mut self, key: u16, pressed: bool);

    /// Release the sink; called once when the session shuts down
    fn close(&mut self) {}
}

/// Linux input event key codes used by the key table
pub mod key {
    /// `KEY_ENTER`
    pub const ENTER: u16 = 28;
    /// `KEY_F1`
    pub const F1: u16 = 59;
    /// `KEY_F2`
    pub const F2: u16 = 60;
    /// `KEY_F3`
    pub const F3: u16 = 61;
    /// `KEY_F4`
    pub const F4: u16 = 62;
    /// `KEY_UP`
    pub const UP: u16 = 103;
    /// `KEY_LEFT`
    pub const LEFT: u16 = 105;
    /// `KEY_RIGHT`
    pub const RIGHT: u16 = 106;
    /// `KEY_DOWN`
    pub const DOWN: u16 = 108;
    /// `KEY_VOLUMEDOWN`
    pub const VOLUME_DOWN: u16 = 114;
    /// `KEY_VOLUMEUP`
    pub const VOLUME_UP: u16 = 115;
    /// `KEY_HELP`
    pub const HELP: u16 = 138;
    /// `KEY_MENU`
    pub const MENU: u16 = 139;
    /// `KEY_NEXTSONG`
    pub const NEXT_SONG: u16 = 163;
    /// `KEY_PREVIOUSSONG`
    pub const PREVIOUS_SONG: u16 = 165;
    /// `KEY_STOPCD`
    pub const STOP_CD: u16 = 166;
    /// `KEY_REWIND`
    pub const REWIND: u16 = 168;
    /// `KEY_CONFIG`
    pub const CONFIG: u16 = 171;
    /// `KEY_PLAYCD`
    pub const PLAY_CD: u16 = 200;
    /// `KEY_PAUSECD`
    pub const PAUSE_CD: u16 = 201;
    /// `KEY_FASTFORWARD`
    pub const FAST_FORWARD: u16 = 208;
    /// `KEY_SELECT`
    pub const SELECT: u16 = 353;
    /// `KEY_POWER2`
    pub const POWER2: u16 = 356;
    /// `KEY_PROGRAM`
    pub const PROGRAM: u16 = 362;
    /// `KEY_FAVORITES`
    pub const FAVORITES: u16 = 364;
    /// `KEY_CHANNELUP`
    pub const CHANNEL_UP: u16 = 402;
    /// `KEY_CHANNELDOWN`
    pub const CHANNEL_DOWN: u16 = 403;
}

/// Mapping of a passthrough operation id to an input key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMapping {
    /// Display name used in logs
    pub name: &'static str,
    /// Passthrough operation id
    pub avc: u8,
    /// Input key code
    pub key: u16,
}

const fn mapping(name: &'static str, avc: u8, key: u16) -> KeyMapping {
    KeyMapping { name, avc, key }
}

/// Keys accepted from the peer
pub const KEY_MAP: [KeyMapping; 27] = [
    mapping("SELECT", op::SELECT, key::SELECT),
    mapping("UP", op::UP, key::UP),
    mapping("DOWN", op::DOWN, key::DOWN),
    mapping("LEFT", op::LEFT, key::LEFT),
    mapping("RIGHT", op::RIGHT, key::RIGHT),
    mapping("ROOT MENU", op::ROOT_MENU, key::MENU),
    mapping("CONTENTS MENU", op::CONTENTS_MENU, key::PROGRAM),
    mapping("FAVORITE MENU", op::FAVORITE_MENU, key::FAVORITES),
    mapping("ENTER", op::ENTER, key::ENTER),
    mapping("CHANNEL UP", op::CHANNEL_UP, key::CHANNEL_UP),
    mapping("CHANNEL DOWN", op::CHANNEL_DOWN, key::CHANNEL_DOWN),
    mapping("INPUT SELECT", op::INPUT_SELECT, key::CONFIG),
    mapping("HELP", op::HELP, key::HELP),
    mapping("POWER", op::POWER, key::POWER2),
    mapping("VOLUME UP", op::VOLUME_UP, key::VOLUME_UP),
    mapping("VOLUME DOWN", op::VOLUME_DOWN, key::VOLUME_DOWN),
    mapping("PLAY", op::PLAY, key::PLAY_CD),
    mapping("STOP", op::STOP, key::STOP_CD),
    mapping("PAUSE", op::PAUSE, key::PAUSE_CD),
    mapping("FORWARD", op::FORWARD, key::NEXT_SONG),
    mapping("BACKWARD", op::BACKWARD, key::PREVIOUS_SONG),
    mapping("REWIND", op::REWIND, key::REWIND),
    mapping("FAST FORWARD", op::FAST_FORWARD, key::FAST_FORWARD),
    mapping("F1", op::F1, key::F1),
    mapping("F2", op::F2, key::F2),
    mapping("F3", op::F3, key::F3),
    mapping("F4", op::F4, key::F4),
];

/// Look up the key mapped to a passthrough operation id (release bit ignored)
#[must_use]
pub fn lookup(avc: u8) -> Option<&'static KeyMapping> {
    let avc = avc & !op::RELEASED;
    KEY_MAP.iter().find(|mapping| mapping.avc == avc)
}

/// Name of an outbound passthrough operation
#[must_use]
pub const fn op_name(avc: u8) -> &'static str {
    match avc & !op::RELEASED {
        op::VOLUME_UP => "VOLUME UP",
        op::VOLUME_DOWN => "VOLUME DOWN",
        op::MUTE => "MUTE",
        op::PLAY => "PLAY",
        op::STOP => "STOP",
        op::PAUSE => "PAUSE",
        op::RECORD => "RECORD",
        op::REWIND => "REWIND",
        op::FAST_FORWARD => "FAST FORWARD",
        op::EJECT => "EJECT",
        op::FORWARD => "FORWARD",
        op::BACKWARD => "BACKWARD",
        _ => "UNKNOWN",
    }
}

/// Keys that need a workaround on a specific device model
#[derive(Debug, Clone, Copy)]
pub struct DeviceQuirks {
    /// Exact device display name
    pub name: &'static str,
    /// Keys for which the device never sends a release
    pub no_release: &'static [u8],
}

/// Known devices and their quirks
pub const DEVICE_QUIRKS: &[DeviceQuirks] = &[DeviceQuirks {
    name: "Nokia CK-20W",
    no_release: &[op::FORWARD, op::BACKWARD, op::PLAY, op::PAUSE],
}];

/// Quirks registered for a device display name
#[must_use]
pub fn device_quirks(name: &str) -> Option<&'static DeviceQuirks> {
    DEVICE_QUIRKS.iter().find(|quirks| quirks.name == name)
}
