//! AVCTP Constants
//!
//! This module contains the constants used throughout the crate: wire sizes,
//! timeouts, AV/C command types, subunits, opcodes and passthrough operation ids.
//! Values follow the AVCTP 1.4 and AV/C Panel Subunit specifications.

/// A/V Remote Control service class id carried in every AVCTP header
pub const AV_REMOTE_SVCLASS_ID: u16 = 0x110E;

/// L2CAP PSM of the AVCTP control channel
pub const AVCTP_CONTROL_PSM: u16 = 0x0017;

/// L2CAP PSM of the AVCTP browsing channel
pub const AVCTP_BROWSING_PSM: u16 = 0x001B;

/// AVCTP header length in bytes
pub const AVCTP_HEADER_LENGTH: usize = 3;

/// AV/C header length in bytes (code, subunit, opcode)
pub const AVC_HEADER_LENGTH: usize = 3;

/// Combined header length of a control channel frame
pub const CONTROL_HEADER_LENGTH: usize = AVCTP_HEADER_LENGTH + AVC_HEADER_LENGTH;

/// Default L2CAP MTU used when no MTU has been negotiated
pub const DEFAULT_MTU: u16 = 672;

/// Number of distinct transaction labels (4-bit field)
pub const TRANSACTION_LABELS: u8 = 16;

/// Time an in-flight request waits for its response
pub const REQUEST_TIMEOUT_MS: u64 = 2_000;

/// AV/C Panel 1.23: a command with the pressed value is valid for two seconds
pub const AVC_PRESS_TIMEOUT_MS: u64 = 2_000;

/// Default AVRCP version reported by a session (1.3)
pub const DEFAULT_VERSION: u16 = 0x0103;

/// Quirk flag: the device never sends a release for this key
pub const QUIRK_NO_RELEASE: u8 = 1 << 0;

/// AV/C command types and response codes
pub mod ctype {
    /// CONTROL command
    pub const CONTROL: u8 = 0x0;
    /// STATUS command
    pub const STATUS: u8 = 0x1;
    /// NOTIFY command
    pub const NOTIFY: u8 = 0x3;
    /// NOT IMPLEMENTED response
    pub const NOT_IMPLEMENTED: u8 = 0x8;
    /// ACCEPTED response
    pub const ACCEPTED: u8 = 0x9;
    /// REJECTED response
    pub const REJECTED: u8 = 0xA;
    /// STABLE response
    pub const STABLE: u8 = 0xC;
    /// CHANGED response
    pub const CHANGED: u8 = 0xD;
    /// INTERIM response
    pub const INTERIM: u8 = 0xF;
}

/// AV/C subunit types
pub mod subunit {
    /// Panel subunit
    pub const PANEL: u8 = 0x09;
    /// Unit (no subunit addressed)
    pub const UNIT: u8 = 0x1F;
}

/// AV/C opcodes
pub mod opcode {
    /// Vendor dependent command
    pub const VENDORDEP: u8 = 0x00;
    /// UNIT INFO command
    pub const UNITINFO: u8 = 0x30;
    /// SUBUNIT INFO command
    pub const SUBUNITINFO: u8 = 0x31;
    /// PASS THROUGH command
    pub const PASSTHROUGH: u8 = 0x7C;
}

/// Panel subunit passthrough operation ids
pub mod op {
    /// SELECT
    pub const SELECT: u8 = 0x00;
    /// UP
    pub const UP: u8 = 0x01;
    /// DOWN
    pub const DOWN: u8 = 0x02;
    /// LEFT
    pub const LEFT: u8 = 0x03;
    /// RIGHT
    pub const RIGHT: u8 = 0x04;
    /// ROOT MENU
    pub const ROOT_MENU: u8 = 0x09;
    /// CONTENTS MENU
    pub const CONTENTS_MENU: u8 = 0x0B;
    /// FAVORITE MENU
    pub const FAVORITE_MENU: u8 = 0x0C;
    /// ENTER
    pub const ENTER: u8 = 0x2B;
    /// CHANNEL UP
    pub const CHANNEL_UP: u8 = 0x30;
    /// CHANNEL DOWN
    pub const CHANNEL_DOWN: u8 = 0x31;
    /// INPUT SELECT
    pub const INPUT_SELECT: u8 = 0x34;
    /// HELP
    pub const HELP: u8 = 0x35;
    /// POWER
    pub const POWER: u8 = 0x40;
    /// VOLUME UP
    pub const VOLUME_UP: u8 = 0x41;
    /// VOLUME DOWN
    pub const VOLUME_DOWN: u8 = 0x42;
    /// MUTE
    pub const MUTE: u8 = 0x43;
    /// PLAY
    pub const PLAY: u8 = 0x44;
    /// STOP
    pub const STOP: u8 = 0x45;
    /// PAUSE
    pub const PAUSE: u8 = 0x46;
    /// RECORD
    pub const RECORD: u8 = 0x47;
    /// REWIND
    pub const REWIND: u8 = 0x48;
    /// FAST FORWARD
    pub const FAST_FORWARD: u8 = 0x49;
    /// EJECT
    pub const EJECT: u8 = 0x4A;
    /// FORWARD
    pub const FORWARD: u8 = 0x4B;
    /// BACKWARD
    pub const BACKWARD: u8 = 0x4C;
    /// F1
    pub const F1: u8 = 0x71;
    /// F2
    pub const F2: u8 = 0x72;
    /// F3
    pub const F3: u8 = 0x73;
    /// F4
    pub const F4: u8 = 0x74;

    /// Bit set in operand 0 when the button is released
    pub const RELEASED: u8 = 0x80;
}
