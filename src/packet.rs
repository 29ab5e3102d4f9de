//! AVCTP Packet Structures and Parsing
//!
//! This module implements the AVCTP single-packet header and the AV/C header that
//! follows it on the control channel. Fields are packed with explicit shifts and
//! masks so the encoding does not depend on host byte order.
//!
//! ```text
//!  AVCTP header (3 bytes)
//!  +-----------+------+----+------+-----------------+
//!  | label (4) | pt(2)| cr | ipid | profile id (16) |
//!  +-----------+------+----+------+-----------------+
//!
//!  AV/C header (3 bytes, control channel only)
//!  +----------+----------+---------------+------------+-----------+
//!  | rsvd (4) | code (4) | subunit type  | subunit id | opcode (8)|
//!  |          |          |      (5)      |    (3)     |           |
//!  +----------+----------+---------------+------------+-----------+
//! ```

use crate::constants::{AVC_HEADER_LENGTH, AVCTP_HEADER_LENGTH, AV_REMOTE_SVCLASS_ID};

/// AVCTP packet parsing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketError {
    /// Packet data is too short for the header being decoded
    InsufficientData,
    /// Output buffer cannot hold the encoded frame
    BufferTooSmall,
}

impl core::fmt::Display for PacketError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InsufficientData => write!(f, "Insufficient data for AVCTP packet"),
            Self::BufferTooSmall => write!(f, "Buffer too small for AVCTP frame"),
        }
    }
}

/// AVCTP packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketType {
    /// Complete message in one packet
    Single = 0,
    /// First packet of a fragmented message
    Start = 1,
    /// Middle packet of a fragmented message
    Continue = 2,
    /// Last packet of a fragmented message
    End = 3,
}

impl PacketType {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Single,
            1 => Self::Start,
            2 => Self::Continue,
            _ => Self::End,
        }
    }
}

/// AVCTP message direction (the C/R bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MessageType {
    /// Command frame
    Command = 0,
    /// Response frame
    Response = 1,
}

/// AVCTP Header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AvctpHeader {
    /// 4-bit transaction label
    pub transaction: u8,
    /// Packet type
    pub packet_type: PacketType,
    /// Command or response
    pub message_type: MessageType,
    /// Invalid profile identifier bit
    pub invalid_pid: bool,
    /// Profile identifier (service class UUID16)
    pub pid: u16,
}

impl AvctpHeader {
    /// Size of the AVCTP header in bytes
    pub const SIZE: usize = AVCTP_HEADER_LENGTH;

    /// Create a single-packet header for the A/V remote control profile
    #[must_use]
    pub const fn new(transaction: u8, message_type: MessageType) -> Self {
        Self {
            transaction: transaction & 0x0F,
            packet_type: PacketType::Single,
            message_type,
            invalid_pid: false,
            pid: AV_REMOTE_SVCLASS_ID,
        }
    }

    /// Encode header to bytes
    #[must_use]
    pub fn encode(&self) -> [u8; AVCTP_HEADER_LENGTH] {
        let pid = self.pid.to_be_bytes();
        [
            ((self.transaction & 0x0F) << 4)
                | ((self.packet_type as u8) << 2)
                | ((self.message_type as u8) << 1)
                | u8::from(self.invalid_pid),
            pid[0],
            pid[1],
        ]
    }

    /// Decode header from bytes
    ///
    /// # Errors
    /// Returns `PacketError::InsufficientData` if the slice is shorter than 3 bytes
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::SIZE {
            return Err(PacketError::InsufficientData);
        }

        let message_type = if data[0] & 0x02 == 0 {
            MessageType::Command
        } else {
            MessageType::Response
        };

        Ok(Self {
            transaction: data[0] >> 4,
            packet_type: PacketType::from_bits(data[0] >> 2),
            message_type,
            invalid_pid: data[0] & 0x01 != 0,
            pid: u16::from_be_bytes([data[1], data[2]]),
        })
    }

    /// Whether the header carries the A/V remote control profile id
    #[must_use]
    pub const fn is_remote_control(&self) -> bool {
        self.pid == AV_REMOTE_SVCLASS_ID
    }
}

/// AV/C Header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AvcHeader {
    /// Command type or response code (4 bits)
    pub code: u8,
    /// Subunit type (5 bits)
    pub subunit_type: u8,
    /// Subunit id (3 bits)
    pub subunit_id: u8,
    /// Opcode
    pub opcode: u8,
}

impl AvcHeader {
    /// Size of the AV/C header in bytes
    pub const SIZE: usize = AVC_HEADER_LENGTH;

    /// Create a header addressing subunit id 0 of `subunit_type`
    #[must_use]
    pub const fn new(code: u8, subunit_type: u8, opcode: u8) -> Self {
        Self {
            code: code & 0x0F,
            subunit_type: subunit_type & 0x1F,
            subunit_id: 0,
            opcode,
        }
    }

    /// Encode header to bytes
    #[must_use]
    pub fn encode(&self) -> [u8; AVC_HEADER_LENGTH] {
        [
            self.code & 0x0F,
            ((self.subunit_type & 0x1F) << 3) | (self.subunit_id & 0x07),
            self.opcode,
        ]
    }

    /// Decode header from bytes
    ///
    /// # Errors
    /// Returns `PacketError::InsufficientData` if the slice is shorter than 3 bytes
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::SIZE {
            return Err(PacketError::InsufficientData);
        }

        Ok(Self {
            code: data[0] & 0x0F,
            subunit_type: data[1] >> 3,
            subunit_id: data[1] & 0x07,
            opcode: data[2],
        })
    }
}

/// Write a complete frame into `buf` and return its length.
///
/// The header region is zero-filled before the fields are written. `avc` is
/// `None` for browsing frames, whose operands follow the AVCTP header directly.
///
/// # Errors
/// Returns `PacketError::BufferTooSmall` if the frame does not fit in `buf`
pub fn encode_frame(
    buf: &mut [u8],
    avctp: &AvctpHeader,
    avc: Option<&AvcHeader>,
    operands: &[u8],
) -> Result<usize, PacketError> {
    let header_len = header_length(avc.is_some());
    let total = header_len + operands.len();
    if buf.len() < total {
        return Err(PacketError::BufferTooSmall);
    }

    buf[..header_len].fill(0);
    buf[..AvctpHeader::SIZE].copy_from_slice(&avctp.encode());
    if let Some(avc) = avc {
        buf[AvctpHeader::SIZE..header_len].copy_from_slice(&avc.encode());
    }
    buf[header_len..total].copy_from_slice(operands);

    Ok(total)
}

/// Header length of a frame with or without the AV/C header
#[must_use]
pub const fn header_length(with_avc: bool) -> usize {
    if with_avc {
        AvctpHeader::SIZE + AvcHeader::SIZE
    } else {
        AvctpHeader::SIZE
    }
}
