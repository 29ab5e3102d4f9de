#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

extern crate alloc;

// This must go first so the logging macros are visible to every other module
mod fmt;

pub mod channel;
pub mod constants;
pub mod handler;
pub mod input;
pub mod packet;
pub mod pending;
pub mod processor;
pub mod session;

#[cfg(test)]
mod testing;

pub use channel::{ChannelConfig, ChannelKind};
pub use handler::{BrowsingPdu, ControlPdu, HandlerId};
pub use input::InputSink;
pub use packet::{AvcHeader, AvctpHeader, MessageType, PacketError, PacketType};
pub use pending::{ControlResponse, PendingState};
pub use processor::{Clock, Event, EventChannel};
pub use session::{Session, SessionOptions};

/// AVCTP error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AvctpError {
    /// The channel needed by the operation is not connected
    NotConnected,
    /// The browsing channel is already connected
    AlreadyConnected,
    /// Frame larger than the output MTU
    Overflow,
    /// No response within the request timeout
    Timeout,
    /// Inbound frame too short or of an unsupported packet type
    MalformedFrame,
    /// The transport reached end of stream or the session was shut down
    Disconnected,
    /// Transport read or write failure
    Transport(embedded_io::ErrorKind),
    /// The transport accepted only part of a frame
    PartialWrite,
    /// Invalid argument
    InvalidParameter,
    /// The input sink could not be created
    InputUnavailable,
}

impl core::fmt::Display for AvctpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "Channel not connected"),
            Self::AlreadyConnected => write!(f, "Channel already connected"),
            Self::Overflow => write!(f, "Frame exceeds the output MTU"),
            Self::Timeout => write!(f, "Request timed out"),
            Self::MalformedFrame => write!(f, "Malformed AVCTP frame"),
            Self::Disconnected => write!(f, "Channel disconnected"),
            Self::Transport(kind) => write!(f, "Transport error: {kind:?}"),
            Self::PartialWrite => write!(f, "Partial frame write"),
            Self::InvalidParameter => write!(f, "Invalid parameter"),
            Self::InputUnavailable => write!(f, "Input sink unavailable"),
        }
    }
}

impl core::error::Error for AvctpError {}

impl From<PacketError> for AvctpError {
    fn from(error: PacketError) -> Self {
        match error {
            PacketError::InsufficientData => Self::MalformedFrame,
            PacketError::BufferTooSmall => Self::Overflow,
        }
    }
}
