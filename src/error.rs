//! Error types for the decode, control, transport, and session layers.
//!
//! A full ring buffer is not an error: [`crate::ring_buffer::RingBuffer::write`]
//! drops the sample by policy and reports nothing.

use thiserror::Error;
use uuid::Uuid;

use crate::types::{Channel, SessionState};

/// A notification payload that violates a decoder's framing precondition.
///
/// The headset emits fixed-size frames per characteristic, so these indicate a
/// corrupted link or a wiring bug rather than something to recover from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload length is not a whole number of packed groups.
    #[error("payload of {len} bytes is not a multiple of {group}")]
    Misaligned {
        /// Payload length in bytes.
        len: usize,
        /// Required group size in bytes.
        group: usize,
    },

    /// Payload is shorter than the fixed layout requires.
    #[error("frame too short: got {got} bytes, need {need}")]
    Truncated {
        /// Bytes available.
        got: usize,
        /// Bytes required.
        need: usize,
    },
}

/// Failure to build an outbound command frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The length byte cannot describe a command this long.
    #[error("command is {len} bytes; at most {max} fit in one frame")]
    TooLong {
        /// Command length in bytes.
        len: usize,
        /// Largest accepted command length.
        max: usize,
    },
}

/// The control stream produced text that does not parse as a JSON object.
#[derive(Error, Debug)]
pub enum ControlError {
    /// The accumulated fragment was rejected at a closing brace and discarded.
    #[error("malformed control fragment {fragment:?}: {reason}")]
    MalformedFragment {
        /// The text that failed to parse.
        fragment: String,
        /// Parser diagnostic.
        reason: String,
    },
}

/// Errors raised by a [`crate::link::RadioLink`] implementation.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Error reported by the Bluetooth stack.
    #[error("bluetooth: {0}")]
    Ble(#[from] btleplug::Error),

    /// A transport step did not finish in time.
    #[error("{step} timed out after {secs} s")]
    Timeout {
        /// Name of the step that stalled.
        step: &'static str,
        /// Timeout that elapsed.
        secs: u64,
    },

    /// No Bluetooth adapter is present on this host.
    #[error("no Bluetooth adapter found")]
    NoAdapter,

    /// No advertising device matched the name prefix.
    #[error("no device named {prefix}* found after {secs} s")]
    DeviceNotFound {
        /// Name prefix used as the scan filter.
        prefix: String,
        /// Scan duration.
        secs: u64,
    },

    /// The peripheral does not expose a required characteristic.
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    /// Subscribe or send was attempted before a successful connect.
    #[error("link is not connected")]
    NotConnected,
}

/// Errors surfaced by [`crate::session::DeviceSession`].
#[derive(Error, Debug)]
pub enum SessionError {
    /// Connect, subscribe, or a command write failed; the session is back in Idle.
    #[error("transport failure: {0}")]
    TransportFailure(#[from] LinkError),

    /// A control-channel object could not be parsed; the fragment was reset.
    #[error(transparent)]
    MalformedControlFragment(#[from] ControlError),

    /// A data notification violated its frame layout; nothing was buffered.
    #[error("{channel}: {source}")]
    Decode {
        /// Channel the frame arrived on.
        channel: Channel,
        /// Underlying framing error.
        #[source]
        source: DecodeError,
    },

    /// The outbound command could not be framed.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The operation is not allowed in the current connection state.
    #[error("{op} is not valid while {state:?}")]
    InvalidState {
        /// Operation that was rejected.
        op: &'static str,
        /// State the session was in.
        state: SessionState,
    },
}
