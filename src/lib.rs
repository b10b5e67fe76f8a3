//! # muse-session
//!
//! Protocol decoding and sample buffering for [Interaxon Muse](https://choosemuse.com/)
//! headsets (Classic firmware: Muse 2 / Muse S) over Bluetooth Low Energy.
//!
//! The headset exposes one GATT characteristic per sensor.  A
//! [`session::DeviceSession`] subscribes to all of them, decodes every
//! notification into physical units, and queues the samples in one
//! fixed-size ring buffer per physical channel:
//!
//! | Sensor | Channels | Units | Per notification |
//! |---|---|---|---|
//! | EEG | TP9, AF7, AF8, TP10, AUX | µV | 12 samples, 12-bit packed |
//! | PPG | ambient, infrared, red | raw ADC | 6 samples, 24-bit packed |
//! | Accelerometer | x, y, z | g | 3 × XYZ |
//! | Gyroscope | x, y, z | °/s | 3 × XYZ |
//! | Battery | – | level (raw ÷ 512) | 1 value, not buffered |
//!
//! JSON replies on the control characteristic are reassembled into an info map.
//!
//! ## Quick start
//!
//! ```no_run
//! use muse_session::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LinkConfig::default();
//!     let device = BleLink::find_first(&config).await?;
//!     let (link, mut events) = BleLink::new(device, config);
//!
//!     let mut session = DeviceSession::new(link, SessionConfig::default());
//!     session.connect().await?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let Err(e) = session.handle_event(event) {
//!             log::warn!("{e}");
//!         }
//!         if session.state() == SessionState::Idle {
//!             break;
//!         }
//!         while let Some(uv) = session.read_eeg(EegElectrode::Af7) {
//!             println!("AF7 {uv:+.2} µV");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the most commonly needed types |
//! | [`session`] | Connection state machine, notification routing, per-channel buffers |
//! | [`link`] | The [`link::RadioLink`] transport seam and its btleplug implementation |
//! | [`parse`] | Byte-to-sample decoders for EEG, PPG, IMU, and battery payloads |
//! | [`control`] | Reassembly of fragmented JSON control replies |
//! | [`ring_buffer`] | Fixed-capacity, drop-newest sample queue |
//! | [`protocol`] | GATT UUIDs, scale constants, command and response framing |
//! | [`types`] | Channel identities, session state, link events |
//! | [`error`] | Error types for every layer |

pub mod control;
pub mod error;
pub mod link;
pub mod parse;
pub mod protocol;
pub mod ring_buffer;
pub mod session;
pub mod types;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    pub use crate::link::{BleLink, LinkConfig, MuseDevice, RadioLink};
    pub use crate::session::{DeviceSession, SessionBuffers, SessionConfig};

    pub use crate::error::{LinkError, SessionError};
    pub use crate::types::{
        Axis, Channel, EegElectrode, LinkEvent, PpgChannel, SessionState, XyzSample,
    };

    pub use crate::protocol::{EEG_CHANNEL_NAMES, PPG_CHANNEL_NAMES};
}
