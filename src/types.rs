use std::fmt;

use uuid::Uuid;

use crate::protocol::{
    ACCELEROMETER_CHARACTERISTIC, CONTROL_CHARACTERISTIC, EEG_CHANNEL_NAMES, EEG_CHARACTERISTICS,
    GYROSCOPE_CHARACTERISTIC, PPG_CHANNEL_NAMES, PPG_CHARACTERISTICS, TELEMETRY_CHARACTERISTIC,
};

/// EEG electrode, in characteristic order.
///
/// | Variant | Position | UUID suffix |
/// |---|---|---|
/// | `Tp9` | left rear | 0003 |
/// | `Af7` | left front | 0004 |
/// | `Af8` | right front | 0005 |
/// | `Tp10` | right rear | 0006 |
/// | `Aux` | auxiliary input | 0007 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EegElectrode {
    Tp9 = 0,
    Af7 = 1,
    Af8 = 2,
    Tp10 = 3,
    Aux = 4,
}

impl EegElectrode {
    pub const ALL: [EegElectrode; 5] = [
        EegElectrode::Tp9,
        EegElectrode::Af7,
        EegElectrode::Af8,
        EegElectrode::Tp10,
        EegElectrode::Aux,
    ];

    /// Position of this electrode in [`EEG_CHARACTERISTICS`] and the session buffers.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        EEG_CHANNEL_NAMES[self.index()]
    }
}

/// Optical (PPG) channel, in characteristic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PpgChannel {
    /// Background light, used for ambient subtraction.
    Ambient = 0,
    Infrared = 1,
    Red = 2,
}

impl PpgChannel {
    pub const ALL: [PpgChannel; 3] = [PpgChannel::Ambient, PpgChannel::Infrared, PpgChannel::Red];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        PPG_CHANNEL_NAMES[self.index()]
    }
}

/// Motion axis; each of the accelerometer and gyroscope keeps one buffer per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// One inbound GATT characteristic of the headset.
///
/// Replaces per-characteristic callbacks: the link tags every payload with a
/// `Channel` and [`crate::session::DeviceSession::on_notification`] matches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Length-prefixed JSON fragments in reply to commands.
    Control,
    /// Battery telemetry, about once per second.
    Battery,
    /// 3 × XYZ accelerometer samples per notification.
    Accelerometer,
    /// 3 × XYZ gyroscope samples per notification.
    Gyroscope,
    /// 12-bit packed EEG samples for one electrode.
    Eeg(EegElectrode),
    /// 24-bit packed optical samples for one wavelength.
    Ppg(PpgChannel),
}

impl Channel {
    /// Every characteristic a session subscribes to, in subscription order.
    pub const SUBSCRIPTIONS: [Channel; 12] = [
        Channel::Control,
        Channel::Battery,
        Channel::Gyroscope,
        Channel::Accelerometer,
        Channel::Ppg(PpgChannel::Ambient),
        Channel::Ppg(PpgChannel::Infrared),
        Channel::Ppg(PpgChannel::Red),
        Channel::Eeg(EegElectrode::Tp9),
        Channel::Eeg(EegElectrode::Af7),
        Channel::Eeg(EegElectrode::Af8),
        Channel::Eeg(EegElectrode::Tp10),
        Channel::Eeg(EegElectrode::Aux),
    ];

    /// GATT characteristic carrying this channel.
    pub fn uuid(self) -> Uuid {
        match self {
            Channel::Control => CONTROL_CHARACTERISTIC,
            Channel::Battery => TELEMETRY_CHARACTERISTIC,
            Channel::Accelerometer => ACCELEROMETER_CHARACTERISTIC,
            Channel::Gyroscope => GYROSCOPE_CHARACTERISTIC,
            Channel::Eeg(e) => EEG_CHARACTERISTICS[e.index()],
            Channel::Ppg(p) => PPG_CHARACTERISTICS[p.index()],
        }
    }

    /// Inverse of [`Channel::uuid`]; `None` for characteristics this crate does not decode.
    pub fn from_uuid(uuid: Uuid) -> Option<Channel> {
        Channel::SUBSCRIPTIONS.into_iter().find(|c| c.uuid() == uuid)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Control => f.write_str("control"),
            Channel::Battery => f.write_str("battery"),
            Channel::Accelerometer => f.write_str("accelerometer"),
            Channel::Gyroscope => f.write_str("gyroscope"),
            Channel::Eeg(e) => write!(f, "eeg/{}", e.name()),
            Channel::Ppg(p) => write!(f, "ppg/{}", p.name()),
        }
    }
}

/// Connection state of a [`crate::session::DeviceSession`].
///
/// ```text
/// Idle ──connect()──▶ Connecting ──startup ok──▶ Streaming
///  ▲                      │                          │
///  └──── failure / disconnect() / link dropped ──────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Streaming,
}

/// A single 3-axis inertial measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XyzSample {
    /// X-axis value (g for accelerometer, °/s for gyroscope).
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl XyzSample {
    /// Component along `axis`.
    pub fn get(&self, axis: Axis) -> f32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// Everything a radio link reports back to its session.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// One notification payload, still carrying its sequence header.
    Notification { channel: Channel, data: Vec<u8> },
    /// The link dropped without being asked to.
    Disconnected,
}
