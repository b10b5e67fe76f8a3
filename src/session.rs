//! Per-headset session: connection state machine, notification routing, and
//! the decoded-sample buffers.

use log::{debug, info, warn};
use serde_json::{Map, Value};

use crate::control::ControlReassembler;
use crate::error::SessionError;
use crate::link::RadioLink;
use crate::parse::{
    decode_eeg_samples, decode_ppg_samples, parse_accelerometer, parse_battery, parse_gyroscope,
    strip_header,
};
use crate::protocol::{
    decode_response, encode_command, CMD_DEVICE_INFO, CMD_PAUSE, CMD_RESUME, CMD_START,
    DEFAULT_BUFFER_CAPACITY, PRESET_EEG_PPG,
};
use crate::ring_buffer::RingBuffer;
use crate::types::{Axis, Channel, EegElectrode, LinkEvent, PpgChannel, SessionState, XyzSample};

// ── SessionConfig ─────────────────────────────────────────────────────────────

/// Configuration for [`DeviceSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Samples held per channel before new ones are dropped. Must be non-zero.
    /// Default: `256`.
    pub buffer_capacity: usize,
    /// Channel preset sent during startup. Default: `"p50"` (EEG + PPG).
    pub preset: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            preset: PRESET_EEG_PPG.into(),
        }
    }
}

// ── SessionBuffers ────────────────────────────────────────────────────────────

/// One ring buffer per physical channel: 5 EEG, 3 PPG, 3 accelerometer axes,
/// and 3 gyroscope axes.
#[derive(Debug, Clone)]
pub struct SessionBuffers {
    eeg: [RingBuffer<f64>; 5],
    ppg: [RingBuffer<u32>; 3],
    accelerometer: [RingBuffer<f32>; 3],
    gyroscope: [RingBuffer<f32>; 3],
}

impl SessionBuffers {
    fn new(capacity: usize) -> Self {
        Self {
            eeg: std::array::from_fn(|_| RingBuffer::new(capacity)),
            ppg: std::array::from_fn(|_| RingBuffer::new(capacity)),
            accelerometer: std::array::from_fn(|_| RingBuffer::new(capacity)),
            gyroscope: std::array::from_fn(|_| RingBuffer::new(capacity)),
        }
    }

    /// EEG samples in µV.
    pub fn eeg(&self, electrode: EegElectrode) -> &RingBuffer<f64> {
        &self.eeg[electrode.index()]
    }

    /// Raw optical samples.
    pub fn ppg(&self, channel: PpgChannel) -> &RingBuffer<u32> {
        &self.ppg[channel.index()]
    }

    /// Acceleration in g.
    pub fn accelerometer(&self, axis: Axis) -> &RingBuffer<f32> {
        &self.accelerometer[axis.index()]
    }

    /// Angular rate in °/s.
    pub fn gyroscope(&self, axis: Axis) -> &RingBuffer<f32> {
        &self.gyroscope[axis.index()]
    }
}

fn write_motion(axes: &mut [RingBuffer<f32>; 3], samples: [XyzSample; 3]) {
    for sample in samples {
        for axis in Axis::ALL {
            axes[axis.index()].write(sample.get(axis));
        }
    }
}

// ── DeviceSession ─────────────────────────────────────────────────────────────

/// Decoded state of one headset behind a [`RadioLink`].
///
/// Calls must be serialised by the caller: the session holds no locks, and
/// every method takes `&mut self` for that reason.  Feed link events in with
/// [`handle_event`](Self::handle_event) and pull samples out with the `read_*`
/// methods.
///
/// ```no_run
/// use muse_session::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let config = LinkConfig::default();
/// let device = BleLink::find_first(&config).await?;
/// let (link, mut events) = BleLink::new(device, config);
/// let mut session = DeviceSession::new(link, SessionConfig::default());
/// session.connect().await?;
///
/// while let Some(event) = events.recv().await {
///     if let Err(e) = session.handle_event(event) {
///         log::warn!("{e}");
///     }
///     while let Some(uv) = session.read_eeg(EegElectrode::Tp9) {
///         println!("{uv:+.2} µV");
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct DeviceSession<L> {
    link: L,
    config: SessionConfig,
    state: SessionState,
    battery_level: Option<f32>,
    control: ControlReassembler,
    buffers: SessionBuffers,
}

impl<L: RadioLink> DeviceSession<L> {
    /// Create an idle session.
    ///
    /// # Panics
    /// Panics if `config.buffer_capacity` is zero.
    pub fn new(link: L, config: SessionConfig) -> Self {
        let buffers = SessionBuffers::new(config.buffer_capacity);
        Self {
            link,
            config,
            state: SessionState::Idle,
            battery_level: None,
            control: ControlReassembler::new(),
            buffers,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Merged key/value pairs from every control reply received so far.
    pub fn info(&self) -> &Map<String, Value> {
        self.control.info()
    }

    /// Last reported battery level, if any telemetry has arrived.
    pub fn battery_level(&self) -> Option<f32> {
        self.battery_level
    }

    pub fn buffers(&self) -> &SessionBuffers {
        &self.buffers
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ── Consumer side ─────────────────────────────────────────────────────────

    /// Pop the oldest EEG sample (µV) for `electrode`.
    pub fn read_eeg(&mut self, electrode: EegElectrode) -> Option<f64> {
        self.buffers.eeg[electrode.index()].read()
    }

    /// Pop the oldest raw optical sample for `channel`.
    pub fn read_ppg(&mut self, channel: PpgChannel) -> Option<u32> {
        self.buffers.ppg[channel.index()].read()
    }

    /// Pop the oldest acceleration sample (g) on `axis`.
    pub fn read_accelerometer(&mut self, axis: Axis) -> Option<f32> {
        self.buffers.accelerometer[axis.index()].read()
    }

    /// Pop the oldest angular-rate sample (°/s) on `axis`.
    pub fn read_gyroscope(&mut self, axis: Axis) -> Option<f32> {
        self.buffers.gyroscope[axis.index()].read()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Connect, subscribe to every channel, and start streaming.
    ///
    /// # Startup sequence
    ///
    /// subscribe ×12 → `h` → *preset* → `s` → `d` → `v1`
    ///
    /// The device is paused before the preset is changed so that it never emits
    /// frames mid-reconfiguration.  Any failure sends the session back to Idle.
    /// Samples, the info map, and the battery level from an earlier connection
    /// are kept; only a half-received control object is dropped.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState {
                op: "connect",
                state: self.state,
            });
        }
        self.state = SessionState::Connecting;

        match self.startup().await {
            Ok(()) => {
                self.state = SessionState::Streaming;
                info!("Session streaming");
                Ok(())
            }
            Err(e) => {
                warn!("Connect failed: {e}");
                if let Err(e) = self.link.disconnect().await {
                    debug!("Teardown after failed connect: {e}");
                }
                self.go_idle();
                Err(e)
            }
        }
    }

    async fn startup(&mut self) -> Result<(), SessionError> {
        self.link.connect().await?;
        for channel in Channel::SUBSCRIPTIONS {
            self.link.subscribe(channel).await?;
        }

        self.write_command(CMD_PAUSE).await?;
        let preset = self.config.preset.clone();
        self.write_command(&preset).await?;
        self.write_command(CMD_START).await?;
        self.write_command(CMD_RESUME).await?;
        self.write_command(CMD_DEVICE_INFO).await
    }

    /// Tear the link down and return to Idle.
    ///
    /// Safe in any state.  Transport errors are logged, not returned: the session
    /// is Idle afterwards either way.
    pub async fn disconnect(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        if let Err(e) = self.link.disconnect().await {
            warn!("Disconnect: {e}");
        }
        self.go_idle();
        info!("Session disconnected");
    }

    /// The transport lost the link on its own.  No commands are sent.
    pub fn on_unsolicited_disconnect(&mut self) {
        if self.state != SessionState::Idle {
            info!("Link dropped while {:?}", self.state);
            self.go_idle();
        }
    }

    fn go_idle(&mut self) {
        // Keep the info map; only a half-received object is stale.
        self.control.reset_fragment();
        self.state = SessionState::Idle;
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    /// Pause data streaming (`h`).
    pub async fn pause(&mut self) -> Result<(), SessionError> {
        self.send_command(CMD_PAUSE).await
    }

    /// Resume data streaming (`d`).
    pub async fn resume(&mut self) -> Result<(), SessionError> {
        self.send_command(CMD_RESUME).await
    }

    /// Ask for firmware / hardware info (`v1`); the reply is merged into [`info`](Self::info).
    pub async fn request_device_info(&mut self) -> Result<(), SessionError> {
        self.send_command(CMD_DEVICE_INFO).await
    }

    /// Send an arbitrary command string.
    pub async fn send_command(&mut self, cmd: &str) -> Result<(), SessionError> {
        if self.state == SessionState::Idle {
            return Err(SessionError::InvalidState {
                op: "send_command",
                state: self.state,
            });
        }
        self.write_command(cmd).await
    }

    async fn write_command(&mut self, cmd: &str) -> Result<(), SessionError> {
        let frame = encode_command(cmd)?;
        debug!("-> {cmd:?}");
        self.link.send(&frame).await?;
        Ok(())
    }

    // ── Inbound ───────────────────────────────────────────────────────────────

    /// Route one link event.
    pub fn handle_event(&mut self, event: LinkEvent) -> Result<(), SessionError> {
        match event {
            LinkEvent::Notification { channel, data } => self.on_notification(channel, &data),
            LinkEvent::Disconnected => {
                self.on_unsolicited_disconnect();
                Ok(())
            }
        }
    }

    /// Decode one notification and store its contents.
    ///
    /// Data frames start with a 2-byte sequence header; control frames do not.
    /// A frame that fails to decode leaves every buffer untouched.
    pub fn on_notification(&mut self, channel: Channel, data: &[u8]) -> Result<(), SessionError> {
        if self.state == SessionState::Idle {
            return Err(SessionError::InvalidState {
                op: "on_notification",
                state: self.state,
            });
        }

        let decode_err = |source| SessionError::Decode { channel, source };
        match channel {
            Channel::Control => {
                let fragment = decode_response(data);
                debug!("Control fragment: {fragment:?}");
                self.control.feed(&fragment)?;
            }
            Channel::Eeg(electrode) => {
                let samples = strip_header(data)
                    .and_then(decode_eeg_samples)
                    .map_err(decode_err)?;
                let buf = &mut self.buffers.eeg[electrode.index()];
                samples.into_iter().for_each(|s| buf.write(s));
            }
            Channel::Ppg(ppg) => {
                let samples = strip_header(data)
                    .and_then(decode_ppg_samples)
                    .map_err(decode_err)?;
                let buf = &mut self.buffers.ppg[ppg.index()];
                samples.into_iter().for_each(|s| buf.write(s));
            }
            Channel::Accelerometer => {
                let samples = strip_header(data)
                    .and_then(parse_accelerometer)
                    .map_err(decode_err)?;
                write_motion(&mut self.buffers.accelerometer, samples);
            }
            Channel::Gyroscope => {
                let samples = strip_header(data)
                    .and_then(parse_gyroscope)
                    .map_err(decode_err)?;
                write_motion(&mut self.buffers.gyroscope, samples);
            }
            Channel::Battery => {
                let level = strip_header(data)
                    .and_then(parse_battery)
                    .map_err(decode_err)?;
                self.battery_level = Some(level);
            }
        }
        Ok(())
    }
}
