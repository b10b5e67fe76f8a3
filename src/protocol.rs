//! GATT UUIDs, scale constants, and control-channel framing for Muse headsets.
//!
//! All characteristic UUIDs belong to the Muse vendor namespace
//! `273eXXXX-4c4d-454d-96be-f03bac821358`.

use uuid::Uuid;

use crate::error::CommandError;

// ── Service ──────────────────────────────────────────────────────────────────

/// Primary GATT service UUID (`0xfe8d`) advertised by every Muse headset.
pub const MUSE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000fe8d_0000_1000_8000_00805f9b34fb);

// ── Characteristics ───────────────────────────────────────────────────────────

/// Bidirectional control channel.
///
/// The host writes frames built by [`encode_command`]; the headset answers with
/// length-prefixed JSON fragments read by [`decode_response`].
pub const CONTROL_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x273e0001_4c4d_454d_96be_f03bac821358);

/// Battery telemetry, notified roughly once per second.
pub const TELEMETRY_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x273e000b_4c4d_454d_96be_f03bac821358);

pub const GYROSCOPE_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x273e0009_4c4d_454d_96be_f03bac821358);

pub const ACCELEROMETER_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x273e000a_4c4d_454d_96be_f03bac821358);

/// EEG characteristics in electrode order: TP9, AF7, AF8, TP10, AUX.
pub const EEG_CHARACTERISTICS: [Uuid; 5] = [
    Uuid::from_u128(0x273e0003_4c4d_454d_96be_f03bac821358),
    Uuid::from_u128(0x273e0004_4c4d_454d_96be_f03bac821358),
    Uuid::from_u128(0x273e0005_4c4d_454d_96be_f03bac821358),
    Uuid::from_u128(0x273e0006_4c4d_454d_96be_f03bac821358),
    Uuid::from_u128(0x273e0007_4c4d_454d_96be_f03bac821358),
];

/// PPG characteristics in channel order: ambient, infrared, red.
pub const PPG_CHARACTERISTICS: [Uuid; 3] = [
    Uuid::from_u128(0x273e000f_4c4d_454d_96be_f03bac821358),
    Uuid::from_u128(0x273e0010_4c4d_454d_96be_f03bac821358),
    Uuid::from_u128(0x273e0011_4c4d_454d_96be_f03bac821358),
];

// ── Labels ────────────────────────────────────────────────────────────────────

pub const EEG_CHANNEL_NAMES: [&str; 5] = ["TP9", "AF7", "AF8", "TP10", "AUX"];

pub const PPG_CHANNEL_NAMES: [&str; 3] = ["ambient", "infrared", "red"];

// ── Framing and scaling ───────────────────────────────────────────────────────

/// Sequence-number header at the start of every data notification.
pub const HEADER_LEN: usize = 2;

/// Mid-scale code of the 12-bit EEG ADC.
pub const EEG_OFFSET: u16 = 0x800;

/// µV per LSB of the 12-bit EEG ADC.
pub const EEG_SCALE: f64 = 0.48828125;

/// g per LSB (±2 g full scale over a signed 16-bit range).
pub const ACCELEROMETER_SCALE: f32 = 0.0000610352;

/// °/s per LSB (±245 dps full scale over a signed 16-bit range).
pub const GYROSCOPE_SCALE: f32 = 0.0074768;

/// Raw battery reading divided by this yields the charge level.
pub const BATTERY_DIVISOR: f32 = 512.0;

/// Ring-buffer capacity per channel.
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;

/// Longest command whose frame length still fits the single length byte.
pub const MAX_COMMAND_LEN: usize = 253;

// ── Commands ──────────────────────────────────────────────────────────────────

/// Stop the data stream.
pub const CMD_PAUSE: &str = "h";
/// Resume the data stream.
pub const CMD_RESUME: &str = "d";
/// Start acquisition.
pub const CMD_START: &str = "s";
/// Ask for firmware and hardware info; the reply lands in the info map.
pub const CMD_DEVICE_INFO: &str = "v1";
/// Channel preset with EEG and PPG enabled.
pub const PRESET_EEG_PPG: &str = "p50";

/// Encode a text command for the control characteristic.
///
/// ```text
/// byte 0     : number of bytes that follow (= cmd.len() + 1)
/// bytes 1..N : command text
/// byte N+1   : '\n'
/// ```
///
/// # Example
///
/// ```
/// # use muse_session::protocol::encode_command;
/// assert_eq!(encode_command("v1").unwrap(), [0x03, b'v', b'1', b'\n']);
/// ```
pub fn encode_command(cmd: &str) -> Result<Vec<u8>, CommandError> {
    if cmd.len() > MAX_COMMAND_LEN {
        return Err(CommandError::TooLong {
            len: cmd.len(),
            max: MAX_COMMAND_LEN,
        });
    }
    let mut frame = Vec::with_capacity(cmd.len() + 2);
    frame.push((cmd.len() + 1) as u8);
    frame.extend_from_slice(cmd.as_bytes());
    frame.push(b'\n');
    Ok(frame)
}

/// Decode one control notification into its text fragment.
///
/// ```text
/// byte 0     : L, the fragment length
/// bytes 1..L : UTF-8 fragment
/// ```
///
/// Bytes after the first `L` are padding and are ignored.  A length running past
/// the end of the frame is clamped, invalid UTF-8 is replaced lossily, and an
/// empty frame yields an empty string.
pub fn decode_response(bytes: &[u8]) -> String {
    let Some((&len, rest)) = bytes.split_first() else {
        return String::new();
    };
    let end = (len as usize).min(rest.len());
    String::from_utf8_lossy(&rest[..end]).into_owned()
}
