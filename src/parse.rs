//! Binary decoders for Muse notification payloads.
//!
//! Every function here is pure and operates on the payload **after** the
//! 2-byte sequence header; use [`strip_header`] to get there.  Packed decoders
//! require whole groups and return [`DecodeError::Misaligned`] otherwise rather
//! than decoding a partial tail.
//!
//! | Function | Sensor | Format |
//! |---|---|---|
//! | [`decode_eeg_samples`] | EEG | 12-bit BE packed, 0.48828125 µV/LSB around 2048 |
//! | [`decode_ppg_samples`] | PPG | 24-bit BE unsigned, unscaled |
//! | [`parse_accelerometer`] | Accel | 3 × i16 BE XYZ, 0.0000610352 g/LSB |
//! | [`parse_gyroscope`] | Gyro | 3 × i16 BE XYZ, 0.0074768 °/s/LSB |
//! | [`parse_battery`] | Battery | u16 BE ÷ 512 |

use crate::error::DecodeError;
use crate::protocol::{
    ACCELEROMETER_SCALE, BATTERY_DIVISOR, EEG_OFFSET, EEG_SCALE, GYROSCOPE_SCALE, HEADER_LEN,
};
use crate::types::XyzSample;

/// Payload bytes for the three XYZ samples of a motion notification.
const MOTION_PAYLOAD_LEN: usize = 18;

/// Bytes between consecutive XYZ samples.
const MOTION_STRIDE: usize = 6;

/// Return the payload of a data notification, without its sequence header.
pub fn strip_header(frame: &[u8]) -> Result<&[u8], DecodeError> {
    frame.get(HEADER_LEN..).ok_or(DecodeError::Truncated {
        got: frame.len(),
        need: HEADER_LEN,
    })
}

fn check_groups(data: &[u8], group: usize) -> Result<(), DecodeError> {
    if data.len() % group != 0 {
        return Err(DecodeError::Misaligned {
            len: data.len(),
            group,
        });
    }
    Ok(())
}

// ── EEG ──────────────────────────────────────────────────────────────────────

/// Unpack 12-bit unsigned values, two per 3-byte group (big-endian, high nibble first).
///
/// ```text
/// [AA BB CC] → value0 = (AA << 4) | (BB >> 4)
///              value1 = ((BB & 0x0F) << 8) | CC
/// ```
///
/// ```
/// # use muse_session::parse::decode_unsigned_12bit;
/// assert_eq!(decode_unsigned_12bit(&[0x01, 0x02, 0x03]).unwrap(), [0x010, 0x203]);
/// ```
pub fn decode_unsigned_12bit(data: &[u8]) -> Result<Vec<u16>, DecodeError> {
    check_groups(data, 3)?;
    let mut out = Vec::with_capacity(data.len() / 3 * 2);
    for g in data.chunks_exact(3) {
        let (a, b, c) = (g[0] as u16, g[1] as u16, g[2] as u16);
        out.push((a << 4) | (b >> 4));
        out.push(((b & 0x0F) << 8) | c);
    }
    Ok(out)
}

/// Convert a 12-bit EEG code to microvolts: `(raw − 2048) × 0.48828125`.
pub fn eeg_scale(raw: u16) -> f64 {
    EEG_SCALE * (raw as f64 - EEG_OFFSET as f64)
}

/// Decode an EEG payload into µV.  A standard 18-byte payload yields 12 samples.
pub fn decode_eeg_samples(data: &[u8]) -> Result<Vec<f64>, DecodeError> {
    Ok(decode_unsigned_12bit(data)?.into_iter().map(eeg_scale).collect())
}

// ── PPG ──────────────────────────────────────────────────────────────────────

/// Unpack 24-bit unsigned big-endian values, one per 3-byte group.
pub fn decode_unsigned_24bit(data: &[u8]) -> Result<Vec<u32>, DecodeError> {
    check_groups(data, 3)?;
    Ok(data
        .chunks_exact(3)
        .map(|c| ((c[0] as u32) << 16) | ((c[1] as u32) << 8) | (c[2] as u32))
        .collect())
}

/// Decode a PPG payload into raw ADC units (no scaling is applied).
pub fn decode_ppg_samples(data: &[u8]) -> Result<Vec<u32>, DecodeError> {
    decode_unsigned_24bit(data)
}

// ── IMU ───────────────────────────────────────────────────────────────────────

fn read_i16_be(data: &[u8], offset: usize) -> i16 {
    i16::from_be_bytes([data[offset], data[offset + 1]])
}

/// Shared decoder for accelerometer and gyroscope payloads.
///
/// Three XYZ samples of big-endian `i16` at payload offsets 0, 6, and 12, each
/// component multiplied by `scale`.  Index 0 is the oldest sample.
fn parse_motion(data: &[u8], scale: f32) -> Result<[XyzSample; 3], DecodeError> {
    if data.len() < MOTION_PAYLOAD_LEN {
        return Err(DecodeError::Truncated {
            got: data.len(),
            need: MOTION_PAYLOAD_LEN,
        });
    }
    let sample = |off: usize| XyzSample {
        x: scale * read_i16_be(data, off) as f32,
        y: scale * read_i16_be(data, off + 2) as f32,
        z: scale * read_i16_be(data, off + 4) as f32,
    };
    Ok([
        sample(0),
        sample(MOTION_STRIDE),
        sample(2 * MOTION_STRIDE),
    ])
}

/// Decode an accelerometer payload into g.
pub fn parse_accelerometer(data: &[u8]) -> Result<[XyzSample; 3], DecodeError> {
    parse_motion(data, ACCELEROMETER_SCALE)
}

/// Decode a gyroscope payload into °/s.
pub fn parse_gyroscope(data: &[u8]) -> Result<[XyzSample; 3], DecodeError> {
    parse_motion(data, GYROSCOPE_SCALE)
}

// ── Battery ───────────────────────────────────────────────────────────────────

/// Decode the battery level from the first big-endian `u16` of the payload.
///
/// The remaining telemetry fields (fuel gauge, temperature) are not used.
pub fn parse_battery(data: &[u8]) -> Result<f32, DecodeError> {
    match data {
        [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo]) as f32 / BATTERY_DIVISOR),
        _ => Err(DecodeError::Truncated {
            got: data.len(),
            need: 2,
        }),
    }
}
