//! Binary wire codec for location pings
//!
//! A ping travels as a MessagePack map with exactly four keys, always in the
//! order `v`, `t`, `d`, `m`:
//!
//! - `v`: vid, an 8 character string starting with `N`
//! - `t`: timestamp in milliseconds since epoch; an integer, or a float64 with
//!   no fractional part as JavaScript encoders emit
//! - `d`: packed degree index, `lat_index * 361 + lon_index`
//! - `m`: packed fractional bitfield, latitude milli-units in the top 16 bits and
//!   longitude milli-units in the bottom 16 bits
//!
//! Whole degrees are bias-packed so that both signs fit an unsigned index, see
//! [`unbias`]. A fraction of one milli-unit is 1/60000 of a degree, which keeps
//! decoded coordinates within about 0.000017 degrees (roughly 2 meters).
//!
//! The map must span the whole buffer; trailing bytes are rejected.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::core::{LocationEvent, Position};

/// Map header of a four entry MessagePack map.
pub const FOUR_ENTRY_MAP: u8 = 0x84;
/// Fixstr header of a single character key.
pub const ONE_CHAR_KEY: u8 = 0xA1;
/// Fixstr header of an 8 character string.
pub const VID_HEADER: u8 = 0xA8;
/// Every vid starts with this character.
pub const VID_SENTINEL: u8 = b'N';
pub const VID_LEN: usize = 8;

/// Byte prefix every accepted message starts with: `{ "v": "N…`
pub const WIRE_PREFIX: [u8; 5] = [FOUR_ENTRY_MAP, ONE_CHAR_KEY, b'v', VID_HEADER, VID_SENTINEL];

/// The largest well-formed message is 37 bytes; anything past this is rejected unparsed.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64;

pub const LAT_BOUND: u32 = 90;
pub const LON_BOUND: u32 = 180;
/// Number of longitude indices, `2 * LON_BOUND + 1`.
pub const DEGREE_RADIX: u32 = 2 * LON_BOUND + 1;

const MILLIS_PER_UNIT: f64 = 1000.0;
const UNITS_PER_DEGREE: f64 = 60.0;

/// Structural failures: the bytes are not a well-formed ping.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("empty message")]
    Empty,

    #[error("message of {len} bytes exceeds the {max} byte limit")]
    Oversized { len: usize, max: usize },

    #[error("message of {len} bytes is shorter than the wire prefix")]
    Truncated { len: usize },

    #[error("expected byte {expected:#04x} at offset {offset}, found {found:#04x}")]
    PrefixMismatch { offset: usize, expected: u8, found: u8 },

    #[error("{extra} trailing bytes after the message")]
    TrailingBytes { extra: usize },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("degree index {index} outside the packed range for bound {bound}")]
    DegreeIndexOutOfRange { index: u32, bound: u32 },
}

/// Semantic failures: the message parsed but its values are unusable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("vid is empty")]
    EmptyVid,

    #[error("vid '{0}' must be 8 characters starting with 'N'")]
    MalformedVid(String),

    #[error("timestamp is missing or zero")]
    MissingTimestamp,

    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("coordinates (0, 0) are not accepted")]
    NullIsland,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("encode error: {0}")]
    Encode(String),
}

/// Fields as they appear on the wire, before any interpretation.
#[derive(Debug, Deserialize)]
struct RawMessage {
    v: Option<String>,
    #[serde(default, deserialize_with = "integral_millis")]
    t: Option<i64>,
    d: Option<u32>,
    m: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Integer(i64),
    Float(f64),
}

/// Largest magnitude at which every integer is exactly representable as f64.
const MAX_EXACT_FLOAT_MILLIS: f64 = 9_007_199_254_740_992.0;

fn integral_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match WireTimestamp::deserialize(deserializer)? {
        WireTimestamp::Integer(millis) => Ok(Some(millis)),
        WireTimestamp::Float(millis)
            if millis.fract() == 0.0 && millis.abs() <= MAX_EXACT_FLOAT_MILLIS =>
        {
            Ok(Some(millis as i64))
        }
        WireTimestamp::Float(millis) => {
            Err(D::Error::custom(format!("timestamp {} is not a whole number of milliseconds", millis)))
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    v: &'a str,
    t: i64,
    d: u32,
    m: u32,
}

/// Cheap structural check run before the full parse.
pub fn check_prefix(buffer: &[u8], max_message_bytes: usize) -> Result<(), DecodeError> {
    if buffer.is_empty() {
        return Err(DecodeError::Empty);
    }
    if buffer.len() > max_message_bytes {
        return Err(DecodeError::Oversized { len: buffer.len(), max: max_message_bytes });
    }
    if buffer.len() < WIRE_PREFIX.len() {
        return Err(DecodeError::Truncated { len: buffer.len() });
    }

    for (offset, (&expected, &found)) in WIRE_PREFIX.iter().zip(buffer).enumerate() {
        if expected != found {
            return Err(DecodeError::PrefixMismatch { offset, expected, found });
        }
    }
    Ok(())
}

/// Recovers a signed whole-plus-fraction degree value in `[-bound, bound]`.
///
/// Indices `0..bound` encode positive values as `index + 1 - fraction`.
/// Indices `bound..=2*bound` encode `-((index - bound) - fraction)`, where a
/// zero result is returned as positive zero.
pub fn unbias(index: u32, fraction: f64, bound: u32) -> Result<f64, DecodeError> {
    if index < bound {
        Ok(f64::from(index + 1) - fraction)
    } else if index <= 2 * bound {
        let magnitude = f64::from(index - bound) - fraction;
        if magnitude == 0.0 {
            Ok(0.0)
        } else {
            Ok(-magnitude)
        }
    } else {
        Err(DecodeError::DegreeIndexOutOfRange { index, bound })
    }
}

/// Inverse of [`unbias`]: splits `value` into a packed index and a fraction in `[0, 1)`.
pub fn bias(value: f64, bound: u32) -> (u32, f64) {
    if value > 0.0 {
        let whole = value.ceil();
        (whole as u32 - 1, whole - value)
    } else {
        let magnitude = -value;
        let whole = magnitude.ceil();
        (bound + whole as u32, whole - magnitude)
    }
}

fn fraction_from_millis(millis: u32) -> f64 {
    (f64::from(millis) / MILLIS_PER_UNIT) / UNITS_PER_DEGREE
}

fn millis_from_fraction(fraction: f64) -> u32 {
    (fraction * UNITS_PER_DEGREE * MILLIS_PER_UNIT).round() as u32
}

/// Decodes and validates a ping using the default size limit.
pub fn decode(buffer: &[u8]) -> Result<LocationEvent, CodecError> {
    decode_with_limit(buffer, DEFAULT_MAX_MESSAGE_BYTES)
}

/// Decodes and validates a ping. Pure: no I/O and no side effects.
pub fn decode_with_limit(
    buffer: &[u8],
    max_message_bytes: usize,
) -> Result<LocationEvent, CodecError> {
    check_prefix(buffer, max_message_bytes)?;

    let mut rest = buffer;
    let raw = RawMessage::deserialize(&mut rmp_serde::Deserializer::new(&mut rest))
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    if !rest.is_empty() {
        return Err(DecodeError::TrailingBytes { extra: rest.len() }.into());
    }

    let vid = raw.v.ok_or(DecodeError::MissingField("v"))?;
    let timestamp = raw.t.ok_or(DecodeError::MissingField("t"))?;
    let degrees = raw.d.ok_or(DecodeError::MissingField("d"))?;
    let millis = raw.m.ok_or(DecodeError::MissingField("m"))?;

    let lat_fraction = fraction_from_millis((millis >> 16) & 0xFFFF);
    let lon_fraction = fraction_from_millis(millis & 0xFFFF);
    let lat = unbias(degrees / DEGREE_RADIX, lat_fraction, LAT_BOUND)?;
    let lon = unbias(degrees % DEGREE_RADIX, lon_fraction, LON_BOUND)?;

    let event = LocationEvent { vid, timestamp, position: Position { lon, lat } };
    validate(&event)?;
    Ok(event)
}

/// Range checks shared by the decoder and the encoder.
pub fn validate(event: &LocationEvent) -> Result<(), ValidationError> {
    if event.vid.is_empty() {
        return Err(ValidationError::EmptyVid);
    }
    if event.timestamp == 0 {
        return Err(ValidationError::MissingTimestamp);
    }

    let Position { lon, lat } = event.position;
    if !(-90.0..=90.0).contains(&lat) {
        return Err(ValidationError::LatitudeOutOfRange(lat));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(ValidationError::LongitudeOutOfRange(lon));
    }
    if event.position.is_null_island() {
        return Err(ValidationError::NullIsland);
    }
    Ok(())
}

/// Encodes an event into the wire format accepted by [`decode`].
pub fn encode(event: &LocationEvent) -> Result<Vec<u8>, CodecError> {
    let vid_ok = event.vid.len() == VID_LEN && event.vid.as_bytes().first() == Some(&VID_SENTINEL);
    if !vid_ok {
        return Err(ValidationError::MalformedVid(event.vid.clone()).into());
    }
    validate(event)?;

    let (lat_index, lat_fraction) = bias(event.position.lat, LAT_BOUND);
    let (lon_index, lon_fraction) = bias(event.position.lon, LON_BOUND);
    let message = WireMessage {
        v: &event.vid,
        t: event.timestamp,
        d: lat_index * DEGREE_RADIX + lon_index,
        m: (millis_from_fraction(lat_fraction) << 16) | millis_from_fraction(lon_fraction),
    };

    rmp_serde::to_vec_named(&message).map_err(|e| CodecError::Encode(e.to_string()))
}
