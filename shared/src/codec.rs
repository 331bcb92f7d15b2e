//! Delta update codec.
//!
//! Every changed player is written as one fixed-arity record of
//! comma-terminated fields:
//!
//! ```text
//! id,dead,zone,damaged,fired,hit,x,y,
//! ```
//!
//! Integers are base-36 text and positions are rounded to whole units. A
//! buffer is a plain concatenation of records. Changing the arity breaks
//! every deployed client.

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of fields in one record.
pub const RECORD_ARITY: usize = 8;

/// Field terminator.
pub const DELIMITER: char = ',';

/// Sentinel for "no projectile this tick".
pub const NO_PROJECTILE: i32 = -1;

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("record {index}: field '{field}' has invalid value '{value}'")]
    InvalidField {
        index: usize,
        field: &'static str,
        value: String,
    },
    #[error("buffer ends with a partial record of {fields} fields")]
    TruncatedRecord { fields: usize },
}

/// One player's per-tick delta as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub id: u32,
    pub dead: bool,
    pub zone_id: String,
    pub damaged: bool,
    pub fired_projectile: i32,
    pub hit_projectile: i32,
    pub x: i64,
    pub y: i64,
}

impl UpdateRecord {
    pub fn fired(&self) -> Option<u32> {
        u32::try_from(self.fired_projectile).ok()
    }

    pub fn hit(&self) -> Option<u32> {
        u32::try_from(self.hit_projectile).ok()
    }
}

/// Formats a signed integer in base 36 with lowercase digits.
pub fn to_base36(value: i64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }

    let negative = value < 0;
    let mut n = value.unsigned_abs();
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    if negative {
        buf.push(b'-');
    }
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn from_base36(text: &str) -> Option<i64> {
    i64::from_str_radix(text, 36).ok()
}

/// Rounds a world coordinate to the integer that goes on the wire.
pub fn round_coord(value: f32) -> i64 {
    value.round() as i64
}

/// Appends one record to `out`.
pub fn encode_into(record: &UpdateRecord, out: &mut String) {
    let fields = [
        to_base36(record.id as i64),
        flag(record.dead).to_string(),
        record.zone_id.clone(),
        flag(record.damaged).to_string(),
        to_base36(record.fired_projectile as i64),
        to_base36(record.hit_projectile as i64),
        to_base36(record.x),
        to_base36(record.y),
    ];
    for field in fields {
        out.push_str(&field);
        out.push(DELIMITER);
    }
}

pub fn encode(record: &UpdateRecord) -> String {
    let mut out = String::new();
    encode_into(record, &mut out);
    out
}

/// Concatenates the records of several players into one buffer.
pub fn encode_all<'a, I>(records: I) -> String
where
    I: IntoIterator<Item = &'a UpdateRecord>,
{
    let mut out = String::new();
    for record in records {
        encode_into(record, &mut out);
    }
    out
}

/// Strict decoder: any malformed field or partial record is an error.
pub fn try_decode(buffer: &str) -> Result<Vec<UpdateRecord>, CodecError> {
    let fields = split_fields(buffer);
    if fields.len() % RECORD_ARITY != 0 {
        return Err(CodecError::TruncatedRecord {
            fields: fields.len() % RECORD_ARITY,
        });
    }

    fields
        .chunks(RECORD_ARITY)
        .enumerate()
        .map(|(index, chunk)| parse_record(index, chunk))
        .collect()
}

/// Lenient decoder used on the receive path.
///
/// Malformed records are logged and skipped, so a bad buffer degrades to
/// "fewer updates this tick". Empty input gives an empty list.
pub fn decode(buffer: &str) -> Vec<UpdateRecord> {
    let fields = split_fields(buffer);
    let mut records = Vec::with_capacity(fields.len() / RECORD_ARITY);

    for (index, chunk) in fields.chunks(RECORD_ARITY).enumerate() {
        if chunk.len() < RECORD_ARITY {
            warn!(
                "Dropping partial update record with {} of {} fields",
                chunk.len(),
                RECORD_ARITY
            );
            break;
        }
        match parse_record(index, chunk) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping malformed update record: {}", e),
        }
    }

    records
}

fn split_fields(buffer: &str) -> Vec<&str> {
    if buffer.is_empty() {
        return Vec::new();
    }
    let mut fields: Vec<&str> = buffer.split(DELIMITER).collect();
    // Every record ends with a delimiter, leaving one empty tail entry.
    if fields.last().is_some_and(|last| last.is_empty()) {
        fields.pop();
    }
    fields
}

fn parse_record(index: usize, chunk: &[&str]) -> Result<UpdateRecord, CodecError> {
    let invalid = |field: &'static str, value: &str| CodecError::InvalidField {
        index,
        field,
        value: value.to_string(),
    };

    let id = from_base36(chunk[0])
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| invalid("id", chunk[0]))?;
    let dead = parse_flag(chunk[1]).ok_or_else(|| invalid("dead", chunk[1]))?;
    if chunk[2].is_empty() {
        return Err(invalid("zone", chunk[2]));
    }
    let damaged = parse_flag(chunk[3]).ok_or_else(|| invalid("damaged", chunk[3]))?;
    let fired_projectile = from_base36(chunk[4])
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| invalid("fired", chunk[4]))?;
    let hit_projectile = from_base36(chunk[5])
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| invalid("hit", chunk[5]))?;
    let x = from_base36(chunk[6]).ok_or_else(|| invalid("x", chunk[6]))?;
    let y = from_base36(chunk[7]).ok_or_else(|| invalid("y", chunk[7]))?;

    Ok(UpdateRecord {
        id,
        dead,
        zone_id: chunk[2].to_string(),
        damaged,
        fired_projectile,
        hit_projectile,
        x,
        y,
    })
}

fn flag(value: bool) -> u8 {
    if value {
        1
    } else {
        0
    }
}

fn parse_flag(text: &str) -> Option<bool> {
    match text {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}
