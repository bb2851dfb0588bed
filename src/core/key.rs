//! Purpose: Model row-key types and values and encode them into store byte keys.
//! Exports: `KeyType`, `KeyValue`, `Number`, `KeyEncoder`, `OrderedKeyEncoder`.
//! Role: The byte-order policy consumed by the boundary resolver and callers with raw keys.
//! Invariants: Encoding is deterministic and side-effect free.
//! Invariants: `OrderedKeyEncoder` output sorts byte-wise in the same order as the values.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyType {
    String,
    Binary,
    Integer,
    UnsignedInteger,
    Long,
    UnsignedLong,
    Float,
    Double,
    Date,
    UnsignedDate,
}

impl KeyType {
    pub const ALL: [KeyType; 10] = [
        KeyType::String,
        KeyType::Binary,
        KeyType::Integer,
        KeyType::UnsignedInteger,
        KeyType::Long,
        KeyType::UnsignedLong,
        KeyType::Float,
        KeyType::Double,
        KeyType::Date,
        KeyType::UnsignedDate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::String => "STRING",
            KeyType::Binary => "BINARY",
            KeyType::Integer => "INTEGER",
            KeyType::UnsignedInteger => "UNSIGNED_INTEGER",
            KeyType::Long => "LONG",
            KeyType::UnsignedLong => "UNSIGNED_LONG",
            KeyType::Float => "FLOAT",
            KeyType::Double => "DOUBLE",
            KeyType::Date => "DATE",
            KeyType::UnsignedDate => "UNSIGNED_DATE",
        }
    }

    pub fn is_date(self) -> bool {
        matches!(self, KeyType::Date | KeyType::UnsignedDate)
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().replace('-', "_").to_ascii_uppercase();
        KeyType::ALL
            .into_iter()
            .find(|key_type| key_type.as_str() == normalized)
            .ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("unknown key type '{input}'"))
                    .with_hint("Use one of: string, binary, integer, unsigned_integer, long, unsigned_long, float, double, date, unsigned_date.")
            })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    Long(i64),
    Double(f64),
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Long(value) => write!(f, "{value}"),
            Number::Double(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum KeyValue {
    Text(String),
    Number(Number),
    Date(OffsetDateTime),
}

pub trait KeyEncoder: Send + Sync {
    fn encode(&self, value: &KeyValue, key_type: KeyType) -> Result<Vec<u8>, Error>;
}

/// Byte-order policy where signed values get their sign bit flipped so that
/// negative keys sort before positive ones.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrderedKeyEncoder;

const SIGN_FLIP_32: u32 = 1u32 << 31;
const SIGN_FLIP_64: u64 = 1u64 << 63;

impl KeyEncoder for OrderedKeyEncoder {
    fn encode(&self, value: &KeyValue, key_type: KeyType) -> Result<Vec<u8>, Error> {
        match key_type {
            KeyType::String => Ok(render_text(value)?.into_bytes()),
            KeyType::Binary => match value {
                KeyValue::Text(text) => hex::decode(text).map_err(|err| {
                    Error::new(ErrorKind::Parse)
                        .with_message("binary key is not valid hex")
                        .with_literal(text.clone())
                        .with_source(err)
                }),
                _ => Err(Error::new(ErrorKind::Usage)
                    .with_message("binary keys must be given as hex text")),
            },
            KeyType::Integer => {
                let value = to_i64(value, key_type)?;
                let value = i32::try_from(value).map_err(|_| out_of_range(value, key_type))?;
                Ok(((value as u32) ^ SIGN_FLIP_32).to_be_bytes().to_vec())
            }
            KeyType::UnsignedInteger => {
                let value = to_i64(value, key_type)?;
                let value = u32::try_from(value).map_err(|_| out_of_range(value, key_type))?;
                Ok(value.to_be_bytes().to_vec())
            }
            KeyType::Long => Ok(encode_i64_ordered(to_i64(value, key_type)?).to_vec()),
            KeyType::UnsignedLong => {
                let value = to_i64(value, key_type)?;
                let value = u64::try_from(value).map_err(|_| out_of_range(value, key_type))?;
                Ok(value.to_be_bytes().to_vec())
            }
            KeyType::Float => {
                let value = to_f64(value, key_type)? as f32;
                Ok(encode_f32_ordered(value).to_vec())
            }
            KeyType::Double => Ok(encode_f64_ordered(to_f64(value, key_type)?).to_vec()),
            KeyType::Date => Ok(encode_i64_ordered(to_epoch_millis(value)?).to_vec()),
            KeyType::UnsignedDate => {
                let millis = to_epoch_millis(value)?;
                let millis = u64::try_from(millis).map_err(|_| {
                    Error::new(ErrorKind::Parse)
                        .with_message("unsigned date keys cannot precede the epoch")
                })?;
                Ok(millis.to_be_bytes().to_vec())
            }
        }
    }
}

pub fn encode_i64_ordered(value: i64) -> [u8; 8] {
    ((value as u64) ^ SIGN_FLIP_64).to_be_bytes()
}

fn encode_f32_ordered(value: f32) -> [u8; 4] {
    let bits = value.to_bits();
    let ordered = if bits & SIGN_FLIP_32 != 0 {
        !bits
    } else {
        bits ^ SIGN_FLIP_32
    };
    ordered.to_be_bytes()
}

fn encode_f64_ordered(value: f64) -> [u8; 8] {
    let bits = value.to_bits();
    let ordered = if bits & SIGN_FLIP_64 != 0 {
        !bits
    } else {
        bits ^ SIGN_FLIP_64
    };
    ordered.to_be_bytes()
}

fn render_text(value: &KeyValue) -> Result<String, Error> {
    match value {
        KeyValue::Text(text) => Ok(text.clone()),
        KeyValue::Number(number) => Ok(number.to_string()),
        KeyValue::Date(date) => date.format(&Rfc3339).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to render date key")
                .with_source(err)
        }),
    }
}

fn to_i64(value: &KeyValue, key_type: KeyType) -> Result<i64, Error> {
    match value {
        KeyValue::Text(text) => text.trim().parse::<i64>().map_err(|err| {
            Error::new(ErrorKind::Parse)
                .with_message(format!("'{text}' is not a valid {key_type} key"))
                .with_literal(text.clone())
                .with_source(err)
        }),
        KeyValue::Number(Number::Long(value)) => Ok(*value),
        KeyValue::Number(Number::Double(value)) => double_to_i64(*value, key_type),
        KeyValue::Date(date) => Ok(epoch_millis(*date)),
    }
}

fn double_to_i64(value: f64, key_type: KeyType) -> Result<i64, Error> {
    let truncated = value.trunc();
    // i64::MAX is not representable as f64; 2^63 is the first value past it.
    if !truncated.is_finite() || truncated < i64::MIN as f64 || truncated >= 9.223_372_036_854_775_808e18
    {
        return Err(Error::new(ErrorKind::Parse)
            .with_message(format!("{value} does not fit a {key_type} key")));
    }
    Ok(truncated as i64)
}

fn to_f64(value: &KeyValue, key_type: KeyType) -> Result<f64, Error> {
    match value {
        KeyValue::Text(text) => text.trim().parse::<f64>().map_err(|err| {
            Error::new(ErrorKind::Parse)
                .with_message(format!("'{text}' is not a valid {key_type} key"))
                .with_literal(text.clone())
                .with_source(err)
        }),
        KeyValue::Number(Number::Long(value)) => Ok(*value as f64),
        KeyValue::Number(Number::Double(value)) => Ok(*value),
        KeyValue::Date(date) => Ok(epoch_millis(*date) as f64),
    }
}

fn to_epoch_millis(value: &KeyValue) -> Result<i64, Error> {
    match value {
        KeyValue::Date(date) => Ok(epoch_millis(*date)),
        other => to_i64(other, KeyType::Date),
    }
}

pub fn epoch_millis(date: OffsetDateTime) -> i64 {
    date.unix_timestamp_nanos().div_euclid(1_000_000) as i64
}

fn out_of_range(value: i64, key_type: KeyType) -> Error {
    Error::new(ErrorKind::Parse).with_message(format!("{value} does not fit a {key_type} key"))
}
