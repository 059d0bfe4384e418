//! Time-sortable record identifiers.
//!
//! Layout of the 64-bit value:
//!
//! ```text
//! bit 63      always 0
//! bits 62..20 milliseconds since 2024-01-01T00:00:00Z
//! bits 19..4  random / per-millisecond counter
//! bits 3..0   format version
//! ```
//!
//! The text form is 11 characters over an alphabet laid out in ASCII order,
//! so comparing two encoded ids as strings gives the same answer as comparing
//! the numbers.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// 2024-01-01T00:00:00Z in milliseconds since the UNIX epoch.
pub const EPOCH_MS: i64 = 1_704_067_200_000;

/// Current identifier format version.
pub const ID_VERSION: u64 = 1;

const ENCODED_LEN: usize = 11;
const ALPHABET: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";
const TIME_BITS: u64 = (1 << 43) - 1;
const COUNTER_STEP: u64 = 1 << 4;

static LAST_ISSUED: AtomicU64 = AtomicU64::new(0);

/// Opaque, sortable, process-monotonic identifier.
///
/// The zero value means "unset" (or "root" for parent references) and
/// serializes as the empty string.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(u64);

impl Id {
    /// The unset identifier.
    pub const ZERO: Self = Self(0);

    /// Issue a new identifier.
    ///
    /// Identifiers issued by one process are strictly increasing, even when
    /// many are issued within the same millisecond or the wall clock steps
    /// backwards.
    pub fn new() -> Self {
        let candidate = Self::from_parts(Utc::now(), rand::random::<u16>()).0;
        let mut last = LAST_ISSUED.load(Ordering::Relaxed);
        loop {
            let next = if candidate > last {
                candidate
            } else {
                last + COUNTER_STEP
            };
            match LAST_ISSUED.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return Self(next),
                Err(actual) => last = actual,
            }
        }
    }

    /// Build an identifier for a specific instant and counter value.
    ///
    /// Instants before the 2024 epoch clamp to zero milliseconds.
    pub fn from_parts(at: DateTime<Utc>, counter: u16) -> Self {
        let ms = (at.timestamp_millis() - EPOCH_MS).max(0) as u64 & TIME_BITS;
        Self((ms << 20) | (u64::from(counter) << 4) | ID_VERSION)
    }

    /// Wrap a raw value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw 64-bit value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Instant encoded in the identifier.
    pub fn timestamp(&self) -> DateTime<Utc> {
        let ms = (self.0 >> 20) as i64 + EPOCH_MS;
        Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
    }

    /// Random / counter bits.
    pub fn counter(&self) -> u16 {
        ((self.0 >> 4) & 0xFFFF) as u16
    }

    /// Format version bits.
    pub fn version(&self) -> u8 {
        (self.0 & 0xF) as u8
    }

    /// Fixed-width 11-character encoding.
    pub fn encode(&self) -> String {
        let mut buf = [0u8; ENCODED_LEN];
        let mut v = self.0;
        for slot in buf.iter_mut().rev() {
            *slot = ALPHABET[(v & 0x3F) as usize];
            v >>= 6;
        }
        buf.iter().map(|&b| b as char).collect()
    }

    /// Parse the 11-character encoding. The empty string decodes to zero.
    pub fn decode(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() {
            return Ok(Self::ZERO);
        }
        if s.len() != ENCODED_LEN {
            return Err(TypeError::InvalidId(format!(
                "expected {ENCODED_LEN} characters, got {}",
                s.len()
            )));
        }
        let mut v: u64 = 0;
        for (pos, c) in s.bytes().enumerate() {
            let digit = decode_char(c).ok_or_else(|| {
                TypeError::InvalidId(format!("invalid character {:?} at position {pos}", c as char))
            })?;
            v = (v << 6) | u64::from(digit);
        }
        Ok(Self(v))
    }
}

fn decode_char(c: u8) -> Option<u8> {
    match c {
        b'-' => Some(0),
        b'0'..=b'9' => Some(c - b'0' + 1),
        b'A'..=b'Z' => Some(c - b'A' + 11),
        b'_' => Some(37),
        b'a'..=b'z' => Some(c - b'a' + 38),
        _ => None,
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.encode())
    }
}

impl FromStr for Id {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_zero() {
            serializer.serialize_str("")
        } else {
            serializer.serialize_str(&self.encode())
        }
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = Id;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an 11-character identifier or an empty string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Id, E> {
                Id::decode(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(IdVisitor)
    }
}
