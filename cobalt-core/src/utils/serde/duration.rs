//! Queue timing parameters as human-readable durations.
//!
//! Accepts friendly strings (`"5ms"`, `"1s 500ms"`) or ISO 8601 (`"PT0.005S"`) through
//! `jiff::SignedDuration`, and bare integers as nanoseconds. Always written back in the
//! friendly form.
use std::fmt;
use std::time::Duration;

use jiff::SignedDuration;
use serde::{de, ser, Deserializer, Serializer};

struct DurationVisitor;

impl de::Visitor<'_> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str("a non-negative duration such as \"5ms\", or nanoseconds")
    }

    fn visit_str<E>(self, v: &str) -> Result<Duration, E>
    where
        E: de::Error,
    {
        let signed: SignedDuration = v.trim().parse().map_err(E::custom)?;
        if signed.is_negative() {
            return Err(E::invalid_value(de::Unexpected::Str(v), &self));
        }
        Duration::try_from(signed).map_err(E::custom)
    }

    fn visit_u64<E>(self, v: u64) -> Result<Duration, E>
    where
        E: de::Error,
    {
        Ok(Duration::from_nanos(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Duration, E>
    where
        E: de::Error,
    {
        u64::try_from(v)
            .map(Duration::from_nanos)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(DurationVisitor)
}

pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let signed = SignedDuration::try_from(*value).map_err(ser::Error::custom)?;
    serializer.collect_str(&format_args!("{:#}", signed))
}
