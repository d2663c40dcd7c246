use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer};

// Producers write `null` where they mean "no value". Every field decodes
// null the same way it decodes absence: to its zero value.

/// Seconds from the Unix epoch back to 0001-01-01T00:00:00Z.
const ZERO_TIME_SECS: i64 = -62_135_596_800;

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Timestamp of an order that never carried one.
pub fn zero_time() -> DateTime<Utc> {
    DateTime::from_timestamp(ZERO_TIME_SECS, 0).unwrap_or_default()
}

/// PostgreSQL keeps microseconds; anything finer would not survive a restore.
pub(crate) fn timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<DateTime<Utc>>::deserialize(deserializer)?
        .map(|t| t.trunc_subsecs(6))
        .unwrap_or_else(zero_time))
}
