use std::fmt;
use std::time::Duration;

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

const NANOS_PER_MICRO: u128 = 1_000;
const MICROS_PER_SEC: u128 = 1_000_000;

/// Capture timestamp, measured from the Unix epoch.
///
/// Ordering is total, so timestamps from different sources can be compared
/// directly by the merge step.
///
/// # Examples
/// ```
/// use pcap2ip_core::Timestamp;
///
/// let ts = Timestamp::new(1, 999_999_600);
/// assert_eq!(ts.to_micros_rounded(), (2, 0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub fn new(secs: u64, nanos: u32) -> Self {
        Self(Duration::new(secs, 0) + Duration::from_nanos(u64::from(nanos)))
    }

    pub fn from_micros(secs: u64, micros: u32) -> Self {
        Self::new(secs, 0) + Duration::from_micros(u64::from(micros))
    }

    /// Build a timestamp from fractional seconds. Negative or non-finite
    /// input clamps to the epoch.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(Duration::try_from_secs_f64(secs).unwrap_or_default())
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// Split into whole seconds and microseconds.
    ///
    /// Both fields come from a single rounding of the full value to the
    /// nearest microsecond, so a fraction that rounds up to a whole second
    /// carries into the seconds field.
    pub fn to_micros_rounded(&self) -> (u64, u32) {
        let micros = (self.0.as_nanos() + NANOS_PER_MICRO / 2) / NANOS_PER_MICRO;
        let secs = micros / MICROS_PER_SEC;
        let frac = micros % MICROS_PER_SEC;
        (secs as u64, frac as u32)
    }

    pub fn to_rfc3339(&self) -> Option<String> {
        let nanos = i128::try_from(self.0.as_nanos()).ok()?;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .ok()
            .and_then(|dt| dt.format(&Rfc3339).ok())
    }
}

impl std::ops::Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        Timestamp(self.0 + rhs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.0.as_secs(), self.0.subsec_nanos())
    }
}
