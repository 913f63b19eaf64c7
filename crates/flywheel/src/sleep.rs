//! Sleeping until an absolute deadline.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Utc};
use tokio::time::Instant;

/// Longest single wait handed to the underlying timer (40 days). Waits past
/// this are decomposed into capped chunks.
pub const MAX_SINGLE_SLEEP_SECS: u64 = 3_456_000;

/// Conversion into an absolute UTC deadline.
///
/// Naive timestamps are taken to already be in UTC.
pub trait IntoDeadline {
    /// The deadline as an aware UTC timestamp.
    fn into_deadline(self) -> DateTime<Utc>;
}

impl IntoDeadline for DateTime<Utc> {
    fn into_deadline(self) -> DateTime<Utc> {
        self
    }
}

impl IntoDeadline for DateTime<Local> {
    fn into_deadline(self) -> DateTime<Utc> {
        self.with_timezone(&Utc)
    }
}

impl IntoDeadline for DateTime<FixedOffset> {
    fn into_deadline(self) -> DateTime<Utc> {
        self.with_timezone(&Utc)
    }
}

impl IntoDeadline for NaiveDateTime {
    fn into_deadline(self) -> DateTime<Utc> {
        self.and_utc()
    }
}

/// Suspend until an absolute deadline.
///
/// The wall-clock delta is taken once; the wait itself runs on the monotonic
/// clock, in chunks of at most [`MAX_SINGLE_SLEEP_SECS`], re-deriving the
/// remainder after each chunk. Deadlines already in the past resolve
/// immediately.
pub async fn sleep_until<D: IntoDeadline>(deadline: D) {
    let when = deadline.into_deadline();
    let delta = (when - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    let target = Instant::now() + delta;

    loop {
        let remaining = target.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        let chunk = remaining.min(Duration::from_secs(MAX_SINGLE_SLEEP_SECS));
        tokio::time::sleep(chunk).await;
    }
}
