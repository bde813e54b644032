//! Process-wide monotonic clock.

use std::sync::OnceLock;
use std::time::Instant;

use crate::application::media::Clock;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds since the first time any `MonotonicClock` was read.
///
/// All instances share one epoch, so video and audio timestamps are
/// comparable.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now_ns(&self) -> i64 {
        let epoch = EPOCH.get_or_init(Instant::now);
        i64::try_from(epoch.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }
}
