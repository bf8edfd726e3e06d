//! Sequence timestamps for totally ordering stream segments.
//!
//! Wall-clock time alone cannot order two events produced within the same
//! millisecond, so every value carries a counter that breaks ties.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Timestamp;

/// A strictly comparable point in an execution's event sequence.
///
/// Ordering is lexicographic: wall-clock milliseconds first, then counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceTimestamp {
    pub millis: i64,
    pub counter: u32,
}

impl SequenceTimestamp {
    /// Creates a sequence timestamp from raw parts.
    pub fn new(millis: i64, counter: u32) -> Self {
        Self { millis, counter }
    }
}

impl fmt::Display for SequenceTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:06}", self.millis, self.counter)
    }
}

/// Per-execution source of strictly increasing sequence timestamps.
///
/// Not shared between executions; one parser owns one clock.
#[derive(Debug, Default)]
pub struct SequenceClock {
    last: Option<SequenceTimestamp>,
}

impl SequenceClock {
    /// Creates a clock that has not issued any value yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the next value using the current wall clock.
    pub fn tick(&mut self) -> SequenceTimestamp {
        self.tick_at(Timestamp::now().as_unix_millis())
    }

    /// Issues the next value for an externally observed wall-clock reading.
    ///
    /// A reading that did not advance past the last issued value (same
    /// millisecond, or a clock step backwards) reuses the last millisecond
    /// and bumps the counter.
    pub fn tick_at(&mut self, now_millis: i64) -> SequenceTimestamp {
        let next = match self.last {
            Some(last) if now_millis <= last.millis => {
                SequenceTimestamp::new(last.millis, last.counter.saturating_add(1))
            }
            _ => SequenceTimestamp::new(now_millis, 0),
        };
        self.last = Some(next);
        next
    }

    /// The most recently issued value.
    pub fn last(&self) -> Option<SequenceTimestamp> {
        self.last
    }
}
