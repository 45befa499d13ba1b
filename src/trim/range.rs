//! Time ranges and the emit/stop policy applied to a sample stream.

use crate::{Error, Result};
use std::io::{Read, Seek};
use voicetrim_media::{ContainerReader, SampleInfo, SeekPolicy};

/// A user-requested `[start, end]` window in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start_ms: u64,
    end_ms: u64,
}

impl TimeRange {
    /// Fails with [`Error::InvalidRange`] unless `end_ms > start_ms`.
    pub fn new(start_ms: u64, end_ms: u64) -> Result<Self> {
        if end_ms <= start_ms {
            return Err(Error::invalid_range(format!(
                "end {}ms must be after start {}ms",
                end_ms, start_ms
            )));
        }
        Ok(Self { start_ms, end_ms })
    }

    /// The whole stream, however long it is.
    pub fn full() -> Self {
        Self {
            start_ms: 0,
            end_ms: u64::MAX,
        }
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    pub fn end_ms(&self) -> u64 {
        self.end_ms
    }

    pub fn start_us(&self) -> i64 {
        ms_to_us(self.start_ms)
    }

    pub fn end_us(&self) -> i64 {
        ms_to_us(self.end_ms)
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms..{}ms", self.start_ms, self.end_ms)
    }
}

fn ms_to_us(ms: u64) -> i64 {
    i64::try_from(ms.saturating_mul(1000)).unwrap_or(i64::MAX)
}

/// What to do with the next sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Emit,
    /// The sample lies past the end of the range; nothing after it is written.
    Stop,
}

/// Decides where emission begins and where it ends for one range.
#[derive(Debug, Clone, Copy)]
pub struct RangeSelector {
    start_us: i64,
    end_us: i64,
}

impl RangeSelector {
    pub fn new(range: TimeRange) -> Self {
        Self {
            start_us: range.start_us(),
            end_us: range.end_us(),
        }
    }

    /// Timestamp to hand to the reader's seek.
    pub fn seek_target_us(&self) -> i64 {
        self.start_us
    }

    pub fn seek_policy(&self) -> SeekPolicy {
        SeekPolicy::ClosestPrecedingSync
    }

    /// A range starting at or past the end of the stream selects nothing.
    pub fn starts_after(&self, duration_us: i64) -> bool {
        self.start_us >= duration_us
    }

    pub fn decide(&self, sample: &SampleInfo) -> Decision {
        if sample.pts_us > self.end_us {
            Decision::Stop
        } else {
            Decision::Emit
        }
    }

    /// Samples to emit from a stream already positioned by a seek.
    pub fn emitted<I>(self, samples: I) -> impl Iterator<Item = SampleInfo>
    where
        I: IntoIterator<Item = SampleInfo>,
    {
        samples
            .into_iter()
            .take_while(move |s| self.decide(s) == Decision::Emit)
    }

    /// Move `reader` onto the first sample to emit.
    ///
    /// Returns `false`, leaving the reader alone, when the range starts past
    /// the end of the selected track.
    pub fn position<R: Read + Seek>(
        &self,
        reader: &mut ContainerReader<R>,
    ) -> voicetrim_media::Result<bool> {
        if self.starts_after(reader.duration_us()) {
            return Ok(false);
        }
        reader.seek_to(self.seek_target_us(), self.seek_policy())?;
        Ok(true)
    }
}

/// Sample indices of the reader's selected track that a trim to `range`
/// would emit. Leaves the reader positioned on the first of them.
pub fn select<R: Read + Seek>(
    reader: &mut ContainerReader<R>,
    range: TimeRange,
) -> voicetrim_media::Result<std::ops::Range<usize>> {
    let selector = RangeSelector::new(range);
    if !selector.position(reader)? {
        return Ok(0..0);
    }
    let start = reader.cursor();
    let emitted = selector.emitted(reader.remaining()).count();
    Ok(start..start + emitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn at(pts_ms: i64) -> SampleInfo {
        SampleInfo {
            pts_us: pts_ms * 1000,
            duration_us: 200_000,
            size: 100,
            is_sync: true,
        }
    }

    #[test]
    fn test_time_range_validation() {
        assert_matches!(TimeRange::new(5, 5), Err(Error::InvalidRange(_)));
        assert_matches!(TimeRange::new(7, 3), Err(Error::InvalidRange(_)));
        let range = TimeRange::new(3000, 7000).unwrap();
        assert_eq!(range.start_us(), 3_000_000);
        assert_eq!(range.end_us(), 7_000_000);
        assert_eq!(range.to_string(), "3000ms..7000ms");
        assert_eq!(TimeRange::full().end_us(), i64::MAX);
    }

    #[test]
    fn test_decide_stops_strictly_after_end() {
        let selector = RangeSelector::new(TimeRange::new(3000, 7000).unwrap());
        assert_eq!(selector.decide(&at(0)), Decision::Emit);
        assert_eq!(selector.decide(&at(7000)), Decision::Emit);
        assert_eq!(selector.decide(&at(7001)), Decision::Stop);
        assert_eq!(selector.seek_target_us(), 3_000_000);
        assert_eq!(selector.seek_policy(), SeekPolicy::ClosestPrecedingSync);
    }

    #[test]
    fn test_starts_after() {
        let selector = RangeSelector::new(TimeRange::new(10000, 12000).unwrap());
        assert!(selector.starts_after(10_000_000));
        assert!(selector.starts_after(0));
        assert!(!selector.starts_after(10_000_001));
    }

    #[test]
    fn test_emitted_takes_through_ties_at_end() {
        let selector = RangeSelector::new(TimeRange::new(0, 1800).unwrap());
        let samples = [at(1400), at(1600), at(1800), at(1800), at(2000), at(1000)];
        let emitted: Vec<i64> = selector.emitted(samples).map(|s| s.pts_us).collect();
        assert_eq!(emitted, [1_400_000, 1_600_000, 1_800_000, 1_800_000]);
    }
}
