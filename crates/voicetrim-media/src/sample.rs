//! Sample metadata shared by the reader and the writer.

/// Index of a track within a container, in `moov` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackIndex(pub usize);

impl std::fmt::Display for TrackIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a seek lands relative to the requested time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekPolicy {
    /// The last random-access point at or before the requested time.
    #[default]
    ClosestPrecedingSync,
}

/// Metadata for one compressed access unit.
///
/// The payload itself lives in the caller's buffer; `size` says how many
/// bytes of it belong to this sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInfo {
    /// Presentation timestamp in microseconds.
    pub pts_us: i64,
    /// Sample duration in microseconds.
    pub duration_us: i64,
    /// Encoded size in bytes.
    pub size: usize,
    /// Whether the sample is a random-access point.
    pub is_sync: bool,
}

/// Convert media-timescale ticks to microseconds, rounding down.
pub fn ticks_to_us(ticks: u64, timescale: u32) -> i64 {
    if timescale == 0 {
        return 0;
    }
    (ticks as u128 * 1_000_000 / timescale as u128) as i64
}

/// Convert microseconds to media-timescale ticks, rounding to nearest.
///
/// Inverts [`ticks_to_us`] exactly for timescales up to 500 kHz.
pub fn us_to_ticks(us: i64, timescale: u32) -> u64 {
    if us <= 0 {
        return 0;
    }
    ((us as u128 * timescale as u128 + 500_000) / 1_000_000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_conversion_round_trips() {
        for timescale in [1000u32, 8000, 22050, 44100, 48000, 90000] {
            for ticks in [0u64, 1, 1023, 1024, 44099, 441_000, 123_456_789] {
                let us = ticks_to_us(ticks, timescale);
                assert_eq!(us_to_ticks(us, timescale), ticks, "timescale {timescale} ticks {ticks}");
            }
        }
    }

    #[test]
    fn test_zero_timescale() {
        assert_eq!(ticks_to_us(1000, 0), 0);
        assert_eq!(us_to_ticks(-5, 1000), 0);
    }

    #[test]
    fn test_known_values() {
        assert_eq!(ticks_to_us(1024, 44100), 23219);
        assert_eq!(ticks_to_us(48000, 48000), 1_000_000);
        assert_eq!(us_to_ticks(5_000_000, 1000), 5000);
    }
}
