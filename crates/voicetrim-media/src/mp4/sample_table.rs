//! MP4 sample table resolution.
//!
//! Sample tables describe how samples are laid out in the file:
//! - stts: sample durations (decoding time)
//! - ctts: composition time offsets
//! - stss: sync sample table (random-access points)
//! - stsc: sample-to-chunk mapping
//! - stsz: sample sizes
//! - stco/co64: chunk offsets

use crate::sample::ticks_to_us;
use crate::{ContainerError, Result};

/// A resolved sample entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEntry {
    /// Sample index (0-based).
    pub index: u32,
    /// File offset where sample data starts.
    pub offset: u64,
    /// Sample size in bytes.
    pub size: u32,
    /// Decode timestamp in media timescale.
    pub dts: u64,
    /// Sample duration in media timescale.
    pub duration: u32,
    /// Composition time offset (for PTS calculation).
    pub cts_offset: i32,
    /// Whether this sample is a random-access point.
    pub is_sync: bool,
}

impl SampleEntry {
    /// Get the presentation timestamp.
    pub fn pts(&self) -> u64 {
        (self.dts as i64 + self.cts_offset as i64).max(0) as u64
    }
}

/// Sample table containing resolved sample information.
#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    /// All resolved samples in decode order.
    pub samples: Vec<SampleEntry>,
}

impl SampleTable {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get sample by index.
    pub fn get(&self, index: usize) -> Option<&SampleEntry> {
        self.samples.get(index)
    }

    /// Iterate over all samples.
    pub fn iter(&self) -> impl Iterator<Item = &SampleEntry> {
        self.samples.iter()
    }

    /// Total duration in media timescale (end of the last sample).
    pub fn duration(&self) -> u64 {
        self.samples
            .last()
            .map(|s| s.dts.saturating_add(s.duration as u64))
            .unwrap_or(0)
    }

    /// Index of the last sample presented at or before `timestamp_us`.
    ///
    /// Samples are non-decreasing in time, so a partition point is enough;
    /// ties resolve to the last of the equal run.
    pub fn last_at_or_before(&self, timestamp_us: i64, timescale: u32) -> Option<usize> {
        let count = self
            .samples
            .partition_point(|s| ticks_to_us(s.pts(), timescale) <= timestamp_us);
        count.checked_sub(1)
    }

    /// Find the sync sample at or before the given sample index.
    pub fn find_sync_at_or_before(&self, index: usize) -> Option<usize> {
        let last = index.min(self.samples.len().checked_sub(1)?);
        (0..=last).rev().find(|&i| self.samples[i].is_sync)
    }

    /// Largest sample size in the table.
    pub fn max_sample_size(&self) -> u32 {
        self.samples.iter().map(|s| s.size).max().unwrap_or(0)
    }
}

/// Builder for constructing a sample table from raw atom data.
pub struct SampleTableBuilder {
    // stts: (count, delta)
    stts_entries: Vec<(u32, u32)>,
    // stss: sync sample numbers (1-based)
    sync_samples: Option<Vec<u32>>,
    // stsc: (first_chunk, samples_per_chunk, sample_description_index)
    stsc_entries: Vec<(u32, u32, u32)>,
    // stsz: if uniform_size > 0, all samples have that size
    uniform_size: u32,
    sample_count: u32,
    sample_sizes: Vec<u32>,
    // stco/co64
    chunk_offsets: Vec<u64>,
    // ctts: (count, offset)
    ctts_entries: Vec<(u32, i32)>,
    // bytes the sample payloads can occupy
    data_limit: u64,
}

impl SampleTableBuilder {
    /// Create a builder for samples stored in a file of `data_limit` bytes.
    pub fn new(data_limit: u64) -> Self {
        Self {
            stts_entries: Vec::new(),
            sync_samples: None,
            stsc_entries: Vec::new(),
            uniform_size: 0,
            sample_count: 0,
            sample_sizes: Vec::new(),
            chunk_offsets: Vec::new(),
            ctts_entries: Vec::new(),
            data_limit,
        }
    }

    /// Set stts (decoding time to sample) entries.
    pub fn set_stts(&mut self, entries: Vec<(u32, u32)>) {
        self.stts_entries = entries;
    }

    /// Set stss (sync sample) entries. Without a call, every sample is sync.
    pub fn set_sync_samples(&mut self, samples: Vec<u32>) {
        self.sync_samples = Some(samples);
    }

    /// Set stsc (sample to chunk) entries.
    pub fn set_stsc(&mut self, entries: Vec<(u32, u32, u32)>) {
        self.stsc_entries = entries;
    }

    /// Set stsz (sample size) data.
    pub fn set_stsz(&mut self, uniform_size: u32, sample_count: u32, sizes: Vec<u32>) {
        self.uniform_size = uniform_size;
        self.sample_count = sample_count;
        self.sample_sizes = sizes;
    }

    /// Set chunk offsets (from stco or co64).
    pub fn set_chunk_offsets(&mut self, offsets: Vec<u64>) {
        self.chunk_offsets = offsets;
    }

    /// Set ctts (composition time to sample) entries.
    pub fn set_ctts(&mut self, entries: Vec<(u32, i32)>) {
        self.ctts_entries = entries;
    }

    /// Build the sample table by resolving all sample information.
    pub fn build(self) -> Result<SampleTable> {
        let sample_count = self.sample_count;
        if sample_count == 0 {
            return Ok(SampleTable::default());
        }

        if self.uniform_size == 0 && (self.sample_sizes.len() as u64) < sample_count as u64 {
            return Err(ContainerError::unreadable(format!(
                "stsz lists {} sizes for {} samples",
                self.sample_sizes.len(),
                sample_count
            )));
        }

        // A uniform stsz is 20 bytes whatever it claims, so the claim is
        // checked against the file before anything is sized from it.
        let claimed = sample_count as u64 * self.uniform_size as u64;
        if self.uniform_size > 0 && claimed > self.data_limit {
            return Err(ContainerError::unreadable(format!(
                "stsz claims {} samples of {} bytes in a {} byte file",
                sample_count, self.uniform_size, self.data_limit
            )));
        }

        let sample_chunks = self.resolve_sample_chunks(sample_count)?;
        let offsets = self.resolve_offsets(&sample_chunks)?;
        let (dts_values, durations) = self.resolve_timestamps(sample_count);
        let cts_offsets = self.resolve_cts_offsets(sample_count);

        let sync_set: Option<std::collections::HashSet<u32>> = self
            .sync_samples
            .as_ref()
            .map(|s| s.iter().copied().collect());

        let mut samples = Vec::with_capacity(sample_count as usize);
        for i in 0..sample_count as usize {
            let is_sync = match &sync_set {
                Some(set) => set.contains(&(i as u32 + 1)), // stss is 1-based
                None => true,
            };

            samples.push(SampleEntry {
                index: i as u32,
                offset: offsets[i],
                size: self.size_of(i),
                dts: dts_values[i],
                duration: durations[i],
                cts_offset: cts_offsets[i],
                is_sync,
            });
        }

        Ok(SampleTable { samples })
    }

    fn size_of(&self, index: usize) -> u32 {
        if self.uniform_size > 0 {
            self.uniform_size
        } else {
            self.sample_sizes[index]
        }
    }

    fn resolve_sample_chunks(&self, sample_count: u32) -> Result<Vec<u32>> {
        let num_chunks = self.chunk_offsets.len() as u32;
        let mut result = Vec::with_capacity(sample_count as usize);

        for (i, &(first_chunk, samples_per_chunk, _)) in self.stsc_entries.iter().enumerate() {
            let next_first = match self.stsc_entries.get(i + 1) {
                Some(next) => next.0,
                None => num_chunks + 1,
            };
            if first_chunk == 0 || next_first <= first_chunk {
                return Err(ContainerError::unreadable(format!(
                    "stsc entry {} has non-increasing first chunk {}",
                    i, first_chunk
                )));
            }

            for chunk in first_chunk..next_first.min(num_chunks + 1) {
                for _ in 0..samples_per_chunk {
                    if result.len() as u32 >= sample_count {
                        return Ok(result);
                    }
                    result.push(chunk - 1); // Convert to 0-based
                }
            }
        }

        if (result.len() as u32) < sample_count {
            return Err(ContainerError::unreadable(format!(
                "chunk map covers {} of {} samples",
                result.len(),
                sample_count
            )));
        }

        Ok(result)
    }

    fn resolve_offsets(&self, sample_chunks: &[u32]) -> Result<Vec<u64>> {
        let mut offsets = Vec::with_capacity(sample_chunks.len());
        let mut chunk_sample_offset = vec![0u64; self.chunk_offsets.len()];

        for (i, &chunk) in sample_chunks.iter().enumerate() {
            let chunk_idx = chunk as usize;
            let offset = self.chunk_offsets[chunk_idx]
                .checked_add(chunk_sample_offset[chunk_idx])
                .ok_or_else(|| {
                    ContainerError::unreadable(format!("sample {} offset overflows", i))
                })?;
            offsets.push(offset);
            chunk_sample_offset[chunk_idx] += self.size_of(i) as u64;
        }

        Ok(offsets)
    }

    fn resolve_timestamps(&self, sample_count: u32) -> (Vec<u64>, Vec<u32>) {
        let mut dts_values = Vec::with_capacity(sample_count as usize);
        let mut durations = Vec::with_capacity(sample_count as usize);
        let mut current_dts = 0u64;

        'entries: for (count, delta) in &self.stts_entries {
            for _ in 0..*count {
                if dts_values.len() as u32 >= sample_count {
                    break 'entries;
                }
                dts_values.push(current_dts);
                durations.push(*delta);
                current_dts = current_dts.saturating_add(*delta as u64);
            }
        }

        // Pad with last duration if stts is short
        let last_duration = durations.last().copied().unwrap_or(1);
        while (dts_values.len() as u32) < sample_count {
            dts_values.push(current_dts);
            durations.push(last_duration);
            current_dts = current_dts.saturating_add(last_duration as u64);
        }

        (dts_values, durations)
    }

    fn resolve_cts_offsets(&self, sample_count: u32) -> Vec<i32> {
        let mut offsets = Vec::with_capacity(sample_count as usize);
        for (count, offset) in &self.ctts_entries {
            for _ in 0..*count {
                if offsets.len() >= sample_count as usize {
                    break;
                }
                offsets.push(*offset);
            }
        }

        offsets.resize(sample_count as usize, 0);
        offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const DATA_LIMIT: u64 = 1 << 20;

    fn entry(index: u32, dts: u64, is_sync: bool) -> SampleEntry {
        SampleEntry {
            index,
            offset: 0,
            size: 10,
            dts,
            duration: 1000,
            cts_offset: 0,
            is_sync,
        }
    }

    #[test]
    fn test_sample_entry_pts() {
        let mut sample = entry(0, 1000, true);
        sample.cts_offset = 500;
        assert_eq!(sample.pts(), 1500);

        sample.dts = 100;
        sample.cts_offset = -200;
        assert_eq!(sample.pts(), 0); // Clamped to 0
    }

    #[test]
    fn test_sample_table_builder() {
        let mut builder = SampleTableBuilder::new(DATA_LIMIT);
        builder.set_stts(vec![(3, 1000)]);
        builder.set_sync_samples(vec![1]);
        builder.set_stsc(vec![(1, 3, 1)]);
        builder.set_stsz(0, 3, vec![100, 200, 150]);
        builder.set_chunk_offsets(vec![1000]);

        let table = builder.build().unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.samples[0].offset, 1000);
        assert_eq!(table.samples[0].size, 100);
        assert_eq!(table.samples[0].dts, 0);
        assert!(table.samples[0].is_sync);

        assert_eq!(table.samples[1].offset, 1100);
        assert_eq!(table.samples[1].dts, 1000);
        assert!(!table.samples[1].is_sync);

        assert_eq!(table.samples[2].offset, 1300);
        assert_eq!(table.duration(), 3000);
    }

    #[test]
    fn test_multi_chunk_offsets() {
        let mut builder = SampleTableBuilder::new(DATA_LIMIT);
        builder.set_stts(vec![(5, 1024)]);
        // Chunks 1-2 hold two samples, chunk 3 holds one
        builder.set_stsc(vec![(1, 2, 1), (3, 1, 1)]);
        builder.set_stsz(50, 5, vec![]);
        builder.set_chunk_offsets(vec![100, 500, 900]);

        let table = builder.build().unwrap();
        let offsets: Vec<u64> = table.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![100, 150, 500, 550, 900]);
        // No stss: everything is sync
        assert!(table.iter().all(|s| s.is_sync));
    }

    #[test]
    fn test_short_chunk_map_is_unreadable() {
        let mut builder = SampleTableBuilder::new(DATA_LIMIT);
        builder.set_stts(vec![(4, 1)]);
        builder.set_stsc(vec![(1, 1, 1)]);
        builder.set_stsz(10, 4, vec![]);
        builder.set_chunk_offsets(vec![0, 10]);

        assert_matches!(builder.build(), Err(ContainerError::Unreadable(_)));
    }

    #[test]
    fn test_short_size_table_is_unreadable() {
        let mut builder = SampleTableBuilder::new(DATA_LIMIT);
        builder.set_stsc(vec![(1, 4, 1)]);
        builder.set_stsz(0, 4, vec![1, 2]);
        builder.set_chunk_offsets(vec![0]);

        assert_matches!(builder.build(), Err(ContainerError::Unreadable(_)));
    }

    #[test]
    fn test_sync_search() {
        let table = SampleTable {
            samples: (0..10)
                .map(|i| entry(i, i as u64 * 1000, i == 0 || i == 4 || i == 8))
                .collect(),
        };

        assert_eq!(table.find_sync_at_or_before(0), Some(0));
        assert_eq!(table.find_sync_at_or_before(3), Some(0));
        assert_eq!(table.find_sync_at_or_before(4), Some(4));
        assert_eq!(table.find_sync_at_or_before(7), Some(4));
        assert_eq!(table.find_sync_at_or_before(100), Some(8));
    }

    #[test]
    fn test_sync_search_without_leading_sync() {
        let table = SampleTable {
            samples: vec![entry(0, 0, false), entry(1, 1000, false), entry(2, 2000, true)],
        };
        assert_eq!(table.find_sync_at_or_before(1), None);
        assert_eq!(table.find_sync_at_or_before(2), Some(2));
    }

    #[test]
    fn test_last_at_or_before_with_ties() {
        let table = SampleTable {
            samples: vec![
                entry(0, 0, true),
                entry(1, 1000, true),
                entry(2, 1000, true),
                entry(3, 2000, true),
            ],
        };
        // 1000 ticks per second: one tick is 1000 us
        assert_eq!(table.last_at_or_before(999_999, 1000), Some(0));
        assert_eq!(table.last_at_or_before(1_000_000, 1000), Some(2));
        assert_eq!(table.last_at_or_before(5_000_000, 1000), Some(3));

        let empty = SampleTable::default();
        assert_eq!(empty.last_at_or_before(0, 1000), None);
    }

    #[test]
    fn test_sample_count_beyond_file_is_unreadable() {
        let mut builder = SampleTableBuilder::new(DATA_LIMIT);
        builder.set_stts(vec![(1, 1024)]);
        builder.set_stsc(vec![(1, u32::MAX, 1)]);
        builder.set_stsz(1, u32::MAX, vec![]);
        builder.set_chunk_offsets(vec![0]);

        assert_matches!(builder.build(), Err(ContainerError::Unreadable(_)));
    }

    #[test]
    fn test_uniform_samples_filling_the_file() {
        let mut builder = SampleTableBuilder::new(400);
        builder.set_stts(vec![(4, 1024)]);
        builder.set_stsc(vec![(1, 4, 1)]);
        builder.set_stsz(100, 4, vec![]);
        builder.set_chunk_offsets(vec![0]);

        let table = builder.build().unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.get(3).unwrap().offset, 300);
    }

    #[test]
    fn test_offset_overflow_is_unreadable() {
        let mut builder = SampleTableBuilder::new(DATA_LIMIT);
        builder.set_stts(vec![(2, 1024)]);
        builder.set_stsc(vec![(1, 2, 1)]);
        builder.set_stsz(16, 2, vec![]);
        builder.set_chunk_offsets(vec![u64::MAX - 4]);

        assert_matches!(builder.build(), Err(ContainerError::Unreadable(_)));
    }
}
