//! Sequential, seekable sample cursor over an MP4 container.

use crate::format::TrackFormat;
use crate::mp4::{Mp4File, ParsedTrack};
use crate::sample::{ticks_to_us, SampleInfo, SeekPolicy, TrackIndex};
use crate::{ContainerError, Result};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

/// One-line description of a track, as reported by probing.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct TrackSummary {
    /// Position in `moov` order.
    pub index: usize,
    /// Track id from `tkhd`.
    pub track_id: u32,
    /// MIME type, if the track has a sample description.
    pub mime: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    /// End of the last sample, in microseconds.
    pub duration_us: i64,
    pub sample_count: usize,
}

/// Reads compressed samples from the first audio track of a container.
#[derive(Debug)]
pub struct ContainerReader<R> {
    source: R,
    tracks: Vec<ParsedTrack>,
    faststart: bool,
    selected: TrackIndex,
    cursor: usize,
    /// Where `source` is positioned, when known.
    position: Option<u64>,
}

impl ContainerReader<BufReader<File>> {
    /// Open and parse the container at `path`.
    ///
    /// Fails with [`ContainerError::Unreadable`] if the file cannot be parsed
    /// and [`ContainerError::NoAudioTrack`] if no track carries audio.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| ContainerError::unreadable(format!("{}: {}", path.display(), e)))?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Seek> ContainerReader<R> {
    /// Parse a container from any seekable source.
    pub fn from_reader(mut source: R) -> Result<Self> {
        let mp4 = Mp4File::parse(&mut source)?;
        let selected = find_audio_track(&mp4.tracks).ok_or(ContainerError::NoAudioTrack)?;

        tracing::debug!(
            tracks = mp4.tracks.len(),
            audio_track = %selected,
            faststart = mp4.has_faststart,
            "container opened"
        );

        Ok(Self {
            source,
            tracks: mp4.tracks,
            faststart: mp4.has_faststart,
            selected,
            cursor: 0,
            position: None,
        })
    }

    /// Number of tracks in the container.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Summaries of every track, in `moov` order.
    pub fn tracks(&self) -> Vec<TrackSummary> {
        self.tracks
            .iter()
            .enumerate()
            .map(|(index, track)| TrackSummary {
                index,
                track_id: track.track_id,
                mime: track.format.as_ref().map(|f| f.mime().to_string()),
                sample_rate: track.format.as_ref().and_then(TrackFormat::sample_rate),
                channels: track.format.as_ref().and_then(TrackFormat::channels),
                duration_us: track_duration_us(track),
                sample_count: track.sample_table.len(),
            })
            .collect()
    }

    /// Whether `moov` precedes `mdat`.
    pub fn is_faststart(&self) -> bool {
        self.faststart
    }

    /// Select the first track whose MIME type is audio and rewind to its start.
    pub fn select_track(&mut self) -> TrackIndex {
        // `from_reader` refuses containers without one, so the scan always hits.
        if let Some(index) = find_audio_track(&self.tracks) {
            self.selected = index;
        }
        self.cursor = 0;
        self.selected
    }

    /// Codec configuration of the track at `index`.
    pub fn track_format(&self, index: TrackIndex) -> Result<&TrackFormat> {
        self.tracks
            .get(index.0)
            .and_then(|t| t.format.as_ref())
            .ok_or_else(|| ContainerError::unreadable(format!("track {} has no sample description", index)))
    }

    /// Reposition the cursor according to `policy`.
    ///
    /// With [`SeekPolicy::ClosestPrecedingSync`] the cursor lands on the last
    /// sync sample at or before `timestamp_us`, or on the first sample when
    /// no such sync sample exists.
    pub fn seek_to(&mut self, timestamp_us: i64, policy: SeekPolicy) -> Result<()> {
        let track = self.track();
        let timescale = track.timescale;
        let table = &track.sample_table;

        let target = match policy {
            SeekPolicy::ClosestPrecedingSync => table
                .last_at_or_before(timestamp_us, timescale)
                .and_then(|i| table.find_sync_at_or_before(i))
                .unwrap_or(0),
        };

        tracing::trace!(timestamp_us, sample = target, "seek");
        self.cursor = target;
        Ok(())
    }

    /// Read the next sample of the selected track into `buf`.
    ///
    /// Returns `None` at end of stream. If `buf` cannot hold the sample the
    /// call fails with [`ContainerError::BufferTooSmall`] and the cursor stays
    /// put, so the caller can grow the buffer and retry.
    pub fn next_sample(&mut self, buf: &mut [u8]) -> Result<Option<SampleInfo>> {
        let track = &self.tracks[self.selected.0];
        let Some(entry) = track.sample_table.get(self.cursor) else {
            return Ok(None);
        };
        let entry = *entry;
        let timescale = track.timescale;

        let size = entry.size as usize;
        if size > buf.len() {
            return Err(ContainerError::BufferTooSmall {
                need: size,
                have: buf.len(),
            });
        }

        if self.position.take() != Some(entry.offset) {
            self.source
                .seek(SeekFrom::Start(entry.offset))
                .map_err(ContainerError::read_io)?;
        }
        self.source.read_exact(&mut buf[..size]).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                ContainerError::unreadable(format!(
                    "sample {} at offset {} is truncated",
                    entry.index, entry.offset
                ))
            } else {
                ContainerError::read_io(e)
            }
        })?;
        self.position = Some(entry.offset + size as u64);
        self.cursor += 1;

        Ok(Some(SampleInfo {
            pts_us: ticks_to_us(entry.pts(), timescale),
            duration_us: ticks_to_us(entry.duration as u64, timescale),
            size,
            is_sync: entry.is_sync,
        }))
    }

    /// Index of the sample `next_sample` would return.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Size of the sample `next_sample` would return, without consuming it.
    pub fn peek_sample_size(&self) -> Option<usize> {
        self.track()
            .sample_table
            .get(self.cursor)
            .map(|s| s.size as usize)
    }

    /// Metadata of the samples from the cursor to the end, without reading payloads.
    pub fn remaining(&self) -> impl Iterator<Item = SampleInfo> + '_ {
        let track = self.track();
        let timescale = track.timescale;
        track.sample_table.samples[self.cursor.min(track.sample_table.len())..]
            .iter()
            .map(move |s| SampleInfo {
                pts_us: ticks_to_us(s.pts(), timescale),
                duration_us: ticks_to_us(s.duration as u64, timescale),
                size: s.size as usize,
                is_sync: s.is_sync,
            })
    }

    /// Duration of the selected track in microseconds.
    pub fn duration_us(&self) -> i64 {
        track_duration_us(self.track())
    }

    /// Number of samples in the selected track.
    pub fn sample_count(&self) -> usize {
        self.track().sample_table.len()
    }

    /// Media time where the selected track's presentation starts, in its
    /// timescale. Non-zero when an edit list skips encoder priming.
    pub fn media_start_ticks(&self) -> u64 {
        self.track().media_start
    }

    /// Largest sample in the selected track, in bytes.
    pub fn max_sample_size(&self) -> usize {
        self.track().sample_table.max_sample_size() as usize
    }

    fn track(&self) -> &ParsedTrack {
        &self.tracks[self.selected.0]
    }
}

fn find_audio_track(tracks: &[ParsedTrack]) -> Option<TrackIndex> {
    tracks
        .iter()
        .position(|t| t.format.as_ref().is_some_and(TrackFormat::is_audio))
        .map(TrackIndex)
}

/// Sample-table duration, falling back to `mdhd` for empty tracks.
fn track_duration_us(track: &ParsedTrack) -> i64 {
    let ticks = if track.sample_table.is_empty() {
        track.duration
    } else {
        track.sample_table.duration()
    };
    ticks_to_us(ticks, track.timescale)
}
