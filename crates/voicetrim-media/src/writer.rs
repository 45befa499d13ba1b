//! Stream-copy MP4 writer.
//!
//! The output is a non-fragmented file laid out as `ftyp`, `mdat`, `moov`.
//! Sample payloads are streamed straight into `mdat`; the sample tables are
//! accumulated in memory and serialized into `moov` at [`ActiveWriter::finalize`].
//!
//! Writing is split into two types so that samples can only be appended after
//! the header region exists:
//!
//! ```no_run
//! # use voicetrim_media::{ContainerReader, ContainerWriter};
//! # fn main() -> voicetrim_media::Result<()> {
//! let mut reader = ContainerReader::open("in.m4a")?;
//! let track = reader.select_track();
//! let format = reader.track_format(track)?.clone();
//!
//! let mut writer = ContainerWriter::create("out.m4a", &format)?.start()?;
//! let mut buf = vec![0u8; 64 * 1024];
//! while let Some(info) = reader.next_sample(&mut buf)? {
//!     writer.write_sample(&buf[..info.size], &info)?;
//! }
//! writer.finalize()?;
//! # Ok(())
//! # }
//! ```

use crate::format::TrackFormat;
use crate::mp4::atoms::{be_u32, fourcc};
use crate::mp4::boxes::{self, MDAT_HEADER_SIZE};
use crate::sample::{us_to_ticks, SampleInfo};
use crate::{ContainerError, Result};
use bytes::BytesMut;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

/// Samples grouped into one chunk unless configured otherwise.
pub const DEFAULT_SAMPLES_PER_CHUNK: u32 = 32;

/// Track id of the single track the writer registers.
const TRACK_ID: u32 = 1;

/// A writer with its track registered but no bytes emitted yet.
#[derive(Debug)]
pub struct ContainerWriter<W> {
    out: W,
    format: TrackFormat,
    samples_per_chunk: u32,
    media_start: u64,
}

impl ContainerWriter<BufWriter<File>> {
    /// Create the output file at `path` and register one track with `format`.
    pub fn create<P: AsRef<Path>>(path: P, format: &TrackFormat) -> Result<Self> {
        let file = File::create(path.as_ref()).map_err(ContainerError::WriteFailed)?;
        Self::new(BufWriter::new(file), format)
    }
}

impl<W: Write + Seek> ContainerWriter<W> {
    /// Register one track with `format` on an arbitrary seekable sink.
    pub fn new(out: W, format: &TrackFormat) -> Result<Self> {
        validate_format(format)?;
        Ok(Self {
            out,
            format: format.clone(),
            samples_per_chunk: DEFAULT_SAMPLES_PER_CHUNK,
            media_start: 0,
        })
    }

    /// Number of samples grouped into each chunk (minimum 1).
    pub fn with_samples_per_chunk(mut self, samples_per_chunk: u32) -> Self {
        self.samples_per_chunk = samples_per_chunk.max(1);
        self
    }

    /// Start presentation `ticks` into the media, as an edit list does for
    /// encoder priming. Zero (the default) writes no edit list.
    pub fn with_media_start(mut self, ticks: u64) -> Self {
        self.media_start = ticks;
        self
    }

    /// Write the header region and open `mdat` for samples.
    pub fn start(mut self) -> Result<ActiveWriter<W>> {
        let base = self.out.stream_position().map_err(ContainerError::WriteFailed)?;

        let mut head = BytesMut::with_capacity(64);
        boxes::write_ftyp(&mut head, self.format.handler().is_audio());
        let mdat_start = base + head.len() as u64;
        boxes::write_mdat_header(&mut head, MDAT_HEADER_SIZE);
        self.out.write_all(&head).map_err(ContainerError::WriteFailed)?;

        tracing::debug!(
            mime = self.format.mime(),
            timescale = self.format.timescale(),
            samples_per_chunk = self.samples_per_chunk,
            media_start = self.media_start,
            "container writer started"
        );

        Ok(ActiveWriter {
            out: self.out,
            format: self.format,
            samples_per_chunk: self.samples_per_chunk,
            media_start: self.media_start,
            mdat_start,
            position: mdat_start + MDAT_HEADER_SIZE,
            first_ticks: None,
            samples_in_chunk: 0,
            tables: TrackTables::default(),
        })
    }
}

/// A writer accepting samples. Obtained from [`ContainerWriter::start`].
#[derive(Debug)]
pub struct ActiveWriter<W> {
    out: W,
    format: TrackFormat,
    samples_per_chunk: u32,
    media_start: u64,
    mdat_start: u64,
    position: u64,
    first_ticks: Option<u64>,
    samples_in_chunk: u32,
    tables: TrackTables,
}

impl<W: Write + Seek> ActiveWriter<W> {
    /// Append one sample.
    ///
    /// `data` is the complete payload. Timestamps are rebased so the first
    /// sample written starts at zero; the sync flag is written as given.
    pub fn write_sample(&mut self, data: &[u8], info: &SampleInfo) -> Result<()> {
        let size = u32::try_from(data.len()).map_err(|_| {
            ContainerError::unsupported(format!("sample of {} bytes exceeds 32-bit size", data.len()))
        })?;

        let timescale = self.format.timescale();
        let ticks = us_to_ticks(info.pts_us, timescale);
        let first = *self.first_ticks.get_or_insert(ticks);
        // Out-of-order input is clamped so decode times never go backwards.
        let dts = ticks.saturating_sub(first).max(self.tables.last_dts());

        if self.samples_in_chunk == 0 || self.samples_in_chunk >= self.samples_per_chunk {
            self.tables.start_chunk(self.position);
            self.samples_in_chunk = 0;
        }

        self.out.write_all(data).map_err(ContainerError::WriteFailed)?;

        self.tables.push(size, dts, info.is_sync);
        // Superseded by the next sample's dts; kept for the final sample.
        self.tables
            .set_last_duration(clamp_u32(us_to_ticks(info.duration_us, timescale)));
        self.position += data.len() as u64;
        self.samples_in_chunk += 1;
        Ok(())
    }

    /// Number of samples written so far.
    pub fn samples_written(&self) -> usize {
        self.tables.len()
    }

    /// Payload bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.position - self.mdat_start - MDAT_HEADER_SIZE
    }

    /// Output duration so far, in media timescale ticks.
    pub fn duration_ticks(&self) -> u64 {
        self.tables.duration()
    }

    /// Patch the `mdat` size, append `moov`, and flush.
    ///
    /// Returns the underlying sink so the caller can sync or inspect it.
    pub fn finalize(mut self) -> Result<W> {
        let timescale = self.format.timescale();
        let mdat_size = self.position - self.mdat_start;
        self.out
            .seek(SeekFrom::Start(self.mdat_start + 8))
            .map_err(ContainerError::WriteFailed)?;
        self.out
            .write_all(&mdat_size.to_be_bytes())
            .map_err(ContainerError::WriteFailed)?;
        self.out
            .seek(SeekFrom::Start(self.position))
            .map_err(ContainerError::WriteFailed)?;

        let mut moov = BytesMut::with_capacity(1024 + self.tables.len() * 8);
        let start = boxes::begin_box(&mut moov, b"moov");
        let edit = Edit::new(self.media_start, self.tables.duration());
        boxes::write_mvhd(&mut moov, timescale, edit.presented(self.tables.duration()), TRACK_ID + 1);
        write_trak(&mut moov, TRACK_ID, &self.format, &self.tables, edit);
        boxes::end_box(&mut moov, start);

        self.out.write_all(&moov).map_err(ContainerError::WriteFailed)?;
        self.out.flush().map_err(ContainerError::WriteFailed)?;

        tracing::debug!(
            samples = self.tables.len(),
            mdat_bytes = mdat_size,
            moov_bytes = moov.len(),
            "container writer finalized"
        );

        Ok(self.out)
    }
}

fn validate_format(format: &TrackFormat) -> Result<()> {
    let handler = format.handler();
    if !handler.is_audio() && !handler.is_video() {
        return Err(ContainerError::unsupported(format!(
            "{} tracks with handler {:?} cannot be written",
            format.mime(),
            handler
        )));
    }
    if format.timescale() == 0 {
        return Err(ContainerError::unsupported("media timescale is zero"));
    }

    let entry = format.sample_entry();
    if be_u32(entry, 0).map(|size| size as usize) != Some(entry.len()) {
        return Err(ContainerError::unsupported("sample entry is not a well-formed box"));
    }
    if fourcc(entry, 4) != Some(format.codec()) {
        return Err(ContainerError::unsupported("sample entry does not match the codec"));
    }

    Ok(())
}

fn clamp_u32(value: u64) -> u32 {
    value.min(u32::MAX as u64) as u32
}

/// Sample tables accumulated while writing one track.
#[derive(Debug, Default)]
pub(crate) struct TrackTables {
    sizes: Vec<u32>,
    dts: Vec<u64>,
    sync: Vec<bool>,
    chunk_offsets: Vec<u64>,
    chunk_lengths: Vec<u32>,
    last_duration: u32,
}

impl TrackTables {
    /// Open a new chunk starting at `offset` in the file.
    pub(crate) fn start_chunk(&mut self, offset: u64) {
        self.chunk_offsets.push(offset);
        self.chunk_lengths.push(0);
    }

    /// Record a sample in the current chunk.
    pub(crate) fn push(&mut self, size: u32, dts: u64, is_sync: bool) {
        self.sizes.push(size);
        self.dts.push(dts);
        self.sync.push(is_sync);
        if let Some(len) = self.chunk_lengths.last_mut() {
            *len += 1;
        }
    }

    /// Duration of the final sample, which has no successor to measure against.
    pub(crate) fn set_last_duration(&mut self, ticks: u32) {
        self.last_duration = ticks;
    }

    pub(crate) fn len(&self) -> usize {
        self.sizes.len()
    }

    fn last_dts(&self) -> u64 {
        self.dts.last().copied().unwrap_or(0)
    }

    /// End of the last sample, in ticks.
    pub(crate) fn duration(&self) -> u64 {
        match self.dts.last() {
            Some(&dts) => dts + self.last_duration as u64,
            None => 0,
        }
    }

    fn durations(&self) -> impl Iterator<Item = u32> + '_ {
        let deltas = self.dts.windows(2).map(|w| clamp_u32(w[1] - w[0]));
        let last = (!self.dts.is_empty()).then_some(self.last_duration);
        deltas.chain(last)
    }

    /// Run-length `(count, delta)` entries.
    fn stts_entries(&self) -> Vec<(u32, u32)> {
        let mut entries: Vec<(u32, u32)> = Vec::new();
        for delta in self.durations() {
            match entries.last_mut() {
                Some((count, last)) if *last == delta => *count += 1,
                _ => entries.push((1, delta)),
            }
        }
        entries
    }

    /// 1-based sync sample numbers, or `None` when every sample is sync.
    fn sync_numbers(&self) -> Option<Vec<u32>> {
        if self.sync.iter().all(|&s| s) {
            return None;
        }
        Some(
            self.sync
                .iter()
                .enumerate()
                .filter(|(_, &s)| s)
                .map(|(i, _)| i as u32 + 1)
                .collect(),
        )
    }

    /// `(first_chunk, samples_per_chunk, description_index)` runs.
    fn stsc_entries(&self) -> Vec<(u32, u32, u32)> {
        let mut entries: Vec<(u32, u32, u32)> = Vec::new();
        for (i, &len) in self.chunk_lengths.iter().enumerate() {
            if entries.last().map_or(true, |&(_, n, _)| n != len) {
                entries.push((i as u32 + 1, len, 1));
            }
        }
        entries
    }
}

/// Presentation offset into the media, in the track timescale.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Edit {
    media_start: Option<u64>,
}

impl Edit {
    /// An edit is only written when it leaves something to present.
    pub(crate) fn new(media_start: u64, duration: u64) -> Self {
        Self {
            media_start: (media_start > 0 && media_start < duration).then_some(media_start),
        }
    }

    fn presented(self, duration: u64) -> u64 {
        duration - self.media_start.unwrap_or(0)
    }
}

/// Serialize one `trak` for `format` with the given tables.
pub(crate) fn write_trak(
    buf: &mut BytesMut,
    track_id: u32,
    format: &TrackFormat,
    tables: &TrackTables,
    edit: Edit,
) {
    let handler = format.handler();
    let duration = tables.duration();
    let dimensions = (format.width().unwrap_or(0), format.height().unwrap_or(0));

    let trak = boxes::begin_box(buf, b"trak");
    boxes::write_tkhd(buf, track_id, edit.presented(duration), handler, dimensions);
    if let Some(media_start) = edit.media_start {
        boxes::write_edts(buf, edit.presented(duration), media_start);
    }

    let mdia = boxes::begin_box(buf, b"mdia");
    boxes::write_mdhd(buf, format.timescale(), duration, format.language());
    boxes::write_hdlr(buf, handler);

    let minf = boxes::begin_box(buf, b"minf");
    boxes::write_media_header(buf, handler);
    boxes::write_dinf(buf);

    let stbl = boxes::begin_box(buf, b"stbl");
    boxes::write_stsd(buf, format.sample_entry());
    boxes::write_stts(buf, &tables.stts_entries());
    if let Some(sync) = tables.sync_numbers() {
        boxes::write_stss(buf, &sync);
    }
    boxes::write_stsz(buf, &tables.sizes);
    boxes::write_stsc(buf, &tables.stsc_entries());
    boxes::write_chunk_offsets(buf, &tables.chunk_offsets);
    boxes::end_box(buf, stbl);

    boxes::end_box(buf, minf);
    boxes::end_box(buf, mdia);
    boxes::end_box(buf, trak);
}
