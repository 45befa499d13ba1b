//! Trim orchestration.
//!
//! A trim walks `Idle → Reading → Writing → Swapping → Done`. Any failure
//! moves it to `Failed`; the staging file is dropped (and so deleted) on the
//! way out and the input file is never touched before the final rename.

mod progress;
mod range;
mod staging;
mod task;

pub use progress::ProgressSender;
pub use range::{select, Decision, RangeSelector, TimeRange};
pub use staging::Staging;
pub use task::trim_async;

use crate::config::Config;
use crate::error::{Error, Result, TrimStage};
use serde::Serialize;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use voicetrim_media::{
    ActiveWriter, ContainerError, ContainerReader, ContainerWriter, SampleInfo, TrackIndex,
};

/// A request to trim `input` in place to `range`.
#[derive(Debug, Clone)]
pub struct TrimRequest {
    pub input: PathBuf,
    pub range: TimeRange,
}

impl TrimRequest {
    pub fn new(input: impl Into<PathBuf>, range: TimeRange) -> Self {
        Self {
            input: input.into(),
            range,
        }
    }
}

/// Tunables for one trim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimOptions {
    /// Sample buffer size to start with.
    pub initial_buffer_bytes: usize,
    /// Largest sample the buffer may grow to hold.
    pub max_sample_bytes: usize,
    /// Samples per chunk in the output.
    pub samples_per_chunk: u32,
    /// fsync the staging file before the swap.
    pub fsync: bool,
}

impl Default for TrimOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for TrimOptions {
    fn from(config: &Config) -> Self {
        Self {
            initial_buffer_bytes: config.trim.initial_buffer_bytes,
            max_sample_bytes: config.trim.max_sample_bytes,
            samples_per_chunk: config.writer.samples_per_chunk,
            fsync: config.trim.fsync,
        }
    }
}

/// Outcome of a successful trim.
#[derive(Debug, Clone, Serialize)]
pub struct TrimReport {
    pub path: PathBuf,
    pub samples_written: usize,
    pub bytes_written: u64,
    /// Source timestamp of the first sample written.
    pub first_pts_us: Option<i64>,
    /// Source timestamp of the last sample written.
    pub last_pts_us: Option<i64>,
    pub output_duration_us: i64,
    pub elapsed: Duration,
}

/// What a trim would write, computed without touching the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrimPlan {
    pub source_duration_us: i64,
    pub source_samples: usize,
    pub samples: usize,
    pub bytes: u64,
    pub first_pts_us: Option<i64>,
    pub last_pts_us: Option<i64>,
}

/// Runs trims with a fixed set of options.
#[derive(Debug, Clone, Default)]
pub struct Trimmer {
    options: TrimOptions,
    progress: Arc<ProgressSender>,
}

impl Trimmer {
    pub fn new(options: TrimOptions) -> Self {
        Self {
            options,
            progress: Arc::new(ProgressSender::noop()),
        }
    }

    /// Builder: report every copied sample to `progress`.
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    pub fn options(&self) -> &TrimOptions {
        &self.options
    }

    /// Trim `request.input` in place.
    ///
    /// On success the input path holds the trimmed container. On any error,
    /// including cancellation, the input is left exactly as it was.
    pub fn trim(&self, request: &TrimRequest, cancel: &CancellationToken) -> Result<TrimReport> {
        let started = Instant::now();
        let mut run = TrimRun::new(&request.input);

        match self.run(request, cancel, &mut run) {
            Ok(mut report) => {
                run.advance(TrimStage::Done);
                report.elapsed = started.elapsed();
                tracing::info!(
                    path = %request.input.display(),
                    range = %request.range,
                    samples = report.samples_written,
                    bytes = report.bytes_written,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "trim complete"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(
                    path = %request.input.display(),
                    stage = %run.stage,
                    error = %e,
                    "trim failed, original left untouched"
                );
                run.advance(TrimStage::Failed);
                Err(e)
            }
        }
    }

    fn run(
        &self,
        request: &TrimRequest,
        cancel: &CancellationToken,
        run: &mut TrimRun<'_>,
    ) -> Result<TrimReport> {
        let selector = RangeSelector::new(request.range);

        run.advance(TrimStage::Reading);
        let mut reader = ContainerReader::open(&request.input).map_err(Error::at(run.stage))?;
        let track = reader.select_track();
        let format = reader.track_format(track).map_err(Error::at(run.stage))?.clone();
        let positioned = selector.position(&mut reader).map_err(Error::at(run.stage))?;
        // Priming only survives when the output starts at the source's first sample.
        let media_start = if positioned && reader.cursor() == 0 {
            reader.media_start_ticks()
        } else {
            0
        };
        log_selected(&reader, track);

        run.advance(TrimStage::Writing);
        let staging = Staging::create(&request.input)
            .map_err(|e| Error::at(run.stage)(ContainerError::WriteFailed(e)))?;
        let mut report = {
            let file = staging
                .file()
                .map_err(|e| Error::at(run.stage)(ContainerError::WriteFailed(e)))?;
            let mut writer = ContainerWriter::new(BufWriter::new(file), &format)
                .map_err(Error::at(run.stage))?
                .with_samples_per_chunk(self.options.samples_per_chunk)
                .with_media_start(media_start)
                .start()
                .map_err(Error::at(run.stage))?;

            let mut copy = CopyStats::default();
            if positioned {
                self.copy_samples(&mut reader, &mut writer, &selector, cancel, &mut copy)
                    .map_err(|e| e.or_stage(run.stage))?;
            }

            let report = copy.into_report(&request.input, writer.bytes_written());
            writer.finalize().map_err(Error::at(run.stage))?;
            report
        };
        if self.options.fsync {
            staging
                .sync()
                .map_err(|e| Error::at(run.stage)(ContainerError::WriteFailed(e)))?;
        }
        drop(reader);

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        run.advance(TrimStage::Swapping);
        report.path = staging.persist().map_err(|source| Error::SwapFailed {
            path: request.input.clone(),
            source,
        })?;

        Ok(report)
    }

    /// Stream samples from the reader's cursor until the range ends.
    fn copy_samples<R, W>(
        &self,
        reader: &mut ContainerReader<R>,
        writer: &mut ActiveWriter<W>,
        selector: &RangeSelector,
        cancel: &CancellationToken,
        copy: &mut CopyStats,
    ) -> std::result::Result<(), CopyError>
    where
        R: Read + Seek,
        W: Write + Seek,
    {
        let mut buf = vec![0u8; self.options.initial_buffer_bytes.min(self.options.max_sample_bytes)];

        loop {
            if cancel.is_cancelled() {
                return Err(CopyError::Cancelled);
            }

            let info = match reader.next_sample(&mut buf) {
                Ok(Some(info)) => info,
                Ok(None) => break,
                Err(ContainerError::BufferTooSmall { need, have })
                    if need <= self.options.max_sample_bytes =>
                {
                    let grown = need.next_power_of_two().min(self.options.max_sample_bytes);
                    tracing::trace!(need, have, grown, "growing sample buffer");
                    buf.resize(grown, 0);
                    continue;
                }
                Err(e) => return Err(CopyError::Container(e)),
            };

            if selector.decide(&info) == Decision::Stop {
                tracing::trace!(pts_us = info.pts_us, "range end reached");
                break;
            }

            writer
                .write_sample(&buf[..info.size], &info)
                .map_err(CopyError::Container)?;
            copy.record(&info);
            self.progress.send(copy.samples, info.pts_us);
        }

        Ok(())
    }

    /// Apply the range to the sample table without writing anything.
    pub fn plan(&self, request: &TrimRequest) -> Result<TrimPlan> {
        let stage = TrimStage::Reading;

        let mut reader = ContainerReader::open(&request.input).map_err(Error::at(stage))?;
        let track = reader.select_track();
        log_selected(&reader, track);

        let selected = select(&mut reader, request.range).map_err(Error::at(stage))?;
        let mut plan = TrimPlan {
            source_duration_us: reader.duration_us(),
            source_samples: reader.sample_count(),
            samples: selected.len(),
            bytes: 0,
            first_pts_us: None,
            last_pts_us: None,
        };
        for info in reader.remaining().take(selected.len()) {
            plan.bytes += info.size as u64;
            plan.first_pts_us.get_or_insert(info.pts_us);
            plan.last_pts_us = Some(info.pts_us);
        }

        Ok(plan)
    }
}

/// Current state of one trim, logged on every transition.
struct TrimRun<'a> {
    path: &'a Path,
    stage: TrimStage,
}

impl<'a> TrimRun<'a> {
    fn new(path: &'a Path) -> Self {
        Self {
            path,
            stage: TrimStage::Idle,
        }
    }

    fn advance(&mut self, next: TrimStage) {
        tracing::debug!(path = %self.path.display(), from = %self.stage, to = %next, "trim state");
        self.stage = next;
    }
}

fn log_selected<R: Read + Seek>(reader: &ContainerReader<R>, track: TrackIndex) {
    tracing::debug!(
        track = %track,
        tracks = reader.track_count(),
        samples = reader.sample_count(),
        duration_us = reader.duration_us(),
        "selected audio track"
    );
}

/// Failure inside the copy loop, before a stage is attached.
enum CopyError {
    Container(ContainerError),
    Cancelled,
}

impl CopyError {
    fn or_stage(self, stage: TrimStage) -> Error {
        match self {
            Self::Container(e) => Error::at(stage)(e),
            Self::Cancelled => Error::Cancelled,
        }
    }
}

#[derive(Debug, Default)]
struct CopyStats {
    samples: usize,
    first_pts_us: Option<i64>,
    last: Option<SampleInfo>,
}

impl CopyStats {
    fn record(&mut self, info: &SampleInfo) {
        self.samples += 1;
        self.first_pts_us.get_or_insert(info.pts_us);
        self.last = Some(*info);
    }

    fn into_report(self, path: &Path, bytes_written: u64) -> TrimReport {
        let output_duration_us = match (self.first_pts_us, self.last) {
            (Some(first), Some(last)) => last.pts_us - first + last.duration_us,
            _ => 0,
        };
        TrimReport {
            path: path.to_path_buf(),
            samples_written: self.samples,
            bytes_written,
            first_pts_us: self.first_pts_us,
            last_pts_us: self.last.map(|s| s.pts_us),
            output_duration_us,
            elapsed: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_follow_config() {
        let options = TrimOptions::default();
        assert_eq!(options.initial_buffer_bytes, 64 * 1024);
        assert_eq!(options.max_sample_bytes, 16 * 1024 * 1024);
        assert!(options.fsync);
    }

    #[test]
    fn test_copy_stats_report() {
        let mut stats = CopyStats::default();
        for i in 0..3 {
            stats.record(&SampleInfo {
                pts_us: 1_000_000 + i * 20_000,
                duration_us: 20_000,
                size: 10,
                is_sync: true,
            });
        }
        let report = stats.into_report(Path::new("memo.m4a"), 30);
        assert_eq!(report.samples_written, 3);
        assert_eq!(report.first_pts_us, Some(1_000_000));
        assert_eq!(report.last_pts_us, Some(1_040_000));
        assert_eq!(report.output_duration_us, 60_000);
    }

    #[test]
    fn test_empty_copy_report() {
        let report = CopyStats::default().into_report(Path::new("memo.m4a"), 0);
        assert_eq!(report.samples_written, 0);
        assert_eq!(report.output_duration_us, 0);
        assert_eq!(report.first_pts_us, None);
    }

    #[test]
    fn test_missing_input_fails_while_reading() {
        let dir = tempfile::tempdir().unwrap();
        let request = TrimRequest::new(dir.path().join("absent.m4a"), TimeRange::new(0, 1000).unwrap());
        let err = Trimmer::default()
            .trim(&request, &CancellationToken::new())
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Unreadable);
        assert_eq!(err.stage(), Some(TrimStage::Reading));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
