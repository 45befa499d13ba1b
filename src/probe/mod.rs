//! Container inspection without modification.

use crate::error::{Error, Result, TrimStage};
use serde::Serialize;
use std::path::{Path, PathBuf};
use voicetrim_media::{ContainerError, ContainerReader, TrackSummary};

/// Everything a caller needs to offer a trim on a file.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub path: PathBuf,
    pub file_size: u64,
    /// Whether `moov` precedes `mdat`.
    pub faststart: bool,
    /// Index of the track a trim would operate on.
    pub selected_track: usize,
    /// Duration of the selected track.
    pub duration_us: i64,
    pub tracks: Vec<TrackSummary>,
}

impl ProbeReport {
    /// The selected track's summary.
    pub fn selected(&self) -> Option<&TrackSummary> {
        self.tracks.get(self.selected_track)
    }

    /// Duration rounded down to whole milliseconds, as a range slider wants it.
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration_us / 1000).unwrap_or(0)
    }
}

/// Open `path` and describe its tracks.
pub fn probe_file(path: &Path) -> Result<ProbeReport> {
    let stage = TrimStage::Reading;
    let file_size = std::fs::metadata(path)
        .map_err(|e| Error::at(stage)(ContainerError::unreadable(format!("{}: {}", path.display(), e))))?
        .len();

    let mut reader = ContainerReader::open(path).map_err(Error::at(stage))?;
    let selected = reader.select_track();

    Ok(ProbeReport {
        path: path.to_path_buf(),
        file_size,
        faststart: reader.is_faststart(),
        selected_track: selected.0,
        duration_us: reader.duration_us(),
        tracks: reader.tracks(),
    })
}
