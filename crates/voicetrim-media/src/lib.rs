//! Voicetrim-Media: MP4/M4A sample-stream reading and stream-copy writing
//!
//! This crate is the container layer of voicetrim. It turns an MP4 file into
//! a cursor over compressed samples and serializes compressed samples back
//! into a new MP4 file, carrying the codec configuration across byte for byte.
//!
//! # Modules
//!
//! - `mp4` - Atom walking, sample table resolution, box serialization
//! - `format` - Track format description (MIME, sample entry bytes)
//! - `reader` - Seekable sample cursor over the first audio track
//! - `writer` - Single-track writer (`ftyp`, `mdat`, `moov`)
//!
//! # Architecture
//!
//! Reading parses `moov` once and resolves every sample's offset, size, time
//! and sync flag up front. Sample payloads are read on demand into a buffer
//! owned by the caller. Writing streams payloads into `mdat` and builds the
//! sample tables in memory; `moov` is appended when the writer is finalized.

pub mod error;
pub mod format;
pub mod mp4;
pub mod reader;
pub mod sample;
pub mod writer;

pub use error::{ContainerError, Result};
pub use format::{mime_for, TrackFormat};
pub use mp4::{HandlerType, Mp4File};
pub use reader::{ContainerReader, TrackSummary};
pub use sample::{ticks_to_us, us_to_ticks, SampleInfo, SeekPolicy, TrackIndex};
pub use writer::{ActiveWriter, ContainerWriter, DEFAULT_SAMPLES_PER_CHUNK};
