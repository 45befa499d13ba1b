//! MP4 container parsing and serialization primitives.
//!
//! This module is the low-level container library the reader and writer
//! share: atom walking, sample table resolution, and box serialization.

pub(crate) mod atoms;
pub(crate) mod boxes;
mod parser;
mod sample_table;

pub use atoms::{Atom, AtomType, HandlerType, ParsedTrack};
pub use parser::Mp4Parser;
pub use sample_table::{SampleEntry, SampleTable, SampleTableBuilder};

use crate::Result;
use std::io::{Read, Seek};

/// Parsed MP4 file with every track's sample table.
#[derive(Debug)]
pub struct Mp4File {
    /// Duration in movie timescale units.
    pub duration: u64,
    /// Movie timescale (time units per second).
    pub timescale: u32,
    /// Tracks in `moov` order.
    pub tracks: Vec<ParsedTrack>,
    /// Whether the file has faststart (moov before mdat).
    pub has_faststart: bool,
}

impl Mp4File {
    /// Parse an MP4 file from a reader.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        Mp4Parser::new(reader)?.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContainerError;
    use assert_matches::assert_matches;
    use std::io::Cursor;

    fn ftyp() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&16u32.to_be_bytes());
        bytes.extend_from_slice(b"ftypM4A \0\0\0\0");
        bytes
    }

    #[test]
    fn test_garbage_is_unreadable() {
        let mut cursor = Cursor::new(b"this is not an mp4 file at all".to_vec());
        assert_matches!(Mp4File::parse(&mut cursor), Err(ContainerError::Unreadable(_)));
    }

    #[test]
    fn test_missing_moov_is_unreadable() {
        let mut cursor = Cursor::new(ftyp());
        let err = Mp4File::parse(&mut cursor).unwrap_err();
        assert_eq!(err.to_string(), "unreadable container: missing moov atom");
    }

    #[test]
    fn test_huge_largesize_is_unreadable() {
        let mut bytes = ftyp();
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(b"free");
        bytes.extend_from_slice(&u64::MAX.to_be_bytes());

        let mut cursor = Cursor::new(bytes);
        assert_matches!(Mp4File::parse(&mut cursor), Err(ContainerError::Unreadable(_)));
    }

    #[test]
    fn test_largesize_past_parent_is_unreadable() {
        // moov whose only child claims more than the moov holds
        let mut bytes = ftyp();
        bytes.extend_from_slice(&24u32.to_be_bytes());
        bytes.extend_from_slice(b"moov");
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(b"trak");
        bytes.extend_from_slice(&(u64::MAX - 8).to_be_bytes());

        let mut cursor = Cursor::new(bytes);
        assert_matches!(Mp4File::parse(&mut cursor), Err(ContainerError::Unreadable(_)));
    }
}
