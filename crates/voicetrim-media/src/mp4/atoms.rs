//! MP4 atom definitions and byte-level helpers.

use super::SampleTable;
use crate::format::TrackFormat;

/// Four-character atom type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const EDTS: Self = Self(*b"edts");
    pub const ELST: Self = Self(*b"elst");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const STSS: Self = Self(*b"stss");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");
    pub const CTTS: Self = Self(*b"ctts");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed atom header.
#[derive(Debug, Clone)]
pub struct Atom {
    /// Atom type code.
    pub atom_type: AtomType,
    /// Atom size including header.
    pub size: u64,
    /// File offset where atom data starts (after header).
    pub data_offset: u64,
    /// Size of the header (8 or 16 bytes).
    pub header_size: u8,
}

impl Atom {
    /// Get the data size (size - header).
    pub fn data_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size as u64)
    }

    /// File offset of the first byte after this atom.
    pub fn end(&self) -> u64 {
        self.data_offset + self.data_size()
    }
}

/// Handler type for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Video,
    Audio,
    Hint,
    Meta,
    Text,
    Unknown([u8; 4]),
}

impl HandlerType {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        match &bytes {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            b"hint" => Self::Hint,
            b"meta" => Self::Meta,
            b"text" => Self::Text,
            _ => Self::Unknown(bytes),
        }
    }

    /// The four-cc written into an `hdlr` box.
    pub fn to_bytes(self) -> [u8; 4] {
        match self {
            Self::Video => *b"vide",
            Self::Audio => *b"soun",
            Self::Hint => *b"hint",
            Self::Meta => *b"meta",
            Self::Text => *b"text",
            Self::Unknown(bytes) => bytes,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }
}

/// Everything parsed from one `trak` atom.
#[derive(Debug, Clone)]
pub struct ParsedTrack {
    /// Track ID from tkhd.
    pub track_id: u32,
    /// Handler type (video/audio/etc).
    pub handler_type: HandlerType,
    /// Track duration in media timescale.
    pub duration: u64,
    /// Media timescale (ticks per second for this track).
    pub timescale: u32,
    /// Packed ISO-639-2 language code from mdhd.
    pub language: u16,
    /// Media time where presentation starts, from the first non-empty
    /// `elst` entry (encoder priming). Zero without an edit list.
    pub media_start: u64,
    /// Resolved sample table.
    pub sample_table: SampleTable,
    /// First sample entry of stsd, if one was present.
    pub format: Option<TrackFormat>,
}

impl ParsedTrack {
    /// Create an empty track.
    pub fn new(track_id: u32) -> Self {
        Self {
            track_id,
            handler_type: HandlerType::Unknown([0; 4]),
            duration: 0,
            timescale: 1,
            language: UNDETERMINED_LANGUAGE,
            media_start: 0,
            sample_table: SampleTable::default(),
            format: None,
        }
    }
}

/// Packed "und" language code.
pub const UNDETERMINED_LANGUAGE: u16 = 0x55C4;

pub(crate) fn be_u16(data: &[u8], pos: usize) -> Option<u16> {
    let bytes = data.get(pos..pos + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn be_u32(data: &[u8], pos: usize) -> Option<u32> {
    let bytes = data.get(pos..pos + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn be_u64(data: &[u8], pos: usize) -> Option<u64> {
    let bytes = data.get(pos..pos + 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Some(u64::from_be_bytes(buf))
}

pub(crate) fn fourcc(data: &[u8], pos: usize) -> Option<[u8; 4]> {
    let bytes = data.get(pos..pos + 4)?;
    Some([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_round_trip() {
        for code in [*b"vide", *b"soun", *b"hint", *b"meta", *b"text", *b"sbtl"] {
            assert_eq!(HandlerType::from_bytes(code).to_bytes(), code);
        }
        assert!(HandlerType::from_bytes(*b"soun").is_audio());
        assert!(!HandlerType::from_bytes(*b"sbtl").is_audio());
    }

    #[test]
    fn test_be_helpers_bounds() {
        let data = [0x00, 0x01, 0x02, 0x03, 0x04];
        assert_eq!(be_u16(&data, 0), Some(0x0001));
        assert_eq!(be_u32(&data, 1), Some(0x01020304));
        assert_eq!(be_u32(&data, 2), None);
        assert_eq!(be_u64(&data, 0), None);
    }

    #[test]
    fn test_atom_type_display() {
        assert_eq!(AtomType::MOOV.to_string(), "moov");
        assert_eq!(AtomType::from_bytes([0xff, 0, 0, 0]).as_str(), "????");
    }
}
