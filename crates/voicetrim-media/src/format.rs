//! Track format description.
//!
//! A [`TrackFormat`] wraps the first sample entry of a track's `stsd` box.
//! The entry bytes are kept verbatim so the writer can register the output
//! track with the exact codec configuration of the input; the typed fields
//! are parsed from those bytes and never written back.

use crate::mp4::atoms::{be_u16, be_u32, be_u64, fourcc, HandlerType};
use crate::{ContainerError, Result};

/// Size of the generic SampleEntry header: box header + reserved + data_reference_index.
const SAMPLE_ENTRY_HEADER: usize = 16;
/// Offset of child boxes in a version 0 AudioSampleEntry.
const AUDIO_CHILDREN_V0: usize = SAMPLE_ENTRY_HEADER + 20;
/// QuickTime sound description v1 adds four 32-bit fields.
const AUDIO_CHILDREN_V1: usize = AUDIO_CHILDREN_V0 + 16;
/// QuickTime sound description v2 adds 36 bytes.
const AUDIO_CHILDREN_V2: usize = AUDIO_CHILDREN_V0 + 36;
/// Offset of child boxes in a VisualSampleEntry.
const VISUAL_CHILDREN: usize = SAMPLE_ENTRY_HEADER + 70;

/// Child boxes that carry decoder-specific configuration.
const CONFIG_BOXES: [&[u8; 4]; 7] = [b"esds", b"dOps", b"dfLa", b"alac", b"damr", b"avcC", b"hvcC"];

/// Immutable codec configuration for one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFormat {
    mime: String,
    codec: [u8; 4],
    handler: HandlerType,
    timescale: u32,
    language: u16,
    sample_rate: Option<u32>,
    channels: Option<u16>,
    width: Option<u16>,
    height: Option<u16>,
    codec_config: Option<Vec<u8>>,
    sample_entry: Vec<u8>,
}

impl TrackFormat {
    /// Build a format from a complete sample-entry box (header included).
    pub fn from_sample_entry(
        handler: HandlerType,
        timescale: u32,
        language: u16,
        sample_entry: Vec<u8>,
    ) -> Result<Self> {
        let declared = be_u32(&sample_entry, 0)
            .ok_or_else(|| ContainerError::unreadable("sample entry shorter than a box header"))?;
        if declared as usize != sample_entry.len() {
            return Err(ContainerError::unreadable(format!(
                "sample entry declares {} bytes but holds {}",
                declared,
                sample_entry.len()
            )));
        }
        if sample_entry.len() < SAMPLE_ENTRY_HEADER {
            return Err(ContainerError::unreadable("sample entry truncated"));
        }
        let codec = fourcc(&sample_entry, 4)
            .ok_or_else(|| ContainerError::unreadable("sample entry missing four-cc"))?;

        let mut format = Self {
            mime: mime_for(codec, handler),
            codec,
            handler,
            timescale,
            language,
            sample_rate: None,
            channels: None,
            width: None,
            height: None,
            codec_config: None,
            sample_entry,
        };

        let children_at = match handler {
            HandlerType::Audio => format.parse_audio_fields(),
            HandlerType::Video => format.parse_visual_fields(),
            _ => None,
        };
        if let Some(pos) = children_at {
            format.codec_config = find_config_box(&format.sample_entry, pos);
        }

        Ok(format)
    }

    /// Returns the offset of the child boxes.
    fn parse_audio_fields(&mut self) -> Option<usize> {
        let data = &self.sample_entry;
        let version = be_u16(data, SAMPLE_ENTRY_HEADER)?;
        let (channels, rate, children) = match version {
            2 => {
                let rate = f64::from_bits(be_u64(data, AUDIO_CHILDREN_V0 + 4)?);
                let channels = be_u32(data, AUDIO_CHILDREN_V0 + 12)?;
                (channels as u16, rate as u32, AUDIO_CHILDREN_V2)
            }
            _ => {
                let channels = be_u16(data, SAMPLE_ENTRY_HEADER + 8)?;
                // 16.16 fixed point
                let rate = be_u32(data, SAMPLE_ENTRY_HEADER + 16)? >> 16;
                let children = if version == 1 { AUDIO_CHILDREN_V1 } else { AUDIO_CHILDREN_V0 };
                (channels, rate, children)
            }
        };

        self.channels = Some(channels);
        // Rates above 65535 Hz do not fit 16.16; the media timescale carries them.
        self.sample_rate = Some(if rate == 0 { self.timescale } else { rate });
        Some(children)
    }

    fn parse_visual_fields(&mut self) -> Option<usize> {
        self.width = Some(be_u16(&self.sample_entry, SAMPLE_ENTRY_HEADER + 16)?);
        self.height = Some(be_u16(&self.sample_entry, SAMPLE_ENTRY_HEADER + 18)?);
        Some(VISUAL_CHILDREN)
    }

    /// MIME type, e.g. `audio/mp4a-latm`.
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Whether this track carries audio, judged by its MIME type.
    pub fn is_audio(&self) -> bool {
        self.mime.starts_with("audio/")
    }

    /// Sample-entry four-cc, e.g. `mp4a`.
    pub fn codec(&self) -> [u8; 4] {
        self.codec
    }

    /// Sample-entry four-cc as text.
    pub fn codec_str(&self) -> &str {
        std::str::from_utf8(&self.codec).unwrap_or("????")
    }

    pub fn handler(&self) -> HandlerType {
        self.handler
    }

    /// Media timescale (ticks per second).
    pub fn timescale(&self) -> u32 {
        self.timescale
    }

    /// Packed ISO-639-2 language code.
    pub fn language(&self) -> u16 {
        self.language
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    pub fn channels(&self) -> Option<u16> {
        self.channels
    }

    pub fn width(&self) -> Option<u16> {
        self.width
    }

    pub fn height(&self) -> Option<u16> {
        self.height
    }

    /// Decoder-specific configuration payload (esds, dOps, ...), if found.
    pub fn codec_config(&self) -> Option<&[u8]> {
        self.codec_config.as_deref()
    }

    /// The complete sample-entry box as read from the source container.
    pub fn sample_entry(&self) -> &[u8] {
        &self.sample_entry
    }
}

/// Map a sample-entry four-cc to a MIME type.
pub fn mime_for(codec: [u8; 4], handler: HandlerType) -> String {
    let known = match &codec {
        b"mp4a" => Some("audio/mp4a-latm"),
        b"Opus" => Some("audio/opus"),
        b"fLaC" => Some("audio/flac"),
        b"alac" => Some("audio/alac"),
        b"samr" => Some("audio/3gpp"),
        b"sawb" => Some("audio/amr-wb"),
        b"ac-3" => Some("audio/ac3"),
        b"ec-3" => Some("audio/eac3"),
        b".mp3" => Some("audio/mpeg"),
        b"avc1" | b"avc3" => Some("video/avc"),
        b"hvc1" | b"hev1" => Some("video/hevc"),
        b"mp4v" => Some("video/mp4v-es"),
        _ => None,
    };
    if let Some(mime) = known {
        return mime.to_string();
    }

    let kind = match handler {
        HandlerType::Audio => "audio",
        HandlerType::Video => "video",
        _ => "application",
    };
    let code: String = codec
        .iter()
        .map(|&b| if b.is_ascii_alphanumeric() { (b as char).to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{kind}/x-{code}")
}

fn find_config_box(data: &[u8], mut pos: usize) -> Option<Vec<u8>> {
    while pos + 8 <= data.len() {
        let box_size = be_u32(data, pos)? as usize;
        let box_type = fourcc(data, pos + 4)?;
        if box_size < 8 || pos + box_size > data.len() {
            return None;
        }
        if CONFIG_BOXES.iter().any(|c| **c == box_type) {
            return Some(data[pos + 8..pos + box_size].to_vec());
        }
        pos += box_size;
    }
    None
}
