//! ISO BMFF box serialization for a single-track, non-fragmented movie.
//!
//! Each box follows the standard layout: 4-byte size (big-endian u32),
//! 4-byte type (ASCII), then box-specific content. Container boxes are
//! written with a placeholder size that is patched once the children are in.

use super::atoms::HandlerType;
use bytes::{BufMut, BytesMut};

/// Size of the `mdat` header reserved at start: 32-bit size of 1, type, 64-bit largesize.
pub(crate) const MDAT_HEADER_SIZE: u64 = 16;

/// Open a box and return its start offset for [`end_box`].
pub(crate) fn begin_box(buf: &mut BytesMut, box_type: &[u8; 4]) -> usize {
    let start = buf.len();
    buf.put_u32(0); // placeholder size
    buf.put_slice(box_type);
    start
}

/// Patch the size of a box opened with [`begin_box`].
pub(crate) fn end_box(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

/// Write a full box header (version + flags).
fn put_fullbox_header(buf: &mut BytesMut, version: u8, flags: u32) {
    buf.put_u32(((version as u32) << 24) | (flags & 0x00FF_FFFF));
}

fn put_identity_matrix(buf: &mut BytesMut) {
    for value in [0x00010000u32, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000] {
        buf.put_u32(value);
    }
}

/// Pick the header version that can hold `duration`.
fn version_for(duration: u64) -> u8 {
    if duration > u32::MAX as u64 {
        1
    } else {
        0
    }
}

fn put_times_and_duration(buf: &mut BytesMut, version: u8, timescale: Option<u32>, duration: u64) {
    if version == 1 {
        buf.put_u64(0); // creation time
        buf.put_u64(0); // modification time
        if let Some(ts) = timescale {
            buf.put_u32(ts);
        }
        buf.put_u64(duration);
    } else {
        buf.put_u32(0);
        buf.put_u32(0);
        if let Some(ts) = timescale {
            buf.put_u32(ts);
        }
        buf.put_u32(duration as u32);
    }
}

// ---------------------------------------------------------------------------
// File-level boxes
// ---------------------------------------------------------------------------

/// ftyp: `M4A ` for audio-only files, `isom` otherwise.
pub(crate) fn write_ftyp(buf: &mut BytesMut, audio: bool) {
    let (major, brands): (&[u8; 4], [&[u8; 4]; 3]) = if audio {
        (b"M4A ", [b"M4A ", b"isom", b"mp42"])
    } else {
        (b"isom", [b"isom", b"iso2", b"mp41"])
    };

    let start = begin_box(buf, b"ftyp");
    buf.put_slice(major);
    buf.put_u32(0); // minor version
    for brand in brands {
        buf.put_slice(brand);
    }
    end_box(buf, start);
}

/// mdat header with a 64-bit size field; the size is patched at finalize.
pub(crate) fn write_mdat_header(buf: &mut BytesMut, total_size: u64) {
    buf.put_u32(1);
    buf.put_slice(b"mdat");
    buf.put_u64(total_size);
}

// ---------------------------------------------------------------------------
// moov children
// ---------------------------------------------------------------------------

pub(crate) fn write_mvhd(buf: &mut BytesMut, timescale: u32, duration: u64, next_track_id: u32) {
    let version = version_for(duration);
    let start = begin_box(buf, b"mvhd");
    put_fullbox_header(buf, version, 0);
    put_times_and_duration(buf, version, Some(timescale), duration);
    buf.put_u32(0x00010000); // rate = 1.0
    buf.put_u16(0x0100); // volume = 1.0
    buf.put_u16(0); // reserved
    buf.put_u64(0); // reserved
    put_identity_matrix(buf);
    buf.put_slice(&[0; 24]); // pre_defined
    buf.put_u32(next_track_id);
    end_box(buf, start);
}

pub(crate) fn write_tkhd(
    buf: &mut BytesMut,
    track_id: u32,
    duration: u64,
    handler: HandlerType,
    dimensions: (u16, u16),
) {
    let version = version_for(duration);
    let start = begin_box(buf, b"tkhd");
    put_fullbox_header(buf, version, 0x000003); // enabled, in_movie
    if version == 1 {
        buf.put_u64(0);
        buf.put_u64(0);
        buf.put_u32(track_id);
        buf.put_u32(0); // reserved
        buf.put_u64(duration);
    } else {
        buf.put_u32(0);
        buf.put_u32(0);
        buf.put_u32(track_id);
        buf.put_u32(0);
        buf.put_u32(duration as u32);
    }
    buf.put_u64(0); // reserved
    buf.put_u16(0); // layer
    buf.put_u16(0); // alternate group
    buf.put_u16(if handler.is_audio() { 0x0100 } else { 0 }); // volume
    buf.put_u16(0); // reserved
    put_identity_matrix(buf);
    buf.put_u32((dimensions.0 as u32) << 16);
    buf.put_u32((dimensions.1 as u32) << 16);
    end_box(buf, start);
}

/// edts with a single `elst` entry starting presentation at `media_time`.
pub(crate) fn write_edts(buf: &mut BytesMut, segment_duration: u64, media_time: u64) {
    let version = version_for(segment_duration.max(media_time));
    let edts = begin_box(buf, b"edts");
    let elst = begin_box(buf, b"elst");
    put_fullbox_header(buf, version, 0);
    buf.put_u32(1); // entry count
    if version == 1 {
        buf.put_u64(segment_duration);
        buf.put_u64(media_time);
    } else {
        buf.put_u32(segment_duration as u32);
        buf.put_u32(media_time as u32);
    }
    buf.put_u16(1); // media rate integer
    buf.put_u16(0); // media rate fraction
    end_box(buf, elst);
    end_box(buf, edts);
}

pub(crate) fn write_mdhd(buf: &mut BytesMut, timescale: u32, duration: u64, language: u16) {
    let version = version_for(duration);
    let start = begin_box(buf, b"mdhd");
    put_fullbox_header(buf, version, 0);
    put_times_and_duration(buf, version, Some(timescale), duration);
    buf.put_u16(language);
    buf.put_u16(0); // pre_defined
    end_box(buf, start);
}

pub(crate) fn write_hdlr(buf: &mut BytesMut, handler: HandlerType) {
    let name: &[u8] = match handler {
        HandlerType::Audio => b"SoundHandler",
        HandlerType::Video => b"VideoHandler",
        _ => b"",
    };
    let start = begin_box(buf, b"hdlr");
    put_fullbox_header(buf, 0, 0);
    buf.put_u32(0); // pre_defined
    buf.put_slice(&handler.to_bytes());
    buf.put_slice(&[0; 12]); // reserved
    buf.put_slice(name);
    buf.put_u8(0); // null terminator
    end_box(buf, start);
}

/// smhd for sound tracks, vmhd for video.
pub(crate) fn write_media_header(buf: &mut BytesMut, handler: HandlerType) {
    if handler.is_video() {
        let start = begin_box(buf, b"vmhd");
        put_fullbox_header(buf, 0, 1);
        buf.put_u16(0); // graphics mode
        buf.put_slice(&[0; 6]); // opcolor
        end_box(buf, start);
    } else {
        let start = begin_box(buf, b"smhd");
        put_fullbox_header(buf, 0, 0);
        buf.put_u16(0); // balance
        buf.put_u16(0); // reserved
        end_box(buf, start);
    }
}

pub(crate) fn write_dinf(buf: &mut BytesMut) {
    let dinf = begin_box(buf, b"dinf");
    let dref = begin_box(buf, b"dref");
    put_fullbox_header(buf, 0, 0);
    buf.put_u32(1); // entry count
    let url = begin_box(buf, b"url ");
    put_fullbox_header(buf, 0, 1); // self-contained
    end_box(buf, url);
    end_box(buf, dref);
    end_box(buf, dinf);
}

// ---------------------------------------------------------------------------
// Sample tables
// ---------------------------------------------------------------------------

/// stsd with a single, verbatim sample entry.
pub(crate) fn write_stsd(buf: &mut BytesMut, sample_entry: &[u8]) {
    let start = begin_box(buf, b"stsd");
    put_fullbox_header(buf, 0, 0);
    buf.put_u32(1); // entry count
    buf.put_slice(sample_entry);
    end_box(buf, start);
}

/// stts from run-length `(count, delta)` entries.
pub(crate) fn write_stts(buf: &mut BytesMut, entries: &[(u32, u32)]) {
    let start = begin_box(buf, b"stts");
    put_fullbox_header(buf, 0, 0);
    buf.put_u32(entries.len() as u32);
    for (count, delta) in entries {
        buf.put_u32(*count);
        buf.put_u32(*delta);
    }
    end_box(buf, start);
}

/// stss from 1-based sync sample numbers.
pub(crate) fn write_stss(buf: &mut BytesMut, sync_samples: &[u32]) {
    let start = begin_box(buf, b"stss");
    put_fullbox_header(buf, 0, 0);
    buf.put_u32(sync_samples.len() as u32);
    for number in sync_samples {
        buf.put_u32(*number);
    }
    end_box(buf, start);
}

/// stsz, collapsing to a uniform size when every sample matches.
pub(crate) fn write_stsz(buf: &mut BytesMut, sizes: &[u32]) {
    let start = begin_box(buf, b"stsz");
    put_fullbox_header(buf, 0, 0);
    let uniform = match sizes.first() {
        Some(&first) if sizes.iter().all(|&s| s == first) => first,
        _ => 0,
    };
    buf.put_u32(uniform);
    buf.put_u32(sizes.len() as u32);
    if uniform == 0 {
        for size in sizes {
            buf.put_u32(*size);
        }
    }
    end_box(buf, start);
}

/// stsc from `(first_chunk, samples_per_chunk, description_index)` entries.
pub(crate) fn write_stsc(buf: &mut BytesMut, entries: &[(u32, u32, u32)]) {
    let start = begin_box(buf, b"stsc");
    put_fullbox_header(buf, 0, 0);
    buf.put_u32(entries.len() as u32);
    for (first_chunk, samples_per_chunk, description) in entries {
        buf.put_u32(*first_chunk);
        buf.put_u32(*samples_per_chunk);
        buf.put_u32(*description);
    }
    end_box(buf, start);
}

/// stco, or co64 when any offset needs more than 32 bits.
pub(crate) fn write_chunk_offsets(buf: &mut BytesMut, offsets: &[u64]) {
    let wide = offsets.iter().any(|&o| o > u32::MAX as u64);
    let start = begin_box(buf, if wide { b"co64" } else { b"stco" });
    put_fullbox_header(buf, 0, 0);
    buf.put_u32(offsets.len() as u32);
    for offset in offsets {
        if wide {
            buf.put_u64(*offset);
        } else {
            buf.put_u32(*offset as u32);
        }
    }
    end_box(buf, start);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_end_box_patches_size() {
        let mut buf = BytesMut::new();
        let start = begin_box(&mut buf, b"free");
        buf.put_slice(&[1, 2, 3]);
        end_box(&mut buf, start);
        assert_eq!(&buf[..], &[0, 0, 0, 11, b'f', b'r', b'e', b'e', 1, 2, 3]);
    }

    #[test]
    fn test_fixed_box_sizes() {
        let mut buf = BytesMut::new();
        write_mvhd(&mut buf, 1000, 5000, 2);
        assert_eq!(buf.len(), 108);

        let mut buf = BytesMut::new();
        write_tkhd(&mut buf, 1, 5000, HandlerType::Audio, (0, 0));
        assert_eq!(buf.len(), 92);

        let mut buf = BytesMut::new();
        write_mdhd(&mut buf, 44100, 5000, 0x55C4);
        assert_eq!(buf.len(), 32);

        let mut buf = BytesMut::new();
        write_dinf(&mut buf);
        assert_eq!(buf.len(), 36);
    }

    #[test]
    fn test_edts_layout() {
        let mut buf = BytesMut::new();
        write_edts(&mut buf, 439_488, 2112);
        assert_eq!(buf.len(), 36);
        assert_eq!(&buf[12..16], b"elst");
        assert_eq!(&buf[20..24], &1u32.to_be_bytes());
        assert_eq!(&buf[24..28], &439_488u32.to_be_bytes());
        assert_eq!(&buf[28..32], &2112u32.to_be_bytes());
        assert_eq!(&buf[32..34], &1u16.to_be_bytes());
    }

    #[test]
    fn test_wide_headers_for_long_durations() {
        let mut buf = BytesMut::new();
        write_mdhd(&mut buf, 48000, u32::MAX as u64 + 1, 0x55C4);
        assert_eq!(buf.len(), 44);
        assert_eq!(buf[8], 1);
    }

    #[test]
    fn test_stsz_uniform_collapse() {
        let mut buf = BytesMut::new();
        write_stsz(&mut buf, &[7, 7, 7]);
        assert_eq!(buf.len(), 20);
        assert_eq!(&buf[12..16], &7u32.to_be_bytes());

        let mut buf = BytesMut::new();
        write_stsz(&mut buf, &[7, 8]);
        assert_eq!(buf.len(), 28);
    }

    #[test]
    fn test_chunk_offsets_widen_when_needed() {
        let mut buf = BytesMut::new();
        write_chunk_offsets(&mut buf, &[16, 1024]);
        assert_eq!(&buf[4..8], b"stco");

        let mut buf = BytesMut::new();
        write_chunk_offsets(&mut buf, &[16, u32::MAX as u64 + 16]);
        assert_eq!(&buf[4..8], b"co64");
        assert_eq!(buf.len(), 16 + 16);
    }
}
