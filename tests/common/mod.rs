//! Shared fixtures: recordings synthesized with the container writer.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use voicetrim_media::{
    ContainerReader, ContainerWriter, HandlerType, SampleInfo, TrackFormat,
};

pub const SAMPLE_RATE: u32 = 44100;
/// 200 ms at 44.1 kHz.
pub const SAMPLE_TICKS: u64 = 8820;

/// An `mp4a` sample entry with an AAC-LC `esds`.
pub fn mp4a_entry(sample_rate: u32, channels: u16) -> Vec<u8> {
    let mut entry = Vec::new();
    entry.extend_from_slice(&0u32.to_be_bytes());
    entry.extend_from_slice(b"mp4a");
    entry.extend_from_slice(&[0; 6]);
    entry.extend_from_slice(&1u16.to_be_bytes()); // data reference index
    entry.extend_from_slice(&[0; 8]); // version, revision, vendor
    entry.extend_from_slice(&channels.to_be_bytes());
    entry.extend_from_slice(&16u16.to_be_bytes());
    entry.extend_from_slice(&[0; 4]);
    entry.extend_from_slice(&(sample_rate << 16).to_be_bytes());

    let esds: &[u8] = &[
        0, 0, 0, 0, 0x03, 0x19, 0x00, 0x01, 0x00, 0x04, 0x11, 0x40, 0x15, 0x00, 0x00, 0x00, 0x00,
        0x01, 0xF4, 0x00, 0x00, 0x01, 0xF4, 0x00, 0x05, 0x02, 0x12, 0x08, 0x06, 0x01, 0x02,
    ];
    entry.extend_from_slice(&(8 + esds.len() as u32).to_be_bytes());
    entry.extend_from_slice(b"esds");
    entry.extend_from_slice(esds);

    let len = entry.len() as u32;
    entry[..4].copy_from_slice(&len.to_be_bytes());
    entry
}

/// An `avc1` sample entry, for containers without audio.
pub fn avc1_entry(width: u16, height: u16) -> Vec<u8> {
    let mut entry = Vec::new();
    entry.extend_from_slice(&0u32.to_be_bytes());
    entry.extend_from_slice(b"avc1");
    entry.extend_from_slice(&[0; 6]);
    entry.extend_from_slice(&1u16.to_be_bytes());
    entry.extend_from_slice(&[0; 16]);
    entry.extend_from_slice(&width.to_be_bytes());
    entry.extend_from_slice(&height.to_be_bytes());
    entry.extend_from_slice(&0x0048_0000u32.to_be_bytes());
    entry.extend_from_slice(&0x0048_0000u32.to_be_bytes());
    entry.extend_from_slice(&[0; 4]);
    entry.extend_from_slice(&1u16.to_be_bytes());
    entry.extend_from_slice(&[0; 32]);
    entry.extend_from_slice(&0x0018u16.to_be_bytes());
    entry.extend_from_slice(&(-1i16).to_be_bytes());

    let len = entry.len() as u32;
    entry[..4].copy_from_slice(&len.to_be_bytes());
    entry
}

pub fn aac_format() -> TrackFormat {
    TrackFormat::from_sample_entry(HandlerType::Audio, SAMPLE_RATE, 0x55C4, mp4a_entry(SAMPLE_RATE, 1))
        .unwrap()
}

pub fn avc_format() -> TrackFormat {
    TrackFormat::from_sample_entry(HandlerType::Video, 90000, 0x55C4, avc1_entry(320, 240)).unwrap()
}

/// Sample `i` of a recording: 200 ms long, payload size varying with `i`.
pub fn sample(i: usize, payload_len: usize, is_sync: bool) -> (Vec<u8>, SampleInfo) {
    let payload: Vec<u8> = (0..payload_len).map(|b| (b + i * 7) as u8).collect();
    let info = SampleInfo {
        pts_us: voicetrim_media::ticks_to_us(i as u64 * SAMPLE_TICKS, SAMPLE_RATE),
        duration_us: voicetrim_media::ticks_to_us(SAMPLE_TICKS, SAMPLE_RATE),
        size: payload.len(),
        is_sync,
    };
    (payload, info)
}

pub fn write_file(path: &Path, format: &TrackFormat, samples: &[(Vec<u8>, SampleInfo)]) {
    let mut writer = ContainerWriter::create(path, format).unwrap().start().unwrap();
    for (payload, info) in samples {
        writer.write_sample(payload, info).unwrap();
    }
    writer.finalize().unwrap();
}

/// A 10 s recording: 50 samples of 200 ms, sync points at 0 ms and 5000 ms.
pub fn recording_samples() -> Vec<(Vec<u8>, SampleInfo)> {
    (0..50).map(|i| sample(i, 40 + i % 13, i == 0 || i == 25)).collect()
}

pub fn write_recording(dir: &Path) -> PathBuf {
    let path = dir.join("memo.m4a");
    write_file(&path, &aac_format(), &recording_samples());
    path
}

/// Like [`write_recording`], with an edit list skipping `media_start` ticks of priming.
pub fn write_primed_recording(dir: &Path, media_start: u64) -> PathBuf {
    let path = dir.join("memo.m4a");
    let mut writer = ContainerWriter::create(&path, &aac_format())
        .unwrap()
        .with_media_start(media_start)
        .start()
        .unwrap();
    for (payload, info) in &recording_samples() {
        writer.write_sample(payload, info).unwrap();
    }
    writer.finalize().unwrap();
    path
}

/// A reader over an in-memory container holding `samples`, track selected.
pub fn reader_over(samples: &[(Vec<u8>, SampleInfo)]) -> ContainerReader<Cursor<Vec<u8>>> {
    let mut writer = ContainerWriter::new(Cursor::new(Vec::new()), &aac_format())
        .unwrap()
        .start()
        .unwrap();
    for (payload, info) in samples {
        writer.write_sample(payload, info).unwrap();
    }
    let bytes = writer.finalize().unwrap().into_inner();

    let mut reader = ContainerReader::from_reader(Cursor::new(bytes)).unwrap();
    reader.select_track();
    reader
}

/// Every sample in a file: metadata plus payload.
pub fn read_all(path: &Path) -> Vec<(Vec<u8>, SampleInfo)> {
    let mut reader = ContainerReader::open(path).unwrap();
    reader.select_track();
    let mut buf = vec![0u8; reader.max_sample_size().max(1)];
    let mut samples = Vec::new();
    while let Some(info) = reader.next_sample(&mut buf).unwrap() {
        samples.push((buf[..info.size].to_vec(), info));
    }
    samples
}

/// Names of every entry in `dir`, sorted.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
