//! MP4 atom walker that builds an [`Mp4File`].

use super::atoms::{be_u16, be_u32, be_u64, fourcc, UNDETERMINED_LANGUAGE};
use super::{Atom, AtomType, HandlerType, Mp4File, ParsedTrack, SampleTableBuilder};
use crate::format::TrackFormat;
use crate::{ContainerError, Result};
use std::io::{Read, Seek, SeekFrom};

/// Maximum allowed atom data size (64 MB) to prevent OOM on malformed files.
const MAX_ATOM_DATA_SIZE: u64 = 64 * 1024 * 1024;

/// MP4 atom parser.
pub struct Mp4Parser<'a, R> {
    reader: &'a mut R,
    file_size: u64,
}

impl<'a, R: Read + Seek> Mp4Parser<'a, R> {
    /// Create a new parser over a seekable reader.
    pub fn new(reader: &'a mut R) -> Result<Self> {
        let file_size = reader.seek(SeekFrom::End(0)).map_err(ContainerError::read_io)?;
        reader.seek(SeekFrom::Start(0)).map_err(ContainerError::read_io)?;
        Ok(Self { reader, file_size })
    }

    /// Parse the MP4 file.
    pub fn parse(&mut self) -> Result<Mp4File> {
        let mut mp4 = Mp4File {
            duration: 0,
            timescale: 1000,
            tracks: Vec::new(),
            has_faststart: false,
        };

        let atoms = self.read_atoms(0, self.file_size)?;

        let mut moov_offset = None;
        let mut mdat_offset = None;

        for atom in &atoms {
            match atom.atom_type {
                AtomType::MOOV if moov_offset.is_none() => {
                    moov_offset = Some(atom.data_offset - atom.header_size as u64);
                    self.parse_moov(atom, &mut mp4)?;
                }
                AtomType::MDAT if mdat_offset.is_none() => {
                    mdat_offset = Some(atom.data_offset - atom.header_size as u64);
                }
                _ => {}
            }
        }

        let Some(moov_offset) = moov_offset else {
            return Err(ContainerError::unreadable("missing moov atom"));
        };

        // Faststart means moov comes before mdat
        mp4.has_faststart = mdat_offset.map_or(true, |mdat| moov_offset < mdat);

        Ok(mp4)
    }

    /// Read atom headers between `start` and `end`.
    fn read_atoms(&mut self, start: u64, end: u64) -> Result<Vec<Atom>> {
        let mut atoms = Vec::new();
        let mut pos = start;

        while end.saturating_sub(pos) >= 8 {
            self.reader.seek(SeekFrom::Start(pos)).map_err(ContainerError::read_io)?;

            let mut header = [0u8; 8];
            self.reader.read_exact(&mut header).map_err(ContainerError::read_io)?;

            let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
            let atom_type = AtomType::from_bytes([header[4], header[5], header[6], header[7]]);

            let (actual_size, header_size) = if size == 1 {
                // 64-bit extended size
                let mut ext = [0u8; 8];
                self.reader.read_exact(&mut ext).map_err(ContainerError::read_io)?;
                (u64::from_be_bytes(ext), 16u8)
            } else if size == 0 {
                // Atom extends to end of enclosing range
                (end - pos, 8u8)
            } else {
                (size, 8u8)
            };

            // pos <= end holds here, so the subtraction cannot wrap
            if actual_size < header_size as u64 || actual_size > end - pos {
                return Err(ContainerError::unreadable(format!(
                    "atom {} at offset {} has invalid size {}",
                    atom_type, pos, actual_size
                )));
            }

            atoms.push(Atom {
                atom_type,
                size: actual_size,
                data_offset: pos + header_size as u64,
                header_size,
            });

            pos += actual_size;
        }

        Ok(atoms)
    }

    /// Read and validate atom data, rejecting oversized atoms.
    fn read_atom_data(&mut self, atom: &Atom) -> Result<Vec<u8>> {
        let size = atom.data_size();
        if size > MAX_ATOM_DATA_SIZE {
            return Err(ContainerError::unreadable(format!(
                "atom {} data size {} exceeds maximum {}",
                atom.atom_type, size, MAX_ATOM_DATA_SIZE
            )));
        }
        self.reader
            .seek(SeekFrom::Start(atom.data_offset))
            .map_err(ContainerError::read_io)?;
        let mut data = vec![0u8; size as usize];
        self.reader.read_exact(&mut data).map_err(ContainerError::read_io)?;
        Ok(data)
    }

    fn children(&mut self, parent: &Atom) -> Result<Vec<Atom>> {
        self.read_atoms(parent.data_offset, parent.end())
    }

    fn parse_moov(&mut self, moov: &Atom, mp4: &mut Mp4File) -> Result<()> {
        for child in &self.children(moov)? {
            match child.atom_type {
                AtomType::MVHD => self.parse_mvhd(child, mp4)?,
                AtomType::TRAK => {
                    let track = self.parse_trak(child)?;
                    mp4.tracks.push(track);
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Parse mvhd (movie header).
    fn parse_mvhd(&mut self, atom: &Atom, mp4: &mut Mp4File) -> Result<()> {
        let data = self.read_atom_data(atom)?;

        let parsed = match data.first().copied() {
            Some(0) => be_u32(&data, 12).zip(be_u32(&data, 16).map(u64::from)),
            Some(_) => be_u32(&data, 20).zip(be_u64(&data, 24)),
            None => None,
        };
        if let Some((timescale, duration)) = parsed {
            mp4.timescale = timescale;
            mp4.duration = duration;
        }

        Ok(())
    }

    /// Parse trak (track) atom.
    fn parse_trak(&mut self, trak: &Atom) -> Result<ParsedTrack> {
        let mut track = ParsedTrack::new(0);
        let mut stsd = None;
        let mut stbl = None;

        for child in &self.children(trak)? {
            match child.atom_type {
                AtomType::TKHD => self.parse_tkhd(child, &mut track)?,
                AtomType::EDTS => {
                    for edts_child in &self.children(child)? {
                        if edts_child.atom_type == AtomType::ELST {
                            self.parse_elst(edts_child, &mut track)?;
                        }
                    }
                }
                AtomType::MDIA => self.parse_mdia(child, &mut track, &mut stsd, &mut stbl)?,
                _ => {}
            }
        }

        // stsd is only interpreted once hdlr and mdhd are known
        if let Some(entry) = stsd {
            track.format = Some(TrackFormat::from_sample_entry(
                track.handler_type,
                track.timescale,
                track.language,
                entry,
            )?);
        }
        if let Some(builder) = stbl {
            track.sample_table = SampleTableBuilder::build(builder)?;
        }

        Ok(track)
    }

    /// Parse tkhd (track header).
    fn parse_tkhd(&mut self, atom: &Atom, track: &mut ParsedTrack) -> Result<()> {
        let data = self.read_atom_data(atom)?;

        let id = match data.first().copied() {
            Some(0) => be_u32(&data, 12),
            Some(_) => be_u32(&data, 20),
            None => None,
        };
        if let Some(id) = id {
            track.track_id = id;
        }

        Ok(())
    }

    /// Parse elst (edit list), keeping where the first real edit starts.
    fn parse_elst(&mut self, atom: &Atom, track: &mut ParsedTrack) -> Result<()> {
        let data = self.read_atom_data(atom)?;

        let (entry_size, wide) = match data.first().copied() {
            Some(0) => (12, false),
            Some(_) => (20, true),
            None => return Ok(()),
        };
        let media_times = read_entries(&data, entry_size, |d, pos| {
            if wide {
                be_u64(d, pos + 8).map(|t| t as i64)
            } else {
                be_u32(d, pos + 4).map(|t| t as i32 as i64)
            }
        });

        // -1 marks an empty edit
        if let Some(&start) = media_times.iter().find(|&&t| t >= 0) {
            track.media_start = start as u64;
        }

        Ok(())
    }

    /// Parse mdia (media) atom.
    fn parse_mdia(
        &mut self,
        mdia: &Atom,
        track: &mut ParsedTrack,
        stsd: &mut Option<Vec<u8>>,
        stbl: &mut Option<SampleTableBuilder>,
    ) -> Result<()> {
        for child in &self.children(mdia)? {
            match child.atom_type {
                AtomType::MDHD => self.parse_mdhd(child, track)?,
                AtomType::HDLR => self.parse_hdlr(child, track)?,
                AtomType::MINF => {
                    for minf_child in &self.children(child)? {
                        if minf_child.atom_type == AtomType::STBL {
                            *stbl = Some(self.parse_stbl(minf_child, stsd)?);
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Parse mdhd (media header).
    fn parse_mdhd(&mut self, atom: &Atom, track: &mut ParsedTrack) -> Result<()> {
        let data = self.read_atom_data(atom)?;

        let (timescale, duration, language) = match data.first().copied() {
            Some(0) => (be_u32(&data, 12), be_u32(&data, 16).map(u64::from), be_u16(&data, 20)),
            Some(_) => (be_u32(&data, 20), be_u64(&data, 24), be_u16(&data, 32)),
            None => (None, None, None),
        };

        let timescale =
            timescale.ok_or_else(|| ContainerError::unreadable("mdhd too short for timescale"))?;
        if timescale == 0 {
            return Err(ContainerError::unreadable("mdhd timescale is zero"));
        }
        track.timescale = timescale;
        track.duration = duration.unwrap_or(0);
        track.language = language.unwrap_or(UNDETERMINED_LANGUAGE);

        Ok(())
    }

    /// Parse hdlr (handler) atom.
    fn parse_hdlr(&mut self, atom: &Atom, track: &mut ParsedTrack) -> Result<()> {
        let data = self.read_atom_data(atom)?;

        if let Some(handler) = fourcc(&data, 8) {
            track.handler_type = HandlerType::from_bytes(handler);
        }

        Ok(())
    }

    /// Parse stbl (sample table) atom.
    fn parse_stbl(&mut self, stbl: &Atom, stsd: &mut Option<Vec<u8>>) -> Result<SampleTableBuilder> {
        let mut builder = SampleTableBuilder::new(self.file_size);

        for child in &self.children(stbl)? {
            match child.atom_type {
                AtomType::STSD => *stsd = self.parse_stsd(child)?,
                AtomType::STTS => {
                    let data = self.read_atom_data(child)?;
                    builder.set_stts(read_pairs(&data, |a, b| (a, b)));
                }
                AtomType::CTTS => {
                    let data = self.read_atom_data(child)?;
                    // v0 offsets are nominally unsigned but written signed in practice
                    builder.set_ctts(read_pairs(&data, |count, raw| (count, raw as i32)));
                }
                AtomType::STSS => {
                    let data = self.read_atom_data(child)?;
                    builder.set_sync_samples(read_entries(&data, 4, |d, pos| be_u32(d, pos)));
                }
                AtomType::STSC => {
                    let data = self.read_atom_data(child)?;
                    builder.set_stsc(read_entries(&data, 12, |d, pos| {
                        Some((be_u32(d, pos)?, be_u32(d, pos + 4)?, be_u32(d, pos + 8)?))
                    }));
                }
                AtomType::STSZ => self.parse_stsz(child, &mut builder)?,
                AtomType::STCO => {
                    let data = self.read_atom_data(child)?;
                    builder.set_chunk_offsets(read_entries(&data, 4, |d, pos| {
                        be_u32(d, pos).map(u64::from)
                    }));
                }
                AtomType::CO64 => {
                    let data = self.read_atom_data(child)?;
                    builder.set_chunk_offsets(read_entries(&data, 8, |d, pos| be_u64(d, pos)));
                }
                _ => {}
            }
        }

        Ok(builder)
    }

    /// Parse stsz (sample size).
    fn parse_stsz(&mut self, atom: &Atom, builder: &mut SampleTableBuilder) -> Result<()> {
        let data = self.read_atom_data(atom)?;

        let (Some(uniform_size), Some(sample_count)) = (be_u32(&data, 4), be_u32(&data, 8)) else {
            return Err(ContainerError::unreadable("stsz too short"));
        };

        let sizes = if uniform_size == 0 {
            (0..sample_count as usize)
                .map_while(|i| be_u32(&data, 12 + i * 4))
                .collect()
        } else {
            Vec::new()
        };

        builder.set_stsz(uniform_size, sample_count, sizes);
        Ok(())
    }

    /// Parse stsd (sample description) and return the first entry verbatim.
    fn parse_stsd(&mut self, atom: &Atom) -> Result<Option<Vec<u8>>> {
        let data = self.read_atom_data(atom)?;

        // version/flags (4) + entry count (4), then the first entry box
        let entry_count = be_u32(&data, 4).unwrap_or(0);
        if entry_count == 0 {
            return Ok(None);
        }
        let entry_size = be_u32(&data, 8)
            .ok_or_else(|| ContainerError::unreadable("stsd entry missing"))? as usize;
        let entry = data
            .get(8..8 + entry_size)
            .ok_or_else(|| ContainerError::unreadable("stsd entry overruns its box"))?;

        Ok(Some(entry.to_vec()))
    }
}

/// Read a full-box table of `(u32, u32)` pairs following the entry count.
fn read_pairs<T>(data: &[u8], map: impl Fn(u32, u32) -> T) -> Vec<T> {
    read_entries(data, 8, |d, pos| Some(map(be_u32(d, pos)?, be_u32(d, pos + 4)?)))
}

/// Read a full-box table: version/flags (4), entry count (4), fixed-size entries.
fn read_entries<T>(
    data: &[u8],
    entry_size: usize,
    read: impl Fn(&[u8], usize) -> Option<T>,
) -> Vec<T> {
    let entry_count = be_u32(data, 4).unwrap_or(0) as usize;
    let available = data.len().saturating_sub(8) / entry_size;
    (0..entry_count.min(available))
        .map_while(|i| read(data, 8 + i * entry_size))
        .collect()
}
