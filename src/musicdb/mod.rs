//! The modern `Library.musicdb` format engine: outer header, `hsma`
//! sections, and their track/playlist/album/artist/library sub-parsers.

mod boma;

pub use boma::{MusicdbTag, OtherTag, Utf16Tag, Utf8LongTag, Utf8ShortTag};
use boma::{read_boma, BomaOutcome};

use crate::crypto::{self};
use crate::error::DecodeError;
use crate::model::{MetadataContainer, PlaylistRecord, RawLibrary, Section, TrackRecord};
use crate::reader::Reader;

const OUTER_MAGIC: &[u8; 4] = b"hfma";
const SECTION_MAGIC: &[u8; 4] = b"hsma";

const SECTION_TRACK_MASTER: u32 = 1;
const SECTION_PLAYLIST_MASTER: u32 = 2;
const SECTION_INNER_MASTER: u32 = 3;
const SECTION_ALBUM_DATA: u32 = 4;
const SECTION_ARTIST_DATA: u32 = 5;
const SECTION_LIBRARY_MASTER: u32 = 6;
const SECTION_TRAILING_UNKNOWN: u32 = 17;

/// Decode a full `Library.musicdb` file.
pub fn decode(file_data: &[u8], key: &[u8]) -> Result<RawLibrary, DecodeError> {
    let header = Reader::new(file_data);
    header.expect_signature(0, OUTER_MAGIC)?;
    let header_len = header.u32_le_at(4)? as usize;
    let file_len = header.u32_le_at(8)? as usize;

    if file_len != file_data.len() {
        return Err(DecodeError::LengthMismatch(format!(
            "outer header declares file_len={file_len}, actual length is {}",
            file_data.len()
        )));
    }

    let version = version_string(header.bytes_at(16, 32)?);
    let max_crypt_size = header.u32_le_at(84)? as usize;
    let tz_offset = header.i32_le_at(88)?;
    let date = header.u32_le_at(100)?;

    let crypt_size = (file_len - header_len).min(max_crypt_size);

    let mut body = file_data[header_len..].to_vec();
    let decompressed = crypto::decode_body(&mut body, crypt_size, key)?;

    let sections = read_sections(&decompressed)?;

    Ok(RawLibrary {
        version,
        date,
        tz_offset,
        sections,
        library_location: None,
    })
}

fn version_string(bytes: &[u8]) -> String {
    let trimmed: Vec<u8> = bytes.iter().copied().filter(|&b| b != 0).collect();
    String::from_utf8_lossy(&trimmed).into_owned()
}

fn read_sections(data: &[u8]) -> Result<Vec<Section>, DecodeError> {
    let mut reader = Reader::new(data);
    let mut sections = Vec::new();
    while reader.position() < reader.len() {
        sections.push(read_hsma(&mut reader)?);
    }
    Ok(sections)
}

fn read_hsma(reader: &mut Reader) -> Result<Section, DecodeError> {
    let section_start = reader.position();
    reader.expect_signature(0, SECTION_MAGIC)?;
    let next_section_offset = reader.u32_le_at(4)? as i64;
    let section_len = reader.u32_le_at(8)? as usize;
    let section_type = reader.u32_le_at(12)?;
    let expected_end = section_start + section_len;

    reader.advance(next_section_offset)?;

    let section = match section_type {
        SECTION_TRACK_MASTER => Section::TrackMaster(read_track_master(reader)?),
        SECTION_PLAYLIST_MASTER => Section::PlaylistMaster(read_playlist_master(reader)?),
        SECTION_INNER_MASTER => {
            reader.expect_signature(0, OUTER_MAGIC)?;
            reader.advance((expected_end - reader.position()) as i64)?;
            Section::Other
        }
        SECTION_ALBUM_DATA => Section::AlbumList(read_list(reader, b"lama", b"iama")?),
        SECTION_ARTIST_DATA => Section::ArtistList(read_list(reader, b"lAma", b"iAma")?),
        SECTION_LIBRARY_MASTER => Section::LibraryMaster(read_library_master(reader)?),
        SECTION_TRAILING_UNKNOWN => {
            reader.advance((expected_end - reader.position()) as i64)?;
            Section::Other
        }
        other => {
            #[cfg(feature = "tracing")]
            tracing::trace!(section_type = other, "unrecognized musicdb section type, skipping");
            reader.advance((expected_end as i64) - (reader.position() as i64))?;
            Section::Other
        }
    };

    if reader.position() != expected_end {
        return Err(DecodeError::LengthMismatch(format!(
            "hsma section (type {section_type}) ended at {}, expected {expected_end}",
            reader.position()
        )));
    }

    Ok(section)
}

fn read_track_master(reader: &mut Reader) -> Result<Vec<TrackRecord>, DecodeError> {
    reader.expect_signature(0, b"ltma")?;
    let section_len = reader.u32_le_at(4)? as i64;
    let num_itma = reader.u32_le_at(8)?;
    reader.advance(section_len)?;

    (0..num_itma).map(|_| read_itma(reader)).collect()
}

fn read_itma(reader: &mut Reader) -> Result<TrackRecord, DecodeError> {
    reader.expect_signature(0, b"itma")?;
    let section_len = reader.u32_le_at(4)? as i64;
    let num_boma = reader.u32_le_at(12)?;
    let persistent_id = reader.u64_le_at(16)?;
    let id = reader.u32_le_at(24)?;
    let unchecked = reader.u16_le_at(42)?;
    let starred_val = reader.u16_le_at(62)?;
    let rating = reader.u8_at(65)?;

    reader.advance(section_len)?;

    let mut track = TrackRecord {
        persistent_id,
        id,
        starred: starred_val == 2,
        rating,
        unchecked,
        ..Default::default()
    };

    for _ in 0..num_boma {
        apply_boma_to_track(reader, &mut track)?;
    }

    Ok(track)
}

fn read_playlist_master(reader: &mut Reader) -> Result<Vec<PlaylistRecord>, DecodeError> {
    reader.expect_signature(0, b"lPma")?;
    let section_len = reader.u32_le_at(4)? as i64;
    let num_lpma = reader.u32_le_at(8)?;
    reader.advance(section_len)?;

    (0..num_lpma).map(|_| read_lpma(reader)).collect()
}

fn read_lpma(reader: &mut Reader) -> Result<PlaylistRecord, DecodeError> {
    let item_start = reader.position();
    reader.expect_signature(0, b"lpma")?;
    let section_len = reader.u32_le_at(4)? as i64;
    let sections_len = reader.u32_le_at(8)? as usize;
    let num_boma = reader.u32_le_at(12)?;
    let num_tracks = reader.u32_le_at(16)?;
    let persistent_id = reader.u64_le_at(39)?;
    let date_created = reader.u32_le_at(22)?;
    let date_modified = reader.u32_le_at(138)?;
    let expected_end = item_start + sections_len;

    reader.advance(section_len)?;

    let mut playlist = PlaylistRecord {
        persistent_id,
        date_created: (date_created != 0).then_some(date_created),
        date_modified: (date_modified != 0).then_some(date_modified),
        num_tracks,
        ..Default::default()
    };

    for _ in 0..num_boma {
        apply_boma_to_playlist(reader, &mut playlist)?;
    }

    if reader.position() != expected_end {
        return Err(DecodeError::LengthMismatch(format!(
            "lpma playlist ended at {}, expected {expected_end}",
            reader.position()
        )));
    }

    Ok(playlist)
}

fn read_list(
    reader: &mut Reader,
    list_magic: &[u8; 4],
    item_magic: &[u8; 4],
) -> Result<Vec<Vec<MetadataContainer>>, DecodeError> {
    reader.expect_signature(0, list_magic)?;
    let section_len = reader.u32_le_at(4)? as i64;
    let num_items = reader.u32_le_at(8)?;
    reader.advance(section_len)?;

    (0..num_items).map(|_| read_iama(reader, item_magic)).collect()
}

fn read_iama(reader: &mut Reader, magic: &[u8; 4]) -> Result<Vec<MetadataContainer>, DecodeError> {
    let item_start = reader.position();
    reader.expect_signature(0, magic)?;
    let section_len = reader.u32_le_at(4)? as i64;
    let sections_len = reader.u32_le_at(8)? as usize;
    let num_boma = reader.u32_le_at(12)?;
    let expected_end = item_start + sections_len;

    reader.advance(section_len)?;

    let mut containers = Vec::with_capacity(num_boma as usize);
    for _ in 0..num_boma {
        if let Some(container) = read_boma_container(reader)? {
            containers.push(container);
        }
    }

    if reader.position() != expected_end {
        return Err(DecodeError::LengthMismatch(format!(
            "album/artist item ended at {}, expected {expected_end}",
            reader.position()
        )));
    }

    Ok(containers)
}

fn read_library_master(reader: &mut Reader) -> Result<Vec<MetadataContainer>, DecodeError> {
    reader.expect_signature(0, b"plma")?;
    let section_len = reader.u32_le_at(4)? as i64;
    let num_boma = reader.u32_le_at(8)?;
    reader.advance(section_len)?;

    let mut containers = Vec::with_capacity(num_boma as usize);
    for _ in 0..num_boma {
        if let Some(container) = read_boma_container(reader)? {
            containers.push(container);
        }
    }
    Ok(containers)
}

/// Read one `boma`, yielding a plain metadata container if it was one
/// (ipfa/numerics/smart-marker outcomes have no meaning outside a track or
/// playlist and are handled by the two `apply_boma_to_*` helpers instead).
fn read_boma_container(reader: &mut Reader) -> Result<Option<MetadataContainer>, DecodeError> {
    let (outcome, section_len) = read_boma(reader)?;
    reader.advance(section_len as i64)?;
    Ok(match outcome {
        BomaOutcome::Metadata(container) => Some(container),
        _ => None,
    })
}

fn apply_boma_to_track(reader: &mut Reader, track: &mut TrackRecord) -> Result<(), DecodeError> {
    let (outcome, section_len) = read_boma(reader)?;
    reader.advance(section_len as i64)?;
    match outcome {
        BomaOutcome::Metadata(container) => track.containers.push(container),
        BomaOutcome::TrackNumerics(update) => {
            if track.bitrate.is_none() {
                track.bitrate = update.bitrate;
            }
            if track.date_added.is_none() {
                track.date_added = update.date_added.filter(|&v| v != 0);
            }
            if track.date_modified.is_none() {
                track.date_modified = update.date_modified.filter(|&v| v != 0);
            }
            if track.normalization.is_none() {
                track.normalization = update.normalization;
            }
            if track.song_time_ms.is_none() {
                track.song_time_ms = update.song_time_ms;
            }
            if track.file_size.is_none() {
                track.file_size = update.file_size;
            }
            if track.play_count.is_none() {
                track.play_count = update.play_count;
            }
            if track.date_last_played.is_none() {
                track.date_last_played = update.date_last_played.filter(|&v| v != 0);
            }
        }
        BomaOutcome::PlaylistMember(_) | BomaOutcome::SmartPlaylistMarker | BomaOutcome::Unknown => {}
    }
    Ok(())
}

fn apply_boma_to_playlist(reader: &mut Reader, playlist: &mut PlaylistRecord) -> Result<(), DecodeError> {
    let (outcome, section_len) = read_boma(reader)?;
    reader.advance(section_len as i64)?;
    match outcome {
        BomaOutcome::Metadata(container) => playlist.containers.push(container),
        BomaOutcome::PlaylistMember(track_id) => playlist.persistent_track_ids.push(track_id),
        BomaOutcome::SmartPlaylistMarker => playlist.is_smart = true,
        BomaOutcome::TrackNumerics(_) | BomaOutcome::Unknown => {}
    }
    Ok(())
}
