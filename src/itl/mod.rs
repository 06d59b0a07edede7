//! The legacy `.itl` format engine: big-endian outer header, little-endian
//! `msdh` sections, and their track/playlist/album/artist/library-info
//! sub-parsers.

mod mhoh;

pub use mhoh::ItlTag;

use strum_macros::FromRepr;

use crate::crypto;
use crate::error::DecodeError;
use crate::model::{MetadataContainer, PlaylistRecord, RawLibrary, Section, TrackRecord};
use crate::reader::Reader;

const OUTER_MAGIC: &[u8; 4] = b"hdfm";

/// `block_type` values carried by every `msdh` record. Three of these
/// (`MlthTrack`/`MlthTrackMaster` and `MlphTrack`/`MlphPlaylistMaster`) are
/// dispatched identically — the format doubles up on what is effectively
/// one block kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
enum BlockType {
    MlthTrackMaster = 1,
    MlphPlaylistMaster = 2,
    BinaryUnk = 3,
    LibraryLocation = 4,
    MlahAlbumCollection = 9,
    MlihArtist = 11,
    MhghLibraryInfo = 12,
    MlthTrack = 13,
    MlphTrack = 14,
    MlrhUnk = 15,
    MfdhOuterEnvelope = 16,
    Xlm = 19,
    MlqhUnk = 20,
    MlshUnk = 21,
    StshUnk = 23,
}

/// Decode a full legacy `.itl` file.
pub fn decode(file_data: &[u8], key: &[u8]) -> Result<RawLibrary, DecodeError> {
    decode_with_options(file_data, key, false)
}

/// Decode a full legacy `.itl` file. When `include_unknown_sections` is set,
/// recognized-but-uninterpreted blocks (binary/XML/unk block types) are kept
/// as [`Section::Unknown`] with their raw bytes rather than discarded.
pub fn decode_with_options(
    file_data: &[u8],
    key: &[u8],
    include_unknown_sections: bool,
) -> Result<RawLibrary, DecodeError> {
    let header = Reader::new(file_data);
    header.expect_signature(0, OUTER_MAGIC)?;
    let header_len = header.u32_be_at(4)? as usize;
    let file_len = header.u32_be_at(8)? as usize;

    if file_len != file_data.len() {
        return Err(DecodeError::LengthMismatch(format!(
            "outer header declares file_len={file_len}, actual length is {}",
            file_data.len()
        )));
    }

    let version_str_len = header.u8_at(16)? as usize;
    let version = String::from_utf8_lossy(header.bytes_at(17, version_str_len)?).into_owned();
    let num_msdh = header.u32_be_at(48)?;
    let max_crypt_size = header.u32_be_at(92)? as usize;
    let tz_offset = header.i32_be_at(100)?;
    let date = header.u32_be_at(112)?;

    let crypt_size = (file_len - header_len).min(max_crypt_size);

    let mut body = file_data[header_len..].to_vec();
    let decompressed = crypto::decode_body(&mut body, crypt_size, key)?;

    let (sections, library_location) =
        read_sections(&decompressed, num_msdh, include_unknown_sections)?;

    Ok(RawLibrary {
        version,
        date,
        tz_offset,
        sections,
        library_location,
    })
}

fn read_sections(
    data: &[u8],
    num_msdh: u32,
    include_unknown_sections: bool,
) -> Result<(Vec<Section>, Option<String>), DecodeError> {
    let mut reader = Reader::new(data);
    let mut sections = Vec::with_capacity(num_msdh as usize);
    let mut library_location = None;
    for _ in 0..num_msdh {
        sections.push(read_msdh(&mut reader, &mut library_location, include_unknown_sections)?);
    }

    if reader.position() != data.len() {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            position = reader.position(),
            total = data.len(),
            "itl: not all decompressed data was parsed"
        );
    }

    Ok((sections, library_location))
}

fn read_msdh(
    reader: &mut Reader,
    library_location: &mut Option<String>,
    include_unknown_sections: bool,
) -> Result<Section, DecodeError> {
    let section_start = reader.position();
    reader.expect_signature(0, b"msdh")?;
    let header_len = reader.u32_le_at(4)? as i64;
    let data_len = reader.u32_le_at(8)? as i64;
    let block_type = reader.u32_le_at(12)?;
    let expected_end = section_start as i64 + data_len;

    let section = match BlockType::from_repr(block_type) {
        Some(BlockType::LibraryLocation) => {
            *library_location = Some(read_library_location(reader)?);
            Section::Other
        }
        Some(tag) => {
            reader.advance(header_len)?;
            match tag {
                BlockType::MlihArtist => Section::ArtistList(read_mlih(reader)?),
                BlockType::MlthTrack | BlockType::MlthTrackMaster => {
                    Section::TrackMaster(read_mlth(reader)?)
                }
                BlockType::MfdhOuterEnvelope => {
                    read_mfdh(reader)?;
                    Section::Other
                }
                BlockType::MlahAlbumCollection => Section::AlbumList(read_mlah(reader)?),
                BlockType::MhghLibraryInfo => Section::LibraryMaster(read_mhgh(reader)?),
                BlockType::MlphTrack | BlockType::MlphPlaylistMaster => {
                    Section::PlaylistMaster(read_mlph(reader)?)
                }
                BlockType::MlrhUnk
                | BlockType::MlqhUnk
                | BlockType::MlshUnk
                | BlockType::StshUnk
                | BlockType::BinaryUnk
                | BlockType::Xlm => {
                    let remaining = (data_len - header_len) as usize;
                    if include_unknown_sections {
                        let data = reader.bytes_at(0, remaining)?.to_vec();
                        reader.advance(remaining as i64)?;
                        Section::Unknown { block_type, data }
                    } else {
                        reader.advance(remaining as i64)?;
                        Section::Other
                    }
                }
                BlockType::LibraryLocation => unreachable!("handled above"),
            }
        }
        None => return Err(DecodeError::UnknownSectionType(block_type)),
    };

    if reader.position() as i64 != expected_end {
        return Err(DecodeError::LengthMismatch(format!(
            "msdh section (type {block_type}) ended at {}, expected {expected_end}",
            reader.position()
        )));
    }

    Ok(section)
}

/// `LIBRARY_LOCATION` is its own self-contained `msdh`-shaped blob: a string
/// running from the end of the header to the end of the declared data.
fn read_library_location(reader: &mut Reader) -> Result<String, DecodeError> {
    reader.expect_signature(0, b"msdh")?;
    let header_len = reader.u32_le_at(4)? as i64;
    let data_len = reader.u32_le_at(8)? as i64;
    let string_len = (data_len - header_len) as usize;
    let bytes = reader.bytes_at(header_len as usize, string_len)?;
    let location = String::from_utf8_lossy(bytes).into_owned();
    reader.advance(data_len)?;
    Ok(location)
}

fn read_mfdh(reader: &mut Reader) -> Result<(), DecodeError> {
    reader.expect_signature(0, b"mfdh")?;
    let header_len = reader.u32_le_at(4)? as i64;
    let version_str_len = reader.u8_at(16)? as usize;
    let _app_version = String::from_utf8_lossy(reader.bytes_at(17, version_str_len)?).into_owned();
    #[cfg(feature = "tracing")]
    tracing::trace!(app_version = %_app_version, "itl: mfdh application version");
    reader.advance(header_len)?;
    Ok(())
}

fn read_mlth(reader: &mut Reader) -> Result<Vec<TrackRecord>, DecodeError> {
    reader.expect_signature(0, b"mlth")?;
    let header_len = reader.u32_le_at(4)? as i64;
    let num_mith = reader.u32_le_at(8)?;
    reader.advance(header_len)?;
    (0..num_mith).map(|_| read_mith(reader)).collect()
}

fn read_mith(reader: &mut Reader) -> Result<TrackRecord, DecodeError> {
    let item_start = reader.position();
    reader.expect_signature(0, b"mith")?;
    let header_len = reader.u32_le_at(4)? as i64;
    let data_len = reader.u32_le_at(8)? as i64;
    let num_mhoh = reader.u32_le_at(12)?;
    let id = reader.u32_le_at(16)?;
    let expected_end = item_start as i64 + data_len;

    let date_modified = reader.u32_le_at(32)?;
    let play_count = reader.u32_le_at(76)?;
    let date_last_played = reader.u32_le_at(100)?;
    let rating = reader.u8_at(108)?;
    let unchecked = reader.u8_at(110)? as u16;
    let date_added = reader.u32_le_at(120)?;
    let persistent_id = reader.u64_le_at(128)?;

    reader.advance(header_len)?;

    let mut track = TrackRecord {
        persistent_id,
        id,
        rating,
        unchecked,
        date_added: (date_added != 0).then_some(date_added),
        date_modified: (date_modified != 0).then_some(date_modified),
        play_count: Some(play_count),
        date_last_played: (play_count > 0 && date_last_played != 0).then_some(date_last_played),
        ..Default::default()
    };

    for _ in 0..num_mhoh {
        apply_mhoh_to_track(reader, &mut track)?;
    }

    if reader.position() as i64 != expected_end {
        return Err(DecodeError::LengthMismatch(format!(
            "mith track ended at {}, expected {expected_end}",
            reader.position()
        )));
    }

    Ok(track)
}

fn read_mlph(reader: &mut Reader) -> Result<Vec<PlaylistRecord>, DecodeError> {
    reader.expect_signature(0, b"mlph")?;
    let header_len = reader.u32_le_at(4)? as i64;
    let num_miph = reader.u32_le_at(8)?;
    reader.advance(header_len)?;
    let mut playlists = Vec::with_capacity(num_miph as usize);
    for _ in 0..num_miph {
        if let Some(playlist) = read_miph(reader)? {
            playlists.push(playlist);
        }
    }
    Ok(playlists)
}

const MIPH_PLAYLIST_ID_END: i64 = 3392 + 4;

fn read_miph(reader: &mut Reader) -> Result<Option<PlaylistRecord>, DecodeError> {
    let item_start = reader.position();
    reader.expect_signature(0, b"miph")?;
    let header_len = reader.u32_le_at(4)? as i64;
    let data_len = reader.u32_le_at(8)? as i64;
    let num_mhoh = reader.u32_le_at(12)?;
    let num_mtph = reader.u32_le_at(16)?;
    let expected_end = item_start as i64 + data_len;

    if header_len < MIPH_PLAYLIST_ID_END {
        return Err(DecodeError::LengthMismatch(format!(
            "miph header_len={header_len} is too short to hold the playlist_id field at {MIPH_PLAYLIST_ID_END}"
        )));
    }

    let persistent_id = reader.u64_le_at(440)?;
    let distinguished_kind = reader.u16_le_at(570)?;
    let id = reader.u32_le_at(3392)?;

    reader.advance(header_len)?;

    let mut playlist = PlaylistRecord {
        persistent_id,
        id,
        distinguished_kind,
        ..Default::default()
    };

    for _ in 0..num_mhoh {
        apply_mhoh_to_playlist(reader, &mut playlist)?;
    }

    // mtph entries are occasionally interrupted by a stray mhoh; skip those
    // without counting them toward num_mtph.
    let mut found = 0u32;
    while found < num_mtph {
        let tag = reader.signature_at(0)?;
        if &tag == b"mtph" {
            let mtph_header_len = reader.u32_le_at(4)? as i64;
            let track_id = reader.u32_le_at(24)?;
            playlist.persistent_track_ids.push(track_id as u64);
            reader.advance(mtph_header_len)?;
            found += 1;
        } else if &tag == b"mhoh" {
            let section_len = reader.u32_le_at(8)? as i64;
            reader.advance(section_len)?;
        } else {
            #[cfg(feature = "tracing")]
            tracing::warn!(?tag, "unexpected block while scanning miph's mtph list");
            let unknown_header_len = reader.u32_le_at(4)? as i64;
            reader.advance(unknown_header_len)?;
        }
    }

    if reader.position() as i64 != expected_end {
        return Err(DecodeError::LengthMismatch(format!(
            "miph playlist ended at {}, expected {expected_end}",
            reader.position()
        )));
    }

    if playlist.persistent_track_ids.is_empty() {
        #[cfg(feature = "tracing")]
        tracing::trace!(id = playlist.id, "itl: dropping miph playlist with no mtph entries");
        return Ok(None);
    }

    Ok(Some(playlist))
}

fn read_mlah(reader: &mut Reader) -> Result<Vec<Vec<MetadataContainer>>, DecodeError> {
    reader.expect_signature(0, b"mlah")?;
    let header_len = reader.u32_le_at(4)? as i64;
    let num_miah = reader.u32_le_at(8)?;
    reader.advance(header_len)?;
    (0..num_miah).map(|_| read_miah(reader)).collect()
}

/// `miah` carries no magic of its own in the source format — only a header
/// length and a child count — so there is nothing to validate here.
fn read_miah(reader: &mut Reader) -> Result<Vec<MetadataContainer>, DecodeError> {
    let header_len = reader.u32_le_at(4)? as i64;
    let num_mhoh = reader.u32_le_at(12)?;
    reader.advance(header_len)?;
    read_mhoh_children(reader, num_mhoh)
}

fn read_mlih(reader: &mut Reader) -> Result<Vec<Vec<MetadataContainer>>, DecodeError> {
    reader.expect_signature(0, b"mlih")?;
    let header_len = reader.u32_le_at(4)? as i64;
    let num_miih = reader.u32_le_at(8)?;
    reader.advance(header_len)?;
    (0..num_miih).map(|_| read_miih(reader)).collect()
}

fn read_miih(reader: &mut Reader) -> Result<Vec<MetadataContainer>, DecodeError> {
    reader.expect_signature(0, b"miih")?;
    let header_len = reader.u32_le_at(4)? as i64;
    let num_mhoh = reader.u32_le_at(12)?;
    reader.advance(header_len)?;
    read_mhoh_children(reader, num_mhoh)
}

fn read_mhgh(reader: &mut Reader) -> Result<Vec<MetadataContainer>, DecodeError> {
    reader.expect_signature(0, b"mhgh")?;
    let header_len = reader.u32_le_at(4)? as i64;
    let num_mhoh = reader.u32_le_at(8)?;
    let _list_size = reader.u8_at(55)?;
    #[cfg(feature = "tracing")]
    tracing::trace!(list_size = _list_size, "itl: mhgh list size");
    reader.advance(header_len)?;
    read_mhoh_children(reader, num_mhoh)
}

fn read_mhoh_children(reader: &mut Reader, count: u32) -> Result<Vec<MetadataContainer>, DecodeError> {
    let mut containers = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (container, section_len) = mhoh::read_mhoh(reader)?;
        reader.advance(section_len as i64)?;
        if let Some(container) = container {
            containers.push(container);
        }
    }
    Ok(containers)
}

fn apply_mhoh_to_track(reader: &mut Reader, track: &mut TrackRecord) -> Result<(), DecodeError> {
    let (container, section_len) = mhoh::read_mhoh(reader)?;
    reader.advance(section_len as i64)?;
    if let Some(container) = container {
        track.containers.push(container);
    }
    Ok(())
}

fn apply_mhoh_to_playlist(reader: &mut Reader, playlist: &mut PlaylistRecord) -> Result<(), DecodeError> {
    let (container, section_len) = mhoh::read_mhoh(reader)?;
    reader.advance(section_len as i64)?;
    if let Some(container) = container {
        playlist.containers.push(container);
    }
    Ok(())
}
