//! The `boma` typed metadata container: musicdb's single shape for every
//! piece of string metadata, track-numerics mutation, and playlist
//! membership.

use strum_macros::FromRepr;

use crate::error::DecodeError;
use crate::model::{ContainerTag, MetadataContainer};
use crate::reader::Reader;

/// Known wide-char (UTF-16LE) `boma` subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
pub enum Utf16Tag {
    TrackTitle = 0x02,
    Album = 0x03,
    Artist = 0x04,
    Genre = 0x05,
    Kind = 0x06,
    Comment = 0x08,
    Composer = 0x0C,
    Grouping = 0x0E,
    AlbumArtist = 0x1B,
    SortOrderTrackTitle = 0x1E,
    SortOrderAlbum = 0x1F,
    SortOrderArtist = 0x20,
    SortOrderAlbumArtist = 0x21,
    SortOrderComposer = 0x22,
    CopyrightHolder = 0x2E,
    ClassicalWorkName = 0x3F,
    ClassicalMovementTitle = 0x40,
    PurchaserEmail = 0x3B,
    PurchaserName = 0x3C,
    TrackLocalFilePath = 0x43,
    PlaylistName = 0xC8,
    IamaAlbum = 0x12C,
    IamaAlbumArtist1 = 0x12D,
    IamaAlbumArtist2 = 0x12E,
    IamaSeriesTitle = 0x12F,
    IamaArtist1 = 0x190,
    IamaArtist2 = 0x191,
    ManagedMediaFolder = 0x1F8,
    SongTitle = 0x2BE,
    SongArtist = 0x2BF,
}

/// UTF-8 subtypes whose value runs to the end of the container (no
/// separate length field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
pub enum Utf8ShortTag {
    ArtworkInfo = 0x36,
    CloudDownloadInfo = 0x38,
    ArtworkUrl = 0x192,
}

/// UTF-8 subtypes with an explicit length field, like the wide-char set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
pub enum Utf8LongTag {
    TrackLocalFilePathUrl = 0x0B,
    XmlBlock = 0x1D,
    XmlBlockExtended = 0x2BC,
    XmlBlockAlternate = 0x3CC,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
pub enum OtherTag {
    Video = 0x24,
    Book = 0x42,
}

const TRACK_NUMERICS_1: u32 = 0x1;
const TRACK_NUMERICS_2: u32 = 0x17;
const IPFA_PLAYLIST_MEMBER: u32 = 0xCE;
const SMART_PLAYLIST_MARKER: u32 = 0xC9;

/// musicdb's `boma` subtype, unified across all dispatch classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicdbTag {
    Utf16(Utf16Tag),
    Utf8Short(Utf8ShortTag),
    Utf8Long(Utf8LongTag),
    Other(OtherTag),
}

impl MusicdbTag {
    pub fn name(&self) -> &'static str {
        match self {
            MusicdbTag::Utf16(tag) => match tag {
                Utf16Tag::TrackTitle => "track_title",
                Utf16Tag::Album => "album",
                Utf16Tag::Artist => "artist",
                Utf16Tag::Genre => "genre",
                Utf16Tag::Kind => "kind",
                Utf16Tag::Comment => "comment",
                Utf16Tag::Composer => "composer",
                Utf16Tag::Grouping => "grouping",
                Utf16Tag::AlbumArtist => "album_artist",
                Utf16Tag::SortOrderTrackTitle => "sort_order_track_title",
                Utf16Tag::SortOrderAlbum => "sort_order_album",
                Utf16Tag::SortOrderArtist => "sort_order_artist",
                Utf16Tag::SortOrderAlbumArtist => "sort_order_album_artist",
                Utf16Tag::SortOrderComposer => "sort_order_composer",
                Utf16Tag::CopyrightHolder => "copyright_holder",
                Utf16Tag::ClassicalWorkName => "classical_work_name",
                Utf16Tag::ClassicalMovementTitle => "classical_movement_title",
                Utf16Tag::PurchaserEmail => "purchaser_email",
                Utf16Tag::PurchaserName => "purchaser_name",
                Utf16Tag::TrackLocalFilePath => "track_local_file_path",
                Utf16Tag::PlaylistName => "playlist_name",
                Utf16Tag::IamaAlbum => "iama_album",
                Utf16Tag::IamaAlbumArtist1 => "iama_album_artist_1",
                Utf16Tag::IamaAlbumArtist2 => "iama_album_artist_2",
                Utf16Tag::IamaSeriesTitle => "iama_series_title",
                Utf16Tag::IamaArtist1 => "iama_artist_1",
                Utf16Tag::IamaArtist2 => "iama_artist_2",
                Utf16Tag::ManagedMediaFolder => "managed_media_folder",
                Utf16Tag::SongTitle => "song_title",
                Utf16Tag::SongArtist => "song_artist",
            },
            MusicdbTag::Utf8Short(tag) => match tag {
                Utf8ShortTag::ArtworkInfo => "xlm_block_1",
                Utf8ShortTag::CloudDownloadInfo => "xlm_block_2",
                Utf8ShortTag::ArtworkUrl => "xlm_artwork_url",
            },
            MusicdbTag::Utf8Long(tag) => match tag {
                Utf8LongTag::TrackLocalFilePathUrl => "track_local_file_path_url",
                Utf8LongTag::XmlBlock => "xlm_block_3",
                Utf8LongTag::XmlBlockExtended => "xlm_block_4",
                Utf8LongTag::XmlBlockAlternate => "xlm_block_5",
            },
            MusicdbTag::Other(tag) => match tag {
                OtherTag::Video => "video",
                OtherTag::Book => "book",
            },
        }
    }
}

/// First-writer-wins updates folded into the enclosing track by "track
/// numerics" boma children (subtypes 0x1 and 0x17).
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackNumericsUpdate {
    pub bitrate: Option<u32>,
    pub date_added: Option<u32>,
    pub date_modified: Option<u32>,
    pub normalization: Option<u32>,
    pub song_time_ms: Option<u32>,
    pub file_size: Option<u32>,
    pub play_count: Option<u32>,
    pub date_last_played: Option<u32>,
}

/// What handling a single `boma` container produced.
pub enum BomaOutcome {
    Metadata(MetadataContainer),
    TrackNumerics(TrackNumericsUpdate),
    /// An `ipfa` marker: a playlist-track membership entry.
    PlaylistMember(u64),
    SmartPlaylistMarker,
    Unknown,
}

const BOOK_SIGNATURE: &[u8; 4] = b"book";
const IPFA_SIGNATURE: &[u8; 4] = b"ipfa";

/// Decode the `boma` container starting at the reader's current position.
/// The caller is responsible for advancing past `section_len` afterward —
/// this mirrors the source format, where the advance happens unconditionally
/// regardless of which branch below ran.
pub fn read_boma(reader: &Reader) -> Result<(BomaOutcome, usize), DecodeError> {
    reader.expect_signature(0, b"boma")?;
    let section_len = reader.u32_le_at(8)? as usize;
    let subtype = reader.u32_le_at(12)?;

    let outcome = if let Some(tag) = Utf16Tag::from_repr(subtype) {
        let string_len = reader.u32_le_at(24)? as usize;
        let bytes = reader.bytes_at(36, string_len)?;
        let value = decode_utf16le(bytes);
        BomaOutcome::Metadata(MetadataContainer {
            tag: ContainerTag::Musicdb(MusicdbTag::Utf16(tag)),
            value: Some(value),
        })
    } else if let Some(tag) = Utf8ShortTag::from_repr(subtype) {
        let len = section_len.saturating_sub(20);
        let bytes = reader.bytes_at(20, len)?;
        BomaOutcome::Metadata(MetadataContainer {
            tag: ContainerTag::Musicdb(MusicdbTag::Utf8Short(tag)),
            value: Some(String::from_utf8_lossy(bytes).into_owned()),
        })
    } else if let Some(tag) = Utf8LongTag::from_repr(subtype) {
        let string_len = reader.u32_le_at(24)? as usize;
        let bytes = reader.bytes_at(36, string_len)?;
        BomaOutcome::Metadata(MetadataContainer {
            tag: ContainerTag::Musicdb(MusicdbTag::Utf8Long(tag)),
            value: Some(String::from_utf8_lossy(bytes).into_owned()),
        })
    } else if subtype == OtherTag::Book as u32 {
        reader.expect_signature(20, BOOK_SIGNATURE)?;
        BomaOutcome::Metadata(MetadataContainer {
            tag: ContainerTag::Musicdb(MusicdbTag::Other(OtherTag::Book)),
            value: None,
        })
    } else if subtype == OtherTag::Video as u32 {
        let vertical = reader.u32_le_at(20)?;
        let horizontal = reader.u32_le_at(24)?;
        let fps = reader.u32_le_at(68)?;
        BomaOutcome::Metadata(MetadataContainer {
            tag: ContainerTag::Musicdb(MusicdbTag::Other(OtherTag::Video)),
            value: Some(format!("{vertical}x{horizontal} ({fps} fps)")),
        })
    } else if subtype == IPFA_PLAYLIST_MEMBER {
        reader.expect_signature(20, IPFA_SIGNATURE)?;
        let persistent_track_id = reader.u64_le_at(40)?;
        BomaOutcome::PlaylistMember(persistent_track_id)
    } else if subtype == SMART_PLAYLIST_MARKER {
        BomaOutcome::SmartPlaylistMarker
    } else if subtype == TRACK_NUMERICS_1 {
        BomaOutcome::TrackNumerics(TrackNumericsUpdate {
            bitrate: Some(reader.u32_le_at(108)?),
            date_added: Some(reader.u32_le_at(112)?),
            date_modified: Some(reader.u32_le_at(148)?),
            normalization: Some(reader.u32_le_at(152)?),
            song_time_ms: Some(reader.u32_le_at(176)?),
            file_size: Some(reader.u32_le_at(316)?),
            ..Default::default()
        })
    } else if subtype == TRACK_NUMERICS_2 {
        let play_count = reader.u32_le_at(32)?;
        let date_last_played = if play_count > 0 {
            Some(reader.u32_le_at(28)?)
        } else {
            None
        };
        BomaOutcome::TrackNumerics(TrackNumericsUpdate {
            play_count: Some(play_count),
            date_last_played,
            ..Default::default()
        })
    } else {
        #[cfg(feature = "tracing")]
        tracing::trace!(subtype, "unknown musicdb boma subtype, skipping");
        BomaOutcome::Unknown
    };

    Ok((outcome, section_len))
}

fn decode_utf16le(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};
    use std::io::Write;

    fn wide_char_fixture(subtype: u32, text: &str) -> Vec<u8> {
        let utf16: Vec<u16> = text.encode_utf16().collect();
        let string_bytes: Vec<u8> = utf16.iter().flat_map(|u| u.to_le_bytes()).collect();
        let mut buf = Vec::new();
        buf.write_all(b"boma").unwrap();
        buf.write_u32::<LittleEndian>(36).unwrap(); // inner header length (ignored)
        let section_len = 36 + string_bytes.len() as u32;
        buf.write_u32::<LittleEndian>(section_len).unwrap();
        buf.write_u32::<LittleEndian>(subtype).unwrap();
        buf.resize(24, 0);
        buf.write_u32::<LittleEndian>(string_bytes.len() as u32).unwrap();
        buf.resize(36, 0);
        buf.extend_from_slice(&string_bytes);
        buf
    }

    #[test]
    fn decodes_wide_char_track_title() {
        let buf = wide_char_fixture(Utf16Tag::TrackTitle as u32, "Sandstorm");
        let reader = Reader::new(&buf);
        let (outcome, _) = read_boma(&reader).unwrap();
        match outcome {
            BomaOutcome::Metadata(container) => {
                assert_eq!(container.tag.name(), "track_title");
                assert_eq!(container.value.as_deref(), Some("Sandstorm"));
            }
            _ => panic!("expected metadata container"),
        }
    }

    #[test]
    fn unknown_subtype_is_not_an_error() {
        let mut buf = Vec::new();
        buf.write_all(b"boma").unwrap();
        buf.write_u32::<LittleEndian>(24).unwrap();
        buf.write_u32::<LittleEndian>(24).unwrap();
        buf.write_u32::<LittleEndian>(0xDEAD_u32).unwrap();
        let reader = Reader::new(&buf);
        let (outcome, len) = read_boma(&reader).unwrap();
        assert!(matches!(outcome, BomaOutcome::Unknown));
        assert_eq!(len, 24);
    }

    #[test]
    fn track_numerics_2_skips_last_played_when_play_count_zero() {
        let mut buf = vec![0u8; 36];
        buf[0..4].copy_from_slice(b"boma");
        buf[8..12].copy_from_slice(&36u32.to_le_bytes());
        buf[12..16].copy_from_slice(&TRACK_NUMERICS_2.to_le_bytes());
        buf[32..36].copy_from_slice(&0u32.to_le_bytes());
        let reader = Reader::new(&buf);
        let (outcome, _) = read_boma(&reader).unwrap();
        match outcome {
            BomaOutcome::TrackNumerics(update) => {
                assert_eq!(update.play_count, Some(0));
                assert_eq!(update.date_last_played, None);
            }
            _ => panic!("expected track numerics"),
        }
    }
}
