//! Timestamp normalization and promotion of raw parser output into the
//! value objects callers actually want: [`Track`], [`Playlist`], and the
//! library's media-folder location.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;

use crate::error::DecodeError;
use crate::model::{self, MetadataContainer, PlaylistRecord, RawLibrary, TrackRecord};

const MANAGED_MEDIA_FOLDER: &str = "managed_media_folder";
const PLAYLIST_NAME: &str = "playlist_name";
const XLM_BLOCK_PREFIX: &str = "xlm_block";
const LOCALHOST_FILE_PREFIX: &str = "file://localhost";

/// A track promoted from its raw record: epoch fields resolved to absolute
/// timestamps, metadata containers flattened into a string map.
#[derive(Debug, Clone)]
pub struct Track {
    pub persistent_id: u64,
    pub id: u32,
    pub starred: bool,
    pub rating: u8,
    pub unchecked: u16,
    pub date_added: Option<DateTime<Utc>>,
    pub date_modified: Option<DateTime<Utc>>,
    pub date_last_played: Option<DateTime<Utc>>,
    pub play_count: Option<u32>,
    pub bitrate: Option<u32>,
    pub song_time_ms: Option<u32>,
    pub normalization: Option<u32>,
    pub file_size: Option<u32>,
    pub metadata: HashMap<String, String>,
}

impl Track {
    /// `rating` (0..=100) rescaled to the conventional 0..=5 star display.
    pub fn stars(&self) -> u8 {
        self.rating * 5 / 100
    }
}

/// A playlist promoted from its raw record.
#[derive(Debug, Clone)]
pub struct Playlist {
    pub persistent_id: u64,
    pub id: u32,
    pub distinguished_kind: u16,
    pub name: String,
    pub date_created: Option<DateTime<Utc>>,
    pub date_modified: Option<DateTime<Utc>>,
    pub num_tracks: u32,
    pub is_smart: bool,
    pub is_folder: bool,
    pub persistent_track_ids: Vec<u64>,
}

/// Every track in the library's track master section, in on-disk order,
/// with `xlm_block`-prefixed metadata (raw XML blobs) dropped.
pub fn tracks(library: &RawLibrary) -> Result<Vec<Track>, DecodeError> {
    tracks_with_options(library, false)
}

/// Like [`tracks`], but keeps `xlm_block`-prefixed metadata keys instead of
/// dropping them.
pub fn tracks_with_options(library: &RawLibrary, include_xlm_blocks: bool) -> Result<Vec<Track>, DecodeError> {
    let records = library
        .track_master()
        .ok_or(DecodeError::MissingSection("track master"))?;

    Ok(records
        .iter()
        .map(|record| promote_track(record, library.tz_offset, include_xlm_blocks))
        .collect())
}

fn promote_track(record: &TrackRecord, tz_offset: i32, include_xlm_blocks: bool) -> Track {
    Track {
        persistent_id: record.persistent_id,
        id: record.id,
        starred: record.starred,
        rating: record.rating,
        unchecked: record.unchecked,
        date_added: record.date_added.and_then(|s| model::convert_timestamp(s, tz_offset)),
        date_modified: record.date_modified.and_then(|s| model::convert_timestamp(s, tz_offset)),
        date_last_played: record.date_last_played.and_then(|s| model::convert_timestamp(s, tz_offset)),
        play_count: record.play_count,
        bitrate: record.bitrate,
        song_time_ms: record.song_time_ms,
        normalization: record.normalization,
        file_size: record.file_size,
        metadata: metadata_map(&record.containers, include_xlm_blocks),
    }
}

/// Every playlist in the library's playlist master section that has a
/// usable `PLAYLIST_NAME` container; unnamed playlists are dropped, not an
/// error.
pub fn playlists(library: &RawLibrary) -> Result<Vec<Playlist>, DecodeError> {
    let records = library
        .playlist_master()
        .ok_or(DecodeError::MissingSection("playlist master"))?;

    Ok(records
        .iter()
        .filter_map(|record| promote_playlist(record, library.tz_offset))
        .collect())
}

fn promote_playlist(record: &PlaylistRecord, tz_offset: i32) -> Option<Playlist> {
    let name = record
        .containers
        .iter()
        .find(|c| c.tag.name() == PLAYLIST_NAME)
        .and_then(|c| c.value.clone())?;

    Some(Playlist {
        persistent_id: record.persistent_id,
        id: record.id,
        distinguished_kind: record.distinguished_kind,
        name,
        date_created: record.date_created.and_then(|s| model::convert_timestamp(s, tz_offset)),
        date_modified: record.date_modified.and_then(|s| model::convert_timestamp(s, tz_offset)),
        num_tracks: record.num_tracks,
        is_smart: record.is_smart,
        is_folder: record.is_folder,
        persistent_track_ids: record.persistent_track_ids.clone(),
    })
}

fn metadata_map(containers: &[MetadataContainer], include_xlm_blocks: bool) -> HashMap<String, String> {
    containers
        .iter()
        .filter_map(|c| {
            let name = c.tag.name();
            if !include_xlm_blocks && name.starts_with(XLM_BLOCK_PREFIX) {
                return None;
            }
            c.value.clone().map(|value| (name.to_string(), value))
        })
        .collect()
}

/// The library's media-folder path, URL-unescaped. musicdb carries this
/// inside a `MANAGED_MEDIA_FOLDER` container of the library master section;
/// itl carries it as its own top-level block, already extracted into
/// [`RawLibrary::library_location`] by the parser.
pub fn library_location(library: &RawLibrary, include_file_prefix: bool) -> Result<String, DecodeError> {
    let raw = match &library.library_location {
        Some(location) => location.clone(),
        None => library
            .library_master()
            .ok_or(DecodeError::MissingSection("library master"))?
            .iter()
            .find(|c| c.tag.name() == MANAGED_MEDIA_FOLDER)
            .and_then(|c| c.value.clone())
            .ok_or(DecodeError::MissingSection("managed media folder"))?,
    };

    let unescaped = percent_decode_str(&raw).decode_utf8_lossy().into_owned();

    Ok(if include_file_prefix {
        unescaped
    } else {
        unescaped
            .strip_prefix(LOCALHOST_FILE_PREFIX)
            .map(str::to_string)
            .unwrap_or(unescaped)
    })
}
