//! The typed value surface shared by both dialects: the raw library, its
//! sections, and the track/playlist/metadata records those sections hold.
//!
//! Both format engines build into these same types so the view layer in
//! [`crate::view`] never has to know which dialect produced a
//! [`RawLibrary`].

use crate::itl::ItlTag;
use crate::musicdb::MusicdbTag;

/// Either dialect's container type tag. The two namespaces are genuinely
/// disjoint — the same numeric value means different things in each
/// dialect — so they are not merged into one flat enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerTag {
    Musicdb(MusicdbTag),
    Itl(ItlTag),
}

impl ContainerTag {
    /// A lowercase, snake_case name for this tag, used as the view layer's
    /// metadata map key.
    pub fn name(&self) -> &'static str {
        match self {
            ContainerTag::Musicdb(tag) => tag.name(),
            ContainerTag::Itl(tag) => tag.name(),
        }
    }
}

/// A single metadata entry read out of a `boma` or `mhoh` container.
#[derive(Debug, Clone)]
pub struct MetadataContainer {
    pub tag: ContainerTag,
    pub value: Option<String>,
}

/// One track, before view-layer timestamp normalization.
#[derive(Debug, Clone, Default)]
pub struct TrackRecord {
    pub persistent_id: u64,
    pub id: u32,
    pub starred: bool,
    pub rating: u8,
    pub unchecked: u16,
    pub date_added: Option<u32>,
    pub date_modified: Option<u32>,
    pub date_last_played: Option<u32>,
    pub play_count: Option<u32>,
    pub bitrate: Option<u32>,
    pub song_time_ms: Option<u32>,
    pub normalization: Option<u32>,
    pub file_size: Option<u32>,
    pub containers: Vec<MetadataContainer>,
}

/// One playlist, before view-layer timestamp normalization.
#[derive(Debug, Clone, Default)]
pub struct PlaylistRecord {
    pub persistent_id: u64,
    pub id: u32,
    pub distinguished_kind: u16,
    pub date_created: Option<u32>,
    pub date_modified: Option<u32>,
    pub num_tracks: u32,
    pub is_smart: bool,
    pub is_folder: bool,
    pub persistent_track_ids: Vec<u64>,
    pub containers: Vec<MetadataContainer>,
}

/// A decoded top-level section, tagged by `section_type` (musicdb) or
/// `block_type` (itl).
#[derive(Debug, Clone)]
pub enum Section {
    TrackMaster(Vec<TrackRecord>),
    PlaylistMaster(Vec<PlaylistRecord>),
    AlbumList(Vec<Vec<MetadataContainer>>),
    ArtistList(Vec<Vec<MetadataContainer>>),
    LibraryMaster(Vec<MetadataContainer>),
    /// Inner envelope, library-info wrapper, or any section tag the engine
    /// deliberately does not interpret further.
    Other,
    /// A recognized-but-uninterpreted itl block, captured verbatim because
    /// the caller opted in via `include_unknown_sections`.
    Unknown { block_type: u32, data: Vec<u8> },
}

/// A fully decoded library: the outer header fields plus every top-level
/// section, in on-disk order.
#[derive(Debug, Clone)]
pub struct RawLibrary {
    pub version: String,
    /// Seconds since 1904-01-01 UTC, as stored; 0 means "no timestamp".
    pub date: u32,
    pub tz_offset: i32,
    pub sections: Vec<Section>,
    /// itl carries this as its own top-level `LIBRARY_LOCATION` block.
    /// musicdb has no equivalent section — its media-folder path instead
    /// lives inside a `MANAGED_MEDIA_FOLDER` container in the library
    /// master, which the view layer reads directly when this is `None`.
    pub library_location: Option<String>,
}

impl RawLibrary {
    pub fn track_master(&self) -> Option<&[TrackRecord]> {
        self.sections.iter().find_map(|s| match s {
            Section::TrackMaster(tracks) => Some(tracks.as_slice()),
            _ => None,
        })
    }

    pub fn playlist_master(&self) -> Option<&[PlaylistRecord]> {
        self.sections.iter().find_map(|s| match s {
            Section::PlaylistMaster(playlists) => Some(playlists.as_slice()),
            _ => None,
        })
    }

    pub fn library_master(&self) -> Option<&[MetadataContainer]> {
        self.sections.iter().find_map(|s| match s {
            Section::LibraryMaster(containers) => Some(containers.as_slice()),
            _ => None,
        })
    }
}

/// Convert a 1904-epoch seconds count plus a signed timezone offset into an
/// absolute UTC timestamp. A stored value of 0 means "no timestamp".
pub fn convert_timestamp(seconds: u32, tz_offset: i32) -> Option<chrono::DateTime<chrono::Utc>> {
    if seconds == 0 {
        return None;
    }
    const EPOCH_1904: i64 = -2_082_844_800; // 1904-01-01T00:00:00Z, seconds from Unix epoch
    let adjusted = EPOCH_1904 + seconds as i64 + tz_offset as i64;
    chrono::DateTime::from_timestamp(adjusted, 0)
}
