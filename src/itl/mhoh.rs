//! The `mhoh` typed metadata container: itl's equivalent of musicdb's
//! `boma`, with string encoding chosen per-entry by a `string_type` tag
//! rather than by subtype class.

use strum_macros::FromRepr;

use crate::error::DecodeError;
use crate::model::{ContainerTag, MetadataContainer};
use crate::reader::Reader;

/// "Flex" `mhoh` subtypes: the string encoding is read per-entry from a
/// `string_type` word rather than implied by the subtype itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
pub enum FlexTag {
    TrackTitle = 0x02,
    AlbumTitle = 0x03,
    Artist = 0x04,
    Genre = 0x05,
    Kind = 0x06,
    Comments = 0x08,
    Category = 0x09,
    LocalPath = 0x0B,
    Composer = 0x0C,
    NativeFilepath = 0x0D,
    Grouping = 0x0E,
    ShortDescription = 0x12,
    FullDescription = 0x16,
    TvShowTitle = 0x18,
    EpisodeId = 0x19,
    AlbumArtist = 0x1B,
    TvRating = 0x1C,
    XmlBlock = 0x1D,
    SortTrackName = 0x1E,
    SortAlbum = 0x1F,
    SortArtist = 0x20,
    SortAlbumArtist = 0x21,
    SortComposer = 0x22,
    PodcastRssUrl = 0x25,
    EmiUnknown = 0x2B,
    Copyright = 0x2E,
    AlternateDescription = 0x33,
    Unknown34 = 0x34,
    PodcastEpisodeUrl = 0x39,
    PodcastFeedUrl = 0x3A,
    PurchaserEmail = 0x3B,
    PurchaserName = 0x3C,
    WorkName = 0x3F,
    MovementName = 0x40,
    PlaylistName = 0x64,
    PodcastTitle = 0xC8,
    AlbumMiah = 0x12C,
    AlbumArtistMiah = 0x12D,
    AlbumArtistMiah2 = 0x12E,
    SeriesTitleMiah = 0x130,
    FeedUrlMiah = 0x131,
    ArtistMiah = 0x190,
    SortArtistMiah = 0x191,
    UuidUnknownF8 = 0x1F8,
    UuidUnknownF9 = 0x1F9,
    LibraryOwner = 0x1FA,
    LibraryName = 0x1FC,
    TrackTitleExt = 0x2BE,
    ArtistAlbumCombined = 0x2BF,
}

/// "Narrow" subtypes: always UTF-8, value runs to the end of the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
pub enum NarrowTag {
    PodcastEpisodeUrl = 0x13,
    ArtXmlBlock = 0x36,
    DownloadXmlBlock = 0x38,
    DisplayArtXmlBlock = 0x6D,
    StoreArtUrlXmlBlock = 0x192,
    LongXmlBlock = 0x202,
    SmartPlaylistCriteriaXmlBlock = 0x2BC,
    TvDisplayXmlBlock = 0x320,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
pub enum OtherTag {
    Resolution = 0x24,
    Book = 0x42,
}

/// itl's `mhoh` subtype, unified across its three disjoint dispatch sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItlTag {
    Flex(FlexTag),
    Narrow(NarrowTag),
    Other(OtherTag),
}

impl ItlTag {
    pub fn name(&self) -> &'static str {
        match self {
            ItlTag::Flex(tag) => match tag {
                FlexTag::TrackTitle => "track_title",
                FlexTag::AlbumTitle => "album_title",
                FlexTag::Artist => "artist",
                FlexTag::Genre => "genre",
                FlexTag::Kind => "kind",
                FlexTag::Comments => "comments",
                FlexTag::Category => "category",
                FlexTag::LocalPath => "local_path",
                FlexTag::Composer => "composer",
                FlexTag::NativeFilepath => "native_filepath",
                FlexTag::Grouping => "grouping",
                FlexTag::ShortDescription => "short_description",
                FlexTag::FullDescription => "full_description",
                FlexTag::TvShowTitle => "tv_show_title",
                FlexTag::EpisodeId => "episode_id",
                FlexTag::AlbumArtist => "album_artist",
                FlexTag::TvRating => "tv_rating",
                FlexTag::XmlBlock => "xml_block",
                FlexTag::SortTrackName => "sort_track_name",
                FlexTag::SortAlbum => "sort_album",
                FlexTag::SortArtist => "sort_artist",
                FlexTag::SortAlbumArtist => "sort_album_artist",
                FlexTag::SortComposer => "sort_composer",
                FlexTag::PodcastRssUrl => "podcast_rss_url",
                FlexTag::EmiUnknown => "emi_unknown",
                FlexTag::Copyright => "copyright",
                FlexTag::AlternateDescription => "alternate_description",
                FlexTag::Unknown34 => "unknown_34",
                FlexTag::PodcastEpisodeUrl => "podcast_episode_url",
                FlexTag::PodcastFeedUrl => "podcast_feed_url",
                FlexTag::PurchaserEmail => "purchaser_email",
                FlexTag::PurchaserName => "purchaser_name",
                FlexTag::WorkName => "work_name",
                FlexTag::MovementName => "movement_name",
                FlexTag::PlaylistName => "playlist_name",
                FlexTag::PodcastTitle => "podcast_title",
                FlexTag::AlbumMiah => "album_miah",
                FlexTag::AlbumArtistMiah => "album_artist_miah",
                FlexTag::AlbumArtistMiah2 => "album_artist_miah_2",
                FlexTag::SeriesTitleMiah => "series_title_miah",
                FlexTag::FeedUrlMiah => "feed_url_miah",
                FlexTag::ArtistMiah => "artist_miah",
                FlexTag::SortArtistMiah => "sort_artist_miah",
                FlexTag::UuidUnknownF8 => "uuid_unknown_f8",
                FlexTag::UuidUnknownF9 => "uuid_unknown_f9",
                FlexTag::LibraryOwner => "library_owner",
                FlexTag::LibraryName => "library_name",
                FlexTag::TrackTitleExt => "track_title_ext",
                FlexTag::ArtistAlbumCombined => "artist_album_combined",
            },
            ItlTag::Narrow(tag) => match tag {
                NarrowTag::PodcastEpisodeUrl => "xlm_block_podcast_episode_url",
                NarrowTag::ArtXmlBlock => "xlm_block_art",
                NarrowTag::DownloadXmlBlock => "xlm_block_download",
                NarrowTag::DisplayArtXmlBlock => "xlm_block_display_art",
                NarrowTag::StoreArtUrlXmlBlock => "xlm_block_store_art_url",
                NarrowTag::LongXmlBlock => "xlm_block_long",
                NarrowTag::SmartPlaylistCriteriaXmlBlock => "xlm_block_smart_playlist_criteria",
                NarrowTag::TvDisplayXmlBlock => "xlm_block_tv_display",
            },
            ItlTag::Other(tag) => match tag {
                OtherTag::Resolution => "resolution",
                OtherTag::Book => "book",
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
enum StringType {
    UriUtf8 = 0,
    WideUtf16 = 1,
    EscapedUri = 2,
    NarrowUtf8 = 3,
}

/// Decode the `mhoh` container starting at the reader's current position,
/// returning the container (if this subtype is known) and the section
/// length the caller must advance past regardless.
pub fn read_mhoh(reader: &Reader) -> Result<(Option<MetadataContainer>, usize), DecodeError> {
    reader.expect_signature(0, b"mhoh")?;
    let section_len = reader.u32_le_at(8)? as usize;
    let subtype = reader.u32_le_at(12)?;

    let container = if let Some(tag) = FlexTag::from_repr(subtype) {
        let string_type = reader.u32_le_at(24)?;
        let string_len = reader.u32_le_at(28)? as usize;
        let bytes = reader.bytes_at(40, string_len)?;
        let value = match StringType::from_repr(string_type) {
            Some(StringType::WideUtf16) => decode_utf16le(bytes),
            _ => String::from_utf8_lossy(bytes).into_owned(),
        };
        Some(MetadataContainer {
            tag: ContainerTag::Itl(ItlTag::Flex(tag)),
            value: Some(value),
        })
    } else if let Some(tag) = NarrowTag::from_repr(subtype) {
        let len = section_len.saturating_sub(24);
        let bytes = reader.bytes_at(24, len)?;
        Some(MetadataContainer {
            tag: ContainerTag::Itl(ItlTag::Narrow(tag)),
            value: Some(String::from_utf8_lossy(bytes).into_owned()),
        })
    } else if subtype == OtherTag::Resolution as u32 {
        let vertical = reader.u32_le_at(24)?;
        let horizontal = reader.u32_le_at(28)?;
        Some(MetadataContainer {
            tag: ContainerTag::Itl(ItlTag::Other(OtherTag::Resolution)),
            value: Some(format!("{vertical}x{horizontal}")),
        })
    } else if subtype == OtherTag::Book as u32 {
        Some(MetadataContainer {
            tag: ContainerTag::Itl(ItlTag::Other(OtherTag::Book)),
            value: None,
        })
    } else {
        #[cfg(feature = "tracing")]
        tracing::trace!(subtype, "unknown itl mhoh subtype, skipping");
        None
    };

    Ok((container, section_len))
}

fn decode_utf16le(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}
