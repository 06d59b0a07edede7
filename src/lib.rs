//! A reader for Apple Music / iTunes library database files.
//!
//! Both the modern `Library.musicdb` format and the legacy `.itl` format
//! share the same shape: an encrypted, zlib-compressed body of nested,
//! length-prefixed, absolute-offset-addressed blocks. [`crate::reader`]
//! provides the offset-addressed cursor both formats read through;
//! [`crate::crypto`] handles the AES-128-ECB decrypt + inflate step they
//! share; [`crate::musicdb`] and [`crate::itl`] each walk their own section
//! layout into the common [`model::RawLibrary`] shape; [`crate::view`]
//! promotes that raw shape into the [`Track`] / [`Playlist`] value objects
//! callers actually want.
//!
//! ```no_run
//! let library = musicdb::Library::open("Library.musicdb").unwrap();
//! for track in library.tracks().unwrap() {
//!     println!("{:?} ({} stars)", track.metadata.get("track_title"), track.stars());
//! }
//! ```

pub mod crypto;
pub mod error;
pub mod itl;
pub mod model;
pub mod musicdb;
pub mod reader;
pub mod view;

use std::path::Path;

pub use crypto::DEFAULT_KEY;
pub use error::DecodeError;
pub use model::RawLibrary;
pub use view::{Playlist, Track};

const MUSICDB_MAGIC: &[u8; 4] = b"hfma";
const ITL_MAGIC: &[u8; 4] = b"hdfm";

/// A decoded library, dialect-agnostic from here on: every accessor works
/// the same whether the source file was `Library.musicdb` or a legacy
/// `.itl`.
#[derive(Debug, Clone)]
pub struct Library {
    raw: RawLibrary,
}

impl Library {
    /// Read and decode a library file at `path` using [`DEFAULT_KEY`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DecodeError> {
        Self::open_with_key(path, DEFAULT_KEY)
    }

    /// Read and decode a library file at `path` using an explicit key.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(key), fields(path = %path.as_ref().display())))]
    pub fn open_with_key(path: impl AsRef<Path>, key: &[u8]) -> Result<Self, DecodeError> {
        let data = std::fs::read(path.as_ref()).map_err(DecodeError::Io)?;
        Self::decode(&data, key)
    }

    /// Decode an already-read library file using [`DEFAULT_KEY`].
    pub fn decode_default(data: &[u8]) -> Result<Self, DecodeError> {
        Self::decode(data, DEFAULT_KEY)
    }

    /// Decode an already-read library file, dispatching on the outer magic
    /// to the musicdb or itl format engine.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(data, key)))]
    pub fn decode(data: &[u8], key: &[u8]) -> Result<Self, DecodeError> {
        let found = data.get(0..4).ok_or(DecodeError::TruncatedInput {
            offset: 0,
            wanted: 4,
            available: data.len(),
        })?;

        let raw = if found == MUSICDB_MAGIC.as_slice() {
            musicdb::decode(data, key)?
        } else if found == ITL_MAGIC.as_slice() {
            itl::decode(data, key)?
        } else {
            return Err(DecodeError::BadMagic {
                offset: 0,
                expected: *MUSICDB_MAGIC,
                found: found.try_into().unwrap(),
            });
        };

        Ok(Self { raw })
    }

    /// The default location of the modern library file on macOS.
    pub fn default_path() -> std::path::PathBuf {
        #[allow(deprecated)]
        let home = std::env::home_dir().expect("no home directory");
        home.join("Music/Music/Music Library.musiclibrary/Library.musicdb")
    }

    /// The underlying raw, unpromoted decode result.
    pub fn raw(&self) -> &RawLibrary {
        &self.raw
    }

    /// Every track in the library, with `xlm_block`-prefixed metadata
    /// dropped. See [`view::tracks`].
    pub fn tracks(&self) -> Result<Vec<Track>, DecodeError> {
        view::tracks(&self.raw)
    }

    /// Every named playlist in the library. See [`view::playlists`].
    pub fn playlists(&self) -> Result<Vec<Playlist>, DecodeError> {
        view::playlists(&self.raw)
    }

    /// The library's media-folder path, `file://localhost` stripped. See
    /// [`view::library_location`].
    pub fn library_location(&self) -> Result<String, DecodeError> {
        view::library_location(&self.raw, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_magic_is_bad_magic() {
        let data = b"XXXXrest of file is irrelevant";
        let err = Library::decode(data, DEFAULT_KEY).unwrap_err();
        assert!(matches!(err, DecodeError::BadMagic { .. }));
    }

    #[test]
    fn truncated_header_is_truncated_input() {
        let data = b"hf";
        let err = Library::decode(data, DEFAULT_KEY).unwrap_err();
        assert!(matches!(err, DecodeError::TruncatedInput { .. }));
    }

    #[test]
    #[ignore = "requires the default path to point to a real Library.musicdb"]
    fn opens_the_real_library_at_the_default_path() {
        let library = Library::open(Library::default_path()).expect("failed to open library");
        library.tracks().expect("failed to promote tracks");
    }

    /// Builds one real, encrypted-then-compressed `Library.musicdb` file in
    /// memory (outer header, one `hsma` track-master section holding a
    /// single `itma` track with a title and track-numerics `boma`) and
    /// round-trips it through the whole pipeline, matching the "musicdb
    /// happy path" end-to-end scenario.
    mod musicdb_end_to_end {
        use super::*;
        use ecb::cipher::{BlockEncryptMut, KeyInit};
        type NoPadding = aes::cipher::block_padding::NoPadding;

        fn section(payload: &[u8], section_type: u32) -> Vec<u8> {
            let mut out = Vec::new();
            out.extend_from_slice(b"hsma");
            out.extend_from_slice(&16u32.to_le_bytes()); // next_section_offset: own header is 16 bytes
            out.extend_from_slice(&((16 + payload.len()) as u32).to_le_bytes());
            out.extend_from_slice(&section_type.to_le_bytes());
            out.extend_from_slice(payload);
            out
        }

        fn boma_wide_char(subtype: u32, text: &str) -> Vec<u8> {
            let string_bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
            let mut out = vec![0u8; 36];
            out[0..4].copy_from_slice(b"boma");
            out[8..12].copy_from_slice(&(36 + string_bytes.len() as u32).to_le_bytes());
            out[12..16].copy_from_slice(&subtype.to_le_bytes());
            out[24..28].copy_from_slice(&(string_bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&string_bytes);
            out
        }

        fn boma_track_numerics_2(play_count: u32, date_last_played: u32) -> Vec<u8> {
            let mut out = vec![0u8; 40];
            out[0..4].copy_from_slice(b"boma");
            out[8..12].copy_from_slice(&40u32.to_le_bytes());
            out[12..16].copy_from_slice(&0x17u32.to_le_bytes());
            out[28..32].copy_from_slice(&date_last_played.to_le_bytes());
            out[32..36].copy_from_slice(&play_count.to_le_bytes());
            out
        }

        fn itma_track(persistent_id: u64, id: u32, starred_val: u16, rating: u8, bomas: &[Vec<u8>]) -> Vec<u8> {
            let mut out = vec![0u8; 80];
            out[0..4].copy_from_slice(b"itma");
            out[4..8].copy_from_slice(&80u32.to_le_bytes());
            out[12..16].copy_from_slice(&(bomas.len() as u32).to_le_bytes());
            out[16..24].copy_from_slice(&persistent_id.to_le_bytes());
            out[24..28].copy_from_slice(&id.to_le_bytes());
            out[62..64].copy_from_slice(&starred_val.to_le_bytes());
            out[65] = rating;
            for boma in bomas {
                out.extend_from_slice(boma);
            }
            out
        }

        fn ltma(tracks: &[Vec<u8>]) -> Vec<u8> {
            let mut out = Vec::new();
            out.extend_from_slice(b"ltma");
            out.extend_from_slice(&12u32.to_le_bytes());
            out.extend_from_slice(&(tracks.len() as u32).to_le_bytes());
            for track in tracks {
                out.extend_from_slice(track);
            }
            out
        }

        fn encrypt_ecb(mut plaintext: Vec<u8>, key: &[u8]) -> Vec<u8> {
            let padded_len = plaintext.len().div_ceil(16) * 16;
            plaintext.resize(padded_len, 0);
            let len = plaintext.len();
            ecb::Encryptor::<aes::Aes128>::new(key.into())
                .encrypt_padded_mut::<NoPadding>(&mut plaintext, len)
                .unwrap();
            plaintext
        }

        fn musicdb_file(decompressed: &[u8], key: &[u8]) -> Vec<u8> {
            use std::io::Write;
            let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(decompressed).unwrap();
            let compressed = encoder.finish().unwrap();
            let body = encrypt_ecb(compressed, key);

            const HEADER_LEN: usize = 104;
            let mut header = vec![0u8; HEADER_LEN];
            header[0..4].copy_from_slice(b"hfma");
            header[4..8].copy_from_slice(&(HEADER_LEN as u32).to_le_bytes());
            header[8..12].copy_from_slice(&((HEADER_LEN + body.len()) as u32).to_le_bytes());
            header[16..19].copy_from_slice(b"1.0");
            header[84..88].copy_from_slice(&(body.len() as u32).to_le_bytes()); // max_crypt_size
            header[88..92].copy_from_slice(&0i32.to_le_bytes()); // tz_offset
            header[100..104].copy_from_slice(&0u32.to_le_bytes()); // date

            let mut file = header;
            file.extend_from_slice(&body);
            file
        }

        #[test]
        fn happy_path_round_trips_one_starred_track() {
            let key = *b"0123456789ABCDEF";
            let title = boma_wide_char(0x02, "Sandstorm");
            let numerics = boma_track_numerics_2(3, 1_000_000);
            let track = itma_track(0xABCD_1234, 7, 2, 80, &[title, numerics]);
            let decompressed = section(&ltma(&[track]), 1);

            let file_bytes = musicdb_file(&decompressed, &key);
            let library = Library::decode(&file_bytes, &key).expect("decode should succeed");
            let tracks = library.tracks().expect("track master must be present");

            assert_eq!(tracks.len(), 1);
            let track = &tracks[0];
            assert_eq!(track.persistent_id, 0xABCD_1234);
            assert!(track.starred);
            assert_eq!(track.stars(), 4);
            assert_eq!(track.play_count, Some(3));
            assert!(track.date_last_played.is_some());
            assert_eq!(track.metadata.get("track_title").map(String::as_str), Some("Sandstorm"));
        }

        #[test]
        fn wrong_key_fails_cleanly_without_panicking() {
            let key = *b"0123456789ABCDEF";
            let wrong_key = *b"FEDCBA9876543210";
            let decompressed = section(&ltma(&[]), 1);
            let file_bytes = musicdb_file(&decompressed, &key);

            let result = Library::decode(&file_bytes, &wrong_key);
            assert!(result.is_err(), "decoding with the wrong key must fail, not panic");
        }
    }

    /// Builds one real, encrypted-then-compressed `.itl` file in memory: outer
    /// header, one `mlph` playlist-master section holding a single `miph`
    /// playlist named "Favorites" whose `mtph` track-id list is interrupted
    /// by a stray `mhoh` partway through, matching the itl "happy path with
    /// interspersed mhoh" end-to-end scenario.
    mod itl_end_to_end {
        use super::*;
        use ecb::cipher::{BlockEncryptMut, KeyInit};
        type NoPadding = aes::cipher::block_padding::NoPadding;

        const MIPH_HEADER_LEN: usize = 3392 + 4;

        fn mhoh_playlist_name(text: &str) -> Vec<u8> {
            let mut out = vec![0u8; 40];
            out[0..4].copy_from_slice(b"mhoh");
            out[8..12].copy_from_slice(&(40 + text.len() as u32).to_le_bytes());
            out[12..16].copy_from_slice(&0x64u32.to_le_bytes()); // FlexTag::PlaylistName
            out[24..28].copy_from_slice(&0u32.to_le_bytes()); // StringType::UriUtf8
            out[28..32].copy_from_slice(&(text.len() as u32).to_le_bytes());
            out.extend_from_slice(text.as_bytes());
            out
        }

        fn mtph_entry(track_id: u32) -> Vec<u8> {
            let mut out = vec![0u8; 28];
            out[0..4].copy_from_slice(b"mtph");
            out[4..8].copy_from_slice(&28u32.to_le_bytes());
            out[24..28].copy_from_slice(&track_id.to_le_bytes());
            out
        }

        fn stray_mhoh() -> Vec<u8> {
            let mut out = vec![0u8; 16];
            out[0..4].copy_from_slice(b"mhoh");
            out[8..12].copy_from_slice(&16u32.to_le_bytes());
            out
        }

        fn miph(persistent_id: u64, id: u32, name: &str, track_ids: &[u32]) -> Vec<u8> {
            let name_container = mhoh_playlist_name(name);
            let mut mtph_region = Vec::new();
            mtph_region.extend_from_slice(&mtph_entry(track_ids[0]));
            mtph_region.extend_from_slice(&stray_mhoh());
            for &id in &track_ids[1..] {
                mtph_region.extend_from_slice(&mtph_entry(id));
            }

            let data_len = MIPH_HEADER_LEN + name_container.len() + mtph_region.len();
            let mut header = vec![0u8; MIPH_HEADER_LEN];
            header[0..4].copy_from_slice(b"miph");
            header[4..8].copy_from_slice(&(MIPH_HEADER_LEN as u32).to_le_bytes());
            header[8..12].copy_from_slice(&(data_len as u32).to_le_bytes());
            header[12..16].copy_from_slice(&1u32.to_le_bytes()); // num_mhoh
            header[16..20].copy_from_slice(&(track_ids.len() as u32).to_le_bytes()); // num_mtph
            header[440..448].copy_from_slice(&persistent_id.to_le_bytes());
            header[3392..3396].copy_from_slice(&id.to_le_bytes());

            let mut out = header;
            out.extend_from_slice(&name_container);
            out.extend_from_slice(&mtph_region);
            out
        }

        fn mlph(playlists: &[Vec<u8>]) -> Vec<u8> {
            let mut out = Vec::new();
            out.extend_from_slice(b"mlph");
            out.extend_from_slice(&12u32.to_le_bytes());
            out.extend_from_slice(&(playlists.len() as u32).to_le_bytes());
            for playlist in playlists {
                out.extend_from_slice(playlist);
            }
            out
        }

        fn msdh_section(payload: &[u8], block_type: u32) -> Vec<u8> {
            let mut out = Vec::new();
            out.extend_from_slice(b"msdh");
            out.extend_from_slice(&16u32.to_le_bytes());
            out.extend_from_slice(&((16 + payload.len()) as u32).to_le_bytes());
            out.extend_from_slice(&block_type.to_le_bytes());
            out.extend_from_slice(payload);
            out
        }

        fn encrypt_ecb(mut plaintext: Vec<u8>, key: &[u8]) -> Vec<u8> {
            let padded_len = plaintext.len().div_ceil(16) * 16;
            plaintext.resize(padded_len, 0);
            let len = plaintext.len();
            ecb::Encryptor::<aes::Aes128>::new(key.into())
                .encrypt_padded_mut::<NoPadding>(&mut plaintext, len)
                .unwrap();
            plaintext
        }

        fn itl_file(decompressed: &[u8], key: &[u8]) -> Vec<u8> {
            use std::io::Write;
            let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(decompressed).unwrap();
            let compressed = encoder.finish().unwrap();
            let body = encrypt_ecb(compressed, key);

            const HEADER_LEN: usize = 116;
            let mut header = vec![0u8; HEADER_LEN];
            header[0..4].copy_from_slice(b"hdfm");
            header[4..8].copy_from_slice(&(HEADER_LEN as u32).to_be_bytes());
            header[8..12].copy_from_slice(&((HEADER_LEN + body.len()) as u32).to_be_bytes());
            header[16] = 3;
            header[17..20].copy_from_slice(b"1.0");
            header[48..52].copy_from_slice(&1u32.to_be_bytes()); // num_msdh
            header[92..96].copy_from_slice(&(body.len() as u32).to_be_bytes()); // max_crypt_size
            header[100..104].copy_from_slice(&0i32.to_be_bytes()); // tz_offset
            header[112..116].copy_from_slice(&0u32.to_be_bytes()); // date

            let mut file = header;
            file.extend_from_slice(&body);
            file
        }

        #[test]
        fn happy_path_round_trips_a_named_playlist_with_interspersed_mhoh() {
            let key = *b"0123456789ABCDEF";
            let playlist = miph(0x1122_3344, 9, "Favorites", &[10, 20, 30]);
            let decompressed = msdh_section(&mlph(&[playlist]), 2); // MlphPlaylistMaster

            let file_bytes = itl_file(&decompressed, &key);
            let library = Library::decode(&file_bytes, &key).expect("decode should succeed");
            let playlists = library.playlists().expect("playlist master must be present");

            assert_eq!(playlists.len(), 1);
            let playlist = &playlists[0];
            assert_eq!(playlist.persistent_id, 0x1122_3344);
            assert_eq!(playlist.name, "Favorites");
            assert_eq!(playlist.persistent_track_ids, vec![10, 20, 30]);
        }
    }
}
