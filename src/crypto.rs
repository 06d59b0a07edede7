//! Decryption & decompression of the body that follows the outer header.
//! <hr>
//!
//! The body is compressed with DEFLATE, then AES-128-ECB-encrypted up to a
//! header-declared byte count; anything past that count (either because it
//! didn't fill a full 16-byte block, or because the format simply stopped
//! encrypting past a size threshold) is left as plaintext compressed bytes.
//! Decoding is: decrypt the encrypted prefix in place, then inflate the
//! concatenation of (decrypted prefix ‖ untouched suffix).

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::DecodeError;

/// The AES key used to decrypt iTunes and Apple Music library files,
/// [known publicly since at least 2010][kafsemo].
///
/// This key does not have any known usage in decrypting copyrighted or
/// DRM-protected media, and is used solely to obtain the contents of a
/// user's own library, information already accessible to them through the
/// iTunes or Apple Music applications themselves.
///
/// [kafsemo]: <https://kafsemo.org/2010/12/10_itunes-10-database.html>
pub const DEFAULT_KEY: &[u8; 16] = b"BHUILuilfghuila3";

/// A moderately-upper-end guess on how much larger the unpacked data will be
/// compared to its packed form, used only to size the initial allocation.
const EXPANDED_SIZE_MULTIPLIER_HEURISTIC: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("decryption key must be exactly 16 bytes, got {0}")]
    BadKeyLength(usize),
    #[error("AES-128-ECB decryption failed")]
    Decrypt,
}

/// Decrypt `crypt_size` bytes of `body` in place with `key`, then inflate the
/// concatenation of the decrypted prefix and whatever plaintext remains.
pub fn decode_body(body: &mut [u8], crypt_size: usize, key: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let crypt_size = crypt_size.min(body.len());
    let (encrypted, plaintext) = body.split_at_mut(crypt_size);
    decrypt_in_place(encrypted, key)?;
    let joined = JoinedReader::new(encrypted, plaintext);
    let compressed_len = joined.len();
    decompress(joined, compressed_len)
}

fn decrypt_in_place<'a>(bytes: &'a mut [u8], key: &[u8]) -> Result<&'a mut [u8], CryptoError> {
    use ecb::cipher::{BlockDecryptMut, KeyInit};
    type Padding = aes::cipher::block_padding::NoPadding;
    type Decryptor = ecb::Decryptor<aes::Aes128>;

    if key.len() != 16 {
        return Err(CryptoError::BadKeyLength(key.len()));
    }
    let cipher = Decryptor::new(key.into());
    cipher
        .decrypt_padded_mut::<Padding>(bytes)
        .map_err(|_| CryptoError::Decrypt)?;
    Ok(bytes)
}

#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(source)))]
fn decompress(source: impl Read, compressed_len: usize) -> Result<Vec<u8>, DecodeError> {
    let mut decompressed = Vec::with_capacity(compressed_len * EXPANDED_SIZE_MULTIPLIER_HEURISTIC);
    ZlibDecoder::new(source)
        .read_to_end(&mut decompressed)
        .map_err(DecodeError::InflateError)?;
    decompressed.shrink_to_fit();
    Ok(decompressed)
}

/// Reads from two slices, one after the other, without allocating.
struct JoinedReader<'a> {
    first: &'a [u8],
    second: &'a [u8],
    index: usize,
    in_second: bool,
}

impl<'a> JoinedReader<'a> {
    fn new(first: &'a [u8], second: &'a [u8]) -> Self {
        Self {
            first,
            second,
            index: 0,
            in_second: false,
        }
    }

    fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }
}

impl Read for JoinedReader<'_> {
    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        let current = if self.in_second { self.second } else { self.first };
        if self.index == current.len() {
            if self.in_second {
                return Ok(0);
            }
            self.in_second = true;
            self.index = 0;
            return self.read(buffer);
        }
        let want = buffer.len().min(current.len() - self.index);
        buffer[..want].copy_from_slice(&current[self.index..][..want]);
        self.index += want;
        Ok(want)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joined_reader_reads_both_slices_in_order() {
        let mut joined = JoinedReader::new(b"hello ", b"world");
        let mut out = Vec::new();
        joined.read_to_end(&mut out).unwrap();
        assert_eq!(&out, b"hello world");
    }

    #[test]
    fn wrong_key_length_is_rejected() {
        let mut body = [0u8; 16];
        let err = decrypt_in_place(&mut body, b"short").unwrap_err();
        assert!(matches!(err, CryptoError::BadKeyLength(5)));
    }
}
