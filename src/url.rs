//! Encrypted download URLs.
//!
//! The CDN expects tracks to be requested under an AES-ECB encrypted path:
//!
//! 1. Join content hash, format code, track id and media version with the
//!    raw byte `0xA4`.
//! 2. Prefix the lowercase hex MD5 of that with another `0xA4`, and append a
//!    trailing `0xA4`.
//! 3. Pad to 16 bytes, encrypt with AES-128-ECB under a fixed key, and hex
//!    encode.
//!
//! The separator is a single byte, not the UTF-8 encoding of `¤`, which is
//! why the path is composed as bytes.

use aes::{
    cipher::{BlockEncrypt, KeyInit},
    Aes128,
};
use md5::{Digest, Md5};

use crate::{ecb::Ecb, error::Result, padding::pad, track::TrackAttributes};

/// Separator between the path components.
pub const SEPARATOR: u8 = 0xA4;

/// AES key the path is encrypted with.
pub const URL_KEY: &[u8; 16] = b"jo6aey6haid2Teih";

/// Joins track attributes with [`SEPARATOR`].
#[must_use]
pub fn compose(attrs: &TrackAttributes) -> Vec<u8> {
    let fields = [
        attrs.content_hash(),
        attrs.format_code(),
        attrs.numeric_id(),
        attrs.media_version(),
    ];

    let mut composed = Vec::with_capacity(fields.iter().map(|field| field.len() + 1).sum());
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            composed.push(SEPARATOR);
        }
        composed.extend_from_slice(field.as_bytes());
    }
    composed
}

/// Computes the hex encoded, encrypted path segment for a track.
///
/// # Errors
///
/// Returns `ErrorKind::CipherInit` if AES rejects [`URL_KEY`].
pub fn path_segment(attrs: &TrackAttributes) -> Result<String> {
    let composed = compose(attrs);
    let digest = hex::encode(Md5::digest(&composed));

    let mut path = Vec::with_capacity(digest.len() + composed.len() + 2);
    path.extend_from_slice(digest.as_bytes());
    path.push(SEPARATOR);
    path.extend_from_slice(&composed);
    path.push(SEPARATOR);

    let ciphertext = encrypt_path::<Aes128>(URL_KEY, &path)?;
    Ok(hex::encode(ciphertext))
}

/// Pads `path` and encrypts it in ECB mode with cipher `C` under `key`.
/// Errors are reported as failures of `build_url`.
fn encrypt_path<C>(key: &[u8], path: &[u8]) -> Result<Vec<u8>>
where
    C: BlockEncrypt + KeyInit,
{
    let ecb = Ecb::<C>::new_from_slice(key).map_err(|e| e.during("build_url"))?;
    let plaintext = pad(path, Ecb::<C>::block_size()).map_err(|e| e.during("build_url"))?;

    let mut ciphertext = vec![0; plaintext.len()];
    ecb.crypt_blocks(&mut ciphertext, &plaintext)
        .map_err(|e| e.during("build_url"))?;

    Ok(ciphertext)
}

/// Builds the CDN download URL for a track.
///
/// The host is sharded on the first character of the content hash.
///
/// # Errors
///
/// Returns `ErrorKind::CipherInit` if AES rejects [`URL_KEY`].
pub fn build_url(attrs: &TrackAttributes) -> Result<String> {
    let segment = path_segment(attrs)?;

    // Content hashes are validated to be ASCII hex.
    let shard = &attrs.content_hash()[..1];
    let url = format!("https://e-cdns-proxy-{shard}.dzcdn.net/mobile/1/{segment}");
    trace!("download url for track {}: {url}", attrs.numeric_id());

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT_HASH: &str = "51afcde9f56a132096c0496cc95eb24b";
    const PATH_SEGMENT: &str = "9c2ca4649cc23e7905f09324e9fe1d24505a18b97267b56b8deefecb1d62686d2f5a0bea21e1d6dbd9c8f34c691e12dc83cac650c014d41f69d381b0ce749ff5d38c5e89c566677c9cd24555e6c2bc02";

    fn attrs() -> TrackAttributes {
        TrackAttributes::new(CONTENT_HASH, "3135556", "3", "5").unwrap()
    }

    #[test]
    fn composes_with_single_byte_separator() {
        let composed = compose(&attrs());
        assert_eq!(composed.len(), 32 + 1 + 1 + 1 + 7 + 1 + 1);
        assert_eq!(composed.iter().filter(|&&b| b == SEPARATOR).count(), 3);
        assert_eq!(&composed[32..35], b"\xa43\xa4");
        assert!(std::str::from_utf8(&composed).is_err());
    }

    #[test]
    fn digest_vectors() {
        assert_eq!(
            hex::encode(Md5::digest(b"abc")),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            hex::encode(Md5::digest(compose(&attrs()))),
            "df4797bef68491542a6963b58bac773d"
        );
    }

    #[test]
    fn path_segment_vector() {
        let segment = path_segment(&attrs()).unwrap();
        assert_eq!(segment.len(), 160);
        assert_eq!(segment, PATH_SEGMENT);
    }

    #[test]
    fn builds_sharded_url() {
        let url = build_url(&attrs()).unwrap();
        assert_eq!(
            url,
            format!("https://e-cdns-proxy-5.dzcdn.net/mobile/1/{PATH_SEGMENT}")
        );
        assert!(url.is_ascii());
    }

    #[test]
    fn errors_name_build_url() {
        let err = encrypt_path::<Aes128>(b"short key", b"path").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::CipherInit);
        assert_eq!(err.operation, "build_url");

        // Blowfish pads to 8 bytes.
        let ciphertext = encrypt_path::<blowfish::Blowfish>(URL_KEY, b"path").unwrap();
        assert_eq!(ciphertext.len(), 8);
    }

    #[test]
    fn url_changes_with_format() {
        let mp3_128 = TrackAttributes::new(CONTENT_HASH, "3135556", "1", "5").unwrap();
        assert_ne!(build_url(&mp3_128).unwrap(), build_url(&attrs()).unwrap());
    }
}
