//! Per-track Blowfish keys.
//!
//! The key for a track is derived from the lowercase hex MD5 digest of its
//! id: byte `i` is the XOR of hex characters `i` and `i + 16` and byte `i`
//! of a fixed secret. The XOR works on character codes, not on the raw
//! digest, and the result is used as a key as-is.

use std::{ops::Deref, str::FromStr};

use md5::{Digest, Md5};
use veil::Redact;

use crate::error::{Error, Result};

/// Length of decryption keys in bytes.
pub const KEY_LENGTH: usize = 16;

/// Raw key bytes.
pub type RawKey = [u8; KEY_LENGTH];

/// Secret mixed into every track key.
pub const SECRET: &RawKey = b"g4el58wc0zvf9na1";

/// Blowfish key for a single track.
///
/// Its `Debug` output is redacted.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Redact)]
pub struct Key(#[redact] RawKey);

impl Key {
    /// Derives the key for track `id`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dzcrypt::key::Key;
    ///
    /// let key = Key::for_track_id("3135556");
    /// assert_eq!(&*key, b"llfk9f,7e%u`<d49");
    /// ```
    #[must_use]
    pub fn for_track_id(id: &str) -> Self {
        let track_hash = hex::encode(Md5::digest(id.as_bytes()));
        let track_hash = track_hash.as_bytes();

        let mut key = RawKey::default();
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = track_hash[i] ^ track_hash[i + KEY_LENGTH] ^ SECRET[i];
        }

        Self(key)
    }
}

/// Derives the key for track `id`. Shorthand for [`Key::for_track_id`].
#[must_use]
pub fn derive_key(id: &str) -> Key {
    Key::for_track_id(id)
}

impl FromStr for Key {
    type Err = Error;

    /// Parses a string of exactly 16 bytes into a key.
    fn from_str(s: &str) -> Result<Self> {
        let bytes = s.as_bytes();
        let key = RawKey::try_from(bytes).map_err(|_| {
            Error::invalid_length(
                "parse_key",
                format!("key length is {} but should be {KEY_LENGTH}", bytes.len()),
            )
        })?;

        Ok(Self(key))
    }
}

impl From<RawKey> for Key {
    fn from(key: RawKey) -> Self {
        Self(key)
    }
}

impl Deref for Key {
    type Target = RawKey;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn known_answer() {
        assert_eq!(&*derive_key("3135556"), b"llfk9f,7e%u`<d49");
        assert_eq!(derive_key("3135556"), "llfk9f,7e%u`<d49".parse::<Key>().unwrap());
    }

    #[test]
    fn uses_hex_characters_of_the_digest() {
        let digest = hex::encode(Md5::digest(b"3135556"));
        assert_eq!(digest, "29a15fc70fb278009ab6988ce9a422e8");

        let (low, high) = digest.as_bytes().split_at(KEY_LENGTH);
        let key = derive_key("3135556");
        for (i, byte) in key.iter().enumerate() {
            assert_eq!(*byte, low[i] ^ high[i] ^ SECRET[i]);
        }
    }

    #[test]
    fn differs_per_track() {
        assert_ne!(derive_key("3135556"), derive_key("3135557"));
        assert_eq!(derive_key(""), derive_key(""));
    }

    #[test]
    fn parse_requires_sixteen_bytes() {
        assert_eq!(
            "12345".parse::<Key>().unwrap_err().kind,
            ErrorKind::InvalidLength
        );
        assert!("12345678901234567".parse::<Key>().is_err());
        assert_eq!(&*"1234567890123456".parse::<Key>().unwrap(), b"1234567890123456");
    }

    #[test]
    fn debug_is_redacted() {
        let key = derive_key("3135556");
        let debug = format!("{key:?}");
        assert!(!debug.contains("108"), "{debug}");
    }
}
