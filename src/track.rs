//! Track attributes needed to locate and decrypt a track.
//!
//! The attributes come from Deezer's gateway song object:
//!
//! ```json
//! {
//!     "SNG_ID": "3135556",
//!     "MD5_ORIGIN": "51afcde9f56a132096c0496cc95eb24b",
//!     "MEDIA_VERSION": "5",
//!     "FILESIZE_MP3_128": "3427165",
//!     "FILESIZE_MP3_256": 0,
//!     "FILESIZE_MP3_320": "8567595"
//! }
//! ```
//!
//! Fetching that object is up to the caller; this module only validates
//! and models it.

use std::fmt;

use serde::Deserialize;
use serde_with::{serde_as, DefaultOnError, DisplayFromStr, PickFirst};

use crate::error::{Error, Result};

/// Length of the content hash in hex characters.
pub const CONTENT_HASH_LENGTH: usize = 32;

/// Audio format, identified on the CDN by its legacy format code.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
#[expect(non_camel_case_types)]
#[repr(u8)]
pub enum Format {
    /// 128 kbps MP3 (1)
    MP3_128 = 1,
    /// 320 kbps MP3 (3)
    MP3_320 = 3,
    /// 256 kbps MP3 (5)
    MP3_256 = 5,
    /// MP3 at the default bitrate (8)
    #[default]
    MP3_MISC = 8,
}

impl Format {
    /// Code identifying this format in download URLs.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Picks the best format with a nonzero file size.
    ///
    /// Falls back to [`Format::MP3_MISC`] when no size is advertised.
    #[must_use]
    pub fn from_file_sizes(mp3_320: u64, mp3_256: u64, mp3_128: u64) -> Self {
        if mp3_320 > 0 {
            Self::MP3_320
        } else if mp3_256 > 0 {
            Self::MP3_256
        } else if mp3_128 > 0 {
            Self::MP3_128
        } else {
            Self::MP3_MISC
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Gateway song object, reduced to what download URLs need.
///
/// Ids, versions and file sizes may be sent as strings or as numbers.
/// Missing or malformed file sizes count as zero.
#[serde_as]
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Deserialize)]
pub struct SongData {
    #[serde(rename = "SNG_ID")]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub song_id: i64,

    #[serde(rename = "MD5_ORIGIN")]
    pub md5_origin: String,

    #[serde(rename = "MEDIA_VERSION")]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub media_version: u64,

    #[serde(default, rename = "FILESIZE_MP3_320")]
    #[serde_as(as = "DefaultOnError<PickFirst<(_, DisplayFromStr)>>")]
    pub filesize_mp3_320: u64,

    #[serde(default, rename = "FILESIZE_MP3_256")]
    #[serde_as(as = "DefaultOnError<PickFirst<(_, DisplayFromStr)>>")]
    pub filesize_mp3_256: u64,

    #[serde(default, rename = "FILESIZE_MP3_128")]
    #[serde_as(as = "DefaultOnError<PickFirst<(_, DisplayFromStr)>>")]
    pub filesize_mp3_128: u64,
}

impl SongData {
    /// Best format this song is available in.
    #[must_use]
    pub fn format(&self) -> Format {
        Format::from_file_sizes(
            self.filesize_mp3_320,
            self.filesize_mp3_256,
            self.filesize_mp3_128,
        )
    }
}

/// Immutable attributes of one track.
///
/// The content hash is guaranteed to be 32 lowercase hex characters and the
/// other fields to be non-empty.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TrackAttributes {
    content_hash: String,
    numeric_id: String,
    format_code: String,
    media_version: String,
}

impl TrackAttributes {
    /// Validates and builds track attributes.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::InvalidArgument` if the content hash is not 32
    /// lowercase hex characters or any other field is empty.
    pub fn new<S>(
        content_hash: S,
        numeric_id: S,
        format_code: S,
        media_version: S,
    ) -> Result<Self>
    where
        S: Into<String>,
    {
        let content_hash = content_hash.into();
        let is_lower_hex = |chr: char| chr.is_ascii_digit() || ('a'..='f').contains(&chr);
        if content_hash.len() != CONTENT_HASH_LENGTH || !content_hash.chars().all(is_lower_hex) {
            return Err(Error::invalid_argument(
                "track_attributes",
                format!(
                    "content hash \"{content_hash}\" should be {CONTENT_HASH_LENGTH} lowercase hex characters"
                ),
            ));
        }

        let numeric_id = numeric_id.into();
        let format_code = format_code.into();
        let media_version = media_version.into();
        for (name, value) in [
            ("numeric id", &numeric_id),
            ("format code", &format_code),
            ("media version", &media_version),
        ] {
            if value.is_empty() {
                return Err(Error::invalid_argument(
                    "track_attributes",
                    format!("{name} is empty"),
                ));
            }
        }

        Ok(Self {
            content_hash,
            numeric_id,
            format_code,
            media_version,
        })
    }

    /// Parses attributes from a gateway song object.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::InvalidArgument` if the JSON is malformed or the
    /// attributes fail validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let song: SongData =
            serde_json::from_str(json).map_err(|e| Error::from(e).during("track_attributes"))?;
        Self::try_from(song)
    }

    #[must_use]
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    #[must_use]
    pub fn numeric_id(&self) -> &str {
        &self.numeric_id
    }

    #[must_use]
    pub fn format_code(&self) -> &str {
        &self.format_code
    }

    #[must_use]
    pub fn media_version(&self) -> &str {
        &self.media_version
    }
}

impl TryFrom<SongData> for TrackAttributes {
    type Error = Error;

    fn try_from(song: SongData) -> Result<Self> {
        let format = song.format();
        trace!("track {} selected format {format}", song.song_id);

        Self::new(
            song.md5_origin,
            song.song_id.to_string(),
            format.code().to_string(),
            song.media_version.to_string(),
        )
    }
}
