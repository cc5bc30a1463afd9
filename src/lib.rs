//! Download URL cipher and striped stream decryption for Deezer media.
//!
//! Given a track's attributes, [`url::build_url`] computes the encrypted CDN
//! URL to download it from. Given the downloaded stream and the track id,
//! [`decrypt::decrypt`] recovers the plaintext audio.
//!
//! Fetching track attributes and streams is up to the caller.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

#[macro_use]
extern crate log;

pub mod config;
pub mod decrypt;
pub mod ecb;
pub mod error;
pub mod key;
pub mod padding;
pub mod parallel;
pub mod track;
pub mod url;

pub use error::{Error, ErrorKind, Result};
