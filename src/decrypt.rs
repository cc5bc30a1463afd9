//! Track decryption for Deezer's protected media content.
//!
//! # Encryption Format
//!
//! Deezer uses a striped encryption pattern:
//! * Content is divided into 2KB chunks
//! * Every third chunk is encrypted, starting with the first
//! * A final chunk shorter than 2KB is never encrypted
//! * Encryption uses Blowfish in CBC mode with an all-zero IV, restarted for
//!   every chunk
//! * The key is derived from the track id, see [`crate::key`]
//!
//! Two ways to decrypt are provided:
//! * [`decrypt`] reads a whole stream into a plaintext buffer
//! * [`Decrypt`] wraps a stream and decrypts while it is read, and seeks
//!   when the stream can
//!
//! # Examples
//!
//! ```rust
//! use dzcrypt::decrypt::{decrypt, Decrypt};
//!
//! let plaintext = decrypt(response, "3135556", content_length)?;
//!
//! // Or while streaming:
//! let mut reader = Decrypt::new(response, "3135556", content_length);
//! std::io::copy(&mut reader, &mut decoder_input)?;
//! ```

use std::io::{self, Read, Seek, SeekFrom};

use blowfish::Blowfish;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};

use crate::{
    error::{Error, Result},
    key::{derive_key, Key},
};

/// Size of each chunk in bytes (2KB).
pub const CHUNK_SIZE: usize = 2 * 1024;

/// Number of chunks in a stripe (3).
///
/// The first chunk of every stripe is encrypted.
pub const STRIPE_COUNT: u64 = 3;

/// Blowfish block size in bytes.
pub const CIPHER_BLOCK_SIZE: usize = 8;

/// Fixed IV for CBC decryption.
pub const IV: &[u8; CIPHER_BLOCK_SIZE] = &[0; CIPHER_BLOCK_SIZE];

type BlowfishCbc = cbc::Decryptor<Blowfish>;

/// Whether chunk `index` of length `len` is encrypted.
#[must_use]
pub fn is_encrypted(index: u64, len: usize) -> bool {
    index % STRIPE_COUNT == 0 && len == CHUNK_SIZE
}

/// Iterates over `(index, length)` of the chunks in a stream of
/// `total_length` bytes.
pub fn chunks(total_length: u64) -> impl Iterator<Item = (u64, usize)> {
    let chunk_size = CHUNK_SIZE as u64;
    (0..total_length.div_ceil(chunk_size)).map(move |index| {
        let remaining = total_length - index * chunk_size;
        // Bounded by `CHUNK_SIZE`.
        #[expect(clippy::cast_possible_truncation)]
        let len = remaining.min(chunk_size) as usize;
        (index, len)
    })
}

/// Decrypts `data` in place with Blowfish-CBC under `key` and the zero IV.
///
/// # Errors
///
/// Returns `ErrorKind::Decrypt` if the length of `data` is not a multiple of
/// the Blowfish block size, or `ErrorKind::CipherInit` if Blowfish rejects
/// the key.
pub fn decrypt_stripe(key: &Key, data: &mut [u8]) -> Result<()> {
    if data.len() % CIPHER_BLOCK_SIZE != 0 {
        return Err(Error::decrypt(
            "decrypt",
            format!(
                "length is {} but should be a multiple of {CIPHER_BLOCK_SIZE}",
                data.len()
            ),
        ));
    }

    // The state of the cipher is reset on each chunk.
    let cipher = BlowfishCbc::new_from_slices(&**key, IV)
        .map_err(|e| Error::cipher_init("decrypt", e.to_string()))?;

    // Aligned to the block size, so no padding is necessary.
    cipher
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|e| Error::decrypt("decrypt", e.to_string()))?;

    Ok(())
}

/// Decrypts chunk `index` in place if it is encrypted, and leaves it as is
/// otherwise.
///
/// # Errors
///
/// See [`decrypt_stripe`]. Errors carry the chunk index.
pub fn decrypt_chunk(key: &Key, index: u64, chunk: &mut [u8]) -> Result<()> {
    if !is_encrypted(index, chunk.len()) {
        return Ok(());
    }

    decrypt_stripe(key, chunk).map_err(|e| e.at_chunk(index))
}

/// Reads exactly `len` bytes of chunk `index` into `buf`.
pub(crate) fn read_chunk<R>(stream: &mut R, index: u64, buf: &mut [u8]) -> Result<()>
where
    R: Read + ?Sized,
{
    stream.read_exact(buf).map_err(|e| {
        let err = if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::truncated_stream(
                "decrypt",
                format!("stream ended before {} byte chunk was read", buf.len()),
            )
        } else {
            Error::from(e).during("decrypt")
        };
        err.at_chunk(index)
    })
}

/// Most bytes reserved up front for an output buffer. The declared length
/// is not trusted, so larger outputs grow as chunks arrive.
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Capacity to reserve for the output of a stream of `total_length` bytes.
pub(crate) fn preallocation(total_length: u64) -> usize {
    usize::try_from(total_length.min(MAX_PREALLOCATION)).unwrap_or(0)
}

/// Reads and decrypts a whole stream of `total_length` bytes for track `id`.
///
/// Chunks are read strictly in order. The first error aborts and the
/// partial output is dropped.
///
/// # Errors
///
/// * `ErrorKind::TruncatedStream` if the stream holds fewer bytes than
///   declared
/// * `ErrorKind::Decrypt` if an encrypted chunk cannot be decrypted
/// * `ErrorKind::Io` if reading fails otherwise
pub fn decrypt<R: Read>(mut stream: R, id: &str, total_length: u64) -> Result<Vec<u8>> {
    let key = derive_key(id);
    let mut output = Vec::with_capacity(preallocation(total_length));
    debug!("decrypting {total_length} bytes of track {id}");

    let mut encrypted = 0;
    for (index, len) in chunks(total_length) {
        let position = output.len();
        output.resize(position + len, 0);

        let chunk = &mut output[position..];
        read_chunk(&mut stream, index, chunk)?;

        if is_encrypted(index, len) {
            decrypt_chunk(&key, index, chunk)?;
            encrypted += 1;
        }
    }

    trace!("decrypted {encrypted} of {} chunks", chunks(total_length).count());
    Ok(output)
}

/// Streaming decryptor.
///
/// Implements `Read`, and `Seek` when the wrapped stream does. Chunks are
/// decrypted one at a time as they are read.
///
/// A failed read may leave the wrapped stream part-way into a chunk. Every
/// later read then returns the same error. Seeking, for instance with
/// `SeekFrom::Current(0)`, repositions the wrapped stream and clears it.
pub struct Decrypt<R> {
    /// Source of encrypted data.
    inner: R,

    /// Declared length of the stream in bytes.
    file_size: u64,

    /// Track-specific decryption key.
    key: Key,

    /// Current chunk, decrypted.
    buffer: Vec<u8>,

    /// Index of the chunk held by `buffer`, if any.
    ///
    /// When no chunk or a different chunk is loaded, `inner` is positioned
    /// at the start of the chunk that `position` falls in.
    block: Option<u64>,

    /// Position in the decrypted stream.
    position: u64,

    /// Error of the last failed chunk load, returned by every later read
    /// until a seek.
    failed: Option<Error>,
}

impl<R: Read> Decrypt<R> {
    /// Wraps `inner`, which must be positioned at the start of the stream.
    #[must_use]
    pub fn new(inner: R, id: &str, file_size: u64) -> Self {
        Self {
            inner,
            file_size,
            key: derive_key(id),
            buffer: Vec::with_capacity(CHUNK_SIZE),
            block: None,
            position: 0,
            failed: None,
        }
    }

    /// Declared length of the stream in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.file_size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.file_size == 0
    }

    /// Unwraps the stream. Its position is unspecified.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads and decrypts chunk `block` from `inner`.
    fn load_block(&mut self, block: u64) -> Result<()> {
        let start = block * CHUNK_SIZE as u64;
        let remaining = self.file_size.saturating_sub(start);
        // Bounded by `CHUNK_SIZE`.
        #[expect(clippy::cast_possible_truncation)]
        let len = remaining.min(CHUNK_SIZE as u64) as usize;

        // `inner` is past the chunk start once reading began.
        self.block = None;
        self.buffer.resize(len, 0);
        read_chunk(&mut self.inner, block, &mut self.buffer)?;
        decrypt_chunk(&self.key, block, &mut self.buffer)?;
        self.block = Some(block);

        Ok(())
    }
}

impl<R: Read> Read for Decrypt<R> {
    /// Reads decrypted data, loading chunks as needed.
    ///
    /// Bytes copied before a chunk fails to load are returned first. The
    /// error is returned by the next call.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(err) = &self.failed {
            return Err(err.replica().into());
        }

        let mut bytes_read = 0;

        while bytes_read < buf.len() && self.position < self.file_size {
            let block = self.position / CHUNK_SIZE as u64;
            if self.block != Some(block) {
                if let Err(e) = self.load_block(block) {
                    self.failed = Some(e.replica());
                    if bytes_read > 0 {
                        break;
                    }
                    return Err(e.into());
                }
            }

            // Bounded by `CHUNK_SIZE`.
            #[expect(clippy::cast_possible_truncation)]
            let offset = (self.position % CHUNK_SIZE as u64) as usize;
            let available = &self.buffer[offset..];
            let len = available.len().min(buf.len() - bytes_read);

            buf[bytes_read..bytes_read + len].copy_from_slice(&available[..len]);
            bytes_read += len;
            self.position += len as u64;
        }

        Ok(bytes_read)
    }
}

impl<R: Read + Seek> Seek for Decrypt<R> {
    /// Seeks within the decrypted stream.
    ///
    /// Seeking within the current chunk is free. Otherwise the stream is
    /// repositioned at the start of the target chunk, which is decrypted on
    /// the next read. A successful seek clears an earlier read error.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(pos) => Some(pos),
            SeekFrom::End(pos) => self.file_size.checked_add_signed(pos),
            SeekFrom::Current(pos) => self.position.checked_add_signed(pos),
        }
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;

        if target > self.file_size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "seek to a position beyond the end of the stream",
            ));
        }

        let block = target / CHUNK_SIZE as u64;
        if self.block != Some(block) {
            self.inner
                .seek(SeekFrom::Start(block * CHUNK_SIZE as u64))?;
            self.block = None;
        }

        self.failed = None;
        self.position = target;
        Ok(target)
    }
}
