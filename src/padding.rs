//! PKCS#7 block padding.
//!
//! Only padding is provided: the URL cipher pads its plaintext, while the
//! stream decryptor works on block-aligned chunks and never unpads.

use crate::error::{Error, Result};

/// Pads `data` to a multiple of `block_size`.
///
/// Appends `n` bytes of value `n`, where `n` is the distance to the next
/// block boundary. Input that is already block aligned gets a full block of
/// padding, so the output is always longer than the input.
///
/// # Errors
///
/// Returns `ErrorKind::InvalidLength` when `block_size` is zero or does not
/// fit the pad byte (above 255).
pub fn pad(data: &[u8], block_size: usize) -> Result<Vec<u8>> {
    let Some(size) = u8::try_from(block_size).ok().filter(|&size| size > 0) else {
        return Err(Error::invalid_length(
            "pad",
            format!("block size is {block_size} but should be between 1 and 255"),
        ));
    };

    // The remainder is below `size`, so it fits a byte.
    #[expect(clippy::cast_possible_truncation)]
    let pad_len = size - (data.len() % block_size) as u8;

    let mut padded = Vec::with_capacity(data.len() + usize::from(pad_len));
    padded.extend_from_slice(data);
    padded.resize(data.len() + usize::from(pad_len), pad_len);
    Ok(padded)
}
