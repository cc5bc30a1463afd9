//! Electronic codebook mode over any block cipher.
//!
//! Every block is encrypted on its own: there is no IV and no chaining, so
//! identical plaintext blocks give identical ciphertext blocks. This is weak
//! and only exists because the CDN expects it for download URLs.
//!
//! # Example
//!
//! ```rust
//! use aes::Aes128;
//! use dzcrypt::ecb::Ecb;
//!
//! let ecb = Ecb::<Aes128>::new_from_slice(b"0123456789abcdef")?;
//! let mut ciphertext = [0; 32];
//! ecb.crypt_blocks(&mut ciphertext, &[0x42; 32])?;
//! assert_eq!(ciphertext[..16], ciphertext[16..]);
//! ```

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};

use crate::error::{Error, Result};

/// ECB encryptor wrapping a block cipher `C`.
#[derive(Clone, Debug)]
pub struct Ecb<C> {
    cipher: C,
}

impl<C: BlockEncrypt> Ecb<C> {
    /// Wraps an initialized block cipher.
    #[must_use]
    pub fn new(cipher: C) -> Self {
        Self { cipher }
    }

    /// Block size of the underlying cipher in bytes.
    #[must_use]
    pub fn block_size() -> usize {
        C::block_size()
    }

    /// Encrypts `src` into `dst`, block by block.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::InvalidLength` if `src` is empty or not a multiple
    /// of the block size, or if `dst` and `src` differ in length. Nothing is
    /// written in that case.
    pub fn crypt_blocks(&self, dst: &mut [u8], src: &[u8]) -> Result<()> {
        let block_size = Self::block_size();

        if src.is_empty() || src.len() % block_size != 0 {
            return Err(Error::invalid_length(
                "crypt_blocks",
                format!(
                    "input length is {} but should be a nonzero multiple of {block_size}",
                    src.len()
                ),
            ));
        }

        if dst.len() != src.len() {
            return Err(Error::invalid_length(
                "crypt_blocks",
                format!(
                    "output length is {} but should be {}",
                    dst.len(),
                    src.len()
                ),
            ));
        }

        for (input, output) in src
            .chunks_exact(block_size)
            .zip(dst.chunks_exact_mut(block_size))
        {
            self.cipher.encrypt_block_b2b(
                GenericArray::from_slice(input),
                GenericArray::from_mut_slice(output),
            );
        }

        Ok(())
    }
}

impl<C: BlockEncrypt + KeyInit> Ecb<C> {
    /// Initializes the block cipher from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::CipherInit` if the cipher rejects the key length.
    pub fn new_from_slice(key: &[u8]) -> Result<Self> {
        let cipher = C::new_from_slice(key).map_err(|e| {
            Error::cipher_init(
                "init_cipher",
                format!("{e} ({} byte key)", key.len()),
            )
        })?;

        Ok(Self::new(cipher))
    }
}

#[cfg(test)]
mod tests {
    use aes::Aes128;
    use blowfish::Blowfish;

    use super::*;
    use crate::{error::ErrorKind, padding::pad};

    const KEY: &[u8; 16] = b"jo6aey6haid2Teih";

    fn encrypt_padded(plaintext: &[u8]) -> String {
        let ecb = Ecb::<Aes128>::new_from_slice(KEY).unwrap();
        let plaintext = pad(plaintext, 16).unwrap();
        let mut ciphertext = vec![0; plaintext.len()];
        ecb.crypt_blocks(&mut ciphertext, &plaintext).unwrap();
        hex::encode(ciphertext)
    }

    #[test]
    fn known_answers() {
        assert_eq!(encrypt_padded(b"abc"), "90a14c0c4d0104397e5590415b7be2db");
        assert_eq!(
            encrypt_padded(b"hellow World!"),
            "598ad60562de8421a8223645a44e733e"
        );
    }

    #[test]
    fn identical_blocks_encrypt_identically() {
        let ecb = Ecb::<Aes128>::new_from_slice(KEY).unwrap();
        let mut src = [0x17; 48];
        src[32..].fill(0x99);

        let mut dst = [0; 48];
        ecb.crypt_blocks(&mut dst, &src).unwrap();

        assert_eq!(dst[..16], dst[16..32]);
        assert_ne!(dst[..16], dst[32..]);
        assert_ne!(dst[..16], src[..16]);
    }

    #[test]
    fn blocks_are_independent() {
        let ecb = Ecb::<Aes128>::new_from_slice(KEY).unwrap();
        let src: Vec<u8> = (0..64).collect();

        let mut whole = [0; 64];
        ecb.crypt_blocks(&mut whole, &src).unwrap();

        for (i, block) in src.chunks(16).enumerate() {
            let mut single = [0; 16];
            ecb.crypt_blocks(&mut single, block).unwrap();
            assert_eq!(single, whole[i * 16..(i + 1) * 16]);
        }
    }

    #[test]
    fn works_with_eight_byte_blocks() {
        assert_eq!(Ecb::<Blowfish>::block_size(), 8);

        let ecb = Ecb::<Blowfish>::new_from_slice(KEY).unwrap();
        let mut dst = [0; 16];
        ecb.crypt_blocks(&mut dst, &[0; 16]).unwrap();
        assert_eq!(dst[..8], dst[8..]);

        let mut dst = [0; 16];
        let err = ecb.crypt_blocks(&mut dst, &[0; 12]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidLength);
    }

    #[test]
    fn rejects_bad_lengths() {
        let ecb = Ecb::<Aes128>::new_from_slice(KEY).unwrap();

        let mut dst = [0; 16];
        let err = ecb.crypt_blocks(&mut dst, &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidLength);

        let err = ecb.crypt_blocks(&mut dst, &[0; 15]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidLength);

        let mut short = [0xff; 16];
        let err = ecb.crypt_blocks(&mut short, &[0; 32]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidLength);
        assert_eq!(short, [0xff; 16]);
    }

    #[test]
    fn rejects_bad_keys() {
        let err = Ecb::<Aes128>::new_from_slice(b"too short").unwrap_err();
        assert_eq!(err.kind, ErrorKind::CipherInit);
        assert_eq!(err.operation, "init_cipher");
    }
}
