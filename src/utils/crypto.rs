//! Symmetric cipher primitives used to decrypt protected resources.
//!
//! The resolvers handled by this crate encrypt their payloads with `RijndaelManaged` in its
//! default configuration: AES in CBC mode with PKCS#7 padding, the key size selecting the
//! AES variant.
//!
//! | Key length | Variant |
//! |------------|---------|
//! | 16 bytes | AES-128 |
//! | 24 bytes | AES-192 |
//! | 32 bytes | AES-256 |

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cbc::{Decryptor, Encryptor};

type Aes128CbcEnc = Encryptor<Aes128>;
type Aes128CbcDec = Decryptor<Aes128>;
type Aes192CbcEnc = Encryptor<Aes192>;
type Aes192CbcDec = Decryptor<Aes192>;
type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;

/// AES block size in bytes, which is also the IV length.
pub const AES_BLOCK_SIZE: usize = 16;

/// Returns true if `len` is a valid AES key length.
#[must_use]
pub fn is_aes_key_len(len: usize) -> bool {
    matches!(len, 16 | 24 | 32)
}

/// Decrypts `data` with AES-CBC and strips PKCS#7 padding.
///
/// # Returns
///
/// The plaintext, or `None` for an unsupported key size, a short IV, empty input or
/// invalid padding.
#[must_use]
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Option<Vec<u8>> {
    match key.len() {
        16 => aes_decrypt::<Aes128CbcDec>(key, iv, data),
        24 => aes_decrypt::<Aes192CbcDec>(key, iv, data),
        32 => aes_decrypt::<Aes256CbcDec>(key, iv, data),
        _ => None,
    }
}

/// Encrypts `data` with AES-CBC and PKCS#7 padding.
///
/// # Returns
///
/// The ciphertext, or `None` for an unsupported key size or a short IV.
#[must_use]
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Option<Vec<u8>> {
    match key.len() {
        16 => aes_encrypt::<Aes128CbcEnc>(key, iv, data),
        24 => aes_encrypt::<Aes192CbcEnc>(key, iv, data),
        32 => aes_encrypt::<Aes256CbcEnc>(key, iv, data),
        _ => None,
    }
}

fn aes_encrypt<E: BlockEncryptMut + KeyIvInit>(
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Option<Vec<u8>> {
    if iv.len() < AES_BLOCK_SIZE {
        return None;
    }
    let cipher = E::new_from_slices(key, &iv[..AES_BLOCK_SIZE]).ok()?;
    // PKCS7 always adds between 1 and 16 bytes
    let padded_len = ((data.len() / AES_BLOCK_SIZE) + 1) * AES_BLOCK_SIZE;
    let mut buf = vec![0u8; padded_len];
    buf[..data.len()].copy_from_slice(data);
    let result = cipher
        .encrypt_padded_mut::<Pkcs7>(&mut buf, data.len())
        .ok()?;
    Some(result.to_vec())
}

fn aes_decrypt<D: BlockDecryptMut + KeyIvInit>(
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Option<Vec<u8>> {
    if iv.len() < AES_BLOCK_SIZE || data.is_empty() {
        return None;
    }
    let cipher = D::new_from_slices(key, &iv[..AES_BLOCK_SIZE]).ok()?;
    let mut buf = data.to_vec();
    let result = cipher.decrypt_padded_mut::<Pkcs7>(&mut buf).ok()?;
    Some(result.to_vec())
}
