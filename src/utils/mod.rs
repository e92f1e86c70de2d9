//! Cryptographic and compression primitives used by resource recovery.
//!
//! - [`crypto`] - AES-CBC with PKCS#7 padding
//! - [`decompress`] - QuickLZ and Deflate decompression

pub mod crypto;
pub mod decompress;

pub use crypto::{aes_cbc_decrypt, aes_cbc_encrypt};
pub use decompress::{decompress_deflate, decompress_quicklz, Decompression, DecompressError};
