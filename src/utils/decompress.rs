//! Decompression of recovered resource payloads.
//!
//! Resource resolvers compress their payload before encrypting it. Two codecs are supported:
//!
//! # QuickLZ 1.5
//!
//! The default for .NET Reactor protected resources. Every stream starts with a flags byte:
//!
//! ```text
//! bit 0     : 1 = compressed, 0 = stored
//! bit 1     : 1 = 9 byte header, 0 = 3 byte header
//! bits 2..3 : compression level (1 or 3)
//! ```
//!
//! followed by the compressed and decompressed sizes (one byte each in the short header,
//! little-endian `u32` each in the long one). The compressed body interleaves 32 bit control
//! words with literals and back-references.
//!
//! # Deflate Format
//!
//! Standard Deflate streams as used by `System.IO.Compression.DeflateStream`.

use std::io::Read;

use flate2::read::DeflateDecoder;

/// Result type for decompression operations.
pub type DecompressResult<T> = std::result::Result<T, DecompressError>;

/// Error type for decompression operations.
#[derive(Debug)]
pub enum DecompressError {
    /// The QuickLZ header is truncated or inconsistent.
    InvalidQuickLzHeader,
    /// The QuickLZ stream uses a compression level other than 1 or 3.
    UnsupportedLevel(u8),
    /// The QuickLZ body references data outside the stream.
    QuickLzError(String),
    /// Deflate decompression failed.
    DeflateError(String),
    /// Input buffer too small.
    BufferTooSmall,
}

impl std::fmt::Display for DecompressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuickLzHeader => write!(f, "Invalid QuickLZ header"),
            Self::UnsupportedLevel(level) => {
                write!(f, "Unsupported QuickLZ compression level {level}")
            }
            Self::QuickLzError(msg) => write!(f, "QuickLZ decompression error: {msg}"),
            Self::DeflateError(msg) => write!(f, "Deflate decompression error: {msg}"),
            Self::BufferTooSmall => write!(f, "Input buffer too small"),
        }
    }
}

impl std::error::Error for DecompressError {}

/// Codec applied to a decrypted resource payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decompression {
    /// QuickLZ 1.5, levels 1 and 3
    #[default]
    QuickLz,
    /// Raw Deflate
    Deflate,
}

impl Decompression {
    /// Decompresses `data` with this codec.
    ///
    /// # Errors
    ///
    /// Returns a [`DecompressError`] if the payload is not a valid stream for the codec.
    pub fn decompress(self, data: &[u8]) -> DecompressResult<Vec<u8>> {
        match self {
            Self::QuickLz => decompress_quicklz(data),
            Self::Deflate => decompress_deflate(data),
        }
    }
}

const QLZ_HASH_VALUES: usize = 4096;
const QLZ_CWORD_LEN: usize = 4;
// Upper bound on output bytes per stream byte; a 4 byte level 3 match yields at most 258
const QLZ_MAX_EXPANSION: usize = 256;
// UNCONDITIONAL_MATCHLEN + UNCOMPRESSED_END + 1
const QLZ_TAIL_LEN: usize = 11;

/// Parsed QuickLZ stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickLzHeader {
    /// Header length in bytes (3 or 9)
    pub header_len: usize,
    /// Total stream length, header included
    pub compressed_size: usize,
    /// Length of the decompressed data
    pub decompressed_size: usize,
    /// Compression level
    pub level: u8,
    /// Whether the body is compressed (otherwise stored verbatim)
    pub compressed: bool,
}

impl QuickLzHeader {
    /// Parses the header at the start of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`DecompressError::InvalidQuickLzHeader`] if the header is truncated.
    pub fn parse(data: &[u8]) -> DecompressResult<Self> {
        let flags = *data.first().ok_or(DecompressError::BufferTooSmall)?;

        let (header_len, compressed_size, decompressed_size) = if flags & 2 == 2 {
            if data.len() < 9 {
                return Err(DecompressError::InvalidQuickLzHeader);
            }
            (
                9,
                u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as usize,
                u32::from_le_bytes([data[5], data[6], data[7], data[8]]) as usize,
            )
        } else {
            if data.len() < 3 {
                return Err(DecompressError::InvalidQuickLzHeader);
            }
            (3, data[1] as usize, data[2] as usize)
        };

        Ok(Self {
            header_len,
            compressed_size,
            decompressed_size,
            level: (flags >> 2) & 3,
            compressed: flags & 1 == 1,
        })
    }
}

/// Decompresses a QuickLZ 1.5 stream.
///
/// # Arguments
///
/// * `data` - The QuickLZ stream, header included.
///
/// # Returns
///
/// The decompressed data, or an error if the stream is malformed.
pub fn decompress_quicklz(data: &[u8]) -> DecompressResult<Vec<u8>> {
    let header = QuickLzHeader::parse(data)?;
    if header.level != 1 && header.level != 3 {
        return Err(DecompressError::UnsupportedLevel(header.level));
    }

    if data.len() < header.compressed_size {
        return Err(DecompressError::BufferTooSmall);
    }

    if !header.compressed {
        let end = header.header_len + header.decompressed_size;
        let stored = data
            .get(header.header_len..end)
            .ok_or(DecompressError::BufferTooSmall)?;
        return Ok(stored.to_vec());
    }

    // The header sizes are untrusted; validate them before sizing the output buffer.
    if header.compressed_size != data.len()
        || header.compressed_size < header.header_len + QLZ_CWORD_LEN
        || header.decompressed_size > header.compressed_size.saturating_mul(QLZ_MAX_EXPANSION)
    {
        return Err(DecompressError::InvalidQuickLzHeader);
    }

    QuickLzDecoder::new(data, &header).run()
}

/// Body decoder state for compressed QuickLZ streams.
struct QuickLzDecoder<'a> {
    source: &'a [u8],
    dest: Vec<u8>,
    level: u8,
    src: usize,
    dst: usize,
    // last position eligible for a literal outside the uncompressed tail
    last_matchstart: Option<usize>,
    // next destination position to enter into the level 1 hash table
    next_hashed: usize,
    hashtable: Vec<usize>,
}

impl<'a> QuickLzDecoder<'a> {
    fn new(source: &'a [u8], header: &QuickLzHeader) -> Self {
        Self {
            source,
            dest: vec![0u8; header.decompressed_size],
            level: header.level,
            src: header.header_len,
            dst: 0,
            last_matchstart: header.decompressed_size.checked_sub(QLZ_TAIL_LEN),
            next_hashed: 0,
            hashtable: vec![0usize; QLZ_HASH_VALUES],
        }
    }

    /// Source byte, zero past the end. Fetches read ahead of the cursor.
    fn src_byte(&self, at: usize) -> u32 {
        u32::from(self.source.get(at).copied().unwrap_or(0))
    }

    fn dst_byte(&self, at: usize) -> u32 {
        u32::from(self.dest.get(at).copied().unwrap_or(0))
    }

    fn read_u24(&self, at: usize) -> u32 {
        self.src_byte(at) | self.src_byte(at + 1) << 8 | self.src_byte(at + 2) << 16
    }

    fn read_u32(&self, at: usize) -> u32 {
        self.read_u24(at) | self.src_byte(at + 3) << 24
    }

    fn fetch(&self) -> u32 {
        if self.level == 1 {
            self.read_u24(self.src)
        } else {
            self.read_u32(self.src)
        }
    }

    fn in_body(&self) -> bool {
        self.last_matchstart.is_some_and(|last| self.dst <= last)
    }

    fn hash_at(&self, pos: usize) -> usize {
        let value = self.dst_byte(pos) | self.dst_byte(pos + 1) << 8 | self.dst_byte(pos + 2) << 16;
        (((value >> 12) ^ value) as usize) & (QLZ_HASH_VALUES - 1)
    }

    /// Enters every position up to and including `upto` into the hash table.
    fn update_hash_upto(&mut self, upto: usize) {
        while self.next_hashed <= upto {
            let hash = self.hash_at(self.next_hashed);
            self.hashtable[hash] = self.next_hashed;
            self.next_hashed += 1;
        }
    }

    fn literal(&mut self) -> DecompressResult<()> {
        let byte = *self
            .source
            .get(self.src)
            .ok_or_else(|| DecompressError::QuickLzError("literal past end of input".into()))?;
        let slot = self
            .dest
            .get_mut(self.dst)
            .ok_or_else(|| DecompressError::QuickLzError("literal past end of output".into()))?;
        *slot = byte;
        self.dst += 1;
        self.src += 1;
        Ok(())
    }

    fn run(mut self) -> DecompressResult<Vec<u8>> {
        let size = self.dest.len();
        let mut cword: u32 = 1;
        let mut fetch: u32 = 0;

        loop {
            if cword == 1 {
                if self.src + QLZ_CWORD_LEN > self.source.len() {
                    return Err(DecompressError::QuickLzError(
                        "control word past end of input".into(),
                    ));
                }
                cword = self.read_u32(self.src);
                self.src += QLZ_CWORD_LEN;
                if self.in_body() {
                    fetch = self.fetch();
                }
            }

            if cword & 1 == 1 {
                cword >>= 1;
                self.back_reference(fetch)?;
                fetch = self.fetch();
            } else if self.in_body() {
                self.literal()?;
                cword >>= 1;
                if self.level == 1 {
                    if let Some(upto) = self.dst.checked_sub(3) {
                        self.update_hash_upto(upto);
                    }
                    fetch = (fetch >> 8) & 0xffff | self.src_byte(self.src + 2) << 16;
                } else {
                    fetch = (fetch >> 8) & 0xffff
                        | self.src_byte(self.src + 2) << 16
                        | self.src_byte(self.src + 3) << 24;
                }
            } else {
                while self.dst < size {
                    if cword == 1 {
                        self.src += QLZ_CWORD_LEN;
                        cword = 0x8000_0000;
                    }
                    self.literal()?;
                    cword >>= 1;
                }
                return Ok(self.dest);
            }
        }
    }

    fn back_reference(&mut self, fetch: u32) -> DecompressResult<()> {
        let (source_pos, matchlen) = if self.level == 1 {
            let hash = ((fetch >> 4) & 0xfff) as usize;
            let matchlen = if fetch & 0xf != 0 {
                self.src += 2;
                (fetch & 0xf) as usize + 2
            } else {
                let len = self.src_byte(self.src + 2) as usize;
                self.src += 3;
                len
            };
            (self.hashtable[hash], matchlen)
        } else {
            let (offset, matchlen, consumed) = if fetch & 3 == 0 {
                ((fetch & 0xff) >> 2, 3, 1)
            } else if fetch & 2 == 0 {
                ((fetch & 0xffff) >> 2, 3, 2)
            } else if fetch & 1 == 0 {
                ((fetch & 0xffff) >> 6, ((fetch >> 2) & 15) + 3, 2)
            } else if fetch & 127 != 3 {
                ((fetch >> 7) & 0x1ffff, ((fetch >> 2) & 0x1f) + 2, 3)
            } else {
                (fetch >> 15, ((fetch >> 7) & 255) + 3, 4)
            };
            self.src += consumed;
            let offset = offset as usize;
            if offset == 0 || offset > self.dst {
                return Err(DecompressError::QuickLzError(format!(
                    "back-reference offset {offset} at output position {}",
                    self.dst
                )));
            }
            (self.dst - offset, matchlen as usize)
        };

        if source_pos >= self.dst || self.dst + matchlen > self.dest.len() {
            return Err(DecompressError::QuickLzError(format!(
                "back-reference of {matchlen} bytes at output position {} out of range",
                self.dst
            )));
        }

        // Overlapping copies repeat the window, so copy byte by byte.
        for i in 0..matchlen {
            self.dest[self.dst + i] = self.dest[source_pos + i];
        }
        self.dst += matchlen;

        if self.level == 1 {
            self.update_hash_upto(self.dst - matchlen);
            self.next_hashed = self.dst;
        }
        Ok(())
    }
}

/// Decompresses Deflate data using flate2.
///
/// # Arguments
///
/// * `data` - The Deflate compressed data.
///
/// # Returns
///
/// The decompressed data, or an error if decompression fails.
pub fn decompress_deflate(data: &[u8]) -> DecompressResult<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data);
    let mut decompressed = Vec::new();

    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| DecompressError::DeflateError(e.to_string()))?;

    Ok(decompressed)
}
