//! Header block codec for blocked signal streams.
//!
//! A signal stream (`signal<N>.bin`) is a sequence of variable-length data
//! blocks.  Each block starts with a 4-byte flag word: `1` means a full
//! header follows, `0` means the block reuses the geometry of the most
//! recent header.
//!
//! # On-disk layout of a header-bearing block (all fields little-endian)
//!
//! ```text
//! Offset    Size  Field
//!    0        4   flag          1 = header follows, 0 = reuse previous
//!    4        4   header_size   total header bytes, flag through padding
//!    8        4   block_size    payload bytes following the header
//!   12        4   num_channels  := C
//!   16       4C   per-channel payload byte offset (4 * num_samples * c)
//!   16+4C    4C   per-channel packed word (sampling_rate << 8) | depth
//!   16+8C     4   optional-header byte length L
//!   16+8C+4   L   optional-header body (type word + type-specific fields)
//!   ..header_size padding (zeros, or the reference trailer)
//! ```
//!
//! The payload of `block_size` bytes follows immediately; samples are
//! little-endian IEEE-754 `f32`, channel-major.
//!
//! # Sample depth
//! The low byte of the packed rate/depth word is the bit depth.  It is 32 in
//! every stream this crate handles; any other value aborts the decode.
//!
//! # Optional header
//! `L == 0` means no optional header.  `L == 24` with type code 1 carries
//! stream totals: block count (u64), sample count (u64), signal count (u32).
//! Unknown type codes abort the decode.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{MffError, Result};

// ── Constants ────────────────────────────────────────────────────────────────

/// Flag word value announcing a full header.
pub const HEADER_PRESENT: u32 = 1;

/// Flag word value announcing geometry reuse.
pub const HEADER_REUSED: u32 = 0;

/// The only sample depth this format carries, in bits.
pub const SAMPLE_DEPTH: u32 = 32;

/// Sampling rates must fit the high 24 bits of the packed rate/depth word.
pub const MAX_SAMPLING_RATE: u32 = 1 << 24;

/// Padding trailer bytes emitted by the reference acquisition software.
/// Written only under [`PaddingStyle::Reference`] and only when the gap
/// length matches exactly; otherwise padding is zeros.
pub const REFERENCE_PADDING: [u8; 28] = [
    24, 0, 0, 0, 1, 0, 0, 0, 189, 0, 0, 0, 0, 0, 0, 0, 196, 63, 9, 0, 0, 0,
    0, 0, 1, 1, 0, 0,
];

// ── Optional header ──────────────────────────────────────────────────────────

/// Trailer carried between the rate/depth table and the padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionalHeader {
    /// Encoded as the single length word 0.
    None,
    /// Stream totals.  Encoded as length 24, type code 1, then the three
    /// counters (u64, u64, u32).
    Type1 {
        total_num_blocks: u64,
        total_num_samples: u64,
        total_num_signals: u32,
    },
}

impl OptionalHeader {
    /// Bytes of the optional-header body (everything after the length word).
    pub fn byte_size(&self) -> u32 {
        match self {
            OptionalHeader::None => 0,
            OptionalHeader::Type1 { .. } => 24,
        }
    }

    fn read<R: Read>(r: &mut R) -> Result<(Self, u32)> {
        let len = r.read_u32::<LittleEndian>()?;
        if len == 0 {
            return Ok((OptionalHeader::None, 0));
        }
        let type_code = r.read_u32::<LittleEndian>()?;
        match type_code {
            0 => {
                // Length word present but no recognised body; the remainder
                // is consumed as padding by the caller.
                skip(r, u64::from(len) - 4)?;
                Ok((OptionalHeader::None, len))
            }
            1 => {
                if len != 24 {
                    return Err(MffError::format(format!(
                        "type-1 optional header has length {len} (expected 24)"
                    )));
                }
                let total_num_blocks = r.read_u64::<LittleEndian>()?;
                let total_num_samples = r.read_u64::<LittleEndian>()?;
                let total_num_signals = r.read_u32::<LittleEndian>()?;
                Ok((
                    OptionalHeader::Type1 {
                        total_num_blocks,
                        total_num_samples,
                        total_num_signals,
                    },
                    len,
                ))
            }
            t => Err(MffError::format(format!(
                "unknown optional header type {t}"
            ))),
        }
    }

    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            OptionalHeader::None => w.write_u32::<LittleEndian>(0),
            OptionalHeader::Type1 {
                total_num_blocks,
                total_num_samples,
                total_num_signals,
            } => {
                w.write_u32::<LittleEndian>(24)?;
                w.write_u32::<LittleEndian>(1)?;
                w.write_u64::<LittleEndian>(*total_num_blocks)?;
                w.write_u64::<LittleEndian>(*total_num_samples)?;
                w.write_u32::<LittleEndian>(*total_num_signals)
            }
        }
    }
}

// ── Padding policy ───────────────────────────────────────────────────────────

/// How the gap between the optional header and `header_size` is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaddingStyle {
    /// Fill with zeros (the default).
    #[default]
    Zeros,
    /// Fill with [`REFERENCE_PADDING`] when the gap is exactly that long,
    /// for bit-exact compatibility with the reference producer; zeros
    /// otherwise.
    Reference,
}

// ── Header block ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlock {
    pub header_size: u32,
    pub block_size: u32,
    pub num_channels: u32,
    /// Samples per channel in the following payload.
    pub num_samples: u32,
    /// In Hz; must fit 24 bits.
    pub sampling_rate: u32,
    pub optional: OptionalHeader,
}

impl HeaderBlock {
    /// Build a header for a `num_channels x num_samples` f32 payload.
    ///
    /// `header_size` and `block_size` are derived; `sampling_rate` must fit
    /// 24 bits.
    pub fn new(
        num_channels: u32,
        num_samples: u32,
        sampling_rate: u32,
        optional: OptionalHeader,
    ) -> Result<Self> {
        if sampling_rate >= MAX_SAMPLING_RATE {
            return Err(MffError::argument(format!(
                "sampling rate {sampling_rate} does not fit 24 bits"
            )));
        }
        if num_channels == 0 {
            return Err(MffError::argument("channel count must be positive"));
        }
        Ok(Self {
            header_size: Self::compute_byte_size(num_channels, &optional),
            block_size: 4 * num_channels * num_samples,
            num_channels,
            num_samples,
            sampling_rate,
            optional,
        })
    }

    /// Header bytes for `num_channels` channels: the flag word, the three
    /// geometry words, the length word of the optional header (the "+5"),
    /// two per-channel tables, and the optional-header body.
    pub fn compute_byte_size(num_channels: u32, optional: &OptionalHeader) -> u32 {
        4 * (5 + 2 * num_channels) + optional.byte_size()
    }

    /// Write the full header, flag word included.
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.write_with_padding(w, PaddingStyle::Zeros)
    }

    /// Write the full header, filling any trailing gap per `style`.
    pub fn write_with_padding<W: Write>(
        &self,
        w: &mut W,
        style: PaddingStyle,
    ) -> io::Result<()> {
        w.write_u32::<LittleEndian>(HEADER_PRESENT)?;
        w.write_u32::<LittleEndian>(self.header_size)?;
        w.write_u32::<LittleEndian>(self.block_size)?;
        w.write_u32::<LittleEndian>(self.num_channels)?;
        for c in 0..self.num_channels {
            w.write_u32::<LittleEndian>(4 * self.num_samples * c)?;
        }
        let packed = (self.sampling_rate << 8) | SAMPLE_DEPTH;
        for _ in 0..self.num_channels {
            w.write_u32::<LittleEndian>(packed)?;
        }
        self.optional.write(w)?;

        let written = Self::compute_byte_size(self.num_channels, &self.optional);
        let pad = self.header_size.saturating_sub(written) as usize;
        if pad == REFERENCE_PADDING.len() && style == PaddingStyle::Reference {
            w.write_all(&REFERENCE_PADDING)?;
        } else if pad > 0 {
            w.write_all(&vec![0u8; pad])?;
        }
        Ok(())
    }

    /// Split a packed rate/depth word.
    pub fn decode_rate_depth(word: u32) -> (u32, u32) {
        (word >> 8, word & 0xff)
    }
}

/// Read the flag word and, when present, the full header.
///
/// Returns `Ok(None)` on a reuse flag; the caller inherits the geometry of
/// the most recent header (or fails with `MissingHeader` if there is none).
pub fn read_header_block<R: Read>(r: &mut R) -> Result<Option<HeaderBlock>> {
    match r.read_u32::<LittleEndian>()? {
        HEADER_REUSED => return Ok(None),
        HEADER_PRESENT => {}
        flag => {
            return Err(MffError::format(format!(
                "invalid block flag word {flag}"
            )))
        }
    }

    let header_size = r.read_u32::<LittleEndian>()?;
    let block_size = r.read_u32::<LittleEndian>()?;
    let num_channels = r.read_u32::<LittleEndian>()?;
    if num_channels == 0 {
        return Err(MffError::format("header block declares zero channels"));
    }
    let num_samples = (block_size / num_channels) / 4;

    // Per-channel byte offsets are derivable from the geometry; skip them.
    skip(r, u64::from(4 * num_channels))?;

    // Rate and depth repeat per channel: read the first word, skip the rest.
    let (sampling_rate, depth) =
        HeaderBlock::decode_rate_depth(r.read_u32::<LittleEndian>()?);
    skip(r, u64::from(4 * (num_channels - 1)))?;
    if depth != SAMPLE_DEPTH {
        return Err(MffError::format(format!(
            "unsupported sample depth {depth} (only {SAMPLE_DEPTH}-bit floats)"
        )));
    }

    let (optional, optional_len) = OptionalHeader::read(r)?;

    // Tolerate producers that pad the header beyond the computed size.
    let consumed = 4 * (5 + 2 * num_channels) + optional_len;
    if header_size < consumed {
        return Err(MffError::format(format!(
            "header_size {header_size} smaller than decoded content {consumed}"
        )));
    }
    skip(r, u64::from(header_size - consumed))?;

    Ok(Some(HeaderBlock {
        header_size,
        block_size,
        num_channels,
        num_samples,
        sampling_rate,
        optional,
    }))
}

/// Write a bare reuse flag word.
pub fn write_reuse_flag<W: Write>(w: &mut W) -> io::Result<()> {
    w.write_u32::<LittleEndian>(HEADER_REUSED)
}

fn skip<R: Read>(r: &mut R, n: u64) -> io::Result<()> {
    let copied = io::copy(&mut r.by_ref().take(n), &mut io::sink())?;
    if copied != n {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("header truncated: wanted {n} bytes, got {copied}"),
        ));
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip_plain_header() {
        let hdr = HeaderBlock::new(64, 128, 256, OptionalHeader::None).unwrap();
        assert_eq!(hdr.block_size, 4 * 64 * 128);
        assert_eq!(hdr.header_size, 4 * (5 + 2 * 64));

        let mut buf = Vec::new();
        hdr.write(&mut buf).unwrap();
        assert_eq!(buf.len(), hdr.header_size as usize);

        let decoded = read_header_block(&mut Cursor::new(&buf))
            .unwrap()
            .expect("header flag expected");
        assert_eq!(decoded, hdr);
    }

    #[test]
    fn round_trip_type1_header() {
        let hdr = HeaderBlock::new(
            8,
            100,
            1000,
            OptionalHeader::Type1 {
                total_num_blocks: 189,
                total_num_samples: 606_148,
                total_num_signals: 257,
            },
        )
        .unwrap();
        assert_eq!(hdr.header_size, 4 * (5 + 2 * 8) + 24);

        let mut buf = Vec::new();
        hdr.write(&mut buf).unwrap();
        let decoded = read_header_block(&mut Cursor::new(&buf))
            .unwrap()
            .expect("header flag expected");
        assert_eq!(decoded, hdr);
    }

    #[test]
    fn reuse_flag_reads_as_none() {
        let mut buf = Vec::new();
        write_reuse_flag(&mut buf).unwrap();
        assert_eq!(read_header_block(&mut Cursor::new(&buf)).unwrap(), None);
    }

    #[test]
    fn rejects_bad_depth() {
        let hdr = HeaderBlock::new(2, 4, 128, OptionalHeader::None).unwrap();
        let mut buf = Vec::new();
        hdr.write(&mut buf).unwrap();
        // Corrupt the depth byte of the first rate/depth word.
        let depth_word = 16 + 4 * 2;
        buf[depth_word] = 16;
        let err = read_header_block(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, MffError::InvalidFormat(_)), "{err}");
    }

    #[test]
    fn rejects_unknown_optional_type() {
        let hdr = HeaderBlock::new(2, 4, 128, OptionalHeader::None).unwrap();
        let mut buf = Vec::new();
        hdr.write(&mut buf).unwrap();
        // Rewrite the optional length word to 8 and add a bogus type code.
        let opt_len_at = (16 + 8 * 2) as usize;
        buf[opt_len_at..opt_len_at + 4].copy_from_slice(&8u32.to_le_bytes());
        buf.extend_from_slice(&7u32.to_le_bytes());
        let err = read_header_block(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, MffError::InvalidFormat(_)), "{err}");
    }

    #[test]
    fn rejects_oversized_sampling_rate() {
        let err = HeaderBlock::new(2, 4, 1 << 24, OptionalHeader::None).unwrap_err();
        assert!(matches!(err, MffError::InvalidArgument(_)), "{err}");
    }

    #[test]
    fn skips_trailing_padding() {
        let mut hdr = HeaderBlock::new(2, 4, 128, OptionalHeader::None).unwrap();
        hdr.header_size += REFERENCE_PADDING.len() as u32;
        let mut buf = Vec::new();
        hdr.write_with_padding(&mut buf, PaddingStyle::Reference).unwrap();
        assert_eq!(buf.len(), hdr.header_size as usize);
        assert_eq!(&buf[buf.len() - 28..], &REFERENCE_PADDING[..]);

        // A sentinel byte after the header shows the padding was consumed.
        buf.push(0xAB);
        let mut cur = Cursor::new(&buf);
        let decoded = read_header_block(&mut cur).unwrap().expect("header");
        assert_eq!(decoded.header_size, hdr.header_size);
        assert_eq!(cur.position() as usize, buf.len() - 1);
    }

    #[test]
    fn rate_depth_word_packing() {
        let (rate, depth) = HeaderBlock::decode_rate_depth((500 << 8) | 32);
        assert_eq!((rate, depth), (500, 32));
    }
}
