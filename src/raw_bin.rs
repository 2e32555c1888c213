//! Raw signal stream reader.
//!
//! [`RawBinFile`] walks a blocked signal stream once to build a block
//! catalog, then serves `(channels x samples)` slices over arbitrary
//! `(t0, dt)` windows, optionally confined to a block range.  Blocks enclose
//! epochs of continuous recording; discontinuities can only occur between
//! blocks, so a window plus a block range is always resolvable to a byte
//! range without interpolation.
//!
//! Sample words are little-endian `f32`, channel-major within each block:
//! all of channel 0, then all of channel 1, and so on.  Across the catalog
//! the channel count and sampling rate are constant; per-block sample
//! counts may vary.

use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;

use log::warn;

use crate::error::{MffError, Result};
use crate::header_block::{read_header_block, HeaderBlock};

// ── Samples matrix ───────────────────────────────────────────────────────────

/// Channel-major `f32` sample matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Samples {
    num_channels: usize,
    num_samples: usize,
    data: Vec<f32>,
}

impl Samples {
    pub fn zeros(num_channels: usize, num_samples: usize) -> Self {
        Self {
            num_channels,
            num_samples,
            data: vec![0.0; num_channels * num_samples],
        }
    }

    /// Wrap a channel-major buffer of `num_channels * num_samples` values.
    pub fn from_vec(data: Vec<f32>, num_channels: usize, num_samples: usize) -> Result<Self> {
        if data.len() != num_channels * num_samples {
            return Err(MffError::argument(format!(
                "buffer of {} values cannot hold {num_channels}x{num_samples} samples",
                data.len()
            )));
        }
        Ok(Self {
            num_channels,
            num_samples,
            data,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn channel(&self, c: usize) -> &[f32] {
        &self.data[c * self.num_samples..(c + 1) * self.num_samples]
    }

    pub fn channel_mut(&mut self, c: usize) -> &mut [f32] {
        &mut self.data[c * self.num_samples..(c + 1) * self.num_samples]
    }

    pub fn get(&self, c: usize, s: usize) -> f32 {
        self.data[c * self.num_samples + s]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Copy of columns `range` across all channels.
    pub fn slice_columns(&self, range: Range<usize>) -> Samples {
        let width = range.end - range.start;
        let mut out = Samples::zeros(self.num_channels, width);
        for c in 0..self.num_channels {
            out.channel_mut(c)
                .copy_from_slice(&self.channel(c)[range.clone()]);
        }
        out
    }

    /// Encode as little-endian bytes, channel-major.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() * 4);
        for v in &self.data {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }
}

// ── Block catalog ────────────────────────────────────────────────────────────

/// Location of one block's payload within the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataBlock {
    pub byte_offset: u64,
    pub byte_size: u32,
}

/// Catalog of a signal stream, built by one forward walk over all headers.
#[derive(Debug, Clone)]
pub struct SignalBlocks {
    pub data: Vec<DataBlock>,
    pub num_channels: u32,
    pub sampling_rate: u32,
    /// Samples per channel, per block.
    pub num_samples: Vec<usize>,
    pub header_sizes: Vec<u32>,
    pub n_blocks: usize,
}

// ── RawBinFile ───────────────────────────────────────────────────────────────

pub struct RawBinFile<R: Read + Seek> {
    stream: R,
    blocks: Option<SignalBlocks>,
    block_start_idx: Vec<usize>,
}

impl<R: Read + Seek> RawBinFile<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            blocks: None,
            block_start_idx: Vec::new(),
        }
    }

    /// The block catalog; computed on first access, cached afterwards.
    pub fn signal_blocks(&mut self) -> Result<&SignalBlocks> {
        let blocks = match self.blocks.take() {
            Some(b) => b,
            None => {
                let b = self.scan_blocks()?;
                self.block_start_idx = cumulative_start_index(&b.num_samples);
                b
            }
        };
        Ok(self.blocks.insert(blocks))
    }

    /// Prefix sums of per-block sample counts; length `n_blocks + 1`.
    pub fn block_start_idx(&mut self) -> Result<&[usize]> {
        self.signal_blocks()?;
        Ok(&self.block_start_idx)
    }

    pub fn num_channels(&mut self) -> Result<u32> {
        Ok(self.signal_blocks()?.num_channels)
    }

    pub fn sampling_rate(&mut self) -> Result<u32> {
        Ok(self.signal_blocks()?.sampling_rate)
    }

    /// Total samples per channel in the stream.
    pub fn num_samples(&mut self) -> Result<usize> {
        self.signal_blocks()?;
        Ok(*self.block_start_idx.last().unwrap_or(&0))
    }

    /// Stream duration in seconds.
    pub fn duration(&mut self) -> Result<f64> {
        let samples = self.num_samples()? as f64;
        Ok(samples / f64::from(self.signal_blocks()?.sampling_rate))
    }

    fn scan_blocks(&mut self) -> Result<SignalBlocks> {
        let bytes_in_file = self.stream.seek(SeekFrom::End(0))?;
        self.stream.seek(SeekFrom::Start(0))?;

        let mut data = Vec::new();
        let mut num_samples = Vec::new();
        let mut header_sizes = Vec::new();
        let mut channels = Vec::new();
        let mut rates = Vec::new();
        let mut current: Option<HeaderBlock> = None;

        while self.stream.stream_position()? < bytes_in_file {
            if let Some(hdr) = read_header_block(&mut self.stream)? {
                current = Some(hdr);
            }
            let hdr = current.as_ref().ok_or(MffError::MissingHeader)?;
            channels.push(hdr.num_channels);
            rates.push(hdr.sampling_rate);
            data.push(DataBlock {
                byte_offset: self.stream.stream_position()?,
                byte_size: hdr.block_size,
            });
            num_samples.push(hdr.num_samples as usize);
            header_sizes.push(hdr.header_size);
            self.stream
                .seek(SeekFrom::Current(i64::from(hdr.block_size)))?;
        }

        if data.is_empty() {
            return Err(MffError::format("signal stream holds no blocks"));
        }
        if channels.iter().any(|&c| c != channels[0]) {
            return Err(MffError::format(
                "channel count changes across blocks of one stream",
            ));
        }
        if rates.iter().any(|&r| r != rates[0]) {
            return Err(MffError::format(
                "sampling rate changes across blocks of one stream",
            ));
        }

        Ok(SignalBlocks {
            n_blocks: data.len(),
            data,
            num_channels: channels[0],
            sampling_rate: rates[0],
            num_samples,
            header_sizes,
        })
    }

    /// Read the window `(t0, t0 + dt)` restricted to `block_slice`.
    ///
    /// Returns the sample matrix and the time of its first sample, both
    /// relative to the start of the block slice.  `t0` and `dt` are
    /// converted to sample indices by rounding half away from zero; no
    /// interpolation is performed.  A window shorter than one sample
    /// interval yields a zero-column matrix.
    pub fn read_raw_samples(
        &mut self,
        t0: f64,
        dt: Option<f64>,
        block_slice: Option<Range<usize>>,
    ) -> Result<(Samples, f64)> {
        if t0 < 0.0 {
            return Err(MffError::argument(format!(
                "window start must be non-negative (got {t0})"
            )));
        }
        if let Some(d) = dt {
            if d < 0.0 {
                return Err(MffError::argument(format!(
                    "window duration must be non-negative (got {d})"
                )));
            }
        }

        let (n_blocks, sr) = {
            let catalog = self.signal_blocks()?;
            (catalog.n_blocks, f64::from(catalog.sampling_rate))
        };
        let slice = block_slice.unwrap_or(0..n_blocks);
        if slice.start >= slice.end || slice.end > n_blocks {
            return Err(MffError::argument(format!(
                "block range {slice:?} outside stream of {n_blocks} blocks"
            )));
        }

        // Sample indices of the window, relative to the slice start.
        let a = (t0 * sr).round() as usize;
        let b = dt.map(|d| ((t0 + d) * sr).round() as usize);
        let t_start = a as f64 / sr;

        // Block start indices of the slice (one entry per block).
        let bsi = &self.block_start_idx[slice.clone()];

        // Bounding blocks: rightmost start <= a, leftmost start >= b.
        let rel_a = bsi.partition_point(|&x| x <= bsi[0] + a) - 1;
        let rel_b = match b {
            Some(b) => bsi.partition_point(|&x| x < bsi[0] + b).max(rel_a),
            None => bsi.len(),
        };

        // Fine trim offsets within the bounding blocks.
        let skip_cols = bsi[rel_a] - bsi[0];
        let a = a - skip_cols;
        let b = b.map(|b| b - skip_cols);

        let block_data = self.read_blocks(slice.start + rel_a, slice.start + rel_b)?;

        // Reject offsets that run past the enclosing blocks.
        let width = block_data.num_samples();
        let a = a.min(width);
        let b = b.unwrap_or(width).clamp(a, width);
        Ok((block_data.slice_columns(a..b), t_start))
    }

    /// Decode and horizontally concatenate blocks `[a, b)`.
    fn read_blocks(&mut self, a: usize, b: usize) -> Result<Samples> {
        let (wanted, num_channels): (Vec<(DataBlock, usize)>, usize) = {
            let catalog = self.signal_blocks()?;
            (
                catalog.data[a..b]
                    .iter()
                    .copied()
                    .zip(catalog.num_samples[a..b].iter().copied())
                    .collect(),
                catalog.num_channels as usize,
            )
        };

        let total: usize = wanted.iter().map(|(_, n)| n).sum();
        let mut out = Samples::zeros(num_channels, total);
        let mut col = 0usize;
        for (block, n_samples) in wanted {
            let payload = self.read_payload(block, num_channels, n_samples)?;
            for c in 0..num_channels {
                let src = &payload[c * n_samples..(c + 1) * n_samples];
                out.channel_mut(c)[col..col + n_samples].copy_from_slice(src);
            }
            col += n_samples;
        }
        Ok(out)
    }

    fn read_payload(
        &mut self,
        block: DataBlock,
        num_channels: usize,
        n_samples: usize,
    ) -> Result<Vec<f32>> {
        let expected = 4 * num_channels * n_samples;
        let actual = block.byte_size as usize;
        if actual != expected {
            let excess = actual.saturating_sub(expected);
            // A few trailing stray bytes are a known producer quirk; anything
            // else is corruption.
            if (1..=4).contains(&excess) {
                warn!(
                    "block at offset {} carries {excess} trailing bytes; truncating",
                    block.byte_offset
                );
            } else {
                return Err(MffError::format(format!(
                    "block at offset {} is {actual} bytes (expected {expected})",
                    block.byte_offset
                )));
            }
        }

        self.stream.seek(SeekFrom::Start(block.byte_offset))?;
        let mut buf = vec![0u8; actual];
        self.stream.read_exact(&mut buf)?;

        let mut floats = Vec::with_capacity(num_channels * n_samples);
        for word in buf[..expected].chunks_exact(4) {
            floats.push(f32::from_le_bytes([word[0], word[1], word[2], word[3]]));
        }
        Ok(floats)
    }
}

fn cumulative_start_index(num_samples: &[usize]) -> Vec<usize> {
    let mut idx = Vec::with_capacity(num_samples.len() + 1);
    let mut acc = 0usize;
    idx.push(0);
    for &n in num_samples {
        acc += n;
        idx.push(acc);
    }
    idx
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header_block::{write_reuse_flag, HeaderBlock, OptionalHeader};
    use std::io::Cursor;

    /// Encode blocks of the given sample counts; channel c sample s carries
    /// the value `100 * c + s` counted from the stream start.
    fn encoded_stream(num_channels: u32, rate: u32, counts: &[u32], reuse: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut base = 0u32;
        let mut last_count = None;
        for &n in counts {
            let hdr = HeaderBlock::new(num_channels, n, rate, OptionalHeader::None).unwrap();
            if reuse && last_count == Some(n) {
                write_reuse_flag(&mut buf).unwrap();
            } else {
                hdr.write(&mut buf).unwrap();
            }
            last_count = Some(n);
            for c in 0..num_channels {
                for s in 0..n {
                    let v = (100 * c + base + s) as f32;
                    buf.extend_from_slice(&v.to_le_bytes());
                }
            }
            base += n;
        }
        buf
    }

    #[test]
    fn catalog_walk_indexes_all_blocks() {
        let bytes = encoded_stream(3, 250, &[10, 10, 5], true);
        let mut raw = RawBinFile::new(Cursor::new(bytes));
        {
            let catalog = raw.signal_blocks().unwrap();
            assert_eq!(catalog.n_blocks, 3);
            assert_eq!(catalog.num_channels, 3);
            assert_eq!(catalog.sampling_rate, 250);
            assert_eq!(catalog.num_samples, vec![10, 10, 5]);
        }
        assert_eq!(raw.block_start_idx().unwrap(), &[0, 10, 20, 25]);
        assert_eq!(raw.num_samples().unwrap(), 25);
        assert_eq!(raw.duration().unwrap(), 25.0 / 250.0);
    }

    #[test]
    fn reuse_before_header_is_rejected() {
        let mut bytes = Vec::new();
        write_reuse_flag(&mut bytes).unwrap();
        let mut raw = RawBinFile::new(Cursor::new(bytes));
        let err = raw.signal_blocks().unwrap_err();
        assert!(matches!(err, MffError::MissingHeader), "{err}");
    }

    #[test]
    fn empty_stream_is_rejected() {
        let mut raw = RawBinFile::new(Cursor::new(Vec::new()));
        let err = raw.signal_blocks().unwrap_err();
        assert!(matches!(err, MffError::InvalidFormat(_)), "{err}");
    }

    #[test]
    fn full_read_concatenates_blocks_without_gap() {
        let bytes = encoded_stream(2, 100, &[8, 8, 4], true);
        let mut raw = RawBinFile::new(Cursor::new(bytes));
        let (samples, t0) = raw.read_raw_samples(0.0, None, None).unwrap();
        assert_eq!(t0, 0.0);
        assert_eq!(samples.num_channels(), 2);
        assert_eq!(samples.num_samples(), 20);
        let expect0: Vec<f32> = (0..20).map(|s| s as f32).collect();
        let expect1: Vec<f32> = (0..20).map(|s| (100 + s) as f32).collect();
        assert_eq!(samples.channel(0), &expect0[..]);
        assert_eq!(samples.channel(1), &expect1[..]);
    }

    #[test]
    fn window_inside_one_block() {
        let bytes = encoded_stream(1, 100, &[50], false);
        let mut raw = RawBinFile::new(Cursor::new(bytes));
        // 0.1 s at 100 Hz = sample 10; 0.05 s = 5 samples.
        let (samples, t0) = raw.read_raw_samples(0.1, Some(0.05), None).unwrap();
        assert_eq!(t0, 0.1);
        assert_eq!(samples.num_samples(), 5);
        assert_eq!(samples.channel(0), &[10.0, 11.0, 12.0, 13.0, 14.0]);
    }

    #[test]
    fn window_spans_block_boundary() {
        let bytes = encoded_stream(1, 100, &[10, 10], true);
        let mut raw = RawBinFile::new(Cursor::new(bytes));
        // Samples 8..12 straddle the boundary at sample 10.
        let (samples, t0) = raw.read_raw_samples(0.08, Some(0.04), None).unwrap();
        assert_eq!(t0, 0.08);
        assert_eq!(samples.channel(0), &[8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn window_at_block_boundary_starts_next_block() {
        let bytes = encoded_stream(1, 100, &[10, 10], true);
        let mut raw = RawBinFile::new(Cursor::new(bytes));
        let (samples, t0) = raw.read_raw_samples(0.1, Some(0.02), None).unwrap();
        assert_eq!(t0, 0.1);
        assert_eq!(samples.channel(0), &[10.0, 11.0]);
    }

    #[test]
    fn block_slice_is_relative() {
        let bytes = encoded_stream(1, 100, &[10, 10, 10], true);
        let mut raw = RawBinFile::new(Cursor::new(bytes));
        // Window is relative to the slice start (block 1).
        let (samples, t0) = raw.read_raw_samples(0.02, Some(0.03), Some(1..3)).unwrap();
        assert_eq!(t0, 0.02);
        assert_eq!(samples.channel(0), &[12.0, 13.0, 14.0]);
    }

    #[test]
    fn sub_sample_window_yields_zero_columns() {
        let bytes = encoded_stream(1, 100, &[10], false);
        let mut raw = RawBinFile::new(Cursor::new(bytes));
        let (samples, _) = raw.read_raw_samples(0.031, Some(0.001), None).unwrap();
        assert_eq!(samples.num_samples(), 0);
        assert_eq!(samples.num_channels(), 1);
    }

    #[test]
    fn window_past_end_is_clamped() {
        let bytes = encoded_stream(1, 100, &[10], false);
        let mut raw = RawBinFile::new(Cursor::new(bytes));
        let (samples, _) = raw.read_raw_samples(0.05, Some(10.0), None).unwrap();
        assert_eq!(samples.channel(0), &[5.0, 6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn stray_trailing_bytes_are_truncated() {
        let mut bytes = Vec::new();
        let mut hdr = HeaderBlock::new(1, 4, 100, OptionalHeader::None).unwrap();
        hdr.block_size += 2; // two stray bytes after the payload
        hdr.write(&mut bytes).unwrap();
        for s in 0..4 {
            bytes.extend_from_slice(&(s as f32).to_le_bytes());
        }
        bytes.extend_from_slice(&[0xEE, 0xEE]);

        let mut raw = RawBinFile::new(Cursor::new(bytes));
        // The stray bytes shift the derived sample count only if >= one word;
        // num_samples stays 4 and the payload is truncated on read.
        let (samples, _) = raw.read_raw_samples(0.0, None, None).unwrap();
        assert_eq!(samples.channel(0), &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn mismatched_channel_count_is_rejected() {
        let mut bytes = encoded_stream(2, 100, &[4], false);
        bytes.extend_from_slice(&encoded_stream(3, 100, &[4], false));
        let mut raw = RawBinFile::new(Cursor::new(bytes));
        let err = raw.signal_blocks().unwrap_err();
        assert!(matches!(err, MffError::InvalidFormat(_)), "{err}");
    }

    #[test]
    fn mismatched_sampling_rate_is_rejected() {
        let mut bytes = encoded_stream(2, 100, &[4], false);
        bytes.extend_from_slice(&encoded_stream(2, 200, &[4], false));
        let mut raw = RawBinFile::new(Cursor::new(bytes));
        let err = raw.signal_blocks().unwrap_err();
        assert!(matches!(err, MffError::InvalidFormat(_)), "{err}");
    }
}
