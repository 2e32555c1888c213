//! Append-only signal stream assembly.
//!
//! [`BinWriter`] turns a sequence of sample blocks into an encoded signal
//! stream plus the epoch table describing its continuity.  A full header is
//! emitted for the first block and whenever the per-block sample count
//! changes; otherwise the block is written with the reuse flag and the
//! decoder inherits the previous geometry.
//!
//! The default sink accumulates the encoded stream in memory until the
//! enclosing [`Writer`](crate::writer::Writer) dumps it.  The streaming
//! variant writes straight into `signal<N>.bin` of a pre-created recording
//! directory, for outputs that would not fit in memory.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::epoch::Epoch;
use crate::error::{MffError, Result};
use crate::header_block::{write_reuse_flag, HeaderBlock, OptionalHeader, MAX_SAMPLING_RATE};
use crate::raw_bin::Samples;

/// `(filename, data type)` pairs the acquisition software understands.
pub const TYPICAL_TYPES: [(&str, &str); 2] =
    [("signal1.bin", "EEG"), ("signal2.bin", "PNSData")];

pub fn signal_filename(index: usize) -> String {
    format!("signal{index}.bin")
}

pub fn info_filename(index: usize) -> String {
    format!("info{index}.xml")
}

// ── Sink ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum BinSink {
    Memory(Vec<u8>),
    File(BufWriter<File>),
}

impl BinSink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            BinSink::Memory(buf) => buf.extend_from_slice(bytes),
            BinSink::File(file) => file.write_all(bytes)?,
        }
        Ok(())
    }
}

// ── BinWriter ────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct BinWriter {
    data_type: String,
    sampling_rate: u32,
    header: Option<HeaderBlock>,
    sink: BinSink,
    epochs: Vec<Epoch>,
    compatible: bool,
}

impl BinWriter {
    /// Writer accumulating the encoded stream in memory.
    ///
    /// The sampling rate must fit 24 bits; `data_type` is the channel-type
    /// tag declared in the paired data-info document.
    pub fn new(sampling_rate: u32, data_type: impl Into<String>) -> Result<Self> {
        if sampling_rate >= MAX_SAMPLING_RATE {
            return Err(MffError::argument(format!(
                "sampling rate {sampling_rate} does not fit 24 bits"
            )));
        }
        Ok(Self {
            data_type: data_type.into(),
            sampling_rate,
            header: None,
            sink: BinSink::Memory(Vec::new()),
            epochs: Vec::new(),
            compatible: true,
        })
    }

    /// Writer streaming encoded bytes straight into `signal1.bin` of an
    /// already-created recording directory.
    pub fn streaming(
        sampling_rate: u32,
        mffdir: impl AsRef<Path>,
        data_type: impl Into<String>,
    ) -> Result<Self> {
        let mut writer = Self::new(sampling_rate, data_type)?;
        let filename = signal_filename(1);
        writer.check_compatibility(&filename)?;
        let file = File::create(mffdir.as_ref().join(filename))?;
        writer.sink = BinSink::File(BufWriter::new(file));
        Ok(writer)
    }

    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    /// Disable the `(filename, data type)` compatibility gate.
    pub fn allow_any_stream(&mut self, allow: bool) {
        self.compatible = !allow;
    }

    /// Refuse `(filename, data type)` pairs the acquisition software would
    /// not accept, unless opted out via [`BinWriter::allow_any_stream`].
    pub fn check_compatibility(&self, filename: &str) -> Result<()> {
        let pair = (filename, self.data_type.as_str());
        if self.compatible && !TYPICAL_TYPES.contains(&pair) {
            return Err(MffError::IncompatibleStream(format!(
                "writing type '{}' to '{}'; allow_any_stream(true) overrides",
                pair.1, pair.0
            )));
        }
        Ok(())
    }

    /// Append one block of signal data.
    ///
    /// `offset_us` controls epoch bookkeeping:
    /// - `None` appends to the current epoch;
    /// - `Some(0)` starts a new epoch immediately after the previous one;
    /// - `Some(n)` with `n > 0` starts a new epoch after an `n` microsecond
    ///   discontinuity;
    /// - negative offsets are rejected.
    ///
    /// The channel count is fixed by the first block.
    pub fn add_block(&mut self, data: &Samples, offset_us: Option<i64>) -> Result<()> {
        if let Some(offset) = offset_us {
            if offset < 0 {
                return Err(MffError::argument(format!(
                    "offset_us cannot be negative (got {offset})"
                )));
            }
        }
        let num_channels = data.num_channels() as u32;
        let num_samples = data.num_samples() as u32;

        let header = match &self.header {
            None => HeaderBlock::new(
                num_channels,
                num_samples,
                self.sampling_rate,
                OptionalHeader::None,
            )?,
            Some(previous) => {
                if num_channels != previous.num_channels {
                    return Err(MffError::format(format!(
                        "block has {num_channels} channels; stream established {}",
                        previous.num_channels
                    )));
                }
                HeaderBlock::new(
                    num_channels,
                    num_samples,
                    self.sampling_rate,
                    OptionalHeader::None,
                )?
            }
        };

        // Emit a full header only when the geometry changed.
        let geometry_changed = self
            .header
            .as_ref()
            .map_or(true, |h| h.num_samples != header.num_samples);
        let mut encoded = Vec::with_capacity(header.header_size as usize);
        if geometry_changed {
            header.write(&mut encoded)?;
        } else {
            write_reuse_flag(&mut encoded)?;
        }
        self.sink.write_all(&encoded)?;
        self.sink.write_all(&data.to_le_bytes())?;
        self.header = Some(header);

        self.add_block_to_epochs(u64::from(num_samples), offset_us);
        Ok(())
    }

    /// Append `num_samples` to the last epoch or open a new one.
    fn add_block_to_epochs(&mut self, num_samples: u64, offset_us: Option<i64>) {
        let duration_us = 10u64.pow(6) * num_samples / u64::from(self.sampling_rate);
        match self.epochs.last_mut() {
            None => {
                let begin = offset_us.unwrap_or(0) as u64;
                self.epochs
                    .push(Epoch::new(begin, begin + duration_us, 1, 1));
            }
            Some(last) => match offset_us {
                Some(offset) => {
                    let begin = last.end_time + offset as u64;
                    let block = last.last_block + 1;
                    self.epochs
                        .push(Epoch::new(begin, begin + duration_us, block, block));
                }
                None => last.add_block(duration_us),
            },
        }
    }

    /// Finish the stream.
    ///
    /// A memory-backed writer dumps its encoded bytes to `path`; a
    /// streaming writer has already written them and only flushes.
    pub fn write(&mut self, path: impl AsRef<Path>) -> Result<()> {
        match &mut self.sink {
            BinSink::Memory(bytes) => {
                let mut file = File::create(path)?;
                file.write_all(bytes)?;
            }
            BinSink::File(file) => file.flush()?,
        }
        Ok(())
    }

    /// Whether this writer streams directly to disk.
    pub fn is_streaming(&self) -> bool {
        matches!(self.sink, BinSink::File(_))
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
