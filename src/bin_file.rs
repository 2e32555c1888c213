//! Calibrated signal access.
//!
//! [`BinFile`] layers two per-channel transforms over a raw stream: a
//! calibration vector taken from the paired data-info document, and a unit
//! conversion between the SI voltage units `V`, `mV`, and `uV`.  Per the
//! numeric model, raw samples stay `f32`, the calibration vector is `f64`
//! to limit drift across long multiplications, and the output is cast back
//! to `f32`.

use std::io::{Read, Seek};
use std::ops::Range;

use crate::error::{MffError, Result};
use crate::raw_bin::{RawBinFile, Samples};
use crate::xml::data_info::{DataInfo, GCAL};

/// Unit raw samples are recorded in.
pub const RAW_UNIT: &str = "uV";

/// Conversion factor between two voltage units, or `None` if either unit is
/// unknown.
fn unit_scale(from: &str, to: &str) -> Option<f64> {
    fn exponent(unit: &str) -> Option<i32> {
        match unit {
            "V" => Some(0),
            "mV" => Some(-3),
            "uV" => Some(-6),
            _ => None,
        }
    }
    Some(10f64.powi(exponent(from)? - exponent(to)?))
}

pub struct BinFile<R: Read + Seek> {
    raw: RawBinFile<R>,
    info: DataInfo,
    signal_type: String,
    calibration_name: Option<String>,
    unit: String,
    scale: f64,
}

impl<R: Read + Seek> BinFile<R> {
    /// Wrap a raw stream and its data-info document.
    ///
    /// The `GCAL` calibration is selected when the document carries one;
    /// otherwise samples pass through unscaled.
    pub fn new(stream: R, info: DataInfo) -> Self {
        let calibration_name = info
            .calibrations
            .contains_key(GCAL)
            .then(|| GCAL.to_owned());
        let signal_type = info.general.channel_type.clone();
        Self {
            raw: RawBinFile::new(stream),
            info,
            signal_type,
            calibration_name,
            unit: RAW_UNIT.to_owned(),
            scale: 1.0,
        }
    }

    /// Channel type of the stream, e.g. `EEG` or `PNSData`.
    pub fn signal_type(&self) -> &str {
        &self.signal_type
    }

    pub fn data_info(&self) -> &DataInfo {
        &self.info
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn calibration(&self) -> Option<&str> {
        self.calibration_name.as_deref()
    }

    pub fn num_channels(&mut self) -> Result<u32> {
        self.raw.num_channels()
    }

    pub fn sampling_rate(&mut self) -> Result<u32> {
        self.raw.sampling_rate()
    }

    pub fn num_samples(&mut self) -> Result<usize> {
        self.raw.num_samples()
    }

    pub fn duration(&mut self) -> Result<f64> {
        self.raw.duration()
    }

    /// Select the output unit; derives the scale from the raw unit.
    pub fn set_unit(&mut self, unit: &str) -> Result<()> {
        let scale = unit_scale(RAW_UNIT, unit)
            .ok_or_else(|| MffError::argument(format!("unknown unit '{unit}'")))?;
        self.scale = scale;
        self.unit = unit.to_owned();
        Ok(())
    }

    /// Select a calibration by name.
    ///
    /// The name must exist in the data-info document and its `beginTime`
    /// must be 0 (recording start).
    pub fn set_calibration(&mut self, name: &str) -> Result<()> {
        let calibration = self.info.calibrations.get(name).ok_or_else(|| {
            MffError::BadCalibration(format!(
                "'{name}' is not available; choose one of {:?}",
                self.info.calibrations.keys().collect::<Vec<_>>()
            ))
        })?;
        if calibration.begin_time != 0.0 {
            return Err(MffError::BadCalibration(format!(
                "'{name}' begins at {} (not at recording start)",
                calibration.begin_time
            )));
        }
        self.calibration_name = Some(name.to_owned());
        Ok(())
    }

    /// The per-channel calibration vector; all ones without a calibration.
    fn calibration_vector(&mut self) -> Result<Vec<f64>> {
        let num_channels = self.raw.num_channels()? as usize;
        let mut vector = vec![1.0f64; num_channels];
        if let Some(name) = &self.calibration_name {
            let calibration = self.info.calibrations.get(name).ok_or_else(|| {
                MffError::BadCalibration(format!("'{name}' is not available"))
            })?;
            if calibration.begin_time != 0.0 {
                return Err(MffError::BadCalibration(format!(
                    "'{name}' begins at {} (not at recording start)",
                    calibration.begin_time
                )));
            }
            for (&channel, &factor) in &calibration.channels {
                let index = channel as usize;
                if index == 0 || index > num_channels {
                    return Err(MffError::BadCalibration(format!(
                        "'{name}' scales channel {channel} outside 1..={num_channels}"
                    )));
                }
                vector[index - 1] = f64::from(factor);
            }
        }
        Ok(vector)
    }

    /// Raw samples without calibration or unit conversion.
    pub fn read_raw_samples(
        &mut self,
        t0: f64,
        dt: Option<f64>,
        block_slice: Option<Range<usize>>,
    ) -> Result<(Samples, f64)> {
        self.raw.read_raw_samples(t0, dt, block_slice)
    }

    /// Samples in physical units: `calibration * scale * raw`, cast to f32.
    pub fn get_physical_samples(
        &mut self,
        t0: f64,
        dt: Option<f64>,
        block_slice: Option<Range<usize>>,
    ) -> Result<(Samples, f64)> {
        let calibration = self.calibration_vector()?;
        let (mut samples, t_start) = self.raw.read_raw_samples(t0, dt, block_slice)?;
        for (c, factor) in calibration.into_iter().enumerate() {
            let factor = factor * self.scale;
            for value in samples.channel_mut(c) {
                *value = (f64::from(*value) * factor) as f32;
            }
        }
        Ok((samples, t_start))
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header_block::{HeaderBlock, OptionalHeader};
    use crate::xml::data_info::Calibration;
    use std::collections::BTreeMap;
    use std::io::Cursor;

    fn stream(num_channels: u32, rate: u32, samples_per_channel: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        let hdr =
            HeaderBlock::new(num_channels, samples_per_channel, rate, OptionalHeader::None)
                .unwrap();
        hdr.write(&mut buf).unwrap();
        for c in 0..num_channels {
            for s in 0..samples_per_channel {
                buf.extend_from_slice(&((10 * c + s) as f32).to_le_bytes());
            }
        }
        buf
    }

    fn info_with_gcal(factors: &[(u32, f32)]) -> DataInfo {
        let mut info = DataInfo::new("EEG");
        info.calibrations.insert(
            GCAL.to_owned(),
            Calibration {
                begin_time: 0.0,
                channels: factors.iter().copied().collect::<BTreeMap<_, _>>(),
            },
        );
        info
    }

    #[test]
    fn neutral_calibration_matches_raw() {
        let bytes = stream(2, 100, 4);
        let mut bin = BinFile::new(Cursor::new(bytes), DataInfo::new("EEG"));
        assert_eq!(bin.calibration(), None);
        assert_eq!(bin.unit(), RAW_UNIT);
        let (raw, _) = bin.read_raw_samples(0.0, None, None).unwrap();
        let (physical, _) = bin.get_physical_samples(0.0, None, None).unwrap();
        assert_eq!(raw, physical);
    }

    #[test]
    fn gcal_is_selected_by_default_and_applied() {
        let bytes = stream(2, 100, 4);
        let mut bin = BinFile::new(Cursor::new(bytes), info_with_gcal(&[(1, 2.0), (2, 0.5)]));
        assert_eq!(bin.calibration(), Some(GCAL));
        let (samples, _) = bin.get_physical_samples(0.0, None, None).unwrap();
        assert_eq!(samples.channel(0), &[0.0, 2.0, 4.0, 6.0]);
        assert_eq!(samples.channel(1), &[5.0, 5.5, 6.0, 6.5]);
    }

    #[test]
    fn unit_conversion_scales_output() {
        let bytes = stream(1, 100, 2);
        let mut bin = BinFile::new(Cursor::new(bytes), DataInfo::new("EEG"));
        bin.set_unit("mV").unwrap();
        assert_eq!(bin.unit(), "mV");
        let (samples, _) = bin.get_physical_samples(0.0, None, None).unwrap();
        assert_eq!(samples.channel(0), &[0.0, 0.001]);
    }

    #[test]
    fn unknown_unit_is_rejected() {
        let bytes = stream(1, 100, 2);
        let mut bin = BinFile::new(Cursor::new(bytes), DataInfo::new("EEG"));
        assert!(matches!(
            bin.set_unit("kV").unwrap_err(),
            MffError::InvalidArgument(_)
        ));
    }

    #[test]
    fn absent_calibration_is_rejected() {
        let bytes = stream(1, 100, 2);
        let mut bin = BinFile::new(Cursor::new(bytes), DataInfo::new("EEG"));
        assert!(matches!(
            bin.set_calibration(GCAL).unwrap_err(),
            MffError::BadCalibration(_)
        ));
    }

    #[test]
    fn late_calibration_is_rejected() {
        let bytes = stream(1, 100, 2);
        let mut info = DataInfo::new("EEG");
        info.calibrations.insert(
            GCAL.to_owned(),
            Calibration {
                begin_time: 5.0,
                channels: BTreeMap::new(),
            },
        );
        let mut bin = BinFile::new(Cursor::new(bytes), info);
        assert!(matches!(
            bin.set_calibration(GCAL).unwrap_err(),
            MffError::BadCalibration(_)
        ));
    }

    #[test]
    fn unit_scale_table() {
        assert_eq!(unit_scale("uV", "uV"), Some(1.0));
        assert_eq!(unit_scale("uV", "V"), Some(1e-6));
        assert_eq!(unit_scale("uV", "mV"), Some(1e-3));
        assert_eq!(unit_scale("V", "uV"), Some(1e6));
        assert_eq!(unit_scale("uV", "furlong"), None);
    }
}
