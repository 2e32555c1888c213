//! Recording reader façade.
//!
//! [`Reader`] composes the container, the XML layer, and the calibrated
//! signal readers behind one query surface:
//!
//! ```no_run
//! use mffio::Reader;
//!
//! let mut reader = Reader::open("./recording.mff")?;
//! reader.set_unit("EEG", "uV")?;
//! let epoch = reader.epoch(0)?;
//! let data = reader.get_physical_samples_from_epoch(&epoch, 0.0, None, None)?;
//! let (eeg, t_start) = &data["EEG"];
//! # Ok::<(), mffio::MffError>(())
//! ```
//!
//! Accessors are computed on first call and cached behind presence flags;
//! the reader is single-threaded by design.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, FixedOffset};

use crate::bin_file::BinFile;
use crate::container::{ByteStream, MffDirectory};
use crate::epoch::{associate_categories, Epoch};
use crate::error::{MffError, Result};
use crate::raw_bin::Samples;
use crate::xml::event_track::is_event_track_basename;
use crate::xml::history::MffFlavor;
use crate::xml::{Categories, EventTrack, XmlDocument};

type Blobs = BTreeMap<String, BinFile<ByteStream>>;

pub struct Reader {
    directory: MffDirectory,
    blobs: Option<Blobs>,
    epochs: Option<Vec<Epoch>>,
    categories: Option<Option<Categories>>,
    flavor: Option<MffFlavor>,
    startdatetime: Option<DateTime<FixedOffset>>,
}

impl Reader {
    /// Open a `.mff` directory or `.mfz` archive.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            directory: MffDirectory::open(path)?,
            blobs: None,
            epochs: None,
            categories: None,
            flavor: None,
            startdatetime: None,
        })
    }

    pub fn directory(&self) -> &MffDirectory {
        &self.directory
    }

    // ── Document accessors ───────────────────────────────────────────────────

    /// Parse one document by basename, checked against the expected kind by
    /// the callers below.
    fn document(&self, basename: &str) -> Result<XmlDocument> {
        XmlDocument::from_stream(self.directory.open_file(basename)?)
    }

    /// UTC-offset start date and time of the recording.
    pub fn startdatetime(&mut self) -> Result<DateTime<FixedOffset>> {
        if let Some(record_time) = self.startdatetime {
            return Ok(record_time);
        }
        let record_time = match self.document("info")? {
            XmlDocument::FileInfo(info) => info.record_time,
            other => {
                return Err(MffError::format(format!(
                    "'info.xml' holds a {} document",
                    other.root_tag()
                )))
            }
        };
        self.startdatetime = Some(record_time);
        Ok(record_time)
    }

    /// The recording's epochs, named after categories when those match.
    pub fn epochs(&mut self) -> Result<&[Epoch]> {
        if self.epochs.is_none() {
            let mut epochs = match self.document("epochs")? {
                XmlDocument::Epochs(doc) => doc.epochs,
                other => {
                    return Err(MffError::format(format!(
                        "'epochs.xml' holds a {} document",
                        other.root_tag()
                    )))
                }
            };
            if let Some(categories) = self.categories()? {
                associate_categories(&mut epochs, &categories);
            }
            self.epochs = Some(epochs);
        }
        Ok(self.epochs.as_deref().unwrap_or_default())
    }

    /// Clone of epoch `index`.
    pub fn epoch(&mut self, index: usize) -> Result<Epoch> {
        self.epochs()?
            .get(index)
            .cloned()
            .ok_or_else(|| MffError::argument(format!("no epoch with index {index}")))
    }

    /// The categories document, when the recording carries one.
    pub fn categories(&mut self) -> Result<Option<Categories>> {
        if self.categories.is_none() {
            let loaded = if self.directory.filename("categories").is_ok() {
                match self.document("categories")? {
                    XmlDocument::Categories(doc) => Some(doc),
                    other => {
                        return Err(MffError::format(format!(
                            "'categories.xml' holds a {} document",
                            other.root_tag()
                        )))
                    }
                }
            } else {
                None
            };
            self.categories = Some(loaded);
        }
        Ok(self.categories.clone().unwrap_or_default())
    }

    /// Recording flavor, inferred from the history document; `continuous`
    /// when no history is present.
    pub fn flavor(&mut self) -> Result<MffFlavor> {
        if self.flavor.is_none() {
            let flavor = if self.directory.filename("history").is_ok() {
                match self.document("history")? {
                    XmlDocument::History(history) => history.mff_flavor(),
                    other => {
                        return Err(MffError::format(format!(
                            "'history.xml' holds a {} document",
                            other.root_tag()
                        )))
                    }
                }
            } else {
                MffFlavor::Continuous
            };
            self.flavor = Some(flavor);
        }
        Ok(self.flavor.unwrap_or_default())
    }

    /// Every `Events*.xml` track in the recording.
    pub fn event_tracks(&mut self) -> Result<Vec<EventTrack>> {
        let basenames: Vec<String> = self
            .directory
            .listdir()
            .iter()
            .filter(|name| name.ends_with(".xml"))
            .map(|name| name.trim_end_matches(".xml").to_owned())
            .filter(|base| is_event_track_basename(base))
            .collect();
        let mut tracks = Vec::new();
        for basename in basenames {
            match self.document(&basename)? {
                XmlDocument::EventTrack(track) => tracks.push(track),
                other => {
                    return Err(MffError::format(format!(
                        "'{basename}.xml' holds a {} document",
                        other.root_tag()
                    )))
                }
            }
        }
        Ok(tracks)
    }

    // ── Signal accessors ─────────────────────────────────────────────────────

    /// Calibrated readers keyed by channel type.
    fn blobs(&mut self) -> Result<&mut Blobs> {
        if self.blobs.is_none() {
            let mut blobs = Blobs::new();
            for pair in self.directory.signals_with_info()? {
                let info = match self.document(&pair.info)? {
                    XmlDocument::DataInfo(info) => info,
                    other => {
                        return Err(MffError::format(format!(
                            "'{}.xml' holds a {} document",
                            pair.info,
                            other.root_tag()
                        )))
                    }
                };
                let stream = self.directory.open_file(&pair.signal)?;
                let bin = BinFile::new(stream, info);
                blobs.insert(bin.signal_type().to_owned(), bin);
            }
            self.blobs = Some(blobs);
        }
        match self.blobs.as_mut() {
            Some(blobs) => Ok(blobs),
            None => Err(MffError::format("signal readers unavailable")),
        }
    }

    fn blob(&mut self, channel_type: &str) -> Result<&mut BinFile<ByteStream>> {
        self.blobs()?
            .get_mut(channel_type)
            .ok_or_else(|| MffError::not_found(format!("no channel type '{channel_type}'")))
    }

    /// Channel types available in this recording.
    pub fn channel_types(&mut self) -> Result<Vec<String>> {
        Ok(self.blobs()?.keys().cloned().collect())
    }

    /// Sampling rate in Hz by channel type.
    pub fn sampling_rates(&mut self) -> Result<BTreeMap<String, f64>> {
        self.per_type(|bin| Ok(f64::from(bin.sampling_rate()?)))
    }

    /// Recorded duration in seconds by channel type.
    pub fn durations(&mut self) -> Result<BTreeMap<String, f64>> {
        self.per_type(BinFile::duration)
    }

    /// Output unit by channel type.
    pub fn units(&mut self) -> Result<BTreeMap<String, String>> {
        self.per_type(|bin| Ok(bin.unit().to_owned()))
    }

    /// Channel count by channel type.
    pub fn num_channels(&mut self) -> Result<BTreeMap<String, u32>> {
        self.per_type(BinFile::num_channels)
    }

    fn per_type<T>(
        &mut self,
        mut get: impl FnMut(&mut BinFile<ByteStream>) -> Result<T>,
    ) -> Result<BTreeMap<String, T>> {
        let mut map = BTreeMap::new();
        for (channel_type, bin) in self.blobs()?.iter_mut() {
            map.insert(channel_type.clone(), get(bin)?);
        }
        Ok(map)
    }

    /// Set the output unit of one channel type.
    pub fn set_unit(&mut self, channel_type: &str, unit: &str) -> Result<()> {
        self.blob(channel_type)?.set_unit(unit)
    }

    /// Select the calibration of one channel type.
    pub fn set_calibration(&mut self, channel_type: &str, name: &str) -> Result<()> {
        self.blob(channel_type)?.set_calibration(name)
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Physical samples over `(t0, t0 + dt)`, by channel type.
    ///
    /// Prefer [`Reader::get_physical_samples_from_epoch`], which confines
    /// the window to one epoch's blocks.
    pub fn get_physical_samples(
        &mut self,
        t0: f64,
        dt: Option<f64>,
        channels: Option<&[&str]>,
        block_slice: Option<std::ops::Range<usize>>,
    ) -> Result<BTreeMap<String, (Samples, f64)>> {
        let wanted: Vec<String> = match channels {
            Some(channels) => channels.iter().map(|c| c.to_string()).collect(),
            None => self.channel_types()?,
        };
        let mut result = BTreeMap::new();
        for channel_type in wanted {
            let samples = self
                .blob(&channel_type)?
                .get_physical_samples(t0, dt, block_slice.clone())?;
            result.insert(channel_type, samples);
        }
        Ok(result)
    }

    /// Samples and start time of a window within one epoch, by channel type.
    ///
    /// `t0` is a non-negative offset in seconds from the epoch start.  A
    /// `dt` outside `(0, epoch.dt - t0)` is clamped to the remainder of the
    /// epoch.  The returned start time is relative to the epoch start; no
    /// interpolation corrects for `t0` falling between samples.
    pub fn get_physical_samples_from_epoch(
        &mut self,
        epoch: &Epoch,
        t0: f64,
        dt: Option<f64>,
        channels: Option<&[&str]>,
    ) -> Result<BTreeMap<String, (Samples, f64)>> {
        if t0 < 0.0 {
            return Err(MffError::argument(format!(
                "only non-negative t0 allowed (got {t0})"
            )));
        }
        let dt = dt.filter(|&dt| 0.0 < dt && dt < epoch.dt() - t0);
        self.get_physical_samples(t0, dt, channels, Some(epoch.block_slice()))
    }
}
