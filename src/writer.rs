//! Recording emission.
//!
//! [`Writer`] collects typed XML documents and encoded signal streams, then
//! emits a consistent recording in one `write()` pass: the directory is
//! created (pre-existing outputs removed when overwriting), every document
//! is serialized under its default namespace, every stream is dumped, and a
//! `.mfz` target is packaged with the in-process store archiver.

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::archive::pack_directory;
use crate::bin_writer::{info_filename, signal_filename, BinWriter};
use crate::devices;
use crate::error::{MffError, Result};
use crate::xml::{Epochs, XmlDocument};

/// Output kinds accepted by [`Writer::new`].
const OUTPUT_EXTENSIONS: [&str; 3] = ["mff", "mfz", "json"];

#[derive(Debug)]
pub struct Writer {
    filename: PathBuf,
    /// The `.mff` directory the recording is staged in.
    mffdir: PathBuf,
    extension: String,
    overwrite: bool,
    xmls: Vec<(String, XmlDocument)>,
    bins: Vec<(String, BinWriter)>,
    num_bin_files: usize,
    dir_created: bool,
}

impl Writer {
    /// Prepare a writer for `filename` (`.mff`, `.mfz`, or `.json`).
    ///
    /// Without `overwrite`, the target must not pre-exist; a `.mfz` target
    /// additionally requires that the sibling `.mff` directory does not
    /// pre-exist, since the archive is packaged from it.
    pub fn new(filename: impl AsRef<Path>, overwrite: bool) -> Result<Self> {
        let filename = filename.as_ref().to_owned();
        let extension = filename
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !OUTPUT_EXTENSIONS.contains(&extension.as_str()) {
            return Err(MffError::argument(format!(
                "unknown output type '{}'",
                filename.display()
            )));
        }
        let mffdir = filename.with_extension("mff");
        if !overwrite {
            if filename.exists() {
                return Err(MffError::argument(format!(
                    "'{}' exists already",
                    filename.display()
                )));
            }
            if extension == "mfz" && mffdir.exists() {
                return Err(MffError::argument(format!(
                    "'{}' exists already",
                    mffdir.display()
                )));
            }
        }
        Ok(Self {
            filename,
            mffdir,
            extension,
            overwrite,
            xmls: Vec::new(),
            bins: Vec::new(),
            num_bin_files: 0,
            dir_created: false,
        })
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// The staged recording directory.
    pub fn mffdir(&self) -> &Path {
        &self.mffdir
    }

    /// Create the recording directory, honouring the overwrite setting.
    ///
    /// Required before constructing a streaming bin writer; `write()` calls
    /// it for the in-memory path.
    pub fn create_directory(&mut self) -> Result<()> {
        if self.dir_created {
            return Ok(());
        }
        if self.overwrite && self.mffdir.exists() {
            fs::remove_dir_all(&self.mffdir)?;
        }
        fs::create_dir_all(
            self.mffdir
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new(".")),
        )?;
        fs::create_dir(&self.mffdir)?;
        self.dir_created = true;
        Ok(())
    }

    /// Register a document under its default filename (or `filename`).
    ///
    /// A later registration under the same filename replaces the earlier.
    pub fn addxml(&mut self, document: XmlDocument, filename: Option<&str>) {
        let filename = filename
            .map(str::to_owned)
            .unwrap_or_else(|| document.default_filename().to_owned());
        if let Some(slot) = self.xmls.iter_mut().find(|(name, _)| *name == filename) {
            slot.1 = document;
        } else {
            self.xmls.push((filename, document));
        }
    }

    /// Register a signal stream.
    ///
    /// Assigns the next `signal<N>.bin` name (unless overridden), registers
    /// the paired `info<N>.xml`, and on the first stream registers
    /// `epochs.xml` from the stream's epoch table.
    pub fn addbin(&mut self, bin: BinWriter, filename: Option<&str>) -> Result<()> {
        self.num_bin_files += 1;
        let binname = filename
            .map(str::to_owned)
            .unwrap_or_else(|| signal_filename(self.num_bin_files));
        bin.check_compatibility(&binname)?;

        let infoname = info_filename(self.num_bin_files);
        self.addxml(
            XmlDocument::DataInfo(crate::xml::DataInfo::new(bin.data_type())),
            Some(&infoname),
        );
        if self.num_bin_files == 1 {
            self.addxml(
                XmlDocument::Epochs(Epochs::new(bin.epochs().to_vec())),
                None,
            );
        }
        self.bins.push((binname, bin));
        Ok(())
    }

    /// Register the paired coordinates and sensor-layout documents of a
    /// device, looked up in a resource directory.
    pub fn add_coordinates_and_sensor_layout(
        &mut self,
        resources_dir: impl AsRef<Path>,
        device: &str,
    ) -> Result<()> {
        let (coordinates, layout) = devices::coordinates_and_sensor_layout(resources_dir, device)?;
        self.addxml(XmlDocument::Coordinates(coordinates), None);
        self.addxml(XmlDocument::SensorLayout(layout), None);
        Ok(())
    }

    /// Emit the recording.
    pub fn write(&mut self) -> Result<()> {
        self.create_directory()?;

        for (filename, document) in &self.xmls {
            let file = fs::File::create(self.mffdir.join(filename))?;
            document.write_to(BufWriter::new(file))?;
        }
        for (filename, bin) in &mut self.bins {
            bin.write(self.mffdir.join(filename.as_str()))?;
        }

        if self.extension == "mfz" {
            if self.overwrite && self.filename.exists() {
                fs::remove_file(&self.filename)?;
            }
            pack_directory(&self.mffdir, &self.filename)?;
        }
        Ok(())
    }

    /// Dump a serializable content map to the `.json` target.
    ///
    /// Convenience sink for downstream consumers; not part of the recording
    /// contract.
    pub fn export_to_json(&self, data: &serde_json::Value) -> Result<()> {
        let file = fs::File::create(&self.filename)?;
        serde_json::to_writer_pretty(BufWriter::new(file), data)
            .map_err(|e| MffError::argument(format!("cannot serialize content map: {e}")))?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
