//! Uniform access to a recording's files.
//!
//! A recording lives either in a filesystem directory (`.mff`) or in an
//! uncompressed store archive of that directory (`.mfz`).  [`MffDirectory`]
//! presents both behind the same byte semantics: `listdir`, `contains`, and
//! `open_file(basename)` returning a seekable [`ByteStream`].  The signal
//! reader never learns which container it is traversing.
//!
//! Basenames are matched across the extensions present in the listing, so
//! `open_file("epochs")` resolves `epochs.xml`.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::archive::{is_store_archive, FilePart, StoreArchive};
use crate::error::{MffError, Result};

/// Extensions a recording container may carry.
pub const CONTAINER_EXTENSIONS: [&str; 2] = ["mff", "mfz"];

// ── ByteStream ───────────────────────────────────────────────────────────────

/// A seekable byte source for one container entry.
#[derive(Debug)]
pub enum ByteStream {
    File(File),
    Part(FilePart),
}

impl Read for ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ByteStream::File(f) => f.read(buf),
            ByteStream::Part(p) => p.read(buf),
        }
    }
}

impl Seek for ByteStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            ByteStream::File(f) => f.seek(pos),
            ByteStream::Part(p) => p.seek(pos),
        }
    }
}

// ── Directory variants ───────────────────────────────────────────────────────

/// A signal stream basename paired with its data-info document basename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalAndInfo {
    pub signal: String,
    pub info: String,
}

#[derive(Debug)]
pub struct FilesystemDir {
    path: PathBuf,
    names: Vec<String>,
}

#[derive(Debug)]
pub struct ArchiveDir {
    archive: StoreArchive,
    names: Vec<String>,
}

/// A recording container: filesystem directory or store archive.
#[derive(Debug)]
pub enum MffDirectory {
    Filesystem(FilesystemDir),
    Archive(ArchiveDir),
}

impl MffDirectory {
    /// Open `path` as a recording, choosing the variant by file type.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MffError::not_found(format!("'{}'", path.display())));
        }
        check_extension(path)?;

        let dir = if path.is_dir() {
            let mut names = Vec::new();
            for entry in fs::read_dir(path)? {
                let name = entry?
                    .file_name()
                    .into_string()
                    .map_err(|_| MffError::format("entry name is not UTF-8"))?;
                names.push(name);
            }
            names.sort();
            MffDirectory::Filesystem(FilesystemDir {
                path: path.to_owned(),
                names,
            })
        } else if is_store_archive(path) {
            let archive = StoreArchive::open(path)?;
            let mut names: Vec<String> = archive.names().map(str::to_owned).collect();
            names.sort();
            MffDirectory::Archive(ArchiveDir { archive, names })
        } else {
            return Err(MffError::format(format!(
                "'{}' is neither a directory nor a store archive",
                path.display()
            )));
        };

        dir.check()?;
        Ok(dir)
    }

    /// Entry names, extension included.
    pub fn listdir(&self) -> &[String] {
        match self {
            MffDirectory::Filesystem(d) => &d.names,
            MffDirectory::Archive(d) => &d.names,
        }
    }

    /// Whether an entry with this full name exists.
    pub fn contains(&self, filename: &str) -> bool {
        self.listdir().iter().any(|n| n == filename)
    }

    /// Resolve a basename to its full entry name.
    pub fn filename(&self, basename: &str) -> Result<&str> {
        self.listdir()
            .iter()
            .map(String::as_str)
            .find(|n| stem(n) == basename)
            .ok_or_else(|| {
                MffError::not_found(format!("no entry with basename '{basename}'"))
            })
    }

    /// Open the entry with the given basename.
    pub fn open_file(&self, basename: &str) -> Result<ByteStream> {
        let name = self.filename(basename)?;
        match self {
            MffDirectory::Filesystem(d) => Ok(ByteStream::File(File::open(d.path.join(name))?)),
            MffDirectory::Archive(d) => Ok(ByteStream::Part(d.archive.open_entry(name)?)),
        }
    }

    /// Basename of the file-info (`None`) or a data-info document.
    pub fn info_basename(index: Option<usize>) -> String {
        match index {
            Some(i) => format!("info{i}"),
            None => "info".to_owned(),
        }
    }

    /// All signal streams paired with their data-info basenames, ordered by
    /// stream index.
    pub fn signals_with_info(&self) -> Result<Vec<SignalAndInfo>> {
        let mut pairs = Vec::new();
        for name in self.listdir() {
            if !name.ends_with(".bin") {
                continue;
            }
            let base = stem(name);
            let index = bin_index(base).ok_or_else(|| {
                MffError::format(format!("signal file '{name}' has no stream index"))
            })?;
            pairs.push((
                index,
                SignalAndInfo {
                    signal: base.to_owned(),
                    info: Self::info_basename(Some(index)),
                },
            ));
        }
        pairs.sort_by_key(|(index, _)| *index);
        Ok(pairs.into_iter().map(|(_, p)| p).collect())
    }

    /// Layout completeness: every `signal<N>.bin` needs its `info<N>.xml`.
    fn check(&self) -> Result<()> {
        for pair in self.signals_with_info()? {
            self.filename(&pair.info).map_err(|_| {
                MffError::format(format!(
                    "signal stream '{}' has no paired '{}.xml'",
                    pair.signal, pair.info
                ))
            })?;
        }
        Ok(())
    }
}

fn check_extension(path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if CONTAINER_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(MffError::argument(format!(
            "unknown container type '{}'",
            path.display()
        )))
    }
}

/// Entry name without its final extension.
fn stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => name,
    }
}

/// First run of digits in a signal basename.
fn bin_index(basename: &str) -> Option<usize> {
    let digits: String = basename
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

// ── Tests ────────────────────────────────────────────────────────────────────
