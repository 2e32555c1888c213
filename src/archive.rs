//! Store-only archive access (`.mfz`).
//!
//! A `.mfz` file is a flat zip archive of a recording directory with
//! compression method 0 (store) for every member.  Because members are
//! stored verbatim, each one is a contiguous byte range of the archive
//! file, and a [`FilePart`] can serve seekable reads over that range from
//! its own OS file handle — streaming access to the inner blocked binary
//! without unpacking.
//!
//! # Relevant zip structures (all fields little-endian)
//!
//! ```text
//! Local file header (30 bytes + name + extra), signature 0x04034B50:
//!   offset 8   u16  compression method (must be 0)
//!   offset 18  u32  compressed size
//!   offset 26  u16  name length
//!   offset 28  u16  extra length
//!
//! Central directory entry (46 bytes + name + extra + comment),
//! signature 0x02014B50:
//!   offset 10  u16  compression method (must be 0)
//!   offset 20  u32  compressed size
//!   offset 28  u16  name length
//!   offset 30  u16  extra length
//!   offset 32  u16  comment length
//!   offset 42  u32  local header offset
//!
//! End of central directory (22 bytes + comment), signature 0x06054B50:
//!   offset 10  u16  total entry count
//!   offset 16  u32  central directory offset
//! ```
//!
//! The data of a member starts after its local header; the local extra
//! field length can differ from the central one, so the local header is
//! consulted for the exact payload offset.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Datelike, Local, Timelike};

use crate::error::{MffError, Result};

const LOCAL_FILE_HEADER_SIG: u32 = 0x0403_4B50;
const CENTRAL_FILE_HEADER_SIG: u32 = 0x0201_4B50;
const END_OF_CENTRAL_DIR_SIG: u32 = 0x0605_4B50;

/// Store — the only compression method a recording archive may use.
const METHOD_STORE: u16 = 0;

const END_OF_CENTRAL_DIR_SIZE: usize = 22;
/// EOCD position scan window: record size plus the maximal comment.
const EOCD_SEARCH_WINDOW: u64 = (END_OF_CENTRAL_DIR_SIZE + u16::MAX as usize) as u64;

// ── Archive index ────────────────────────────────────────────────────────────

/// One member's name and payload range within the archive file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data_start: u64,
    pub data_end: u64,
}

/// Read-side index over a store archive.
///
/// Construction parses the central directory once; [`StoreArchive::open_entry`]
/// then hands out independent [`FilePart`] cursors, each backed by its own
/// file handle.
#[derive(Debug)]
pub struct StoreArchive {
    path: PathBuf,
    entries: Vec<ArchiveEntry>,
}

impl StoreArchive {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let mut file = File::open(&path)?;
        let entries = read_central_directory(&mut file)?;
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn entry(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Open an independent range-bounded cursor over one member.
    pub fn open_entry(&self, name: &str) -> Result<FilePart> {
        let entry = self
            .entry(name)
            .ok_or_else(|| MffError::not_found(format!("no archive member '{name}'")))?;
        FilePart::open(&self.path, entry.data_start, entry.data_end)
    }
}

/// Whether `path` starts with a zip signature.
pub fn is_store_archive(path: impl AsRef<Path>) -> bool {
    let mut magic = [0u8; 4];
    match File::open(path).and_then(|mut f| f.read_exact(&mut magic)) {
        Ok(()) => {
            let sig = u32::from_le_bytes(magic);
            sig == LOCAL_FILE_HEADER_SIG || sig == END_OF_CENTRAL_DIR_SIG
        }
        Err(_) => false,
    }
}

fn read_central_directory(file: &mut File) -> Result<Vec<ArchiveEntry>> {
    let file_len = file.seek(SeekFrom::End(0))?;
    let window = file_len.min(EOCD_SEARCH_WINDOW);
    if (window as usize) < END_OF_CENTRAL_DIR_SIZE {
        return Err(MffError::format("archive too short for an end record"));
    }

    file.seek(SeekFrom::Start(file_len - window))?;
    let mut tail = vec![0u8; window as usize];
    file.read_exact(&mut tail)?;

    // Scan backwards for the end-of-central-directory signature.
    let sig = END_OF_CENTRAL_DIR_SIG.to_le_bytes();
    let eocd_at = (0..=tail.len() - END_OF_CENTRAL_DIR_SIZE)
        .rev()
        .find(|&i| tail[i..i + 4] == sig)
        .ok_or_else(|| MffError::format("archive end record not found"))?;

    let eocd = &tail[eocd_at..];
    let entry_count = u16::from_le_bytes([eocd[10], eocd[11]]) as usize;
    let cd_offset = u64::from(u32::from_le_bytes([
        eocd[16], eocd[17], eocd[18], eocd[19],
    ]));
    if cd_offset == u64::from(u32::MAX) {
        return Err(MffError::format("zip64 archives are not supported"));
    }

    file.seek(SeekFrom::Start(cd_offset))?;
    let mut entries = Vec::with_capacity(entry_count);
    for _ in 0..entry_count {
        entries.push(read_central_entry(file)?);
    }

    // Resolve payload offsets through each local header; its extra-field
    // length can differ from the central directory's.
    let mut resolved = Vec::with_capacity(entries.len());
    for (name, method, size, local_offset) in entries {
        if method != METHOD_STORE {
            return Err(MffError::format(format!(
                "archive member '{name}' uses compression method {method} (store required)"
            )));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(MffError::format(format!(
                "archive member '{name}' is not a flat entry"
            )));
        }
        let data_start = local_payload_offset(file, local_offset)?;
        resolved.push(ArchiveEntry {
            name,
            data_start,
            data_end: data_start + size,
        });
    }
    Ok(resolved)
}

/// Returns `(name, method, size, local_header_offset)`.
fn read_central_entry(file: &mut File) -> Result<(String, u16, u64, u64)> {
    if file.read_u32::<LittleEndian>()? != CENTRAL_FILE_HEADER_SIG {
        return Err(MffError::format("malformed central directory entry"));
    }
    file.seek(SeekFrom::Current(6))?; // versions, flags
    let method = file.read_u16::<LittleEndian>()?;
    file.seek(SeekFrom::Current(8))?; // time, date, crc32
    let comp_size = file.read_u32::<LittleEndian>()?;
    file.seek(SeekFrom::Current(4))?; // uncompressed size (== comp for store)
    let name_len = file.read_u16::<LittleEndian>()? as usize;
    let extra_len = file.read_u16::<LittleEndian>()? as i64;
    let comment_len = file.read_u16::<LittleEndian>()? as i64;
    file.seek(SeekFrom::Current(8))?; // disk, attributes
    let local_offset = u64::from(file.read_u32::<LittleEndian>()?);

    let mut name = vec![0u8; name_len];
    file.read_exact(&mut name)?;
    let name = String::from_utf8(name)
        .map_err(|_| MffError::format("archive member name is not UTF-8"))?;
    file.seek(SeekFrom::Current(extra_len + comment_len))?;

    Ok((name, method, u64::from(comp_size), local_offset))
}

fn local_payload_offset(file: &mut File, local_offset: u64) -> Result<u64> {
    file.seek(SeekFrom::Start(local_offset))?;
    if file.read_u32::<LittleEndian>()? != LOCAL_FILE_HEADER_SIG {
        return Err(MffError::format("malformed local file header"));
    }
    file.seek(SeekFrom::Current(22))?; // version through sizes
    let name_len = u64::from(file.read_u16::<LittleEndian>()?);
    let extra_len = u64::from(file.read_u16::<LittleEndian>()?);
    Ok(local_offset + 30 + name_len + extra_len)
}

// ── FilePart ─────────────────────────────────────────────────────────────────

/// An independent cursor over the byte range `[start, end)` of a file.
///
/// Each part owns its own OS file handle, so parts opened from the same
/// archive never perturb one another.  `seek` positions are relative to the
/// part; reads clamp at the range end.
#[derive(Debug)]
pub struct FilePart {
    file: File,
    start: u64,
    end: u64,
    /// Absolute cursor in the backing file.
    pos: u64,
}

impl FilePart {
    pub fn open(path: impl AsRef<Path>, start: u64, end: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start))?;
        Ok(Self {
            file,
            start,
            end,
            pos: start,
        })
    }

    /// Bytes in the part.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Cursor offset relative to the part start.
    pub fn tell(&self) -> u64 {
        self.pos - self.start
    }
}

impl Read for FilePart {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.end.saturating_sub(self.pos);
        let n = (buf.len() as u64).min(remaining) as usize;
        if n == 0 {
            return Ok(0);
        }
        let read = self.file.read(&mut buf[..n])?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl Seek for FilePart {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => self.start as i128 + p as i128,
            SeekFrom::Current(d) => self.pos as i128 + d as i128,
            SeekFrom::End(d) => self.end as i128 + d as i128,
        };
        if target < self.start as i128 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the entry",
            ));
        }
        self.pos = target as u64;
        self.file.seek(SeekFrom::Start(self.pos))?;
        Ok(self.pos - self.start)
    }
}

// ── Packing ──────────────────────────────────────────────────────────────────

/// Package the files of `dir` into a flat store archive at `dest`.
///
/// Member names are basenames; subdirectories are rejected because the
/// recording layout is flat by definition.
pub fn pack_directory(dir: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    let mut names: Vec<(String, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            return Err(MffError::format(format!(
                "'{}' holds a subdirectory; recording layouts are flat",
                dir.display()
            )));
        }
        let name = entry
            .file_name()
            .into_string()
            .map_err(|_| MffError::format("entry name is not UTF-8"))?;
        names.push((name, entry.path()));
    }
    names.sort();

    let mut out = File::create(dest)?;
    let mut central: Vec<u8> = Vec::new();
    let mut count: u16 = 0;

    for (name, path) in names {
        let data = fs::read(&path)?;
        if data.len() > u32::MAX as usize {
            return Err(MffError::argument(format!(
                "'{name}' exceeds the archive member size limit"
            )));
        }
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&data);
        let crc = hasher.finalize();
        let (dos_time, dos_date) = dos_date_time(&path);
        let offset = out.stream_position()?;
        if offset > u64::from(u32::MAX) {
            return Err(MffError::argument("archive exceeds the size limit"));
        }

        // Local file header.
        out.write_u32::<LittleEndian>(LOCAL_FILE_HEADER_SIG)?;
        out.write_u16::<LittleEndian>(20)?; // version needed
        out.write_u16::<LittleEndian>(0)?; // flags
        out.write_u16::<LittleEndian>(METHOD_STORE)?;
        out.write_u16::<LittleEndian>(dos_time)?;
        out.write_u16::<LittleEndian>(dos_date)?;
        out.write_u32::<LittleEndian>(crc)?;
        out.write_u32::<LittleEndian>(data.len() as u32)?;
        out.write_u32::<LittleEndian>(data.len() as u32)?;
        out.write_u16::<LittleEndian>(name.len() as u16)?;
        out.write_u16::<LittleEndian>(0)?; // extra
        out.write_all(name.as_bytes())?;
        out.write_all(&data)?;

        // Matching central directory entry.
        central.write_u32::<LittleEndian>(CENTRAL_FILE_HEADER_SIG)?;
        central.write_u16::<LittleEndian>(20)?; // version made by
        central.write_u16::<LittleEndian>(20)?; // version needed
        central.write_u16::<LittleEndian>(0)?; // flags
        central.write_u16::<LittleEndian>(METHOD_STORE)?;
        central.write_u16::<LittleEndian>(dos_time)?;
        central.write_u16::<LittleEndian>(dos_date)?;
        central.write_u32::<LittleEndian>(crc)?;
        central.write_u32::<LittleEndian>(data.len() as u32)?;
        central.write_u32::<LittleEndian>(data.len() as u32)?;
        central.write_u16::<LittleEndian>(name.len() as u16)?;
        central.write_u16::<LittleEndian>(0)?; // extra
        central.write_u16::<LittleEndian>(0)?; // comment
        central.write_u16::<LittleEndian>(0)?; // disk
        central.write_u16::<LittleEndian>(0)?; // internal attributes
        central.write_u32::<LittleEndian>(0)?; // external attributes
        central.write_u32::<LittleEndian>(offset as u32)?;
        central.extend_from_slice(name.as_bytes());

        count = count
            .checked_add(1)
            .ok_or_else(|| MffError::argument("too many archive members"))?;
    }

    let cd_offset = out.stream_position()?;
    out.write_all(&central)?;

    // End of central directory.
    out.write_u32::<LittleEndian>(END_OF_CENTRAL_DIR_SIG)?;
    out.write_u16::<LittleEndian>(0)?; // this disk
    out.write_u16::<LittleEndian>(0)?; // central directory disk
    out.write_u16::<LittleEndian>(count)?;
    out.write_u16::<LittleEndian>(count)?;
    out.write_u32::<LittleEndian>(central.len() as u32)?;
    out.write_u32::<LittleEndian>(cd_offset as u32)?;
    out.write_u16::<LittleEndian>(0)?; // comment length
    out.flush()?;
    Ok(())
}

/// DOS-encoded modification time and date of `path`; now on failure.
fn dos_date_time(path: &Path) -> (u16, u16) {
    let modified: DateTime<Local> = fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Local>::from)
        .unwrap_or_else(|_| Local::now());
    let year = modified.year().clamp(1980, 2107) as u16;
    let date = ((year - 1980) << 9) | ((modified.month() as u16) << 5) | modified.day() as u16;
    let time = ((modified.hour() as u16) << 11)
        | ((modified.minute() as u16) << 5)
        | (modified.second() as u16 / 2);
    (time, date)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn packed(files: &[(&str, &[u8])]) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("example.mff");
        fs::create_dir(&src).unwrap();
        for (name, data) in files {
            fs::write(src.join(name), data).unwrap();
        }
        let dest = tmp.path().join("example.mfz");
        pack_directory(&src, &dest).unwrap();
        (tmp, dest)
    }

    #[test]
    fn pack_then_read_round_trip() {
        let (_tmp, dest) = packed(&[
            ("epochs.xml", b"<epochs />".as_slice()),
            ("signal1.bin", &[1u8, 2, 3, 4, 5]),
        ]);
        let archive = StoreArchive::open(&dest).unwrap();
        let mut names: Vec<_> = archive.names().collect();
        names.sort();
        assert_eq!(names, vec!["epochs.xml", "signal1.bin"]);

        let mut part = archive.open_entry("signal1.bin").unwrap();
        let mut data = Vec::new();
        part.read_to_end(&mut data).unwrap();
        assert_eq!(data, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn file_parts_have_independent_cursors() {
        let (_tmp, dest) = packed(&[("a.bin", &[0u8, 1, 2, 3, 4, 5, 6, 7])]);
        let archive = StoreArchive::open(&dest).unwrap();
        let mut first = archive.open_entry("a.bin").unwrap();
        let mut second = archive.open_entry("a.bin").unwrap();

        let mut buf = [0u8; 4];
        first.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);
        // The second cursor is unmoved by the first's reads.
        assert_eq!(second.tell(), 0);
        second.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);
        first.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [4, 5, 6, 7]);
    }

    #[test]
    fn file_part_seek_whence_arithmetic() {
        let (_tmp, dest) = packed(&[("a.bin", &[0u8, 1, 2, 3, 4, 5, 6, 7])]);
        let archive = StoreArchive::open(&dest).unwrap();
        let mut part = archive.open_entry("a.bin").unwrap();

        assert_eq!(part.seek(SeekFrom::Start(12)).unwrap(), 12);
        assert_eq!(part.tell(), 12);
        assert_eq!(part.seek(SeekFrom::Start(2)).unwrap(), 2);
        assert_eq!(part.seek(SeekFrom::Current(3)).unwrap(), 5);
        assert_eq!(part.seek(SeekFrom::End(0)).unwrap(), 8);
        assert_eq!(part.tell(), part.len());
        assert!(part.seek(SeekFrom::Current(-100)).is_err());
    }

    #[test]
    fn reads_clamp_at_entry_end() {
        let (_tmp, dest) = packed(&[("a.bin", &[9u8, 9, 9]), ("b.bin", &[7u8, 7, 7, 7])]);
        let archive = StoreArchive::open(&dest).unwrap();
        let mut part = archive.open_entry("a.bin").unwrap();
        let mut data = Vec::new();
        part.read_to_end(&mut data).unwrap();
        // Must not bleed into the following member's bytes.
        assert_eq!(data, vec![9, 9, 9]);
        assert_eq!(part.read(&mut [0u8; 8]).unwrap(), 0);
    }

    #[test]
    fn missing_member_is_not_found() {
        let (_tmp, dest) = packed(&[("a.bin", &[1u8])]);
        let archive = StoreArchive::open(&dest).unwrap();
        assert!(matches!(
            archive.open_entry("b.bin").unwrap_err(),
            MffError::NotFound(_)
        ));
    }

    #[test]
    fn compressed_members_are_rejected() {
        let (_tmp, dest) = packed(&[("a.bin", &[1u8, 2, 3])]);
        // Flip the method field of the central directory entry to deflate.
        let mut bytes = fs::read(&dest).unwrap();
        let sig = CENTRAL_FILE_HEADER_SIG.to_le_bytes();
        let at = (0..bytes.len() - 4)
            .find(|&i| bytes[i..i + 4] == sig)
            .unwrap();
        bytes[at + 10] = 8;
        fs::write(&dest, &bytes).unwrap();

        let err = StoreArchive::open(&dest).unwrap_err();
        assert!(matches!(err, MffError::InvalidFormat(_)), "{err}");
    }

    #[test]
    fn detects_archive_magic() {
        let (tmp, dest) = packed(&[("a.bin", &[1u8])]);
        assert!(is_store_archive(&dest));
        let plain = tmp.path().join("plain.txt");
        fs::write(&plain, b"not an archive").unwrap();
        assert!(!is_store_archive(&plain));
    }
}
