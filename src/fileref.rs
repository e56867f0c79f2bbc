//! `FileRef` — identity of an input file (spec.md §3).
//!
//! Owns a deferred-open read handle, the way the teacher's `descriptor
//! table` (`src/segment/mod.rs`'s `Arc<DescriptorTable>`) keeps file
//! handles lazily acquired and shared by reference rather than opened
//! eagerly at startup.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Index into `TraceList::file_refs`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FileId(pub usize);

#[derive(Debug, Default)]
pub struct FileStats {
    pub earliest: Option<crate::time::Nstime>,
    pub latest: Option<crate::time::Nstime>,
    pub bytes_written: u64,
    /// Per-file count of "prepend" insertions (spec.md §2 reorder
    /// diagnostics), surfaced at verbosity >= 2.
    pub reorder_count: u64,
}

/// One input file, with an optional byte-range restriction
/// (`file@start:end`, SPEC_FULL.md §2).
pub struct FileRef {
    pub display_name: String,
    pub path: PathBuf,
    pub byte_range: Option<(u64, u64)>,
    pub stats: FileStats,
    handle: Option<File>,
}

impl FileRef {
    #[must_use]
    pub fn new(path: impl AsRef<Path>, byte_range: Option<(u64, u64)>) -> Self {
        let path = path.as_ref().to_path_buf();
        let display_name = match byte_range {
            Some((start, end)) => format!("{}@{start}-{end}", path.display()),
            None => path.display().to_string(),
        };
        Self {
            display_name,
            path,
            byte_range,
            stats: FileStats::default(),
            handle: None,
        }
    }

    /// Lower bound of the readable range (0 unless a byte range was given).
    #[must_use]
    pub fn range_start(&self) -> u64 {
        self.byte_range.map_or(0, |(s, _)| s)
    }

    /// Upper exclusive bound of the readable range, if any was given.
    #[must_use]
    pub fn range_end(&self) -> Option<u64> {
        self.byte_range.map(|(_, e)| e)
    }

    /// `[start, end)` the ingest scanner should walk: the byte-range
    /// restriction if one was given, the whole file otherwise.
    pub fn scan_bounds(&self) -> crate::Result<(u64, u64)> {
        let start = self.range_start();
        let end = match self.range_end() {
            Some(e) => e,
            None => std::fs::metadata(&self.path)?.len(),
        };
        Ok((start, end))
    }

    fn ensure_open(&mut self) -> crate::Result<&mut File> {
        if self.handle.is_none() {
            self.handle = Some(File::open(&self.path)?);
        }
        Ok(self.handle.as_mut().unwrap())
    }

    /// Reads exactly `len` bytes starting at `offset` (relative to the
    /// start of the file, not the byte-range restriction), opening the
    /// underlying file on first use.
    pub fn read_at(&mut self, offset: u64, len: u32, out: &mut Vec<u8>) -> crate::Result<()> {
        let file = self.ensure_open()?;
        file.seek(SeekFrom::Start(offset))?;
        out.resize(len as usize, 0);
        file.read_exact(out)?;
        Ok(())
    }

    pub fn note_written(&mut self, time: crate::time::Nstime, end: crate::time::Nstime, bytes: u64) {
        self.stats.earliest = Some(self.stats.earliest.map_or(time, |e| e.min(time)));
        self.stats.latest = Some(self.stats.latest.map_or(end, |l| l.max(end)));
        self.stats.bytes_written += bytes;
    }

    pub fn note_reorder(&mut self) {
        self.stats.reorder_count += 1;
    }

    pub fn close(&mut self) {
        self.handle = None;
    }
}
