//! Segment files on disk.
//!
//! Layout under the ledger directory:
//!
//! ```text
//! segment-000000.jsonl       one canonical JSON block per line
//! segment-000000.seal.json   seal proof (written by seal/checkpoint)
//! segment-000001.jsonl       next segment, anchored to the previous seal
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use arbiter_core::canonical::to_canonical_vec;
use arbiter_core::error::{ArbiterError, Result};
use arbiter_core::model::SealProof;

const SEGMENT_PREFIX: &str = "segment-";
const SEGMENT_SUFFIX: &str = ".jsonl";
const SEAL_SUFFIX: &str = ".seal.json";

/// Raw contents of one segment file.
#[derive(Debug, Default)]
pub(crate) struct SegmentContents {
    bytes: Vec<u8>,
    /// Length of the prefix made of complete (newline-terminated) lines.
    complete_len: usize,
}

impl SegmentContents {
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        let complete_len = bytes
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |p| p + 1);
        Self {
            bytes,
            complete_len,
        }
    }

    /// Complete lines, without their trailing newline.
    pub(crate) fn lines(&self) -> impl Iterator<Item = &[u8]> {
        self.bytes[..self.complete_len]
            .split(|b| *b == b'\n')
            .filter(|l| !l.is_empty())
    }

    /// True when the file ends in a partial line.
    pub(crate) fn has_torn_tail(&self) -> bool {
        self.complete_len < self.bytes.len()
    }

    pub(crate) fn complete_len(&self) -> u64 {
        self.complete_len as u64
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SegmentStore {
    dir: PathBuf,
}

impl SegmentStore {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// A read-only view of `dir`; nothing is created.
    pub(crate) fn existing(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn segment_path(&self, segment: u32) -> PathBuf {
        self.dir
            .join(format!("{SEGMENT_PREFIX}{segment:06}{SEGMENT_SUFFIX}"))
    }

    pub(crate) fn seal_path(&self, segment: u32) -> PathBuf {
        self.dir.join(format!("{SEGMENT_PREFIX}{segment:06}{SEAL_SUFFIX}"))
    }

    /// Segment numbers present on disk, ascending.
    pub(crate) fn list_segments(&self) -> Result<Vec<u32>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(num) = name
                .strip_prefix(SEGMENT_PREFIX)
                .and_then(|rest| rest.strip_suffix(SEGMENT_SUFFIX))
            else {
                continue;
            };
            if let Ok(n) = num.parse::<u32>() {
                out.push(n);
            }
        }
        out.sort_unstable();
        Ok(out)
    }

    pub(crate) fn read_segment(&self, segment: u32) -> Result<SegmentContents> {
        read_segment_file(&self.segment_path(segment))
    }

    /// Append handle, creating the file if needed.
    pub(crate) fn open_append(&self, segment: u32) -> Result<File> {
        Ok(OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.segment_path(segment))?)
    }

    /// Drop a torn tail so the next append starts on a line boundary.
    pub(crate) fn truncate(&self, segment: u32, len: u64) -> Result<()> {
        let f = OpenOptions::new()
            .write(true)
            .open(self.segment_path(segment))?;
        f.set_len(len)?;
        f.sync_all()?;
        Ok(())
    }

    pub(crate) fn read_seal(&self, segment: u32) -> Result<Option<SealProof>> {
        let path = self.seal_path(segment);
        if !path.exists() {
            return Ok(None);
        }
        read_seal_file(&path).map(Some)
    }

    /// Write the seal proof atomically (temp file, fsync, rename).
    pub(crate) fn write_seal(&self, proof: &SealProof) -> Result<()> {
        let path = self.seal_path(proof.segment);
        let tmp = path.with_extension("json.tmp");
        let bytes = to_canonical_vec(proof)?;
        {
            let mut f = File::create(&tmp)?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

pub(crate) fn read_segment_file(path: &Path) -> Result<SegmentContents> {
    match fs::read(path) {
        Ok(bytes) => Ok(SegmentContents::from_bytes(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SegmentContents::default()),
        Err(e) => Err(e.into()),
    }
}

pub fn read_seal_file(path: &Path) -> Result<SealProof> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| ArbiterError::LedgerCorrupted {
        index: 0,
        reason: format!("unreadable seal {}: {e}", path.display()),
    })
}
