// ========================================================================================
//                        Input Mapping and Line Partitioning
// ========================================================================================

use memchr::memchr_iter;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Could not open input '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not memory-map input '{}': {source}", path.display())]
    Map {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Input '{}' is not valid UTF-8 (first invalid byte at offset {offset}).", path.display())]
    NotUtf8 { path: PathBuf, offset: usize },
}

/// One non-blank input line and its 1-based position in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLine<'a> {
    pub number: usize,
    pub text: &'a str,
}

/// A read-only, memory-mapped input file.
///
/// Zero-length files are not mapped; they simply yield no lines.
pub struct InputFile {
    path: PathBuf,
    mmap: Option<Mmap>,
}

impl InputFile {
    pub fn open(path: &Path) -> Result<Self, InputError> {
        let file = File::open(path).map_err(|source| InputError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let len = file
            .metadata()
            .map_err(|source| InputError::Open {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        let mmap = if len == 0 {
            None
        } else {
            // The file is only read, and only for the lifetime of this struct.
            let mapped = unsafe { Mmap::map(&file) }.map_err(|source| InputError::Map {
                path: path.to_path_buf(),
                source,
            })?;
            Some(mapped)
        };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.mmap.as_ref().map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn text(&self) -> Result<&str, InputError> {
        let bytes: &[u8] = self.mmap.as_deref().unwrap_or(&[]);
        std::str::from_utf8(bytes).map_err(|err| InputError::NotUtf8 {
            path: self.path.clone(),
            offset: err.valid_up_to(),
        })
    }
}

/// Splits `text` on `\n`, dropping a trailing `\r` and skipping blank lines.
/// Line numbers count every physical line, blank or not.
pub fn collect_lines(text: &str) -> Vec<RawLine<'_>> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0usize;
    let mut number = 0usize;

    let mut push = |start: usize, end: usize, number: usize| {
        let line = text[start..end].trim_end_matches('\r');
        if !line.trim().is_empty() {
            lines.push(RawLine { number, text: line });
        }
    };

    for newline in memchr_iter(b'\n', bytes) {
        number += 1;
        push(start, newline, number);
        start = newline + 1;
    }
    if start < bytes.len() {
        number += 1;
        push(start, bytes.len(), number);
    }

    lines
}

/// Deals `lines` into at most `partitions` contiguous chunks of near-equal size,
/// preserving order. Chunks are never empty; fewer lines than partitions yields
/// one chunk per line.
pub fn split_into_partitions(lines: Vec<RawLine<'_>>, partitions: usize) -> Vec<Vec<RawLine<'_>>> {
    let total = lines.len();
    let count = partitions.max(1).min(total);
    if count == 0 {
        return Vec::new();
    }

    let base = total / count;
    let extra = total % count;
    let mut chunks = Vec::with_capacity(count);
    let mut iter = lines.into_iter();
    for chunk_idx in 0..count {
        let size = base + usize::from(chunk_idx < extra);
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}
