//! Line-numbered reading of a single document.
//!
//! Streams a document from a starting offset, dropping blank lines and
//! comment lines. Reading is lazy and restartable: opening the same document
//! at the same offset always yields the same sequence.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::errors::RedpenError;

/// Default comment marker (LaTeX `%`).
pub const DEFAULT_COMMENT_MARKER: char = '%';

/// Options for line reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// A line whose first non-whitespace character is this marker is dropped.
    pub comment_marker: char,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            comment_marker: DEFAULT_COMMENT_MARKER,
        }
    }
}

/// A line that survived filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLine {
    /// 0-based index of the line in the document.
    pub index: usize,
    /// 1-based line number, as shown to the reader.
    pub number: usize,
    /// Line text without the trailing newline.
    pub text: String,
}

/// Whether a raw line carries content under the given options.
pub fn is_content(text: &str, options: &ReadOptions) -> bool {
    let trimmed = text.trim_start();
    !trimmed.trim_end().is_empty() && !trimmed.starts_with(options.comment_marker)
}

/// Lazy iterator over the content lines of one document.
pub struct LineReader {
    path: PathBuf,
    inner: BufReader<File>,
    next_index: usize,
    options: ReadOptions,
    buf: Vec<u8>,
}

impl std::fmt::Debug for LineReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineReader")
            .field("path", &self.path)
            .field("next_index", &self.next_index)
            .finish()
    }
}

impl LineReader {
    /// Open `path` positioned at the 0-based line index `start`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use redpen::reader::{LineReader, ReadOptions};
    /// use std::path::Path;
    ///
    /// for line in LineReader::open(Path::new("thesis.tex"), 0, ReadOptions::default()).unwrap() {
    ///     let line = line.unwrap();
    ///     println!("L{}\t{}", line.number, line.text);
    /// }
    /// ```
    pub fn open(path: &Path, start: usize, options: ReadOptions) -> Result<Self, RedpenError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RedpenError::DocumentNotFound {
                path: path.to_path_buf(),
            },
            _ => RedpenError::Io(e),
        })?;
        if !file.metadata()?.is_file() {
            return Err(RedpenError::DocumentNotFound {
                path: path.to_path_buf(),
            });
        }

        let mut reader = Self {
            path: path.to_path_buf(),
            inner: BufReader::new(file),
            next_index: 0,
            options,
            buf: Vec::with_capacity(256),
        };
        reader.skip_to(start)?;
        Ok(reader)
    }

    /// Path of the document being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn skip_to(&mut self, start: usize) -> Result<(), RedpenError> {
        while self.next_index < start {
            if self.read_raw()?.is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Read the next physical line, content or not.
    fn read_raw(&mut self) -> Result<Option<String>, RedpenError> {
        self.buf.clear();
        let n = self.inner.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.next_index += 1;

        let mut end = self.buf.len();
        while end > 0 && matches!(self.buf[end - 1], b'\n' | b'\r') {
            end -= 1;
        }
        // Documents in the wild are not always valid UTF-8
        Ok(Some(String::from_utf8_lossy(&self.buf[..end]).into_owned()))
    }
}

impl Iterator for LineReader {
    type Item = Result<ContentLine, RedpenError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.read_raw() {
                Ok(Some(text)) => text,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };
            if is_content(&text, &self.options) {
                let index = self.next_index - 1;
                return Some(Ok(ContentLine {
                    index,
                    number: index + 1,
                    text,
                }));
            }
        }
    }
}

/// Count physical lines in a document.
pub fn count_lines(path: &Path) -> Result<usize, RedpenError> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RedpenError::DocumentNotFound {
            path: path.to_path_buf(),
        },
        _ => RedpenError::Io(e),
    })?;
    let newlines = bytecount::count(&bytes, b'\n');
    // A final line without a trailing newline still counts
    let unterminated = usize::from(bytes.last().is_some_and(|&b| b != b'\n'));
    Ok(newlines + unterminated)
}
