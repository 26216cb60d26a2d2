//! Capture log reader.
//!
//! Yields the non-blank lines of a log front to back, tagged with their
//! 1-based physical line numbers. Decoding is left to the caller so a
//! malformed record can be reported (or skipped) with its line.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::ReplayError;
use crate::types::LogLine;

/// Sequential reader over a line-oriented capture log.
pub struct LogReader<R> {
    reader: R,
    buf: String,
    lines_read: u64,
}

impl LogReader<BufReader<File>> {
    /// Open the log at `path` for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> LogReader<R> {
    /// Wrap any buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            lines_read: 0,
        }
    }

    /// Read the next non-blank line, or `Ok(None)` at end of input.
    ///
    /// Blank and whitespace-only lines are skipped but still counted, so
    /// [`LogLine::number`] always matches the physical line in the file.
    pub fn next_line(&mut self) -> Result<Option<LogLine>, ReplayError> {
        loop {
            self.buf.clear();
            let n = self
                .reader
                .read_line(&mut self.buf)
                .map_err(|source| ReplayError::Read {
                    line: self.lines_read + 1,
                    source,
                })?;
            if n == 0 {
                return Ok(None);
            }
            self.lines_read += 1;

            let text = self.buf.trim_end_matches(['\n', '\r']);
            if text.trim().is_empty() {
                continue;
            }
            return Ok(Some(LogLine {
                number: self.lines_read,
                text: text.to_string(),
            }));
        }
    }

    /// Physical lines consumed so far, blank ones included.
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// Convert into an iterator that stops after the first error.
    pub fn lines(self) -> LogLines<R> {
        LogLines {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over the lines of a [`LogReader`]. Fused after an error.
pub struct LogLines<R> {
    reader: LogReader<R>,
    done: bool,
}

impl<R: BufRead> Iterator for LogLines<R> {
    type Item = Result<LogLine, ReplayError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_line() {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for LogLines<R> {}

/// Open the log at `path` as a lazy line sequence.
pub fn read_all(path: impl AsRef<Path>) -> Result<LogLines<BufReader<File>>, ReplayError> {
    Ok(LogReader::open(path)?.lines())
}
