use std::cmp::{max, min};
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use encoding_rs::{Encoding, UTF_8};
use thiserror::Error;

/// Newline tokens recognized while scanning backward, longest first so a
/// CRLF pair is never split into a CR line and an LF line.
const NEWLINES: [&[u8]; 3] = [b"\r\n", b"\n", b"\r"];

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("only single byte encodings and UTF-8 are supported")]
    UnsupportedEncoding,
    #[error("could not read requested bytes")]
    IncompleteRead,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads a file one line at a time starting from the end, holding at most
/// one buffer-sized chunk (plus any unterminated line spillover) in memory.
///
/// The file handle is owned by the reader and released when it is dropped,
/// on every exit path.
pub struct ReverseReader {
    file: File,
    encoding: &'static Encoding,
    buffer_size: usize,
    buffer: Vec<u8>,
    /// Cursor scanning backward through `buffer`; -1 once exhausted.
    buffer_offset: isize,
    /// Exclusive end of the pending line, i.e. where the previously
    /// emitted line began.
    last_newline: usize,
    /// Bytes of the file not yet loaded into any buffer.
    remaining_bytes: u64,
}

impl ReverseReader {
    /// Opens `path` for backward reading. Only single-byte encodings and
    /// UTF-8 are supported: their newline bytes can be recognized without
    /// decoding, since UTF-8 continuation bytes never equal `\r` or `\n`.
    pub fn new(
        encoding: &'static Encoding,
        path: &Path,
        buffer_size: usize,
    ) -> Result<Self, ReadError> {
        if !encoding.is_single_byte() && encoding != UTF_8 {
            return Err(ReadError::UnsupportedEncoding);
        }

        let file = File::open(path)?;
        let remaining_bytes = file.metadata()?.len();

        let mut reader = Self {
            file,
            encoding,
            buffer_size,
            buffer: Vec::new(),
            buffer_offset: -1,
            last_newline: 0,
            remaining_bytes,
        };
        reader.fill_buffer(None)?;
        Ok(reader)
    }

    /// True while unscanned buffer content or unread file bytes remain,
    /// i.e. until the first line of the file has been emitted.
    pub fn has_more_data(&self) -> bool {
        self.buffer_offset >= 0 || self.remaining_bytes > 0
    }

    /// Returns the next line up in the file, or `Ok(None)` once the top of
    /// the file has been passed.
    pub fn read_line(&mut self) -> Result<Option<String>, ReadError> {
        while self.buffer_offset >= 0 {
            let offset = self.buffer_offset as usize;

            // A token ending at the cursor could continue into bytes still
            // on disk; refill before the scan gets within the longest
            // token's width of the buffer start.
            if self.remaining_bytes > 0 && offset < Self::longest_newline() {
                let spillover = self.buffer[..self.last_newline].to_vec();
                self.fill_buffer(Some(spillover))?;
                continue;
            }

            let token_len = self.newline_at_cursor();

            // Found a newline, or reached byte 0 of the file with the
            // first line unterminated.
            if token_len > 0 || (self.remaining_bytes == 0 && offset == 0) {
                let start = if token_len == 0 { 0 } else { offset + 1 };
                let line = self
                    .encoding
                    .decode_without_bom_handling(&self.buffer[start..self.last_newline])
                    .0
                    .into_owned();
                // Step over the token; at least one byte so the top of the
                // file flips has_more_data to false.
                self.buffer_offset -= max(token_len, 1) as isize;
                self.last_newline = (self.buffer_offset + 1) as usize;
                return Ok(Some(line));
            }

            self.buffer_offset -= 1;
        }
        Ok(None)
    }

    /// Returns the length of the newline token ending at the cursor, or 0.
    fn newline_at_cursor(&self) -> usize {
        let end = self.buffer_offset as usize + 1;
        for token in NEWLINES {
            if end >= token.len() && &self.buffer[end - token.len()..end] == token {
                return token.len();
            }
        }
        0
    }

    /// Loads the next chunk of the file, working backward from the end of
    /// the unread portion, and appends `spillover` (the pending line bytes
    /// carried over from the previous buffer) after it.
    fn fill_buffer(&mut self, spillover: Option<Vec<u8>>) -> Result<(), ReadError> {
        let spill_len = spillover.as_ref().map_or(0, Vec::len);

        let (chunk_len, chunk_start) = if self.remaining_bytes > self.buffer_size as u64 {
            self.remaining_bytes -= self.buffer_size as u64;
            (self.buffer_size, self.remaining_bytes)
        } else {
            let rest = self.remaining_bytes as usize;
            self.remaining_bytes = 0;
            (rest, 0)
        };

        let mut new_buffer = vec![0u8; chunk_len + spill_len];
        self.file.seek(SeekFrom::Start(chunk_start))?;
        self.file
            .read_exact(&mut new_buffer[..chunk_len])
            .map_err(|err| match err.kind() {
                // The file shrank or became unreadable mid-scan.
                ErrorKind::UnexpectedEof => ReadError::IncompleteRead,
                _ => ReadError::Io(err),
            })?;

        self.buffer_offset = chunk_len as isize - 1;

        if let Some(spill) = spillover {
            new_buffer[chunk_len..].copy_from_slice(&spill);
            // Rescan the boundary in case the spillover starts with the
            // tail of a newline token.
            self.buffer_offset += min(spill.len(), Self::longest_newline()) as isize;
        }

        self.last_newline = new_buffer.len();
        self.buffer = new_buffer;
        Ok(())
    }

    fn longest_newline() -> usize {
        NEWLINES.iter().map(|token| token.len()).max().unwrap_or(0)
    }
}
