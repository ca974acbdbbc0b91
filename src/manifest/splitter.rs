//! Multi-document YAML splitting
//!
//! The payload is read in fixed-size chunks through `BoundaryReader`, which
//! returns a short read at every `---` separator line. Bytes are accumulated
//! per document index, so a document may span any number of chunks.

use super::error::ManifestError;
use std::io::{self, BufRead, BufReader, Read};

/// Size of each read into the document buffer
pub const CHUNK_SIZE: usize = 4096;

/// Result of one read from a `BoundaryReader`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    /// `n` bytes of the current document were written to the buffer
    Data(usize),
    /// The current document ended; the next read starts a new one
    Boundary,
    /// The stream is exhausted
    End,
}

/// Reader that stops at YAML document separators
pub struct BoundaryReader<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
    offset: usize,
    carry: Option<Vec<u8>>,
    at_boundary: bool,
    eof: bool,
}

impl<R: Read> BoundaryReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: Vec::new(),
            offset: 0,
            carry: None,
            at_boundary: false,
            eof: false,
        }
    }

    /// Read the next piece of the current document into `buf`
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<Chunk> {
        loop {
            if self.offset < self.line.len() {
                let n = buf.len().min(self.line.len() - self.offset);
                buf[..n].copy_from_slice(&self.line[self.offset..self.offset + n]);
                self.offset += n;
                return Ok(Chunk::Data(n));
            }
            if self.at_boundary {
                self.at_boundary = false;
                return Ok(Chunk::Boundary);
            }
            if self.eof {
                return Ok(Chunk::End);
            }
            self.fill_line()?;
        }
    }

    fn fill_line(&mut self) -> io::Result<()> {
        self.line.clear();
        self.offset = 0;

        if let Some(carry) = self.carry.take() {
            self.line = carry;
            return Ok(());
        }

        if self.reader.read_until(b'\n', &mut self.line)? == 0 {
            self.eof = true;
            return Ok(());
        }

        if let Some(rest) = separator_remainder(&self.line) {
            self.at_boundary = true;
            if !rest.is_empty() {
                self.carry = Some(rest);
            }
            self.line.clear();
        }
        Ok(())
    }
}

/// If `line` is a document separator, return whatever follows the marker
///
/// A trailing comment on the separator line is dropped.
fn separator_remainder(line: &[u8]) -> Option<Vec<u8>> {
    let rest = line.strip_prefix(b"---")?;
    let content = trim_ascii_end(rest);

    if content.is_empty() {
        return Some(Vec::new());
    }
    if !matches!(rest.first(), Some(b' ') | Some(b'\t')) {
        return None;
    }

    let content = trim_ascii_start(content);
    if content.starts_with(b"#") {
        return Some(Vec::new());
    }
    let mut carried = content.to_vec();
    carried.push(b'\n');
    Some(carried)
}

fn trim_ascii_end(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

fn trim_ascii_start(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

/// Split a byte stream into its YAML documents, in order
///
/// Separator lines are not part of any document and trailing NUL padding is
/// trimmed. Empty documents (stray separators, an empty payload) are kept in
/// place; use [`is_blank`] to filter them.
pub fn split_documents<R: Read>(reader: R) -> Result<Vec<String>, ManifestError> {
    let mut decoder = BoundaryReader::new(reader);
    let mut buffers: Vec<Vec<u8>> = vec![Vec::new()];
    let mut chunk = [0u8; CHUNK_SIZE];

    loop {
        let read = decoder
            .read_chunk(&mut chunk)
            .map_err(|e| ManifestError::Decode(e.to_string()))?;
        match read {
            Chunk::Data(n) => {
                if let Some(current) = buffers.last_mut() {
                    current.extend_from_slice(&chunk[..n]);
                }
            }
            Chunk::Boundary => buffers.push(Vec::new()),
            Chunk::End => break,
        }
    }

    buffers
        .into_iter()
        .enumerate()
        .map(|(index, bytes)| {
            let text = String::from_utf8(bytes).map_err(|e| {
                ManifestError::Decode(format!("document {} is not valid UTF-8: {}", index, e))
            })?;
            Ok(text.trim_end_matches('\0').to_string())
        })
        .collect()
}

/// Convenience wrapper for an in-memory payload
pub fn split_manifest(payload: &[u8]) -> Result<Vec<String>, ManifestError> {
    split_documents(payload)
}

/// True if the document holds nothing but whitespace and comments
pub fn is_blank(document: &str) -> bool {
    document.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#') || line == "..."
    })
}

#[cfg(test)]
#[path = "splitter_test.rs"]
mod tests;
