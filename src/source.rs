//! FASTA/FASTQ sequence source backed by `needletail`.
//!
//! Turns each record into one [`SequenceEvent::RecordStart`] carrying its first
//! `k-1` symbols followed by one [`SequenceEvent::Residue`] per remaining symbol.
//! Line breaks are stripped by the parser; headers never reach the accumulator.

use std::io::Read;
use std::path::Path;

use needletail::{FastxReader, parse_fastx_file, parse_fastx_reader};

use crate::signature::{SequenceEvent, SignatureError};

/// One parsed record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub id: String,
    pub seq: Vec<u8>,
}

fn parse_err<E: std::fmt::Display>(e: E) -> SignatureError {
    SignatureError::Parse(format!("{e}"))
}

/// Record stream over one genome file.
pub struct FastaSource {
    reader: Box<dyn FastxReader>,
    seed_len: usize,
}

impl FastaSource {
    /// Open a (possibly compressed) FASTA/FASTQ file for window length `k`.
    pub fn from_path(path: &Path, k: usize) -> Result<Self, SignatureError> {
        if !path.exists() {
            return Err(SignatureError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: no such file", path.display()),
            )));
        }
        let reader = parse_fastx_file(path).map_err(parse_err)?;
        Ok(Self::with_reader(reader, k))
    }

    /// Parse from any byte reader.
    pub fn from_reader<R: Read + Send + 'static>(reader: R, k: usize) -> Result<Self, SignatureError> {
        let reader = parse_fastx_reader(reader).map_err(parse_err)?;
        Ok(Self::with_reader(reader, k))
    }

    fn with_reader(reader: Box<dyn FastxReader>, k: usize) -> Self {
        FastaSource {
            reader,
            seed_len: k.saturating_sub(1),
        }
    }

    /// Next record, or `None` at end of input.
    pub fn next_record(&mut self) -> Option<Result<Record, SignatureError>> {
        let rec = self.reader.next()?;
        Some(rec.map_err(parse_err).map(|r| Record {
            id: String::from_utf8_lossy(r.id()).into_owned(),
            seq: r.seq().into_owned(),
        }))
    }

    /// Flatten the records into the residue event stream.
    pub fn events(self) -> Events {
        Events {
            source: self,
            current: Vec::new(),
            pos: 0,
            done: false,
        }
    }
}

impl Iterator for FastaSource {
    type Item = Result<Record, SignatureError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record()
    }
}

/// Event iterator produced by [`FastaSource::events`]. Stops after the first error.
pub struct Events {
    source: FastaSource,
    current: Vec<u8>,
    pos: usize,
    done: bool,
}

impl Iterator for Events {
    type Item = Result<SequenceEvent, SignatureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.pos < self.current.len() {
            let b = self.current[self.pos];
            self.pos += 1;
            return Some(Ok(SequenceEvent::Residue(b)));
        }
        match self.source.next_record() {
            None => {
                self.done = true;
                None
            }
            Some(Err(e)) => {
                self.done = true;
                Some(Err(e))
            }
            Some(Ok(rec)) => {
                self.current = rec.seq;
                self.pos = self.source.seed_len.min(self.current.len());
                Some(Ok(SequenceEvent::RecordStart(self.current[..self.pos].to_vec())))
            }
        }
    }
}
