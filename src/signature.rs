//! Genome signature: dense multi-order count tables and the accumulator that fills them.
//!
//! One [`Accumulator`] scans one genome as a stream of record starts and residues.
//! [`Accumulator::finish`] freezes the counts into an immutable [`Signature`].

use thiserror::Error;
use tracing::debug;

use crate::encode::{ALPHABET_SIZE, map_residue};
use crate::radix::Radix;

#[derive(Debug, Error)]
/// Errors returned while building or comparing signatures.
pub enum SignatureError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Sequence file could not be parsed.
    #[error("sequence parse error: {0}")]
    Parse(String),
    /// Unsupported window length.
    #[error("window length {k} outside supported range {min}..={max}")]
    InvalidWindow { k: usize, min: usize, max: usize },
    /// A rolling index was seeded with the wrong number of residues.
    #[error("seed window holds {got} residues, expected {need}")]
    ShortWindow { got: usize, need: usize },
    /// A residue code outside the alphabet reached the rolling index.
    #[error("residue code {0} outside alphabet")]
    InvalidCode(u8),
    /// A record had fewer residues than one (k−1)-mer.
    #[error("record {record}: {len} residues, need at least {need} to seed a window")]
    RecordTooShort { record: u64, len: usize, need: usize },
    /// A record was rejected because it contains an unusable symbol.
    #[error("record {record}: invalid residue symbol {symbol:#04x}")]
    InvalidResidue { record: u64, symbol: u8 },
    /// Two vectors built with different window lengths were compared.
    #[error("geometry mismatch: k={left} vs k={right}")]
    GeometryMismatch { left: usize, right: usize },
    /// Two vectors corrected against different background models were compared.
    #[error("background mismatch: {left} vs {right}")]
    BackgroundMismatch { left: &'static str, right: &'static str },
    /// Invalid `.cv` file.
    #[error("invalid vector file: {0}")]
    Format(String),
}

/// How the accumulator treats a symbol the encoder rejects.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InvalidResidue {
    /// Drop the symbol and discard the window; counting resumes once `k-1`
    /// fresh valid residues have refilled it.
    #[default]
    Reseed = 0,
    /// Drop the symbol as if it were absent; the window spans the gap.
    Elide = 1,
    /// Reject the whole record; none of its residues are counted.
    Reject = 2,
}

impl InvalidResidue {
    pub(crate) fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(InvalidResidue::Reseed),
            1 => Some(InvalidResidue::Elide),
            2 => Some(InvalidResidue::Reject),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InvalidResidue::Reseed => "reseed",
            InvalidResidue::Elide => "elide",
            InvalidResidue::Reject => "reject",
        }
    }
}

/// One event of a genome's residue stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SequenceEvent {
    /// A new record begins; carries its first `k-1` symbols.
    RecordStart(Vec<u8>),
    /// Next symbol of the current record.
    Residue(u8),
}

/// Frozen count tables for one genome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    radix: Radix,
    kmer_counts: Vec<u64>,
    kmer1_counts: Vec<u64>,
    residue_counts: [u64; ALPHABET_SIZE as usize],
    rolling_index: u64,
    total_kmers: u64,
    total_kmer1: u64,
    total_residues: u64,
    record_count: u64,
    rejected_records: u64,
    invalid_residues: u64,
}

/// Trailing window state: the rolling (k−1)-mer index and how many residues it holds.
#[derive(Clone, Copy, Debug, Default)]
struct Window {
    rolling: u64,
    fill: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Tally {
    Add,
    Sub,
}

#[inline(always)]
fn bump(slot: &mut u64, tally: Tally) {
    match tally {
        Tally::Add => *slot += 1,
        Tally::Sub => *slot -= 1,
    }
}

impl Signature {
    /// Empty tables sized for `radix`.
    pub fn new(radix: Radix) -> Self {
        Signature {
            radix,
            kmer_counts: vec![0; radix.m() as usize],
            kmer1_counts: vec![0; radix.m1() as usize],
            residue_counts: [0; ALPHABET_SIZE as usize],
            rolling_index: 0,
            total_kmers: 0,
            total_kmer1: 0,
            total_residues: 0,
            record_count: 0,
            rejected_records: 0,
            invalid_residues: 0,
        }
    }

    #[inline]
    pub fn radix(&self) -> Radix {
        self.radix
    }
    /// Dense k-mer counts, indexed by base-20 k-mer index.
    #[inline]
    pub fn kmer_counts(&self) -> &[u64] {
        &self.kmer_counts
    }
    /// Dense (k−1)-mer counts.
    #[inline]
    pub fn kmer1_counts(&self) -> &[u64] {
        &self.kmer1_counts
    }
    #[inline]
    pub fn residue_counts(&self) -> &[u64; ALPHABET_SIZE as usize] {
        &self.residue_counts
    }
    /// Rolling (k−1)-mer index at the end of the stream.
    #[inline]
    pub fn rolling_index(&self) -> u64 {
        self.rolling_index
    }
    #[inline]
    pub fn total_kmers(&self) -> u64 {
        self.total_kmers
    }
    /// Sum of [`Signature::kmer1_counts`].
    #[inline]
    pub fn total_kmer1(&self) -> u64 {
        self.total_kmer1
    }
    #[inline]
    pub fn total_residues(&self) -> u64 {
        self.total_residues
    }
    /// Records that contributed to the counts.
    #[inline]
    pub fn record_count(&self) -> u64 {
        self.record_count
    }
    /// Records that contributed nothing (too short or rejected).
    #[inline]
    pub fn rejected_records(&self) -> u64 {
        self.rejected_records
    }
    /// Symbols fed in that were not counted as residues.
    #[inline]
    pub fn invalid_residues(&self) -> u64 {
        self.invalid_residues
    }

    /// Count one valid residue code and advance `window`.
    fn tally(&mut self, window: &mut Window, code: u8, tally: Tally) {
        bump(&mut self.residue_counts[code as usize], tally);
        bump(&mut self.total_residues, tally);

        let seed_len = self.radix.k() - 1;
        if window.fill < seed_len {
            window.rolling = window.rolling * ALPHABET_SIZE + code as u64;
            window.fill += 1;
            if window.fill == seed_len {
                bump(&mut self.kmer1_counts[window.rolling as usize], tally);
                bump(&mut self.total_kmer1, tally);
            }
            return;
        }

        let (kmer, next) = self.radix.extend(window.rolling, code);
        bump(&mut self.kmer_counts[kmer as usize], tally);
        bump(&mut self.total_kmers, tally);
        window.rolling = next;
        bump(&mut self.kmer1_counts[next as usize], tally);
        bump(&mut self.total_kmer1, tally);
    }

    /// Count a full, valid seed window through [`Radix::reset`].
    fn seed(&mut self, window: &mut Window, codes: &[u8]) -> Result<(), SignatureError> {
        window.rolling = self.radix.reset(codes)?;
        window.fill = codes.len();
        for &code in codes {
            self.residue_counts[code as usize] += 1;
        }
        self.total_residues += codes.len() as u64;
        self.kmer1_counts[window.rolling as usize] += 1;
        self.total_kmer1 += 1;
        Ok(())
    }
}

/// Streaming builder for one genome's [`Signature`].
pub struct Accumulator {
    sig: Signature,
    policy: InvalidResidue,
    window: Window,
    // a record is open and accepting residues
    open: bool,
    records_seen: u64,
    // codes counted for the open record, kept only under `InvalidResidue::Reject`
    journal: Vec<u8>,
    seed_buf: Vec<u8>,
    min_record_len: usize,
}

impl Accumulator {
    pub fn new(radix: Radix, policy: InvalidResidue) -> Self {
        Accumulator {
            sig: Signature::new(radix),
            policy,
            window: Window::default(),
            open: false,
            records_seen: 0,
            journal: Vec::new(),
            seed_buf: Vec::with_capacity(radix.k()),
            min_record_len: 0,
        }
    }

    /// Refuse whole records shorter than `len` symbols in [`Accumulator::push_record`].
    ///
    /// A streamed record only reveals its length at the next record start, so
    /// [`Accumulator::start_record`] enforces just the `k-1` seed minimum.
    pub fn with_min_record_len(mut self, len: usize) -> Self {
        self.min_record_len = len;
        self
    }

    /// Shortest record [`Accumulator::push_record`] will count.
    #[inline]
    pub fn min_record_len(&self) -> usize {
        self.min_record_len.max(self.sig.radix.k() - 1)
    }

    #[inline]
    pub fn radix(&self) -> Radix {
        self.sig.radix
    }

    #[inline]
    pub fn policy(&self) -> InvalidResidue {
        self.policy
    }

    /// Counts accumulated so far.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.sig
    }

    /// Begin a new record seeded by its first `k-1` symbols.
    ///
    /// Symbols beyond `k-1` are treated as residues of the new record. A seed
    /// with fewer than `k-1` symbols fails with [`SignatureError::RecordTooShort`];
    /// residues are then ignored until the next record start.
    pub fn start_record(&mut self, seed: &[u8]) -> Result<(), SignatureError> {
        let record = self.begin();
        let need = self.sig.radix.k() - 1;
        if seed.len() < need {
            return Err(self.refuse_short(record, seed.len(), need));
        }

        self.open = true;
        self.sig.record_count += 1;
        let (head, rest) = seed.split_at(need);

        self.seed_buf.clear();
        self.seed_buf.extend(head.iter().map_while(|&b| map_residue(b)));
        if self.seed_buf.len() == need {
            self.sig.seed(&mut self.window, &self.seed_buf)?;
            if self.policy == InvalidResidue::Reject {
                self.journal.extend_from_slice(&self.seed_buf);
            }
            self.feed(rest)
        } else {
            let head = self.feed(head);
            let rest = self.feed(rest);
            head.and(rest)
        }
    }

    /// Close whatever record is open and number the next one.
    fn begin(&mut self) -> u64 {
        let record = self.records_seen;
        self.records_seen += 1;
        self.open = false;
        self.window = Window::default();
        self.journal.clear();
        record
    }

    fn refuse_short(&mut self, record: u64, len: usize, need: usize) -> SignatureError {
        self.sig.rejected_records += 1;
        self.sig.invalid_residues += len as u64;
        SignatureError::RecordTooShort { record, len, need }
    }

    /// Push every symbol, reporting the first failure. Symbols after a
    /// rejection still reach the closed record and are counted as invalid.
    fn feed(&mut self, symbols: &[u8]) -> Result<(), SignatureError> {
        let mut first = Ok(());
        for &b in symbols {
            let res = self.push_residue(b);
            if first.is_ok() {
                first = res;
            }
        }
        first
    }

    /// Feed the next symbol of the open record.
    ///
    /// Only fails under [`InvalidResidue::Reject`], when the symbol is invalid.
    pub fn push_residue(&mut self, symbol: u8) -> Result<(), SignatureError> {
        if !self.open {
            self.sig.invalid_residues += 1;
            return Ok(());
        }
        match map_residue(symbol) {
            Some(code) => {
                self.sig.tally(&mut self.window, code, Tally::Add);
                if self.policy == InvalidResidue::Reject {
                    self.journal.push(code);
                }
                Ok(())
            }
            None => {
                self.sig.invalid_residues += 1;
                match self.policy {
                    InvalidResidue::Reseed => {
                        self.window = Window::default();
                        Ok(())
                    }
                    InvalidResidue::Elide => Ok(()),
                    InvalidResidue::Reject => {
                        self.rollback();
                        Err(SignatureError::InvalidResidue {
                            record: self.records_seen - 1,
                            symbol,
                        })
                    }
                }
            }
        }
    }

    /// Feed a whole record: its first `k-1` symbols as the seed, the rest as residues.
    ///
    /// Records shorter than [`Accumulator::min_record_len`] are refused with
    /// [`SignatureError::RecordTooShort`]. The whole record is always consumed,
    /// so it leaves the same counts as the equivalent event stream.
    pub fn push_record(&mut self, seq: &[u8]) -> Result<(), SignatureError> {
        let need = self.min_record_len();
        if seq.len() < need {
            let record = self.begin();
            return Err(self.refuse_short(record, seq.len(), need));
        }
        let (seed, rest) = seq.split_at(self.sig.radix.k() - 1);
        let started = self.start_record(seed);
        let fed = self.feed(rest);
        started.and(fed)
    }

    /// Dispatch one stream event.
    pub fn apply(&mut self, event: SequenceEvent) -> Result<(), SignatureError> {
        match event {
            SequenceEvent::RecordStart(seed) => self.start_record(&seed),
            SequenceEvent::Residue(b) => self.push_residue(b),
        }
    }

    /// Undo every count of the open record and close it.
    fn rollback(&mut self) {
        let journal = std::mem::take(&mut self.journal);
        let mut window = Window::default();
        for &code in &journal {
            self.sig.tally(&mut window, code, Tally::Sub);
        }
        self.sig.invalid_residues += journal.len() as u64;
        self.sig.record_count -= 1;
        self.sig.rejected_records += 1;
        self.open = false;
        self.window = Window::default();
        self.journal = journal;
        self.journal.clear();
    }

    /// Freeze the counts.
    pub fn finish(mut self) -> Signature {
        self.sig.rolling_index = self.window.rolling;
        debug!(
            k = self.sig.radix.k(),
            records = self.sig.record_count,
            rejected = self.sig.rejected_records,
            residues = self.sig.total_residues,
            kmers = self.sig.total_kmers,
            invalid = self.sig.invalid_residues,
            "signature frozen"
        );
        self.sig
    }
}

/// A frozen signature plus the per-record errors met while scanning.
#[derive(Debug)]
pub struct ScanReport {
    pub signature: Signature,
    pub record_errors: Vec<SignatureError>,
}
