//! Builders: one genome from an event stream or a file, and whole batches with rayon.
//! Each genome is scanned sequentially; genomes run in parallel, isolated from one another.

use crate::composition::{Background, CompositionVector};
use crate::io::{Provenance, VectorWriter, read_stamped_vector};
use crate::radix::{DEFAULT_WINDOW, Radix};
use crate::signature::{Accumulator, InvalidResidue, ScanReport, SequenceEvent, SignatureError};
use crate::source::FastaSource;

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

/// Build-time configuration.
#[derive(Clone, Debug)]
pub struct BuildConfig {
    window: usize,
    invalid_residues: InvalidResidue,
    background: Background,
    threads: Option<usize>,
    cache_dir: Option<PathBuf>,
    min_record_len: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            invalid_residues: InvalidResidue::Reseed,
            background: Background::Blended,
            threads: None,
            cache_dir: None,
            min_record_len: 0,
        }
    }
}

impl BuildConfig {
    /// Set the k-mer length `k` (2..=7, default 6).
    pub fn window(mut self, k: usize) -> Self {
        self.window = k;
        self
    }
    /// Policy for symbols outside the alphabet (default: reseed).
    pub fn invalid_residues(mut self, policy: InvalidResidue) -> Self {
        self.invalid_residues = policy;
        self
    }
    /// Background model for vector correction (default: blended).
    pub fn background(mut self, bg: Background) -> Self {
        self.background = bg;
        self
    }
    /// Fix the number of rayon worker threads for batch builds.
    pub fn threads(mut self, n: usize) -> Self {
        self.threads = Some(n.max(1));
        self
    }
    /// Read and write `.cv` files in `dir` instead of rescanning genomes.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Refuse records shorter than `len` symbols. The effective floor is
    /// never below `k-1`, the length of one seed window.
    pub fn min_record_len(mut self, len: usize) -> Self {
        self.min_record_len = len;
        self
    }

    /// Validated radix geometry for the configured window.
    pub fn radix(&self) -> Result<Radix, SignatureError> {
        Radix::new(self.window)
    }
    /// Fresh accumulator carrying every counting setting.
    pub fn accumulator(&self) -> Result<Accumulator, SignatureError> {
        Ok(Accumulator::new(self.radix()?, self.invalid_residues).with_min_record_len(self.min_record_len))
    }
    pub fn invalid_policy(&self) -> InvalidResidue {
        self.invalid_residues
    }
    pub fn background_model(&self) -> Background {
        self.background
    }
    pub fn shortest_record(&self) -> usize {
        self.min_record_len
    }

    /// Cache file for `genome` under this configuration, if caching is on.
    ///
    /// The name carries every counting setting plus a hash of the canonical
    /// genome path, so same-named genomes in different directories never share
    /// an entry. `None` when caching is off or the genome cannot be resolved.
    pub fn cache_path(&self, genome: &Path) -> Option<PathBuf> {
        let dir = self.cache_dir.as_ref()?;
        let canonical = genome.canonicalize().ok()?;
        let stem = canonical.file_stem()?.to_string_lossy();
        let key = xxh3_64(canonical.as_os_str().as_encoded_bytes());
        Some(dir.join(format!(
            "{stem}-{key:016x}.k{}.{}.{}.m{}.cv",
            self.window,
            self.background.name(),
            self.invalid_residues.name(),
            self.min_record_len,
        )))
    }

    /// Provenance stamped into cache files for `genome`.
    pub fn provenance(&self, genome: &Path) -> Result<Provenance, SignatureError> {
        Ok(Provenance {
            invalid_residues: self.invalid_residues,
            min_record_len: self.min_record_len as u64,
            source: source_fingerprint(genome)?,
        })
    }
}

/// Hash of a genome file's canonical path, size and modification time.
pub fn source_fingerprint(path: &Path) -> Result<u64, SignatureError> {
    let canonical = path.canonicalize()?;
    let meta = std::fs::metadata(&canonical)?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_nanos() as u64);
    let mut key = canonical.as_os_str().as_encoded_bytes().to_vec();
    key.extend_from_slice(&meta.len().to_le_bytes());
    key.extend_from_slice(&mtime.to_le_bytes());
    Ok(xxh3_64(&key))
}

/// Helper: map any error to `std::io::Error` with kind=Other.
fn io_other<E: std::fmt::Display>(e: E) -> std::io::Error {
    std::io::Error::other(format!("{e}"))
}

fn note_record_error(errors: &mut Vec<SignatureError>, e: SignatureError) {
    warn!("{e}");
    errors.push(e);
}

/// One streamed record held back until its length is known.
struct PendingRecord {
    seq: Vec<u8>,
    seed_len: usize,
}

impl PendingRecord {
    fn new(seed: Vec<u8>) -> Self {
        let seed_len = seed.len();
        PendingRecord { seq: seed, seed_len }
    }

    fn flush(self, acc: &mut Accumulator, errors: &mut Vec<SignatureError>) {
        if self.seed_len >= acc.radix().k() - 1 {
            if let Err(e) = acc.push_record(&self.seq) {
                note_record_error(errors, e);
            }
            return;
        }
        // a short seed fails on its own, like the unbuffered stream
        let (seed, rest) = self.seq.split_at(self.seed_len);
        if let Err(e) = acc.start_record(seed) {
            note_record_error(errors, e);
        }
        for &b in rest {
            if let Err(e) = acc.push_residue(b) {
                note_record_error(errors, e);
            }
        }
    }
}

/// Scan one genome's event stream into a signature.
///
/// Per-record problems are collected in [`ScanReport::record_errors`]; an `Err`
/// item from the stream aborts the genome. With a minimum record length above
/// `k-1`, each record is buffered until the next record start so its length can
/// be checked before anything is counted.
pub fn build_signature<I>(cfg: &BuildConfig, events: I) -> Result<ScanReport, SignatureError>
where
    I: IntoIterator<Item = Result<SequenceEvent, SignatureError>>,
{
    let mut acc = cfg.accumulator()?;
    let mut record_errors = Vec::new();
    if acc.min_record_len() < acc.radix().k() {
        for event in events {
            if let Err(e) = acc.apply(event?) {
                note_record_error(&mut record_errors, e);
            }
        }
    } else {
        let mut pending: Option<PendingRecord> = None;
        for event in events {
            match event? {
                SequenceEvent::RecordStart(seed) => {
                    if let Some(rec) = pending.replace(PendingRecord::new(seed)) {
                        rec.flush(&mut acc, &mut record_errors);
                    }
                }
                SequenceEvent::Residue(b) => match pending.as_mut() {
                    Some(rec) => rec.seq.push(b),
                    None => {
                        if let Err(e) = acc.push_residue(b) {
                            note_record_error(&mut record_errors, e);
                        }
                    }
                },
            }
        }
        if let Some(rec) = pending {
            rec.flush(&mut acc, &mut record_errors);
        }
    }
    Ok(ScanReport {
        signature: acc.finish(),
        record_errors,
    })
}

/// Scan one FASTA/FASTQ file into a signature.
pub fn build_signature_from_path(cfg: &BuildConfig, path: &Path) -> Result<ScanReport, SignatureError> {
    let mut acc = cfg.accumulator()?;
    let mut source = FastaSource::from_path(path, acc.radix().k())?;
    let mut record_errors = Vec::new();
    while let Some(rec) = source.next_record() {
        let rec = rec?;
        if let Err(e) = acc.push_record(&rec.seq) {
            debug!(record = %rec.id, path = %path.display(), "record not counted");
            note_record_error(&mut record_errors, e);
        }
    }
    Ok(ScanReport {
        signature: acc.finish(),
        record_errors,
    })
}

/// Composition vector of one genome file, through the cache when configured.
///
/// A cache entry is used only when its geometry, background and
/// [`Provenance`] (settings plus source fingerprint) all match; anything else
/// is rebuilt and overwritten.
pub fn build_vector_from_path(cfg: &BuildConfig, path: &Path) -> Result<CompositionVector, SignatureError> {
    let cache = match cfg.cache_path(path) {
        Some(p) => Some((p, cfg.provenance(path)?)),
        None => None,
    };
    if let Some((cached, stamp)) = cache.as_ref().filter(|(p, _)| p.exists()) {
        match read_stamped_vector(cached) {
            Ok((v, p))
                if v.radix().k() == cfg.window && v.background() == cfg.background && p == *stamp =>
            {
                debug!(path = %cached.display(), "vector cache hit");
                return Ok(v);
            }
            Ok(_) => warn!(path = %cached.display(), "cached vector is stale; rebuilding"),
            Err(e) => warn!(path = %cached.display(), "unreadable cached vector ({e}); rebuilding"),
        }
    }

    let report = build_signature_from_path(cfg, path)?;
    let vector = CompositionVector::build(&report.signature, cfg.background);
    drop(report);

    if let Some((cached, stamp)) = cache {
        if let Err(e) = store_vector(&vector, stamp, &cached) {
            warn!(path = %cached.display(), "could not write vector cache: {e}");
        }
    }
    Ok(vector)
}

fn store_vector(vector: &CompositionVector, stamp: Provenance, path: &Path) -> Result<(), SignatureError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    VectorWriter::new(vector).provenance(stamp).write_to(path)
}

/// Build vectors for many genomes in parallel. Results keep input order;
/// each genome succeeds or fails on its own.
pub fn build_vectors<P>(
    cfg: &BuildConfig,
    paths: &[P],
) -> Result<Vec<Result<CompositionVector, SignatureError>>, SignatureError>
where
    P: AsRef<Path> + Sync,
{
    cfg.radix()?;
    if let Some(dir) = &cfg.cache_dir {
        std::fs::create_dir_all(dir)?;
    }

    let run = || {
        paths
            .par_iter()
            .map(|p| {
                let p = p.as_ref();
                let res = build_vector_from_path(cfg, p);
                match &res {
                    Ok(v) => info!(path = %p.display(), components = v.components().len(), "genome done"),
                    Err(e) => warn!(path = %p.display(), "genome failed: {e}"),
                }
                res
            })
            .collect::<Vec<_>>()
    };

    match cfg.threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(io_other)?;
            Ok(pool.install(run))
        }
        None => Ok(run()),
    }
}

/// Scan one genome file on tokio: read asynchronously, count on the blocking pool.
#[cfg(feature = "async")]
pub async fn build_signature_async(cfg: &BuildConfig, path: &Path) -> Result<ScanReport, SignatureError> {
    let bytes = tokio::fs::read(path).await?;
    let cfg = cfg.clone();
    tokio::task::spawn_blocking(move || {
        let source = FastaSource::from_reader(std::io::Cursor::new(bytes), cfg.window)?;
        build_signature(&cfg, source.events())
    })
    .await
    .map_err(io_other)?
}
