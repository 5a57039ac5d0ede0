use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use cvtree_signature::*;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Compute CVTree composition-vector distances between protein genomes.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Genome FASTA files (ignored when --list is given)
    genomes: Vec<PathBuf>,

    /// Genome list: first line is the count, then one genome name per line
    #[arg(short, long)]
    list: Option<PathBuf>,

    /// Directory holding `<name>.faa` files named in --list
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// K-mer length (2..=7)
    #[arg(short = 'k', long, default_value_t = DEFAULT_WINDOW)]
    k: usize,

    /// Background model for the vector correction
    #[arg(long, value_enum, default_value_t = BackgroundArg::Blended)]
    background: BackgroundArg,

    /// What to do with symbols outside the amino-acid alphabet
    #[arg(long, value_enum, default_value_t = InvalidArg::Reseed)]
    invalid: InvalidArg,

    /// Skip records shorter than this many symbols
    #[arg(long, default_value_t = 0)]
    min_len: usize,

    /// Worker threads
    #[arg(long)]
    threads: Option<usize>,

    /// Directory for cached `.cv` vectors
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Output TSV path (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackgroundArg {
    Blended,
    Markov,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InvalidArg {
    Reseed,
    Elide,
    Reject,
}

impl From<BackgroundArg> for Background {
    fn from(b: BackgroundArg) -> Self {
        match b {
            BackgroundArg::Blended => Background::Blended,
            BackgroundArg::Markov => Background::Markov,
        }
    }
}

impl From<InvalidArg> for InvalidResidue {
    fn from(i: InvalidArg) -> Self {
        match i {
            InvalidArg::Reseed => InvalidResidue::Reseed,
            InvalidArg::Elide => InvalidResidue::Elide,
            InvalidArg::Reject => InvalidResidue::Reject,
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Parse a genome list: a count line, then names resolved as `<data_dir>/<name>.faa`.
fn read_genome_list(list: &Path, data_dir: &Path) -> Result<Vec<PathBuf>> {
    let reader = BufReader::new(
        File::open(list).with_context(|| format!("opening genome list {}", list.display()))?,
    );
    let mut lines = reader.lines();
    let count: usize = match lines.next() {
        Some(line) => line?
            .trim()
            .parse()
            .with_context(|| format!("{}: first line must be the genome count", list.display()))?,
        None => bail!("{}: empty genome list", list.display()),
    };

    let mut paths = Vec::with_capacity(count);
    for line in lines {
        let line = line?;
        let name = line.trim();
        if name.is_empty() {
            continue;
        }
        paths.push(data_dir.join(format!("{name}.faa")));
    }
    if paths.len() != count {
        warn!(
            declared = count,
            listed = paths.len(),
            "genome count does not match the list; using the listed names"
        );
    }
    Ok(paths)
}

fn genome_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let paths = match &args.list {
        Some(list) => read_genome_list(list, &args.data_dir)?,
        None => args.genomes.clone(),
    };
    if paths.len() < 2 {
        bail!("need at least two genomes to compare, got {}", paths.len());
    }

    let mut cfg = BuildConfig::default()
        .window(args.k)
        .background(args.background.into())
        .invalid_residues(args.invalid.into())
        .min_record_len(args.min_len);
    if let Some(n) = args.threads {
        cfg = cfg.threads(n);
    }
    if let Some(dir) = &args.cache_dir {
        cfg = cfg.cache_dir(dir);
    }

    let started = std::time::Instant::now();
    let results = build_vectors(&cfg, &paths)?;

    let mut names = Vec::with_capacity(paths.len());
    let mut vectors = Vec::with_capacity(paths.len());
    for (path, res) in paths.iter().zip(results) {
        match res {
            Ok(v) => {
                names.push(genome_name(path));
                vectors.push(v);
            }
            Err(e) => error!(path = %path.display(), "skipping genome: {e}"),
        }
    }
    info!(
        built = vectors.len(),
        requested = paths.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "vectors ready"
    );

    let matrix = distance_matrix(&vectors)?;

    let sink: Box<dyn Write> = match &args.output {
        Some(p) => Box::new(File::create(p).with_context(|| format!("creating {}", p.display()))?),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut out = BufWriter::new(sink);
    for (i, j, d) in matrix.pairs() {
        writeln!(out, "{i}\t{j}\t{}\t{}\t{d:.10}", names[i], names[j])?;
    }
    out.flush()?;

    info!(
        pairs = matrix.len() * matrix.len().saturating_sub(1) / 2,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "done"
    );
    Ok(())
}
