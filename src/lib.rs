//! CVTree-style composition vectors for protein genomes.
//!
//! Pipeline:
//! - [`encode`]: 256-entry LUT from ASCII to the 20 amino-acid codes
//! - [`Radix`]: O(1) rolling (k−1)/k-mer index in base 20
//! - [`Accumulator`]: dense k-, (k−1)- and 1-mer counts per genome
//! - [`CompositionVector`]: background-corrected, sparse vector
//! - [`distance()`]: cosine correlation and the CVTree distance `(1 - C) / 2`
//!
//! Genomes are independent and build in parallel ([`build_vectors`]); pairs are
//! compared in parallel ([`distance_matrix`]). Vectors can be cached as `.cv`
//! files (see [`VectorWriter`]).

mod builder;
mod composition;
mod distance;
pub mod encode;
mod io;
mod radix;
mod signature;
mod source;

pub use builder::{
    BuildConfig, build_signature, build_signature_from_path, build_vector_from_path, build_vectors,
    source_fingerprint,
};
#[cfg(feature = "async")]
pub use builder::build_signature_async;
pub use composition::{Background, Component, CompositionVector, EPSILON};
pub use distance::{DistanceMatrix, correlation, distance, distance_matrix};
pub use encode::{ALPHABET, decode_kmer, encode_window, map_residue};
pub use io::{
    Provenance, VectorWriter, decode_stamped_vector, decode_vector, read_stamped_vector, read_vector,
    write_vector,
};
pub use radix::{DEFAULT_WINDOW, MAX_WINDOW, MIN_WINDOW, Radix};
pub use signature::{
    Accumulator, InvalidResidue, ScanReport, SequenceEvent, Signature, SignatureError,
};
pub use source::{Events, FastaSource, Record};
