//! Pairwise comparison of composition vectors.
//!
//! Correlation is the cosine of the angle between two vectors,
//! `C = Σ aᵢbᵢ / sqrt(Σ aᵢ² · Σ bᵢ²)`, and the CVTree distance is
//! `D = (1 - C) / 2`, so `D ∈ [0, 1]` and `D(a, a) = 0`.

use rayon::prelude::*;
use tracing::debug;

use crate::composition::{Component, CompositionVector};
use crate::signature::SignatureError;

fn check_geometry(a: &CompositionVector, b: &CompositionVector) -> Result<(), SignatureError> {
    if a.radix() != b.radix() {
        return Err(SignatureError::GeometryMismatch {
            left: a.radix().k(),
            right: b.radix().k(),
        });
    }
    if a.background() != b.background() {
        return Err(SignatureError::BackgroundMismatch {
            left: a.background().name(),
            right: b.background().name(),
        });
    }
    Ok(())
}

/// Sorted sparse merge: `(Σ aᵢbᵢ, Σ aᵢ², Σ bᵢ²)`.
fn dot_and_norms(a: &[Component], b: &[Component]) -> (f64, f64, f64) {
    let (mut dot, mut len_a, mut len_b) = (0.0f64, 0.0f64, 0.0f64);
    let (mut i, mut j) = (0usize, 0usize);
    while i < a.len() && j < b.len() {
        let (ca, cb) = (a[i], b[j]);
        if ca.index < cb.index {
            len_a += ca.value * ca.value;
            i += 1;
        } else if cb.index < ca.index {
            len_b += cb.value * cb.value;
            j += 1;
        } else {
            len_a += ca.value * ca.value;
            len_b += cb.value * cb.value;
            dot += ca.value * cb.value;
            i += 1;
            j += 1;
        }
    }
    len_a += a[i..].iter().map(|c| c.value * c.value).sum::<f64>();
    len_b += b[j..].iter().map(|c| c.value * c.value).sum::<f64>();
    (dot, len_a, len_b)
}

fn correlation_unchecked(a: &CompositionVector, b: &CompositionVector) -> f64 {
    let (dot, len_a, len_b) = dot_and_norms(a.components(), b.components());
    if len_a == 0.0 || len_b == 0.0 {
        // zero vectors only correlate with each other
        return if len_a == len_b { 1.0 } else { 0.0 };
    }
    (dot / (len_a * len_b).sqrt()).clamp(-1.0, 1.0)
}

/// Cosine correlation of two vectors, in `[-1, 1]`.
pub fn correlation(a: &CompositionVector, b: &CompositionVector) -> Result<f64, SignatureError> {
    check_geometry(a, b)?;
    Ok(correlation_unchecked(a, b))
}

/// CVTree distance `(1 - C) / 2`.
pub fn distance(a: &CompositionVector, b: &CompositionVector) -> Result<f64, SignatureError> {
    check_geometry(a, b)?;
    Ok((1.0 - correlation_unchecked(a, b)) / 2.0)
}

/// Symmetric all-pairs distance table with a zero diagonal.
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceMatrix {
    n: usize,
    // upper triangle, row-major, i < j
    upper: Vec<f64>,
}

impl DistanceMatrix {
    /// Number of genomes.
    #[inline]
    pub fn len(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    #[inline]
    fn slot(&self, i: usize, j: usize) -> usize {
        // offset of row i in the condensed triangle, then column
        i * (2 * self.n - i - 1) / 2 + (j - i - 1)
    }

    /// Distance between genomes `i` and `j`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(i < self.n && j < self.n, "index out of range");
        match i.cmp(&j) {
            std::cmp::Ordering::Equal => 0.0,
            std::cmp::Ordering::Less => self.upper[self.slot(i, j)],
            std::cmp::Ordering::Greater => self.upper[self.slot(j, i)],
        }
    }

    /// Iterate `(i, j, distance)` over all pairs with `i < j`.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.n)
            .flat_map(move |i| ((i + 1)..self.n).map(move |j| (i, j)))
            .zip(self.upper.iter().copied())
            .map(|((i, j), d)| (i, j, d))
    }
}

/// Compare every pair of `vectors` in parallel.
///
/// All vectors must share one geometry and background; each pair writes its own slot.
pub fn distance_matrix(vectors: &[CompositionVector]) -> Result<DistanceMatrix, SignatureError> {
    if let Some(first) = vectors.first() {
        for v in &vectors[1..] {
            check_geometry(first, v)?;
        }
    }
    let n = vectors.len();
    let pairs: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .collect();
    debug!(genomes = n, pairs = pairs.len(), "comparing all pairs");

    let upper: Vec<f64> = pairs
        .par_iter()
        .map(|&(i, j)| (1.0 - correlation_unchecked(&vectors[i], &vectors[j])) / 2.0)
        .collect();

    Ok(DistanceMatrix { n, upper })
}
