//! Background-corrected composition vectors.
//!
//! Each k-mer `i` gets `v[i] = (obs[i] - E[i]) / E[i]`, where `obs` is the
//! observed k-mer frequency and `E` the frequency predicted from shorter
//! oligomers. Only non-zero components are stored, sorted by index.

use bytemuck::{Pod, Zeroable};

use crate::radix::Radix;
use crate::signature::{Signature, SignatureError};

/// Expected frequencies at or below this are treated as zero.
pub const EPSILON: f64 = 1e-10;

/// Lower-order model that predicts k-mer frequencies.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Background {
    /// Mean of the two one-residue extensions of the flanking (k−1)-mers:
    /// `½·(F1(prefix)·F0(last) + F0(first)·F1(suffix))`.
    #[default]
    Blended = 0,
    /// Order-(k−2) Markov estimate: `F1(prefix)·F1(suffix) / F2(overlap)`.
    Markov = 1,
}

impl Background {
    pub(crate) fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Background::Blended),
            1 => Some(Background::Markov),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Background::Blended => "blended",
            Background::Markov => "markov",
        }
    }
}

/// One stored vector component.
#[repr(C)]
#[derive(Copy, Clone, Default, Pod, Zeroable, PartialEq, Debug)]
pub struct Component {
    /// k-mer index.
    pub index: u64,
    pub value: f64,
}

/// Composition vector of one genome: logically `M` reals, stored sparse.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositionVector {
    radix: Radix,
    background: Background,
    total_kmers: u64,
    components: Vec<Component>,
}

#[inline]
fn ratio(count: u64, total: f64) -> f64 {
    if total > EPSILON { count as f64 / total } else { 0.0 }
}

impl CompositionVector {
    /// Derive the vector from a frozen signature.
    pub fn build(sig: &Signature, background: Background) -> Self {
        let radix = sig.radix();
        let mut components = Vec::new();

        if sig.total_kmers() > 0 {
            let n_k = sig.total_kmers() as f64;
            let n1 = sig.total_kmer1() as f64;
            let f1: Vec<f64> = sig.kmer1_counts().iter().map(|&c| ratio(c, n1)).collect();

            match background {
                Background::Blended => {
                    let n0 = sig.total_residues() as f64;
                    let f0: Vec<f64> = sig.residue_counts().iter().map(|&c| ratio(c, n0)).collect();
                    for (i, &count) in sig.kmer_counts().iter().enumerate() {
                        let i = i as u64;
                        let e = 0.5
                            * (f1[radix.prefix(i) as usize] * f0[radix.last(i)]
                                + f0[radix.first(i)] * f1[radix.suffix(i) as usize]);
                        push_component(&mut components, i, count as f64 / n_k, e);
                    }
                }
                Background::Markov => {
                    let f2 = overlap_frequencies(sig);
                    for (i, &count) in sig.kmer_counts().iter().enumerate() {
                        let i = i as u64;
                        let fo = f2[radix.overlap(i) as usize];
                        let e = if fo > EPSILON {
                            f1[radix.prefix(i) as usize] * f1[radix.suffix(i) as usize] / fo
                        } else {
                            0.0
                        };
                        push_component(&mut components, i, count as f64 / n_k, e);
                    }
                }
            }
        }

        CompositionVector {
            radix,
            background,
            total_kmers: sig.total_kmers(),
            components,
        }
    }

    /// Reassemble a vector from stored components, validating order, range and finiteness.
    pub fn from_parts(
        radix: Radix,
        background: Background,
        total_kmers: u64,
        components: Vec<Component>,
    ) -> Result<Self, SignatureError> {
        let mut prev: Option<u64> = None;
        for c in &components {
            if c.index >= radix.m() {
                return Err(SignatureError::Format(format!(
                    "component index {} outside [0, {})",
                    c.index,
                    radix.m()
                )));
            }
            if prev.is_some_and(|p| p >= c.index) {
                return Err(SignatureError::Format("components not strictly sorted".into()));
            }
            if !c.value.is_finite() {
                return Err(SignatureError::Format(format!(
                    "non-finite component at index {}",
                    c.index
                )));
            }
            prev = Some(c.index);
        }
        Ok(CompositionVector {
            radix,
            background,
            total_kmers,
            components,
        })
    }

    #[inline]
    pub fn radix(&self) -> Radix {
        self.radix
    }
    #[inline]
    pub fn background(&self) -> Background {
        self.background
    }
    /// k-mer total of the source signature.
    #[inline]
    pub fn total_kmers(&self) -> u64 {
        self.total_kmers
    }
    /// Logical length `M`.
    #[inline]
    pub fn len(&self) -> u64 {
        self.radix.m()
    }
    /// True when every component is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
    /// Non-zero components, sorted by index.
    #[inline]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Component `index`; zero when not stored.
    pub fn get(&self, index: u64) -> f64 {
        match self.components.binary_search_by_key(&index, |c| c.index) {
            Ok(pos) => self.components[pos].value,
            Err(_) => 0.0,
        }
    }

    /// Expand to a dense `Vec` of length `M`.
    pub fn to_dense(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.radix.m() as usize];
        for c in &self.components {
            out[c.index as usize] = c.value;
        }
        out
    }
}

#[inline]
fn push_component(out: &mut Vec<Component>, index: u64, observed: f64, expected: f64) {
    if expected > EPSILON {
        let value = (observed - expected) / expected;
        if value != 0.0 {
            out.push(Component { index, value });
        }
    }
}

/// (k−2)-mer frequencies, marginalised from the (k−1)-mer table over its first residue.
fn overlap_frequencies(sig: &Signature) -> Vec<f64> {
    let m2 = sig.radix().m2() as usize;
    let mut counts = vec![0u64; m2];
    for chunk in sig.kmer1_counts().chunks_exact(m2) {
        for (slot, &c) in counts.iter_mut().zip(chunk) {
            *slot += c;
        }
    }
    let total = sig.total_kmer1() as f64;
    counts.iter().map(|&c| ratio(c, total)).collect()
}
