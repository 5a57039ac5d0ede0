//! Fixed-radix window geometry and the O(1) rolling (k−1)/k-mer index.
//!
//! For window length `k` over the 20-letter alphabet:
//! `M2 = 20^(k-2)`, `M1 = 20^(k-1)`, `M = 20^k`.
//! A rolling index holds the trailing `k-1` residues; one [`Radix::extend`]
//! yields the k-mer ending at the new residue and the next rolling index.

use crate::encode::ALPHABET_SIZE;
use crate::signature::SignatureError;

/// Smallest supported window length.
pub const MIN_WINDOW: usize = 2;
/// Largest supported window length (`20^7` dense counters is already ~10 GiB).
pub const MAX_WINDOW: usize = 7;
/// Window length used by the CVTree protein method.
pub const DEFAULT_WINDOW: usize = 6;

/// Radix constants for one window length. Immutable once built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Radix {
    k: usize,
    m2: u64,
    m1: u64,
    m: u64,
}

impl Default for Radix {
    fn default() -> Self {
        Self::from_window(DEFAULT_WINDOW)
    }
}

impl Radix {
    /// Build the geometry for window length `k` (must be in `MIN_WINDOW..=MAX_WINDOW`).
    pub fn new(k: usize) -> Result<Self, SignatureError> {
        if !(MIN_WINDOW..=MAX_WINDOW).contains(&k) {
            return Err(SignatureError::InvalidWindow {
                k,
                min: MIN_WINDOW,
                max: MAX_WINDOW,
            });
        }
        Ok(Self::from_window(k))
    }

    const fn from_window(k: usize) -> Self {
        let m2 = ALPHABET_SIZE.pow((k - 2) as u32);
        let m1 = m2 * ALPHABET_SIZE;
        Radix {
            k,
            m2,
            m1,
            m: m1 * ALPHABET_SIZE,
        }
    }

    /// Window length `k`.
    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }
    /// `20^(k-2)`.
    #[inline]
    pub fn m2(&self) -> u64 {
        self.m2
    }
    /// Number of distinct (k−1)-mers.
    #[inline]
    pub fn m1(&self) -> u64 {
        self.m1
    }
    /// Number of distinct k-mers.
    #[inline]
    pub fn m(&self) -> u64 {
        self.m
    }

    /// Seed a rolling index from exactly `k-1` residue codes.
    pub fn reset(&self, window: &[u8]) -> Result<u64, SignatureError> {
        if window.len() != self.k - 1 {
            return Err(SignatureError::ShortWindow {
                got: window.len(),
                need: self.k - 1,
            });
        }
        let mut index = 0u64;
        for &code in window {
            if code as u64 >= ALPHABET_SIZE {
                return Err(SignatureError::InvalidCode(code));
            }
            index = index * ALPHABET_SIZE + code as u64;
        }
        Ok(index)
    }

    /// Append `code` to `rolling`: returns `(kmer_index, next_rolling)`.
    ///
    /// `rolling` must be in `[0, M1)` and `code` in `[0, 20)`.
    #[inline(always)]
    pub fn extend(&self, rolling: u64, code: u8) -> (u64, u64) {
        debug_assert!(rolling < self.m1);
        debug_assert!((code as u64) < ALPHABET_SIZE);
        let code = code as u64;
        let kmer = rolling * ALPHABET_SIZE + code;
        let next = (rolling % self.m2) * ALPHABET_SIZE + code;
        (kmer, next)
    }

    /// Leading (k−1)-mer of a k-mer.
    #[inline(always)]
    pub fn prefix(&self, kmer: u64) -> u64 {
        kmer / ALPHABET_SIZE
    }
    /// Trailing (k−1)-mer of a k-mer.
    #[inline(always)]
    pub fn suffix(&self, kmer: u64) -> u64 {
        kmer % self.m1
    }
    /// First residue code of a k-mer.
    #[inline(always)]
    pub fn first(&self, kmer: u64) -> usize {
        (kmer / self.m1) as usize
    }
    /// Last residue code of a k-mer.
    #[inline(always)]
    pub fn last(&self, kmer: u64) -> usize {
        (kmer % ALPHABET_SIZE) as usize
    }
    /// (k−2)-mer shared by the prefix and suffix of a k-mer.
    #[inline(always)]
    pub fn overlap(&self, kmer: u64) -> u64 {
        self.prefix(kmer) % self.m2
    }
}
