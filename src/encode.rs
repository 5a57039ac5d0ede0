//! Residue encoding: ASCII → dense amino-acid code, window encoding and decoding.
//!
//! Conventions
//! - Codes follow [`ALPHABET`] order, `A=0 .. Y=19`.
//! - Ambiguity letters fold onto a concrete residue: `B→D`, `U→C`, `X→G`, `Z→E`.
//! - `J`, `O` and every non-letter byte are invalid.
//! - Window codes are **most significant residue first** (base-20 positional).

/// Number of valid residue codes.
pub const ALPHABET_SIZE: u64 = 20;

/// Residue letters in code order.
pub const ALPHABET: &[u8; 20] = b"ACDEFGHIKLMNPQRSTVWY";

/// Marker stored in [`RESIDUE_LUT`] for invalid bytes.
pub const INVALID: u8 = 0xFF;

/// 256-entry LUT: ASCII → residue code, [`INVALID`] otherwise.
pub static RESIDUE_LUT: [u8; 256] = {
    const X: u8 = INVALID;
    // A  B  C  D  E  F  G  H  I  J  K  L   M   N   O  P   Q   R   S   T   U  V   W   X  Y   Z
    const UPPER: [u8; 26] = [
        0, 2, 1, 2, 3, 4, 5, 6, 7, X, 8, 9, 10, 11, X, 12, 13, 14, 15, 16, 1, 17, 18, 5, 19, 3,
    ];
    let mut t = [X; 256];
    let mut i = 0;
    while i < 26 {
        t[b'A' as usize + i] = UPPER[i];
        t[b'a' as usize + i] = UPPER[i];
        i += 1;
    }
    t
};

/// Residue code via LUT. `None` if the byte is not a usable residue.
#[inline]
pub fn map_residue(b: u8) -> Option<u8> {
    let v = RESIDUE_LUT[b as usize];
    if v != INVALID { Some(v) } else { None }
}

/// Encode a whole window as a base-20 index. `None` if any symbol is invalid,
/// the window is empty, or it is too long to fit a `u64` (more than 14 residues).
#[inline]
pub fn encode_window(window: &[u8]) -> Option<u64> {
    if window.is_empty() || window.len() > 14 {
        return None;
    }
    let mut code: u64 = 0;
    for &b in window {
        code = code * ALPHABET_SIZE + map_residue(b)? as u64;
    }
    Some(code)
}

/// Inverse of [`encode_window`] for a window of length `k`.
pub fn decode_kmer(mut index: u64, k: usize) -> Vec<u8> {
    let mut out = vec![0u8; k];
    for slot in out.iter_mut().rev() {
        *slot = ALPHABET[(index % ALPHABET_SIZE) as usize];
        index /= ALPHABET_SIZE;
    }
    out
}
