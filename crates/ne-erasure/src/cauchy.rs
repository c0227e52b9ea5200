//! Cauchy matrix construction for the systematic Reed-Solomon encode matrix
//! over `GF(2^8)`.
//!
//! The encode matrix is `(N+E) x N`: the top `N` rows are the identity (so the
//! first `N` output parts are the original data, unmodified — "systematic"), and
//! the bottom `E` rows are a Cauchy matrix built from two disjoint sets of
//! distinct `GF(2^8)` elements. Any square submatrix of a Cauchy matrix is
//! invertible, and that property survives mixing in identity rows, which is what
//! makes this construction MDS: any `N` of the `N+E` output rows can reconstruct
//! all `N` original parts.

use crate::gf256;
use crate::matrix::Matrix;

/// Builds the `(N+E) x N` systematic Cauchy encode matrix for a pattern with `n`
/// data parts and `e` parity parts.
///
/// `n + e` must be at most 256 (an order of magnitude beyond `MAXPARTS`, so this
/// never fails in practice for any pattern [`ne_common::ErasurePattern`] accepts).
#[must_use]
pub fn build_encode_matrix(n: usize, e: usize) -> Matrix {
    assert!(n + e <= 256, "GF(2^8) cannot support more than 256 total parts");
    let mut m = Matrix::zeros(n + e, n);

    for i in 0..n {
        m.set(i, i, 1);
    }

    // Y[c] = c, X[r] = n + r: disjoint, distinct, non-overlapping ranges, so
    // X[r] ^ Y[c] is never zero and every Cauchy entry is well-defined.
    for r in 0..e {
        let x = (n + r) as u8;
        for c in 0..n {
            let y = c as u8;
            let denom = gf256::add(x, y);
            m.set(n + r, c, gf256::inv(denom));
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;

    #[test]
    fn top_rows_are_identity() {
        let m = build_encode_matrix(4, 2);
        for r in 0..4 {
            for c in 0..4 {
                assert_eq!(m.get(r, c), u8::from(r == c));
            }
        }
    }

    #[test]
    fn every_n_row_subset_is_invertible() {
        // Exhaustively check every N-row combination for a modestly sized pattern.
        let (n, e) = (4usize, 3usize);
        let m = build_encode_matrix(n, e);
        let total = n + e;
        let mut combo = vec![0usize; n];
        fn combinations(total: usize, k: usize) -> Vec<Vec<usize>> {
            let mut out = Vec::new();
            let mut current = Vec::new();
            fn rec(start: usize, total: usize, k: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
                if current.len() == k {
                    out.push(current.clone());
                    return;
                }
                for i in start..total {
                    current.push(i);
                    rec(i + 1, total, k, current, out);
                    current.pop();
                }
            }
            rec(0, total, k, &mut current, &mut out);
            out
        }
        for rows in combinations(total, n) {
            combo.copy_from_slice(&rows);
            let sub = m.select_rows(&combo);
            assert!(sub.invert().is_ok(), "rows {combo:?} should be invertible");
        }
        let _ = Matrix::identity(1); // silence unused import in case of refactor
    }
}
