//! Decode matrix derivation: given the systematic encode matrix and a set of
//! surviving part indices, build the coefficient matrix that reconstructs the
//! erased parts directly from `N` surviving parts, by taking the encode
//! matrix rows for the surviving parts, inverting, and re-indexing.

use crate::matrix::Matrix;
use crate::ErasureError;

/// Builds the `(erased.len() x N)` decode matrix mapping the first `N` of
/// `survivors` (in the order given) to the parts listed in `erased`.
///
/// `survivors` must contain at least `N` indices, all distinct and within
/// `0..encode.rows()`; `erased` likewise. Only the first `N` survivors are used —
/// callers picking which survivors to pass in control which parts truly get read.
pub fn build_decode_matrix(encode: &Matrix, survivors: &[usize], erased: &[usize]) -> Result<Matrix, ErasureError> {
    let n = encode.cols();
    if survivors.len() < n {
        return Err(ErasureError::InsufficientParts {
            available: survivors.len(),
            required: n,
        });
    }
    let chosen = &survivors[..n];
    let sub = encode.select_rows(chosen);
    let inv = sub.invert()?;
    let erased_rows = encode.select_rows(erased);
    Ok(erased_rows.mul(&inv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cauchy::build_encode_matrix;

    #[test]
    fn decode_matrix_has_expected_shape() {
        let encode = build_encode_matrix(4, 2);
        let survivors = [0, 1, 3, 4, 5]; // 5 survivors, need 4
        let erased = [2usize];
        let decode = build_decode_matrix(&encode, &survivors, &erased).unwrap();
        assert_eq!(decode.rows(), 1);
        assert_eq!(decode.cols(), 4);
    }

    #[test]
    fn too_few_survivors_is_rejected() {
        let encode = build_encode_matrix(4, 2);
        let survivors = [0, 1, 2];
        let erased = [3usize];
        assert!(matches!(
            build_decode_matrix(&encode, &survivors, &erased),
            Err(ErasureError::InsufficientParts { .. })
        ));
    }
}
