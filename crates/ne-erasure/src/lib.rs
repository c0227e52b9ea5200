//! Reed-Solomon erasure coding over `GF(2^8)` with systematic Cauchy matrix
//! construction.
//!
//! Layered bottom-up: [`gf256`] is the field, [`matrix`] is dense linear algebra
//! over that field, [`cauchy`] builds the systematic encode matrix, [`decode`]
//! derives a decode matrix from it for a given erasure pattern, [`tables`]
//! precomputes per-coefficient multiplication tables (the `g_tbls`/`ec_encode_data`
//! equivalent), and [`lock`] is the process-wide critical section every table
//! build and `encode_data` call must run inside. [`ErasureCodec`] wires all of
//! that into the one entry point `ne-core` actually calls.

pub mod cauchy;
mod error;
pub mod gf256;
pub mod lock;
pub mod matrix;
pub mod tables;

mod decode;

pub use decode::build_decode_matrix;
pub use error::{ErasureError, Result};
pub use lock::ErasureLock;
pub use matrix::Matrix;
pub use tables::GTables;

/// The stripe-level encode/decode entry point, bound to one `(n, e)` erasure
/// pattern.
///
/// Holds the systematic Cauchy encode matrix built once at construction and an
/// [`ErasureLock`] handle; every decode call derives and caches the decode
/// matrix for the error pattern it was last built for, so rebuilding is
/// skipped on every stripe when the error pattern is unchanged.
pub struct ErasureCodec {
    n: usize,
    e: usize,
    encode_matrix: Matrix,
    lock: ErasureLock,
    cached_decode: parking_lot::Mutex<Option<CachedDecode>>,
}

struct CachedDecode {
    erased: Vec<usize>,
    tables: std::sync::Arc<GTables>,
}

impl ErasureCodec {
    /// Builds a codec for `n` data parts and `e` parity parts, using the
    /// process-wide default erasurelock.
    #[must_use]
    pub fn new(n: usize, e: usize) -> Self {
        Self::with_lock(n, e, ErasureLock::process_wide())
    }

    /// As [`Self::new`], but bound to a caller-supplied lock (e.g. shared
    /// across several contexts by the embedding application).
    #[must_use]
    pub fn with_lock(n: usize, e: usize, lock: ErasureLock) -> Self {
        let encode_matrix = cauchy::build_encode_matrix(n, e);
        Self {
            n,
            e,
            encode_matrix,
            lock,
            cached_decode: parking_lot::Mutex::new(None),
        }
    }

    #[must_use]
    pub fn n(&self) -> usize {
        self.n
    }

    #[must_use]
    pub fn e(&self) -> usize {
        self.e
    }

    #[must_use]
    pub fn lock(&self) -> &ErasureLock {
        &self.lock
    }

    #[must_use]
    pub fn encode_matrix(&self) -> &Matrix {
        &self.encode_matrix
    }

    /// Computes the `e` parity slices from the `n` data slices, all the same
    /// length. Acquires the erasurelock for the duration of table build +
    /// encode: these routines mutate shared table state and are not safe to
    /// invoke concurrently within the same process address space.
    #[tracing::instrument(skip_all, fields(n = self.n, e = self.e))]
    pub fn encode(&self, data: &[&[u8]], parity: &mut [&mut [u8]]) -> Result<()> {
        if data.len() != self.n {
            return Err(ErasureError::DimensionMismatch {
                context: format!("expected {} data slices, got {}", self.n, data.len()),
            });
        }
        if parity.len() != self.e {
            return Err(ErasureError::DimensionMismatch {
                context: format!("expected {} parity slices, got {}", self.e, parity.len()),
            });
        }
        let parity_rows: Vec<usize> = (self.n..self.n + self.e).collect();
        let parity_matrix = self.encode_matrix.select_rows(&parity_rows);

        let _guard = self.lock.acquire();
        let tables = GTables::build(&parity_matrix);
        tables.encode_data(data, parity);
        Ok(())
    }

    /// Regenerates the parts listed in `erased` from the surviving parts.
    ///
    /// `survivor_indices` and `survivor_data` must be the same length and in
    /// correspondence (`survivor_data[i]` is the content of part
    /// `survivor_indices[i]`); only the first `n` survivors are actually read.
    /// `outputs[i]` receives the reconstructed content of `erased[i]`.
    #[tracing::instrument(skip_all, fields(n = self.n, e = self.e, erased = erased.len()))]
    pub fn decode(
        &self,
        survivor_indices: &[usize],
        survivor_data: &[&[u8]],
        erased: &[usize],
        outputs: &mut [&mut [u8]],
    ) -> Result<()> {
        if survivor_data.len() != survivor_indices.len() {
            return Err(ErasureError::DimensionMismatch {
                context: "survivor_indices and survivor_data must be the same length".to_string(),
            });
        }
        if outputs.len() != erased.len() {
            return Err(ErasureError::DimensionMismatch {
                context: "outputs and erased must be the same length".to_string(),
            });
        }
        if erased.len() > self.e {
            return Err(ErasureError::TooManyErrors { max: self.e });
        }

        let tables = self.decode_tables_for(survivor_indices, erased)?;
        let inputs = &survivor_data[..self.n];

        let _guard = self.lock.acquire();
        tables.encode_data(inputs, outputs);
        Ok(())
    }

    /// Returns (building and caching if necessary) the `GTables` for `erased`.
    fn decode_tables_for(&self, survivor_indices: &[usize], erased: &[usize]) -> Result<std::sync::Arc<GTables>> {
        let mut cache = self.cached_decode.lock();
        if let Some(cached) = cache.as_ref() {
            if cached.erased == erased {
                return Ok(std::sync::Arc::clone(&cached.tables));
            }
        }
        let decode_matrix = build_decode_matrix(&self.encode_matrix, survivor_indices, erased)?;
        let tables = std::sync::Arc::new(GTables::build(&decode_matrix));
        *cache = Some(CachedDecode {
            erased: erased.to_vec(),
            tables: std::sync::Arc::clone(&tables),
        });
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_recovers_erased_part() {
        let codec = ErasureCodec::new(4, 2);
        let data: Vec<Vec<u8>> = (0..4).map(|i| vec![i as u8 * 17 + 1; 64]).collect();
        let data_refs: Vec<&[u8]> = data.iter().map(Vec::as_slice).collect();

        let mut p0 = vec![0u8; 64];
        let mut p1 = vec![0u8; 64];
        {
            let mut parity: Vec<&mut [u8]> = vec![&mut p0, &mut p1];
            codec.encode(&data_refs, &mut parity).unwrap();
        }

        // Pretend part 1 (data) and part 2 (data) are erased; reconstruct from
        // parts 0, 3, 4 (p0), 5 (p1).
        let survivor_indices = [0usize, 3, 4, 5];
        let survivors: Vec<&[u8]> = vec![&data[0], &data[3], &p0, &p1];
        let erased = [1usize, 2];
        let mut r1 = vec![0u8; 64];
        let mut r2 = vec![0u8; 64];
        {
            let mut outputs: Vec<&mut [u8]> = vec![&mut r1, &mut r2];
            codec.decode(&survivor_indices, &survivors, &erased, &mut outputs).unwrap();
        }
        assert_eq!(r1, data[1]);
        assert_eq!(r2, data[2]);
    }

    #[test]
    fn decode_rejects_too_many_erasures() {
        let codec = ErasureCodec::new(3, 1);
        let erased = [0usize, 1];
        let mut o0 = vec![0u8; 8];
        let mut o1 = vec![0u8; 8];
        let mut outputs: Vec<&mut [u8]> = vec![&mut o0, &mut o1];
        let survivors: Vec<&[u8]> = vec![&[0u8; 8], &[0u8; 8], &[0u8; 8]];
        let result = codec.decode(&[2, 3, 0], &survivors, &erased, &mut outputs);
        assert!(matches!(result, Err(ErasureError::TooManyErrors { max: 1 })));
    }

    #[test]
    fn encode_rejects_wrong_slice_counts() {
        let codec = ErasureCodec::new(3, 2);
        let data: Vec<&[u8]> = vec![&[1u8, 2], &[3u8, 4]];
        let mut p0 = vec![0u8; 2];
        let mut outputs: Vec<&mut [u8]> = vec![&mut p0];
        assert!(matches!(
            codec.encode(&data, &mut outputs),
            Err(ErasureError::DimensionMismatch { .. })
        ));
    }
}
