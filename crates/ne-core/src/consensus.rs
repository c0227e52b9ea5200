//! `STAT`-pass meta-info consensus resolution.

use crate::error::{CoreError, Result};
use ne_meta::MetaInfo;

/// Resolves the consensus `(N, E, O, partsz, versz, blocksz, totsz)` from a
/// set of per-shard meta readings (`None` where a shard's meta could not be
/// read at all), applying majority vote with deterministic tie-breaks.
///
/// Only the first `max_sample` readings are considered: the consensus search
/// is bounded regardless of `N+E` (see [`crate::config::ConsensusConfig`]).
pub fn resolve(readings: &[Option<MetaInfo>], max_sample: usize) -> Result<MetaInfo> {
    let sample: Vec<MetaInfo> = readings.iter().take(max_sample).filter_map(|r| *r).collect();

    if sample.is_empty() {
        return Err(CoreError::InsufficientConsensus("no valid meta readings".to_string()));
    }

    let n = majority(&sample, |v| v.n, prefer_larger).expect("sample is non-empty");
    let votes_on_n = sample.iter().filter(|m| m.n == n).count();
    if (votes_on_n as i64) < n {
        return Err(CoreError::InsufficientConsensus(format!(
            "only {votes_on_n} shards agree on N={n}, need at least {n}"
        )));
    }

    let e = majority(&sample, |v| v.e, prefer_larger).unwrap();
    let o = majority(&sample, |v| v.o, prefer_first_seen(&sample, |v| v.o)).unwrap();
    let partsz = majority(&sample, |v| v.partsz, prefer_first_seen(&sample, |v| v.partsz)).unwrap();
    let versz = majority(&sample, |v| v.versz, prefer_first_seen(&sample, |v| v.versz)).unwrap();
    let blocksz = majority(&sample, |v| v.blocksz, prefer_first_seen(&sample, |v| v.blocksz)).unwrap();
    let totsz = majority(&sample, |v| v.totsz, prefer_smaller).unwrap();

    Ok(MetaInfo::new(n, e, o, partsz, versz, blocksz, 0, totsz))
}

/// Votes on a field extracted by `field`, breaking ties with `tie_break`.
/// `None` only when `sample` is empty.
fn majority(sample: &[MetaInfo], field: impl Fn(&MetaInfo) -> i64, tie_break: impl Fn(i64, i64) -> i64) -> Option<i64> {
    let mut tallies: Vec<(i64, usize)> = Vec::new();
    for m in sample {
        let v = field(m);
        match tallies.iter_mut().find(|(val, _)| *val == v) {
            Some((_, count)) => *count += 1,
            None => tallies.push((v, 1)),
        }
    }
    let max_count = tallies.iter().map(|(_, c)| *c).max()?;
    let mut winner: Option<i64> = None;
    for (val, count) in tallies {
        if count == max_count {
            winner = Some(match winner {
                Some(cur) => tie_break(cur, val),
                None => val,
            });
        }
    }
    winner
}

fn prefer_larger(a: i64, b: i64) -> i64 {
    a.max(b)
}

fn prefer_smaller(a: i64, b: i64) -> i64 {
    a.min(b)
}

/// Builds a tie-break closure that prefers whichever of `a`/`b` appears
/// earliest in `sample` under `field`.
fn prefer_first_seen(sample: &[MetaInfo], field: impl Fn(&MetaInfo) -> i64) -> impl Fn(i64, i64) -> i64 + '_ {
    move |a, b| {
        for m in sample {
            let v = field(m);
            if v == a {
                return a;
            }
            if v == b {
                return b;
            }
        }
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(n: i64, e: i64, o: i64, partsz: i64, versz: i64, blocksz: i64, totsz: i64) -> MetaInfo {
        MetaInfo::new(n, e, o, partsz, versz, blocksz, 0, totsz)
    }

    #[test]
    fn unanimous_consensus() {
        let m = meta(3, 1, 0, 4096, 1_048_576, 2_097_152, 10240);
        let readings = vec![Some(m), Some(m), Some(m)];
        let resolved = resolve(&readings, 32).unwrap();
        assert_eq!(resolved.n, 3);
        assert_eq!(resolved.totsz, 10240);
    }

    #[test]
    fn tolerates_minority_disagreement() {
        let good = meta(3, 1, 0, 4096, 1_048_576, 2_097_152, 10240);
        let bad = meta(3, 1, 0, 4096, 1_048_576, 2_097_152, 99999);
        let readings = vec![Some(good), Some(good), Some(bad), None];
        let resolved = resolve(&readings, 32).unwrap();
        assert_eq!(resolved.totsz, 10240);
    }

    #[test]
    fn totsz_tie_prefers_smaller() {
        let a = meta(3, 1, 0, 4096, 1_048_576, 2_097_152, 100);
        let b = meta(3, 1, 0, 4096, 1_048_576, 2_097_152, 50);
        let readings = vec![Some(a), Some(b)];
        let resolved = resolve(&readings, 32).unwrap();
        assert_eq!(resolved.totsz, 50);
    }

    #[test]
    fn insufficient_votes_on_n_fails() {
        let a = meta(5, 1, 0, 4096, 1_048_576, 2_097_152, 100);
        let readings = vec![Some(a), None, None, None, None];
        assert!(resolve(&readings, 32).is_err());
    }

    #[test]
    fn no_readings_fails() {
        let readings: Vec<Option<MetaInfo>> = vec![None, None];
        assert!(resolve(&readings, 32).is_err());
    }
}
