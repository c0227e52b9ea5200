//! Per-shard metadata codec.
//!
//! `MetaInfo` carries everything needed to recover `(N, E, O, partsz, versz,
//! blocksz, crcsum, totsz)` from any single surviving shard. The codec is
//! intentionally oblivious to where its bytes come from — a sidecar file, an
//! xattr, or an in-memory cache all hand it a byte buffer and get one back.

mod error;

pub use error::{MetaError, Result};

/// Version tag written by [`MetaInfo::serialize`].
const MINFO_VER: i64 = 1;

/// Upper bound on the serialized form's length: 8 fields at up to 20 decimal
/// digits (covering a full `i64`/`u64` range) plus a sign byte, 7 separating
/// spaces, a `v<ver> ` prefix, and the trailing newline.
pub const MAX_ENCODED_LEN: usize = 8 * 21 + 12 + 1;

/// The outcome of a [`MetaInfo::parse`] call that did not hit a catastrophic
/// failure: zero on full success, positive count of recovered fields otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// All eight fields parsed and a trailing newline was present.
    Clean,
    /// Fewer than eight fields parsed cleanly, or the trailing newline was
    /// missing. Carries the count of fields recovered (`0..=8`).
    Partial(u8),
}

/// Per-shard metadata, recoverable from any single surviving shard's sidecar.
///
/// Fields use sentinel values so a partially-parsed buffer still carries
/// useful signal: `n` sentinels to `0`
/// (an erasure pattern can never have zero data shards), every other field
/// sentinels to `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaInfo {
    pub n: i64,
    pub e: i64,
    pub o: i64,
    pub partsz: i64,
    pub versz: i64,
    pub blocksz: i64,
    pub crcsum: i64,
    pub totsz: i64,
}

impl Default for MetaInfo {
    fn default() -> Self {
        Self {
            n: 0,
            e: -1,
            o: -1,
            partsz: -1,
            versz: -1,
            blocksz: -1,
            crcsum: -1,
            totsz: -1,
        }
    }
}

/// One field slot, in wire order, with its sentinel value (used both to seed a
/// freshly-reset `MetaInfo` and as the "must parse to something greater than
/// this" floor each field's parse enforces).
const FIELD_SENTINELS: [i64; 8] = [0, -1, -1, -1, -1, -1, -1, -1];

impl MetaInfo {
    #[must_use]
    pub fn new(n: i64, e: i64, o: i64, partsz: i64, versz: i64, blocksz: i64, crcsum: i64, totsz: i64) -> Self {
        Self {
            n,
            e,
            o,
            partsz,
            versz,
            blocksz,
            crcsum,
            totsz,
        }
    }

    fn fields(&self) -> [i64; 8] {
        [
            self.n,
            self.e,
            self.o,
            self.partsz,
            self.versz,
            self.blocksz,
            self.crcsum,
            self.totsz,
        ]
    }

    fn set_field(&mut self, idx: usize, val: i64) {
        match idx {
            0 => self.n = val,
            1 => self.e = val,
            2 => self.o = val,
            3 => self.partsz = val,
            4 => self.versz = val,
            5 => self.blocksz = val,
            6 => self.crcsum = val,
            7 => self.totsz = val,
            _ => unreachable!("meta_info has exactly 8 fields"),
        }
    }

    /// Serializes this struct into its versioned textual form:
    /// `v1 N E O partsz versz blocksz crcsum totsz\n`.
    #[must_use]
    pub fn serialize(&self) -> String {
        format!(
            "v{} {} {} {} {} {} {} {} {}\n",
            MINFO_VER, self.n, self.e, self.o, self.partsz, self.versz, self.blocksz, self.crcsum, self.totsz
        )
    }

    /// Parses either the versioned (`v1 ...`) or legacy (no version tag) form.
    ///
    /// Returns [`ParseStatus::Clean`] only when all eight fields parsed and a
    /// trailing newline was present. On any other recoverable outcome, returns
    /// [`ParseStatus::Partial`] with the count of fields actually recovered,
    /// leaving unrecovered fields at their sentinel — never a partially-trusted
    /// value. [`MetaError::Malformed`] is returned only when the buffer yields
    /// no parseable tokens at all.
    pub fn parse(buf: &[u8]) -> Result<(Self, ParseStatus)> {
        let text = std::str::from_utf8(buf).map_err(|_| MetaError::Malformed)?;
        let had_trailing_newline = text.ends_with('\n');

        let trimmed = text.trim_end_matches(['\n', '\0']);
        let mut words = trimmed.split_whitespace();

        let first = words.next().ok_or(MetaError::Malformed)?;
        let mut tokens: Vec<&str> = Vec::with_capacity(8);
        if let Some(rest) = first.strip_prefix('v') {
            if rest.chars().all(|c| c.is_ascii_digit()) && !rest.is_empty() {
                // Versioned: `first` was the tag itself, remaining words are the 8 fields.
                tokens.extend(words);
            } else {
                // Not actually a version tag (e.g. legacy data starting with a
                // field that happens to begin with 'v' cannot occur since all
                // fields are numeric) — treat as the first field.
                tokens.push(first);
                tokens.extend(words);
            }
        } else {
            tokens.push(first);
            tokens.extend(words);
        }

        let ret = tokens.len().min(8);
        if ret == 0 {
            return Err(MetaError::Malformed);
        }

        let mut minfo = Self::default();
        let mut status: i32 = if ret == 8 { 8 } else { i32::try_from(ret).unwrap_or(0) };

        for (idx, token) in tokens.iter().take(ret).enumerate() {
            match token.parse::<i64>() {
                Ok(val) if val > FIELD_SENTINELS[idx] => minfo.set_field(idx, val),
                _ => {
                    tracing::warn!(field = idx, value = %token, "failed to parse meta value");
                    status -= 1;
                }
            }
        }

        let status = status.max(0) as u8;
        if had_trailing_newline && status == 8 {
            Ok((minfo, ParseStatus::Clean))
        } else {
            Ok((minfo, ParseStatus::Partial(status)))
        }
    }

    /// Duplicates every field except `crcsum` (per-shard sums legitimately differ).
    pub fn copy_from(&mut self, source: &Self) {
        self.n = source.n;
        self.e = source.e;
        self.o = source.o;
        self.partsz = source.partsz;
        self.versz = source.versz;
        self.blocksz = source.blocksz;
        self.totsz = source.totsz;
        // self.crcsum intentionally left untouched.
    }

    /// Returns `true` iff every field but `crcsum` matches.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.n == other.n
            && self.e == other.e
            && self.o == other.o
            && self.partsz == other.partsz
            && self.versz == other.versz
            && self.blocksz == other.blocksz
            && self.totsz == other.totsz
    }

    /// `true` iff every field parsed to a value consistent with a usable pattern
    /// (all fields strictly greater than their sentinel).
    #[must_use]
    pub fn is_fully_populated(&self) -> bool {
        self.fields().iter().zip(FIELD_SENTINELS).all(|(v, s)| *v > s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MetaInfo {
        MetaInfo::new(3, 1, 0, 4096, 1_048_576, 2_097_152, 123_456, 10240)
    }

    #[test]
    fn round_trip_versioned() {
        let minfo = sample();
        let text = minfo.serialize();
        let (parsed, status) = MetaInfo::parse(text.as_bytes()).unwrap();
        assert_eq!(status, ParseStatus::Clean);
        assert!(parsed.matches(&minfo));
        assert_eq!(parsed.crcsum, minfo.crcsum);
    }

    #[test]
    fn legacy_form_without_version_tag() {
        let minfo = sample();
        let legacy = format!(
            "{} {} {} {} {} {} {} {}\n",
            minfo.n, minfo.e, minfo.o, minfo.partsz, minfo.versz, minfo.blocksz, minfo.crcsum, minfo.totsz
        );
        let (parsed, status) = MetaInfo::parse(legacy.as_bytes()).unwrap();
        assert_eq!(status, ParseStatus::Clean);
        assert!(parsed.matches(&minfo));
    }

    #[test]
    fn missing_trailing_newline_is_tolerated_but_not_clean() {
        let minfo = sample();
        let text = minfo.serialize();
        let without_nl = text.trim_end_matches('\n');
        let (parsed, status) = MetaInfo::parse(without_nl.as_bytes()).unwrap();
        assert_eq!(status, ParseStatus::Partial(8));
        assert!(parsed.matches(&minfo));
    }

    #[test]
    fn unparseable_field_leaves_sentinel_and_decrements_status() {
        let text = "v1 3 1 0 4096 garbage 2097152 123456 10240\n";
        let (parsed, status) = MetaInfo::parse(text.as_bytes()).unwrap();
        assert_eq!(status, ParseStatus::Partial(7));
        assert_eq!(parsed.versz, -1);
        assert_eq!(parsed.n, 3);
        assert_eq!(parsed.blocksz, 2_097_152);
    }

    #[test]
    fn truncated_field_list_counts_only_present_fields() {
        let text = "v1 3 1 0\n";
        let (parsed, status) = MetaInfo::parse(text.as_bytes()).unwrap();
        assert_eq!(status, ParseStatus::Partial(3));
        assert_eq!(parsed.o, 0);
        assert_eq!(parsed.partsz, -1);
        assert_eq!(parsed.totsz, -1);
    }

    #[test]
    fn empty_buffer_is_malformed() {
        assert!(matches!(MetaInfo::parse(b""), Err(MetaError::Malformed)));
        assert!(matches!(MetaInfo::parse(b"   \n"), Err(MetaError::Malformed)));
    }

    #[test]
    fn copy_from_excludes_crcsum() {
        let source = sample();
        let mut target = MetaInfo::default();
        target.crcsum = 999;
        target.copy_from(&source);
        assert_eq!(target.crcsum, 999);
        assert!(target.matches(&source));
    }

    #[test]
    fn serialized_form_fits_max_encoded_len() {
        let minfo = MetaInfo::new(i64::MAX, i64::MAX, i64::MAX, i64::MAX, i64::MAX, i64::MAX, i64::MAX, i64::MAX);
        assert!(minfo.serialize().len() <= MAX_ENCODED_LEN);
    }
}
