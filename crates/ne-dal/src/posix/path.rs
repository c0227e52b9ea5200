//! Path templating for the POSIX DAL.
//!
//! `dir_template` is a path-template string with `{p}`/`{b}`/`{c}`/`{s}`
//! substitution sequences for pod/block/cap/scatter; `\{` escapes a literal
//! brace. The expanded template is always relative — every path this module
//! produces is resolved through [`crate::posix::secure_root::SecureRoot`],
//! never through the process's ambient cwd.

use crate::error::{DalError, Result};
use crate::DalMode;
use ne_common::Location;
use std::path::PathBuf;

/// Expands `template` against `loc`, substituting `{p}` -> pod, `{b}` ->
/// block, `{c}` -> cap, `{s}` -> scatter, each rendered as decimal.
pub fn expand_dir_template(template: &str, loc: Location) -> Result<PathBuf> {
    let mut out = String::with_capacity(template.len() + 16);
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => out.push(escaped),
                None => return Err(DalError::InvalidTemplate("trailing '\\' escape".to_string())),
            },
            '{' => {
                let tag = chars.next().ok_or_else(|| DalError::InvalidTemplate("unterminated '{' substitution".to_string()))?;
                let value = match tag {
                    'p' => loc.pod,
                    'b' => loc.block,
                    'c' => loc.cap,
                    's' => loc.scatter,
                    other => {
                        return Err(DalError::InvalidTemplate(format!(
                            "unrecognized substitution tag '{{{other}}}' (expected p/b/c/s)"
                        )))
                    }
                };
                match chars.next() {
                    Some('}') => out.push_str(&value.to_string()),
                    _ => return Err(DalError::InvalidTemplate(format!("'{{{tag}' substitution missing closing '}}'"))),
                }
            }
            other => out.push(other),
        }
    }
    Ok(PathBuf::from(out))
}

/// The base data-file name for `obj_id`: every `/` replaced with `#`.
#[must_use]
pub fn data_filename(obj_id: &str) -> String {
    obj_id.replace('/', "#")
}

/// The meta sidecar's file name: the data file name with `.meta` appended.
#[must_use]
pub fn meta_filename(obj_id: &str) -> String {
    format!("{}.meta", data_filename(obj_id))
}

/// The working-suffix for a given DAL open mode, if any: `.partial` for
/// `Write`, `.rebuild` for `Rebuild`, none for `Read`/`MetaRead`.
#[must_use]
pub fn working_suffix(mode: DalMode) -> Option<&'static str> {
    match mode {
        DalMode::Write => Some(".partial"),
        DalMode::Rebuild => Some(".rebuild"),
        DalMode::Read | DalMode::MetaRead => None,
    }
}

/// Appends `mode`'s working suffix (if any) to `filename`.
#[must_use]
pub fn with_working_suffix(filename: &str, mode: DalMode) -> String {
    match working_suffix(mode) {
        Some(sfx) => format!("{filename}{sfx}"),
        None => filename.to_string(),
    }
}

/// The relative `(data_path, meta_path)` pair for `obj_id` at `loc`, with
/// `mode`'s working suffix applied to both.
pub fn block_paths(template: &str, loc: Location, obj_id: &str, mode: DalMode) -> Result<(PathBuf, PathBuf)> {
    let dir = expand_dir_template(template, loc)?;
    let data = dir.join(with_working_suffix(&data_filename(obj_id), mode));
    let meta = dir.join(with_working_suffix(&meta_filename(obj_id), mode));
    Ok((data, meta))
}

/// As [`block_paths`], but for the canonical (no working suffix) final paths
/// — used by `close` to compute rename targets, and by `del`/`stat`/`get`.
pub fn final_block_paths(template: &str, loc: Location, obj_id: &str) -> Result<(PathBuf, PathBuf)> {
    let dir = expand_dir_template(template, loc)?;
    Ok((dir.join(data_filename(obj_id)), dir.join(meta_filename(obj_id))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Location {
        Location::new(1, 2, 3, 4)
    }

    #[test]
    fn expands_all_four_placeholders() {
        let p = expand_dir_template("{p}/{b}/{c}/{s}", loc()).unwrap();
        assert_eq!(p, PathBuf::from("1/2/3/4"));
    }

    #[test]
    fn literal_text_and_escapes_survive() {
        let p = expand_dir_template("pool-\\{{p}\\}/blk{b}", loc()).unwrap();
        assert_eq!(p, PathBuf::from("pool-{1}/blk2"));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(expand_dir_template("{x}", loc()).is_err());
    }

    #[test]
    fn unterminated_substitution_is_rejected() {
        assert!(expand_dir_template("{p", loc()).is_err());
        assert!(expand_dir_template("{p}/{b", loc()).is_err());
    }

    #[test]
    fn slash_in_objid_is_hashed() {
        assert_eq!(data_filename("a/b/c"), "a#b#c");
        assert_eq!(meta_filename("a/b"), "a#b.meta");
    }

    #[test]
    fn working_suffix_applies_to_both_data_and_meta() {
        let (data, meta) = block_paths("{p}/{b}/{c}/{s}", loc(), "obj1", DalMode::Write).unwrap();
        assert_eq!(data, PathBuf::from("1/2/3/4/obj1.partial"));
        assert_eq!(meta, PathBuf::from("1/2/3/4/obj1.meta.partial"));

        let (data, meta) = block_paths("{p}/{b}/{c}/{s}", loc(), "obj1", DalMode::Rebuild).unwrap();
        assert_eq!(data, PathBuf::from("1/2/3/4/obj1.rebuild"));
        assert_eq!(meta, PathBuf::from("1/2/3/4/obj1.meta.rebuild"));

        let (data, meta) = final_block_paths("{p}/{b}/{c}/{s}", loc(), "obj1").unwrap();
        assert_eq!(data, PathBuf::from("1/2/3/4/obj1"));
        assert_eq!(meta, PathBuf::from("1/2/3/4/obj1.meta"));
    }
}
