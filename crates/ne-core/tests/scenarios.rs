//! End-to-end round-trip and damage-recovery scenarios, driven against a real
//! [`PosixDal`] in a temp directory.

use ne_common::config::ContextConfig;
use ne_common::{ErasurePattern, HandleMode, Location};
use ne_core::{Context, ConsensusConfig, Handle};
use ne_dal::{PosixDal, PosixDalConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const TEMPLATE: &str = "{p}/{b}/{c}/{s}";

fn ctx(root: &Path) -> Arc<Context<PosixDal>> {
    let config = PosixDalConfig::new(root, TEMPLATE, 1 << 20);
    let dal = PosixDal::open(config).unwrap();
    Arc::new(Context::new(dal, ContextConfig::default(), ConsensusConfig::default()))
}

/// Mirrors `{p}/{b}/{c}/{s}` expansion for test-side corruption of the files
/// `PosixDal` itself wrote, without reaching into its private path module.
fn data_path(root: &Path, loc: Location, obj_id: &str) -> PathBuf {
    root.join(format!("{}/{}/{}/{}", loc.pod, loc.block, loc.cap, loc.scatter)).join(obj_id)
}

fn meta_path(root: &Path, loc: Location, obj_id: &str) -> PathBuf {
    let mut p = data_path(root, loc, obj_id).into_os_string();
    p.push(".meta");
    PathBuf::from(p)
}

fn write_object(ctx: &Arc<Context<PosixDal>>, obj_id: &str, base: Location, pattern: ErasurePattern, versz: u64, data: &[u8]) {
    let h = Handle::create(Arc::clone(ctx), HandleMode::WrOnly, obj_id, base, pattern, versz).unwrap();
    h.put(data).unwrap();
    let report = h.close().unwrap();
    assert_eq!(report.errors, 0);
}

#[test]
fn s1_write_read_round_trip_no_damage() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = ctx(tmp.path());
    let pattern = ErasurePattern::new(3, 1, 0, 4096).unwrap();
    let base = Location::new(0, 0, 0, 0);
    let data = vec![0u8; 10240];

    write_object(&ctx, "s1", base, pattern, 1 << 20, &data);

    let h = Handle::open(Arc::clone(&ctx), HandleMode::RdOnly, "s1", base).unwrap();
    assert_eq!(h.totsz(), 10240);
    let mut out = vec![0u8; 10240];
    let n = h.read_stripes(&mut out).unwrap();
    assert_eq!(n, 10240);
    assert_eq!(out, data);
    let report = h.close().unwrap();
    assert_eq!(report.errors, 0);
}

#[test]
fn s2_truncated_data_shard_reconstructs_under_rdall() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = ctx(tmp.path());
    let pattern = ErasurePattern::new(3, 1, 0, 4096).unwrap();
    let base = Location::new(0, 0, 0, 0);
    let data = vec![0u8; 10240];

    write_object(&ctx, "s2", base, pattern, 1 << 20, &data);

    // Block 1 is shard 1 (O=0): truncate its data file to zero length.
    let path = data_path(tmp.path(), base.with_block(1), "s2");
    fs::File::create(&path).unwrap().set_len(0).unwrap();

    let h = Handle::open(Arc::clone(&ctx), HandleMode::RdAll, "s2", base).unwrap();
    let mut out = vec![0u8; 10240];
    let n = h.read_stripes(&mut out).unwrap();
    assert_eq!(n, 10240);
    assert_eq!(out, data);
    let report = h.close().unwrap();
    assert_eq!(report.errors, 1);
}

#[test]
fn s3_missing_meta_sidecars_still_reach_consensus() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = ctx(tmp.path());
    let pattern = ErasurePattern::new(2, 2, 0, 512).unwrap();
    let base = Location::new(0, 0, 0, 0);
    let data: Vec<u8> = b"ABCDEFGH".iter().cycle().take(8192).copied().collect();

    write_object(&ctx, "s3", base, pattern, 1 << 16, &data);

    fs::remove_file(meta_path(tmp.path(), base.with_block(0), "s3")).unwrap();
    fs::remove_file(meta_path(tmp.path(), base.with_block(3), "s3")).unwrap();

    let h = Handle::open(Arc::clone(&ctx), HandleMode::RdOnly, "s3", base).unwrap();
    assert_eq!(h.totsz(), 8192);
    let mut out = vec![0u8; 8192];
    let n = h.read_stripes(&mut out).unwrap();
    assert_eq!(n, 8192);
    assert_eq!(out, data);
    let _ = h.close().unwrap();
}

#[test]
fn s4_corrupt_crc_trailer_triggers_single_reconstruction() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = ctx(tmp.path());
    let pattern = ErasurePattern::new(2, 2, 0, 512).unwrap();
    let base = Location::new(0, 0, 0, 0);
    let data: Vec<u8> = b"ABCDEFGH".iter().cycle().take(8192).copied().collect();

    write_object(&ctx, "s4", base, pattern, 1 << 16, &data);

    // Flip the last byte (the trailing CRC) of shard 0's single buffer.
    let path = data_path(tmp.path(), base.with_block(0), "s4");
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    let h = Handle::open(Arc::clone(&ctx), HandleMode::RdOnly, "s4", base).unwrap();
    let mut out = vec![0u8; 8192];
    let n = h.read_stripes(&mut out).unwrap();
    assert_eq!(n, 8192);
    assert_eq!(out, data);
    let report = h.close().unwrap();
    assert_eq!(report.errors, 1);
}

#[test]
fn s5_seek_then_read_matches_full_read_slice() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = ctx(tmp.path());
    let pattern = ErasurePattern::new(4, 2, 0, 4096).unwrap();
    let base = Location::new(0, 0, 0, 0);
    let data: Vec<u8> = (0..100_000u32).map(|i| (i % 256) as u8).collect();

    write_object(&ctx, "s5", base, pattern, 1 << 20, &data);

    let h = Handle::open(Arc::clone(&ctx), HandleMode::RdOnly, "s5", base).unwrap();
    h.seek(50_001).unwrap();
    let mut out = vec![0u8; 100];
    let n = h.read_stripes(&mut out).unwrap();
    assert_eq!(n, 100);
    assert_eq!(out, data[50_001..50_101]);
    let _ = h.close().unwrap();
}

#[test]
fn s6_rebuild_then_reopen_reports_no_damage() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = ctx(tmp.path());
    let pattern = ErasurePattern::new(3, 1, 0, 4096).unwrap();
    let base = Location::new(0, 0, 0, 0);
    let data: Vec<u8> = (0..10_240u32).map(|i| (i % 251) as u8).collect();

    write_object(&ctx, "s6", base, pattern, 1 << 20, &data);

    let path = data_path(tmp.path(), base.with_block(1), "s6");
    fs::File::create(&path).unwrap().set_len(0).unwrap();

    let mut h = Handle::open(Arc::clone(&ctx), HandleMode::Rebuild, "s6", base).unwrap();
    let remaining = h.rebuild().unwrap();
    assert_eq!(remaining, 0);
    let _ = h.close().unwrap();

    let h2 = Handle::open(Arc::clone(&ctx), HandleMode::RdAll, "s6", base).unwrap();
    let mut out = vec![0u8; 10_240];
    let n = h2.read_stripes(&mut out).unwrap();
    assert_eq!(n, 10_240);
    assert_eq!(out, data);
    let report = h2.close().unwrap();
    assert_eq!(report.errors, 0);
}
