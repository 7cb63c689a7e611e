//! End-to-end workspace workflows: fork, diverge, detect, merge.

mod common;

use common::*;

use warren::conflict::detect;
use warren::dag::{self, SnapshotSource};
use warren::manifest::Manifest;
use warren::stat_cache::StatCache;

#[test]
fn divergent_edits_to_the_same_line_produce_one_hunk() {
    let p = project();
    let mut alpha = p.workspace("alpha");
    write(&alpha, "notes.txt", "line1\nline2\nline3\n");
    let base_id = snap(&mut alpha, "base", "robo-a");

    let mut beta = p.workspace_from("beta", &base_id);

    write(&alpha, "notes.txt", "line1\nLOCAL\nline3\n");
    let alpha_head = snap(&mut alpha, "alpha edit", "robo-a");
    write(&beta, "notes.txt", "line1\nOTHER\nline3\n");
    let beta_head = snap(&mut beta, "beta edit", "robo-b");

    let source = SnapshotSource::pair(alpha.store(), beta.store());
    let ancestor = dag::merge_base(&source, &alpha_head, &beta_head).unwrap();
    assert_eq!(ancestor, base_id);

    let base = alpha.store().load_manifest_for_snapshot(&ancestor).unwrap();
    let local = alpha.store().load_manifest_for_snapshot(&alpha_head).unwrap();
    let other = beta.store().load_manifest_for_snapshot(&beta_head).unwrap();
    let report = detect(&base, &local, &other, alpha.store(), alpha.store(), beta.store());

    assert_eq!(report.true_conflicts, 1);
    assert_eq!(report.overlapping_files, vec!["notes.txt"]);
    let hunk = &report.conflicts[0].hunks[0];
    assert_eq!((hunk.start_line, hunk.end_line), (2, 2));
    assert_eq!(hunk.local_lines, vec!["LOCAL"]);
    assert_eq!(hunk.source_lines, vec!["OTHER"]);
}

#[test]
fn disjoint_line_edits_overlap_but_do_not_conflict() {
    let p = project();
    let mut alpha = p.workspace("alpha");
    write(&alpha, "notes.txt", "line1\nline2\nline3\n");
    let base_id = snap(&mut alpha, "base", "robo-a");

    let mut beta = p.workspace_from("beta", &base_id);

    write(&alpha, "notes.txt", "EDITED1\nline2\nline3\n");
    let alpha_head = snap(&mut alpha, "alpha edit", "robo-a");
    write(&beta, "notes.txt", "line1\nline2\nEDITED3\n");
    let beta_head = snap(&mut beta, "beta edit", "robo-b");

    let base = alpha.store().load_manifest_for_snapshot(&base_id).unwrap();
    let local = alpha.store().load_manifest_for_snapshot(&alpha_head).unwrap();
    let other = beta.store().load_manifest_for_snapshot(&beta_head).unwrap();
    let report = detect(&base, &local, &other, alpha.store(), alpha.store(), beta.store());

    assert_eq!(report.overlapping_files, vec!["notes.txt"]);
    assert_eq!(report.true_conflicts, 0);
}

#[test]
fn cached_generation_never_serves_stale_hashes() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");
    let file = dir.path().join("data.txt");

    std::fs::write(&file, "first").unwrap();
    let m1 = Manifest::generate_with_cache(dir.path(), &cache_path).unwrap();

    // Overwrite immediately — well inside the cache's timestamp granularity.
    std::fs::write(&file, "secnd").unwrap(); // same length on purpose
    let m2 = Manifest::generate_with_cache(dir.path(), &cache_path).unwrap();

    assert_eq!(
        m2.file_entry("data.txt").unwrap().hash,
        warren::hash::hash_str("secnd"),
        "stat cache must not mask a same-size same-quantum rewrite"
    );
    assert_ne!(m1.hash().unwrap(), m2.hash().unwrap());
}

#[test]
fn cached_generation_matches_uncached_and_prunes_departed_files() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");
    std::fs::write(dir.path().join("keep.txt"), "keep").unwrap();
    std::fs::write(dir.path().join("gone.txt"), "gone").unwrap();

    let cached = Manifest::generate_with_cache(dir.path(), &cache_path).unwrap();
    let plain = Manifest::generate(dir.path()).unwrap();
    assert_eq!(cached.hash().unwrap(), plain.hash().unwrap());

    std::fs::remove_file(dir.path().join("gone.txt")).unwrap();
    Manifest::generate_with_cache(dir.path(), &cache_path).unwrap();

    let cache = StatCache::load(&cache_path);
    assert!(cache.entries.contains_key("keep.txt"));
    assert!(!cache.entries.contains_key("gone.txt"));
}

#[test]
fn snapshot_restore_round_trip_across_fork() {
    let p = project();
    let mut alpha = p.workspace("alpha");
    write(&alpha, "src/main.rs", "fn main() {}\n");
    write(&alpha, "README.md", "# demo\n");
    let s1 = snap(&mut alpha, "initial", "robo");

    write(&alpha, "src/main.rs", "fn main() { todo!() }\n");
    snap(&mut alpha, "wip", "robo");

    let mut restored = p.workspace_from("restored", &s1);
    assert_eq!(
        std::fs::read_to_string(restored.root().join("src/main.rs")).unwrap(),
        "fn main() {}\n"
    );

    // The fork records its base, and a fresh snapshot parents on it.
    write(&restored, "README.md", "# demo v2\n");
    let next = snap(&mut restored, "fork edit", "robo");
    let meta = restored.store().load_snapshot_meta(&next).unwrap();
    assert_eq!(meta.parent_snapshot_ids, vec![s1]);
}
