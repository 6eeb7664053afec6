//! Tree layout discovery
//!
//! Reports, per seed, which snapshot files are present on disk before an
//! ingest is attempted.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use itertools::Itertools;
use regex::Regex;
use tracing::{debug, instrument};

use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::config::Settings;
use crate::domain::TreeLayout;
use crate::infrastructure::traits::FileSystem;

/// On-disk state of one seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedLayout {
    pub seed: u32,
    pub tree_dir: PathBuf,
    pub dir_exists: bool,
    pub probe_exists: bool,
    /// Snapshot number to number of chunk files found
    pub chunks: BTreeMap<u32, u32>,
    /// Snapshots of the expected window without any file
    pub missing: Vec<u32>,
    pub db_exists: bool,
}

impl SeedLayout {
    pub fn snapshots(&self) -> Vec<u32> {
        self.chunks.keys().copied().collect()
    }

    /// Snapshots whose chunk count differs from the configured one.
    pub fn incomplete(&self, n_chunks: u32) -> Vec<u32> {
        self.chunks
            .iter()
            .filter(|&(_, &n)| n != n_chunks)
            .map(|(&snap, _)| snap)
            .collect()
    }

    pub fn is_ingestible(&self) -> bool {
        self.dir_exists && self.probe_exists
    }
}

pub struct ScanService {
    settings: Arc<Settings>,
    fs: Arc<dyn FileSystem>,
}

impl ScanService {
    pub fn new(settings: Arc<Settings>, fs: Arc<dyn FileSystem>) -> Self {
        Self { settings, fs }
    }

    #[instrument(skip(self))]
    pub fn scan(&self, seeds: Range<u32>) -> ApplicationResult<Vec<SeedLayout>> {
        let layout = self.settings.layout();
        seeds.map(|seed| self.scan_seed(&layout, seed)).collect()
    }

    fn scan_seed(&self, layout: &TreeLayout, seed: u32) -> ApplicationResult<SeedLayout> {
        let tree_dir = layout.tree_dir(seed);
        let dir_exists = self.fs.is_dir(&tree_dir);
        let mut chunks = BTreeMap::new();

        if dir_exists {
            let pattern = file_pattern(layout, seed)?;
            let entries = self
                .fs
                .list_dir(&tree_dir)
                .with_path_context("list tree directory", &tree_dir)?;
            for entry in entries {
                let Some(name) = entry.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                    continue;
                };
                if let Some((snap, _chunk)) = match_file(&pattern, &name) {
                    *chunks.entry(snap).or_insert(0) += 1;
                }
            }
            debug!(
                seed,
                snapshots = %chunks.keys().join(","),
                "tree files found"
            );
        }

        let run = &self.settings.run;
        let window_start = run.n_snaps.saturating_sub(run.n_steps.saturating_sub(1) as u32);
        let missing = (window_start..=run.n_snaps)
            .filter(|snap| !chunks.contains_key(snap))
            .collect();

        Ok(SeedLayout {
            seed,
            probe_exists: self.fs.is_file(&layout.probe_file(seed)),
            db_exists: self.fs.is_file(&layout.db_path(seed)),
            tree_dir,
            dir_exists,
            chunks,
            missing,
        })
    }
}

/// Regex matching `<root_name><snap>.<chunk>.<suffix>` for one seed.
pub fn file_pattern(layout: &TreeLayout, seed: u32) -> ApplicationResult<Regex> {
    let pattern = format!(
        r"^{}(\d{{3,}})\.(\d+)\.{}$",
        regex::escape(&layout.root_name(seed)),
        regex::escape(&layout.suffix)
    );
    Regex::new(&pattern).map_err(|e| ApplicationError::Config {
        message: format!("tree file pattern {pattern}: {e}"),
    })
}

/// Snapshot and chunk number of a matching file name.
pub fn match_file(pattern: &Regex, name: &str) -> Option<(u32, u32)> {
    let caps = pattern.captures(name)?;
    let snap = caps.get(1)?.as_str().parse().ok()?;
    let chunk = caps.get(2)?.as_str().parse().ok()?;
    Some((snap, chunk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn layout() -> TreeLayout {
        Settings::default().layout()
    }

    #[rstest]
    #[case("fb_00_gather_054.0.mtree", Some((54, 0)))]
    #[case("fb_00_gather_007.12.mtree", Some((7, 12)))]
    #[case("fb_01_gather_054.0.mtree", None)]
    #[case("fb_00_gather_054.0.mtree.bak", None)]
    #[case("fb_00_nobuff_054.0.mtree", None)]
    #[case("fb_00_gather_54.0.mtree", None)]
    fn given_file_name_when_matching_then_extracts_snapshot_and_chunk(
        #[case] name: &str,
        #[case] expected: Option<(u32, u32)>,
    ) {
        let pattern = file_pattern(&layout(), 0).unwrap();
        assert_eq!(match_file(&pattern, name), expected);
    }

    #[test]
    fn given_layout_with_regex_characters_when_matching_then_treats_them_literally() {
        let mut l = layout();
        l.file_prefix = "fb.".into();
        let pattern = file_pattern(&l, 0).unwrap();
        assert!(match_file(&pattern, "fb.00_gather_001.0.mtree").is_some());
        assert!(match_file(&pattern, "fbx00_gather_001.0.mtree").is_none());
    }
}
