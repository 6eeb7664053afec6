//! On-disk naming convention for tree files and per-seed databases

use std::path::{Path, PathBuf};

/// Naming scheme for one simulation box.
///
/// For seed 3 with the default scheme:
/// - tree directory: `<base_dir>/03`
/// - tree files:     `<base_dir>/03/fb_03_gather_054.0.mtree`
/// - database:       `<base_dir>/fullbox_03_trees.db`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLayout {
    pub base_dir: PathBuf,
    pub file_prefix: String,
    /// Inserted between seed and snapshot number; empty means no tag
    pub tree_tag: String,
    pub suffix: String,
    pub db_prefix: String,
    pub db_suffix: String,
    pub seed_width: usize,
    /// Latest snapshot number, used for the probe file
    pub n_snaps: u32,
}

impl TreeLayout {
    /// Zero-padded seed, also used as the seed's sub-directory name.
    pub fn seed_str(&self, seed: u32) -> String {
        format!("{:0width$}", seed, width = self.seed_width)
    }

    pub fn tree_dir(&self, seed: u32) -> PathBuf {
        self.base_dir.join(self.seed_str(seed))
    }

    /// File name stem shared by all snapshots and chunks of a seed.
    pub fn root_name(&self, seed: u32) -> String {
        if self.tree_tag.is_empty() {
            format!("{}{}_", self.file_prefix, self.seed_str(seed))
        } else {
            format!(
                "{}{}_{}_",
                self.file_prefix,
                self.seed_str(seed),
                self.tree_tag
            )
        }
    }

    /// Path prefix handed to the tree reader: `<tree_dir>/<root_name>`.
    pub fn root_path(&self, seed: u32) -> PathBuf {
        self.tree_dir(seed).join(self.root_name(seed))
    }

    pub fn chunk_file(&self, seed: u32, snap: u32, chunk: u32) -> PathBuf {
        self.tree_dir(seed)
            .join(chunk_file_name(&self.root_name(seed), snap, chunk, &self.suffix))
    }

    /// Chunk 0 of the latest snapshot; its presence marks a seed as ingestible.
    pub fn probe_file(&self, seed: u32) -> PathBuf {
        self.chunk_file(seed, self.n_snaps, 0)
    }

    pub fn db_path(&self, seed: u32) -> PathBuf {
        self.base_dir.join(format!(
            "{}{}{}",
            self.db_prefix,
            self.seed_str(seed),
            self.db_suffix
        ))
    }
}

/// `<root_name><snap:03>.<chunk>.<suffix>`
pub fn chunk_file_name(root_name: &str, snap: u32, chunk: u32, suffix: &str) -> String {
    format!("{}{:03}.{}.{}", root_name, snap, chunk, suffix)
}

/// Join a root path (directory plus file stem) with a chunk file name.
pub fn chunk_path(root: &Path, snap: u32, chunk: u32, suffix: &str) -> PathBuf {
    let stem = root
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = chunk_file_name(&stem, snap, chunk, suffix);
    match root.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn layout() -> TreeLayout {
        TreeLayout {
            base_dir: PathBuf::from("/data/trees"),
            file_prefix: "fb_".into(),
            tree_tag: "gather".into(),
            suffix: "mtree".into(),
            db_prefix: "fullbox_".into(),
            db_suffix: "_trees.db".into(),
            seed_width: 2,
            n_snaps: 54,
        }
    }

    #[rstest]
    #[case(0, "00")]
    #[case(7, "07")]
    #[case(12, "12")]
    #[case(123, "123")]
    fn given_seed_when_formatting_then_pads_to_width(#[case] seed: u32, #[case] expected: &str) {
        assert_eq!(layout().seed_str(seed), expected);
    }

    #[test]
    fn given_default_layout_when_building_paths_then_follows_naming_convention() {
        let l = layout();
        assert_eq!(l.tree_dir(1), PathBuf::from("/data/trees/01"));
        assert_eq!(l.root_name(1), "fb_01_gather_");
        assert_eq!(
            l.probe_file(1),
            PathBuf::from("/data/trees/01/fb_01_gather_054.0.mtree")
        );
        assert_eq!(
            l.chunk_file(1, 7, 3),
            PathBuf::from("/data/trees/01/fb_01_gather_007.3.mtree")
        );
        assert_eq!(l.db_path(1), PathBuf::from("/data/trees/fullbox_01_trees.db"));
    }

    #[test]
    fn given_empty_tag_when_building_root_name_then_omits_tag() {
        let l = TreeLayout {
            tree_tag: String::new(),
            ..layout()
        };
        assert_eq!(l.root_name(0), "fb_00_");
        assert_eq!(
            l.probe_file(0),
            PathBuf::from("/data/trees/00/fb_00_054.0.mtree")
        );
    }

    #[test]
    fn given_root_path_when_building_chunk_path_then_matches_layout() {
        let l = layout();
        assert_eq!(
            chunk_path(&l.root_path(2), 53, 0, "mtree"),
            l.chunk_file(2, 53, 0)
        );
    }
}
