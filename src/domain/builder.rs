//! Main-branch assembly across snapshot catalogs

use std::collections::BTreeMap;

use tracing::trace;

use crate::domain::{HaloEntry, MergerTree, SnapshotCatalog};

/// Walks main progenitors backwards in time through consecutive catalogs.
///
/// The catalog of snapshot `s` lists each halo at `s` together with its
/// progenitors at `s - 1`.
pub struct MainBranchBuilder<'a> {
    catalogs: &'a BTreeMap<u32, SnapshotCatalog>,
    n_snaps: u32,
    n_steps: usize,
}

impl<'a> MainBranchBuilder<'a> {
    pub fn new(catalogs: &'a BTreeMap<u32, SnapshotCatalog>, n_snaps: u32, n_steps: usize) -> Self {
        Self {
            catalogs,
            n_snaps,
            n_steps,
        }
    }

    /// One tree per halo of the latest catalog, in file order.
    pub fn build_all(&self) -> Vec<MergerTree> {
        let Some(latest) = self.catalogs.get(&self.n_snaps) else {
            return Vec::new();
        };
        latest
            .halos()
            .iter()
            .filter_map(|halo| self.build(halo))
            .collect()
    }

    /// Follow `halo` back through its main progenitors.
    pub fn build(&self, halo: &HaloEntry) -> Option<MergerTree> {
        if self.n_steps == 0 {
            return None;
        }
        let mut masses = vec![halo.n_part];
        let mut ids = vec![halo.id];
        let mut current = halo;

        for step in 1..self.n_steps as u32 {
            let Some(snap) = self.n_snaps.checked_sub(step) else {
                break;
            };
            let Some(prog) = current.main_progenitor() else {
                break;
            };
            masses.push(prog.n_part);
            ids.push(prog.id);

            match self.catalogs.get(&snap).and_then(|c| c.get(prog.id)) {
                Some(next) => current = next,
                None => {
                    trace!(snap, id = prog.id, "progenitor not in catalog, branch ends");
                    break;
                }
            }
        }

        MergerTree::new(masses, ids).ok()
    }
}
