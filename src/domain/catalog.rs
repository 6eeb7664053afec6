//! Parsing of `.mtree` snapshot files into halo catalogs
//!
//! Format (one file per snapshot chunk):
//! ```text
//! # ID_host(1) N_particles(2) N_progenitors(3) N_orphan_steps(4)
//! # ID_progenitor(1) N_common(2) N_particles(3)
//! 1000 2500 2
//! 2000 2100 2300
//! 2001 150 400
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::domain::DomainError;

/// A progenitor candidate of a halo, found one snapshot earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progenitor {
    pub id: u64,
    /// Particles shared with the descendant
    pub n_common: u64,
    pub n_part: u64,
}

impl Progenitor {
    /// Merit of this progenitor for a descendant of `host_n_part` particles.
    ///
    /// Shared particles divided by how far the mass ratio is from one;
    /// `rank` (list position) slightly raises later entries so equal
    /// candidates never compare equal.
    pub fn merit(&self, host_n_part: u64, rank: usize) -> f64 {
        if host_n_part == 0 || self.n_part == 0 {
            return 0.0;
        }
        let mut ratio = host_n_part as f64 / self.n_part as f64;
        if ratio < 1.0 {
            ratio = 1.0 / ratio;
        }
        let merit = self.n_common as f64 / (ratio * 1.0001 - 1.0);
        merit * (1.0 + 1e-5 * rank as f64)
    }
}

/// One halo at one snapshot, with its progenitor candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaloEntry {
    pub id: u64,
    pub n_part: u64,
    pub orphan_steps: u32,
    pub progenitors: Vec<Progenitor>,
}

impl HaloEntry {
    /// Progenitor with the highest merit, see [`Progenitor::merit`].
    pub fn main_progenitor(&self) -> Option<&Progenitor> {
        self.progenitors
            .iter()
            .enumerate()
            .map(|(rank, p)| (p.merit(self.n_part, rank), p))
            .fold(None, |best: Option<(f64, &Progenitor)>, (merit, p)| match best {
                Some((b, _)) if b >= merit => best,
                _ => Some((merit, p)),
            })
            .map(|(_, p)| p)
    }
}

/// All halos of one snapshot, merged across chunk files.
#[derive(Debug, Clone, Default)]
pub struct SnapshotCatalog {
    pub snap: u32,
    halos: Vec<HaloEntry>,
    index: HashMap<u64, usize>,
}

impl SnapshotCatalog {
    pub fn new(snap: u32) -> Self {
        Self {
            snap,
            ..Default::default()
        }
    }

    /// Add a halo; a repeated id replaces the earlier entry in place.
    pub fn insert(&mut self, halo: HaloEntry) {
        if let Some(&pos) = self.index.get(&halo.id) {
            warn!(snap = self.snap, id = halo.id, "duplicate halo id, keeping last");
            self.halos[pos] = halo;
        } else {
            self.index.insert(halo.id, self.halos.len());
            self.halos.push(halo);
        }
    }

    pub fn extend(&mut self, halos: impl IntoIterator<Item = HaloEntry>) {
        for halo in halos {
            self.insert(halo);
        }
    }

    pub fn get(&self, id: u64) -> Option<&HaloEntry> {
        self.index.get(&id).map(|&pos| &self.halos[pos])
    }

    /// Halos in the order they were read.
    pub fn halos(&self) -> &[HaloEntry] {
        &self.halos
    }

    pub fn len(&self) -> usize {
        self.halos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.halos.is_empty()
    }
}

/// Parse the content of a single `.mtree` file.
///
/// `path` is only used for error messages.
pub fn parse_mtree(content: &str, path: &Path) -> Result<Vec<HaloEntry>, DomainError> {
    let mut halos = Vec::new();
    let mut lines = content
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'));

    while let Some((line_no, line)) = lines.next() {
        let fields = parse_fields(line, path, line_no)?;
        if fields.len() < 3 || fields.len() > 4 {
            return Err(invalid(
                path,
                line_no,
                format!("expected 3 or 4 columns in halo header, found {}", fields.len()),
            ));
        }
        let n_prog = fields[2];
        let orphan_steps = match fields.get(3) {
            Some(&v) => u32::try_from(v)
                .map_err(|_| invalid(path, line_no, format!("orphan steps out of range: {v}")))?,
            None => 0,
        };

        let mut progenitors = Vec::new();
        for _ in 0..n_prog {
            let (prog_no, prog_line) = lines.next().ok_or_else(|| {
                invalid(
                    path,
                    line_no,
                    format!(
                        "halo {} announces {} progenitors, file ends after {}",
                        fields[0],
                        n_prog,
                        progenitors.len()
                    ),
                )
            })?;
            let pf = parse_fields(prog_line, path, prog_no)?;
            if pf.len() < 3 {
                return Err(invalid(
                    path,
                    prog_no,
                    format!("expected at least 3 columns in progenitor line, found {}", pf.len()),
                ));
            }
            progenitors.push(Progenitor {
                id: pf[0],
                n_common: pf[1],
                n_part: pf[2],
            });
        }

        halos.push(HaloEntry {
            id: fields[0],
            n_part: fields[1],
            orphan_steps,
            progenitors,
        });
    }

    Ok(halos)
}

fn parse_fields(line: &str, path: &Path, line_no: usize) -> Result<Vec<u64>, DomainError> {
    line.split_whitespace()
        .map(|tok| {
            tok.parse::<u64>()
                .map_err(|e| invalid(path, line_no, format!("bad integer '{tok}': {e}")))
        })
        .collect()
}

fn invalid(path: &Path, line: usize, message: String) -> DomainError {
    DomainError::InvalidTreeFile {
        path: PathBuf::from(path),
        line,
        message,
    }
}
