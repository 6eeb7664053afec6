//! Merger tree entity: the main branch of a halo

use crate::domain::DomainError;

/// Main branch of one halo, latest snapshot first.
///
/// `masses[i]` and `ids[i]` describe the same halo `i` steps back in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergerTree {
    masses: Vec<u64>,
    ids: Vec<u64>,
}

impl MergerTree {
    pub fn new(masses: Vec<u64>, ids: Vec<u64>) -> Result<Self, DomainError> {
        if masses.len() != ids.len() {
            return Err(DomainError::MismatchedArrays {
                masses: masses.len(),
                ids: ids.len(),
            });
        }
        if masses.is_empty() {
            return Err(DomainError::EmptyTree);
        }
        Ok(Self { masses, ids })
    }

    /// Id of the halo at the latest snapshot.
    pub fn main_id(&self) -> u64 {
        self.ids[0]
    }

    /// Mass (in particles) at the latest snapshot.
    pub fn root_mass(&self) -> u64 {
        self.masses[0]
    }

    pub fn mass_id(&self) -> (&[u64], &[u64]) {
        (&self.masses, &self.ids)
    }

    pub fn masses(&self) -> &[u64] {
        &self.masses
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// Number of snapshots the branch spans.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn exceeds(&self, min_mass: u64) -> bool {
        self.root_mass() > min_mass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn given_mismatched_arrays_when_creating_then_fails() {
        let err = MergerTree::new(vec![1, 2], vec![1]).unwrap_err();
        assert!(matches!(
            err,
            DomainError::MismatchedArrays { masses: 2, ids: 1 }
        ));
    }

    #[test]
    fn given_empty_arrays_when_creating_then_fails() {
        assert!(matches!(
            MergerTree::new(vec![], vec![]),
            Err(DomainError::EmptyTree)
        ));
    }

    #[rstest]
    #[case(501, true)]
    #[case(500, false)]
    #[case(499, false)]
    fn given_root_mass_when_filtering_then_threshold_is_strict(
        #[case] mass: u64,
        #[case] kept: bool,
    ) {
        let tree = MergerTree::new(vec![mass, 10], vec![7, 8]).unwrap();
        assert_eq!(tree.exceeds(500), kept);
        assert_eq!(tree.main_id(), 7);
    }
}
