//! Domain layer: tree data, naming convention and branch assembly
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod builder;
pub mod catalog;
pub mod error;
pub mod layout;
pub mod tree;

pub use builder::MainBranchBuilder;
pub use catalog::{parse_mtree, HaloEntry, Progenitor, SnapshotCatalog};
pub use error::DomainError;
pub use layout::TreeLayout;
pub use tree::MergerTree;
