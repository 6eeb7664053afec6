//! mtreedb: batch ingestion of halo merger trees into per-seed SQLite databases

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
