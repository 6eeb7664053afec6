//! Application services

pub mod ingest;
pub mod query;
pub mod reader;
pub mod scan;

pub use ingest::{CommitOutcome, IngestReport, IngestService, SeedReport, SeedStatus};
pub use query::{DatabaseSummary, QueryService};
pub use reader::{ReadSettings, TreeReader};
pub use scan::{ScanService, SeedLayout};
