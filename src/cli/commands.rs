//! Command dispatch

use std::io;
use std::path::Path;
use std::sync::Arc;

use clap::CommandFactory;
use clap_complete::generate;
use itertools::Itertools;
use tracing::{debug, instrument};

use crate::application::services::{
    CommitOutcome, IngestReport, QueryService, SeedLayout, SeedStatus,
};
use crate::cli::args::{Cli, Commands, ConfigCommands, IngestArgs, SeedArgs};
use crate::cli::output;
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, Settings};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::traits::RealFileSystem;
use crate::infrastructure::{InfraError, SqliteStoreOpener};

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Some(Commands::Ingest(args)) => cmd_ingest(cli.config.as_deref(), args),
        Some(Commands::Scan(args)) => cmd_scan(cli.config.as_deref(), args),
        Some(Commands::Show { db, limit }) => cmd_show(db, *limit),
        Some(Commands::Tree { db, halo_id }) => cmd_tree(db, *halo_id),
        Some(Commands::Config { command }) => cmd_config(cli.config.as_deref(), command),
        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        None => Cli::command()
            .print_help()
            .map_err(|e| CliError::Infra(InfraError::io("print help", e))),
    }
}

/// Load settings and apply the seed and location flags.
fn load_settings(config: Option<&Path>, seeds: &SeedArgs) -> CliResult<Settings> {
    let mut settings = Settings::load(config)?;
    if let Some(base_dir) = &seeds.base_dir {
        settings.base_dir = base_dir.clone();
    }
    if let Some(start) = seeds.seed_start {
        settings.run.seed_start = start;
    }
    if let Some(end) = seeds.seed_end {
        settings.run.seed_end = end;
    }
    Ok(settings)
}

fn apply_ingest_flags(settings: &mut Settings, args: &IngestArgs) {
    if let Some(min_mass) = args.min_mass {
        settings.run.min_mass = min_mass;
    }
    if let Some(snaps) = args.snaps {
        settings.run.n_snaps = snaps;
    }
    if let Some(steps) = args.steps {
        settings.run.n_steps = steps;
    }
    if let Some(chunks) = args.chunks {
        settings.run.n_chunks = chunks;
    }
}

#[instrument]
fn cmd_ingest(config: Option<&Path>, args: &IngestArgs) -> CliResult<()> {
    let mut settings = load_settings(config, &args.seeds)?;
    apply_ingest_flags(&mut settings, args);
    settings
        .validate()
        .map_err(|e| CliError::InvalidArgs(e.to_string()))?;
    debug!(?settings, "effective settings");

    let seeds = settings.run.seeds();
    let container = ServiceContainer::new(settings);
    let report = container.ingest_service().run(seeds)?;
    print_ingest_report(&report);
    Ok(())
}

fn print_ingest_report(report: &IngestReport) {
    for seed in &report.seeds {
        match &seed.status {
            SeedStatus::Ingested {
                read,
                inserted,
                elapsed,
            } => output::success(&format!(
                "{}: inserted {} of {} trees into {} ({:.3}s)",
                seed.sub_dir,
                inserted,
                read,
                seed.db_path.display(),
                elapsed.as_secs_f64()
            )),
            SeedStatus::MissingTrees => output::warning(&format!(
                "{}: no tree files, created empty {}",
                seed.sub_dir,
                seed.db_path.display()
            )),
        }
        if let CommitOutcome::Failed(message) = &seed.commit {
            output::failure(&format!("commit failed for {}: {}", seed.sub_dir, message));
        }
    }
    output::action("Total", &format!("{} trees inserted", report.total_inserted()));
    if report.failed_commits() > 0 {
        output::warning(&format!(
            "{} database(s) may be incomplete",
            report.failed_commits()
        ));
    }
}

#[instrument]
fn cmd_scan(config: Option<&Path>, args: &SeedArgs) -> CliResult<()> {
    let settings = load_settings(config, args)?;
    settings
        .validate()
        .map_err(|e| CliError::InvalidArgs(e.to_string()))?;

    let seeds = settings.run.seeds();
    let n_chunks = settings.run.n_chunks;
    let container = ServiceContainer::new(settings);
    for layout in container.scan_service().scan(seeds)? {
        print_seed_layout(&layout, n_chunks);
    }
    Ok(())
}

fn print_seed_layout(layout: &SeedLayout, n_chunks: u32) {
    output::header(&format!("seed {} ({})", layout.seed, layout.tree_dir.display()));
    if !layout.dir_exists {
        output::failure("tree directory missing");
        return;
    }
    let snapshots = layout.snapshots();
    output::detail(&format!(
        "{} snapshot(s): {}",
        snapshots.len(),
        compress_ranges(&snapshots)
    ));
    if !layout.missing.is_empty() {
        output::detail(&format!("missing: {}", compress_ranges(&layout.missing)));
    }
    let incomplete = layout.incomplete(n_chunks);
    if !incomplete.is_empty() {
        output::detail(&format!(
            "chunk count differs from {}: {}",
            n_chunks,
            compress_ranges(&incomplete)
        ));
    }
    if layout.is_ingestible() {
        output::success("ready to ingest");
    } else {
        output::failure("probe file missing, seed would be skipped");
    }
    if layout.db_exists {
        output::detail("database already exists");
    }
}

/// Render sorted numbers as `1-5,8,10-12`.
fn compress_ranges(values: &[u32]) -> String {
    if values.is_empty() {
        return "-".to_string();
    }
    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for &v in values {
        match ranges.last_mut() {
            Some((_, end)) if *end + 1 == v => *end = v,
            _ => ranges.push((v, v)),
        }
    }
    ranges
        .iter()
        .map(|&(a, b)| if a == b { a.to_string() } else { format!("{a}-{b}") })
        .join(",")
}

/// Queries read a database file directly and need no settings.
fn query_service() -> QueryService {
    QueryService::new(Arc::new(RealFileSystem), Arc::new(SqliteStoreOpener))
}

#[instrument]
fn cmd_show(db: &Path, limit: usize) -> CliResult<()> {
    let query = query_service();

    let summary = query.summary(db, 5)?;
    output::header(&db.display());
    output::detail(&format!(
        "{} trees, {} steps per tree",
        summary.n_trees, summary.n_steps
    ));
    for run in &summary.runs {
        output::detail(&format!(
            "run {}: {} trees from {}",
            run.started_at, run.n_trees, run.sub_dir
        ));
    }

    let trees = query.list(db, limit)?;
    if trees.is_empty() {
        return Ok(());
    }
    output::info(&format!("{:>20} {:>8} {:>12} {:>6}", "halo_id", "sub_dir", "mass", "steps"));
    for t in trees {
        output::info(&format!(
            "{:>20} {:>8} {:>12} {:>6}",
            t.halo_id, t.sub_dir, t.root_mass, t.length
        ));
    }
    Ok(())
}

#[instrument]
fn cmd_tree(db: &Path, halo_id: u64) -> CliResult<()> {
    let tree = query_service().tree(db, halo_id)?;

    output::header(&format!("halo {} ({})", tree.halo_id, tree.sub_dir));
    output::info(&format!("{:>5} {:>20} {:>12}", "step", "id", "mass"));
    for (step, (id, mass)) in tree.ids.iter().zip(&tree.masses).enumerate() {
        output::info(&format!("{:>5} {:>20} {:>12}", step, id, mass));
    }
    Ok(())
}

fn cmd_config(config: Option<&Path>, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = Settings::load(config)?;
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Path => {
            match global_config_path() {
                Some(p) => output::action(
                    "Global",
                    &format!(
                        "{} ({})",
                        p.display(),
                        if p.exists() { "found" } else { "not found" }
                    ),
                ),
                None => output::action("Global", "unavailable"),
            }
            if let Some(p) = config {
                output::action("Explicit", &p.display());
            }
        }
        ConfigCommands::Template => output::info(&Settings::template()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[], "-")]
    #[case(&[3], "3")]
    #[case(&[1, 2, 3, 5, 7, 8], "1-3,5,7-8")]
    fn given_sorted_values_when_compressing_then_joins_ranges(
        #[case] values: &[u32],
        #[case] expected: &str,
    ) {
        assert_eq!(compress_ranges(values), expected);
    }

    #[test]
    fn given_ingest_flags_when_applying_then_override_settings() {
        let mut settings = Settings::default();
        let args = IngestArgs {
            min_mass: Some(1000),
            steps: Some(10),
            ..Default::default()
        };
        apply_ingest_flags(&mut settings, &args);
        assert_eq!(settings.run.min_mass, 1000);
        assert_eq!(settings.run.n_steps, 10);
        assert_eq!(settings.run.n_snaps, 54);
    }
}
