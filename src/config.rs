//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/mtreedb/mtreedb.toml`
//! 3. Explicit config file given with `--config`
//! 4. Environment variables: `MTREEDB_*` prefix, `__` between sections
//!    (e.g. `MTREEDB_RUN__MIN_MASS=1000`)
//! 5. Command line flags (applied by the CLI layer)

use std::ops::Range;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::TreeLayout;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "MTREEDB";

/// Largest `n_steps` whose mass and id columns fit SQLite's 2000-column table limit.
pub const MAX_STEPS: usize = 998;

/// File naming of tree files and databases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LayoutConfig {
    /// Leading part of every tree file name
    pub file_prefix: String,
    /// Tag between seed and snapshot number (empty: none)
    pub tree_tag: String,
    /// Tree file extension
    pub suffix: String,
    /// Leading part of database file names
    pub db_prefix: String,
    /// Trailing part of database file names
    pub db_suffix: String,
    /// Zero padding of seed numbers
    pub seed_width: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            file_prefix: "fb_".into(),
            tree_tag: "gather".into(),
            suffix: "mtree".into(),
            db_prefix: "fullbox_".into(),
            db_suffix: "_trees.db".into(),
            seed_width: 2,
        }
    }
}

/// Parameters of one ingest run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    /// First seed (inclusive)
    pub seed_start: u32,
    /// Last seed (exclusive)
    pub seed_end: u32,
    /// Latest snapshot number
    pub n_snaps: u32,
    /// Snapshots followed back per tree
    pub n_steps: usize,
    /// Files per snapshot
    pub n_chunks: u32,
    /// Trees are kept when their latest mass is strictly above this
    pub min_mass: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed_start: 0,
            seed_end: 2,
            n_snaps: 54,
            n_steps: 54,
            n_chunks: 1,
            min_mass: 500,
        }
    }
}

impl RunConfig {
    pub fn seeds(&self) -> Range<u32> {
        self.seed_start..self.seed_end
    }
}

/// Unified configuration for mtreedb.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Directory holding per-seed tree directories and the databases
    pub base_dir: PathBuf,
    pub layout: LayoutConfig,
    pub run: RunConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            layout: LayoutConfig::default(),
            run: RunConfig::default(),
        }
    }
}

/// Default data directory (~/CLUES/DATA/FullBox/trees).
fn default_base_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join("CLUES/DATA/FullBox/trees"))
        .unwrap_or_else(|| PathBuf::from("~/CLUES/DATA/FullBox/trees"))
}

/// Get the XDG config directory for mtreedb.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "mtreedb").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("mtreedb.toml"))
}

impl Settings {
    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `explicit` - Optional config file passed on the command line; must exist
    pub fn load(explicit: Option<&Path>) -> Result<Self, ApplicationError> {
        Self::load_with(global_config_path().as_deref(), explicit, ENV_PREFIX)
    }

    /// Load from the given layers; `env_prefix` selects the environment overrides.
    pub fn load_with(
        global: Option<&Path>,
        explicit: Option<&Path>,
        env_prefix: &str,
    ) -> Result<Self, ApplicationError> {
        // 1. Defaults, serialized so every key has a value
        let defaults = toml::to_string(&Settings::default()).map_err(|e| {
            ApplicationError::Config {
                message: format!("serialize defaults: {e}"),
            }
        })?;
        let mut builder = Config::builder().add_source(File::from_str(&defaults, FileFormat::Toml));

        // 2. Global config, optional
        if let Some(global_path) = global {
            if global_path.exists() {
                builder = builder.add_source(File::from(global_path).required(false));
            }
        }

        // 3. Explicit config, required
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ApplicationError::Config {
                    message: format!("config file not found: {}", path.display()),
                });
            }
            builder = builder.add_source(File::from(path).required(true));
        }

        // 4. Environment overrides
        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_err)?;
        let mut settings: Self = config.try_deserialize().map_err(config_err)?;

        // Expand ~ and $VAR in path-like fields
        settings.expand_paths();

        Ok(settings)
    }

    /// Expand shell variables and tilde in `base_dir`.
    ///
    /// Handles `~`, `$VAR`, and `${VAR}` syntax; unknown variables are kept verbatim.
    fn expand_paths(&mut self) {
        let raw = self.base_dir.to_string_lossy().into_owned();
        if let Ok(expanded) = shellexpand::full(&raw) {
            self.base_dir = PathBuf::from(expanded.into_owned());
        }
    }

    /// Reject settings that cannot describe a run.
    pub fn validate(&self) -> Result<(), ApplicationError> {
        let fail = |message: String| Err(ApplicationError::Config { message });
        if self.run.seed_end < self.run.seed_start {
            return fail(format!(
                "seed_end ({}) is below seed_start ({})",
                self.run.seed_end, self.run.seed_start
            ));
        }
        if self.run.n_steps == 0 {
            return fail("n_steps must be at least 1".into());
        }
        if self.run.n_steps > MAX_STEPS {
            return fail(format!(
                "n_steps ({}) exceeds the maximum of {}",
                self.run.n_steps, MAX_STEPS
            ));
        }
        if self.run.n_chunks == 0 {
            return fail("n_chunks must be at least 1".into());
        }
        if self.layout.seed_width == 0 {
            return fail("seed_width must be at least 1".into());
        }
        if self.layout.suffix.is_empty() {
            return fail("suffix must not be empty".into());
        }
        Ok(())
    }

    /// Naming convention derived from these settings.
    pub fn layout(&self) -> TreeLayout {
        TreeLayout {
            base_dir: self.base_dir.clone(),
            file_prefix: self.layout.file_prefix.clone(),
            tree_tag: self.layout.tree_tag.clone(),
            suffix: self.layout.suffix.clone(),
            db_prefix: self.layout.db_prefix.clone(),
            db_suffix: self.layout.db_suffix.clone(),
            seed_width: self.layout.seed_width,
            n_snaps: self.run.n_snaps,
        }
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# mtreedb configuration
#
# Locations (by precedence, lowest to highest):
#   Global:   ~/.config/mtreedb/mtreedb.toml
#   Explicit: mtreedb --config <file>
#   Env:      MTREEDB_* environment variables, e.g. MTREEDB_RUN__MIN_MASS=1000
#   Flags:    command line options of `mtreedb ingest` / `mtreedb scan`

# Directory holding one sub-directory of tree files per seed;
# databases are written next to them
# base_dir = "~/CLUES/DATA/FullBox/trees"

[layout]
# Tree files: <base_dir>/<seed>/<file_prefix><seed>_<tree_tag>_<snap:03>.<chunk>.<suffix>
# file_prefix = "fb_"
# tree_tag = "gather"     # set to "" for <file_prefix><seed>_<snap>...
# suffix = "mtree"

# Databases: <base_dir>/<db_prefix><seed><db_suffix>
# db_prefix = "fullbox_"
# db_suffix = "_trees.db"

# Zero padding of seed numbers
# seed_width = 2

[run]
# Seeds to ingest: seed_start <= seed < seed_end
# seed_start = 0
# seed_end = 2

# Latest snapshot, and how many snapshots to follow back
# n_snaps = 54
# n_steps = 54

# Files per snapshot
# n_chunks = 1

# Keep trees whose latest mass (in particles) is above this value
# min_mass = 500
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
