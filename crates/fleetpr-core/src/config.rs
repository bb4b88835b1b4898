//! Fleet configuration loaded from TOML.
//!
//! Lookup order: an explicit path, then `<config_dir>/fleetpr.toml`, then
//! built-in defaults. `FLEETPR_ROOT` overrides `paths.root`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::discovery::RepoGroup;
use crate::domain::error::{FleetError, Result};
use crate::tickets::TicketPattern;

pub const CONFIG_FILE_NAME: &str = "fleetpr.toml";
pub const ROOT_ENV_VAR: &str = "FLEETPR_ROOT";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub paths: PathsConfig,
    pub tickets: TicketsConfig,
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Fleet root; a leading `~` expands to the home directory.
    pub root: String,
    pub groups: Vec<RepoGroup>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: "~/code/fleet".to_string(),
            groups: vec![
                RepoGroup::new("frontend", "frontend/*"),
                RepoGroup::new("backend", "backend/*"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketsConfig {
    /// Case-insensitive ticket regex. Empty disables extraction.
    pub pattern: String,
    /// Issue-tracker organization, used only for links in PR bodies.
    pub org: String,
}

impl Default for TicketsConfig {
    fn default() -> Self {
        Self {
            pattern: "ATT-[0-9]+".to_string(),
            org: "attuned".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Record and warn about per-repository scan errors instead of silently
    /// treating them as "no commits".
    pub surface_errors: bool,
    /// Concurrent existing-PR lookups during the batch preflight.
    pub existing_pr_concurrency: usize,
    pub git_timeout_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            surface_errors: false,
            existing_pr_concurrency: 4,
            git_timeout_secs: 120,
        }
    }
}

impl ScanConfig {
    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }
}

impl FleetConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: FleetConfig =
            toml::from_str(text).map_err(|e| FleetError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `explicit`, else the default location, else defaults.
    ///
    /// A missing explicit file is an error; a missing default file is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::read(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::read(&path)?,
                _ => {
                    debug!("no config file found, using defaults");
                    let config = Self::default();
                    config.validate()?;
                    config
                }
            },
        };
        if let Ok(root) = std::env::var(ROOT_ENV_VAR) {
            if !root.is_empty() {
                config.paths.root = root;
            }
        }
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        let text = std::fs::read_to_string(path).map_err(|e| {
            FleetError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    fn validate(&self) -> Result<()> {
        self.ticket_pattern()?;
        if self.paths.groups.is_empty() {
            return Err(FleetError::Config(
                "paths.groups must name at least one repository group".to_string(),
            ));
        }
        if self.scan.existing_pr_concurrency == 0 {
            return Err(FleetError::Config(
                "scan.existing_pr_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ticket_pattern(&self) -> Result<TicketPattern> {
        TicketPattern::compile(&self.tickets.pattern)
    }

    /// `paths.root` with a leading `~` expanded.
    pub fn root(&self) -> PathBuf {
        expand_home(&self.paths.root)
    }
}

/// `<config_dir>/fleetpr.toml`, when the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches('/')),
            None => PathBuf::from(path),
        },
        _ => PathBuf::from(path),
    }
}
