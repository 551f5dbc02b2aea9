use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;
use thiserror::Error;

use crate::spawn_group::SpawnGroupSettings;

pub const BUILTIN_OVERSEER_CONFIG: &str = include_str!("data/overseer_config.json");
pub const OVERSEER_CONFIG_ENV: &str = "OVERSEER_CONFIG_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServerKind {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Autonomy {
    Manual,
    SemiAutomatic,
    #[default]
    Automatic,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OverseerConfig {
    pub server: ServerKind,
    pub seed: u64,
    pub scheduler: SchedulerConfig,
    pub logistics: LogisticsConfig,
    pub defense: DefenseConfig,
    pub expansion: ExpansionConfig,
    pub spawning: SpawningConfig,
}

impl OverseerConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_OVERSEER_CONFIG)
                .expect("builtin overseer config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, OverseerConfigError> {
        let config: OverseerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, OverseerConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| OverseerConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json_str(&contents)
    }

    pub fn is_private(&self) -> bool {
        self.server == ServerKind::Private
    }

    fn validate(&self) -> Result<(), OverseerConfigError> {
        if self.expansion.outpost_check_frequency_public == 0
            || self.expansion.outpost_check_frequency_private == 0
        {
            return Err(OverseerConfigError::Invalid(
                "outpost check frequency must be positive".to_string(),
            ));
        }
        if self.expansion.pioneer_check_interval == 0 {
            return Err(OverseerConfigError::Invalid(
                "pioneer check interval must be positive".to_string(),
            ));
        }
        if self.expansion.remote_sources_by_level.len() < 9 {
            return Err(OverseerConfigError::Invalid(format!(
                "remote_sources_by_level needs 9 entries, found {}",
                self.expansion.remote_sources_by_level.len()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum OverseerConfigError {
    #[error("failed to parse overseer config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read overseer config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid overseer config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Record task faults and keep going instead of aborting the phase.
    pub isolate_faults: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            isolate_faults: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogisticsConfig {
    pub dropped_resource_threshold: u32,
}

impl Default for LogisticsConfig {
    fn default() -> Self {
        Self {
            dropped_resource_threshold: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DefenseConfig {
    pub invasion_required_level: u8,
    pub invasion_threshold: u32,
    pub invasion_persistence_ticks: u64,
    pub boosted_hostile_weight: u32,
    pub nuke_required_level: u8,
    pub safe_mode_hostile_range: u32,
    pub guard_grace_ticks: u64,
}

impl Default for DefenseConfig {
    fn default() -> Self {
        Self {
            invasion_required_level: 3,
            invasion_threshold: 3,
            invasion_persistence_ticks: 20,
            boosted_hostile_weight: 2,
            nuke_required_level: 4,
            safe_mode_hostile_range: 2,
            guard_grace_ticks: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub autonomy: Autonomy,
    pub outpost_check_frequency_public: u64,
    pub outpost_check_frequency_private: u64,
    pub outpost_search_radius: u32,
    pub max_source_distance: u32,
    pub remote_sources_by_level: Vec<u32>,
    pub pioneer_check_interval: u64,
}

impl ExpansionConfig {
    pub fn outpost_check_frequency(&self, server: ServerKind) -> u64 {
        match server {
            ServerKind::Public => self.outpost_check_frequency_public,
            ServerKind::Private => self.outpost_check_frequency_private,
        }
    }

    pub fn remote_source_target(&self, level: u8) -> u32 {
        self.remote_sources_by_level
            .get(usize::from(level))
            .or_else(|| self.remote_sources_by_level.last())
            .copied()
            .unwrap_or(0)
    }
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            autonomy: Autonomy::Automatic,
            outpost_check_frequency_public: 250,
            outpost_check_frequency_private: 100,
            outpost_search_radius: 3,
            max_source_distance: 100,
            remote_sources_by_level: vec![0, 1, 2, 3, 4, 5, 6, 7, 9],
            pioneer_check_interval: 25,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpawningConfig {
    pub max_linear_distance: u32,
    pub max_path_distance: u32,
    pub recache_ticks_public: u64,
    pub recache_ticks_private: u64,
    pub recache_jitter: u64,
    pub handoff_ticks: u64,
    pub queen_role: String,
    pub allocation: SpawnGroupSettings,
}

impl SpawningConfig {
    pub fn recache_ticks(&self, server: ServerKind) -> u64 {
        match server {
            ServerKind::Public => self.recache_ticks_public,
            ServerKind::Private => self.recache_ticks_private,
        }
    }
}

impl Default for SpawningConfig {
    fn default() -> Self {
        Self {
            max_linear_distance: 10,
            max_path_distance: 600,
            recache_ticks_public: 2000,
            recache_ticks_private: 1000,
            recache_jitter: 250,
            handoff_ticks: 25,
            queen_role: "queen".to_string(),
            allocation: SpawnGroupSettings::default(),
        }
    }
}

pub fn load_overseer_config_from_env() -> (Arc<OverseerConfig>, Option<PathBuf>) {
    let Some(path) = env::var(OVERSEER_CONFIG_ENV).ok().map(PathBuf::from) else {
        tracing::info!(target: "overseer::config", "overseer_config.loaded=builtin");
        return (OverseerConfig::builtin(), None);
    };

    match OverseerConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "overseer::config",
                path = %path.display(),
                "overseer_config.loaded=file"
            );
            (Arc::new(config), Some(path))
        }
        Err(err) => {
            tracing::warn!(
                target: "overseer::config",
                path = %path.display(),
                error = %err,
                "overseer_config.load_failed"
            );
            tracing::info!(target: "overseer::config", "overseer_config.loaded=builtin");
            (OverseerConfig::builtin(), None)
        }
    }
}
