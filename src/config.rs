//! Configuration loading for the seshat backend.
//!
//! A single `seshat.toml` carries the active environment, server binding,
//! data paths, embedding settings, and planner settings. Every section has
//! defaults; `[data]` paths are resolved relative to the project root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Recommended dimensionality per embedding model, used when the config
/// leaves `dimensions` unset.
pub fn recommended_dimensions(model: &str) -> usize {
    let table: HashMap<&str, usize> = HashMap::from([
        ("text-embedding-3-small", 512),
        ("text-embedding-3-large", 1024),
        ("text-embedding-ada-002", 1536),
    ]);
    table.get(model).copied().unwrap_or(512)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Id of the environment to load at startup.
    pub active_env: Option<String>,
    pub server: ServerConfig,
    pub data: DataConfig,
    pub embedding: EmbeddingSettings,
    pub planner: PlannerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            active_env: None,
            server: ServerConfig::default(),
            data: DataConfig::default(),
            embedding: EmbeddingSettings::default(),
            planner: PlannerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8600,
            base_url: "http://localhost:8600".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub root: PathBuf,
    pub schema: PathBuf,
    pub domain: PathBuf,
    pub envs_dir: PathBuf,
    pub relationship_mapping: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            schema: PathBuf::from("data/schema.ttl"),
            domain: PathBuf::from("data/domain.pddl"),
            envs_dir: PathBuf::from("data/envs"),
            relationship_mapping: PathBuf::from("action/relationship_mapping.json"),
        }
    }
}

/// Per-role embedding model configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingRole {
    pub model: String,
    pub dimensions: Option<usize>,
}

impl Default for EmbeddingRole {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
        }
    }
}

impl EmbeddingRole {
    /// Explicit dimensions, or the model's recommended default.
    pub fn resolved_dimensions(&self) -> usize {
        self.dimensions
            .unwrap_or_else(|| recommended_dimensions(&self.model))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// true: call the embedding service and write caches.
    /// false: require the caches and refuse to start on a mismatch.
    pub generate: bool,
    /// Embedding service endpoint; unset disables generation with a warning.
    pub endpoint: Option<String>,
    /// Environment variable holding the service API key.
    pub api_key_env: String,
    pub category: EmbeddingRole,
    pub description: EmbeddingRole,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            generate: true,
            endpoint: None,
            api_key_env: "SESHAT_EMBED_API_KEY".to_string(),
            category: EmbeddingRole::default(),
            description: EmbeddingRole::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Fast Downward launcher (path or something on $PATH).
    pub command: String,
    pub solver: String,
    pub heuristic: String,
    pub weight: u32,
    pub timeout_secs: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            command: "fast-downward".to_string(),
            solver: "lazy_wastar".to_string(),
            heuristic: "ff".to_string(),
            weight: 2,
            timeout_secs: 60,
        }
    }
}

impl PlannerConfig {
    /// Build the Fast Downward `--search` argument.
    pub fn search_command(&self) -> String {
        match self.solver.as_str() {
            "astar" => format!("astar({}())", self.heuristic),
            "lama" => "lazy(alt([lama_synergy()], boost=1000), preferred=[lama_synergy()])"
                .to_string(),
            _ => format!("lazy_wastar([{}()], w={})", self.heuristic, self.weight),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// The active environment id, or the startup-fatal error.
    pub fn active_env(&self) -> Result<&str, ConfigError> {
        self.active_env
            .as_deref()
            .ok_or(ConfigError::NoActiveEnv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = Config::default();
        assert_eq!(config.server.port, 8600);
        assert!(config.embedding.generate);
        assert_eq!(config.planner.timeout_secs, 60);
        assert!(config.active_env().is_err());
    }

    #[test]
    fn parse_minimal_toml() {
        let text = r#"
active_env = "Adairsville"

[embedding]
generate = false

[planner]
solver = "astar"
heuristic = "ff"
"#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.active_env().unwrap(), "Adairsville");
        assert!(!config.embedding.generate);
        assert_eq!(config.planner.search_command(), "astar(ff())");
    }

    #[test]
    fn search_command_variants() {
        let mut planner = PlannerConfig::default();
        assert_eq!(planner.search_command(), "lazy_wastar([ff()], w=2)");
        planner.solver = "lama".into();
        assert!(planner.search_command().contains("lama_synergy"));
    }

    #[test]
    fn resolved_dimensions_fall_back_to_recommended() {
        let role = EmbeddingRole {
            model: "text-embedding-3-large".into(),
            dimensions: None,
        };
        assert_eq!(role.resolved_dimensions(), 1024);
        let pinned = EmbeddingRole {
            model: "text-embedding-3-large".into(),
            dimensions: Some(256),
        };
        assert_eq!(pinned.resolved_dimensions(), 256);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = Config::load(Path::new("/nonexistent/seshat.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }
}
