//! Project directory layout.
//!
//! Resolves every path the backend reads or writes: per-environment input
//! TTL and embedding caches under `data/envs/{env}/`, the versioned world
//! state and per-step logs under `action/`, and per-goal planner artifacts
//! under `plans/{stamp}/`.

use std::path::{Path, PathBuf};

use crate::config::DataConfig;
use crate::error::ConfigError;

/// Project-level directories, resolved from the config's `[data]` section
/// against a root directory.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    /// Shared OWL schema (Turtle).
    pub schema_file: PathBuf,
    /// Fixed PDDL domain file.
    pub domain_file: PathBuf,
    /// `data/envs/`.
    pub envs_dir: PathBuf,
    /// `action/relationship_mapping.json`.
    pub relationship_mapping: PathBuf,
    /// `action/world/` — versioned `{dynamic,static}_N.ttl`.
    pub world_dir: PathBuf,
    /// `action/log/` — per-step `N.json`.
    pub log_dir: PathBuf,
    /// `action/plan/` — current `solution.plan`.
    pub plan_dir: PathBuf,
    /// `plans/` — per-goal output directories.
    pub plans_dir: PathBuf,
}

impl ProjectPaths {
    pub fn resolve(root: &Path, data: &DataConfig) -> Self {
        let join = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                root.join(p)
            }
        };
        let action_dir = root.join("action");
        Self {
            root: root.to_path_buf(),
            schema_file: join(&data.schema),
            domain_file: join(&data.domain),
            envs_dir: join(&data.envs_dir),
            relationship_mapping: join(&data.relationship_mapping),
            world_dir: action_dir.join("world"),
            log_dir: action_dir.join("log"),
            plan_dir: action_dir.join("plan"),
            plans_dir: root.join("plans"),
        }
    }

    /// Create the writable directories. Idempotent.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [
            &self.world_dir,
            &self.log_dir,
            &self.plan_dir,
            &self.plans_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::Io {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Paths of a named environment.
    pub fn env(&self, env_id: &str) -> EnvPaths {
        let root = self.envs_dir.join(env_id);
        EnvPaths {
            env_id: env_id.to_string(),
            static_ttl: root.join("static.ttl"),
            dynamic_ttl: root.join("dynamic.ttl"),
            static_embeddings: root.join("static_embeddings.json"),
            dynamic_embeddings: root.join("dynamic_embeddings.json"),
            category_embeddings: root.join("category_embeddings.json"),
            root,
        }
    }

    /// List environment ids present on disk.
    pub fn list_envs(&self) -> Vec<String> {
        match std::fs::read_dir(&self.envs_dir) {
            Ok(entries) => {
                let mut ids: Vec<String> = entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
                    .filter_map(|e| e.file_name().into_string().ok())
                    .collect();
                ids.sort();
                ids
            }
            Err(_) => Vec::new(),
        }
    }
}

/// Per-environment file layout under `data/envs/{env}/`.
#[derive(Debug, Clone)]
pub struct EnvPaths {
    pub env_id: String,
    pub root: PathBuf,
    pub static_ttl: PathBuf,
    pub dynamic_ttl: PathBuf,
    pub static_embeddings: PathBuf,
    pub dynamic_embeddings: PathBuf,
    pub category_embeddings: PathBuf,
}

impl EnvPaths {
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Both input files present?
    pub fn has_world_files(&self) -> bool {
        self.static_ttl.is_file() && self.dynamic_ttl.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataConfig;

    #[test]
    fn layout_derives_from_root() {
        let paths = ProjectPaths::resolve(Path::new("/proj"), &DataConfig::default());
        assert_eq!(paths.schema_file, PathBuf::from("/proj/data/schema.ttl"));
        assert_eq!(paths.world_dir, PathBuf::from("/proj/action/world"));
        assert_eq!(paths.log_dir, PathBuf::from("/proj/action/log"));
        assert_eq!(paths.plans_dir, PathBuf::from("/proj/plans"));

        let env = paths.env("Adairsville");
        assert_eq!(
            env.dynamic_ttl,
            PathBuf::from("/proj/data/envs/Adairsville/dynamic.ttl")
        );
        assert_eq!(
            env.category_embeddings,
            PathBuf::from("/proj/data/envs/Adairsville/category_embeddings.json")
        );
    }

    #[test]
    fn absolute_config_paths_win() {
        let data = DataConfig {
            schema: PathBuf::from("/shared/schema.ttl"),
            ..Default::default()
        };
        let paths = ProjectPaths::resolve(Path::new("/proj"), &data);
        assert_eq!(paths.schema_file, PathBuf::from("/shared/schema.ttl"));
    }

    #[test]
    fn list_envs_missing_dir_is_empty() {
        let paths = ProjectPaths::resolve(Path::new("/nonexistent"), &DataConfig::default());
        assert!(paths.list_envs().is_empty());
    }

    #[test]
    fn ensure_dirs_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = ProjectPaths::resolve(tmp.path(), &DataConfig::default());
        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();
        assert!(paths.world_dir.is_dir());
        assert!(paths.log_dir.is_dir());
    }
}
