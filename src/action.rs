//! Action executor: one plan step at a time against the versioned world.
//!
//! Each action produces the next `{dynamic,static}_N.ttl` pair, an RDF-level
//! diff, a derived SPARQL update (asserted plus mapped inferred deletions),
//! a knowledge-store apply, and an append-only JSON log. Any failure writes
//! a failed log and halts the workflow — no further actions run.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::Serialize;

use crate::error::ActionError;
use crate::paths::{EnvPaths, ProjectPaths};
use crate::ttl::{self, RelationshipMapping};
use crate::world::World;

/// A parsed `(move robot from to)` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveAction {
    pub robot: String,
    pub from: String,
    pub to: String,
}

/// Parse a move action string.
pub fn parse_move(action: &str) -> Result<MoveAction, ActionError> {
    static MOVE: OnceLock<Regex> = OnceLock::new();
    let pattern = MOVE.get_or_init(|| Regex::new(r"^\(move\s+(\w+)\s+(\w+)\s+(\w+)\)$").unwrap());
    let caps = pattern
        .captures(action.trim())
        .ok_or_else(|| ActionError::Parse {
            action: action.to_string(),
        })?;
    Ok(MoveAction {
        robot: caps[1].to_string(),
        from: caps[2].to_string(),
        to: caps[3].to_string(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionDetail {
    pub raw: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub robot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_location: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TtlFilePair {
    pub dynamic: String,
    #[serde(rename = "static")]
    pub static_file: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateDetail {
    pub ttl_files: TtlFiles,
    pub relationships: RelationshipCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct TtlFiles {
    pub original: TtlFilePair,
    pub updated: TtlFilePair,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipCounts {
    pub removed: usize,
    pub added: usize,
}

/// The per-step JSON log written to `action/log/N.json`.
#[derive(Debug, Clone, Serialize)]
pub struct ActionLog {
    pub action_number: usize,
    pub unix_time: u64,
    pub action: ActionDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updates: Option<UpdateDetail>,
    pub elapsed_time_seconds: f64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Executor over the versioned world directory. Versions and logs are
/// append-only and strictly sequential.
pub struct ActionExecutor {
    world_dir: PathBuf,
    log_dir: PathBuf,
    mapping: RelationshipMapping,
    namespace: String,
    executed: usize,
}

impl ActionExecutor {
    /// Attach to the project's action directories, resuming the version
    /// counter from what is already on disk.
    pub fn new(paths: &ProjectPaths, mapping: RelationshipMapping, namespace: String) -> Self {
        let next = ttl::next_version(&paths.world_dir, "dynamic");
        let executed = next.saturating_sub(1);
        Self {
            world_dir: paths.world_dir.clone(),
            log_dir: paths.log_dir.clone(),
            mapping,
            namespace,
            executed,
        }
    }

    pub fn executed_count(&self) -> usize {
        self.executed
    }

    /// Seed version 0 from the environment's input TTL files.
    pub fn init_world(&mut self, env: &EnvPaths) -> Result<(), ActionError> {
        std::fs::create_dir_all(&self.world_dir).map_err(|e| ActionError::Io {
            path: self.world_dir.display().to_string(),
            source: e,
        })?;
        for (source, base) in [(&env.dynamic_ttl, "dynamic"), (&env.static_ttl, "static")] {
            let target = ttl::version_path(&self.world_dir, base, 0);
            std::fs::copy(source, &target).map_err(|e| ActionError::Io {
                path: source.display().to_string(),
                source: e,
            })?;
        }
        self.executed = 0;
        tracing::info!(dir = %self.world_dir.display(), "seeded world state version 0");
        Ok(())
    }

    /// Execute one action. On failure a failed log is written and the error
    /// returned; the caller must not dispatch further actions.
    pub fn execute(&mut self, world: &mut World, action: &str) -> Result<ActionLog, ActionError> {
        let started = Instant::now();
        let number = self.executed + 1;

        match self.try_execute(world, action, number, started) {
            Ok(log) => {
                self.write_log(&log);
                self.executed = number;
                Ok(log)
            }
            Err(e) => {
                let log = ActionLog {
                    action_number: number,
                    unix_time: unix_time(),
                    action: ActionDetail {
                        raw: action.to_string(),
                        kind: "move".to_string(),
                        robot: None,
                        from_location: None,
                        to_location: None,
                    },
                    updates: None,
                    elapsed_time_seconds: started.elapsed().as_secs_f64(),
                    status: "failed".to_string(),
                    error: Some(e.to_string()),
                };
                self.write_log(&log);
                Err(e)
            }
        }
    }

    fn try_execute(
        &self,
        world: &mut World,
        action: &str,
        number: usize,
        started: Instant,
    ) -> Result<ActionLog, ActionError> {
        if !action.trim_start().starts_with("(move") {
            return Err(ActionError::Unsupported {
                action: action.to_string(),
            });
        }
        let move_action = parse_move(action)?;

        // Previous state must exist; versions are never skipped.
        let prev_dynamic = ttl::version_path(&self.world_dir, "dynamic", number - 1);
        let prev_static = ttl::version_path(&self.world_dir, "static", number - 1);
        if !prev_dynamic.exists() {
            return Err(ActionError::MissingVersion {
                version: number - 1,
                path: prev_dynamic.display().to_string(),
            });
        }

        // Next version: rewrite the one robotIsInSpace line, copy static.
        let next_dynamic = ttl::version_path(&self.world_dir, "dynamic", number);
        let next_static = ttl::version_path(&self.world_dir, "static", number);
        ttl::apply_move(
            &prev_dynamic,
            &next_dynamic,
            "robotIsInSpace",
            &move_action.from,
            &move_action.to,
        )?;
        if prev_static.exists() {
            std::fs::copy(&prev_static, &next_static).map_err(|e| ActionError::Io {
                path: next_static.display().to_string(),
                source: e,
            })?;
        }

        // Diff and derive the update, inferred deletions included.
        let (added, removed) = ttl::diff(&prev_dynamic, &next_dynamic)?;
        let query = ttl::sparql_from_diff(&added, &removed, &self.mapping, &self.namespace);

        // Submit to the knowledge store (reason + incremental sync inside).
        world
            .execute_sparql_update(&query)
            .map_err(|e| ActionError::UpdateFailed {
                message: e.to_string(),
            })?;

        let file_name = |p: &Path| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        Ok(ActionLog {
            action_number: number,
            unix_time: unix_time(),
            action: ActionDetail {
                raw: action.to_string(),
                kind: "move".to_string(),
                robot: Some(move_action.robot),
                from_location: Some(move_action.from),
                to_location: Some(move_action.to),
            },
            updates: Some(UpdateDetail {
                ttl_files: TtlFiles {
                    original: TtlFilePair {
                        dynamic: file_name(&prev_dynamic),
                        static_file: file_name(&prev_static),
                    },
                    updated: TtlFilePair {
                        dynamic: file_name(&next_dynamic),
                        static_file: file_name(&next_static),
                    },
                },
                relationships: RelationshipCounts {
                    removed: removed.len(),
                    added: added.len(),
                },
            }),
            elapsed_time_seconds: started.elapsed().as_secs_f64(),
            status: "success".to_string(),
            error: None,
        })
    }

    /// Execute every action of a solution file in order, halting on the
    /// first failure.
    pub fn execute_plan(
        &mut self,
        world: &mut World,
        plan_path: &Path,
    ) -> Result<Vec<ActionLog>, ActionError> {
        let text = std::fs::read_to_string(plan_path).map_err(|e| ActionError::Io {
            path: plan_path.display().to_string(),
            source: e,
        })?;
        let actions: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with('('))
            .map(str::to_string)
            .collect();

        let mut logs = Vec::with_capacity(actions.len());
        for action in actions {
            let log = self.execute(world, &action)?;
            tracing::info!(
                step = log.action_number,
                action = %log.action.raw,
                "executed plan step"
            );
            logs.push(log);
        }
        Ok(logs)
    }

    fn write_log(&self, log: &ActionLog) {
        if std::fs::create_dir_all(&self.log_dir).is_err() {
            return;
        }
        let path = self.log_dir.join(format!("{}.json", log.action_number));
        match serde_json::to_string_pretty(log) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to write action log");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize action log"),
        }
    }
}

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_move_action() {
        let action = parse_move("(move robot1 corridor_14 door_9)").unwrap();
        assert_eq!(action.robot, "robot1");
        assert_eq!(action.from, "corridor_14");
        assert_eq!(action.to, "door_9");
    }

    #[test]
    fn parse_rejects_other_shapes() {
        assert!(parse_move("(pickup robot1 cup_6)").is_err());
        assert!(parse_move("(move robot1 corridor_14)").is_err());
        assert!(parse_move("move robot1 a b").is_err());
    }

    // The full executor pipeline is covered by tests/actions.rs, which
    // drives a real World instance over seeded TTL versions.
}
