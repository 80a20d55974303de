//! Engine facade: process-wide state and the top-level operations the CLI
//! and server dispatch to.
//!
//! Owns the config, resolved paths, the parsed PDDL domain, the world
//! (ontology + projection), and the action executor. Mutating operations go
//! through `&mut self`; the server wraps the engine in a single writer lock.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::action::{ActionExecutor, ActionLog};
use crate::config::Config;
use crate::domain::Domain;
use crate::embedding::{EmbeddingBinder, SearchKind, SemanticHit};
use crate::error::{ConfigError, SeshatError};
use crate::paths::ProjectPaths;
use crate::plan::{self, PlanReport};
use crate::projection::Projection;
use crate::query::QueryTools;
use crate::schema::Schema;
use crate::ttl::RelationshipMapping;
use crate::world::{BatchReport, World, WorldStatus};

/// Summary of one environment directory.
#[derive(Debug, Clone, Serialize)]
pub struct EnvInfo {
    pub env_id: String,
    pub has_static: bool,
    pub has_dynamic: bool,
    pub is_active: bool,
}

/// The process-wide engine.
pub struct Engine {
    config: Config,
    paths: ProjectPaths,
    domain: Domain,
    world: World,
    executor: ActionExecutor,
}

impl Engine {
    /// Boot from a config against a project root: load the schema and
    /// domain, wire the world and executor, resolve the active environment.
    /// Configuration problems here are fatal to the process.
    pub fn boot(config: Config, root: &Path) -> Result<Self, SeshatError> {
        let paths = ProjectPaths::resolve(root, &config.data);
        paths.ensure_dirs()?;

        if !paths.schema_file.exists() {
            return Err(ConfigError::SchemaMissing {
                path: paths.schema_file.display().to_string(),
            }
            .into());
        }
        let schema = Schema::load(&paths.schema_file)?;
        let domain = Domain::load(&paths.domain_file)?;

        let mapping = if paths.relationship_mapping.exists() {
            RelationshipMapping::load(&paths.relationship_mapping)?
        } else {
            tracing::warn!(
                path = %paths.relationship_mapping.display(),
                "relationship mapping not found; inferred-edge cleanup disabled"
            );
            RelationshipMapping::default()
        };

        let namespace = schema.namespace().to_string();
        let binder = EmbeddingBinder::new(config.embedding.clone());
        let mut world = World::new(schema, binder)?;

        if let Some(env_id) = &config.active_env {
            let env = paths.env(env_id);
            if !env.exists() {
                return Err(ConfigError::EnvNotFound {
                    env_id: env_id.clone(),
                }
                .into());
            }
            world.set_env(env);
        }

        let executor = ActionExecutor::new(&paths, mapping, namespace);

        tracing::info!(
            env = config.active_env.as_deref().unwrap_or("<none>"),
            "engine booted"
        );
        Ok(Self {
            config,
            paths,
            domain,
            world,
            executor,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn projection(&self) -> Arc<Projection> {
        self.world.projection()
    }

    pub fn status(&self) -> WorldStatus {
        self.world.status()
    }

    /// Environments present on disk.
    pub fn list_envs(&self) -> Vec<EnvInfo> {
        self.paths
            .list_envs()
            .into_iter()
            .map(|env_id| {
                let env = self.paths.env(&env_id);
                EnvInfo {
                    is_active: self.config.active_env.as_deref() == Some(env_id.as_str()),
                    has_static: env.static_ttl.is_file(),
                    has_dynamic: env.dynamic_ttl.is_file(),
                    env_id,
                }
            })
            .collect()
    }

    /// Load the active environment's static and dynamic TTL and seed
    /// version 0 of the action world.
    pub fn load_active_env(&mut self) -> Result<(BatchReport, BatchReport), SeshatError> {
        let env_id = self.config.active_env()?.to_string();
        let env = self.paths.env(&env_id);
        if !env.has_world_files() {
            return Err(ConfigError::EnvNotFound { env_id }.into());
        }
        let static_report = self.world.load_from_ttl(&env.static_ttl)?;
        let dynamic_report = self.world.load_from_ttl(&env.dynamic_ttl)?;
        self.executor
            .init_world(&env)
            .map_err(SeshatError::from)?;
        Ok((static_report, dynamic_report))
    }

    /// Synthesize a problem for the goal, run the planner, persist the
    /// artifacts under `plans/{stamp}_{label}/`, and mirror the solution
    /// into `action/plan/solution.plan`.
    pub fn plan_goal(
        &mut self,
        goal_formula: &str,
        description: Option<&str>,
    ) -> Result<PlanReport, SeshatError> {
        let label = plan::goal::task_label(description, goal_formula);
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let output_dir = self.paths.plans_dir.join(format!("{stamp}_{label}"));
        let problem_name = format!("{stamp}_{label}");

        let projection = self.world.projection();
        let report = plan::synthesize_and_plan(
            &projection,
            &self.domain,
            &self.config.planner,
            &self.paths.domain_file,
            goal_formula,
            description,
            &problem_name,
            &output_dir,
        )?;

        if report.outcome.returncode == 0 && report.solution_path.exists() {
            let target = self.paths.plan_dir.join("solution.plan");
            if let Err(e) = std::fs::copy(&report.solution_path, &target) {
                tracing::warn!(error = %e, "failed to mirror solution into action/plan");
            }
        }
        Ok(report)
    }

    /// Execute one plan action against the versioned world.
    pub fn execute_action(&mut self, action: &str) -> Result<ActionLog, SeshatError> {
        let log = self.executor.execute(&mut self.world, action)?;
        Ok(log)
    }

    /// Execute every action in a solution file, halting on first failure.
    pub fn run_plan_file(&mut self, path: &Path) -> Result<Vec<ActionLog>, SeshatError> {
        let logs = self.executor.execute_plan(&mut self.world, path)?;
        Ok(logs)
    }

    pub fn executed_action_count(&self) -> usize {
        self.executor.executed_count()
    }

    /// Semantic search over the projection.
    pub fn semantic_search(
        &self,
        query: &str,
        top_k: usize,
        kind: SearchKind,
    ) -> Result<Vec<SemanticHit>, SeshatError> {
        let projection = self.world.projection();
        let hits = self.world.binder().search(&projection, query, top_k, kind)?;
        Ok(hits)
    }

    /// Run a closure against the read-only query tools.
    pub fn with_query_tools<T>(&self, f: impl FnOnce(&QueryTools<'_>) -> T) -> T {
        let projection = self.world.projection();
        let tools = QueryTools::new(&projection);
        f(&tools)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("env", &self.config.active_env)
            .field("individuals", &self.world.individuals_count())
            .field("executed_actions", &self.executor.executed_count())
            .finish()
    }
}
