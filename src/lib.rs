//! # seshat
//!
//! A robot task-planning backend built around a persistent, reasoned,
//! queryable world model.
//!
//! ## Architecture
//!
//! - **Knowledge store** (`schema`, `world`): OWL TBox + asserted store +
//!   forward-chaining materializer, with an oxigraph mirror for SPARQL
//! - **Projection** (`projection`): labeled property graph derived from the
//!   reasoned model, with an HNSW vector index for semantic search
//! - **Problem synthesis** (`plan`): goal normalization, object-universe
//!   closure, shortest-path expansion, PDDL emission, planner invocation
//! - **World updates** (`ttl`, `action`): versioned TTL mutations, RDF-level
//!   diffs, derived SPARQL updates with inferred-edge cleanup
//! - **Queries** (`query`, `embedding`): object info, filtering, pathfinding,
//!   category/description semantic search
//!
//! ## Library usage
//!
//! ```no_run
//! use std::path::Path;
//! use seshat::config::Config;
//! use seshat::engine::Engine;
//!
//! let config = Config::load(Path::new("seshat.toml")).unwrap();
//! let mut engine = Engine::boot(config, Path::new(".")).unwrap();
//! engine.load_active_env().unwrap();
//! let report = engine.plan_goal("(and (isON tv_52))", None).unwrap();
//! println!("{} actions", report.outcome.actions.len());
//! ```

pub mod action;
pub mod config;
pub mod domain;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod paths;
pub mod plan;
pub mod projection;
pub mod query;
pub mod schema;
pub mod sparql;
pub mod ttl;
pub mod world;
