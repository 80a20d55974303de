//! Rich diagnostic error types for the seshat backend.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so operators know exactly
//! what went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the seshat backend.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, sources) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum SeshatError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Sparql(#[from] SparqlError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ttl(#[from] TtlError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),
}

// ---------------------------------------------------------------------------
// Configuration / environment errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    #[diagnostic(
        code(seshat::config::not_found),
        help("Create a seshat.toml at the project root or pass --config with an explicit path.")
    )]
    NotFound { path: String },

    #[error("failed to parse config file {path}: {message}")]
    #[diagnostic(
        code(seshat::config::parse),
        help("Check the TOML syntax. Every section is optional except [data].")
    )]
    Parse { path: String, message: String },

    #[error("no active environment configured")]
    #[diagnostic(
        code(seshat::config::no_active_env),
        help("Set `active_env = \"<env-id>\"` in seshat.toml to one of the directories under the envs dir.")
    )]
    NoActiveEnv,

    #[error("environment not found: \"{env_id}\"")]
    #[diagnostic(
        code(seshat::config::env_not_found),
        help("The environment directory must exist under the configured envs dir and contain static.ttl / dynamic.ttl.")
    )]
    EnvNotFound { env_id: String },

    #[error("ontology schema file not found: {path}")]
    #[diagnostic(
        code(seshat::config::schema_missing),
        help("Point `data.schema` at the shared OWL schema (Turtle) used by every environment.")
    )]
    SchemaMissing { path: String },

    #[error("I/O error reading {path}: {source}")]
    #[diagnostic(
        code(seshat::config::io),
        help("Check that the file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// OWL schema (TBox) errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SchemaError {
    #[error("failed to parse schema file {path}: {message}")]
    #[diagnostic(
        code(seshat::schema::parse),
        help("The schema must be a valid Turtle document declaring owl:Class and owl:ObjectProperty entities.")
    )]
    Parse { path: String, message: String },

    #[error("schema declares no classes")]
    #[diagnostic(
        code(seshat::schema::empty),
        help("A usable schema needs at least one owl:Class; check that the right file is configured.")
    )]
    Empty,

    #[error("class not found in schema: {name}")]
    #[diagnostic(
        code(seshat::schema::unknown_class),
        help("Every individual must be typed by a class declared in the loaded OWL schema.")
    )]
    UnknownClass { name: String },
}

// ---------------------------------------------------------------------------
// World (ontology facade) errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum WorldError {
    #[error("individual {id} already exists")]
    #[diagnostic(
        code(seshat::world::duplicate_individual),
        help("Use PUT /individuals/{{id}} to update an existing individual instead of adding it again.")
    )]
    DuplicateIndividual { id: String },

    #[error("individual not found: {id}")]
    #[diagnostic(
        code(seshat::world::not_found),
        help("Check the id against GET /status; ids are the local names of individual IRIs.")
    )]
    NotFound { id: String },

    #[error("class {class_name} not found in schema")]
    #[diagnostic(
        code(seshat::world::unknown_class),
        help("The class must be declared in the loaded OWL schema. Schema classes are fixed at startup.")
    )]
    UnknownClass { class_name: String },

    #[error("TTL file not found: {path}")]
    #[diagnostic(
        code(seshat::world::ttl_not_found),
        help("The path is resolved relative to the process working directory.")
    )]
    TtlNotFound { path: String },

    #[error("failed to parse TTL file {path}: {message}")]
    #[diagnostic(
        code(seshat::world::ttl_parse),
        help("The file must be valid Turtle. Individuals need an rdf:type naming a schema class.")
    )]
    TtlParse { path: String, message: String },

    #[error("ontology inconsistent: {individual} is typed by disjoint classes {class_a} and {class_b}")]
    #[diagnostic(
        code(seshat::world::inconsistent),
        help(
            "The reasoner detected a contradiction. The asserted store is left in its post-apply \
             state; restart the session from the last good TTL version."
        )
    )]
    Inconsistent {
        individual: String,
        class_a: String,
        class_b: String,
    },

    #[error("materialized store error: {message}")]
    #[diagnostic(
        code(seshat::world::store),
        help("The internal RDF store rejected an operation; this usually indicates a malformed IRI or literal.")
    )]
    Store { message: String },
}

// ---------------------------------------------------------------------------
// Projection errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ProjectionError {
    #[error("node not found in projection: {id}")]
    #[diagnostic(
        code(seshat::projection::node_not_found),
        help("The projection mirrors the reasoned model; run POST /sync if the store and projection have diverged.")
    )]
    NodeNotFound { id: String },

    #[error("vector index error: {message}")]
    #[diagnostic(
        code(seshat::projection::vector_index),
        help("The HNSW index could not be built or queried; re-run a sync to recreate it.")
    )]
    VectorIndex { message: String },
}

// ---------------------------------------------------------------------------
// SPARQL bridge errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SparqlError {
    #[error("SPARQL SELECT failed: {message}")]
    #[diagnostic(
        code(seshat::sparql::query),
        help("Check the query syntax; only SELECT and ASK forms are supported on this endpoint.")
    )]
    Query { message: String },

    #[error("unsupported SPARQL UPDATE shape: {message}")]
    #[diagnostic(
        code(seshat::sparql::unsupported_shape),
        help(
            "The update endpoint accepts a single `DELETE {{ ... }} INSERT {{ ... }} WHERE {{ }}` \
             block of ground triples (no variables, no patterns). Anything else is rejected \
             before any mutation is applied."
        )
    )]
    UnsupportedShape { message: String },

    #[error("malformed triple in update: {line}")]
    #[diagnostic(
        code(seshat::sparql::bad_triple),
        help("Each triple must be `<s> <p> <o> .` or use the default-namespace prefix, with ground terms only.")
    )]
    BadTriple { line: String },
}

// ---------------------------------------------------------------------------
// Embedding errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EmbeddingError {
    #[error("embedding cache file not found: {path}")]
    #[diagnostic(
        code(seshat::embedding::cache_missing),
        help(
            "Set `embedding.generate = true` to generate embeddings, or place the cache file \
             at the expected path under the environment directory."
        )
    )]
    CacheMissing { path: String },

    #[error("embedding cache mismatch: cached {cached_model}({cached_dimensions}D), configured {configured_model}({configured_dimensions}D)")]
    #[diagnostic(
        code(seshat::embedding::cache_mismatch),
        help(
            "The cache was generated with a different model or dimensionality than the current \
             configuration. Regenerate the cache or align the configuration with its metadata."
        )
    )]
    CacheMismatch {
        cached_model: String,
        cached_dimensions: usize,
        configured_model: String,
        configured_dimensions: usize,
    },

    #[error("invalid embedding cache format in {path}")]
    #[diagnostic(
        code(seshat::embedding::cache_format),
        help("The cache must be a JSON object with `metadata` and `embeddings` keys.")
    )]
    CacheFormat { path: String },

    #[error("embedding service request failed: {message}")]
    #[diagnostic(
        code(seshat::embedding::service),
        help("Check the configured endpoint and the API key environment variable.")
    )]
    Service { message: String },

    #[error("no vector index available for {search_type} search")]
    #[diagnostic(
        code(seshat::embedding::index_missing),
        help("Embeddings were neither generated nor loaded for this session; load or generate them and re-sync.")
    )]
    IndexMissing { search_type: String },

    #[error("invalid search type: {search_type}")]
    #[diagnostic(
        code(seshat::embedding::bad_search_type),
        help("search_type must be \"category\" or \"description\".")
    )]
    BadSearchType { search_type: String },
}

// ---------------------------------------------------------------------------
// TTL diff & rewriter errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TtlError {
    #[error("TTL file not found: {path}")]
    #[diagnostic(
        code(seshat::ttl::not_found),
        help("Version N requires dynamic_{{N-1}}.ttl to exist; versions are never skipped.")
    )]
    NotFound { path: String },

    #[error("rewrite matched {matches} lines for {predicate} -> {old_target} (expected exactly 1)")]
    #[diagnostic(
        code(seshat::ttl::rewrite_ambiguous),
        help(
            "The line-oriented rewriter requires the canonical Turtle emitted by this system's \
             own writer, with exactly one line carrying the predicate and old object. \
             Re-serialize the file canonically before rewriting."
        )
    )]
    RewriteAmbiguous {
        predicate: String,
        old_target: String,
        matches: usize,
    },

    #[error("failed to parse {path} as Turtle: {message}")]
    #[diagnostic(
        code(seshat::ttl::parse),
        help("Both sides of a diff must parse as RDF; check for truncated writes.")
    )]
    Parse { path: String, message: String },

    #[error("relationship mapping file error: {path}: {message}")]
    #[diagnostic(
        code(seshat::ttl::mapping),
        help("The mapping is a JSON document {{ \"mappings\": {{ predicate: {{ \"inferred_relationships\": [...] }} }} }}.")
    )]
    Mapping { path: String, message: String },

    #[error("I/O error on {path}: {source}")]
    #[diagnostic(code(seshat::ttl::io), help("Check permissions on the action/world directory."))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// PDDL domain parser errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DomainError {
    #[error("domain file not found: {path}")]
    #[diagnostic(
        code(seshat::domain::not_found),
        help("Point `data.domain` at the fixed PDDL domain file.")
    )]
    NotFound { path: String },

    #[error("no :types section found in domain file")]
    #[diagnostic(
        code(seshat::domain::missing_types),
        help("The synthesizer needs the declared type hierarchy; add a (:types ...) section to the domain.")
    )]
    MissingTypes,

    #[error("ill-formed :types section: {message}")]
    #[diagnostic(
        code(seshat::domain::parse),
        help("Each line is `child1 child2 - Parent` or a bare list of root types.")
    )]
    Parse { message: String },
}

// ---------------------------------------------------------------------------
// Problem synthesizer / planner errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PlanError {
    #[error("invalid goal formula: {message}")]
    #[diagnostic(
        code(seshat::plan::invalid_goal),
        help("The goal must be a parenthesized PDDL formula over predicates the domain declares.")
    )]
    InvalidGoal { message: String },

    #[error("goal references unknown object: {id}")]
    #[diagnostic(
        code(seshat::plan::unknown_object),
        help("Every identifier in the goal must name an individual present in the projection.")
    )]
    UnknownObject { id: String },

    #[error("no robot found in the knowledge graph")]
    #[diagnostic(
        code(seshat::plan::no_robot),
        help("Load the dynamic TTL first; the synthesizer needs a Robot individual with a location.")
    )]
    NoRobot,

    #[error("planner exited with status {code}")]
    #[diagnostic(
        code(seshat::plan::planner_failed),
        help("The full planner stdout/stderr and the generated problem.pddl / debug.json paths are in the report.")
    )]
    PlannerFailed { code: i32 },

    #[error("planner timed out after {seconds} seconds")]
    #[diagnostic(
        code(seshat::plan::planner_timeout),
        help("The subprocess was killed. Simplify the goal or raise planner.timeout_secs.")
    )]
    PlannerTimeout { seconds: u64 },

    #[error("planner executable not found: {path}")]
    #[diagnostic(
        code(seshat::plan::planner_missing),
        help("Set planner.command to the fast-downward launcher path.")
    )]
    PlannerMissing { path: String },

    #[error("I/O error writing plan artifacts: {source}")]
    #[diagnostic(code(seshat::plan::io), help("Check permissions on the plans output directory."))]
    Io {
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Action executor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ActionError {
    #[error("unparseable action: {action}")]
    #[diagnostic(
        code(seshat::action::parse),
        help("Supported shape: (move <robot> <from> <to>).")
    )]
    Parse { action: String },

    #[error("unsupported action type: {action}")]
    #[diagnostic(
        code(seshat::action::unsupported),
        help("Only move actions are executable; other schemas halt the workflow.")
    )]
    Unsupported { action: String },

    #[error("world state for version {version} is missing: {path}")]
    #[diagnostic(
        code(seshat::action::missing_version),
        help("Versions are strictly sequential; seed version 0 with init_world before executing actions.")
    )]
    MissingVersion { version: usize, path: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ttl(#[from] TtlError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Sparql(#[from] SparqlError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    World(#[from] WorldError),

    #[error("world update failed: {message}")]
    #[diagnostic(
        code(seshat::action::update_failed),
        help("The knowledge store rejected the derived SPARQL update; the workflow halts here.")
    )]
    UpdateFailed { message: String },

    #[error("I/O error on {path}: {source}")]
    #[diagnostic(code(seshat::action::io), help("Check permissions on the action directory tree."))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Query tool errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum QueryError {
    #[error("no path between {from} and {to}")]
    #[diagnostic(
        code(seshat::query::no_path),
        help("Both endpoints must resolve to Space or Portal nodes connected via hasPathTo.")
    )]
    NoPath { from: String, to: String },

    #[error("cannot resolve {id} to a location")]
    #[diagnostic(
        code(seshat::query::unresolvable),
        help("Pathfinding endpoints must be locations, or objects anchored in a Space via isInSpace/objectIsInSpace.")
    )]
    Unresolvable { id: String },
}

/// Convenience alias for functions returning seshat results.
pub type SeshatResult<T> = std::result::Result<T, SeshatError>;
