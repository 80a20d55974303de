//! seshat HTTP server.
//!
//! JSON in and out, standard status codes:
//!
//! - `GET  /status` — store counts and active environment
//! - `GET  /health` — readiness
//! - `GET  /envs` — environment listing
//! - `POST /individuals` — add one individual (reason + sync)
//! - `POST /individuals/batch` — add many, one reasoning pass
//! - `PUT  /individuals/{id}` — partial update
//! - `DELETE /individuals/{id}` — remove
//! - `POST /load_ttl` — bulk add from a TTL file
//! - `POST /sync` — force reason + re-project
//! - `POST /sparql` — SELECT
//! - `POST /sparql/update` — restricted DELETE/INSERT
//! - `POST /semantic_search` — category/description vector search
//! - `POST /objects/info`, `POST /objects/filter`, `POST /path` — query tools
//!
//! Mutations serialize behind the writer lock; reads share it. The planner
//! subprocess (CLI-side) never runs under this lock.
//!
//! Build and run: `cargo run --features server --bin seshat-server`

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

use seshat::config::Config;
use seshat::embedding::SearchKind;
use seshat::engine::Engine;
use seshat::error::SeshatError;
use seshat::world::{IndividualData, IndividualPatch};

// ── Server state ──────────────────────────────────────────────────────────

struct ServerState {
    engine: RwLock<Engine>,
}

type ApiError = (StatusCode, String);

fn map_error(e: SeshatError) -> ApiError {
    use seshat::error::{EmbeddingError, SparqlError, WorldError};
    let status = match &e {
        SeshatError::World(WorldError::NotFound { .. }) => StatusCode::NOT_FOUND,
        SeshatError::World(WorldError::DuplicateIndividual { .. })
        | SeshatError::World(WorldError::UnknownClass { .. })
        | SeshatError::World(WorldError::TtlNotFound { .. })
        | SeshatError::World(WorldError::TtlParse { .. }) => StatusCode::BAD_REQUEST,
        SeshatError::Sparql(SparqlError::UnsupportedShape { .. })
        | SeshatError::Sparql(SparqlError::BadTriple { .. }) => StatusCode::BAD_REQUEST,
        SeshatError::Sparql(SparqlError::Query { .. }) => StatusCode::BAD_REQUEST,
        SeshatError::Embedding(EmbeddingError::IndexMissing { .. })
        | SeshatError::Embedding(EmbeddingError::BadSearchType { .. }) => StatusCode::BAD_REQUEST,
        SeshatError::Query(_) => StatusCode::NOT_FOUND,
        SeshatError::Plan(_) | SeshatError::Action(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

// ── Request types ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct BatchRequest {
    individuals: Vec<IndividualData>,
}

#[derive(Deserialize)]
struct LoadTtlRequest {
    file_path: PathBuf,
}

#[derive(Deserialize)]
struct SparqlRequest {
    query: String,
}

#[derive(Deserialize)]
struct SparqlUpdateRequest {
    update: String,
}

#[derive(Deserialize)]
struct SemanticSearchRequest {
    query: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default = "default_search_type")]
    search_type: String,
}

fn default_top_k() -> usize {
    5
}

fn default_search_type() -> String {
    "description".to_string()
}

#[derive(Deserialize)]
struct ObjectInfoRequest {
    ids: Vec<String>,
}

#[derive(Deserialize, Default)]
struct FilterRequest {
    #[serde(default)]
    class: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    relationships: BTreeMap<String, String>,
    #[serde(default)]
    data_properties: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct PathRequest {
    from: String,
    to: String,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    let engine = state.engine.read().await;
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "manager_ready": engine.world().individuals_count() > 0,
    }))
}

async fn status(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    let engine = state.engine.read().await;
    Json(serde_json::to_value(engine.status()).unwrap_or_default())
}

async fn list_envs(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    let engine = state.engine.read().await;
    Json(serde_json::json!({ "envs": engine.list_envs() }))
}

async fn add_individual(
    State(state): State<Arc<ServerState>>,
    Json(data): Json<IndividualData>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = data.id.clone();
    let mut engine = state.engine.write().await;
    engine
        .world_mut()
        .add_individual(data, true)
        .map_err(map_error)?;
    Ok(Json(serde_json::json!({ "status": "success", "id": id })))
}

async fn add_individuals_batch(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut engine = state.engine.write().await;
    let report = engine
        .world_mut()
        .add_individuals_batch(request.individuals)
        .map_err(map_error)?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "added": report.added,
        "failed": report.failed,
    })))
}

async fn update_individual(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(patch): Json<IndividualPatch>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut engine = state.engine.write().await;
    engine
        .world_mut()
        .update_individual(&id, patch)
        .map_err(map_error)?;
    Ok(Json(serde_json::json!({ "status": "success", "id": id })))
}

async fn delete_individual(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut engine = state.engine.write().await;
    engine
        .world_mut()
        .delete_individual(&id)
        .map_err(map_error)?;
    Ok(Json(serde_json::json!({ "status": "success", "id": id })))
}

async fn load_ttl(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<LoadTtlRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut engine = state.engine.write().await;
    let report = engine
        .world_mut()
        .load_from_ttl(&request.file_path)
        .map_err(map_error)?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "added": report.added,
        "failed": report.failed,
    })))
}

async fn sync(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut engine = state.engine.write().await;
    let report = engine.world_mut().sync(false).map_err(map_error)?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "individuals": report.individuals,
        "relationships": report.relationships,
        "embeddings": report.embeddings,
    })))
}

async fn sparql_select(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<SparqlRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let engine = state.engine.read().await;
    let response = engine
        .world()
        .execute_sparql_select(&request.query)
        .map_err(|e| map_error(e.into()))?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "count": response.count,
        "results": response.results,
    })))
}

async fn sparql_update(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<SparqlUpdateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut engine = state.engine.write().await;
    engine
        .world_mut()
        .execute_sparql_update(&request.update)
        .map_err(map_error)?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "message": "SPARQL UPDATE applied and incremental reasoning completed",
    })))
}

async fn semantic_search(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<SemanticSearchRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let kind = SearchKind::parse(&request.search_type).map_err(|e| map_error(e.into()))?;
    let engine = state.engine.read().await;
    let results = engine
        .semantic_search(&request.query, request.top_k, kind)
        .map_err(map_error)?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "query": request.query,
        "search_type": request.search_type,
        "count": results.len(),
        "results": results,
    })))
}

async fn object_info(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ObjectInfoRequest>,
) -> Json<serde_json::Value> {
    let engine = state.engine.read().await;
    let records = engine.with_query_tools(|tools| tools.get_object_info(&request.ids));
    Json(serde_json::json!({ "count": records.len(), "objects": records }))
}

async fn filter_objects(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<FilterRequest>,
) -> Json<serde_json::Value> {
    let engine = state.engine.read().await;
    let records = engine.with_query_tools(|tools| {
        tools.filter_objects(
            request.class.as_deref(),
            request.category.as_deref(),
            &request.relationships,
            &request.data_properties,
        )
    });
    Json(serde_json::json!({ "count": records.len(), "objects": records }))
}

async fn find_path(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<PathRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let engine = state.engine.read().await;
    let result = engine
        .with_query_tools(|tools| tools.find_path(&request.from, &request.to))
        .map_err(|e| map_error(e.into()))?;
    Ok(Json(serde_json::to_value(result).unwrap_or_default()))
}

// ── Main ──────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hnsw_rs=warn")),
        )
        .init();

    let config_path = std::env::var("SESHAT_CONFIG").unwrap_or_else(|_| "seshat.toml".to_string());
    let root = std::env::var("SESHAT_ROOT").unwrap_or_else(|_| ".".to_string());

    let config = match Config::load(std::path::Path::new(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            std::process::exit(1);
        }
    };
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let mut engine = match Engine::boot(config, std::path::Path::new(&root)) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("startup failed: {e}");
            std::process::exit(1);
        }
    };

    // Load the active environment up front so the first request sees a
    // reasoned, projected world.
    if engine.config().active_env.is_some() {
        match engine.load_active_env() {
            Ok((static_report, dynamic_report)) => {
                tracing::info!(
                    static_added = static_report.added,
                    dynamic_added = dynamic_report.added,
                    "environment loaded"
                );
            }
            Err(e) => {
                tracing::error!("failed to load environment: {e}");
                std::process::exit(1);
            }
        }
    }

    let state = Arc::new(ServerState {
        engine: RwLock::new(engine),
    });

    let app = Router::new()
        .route("/status", get(status))
        .route("/health", get(health))
        .route("/envs", get(list_envs))
        .route("/individuals", post(add_individual))
        .route("/individuals/batch", post(add_individuals_batch))
        .route("/individuals/{id}", put(update_individual))
        .route("/individuals/{id}", delete(delete_individual))
        .route("/load_ttl", post(load_ttl))
        .route("/sync", post(sync))
        .route("/sparql", post(sparql_select))
        .route("/sparql/update", post(sparql_update))
        .route("/semantic_search", post(semantic_search))
        .route("/objects/info", post(object_info))
        .route("/objects/filter", post(filter_objects))
        .route("/path", post(find_path))
        .layer(CorsLayer::permissive())
        .with_state(state);

    tracing::info!("seshat server listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
