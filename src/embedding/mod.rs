//! Embedding binder: vector enrichment of the projection.
//!
//! Two semantic spaces with independent model configuration:
//!
//! - *Category* embeddings, keyed by category string ("chair", "kitchen"),
//!   cached offline in `category_embeddings.json` and searched with an
//!   in-process cosine top-k.
//! - *Description* embeddings, keyed by individual id, cached in
//!   `{static,dynamic}_embeddings.json` and attached to projection nodes for
//!   vector-index search.
//!
//! `generate=true` calls the external embedding service and writes the
//! caches; `generate=false` requires the caches and refuses a session whose
//! cached model/dimensions disagree with the configuration.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{EmbeddingRole, EmbeddingSettings};
use crate::error::EmbeddingError;
use crate::paths::EnvPaths;
use crate::projection::vector::cosine_similarity;
use crate::projection::Projection;
use crate::world::DataKind;

/// Which semantic space a search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Category,
    Description,
}

impl SearchKind {
    pub fn parse(s: &str) -> Result<Self, EmbeddingError> {
        match s {
            "category" => Ok(SearchKind::Category),
            "description" => Ok(SearchKind::Description),
            other => Err(EmbeddingError::BadSearchType {
                search_type: other.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Category => "category",
            SearchKind::Description => "description",
        }
    }
}

/// One semantic-search result. Category hits carry only `category` + score;
/// description hits are full projected records.
#[derive(Debug, Clone, Serialize)]
pub struct SemanticHit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CacheMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    category_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category_dimensions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description_dimensions: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DescriptionEntry {
    id: String,
    description_embedding: Option<Vec<f32>>,
}

/// Binder over the configured embedding service and caches.
#[derive(Debug, Clone)]
pub struct EmbeddingBinder {
    settings: EmbeddingSettings,
}

impl EmbeddingBinder {
    pub fn new(settings: EmbeddingSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EmbeddingSettings {
        &self.settings
    }

    /// Dimensions the description vector index must be built with.
    pub fn description_dimensions(&self) -> usize {
        self.settings.description.resolved_dimensions()
    }

    /// Attach embeddings to the freshly recreated projection. Called at the
    /// tail of every full sync. Returns the number of description embeddings
    /// attached.
    pub fn bind(
        &self,
        projection: &Projection,
        data_kind: Option<DataKind>,
        env: Option<&EnvPaths>,
    ) -> Result<usize, EmbeddingError> {
        if self.settings.generate {
            self.generate(projection, env)
        } else {
            self.load_caches(projection, data_kind, env)
        }
    }

    // ── Generation ───────────────────────────────────────────────────────

    fn generate(
        &self,
        projection: &Projection,
        env: Option<&EnvPaths>,
    ) -> Result<usize, EmbeddingError> {
        if self.settings.endpoint.is_none() {
            tracing::warn!("embedding.generate is on but no endpoint is configured; skipping");
            return Ok(0);
        }

        let mut embedded = 0usize;
        let mut failed = 0usize;
        for id in projection.all_ids() {
            let Some(node) = projection.node(&id) else { continue };
            // Only Space and Artifact individuals carry searchable text.
            if !node.has_label("Space") && !node.has_label("Artifact") {
                continue;
            }
            let description = node
                .props
                .get("description")
                .and_then(|v| v.as_text().map(str::to_string));
            let category = node
                .props
                .get("category")
                .and_then(|v| v.as_text().map(str::to_string));
            let Some(text) = description.or(category) else { continue };

            match self.embed(&self.settings.description, &text) {
                Ok(vector) => {
                    projection.set_description_embedding(&id, vector);
                    embedded += 1;
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(id = %id, error = %e, "embedding generation failed");
                    if failed >= 3 {
                        return Err(EmbeddingError::Service {
                            message: format!("aborting after {failed} generation failures: {e}"),
                        });
                    }
                }
            }
        }

        if let Some(env) = env {
            // The description cache tracks whichever data file was loaded
            // last; generation always rewrites the dynamic-side cache.
            self.save_description_cache(projection, &env.dynamic_embeddings)?;
        }

        // Category embeddings over the distinct category strings.
        let categories: BTreeSet<String> = projection
            .all_ids()
            .into_iter()
            .filter_map(|id| {
                projection
                    .node(&id)?
                    .props
                    .get("category")?
                    .as_text()
                    .map(str::to_string)
            })
            .collect();
        if !categories.is_empty() {
            let mut map = HashMap::new();
            for category in &categories {
                match self.embed(&self.settings.category, category) {
                    Ok(vector) => {
                        map.insert(category.clone(), vector);
                    }
                    Err(e) => {
                        tracing::warn!(category = %category, error = %e, "category embedding failed");
                    }
                }
            }
            projection.set_category_embeddings(map);
            if let Some(env) = env {
                self.save_category_cache(projection, &env.category_embeddings)?;
            }
        }

        tracing::info!(embedded, "generated description embeddings");
        Ok(embedded)
    }

    // ── Cache loading ────────────────────────────────────────────────────

    fn load_caches(
        &self,
        projection: &Projection,
        data_kind: Option<DataKind>,
        env: Option<&EnvPaths>,
    ) -> Result<usize, EmbeddingError> {
        let Some(env) = env else {
            return Err(EmbeddingError::CacheMissing {
                path: "<no active environment>".to_string(),
            });
        };
        let cache_path = match data_kind {
            Some(DataKind::Static) => &env.static_embeddings,
            _ => &env.dynamic_embeddings,
        };
        let count = self.load_description_cache(projection, cache_path)?;

        if env.category_embeddings.exists() {
            self.load_category_cache(projection, &env.category_embeddings)?;
        } else {
            tracing::warn!(
                path = %env.category_embeddings.display(),
                "category embedding cache not found; category search disabled"
            );
        }
        Ok(count)
    }

    fn check_description_metadata(&self, meta: &CacheMetadata) -> Result<(), EmbeddingError> {
        let configured_model = &self.settings.description.model;
        let configured_dims = self.settings.description.resolved_dimensions();
        let cached_model = meta.description_model.clone().unwrap_or_default();
        let cached_dims = meta.description_dimensions.unwrap_or(0);
        if &cached_model != configured_model || cached_dims != configured_dims {
            return Err(EmbeddingError::CacheMismatch {
                cached_model,
                cached_dimensions: cached_dims,
                configured_model: configured_model.clone(),
                configured_dimensions: configured_dims,
            });
        }
        Ok(())
    }

    fn load_description_cache(
        &self,
        projection: &Projection,
        path: &Path,
    ) -> Result<usize, EmbeddingError> {
        if !path.exists() {
            return Err(EmbeddingError::CacheMissing {
                path: path.display().to_string(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|e| EmbeddingError::Service {
            message: format!("reading {}: {e}", path.display()),
        })?;
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|_| EmbeddingError::CacheFormat {
                path: path.display().to_string(),
            })?;

        let entries: Vec<DescriptionEntry> = if value.is_array() {
            // Legacy format: bare array, no metadata to validate.
            tracing::warn!(path = %path.display(), "loading legacy embedding cache without metadata");
            serde_json::from_value(value).map_err(|_| EmbeddingError::CacheFormat {
                path: path.display().to_string(),
            })?
        } else {
            let meta: CacheMetadata = serde_json::from_value(
                value.get("metadata").cloned().unwrap_or_default(),
            )
            .map_err(|_| EmbeddingError::CacheFormat {
                path: path.display().to_string(),
            })?;
            self.check_description_metadata(&meta)?;

            let embeddings = value
                .get("embeddings")
                .cloned()
                .ok_or_else(|| EmbeddingError::CacheFormat {
                    path: path.display().to_string(),
                })?;
            if embeddings.is_object() {
                // Map form: { id: [floats] }.
                let map: HashMap<String, Vec<f32>> = serde_json::from_value(embeddings)
                    .map_err(|_| EmbeddingError::CacheFormat {
                        path: path.display().to_string(),
                    })?;
                map.into_iter()
                    .map(|(id, v)| DescriptionEntry {
                        id,
                        description_embedding: Some(v),
                    })
                    .collect()
            } else {
                serde_json::from_value(embeddings).map_err(|_| EmbeddingError::CacheFormat {
                    path: path.display().to_string(),
                })?
            }
        };

        let mut count = 0usize;
        for entry in entries {
            let Some(vector) = entry.description_embedding else { continue };
            if projection.has_node(&entry.id) {
                projection.set_description_embedding(&entry.id, vector);
                count += 1;
            }
        }
        tracing::info!(count, path = %path.display(), "loaded description embeddings from cache");
        Ok(count)
    }

    fn load_category_cache(
        &self,
        projection: &Projection,
        path: &Path,
    ) -> Result<(), EmbeddingError> {
        let text = std::fs::read_to_string(path).map_err(|e| EmbeddingError::Service {
            message: format!("reading {}: {e}", path.display()),
        })?;
        #[derive(Deserialize)]
        struct CategoryCache {
            #[serde(default)]
            metadata: CacheMetadata,
            embeddings: HashMap<String, Vec<f32>>,
        }
        let cache: CategoryCache =
            serde_json::from_str(&text).map_err(|_| EmbeddingError::CacheFormat {
                path: path.display().to_string(),
            })?;

        let configured_model = &self.settings.category.model;
        let configured_dims = self.settings.category.resolved_dimensions();
        if let (Some(model), Some(dims)) = (
            cache.metadata.category_model.as_ref(),
            cache.metadata.category_dimensions,
        ) {
            if model != configured_model || dims != configured_dims {
                return Err(EmbeddingError::CacheMismatch {
                    cached_model: model.clone(),
                    cached_dimensions: dims,
                    configured_model: configured_model.clone(),
                    configured_dimensions: configured_dims,
                });
            }
        }
        tracing::info!(
            count = cache.embeddings.len(),
            path = %path.display(),
            "loaded category embeddings from cache"
        );
        projection.set_category_embeddings(cache.embeddings);
        Ok(())
    }

    // ── Cache writing ────────────────────────────────────────────────────

    fn save_description_cache(
        &self,
        projection: &Projection,
        path: &Path,
    ) -> Result<(), EmbeddingError> {
        let entries: Vec<DescriptionEntry> = projection
            .description_embeddings()
            .into_iter()
            .map(|(id, v)| DescriptionEntry {
                id,
                description_embedding: Some(v),
            })
            .collect();
        let doc = serde_json::json!({
            "metadata": {
                "description_model": self.settings.description.model,
                "description_dimensions": self.settings.description.resolved_dimensions(),
            },
            "embeddings": entries,
        });
        write_json(path, &doc)
    }

    fn save_category_cache(
        &self,
        projection: &Projection,
        path: &Path,
    ) -> Result<(), EmbeddingError> {
        let doc = serde_json::json!({
            "metadata": {
                "category_model": self.settings.category.model,
                "category_dimensions": self.settings.category.resolved_dimensions(),
            },
            "embeddings": projection.category_embeddings(),
        });
        write_json(path, &doc)
    }

    // ── Service client ───────────────────────────────────────────────────

    /// Call the external embedding service for one text.
    pub fn embed(&self, role: &EmbeddingRole, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::Service {
                message: "cannot embed empty text".to_string(),
            });
        }
        let Some(endpoint) = &self.settings.endpoint else {
            return Err(EmbeddingError::Service {
                message: "no embedding endpoint configured".to_string(),
            });
        };

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        let mut request = agent.post(endpoint);
        if let Ok(key) = std::env::var(&self.settings.api_key_env) {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }
        let response = request
            .send_json(serde_json::json!({
                "model": role.model,
                "input": text,
                "dimensions": role.resolved_dimensions(),
            }))
            .map_err(|e| EmbeddingError::Service {
                message: e.to_string(),
            })?;

        let body: serde_json::Value =
            response.into_json().map_err(|e| EmbeddingError::Service {
                message: format!("invalid response: {e}"),
            })?;
        let embedding = body
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|first| first.get("embedding"))
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbeddingError::Service {
                message: "response missing data[0].embedding".to_string(),
            })?;
        Ok(embedding
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect())
    }

    // ── Search ───────────────────────────────────────────────────────────

    /// Semantic search over the projection.
    pub fn search(
        &self,
        projection: &Projection,
        query: &str,
        top_k: usize,
        kind: SearchKind,
    ) -> Result<Vec<SemanticHit>, EmbeddingError> {
        match kind {
            SearchKind::Category => {
                let map = projection.category_embeddings();
                if map.is_empty() {
                    return Err(EmbeddingError::IndexMissing {
                        search_type: "category".to_string(),
                    });
                }
                let query_vec = self.embed(&self.settings.category, query)?;
                let mut scored: Vec<(String, f32)> = map
                    .iter()
                    .map(|(category, vec)| {
                        (category.clone(), cosine_similarity(&query_vec, vec))
                    })
                    .collect();
                scored.sort_by(|a, b| {
                    b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
                });
                scored.truncate(top_k);
                Ok(scored
                    .into_iter()
                    .map(|(category, score)| SemanticHit {
                        id: None,
                        category: Some(category),
                        types: Vec::new(),
                        description: None,
                        score: score.clamp(0.0, 1.0),
                    })
                    .collect())
            }
            SearchKind::Description => {
                if !projection.has_vector_index() {
                    return Err(EmbeddingError::IndexMissing {
                        search_type: "description".to_string(),
                    });
                }
                let query_vec = self.embed(&self.settings.description, query)?;
                let hits = projection
                    .search_description(&query_vec, top_k)
                    .map_err(|e| EmbeddingError::Service {
                        message: e.to_string(),
                    })?;
                Ok(hits
                    .into_iter()
                    .map(|(id, score)| {
                        let node = projection.node(&id);
                        let (category, description, types) = node
                            .map(|n| {
                                (
                                    n.props
                                        .get("category")
                                        .and_then(|v| v.as_text().map(str::to_string)),
                                    n.props
                                        .get("description")
                                        .and_then(|v| v.as_text().map(str::to_string)),
                                    n.labels
                                        .iter()
                                        .filter(|l| l.as_str() != "Individual")
                                        .cloned()
                                        .collect(),
                                )
                            })
                            .unwrap_or((None, None, Vec::new()));
                        SemanticHit {
                            id: Some(id),
                            category,
                            types,
                            description,
                            score,
                        }
                    })
                    .collect())
            }
        }
    }
}

fn write_json(path: &Path, doc: &serde_json::Value) -> Result<(), EmbeddingError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| EmbeddingError::Service {
            message: format!("creating {}: {e}", parent.display()),
        })?;
    }
    let text = serde_json::to_string_pretty(doc).map_err(|e| EmbeddingError::Service {
        message: e.to_string(),
    })?;
    std::fs::write(path, text).map_err(|e| EmbeddingError::Service {
        message: format!("writing {}: {e}", path.display()),
    })
}
