//! World: the ontology facade.
//!
//! Owns the asserted store (the authoritative symbolic model), the schema,
//! the reasoner output, a materialized RDF mirror for SPARQL SELECT, and the
//! property-graph projection with its embedding binder. All mutation flows
//! through here; the invariant *asserted facts ⇒ reasoner ⇒ projection*
//! holds after every externally observable operation.
//!
//! The asserted and inferred views are kept strictly separate: writers touch
//! only `individuals`; `materialized` is recomputed by the reasoner and is
//! what the RDF mirror and the projection are derived from.

pub mod ingest;
pub mod reasoner;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use oxigraph::model::vocab::xsd;
use oxigraph::model::{GraphNameRef, Literal, NamedNode, Quad, Term};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingBinder;
use crate::error::{SeshatError, SparqlError, WorldError};
use crate::paths::EnvPaths;
use crate::projection::{NodeRecord, Projection, PropertyValue};
use crate::schema::Schema;
use crate::sparql;
use crate::ttl::ASSERTED_SPATIAL_PREDICATES;

use reasoner::Materialized;

/// Whether the session is currently loading static or dynamic world data.
/// Drives the embedding cache selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Static,
    Dynamic,
}

/// An individual in the asserted store.
#[derive(Debug, Clone)]
pub struct Individual {
    pub id: String,
    /// Asserted classes (usually exactly one).
    pub classes: Vec<String>,
    pub data_props: BTreeMap<String, PropertyValue>,
    pub object_props: BTreeMap<String, Vec<String>>,
}

/// Wire shape for adding an individual.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndividualData {
    pub id: String,
    #[serde(rename = "class")]
    pub class: String,
    #[serde(default)]
    pub data_properties: BTreeMap<String, PropertyValue>,
    #[serde(default, deserialize_with = "de_object_props")]
    pub object_properties: BTreeMap<String, Vec<String>>,
}

/// Wire shape for a partial update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndividualPatch {
    #[serde(default)]
    pub data_properties: Option<BTreeMap<String, PropertyValue>>,
    #[serde(default, deserialize_with = "de_opt_object_props")]
    pub object_properties: Option<BTreeMap<String, Vec<String>>>,
}

fn de_object_props<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    let raw: BTreeMap<String, OneOrMany> = BTreeMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| {
            (
                k,
                match v {
                    OneOrMany::One(s) => vec![s],
                    OneOrMany::Many(v) => v,
                },
            )
        })
        .collect())
}

fn de_opt_object_props<'de, D>(
    deserializer: D,
) -> Result<Option<BTreeMap<String, Vec<String>>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "de_object_props")] BTreeMap<String, Vec<String>>);
    Option::<Wrapper>::deserialize(deserializer).map(|o| o.map(|w| w.0))
}

/// Per-item outcome of a batch load.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub added: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Counts returned by a full sync.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub individuals: usize,
    pub relationships: usize,
    pub embeddings: usize,
}

/// `GET /status` payload.
#[derive(Debug, Clone, Serialize)]
pub struct WorldStatus {
    pub status: String,
    pub ontology: String,
    pub individuals_count: usize,
    pub classes_count: usize,
    pub individuals: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_id: Option<String>,
}

/// One cell of a SPARQL SELECT row, tagged by term kind.
#[derive(Debug, Clone, Serialize)]
pub struct SparqlCell {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectResponse {
    pub count: usize,
    pub results: Vec<Vec<SparqlCell>>,
}

/// The ontology facade.
pub struct World {
    schema: Arc<Schema>,
    projection: Arc<Projection>,
    binder: EmbeddingBinder,
    individuals: BTreeMap<String, Individual>,
    materialized: Materialized,
    rdf: Store,
    current_data_type: Option<DataKind>,
    env: Option<EnvPaths>,
}

impl World {
    pub fn new(schema: Schema, binder: EmbeddingBinder) -> Result<Self, WorldError> {
        let rdf = Store::new().map_err(|e| WorldError::Store {
            message: e.to_string(),
        })?;
        let projection = Arc::new(Projection::new());
        projection.set_class_hierarchy(
            schema
                .class_names()
                .map(|c| (c.clone(), schema.class(c).and_then(|d| d.parent.clone()))),
        );
        Ok(Self {
            schema: Arc::new(schema),
            projection,
            binder,
            individuals: BTreeMap::new(),
            materialized: Materialized::default(),
            rdf,
            current_data_type: None,
            env: None,
        })
    }

    /// Attach the active environment (selects embedding cache paths).
    pub fn set_env(&mut self, env: EnvPaths) {
        self.env = Some(env);
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn projection(&self) -> Arc<Projection> {
        Arc::clone(&self.projection)
    }

    pub fn binder(&self) -> &EmbeddingBinder {
        &self.binder
    }

    pub fn individuals_count(&self) -> usize {
        self.individuals.len()
    }

    pub fn individual(&self, id: &str) -> Option<&Individual> {
        self.individuals.get(id)
    }

    pub fn current_data_type(&self) -> Option<DataKind> {
        self.current_data_type
    }

    pub fn status(&self) -> WorldStatus {
        WorldStatus {
            status: "running".to_string(),
            ontology: self.schema.namespace().to_string(),
            individuals_count: self.individuals.len(),
            classes_count: self.schema.class_names().count(),
            individuals: self.individuals.keys().cloned().collect(),
            env_id: self.env.as_ref().map(|e| e.env_id.clone()),
        }
    }

    // ── Mutation ─────────────────────────────────────────────────────────

    /// Add a single individual. With `auto_sync`, reasoning and projection
    /// rebuild run before returning.
    pub fn add_individual(
        &mut self,
        data: IndividualData,
        auto_sync: bool,
    ) -> Result<(), SeshatError> {
        self.create_individual(&data)?;
        self.attach_properties(&data);
        tracing::info!(id = %data.id, class = %data.class, "added individual");
        if auto_sync {
            self.sync(false)?;
        }
        Ok(())
    }

    /// Two-pass batch add: create every individual first so forward
    /// references resolve, then attach properties, then reason exactly once.
    /// Per-item failures are counted, not fatal.
    pub fn add_individuals_batch(
        &mut self,
        items: Vec<IndividualData>,
    ) -> Result<BatchReport, SeshatError> {
        let mut report = BatchReport::default();

        for data in &items {
            match self.create_individual(data) {
                Ok(()) => report.added += 1,
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(format!("{}: {e}", data.id));
                    tracing::warn!(id = %data.id, error = %e, "failed to add individual");
                }
            }
        }
        for data in &items {
            if self.individuals.contains_key(&data.id) {
                self.attach_properties(data);
            }
        }

        tracing::info!(added = report.added, failed = report.failed, "batch add complete");
        self.sync(false)?;
        Ok(report)
    }

    /// Partial update; `NotFound` when the id is unknown.
    pub fn update_individual(
        &mut self,
        id: &str,
        patch: IndividualPatch,
    ) -> Result<(), SeshatError> {
        if !self.individuals.contains_key(id) {
            return Err(WorldError::NotFound { id: id.to_string() }.into());
        }
        let resolved_props = patch.object_properties.map(|props| {
            props
                .into_iter()
                .map(|(prop, targets)| {
                    let resolved = self.resolve_targets(id, &prop, targets);
                    (prop, resolved)
                })
                .collect::<Vec<_>>()
        });
        let individual = self.individuals.get_mut(id).expect("checked above");
        if let Some(data_props) = patch.data_properties {
            for (k, v) in data_props {
                individual.data_props.insert(k, v);
            }
        }
        if let Some(props) = resolved_props {
            for (prop, targets) in props {
                individual.object_props.insert(prop, targets);
            }
        }
        tracing::info!(id, "updated individual");
        self.sync(false)?;
        Ok(())
    }

    /// Remove an individual and every reference to it.
    pub fn delete_individual(&mut self, id: &str) -> Result<(), SeshatError> {
        if self.individuals.remove(id).is_none() {
            return Err(WorldError::NotFound { id: id.to_string() }.into());
        }
        for other in self.individuals.values_mut() {
            for targets in other.object_props.values_mut() {
                targets.retain(|t| t != id);
            }
        }
        tracing::info!(id, "deleted individual");
        self.sync(false)?;
        Ok(())
    }

    /// Load every individual from a TTL file via the batch path.
    pub fn load_from_ttl(&mut self, path: &Path) -> Result<BatchReport, SeshatError> {
        let (individuals, kind) = ingest::parse_ttl(path)?;
        if kind.is_some() {
            self.current_data_type = kind;
        }
        tracing::info!(
            path = %path.display(),
            count = individuals.len(),
            kind = ?kind,
            "loading individuals from TTL"
        );
        self.add_individuals_batch(individuals)
    }

    fn create_individual(&mut self, data: &IndividualData) -> Result<(), WorldError> {
        if self.individuals.contains_key(&data.id) {
            return Err(WorldError::DuplicateIndividual {
                id: data.id.clone(),
            });
        }
        if !self.schema.has_class(&data.class) {
            return Err(WorldError::UnknownClass {
                class_name: data.class.clone(),
            });
        }
        self.individuals.insert(
            data.id.clone(),
            Individual {
                id: data.id.clone(),
                classes: vec![data.class.clone()],
                data_props: BTreeMap::new(),
                object_props: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn attach_properties(&mut self, data: &IndividualData) {
        let resolved: Vec<(String, Vec<String>)> = data
            .object_properties
            .iter()
            .map(|(prop, targets)| {
                (
                    prop.clone(),
                    self.resolve_targets(&data.id, prop, targets.clone()),
                )
            })
            .collect();
        for k in data.data_properties.keys() {
            if !self.schema.is_data_property(k) {
                tracing::warn!(subject = %data.id, property = %k, "data property not declared in schema");
            }
        }
        let Some(individual) = self.individuals.get_mut(&data.id) else {
            return;
        };
        for (k, v) in &data.data_properties {
            individual.data_props.insert(k.clone(), v.clone());
        }
        for (prop, targets) in resolved {
            if !targets.is_empty() {
                individual.object_props.insert(prop, targets);
            }
        }
    }

    /// Keep only targets that resolve to existing individuals; unresolved
    /// ones are skipped with a warning rather than failing the operation.
    fn resolve_targets(&self, id: &str, prop: &str, targets: Vec<String>) -> Vec<String> {
        targets
            .into_iter()
            .filter(|target| {
                let known = self.individuals.contains_key(target);
                if !known {
                    tracing::warn!(
                        subject = id,
                        property = prop,
                        target = %target,
                        "skipping unresolved object-property target"
                    );
                }
                known
            })
            .collect()
    }

    // ── Asserted-store access for the SPARQL bridge ──────────────────────

    /// Remove one asserted object-property value. Missing values are
    /// silently tolerated so replays of the same delete are idempotent.
    pub(crate) fn remove_asserted_object(&mut self, subject: &str, predicate: &str, object: &str) {
        if let Some(individual) = self.individuals.get_mut(subject) {
            if let Some(targets) = individual.object_props.get_mut(predicate) {
                let before = targets.len();
                targets.retain(|t| t != object);
                if targets.len() < before {
                    tracing::debug!(subject, predicate, object, "removed asserted value");
                }
                if targets.is_empty() {
                    individual.object_props.remove(predicate);
                }
            }
        }
    }

    /// Add one asserted object-property value if not already present.
    pub(crate) fn insert_asserted_object(&mut self, subject: &str, predicate: &str, object: &str) {
        if !self.individuals.contains_key(object) {
            tracing::warn!(subject, predicate, object, "insert target unknown; skipping");
            return;
        }
        if let Some(individual) = self.individuals.get_mut(subject) {
            let targets = individual.object_props.entry(predicate.to_string()).or_default();
            if !targets.iter().any(|t| t == object) {
                targets.push(object.to_string());
                tracing::debug!(subject, predicate, object, "added asserted value");
            }
        } else {
            tracing::warn!(subject, predicate, object, "insert subject unknown; skipping");
        }
    }

    /// Run the reasoner over the current asserted store.
    pub fn reason(&mut self) -> Result<(), WorldError> {
        tracing::info!("running reasoner");
        self.materialized = reasoner::materialize(&self.schema, &self.individuals)?;
        tracing::info!(pairs = self.materialized.pair_count(), "reasoner completed");
        Ok(())
    }

    // ── Sync ─────────────────────────────────────────────────────────────

    /// Reason (unless already done) and recreate the projection from the
    /// reasoned model. Atomic from the caller's perspective: the next read
    /// observes either the old projection or the fully rebuilt one.
    pub fn sync(&mut self, skip_reasoning: bool) -> Result<SyncReport, SeshatError> {
        if !skip_reasoning {
            self.reason()?;
        } else {
            tracing::debug!("skipping reasoning (already done)");
        }

        self.rebuild_rdf()?;

        // Recreate the projection wholesale: merge-style syncs would
        // accumulate stale inferred edges across load→reason→load cycles.
        self.projection.clear_individuals();

        let mut individuals_count = 0usize;
        for individual in self.individuals.values() {
            let mut record = NodeRecord::new(&individual.id);
            if let Some(types) = self.materialized.types.get(&individual.id) {
                record.labels.extend(types.iter().cloned());
            } else {
                record.labels.extend(individual.classes.iter().cloned());
            }
            record.props = individual.data_props.clone();
            self.projection.upsert_node(record);
            individuals_count += 1;
        }

        let mut relationships_count = 0usize;
        for (predicate, pairs) in &self.materialized.relations {
            for (s, o) in pairs {
                if self.projection.add_edge(s, predicate, o) {
                    relationships_count += 1;
                }
            }
        }

        let embeddings = match self.binder.bind(
            &self.projection,
            self.current_data_type,
            self.env.as_ref(),
        ) {
            Ok(count) => count,
            Err(e) if self.binder.settings().generate => {
                // Generation problems are tolerated; the store stays usable
                // without vectors.
                tracing::warn!(error = %e, "embedding generation failed; continuing without embeddings");
                0
            }
            Err(e) => return Err(e.into()),
        };
        if embeddings > 0 {
            if let Err(e) = self
                .projection
                .rebuild_vector_index(self.binder.description_dimensions())
            {
                tracing::warn!(error = %e, "vector index rebuild failed");
            }
        }

        let report = SyncReport {
            individuals: individuals_count,
            relationships: relationships_count,
            embeddings,
        };
        tracing::info!(
            individuals = report.individuals,
            relationships = report.relationships,
            embeddings = report.embeddings,
            "synced projection"
        );
        Ok(report)
    }

    /// Rebuild the materialized RDF mirror used by SPARQL SELECT.
    fn rebuild_rdf(&mut self) -> Result<(), WorldError> {
        let store = Store::new().map_err(|e| WorldError::Store {
            message: e.to_string(),
        })?;
        let ns = self.schema.namespace().to_string();
        let store_err = |e: &dyn std::fmt::Display| WorldError::Store {
            message: e.to_string(),
        };
        let node = |name: &str| {
            NamedNode::new(format!("{ns}{name}")).map_err(|e| store_err(&e))
        };
        let rdf_type =
            NamedNode::new("http://www.w3.org/1999/02/22-rdf-syntax-ns#type").expect("valid IRI");

        for (id, types) in &self.materialized.types {
            for class in types {
                let quad = Quad::new(
                    node(id)?,
                    rdf_type.clone(),
                    node(class)?,
                    GraphNameRef::DefaultGraph,
                );
                store.insert(&quad).map_err(|e| store_err(&e))?;
            }
        }
        for (predicate, pairs) in &self.materialized.relations {
            for (s, o) in pairs {
                let quad = Quad::new(
                    node(s)?,
                    node(predicate)?,
                    node(o)?,
                    GraphNameRef::DefaultGraph,
                );
                store.insert(&quad).map_err(|e| store_err(&e))?;
            }
        }
        for individual in self.individuals.values() {
            for (prop, value) in &individual.data_props {
                let literal = match value {
                    PropertyValue::Bool(b) => {
                        Literal::new_typed_literal(b.to_string(), xsd::BOOLEAN)
                    }
                    PropertyValue::Int(i) => {
                        Literal::new_typed_literal(i.to_string(), xsd::INTEGER)
                    }
                    PropertyValue::Float(f) => {
                        Literal::new_typed_literal(f.to_string(), xsd::DOUBLE)
                    }
                    PropertyValue::Text(s) => Literal::new_simple_literal(s),
                };
                let quad = Quad::new(
                    node(&individual.id)?,
                    node(prop)?,
                    literal,
                    GraphNameRef::DefaultGraph,
                );
                store.insert(&quad).map_err(|e| store_err(&e))?;
            }
        }

        self.rdf = store;
        Ok(())
    }

    // ── SPARQL ───────────────────────────────────────────────────────────

    /// Read-only SELECT (or ASK) against the materialized model.
    pub fn execute_sparql_select(&self, query: &str) -> Result<SelectResponse, SparqlError> {
        let query = self.with_default_prefixes(query);
        let results = self.rdf.query(&query).map_err(|e| SparqlError::Query {
            message: e.to_string(),
        })?;

        match results {
            QueryResults::Solutions(solutions) => {
                let ns = self.schema.namespace();
                let mut rows = Vec::new();
                for solution in solutions {
                    let solution = solution.map_err(|e| SparqlError::Query {
                        message: e.to_string(),
                    })?;
                    let mut row = Vec::new();
                    for (_, term) in solution.iter() {
                        row.push(tag_term(term, ns));
                    }
                    rows.push(row);
                }
                Ok(SelectResponse {
                    count: rows.len(),
                    results: rows,
                })
            }
            QueryResults::Boolean(b) => Ok(SelectResponse {
                count: 1,
                results: vec![vec![SparqlCell {
                    kind: "literal".to_string(),
                    value: b.to_string(),
                }]],
            }),
            QueryResults::Graph(_) => Err(SparqlError::Query {
                message: "CONSTRUCT/DESCRIBE queries are not supported on this endpoint".into(),
            }),
        }
    }

    /// Apply a restricted DELETE/INSERT update (see the sparql module for
    /// the accepted shape), then reason once and re-project.
    pub fn execute_sparql_update(&mut self, text: &str) -> Result<(), SeshatError> {
        let update = sparql::parse_update(text, self.schema.namespace())?;

        // 1. Remove asserted values for each DELETE triple.
        for triple in &update.delete {
            if self.schema.is_object_property(&triple.predicate) {
                self.remove_asserted_object(&triple.subject, &triple.predicate, &triple.object);
            }
        }

        // 2. Front-run stale inferred edges: the reasoner enriches, it does
        //    not retract from a projection that still shows the old state.
        for triple in &update.delete {
            if ASSERTED_SPATIAL_PREDICATES.contains(&triple.predicate.as_str()) {
                let removed = self
                    .projection
                    .delete_edges_between(&triple.subject, &triple.object);
                tracing::debug!(
                    subject = %triple.subject,
                    object = %triple.object,
                    removed,
                    "pre-deleted projection edges"
                );
            }
        }

        // 3. Apply inserts.
        for triple in &update.insert {
            if self.schema.is_object_property(&triple.predicate) {
                self.insert_asserted_object(&triple.subject, &triple.predicate, &triple.object);
            }
        }

        // 4 + 5. One reasoning pass, then a projection rebuild from it.
        self.reason()?;
        self.sync(true)?;
        Ok(())
    }

    fn with_default_prefixes(&self, query: &str) -> String {
        if query.to_uppercase().contains("PREFIX") {
            return query.to_string();
        }
        format!(
            "PREFIX : <{}>\n\
             PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>\n\
             PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>\n\
             PREFIX owl: <http://www.w3.org/2002/07/owl#>\n\
             PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>\n\
             {query}",
            self.schema.namespace()
        )
    }
}

fn tag_term(term: &Term, namespace: &str) -> SparqlCell {
    match term {
        Term::NamedNode(n) => {
            let iri = n.as_str();
            if let Some(local) = iri.strip_prefix(namespace) {
                SparqlCell {
                    kind: "individual".to_string(),
                    value: local.to_string(),
                }
            } else {
                SparqlCell {
                    kind: "iri".to_string(),
                    value: iri.to_string(),
                }
            }
        }
        Term::Literal(lit) => SparqlCell {
            kind: "literal".to_string(),
            value: lit.value().to_string(),
        },
        other => SparqlCell {
            kind: "literal".to_string(),
            value: other.to_string(),
        },
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("individuals", &self.individuals.len())
            .field("data_type", &self.current_data_type)
            .finish()
    }
}
