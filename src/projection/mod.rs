//! Property-graph projection of the reasoned world model.
//!
//! The projection is a pure mirror: one node per individual in the reasoned
//! model, labeled `Individual` plus every class reachable via indirect
//! `rdf:type`, and one directed edge per entailed object-property pair. It is
//! a secondary index, never an authoritative store — full syncs recreate all
//! Individual nodes wholesale, incremental syncs amend them surgically.
//!
//! Uses `petgraph` (stable indices, nodes survive unrelated removals) with a
//! `DashMap` id index, the same dual-index layout as the in-memory knowledge
//! graph this engine grew out of.

pub mod vector;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use dashmap::DashMap;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::error::ProjectionError;
use vector::VectorIndex;

/// A data-property value attached to a projection node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PropertyValue {
    /// Boolean view with the lenient string coercion TTL files need
    /// ("true"/"1"/"yes" count as true).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::Int(i) => Some(*i != 0),
            PropertyValue::Text(s) => {
                Some(matches!(s.to_lowercase().as_str(), "true" | "1" | "yes"))
            }
            PropertyValue::Float(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropertyValue::Bool(b) => serde_json::Value::from(*b),
            PropertyValue::Int(i) => serde_json::Value::from(*i),
            PropertyValue::Float(f) => serde_json::Value::from(*f),
            PropertyValue::Text(s) => serde_json::Value::from(s.clone()),
        }
    }
}

/// A projected individual: multi-label node with data properties.
#[derive(Debug, Clone, Default)]
pub struct NodeRecord {
    pub id: String,
    /// `Individual` plus every indirect class name.
    pub labels: BTreeSet<String>,
    pub props: BTreeMap<String, PropertyValue>,
    pub description_embedding: Option<Vec<f32>>,
}

impl NodeRecord {
    pub fn new(id: impl Into<String>) -> Self {
        let mut labels = BTreeSet::new();
        labels.insert("Individual".to_string());
        Self {
            id: id.into(),
            labels,
            ..Default::default()
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }
}

/// Labels that mark a node as part of the navigable Space∪Portal subgraph.
const SPATIAL_LABELS: [&str; 5] = ["Space", "Portal", "Door", "Opening", "Stairs"];

/// The labeled property graph mirroring the reasoned model.
pub struct Projection {
    graph: RwLock<StableDiGraph<NodeRecord, String>>,
    node_index: DashMap<String, NodeIndex>,
    /// Schema mirror: class name → parent class (the SUBCLASS_OF meta-layer).
    class_parents: DashMap<String, Option<String>>,
    vector: RwLock<Option<VectorIndex>>,
    category_embeddings: RwLock<HashMap<String, Vec<f32>>>,
}

impl Projection {
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(StableDiGraph::new()),
            node_index: DashMap::new(),
            class_parents: DashMap::new(),
            vector: RwLock::new(None),
            category_embeddings: RwLock::new(HashMap::new()),
        }
    }

    // ── Schema meta-layer ────────────────────────────────────────────────

    /// Mirror the schema's class hierarchy (recreated at every schema load).
    pub fn set_class_hierarchy(&self, pairs: impl IntoIterator<Item = (String, Option<String>)>) {
        self.class_parents.clear();
        for (class, parent) in pairs {
            self.class_parents.insert(class, parent);
        }
    }

    pub fn known_class(&self, name: &str) -> bool {
        self.class_parents.contains_key(name)
    }

    // ── Node lifecycle ───────────────────────────────────────────────────

    /// Drop every Individual node and all incident edges. Full syncs call
    /// this before recreating the projection from the reasoned model.
    pub fn clear_individuals(&self) {
        let mut graph = self.graph.write().expect("projection lock poisoned");
        graph.clear();
        self.node_index.clear();
        *self.vector.write().expect("vector lock poisoned") = None;
    }

    /// Create or replace a node. Edges to/from a replaced node are kept.
    pub fn upsert_node(&self, record: NodeRecord) {
        let mut graph = self.graph.write().expect("projection lock poisoned");
        if let Some(idx) = self.node_index.get(&record.id) {
            graph[*idx.value()] = record;
            return;
        }
        let id = record.id.clone();
        let idx = graph.add_node(record);
        self.node_index.insert(id, idx);
    }

    /// Add a labeled edge. Returns false when either endpoint is missing or
    /// the identical edge already exists.
    pub fn add_edge(&self, from: &str, predicate: &str, to: &str) -> bool {
        let (Some(from_idx), Some(to_idx)) = (
            self.node_index.get(from).map(|e| *e.value()),
            self.node_index.get(to).map(|e| *e.value()),
        ) else {
            return false;
        };
        let mut graph = self.graph.write().expect("projection lock poisoned");
        let exists = graph
            .edges_directed(from_idx, Direction::Outgoing)
            .any(|e| e.target() == to_idx && e.weight().as_str() == predicate);
        if exists {
            return false;
        }
        graph.add_edge(from_idx, to_idx, predicate.to_string());
        true
    }

    /// Delete every edge between `a` and `b`, both directions, all
    /// predicates. Returns the number removed. The incremental update path
    /// uses this to front-run stale inferred edges before reasoning.
    pub fn delete_edges_between(&self, a: &str, b: &str) -> usize {
        let (Some(a_idx), Some(b_idx)) = (
            self.node_index.get(a).map(|e| *e.value()),
            self.node_index.get(b).map(|e| *e.value()),
        ) else {
            return 0;
        };
        let mut graph = self.graph.write().expect("projection lock poisoned");
        let mut to_remove = Vec::new();
        for edge in graph.edges_directed(a_idx, Direction::Outgoing) {
            if edge.target() == b_idx {
                to_remove.push(edge.id());
            }
        }
        for edge in graph.edges_directed(b_idx, Direction::Outgoing) {
            if edge.target() == a_idx {
                to_remove.push(edge.id());
            }
        }
        let count = to_remove.len();
        for id in to_remove {
            graph.remove_edge(id);
        }
        count
    }

    // ── Reads ────────────────────────────────────────────────────────────

    pub fn has_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<NodeRecord> {
        let idx = *self.node_index.get(id)?.value();
        let graph = self.graph.read().expect("projection lock poisoned");
        graph.node_weight(idx).cloned()
    }

    pub fn labels_of(&self, id: &str) -> Vec<String> {
        self.node(id)
            .map(|n| n.labels.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.node_index.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.read().expect("projection lock poisoned").edge_count()
    }

    pub fn all_ids(&self) -> Vec<String> {
        self.node_index.iter().map(|e| e.key().clone()).collect()
    }

    /// All outgoing (predicate, target-id) pairs of a node.
    pub fn outgoing(&self, id: &str) -> Vec<(String, String)> {
        let Some(idx) = self.node_index.get(id).map(|e| *e.value()) else {
            return Vec::new();
        };
        let graph = self.graph.read().expect("projection lock poisoned");
        graph
            .edges_directed(idx, Direction::Outgoing)
            .filter_map(|e| {
                let target = graph.node_weight(e.target())?;
                Some((e.weight().clone(), target.id.clone()))
            })
            .collect()
    }

    /// All incoming (predicate, source-id) pairs of a node.
    pub fn incoming(&self, id: &str) -> Vec<(String, String)> {
        let Some(idx) = self.node_index.get(id).map(|e| *e.value()) else {
            return Vec::new();
        };
        let graph = self.graph.read().expect("projection lock poisoned");
        graph
            .edges_directed(idx, Direction::Incoming)
            .filter_map(|e| {
                let source = graph.node_weight(e.source())?;
                Some((e.weight().clone(), source.id.clone()))
            })
            .collect()
    }

    /// Targets of edges labeled with any of `predicates` out of `id`.
    pub fn objects_of(&self, id: &str, predicates: &[&str]) -> Vec<String> {
        self.outgoing(id)
            .into_iter()
            .filter(|(p, _)| predicates.contains(&p.as_str()))
            .map(|(_, t)| t)
            .collect()
    }

    /// Sources of edges labeled `predicate` into `id`.
    pub fn subjects_of(&self, predicate: &str, id: &str) -> Vec<String> {
        self.incoming(id)
            .into_iter()
            .filter(|(p, _)| p == predicate)
            .map(|(_, s)| s)
            .collect()
    }

    pub fn nodes_with_label(&self, label: &str) -> Vec<String> {
        let graph = self.graph.read().expect("projection lock poisoned");
        graph
            .node_weights()
            .filter(|n| n.has_label(label))
            .map(|n| n.id.clone())
            .collect()
    }

    /// Undirected adjacency of the Space∪Portal subgraph over `hasPathTo`.
    /// This is the local copy of the spatial graph the shortest-path tooling
    /// runs on (uniform edge weight).
    pub fn spatial_adjacency(&self) -> HashMap<String, Vec<String>> {
        let graph = self.graph.read().expect("projection lock poisoned");
        let is_spatial = |n: &NodeRecord| SPATIAL_LABELS.iter().any(|l| n.has_label(l));
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        for node in graph.node_weights() {
            if is_spatial(node) {
                adjacency.entry(node.id.clone()).or_default();
            }
        }
        for ei in graph.edge_indices() {
            let Some(weight) = graph.edge_weight(ei) else { continue };
            if weight.as_str() != "hasPathTo" {
                continue;
            }
            let Some((src, dst)) = graph.edge_endpoints(ei) else { continue };
            let (Some(a), Some(b)) = (graph.node_weight(src), graph.node_weight(dst)) else {
                continue;
            };
            if !is_spatial(a) || !is_spatial(b) {
                continue;
            }
            let push = |adj: &mut HashMap<String, Vec<String>>, from: &str, to: &str| {
                let list = adj.entry(from.to_string()).or_default();
                if !list.iter().any(|x| x == to) {
                    list.push(to.to_string());
                }
            };
            push(&mut adjacency, &a.id, &b.id);
            push(&mut adjacency, &b.id, &a.id);
        }
        adjacency
    }

    // ── Embeddings & vector index ────────────────────────────────────────

    pub fn set_description_embedding(&self, id: &str, embedding: Vec<f32>) {
        if let Some(idx) = self.node_index.get(id).map(|e| *e.value()) {
            let mut graph = self.graph.write().expect("projection lock poisoned");
            if let Some(node) = graph.node_weight_mut(idx) {
                node.description_embedding = Some(embedding);
            }
        }
    }

    pub fn description_embeddings(&self) -> Vec<(String, Vec<f32>)> {
        let graph = self.graph.read().expect("projection lock poisoned");
        graph
            .node_weights()
            .filter_map(|n| Some((n.id.clone(), n.description_embedding.clone()?)))
            .collect()
    }

    /// (Re)create the description vector index over every node carrying an
    /// embedding. Idempotent; a dimensionality change drops the old index.
    pub fn rebuild_vector_index(&self, dimensions: usize) -> Result<usize, ProjectionError> {
        let embeddings = self.description_embeddings();
        let mut guard = self.vector.write().expect("vector lock poisoned");
        if embeddings.is_empty() {
            *guard = None;
            return Ok(0);
        }
        let index = VectorIndex::build(dimensions, &embeddings)?;
        let count = embeddings.len();
        *guard = Some(index);
        Ok(count)
    }

    pub fn has_vector_index(&self) -> bool {
        self.vector.read().expect("vector lock poisoned").is_some()
    }

    pub fn vector_dimensions(&self) -> Option<usize> {
        self.vector
            .read()
            .expect("vector lock poisoned")
            .as_ref()
            .map(|v| v.dimensions())
    }

    /// Top-k ids by cosine similarity of `description_embedding`.
    pub fn search_description(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<(String, f32)>, ProjectionError> {
        let guard = self.vector.read().expect("vector lock poisoned");
        let index = guard.as_ref().ok_or(ProjectionError::VectorIndex {
            message: "no description vector index built".into(),
        })?;
        index.search(query, top_k)
    }

    pub fn set_category_embeddings(&self, map: HashMap<String, Vec<f32>>) {
        *self
            .category_embeddings
            .write()
            .expect("category lock poisoned") = map;
    }

    pub fn category_embeddings(&self) -> HashMap<String, Vec<f32>> {
        self.category_embeddings
            .read()
            .expect("category lock poisoned")
            .clone()
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Projection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projection")
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .field("vector_index", &self.has_vector_index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, labels: &[&str]) -> NodeRecord {
        let mut record = NodeRecord::new(id);
        for l in labels {
            record.labels.insert(l.to_string());
        }
        record
    }

    #[test]
    fn upsert_and_edges() {
        let p = Projection::new();
        p.upsert_node(node("robot1", &["Robot"]));
        p.upsert_node(node("kitchen_13", &["Space", "Location"]));

        assert!(p.add_edge("robot1", "robotIsInSpace", "kitchen_13"));
        // exact duplicate is a no-op
        assert!(!p.add_edge("robot1", "robotIsInSpace", "kitchen_13"));
        // different predicate between the same endpoints is a new edge
        assert!(p.add_edge("robot1", "objectIsInSpace", "kitchen_13"));

        assert_eq!(
            p.objects_of("robot1", &["robotIsInSpace"]),
            vec!["kitchen_13".to_string()]
        );
        assert_eq!(p.subjects_of("robotIsInSpace", "kitchen_13").len(), 1);
        assert_eq!(p.edge_count(), 2);
    }

    #[test]
    fn edge_to_missing_node_is_skipped() {
        let p = Projection::new();
        p.upsert_node(node("a", &[]));
        assert!(!p.add_edge("a", "isInsideOf", "ghost"));
        assert_eq!(p.edge_count(), 0);
    }

    #[test]
    fn delete_edges_between_removes_both_directions() {
        let p = Projection::new();
        p.upsert_node(node("robot1", &["Robot"]));
        p.upsert_node(node("corridor_14", &["Space"]));
        p.add_edge("robot1", "robotIsInSpace", "corridor_14");
        p.add_edge("robot1", "objectIsInSpace", "corridor_14");
        p.add_edge("corridor_14", "spaceHasObject", "robot1");

        let removed = p.delete_edges_between("robot1", "corridor_14");
        assert_eq!(removed, 3);
        assert_eq!(p.edge_count(), 0);
    }

    #[test]
    fn clear_individuals_resets_everything() {
        let p = Projection::new();
        p.upsert_node(node("a", &[]));
        p.upsert_node(node("b", &[]));
        p.add_edge("a", "isOntopOf", "b");
        p.clear_individuals();
        assert_eq!(p.node_count(), 0);
        assert_eq!(p.edge_count(), 0);
        assert!(!p.has_node("a"));
    }

    #[test]
    fn spatial_adjacency_restricted_to_space_and_portals() {
        let p = Projection::new();
        p.upsert_node(node("kitchen_13", &["Space"]));
        p.upsert_node(node("door_9", &["Door", "Portal"]));
        p.upsert_node(node("corridor_14", &["Space"]));
        p.upsert_node(node("cup_6", &["Artifact"]));
        p.add_edge("kitchen_13", "hasPathTo", "door_9");
        p.add_edge("door_9", "hasPathTo", "corridor_14");
        // non-spatial edge must not leak into the subgraph
        p.add_edge("cup_6", "hasPathTo", "kitchen_13");

        let adj = p.spatial_adjacency();
        assert!(adj["kitchen_13"].contains(&"door_9".to_string()));
        assert!(adj["door_9"].contains(&"kitchen_13".to_string()));
        assert!(adj["door_9"].contains(&"corridor_14".to_string()));
        assert!(!adj.contains_key("cup_6"));
    }

    #[test]
    fn vector_index_roundtrip() {
        let p = Projection::new();
        let mut couch = node("couch_32", &["Artifact"]);
        couch.description_embedding = Some(vec![1.0, 0.0, 0.0]);
        let mut oven = node("oven_53", &["Artifact"]);
        oven.description_embedding = Some(vec![0.0, 1.0, 0.0]);
        p.upsert_node(couch);
        p.upsert_node(oven);

        let indexed = p.rebuild_vector_index(3).unwrap();
        assert_eq!(indexed, 2);
        assert!(p.has_vector_index());
        assert_eq!(p.vector_dimensions(), Some(3));

        let hits = p.search_description(&[0.9, 0.1, 0.0], 1).unwrap();
        assert_eq!(hits[0].0, "couch_32");
        assert!(hits[0].1 > 0.9);
    }

    #[test]
    fn rebuild_with_no_embeddings_drops_index() {
        let p = Projection::new();
        p.upsert_node(node("a", &[]));
        assert_eq!(p.rebuild_vector_index(3).unwrap(), 0);
        assert!(!p.has_vector_index());
    }

    #[test]
    fn property_value_bool_coercion() {
        assert_eq!(PropertyValue::Bool(true).as_bool(), Some(true));
        assert_eq!(PropertyValue::Text("true".into()).as_bool(), Some(true));
        assert_eq!(PropertyValue::Text("YES".into()).as_bool(), Some(true));
        assert_eq!(PropertyValue::Text("false".into()).as_bool(), Some(false));
        assert_eq!(PropertyValue::Int(0).as_bool(), Some(false));
    }
}
