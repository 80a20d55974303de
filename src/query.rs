//! Read-only query tools over the projection.
//!
//! Three operations, all returning normalized JSON-like records: object
//! info, conjunctive filtering, and shortest-path lookup on the spatial
//! subgraph. Reads degrade gracefully — a lookup miss yields an empty
//! result, not an error.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::Serialize;
use serde_json::Value;

use crate::error::QueryError;
use crate::projection::{NodeRecord, Projection};

/// A normalized object record: data properties plus relationships, each
/// relationship a scalar or a list depending on cardinality.
pub type ObjectRecord = BTreeMap<String, Value>;

/// One node on a found path.
#[derive(Debug, Clone, Serialize)]
pub struct PathNode {
    pub index: usize,
    pub id: String,
}

/// Shortest-path result over the Space∪Portal subgraph.
#[derive(Debug, Clone, Serialize)]
pub struct PathResult {
    pub path: Vec<PathNode>,
    /// Number of edges (uniform weight).
    pub cost: usize,
    pub num_nodes: usize,
}

/// Internal fields never exposed in records.
const HIDDEN_PROPS: [&str; 4] = ["uri", "name", "category_embedding", "description_embedding"];

/// Query tools bound to a projection.
pub struct QueryTools<'a> {
    projection: &'a Projection,
}

impl<'a> QueryTools<'a> {
    pub fn new(projection: &'a Projection) -> Self {
        Self { projection }
    }

    /// Normalize a relationship name the way the ontology spells it.
    fn normalize_relationship(name: &str) -> Option<String> {
        if name == "affords" {
            return None; // affordances live in the planning surface, not here
        }
        if name == "objectIsInSpace" || name == "robotIsInSpace" {
            return Some("isInSpace".to_string());
        }
        if name.ends_with("IsInStorey") {
            return Some("isInStorey".to_string());
        }
        Some(name.to_string())
    }

    fn record_for(&self, node: &NodeRecord) -> ObjectRecord {
        let mut record = ObjectRecord::new();
        record.insert("id".to_string(), Value::from(node.id.clone()));
        for (key, value) in &node.props {
            if HIDDEN_PROPS.contains(&key.as_str()) {
                continue;
            }
            record.insert(key.clone(), value.to_json());
        }
        for (predicate, target) in self.projection.outgoing(&node.id) {
            let Some(key) = Self::normalize_relationship(&predicate) else {
                continue;
            };
            let candidate = Value::from(target);
            match record.entry(key) {
                std::collections::btree_map::Entry::Vacant(slot) => {
                    slot.insert(candidate);
                }
                std::collections::btree_map::Entry::Occupied(mut slot) => {
                    match slot.get_mut() {
                        Value::Array(list) => {
                            if !list.contains(&candidate) {
                                list.push(candidate);
                            }
                        }
                        existing => {
                            let first = existing.clone();
                            if first != candidate {
                                *existing = Value::Array(vec![first, candidate]);
                            }
                        }
                    }
                }
            }
        }
        record
    }

    /// Full records for the given ids; unknown ids are skipped.
    pub fn get_object_info(&self, ids: &[String]) -> Vec<ObjectRecord> {
        ids.iter()
            .filter_map(|id| self.projection.node(id))
            .map(|node| self.record_for(&node))
            .collect()
    }

    /// Conjunctive filter: class label, category, outgoing relationships,
    /// and data-property equality, all optional and combined with AND.
    pub fn filter_objects(
        &self,
        class_name: Option<&str>,
        category: Option<&str>,
        relationships: &BTreeMap<String, String>,
        data_properties: &BTreeMap<String, Value>,
    ) -> Vec<ObjectRecord> {
        // Class filters only make sense against the mirrored schema.
        if let Some(class_name) = class_name {
            if class_name != "Individual" && !self.projection.known_class(class_name) {
                tracing::warn!(class = class_name, "filter on unknown class");
                return Vec::new();
            }
        }

        let mut ids = self.projection.all_ids();
        ids.sort();

        let mut results = Vec::new();
        for id in ids {
            let Some(node) = self.projection.node(&id) else { continue };

            if let Some(class_name) = class_name {
                if !node.has_label(class_name) {
                    continue;
                }
            }
            if let Some(category) = category {
                let matches = node
                    .props
                    .get("category")
                    .and_then(|v| v.as_text())
                    .map(|c| c == category)
                    .unwrap_or(false);
                if !matches {
                    continue;
                }
            }
            if !data_properties.iter().all(|(key, expected)| {
                node.props
                    .get(key)
                    .map(|v| &v.to_json() == expected)
                    .unwrap_or(false)
            }) {
                continue;
            }
            if !relationships.iter().all(|(predicate, target)| {
                self.projection
                    .objects_of(&id, &[predicate.as_str()])
                    .iter()
                    .any(|t| t == target)
            }) {
                continue;
            }

            results.push(self.record_for(&node));
        }
        results
    }

    /// Shortest path between two locations over `hasPathTo`, uniform edge
    /// weight. Artifact endpoints resolve to the Space that contains them.
    pub fn find_path(&self, from_id: &str, to_id: &str) -> Result<PathResult, QueryError> {
        let from = self.resolve_location(from_id)?;
        let to = self.resolve_location(to_id)?;

        let adjacency = self.projection.spatial_adjacency();
        let path = bfs_path(&adjacency, &from, &to).ok_or_else(|| QueryError::NoPath {
            from: from.clone(),
            to: to.clone(),
        })?;

        Ok(PathResult {
            cost: path.len().saturating_sub(1),
            num_nodes: path.len(),
            path: path
                .into_iter()
                .enumerate()
                .map(|(index, id)| PathNode { index, id })
                .collect(),
        })
    }

    fn resolve_location(&self, id: &str) -> Result<String, QueryError> {
        let labels = self.projection.labels_of(id);
        if labels.is_empty() {
            return Err(QueryError::Unresolvable { id: id.to_string() });
        }
        let is_location = ["Space", "Portal", "Door", "Opening", "Stairs"]
            .iter()
            .any(|l| labels.iter().any(|x| x == l));
        if is_location {
            return Ok(id.to_string());
        }
        // Artifact or robot: use its containing Space.
        self.projection
            .objects_of(id, &["isInSpace", "objectIsInSpace", "robotIsInSpace"])
            .into_iter()
            .find(|t| self.projection.labels_of(t).iter().any(|l| l == "Space"))
            .ok_or_else(|| QueryError::Unresolvable { id: id.to_string() })
    }
}

fn bfs_path(
    adjacency: &HashMap<String, Vec<String>>,
    from: &str,
    to: &str,
) -> Option<Vec<String>> {
    if from == to {
        return Some(vec![from.to_string()]);
    }
    if !adjacency.contains_key(from) {
        return None;
    }
    let mut parents: HashMap<String, String> = HashMap::new();
    let mut queue: VecDeque<&str> = VecDeque::from([from]);
    parents.insert(from.to_string(), from.to_string());
    while let Some(current) = queue.pop_front() {
        let Some(neighbors) = adjacency.get(current) else { continue };
        for neighbor in neighbors {
            if parents.contains_key(neighbor) {
                continue;
            }
            parents.insert(neighbor.clone(), current.to_string());
            if neighbor == to {
                let mut path = vec![neighbor.clone()];
                let mut cursor = neighbor.as_str();
                while cursor != from {
                    let parent = parents.get(cursor)?;
                    path.push(parent.clone());
                    cursor = parents.get(cursor)?;
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(neighbor);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::PropertyValue;

    fn add_node(p: &Projection, id: &str, labels: &[&str], props: &[(&str, PropertyValue)]) {
        let mut node = NodeRecord::new(id);
        for l in labels {
            node.labels.insert(l.to_string());
        }
        for (k, v) in props {
            node.props.insert(k.to_string(), v.clone());
        }
        p.upsert_node(node);
    }

    fn sample_world() -> Projection {
        let p = Projection::new();
        p.set_class_hierarchy(
            [
                ("Location", None),
                ("Space", Some("Location")),
                ("Portal", Some("Location")),
                ("Door", Some("Portal")),
                ("Storey", None),
                ("Artifact", None),
                ("Robot", None),
                ("Affordance", None),
            ]
            .map(|(c, p): (&str, Option<&str>)| (c.to_string(), p.map(str::to_string))),
        );
        add_node(&p, "kitchen_13", &["Space", "Location"], &[]);
        add_node(&p, "living_room_23", &["Space", "Location"], &[]);
        add_node(&p, "door_9", &["Door", "Portal", "Location"], &[]);
        add_node(&p, "floor_1", &["Storey"], &[]);
        for (a, b) in [("kitchen_13", "door_9"), ("door_9", "living_room_23")] {
            p.add_edge(a, "hasPathTo", b);
            p.add_edge(b, "hasPathTo", a);
        }
        p.add_edge("kitchen_13", "spaceIsInStorey", "floor_1");

        add_node(
            &p,
            "mug_5",
            &["Artifact"],
            &[
                ("category", PropertyValue::Text("mug".into())),
                ("isOpen", PropertyValue::Bool(false)),
            ],
        );
        add_node(&p, "Affordance_PickupOneHand", &["Affordance"], &[]);
        p.add_edge("mug_5", "objectIsInSpace", "kitchen_13");
        p.add_edge("mug_5", "affords", "Affordance_PickupOneHand");

        add_node(&p, "robot1", &["Robot"], &[]);
        p.add_edge("robot1", "robotIsInSpace", "living_room_23");
        p
    }

    #[test]
    fn object_info_normalizes_relationships() {
        let p = sample_world();
        let tools = QueryTools::new(&p);
        let records = tools.get_object_info(&["mug_5".to_string(), "ghost".to_string()]);
        assert_eq!(records.len(), 1);
        let mug = &records[0];
        assert_eq!(mug["id"], "mug_5");
        assert_eq!(mug["category"], "mug");
        assert_eq!(mug["isOpen"], Value::from(false));
        // objectIsInSpace renamed, affords dropped
        assert_eq!(mug["isInSpace"], "kitchen_13");
        assert!(!mug.contains_key("objectIsInSpace"));
        assert!(!mug.contains_key("affords"));
    }

    #[test]
    fn storey_relationships_normalized() {
        let p = sample_world();
        let tools = QueryTools::new(&p);
        let records = tools.get_object_info(&["kitchen_13".to_string()]);
        assert_eq!(records[0]["isInStorey"], "floor_1");
    }

    #[test]
    fn filter_by_class_category_and_relationship() {
        let p = sample_world();
        let tools = QueryTools::new(&p);

        let all_artifacts =
            tools.filter_objects(Some("Artifact"), None, &BTreeMap::new(), &BTreeMap::new());
        assert_eq!(all_artifacts.len(), 1);

        let mugs_in_kitchen = tools.filter_objects(
            None,
            Some("mug"),
            &BTreeMap::from([("objectIsInSpace".to_string(), "kitchen_13".to_string())]),
            &BTreeMap::new(),
        );
        assert_eq!(mugs_in_kitchen.len(), 1);

        let open_mugs = tools.filter_objects(
            None,
            Some("mug"),
            &BTreeMap::new(),
            &BTreeMap::from([("isOpen".to_string(), Value::from(true))]),
        );
        assert!(open_mugs.is_empty());

        let closed_mugs = tools.filter_objects(
            None,
            Some("mug"),
            &BTreeMap::new(),
            &BTreeMap::from([("isOpen".to_string(), Value::from(false))]),
        );
        assert_eq!(closed_mugs.len(), 1);
    }

    #[test]
    fn find_path_between_spaces() {
        let p = sample_world();
        let tools = QueryTools::new(&p);
        let result = tools.find_path("kitchen_13", "living_room_23").unwrap();
        assert_eq!(result.cost, 2);
        assert_eq!(result.num_nodes, 3);
        assert_eq!(result.path[1].id, "door_9");
    }

    #[test]
    fn find_path_resolves_artifacts_to_spaces() {
        let p = sample_world();
        let tools = QueryTools::new(&p);
        // mug is in the kitchen, robot in the living room
        let result = tools.find_path("robot1", "mug_5").unwrap();
        assert_eq!(result.path.first().unwrap().id, "living_room_23");
        assert_eq!(result.path.last().unwrap().id, "kitchen_13");
    }

    #[test]
    fn unresolvable_and_unreachable_reported() {
        let p = sample_world();
        add_node(&p, "island_7", &["Space"], &[]);
        let tools = QueryTools::new(&p);
        assert!(matches!(
            tools.find_path("ghost", "kitchen_13"),
            Err(QueryError::Unresolvable { .. })
        ));
        assert!(matches!(
            tools.find_path("kitchen_13", "island_7"),
            Err(QueryError::NoPath { .. })
        ));
    }
}
