//! Knowledge-graph harvesting for problem synthesis.
//!
//! Everything the writer needs is pulled from the projection here: type
//! classification through the domain hierarchy, the robot's structure,
//! artifact anchors, the path-expanded location universe with its distance
//! table, affordances, door states, and key/safe relationships.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::domain::Domain;
use crate::projection::Projection;

/// Robot structure as projected.
#[derive(Debug, Clone)]
pub struct RobotInfo {
    pub robot_id: String,
    pub hands: Vec<String>,
    pub location: Option<String>,
}

/// Spatial anchor of an artifact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactAnchor {
    /// Containing Space, direct or inherited from the container chain.
    pub is_in_space: Option<String>,
    pub is_inside_of: Option<String>,
    pub is_ontop_of: Option<String>,
}

impl ArtifactAnchor {
    pub fn is_empty(&self) -> bool {
        self.is_in_space.is_none() && self.is_inside_of.is_none() && self.is_ontop_of.is_none()
    }
}

/// Topology of the location universe.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// Unordered unique `hasPathTo` pairs between universe members.
    pub connections: Vec<(String, String)>,
    /// Directed pairwise hop distances.
    pub distances: BTreeMap<(String, String), usize>,
}

/// Key/safe relationship maps.
#[derive(Debug, Clone, Default)]
pub struct KeySafe {
    /// key → safes it unlocks.
    pub unlocks: BTreeMap<String, Vec<String>>,
    /// safe → keys it requires.
    pub requires_key: BTreeMap<String, Vec<String>>,
}

impl KeySafe {
    pub fn is_empty(&self) -> bool {
        self.unlocks.is_empty() && self.requires_key.is_empty()
    }

    /// Every key mentioned on either side.
    pub fn all_keys(&self) -> BTreeSet<String> {
        let mut keys: BTreeSet<String> = self.unlocks.keys().cloned().collect();
        for key_list in self.requires_key.values() {
            keys.extend(key_list.iter().cloned());
        }
        keys
    }
}

/// Result of the all-pairs path expansion.
#[derive(Debug, Clone, Default)]
pub struct PathExpansion {
    pub locations: BTreeSet<String>,
    pub distances: BTreeMap<(String, String), usize>,
    /// Pairs from the input set with no connecting path.
    pub unreachable_pairs: Vec<(String, String)>,
}

/// Read-only harvester over the projection + domain hierarchy.
pub struct Harvester<'a> {
    projection: &'a Projection,
    domain: &'a Domain,
    types_cache: RefCell<HashMap<String, Option<String>>>,
}

const PRIORITY_LOCATION_TYPES: [&str; 4] = ["Door", "Stairs", "Opening", "Space"];
const SPACE_ANCHOR_PREDICATES: [&str; 2] = ["isInSpace", "objectIsInSpace"];

impl<'a> Harvester<'a> {
    pub fn new(projection: &'a Projection, domain: &'a Domain) -> Self {
        Self {
            projection,
            domain,
            types_cache: RefCell::new(HashMap::new()),
        }
    }

    // ── Type classification ──────────────────────────────────────────────

    /// Domain types for the given ids. Ids without a classifiable type are
    /// absent from the result. Lookups are cached per harvester.
    pub fn types(&self, ids: &[String]) -> BTreeMap<String, String> {
        let mut result = BTreeMap::new();
        for id in ids {
            if let Some(cached) = self.types_cache.borrow().get(id) {
                if let Some(t) = cached {
                    result.insert(id.clone(), t.clone());
                }
                continue;
            }
            let classified = self.classify(id);
            self.types_cache
                .borrow_mut()
                .insert(id.clone(), classified.clone());
            if let Some(t) = classified {
                result.insert(id.clone(), t);
            }
        }
        result
    }

    fn classify(&self, id: &str) -> Option<String> {
        let labels = self.projection.labels_of(id);
        if labels.is_empty() {
            return None;
        }

        // Leaf location labels are more specific than anything the
        // hierarchy walk would choose.
        for priority in PRIORITY_LOCATION_TYPES {
            if labels.iter().any(|l| l == priority) {
                return Some(priority.to_string());
            }
        }

        let domain_labels: Vec<String> = labels
            .iter()
            .filter(|l| self.domain.has_type(l))
            .cloned()
            .collect();
        if !domain_labels.is_empty() {
            if let Some(mapped) = self.domain.map_class_to_domain_type(&domain_labels) {
                return Some(mapped);
            }
            return Some(domain_labels[0].clone());
        }

        infer_type_from_id(id)
    }

    // ── Robot ────────────────────────────────────────────────────────────

    /// The first Robot individual with its hands and current Space.
    pub fn robot_info(&self) -> Option<RobotInfo> {
        let mut robots = self.projection.nodes_with_label("Robot");
        robots.sort();
        let robot_id = robots.into_iter().next()?;

        let mut hands = self.projection.objects_of(&robot_id, &["hasHand"]);
        hands.sort();
        hands.dedup();

        let location = self
            .projection
            .objects_of(&robot_id, &["robotIsInSpace"])
            .into_iter()
            .find(|loc| self.projection.labels_of(loc).iter().any(|l| l == "Space"));

        Some(RobotInfo {
            robot_id,
            hands,
            location,
        })
    }

    // ── Artifact anchors ─────────────────────────────────────────────────

    /// Spatial anchors for the given artifacts, container chains resolved
    /// recursively to a Space.
    pub fn artifact_anchors(&self, ids: &[String]) -> BTreeMap<String, ArtifactAnchor> {
        let mut anchors = BTreeMap::new();
        for id in ids {
            if !self.projection.has_node(id) {
                continue;
            }
            let mut anchor = ArtifactAnchor {
                is_in_space: self.direct_space_of(id),
                is_inside_of: self
                    .projection
                    .objects_of(id, &["isInsideOf"])
                    .into_iter()
                    .next(),
                is_ontop_of: self
                    .projection
                    .objects_of(id, &["isOntopOf"])
                    .into_iter()
                    .next(),
            };
            if anchor.is_in_space.is_none() {
                anchor.is_in_space = self.inherited_space_of(id);
            }
            anchors.insert(id.clone(), anchor);
        }
        anchors
    }

    fn direct_space_of(&self, id: &str) -> Option<String> {
        self.projection
            .objects_of(id, &SPACE_ANCHOR_PREDICATES)
            .into_iter()
            .find(|t| self.projection.labels_of(t).iter().any(|l| l == "Space"))
    }

    /// Walk the container chain (isInsideOf / isOntopOf) until an ancestor
    /// with a direct Space anchor turns up.
    fn inherited_space_of(&self, id: &str) -> Option<String> {
        let mut cursor = id.to_string();
        for _ in 0..16 {
            let parent = self
                .projection
                .objects_of(&cursor, &["isInsideOf", "isOntopOf"])
                .into_iter()
                .next()?;
            if let Some(space) = self.direct_space_of(&parent) {
                return Some(space);
            }
            cursor = parent;
        }
        None
    }

    // ── Path expansion ───────────────────────────────────────────────────

    /// Expand the location set along shortest `hasPathTo` paths between all
    /// C(n,2) pairs, harvesting subpath distances on the way: for a path of
    /// length k, every `(path[i], path[j])` pair contributes `j − i`. One
    /// BFS per source covers every target, so the pair loop never re-runs a
    /// search it already has an answer for.
    pub fn expand_locations(&self, location_ids: &BTreeSet<String>) -> PathExpansion {
        let adjacency = self.projection.spatial_adjacency();
        let mut expansion = PathExpansion {
            locations: location_ids.clone(),
            ..Default::default()
        };
        let sources: Vec<&String> = location_ids.iter().collect();
        if sources.len() < 2 {
            return expansion;
        }

        for (i, source) in sources.iter().enumerate() {
            if !adjacency.contains_key(*source) {
                for target in sources.iter().skip(i + 1) {
                    expansion
                        .unreachable_pairs
                        .push(((*source).clone(), (*target).clone()));
                }
                continue;
            }
            let parents = bfs_parents(&adjacency, source);
            for target in sources.iter().skip(i + 1) {
                if expansion
                    .distances
                    .contains_key(&((*source).clone(), (*target).clone()))
                {
                    continue;
                }
                let Some(path) = reconstruct_path(&parents, source, target) else {
                    expansion
                        .unreachable_pairs
                        .push(((*source).clone(), (*target).clone()));
                    tracing::warn!(from = %source, to = %target, "no hasPathTo path between required locations");
                    continue;
                };
                expansion.locations.extend(path.iter().cloned());
                for a in 0..path.len() {
                    for b in (a + 1)..path.len() {
                        let hops = b - a;
                        expansion
                            .distances
                            .entry((path[a].clone(), path[b].clone()))
                            .or_insert(hops);
                        expansion
                            .distances
                            .entry((path[b].clone(), path[a].clone()))
                            .or_insert(hops);
                    }
                }
            }
        }
        expansion
    }

    // ── Topology ─────────────────────────────────────────────────────────

    /// `hasPathTo` connections among universe members, plus the merged
    /// distance table (precomputed shortest-path distances win; direct
    /// connections fill in at hop cost 1).
    pub fn topology(
        &self,
        locations: &BTreeSet<String>,
        precomputed: &BTreeMap<(String, String), usize>,
    ) -> Topology {
        let mut topology = Topology {
            distances: precomputed.clone(),
            ..Default::default()
        };
        let adjacency = self.projection.spatial_adjacency();
        for from in locations {
            let Some(neighbors) = adjacency.get(from) else { continue };
            for to in neighbors {
                if !locations.contains(to) || from == to {
                    continue;
                }
                let seen = topology
                    .connections
                    .iter()
                    .any(|(a, b)| (a == from && b == to) || (a == to && b == from));
                if !seen {
                    topology.connections.push((from.clone(), to.clone()));
                }
                topology
                    .distances
                    .entry((from.clone(), to.clone()))
                    .or_insert(1);
                topology
                    .distances
                    .entry((to.clone(), from.clone()))
                    .or_insert(1);
            }
        }
        topology.connections.sort();
        topology
    }

    // ── Facts ────────────────────────────────────────────────────────────

    /// Affordance instances attached to each artifact.
    pub fn affordances(&self, ids: &[String]) -> BTreeMap<String, Vec<String>> {
        let mut map = BTreeMap::new();
        for id in ids {
            if !self.projection.labels_of(id).iter().any(|l| l == "Artifact") {
                continue;
            }
            let mut affs = self.projection.objects_of(id, &["affords"]);
            if !affs.is_empty() {
                affs.sort();
                map.insert(id.clone(), affs);
            }
        }
        map
    }

    /// `isOpenDoor` booleans for the given doors; absent attributes read as
    /// closed.
    pub fn door_states(&self, door_ids: &[String]) -> BTreeMap<String, bool> {
        let mut states = BTreeMap::new();
        for id in door_ids {
            let Some(node) = self.projection.node(id) else {
                tracing::warn!(door = %id, "door not found in projection");
                continue;
            };
            let open = node
                .props
                .get("isOpenDoor")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            states.insert(id.clone(), open);
        }
        states
    }

    /// Key/safe relationships reachable from the given artifacts. The
    /// reverse direction matters: a goal naming only the safe must still
    /// pull in the key that unlocks it.
    pub fn key_safe(&self, ids: &[String]) -> KeySafe {
        let mut result = KeySafe::default();
        for id in ids {
            // safe → key
            for key in self.projection.objects_of(id, &["requiresKey"]) {
                push_unique(result.requires_key.entry(id.clone()).or_default(), key);
            }
            // key → safe
            for safe in self.projection.objects_of(id, &["unlocks"]) {
                push_unique(result.unlocks.entry(id.clone()).or_default(), safe);
            }
            // reverse: keys unlocking this safe, even if absent from `ids`
            for key in self.projection.subjects_of("unlocks", id) {
                push_unique(result.unlocks.entry(key.clone()).or_default(), id.clone());
                push_unique(result.requires_key.entry(id.clone()).or_default(), key);
            }
        }
        result.unlocks.retain(|_, v| !v.is_empty());
        result.requires_key.retain(|_, v| !v.is_empty());
        result
    }

    /// `isOpen` / `isLocked` data properties per artifact.
    pub fn artifact_states(&self, ids: &[String]) -> BTreeMap<String, BTreeMap<String, bool>> {
        let mut map = BTreeMap::new();
        for id in ids {
            let Some(node) = self.projection.node(id) else { continue };
            let mut states = BTreeMap::new();
            for key in ["isOpen", "isLocked"] {
                if let Some(value) = node.props.get(key).and_then(|v| v.as_bool()) {
                    states.insert(key.to_string(), value);
                }
            }
            if !states.is_empty() {
                map.insert(id.clone(), states);
            }
        }
        map
    }
}

fn push_unique(list: &mut Vec<String>, value: impl Into<String>) {
    let value = value.into();
    if !list.contains(&value) {
        list.push(value);
    }
}

/// Fallback classification from the id itself, for locations discovered on
/// paths whose nodes predate classification.
pub fn infer_type_from_id(id: &str) -> Option<String> {
    let lowered = id.to_lowercase();
    if lowered.contains("opening") {
        Some("Opening".to_string())
    } else if lowered.contains("stair") {
        Some("Stairs".to_string())
    } else if lowered.contains("door") {
        Some("Door".to_string())
    } else if lowered.contains("space") || lowered.contains("room") || lowered.contains("corridor")
    {
        Some("Space".to_string())
    } else {
        None
    }
}

fn bfs_parents(
    adjacency: &HashMap<String, Vec<String>>,
    source: &str,
) -> HashMap<String, String> {
    let mut parents: HashMap<String, String> = HashMap::new();
    let mut visited: BTreeSet<&str> = BTreeSet::from([source]);
    let mut queue: VecDeque<&str> = VecDeque::from([source]);
    while let Some(current) = queue.pop_front() {
        let Some(neighbors) = adjacency.get(current) else { continue };
        for neighbor in neighbors {
            if visited.insert(neighbor) {
                parents.insert(neighbor.clone(), current.to_string());
                queue.push_back(neighbor);
            }
        }
    }
    parents
}

fn reconstruct_path(
    parents: &HashMap<String, String>,
    source: &str,
    target: &str,
) -> Option<Vec<String>> {
    if source == target {
        return Some(vec![source.to_string()]);
    }
    if !parents.contains_key(target) {
        return None;
    }
    let mut path = vec![target.to_string()];
    let mut cursor = target;
    while cursor != source {
        let parent = parents.get(cursor)?;
        path.push(parent.clone());
        cursor = parent;
    }
    path.reverse();
    Some(path)
}
