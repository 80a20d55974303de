//! Versioned TTL files: the rewriter, the differ, and the update generator.
//!
//! Pure file-and-RDF machinery with no projection access. The action
//! executor drives it: rewrite one predicate line into the next version,
//! diff the two versions at the RDF level, and synthesize the SPARQL UPDATE
//! that the bridge applies — including the *inferred* relationships that
//! must be deleted alongside each asserted spatial fact, per the declarative
//! relationship-mapping table. A bare `DELETE { asserted }` would leave
//! inferred edges behind: the reasoner only reinstates what is still
//! entailed, it never retracts from the projection.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use oxigraph::io::RdfFormat;
use oxigraph::model::Term;
use oxigraph::store::Store;
use serde::Deserialize;

use crate::error::TtlError;
use crate::schema::local_name;

/// The asserted predicates whose removal triggers inferred-edge cleanup.
pub const ASSERTED_SPATIAL_PREDICATES: [&str; 6] = [
    "robotIsInSpace",
    "artifactIsInSpace",
    "isInsideOf",
    "isOntopOf",
    "carries",
    "spaceIsInStorey",
];

/// An RDF object term in a diff: IRI or already-serialized literal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObjectTerm {
    Iri(String),
    /// Canonical Turtle serialization, e.g. `"true"^^<…#boolean>`.
    Literal(String),
}

impl ObjectTerm {
    fn to_sparql(&self) -> String {
        match self {
            ObjectTerm::Iri(iri) => format!("<{iri}>"),
            ObjectTerm::Literal(serialized) => serialized.clone(),
        }
    }
}

/// A ground triple with full IRIs, as produced by the differ.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RdfTriple {
    pub subject: String,
    pub predicate: String,
    pub object: ObjectTerm,
}

impl RdfTriple {
    fn to_sparql(&self) -> String {
        format!(
            "    <{}> <{}> {} .",
            self.subject,
            self.predicate,
            self.object.to_sparql()
        )
    }
}

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Smallest N such that `{base}_{N}.ttl` does not exist in `dir`.
pub fn next_version(dir: &Path, base: &str) -> usize {
    let mut version = 0usize;
    while dir.join(format!("{base}_{version}.ttl")).exists() {
        version += 1;
    }
    version
}

/// Path of `{base}_{N}.ttl` in `dir`.
pub fn version_path(dir: &Path, base: &str, version: usize) -> PathBuf {
    dir.join(format!("{base}_{version}.ttl"))
}

// ---------------------------------------------------------------------------
// Line-oriented rewrite
// ---------------------------------------------------------------------------

/// True when `line` mentions `:{name}` as a whole term.
fn contains_term(line: &str, name: &str) -> bool {
    let needle = format!(":{name}");
    let mut search_from = 0;
    while let Some(pos) = line[search_from..].find(&needle) {
        let abs = search_from + pos;
        let end = abs + needle.len();
        let boundary_after = line[end..]
            .chars()
            .next()
            .map(|c| !c.is_alphanumeric() && c != '_')
            .unwrap_or(true);
        if boundary_after {
            return true;
        }
        search_from = end;
    }
    false
}

/// Rewrite the single line bearing `predicate` whose object is `old_target`,
/// replacing the object with `new_target`, and write the result to
/// `next_path`. Exactly one line may match; zero or several is
/// `RewriteAmbiguous`. Assumes the canonical Turtle this system's own
/// writer produces (one predicate-object pair per line).
pub fn apply_move(
    prev_path: &Path,
    next_path: &Path,
    predicate: &str,
    old_target: &str,
    new_target: &str,
) -> Result<(), TtlError> {
    if !prev_path.exists() {
        return Err(TtlError::NotFound {
            path: prev_path.display().to_string(),
        });
    }
    let text = std::fs::read_to_string(prev_path).map_err(|e| TtlError::Io {
        path: prev_path.display().to_string(),
        source: e,
    })?;

    let matches: Vec<usize> = text
        .lines()
        .enumerate()
        .filter(|(_, line)| contains_term(line, predicate) && contains_term(line, old_target))
        .map(|(i, _)| i)
        .collect();

    if matches.len() != 1 {
        return Err(TtlError::RewriteAmbiguous {
            predicate: predicate.to_string(),
            old_target: old_target.to_string(),
            matches: matches.len(),
        });
    }

    let target_line = matches[0];
    let rewritten: Vec<String> = text
        .lines()
        .enumerate()
        .map(|(i, line)| {
            if i == target_line {
                line.replace(&format!(":{old_target}"), &format!(":{new_target}"))
            } else {
                line.to_string()
            }
        })
        .collect();

    if let Some(parent) = next_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TtlError::Io {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    std::fs::write(next_path, rewritten.join("\n") + "\n").map_err(|e| TtlError::Io {
        path: next_path.display().to_string(),
        source: e,
    })?;
    tracing::info!(
        from = %prev_path.display(),
        to = %next_path.display(),
        predicate,
        old_target,
        new_target,
        "rewrote TTL line"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// RDF-level diff
// ---------------------------------------------------------------------------

fn parse_triples(path: &Path) -> Result<BTreeSet<RdfTriple>, TtlError> {
    if !path.exists() {
        return Err(TtlError::NotFound {
            path: path.display().to_string(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|e| TtlError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let store = Store::new().map_err(|e| TtlError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    store
        .load_from_reader(RdfFormat::Turtle, text.as_bytes())
        .map_err(|e| TtlError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let mut triples = BTreeSet::new();
    for quad in store.iter() {
        let quad = quad.map_err(|e| TtlError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let subject = quad.subject.to_string();
        let subject = subject.trim_matches(['<', '>']).to_string();
        let object = match &quad.object {
            Term::NamedNode(n) => ObjectTerm::Iri(n.as_str().to_string()),
            other => ObjectTerm::Literal(other.to_string()),
        };
        triples.insert(RdfTriple {
            subject,
            predicate: quad.predicate.as_str().to_string(),
            object,
        });
    }
    Ok(triples)
}

/// Parse both files as RDF graphs and return `(added, removed)` triples.
pub fn diff(
    prev_path: &Path,
    next_path: &Path,
) -> Result<(BTreeSet<RdfTriple>, BTreeSet<RdfTriple>), TtlError> {
    let prev = parse_triples(prev_path)?;
    let next = parse_triples(next_path)?;
    let added: BTreeSet<RdfTriple> = next.difference(&prev).cloned().collect();
    let removed: BTreeSet<RdfTriple> = prev.difference(&next).cloned().collect();
    tracing::debug!(added = added.len(), removed = removed.len(), "computed TTL diff");
    Ok((added, removed))
}

// ---------------------------------------------------------------------------
// Relationship mapping
// ---------------------------------------------------------------------------

/// Kind of inference linking an asserted predicate to a derived one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum InferenceKind {
    #[serde(rename = "subproperty")]
    Subproperty,
    #[serde(rename = "property_chain")]
    PropertyChain,
    #[serde(rename = "inverse_inference")]
    Inverse,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferredRelationship {
    pub relationship: String,
    #[serde(rename = "type")]
    pub kind: InferenceKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredicateMapping {
    #[serde(default)]
    pub inferred_relationships: Vec<InferredRelationship>,
}

/// The declarative table naming, per asserted spatial predicate, the derived
/// relationships that must be deleted with it. Shipped as data, not code.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationshipMapping {
    #[serde(default)]
    pub mappings: BTreeMap<String, PredicateMapping>,
}

impl RelationshipMapping {
    pub fn load(path: &Path) -> Result<Self, TtlError> {
        let text = std::fs::read_to_string(path).map_err(|e| TtlError::Mapping {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| TtlError::Mapping {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn for_predicate(&self, predicate: &str) -> Option<&PredicateMapping> {
        self.mappings.get(predicate)
    }
}

// ---------------------------------------------------------------------------
// SPARQL synthesis
// ---------------------------------------------------------------------------

/// Build the DELETE/INSERT update for a diff. For every removed triple whose
/// predicate is an asserted spatial relation, the mapping contributes the
/// inferred relationships to the DELETE set: inverse kinds swap subject and
/// object, subproperty and chain kinds keep the order. Clauses are sorted
/// and deduplicated, so the same diff always yields the same query string.
pub fn sparql_from_diff(
    added: &BTreeSet<RdfTriple>,
    removed: &BTreeSet<RdfTriple>,
    mapping: &RelationshipMapping,
    namespace: &str,
) -> String {
    let mut delete_clauses: BTreeSet<String> = BTreeSet::new();

    for triple in removed {
        delete_clauses.insert(triple.to_sparql());

        let predicate_local = local_name(&triple.predicate);
        if !ASSERTED_SPATIAL_PREDICATES.contains(&predicate_local) {
            continue;
        }
        let Some(predicate_mapping) = mapping.for_predicate(predicate_local) else {
            continue;
        };
        let ObjectTerm::Iri(object_iri) = &triple.object else {
            continue;
        };
        for inferred in &predicate_mapping.inferred_relationships {
            let inferred_iri = if inferred.relationship.starts_with("http") {
                inferred.relationship.clone()
            } else {
                format!("{namespace}{}", inferred.relationship)
            };
            let (s, o) = match inferred.kind {
                InferenceKind::Inverse => (object_iri.clone(), triple.subject.clone()),
                InferenceKind::Subproperty | InferenceKind::PropertyChain => {
                    (triple.subject.clone(), object_iri.clone())
                }
            };
            delete_clauses.insert(format!("    <{s}> <{inferred_iri}> <{o}> ."));
            tracing::debug!(
                asserted = predicate_local,
                inferred = %inferred.relationship,
                "added inferred DELETE clause"
            );
        }
    }

    let insert_clauses: BTreeSet<String> = added.iter().map(|t| t.to_sparql()).collect();

    let mut parts: Vec<String> = Vec::new();
    if !delete_clauses.is_empty() {
        parts.push("DELETE {".to_string());
        parts.extend(delete_clauses.iter().cloned());
        parts.push("}".to_string());
    }
    if !insert_clauses.is_empty() {
        if delete_clauses.is_empty() {
            parts.push("INSERT DATA {".to_string());
        } else {
            parts.push("INSERT {".to_string());
        }
        parts.extend(insert_clauses.iter().cloned());
        parts.push("}".to_string());
    }
    if !delete_clauses.is_empty() {
        parts.push("WHERE { }".to_string());
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "https://seshat.dev/world#";

    const DYNAMIC_TTL: &str = r#"@prefix rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> .
@prefix : <https://seshat.dev/world#> .

:robot1 rdf:type :Robot ;
    :hasHand :left_hand ;
    :robotIsInSpace :corridor_14 .

:left_hand rdf:type :Hand .

:corridor_14 rdf:type :Space .

:door_9 rdf:type :Door .
"#;

    fn mapping() -> RelationshipMapping {
        serde_json::from_value(serde_json::json!({
            "mappings": {
                "robotIsInSpace": {
                    "inferred_relationships": [
                        { "relationship": "objectIsInSpace", "type": "subproperty" },
                        { "relationship": "isInSpace", "type": "subproperty" },
                        { "relationship": "spaceHasObject", "type": "inverse_inference" },
                        { "relationship": "isInStorey", "type": "property_chain" }
                    ]
                }
            }
        }))
        .unwrap()
    }

    fn write_world(dir: &Path) -> PathBuf {
        let prev = dir.join("dynamic_0.ttl");
        std::fs::write(&prev, DYNAMIC_TTL).unwrap();
        prev
    }

    #[test]
    fn next_version_scans_upward() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert_eq!(next_version(tmp.path(), "dynamic"), 0);
        std::fs::write(tmp.path().join("dynamic_0.ttl"), "").unwrap();
        std::fs::write(tmp.path().join("dynamic_1.ttl"), "").unwrap();
        assert_eq!(next_version(tmp.path(), "dynamic"), 2);
        assert_eq!(next_version(tmp.path(), "static"), 0);
    }

    #[test]
    fn apply_move_rewrites_exactly_one_line() {
        let tmp = tempfile::TempDir::new().unwrap();
        let prev = write_world(tmp.path());
        let next = tmp.path().join("dynamic_1.ttl");
        apply_move(&prev, &next, "robotIsInSpace", "corridor_14", "door_9").unwrap();

        let text = std::fs::read_to_string(&next).unwrap();
        assert!(text.contains(":robotIsInSpace :door_9"));
        assert!(!text.contains(":robotIsInSpace :corridor_14"));
        // everything else untouched
        assert!(text.contains(":corridor_14 rdf:type :Space"));
    }

    #[test]
    fn apply_move_ambiguity_detected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let prev = tmp.path().join("dynamic_0.ttl");
        std::fs::write(
            &prev,
            ":a :robotIsInSpace :room_1 .\n:b :robotIsInSpace :room_1 .\n",
        )
        .unwrap();
        let err = apply_move(
            &prev,
            &tmp.path().join("dynamic_1.ttl"),
            "robotIsInSpace",
            "room_1",
            "room_2",
        )
        .unwrap_err();
        assert!(matches!(err, TtlError::RewriteAmbiguous { matches: 2, .. }));
    }

    #[test]
    fn apply_move_missing_target_detected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let prev = write_world(tmp.path());
        let err = apply_move(
            &prev,
            &tmp.path().join("dynamic_1.ttl"),
            "robotIsInSpace",
            "bedroom_9",
            "door_9",
        )
        .unwrap_err();
        assert!(matches!(err, TtlError::RewriteAmbiguous { matches: 0, .. }));
    }

    #[test]
    fn term_boundaries_respected() {
        // corridor_14 must not match corridor_140
        assert!(contains_term(":r :robotIsInSpace :corridor_14 .", "corridor_14"));
        assert!(!contains_term(":r :robotIsInSpace :corridor_140 .", "corridor_14"));
    }

    #[test]
    fn diff_is_exactly_the_one_changed_triple() {
        let tmp = tempfile::TempDir::new().unwrap();
        let prev = write_world(tmp.path());
        let next = tmp.path().join("dynamic_1.ttl");
        apply_move(&prev, &next, "robotIsInSpace", "corridor_14", "door_9").unwrap();

        let (added, removed) = diff(&prev, &next).unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(removed.len(), 1);
        let removed_triple = removed.iter().next().unwrap();
        assert_eq!(removed_triple.subject, format!("{NS}robot1"));
        assert_eq!(removed_triple.predicate, format!("{NS}robotIsInSpace"));
        assert_eq!(
            removed_triple.object,
            ObjectTerm::Iri(format!("{NS}corridor_14"))
        );
        let added_triple = added.iter().next().unwrap();
        assert_eq!(added_triple.object, ObjectTerm::Iri(format!("{NS}door_9")));
    }

    #[test]
    fn sparql_includes_inferred_deletes_with_inverse_swap() {
        let tmp = tempfile::TempDir::new().unwrap();
        let prev = write_world(tmp.path());
        let next = tmp.path().join("dynamic_1.ttl");
        apply_move(&prev, &next, "robotIsInSpace", "corridor_14", "door_9").unwrap();
        let (added, removed) = diff(&prev, &next).unwrap();

        let query = sparql_from_diff(&added, &removed, &mapping(), NS);
        // asserted delete
        assert!(query.contains(&format!("<{NS}robot1> <{NS}robotIsInSpace> <{NS}corridor_14>")));
        // subproperty keeps order
        assert!(query.contains(&format!("<{NS}robot1> <{NS}objectIsInSpace> <{NS}corridor_14>")));
        // inverse swaps subject and object
        assert!(query.contains(&format!("<{NS}corridor_14> <{NS}spaceHasObject> <{NS}robot1>")));
        // insert side
        assert!(query.contains(&format!("<{NS}robot1> <{NS}robotIsInSpace> <{NS}door_9>")));
        assert!(query.contains("WHERE { }"));
    }

    #[test]
    fn sparql_from_diff_is_deterministic() {
        let tmp = tempfile::TempDir::new().unwrap();
        let prev = write_world(tmp.path());
        let next = tmp.path().join("dynamic_1.ttl");
        apply_move(&prev, &next, "robotIsInSpace", "corridor_14", "door_9").unwrap();
        let (added, removed) = diff(&prev, &next).unwrap();

        let first = sparql_from_diff(&added, &removed, &mapping(), NS);
        let second = sparql_from_diff(&added, &removed, &mapping(), NS);
        assert_eq!(first, second);
    }

    #[test]
    fn insert_only_diff_uses_insert_data() {
        let added: BTreeSet<RdfTriple> = BTreeSet::from([RdfTriple {
            subject: format!("{NS}cup_6"),
            predicate: format!("{NS}objectIsInSpace"),
            object: ObjectTerm::Iri(format!("{NS}kitchen_13")),
        }]);
        let query = sparql_from_diff(&added, &BTreeSet::new(), &RelationshipMapping::default(), NS);
        assert!(query.starts_with("INSERT DATA {"));
        assert!(!query.contains("WHERE"));
    }

    #[test]
    fn mapping_parses_spec_shape() {
        let m = mapping();
        let pm = m.for_predicate("robotIsInSpace").unwrap();
        assert_eq!(pm.inferred_relationships.len(), 4);
        assert_eq!(pm.inferred_relationships[2].kind, InferenceKind::Inverse);
        assert!(m.for_predicate("carries").is_none());
    }
}
