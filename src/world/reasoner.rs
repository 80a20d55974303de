//! Materializer: forward-chaining closure of the asserted model.
//!
//! The reasoner computes the inferred model (the "indirect" view) from the
//! asserted store plus the schema axioms: subclass subsumption, domain/range
//! typing, subproperty propagation, inverse axioms, and two-step property
//! chains. Writers never mutate the materialization; it is recomputed from
//! the asserted facts on every reasoning pass, which is what lets a deleted
//! asserted fact actually disappear from the derived view.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::WorldError;
use crate::schema::Schema;

use super::Individual;

/// The reasoned model: indirect types per individual and the indirect
/// extension of every object property.
#[derive(Debug, Clone, Default)]
pub struct Materialized {
    /// Individual id → every entailed class name.
    pub types: BTreeMap<String, BTreeSet<String>>,
    /// Property name → entailed (subject, object) pairs.
    pub relations: BTreeMap<String, BTreeSet<(String, String)>>,
}

impl Materialized {
    pub fn pair_count(&self) -> usize {
        self.relations.values().map(|s| s.len()).sum()
    }

    /// Whether the pair (s, o) is entailed for `predicate`.
    pub fn holds(&self, predicate: &str, s: &str, o: &str) -> bool {
        self.relations
            .get(predicate)
            .is_some_and(|pairs| pairs.contains(&(s.to_string(), o.to_string())))
    }
}

/// Run the materializer over the asserted individuals.
///
/// Fails with `WorldError::Inconsistent` when some individual ends up typed
/// by two classes the schema declares disjoint (subclasses included, since
/// the check runs on the type closure).
pub fn materialize(
    schema: &Schema,
    individuals: &BTreeMap<String, Individual>,
) -> Result<Materialized, WorldError> {
    // ── Relation closure ─────────────────────────────────────────────────
    let mut relations: BTreeMap<String, BTreeSet<(String, String)>> = BTreeMap::new();
    for individual in individuals.values() {
        for (prop, targets) in &individual.object_props {
            if !schema.is_object_property(prop) {
                continue;
            }
            let pairs = relations.entry(prop.clone()).or_default();
            for target in targets {
                // Dangling targets are not materialized; they were already
                // skipped (with a warning) at assertion time.
                if individuals.contains_key(target) {
                    pairs.insert((individual.id.clone(), target.clone()));
                }
            }
        }
    }

    let inverse_pairs = schema.inverse_pairs();
    let chain_axioms = schema.chain_axioms();
    let superproperties: HashMap<String, Vec<String>> = schema
        .object_property_names()
        .map(|p| (p.clone(), schema.superproperties(p)))
        .collect();

    loop {
        let before = relations.values().map(|s| s.len()).sum::<usize>();

        // Subproperty: (s, p, o) ⇒ (s, q, o) for every superproperty q.
        let snapshot: Vec<(String, Vec<(String, String)>)> = relations
            .iter()
            .map(|(p, pairs)| (p.clone(), pairs.iter().cloned().collect()))
            .collect();
        for (prop, pairs) in &snapshot {
            if let Some(supers) = superproperties.get(prop) {
                for sup in supers {
                    let entry = relations.entry(sup.clone()).or_default();
                    for pair in pairs {
                        entry.insert(pair.clone());
                    }
                }
            }
        }

        // Inverse: (s, p, o) ⇒ (o, q, s).
        for (p, q) in &inverse_pairs {
            let Some(pairs) = relations.get(p).cloned() else { continue };
            let entry = relations.entry(q.clone()).or_default();
            for (s, o) in pairs {
                entry.insert((o, s));
            }
        }

        // Chains: p1 ∘ p2 ⊑ r, i.e. (a, p1, b) ∧ (b, p2, c) ⇒ (a, r, c).
        for (p1, p2, r) in &chain_axioms {
            let Some(left) = relations.get(p1).cloned() else { continue };
            let Some(right) = relations.get(p2) else { continue };
            let mut by_subject: HashMap<&String, Vec<&String>> = HashMap::new();
            for (s, o) in right {
                by_subject.entry(s).or_default().push(o);
            }
            let mut derived: Vec<(String, String)> = Vec::new();
            for (a, b) in &left {
                if let Some(targets) = by_subject.get(b) {
                    for c in targets {
                        derived.push((a.clone(), (*c).clone()));
                    }
                }
            }
            let entry = relations.entry(r.clone()).or_default();
            for pair in derived {
                entry.insert(pair);
            }
        }

        let after = relations.values().map(|s| s.len()).sum::<usize>();
        if after == before {
            break;
        }
    }

    // ── Type closure ─────────────────────────────────────────────────────
    let mut types: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for individual in individuals.values() {
        let entry = types.entry(individual.id.clone()).or_default();
        for class in &individual.classes {
            for ancestor in schema.class_ancestors(class) {
                entry.insert(ancestor);
            }
        }
    }

    // Domain/range typing of entailed property endpoints.
    for (prop, pairs) in &relations {
        let Some(def) = schema.object_property(prop) else { continue };
        for (s, o) in pairs {
            if let Some(domain) = &def.domain {
                let entry = types.entry(s.clone()).or_default();
                for ancestor in schema.class_ancestors(domain) {
                    entry.insert(ancestor);
                }
            }
            if let Some(range) = &def.range {
                let entry = types.entry(o.clone()).or_default();
                for ancestor in schema.class_ancestors(range) {
                    entry.insert(ancestor);
                }
            }
        }
    }

    // ── Consistency ──────────────────────────────────────────────────────
    for (id, class_set) in &types {
        for (a, b) in schema.disjoint_pairs() {
            if class_set.contains(a) && class_set.contains(b) {
                return Err(WorldError::Inconsistent {
                    individual: id.clone(),
                    class_a: a.clone(),
                    class_b: b.clone(),
                });
            }
        }
    }

    Ok(Materialized { types, relations })
}
