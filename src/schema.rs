//! OWL schema (TBox) loaded once per process from a Turtle document.
//!
//! The schema fixes the vocabulary the whole backend speaks: the class
//! hierarchy, object properties with their subproperty / inverse / chain
//! axioms, and data properties. Classes and properties are immutable after
//! load; individuals reference them by local name.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use oxigraph::io::RdfFormat;
use oxigraph::model::Term;
use oxigraph::store::Store;

use crate::error::SchemaError;

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
const RDF_FIRST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#first";
const RDF_REST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#rest";
const RDF_NIL: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#nil";
const RDFS_SUBCLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";
const RDFS_SUBPROPERTY_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subPropertyOf";
const RDFS_DOMAIN: &str = "http://www.w3.org/2000/01/rdf-schema#domain";
const RDFS_RANGE: &str = "http://www.w3.org/2000/01/rdf-schema#range";
const OWL_CLASS: &str = "http://www.w3.org/2002/07/owl#Class";
const OWL_OBJECT_PROPERTY: &str = "http://www.w3.org/2002/07/owl#ObjectProperty";
const OWL_DATA_PROPERTY: &str = "http://www.w3.org/2002/07/owl#DatatypeProperty";
const OWL_INVERSE_OF: &str = "http://www.w3.org/2002/07/owl#inverseOf";
const OWL_CHAIN: &str = "http://www.w3.org/2002/07/owl#propertyChainAxiom";
const OWL_DISJOINT_WITH: &str = "http://www.w3.org/2002/07/owl#disjointWith";
const OWL_THING: &str = "http://www.w3.org/2002/07/owl#Thing";

/// Extract the local name of an IRI (fragment, or last path segment).
pub fn local_name(iri: &str) -> &str {
    if let Some(pos) = iri.rfind('#') {
        return &iri[pos + 1..];
    }
    if let Some(pos) = iri.rfind('/') {
        return &iri[pos + 1..];
    }
    iri
}

/// A named class in the TBox. Single-parent subclass relation.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub iri: String,
    pub parent: Option<String>,
}

/// A named object property with its inference-relevant axioms.
#[derive(Debug, Clone, Default)]
pub struct ObjectPropertyDef {
    pub name: String,
    pub iri: String,
    pub domain: Option<String>,
    pub range: Option<String>,
    /// Direct superproperties (rdfs:subPropertyOf).
    pub parents: Vec<String>,
    /// owl:inverseOf partner, if declared on this property.
    pub inverse: Option<String>,
    /// Chains (p1, p2) such that p1 ∘ p2 ⊑ this property.
    pub chains: Vec<(String, String)>,
}

/// Immutable OWL TBox: classes, properties, and the axioms the materializer
/// applies.
#[derive(Debug, Clone)]
pub struct Schema {
    namespace: String,
    classes: HashMap<String, ClassDef>,
    object_props: HashMap<String, ObjectPropertyDef>,
    data_props: HashSet<String>,
    disjoint: Vec<(String, String)>,
}

impl Schema {
    /// Load the schema from a Turtle file.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let text = std::fs::read_to_string(path).map_err(|e| SchemaError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse_turtle(&text, &path.display().to_string())
    }

    /// Parse the schema from a Turtle string. `source` is used in error messages.
    pub fn parse_turtle(text: &str, source: &str) -> Result<Self, SchemaError> {
        let store = Store::new().map_err(|e| SchemaError::Parse {
            path: source.to_string(),
            message: e.to_string(),
        })?;
        store
            .load_from_reader(RdfFormat::Turtle, text.as_bytes())
            .map_err(|e| SchemaError::Parse {
                path: source.to_string(),
                message: e.to_string(),
            })?;

        // Flatten into (subject-string, predicate-iri, object-term) rows once;
        // the schema is small and this sidesteps pattern-query plumbing.
        let mut rows: Vec<(String, String, Term)> = Vec::new();
        for quad in store.iter() {
            let quad = quad.map_err(|e| SchemaError::Parse {
                path: source.to_string(),
                message: e.to_string(),
            })?;
            let subject = quad.subject.to_string();
            let subject = subject.trim_matches(['<', '>']).to_string();
            rows.push((subject, quad.predicate.as_str().to_string(), quad.object));
        }

        let term_iri = |t: &Term| -> Option<String> {
            match t {
                Term::NamedNode(n) => Some(n.as_str().to_string()),
                _ => None,
            }
        };
        let term_key = |t: &Term| -> String {
            match t {
                Term::NamedNode(n) => n.as_str().to_string(),
                other => other.to_string(),
            }
        };

        // rdf:first / rdf:rest maps for chain-axiom list walking. Blank-node
        // subjects keep their "_:" serialized form as the key.
        let mut firsts: HashMap<String, String> = HashMap::new();
        let mut rests: HashMap<String, String> = HashMap::new();
        for (s, p, o) in &rows {
            match p.as_str() {
                RDF_FIRST => {
                    firsts.insert(s.clone(), term_key(o));
                }
                RDF_REST => {
                    rests.insert(s.clone(), term_key(o));
                }
                _ => {}
            }
        }
        let walk_list = |head: &str| -> Vec<String> {
            let mut items = Vec::new();
            let mut cursor = head.to_string();
            while cursor != RDF_NIL {
                let Some(item) = firsts.get(&cursor) else {
                    break;
                };
                items.push(item.clone());
                match rests.get(&cursor) {
                    Some(next) => cursor = next.clone(),
                    None => break,
                }
            }
            items
        };

        let mut classes: HashMap<String, ClassDef> = HashMap::new();
        let mut object_props: HashMap<String, ObjectPropertyDef> = HashMap::new();
        let mut data_props: HashSet<String> = HashSet::new();
        let mut namespace = String::new();

        // Pass 1: declarations.
        for (s, p, o) in &rows {
            if p != RDF_TYPE {
                continue;
            }
            let Some(type_iri) = term_iri(o) else { continue };
            match type_iri.as_str() {
                OWL_CLASS => {
                    if s.starts_with("_:") {
                        continue; // anonymous class expressions are not projected
                    }
                    let name = local_name(s).to_string();
                    if namespace.is_empty() {
                        namespace = s[..s.len() - name.len()].to_string();
                    }
                    classes.insert(
                        name.clone(),
                        ClassDef {
                            name,
                            iri: s.clone(),
                            parent: None,
                        },
                    );
                }
                OWL_OBJECT_PROPERTY => {
                    let name = local_name(s).to_string();
                    object_props.insert(
                        name.clone(),
                        ObjectPropertyDef {
                            name,
                            iri: s.clone(),
                            ..Default::default()
                        },
                    );
                }
                OWL_DATA_PROPERTY => {
                    data_props.insert(local_name(s).to_string());
                }
                _ => {}
            }
        }

        if classes.is_empty() {
            return Err(SchemaError::Empty);
        }

        // Pass 2: axioms.
        let mut disjoint: Vec<(String, String)> = Vec::new();
        for (s, p, o) in &rows {
            let subject_local = local_name(s).to_string();
            match p.as_str() {
                RDFS_SUBCLASS_OF => {
                    let Some(parent_iri) = term_iri(o) else { continue };
                    if parent_iri == OWL_THING {
                        continue;
                    }
                    let parent = local_name(&parent_iri).to_string();
                    if let Some(cls) = classes.get_mut(&subject_local) {
                        // Single-parent hierarchy: the first named parent wins.
                        if cls.parent.is_none() {
                            cls.parent = Some(parent);
                        }
                    }
                }
                RDFS_SUBPROPERTY_OF => {
                    let Some(parent_iri) = term_iri(o) else { continue };
                    let parent = local_name(&parent_iri).to_string();
                    if parent == "topObjectProperty" {
                        continue;
                    }
                    if let Some(prop) = object_props.get_mut(&subject_local) {
                        if !prop.parents.contains(&parent) {
                            prop.parents.push(parent);
                        }
                    }
                }
                RDFS_DOMAIN => {
                    if let (Some(prop), Some(iri)) =
                        (object_props.get_mut(&subject_local), term_iri(o))
                    {
                        prop.domain = Some(local_name(&iri).to_string());
                    }
                }
                RDFS_RANGE => {
                    if let (Some(prop), Some(iri)) =
                        (object_props.get_mut(&subject_local), term_iri(o))
                    {
                        prop.range = Some(local_name(&iri).to_string());
                    }
                }
                OWL_INVERSE_OF => {
                    if let (Some(prop), Some(iri)) =
                        (object_props.get_mut(&subject_local), term_iri(o))
                    {
                        prop.inverse = Some(local_name(&iri).to_string());
                    }
                }
                OWL_CHAIN => {
                    let head = term_key(o);
                    let items = walk_list(&head);
                    if items.len() == 2 {
                        let p1 = local_name(&items[0]).to_string();
                        let p2 = local_name(&items[1]).to_string();
                        if let Some(prop) = object_props.get_mut(&subject_local) {
                            prop.chains.push((p1, p2));
                        }
                    } else if !items.is_empty() {
                        tracing::warn!(
                            property = %subject_local,
                            length = items.len(),
                            "ignoring property chain axiom with unsupported length"
                        );
                    }
                }
                OWL_DISJOINT_WITH => {
                    if let Some(iri) = term_iri(o) {
                        disjoint.push((subject_local, local_name(&iri).to_string()));
                    }
                }
                _ => {}
            }
        }

        tracing::info!(
            classes = classes.len(),
            object_properties = object_props.len(),
            data_properties = data_props.len(),
            "loaded OWL schema"
        );

        Ok(Self {
            namespace,
            classes,
            object_props,
            data_props,
            disjoint,
        })
    }

    /// The IRI prefix (ending in `#` or `/`) shared by the schema's entities.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Expand a local name into a full IRI in the schema namespace.
    pub fn expand(&self, name: &str) -> String {
        format!("{}{}", self.namespace, name)
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &String> {
        self.classes.keys()
    }

    /// Reflexive-transitive superclass closure of `name` (includes `name`).
    pub fn class_ancestors(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut cursor = Some(name.to_string());
        while let Some(current) = cursor {
            if out.contains(&current) {
                break; // defends against accidental cycles in the input
            }
            cursor = self
                .classes
                .get(&current)
                .and_then(|c| c.parent.clone());
            out.push(current);
        }
        out
    }

    pub fn is_object_property(&self, name: &str) -> bool {
        self.object_props.contains_key(name)
    }

    pub fn object_property(&self, name: &str) -> Option<&ObjectPropertyDef> {
        self.object_props.get(name)
    }

    pub fn object_property_names(&self) -> impl Iterator<Item = &String> {
        self.object_props.keys()
    }

    pub fn is_data_property(&self, name: &str) -> bool {
        self.data_props.contains(name)
    }

    /// Declared disjoint class pairs.
    pub fn disjoint_pairs(&self) -> &[(String, String)] {
        &self.disjoint
    }

    /// Transitive superproperty closure of `name` (excludes `name`).
    pub fn superproperties(&self, name: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut queue: Vec<String> = vec![name.to_string()];
        while let Some(current) = queue.pop() {
            if let Some(prop) = self.object_props.get(&current) {
                for parent in &prop.parents {
                    if !out.contains(parent) && parent != name {
                        out.push(parent.clone());
                        queue.push(parent.clone());
                    }
                }
            }
        }
        out
    }

    /// All declared inverse pairs, in both directions.
    pub fn inverse_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for prop in self.object_props.values() {
            if let Some(inv) = &prop.inverse {
                pairs.push((prop.name.clone(), inv.clone()));
                pairs.push((inv.clone(), prop.name.clone()));
            }
        }
        pairs.sort();
        pairs.dedup();
        pairs
    }

    /// All chain axioms as (p1, p2, superproperty).
    pub fn chain_axioms(&self) -> Vec<(String, String, String)> {
        let mut out = Vec::new();
        for prop in self.object_props.values() {
            for (p1, p2) in &prop.chains {
                out.push((p1.clone(), p2.clone(), prop.name.clone()));
            }
        }
        out
    }
}
