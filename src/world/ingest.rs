//! TTL ingest: fold a Turtle document into per-individual records.
//!
//! Each subject with an `rdf:type` becomes one `IndividualData`: the first
//! non-ontology type is its class, literal objects become data properties,
//! IRI objects become object properties. The ontology declaration triple is
//! skipped. The file name decides whether this load is static or dynamic
//! world data, which in turn selects the embedding cache.

use std::collections::BTreeMap;
use std::path::Path;

use oxigraph::io::RdfFormat;
use oxigraph::model::vocab::xsd;
use oxigraph::model::Term;
use oxigraph::store::Store;

use crate::error::WorldError;
use crate::projection::PropertyValue;
use crate::schema::local_name;

use super::{DataKind, IndividualData};

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// Classify a TTL path as static or dynamic world data by its file name.
pub fn data_kind_of(path: &Path) -> Option<DataKind> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    if name.starts_with("static") {
        Some(DataKind::Static)
    } else if name.starts_with("dynamic") {
        Some(DataKind::Dynamic)
    } else {
        None
    }
}

fn literal_value(lit: &oxigraph::model::Literal) -> PropertyValue {
    let dt = lit.datatype();
    if dt == xsd::BOOLEAN {
        PropertyValue::Bool(lit.value() == "true" || lit.value() == "1")
    } else if dt == xsd::INTEGER || dt == xsd::INT || dt == xsd::LONG {
        lit.value()
            .parse::<i64>()
            .map(PropertyValue::Int)
            .unwrap_or_else(|_| PropertyValue::Text(lit.value().to_string()))
    } else if dt == xsd::DOUBLE || dt == xsd::FLOAT || dt == xsd::DECIMAL {
        lit.value()
            .parse::<f64>()
            .map(PropertyValue::Float)
            .unwrap_or_else(|_| PropertyValue::Text(lit.value().to_string()))
    } else {
        PropertyValue::Text(lit.value().to_string())
    }
}

/// Parse a Turtle file into individual records ready for the batch path.
pub fn parse_ttl(path: &Path) -> Result<(Vec<IndividualData>, Option<DataKind>), WorldError> {
    if !path.exists() {
        return Err(WorldError::TtlNotFound {
            path: path.display().to_string(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|e| WorldError::TtlParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let individuals = parse_ttl_str(&text, &path.display().to_string())?;
    Ok((individuals, data_kind_of(path)))
}

/// Parse Turtle text into individual records. `source` is for diagnostics.
pub fn parse_ttl_str(text: &str, source: &str) -> Result<Vec<IndividualData>, WorldError> {
    let store = Store::new().map_err(|e| WorldError::Store {
        message: e.to_string(),
    })?;
    store
        .load_from_reader(RdfFormat::Turtle, text.as_bytes())
        .map_err(|e| WorldError::TtlParse {
            path: source.to_string(),
            message: e.to_string(),
        })?;

    // Group triples by subject.
    #[derive(Default)]
    struct Folded {
        class: Option<String>,
        data_props: BTreeMap<String, PropertyValue>,
        object_props: BTreeMap<String, Vec<String>>,
    }
    let mut by_subject: BTreeMap<String, Folded> = BTreeMap::new();

    for quad in store.iter() {
        let quad = quad.map_err(|e| WorldError::Store {
            message: e.to_string(),
        })?;
        let subject_iri = quad.subject.to_string();
        let subject_iri = subject_iri.trim_matches(['<', '>']);
        let subject_id = local_name(subject_iri).to_string();
        if subject_id.is_empty() {
            continue; // ontology declaration subject
        }
        let predicate = quad.predicate.as_str();
        let folded = by_subject.entry(subject_id).or_default();

        if predicate == RDF_TYPE {
            if let Term::NamedNode(class_node) = &quad.object {
                let class_iri = class_node.as_str();
                if class_iri.contains("owl#Ontology") || class_iri.contains("Ontology") {
                    continue;
                }
                if class_iri.contains("owl#NamedIndividual") {
                    continue;
                }
                if folded.class.is_none() {
                    folded.class = Some(local_name(class_iri).to_string());
                }
            }
            continue;
        }

        let pred_local = local_name(predicate).to_string();
        match &quad.object {
            Term::Literal(lit) => {
                folded.data_props.insert(pred_local, literal_value(lit));
            }
            Term::NamedNode(obj) => {
                let target = local_name(obj.as_str()).to_string();
                let targets = folded.object_props.entry(pred_local).or_default();
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
            _ => {}
        }
    }

    let individuals: Vec<IndividualData> = by_subject
        .into_iter()
        .filter_map(|(id, folded)| {
            let class = folded.class?;
            Some(IndividualData {
                id,
                class,
                data_properties: folded.data_props,
                object_properties: folded.object_props,
            })
        })
        .collect();

    tracing::debug!(source, count = individuals.len(), "parsed TTL individuals");
    Ok(individuals)
}
