//! PDDL domain parsing: the declared type hierarchy.
//!
//! The synthesizer only needs the `:types` section — child → parent edges
//! and the full type-name set — to classify knowledge-graph individuals
//! into domain types. The rest of the domain file (predicates, actions) is
//! the planner's business and passes through untouched.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::DomainError;

/// The parsed type hierarchy of a PDDL domain.
#[derive(Debug, Clone)]
pub struct Domain {
    name: String,
    /// child → parent; roots map to None.
    hierarchy: BTreeMap<String, Option<String>>,
}

impl Domain {
    /// Load and parse a domain file.
    pub fn load(path: &Path) -> Result<Self, DomainError> {
        if !path.exists() {
            return Err(DomainError::NotFound {
                path: path.display().to_string(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|e| DomainError::Parse {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::parse(&text)
    }

    /// Parse domain text.
    pub fn parse(text: &str) -> Result<Self, DomainError> {
        let name = parse_domain_name(text).unwrap_or_else(|| "robot".to_string());

        let types_body = extract_types_section(text).ok_or(DomainError::MissingTypes)?;
        let mut hierarchy: BTreeMap<String, Option<String>> = BTreeMap::new();

        for raw_line in types_body.lines() {
            let line = raw_line.split(';').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if let Some((children_part, parent_part)) = line.split_once('-') {
                let parent = parent_part.trim();
                if parent.is_empty() || parent.contains(char::is_whitespace) {
                    return Err(DomainError::Parse {
                        message: format!("expected a single parent type in \"{line}\""),
                    });
                }
                hierarchy.entry(parent.to_string()).or_insert(None);
                for child in children_part.split_whitespace() {
                    hierarchy.insert(child.to_string(), Some(parent.to_string()));
                }
            } else {
                for t in line.split_whitespace() {
                    hierarchy.entry(t.to_string()).or_insert(None);
                }
            }
        }

        if hierarchy.is_empty() {
            return Err(DomainError::Parse {
                message: "empty :types section".to_string(),
            });
        }

        tracing::debug!(name = %name, types = hierarchy.len(), "parsed PDDL domain");
        Ok(Self { name, hierarchy })
    }

    /// The declared domain name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every type declared in the domain.
    pub fn all_types(&self) -> Vec<String> {
        self.hierarchy.keys().cloned().collect()
    }

    pub fn has_type(&self, t: &str) -> bool {
        self.hierarchy.contains_key(t)
    }

    /// Direct parent of a type, None for roots and unknown types.
    pub fn parent_of(&self, t: &str) -> Option<&str> {
        self.hierarchy.get(t).and_then(|p| p.as_deref())
    }

    /// Reflexive-transitive subtype check; identical names are subtypes.
    pub fn is_subtype_of(&self, child: &str, parent: &str) -> bool {
        if child == parent {
            return true;
        }
        let mut cursor = child;
        let mut hops = 0;
        while let Some(p) = self.parent_of(cursor) {
            if p == parent {
                return true;
            }
            cursor = p;
            hops += 1;
            if hops > self.hierarchy.len() {
                break; // malformed hierarchy with a cycle
            }
        }
        false
    }

    /// Hops from a type up to its root; the tie-break for specificity.
    fn depth(&self, t: &str) -> usize {
        let mut depth = 0;
        let mut cursor = t;
        while let Some(p) = self.parent_of(cursor) {
            depth += 1;
            cursor = p;
            if depth > self.hierarchy.len() {
                break;
            }
        }
        depth
    }

    /// Map a set of ontology class names onto the *most specific* name that
    /// is also a domain type: a candidate no other candidate is a strict
    /// subtype of, with subtype depth as the tie-break.
    pub fn map_class_to_domain_type(&self, class_names: &[String]) -> Option<String> {
        let mut matching: Vec<&String> = class_names
            .iter()
            .filter(|c| self.has_type(c))
            .collect();
        if matching.is_empty() {
            return None;
        }
        matching.sort_by_key(|t| std::cmp::Reverse(self.depth(t)));

        for candidate in &matching {
            let most_specific = matching.iter().all(|other| {
                *other == *candidate || !self.is_subtype_of(other, candidate)
            });
            if most_specific {
                return Some((*candidate).clone());
            }
        }
        Some(matching[0].clone())
    }
}

fn parse_domain_name(text: &str) -> Option<String> {
    let start = text.find("(domain")?;
    let rest = &text[start + "(domain".len()..];
    let end = rest.find(')')?;
    let name = rest[..end].trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Grab the body of the `(:types ...)` section, balancing nothing — PDDL
/// type sections contain no nested parentheses.
fn extract_types_section(text: &str) -> Option<String> {
    let start = text.find("(:types")?;
    let rest = &text[start + "(:types".len()..];
    let end = rest.find(')')?;
    Some(rest[..end].to_string())
}
