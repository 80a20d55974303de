//! Restricted SPARQL UPDATE parsing for the incremental mutation path.
//!
//! The update endpoint is not a general SPARQL engine. It accepts exactly
//! the mutation shape the TTL diff machinery produces: one
//! `DELETE { triples } INSERT { triples } WHERE { }` block (either clause
//! may be absent, `INSERT DATA` is accepted) where every triple is ground.
//! Anything else — variables, patterns, a non-empty WHERE, other update
//! forms — is rejected before any mutation is applied.

use crate::error::SparqlError;
use crate::schema::local_name;

/// A ground triple from an update, subject/predicate reduced to local names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundTriple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    /// True when the object was a literal rather than an IRI.
    pub object_is_literal: bool,
}

/// The two clause bodies of a parsed update.
#[derive(Debug, Clone, Default)]
pub struct ParsedUpdate {
    pub delete: Vec<GroundTriple>,
    pub insert: Vec<GroundTriple>,
}

/// Parse a restricted DELETE/INSERT update. `namespace` expands the default
/// `:` prefix when triples use prefixed names.
pub fn parse_update(text: &str, namespace: &str) -> Result<ParsedUpdate, SparqlError> {
    let mut cursor = Cursor::new(text);
    let mut update = ParsedUpdate::default();
    let mut saw_clause = false;

    loop {
        cursor.skip_ws();
        if cursor.at_end() {
            break;
        }
        let keyword = cursor.read_word();
        match keyword.to_uppercase().as_str() {
            "DELETE" => {
                let body = cursor.read_block()?;
                update.delete = parse_triples(&body, namespace)?;
                saw_clause = true;
            }
            "INSERT" => {
                cursor.skip_ws();
                // optional DATA keyword
                let mark = cursor.pos;
                let next = cursor.read_word();
                if next.to_uppercase() != "DATA" {
                    cursor.pos = mark;
                }
                let body = cursor.read_block()?;
                update.insert = parse_triples(&body, namespace)?;
                saw_clause = true;
            }
            "WHERE" => {
                let body = cursor.read_block()?;
                if !body.trim().is_empty() {
                    return Err(SparqlError::UnsupportedShape {
                        message: "WHERE clause must be empty (ground updates only)".to_string(),
                    });
                }
            }
            ";" => {}
            other => {
                return Err(SparqlError::UnsupportedShape {
                    message: format!("unexpected token \"{other}\""),
                });
            }
        }
    }

    if !saw_clause {
        return Err(SparqlError::UnsupportedShape {
            message: "update contains neither DELETE nor INSERT clause".to_string(),
        });
    }
    Ok(update)
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn skip_ws(&mut self) {
        let rest = &self.text[self.pos..];
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }

    fn read_word(&mut self) -> String {
        self.skip_ws();
        let rest = &self.text[self.pos..];
        if rest.starts_with(';') {
            self.pos += 1;
            return ";".to_string();
        }
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '{')
            .unwrap_or(rest.len());
        let word = &rest[..end];
        self.pos += end;
        word.to_string()
    }

    /// Read a `{ ... }` block body (no nesting in the accepted shape).
    fn read_block(&mut self) -> Result<String, SparqlError> {
        self.skip_ws();
        let rest = &self.text[self.pos..];
        if !rest.starts_with('{') {
            return Err(SparqlError::UnsupportedShape {
                message: "expected `{` to open a clause body".to_string(),
            });
        }
        let Some(close) = rest.find('}') else {
            return Err(SparqlError::UnsupportedShape {
                message: "unterminated clause body".to_string(),
            });
        };
        let body = &rest[1..close];
        self.pos += close + 1;
        Ok(body.to_string())
    }
}

fn parse_triples(body: &str, namespace: &str) -> Result<Vec<GroundTriple>, SparqlError> {
    let mut triples = Vec::new();
    for statement in split_statements(body) {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        let tokens = tokenize(statement)?;
        if tokens.len() != 3 {
            return Err(SparqlError::BadTriple {
                line: statement.to_string(),
            });
        }
        let subject = resolve_name(&tokens[0], namespace, statement)?;
        let predicate = resolve_name(&tokens[1], namespace, statement)?;
        let (object, object_is_literal) = match &tokens[2] {
            Token::Literal(value) => (value.clone(), true),
            token => (resolve_name(token, namespace, statement)?, false),
        };
        triples.push(GroundTriple {
            subject,
            predicate,
            object,
            object_is_literal,
        });
    }
    Ok(triples)
}

/// Split a clause body on statement-terminating dots (dots inside IRIs and
/// quoted literals do not terminate).
fn split_statements(body: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_iri = false;
    let mut in_string = false;
    for c in body.chars() {
        match c {
            '<' if !in_string => in_iri = true,
            '>' if !in_string => in_iri = false,
            '"' if !in_iri => in_string = !in_string,
            '.' if !in_iri && !in_string => {
                statements.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        statements.push(current);
    }
    statements
}

#[derive(Debug, Clone)]
enum Token {
    Iri(String),
    Prefixed(String),
    Literal(String),
    Variable(String),
}

fn tokenize(statement: &str) -> Result<Vec<Token>, SparqlError> {
    let mut tokens = Vec::new();
    let mut chars = statement.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => continue,
            '<' => {
                let mut end = start;
                for (i, c2) in chars.by_ref() {
                    if c2 == '>' {
                        end = i;
                        break;
                    }
                }
                if end == start {
                    return Err(SparqlError::BadTriple {
                        line: statement.to_string(),
                    });
                }
                tokens.push(Token::Iri(statement[start + 1..end].to_string()));
            }
            '"' => {
                let mut end = None;
                let mut literal = String::new();
                for (i, c2) in chars.by_ref() {
                    if c2 == '"' {
                        end = Some(i);
                        break;
                    }
                    literal.push(c2);
                }
                if end.is_none() {
                    return Err(SparqlError::BadTriple {
                        line: statement.to_string(),
                    });
                }
                // swallow a trailing ^^<datatype> or @lang tag
                while let Some(&(_, c2)) = chars.peek() {
                    if c2.is_whitespace() {
                        break;
                    }
                    chars.next();
                }
                tokens.push(Token::Literal(literal));
            }
            '?' | '$' => {
                let mut var = String::new();
                while let Some(&(_, c2)) = chars.peek() {
                    if c2.is_whitespace() {
                        break;
                    }
                    var.push(c2);
                    chars.next();
                }
                tokens.push(Token::Variable(var));
            }
            _ => {
                let mut word = String::from(c);
                while let Some(&(_, c2)) = chars.peek() {
                    if c2.is_whitespace() {
                        break;
                    }
                    word.push(c2);
                    chars.next();
                }
                tokens.push(Token::Prefixed(word));
            }
        }
    }
    Ok(tokens)
}

fn resolve_name(token: &Token, _namespace: &str, statement: &str) -> Result<String, SparqlError> {
    match token {
        Token::Iri(iri) => Ok(local_name(iri).to_string()),
        Token::Prefixed(name) => {
            if let Some(stripped) = name.strip_prefix(':') {
                Ok(stripped.to_string())
            } else if name == "a" {
                Ok("type".to_string())
            } else if let Some((_, local)) = name.split_once(':') {
                Ok(local.to_string())
            } else {
                Err(SparqlError::BadTriple {
                    line: statement.to_string(),
                })
            }
        }
        Token::Variable(var) => Err(SparqlError::UnsupportedShape {
            message: format!("variable ?{var} in ground update"),
        }),
        Token::Literal(_) => Err(SparqlError::BadTriple {
            line: statement.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "https://seshat.dev/world#";

    #[test]
    fn parses_delete_insert_where() {
        let text = format!(
            "DELETE {{\n    <{NS}robot1> <{NS}robotIsInSpace> <{NS}corridor_14> .\n}}\n\
             INSERT {{\n    <{NS}robot1> <{NS}robotIsInSpace> <{NS}kitchen_13> .\n}}\n\
             WHERE {{ }}"
        );
        let parsed = parse_update(&text, NS).unwrap();
        assert_eq!(parsed.delete.len(), 1);
        assert_eq!(parsed.insert.len(), 1);
        assert_eq!(parsed.delete[0].subject, "robot1");
        assert_eq!(parsed.delete[0].predicate, "robotIsInSpace");
        assert_eq!(parsed.delete[0].object, "corridor_14");
        assert_eq!(parsed.insert[0].object, "kitchen_13");
    }

    #[test]
    fn parses_insert_data_with_prefixed_names() {
        let parsed = parse_update(
            "INSERT DATA { :cup_6 :objectIsInSpace :kitchen_13 . }",
            NS,
        )
        .unwrap();
        assert!(parsed.delete.is_empty());
        assert_eq!(parsed.insert.len(), 1);
        assert_eq!(parsed.insert[0].subject, "cup_6");
    }

    #[test]
    fn literal_objects_are_tagged() {
        let parsed = parse_update(
            "INSERT DATA { :door_9 :isOpenDoor \"true\"^^<http://www.w3.org/2001/XMLSchema#boolean> . }",
            NS,
        )
        .unwrap();
        assert!(parsed.insert[0].object_is_literal);
        assert_eq!(parsed.insert[0].object, "true");
    }

    #[test]
    fn variables_rejected_without_mutation() {
        let err = parse_update("DELETE { ?s :robotIsInSpace :corridor_14 . } WHERE { }", NS)
            .unwrap_err();
        assert!(matches!(err, SparqlError::UnsupportedShape { .. }));
    }

    #[test]
    fn nonempty_where_rejected() {
        let err = parse_update(
            "DELETE { :a :b :c . } WHERE { :a :b :c . }",
            NS,
        )
        .unwrap_err();
        assert!(matches!(err, SparqlError::UnsupportedShape { .. }));
    }

    #[test]
    fn other_update_forms_rejected() {
        for bad in ["CLEAR ALL", "LOAD <http://x>", "SELECT * WHERE { ?s ?p ?o }"] {
            assert!(parse_update(bad, NS).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn empty_update_rejected() {
        assert!(parse_update("   ", NS).is_err());
    }

    #[test]
    fn malformed_triple_rejected() {
        let err = parse_update("DELETE { :a :b . }", NS).unwrap_err();
        assert!(matches!(err, SparqlError::BadTriple { .. }));
    }
}
