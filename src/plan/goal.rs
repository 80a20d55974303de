//! Goal-formula normalization and object extraction.
//!
//! The normalizer is the compatibility layer between goal producers (LLMs,
//! humans, legacy tooling) and the fixed domain vocabulary: a fixed,
//! case-insensitive predicate rewrite table, `isClosed` expansion, and
//! re-wrapping of unparenthesized `not`. It is a closed operation — running
//! it on already-normalized input returns the input unchanged.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::PlanError;

/// PDDL keywords that can never be object identifiers.
pub const PDDL_KEYWORDS: [&str; 11] = [
    "and", "or", "not", "forall", "exists", "when", "imply", "either", "increase", "decrease",
    "assign",
];

struct Rewrite {
    pattern: Regex,
    canonical: &'static str,
    arity: usize,
}

fn rewrite_table() -> &'static Vec<Rewrite> {
    static TABLE: OnceLock<Vec<Rewrite>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let rule = |name: &str, canonical: &'static str, arity: usize| {
            let pattern = match arity {
                1 => format!(r"(?i)\({name}\s+(\w+)\)"),
                _ => format!(r"(?i)\({name}\s+(\w+)\s+(\w+)\)"),
            };
            Rewrite {
                pattern: Regex::new(&pattern).expect("valid rewrite pattern"),
                canonical,
                arity,
            }
        };
        vec![
            // legacy / drifted names onto canonical ones
            rule("isInSpace", "artifactIsInSpace", 2),
            rule("isOnTopOf", "isOntopOf", 2),
            rule("isOnTop", "isON", 1),
            // canonical casing for the standard predicates
            rule("isON", "isON", 1),
            rule("isOpen", "isOpen", 1),
            rule("isHeldBy", "isHeldBy", 2),
            rule("isInsideOf", "isInsideOf", 2),
            rule("isOntopOf", "isOntopOf", 2),
            rule("robotIsInSpace", "robotIsInSpace", 2),
            rule("artifactIsOnFloorOf", "artifactIsOnFloorOf", 2),
            rule("artifactIsInSpace", "artifactIsInSpace", 2),
            rule("isAdjacentTo", "isAdjacentTo", 2),
            rule("isLocked", "isLocked", 1),
            rule("isOpenDoor", "isOpenDoor", 1),
        ]
    })
}

/// Normalize a goal formula onto the domain's canonical predicates.
pub fn normalize(formula: &str) -> String {
    let mut result = formula.to_string();

    for rewrite in rewrite_table() {
        result = rewrite
            .pattern
            .replace_all(&result, |caps: &regex::Captures<'_>| match rewrite.arity {
                1 => format!("({} {})", rewrite.canonical, &caps[1]),
                _ => format!("({} {} {})", rewrite.canonical, &caps[1], &caps[2]),
            })
            .into_owned();
    }

    // (isClosed x) → (not (isOpen x))
    static IS_CLOSED: OnceLock<Regex> = OnceLock::new();
    let is_closed = IS_CLOSED.get_or_init(|| Regex::new(r"(?i)\(isClosed\s+(\w+)\)").unwrap());
    result = is_closed
        .replace_all(&result, |caps: &regex::Captures<'_>| {
            format!("(not (isOpen {}))", &caps[1])
        })
        .into_owned();

    fix_unwrapped_not(&result)
}

/// Wrap bare `not (…)` occurrences in parentheses: `(and not (p x))`
/// becomes `(and (not (p x)))`. Already-wrapped `(not (…))` is untouched.
fn fix_unwrapped_not(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut result = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        if text[i..].starts_with("not (") {
            let already_wrapped = i > 0 && bytes[i - 1] == b'(';
            if !already_wrapped {
                // find the matching close paren of the predicate
                let mut depth = 1usize;
                let mut j = i + 5;
                while j < bytes.len() && depth > 0 {
                    match bytes[j] {
                        b'(' => depth += 1,
                        b')' => depth -= 1,
                        _ => {}
                    }
                    j += 1;
                }
                if depth == 0 {
                    result.push_str("(not ");
                    result.push_str(&text[i + 4..j]);
                    result.push(')');
                    i = j;
                    continue;
                }
            }
        }
        result.push(text[i..].chars().next().unwrap());
        i += text[i..].chars().next().unwrap().len_utf8();
    }
    result
}

/// Reject a formula that cannot be a PDDL goal: empty, not parenthesized,
/// or with unbalanced parentheses.
pub fn validate(formula: &str) -> Result<(), PlanError> {
    let trimmed = formula.trim();
    if trimmed.is_empty() {
        return Err(PlanError::InvalidGoal {
            message: "empty goal formula".to_string(),
        });
    }
    if !trimmed.starts_with('(') {
        return Err(PlanError::InvalidGoal {
            message: "goal must be a parenthesized formula".to_string(),
        });
    }
    let mut depth = 0i64;
    for c in trimmed.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return Err(PlanError::InvalidGoal {
                message: "unbalanced parentheses".to_string(),
            });
        }
    }
    if depth != 0 {
        return Err(PlanError::InvalidGoal {
            message: "unbalanced parentheses".to_string(),
        });
    }
    Ok(())
}

/// All bareword identifiers (keywords excluded) in the formula.
pub fn extract_identifiers(formula: &str) -> BTreeSet<String> {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    let ident = IDENT.get_or_init(|| Regex::new(r"\b([a-zA-Z][a-zA-Z0-9_-]*)\b").unwrap());
    ident
        .captures_iter(formula)
        .map(|c| c[1].to_string())
        .filter(|id| !PDDL_KEYWORDS.contains(&id.to_lowercase().as_str()))
        .collect()
}

/// Identifiers in *argument* position: every bareword except the predicate
/// (the first token after each opening paren) and the keywords.
pub fn extract_argument_identifiers(formula: &str) -> BTreeSet<String> {
    let mut args = BTreeSet::new();
    let mut expect_predicate = false;
    let mut token = String::new();

    let mut flush = |token: &mut String, expect_predicate: &mut bool, args: &mut BTreeSet<String>| {
        if token.is_empty() {
            return;
        }
        let word = std::mem::take(token);
        let lowered = word.to_lowercase();
        if *expect_predicate {
            *expect_predicate = false;
            // keywords open a sub-formula rather than naming a predicate
            if PDDL_KEYWORDS.contains(&lowered.as_str()) {
                return;
            }
            return; // predicate position, not an object
        }
        if !PDDL_KEYWORDS.contains(&lowered.as_str())
            && word.chars().next().is_some_and(|c| c.is_alphabetic())
        {
            args.insert(word);
        }
    };

    for c in formula.chars() {
        match c {
            '(' => {
                flush(&mut token, &mut expect_predicate, &mut args);
                expect_predicate = true;
            }
            ')' => {
                flush(&mut token, &mut expect_predicate, &mut args);
            }
            c if c.is_whitespace() => {
                flush(&mut token, &mut expect_predicate, &mut args);
            }
            c => token.push(c),
        }
    }
    flush(&mut token, &mut expect_predicate, &mut args);
    args
}

/// The hand arguments and held artifacts of every `(isHeldBy a h)` in the
/// goal, used to disambiguate ungrouped objects.
pub fn is_held_by_arguments(formula: &str) -> (BTreeSet<String>, BTreeSet<String>) {
    static IS_HELD_BY: OnceLock<Regex> = OnceLock::new();
    let pattern =
        IS_HELD_BY.get_or_init(|| Regex::new(r"(?i)\(isHeldBy\s+(\w+)\s+(\w+)\)").unwrap());
    let mut artifacts = BTreeSet::new();
    let mut hands = BTreeSet::new();
    for caps in pattern.captures_iter(formula) {
        artifacts.insert(caps[1].to_string());
        hands.insert(caps[2].to_string());
    }
    (artifacts, hands)
}

/// Check goal predicates against artifact affordances. Never a hard
/// failure: the planner is the judge of solvability, these are warnings.
pub fn validate_affordances(
    formula: &str,
    artifact_ids: &[String],
    affordances: &std::collections::BTreeMap<String, Vec<String>>,
) -> Vec<String> {
    let required: &[(&str, &str)] = &[("isON", "Affordance_Power"), ("isOpen", "Affordance_Open")];
    static PREDICATE: OnceLock<Regex> = OnceLock::new();
    let pattern = PREDICATE.get_or_init(|| Regex::new(r"\((\w+)\s+([^)]+)\)").unwrap());

    let mut warnings = Vec::new();
    for caps in pattern.captures_iter(formula) {
        let predicate = &caps[1];
        let Some((_, affordance)) = required.iter().find(|(p, _)| *p == predicate) else {
            continue;
        };
        for arg in caps[2].split_whitespace() {
            if !artifact_ids.iter().any(|a| a == arg) {
                continue;
            }
            let have = affordances.get(arg).cloned().unwrap_or_default();
            if !have.iter().any(|a| a == affordance) {
                warnings.push(format!(
                    "artifact '{arg}' needs '{affordance}' for predicate '{predicate}' but only has: {have:?}"
                ));
            }
        }
    }
    warnings
}

/// Derive a short task label from a description or the goal's first
/// predicate, sanitized for file-system use.
pub fn task_label(description: Option<&str>, formula: &str) -> String {
    static FIRST: OnceLock<Regex> = OnceLock::new();
    let first = FIRST.get_or_init(|| Regex::new(r"\((\w+)\s+([^)]+)\)").unwrap());

    let raw = if let Some(desc) = description {
        desc.to_string()
    } else if let Some(caps) = first.captures(formula) {
        let arg = caps[2].split_whitespace().next().unwrap_or("");
        format!("{}_{arg}", &caps[1])
    } else {
        "task".to_string()
    };

    let mut label: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    label.truncate(50);
    if label.is_empty() {
        label = "task".to_string();
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn rewrites_legacy_predicates() {
        assert_eq!(
            normalize("(isInSpace cup_12 kitchen_5)"),
            "(artifactIsInSpace cup_12 kitchen_5)"
        );
        assert_eq!(normalize("(isOnTopOf cup_1 table_2)"), "(isOntopOf cup_1 table_2)");
        assert_eq!(normalize("(ISON tv_52)"), "(isON tv_52)");
    }

    #[test]
    fn is_closed_becomes_negated_is_open() {
        assert_eq!(normalize("(isClosed oven_53)"), "(not (isOpen oven_53))");
    }

    #[test]
    fn bare_not_is_wrapped() {
        assert_eq!(
            normalize("(and not (isOpen oven_53))"),
            "(and (not (isOpen oven_53)))"
        );
    }

    #[test]
    fn normalization_is_closed() {
        let goals = [
            "(and (isON tv_52) (robotIsInSpace robot1 living_room_23))",
            "(not (isOpen oven_53))",
            "(and (isOntopOf cup_1 table_2) (isHeldBy book_3 left_hand))",
        ];
        for goal in goals {
            let once = normalize(goal);
            let twice = normalize(&once);
            assert_eq!(once, twice, "normalize must be idempotent for {goal}");
        }
    }

    #[test]
    fn validate_rejects_broken_formulas() {
        assert!(validate("").is_err());
        assert!(validate("isON tv_52").is_err());
        assert!(validate("(and (isON tv_52)").is_err());
        assert!(validate("(and (isON tv_52)))").is_err());
        assert!(validate("(and (isON tv_52))").is_ok());
    }

    #[test]
    fn identifier_extraction_skips_keywords() {
        let ids = extract_identifiers("(and (isON tv_52) (not (isOpen oven_53)))");
        assert!(ids.contains("tv_52"));
        assert!(ids.contains("oven_53"));
        assert!(ids.contains("isON"));
        assert!(!ids.contains("and"));
        assert!(!ids.contains("not"));
    }

    #[test]
    fn argument_extraction_skips_predicates() {
        let args =
            extract_argument_identifiers("(and (isON tv_52) (robotIsInSpace robot1 living_room_23))");
        assert!(args.contains("tv_52"));
        assert!(args.contains("robot1"));
        assert!(args.contains("living_room_23"));
        assert!(!args.contains("isON"));
        assert!(!args.contains("robotIsInSpace"));
        assert!(!args.contains("and"));
    }

    #[test]
    fn argument_extraction_handles_negation() {
        let args = extract_argument_identifiers("(and (not (isOpen oven_53)) (isON tv_52))");
        assert!(args.contains("oven_53"));
        assert!(!args.contains("isOpen"));
    }

    #[test]
    fn is_held_by_argument_split() {
        let (artifacts, hands) =
            is_held_by_arguments("(and (isHeldBy cup_6 left_hand) (isHeldBy book_2 right_hand))");
        assert!(artifacts.contains("cup_6"));
        assert!(artifacts.contains("book_2"));
        assert!(hands.contains("left_hand"));
        assert!(hands.contains("right_hand"));
    }

    #[test]
    fn affordance_validation_warns_only_for_missing() {
        let artifacts = vec!["tv_52".to_string(), "oven_53".to_string()];
        let mut affordances = BTreeMap::new();
        affordances.insert(
            "tv_52".to_string(),
            vec!["Affordance_Power".to_string()],
        );
        let warnings = validate_affordances(
            "(and (isON tv_52) (isOpen oven_53))",
            &artifacts,
            &affordances,
        );
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("oven_53"));
        assert!(warnings[0].contains("Affordance_Open"));
    }

    #[test]
    fn task_label_derivation() {
        assert_eq!(task_label(None, "(isON tv_52)"), "isON_tv_52");
        assert_eq!(task_label(Some("turn on the TV!"), ""), "turnontheTV");
        assert_eq!(task_label(None, ""), "task");
    }
}
