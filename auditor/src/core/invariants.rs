//! Semantic checks over a logic map that JSON Schema cannot express.

use std::collections::HashMap;

use crate::core::destination::Destination;
use crate::graph::LogicMap;

/// Findings from [`lint_logic`]. Errors prevent building a graph; warnings do not.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LogicLint {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Check a logic map:
/// - at least one question, no empty or duplicate ids (errors)
/// - destinations naming unknown questions (warning, enumeration closes the path)
/// - options routing back to their own question (warning)
/// - questions without options (warning, treated as pass-through)
pub fn lint_logic(map: &LogicMap) -> LogicLint {
    let mut lint = LogicLint::default();
    if map.questions.is_empty() {
        lint.errors.push("logic map has no questions".to_string());
        return lint;
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for (position, question) in map.questions.iter().enumerate() {
        if question.id.trim().is_empty() {
            lint.errors
                .push(format!("question at position {position} has an empty id"));
        }
        if let Some(first) = seen.insert(question.id.as_str(), position) {
            lint.errors.push(format!(
                "duplicate id '{}' at positions {} and {}",
                question.id, first, position
            ));
        }
    }

    for question in &map.questions {
        if question.options.is_empty() {
            lint.warnings
                .push(format!("{}: no options (pass-through)", question.id));
        }
        for option in &question.options {
            if let Destination::Question(target) = option.destination() {
                if target == question.id {
                    lint.warnings.push(format!(
                        "{}: option '{}' routes back to its own question",
                        question.id, option.text
                    ));
                } else if !seen.contains_key(target.as_str()) {
                    lint.warnings.push(format!(
                        "{}: option '{}' routes to unknown question '{}'",
                        question.id, option.text, target
                    ));
                }
            }
        }
    }
    lint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{opt, question};

    #[test]
    fn empty_map_is_an_error() {
        let lint = lint_logic(&LogicMap::default());
        assert_eq!(lint.errors, vec!["logic map has no questions"]);
    }

    #[test]
    fn reports_duplicates_dangling_and_self_loops() {
        let map = LogicMap {
            questions: vec![
                question("Q1", vec![opt("A", Some("Q1")), opt("B", Some("Q7"))]),
                question("Q1", vec![opt("C", None)]),
                question("Q3", vec![]),
            ],
        };
        let lint = lint_logic(&map);
        assert!(lint.errors.iter().any(|e| e.contains("duplicate id 'Q1'")));
        assert!(lint.warnings.iter().any(|w| w.contains("own question")));
        assert!(lint.warnings.iter().any(|w| w.contains("unknown question 'Q7'")));
        assert!(lint.warnings.iter().any(|w| w.contains("Q3: no options")));
    }

    #[test]
    fn clean_map_has_no_findings() {
        let map = LogicMap {
            questions: vec![
                question("Q1", vec![opt("A", Some("Q2")), opt("B", Some("TERMINATE"))]),
                question("Q2", vec![opt("C", None)]),
            ],
        };
        assert_eq!(lint_logic(&map), LogicLint::default());
    }
}
