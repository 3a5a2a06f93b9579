//! Logic graph: stitched survey questions in global order.

use std::collections::{HashMap, HashSet};
use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::core::destination::{Destination, Resolved, Terminal};

/// Serialized logic map as produced by extraction (`{"questions": [...]}`).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogicMap {
    pub questions: Vec<Question>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    #[default]
    SingleSelect,
    MultiSelect,
    TextInput,
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: QuestionType,
    #[serde(default)]
    pub options: Vec<AnswerOption>,
    /// Display condition, carried verbatim and never evaluated.
    #[serde(
        default,
        alias = "display_condition",
        skip_serializing_if = "Option::is_none"
    )]
    pub condition: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerOption {
    /// Literal label shown to respondents.
    #[serde(default = "unknown_label")]
    pub text: String,
    #[serde(
        default,
        deserialize_with = "falsy_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_destination: Option<String>,
    #[serde(default)]
    pub is_terminate: bool,
}

impl AnswerOption {
    pub fn destination(&self) -> Destination {
        Destination::parse(self.next_destination.as_deref())
    }
}

fn unknown_label() -> String {
    "Unknown Option".to_string()
}

/// Extraction emits `null`, `false` or `""` for "no explicit destination".
fn falsy_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    })
}

/// Two questions share an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateIdError {
    pub id: String,
    pub first: usize,
    pub second: usize,
}

impl fmt::Display for DuplicateIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "duplicate question id '{}' at positions {} and {}",
            self.id, self.first, self.second
        )
    }
}

impl std::error::Error for DuplicateIdError {}

/// Immutable, indexed view over the stitched question sequence.
#[derive(Clone, Debug)]
pub struct LogicGraph {
    questions: Vec<Question>,
    positions: HashMap<String, usize>,
    terminal_labels: HashSet<String>,
}

impl LogicGraph {
    pub fn new(questions: Vec<Question>) -> Result<Self> {
        let mut positions = HashMap::with_capacity(questions.len());
        for (position, question) in questions.iter().enumerate() {
            if let Some(first) = positions.insert(question.id.clone(), position) {
                return Err(DuplicateIdError {
                    id: question.id.clone(),
                    first,
                    second: position,
                }
                .into());
            }
        }
        let mut graph = Self {
            questions,
            positions,
            terminal_labels: HashSet::new(),
        };
        graph.terminal_labels = graph.collect_terminal_labels();
        Ok(graph)
    }

    /// Concatenate sections in order, preserving each section's internal order.
    pub fn stitch<I>(sections: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<Question>>,
    {
        Self::new(sections.into_iter().flatten().collect())
    }

    pub fn from_map(map: LogicMap) -> Result<Self> {
        Self::new(map.questions)
    }

    pub fn to_map(&self) -> LogicMap {
        LogicMap {
            questions: self.questions.clone(),
        }
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn at(&self, position: usize) -> Option<&Question> {
        self.questions.get(position)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn question(&self, id: &str) -> Option<&Question> {
        self.position(id).map(|position| &self.questions[position])
    }

    /// Position of the question that follows `position` in global order.
    pub fn next_after(&self, position: usize) -> Option<usize> {
        let next = position + 1;
        (next < self.questions.len()).then_some(next)
    }

    /// Resolve an option of the question at `position`.
    ///
    /// `NEXT` (or no destination) on the last question resolves to `SUBMIT`.
    pub fn resolve(&self, position: usize, option: &AnswerOption) -> Resolved {
        match option.destination() {
            Destination::Next => match self.next_after(position) {
                Some(next) => Resolved::Question(next),
                None => Resolved::Terminal(Terminal::Submit),
            },
            Destination::Terminal(terminal) => Resolved::Terminal(terminal),
            Destination::Question(id) => match self.position(&id) {
                Some(target) => Resolved::Question(target),
                None => Resolved::Dangling(id),
            },
        }
    }

    /// Labels of options that resolve to a terminal sentinel, in no order.
    pub fn terminal_labels(&self) -> impl Iterator<Item = &str> {
        self.terminal_labels.iter().map(String::as_str)
    }

    /// True if any option carrying `label` resolves to a terminal sentinel.
    pub fn is_terminal_label(&self, label: &str) -> bool {
        self.terminal_labels.contains(label)
    }

    fn collect_terminal_labels(&self) -> HashSet<String> {
        let mut labels = HashSet::new();
        for (position, question) in self.questions.iter().enumerate() {
            for option in &question.options {
                if self.resolve(position, option).is_terminal() {
                    labels.insert(option.text.clone());
                }
            }
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{opt, question};

    #[test]
    fn parses_extracted_question_json() {
        let raw = r#"{
            "questions": [
                {
                    "id": "S1_Q1",
                    "text": "Are you over 18?",
                    "type": "single-select",
                    "options": [
                        {"text": "Yes", "next_destination": null, "is_terminate": false},
                        {"text": "No", "next_destination": "TERMINATE", "is_terminate": true},
                        {"text": "Maybe", "next_destination": false}
                    ],
                    "section_id": 1
                },
                {"id": "S1_Q2", "type": "dropdown"}
            ]
        }"#;
        let map: LogicMap = serde_json::from_str(raw).expect("parse");
        let q1 = &map.questions[0];
        assert_eq!(q1.kind, QuestionType::SingleSelect);
        assert_eq!(q1.options[0].destination(), Destination::Next);
        assert_eq!(
            q1.options[1].destination(),
            Destination::Terminal(Terminal::Terminate)
        );
        assert_eq!(q1.options[2].next_destination, None);
        assert_eq!(map.questions[1].kind, QuestionType::Other);
        assert!(map.questions[1].options.is_empty());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = LogicGraph::new(vec![
            question("Q1", vec![opt("A", None)]),
            question("Q2", vec![opt("B", None)]),
            question("Q1", vec![opt("C", None)]),
        ])
        .unwrap_err();
        let dup = err.downcast_ref::<DuplicateIdError>().expect("typed error");
        assert_eq!(dup.id, "Q1");
        assert_eq!((dup.first, dup.second), (0, 2));
    }

    #[test]
    fn stitch_preserves_section_order() {
        let graph = LogicGraph::stitch(vec![
            vec![question("S1_Q1", vec![]), question("S1_Q2", vec![])],
            vec![question("S2_Q1", vec![])],
        ])
        .expect("stitch");
        let ids: Vec<&str> = graph.questions().iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["S1_Q1", "S1_Q2", "S2_Q1"]);
        assert_eq!(graph.next_after(1), Some(2));
        assert_eq!(graph.next_after(2), None);
        assert_eq!(graph.position("S2_Q1"), Some(2));
        assert_eq!(graph.question("S1_Q2").map(|q| q.id.as_str()), Some("S1_Q2"));
        assert_eq!(graph.question("S3_Q1"), None);
        assert_eq!(graph.at(0).map(|q| q.id.as_str()), Some("S1_Q1"));
    }

    #[test]
    fn next_on_last_question_resolves_to_submit() {
        let graph = LogicGraph::new(vec![
            question("Q1", vec![opt("A", Some("NEXT"))]),
            question("Q2", vec![opt("B", None), opt("C", Some("Q9"))]),
        ])
        .expect("graph");
        assert_eq!(
            graph.resolve(0, &graph.questions()[0].options[0]),
            Resolved::Question(1)
        );
        assert_eq!(
            graph.resolve(1, &graph.questions()[1].options[0]),
            Resolved::Terminal(Terminal::Submit)
        );
        assert_eq!(
            graph.resolve(1, &graph.questions()[1].options[1]),
            Resolved::Dangling("Q9".to_string())
        );
        assert!(graph.is_terminal_label("B"));
        assert!(!graph.is_terminal_label("A"));
        assert!(!graph.is_terminal_label("C"));
        assert_eq!(graph.terminal_labels().collect::<Vec<_>>(), vec!["B"]);
    }
}
