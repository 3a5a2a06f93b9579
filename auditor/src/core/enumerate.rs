//! Expansion of a logic graph into the capped set of respondent paths.
//!
//! Traversal is depth-first over an explicit work-list. Frames are pushed in
//! reverse option order so that pop order equals recursive discovery order.
//! Which paths survive a cap is therefore order-dependent: callers must not
//! treat a truncated enumeration as a sample.

use tracing::{debug, instrument, warn};

use crate::core::destination::Resolved;
use crate::core::types::AnswerPath;
use crate::graph::LogicGraph;

/// Default cap on completed paths.
pub const DEFAULT_MAX_PATHS: usize = 2500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumerationLimits {
    pub max_paths: usize,
}

impl Default for EnumerationLimits {
    fn default() -> Self {
        Self {
            max_paths: DEFAULT_MAX_PATHS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumeration {
    /// Completed paths in discovery order; `index` equals position.
    pub paths: Vec<AnswerPath>,
    /// True if the cap stopped expansion with work still pending.
    pub truncated: bool,
}

enum Frame {
    Visit {
        position: usize,
        labels: Vec<String>,
        /// Question positions already entered on this walk.
        visited: Vec<usize>,
    },
    Close(Vec<String>),
}

/// Enumerate every path from the first question, up to `limits.max_paths`.
///
/// Never fails: dangling destinations and cycles close the affected path.
#[instrument(skip_all, fields(questions = graph.len(), max_paths = limits.max_paths))]
pub fn enumerate_paths(graph: &LogicGraph, limits: &EnumerationLimits) -> Enumeration {
    let mut completed: Vec<Vec<String>> = Vec::new();
    let mut truncated = false;
    let mut stack = Vec::new();
    if !graph.is_empty() {
        stack.push(Frame::Visit {
            position: 0,
            labels: Vec::new(),
            visited: vec![0],
        });
    }

    while let Some(frame) = stack.pop() {
        if completed.len() >= limits.max_paths {
            truncated = true;
            break;
        }
        match frame {
            Frame::Close(labels) => {
                if !labels.is_empty() {
                    completed.push(labels);
                }
            }
            Frame::Visit {
                position,
                labels,
                visited,
            } => expand(graph, position, labels, visited, &mut stack),
        }
    }

    if truncated {
        warn!(
            max_paths = limits.max_paths,
            "path enumeration truncated at cap"
        );
    }
    debug!(paths = completed.len(), truncated, "enumeration finished");

    Enumeration {
        paths: completed
            .into_iter()
            .enumerate()
            .map(|(index, labels)| AnswerPath { index, labels })
            .collect(),
        truncated,
    }
}

fn expand(
    graph: &LogicGraph,
    position: usize,
    labels: Vec<String>,
    visited: Vec<usize>,
    stack: &mut Vec<Frame>,
) {
    let Some(question) = graph.at(position) else {
        stack.push(Frame::Close(labels));
        return;
    };

    if question.options.is_empty() {
        match graph.next_after(position) {
            Some(next) if !visited.contains(&next) => {
                let mut visited = visited;
                visited.push(next);
                stack.push(Frame::Visit {
                    position: next,
                    labels,
                    visited,
                });
            }
            _ => stack.push(Frame::Close(labels)),
        }
        return;
    }

    for option in question.options.iter().rev() {
        let mut branch = labels.clone();
        branch.push(option.text.clone());
        match graph.resolve(position, option) {
            Resolved::Question(target) if visited.contains(&target) => {
                debug!(from = %question.id, to = target, "cycle closes path");
                stack.push(Frame::Close(branch));
            }
            Resolved::Question(target) => {
                let mut branch_visited = visited.clone();
                branch_visited.push(target);
                stack.push(Frame::Visit {
                    position: target,
                    labels: branch,
                    visited: branch_visited,
                });
            }
            Resolved::Dangling(id) => {
                debug!(from = %question.id, to = %id, "dangling destination closes path");
                stack.push(Frame::Close(branch));
            }
            Resolved::Terminal(_) => stack.push(Frame::Close(branch)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{branching_graph, opt, question};

    fn labels(enumeration: &Enumeration) -> Vec<Vec<&str>> {
        enumeration
            .paths
            .iter()
            .map(|path| path.labels.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn sequential_graph_yields_single_path() {
        let graph = LogicGraph::new(vec![
            question("Q1", vec![opt("A", None)]),
            question("Q2", vec![opt("B", None)]),
            question("Q3", vec![opt("C", Some("SUBMIT"))]),
        ])
        .expect("graph");
        let result = enumerate_paths(&graph, &EnumerationLimits::default());
        assert_eq!(labels(&result), vec![vec!["A", "B", "C"]]);
        assert!(!result.truncated);
    }

    #[test]
    fn branch_with_early_terminate() {
        let result = enumerate_paths(&branching_graph(), &EnumerationLimits::default());
        assert_eq!(
            labels(&result),
            vec![vec!["A", "C"], vec!["A", "D"], vec!["B"]]
        );
        let indices: Vec<usize> = result.paths.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn self_loop_closes_path() {
        let graph = LogicGraph::new(vec![
            question("Q1", vec![opt("Again", Some("Q1")), opt("On", None)]),
            question("Q2", vec![opt("Done", Some("End"))]),
        ])
        .expect("graph");
        let result = enumerate_paths(&graph, &EnumerationLimits::default());
        assert_eq!(labels(&result), vec![vec!["Again"], vec!["On", "Done"]]);
    }

    #[test]
    fn multi_hop_cycle_terminates() {
        let graph = LogicGraph::new(vec![
            question("A", vec![opt("to-b", Some("B"))]),
            question("B", vec![opt("to-a", Some("A")), opt("out", Some("null"))]),
        ])
        .expect("graph");
        let result = enumerate_paths(&graph, &EnumerationLimits::default());
        assert_eq!(
            labels(&result),
            vec![vec!["to-b", "to-a"], vec!["to-b", "out"]]
        );
    }

    #[test]
    fn dangling_destination_closes_path_with_label() {
        let graph = LogicGraph::new(vec![
            question("Q1", vec![opt("Lost", Some("S9_Q1")), opt("Fine", None)]),
            question("Q2", vec![opt("Last", None)]),
        ])
        .expect("graph");
        let result = enumerate_paths(&graph, &EnumerationLimits::default());
        assert_eq!(labels(&result), vec![vec!["Lost"], vec!["Fine", "Last"]]);
    }

    #[test]
    fn optionless_questions_pass_through() {
        let graph = LogicGraph::new(vec![
            question("Intro", vec![]),
            question("Q1", vec![opt("A", None), opt("B", None)]),
            question("Info", vec![]),
        ])
        .expect("graph");
        let result = enumerate_paths(&graph, &EnumerationLimits::default());
        assert_eq!(labels(&result), vec![vec!["A"], vec!["B"]]);
    }

    #[test]
    fn graph_without_options_yields_nothing() {
        let graph = LogicGraph::new(vec![question("Intro", vec![])]).expect("graph");
        let result = enumerate_paths(&graph, &EnumerationLimits::default());
        assert!(result.paths.is_empty());
        assert!(!result.truncated);
    }

    #[test]
    fn cap_bounds_completed_paths() {
        // 2^12 = 4096 full paths.
        let questions = (0..12)
            .map(|i| question(&format!("Q{i}"), vec![opt("yes", None), opt("no", None)]))
            .collect();
        let graph = LogicGraph::new(questions).expect("graph");
        let result = enumerate_paths(&graph, &EnumerationLimits { max_paths: 100 });
        assert_eq!(result.paths.len(), 100);
        assert!(result.truncated);
        assert!(result.paths.iter().all(|p| p.labels.len() == 12));
        assert!(result.paths[0].labels.iter().all(|l| l == "yes"));
    }

    #[test]
    fn cap_equal_to_total_is_not_truncated() {
        let result = enumerate_paths(&branching_graph(), &EnumerationLimits { max_paths: 3 });
        assert_eq!(result.paths.len(), 3);
        assert!(!result.truncated);
    }

    #[test]
    fn enumeration_is_idempotent() {
        let graph = branching_graph();
        let first = enumerate_paths(&graph, &EnumerationLimits::default());
        let second = enumerate_paths(&graph, &EnumerationLimits::default());
        assert_eq!(first, second);
    }
}
