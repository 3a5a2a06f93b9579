//! Reconciliation of an execution trace against the logic graph.

use crate::core::types::{ExecutionTrace, Verdict};
use crate::graph::LogicGraph;

/// Maximum error characters shown in a status detail.
const ERROR_DETAIL_CHARS: usize = 50;

/// Classify a trace. First match wins:
///
/// - trace carries an error: `SystemError`
/// - every step completed: `Success`
/// - last click matches an option the graph routes to a terminal: `CorrectTermination`
/// - otherwise: `LogicBreak`
pub fn classify(trace: &ExecutionTrace, graph: &LogicGraph) -> Verdict {
    if trace.error.is_some() {
        return Verdict::SystemError;
    }
    if trace.steps_completed == trace.total_steps {
        return Verdict::Success;
    }
    match trace.last_clicked.as_deref() {
        Some(label) if graph.is_terminal_label(label) => Verdict::CorrectTermination,
        _ => Verdict::LogicBreak,
    }
}

/// Short human-readable status for a classified trace.
pub fn status_detail(verdict: Verdict, trace: &ExecutionTrace) -> String {
    match verdict {
        Verdict::SystemError => {
            let error = trace.error.as_deref().unwrap_or("unknown error");
            let clipped: String = error.chars().take(ERROR_DETAIL_CHARS).collect();
            format!("System Error: {clipped}")
        }
        Verdict::Success => "Success: Path Fully Reached".to_string(),
        Verdict::CorrectTermination => {
            format!("Correct Term: Ended at '{}'", trace.last_clicked_display())
        }
        Verdict::LogicBreak => {
            format!("Logic Break: Stopped at '{}'", trace.last_clicked_display())
        }
    }
}
