//! Shared deterministic types for path enumeration, walks and verdicts.
//!
//! These types define stable contracts between core components and the
//! orchestration layer. They carry no I/O handles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator used when rendering a path for humans.
pub const PATH_ARROW: &str = " → ";

/// One respondent walk: option labels from the first question to a terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerPath {
    /// Stable index within the enumeration that produced this path.
    pub index: usize,
    pub labels: Vec<String>,
}

impl AnswerPath {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Render as `A → B → C`.
    pub fn display(&self) -> String {
        self.labels.join(PATH_ARROW)
    }
}

/// Why a walk stopped processing steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// Every label in the path was attempted.
    PathExhausted,
    /// A completion or disqualification screen was detected before `step`.
    EndScreen { step: usize },
    /// Neither the label nor an advance control could be found.
    Stuck { step: usize, label: String },
    /// The caller's cancel flag was raised before `step`.
    Cancelled { step: usize },
    /// An error aborted the walk; see [`ExecutionTrace::error`].
    Failed,
}

/// Raw result of driving one path against a live survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub steps_completed: usize,
    pub total_steps: usize,
    /// Label of the last successful click, if any.
    pub last_clicked: Option<String>,
    pub error: Option<String>,
    pub stop: StopReason,
    /// Bounded waits that expired without aborting the walk.
    #[serde(default)]
    pub soft_timeouts: u32,
}

impl ExecutionTrace {
    /// `last_clicked` as shown in reports (`None` before the first click).
    pub fn last_clicked_display(&self) -> &str {
        self.last_clicked.as_deref().unwrap_or("None")
    }
}

/// Classifier judgment for one audited path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Success,
    CorrectTermination,
    LogicBreak,
    SystemError,
}

impl Verdict {
    pub fn icon(self) -> &'static str {
        match self {
            Self::Success => "✅",
            Self::CorrectTermination => "🎯",
            Self::LogicBreak => "⚠️",
            Self::SystemError => "❌",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::CorrectTermination => "correct_termination",
            Self::LogicBreak => "logic_break",
            Self::SystemError => "system_error",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
