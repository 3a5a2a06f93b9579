//! Audit records, verdict tallies and their text renderings.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::core::classifier::status_detail;
use crate::core::types::{AnswerPath, ExecutionTrace, Verdict};
use crate::exit_codes;

/// Reported outcome for one audited path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// 1-based position within the audit run.
    pub case: usize,
    pub path_index: usize,
    pub verdict: Verdict,
    pub icon: String,
    /// Arrow-joined labels (`A → B → C`).
    pub path: String,
    pub detail: String,
    pub trace: ExecutionTrace,
}

impl AuditRecord {
    pub fn new(case: usize, path: &AnswerPath, verdict: Verdict, trace: ExecutionTrace) -> Self {
        Self {
            case,
            path_index: path.index,
            verdict,
            icon: verdict.icon().to_string(),
            path: path.display(),
            detail: status_detail(verdict, &trace),
            trace,
        }
    }

    /// One console line: `case icon detail :: path`.
    pub fn line(&self) -> String {
        format!(
            "{:>4} {} {} :: {}",
            self.case, self.icon, self.detail, self.path
        )
    }
}

/// Verdict counts for an audit run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total: usize,
    pub success: usize,
    pub correct_termination: usize,
    pub logic_break: usize,
    pub system_error: usize,
}

impl AuditSummary {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a AuditRecord>,
    {
        let mut summary = Self::default();
        for record in records {
            summary.add(record.verdict);
        }
        summary
    }

    pub fn add(&mut self, verdict: Verdict) {
        self.total += 1;
        match verdict {
            Verdict::Success => self.success += 1,
            Verdict::CorrectTermination => self.correct_termination += 1,
            Verdict::LogicBreak => self.logic_break += 1,
            Verdict::SystemError => self.system_error += 1,
        }
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        match verdict {
            Verdict::Success => self.success,
            Verdict::CorrectTermination => self.correct_termination,
            Verdict::LogicBreak => self.logic_break,
            Verdict::SystemError => self.system_error,
        }
    }

    /// Logic breaks outrank system errors.
    pub fn exit_code(&self) -> i32 {
        if self.logic_break > 0 {
            exit_codes::LOGIC_BREAK
        } else if self.system_error > 0 {
            exit_codes::SYSTEM_ERROR
        } else {
            exit_codes::OK
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!("audited {} path(s)\n", self.total);
        for verdict in [
            Verdict::Success,
            Verdict::CorrectTermination,
            Verdict::LogicBreak,
            Verdict::SystemError,
        ] {
            let _ = writeln!(
                out,
                "  {} {:<20} {}",
                verdict.icon(),
                verdict.as_str(),
                self.count(verdict)
            );
        }
        out
    }
}

/// `index<TAB>A → B → C`, one path per line.
pub fn render_paths(paths: &[AnswerPath]) -> String {
    let mut out = String::new();
    for path in paths {
        let _ = writeln!(out, "{}\t{}", path.index, path.display());
    }
    out
}
