//! Audit batch: walk each selected path in turn and classify the outcome.

use anyhow::{Result, bail};
use tracing::{info, instrument};

use crate::core::classifier::classify;
use crate::core::selection::PathSelection;
use crate::core::types::{AnswerPath, StopReason};
use crate::graph::LogicGraph;
use crate::io::actor::SessionFactory;
use crate::report::{AuditRecord, AuditSummary};
use crate::walk::{CancelFlag, WalkConfig, run_walk};

/// Inputs for one audit run.
pub struct AuditRequest<'a> {
    pub survey_url: &'a str,
    pub graph: &'a LogicGraph,
    /// Full enumeration; `selection` indexes into it.
    pub paths: &'a [AnswerPath],
    pub selection: &'a PathSelection,
    pub walk: &'a WalkConfig,
    pub cancel: &'a CancelFlag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditProgress {
    pub done: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct AuditOutcome {
    pub records: Vec<AuditRecord>,
    pub summary: AuditSummary,
    /// True if the cancel flag stopped the run before every selected path ran.
    pub cancelled: bool,
}

/// Walk every selected path, strictly one at a time in the order the paths
/// were selected.
///
/// `on_record` sees each record as soon as it is classified; an error from it
/// aborts the run. A walk interrupted by cancellation produces no record.
#[instrument(skip_all, fields(url = request.survey_url, selected = request.selection.count()))]
pub fn run_audit<F, C>(factory: &F, request: &AuditRequest<'_>, mut on_record: C) -> Result<AuditOutcome>
where
    F: SessionFactory,
    C: FnMut(AuditProgress, &AuditRecord) -> Result<()>,
{
    if request.survey_url.trim().is_empty() {
        bail!("survey url must not be empty");
    }
    if request.selection.total() != request.paths.len() {
        bail!(
            "selection covers {} paths but {} were enumerated",
            request.selection.total(),
            request.paths.len()
        );
    }
    let order = request.selection.run_order();
    if order.is_empty() {
        bail!("no paths selected");
    }

    let total = order.len();
    let mut records = Vec::with_capacity(total);
    let mut summary = AuditSummary::default();
    let mut cancelled = false;

    for &index in order {
        if request.cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let path = &request.paths[index];
        let trace = run_walk(
            factory,
            request.survey_url,
            path,
            request.walk,
            request.cancel,
        );
        if matches!(trace.stop, StopReason::Cancelled { .. }) {
            cancelled = true;
            break;
        }

        let verdict = classify(&trace, request.graph);
        let record = AuditRecord::new(records.len() + 1, path, verdict, trace);
        summary.add(verdict);
        on_record(
            AuditProgress {
                done: records.len() + 1,
                total,
            },
            &record,
        )?;
        records.push(record);
    }

    info!(
        audited = summary.total,
        logic_breaks = summary.logic_break,
        system_errors = summary.system_error,
        cancelled,
        "audit finished"
    );
    Ok(AuditOutcome {
        records,
        summary,
        cancelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::enumerate::{EnumerationLimits, enumerate_paths};
    use crate::core::types::Verdict;
    use crate::test_support::{FakePage, FakeRoute, FakeSurvey, FakeSurveyFactory, branching_graph};

    const URL: &str = "https://survey.example/s/1";

    /// Live survey matching the branching map; after the last step "D" lands on
    /// a disqualification screen, which the walk never inspects.
    fn live_survey() -> FakeSurvey {
        FakeSurvey::new(vec![
            FakePage::new("Q1", "Which applies?")
                .choice("A", FakeRoute::Page("Q2".into()))
                .choice("B", FakeRoute::End("Unfortunately you do not qualify.".into())),
            FakePage::new("Q2", "Pick one")
                .choice("C", FakeRoute::Next)
                .choice("D", FakeRoute::End("Unfortunately you do not qualify.".into())),
        ])
    }

    fn audit(
        factory: &FakeSurveyFactory,
        selection: &PathSelection,
        cancel: &CancelFlag,
    ) -> (Result<AuditOutcome>, Vec<AuditProgress>) {
        let graph = branching_graph();
        let paths = enumerate_paths(&graph, &EnumerationLimits::default()).paths;
        let walk = WalkConfig::default();
        let request = AuditRequest {
            survey_url: URL,
            graph: &graph,
            paths: &paths,
            selection,
            walk: &walk,
            cancel,
        };
        let mut progress = Vec::new();
        let outcome = run_audit(factory, &request, |p, _| {
            progress.push(p);
            Ok(())
        });
        (outcome, progress)
    }

    #[test]
    fn classifies_every_selected_path_in_order() {
        let factory = FakeSurveyFactory::new(live_survey());
        let (outcome, progress) = audit(&factory, &PathSelection::all(3), &CancelFlag::new());
        let outcome = outcome.expect("audit");

        // Paths: [A,C], [A,D], [B].
        let verdicts: Vec<Verdict> = outcome.records.iter().map(|r| r.verdict).collect();
        assert_eq!(
            verdicts,
            vec![Verdict::Success, Verdict::Success, Verdict::Success]
        );
        assert_eq!(outcome.summary.total, 3);
        assert!(!outcome.cancelled);
        assert_eq!(progress.last(), Some(&AuditProgress { done: 3, total: 3 }));
        let log = factory.log();
        assert_eq!((log.opened, log.closed), (3, 3));
    }

    #[test]
    fn premature_end_is_a_logic_break() {
        // The live survey ends after A, though the map continues to Q2.
        let survey = FakeSurvey::new(vec![
            FakePage::new("Q1", "Which applies?")
                .choice("A", FakeRoute::End("Thank you for your time.".into()))
                .choice("B", FakeRoute::End("Unfortunately you do not qualify.".into())),
        ]);
        let factory = FakeSurveyFactory::new(survey);
        let (outcome, _) = audit(&factory, &PathSelection::all(3), &CancelFlag::new());
        let outcome = outcome.expect("audit");
        assert_eq!(outcome.records[0].verdict, Verdict::LogicBreak);
        assert_eq!(outcome.records[0].detail, "Logic Break: Stopped at 'A'");
        assert_eq!(outcome.records[2].verdict, Verdict::Success);
        assert_eq!(outcome.summary.exit_code(), crate::exit_codes::LOGIC_BREAK);
    }

    #[test]
    fn only_selected_paths_run() {
        let factory = FakeSurveyFactory::new(live_survey());
        let mut selection = PathSelection::none(3);
        selection.set(2, true).expect("set");
        let (outcome, _) = audit(&factory, &selection, &CancelFlag::new());
        let outcome = outcome.expect("audit");
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].case, 1);
        assert_eq!(outcome.records[0].path_index, 2);
        assert_eq!(outcome.records[0].path, "B");
    }

    #[test]
    fn paths_run_in_selection_order() {
        let factory = FakeSurveyFactory::new(live_survey());
        let mut selection = PathSelection::none(3);
        selection.set(2, true).expect("set");
        selection.set(0, true).expect("set");
        let (outcome, _) = audit(&factory, &selection, &CancelFlag::new());
        let outcome = outcome.expect("audit");
        let order: Vec<(usize, usize)> = outcome
            .records
            .iter()
            .map(|record| (record.case, record.path_index))
            .collect();
        assert_eq!(order, vec![(1, 2), (2, 0)]);
    }

    #[test]
    fn system_errors_are_recorded_not_raised() {
        let factory = FakeSurveyFactory::new(live_survey().fail_navigation("connection refused"));
        let (outcome, _) = audit(&factory, &PathSelection::all(3), &CancelFlag::new());
        let outcome = outcome.expect("audit");
        assert_eq!(outcome.summary.system_error, 3);
        assert!(outcome.records[0].detail.starts_with("System Error: "));
        assert_eq!(outcome.summary.exit_code(), crate::exit_codes::SYSTEM_ERROR);
    }

    #[test]
    fn cancelled_run_stops_between_paths() {
        let factory = FakeSurveyFactory::new(live_survey());
        let cancel = CancelFlag::new();
        cancel.cancel();
        let (outcome, progress) = audit(&factory, &PathSelection::all(3), &cancel);
        let outcome = outcome.expect("audit");
        assert!(outcome.cancelled);
        assert!(outcome.records.is_empty());
        assert!(progress.is_empty());
        assert_eq!(factory.log().opened, 0);
    }

    #[test]
    fn rejects_empty_url_and_empty_selection() {
        let factory = FakeSurveyFactory::new(live_survey());
        let (outcome, _) = audit(&factory, &PathSelection::none(3), &CancelFlag::new());
        assert!(outcome.is_err());

        let graph = branching_graph();
        let paths = enumerate_paths(&graph, &EnumerationLimits::default()).paths;
        let selection = PathSelection::all(paths.len());
        let walk = WalkConfig::default();
        let cancel = CancelFlag::new();
        let request = AuditRequest {
            survey_url: "  ",
            graph: &graph,
            paths: &paths,
            selection: &selection,
            walk: &walk,
            cancel: &cancel,
        };
        let err = run_audit(&factory, &request, |_, _| Ok(())).expect_err("empty url");
        assert!(err.to_string().contains("survey url"));
        assert_eq!(factory.log().opened, 0);
    }
}
