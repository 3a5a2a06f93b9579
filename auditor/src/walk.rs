//! Walk executor: drives one answer path against a live survey.
//!
//! Each walk opens its own UI session, attempts every label in order and
//! records what actually happened. Failures never escape: they are captured
//! in the returned [`ExecutionTrace`] and the session is always released.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::matchers::{ADVANCE_CONTROLS, fingerprint, is_end_screen, label_locators};
use crate::core::types::{AnswerPath, ExecutionTrace, StopReason};
use crate::io::actor::{ElementRef, SessionFactory, SessionGuard, Settle, UiActor};

/// Timing knobs for a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkConfig {
    /// Pause after clicking an option so page scripts register the selection.
    pub settle_delay: Duration,
    /// Pause after advancing to let page transitions finish.
    pub transition_delay: Duration,
    /// Bound on the initial page load.
    pub navigation_timeout: Duration,
    /// Bound on waiting for the page to settle after advancing.
    pub settle_timeout: Duration,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(800),
            transition_delay: Duration::from_millis(1500),
            navigation_timeout: Duration::from_secs(60),
            settle_timeout: Duration::from_secs(5),
        }
    }
}

/// Cooperative cancellation shared between the caller and running walks.
///
/// Checked before each step and between paths; never preempts a step.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct WalkProgress {
    steps_completed: usize,
    last_clicked: Option<String>,
    soft_timeouts: u32,
}

/// Walk `path` against the survey at `survey_url` in a fresh session.
#[instrument(skip_all, fields(path_index = path.index, steps = path.len()))]
pub fn run_walk<F: SessionFactory>(
    factory: &F,
    survey_url: &str,
    path: &AnswerPath,
    config: &WalkConfig,
    cancel: &CancelFlag,
) -> ExecutionTrace {
    let mut progress = WalkProgress::default();

    let outcome = factory
        .open()
        .context("open ui session")
        .and_then(|session| {
            let mut guard = SessionGuard::new(session);
            let result = drive(
                guard.actor(),
                survey_url,
                path,
                config,
                cancel,
                &mut progress,
            );
            if let Err(err) = guard.release() {
                warn!(err = %err, "failed to close ui session");
            }
            result
        });

    let (stop, error) = match outcome {
        Ok(stop) => (stop, None),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "walk aborted");
            (StopReason::Failed, Some(format!("{err:#}")))
        }
    };
    info!(
        steps_completed = progress.steps_completed,
        stop = ?stop,
        soft_timeouts = progress.soft_timeouts,
        "walk finished"
    );

    ExecutionTrace {
        steps_completed: progress.steps_completed,
        total_steps: path.len(),
        last_clicked: progress.last_clicked,
        error,
        stop,
        soft_timeouts: progress.soft_timeouts,
    }
}

fn drive<A: UiActor>(
    actor: &mut A,
    survey_url: &str,
    path: &AnswerPath,
    config: &WalkConfig,
    cancel: &CancelFlag,
    progress: &mut WalkProgress,
) -> Result<StopReason> {
    actor
        .navigate(survey_url, config.navigation_timeout)
        .with_context(|| format!("navigate to {survey_url}"))?;

    // Fingerprints of controls already clicked in this session.
    let mut clicked = HashSet::new();

    for (step, label) in path.labels.iter().enumerate() {
        if cancel.is_cancelled() {
            return Ok(StopReason::Cancelled { step });
        }

        let page_text = actor.visible_text().context("read page text")?;
        if is_end_screen(&page_text) {
            debug!(step, "end screen reached");
            return Ok(StopReason::EndScreen { step });
        }

        let selected = select_label(actor, label, &mut clicked)
            .with_context(|| format!("select option '{label}'"))?;
        if selected {
            progress.steps_completed += 1;
            progress.last_clicked = Some(label.clone());
            actor.pause(config.settle_delay);
        } else {
            debug!(step, label = %label, "option not found");
        }

        match find_advance_control(actor).context("find advance control")? {
            Some(control) => {
                actor.click(&control).context("click advance control")?;
                let settle = actor
                    .wait_settled(config.settle_timeout)
                    .context("wait for page to settle")?;
                if settle == Settle::TimedOut {
                    progress.soft_timeouts += 1;
                    debug!(step, "page did not settle in time");
                }
                actor.pause(config.transition_delay);
            }
            None if !selected => {
                return Ok(StopReason::Stuck {
                    step,
                    label: label.clone(),
                });
            }
            None => {}
        }
    }

    Ok(StopReason::PathExhausted)
}

/// Click the first visible, not-yet-clicked element matching `label`.
fn select_label<A: UiActor>(
    actor: &mut A,
    label: &str,
    clicked: &mut HashSet<String>,
) -> Result<bool> {
    for locator in label_locators(label) {
        for candidate in actor.locate(&locator)? {
            if !actor.is_visible(&candidate)? {
                continue;
            }
            let info = actor.describe(&candidate)?;
            let key = fingerprint(&info.text, info.top);
            if clicked.contains(&key) {
                continue;
            }
            actor.click(&candidate)?;
            debug!(label, strategy = ?locator, "clicked option");
            clicked.insert(key);
            return Ok(true);
        }
    }
    Ok(false)
}

fn find_advance_control<A: UiActor>(actor: &mut A) -> Result<Option<ElementRef>> {
    for locator in &ADVANCE_CONTROLS {
        for candidate in actor.locate(locator)? {
            if actor.is_visible(&candidate)? {
                return Ok(Some(candidate));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matchers::Locator;
    use crate::test_support::{
        FakeMarkup, FakePage, FakeRoute, FakeSurvey, FakeSurveyFactory, path,
    };

    const URL: &str = "https://survey.example/s/1";

    fn live_survey() -> FakeSurvey {
        FakeSurvey::new(vec![
            FakePage::new("Q1", "Which applies?")
                .choice("A", FakeRoute::Page("Q2".into()))
                .choice("B", FakeRoute::End("Unfortunately you do not qualify.".into())),
            FakePage::new("Q2", "Pick one")
                .choice("C", FakeRoute::Next)
                .choice("D", FakeRoute::Next),
        ])
    }

    fn walk(factory: &FakeSurveyFactory, labels: &[&str]) -> ExecutionTrace {
        run_walk(
            factory,
            URL,
            &path(0, labels),
            &WalkConfig::default(),
            &CancelFlag::new(),
        )
    }

    #[test]
    fn full_path_is_walked_and_session_closed() {
        let factory = FakeSurveyFactory::new(live_survey());
        let trace = walk(&factory, &["A", "C"]);
        assert_eq!(trace.steps_completed, 2);
        assert_eq!(trace.total_steps, 2);
        assert_eq!(trace.last_clicked.as_deref(), Some("C"));
        assert_eq!(trace.stop, StopReason::PathExhausted);
        assert!(trace.error.is_none());
        let log = factory.log();
        assert_eq!((log.opened, log.closed), (1, 1));
        assert_eq!(log.navigations, vec![URL.to_string()]);
    }

    #[test]
    fn end_screen_stops_gracefully() {
        let factory = FakeSurveyFactory::new(live_survey());
        let trace = walk(&factory, &["B", "C"]);
        assert_eq!(trace.steps_completed, 1);
        assert_eq!(trace.last_clicked.as_deref(), Some("B"));
        assert_eq!(trace.stop, StopReason::EndScreen { step: 1 });
        assert!(trace.error.is_none());
    }

    #[test]
    fn missing_label_without_advance_control_is_stuck() {
        let survey = FakeSurvey::new(vec![
            FakePage::new("Q1", "Pick")
                .choice("Yes", FakeRoute::Next)
                .without_next_button(),
        ]);
        let factory = FakeSurveyFactory::new(survey);
        let trace = walk(&factory, &["Nope", "Yes"]);
        assert_eq!(trace.steps_completed, 0);
        assert_eq!(trace.last_clicked, None);
        assert_eq!(
            trace.stop,
            StopReason::Stuck {
                step: 0,
                label: "Nope".to_string()
            }
        );
        assert_eq!(factory.log().closed, 1);
    }

    #[test]
    fn missing_label_with_advance_control_moves_on() {
        let survey = FakeSurvey::new(vec![
            FakePage::new("Intro", "Welcome").choice("Start", FakeRoute::Next),
            FakePage::new("Q1", "Pick").choice("Yes", FakeRoute::Next),
        ]);
        let factory = FakeSurveyFactory::new(survey);
        let trace = walk(&factory, &["Start", "Ghost", "Yes"]);
        // "Ghost" is skipped; Next without a selection keeps the page.
        assert_eq!(trace.steps_completed, 2);
        assert_eq!(trace.last_clicked.as_deref(), Some("Yes"));
        assert_eq!(trace.stop, StopReason::PathExhausted);
    }

    #[test]
    fn navigation_failure_is_captured_and_session_released() {
        let survey = live_survey().fail_navigation("net::ERR_NAME_NOT_RESOLVED");
        let factory = FakeSurveyFactory::new(survey);
        let trace = walk(&factory, &["A", "C"]);
        assert_eq!(trace.stop, StopReason::Failed);
        let error = trace.error.expect("error");
        assert!(error.contains("navigate to"));
        assert!(error.contains("ERR_NAME_NOT_RESOLVED"));
        assert_eq!(factory.log().closed, 1);
    }

    #[test]
    fn session_open_failure_is_captured() {
        let factory = FakeSurveyFactory::new(live_survey()).fail_open();
        let trace = walk(&factory, &["A"]);
        assert_eq!(trace.stop, StopReason::Failed);
        assert!(trace.error.expect("error").contains("open ui session"));
        assert_eq!(factory.log().closed, 0);
    }

    #[test]
    fn settle_timeouts_are_soft() {
        let factory = FakeSurveyFactory::new(live_survey().settle_times_out());
        let trace = walk(&factory, &["A", "D"]);
        assert_eq!(trace.steps_completed, 2);
        assert_eq!(trace.soft_timeouts, 2);
        assert!(trace.error.is_none());
    }

    #[test]
    fn cancelled_walk_stops_before_first_step() {
        let factory = FakeSurveyFactory::new(live_survey());
        let cancel = CancelFlag::new();
        cancel.cancel();
        let trace = run_walk(
            &factory,
            URL,
            &path(0, &["A", "C"]),
            &WalkConfig::default(),
            &cancel,
        );
        assert_eq!(trace.stop, StopReason::Cancelled { step: 0 });
        assert_eq!(trace.steps_completed, 0);
        assert_eq!(factory.log().closed, 1);
    }

    #[test]
    fn same_text_controls_are_told_apart_by_position() {
        let survey = FakeSurvey::new(vec![
            FakePage::new("Q1", "Select all that apply")
                .choice("Yes", FakeRoute::Next)
                .choice("Yes", FakeRoute::Next)
                .without_next_button(),
        ]);
        let factory = FakeSurveyFactory::new(survey);
        let trace = walk(&factory, &["Yes", "Yes"]);
        assert_eq!(trace.steps_completed, 2);
        assert_eq!(
            factory.log().clicks,
            vec!["choice:0:0".to_string(), "choice:0:1".to_string()]
        );
    }

    #[test]
    fn later_strategies_find_labels_the_earlier_ones_miss() {
        for markup in [
            FakeMarkup::Button,
            FakeMarkup::Span,
            FakeMarkup::AriaLabel,
            FakeMarkup::Radio,
        ] {
            // On-screen text only contains the path label, so exact match misses.
            let survey = FakeSurvey::new(vec![
                FakePage::new("Q1", "Continue?")
                    .choice_as(markup, "Yes, continue", FakeRoute::Next)
                    .choice_as(markup, "No", FakeRoute::Next),
            ]);
            let factory = FakeSurveyFactory::new(survey);
            let trace = walk(&factory, &["yes"]);
            assert_eq!(trace.steps_completed, 1, "{markup:?}");
            assert_eq!(trace.stop, StopReason::PathExhausted, "{markup:?}");
            assert_eq!(
                factory.log().clicks,
                vec!["choice:0:0".to_string(), "next:0".to_string()],
                "{markup:?}"
            );
        }
    }

    #[test]
    fn hidden_candidates_are_skipped() {
        let survey = FakeSurvey::new(vec![
            FakePage::new("Q1", "Pick")
                .hidden_choice("Yes", FakeRoute::End("Unfortunately you do not qualify.".into()))
                .choice("Yes", FakeRoute::Next),
        ]);
        let factory = FakeSurveyFactory::new(survey);
        let trace = walk(&factory, &["Yes"]);
        assert_eq!(trace.steps_completed, 1);
        assert_eq!(factory.log().clicks[0], "choice:0:1");
    }

    #[test]
    fn falls_back_to_later_advance_controls() {
        let survey = FakeSurvey::new(vec![
            FakePage::new("Q1", "Pick")
                .choice("A", FakeRoute::Next)
                .advance_with(Locator::ButtonText("Next")),
            FakePage::new("Q2", "Pick again")
                .choice("B", FakeRoute::Next)
                .advance_with(Locator::Css("input[value=\"Next\"]")),
        ]);
        let factory = FakeSurveyFactory::new(survey);
        let trace = walk(&factory, &["A", "B"]);
        assert_eq!(trace.steps_completed, 2);
        assert_eq!(trace.stop, StopReason::PathExhausted);
        assert_eq!(
            factory.log().clicks,
            vec![
                "choice:0:0".to_string(),
                "next:0".to_string(),
                "choice:1:0".to_string(),
                "next:1".to_string(),
            ]
        );
    }
}
