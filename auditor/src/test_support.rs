//! Test-only helpers: graph builders and a scripted survey UI actor.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};

use crate::core::matchers::{LabelStrategy, Locator};
use crate::core::types::AnswerPath;
use crate::graph::{AnswerOption, LogicGraph, LogicMap, Question, QuestionType};
use crate::io::actor::{ElementInfo, ElementRef, SessionFactory, Settle, UiActor};
use crate::io::extract::{ExtractRequest, Extractor};

/// Single-select question with the given options.
pub fn question(id: &str, options: Vec<AnswerOption>) -> Question {
    Question {
        id: id.to_string(),
        text: format!("{id} text"),
        kind: QuestionType::SingleSelect,
        options,
        condition: None,
    }
}

/// Option with a raw destination (`None` means sequential).
pub fn opt(label: &str, destination: Option<&str>) -> AnswerOption {
    AnswerOption {
        text: label.to_string(),
        next_destination: destination.map(str::to_string),
        is_terminate: matches!(destination, Some("TERMINATE")),
    }
}

/// Q1 {A -> Q2, B -> TERMINATE}; Q2 {C, D} sequential and last.
pub fn branching_graph() -> LogicGraph {
    LogicGraph::new(vec![
        question("Q1", vec![opt("A", Some("Q2")), opt("B", Some("TERMINATE"))]),
        question("Q2", vec![opt("C", None), opt("D", None)]),
    ])
    .expect("branching graph is valid")
}

pub fn path(index: usize, labels: &[&str]) -> AnswerPath {
    AnswerPath {
        index,
        labels: labels.iter().map(|label| label.to_string()).collect(),
    }
}

/// Write `map` as pretty JSON into `dir/name` and return the path.
pub fn write_logic_fixture(dir: &Path, name: &str, map: &LogicMap) -> Result<PathBuf> {
    let path = dir.join(name);
    let mut buf = serde_json::to_string_pretty(map)?;
    buf.push('\n');
    std::fs::write(&path, buf)?;
    Ok(path)
}

/// Temporary directory holding audit state for CLI tests.
pub struct TestWorkspace {
    dir: tempfile::TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_logic(&self, map: &LogicMap) -> Result<PathBuf> {
        write_logic_fixture(self.root(), "logic.json", map)
    }
}

/// Where a fake survey goes after a choice is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeRoute {
    /// Next page in order, or the thank-you screen after the last page.
    Next,
    Page(String),
    /// End screen showing the given text.
    End(String),
}

/// How a choice is rendered, which decides the locators that find it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FakeMarkup {
    /// `<label>` with the text.
    #[default]
    Label,
    Button,
    Span,
    /// Control with no text, named only by `aria-label`.
    AriaLabel,
    /// `role=radio` widget.
    Radio,
}

#[derive(Debug, Clone)]
pub struct FakeChoice {
    pub label: String,
    pub route: FakeRoute,
    pub markup: FakeMarkup,
    pub hidden: bool,
}

#[derive(Debug, Clone)]
pub struct FakePage {
    pub id: String,
    pub prompt: String,
    pub choices: Vec<FakeChoice>,
    /// Locator that finds this page's advance control, if it has one.
    pub advance: Option<Locator<'static>>,
}

impl FakePage {
    pub fn new(id: &str, prompt: &str) -> Self {
        Self {
            id: id.to_string(),
            prompt: prompt.to_string(),
            choices: Vec::new(),
            advance: Some(Locator::Css("#NextButton")),
        }
    }

    pub fn choice(self, label: &str, route: FakeRoute) -> Self {
        self.choice_as(FakeMarkup::Label, label, route)
    }

    pub fn choice_as(mut self, markup: FakeMarkup, label: &str, route: FakeRoute) -> Self {
        self.choices.push(FakeChoice {
            label: label.to_string(),
            route,
            markup,
            hidden: false,
        });
        self
    }

    /// Choice present in the page but not displayed.
    pub fn hidden_choice(mut self, label: &str, route: FakeRoute) -> Self {
        self.choices.push(FakeChoice {
            label: label.to_string(),
            route,
            markup: FakeMarkup::Label,
            hidden: true,
        });
        self
    }

    /// Advance control reachable only through `locator`.
    pub fn advance_with(mut self, locator: Locator<'static>) -> Self {
        self.advance = Some(locator);
        self
    }

    pub fn without_next_button(mut self) -> Self {
        self.advance = None;
        self
    }
}

impl FakeChoice {
    fn matches(&self, locator: &Locator<'_>) -> bool {
        let Locator::Label { strategy, text } = *locator else {
            return false;
        };
        let contains = self.label.to_lowercase().contains(&text.trim().to_lowercase());
        match strategy {
            LabelStrategy::ExactText => {
                self.markup != FakeMarkup::AriaLabel && self.label.trim() == text.trim()
            }
            LabelStrategy::LabelContains => self.markup == FakeMarkup::Label && contains,
            LabelStrategy::ButtonContains => self.markup == FakeMarkup::Button && contains,
            LabelStrategy::SpanContains => self.markup == FakeMarkup::Span && contains,
            LabelStrategy::AriaLabelContains => self.markup == FakeMarkup::AriaLabel && contains,
            LabelStrategy::RoleOptionContains => self.markup == FakeMarkup::Radio && contains,
        }
    }
}

/// Scripted survey: pages with choices, a `#NextButton`, and end screens.
#[derive(Debug, Clone)]
pub struct FakeSurvey {
    pages: Vec<FakePage>,
    completion_text: String,
    navigation_error: Option<String>,
    settle: Settle,
}

impl FakeSurvey {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self {
            pages,
            completion_text: "Thank you! Your response has been recorded.".to_string(),
            navigation_error: None,
            settle: Settle::Settled,
        }
    }

    pub fn fail_navigation(mut self, message: &str) -> Self {
        self.navigation_error = Some(message.to_string());
        self
    }

    pub fn settle_times_out(mut self) -> Self {
        self.settle = Settle::TimedOut;
        self
    }
}

/// Observations shared by every session a [`FakeSurveyFactory`] opens.
#[derive(Debug, Clone, Default)]
pub struct FakeLog {
    pub opened: usize,
    pub closed: usize,
    pub navigations: Vec<String>,
    /// Element ids in click order.
    pub clicks: Vec<String>,
}

pub struct FakeSurveyFactory {
    survey: FakeSurvey,
    log: Rc<RefCell<FakeLog>>,
    fail_open: bool,
}

impl FakeSurveyFactory {
    pub fn new(survey: FakeSurvey) -> Self {
        Self {
            survey,
            log: Rc::new(RefCell::new(FakeLog::default())),
            fail_open: false,
        }
    }

    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn log(&self) -> FakeLog {
        self.log.borrow().clone()
    }
}

impl SessionFactory for FakeSurveyFactory {
    type Session = FakeSession;

    fn open(&self) -> Result<FakeSession> {
        if self.fail_open {
            bail!("browser failed to start");
        }
        self.log.borrow_mut().opened += 1;
        Ok(FakeSession {
            survey: self.survey.clone(),
            screen: Screen::Blank,
            selected: None,
            log: Rc::clone(&self.log),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Screen {
    Blank,
    Page(usize),
    End(String),
}

pub struct FakeSession {
    survey: FakeSurvey,
    screen: Screen,
    selected: Option<usize>,
    log: Rc<RefCell<FakeLog>>,
}

impl FakeSession {
    fn page(&self) -> Option<(usize, &FakePage)> {
        match self.screen {
            Screen::Page(index) => self.survey.pages.get(index).map(|page| (index, page)),
            _ => None,
        }
    }

    fn follow(&mut self, from: usize, route: FakeRoute) {
        self.selected = None;
        self.screen = match route {
            FakeRoute::Next if from + 1 < self.survey.pages.len() => Screen::Page(from + 1),
            FakeRoute::Next => Screen::End(self.survey.completion_text.clone()),
            FakeRoute::Page(id) => match self.survey.pages.iter().position(|p| p.id == id) {
                Some(index) => Screen::Page(index),
                None => Screen::End(format!("Page {id} could not be found")),
            },
            FakeRoute::End(text) => Screen::End(text),
        };
    }
}

fn choice_id(page: usize, choice: usize) -> String {
    format!("choice:{page}:{choice}")
}

fn next_id(page: usize) -> String {
    format!("next:{page}")
}

impl UiActor for FakeSession {
    fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<()> {
        self.log.borrow_mut().navigations.push(url.to_string());
        if let Some(message) = &self.survey.navigation_error {
            bail!("{message}");
        }
        self.screen = if self.survey.pages.is_empty() {
            Screen::End(self.survey.completion_text.clone())
        } else {
            Screen::Page(0)
        };
        Ok(())
    }

    fn visible_text(&mut self) -> Result<String> {
        Ok(match &self.screen {
            Screen::Blank => String::new(),
            Screen::End(text) => text.clone(),
            Screen::Page(index) => {
                let page = &self.survey.pages[*index];
                let mut text = page.prompt.clone();
                for choice in page.choices.iter().filter(|choice| !choice.hidden) {
                    text.push('\n');
                    text.push_str(&choice.label);
                }
                text
            }
        })
    }

    fn locate(&mut self, locator: &Locator<'_>) -> Result<Vec<ElementRef>> {
        let Some((index, page)) = self.page() else {
            return Ok(Vec::new());
        };
        if matches!(page.advance, Some(advance) if advance == *locator) {
            return Ok(vec![ElementRef(next_id(index))]);
        }
        Ok(page
            .choices
            .iter()
            .enumerate()
            .filter(|(_, choice)| choice.matches(locator))
            .map(|(i, _)| ElementRef(choice_id(index, i)))
            .collect())
    }

    fn is_visible(&mut self, element: &ElementRef) -> Result<bool> {
        let Some((index, page)) = self.page() else {
            return Ok(false);
        };
        let visible_choice = page
            .choices
            .iter()
            .enumerate()
            .any(|(i, choice)| !choice.hidden && element.0 == choice_id(index, i));
        Ok(visible_choice || (page.advance.is_some() && element.0 == next_id(index)))
    }

    fn describe(&mut self, element: &ElementRef) -> Result<ElementInfo> {
        let (index, page) = self
            .page()
            .ok_or_else(|| anyhow!("stale element {}", element.0))?;
        if element.0 == next_id(index) {
            return Ok(ElementInfo {
                text: "Next".to_string(),
                top: 900.0,
            });
        }
        let position = (0..page.choices.len())
            .position(|i| element.0 == choice_id(index, i))
            .ok_or_else(|| anyhow!("stale element {}", element.0))?;
        Ok(ElementInfo {
            text: page.choices[position].label.clone(),
            top: 100.0 + 50.0 * position as f64,
        })
    }

    fn click(&mut self, element: &ElementRef) -> Result<()> {
        let (index, page) = self
            .page()
            .ok_or_else(|| anyhow!("stale element {}", element.0))?;
        let choices = page.choices.len();
        self.log.borrow_mut().clicks.push(element.0.clone());
        if element.0 == next_id(index) {
            // Without a selection the page re-renders in place.
            if let Some(selected) = self.selected {
                let route = self.survey.pages[index].choices[selected].route.clone();
                self.follow(index, route);
            }
            return Ok(());
        }
        let choice = (0..choices)
            .position(|i| element.0 == choice_id(index, i))
            .ok_or_else(|| anyhow!("stale element {}", element.0))?;
        self.selected = Some(choice);
        Ok(())
    }

    fn wait_settled(&mut self, _timeout: Duration) -> Result<Settle> {
        Ok(self.survey.settle)
    }

    fn pause(&mut self, _duration: Duration) {}

    fn close(&mut self) -> Result<()> {
        self.log.borrow_mut().closed += 1;
        Ok(())
    }
}

/// Extractor that replays canned responses in section order.
pub struct ScriptedExtractor {
    responses: RefCell<Vec<Result<String>>>,
    pub requests: RefCell<Vec<ExtractRequest>>,
}

impl ScriptedExtractor {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        let mut responses = responses;
        responses.reverse();
        Self {
            responses: RefCell::new(responses),
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl Extractor for ScriptedExtractor {
    fn extract(&self, request: &ExtractRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop()
            .unwrap_or_else(|| Err(anyhow!("no scripted response left")))
    }
}

/// JSON for one section's extraction response.
pub fn section_json(questions: &[Question]) -> String {
    serde_json::to_string(&LogicMap {
        questions: questions.to_vec(),
    })
    .expect("serialize section")
}
