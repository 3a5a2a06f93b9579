//! Element-matching priorities and end-screen detection for walks.
//!
//! The ordering of [`SELECTION_STRATEGIES`] and [`ADVANCE_CONTROLS`] is part of
//! the auditing contract: earlier entries win when several match.

/// Phrases (lowercase) that mark a completion or disqualification screen.
pub const TERMINATION_PHRASES: [&str; 5] = [
    "thank you",
    "recorded",
    "unfortunately",
    "disqualified",
    "completed",
];

/// How an option label is matched against page elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelStrategy {
    /// Element whose whole visible text equals the label.
    ExactText,
    /// `<label>` containing the label text.
    LabelContains,
    /// `<button>` containing the label text.
    ButtonContains,
    /// `<span>` containing the label text.
    SpanContains,
    /// `aria-label` attribute containing the label text.
    AriaLabelContains,
    /// `role=radio` or `role=checkbox` element containing the label text.
    RoleOptionContains,
}

pub const SELECTION_STRATEGIES: [LabelStrategy; 6] = [
    LabelStrategy::ExactText,
    LabelStrategy::LabelContains,
    LabelStrategy::ButtonContains,
    LabelStrategy::SpanContains,
    LabelStrategy::AriaLabelContains,
    LabelStrategy::RoleOptionContains,
];

/// Element query understood by a UI actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator<'a> {
    Label {
        strategy: LabelStrategy,
        text: &'a str,
    },
    /// CSS selector.
    Css(&'a str),
    /// `<button>` (or submit `<input>`) whose text contains the value, case-insensitively.
    ButtonText(&'a str),
}

/// Controls that move the survey to its next page.
pub const ADVANCE_CONTROLS: [Locator<'static>; 7] = [
    Locator::Css("#NextButton"),
    Locator::Css("#next-button"),
    Locator::Css("[aria-label=\"Next\"]"),
    Locator::ButtonText("Next page"),
    Locator::ButtonText("Next"),
    Locator::Css(".NextButton"),
    Locator::Css("input[value=\"Next\"]"),
];

/// Locators for one label, in priority order.
pub fn label_locators(text: &str) -> impl Iterator<Item = Locator<'_>> {
    SELECTION_STRATEGIES
        .into_iter()
        .map(move |strategy| Locator::Label { strategy, text })
}

/// True if the page text shows a completion or disqualification screen.
pub fn is_end_screen(page_text: &str) -> bool {
    let lowered = page_text.to_lowercase();
    TERMINATION_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
}

/// Identity of an on-screen control within one session.
///
/// Two controls with identical text are told apart by vertical position.
pub fn fingerprint(text: &str, top: f64) -> String {
    format!("{}@{}", text.trim(), top.round() as i64)
}
