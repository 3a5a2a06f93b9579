//! UI actor abstraction used by the walk executor.
//!
//! The [`UiActor`] trait decouples walk orchestration from the browser
//! automation backend (currently W3C WebDriver, see [`crate::io::webdriver`]).
//! Tests use scripted actors that simulate a survey without a browser.

use std::time::Duration;

use anyhow::Result;

use crate::core::matchers::Locator;

/// Opaque handle to an element located in the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

/// Visible text and vertical position of an element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementInfo {
    pub text: String,
    pub top: f64,
}

/// Outcome of a bounded wait for the page to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    Settled,
    /// The wait expired; callers continue and count it as a soft timeout.
    TimedOut,
}

/// One live UI session.
pub trait UiActor {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Full visible text of the current page.
    fn visible_text(&mut self) -> Result<String>;

    /// All elements matching `locator`, in document order.
    fn locate(&mut self, locator: &Locator<'_>) -> Result<Vec<ElementRef>>;

    fn is_visible(&mut self, element: &ElementRef) -> Result<bool>;

    fn describe(&mut self, element: &ElementRef) -> Result<ElementInfo>;

    fn click(&mut self, element: &ElementRef) -> Result<()>;

    fn wait_settled(&mut self, timeout: Duration) -> Result<Settle>;

    /// Give host-page scripts time to react to an interaction.
    fn pause(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Release the session. Called exactly once per opened session.
    fn close(&mut self) -> Result<()>;
}

/// Opens isolated UI sessions, one per walk.
pub trait SessionFactory {
    type Session: UiActor;

    fn open(&self) -> Result<Self::Session>;
}

/// Owns an open session and closes it on every exit path.
///
/// Prefer [`SessionGuard::release`] to observe close errors; dropping an
/// unreleased guard closes the session and logs any failure.
pub struct SessionGuard<S: UiActor> {
    session: S,
    released: bool,
}

impl<S: UiActor> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            released: false,
        }
    }

    pub fn actor(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.session.close()
    }
}

impl<S: UiActor> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.session.close() {
            tracing::warn!(err = %err, "failed to close ui session");
        }
    }
}
