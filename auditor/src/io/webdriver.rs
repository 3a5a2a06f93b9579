//! UI actor speaking the W3C WebDriver HTTP protocol.
//!
//! Works against any WebDriver server (chromedriver, geckodriver). One
//! WebDriver session is created per walk and deleted on close.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::core::matchers::{LabelStrategy, Locator};
use crate::io::actor::{ElementInfo, ElementRef, SessionFactory, Settle, UiActor};
use crate::io::config::WebDriverConfig;

/// Key under which W3C WebDriver serializes element references.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const SETTLE_POLL: Duration = Duration::from_millis(250);

const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";

const VISIBLE_TEXT_SCRIPT: &str = "return document.body ? document.body.innerText : '';";
const DESCRIBE_SCRIPT: &str = "const r = arguments[0].getBoundingClientRect(); \
     return { text: (arguments[0].innerText || arguments[0].value || '').trim(), top: r.top + window.scrollY };";
const SCROLL_SCRIPT: &str = "arguments[0].scrollIntoView({block: 'center', inline: 'nearest'});";
const JS_CLICK_SCRIPT: &str = "arguments[0].click();";
const SETTLE_SCRIPT: &str = "return [document.readyState, \
     (window.performance && performance.getEntriesByType) ? performance.getEntriesByType('resource').length : 0];";

/// Error reported by the WebDriver server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebDriverError {
    pub status: u16,
    pub error: String,
    pub message: String,
}

impl WebDriverError {
    fn from_body(status: u16, body: &Value) -> Self {
        let value = body.get("value").unwrap_or(&Value::Null);
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            status,
            error: text("error"),
            message: text("message"),
        }
    }
}

impl fmt::Display for WebDriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Driver messages can carry multi-line stack traces.
        let message = self.message.lines().next().unwrap_or_default();
        write!(f, "webdriver {} ({}): {}", self.error, self.status, message)
    }
}

impl std::error::Error for WebDriverError {}

/// Opens a fresh browser session per walk.
pub struct WebDriverFactory {
    client: Client,
    config: WebDriverConfig,
}

impl WebDriverFactory {
    pub fn new(config: WebDriverConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("build webdriver http client")?;
        Ok(Self { client, config })
    }
}

impl SessionFactory for WebDriverFactory {
    type Session = WebDriverSession;

    #[instrument(skip_all, fields(driver = %self.config.url, browser = %self.config.browser))]
    fn open(&self) -> Result<WebDriverSession> {
        let base = self.config.url.trim_end_matches('/').to_string();
        let body = json!({ "capabilities": capabilities(&self.config) });
        let value = send(
            self.client.post(format!("{base}/session")).json(&body),
            "new session",
        )?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("webdriver new session response missing sessionId"))?
            .to_string();
        debug!(session = %id, "webdriver session opened");

        let mut session = WebDriverSession {
            client: self.client.clone(),
            base,
            id,
            request_timeout: Duration::from_secs(self.config.request_timeout_secs),
            closed: false,
        };
        let rect = json!({
            "width": self.config.window_width,
            "height": self.config.window_height,
        });
        if let Err(err) = session.command_post("window/rect", &rect, "set window rect") {
            // Headless drivers may refuse resizing; the launch args still apply.
            debug!(err = %err, "window rect not applied");
        }
        Ok(session)
    }
}

/// W3C capabilities for the configured browser.
pub fn capabilities(config: &WebDriverConfig) -> Value {
    let mut args = config.args.clone();
    let options_key = match config.browser.as_str() {
        "firefox" => {
            if config.headless {
                args.push("-headless".to_string());
            }
            "moz:firefoxOptions"
        }
        _ => {
            if config.headless {
                args.push("--headless=new".to_string());
            }
            args.push(format!(
                "--window-size={},{}",
                config.window_width, config.window_height
            ));
            "goog:chromeOptions"
        }
    };
    let mut always_match = serde_json::Map::new();
    always_match.insert("browserName".to_string(), json!(config.browser));
    always_match.insert("pageLoadStrategy".to_string(), json!("normal"));
    always_match.insert(options_key.to_string(), json!({ "args": args }));
    json!({ "alwaysMatch": Value::Object(always_match) })
}

/// One live WebDriver session.
pub struct WebDriverSession {
    client: Client,
    base: String,
    id: String,
    request_timeout: Duration,
    closed: bool,
}

impl WebDriverSession {
    fn url(&self, command: &str) -> String {
        format!("{}/session/{}/{}", self.base, self.id, command)
    }

    fn command_post(&mut self, command: &str, body: &Value, what: &str) -> Result<Value> {
        send(self.client.post(self.url(command)).json(body), what)
    }

    fn command_get(&mut self, command: &str, what: &str) -> Result<Value> {
        send(self.client.get(self.url(command)), what)
    }

    fn execute(&mut self, script: &str, args: Vec<Value>) -> Result<Value> {
        let body = json!({ "script": script, "args": args });
        self.command_post("execute/sync", &body, "execute script")
    }
}

impl UiActor for WebDriverSession {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.command_post("timeouts", &json!({ "pageLoad": millis }), "set timeouts")?;
        // The HTTP request must outlive the page-load timeout it waits on.
        let request = self
            .client
            .post(self.url("url"))
            .timeout(timeout + self.request_timeout)
            .json(&json!({ "url": url }));
        send(request, "navigate")?;
        Ok(())
    }

    fn visible_text(&mut self) -> Result<String> {
        let value = self.execute(VISIBLE_TEXT_SCRIPT, Vec::new())?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn locate(&mut self, locator: &Locator<'_>) -> Result<Vec<ElementRef>> {
        let (using, query) = locator_query(locator);
        let value = self.command_post(
            "elements",
            &json!({ "using": using, "value": query }),
            "find elements",
        )?;
        let found: Vec<ElementRef> = value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get(ELEMENT_KEY).and_then(Value::as_str))
                    .map(|id| ElementRef(id.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(found)
    }

    fn is_visible(&mut self, element: &ElementRef) -> Result<bool> {
        let value = self.command_get(&format!("element/{}/displayed", element.0), "is displayed")?;
        Ok(value.as_bool().unwrap_or(false))
    }

    fn describe(&mut self, element: &ElementRef) -> Result<ElementInfo> {
        let value = self.execute(DESCRIBE_SCRIPT, vec![element_arg(element)])?;
        Ok(ElementInfo {
            text: value
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            top: value.get("top").and_then(Value::as_f64).unwrap_or_default(),
        })
    }

    fn click(&mut self, element: &ElementRef) -> Result<()> {
        if let Err(err) = self.execute(SCROLL_SCRIPT, vec![element_arg(element)]) {
            debug!(err = %err, "scroll into view failed");
        }
        let native = self.command_post(
            &format!("element/{}/click", element.0),
            &json!({}),
            "click element",
        );
        if let Err(err) = native {
            // Overlays and custom widgets intercept native clicks.
            debug!(err = %err, "native click failed, dispatching script click");
            self.execute(JS_CLICK_SCRIPT, vec![element_arg(element)])
                .context("script click")?;
        }
        Ok(())
    }

    fn wait_settled(&mut self, timeout: Duration) -> Result<Settle> {
        poll_settled(timeout, SETTLE_POLL, || {
            self.execute(SETTLE_SCRIPT, Vec::new())
        })
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let url = format!("{}/session/{}", self.base, self.id);
        send(self.client.delete(url), "delete session").map(|_| ())
    }
}

/// Poll `read_state` until the page reports `complete` with a stable resource
/// count, or until `timeout` passes.
///
/// Script failures while the page is mid-navigation count as "not settled";
/// only failures of the session itself are returned.
fn poll_settled<P>(timeout: Duration, interval: Duration, mut read_state: P) -> Result<Settle>
where
    P: FnMut() -> Result<Value>,
{
    let deadline = Instant::now() + timeout;
    let mut last_count = None;
    loop {
        match read_state() {
            Ok(value) => {
                let ready = value.get(0).and_then(Value::as_str) == Some("complete");
                let count = value.get(1).and_then(Value::as_u64);
                if ready && count.is_some() && count == last_count {
                    return Ok(Settle::Settled);
                }
                last_count = count;
            }
            Err(err) if is_session_failure(&err) => return Err(err),
            Err(err) => {
                debug!(err = %err, "settle check failed, page still loading");
                last_count = None;
            }
        }
        if Instant::now() >= deadline {
            return Ok(Settle::TimedOut);
        }
        thread::sleep(interval);
    }
}

/// True if `err` means the session is gone rather than a script failed.
///
/// Transport failures (driver unreachable) also count as session failures.
pub fn is_session_failure(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<WebDriverError>() {
        Some(driver) => matches!(
            driver.error.as_str(),
            "invalid session id" | "no such window" | "session not created"
        ),
        None => true,
    }
}

fn send(request: RequestBuilder, what: &str) -> Result<Value> {
    let response = request
        .send()
        .with_context(|| format!("webdriver {what} request"))?;
    let status = response.status();
    let mut body: Value = response
        .json()
        .with_context(|| format!("decode webdriver {what} response"))?;
    if !status.is_success() {
        let err = WebDriverError::from_body(status.as_u16(), &body);
        warn!(what, status = status.as_u16(), error = %err.error, "webdriver command failed");
        return Err(anyhow::Error::new(err).context(format!("webdriver {what}")));
    }
    Ok(body.get_mut("value").map(Value::take).unwrap_or(Value::Null))
}

fn element_arg(element: &ElementRef) -> Value {
    json!({ ELEMENT_KEY: element.0 })
}

/// XPath string literal for arbitrary text, using `concat()` when the text
/// holds both quote kinds.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{text}'");
    }
    if !text.contains('"') {
        return format!("\"{text}\"");
    }
    let parts: Vec<String> = text
        .split('\'')
        .map(|part| format!("'{part}'"))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// Single-character lowercase of `c`, if it has one.
fn lower_char(c: char) -> Option<char> {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => Some(l),
        _ => None,
    }
}

/// Single-character uppercase of `c`, if it has one.
fn upper_char(c: char) -> Option<char> {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => Some(u),
        _ => None,
    }
}

/// XPath `translate()` tables plus the folded needle.
///
/// XPath 1.0 has no `lower-case()`, so `translate()` only folds the letters
/// listed. Non-ASCII letters of the needle are added to the ASCII tables so
/// both sides of `contains()` fold the same way.
fn fold_tables(needle: &str) -> (String, String, String) {
    let mut upper = UPPER.to_string();
    let mut lower = LOWER.to_string();
    let mut folded = String::with_capacity(needle.len());
    for c in needle.trim().chars() {
        if c.is_ascii() {
            folded.push(c.to_ascii_lowercase());
            continue;
        }
        match (lower_char(c), upper_char(c)) {
            (Some(l), Some(u)) if l != u => {
                if !upper.contains(u) {
                    upper.push(u);
                    lower.push(l);
                }
                folded.push(l);
            }
            _ => folded.push(c),
        }
    }
    (upper, lower, folded)
}

fn contains_ci(expr: &str, needle: &str) -> String {
    let (upper, lower, folded) = fold_tables(needle);
    format!(
        "contains(translate({expr}, {}, {}), {})",
        xpath_literal(&upper),
        xpath_literal(&lower),
        xpath_literal(&folded)
    )
}

/// WebDriver location strategy and query for a locator.
pub fn locator_query(locator: &Locator<'_>) -> (&'static str, String) {
    match *locator {
        Locator::Css(selector) => ("css selector", selector.to_string()),
        Locator::ButtonText(text) => (
            "xpath",
            format!(
                "//button[{text_match}] | //input[(@type='submit' or @type='button') and {value_match}] | //*[@role='button' and {text_match}]",
                text_match = contains_ci("normalize-space(.)", text),
                value_match = contains_ci("@value", text),
            ),
        ),
        Locator::Label { strategy, text } => {
            let query = match strategy {
                LabelStrategy::ExactText => {
                    let literal = xpath_literal(text.trim());
                    format!(
                        "//body//*[normalize-space(.)={literal} and not(*[normalize-space(.)={literal}])]"
                    )
                }
                LabelStrategy::LabelContains => {
                    format!("//label[{}]", contains_ci("normalize-space(.)", text))
                }
                LabelStrategy::ButtonContains => {
                    format!("//button[{}]", contains_ci("normalize-space(.)", text))
                }
                LabelStrategy::SpanContains => {
                    format!("//span[{}]", contains_ci("normalize-space(.)", text))
                }
                LabelStrategy::AriaLabelContains => {
                    format!("//*[@aria-label and {}]", contains_ci("@aria-label", text))
                }
                LabelStrategy::RoleOptionContains => format!(
                    "//*[(@role='radio' or @role='checkbox') and {}]",
                    contains_ci("normalize-space(.)", text)
                ),
            };
            ("xpath", query)
        }
    }
}
