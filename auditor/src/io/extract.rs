//! Extractor abstraction for turning survey sections into logic JSON.
//!
//! The [`Extractor`] trait decouples stitching from the language model
//! backend (any CLI that reads a prompt on stdin and prints JSON). Tests use
//! scripted extractors that return canned responses without spawning
//! processes.

use std::fmt;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::graph::{LogicMap, Question};
use crate::io::config::ExtractorConfig;
use crate::io::logic_store::validate_logic_value;
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::build_extract_prompt;

/// One section handed to an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    /// 1-based section index.
    pub section: usize,
    pub total: usize,
    /// Human label for the section's origin (usually a file name).
    pub source: String,
    /// Section text or HTML.
    pub content: String,
}

/// Abstraction over extraction backends.
pub trait Extractor {
    /// Return the raw response for one section.
    fn extract(&self, request: &ExtractRequest) -> Result<String>;
}

/// Extractor that pipes the rendered prompt into a configured command.
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandExtractor {
    pub fn from_config(config: &ExtractorConfig) -> Result<Self> {
        let (program, args) = config.command.split_first().ok_or_else(|| {
            anyhow!("extractor.command is not configured; set it in the config file")
        })?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        })
    }
}

impl Extractor for CommandExtractor {
    #[instrument(skip_all, fields(section = request.section, program = %self.program))]
    fn extract(&self, request: &ExtractRequest) -> Result<String> {
        let prompt = build_extract_prompt(request)?;
        info!(prompt_bytes = prompt.len(), "starting extractor");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run extractor {}", self.program))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "extractor timed out");
            return Err(anyhow!("extractor timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "extractor failed");
            return Err(anyhow!(
                "extractor failed with status {:?}: {}",
                output.status.code(),
                output.stderr_summary()
            ));
        }
        if output.stdout_truncated > 0 {
            return Err(anyhow!(
                "extractor output exceeded {} bytes",
                self.output_limit_bytes
            ));
        }

        debug!(stdout_bytes = output.stdout.len(), "extractor completed");
        Ok(output.stdout_text())
    }
}

/// Why a section's response was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionFailure {
    MalformedJson(String),
    Schema(String),
    NoQuestions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionError {
    pub section: usize,
    pub failure: ExtractionFailure,
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            ExtractionFailure::MalformedJson(err) => {
                write!(f, "Section {} returned malformed JSON: {}", self.section, err)
            }
            ExtractionFailure::Schema(err) => {
                write!(f, "Section {} does not match the logic schema: {}", self.section, err)
            }
            ExtractionFailure::NoQuestions => {
                write!(f, "Section {} returned no questions", self.section)
            }
        }
    }
}

impl std::error::Error for ExtractionError {}

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    static FENCE_RE: LazyLock<Option<Regex>> =
        LazyLock::new(|| Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").ok());
    FENCE_RE
        .as_ref()
        .and_then(|re| re.captures(raw))
        .and_then(|caps| caps.get(1))
        .map_or_else(|| raw.trim(), |inner| inner.as_str().trim())
}

/// Parse one section's response into its questions.
pub fn parse_section(section: usize, raw: &str) -> Result<Vec<Question>, ExtractionError> {
    let fail = |failure| ExtractionError { section, failure };
    let body = strip_code_fence(raw);
    let value: Value = serde_json::from_str(body)
        .map_err(|err| fail(ExtractionFailure::MalformedJson(err.to_string())))?;
    validate_logic_value(&value).map_err(|err| fail(ExtractionFailure::Schema(format!("{err:#}"))))?;
    let map: LogicMap = serde_json::from_value(value)
        .map_err(|err| fail(ExtractionFailure::Schema(err.to_string())))?;
    if map.questions.is_empty() {
        return Err(fail(ExtractionFailure::NoQuestions));
    }
    Ok(map.questions)
}

/// Run the extractor for one section and parse its response.
#[instrument(skip_all, fields(section = request.section, total = request.total))]
pub fn extract_section<E: Extractor + ?Sized>(
    extractor: &E,
    request: &ExtractRequest,
) -> Result<Vec<Question>> {
    let raw = extractor
        .extract(request)
        .with_context(|| format!("extract section {}", request.section))?;
    let questions = parse_section(request.section, &raw)?;
    info!(questions = questions.len(), "section extracted");
    Ok(questions)
}
