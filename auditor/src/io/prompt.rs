//! Extraction prompt builder.

use anyhow::{Context, Result, bail};
use minijinja::{Environment, context};

use crate::core::destination::Terminal;
use crate::io::extract::ExtractRequest;

const EXTRACT_TEMPLATE: &str = include_str!("prompts/extract.md");

/// Id namespace for section `section` (1-based): `S{section}`.
pub fn section_prefix(section: usize) -> String {
    format!("S{section}")
}

/// Where the last question of `section` continues: the next section's first
/// question, or `SUBMIT` after the final section.
pub fn section_exit_id(section: usize, total: usize) -> String {
    if section < total {
        format!("{}_Q1", section_prefix(section + 1))
    } else {
        Terminal::Submit.as_str().to_string()
    }
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("extract", EXTRACT_TEMPLATE)
            .context("load extract template")?;
        Ok(Self { env })
    }

    fn render_extract(&self, request: &ExtractRequest) -> Result<String> {
        let template = self.env.get_template("extract")?;
        let rendered = template.render(context! {
            section => request.section,
            total => request.total,
            prefix => section_prefix(request.section),
            exit_id => section_exit_id(request.section, request.total),
            source => (!request.source.trim().is_empty()).then(|| request.source.trim()),
            content => request.content.trim(),
        })?;
        Ok(rendered)
    }
}

/// Render the extraction prompt for one section.
pub fn build_extract_prompt(request: &ExtractRequest) -> Result<String> {
    if request.section == 0 || request.section > request.total {
        bail!(
            "section index {} out of range 1..={}",
            request.section,
            request.total
        );
    }
    if request.content.trim().is_empty() {
        bail!("section {} has no content", request.section);
    }
    PromptEngine::new()?.render_extract(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(section: usize, total: usize) -> ExtractRequest {
        ExtractRequest {
            section,
            total,
            source: "screener.html".to_string(),
            content: "<p>Q1. How old are you? Under 18 [TERMINATE]</p>".to_string(),
        }
    }

    #[test]
    fn middle_section_links_to_next_section() {
        let prompt = build_extract_prompt(&request(2, 3)).expect("render");
        assert!(prompt.contains("This is section 2 of 3."));
        assert!(prompt.contains("`S2_Q1`"));
        assert!(prompt.contains("go to `S3_Q1`"));
        assert!(prompt.contains("(screener.html)"));
        assert!(prompt.contains("Under 18 [TERMINATE]"));
    }

    #[test]
    fn last_section_exits_to_submit() {
        assert_eq!(section_exit_id(3, 3), "SUBMIT");
        let prompt = build_extract_prompt(&request(3, 3)).expect("render");
        assert!(prompt.contains("go to `SUBMIT`"));
    }

    #[test]
    fn rejects_out_of_range_and_empty_sections() {
        assert!(build_extract_prompt(&request(0, 3)).is_err());
        assert!(build_extract_prompt(&request(4, 3)).is_err());
        let mut empty = request(1, 1);
        empty.content = "   ".to_string();
        assert!(build_extract_prompt(&empty).is_err());
    }
}
