//! Section-by-section extraction into one logic graph.
//!
//! Sections are extracted strictly in order. A failed section leaves the
//! sections already accepted untouched so the caller can retry it.

use anyhow::{Result, bail};
use tracing::{info, instrument, warn};

use crate::graph::{LogicGraph, Question};
use crate::io::extract::{ExtractRequest, Extractor, extract_section};

/// A section's origin label and content.
#[derive(Debug, Clone)]
pub struct SectionSource {
    pub label: String,
    pub content: String,
}

/// Accumulates extracted sections for a survey split into `total` parts.
#[derive(Debug)]
pub struct Stitcher {
    total: usize,
    sections: Vec<Vec<Question>>,
}

impl Stitcher {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            sections: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// 1-based index of the section expected next.
    pub fn next_section(&self) -> usize {
        self.sections.len() + 1
    }

    pub fn accepted(&self) -> usize {
        self.sections.len()
    }

    pub fn is_complete(&self) -> bool {
        self.sections.len() == self.total
    }

    /// Questions accepted so far, in section order.
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.sections.iter().flatten()
    }

    /// Extract the next section and accept it on success.
    #[instrument(skip_all, fields(section = self.next_section(), total = self.total))]
    pub fn extract_next<E: Extractor + ?Sized>(
        &mut self,
        extractor: &E,
        source: &SectionSource,
    ) -> Result<usize> {
        if self.is_complete() {
            bail!("all {} sections are already extracted", self.total);
        }
        let request = ExtractRequest {
            section: self.next_section(),
            total: self.total,
            source: source.label.clone(),
            content: source.content.clone(),
        };
        let questions = extract_section(extractor, &request)?;
        let count = questions.len();
        self.sections.push(questions);
        info!(questions = count, "section accepted");
        Ok(count)
    }

    /// Build the graph from the accepted sections.
    pub fn finish(self) -> Result<LogicGraph> {
        if self.sections.is_empty() {
            bail!("no sections extracted");
        }
        if !self.is_complete() {
            warn!(
                accepted = self.sections.len(),
                total = self.total,
                "building graph from a partial extraction"
            );
        }
        LogicGraph::stitch(self.sections)
    }
}
