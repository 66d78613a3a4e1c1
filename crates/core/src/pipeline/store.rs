//! # Result Store
//!
//! Ordered, index-addressed section results. Every write names the index it
//! targets; nothing ever replaces the whole collection, so completions from
//! different sections cannot overwrite each other.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Status of one section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    /// Discovered, not yet eligible for generation
    Pending,
    /// Generation task in flight
    Dispatched,
    Ready,
    Failed,
}

impl SectionStatus {
    /// Ready or Failed
    pub fn is_resolved(self) -> bool {
        matches!(self, SectionStatus::Ready | SectionStatus::Failed)
    }
}

/// One section of the document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub index: usize,
    /// Outline text this section was generated from
    pub source_text: String,
    pub status: SectionStatus,
    #[serde(default)]
    pub artifact: Option<String>,
    /// Interim text shown while the section is generating
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Section {
    fn pending(index: usize, source_text: String) -> Self {
        Self {
            index,
            source_text,
            status: SectionStatus::Pending,
            artifact: None,
            placeholder: None,
            error: None,
        }
    }

    /// The value an observer should render for this section
    pub fn display_value(&self) -> &str {
        match self.status {
            SectionStatus::Ready => self.artifact.as_deref().unwrap_or_default(),
            SectionStatus::Failed => self.error.as_deref().unwrap_or_default(),
            SectionStatus::Pending | SectionStatus::Dispatched => {
                self.placeholder.as_deref().unwrap_or_default()
            }
        }
    }
}

/// Value written into a section slot
#[derive(Debug, Clone, PartialEq)]
pub enum SectionValue {
    /// Generation started; carries the placeholder text
    Placeholder(String),
    /// Finished artifact
    Artifact(String),
    /// Failure message
    Error(String),
}

/// Human-readable placeholder for section `index` of `total`
pub fn placeholder_text(index: usize, total: usize) -> String {
    format!("Generating section {} of {}...", index + 1, total.max(index + 1))
}

/// Ordered collection of sections
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    sections: Vec<Section>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Append a pending section and return its index
    pub fn append(&mut self, source_text: impl Into<String>) -> usize {
        let index = self.sections.len();
        self.sections.push(Section::pending(index, source_text.into()));
        index
    }

    /// Write `value` at `index`
    pub fn upsert(&mut self, index: usize, value: SectionValue) -> Result<()> {
        let len = self.sections.len();
        let section = self
            .sections
            .get_mut(index)
            .ok_or(PipelineError::IndexOutOfRange { index, len })?;

        match value {
            SectionValue::Placeholder(text) => {
                section.status = SectionStatus::Dispatched;
                section.placeholder = Some(text);
                section.error = None;
            }
            SectionValue::Artifact(artifact) => {
                section.status = SectionStatus::Ready;
                section.artifact = Some(artifact);
                section.placeholder = None;
                section.error = None;
            }
            SectionValue::Error(message) => {
                section.status = SectionStatus::Failed;
                section.error = Some(message);
                section.placeholder = None;
            }
        }
        Ok(())
    }

    /// Replace the outline text of a section that has not been dispatched
    pub fn update_source(&mut self, index: usize, source_text: &str) -> bool {
        match self.sections.get_mut(index) {
            Some(section)
                if section.status == SectionStatus::Pending && section.source_text != source_text =>
            {
                section.source_text = source_text.to_string();
                true
            }
            _ => false,
        }
    }

    /// Drop trailing pending sections beyond `len`
    pub fn truncate_pending(&mut self, len: usize) -> usize {
        let mut removed = 0;
        while self.sections.len() > len
            && self
                .sections
                .last()
                .is_some_and(|s| s.status == SectionStatus::Pending)
        {
            self.sections.pop();
            removed += 1;
        }
        removed
    }

    /// Remove `index` and renumber every later section
    pub fn delete(&mut self, index: usize) -> Result<Section> {
        let len = self.sections.len();
        if index >= len {
            return Err(PipelineError::IndexOutOfRange { index, len });
        }
        let removed = self.sections.remove(index);
        for section in self.sections.iter_mut().skip(index) {
            section.index -= 1;
        }
        Ok(removed)
    }

    /// Number of Ready or Failed sections
    pub fn resolved_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| s.status.is_resolved())
            .count()
    }

    /// Number of sections with a task in flight
    pub fn in_flight_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| s.status == SectionStatus::Dispatched)
            .count()
    }
}
