//! # Deckforge Models
//!
//! Request types shared by the coordinator, the upstream backend and the
//! server, plus the upstream connection configuration.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Visual style requested for the document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    #[default]
    Business,
    Academic,
    Creative,
    Minimal,
    Technical,
}

impl Style {
    /// Get all available styles
    pub fn all() -> Vec<Style> {
        vec![
            Style::Business,
            Style::Academic,
            Style::Creative,
            Style::Minimal,
            Style::Technical,
        ]
    }

    /// Display name for prompts and UI
    pub fn display_name(&self) -> &'static str {
        match self {
            Style::Business => "Business",
            Style::Academic => "Academic",
            Style::Creative => "Creative",
            Style::Minimal => "Minimal",
            Style::Technical => "Technical",
        }
    }
}

/// Color scheme requested for rendered artifacts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    #[default]
    Blue,
    Green,
    Purple,
    Dark,
    Light,
}

impl ColorScheme {
    pub fn all() -> Vec<ColorScheme> {
        vec![
            ColorScheme::Blue,
            ColorScheme::Green,
            ColorScheme::Purple,
            ColorScheme::Dark,
            ColorScheme::Light,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ColorScheme::Blue => "Blue",
            ColorScheme::Green => "Green",
            ColorScheme::Purple => "Purple",
            ColorScheme::Dark => "Dark",
            ColorScheme::Light => "Light",
        }
    }
}

fn default_section_count_hint() -> u32 {
    8
}

/// Inbound request for one `generate()` call
///
/// ## Example
/// ```rust,ignore
/// use deckforge_core::models::{ColorScheme, GenerationRequest, Style};
///
/// let request = GenerationRequest::new("Quarterly Review")
///     .with_style(Style::Business)
///     .with_color_scheme(ColorScheme::Dark)
///     .with_section_count_hint(6);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    /// Free-form subject of the document (required, non-empty)
    pub subject: String,
    #[serde(default)]
    pub style: Style,
    #[serde(default)]
    pub color_scheme: ColorScheme,
    /// Desired number of sections; advisory only
    #[serde(default = "default_section_count_hint")]
    pub section_count_hint: u32,
}

impl GenerationRequest {
    /// Create a request with default style, colors and section hint
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            style: Style::default(),
            color_scheme: ColorScheme::default(),
            section_count_hint: default_section_count_hint(),
        }
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn with_color_scheme(mut self, color_scheme: ColorScheme) -> Self {
        self.color_scheme = color_scheme;
        self
    }

    pub fn with_section_count_hint(mut self, hint: u32) -> Self {
        self.section_count_hint = hint;
        self
    }

    /// Reject requests that must never open a connection
    pub fn validate(&self) -> Result<()> {
        if self.subject.trim().is_empty() {
            return Err(PipelineError::Validation(
                "subject must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Body of the primary (outline) stream request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutlineRequest {
    /// Fixed instruction text from the template collaborator
    pub instructions: String,
    pub subject: String,
    pub style: Style,
    pub color_scheme: ColorScheme,
    pub section_count_hint: u32,
}

/// Body of one secondary (section) stream request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionRequest {
    pub instructions: String,
    pub section_text: String,
    pub section_index: usize,
    pub total_sections: usize,
    pub style: Style,
    pub color_scheme: ColorScheme,
}

/// Connection settings for the upstream generation service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL, e.g. "https://api.example.com/v1"
    pub base_url: String,
    /// Path of the outline stream endpoint
    pub outline_path: String,
    /// Path of the per-section stream endpoint
    pub section_path: String,
    /// Model name forwarded to the service
    pub model: String,
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    /// Environment variable holding the API key
    pub api_key_env: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8787/v1".to_string(),
            outline_path: "/outline/stream".to_string(),
            section_path: "/section/stream".to_string(),
            model: "deckforge-default".to_string(),
            timeout_secs: 300,
            api_key_env: "DECKFORGE_API_KEY".to_string(),
        }
    }
}

impl UpstreamConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Full URL of the outline endpoint
    pub fn outline_url(&self) -> String {
        join_url(&self.base_url, &self.outline_path)
    }

    /// Full URL of the section endpoint
    pub fn section_url(&self) -> String {
        join_url(&self.base_url, &self.section_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
