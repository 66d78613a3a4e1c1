//! Default prompt templates bundled at compile time.
//!
//! The template collaborator supplies the fixed instruction text merged into
//! both stream requests. Placeholders use `{{name}}` syntax.

use crate::models::{GenerationRequest, OutlineRequest, SectionRequest};

/// Outline - turns a subject into delimiter-separated sections
pub const OUTLINE: &str = include_str!("defaults/outline.md");

/// Section - renders one outline section into an artifact
pub const SECTION: &str = include_str!("defaults/section.md");

/// Source of instruction text for upstream requests
pub trait PromptTemplates: Send + Sync {
    /// Template for the outline stream
    fn outline(&self) -> &str;

    /// Template for each section stream
    fn section(&self) -> &str;
}

/// Templates compiled into the binary
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTemplates;

impl PromptTemplates for DefaultTemplates {
    fn outline(&self) -> &str {
        OUTLINE
    }

    fn section(&self) -> &str {
        SECTION
    }
}

/// Replace every `{{key}}` in `template` with its value
pub fn render(template: &str, vars: &[(&str, String)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{}}}}}", key), value)
    })
}

/// Build the outline request body for a generation request
pub fn outline_request(templates: &dyn PromptTemplates, request: &GenerationRequest) -> OutlineRequest {
    let instructions = render(
        templates.outline(),
        &[
            ("subject", request.subject.clone()),
            ("style", request.style.display_name().to_string()),
            ("color_scheme", request.color_scheme.display_name().to_string()),
            ("section_count", request.section_count_hint.to_string()),
        ],
    );

    OutlineRequest {
        instructions,
        subject: request.subject.clone(),
        style: request.style,
        color_scheme: request.color_scheme,
        section_count_hint: request.section_count_hint,
    }
}

/// Build the request body for section `index` of `total`
pub fn section_request(
    templates: &dyn PromptTemplates,
    request: &GenerationRequest,
    section_text: &str,
    index: usize,
    total: usize,
) -> SectionRequest {
    let instructions = render(
        templates.section(),
        &[
            ("section_index", (index + 1).to_string()),
            ("total_sections", total.to_string()),
            ("style", request.style.display_name().to_string()),
            ("color_scheme", request.color_scheme.display_name().to_string()),
            ("section_text", section_text.to_string()),
        ],
    );

    SectionRequest {
        instructions,
        section_text: section_text.to_string(),
        section_index: index,
        total_sections: total,
        style: request.style,
        color_scheme: request.color_scheme,
    }
}
