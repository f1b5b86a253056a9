//! Prompt template loading, rendering and system-prompt extraction.

use crate::error::{InferError, Result};
use std::{fs, path::Path};

pub const DEFAULT_TEMPLATE_PATH: &str = "configs/prompt_template.txt";
pub const INPUT_PLACEHOLDER: &str = "{{input}}";
pub const SYSTEM_TAG: &str = "<|system|>";
pub const USER_TAG: &str = "<|user|>";
pub const FALLBACK_SYSTEM_PROMPT: &str = "You are a careful clinical assistant. Be concise.";

/// Reads the template at `path`. Not cached: edits on disk are picked up by the next call.
pub fn load<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|source| InferError::Template {
        path: path.to_path_buf(),
        source,
    })
}

/// Replaces every `{{input}}` with `user_input`, verbatim.
pub fn render(template: &str, user_input: &str) -> String {
    template.replace(INPUT_PLACEHOLDER, user_input)
}

/// Returns the trimmed text between the first `<|system|>` and the first
/// `<|user|>` that follows it, or [`FALLBACK_SYSTEM_PROMPT`].
pub fn extract_system(template: &str) -> String {
    let Some(sys_at) = template.find(SYSTEM_TAG) else {
        tracing::debug!("template has no system tag; using fallback system prompt");
        return FALLBACK_SYSTEM_PROMPT.to_string();
    };
    let body = &template[sys_at + SYSTEM_TAG.len()..];
    match body.find(USER_TAG) {
        Some(end) => body[..end].trim().to_string(),
        None => {
            tracing::debug!("template has no user tag after system tag; using fallback system prompt");
            FALLBACK_SYSTEM_PROMPT.to_string()
        }
    }
}

/// Marker presence, checked once when the proxy starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateShape {
    pub has_system: bool,
    pub has_user: bool,
}

impl TemplateShape {
    pub fn inspect(template: &str) -> Self {
        Self {
            has_system: template.contains(SYSTEM_TAG),
            has_user: template.contains(USER_TAG),
        }
    }

    pub fn is_chat_ready(&self) -> bool {
        self.has_system && self.has_user
    }
}

/// Logs a warning if the template cannot be read or lacks the chat markers.
pub fn warn_if_malformed<P: AsRef<Path>>(path: P) {
    match load(&path) {
        Ok(template) => {
            let shape = TemplateShape::inspect(&template);
            if !shape.is_chat_ready() {
                tracing::warn!(
                    system = shape.has_system,
                    user = shape.has_user,
                    "prompt template missing expected tags"
                );
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to read prompt template"),
    }
}
