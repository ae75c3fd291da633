//! Prompts and the generation client trait.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::deadline::Deadline;
use crate::error::{RagError, Result};

/// The author of a prompt turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(role, text)` turn of a [`Prompt`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenerationParams {
    /// Maximum number of tokens to generate. Must be positive.
    pub max_tokens: u32,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f32,
    /// Nucleus sampling mass in `(0, 1]`.
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { max_tokens: 150, temperature: 0.7, top_p: 0.9 }
    }
}

impl GenerationParams {
    /// Check the parameter ranges accepted by the generation backends.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if `max_tokens == 0`,
    /// `temperature` is outside `[0, 1]`, or `top_p` is outside `(0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(RagError::config("max_tokens must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(RagError::config(format!(
                "temperature ({}) must be within [0, 1]",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(RagError::config(format!("top_p ({}) must be within (0, 1]", self.top_p)));
        }
        Ok(())
    }
}

/// An ordered list of turns plus sampling parameters.
///
/// Built fresh per request by the [`ContextAssembler`](crate::ContextAssembler)
/// and handed to a [`GenerationClient`] by shared reference, so it is never
/// modified after assembly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prompt {
    pub turns: Vec<Turn>,
    pub params: GenerationParams,
}

impl Prompt {
    pub fn new(params: GenerationParams) -> Self {
        Self { turns: Vec::new(), params }
    }

    /// Append a turn.
    pub fn with_turn(mut self, role: Role, text: impl Into<String>) -> Self {
        self.turns.push(Turn { role, text: text.into() });
        self
    }

    /// Text of the first turn with the given role.
    pub fn text_of(&self, role: Role) -> Option<&str> {
        self.turns.iter().find(|t| t.role == role).map(|t| t.text.as_str())
    }
}

/// A generated reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// Why the backend stopped generating (`stop`, `length`, ...), if reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), finish_reason: None }
    }
}

/// A remote service that produces text from a [`Prompt`].
///
/// Implementations follow the same deadline discipline as
/// [`EmbeddingClient`](crate::EmbeddingClient). When a backend returns several
/// candidates the first one is returned; see [`first_candidate`].
///
/// # Errors
///
/// - [`RagError::UpstreamUnavailable`] on connection failure or timeout
/// - [`RagError::UpstreamError`] on a non-2xx or malformed response
/// - [`RagError::UpstreamRefused`] when the backend declines the prompt
/// - [`RagError::DeadlineExceeded`] when `deadline` expires first
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a reply to `prompt`.
    async fn generate(&self, prompt: &Prompt, deadline: &Deadline) -> Result<Completion>;

    /// The generation model name, for logging.
    fn model(&self) -> &str;
}

/// Pick the first candidate of a multi-candidate response.
///
/// # Errors
///
/// Returns [`RagError::UpstreamError`] if there are no candidates.
pub fn first_candidate<I>(provider: &str, candidates: I) -> Result<Completion>
where
    I: IntoIterator<Item = Completion>,
{
    candidates.into_iter().next().ok_or_else(|| RagError::UpstreamError {
        provider: provider.to_string(),
        message: "response contained no candidates".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn default_params_are_valid() {
        assert!(GenerationParams::default().validate().is_ok());
    }

    #[test]
    fn params_out_of_range_are_rejected() {
        let bad = [
            GenerationParams { max_tokens: 0, ..Default::default() },
            GenerationParams { temperature: 1.5, ..Default::default() },
            GenerationParams { temperature: -0.1, ..Default::default() },
            GenerationParams { top_p: 0.0, ..Default::default() },
            GenerationParams { top_p: 1.01, ..Default::default() },
        ];
        for params in bad {
            let err = params.validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidConfiguration, "{params:?}");
        }
    }

    #[test]
    fn first_candidate_is_selected() {
        let picked = first_candidate(
            "test",
            vec![Completion::new("first"), Completion::new("second"), Completion::new("third")],
        )
        .unwrap();
        assert_eq!(picked.text, "first");

        let err = first_candidate("test", Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamError);
    }

    #[test]
    fn text_of_finds_turn_by_role() {
        let prompt = Prompt::new(GenerationParams::default())
            .with_turn(Role::System, "be brief")
            .with_turn(Role::User, "hi");
        assert_eq!(prompt.text_of(Role::System), Some("be brief"));
        assert_eq!(prompt.text_of(Role::User), Some("hi"));
    }
}
