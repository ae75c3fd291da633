//! Augmented prompt assembly.
//!
//! [`ContextAssembler`] joins retrieved fragments into a bounded context
//! string and wraps it, together with the user's query, into a two-turn
//! [`Prompt`].

use crate::document::RetrievedFragment;
use crate::error::{RagError, Result};
use crate::generation::{GenerationParams, Prompt, Role};

/// Default system instruction. `{language}` is replaced with the target language.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are an AI assistant. Use the provided context \
    to answer the user's question as accurately as possible. If the provided context is not \
    related to the user's question, do not mention it. Answer in {language}, regardless of the \
    language the question is asked in.";

/// Appended to the system turn when no context could be included.
pub const NO_CONTEXT_INSTRUCTION: &str = "No reference context was found for this question. \
    Do not invent context, sources or facts that were not provided; if you do not know the \
    answer, say so.";

const LANGUAGE_PLACEHOLDER: &str = "{language}";

/// Builds the prompt sent to the generation backend.
///
/// The context is the fragment texts in ranked order joined by a delimiter.
/// When the joined text would exceed the length budget, whole fragments are
/// dropped from the lowest-ranked end; a fragment is never cut. If nothing
/// fits, or nothing was retrieved, the user turn carries only the question
/// and the system turn tells the model not to fabricate context.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::ContextAssembler;
///
/// let assembler = ContextAssembler::new(DEFAULT_SYSTEM_INSTRUCTION, "English");
/// let prompt = assembler.combine("When was the moon landing?", &fragments, 4000)?;
/// ```
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    system_instruction: String,
    target_language: String,
    delimiter: String,
    params: GenerationParams,
}

impl ContextAssembler {
    /// Create an assembler with the default delimiter (`"\n"`) and
    /// default generation parameters.
    pub fn new(system_instruction: impl Into<String>, target_language: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            target_language: target_language.into(),
            delimiter: "\n".to_string(),
            params: GenerationParams::default(),
        }
    }

    /// Set the delimiter placed between fragment texts.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Set the generation parameters attached to every prompt.
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// The system instruction with the target language filled in.
    pub fn system_instruction(&self) -> String {
        self.system_instruction.replace(LANGUAGE_PLACEHOLDER, &self.target_language)
    }

    /// How many of the leading `fragments` fit in `max_context_length` characters
    /// once joined with the delimiter.
    pub fn fit(&self, fragments: &[RetrievedFragment], max_context_length: usize) -> usize {
        let delimiter_len = self.delimiter.chars().count();
        let mut used = 0;
        for (i, fragment) in fragments.iter().enumerate() {
            let separator = if i == 0 { 0 } else { delimiter_len };
            let next = used + separator + fragment.text().chars().count();
            if next > max_context_length {
                return i;
            }
            used = next;
        }
        fragments.len()
    }

    /// Join the fragments that fit into the context string.
    pub fn context(&self, fragments: &[RetrievedFragment], max_context_length: usize) -> String {
        let count = self.fit(fragments, max_context_length);
        fragments[..count]
            .iter()
            .map(RetrievedFragment::text)
            .collect::<Vec<_>>()
            .join(&self.delimiter)
    }

    /// Build the two-turn prompt for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if `max_context_length` is zero.
    pub fn combine(
        &self,
        query: &str,
        fragments: &[RetrievedFragment],
        max_context_length: usize,
    ) -> Result<Prompt> {
        if max_context_length == 0 {
            return Err(RagError::config("max_context_length must be greater than zero"));
        }

        let context = self.context(fragments, max_context_length);
        let mut system = self.system_instruction();

        let user = if context.is_empty() {
            system.push(' ');
            system.push_str(NO_CONTEXT_INSTRUCTION);
            format!("Question: {query}")
        } else {
            format!("Context: {context}\nQuestion: {query}")
        };

        Ok(Prompt::new(self.params).with_turn(Role::System, system).with_turn(Role::User, user))
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_INSTRUCTION, "English")
    }
}
