//! Generator capability.
//!
//! The orchestrator hands the question plus the retrieved context to a
//! [`Generator`] and returns whatever answer text it produces.

use anyhow::Result;
use async_trait::async_trait;

/// Separator placed between retrieved passages when building the context.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Produces an answer from a question and retrieved context. Stateless per call.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-3.5-turbo"`).
    fn model_name(&self) -> &str;

    async fn generate(&self, question: &str, context: &str) -> Result<String>;
}

/// Join retrieved passage texts into one context block.
pub fn build_context<'a>(passages: impl IntoIterator<Item = &'a str>) -> String {
    passages
        .into_iter()
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_context_joins_with_blank_line() {
        let ctx = build_context(["one", "two"]);
        assert_eq!(ctx, "one\n\ntwo");
    }

    #[test]
    fn test_build_context_empty() {
        assert_eq!(build_context(Vec::<&str>::new()), "");
    }
}
