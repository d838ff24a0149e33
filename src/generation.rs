//! Answer generators.
//!
//! Selected by `[generation].provider`:
//! - **`extractive`**: [`ExtractiveGenerator`], no model. Returns the
//!   context sentences that best overlap the question.
//! - **`openai`**: [`OpenAIGenerator`], chat completions
//!   (`gpt-3.5-turbo`, temperature 0.7 by default).
//! - **`ollama`**: [`OllamaGenerator`], `POST /api/generate`.
//!
//! The model-backed generators "stuff" every retrieved passage into a
//! single prompt built by [`stuff_prompt`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::http::{join_url, JsonEndpoint};

pub use ragbot_core::generation::{build_context, Generator};

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OPENAI_DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Answer given when nothing in the context relates to the question.
pub const NO_ANSWER: &str = "I don't know based on the uploaded documents.";

/// Prompt asking a model to answer from the supplied context only.
pub fn stuff_prompt(question: &str, context: &str) -> String {
    format!(
        "Use the following pieces of context to answer the question at the end. \
         If you don't know the answer, just say that you don't know, \
         don't try to make up an answer.\n\n{}\n\nQuestion: {}\nHelpful Answer:",
        context, question
    )
}

// ============ Extractive ============

/// Picks answer sentences straight out of the context.
///
/// Sentences are scored by how many distinct question words they contain.
/// Every sentence sharing the top score is returned verbatim, in context
/// order, up to `max_sentences`.
pub struct ExtractiveGenerator {
    max_sentences: usize,
}

impl ExtractiveGenerator {
    pub fn new(max_sentences: usize) -> Self {
        Self {
            max_sentences: max_sentences.max(1),
        }
    }

    pub fn answer(&self, question: &str, context: &str) -> String {
        let wanted: HashSet<String> = words(question).filter(|w| w.chars().count() > 2).collect();

        let mut scored: Vec<(usize, usize, &str)> = sentences(context)
            .enumerate()
            .map(|(position, sentence)| {
                let hits = words(sentence)
                    .filter(|w| wanted.contains(w))
                    .collect::<HashSet<_>>()
                    .len();
                (hits, position, sentence)
            })
            .filter(|(hits, _, _)| *hits > 0)
            .collect();

        if scored.is_empty() {
            return NO_ANSWER.to_string();
        }

        let best = scored.iter().map(|(hits, _, _)| *hits).max().unwrap_or(0);
        scored.retain(|(hits, _, _)| *hits == best);
        scored.truncate(self.max_sentences);

        let mut seen = HashSet::new();
        scored
            .into_iter()
            .map(|(_, _, s)| s)
            .filter(|s| seen.insert(*s))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self::new(2)
    }
}

#[async_trait]
impl Generator for ExtractiveGenerator {
    fn model_name(&self) -> &str {
        "extractive"
    }

    async fn generate(&self, question: &str, context: &str) -> Result<String> {
        Ok(self.answer(question, context))
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty() && !is_page_marker(s))
}

fn is_page_marker(line: &str) -> bool {
    line.starts_with("--- Page ") && line.ends_with("---")
}

// ============ OpenAI ============

/// Chat-completion answers from OpenAI. Requires `OPENAI_API_KEY`.
pub struct OpenAIGenerator {
    model: String,
    temperature: f32,
    endpoint: JsonEndpoint,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string());
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base = config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL);

        Ok(Self {
            model,
            temperature: config.temperature,
            endpoint: JsonEndpoint::new(
                "OpenAI",
                join_url(base, "chat/completions"),
                Some(api_key),
                config.timeout_secs,
                config.max_retries,
            )?,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, question: &str, context: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "user", "content": stuff_prompt(question, context) }
            ],
        });
        let json = self.endpoint.post(&body).await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

// ============ Ollama ============

pub struct OllamaGenerator {
    model: String,
    temperature: f32,
    endpoint: JsonEndpoint,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;
        let base = config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL);

        Ok(Self {
            model,
            temperature: config.temperature,
            endpoint: JsonEndpoint::new(
                "Ollama",
                join_url(base, "api/generate"),
                None,
                config.timeout_secs,
                config.max_retries,
            )?,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, question: &str, context: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": stuff_prompt(question, context),
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let json = self.endpoint.post(&body).await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(|r| r.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
    }
}

/// Instantiate the generator named by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "extractive" => Ok(Arc::new(ExtractiveGenerator::default())),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
