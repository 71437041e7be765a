// Response generation module
// Grounded answers from retrieved context via a hosted language model


pub mod gemini;

pub use gemini::GeminiClient;

use itertools::Itertools;
use std::borrow::Cow;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GeminiConfig;
use crate::engine::QueryResult;

/// Answer substituted when a response does not address the question
pub const NOT_FOUND_RESPONSE: &str = "Not found in documents. Please rephrase your question.";

/// Hedging phrases rewritten so answers read as grounded in the documents
const PHRASE_REPLACEMENTS: [(&str, &str); 5] = [
    ("as an AI", ""),
    ("I don't have personal opinions", "The documents don't specify"),
    ("my knowledge cutoff", "the available documents"),
    ("in general", "specifically"),
    ("typically", "in this case"),
];

/// Number of leading query words checked for in the answer
const TOPIC_WORDS: usize = 3;

/// Produces an answer to `query` grounded in `context`
pub trait ResponseGenerator {
    fn generate(&self, query: &str, context: &str) -> anyhow::Result<String>;
}

/// Render retrieved documents as labeled blocks separated by blank lines.
///
/// Each block is `Source: <source>\nContent: <text>`, with the text cut to
/// `max_chars` characters and marked with `...` when cut.
#[inline]
pub fn format_context(result: &QueryResult, max_chars: usize) -> String {
    result
        .iter()
        .map(|hit| {
            format!(
                "Source: {}\nContent: {}",
                hit.metadata.source,
                truncate_chars(&hit.text, max_chars)
            )
        })
        .join("\n\n")
}

/// Cut `text` to at most `max_chars` characters, appending `...` if anything
/// was removed
#[inline]
pub fn truncate_chars(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => Cow::Owned(format!("{}...", &text[..byte_index])),
        None => Cow::Borrowed(text),
    }
}

/// Clean up a raw model answer.
///
/// Rewrites hedging phrases, replaces answers that mention none of the first
/// words of the question with [`NOT_FOUND_RESPONSE`], then trims and caps the
/// result at `max_chars` characters.
#[inline]
pub fn validate_response(text: &str, query: &str, max_chars: usize) -> String {
    let mut cleaned = text.to_string();

    for (phrase, replacement) in PHRASE_REPLACEMENTS {
        if cleaned.contains(phrase) {
            warn!("Corrected phrase in response: {:?}", phrase);
            cleaned = cleaned.replace(phrase, replacement);
        }
    }

    let lowered = cleaned.to_lowercase();
    let query_lowered = query.to_lowercase();
    let mut topic_words = query_lowered.split_whitespace().take(TOPIC_WORDS).peekable();
    if topic_words.peek().is_some() && !topic_words.any(|word| lowered.contains(word)) {
        warn!("Response looks off-topic for query {:?}", query);
        cleaned = NOT_FOUND_RESPONSE.to_string();
    }

    cleaned.trim().chars().take(max_chars).collect()
}

/// Bounded retry with exponential delay: attempt `n` (zero-based) is
/// followed by a wait of `min(base_delay * 2^n, max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Outcome of a failed attempt
#[derive(Debug)]
pub enum AttemptError {
    /// Worth trying again after the backoff delay
    Retryable(anyhow::Error),
    /// Give up immediately
    Fatal(anyhow::Error),
}

impl RetryPolicy {
    #[inline]
    pub fn from_config(config: &GeminiConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            base_delay: Duration::from_secs(config.retry_base_delay_secs),
            max_delay: Duration::from_secs(config.retry_max_delay_secs),
        }
    }

    /// Delay after the zero-based `attempt`
    #[inline]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
            .min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails fatally, or attempts run out.
    /// The closure receives the zero-based attempt number.
    #[inline]
    pub fn run<T, F>(&self, mut operation: F) -> anyhow::Result<T>
    where
        F: FnMut(u32) -> Result<T, AttemptError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            match operation(attempt) {
                Ok(value) => return Ok(value),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retryable(e)) => {
                    warn!("Attempt {}/{} failed: {:#}", attempt + 1, max_attempts, e);
                    last_error = Some(e);

                    if attempt + 1 < max_attempts {
                        let delay = self.delay_for(attempt);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| anyhow::anyhow!("no attempt was made"));
        Err(error.context(format!("All {max_attempts} attempts failed")))
    }
}
