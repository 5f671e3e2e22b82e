//! Post-extraction enrichment chain: language detection first, then summary,
//! timeline, and translations in parallel, then a title. Every step after
//! detection degrades independently so one failed call never voids the rest.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::ai::backoff::BackoffPolicy;
use crate::ai::provider::{GenerativeProvider, MediaPayload};
use crate::config::LanguageConfig;
use crate::document::TimelineEvent;
use crate::timeline::normalize_events;

/// Characters of document text sampled for language detection.
const DETECTION_SAMPLE_CHARS: usize = 400;
const TITLE_MAX_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedLanguage {
    Primary,
    Secondary,
    Other,
}

#[derive(Debug, Clone, Default)]
pub struct ChainOutput {
    pub summary: Option<String>,
    pub timeline: Vec<TimelineEvent>,
    pub translation_primary: Option<String>,
    pub translation_secondary: Option<String>,
    pub title: Option<String>,
}

pub struct ContentChain {
    provider: Arc<dyn GenerativeProvider>,
    backoff: BackoffPolicy,
    languages: LanguageConfig,
}

impl ContentChain {
    pub fn new(
        provider: Arc<dyn GenerativeProvider>,
        backoff: BackoffPolicy,
        languages: LanguageConfig,
    ) -> Self {
        Self {
            provider,
            backoff,
            languages,
        }
    }

    /// Runs the full chain over extracted document text.
    pub async fn run(&self, text: &str) -> ChainOutput {
        let language = self.detect_language(text).await;
        debug!(?language, "language detected");

        let (summary, timeline, (translation_primary, translation_secondary)) = futures_util::join!(
            self.summarize(text),
            self.extract_timeline(text),
            self.translations(text, language),
        );

        let title = self.derive_title(text, summary.as_deref()).await;

        ChainOutput {
            summary,
            timeline,
            translation_primary,
            translation_secondary,
            title,
        }
    }

    /// Classifies the dominant language against the configured pair. Falls
    /// back to `Other` when the provider is unavailable, which still yields
    /// translations into both configured languages.
    pub async fn detect_language(&self, text: &str) -> DetectedLanguage {
        let sample: String = text.chars().take(DETECTION_SAMPLE_CHARS).collect();
        let prompt = format!(
            "Identify the dominant language of the following text. Answer \
             with only its ISO 639-1 code, nothing else.\n\n{sample}"
        );
        match self.ask(&prompt).await {
            Some(answer) => self.classify_code(&answer),
            None => DetectedLanguage::Other,
        }
    }

    fn classify_code(&self, answer: &str) -> DetectedLanguage {
        let code = answer
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_lowercase();
        if code == self.languages.primary {
            DetectedLanguage::Primary
        } else if code == self.languages.secondary {
            DetectedLanguage::Secondary
        } else {
            DetectedLanguage::Other
        }
    }

    pub async fn summarize(&self, text: &str) -> Option<String> {
        let prompt = format!(
            "Summarize the following document in three to five sentences, in \
             the same language as the document. Focus on parties, dates, and \
             concrete facts. Return only the summary.\n\n{text}"
        );
        self.ask(&prompt).await
    }

    /// Extracts chronological events as structured data. Dates come back in
    /// whatever form the document uses and are normalized afterwards.
    pub async fn extract_timeline(&self, text: &str) -> Vec<TimelineEvent> {
        let prompt = format!(
            "Extract every dated event from the following document as a JSON \
             array of objects with keys \"date\" and \"event\". Keep dates \
             exactly as written in the document. Return only the JSON \
             array, or [] if there are no dated events.\n\n{text}"
        );
        let Some(answer) = self.ask(&prompt).await else {
            return Vec::new();
        };
        let payload = extract_json_block(&answer);
        match serde_json::from_str::<Vec<TimelineEvent>>(payload) {
            Ok(events) => normalize_events(events),
            Err(err) => {
                warn!("timeline response was not valid JSON: {err}");
                Vec::new()
            }
        }
    }

    /// Produces the primary/secondary language pair for the document: the
    /// detected side is a polished edit of the original, the other side a
    /// translation. Unrecognized languages are translated into both.
    async fn translations(
        &self,
        text: &str,
        language: DetectedLanguage,
    ) -> (Option<String>, Option<String>) {
        match language {
            DetectedLanguage::Primary => futures_util::join!(
                self.polish(text),
                self.translate(text, &self.languages.secondary),
            ),
            DetectedLanguage::Secondary => futures_util::join!(
                self.translate(text, &self.languages.primary),
                self.polish(text),
            ),
            DetectedLanguage::Other => futures_util::join!(
                self.translate(text, &self.languages.primary),
                self.translate(text, &self.languages.secondary),
            ),
        }
    }

    async fn translate(&self, text: &str, target_code: &str) -> Option<String> {
        let prompt = format!(
            "Translate the following text into {}. Preserve names, numbers, \
             and dates exactly. Return only the translation.\n\n{text}",
            language_name(target_code)
        );
        self.ask(&prompt).await
    }

    async fn polish(&self, text: &str) -> Option<String> {
        let prompt = format!(
            "Correct spelling, OCR artifacts, and punctuation in the \
             following text without translating it or changing its meaning. \
             Return only the corrected text.\n\n{text}"
        );
        self.ask(&prompt).await
    }

    /// Title from the provider, with a deterministic fallback when the call
    /// fails: first non-empty line of the text, truncated.
    pub async fn derive_title(&self, text: &str, summary: Option<&str>) -> Option<String> {
        let basis = summary.unwrap_or(text);
        let prompt = format!(
            "Propose a short descriptive filename-style title (at most \
             {TITLE_MAX_CHARS} characters, no extension) for a document with \
             this content. Return only the title.\n\n{basis}"
        );
        match self.ask(&prompt).await {
            Some(title) => Some(truncate_chars(title.trim(), TITLE_MAX_CHARS)),
            None => heuristic_title(text),
        }
    }

    /// One provider call with the shared retry policy, degrading to `None`.
    async fn ask(&self, prompt: &str) -> Option<String> {
        let mut last_error = String::new();
        for attempt in 1..=self.backoff.max_attempts {
            match self.provider.generate(prompt, None).await {
                Ok(answer) if !answer.trim().is_empty() => return Some(answer.trim().to_string()),
                Ok(_) => last_error = "empty response".to_string(),
                Err(err) => last_error = err.to_string(),
            }
            if !self.backoff.is_exhausted(attempt) {
                tokio::time::sleep(self.backoff.delay(attempt)).await;
            }
        }
        warn!("chain step failed after retries: {last_error}");
        None
    }
}

/// Pulls a JSON payload out of a possibly markdown-fenced response.
fn extract_json_block(response: &str) -> &str {
    let trimmed = response.trim();
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    // No fence, take from the first bracket if present.
    if let Some(start) = trimmed.find('[') {
        if let Some(end) = trimmed.rfind(']') {
            if end >= start {
                return &trimmed[start..=end];
            }
        }
    }
    trimmed
}

fn heuristic_title(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| truncate_chars(line, TITLE_MAX_CHARS))
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

fn language_name(code: &str) -> &str {
    match code {
        "ar" => "Arabic",
        "en" => "English",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "tr" => "Turkish",
        "ur" => "Urdu",
        "fa" => "Persian",
        other => other,
    }
}
