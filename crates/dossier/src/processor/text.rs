//! Local text extraction: byte-encoding detection and content cleaning.
//!
//! Text-family documents never touch the AI provider; they are decoded with
//! the first encoding whose printable ratio clears the threshold, cleaned,
//! and accepted at full confidence.

use std::path::Path;
use std::time::Instant;

use encoding_rs::{UTF_16BE, UTF_16LE, WINDOWS_1252};

use crate::error::ProcessError;
use crate::processor::{ExtractionMethod, ExtractionResult};

/// Minimum printable-character ratio for a decoding to be accepted.
const PRINTABLE_THRESHOLD: f64 = 0.70;

pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, path: &Path) -> Result<ExtractionResult, ProcessError> {
        let _span = tracing::info_span!("processor.text").entered();
        let started = Instant::now();

        let bytes = std::fs::read(path).map_err(|e| ProcessError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;

        let decoded = decode_bytes(&bytes).ok_or_else(|| ProcessError::EncodingDetection {
            path: path.to_path_buf(),
        })?;

        Ok(ExtractionResult::new(
            clean_text(&decoded),
            100,
            started.elapsed().as_millis() as u64,
            ExtractionMethod::DocumentAnalysis,
        ))
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Tries UTF-8, UTF-16 (both byte orders), Latin-1, then CP1252, accepting
/// the first decoding whose printable ratio exceeds the threshold.
pub fn decode_bytes(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return Some(String::new());
    }

    if let Ok(utf8) = std::str::from_utf8(bytes) {
        if printable_ratio(utf8) > PRINTABLE_THRESHOLD {
            return Some(utf8.to_string());
        }
    }

    for encoding in [UTF_16LE, UTF_16BE] {
        let (decoded, _, had_errors) = encoding.decode(bytes);
        if !had_errors && printable_ratio(&decoded) > PRINTABLE_THRESHOLD {
            return Some(decoded.into_owned());
        }
    }

    // Latin-1 caps the chain; encoding_rs folds ISO-8859-1 into its
    // windows-1252 index, which covers both single-byte candidates.
    let (decoded, _, _) = WINDOWS_1252.decode(bytes);
    if printable_ratio(&decoded) > PRINTABLE_THRESHOLD {
        return Some(decoded.into_owned());
    }

    None
}

fn printable_ratio(text: &str) -> f64 {
    if text.is_empty() {
        return 1.0;
    }
    let total = text.chars().count();
    let printable = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .count();
    printable as f64 / total as f64
}

/// Normalizes line endings, strips stray control characters, and collapses
/// runs of blank lines.
pub fn clean_text(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut output = String::with_capacity(normalized.len());
    let mut blank_run = 0usize;

    for line in normalized.lines() {
        let cleaned: String = line
            .chars()
            .filter(|c| !c.is_control() || *c == '\t')
            .collect();
        if cleaned.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            output.push('\n');
        } else {
            blank_run = 0;
            output.push_str(cleaned.trim_end());
            output.push('\n');
        }
    }

    output.trim().to_string()
}
