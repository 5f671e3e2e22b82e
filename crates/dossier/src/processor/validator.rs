//! Meaningfulness checks for candidate extraction results.
//!
//! OCR noise tends to come out as isolated punctuation, bare digit runs, or
//! letter soup with no structure; those patterns gate the hybrid fallback.

use std::sync::OnceLock;

use regex::Regex;

use crate::processor::ExtractionResult;

/// Results below this confidence are never accepted as final.
pub const CONFIDENCE_FLOOR: u8 = 30;

/// Cleaned text shorter than this is treated as noise.
pub const MIN_TEXT_CHARS: usize = 10;

/// Combined confidence floor applied when OCR and visual analysis are merged.
pub const HYBRID_CONFIDENCE_FLOOR: u8 = 75;

fn degenerate_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // Punctuation and whitespace only.
            Regex::new(r"^[\p{P}\p{S}\s]+$").unwrap(),
            // Digits (with whitespace) only.
            Regex::new(r"^[\d\s]+$").unwrap(),
            // Letters and spaces with no digits or punctuation at all.
            Regex::new(r"^[\p{L} ]+$").unwrap(),
        ]
    })
}

/// Decides whether a candidate result is meaningful enough to accept.
pub fn has_meaningful_text(text: &str, confidence: u8) -> bool {
    if confidence < CONFIDENCE_FLOOR {
        return false;
    }
    let cleaned = text.trim();
    if cleaned.chars().count() < MIN_TEXT_CHARS {
        return false;
    }
    !degenerate_patterns().iter().any(|p| p.is_match(cleaned))
}

pub fn is_meaningful(result: &ExtractionResult) -> bool {
    has_meaningful_text(&result.text, result.confidence)
}

/// Merges a low-confidence OCR result with an AI visual analysis into the
/// hybrid output. Combined confidence is the max of the two, floored.
pub fn combine_hybrid(ocr: &ExtractionResult, visual: &ExtractionResult) -> ExtractionResult {
    let confidence = ocr
        .confidence
        .max(visual.confidence)
        .max(HYBRID_CONFIDENCE_FLOOR);

    let text = format!(
        "OCR text (low confidence):\n{}\n\nVisual analysis:\n{}",
        ocr.text.trim(),
        visual.text.trim()
    );

    ExtractionResult::new(
        text,
        confidence,
        ocr.processing_time_ms + visual.processing_time_ms,
        visual.method,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ExtractionMethod;

    fn result(text: &str, confidence: u8) -> ExtractionResult {
        ExtractionResult::new(text.to_string(), confidence, 10, ExtractionMethod::VisualOcr)
    }

    #[test]
    fn test_low_confidence_rejected() {
        assert!(!has_meaningful_text("Perfectly valid invoice #42 text", 29));
        assert!(has_meaningful_text("Perfectly valid invoice #42 text", 30));
    }

    #[test]
    fn test_short_text_rejected() {
        assert!(!has_meaningful_text("ok", 95));
        assert!(!has_meaningful_text("   padded  ", 95));
    }

    #[test]
    fn test_punctuation_only_rejected() {
        assert!(!has_meaningful_text("--- ... !!! ??? ***", 90));
    }

    #[test]
    fn test_digits_only_rejected() {
        assert!(!has_meaningful_text("12345 67890 11111", 90));
    }

    #[test]
    fn test_letter_soup_rejected() {
        assert!(!has_meaningful_text("lorem ipsum dolor sit amet", 90));
    }

    #[test]
    fn test_alphanumeric_text_accepted() {
        assert!(has_meaningful_text("Invoice #42 issued 2024-08-13", 90));
        assert!(has_meaningful_text("Case 17/2024: hearing adjourned.", 55));
    }

    #[test]
    fn test_hybrid_combines_both_texts() {
        let combined = combine_hybrid(&result("partial scan", 20), &result("A signed contract page", 85));
        assert!(combined.text.contains("OCR text (low confidence):"));
        assert!(combined.text.contains("partial scan"));
        assert!(combined.text.contains("Visual analysis:"));
        assert!(combined.text.contains("A signed contract page"));
        assert_eq!(combined.confidence, 85);
    }

    #[test]
    fn test_hybrid_confidence_floored() {
        let combined = combine_hybrid(&result("a", 20), &result("b", 40));
        assert_eq!(combined.confidence, HYBRID_CONFIDENCE_FLOOR);
    }
}
