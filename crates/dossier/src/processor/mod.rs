pub mod office;
pub mod router;
pub mod text;
pub mod validator;

use serde::{Deserialize, Serialize};

use crate::error::ProcessError;

/// How a piece of extracted content was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    VisualOcr,
    AudioTranscription,
    DocumentAnalysis,
}

/// Final output of an extraction attempt. Either fully populated or the call
/// fails; there is no partially valid result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub text: String,
    /// 0-100. Nominal for AI-produced text; measured for OCR.
    pub confidence: u8,
    pub processing_time_ms: u64,
    pub method: ExtractionMethod,
}

impl ExtractionResult {
    pub fn new(
        text: String,
        confidence: u8,
        processing_time_ms: u64,
        method: ExtractionMethod,
    ) -> Self {
        Self {
            text,
            confidence: confidence.min(100),
            processing_time_ms,
            method,
        }
    }
}

/// Coarse routing class for a MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeClass {
    /// Read locally, cleaned, confidence 100, no AI call.
    Text,
    Image,
    Video,
    Audio,
    /// Provider-supported document formats (PDF).
    AiDocument,
    /// ZIP-container office formats the provider cannot ingest directly.
    OfficeContainer,
}

const TEXT_APPLICATION_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/x-yaml",
    "application/yaml",
    "application/rtf",
    "application/javascript",
    "application/x-sh",
    // Legacy binary office formats: read raw and let encoding detection plus
    // cleaning salvage the embedded strings.
    "application/msword",
    "application/vnd.ms-excel",
];

const OFFICE_CONTAINER_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

/// Classifies a MIME type into its extraction route.
pub fn classify_mime(mime_type: &str) -> Result<MimeClass, ProcessError> {
    let mime = mime_type
        .split(';')
        .next()
        .unwrap_or(mime_type)
        .trim()
        .to_ascii_lowercase();

    if OFFICE_CONTAINER_TYPES.contains(&mime.as_str()) {
        return Ok(MimeClass::OfficeContainer);
    }
    if mime.starts_with("text/") || TEXT_APPLICATION_TYPES.contains(&mime.as_str()) {
        return Ok(MimeClass::Text);
    }
    if mime.starts_with("image/") {
        return Ok(MimeClass::Image);
    }
    if mime.starts_with("video/") {
        return Ok(MimeClass::Video);
    }
    if mime.starts_with("audio/") {
        return Ok(MimeClass::Audio);
    }
    if mime == "application/pdf" {
        return Ok(MimeClass::AiDocument);
    }

    Err(ProcessError::UnsupportedMime(mime_type.to_string()))
}

/// The supported-MIME-types enumeration exposed to the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct SupportedMimeTypes {
    pub documents: Vec<&'static str>,
    pub images: Vec<&'static str>,
    pub videos: Vec<&'static str>,
    pub audio: Vec<&'static str>,
}

pub fn supported_mime_types() -> SupportedMimeTypes {
    SupportedMimeTypes {
        documents: vec![
            "text/plain",
            "text/csv",
            "text/tab-separated-values",
            "text/html",
            "text/xml",
            "text/markdown",
            "application/json",
            "application/rtf",
            "application/pdf",
            "application/msword",
            "application/vnd.ms-excel",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ],
        images: vec!["image/png", "image/jpeg", "image/gif", "image/bmp", "image/tiff", "image/webp"],
        videos: vec!["video/mp4", "video/mpeg", "video/quicktime", "video/webm", "video/x-msvideo"],
        audio: vec!["audio/mpeg", "audio/wav", "audio/ogg", "audio/mp4", "audio/webm"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_family_routes_locally() {
        for mime in [
            "text/plain",
            "text/csv",
            "text/html",
            "text/markdown",
            "application/json",
            "application/x-yaml",
            "application/msword",
            "application/vnd.ms-excel",
        ] {
            assert_eq!(classify_mime(mime).unwrap(), MimeClass::Text, "{mime}");
        }
    }

    #[test]
    fn test_media_classes() {
        assert_eq!(classify_mime("image/png").unwrap(), MimeClass::Image);
        assert_eq!(classify_mime("video/mp4").unwrap(), MimeClass::Video);
        assert_eq!(classify_mime("audio/mpeg").unwrap(), MimeClass::Audio);
        assert_eq!(classify_mime("application/pdf").unwrap(), MimeClass::AiDocument);
    }

    #[test]
    fn test_office_containers_special_cased() {
        assert_eq!(
            classify_mime(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            )
            .unwrap(),
            MimeClass::OfficeContainer
        );
    }

    #[test]
    fn test_mime_parameters_ignored() {
        assert_eq!(
            classify_mime("text/plain; charset=utf-8").unwrap(),
            MimeClass::Text
        );
    }

    #[test]
    fn test_unknown_mime_rejected() {
        let err = classify_mime("application/x-blob").unwrap_err();
        assert!(matches!(err, ProcessError::UnsupportedMime(_)));
    }

    #[test]
    fn test_confidence_clamped_to_100() {
        let result = ExtractionResult::new("x".to_string(), 200, 1, ExtractionMethod::VisualOcr);
        assert_eq!(result.confidence, 100);
    }
}
