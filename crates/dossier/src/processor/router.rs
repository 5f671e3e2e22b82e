//! Per-MIME-class extraction routing. One entry point, `extract`, decides
//! between local decoding, local OCR, provider calls, and the hybrid merge.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info_span, warn, Instrument};

use crate::ai::{AiTask, MultimodalProcessor};
use crate::error::ProcessError;
use crate::ocr::video::VideoSampler;
use crate::ocr::OcrScheduler;
use crate::processor::office::{self, OfficeKind};
use crate::processor::text::TextExtractor;
use crate::processor::validator;
use crate::processor::{classify_mime, ExtractionMethod, ExtractionResult, MimeClass};

/// Base confidence for a merged office extraction, before bonuses.
const OFFICE_BASE_CONFIDENCE: u8 = 70;
const OFFICE_TEXT_BONUS: u8 = 15;
const OFFICE_IMAGE_BONUS: u8 = 10;
const OFFICE_CLARIFY_PENALTY: u8 = 10;

pub struct ExtractionRouter {
    text: TextExtractor,
    ocr: Arc<OcrScheduler>,
    video: VideoSampler,
    ai: Arc<MultimodalProcessor>,
}

impl ExtractionRouter {
    pub fn new(ocr: Arc<OcrScheduler>, video: VideoSampler, ai: Arc<MultimodalProcessor>) -> Self {
        Self {
            text: TextExtractor::new(),
            ocr,
            video,
            ai,
        }
    }

    pub fn video(&self) -> &VideoSampler {
        &self.video
    }

    /// Extracts content from a document according to its MIME class. When
    /// the declared type is unusable (octet-stream, vendor types), the file
    /// extension gets one chance to supply a supported type instead.
    pub async fn extract(
        &self,
        path: &Path,
        mime_type: &str,
    ) -> Result<ExtractionResult, ProcessError> {
        let (class, mime_type) = match classify_mime(mime_type) {
            Ok(class) => (class, mime_type.to_string()),
            Err(err) => {
                let guessed = mime_guess::from_path(path)
                    .first_raw()
                    .and_then(|guess| classify_mime(guess).ok().map(|class| (class, guess)));
                match guessed {
                    Some((class, guess)) => {
                        warn!(declared = mime_type, "declared MIME type unsupported, routing by extension as {guess}");
                        (class, guess.to_string())
                    }
                    None => return Err(err),
                }
            }
        };
        let mime_type = mime_type.as_str();
        let span = info_span!("extract", mime = mime_type, class = ?class);
        async move {
            match class {
                MimeClass::Text => self.text.extract(path),
                MimeClass::Image => self.extract_image(path, mime_type).await,
                MimeClass::Video => self.extract_video(path, mime_type).await,
                MimeClass::Audio => {
                    self.ai
                        .process_file(path, mime_type, AiTask::Transcription)
                        .await
                }
                MimeClass::AiDocument => {
                    self.ai
                        .process_file(path, mime_type, AiTask::DocumentExtraction)
                        .await
                }
                MimeClass::OfficeContainer => self.extract_office(path, mime_type).await,
            }
        }
        .instrument(span)
        .await
    }

    /// Images: a cheap pre-check decides whether OCR is worth running at
    /// all. Meaningful OCR output is final; weak output is merged with a
    /// visual analysis into the hybrid result.
    async fn extract_image(
        &self,
        path: &Path,
        mime_type: &str,
    ) -> Result<ExtractionResult, ProcessError> {
        let data = std::fs::read(path).map_err(|source| ProcessError::ReadDocument {
            path: path.to_path_buf(),
            source,
        })?;

        if !self.ai.has_extractable_text(&data, mime_type).await {
            return self
                .ai
                .process_bytes(data, mime_type, AiTask::VisualAnalysis)
                .await;
        }

        let started = Instant::now();
        match self.ocr.recognize(data.clone()).await {
            Ok(output) => {
                let ocr_result = ExtractionResult::new(
                    output.text,
                    output.confidence,
                    started.elapsed().as_millis() as u64,
                    ExtractionMethod::VisualOcr,
                );
                if validator::is_meaningful(&ocr_result) {
                    return Ok(ocr_result);
                }
                match self
                    .ai
                    .process_bytes(data, mime_type, AiTask::VisualAnalysis)
                    .await
                {
                    Ok(visual) => Ok(validator::combine_hybrid(&ocr_result, &visual)),
                    Err(err) => {
                        warn!("visual analysis failed, keeping weak OCR output: {err}");
                        Ok(ocr_result)
                    }
                }
            }
            Err(err) => {
                warn!("OCR failed, falling back to visual analysis: {err}");
                self.ai
                    .process_bytes(data, mime_type, AiTask::VisualAnalysis)
                    .await
            }
        }
    }

    /// Videos: frame sampling with OCR first. When that yields nothing
    /// useful (including the tools-unavailable case), the file goes to the
    /// provider, and if that also fails the sampler's result stands.
    async fn extract_video(
        &self,
        path: &Path,
        mime_type: &str,
    ) -> Result<ExtractionResult, ProcessError> {
        let sampled = self.video.extract(path).await?;
        if validator::is_meaningful(&sampled) {
            return Ok(sampled);
        }
        match self
            .ai
            .process_file(path, mime_type, AiTask::VisualAnalysis)
            .await
        {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!("provider video analysis failed, keeping sampled result: {err}");
                Ok(sampled)
            }
        }
    }

    /// Office containers: XML text plus a visual analysis of every embedded
    /// image, merged into one document. Confidence is derived from which
    /// sources contributed; a garbled merge gets one clarification pass.
    async fn extract_office(
        &self,
        path: &Path,
        mime_type: &str,
    ) -> Result<ExtractionResult, ProcessError> {
        let kind = OfficeKind::from_mime(mime_type)
            .ok_or_else(|| ProcessError::UnsupportedMime(mime_type.to_string()))?;

        let started = Instant::now();
        let content = office::extract_container(path, kind)?;

        let mut sections: Vec<String> = Vec::new();
        let has_text = !content.text.trim().is_empty();
        if has_text {
            sections.push(content.text.trim().to_string());
        }

        let mut analyzed_images = 0usize;
        for image in content.images {
            match self
                .ai
                .process_bytes(image.data, &image.media_type, AiTask::VisualAnalysis)
                .await
            {
                Ok(result) => {
                    sections.push(format!("[Image: {}]\n{}", image.name, result.text));
                    analyzed_images += 1;
                }
                Err(err) => {
                    warn!(image = %image.name, "embedded image analysis failed: {err}");
                }
            }
        }

        if sections.is_empty() {
            return Err(ProcessError::InsufficientContent { length: 0 });
        }

        let mut combined = sections.join("\n\n");
        let mut confidence = OFFICE_BASE_CONFIDENCE;
        if has_text {
            confidence += OFFICE_TEXT_BONUS;
        }
        if analyzed_images > 0 {
            confidence += OFFICE_IMAGE_BONUS;
        }

        if !validator::has_meaningful_text(&combined, confidence) {
            match self.ai.clarify(&combined).await {
                Ok(cleaned) => {
                    combined = cleaned;
                    confidence = confidence.saturating_sub(OFFICE_CLARIFY_PENALTY);
                }
                Err(err) => {
                    warn!("clarification pass failed, keeping merged text: {err}");
                }
            }
        }

        Ok(ExtractionResult::new(
            combined,
            confidence,
            started.elapsed().as_millis() as u64,
            ExtractionMethod::DocumentAnalysis,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::{GenerativeProvider, MediaPayload, ProviderError};
    use crate::config::{AiConfig, OcrConfig, VideoConfig};
    use crate::ocr::engine::OcrEngine;
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Answers the text pre-check with a fixed yes/no and everything else
    /// with a fixed body, counting calls.
    struct RoutingProvider {
        precheck_answer: &'static str,
        body: &'static str,
        calls: AtomicU32,
    }

    impl RoutingProvider {
        fn new(precheck_answer: &'static str, body: &'static str) -> Self {
            Self {
                precheck_answer,
                body,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerativeProvider for RoutingProvider {
        async fn generate(
            &self,
            prompt: &str,
            _media: Option<&MediaPayload>,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if prompt.contains("yes or no") {
                Ok(self.precheck_answer.to_string())
            } else if self.body.is_empty() {
                Err(ProviderError::EmptyResponse)
            } else {
                Ok(self.body.to_string())
            }
        }
    }

    fn router(provider: Arc<RoutingProvider>) -> ExtractionRouter {
        let ocr_config = OcrConfig {
            workers: 1,
            languages: vec!["eng".to_string()],
            max_dimension: 2000,
        };
        let scheduler = Arc::new(OcrScheduler::new(
            OcrEngine::new(&ocr_config.languages, ocr_config.max_dimension),
            ocr_config.workers,
        ));
        let video = VideoSampler::with_availability(
            VideoConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                ffprobe_path: "ffprobe".to_string(),
                frame_interval_secs: 2.0,
                max_frames: 10,
            },
            Arc::clone(&scheduler),
            false,
        );
        let ai = Arc::new(MultimodalProcessor::new(provider, &AiConfig::for_tests()));
        ExtractionRouter::new(scheduler, video, ai)
    }

    #[tokio::test]
    async fn test_plain_text_never_touches_the_provider() {
        let provider = Arc::new(RoutingProvider::new("yes", "should not be used"));
        let router = router(provider.clone());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "Hello world").unwrap();

        let result = router.extract(&path, "text/plain").await.unwrap();
        assert_eq!(result.text, "Hello world");
        assert_eq!(result.confidence, 100);
        assert_eq!(result.method, ExtractionMethod::DocumentAnalysis);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_octet_stream_routes_by_file_extension() {
        let provider = Arc::new(RoutingProvider::new("yes", "should not be used"));
        let router = router(provider.clone());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("statement.txt");
        std::fs::write(&path, "Balance carried forward: 120.00").unwrap();

        let result = router
            .extract(&path, "application/octet-stream")
            .await
            .unwrap();
        assert_eq!(result.text, "Balance carried forward: 120.00");
        assert_eq!(result.confidence, 100);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsupported_mime_is_rejected_before_io() {
        let provider = Arc::new(RoutingProvider::new("yes", ""));
        let router = router(provider);

        let err = router
            .extract(Path::new("/nonexistent"), "application/x-blob")
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::UnsupportedMime(_)));
    }

    #[tokio::test]
    async fn test_image_without_text_goes_straight_to_visual_analysis() {
        let provider = Arc::new(RoutingProvider::new(
            "no",
            "A photograph of a harbor at dusk, no visible text.",
        ));
        let router = router(provider.clone());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, [0u8; 16]).unwrap();

        let result = router.extract(&path, "image/png").await.unwrap();
        assert_eq!(result.method, ExtractionMethod::VisualOcr);
        assert!(result.text.contains("harbor"));
        // Pre-check plus one analysis call.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_undecodable_image_falls_back_to_visual_analysis() {
        let provider = Arc::new(RoutingProvider::new(
            "yes",
            "Handwritten note: meeting at 10am, room 4.",
        ));
        let router = router(provider.clone());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        // Not a decodable image, so local OCR errors out.
        std::fs::write(&path, [0u8; 16]).unwrap();

        let result = router.extract(&path, "image/png").await.unwrap();
        assert!(result.text.contains("meeting at 10am"));
        assert_eq!(result.method, ExtractionMethod::VisualOcr);
    }

    #[tokio::test]
    async fn test_video_without_tools_uses_provider() {
        let provider = Arc::new(RoutingProvider::new(
            "yes",
            "Frame content: a whiteboard listing case numbers 12 and 14.",
        ));
        let router = router(provider.clone());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, [0u8; 16]).unwrap();

        let result = router.extract(&path, "video/mp4").await.unwrap();
        assert!(result.text.contains("whiteboard"));
    }

    #[tokio::test]
    async fn test_video_degrades_to_marker_when_provider_fails() {
        let provider = Arc::new(RoutingProvider::new("yes", ""));
        let router = router(provider);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, [0u8; 16]).unwrap();

        let result = router.extract(&path, "video/mp4").await.unwrap();
        assert!(result.text.starts_with(crate::ocr::video::VIDEO_UNAVAILABLE_MARKER));
        assert_eq!(result.confidence, 0);
    }

    #[tokio::test]
    async fn test_office_text_only_confidence() {
        let provider = Arc::new(RoutingProvider::new("yes", "unused"));
        let router = router(provider.clone());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contract.docx");
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("word/document.xml", options).unwrap();
            writer
                .write_all(
                    br#"<w:document xmlns:w="x"><w:body><w:p><w:r><w:t>Invoice 42 due on 2024-08-13.</w:t></w:r></w:p></w:body></w:document>"#,
                )
                .unwrap();
            writer.finish().unwrap();
        }
        std::fs::write(&path, buffer.into_inner()).unwrap();

        let result = router
            .extract(
                &path,
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            )
            .await
            .unwrap();
        assert_eq!(result.text, "Invoice 42 due on 2024-08-13.");
        assert_eq!(result.confidence, 85);
        assert_eq!(result.method, ExtractionMethod::DocumentAnalysis);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
