//! Video frame sampling and recombination.
//!
//! Frames are pulled with ffmpeg at a fixed temporal rate, recognized
//! independently through the OCR scheduler, and recombined in timestamp
//! order. The toolchain is probed once at startup; a missing ffmpeg degrades
//! to a structured zero-confidence result so the router can try an AI
//! fallback instead of failing the job.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::VideoConfig;
use crate::error::ProcessError;
use crate::ocr::OcrScheduler;
use crate::processor::validator::CONFIDENCE_FLOOR;
use crate::processor::{ExtractionMethod, ExtractionResult};

/// Marker prefixing the structured result when frame extraction is missing.
pub const VIDEO_UNAVAILABLE_MARKER: &str = "[VIDEO] Video processing not available";

/// One recognized frame. Ephemeral: the backing file is deleted immediately
/// after recognition and the frame is consumed once by the combiner.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub timestamp_secs: f64,
    pub text: String,
    pub confidence: u8,
}

/// Capability surface reported to the gateway.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VideoSupport {
    pub supported: bool,
    pub instruction: Option<String>,
}

pub struct VideoSampler {
    config: VideoConfig,
    scheduler: Arc<OcrScheduler>,
    ffmpeg_available: bool,
}

impl VideoSampler {
    /// Probes the frame-extraction toolchain once and remembers the outcome.
    pub async fn detect(config: VideoConfig, scheduler: Arc<OcrScheduler>) -> Self {
        let ffmpeg_available = probe(&config.ffmpeg_path).await && probe(&config.ffprobe_path).await;
        if !ffmpeg_available {
            warn!(
                "ffmpeg/ffprobe not found ({} / {}); video text recognition disabled",
                config.ffmpeg_path, config.ffprobe_path
            );
        }
        Self {
            config,
            scheduler,
            ffmpeg_available,
        }
    }

    #[cfg(test)]
    pub fn with_availability(
        config: VideoConfig,
        scheduler: Arc<OcrScheduler>,
        ffmpeg_available: bool,
    ) -> Self {
        Self {
            config,
            scheduler,
            ffmpeg_available,
        }
    }

    pub fn support(&self) -> VideoSupport {
        if self.ffmpeg_available {
            VideoSupport {
                supported: true,
                instruction: None,
            }
        } else {
            VideoSupport {
                supported: false,
                instruction: Some(
                    "Install ffmpeg and ffprobe (e.g. `apt install ffmpeg`) to enable \
                     video frame extraction"
                        .to_string(),
                ),
            }
        }
    }

    /// Samples frames, recognizes each, and combines the results. Never
    /// errors on a missing toolchain.
    pub async fn extract(&self, path: &Path) -> Result<ExtractionResult, ProcessError> {
        let started = Instant::now();

        if !self.ffmpeg_available {
            return Ok(unavailable_result(started.elapsed().as_millis() as u64));
        }

        let duration = self.probe_duration(path).await?;
        let timestamps: Vec<f64> = std::iter::successors(Some(0.0), |t| {
            Some(t + self.config.frame_interval_secs)
        })
        .take_while(|t| *t < duration)
        .take(self.config.max_frames)
        .collect();

        // Scoped temp dir guarantees cleanup on every exit path; individual
        // frames are additionally removed as soon as they are recognized.
        let workdir = tempfile::tempdir()
            .map_err(|e| ProcessError::VideoProcessing(format!("temp dir: {}", e)))?;

        let mut frames = Vec::with_capacity(timestamps.len());
        for (index, timestamp) in timestamps.iter().enumerate() {
            match self.recognize_frame(path, workdir.path(), index, *timestamp).await {
                Ok(frame) => frames.push(frame),
                Err(e) => debug!("Frame at {}s skipped: {}", timestamp, e),
            }
        }

        let (text, confidence) = combine_frames(frames);
        Ok(ExtractionResult::new(
            text,
            confidence,
            started.elapsed().as_millis() as u64,
            ExtractionMethod::VisualOcr,
        ))
    }

    async fn recognize_frame(
        &self,
        video: &Path,
        workdir: &Path,
        index: usize,
        timestamp: f64,
    ) -> Result<VideoFrame, ProcessError> {
        let frame_path = workdir.join(format!("frame_{index:03}.jpg"));

        let status = Command::new(&self.config.ffmpeg_path)
            .args(["-v", "error", "-ss"])
            .arg(format!("{timestamp}"))
            .arg("-i")
            .arg(video)
            .args(["-frames:v", "1", "-q:v", "2", "-y"])
            .arg(&frame_path)
            .status()
            .await
            .map_err(|e| ProcessError::VideoProcessing(format!("spawn ffmpeg: {}", e)))?;

        if !status.success() {
            return Err(ProcessError::VideoProcessing(format!(
                "ffmpeg exited with {} at {}s",
                status, timestamp
            )));
        }

        let image_data = tokio::fs::read(&frame_path)
            .await
            .map_err(|e| ProcessError::VideoProcessing(format!("read frame: {}", e)))?;

        // The frame served its purpose; drop it before recognition of the
        // next one starts.
        let _ = tokio::fs::remove_file(&frame_path).await;

        let output = self.scheduler.recognize(image_data).await?;
        Ok(VideoFrame {
            timestamp_secs: timestamp,
            text: output.text,
            confidence: output.confidence,
        })
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64, ProcessError> {
        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| ProcessError::VideoProcessing(format!("spawn ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(ProcessError::VideoProcessing(format!(
                "ffprobe exited with {}",
                output.status
            )));
        }

        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .map_err(|e| ProcessError::VideoProcessing(format!("parse duration: {}", e)))
    }
}

async fn probe(binary: &str) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

fn unavailable_result(elapsed_ms: u64) -> ExtractionResult {
    ExtractionResult::new(
        format!(
            "{}: ffmpeg was not found on this host. Install ffmpeg and ffprobe to \
             enable video text recognition.",
            VIDEO_UNAVAILABLE_MARKER
        ),
        0,
        elapsed_ms,
        ExtractionMethod::VisualOcr,
    )
}

/// Sorts ascending by timestamp, drops frames at or below the confidence
/// floor, and concatenates `[{t}s] {text}` lines. Overall confidence is the
/// arithmetic mean over the surviving frames.
pub fn combine_frames(mut frames: Vec<VideoFrame>) -> (String, u8) {
    frames.sort_by(|a, b| {
        a.timestamp_secs
            .partial_cmp(&b.timestamp_secs)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let surviving: Vec<&VideoFrame> = frames
        .iter()
        .filter(|f| f.confidence > CONFIDENCE_FLOOR && !f.text.trim().is_empty())
        .collect();

    if surviving.is_empty() {
        return (String::new(), 0);
    }

    let text = surviving
        .iter()
        .map(|f| format!("[{}s] {}", f.timestamp_secs, f.text.trim()))
        .collect::<Vec<_>>()
        .join("\n");

    let mean =
        surviving.iter().map(|f| f.confidence as u32).sum::<u32>() / surviving.len() as u32;

    (text, mean.min(100) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::OcrEngine;

    fn frame(t: f64, text: &str, confidence: u8) -> VideoFrame {
        VideoFrame {
            timestamp_secs: t,
            text: text.to_string(),
            confidence,
        }
    }

    #[test]
    fn test_combine_sorts_by_timestamp() {
        let (text, _) = combine_frames(vec![
            frame(4.0, "third", 80),
            frame(0.0, "first", 80),
            frame(2.0, "second", 80),
        ]);
        assert_eq!(text, "[0s] first\n[2s] second\n[4s] third");
    }

    #[test]
    fn test_combine_drops_low_confidence_frames() {
        let (text, confidence) = combine_frames(vec![
            frame(0.0, "keep", 90),
            frame(2.0, "drop", 30),
            frame(4.0, "keep too", 70),
        ]);
        assert!(!text.contains("drop"));
        assert_eq!(confidence, 80);
    }

    #[test]
    fn test_combine_empty_yields_zero_confidence() {
        let (text, confidence) = combine_frames(vec![frame(0.0, "noise", 10)]);
        assert!(text.is_empty());
        assert_eq!(confidence, 0);
    }

    #[test]
    fn test_combine_is_order_insensitive() {
        let frames = vec![frame(2.0, "b", 60), frame(0.0, "a", 60)];
        let reversed: Vec<VideoFrame> = frames.iter().cloned().rev().collect();
        assert_eq!(combine_frames(frames), combine_frames(reversed));
    }

    #[tokio::test]
    async fn test_missing_toolchain_yields_marker_result() {
        let scheduler = Arc::new(OcrScheduler::new(OcrEngine::new(&[], 2000), 1));
        let sampler = VideoSampler::with_availability(
            VideoConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                ffprobe_path: "ffprobe".to_string(),
                frame_interval_secs: 2.0,
                max_frames: 10,
            },
            scheduler,
            false,
        );

        let result = sampler.extract(Path::new("/tmp/missing.mp4")).await.unwrap();
        assert!(result.text.starts_with(VIDEO_UNAVAILABLE_MARKER));
        assert_eq!(result.confidence, 0);

        let support = sampler.support();
        assert!(!support.supported);
        assert!(support.instruction.unwrap().contains("ffmpeg"));
    }
}
