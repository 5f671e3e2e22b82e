//! Local Tesseract recognition with image preprocessing.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage};

use crate::error::ProcessError;

/// Text plus measured confidence from one recognition pass.
#[derive(Debug, Clone)]
pub struct OcrOutput {
    pub text: String,
    /// Tesseract mean word confidence, clamped to 0-100.
    pub confidence: u8,
}

#[derive(Clone)]
pub struct OcrEngine {
    languages: String,
    max_dimension: u32,
}

impl OcrEngine {
    pub fn new(languages: &[String], max_dimension: u32) -> Self {
        let languages = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };
        Self {
            languages,
            max_dimension,
        }
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }

    /// Recognizes text in raw image bytes. Blocking; callers go through the
    /// scheduler so concurrent jobs cannot saturate CPU.
    pub fn recognize_bytes(&self, image_data: &[u8]) -> Result<OcrOutput, ProcessError> {
        let _span = tracing::info_span!("ocr.recognize").entered();

        let img = image::load_from_memory(image_data)
            .map_err(|e| ProcessError::OcrFailed(format!("Failed to load image: {}", e)))?;

        let prepared = preprocess(img, self.max_dimension);

        // Leptess wants a self-describing buffer; PNG keeps the binarized
        // output lossless.
        let mut png_data = Vec::new();
        DynamicImage::ImageLuma8(prepared)
            .write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)
            .map_err(|e| ProcessError::OcrFailed(format!("Failed to encode image: {}", e)))?;

        let mut lt = leptess::LepTess::new(None, &self.languages).map_err(|e| {
            ProcessError::OcrFailed(format!("Failed to initialize Tesseract: {}", e))
        })?;

        lt.set_image_from_mem(&png_data)
            .map_err(|e| ProcessError::OcrFailed(format!("Failed to set image for OCR: {}", e)))?;

        let text = lt
            .get_utf8_text()
            .map_err(|e| ProcessError::OcrFailed(format!("OCR failed: {}", e)))?;

        let confidence = lt.mean_text_conf().clamp(0, 100) as u8;

        Ok(OcrOutput {
            text: text.trim().to_string(),
            confidence,
        })
    }
}

/// Bounded downscale preserving aspect ratio, sharpen, contrast stretch,
/// then binarize against the mean luma.
pub fn preprocess(img: DynamicImage, max_dimension: u32) -> GrayImage {
    let (width, height) = img.dimensions();

    let img = if width.max(height) > max_dimension {
        img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        img
    };

    let img = img.unsharpen(1.2, 2).adjust_contrast(15.0);

    binarize(img.to_luma8())
}

fn binarize(gray: GrayImage) -> GrayImage {
    let total: u64 = gray.pixels().map(|p| p.0[0] as u64).sum();
    let count = (gray.width() as u64 * gray.height() as u64).max(1);
    let threshold = (total / count) as u8;

    let mut out = gray;
    for pixel in out.pixels_mut() {
        pixel.0[0] = if pixel.0[0] > threshold { 255 } else { 0 };
    }
    out
}
