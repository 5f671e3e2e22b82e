use crate::ai::ChainOutput;
use crate::document::Document;
use crate::processor::ExtractionResult;

pub struct PipelineContext {
    // Input
    pub document: Document,

    // Extraction step result — guaranteed Some after step_extract
    pub extraction: Option<ExtractionResult>,

    // Analysis step result — guaranteed Some after step_analyze (fields
    // inside may individually be empty when chain calls degraded)
    pub chain: Option<ChainOutput>,

    // Non-fatal warnings accumulated along the way
    pub warnings: Vec<String>,
}

impl PipelineContext {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            extraction: None,
            chain: None,
            warnings: Vec::new(),
        }
    }
}
