//! One extraction capability, two interchangeable implementations.

use crate::config::{Config, LlmBackend};
use crate::error::ExtractError;
use crate::heuristics::{self, ExtractionResult, PatternOptions};
use crate::llm_extract::LlmExtractor;
use crate::sheet::SheetLayout;
use async_trait::async_trait;

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Column layout the extractor's results are written with.
    fn layout(&self) -> SheetLayout;

    async fn extract(&self, text: &str) -> Result<ExtractionResult, ExtractError>;
}

/// Deterministic label and block matching. Never fails.
#[derive(Debug, Clone, Default)]
pub struct PatternExtractor {
    options: PatternOptions,
}

impl PatternExtractor {
    pub fn new(options: PatternOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Extractor for PatternExtractor {
    fn layout(&self) -> SheetLayout {
        SheetLayout::Header
    }

    async fn extract(&self, text: &str) -> Result<ExtractionResult, ExtractError> {
        Ok(ExtractionResult::header_only(heuristics::extract_invoice(
            text,
            &self.options,
        )))
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    fn layout(&self) -> SheetLayout {
        SheetLayout::Itemized
    }

    async fn extract(&self, text: &str) -> Result<ExtractionResult, ExtractError> {
        LlmExtractor::extract(self, text).await
    }
}

/// Build the configured extractor. Credential and reachability problems
/// surface here, before any document is touched.
pub async fn build_extractor(cfg: &Config) -> Result<Box<dyn Extractor>, ExtractError> {
    match cfg.llm.backend {
        LlmBackend::Pattern => Ok(Box::new(PatternExtractor::new(cfg.extraction.clone()))),
        LlmBackend::Remote | LlmBackend::Ollama => {
            let extractor = LlmExtractor::new(&cfg.llm, cfg.llm_credentials())?;
            extractor.check_health().await?;
            Ok(Box::new(extractor))
        }
    }
}
