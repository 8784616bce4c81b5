//! Optional post-processing of synthesized documents by an external collaborator.
//!
//! The analyzer never depends on an enricher being present. When one is
//! configured it is called once per file, and its failures or empty answers
//! leave the synthesized document untouched.

use crate::detector::Framework;
use crate::extractor::ParseResult;
use crate::openapi_builder::OpenApiDocument;
use anyhow::Result;
use log::debug;
use serde::Serialize;
use std::thread;
use std::time::{Duration, Instant};

/// What an enricher knows about the file being documented.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    pub framework: Option<Framework>,
    /// Path relative to the repository root
    pub file_path: String,
    pub imports: Vec<String>,
    /// Remote URL, when the repository was cloned
    pub repository: Option<String>,
}

/// Improves a synthesized document, typically with generated descriptions.
pub trait Enricher {
    /// Returns a replacement document, or `None` to keep the original.
    ///
    /// # Errors
    ///
    /// Errors are logged by the caller and otherwise ignored.
    fn enrich(
        &self,
        document: &OpenApiDocument,
        parse_result: &ParseResult,
        context: &ProjectContext,
    ) -> Result<Option<OpenApiDocument>>;
}

/// Keeps a minimum delay between successive enrichment calls.
#[derive(Debug)]
pub struct EnrichmentPacer {
    delay: Duration,
    last_call: Option<Instant>,
}

impl EnrichmentPacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_call: None,
        }
    }

    /// Sleeps until `delay` has passed since the previous call.
    ///
    /// Returns the time spent sleeping.
    pub fn wait(&mut self) -> Duration {
        let slept = match self.last_call {
            Some(last) => {
                let remaining = self.delay.saturating_sub(last.elapsed());
                if !remaining.is_zero() {
                    debug!("Waiting {:?} before the next enrichment call", remaining);
                    thread::sleep(remaining);
                }
                remaining
            }
            None => Duration::ZERO,
        };
        self.last_call = Some(Instant::now());
        slept
    }
}
