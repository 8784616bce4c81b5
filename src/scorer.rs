//! Documentation-quality scoring of synthesized documents.
//!
//! A document earns up to 100 points over seven weighted categories. Two of
//! them are binary (routes, schemas), `info` is split over its three fields and
//! the other four are the share of operations meeting the category's criterion.

use crate::config::AnalyzerConfig;
use crate::openapi_builder::{auto_summary, OpenApiDocument, Operation};
use crate::extractor::HttpMethod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum number of suggestions attached to a score.
pub const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Routes,
    Descriptions,
    Parameters,
    Responses,
    Examples,
    Schemas,
    Info,
}

impl Category {
    /// Fixed order, also the order suggestions are emitted in
    pub const ALL: [Category; 7] = [
        Category::Routes,
        Category::Descriptions,
        Category::Parameters,
        Category::Responses,
        Category::Examples,
        Category::Schemas,
        Category::Info,
    ];

    pub fn max_score(&self) -> u32 {
        match self {
            Category::Routes | Category::Descriptions => 20,
            Category::Parameters | Category::Responses => 15,
            Category::Examples | Category::Schemas | Category::Info => 10,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Category::Routes => "routes",
            Category::Descriptions => "descriptions",
            Category::Parameters => "parameters",
            Category::Responses => "responses",
            Category::Examples => "examples",
            Category::Schemas => "schemas",
            Category::Info => "info",
        }
    }
}

/// Quality band of a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Good,
    Partial,
    Basic,
}

impl QualityLevel {
    pub fn from_score(total: u32) -> Self {
        if total >= 71 {
            QualityLevel::Good
        } else if total >= 41 {
            QualityLevel::Partial
        } else {
            QualityLevel::Basic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::Good => "good",
            QualityLevel::Partial => "partial",
            QualityLevel::Basic => "basic",
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub score: u32,
    pub max: u32,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// Sum of the category scores, within `[0, 100]`
    pub total: u32,
    pub breakdown: BTreeMap<String, CategoryScore>,
    pub suggestions: Vec<String>,
    pub level: QualityLevel,
}

impl QualityScore {
    pub fn category(&self, category: Category) -> u32 {
        self.breakdown
            .get(category.name())
            .map(|c| c.score)
            .unwrap_or(0)
    }
}

/// Counts of operations meeting each operation-level criterion.
#[derive(Debug, Default)]
struct OperationCounts {
    total: usize,
    described: usize,
    parameters_described: usize,
    with_response_schema: usize,
    with_example: usize,
}

pub struct QualityScorer<'a> {
    config: &'a AnalyzerConfig,
}

impl<'a> QualityScorer<'a> {
    pub fn new(config: &'a AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Scores one document.
    pub fn score(&self, doc: &OpenApiDocument) -> QualityScore {
        let counts = self.count_operations(doc);
        let has_schemas = doc.component_schemas().is_some();

        let info = &doc.info;
        let title_ok = !self.config.is_placeholder(&info.title);
        let description_ok = info
            .description
            .as_deref()
            .map(|d| !self.config.is_placeholder(d))
            .unwrap_or(false);
        let version_ok = !self.config.is_placeholder(&info.version);

        let mut breakdown = BTreeMap::new();
        let mut total = 0u32;
        for category in Category::ALL {
            let max = category.max_score();
            let score = match category {
                Category::Routes => binary(!doc.paths.is_empty(), max),
                Category::Descriptions => share(counts.described, counts.total, max),
                Category::Parameters => share(counts.parameters_described, counts.total, max),
                Category::Responses => share(counts.with_response_schema, counts.total, max),
                Category::Examples => share(counts.with_example, counts.total, max),
                Category::Schemas => binary(has_schemas, max),
                Category::Info => {
                    binary(title_ok, 3) + binary(description_ok, 4) + binary(version_ok, 3)
                }
            };
            total += score;
            breakdown.insert(
                category.name().to_string(),
                CategoryScore {
                    score,
                    max,
                    percentage: (score * 100 + max / 2) / max,
                },
            );
        }
        let total = total.min(100);

        QualityScore {
            total,
            suggestions: self.suggestions(doc, &counts, has_schemas, &breakdown),
            level: QualityLevel::from_score(total),
            breakdown,
        }
    }

    fn count_operations(&self, doc: &OpenApiDocument) -> OperationCounts {
        let mut counts = OperationCounts::default();
        for (path, method, operation) in doc.operations() {
            counts.total += 1;
            if self.is_described(path, method, operation) {
                counts.described += 1;
            }
            let parameter_described = operation
                .parameters
                .iter()
                .flatten()
                .any(|p| {
                    p.description
                        .as_deref()
                        .map(|d| !self.config.is_placeholder(d))
                        .unwrap_or(false)
                });
            if parameter_described {
                counts.parameters_described += 1;
            }
            if operation.responses.values().any(|r| r.has_schema()) {
                counts.with_response_schema += 1;
            }
            if operation.responses.values().any(|r| r.has_example()) {
                counts.with_example += 1;
            }
        }
        counts
    }

    /// Non-placeholder description, or a summary that is neither a placeholder
    /// nor the auto-generated `METHOD path` text.
    fn is_described(&self, path: &str, method: HttpMethod, operation: &Operation) -> bool {
        let description_ok = operation
            .description
            .as_deref()
            .map(|d| !self.config.is_placeholder(d))
            .unwrap_or(false);
        let summary_ok = operation
            .summary
            .as_deref()
            .map(|s| !self.config.is_placeholder(s) && s.trim() != auto_summary(method, path))
            .unwrap_or(false);
        description_ok || summary_ok
    }

    fn suggestions(
        &self,
        doc: &OpenApiDocument,
        counts: &OperationCounts,
        has_schemas: bool,
        breakdown: &BTreeMap<String, CategoryScore>,
    ) -> Vec<String> {
        let missing = |done: usize| counts.total.saturating_sub(done);
        let mut suggestions = Vec::new();

        for category in Category::ALL {
            let suggestion = match category {
                Category::Routes if doc.paths.is_empty() => {
                    Some("No se detectaron rutas: revisa que el archivo declare endpoints".to_string())
                }
                Category::Descriptions if missing(counts.described) > 0 => Some(format!(
                    "Añade descripciones a {} de {} operaciones",
                    missing(counts.described),
                    counts.total
                )),
                Category::Parameters if missing(counts.parameters_described) > 0 => Some(format!(
                    "Documenta los parámetros de {} operaciones",
                    missing(counts.parameters_described)
                )),
                Category::Responses if missing(counts.with_response_schema) > 0 => Some(format!(
                    "Define el esquema de respuesta de {} operaciones",
                    missing(counts.with_response_schema)
                )),
                Category::Examples if missing(counts.with_example) > 0 => Some(format!(
                    "Incluye ejemplos de respuesta en {} operaciones",
                    missing(counts.with_example)
                )),
                Category::Schemas if !has_schemas => {
                    Some("Define esquemas reutilizables en components.schemas".to_string())
                }
                Category::Info
                    if breakdown
                        .get(category.name())
                        .map(|c| c.score < c.max)
                        .unwrap_or(true) =>
                {
                    Some("Completa el título, la descripción y la versión de la API".to_string())
                }
                _ => None,
            };
            if let Some(suggestion) = suggestion {
                suggestions.push(suggestion);
            }
            if suggestions.len() == MAX_SUGGESTIONS {
                break;
            }
        }
        suggestions
    }
}

fn binary(condition: bool, max: u32) -> u32 {
    if condition {
        max
    } else {
        0
    }
}

/// `round(matching / total * max)`; zero when there is nothing to measure.
fn share(matching: usize, total: usize, max: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    ((matching as f64 / total as f64) * max as f64).round() as u32
}
