//! Repository analysis pipeline.
//!
//! An analysis runs on one thread: the repository is fetched (or taken from
//! a local directory), its frameworks are detected, candidate files are
//! scanned, and every file is turned into its own OpenAPI document and
//! scored. Only a failed clone makes the whole analysis fail; problems with
//! single files are logged and the file is left out.

use crate::config::AnalyzerConfig;
use crate::detector::{Framework, FrameworkDetection, FrameworkDetector};
use crate::doc_comments::DocCommentExtractor;
use crate::enrichment::{Enricher, EnrichmentPacer, ProjectContext};
use crate::error::{Error, Result};
use crate::extractor::{ExtractorRegistry, ParseResult};
use crate::fetcher::RepoFetcher;
use crate::openapi_builder::{OpenApiBuilder, OpenApiDocument};
use crate::scanner::{FileScanner, RepoFile};
use crate::scorer::{QualityLevel, QualityScorer};
use crate::triage::ContentTriage;
use log::{debug, info, warn};
use serde::Serialize;
use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

/// Outcome of one repository analysis.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AnalysisResult {
    Success(AnalysisReport),
    Failure(AnalysisFailure),
}

impl AnalysisResult {
    pub fn failure(error: &Error) -> Self {
        AnalysisResult::Failure(AnalysisFailure {
            success: false,
            error: error.kind().to_string(),
            message: error.to_string(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisResult::Success(_))
    }

    pub fn report(&self) -> Option<&AnalysisReport> {
        match self {
            AnalysisResult::Success(report) => Some(report),
            AnalysisResult::Failure(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    /// Always `true`
    pub success: bool,
    /// Branch that was cloned; absent for local directories
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub framework: FrameworkDetection,
    pub files: Vec<FileReport>,
    pub stats: AnalysisStats,
    pub overall_quality: QualityLevel,
}

impl AnalysisReport {
    pub fn file(&self, path: &str) -> Option<&FileReport> {
        self.files.iter().find(|f| f.path == path)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisFailure {
    /// Always `false`
    pub success: bool,
    /// Machine-readable error tag, e.g. `fetch_failure`
    pub error: String,
    pub message: String,
}

/// One documented source file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub path: String,
    pub has_doc_comments: bool,
    pub endpoint_count: usize,
    pub quality_score: u32,
    pub quality_level: QualityLevel,
    pub suggestions: Vec<String>,
    pub spec: OpenApiDocument,
}

impl FileReport {
    fn from_repo_file(file: RepoFile) -> Option<Self> {
        let score = file.quality_score?;
        Some(Self {
            path: file.path,
            has_doc_comments: file.has_doc_comments,
            endpoint_count: file.endpoint_count,
            quality_score: score.total,
            quality_level: score.level,
            suggestions: score.suggestions,
            spec: file.spec?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStats {
    pub total_files: usize,
    pub files_with_comments: usize,
    /// Operations across every synthesized document
    pub total_endpoints: usize,
    /// Mean file score, rounded to two decimals
    pub average_quality: f64,
}

impl AnalysisStats {
    fn collect(files: &[FileReport]) -> Self {
        if files.is_empty() {
            return Self::default();
        }
        let sum: u32 = files.iter().map(|f| f.quality_score).sum();
        let mean = f64::from(sum) / files.len() as f64;
        Self {
            total_files: files.len(),
            files_with_comments: files.iter().filter(|f| f.has_doc_comments).count(),
            total_endpoints: files.iter().map(|f| f.endpoint_count).sum(),
            average_quality: (mean * 100.0).round() / 100.0,
        }
    }
}

/// Drives a full repository analysis.
///
/// # Example
///
/// ```no_run
/// use openapi_from_repo::analyzer::Analyzer;
/// use openapi_from_repo::config::AnalyzerConfig;
///
/// let analyzer = Analyzer::new(AnalyzerConfig::default());
/// let result = analyzer.analyze_repository("https://github.com/gothinkster/node-express-realworld-example-app", None);
/// if let Some(report) = result.report() {
///     println!("{} endpoints, overall {}", report.stats.total_endpoints, report.overall_quality);
/// }
/// ```
pub struct Analyzer {
    config: AnalyzerConfig,
    registry: ExtractorRegistry,
    triage: ContentTriage,
    doc_comments: DocCommentExtractor,
    enricher: Option<Box<dyn Enricher>>,
    framework: Option<Framework>,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let registry = ExtractorRegistry::with_defaults(&config);
        Self {
            config,
            registry,
            triage: ContentTriage::new(),
            doc_comments: DocCommentExtractor::new(),
            enricher: None,
            framework: None,
        }
    }

    pub fn with_enricher(mut self, enricher: Box<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Skips detection and treats the repository as using `framework`.
    pub fn with_framework(mut self, framework: Option<Framework>) -> Self {
        self.framework = framework;
        self
    }

    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Clones `url` into a fresh workspace and analyses it.
    ///
    /// The workspace is removed before this returns, on success and failure
    /// alike.
    pub fn analyze_repository(&self, url: &str, branch: Option<&str>) -> AnalysisResult {
        let repository = match RepoFetcher::new(&self.config).fetch(url, branch) {
            Ok(repository) => repository,
            Err(e) => {
                warn!("{}", e);
                return AnalysisResult::failure(&e);
            }
        };
        info!("Analyzing {} at branch {}", url, repository.branch);
        let mut result = self.analyze_tree(repository.root(), Some(url));
        if let AnalysisResult::Success(report) = &mut result {
            report.branch = Some(repository.branch.clone());
        }
        result
    }

    /// Analyses a directory in place. Nothing under `root` is modified.
    pub fn analyze_directory(&self, root: &Path) -> AnalysisResult {
        self.analyze_tree(root, None)
    }

    fn analyze_tree(&self, root: &Path, repository: Option<&str>) -> AnalysisResult {
        let detection = match self.framework {
            Some(framework) => {
                info!("Framework forced to {}", framework.name());
                FrameworkDetection::forced(framework)
            }
            None => FrameworkDetector::new(&self.config).detect(root),
        };
        match detection.primary {
            Some(primary) => info!("Primary framework: {}", primary.name()),
            None => info!("No known framework detected"),
        }

        let scan = match FileScanner::new(root.to_path_buf(), &self.config, &detection, &self.triage)
            .scan()
        {
            Ok(scan) => scan,
            Err(e) => {
                let error = Error::InvalidArgument(format!("{:#}", e));
                warn!("{}", error);
                return AnalysisResult::failure(&error);
            }
        };
        for warning in &scan.warnings {
            warn!("{}", warning);
        }
        info!("Analyzing {} candidate files", scan.files.len());

        let mut pacer = EnrichmentPacer::new(self.config.enrichment_delay());
        let mut files = Vec::new();
        for file in scan.files {
            let path = file.path.clone();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.analyze_file(root, file, &detection, repository, &mut pacer)
            }));
            match outcome {
                Ok(Ok(Some(report))) => files.push(report),
                Ok(Ok(None)) => debug!("{}: nothing to document", path),
                Ok(Err(e)) => warn!("Skipping {}: {}", path, e),
                Err(payload) => {
                    warn!("Skipping {}: analysis panicked: {}", path, panic_message(&*payload))
                }
            }
        }

        let stats = AnalysisStats::collect(&files);
        let overall_quality = QualityLevel::from_score(stats.average_quality.round() as u32);
        info!(
            "Documented {} files, {} endpoints, average quality {}",
            stats.total_files, stats.total_endpoints, stats.average_quality
        );

        AnalysisResult::Success(AnalysisReport {
            success: true,
            branch: None,
            framework: detection,
            files,
            stats,
            overall_quality,
        })
    }

    fn analyze_file(
        &self,
        root: &Path,
        mut file: RepoFile,
        detection: &FrameworkDetection,
        repository: Option<&str>,
        pacer: &mut EnrichmentPacer,
    ) -> Result<Option<FileReport>> {
        let full_path = root.join(&file.path);
        let parse_error = |message: String| Error::Parse {
            file: full_path.clone(),
            message,
        };
        let bytes = fs::read(&full_path).map_err(|e| parse_error(e.to_string()))?;
        let content = String::from_utf8(bytes).map_err(|e| parse_error(e.to_string()))?;

        let comments = self.doc_comments.extract(&content, &file.path);
        let (mut document, parse_result) = match self.synthesize(&content, &file.path, detection) {
            Some((mut document, parse_result)) => {
                let merged = comments.merge_into(&mut document);
                if merged > 0 {
                    debug!("{}: {} operations completed from doc comments", file.path, merged);
                }
                (document, parse_result)
            }
            None if !comments.is_empty() => {
                debug!("{}: documented from doc comments only", file.path);
                (comments.to_document(&file.path), ParseResult::new(None))
            }
            None => return Ok(None),
        };

        if let Some(enricher) = &self.enricher {
            pacer.wait();
            let context = ProjectContext {
                framework: parse_result.flavor.or(detection.primary),
                file_path: file.path.clone(),
                imports: parse_result.imports.clone(),
                repository: repository.map(str::to_string),
            };
            match enricher.enrich(&document, &parse_result, &context) {
                Ok(Some(enriched)) => document = enriched,
                Ok(None) => debug!("{}: enrichment kept the document", file.path),
                Err(e) => warn!("{}: {}", file.path, Error::Enrichment(format!("{:#}", e))),
            }
        }

        let score = QualityScorer::new(&self.config).score(&document);
        debug!("{}: quality {} ({})", file.path, score.total, score.level);
        file.has_doc_comments |= !comments.is_empty();
        file.endpoint_count = document.operation_count();
        file.quality_score = Some(score);
        file.spec = Some(document);
        Ok(FileReport::from_repo_file(file))
    }

    /// Runs the extractors of every detected framework, then the universal
    /// fallback. Returns `None` when no endpoint was found.
    fn synthesize(
        &self,
        content: &str,
        file_path: &str,
        detection: &FrameworkDetection,
    ) -> Option<(OpenApiDocument, ParseResult)> {
        let extension = Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        for framework in &detection.frameworks {
            if !framework.ecosystem().extensions().contains(&extension) {
                continue;
            }
            for strategy in self.registry.strategies(*framework) {
                match strategy.parse(content, Path::new(file_path)) {
                    Ok(result) if !result.is_empty() => {
                        debug!(
                            "{}: {} endpoints via {}",
                            file_path,
                            result.endpoints.len(),
                            strategy.name()
                        );
                        let document = strategy.synthesize(&result, file_path, &self.config);
                        return Some((document, result));
                    }
                    Ok(_) => debug!("{}: {} found nothing", file_path, strategy.name()),
                    Err(e) => warn!(
                        "{}",
                        Error::Parse {
                            file: file_path.into(),
                            message: format!("{} extractor: {:#}", strategy.name(), e),
                        }
                    ),
                }
            }
        }

        let fallback = self.triage.extract_universal(content);
        if fallback.is_empty() {
            return None;
        }
        debug!(
            "{}: {} endpoints via universal patterns",
            file_path,
            fallback.endpoints.len()
        );
        let document = OpenApiBuilder::new(&self.config)
            .add_parse_result(&fallback, file_path)
            .build();
        Some((document, fallback))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::EndpointExtractor;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn express_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "package.json",
            r#"{"dependencies": {"express": "^4.18.0"}}"#,
        );
        write(
            dir.path(),
            "routes/users.js",
            "const router = require('express').Router();\n\
             router.get('/users', (req, res) => res.json(users));\n\
             router.post('/users', (req, res) => res.status(201).json(req.body));\n\
             module.exports = router;\n",
        );
        dir
    }

    fn success(result: AnalysisResult) -> AnalysisReport {
        match result {
            AnalysisResult::Success(report) => report,
            AnalysisResult::Failure(failure) => panic!("analysis failed: {}", failure.message),
        }
    }

    #[test]
    fn test_express_directory() {
        let dir = express_repo();
        let report = success(Analyzer::new(AnalyzerConfig::default()).analyze_directory(dir.path()));

        assert_eq!(report.framework.primary, Some(Framework::Express));
        assert_eq!(report.files.len(), 1);
        let file = report.file("routes/users.js").unwrap();
        assert_eq!(file.endpoint_count, 2);
        assert_eq!(report.stats.total_endpoints, 2);
        assert_eq!(report.stats.total_files, 1);
        assert_eq!(report.stats.average_quality, f64::from(file.quality_score));
    }

    #[test]
    fn test_empty_directory_is_a_success() {
        let dir = TempDir::new().unwrap();
        let report = success(Analyzer::new(AnalyzerConfig::default()).analyze_directory(dir.path()));
        assert!(report.files.is_empty());
        assert_eq!(report.stats, AnalysisStats::default());
        assert_eq!(report.overall_quality, QualityLevel::Basic);
    }

    #[test]
    fn test_missing_directory_fails() {
        let result = Analyzer::new(AnalyzerConfig::default())
            .analyze_directory(Path::new("/definitely/not/a/checkout"));
        assert!(!result.is_success());
    }

    #[test]
    fn test_invalid_utf8_file_is_skipped() {
        let dir = express_repo();
        fs::write(dir.path().join("routes/binary.js"), [0xff, 0xfe, 0x00, 0x61]).unwrap();
        let report = success(Analyzer::new(AnalyzerConfig::default()).analyze_directory(dir.path()));
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].path, "routes/users.js");
    }

    #[test]
    fn test_doc_comments_only_file() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "api/docs.js",
            "/**\n * @swagger\n * /health:\n *   get:\n *     summary: Liveness probe\n *     responses:\n *       200:\n *         description: OK\n */\n",
        );
        let report = success(Analyzer::new(AnalyzerConfig::default()).analyze_directory(dir.path()));
        assert_eq!(report.files.len(), 1);
        assert!(report.files[0].has_doc_comments);
        assert_eq!(report.files[0].endpoint_count, 1);
        assert_eq!(report.stats.files_with_comments, 1);
    }

    struct Retitle {
        calls: Cell<usize>,
    }

    impl Enricher for Retitle {
        fn enrich(
            &self,
            document: &OpenApiDocument,
            _parse_result: &ParseResult,
            context: &ProjectContext,
        ) -> anyhow::Result<Option<OpenApiDocument>> {
            self.calls.set(self.calls.get() + 1);
            assert_eq!(context.framework, Some(Framework::Express));
            let mut enriched = document.clone();
            enriched.info.title = format!("Enriched {}", context.file_path);
            Ok(Some(enriched))
        }
    }

    struct Failing;

    impl Enricher for Failing {
        fn enrich(
            &self,
            _document: &OpenApiDocument,
            _parse_result: &ParseResult,
            _context: &ProjectContext,
        ) -> anyhow::Result<Option<OpenApiDocument>> {
            anyhow::bail!("service unavailable")
        }
    }

    fn no_delay() -> AnalyzerConfig {
        AnalyzerConfig {
            enrichment_delay_ms: 0,
            ..AnalyzerConfig::default()
        }
    }

    #[test]
    fn test_enricher_replaces_document() {
        let dir = express_repo();
        let report = success(
            Analyzer::new(no_delay())
                .with_enricher(Box::new(Retitle { calls: Cell::new(0) }))
                .analyze_directory(dir.path()),
        );
        assert_eq!(report.files[0].spec.info.title, "Enriched routes/users.js");
    }

    #[test]
    fn test_failing_enricher_keeps_document() {
        let dir = express_repo();
        let plain = success(Analyzer::new(no_delay()).analyze_directory(dir.path()));
        let enriched = success(
            Analyzer::new(no_delay())
                .with_enricher(Box::new(Failing))
                .analyze_directory(dir.path()),
        );
        assert_eq!(plain.files[0].spec, enriched.files[0].spec);
        assert_eq!(plain.files[0].quality_score, enriched.files[0].quality_score);
    }

    struct Nothing;

    impl EndpointExtractor for Nothing {
        fn name(&self) -> &'static str {
            "nothing"
        }

        fn parse(&self, _content: &str, _file_path: &Path) -> anyhow::Result<ParseResult> {
            anyhow::bail!("unsupported syntax")
        }
    }

    #[test]
    fn test_failing_strategy_falls_back_to_universal_patterns() {
        let dir = express_repo();
        let mut registry = ExtractorRegistry::empty();
        registry.register(Framework::Express, vec![Box::new(Nothing)]);
        let report = success(
            Analyzer::new(AnalyzerConfig::default())
                .with_registry(registry)
                .analyze_directory(dir.path()),
        );
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].endpoint_count, 2);
    }

    struct Exploding;

    impl EndpointExtractor for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn parse(&self, _content: &str, _file_path: &Path) -> anyhow::Result<ParseResult> {
            panic!("byte index is not a char boundary")
        }
    }

    #[test]
    fn test_panicking_file_is_skipped() {
        let dir = express_repo();
        let mut registry = ExtractorRegistry::empty();
        registry.register(Framework::Express, vec![Box::new(Exploding)]);
        let report = success(
            Analyzer::new(AnalyzerConfig::default())
                .with_registry(registry)
                .analyze_directory(dir.path()),
        );
        assert!(report.files.is_empty());
        assert_eq!(report.stats.total_files, 0);
    }

    #[test]
    fn test_forced_framework() {
        let dir = express_repo();
        let report = success(
            Analyzer::new(AnalyzerConfig::default())
                .with_framework(Some(Framework::Koa))
                .analyze_directory(dir.path()),
        );
        assert_eq!(report.framework.primary, Some(Framework::Koa));
        assert_eq!(report.files[0].endpoint_count, 2);
    }

    #[test]
    fn test_failure_serialization() {
        let error = Error::Fetch {
            url: "https://example.invalid/x.git".to_string(),
            branch: "main".to_string(),
            message: "not found".to_string(),
        };
        let json = serde_json::to_value(AnalysisResult::failure(&error)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "fetch_failure");
        assert!(json["message"].as_str().unwrap().contains("not found"));
    }

    #[test]
    fn test_success_serialization_is_camel_case() {
        let dir = express_repo();
        let result = Analyzer::new(AnalyzerConfig::default()).analyze_directory(dir.path());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["stats"]["totalEndpoints"], 2);
        assert!(json["overallQuality"].is_string());
        assert_eq!(json["files"][0]["endpointCount"], 2);
        assert!(json["files"][0]["spec"]["paths"].is_object());
    }
}
