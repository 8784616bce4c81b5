//! openapi-from-repo - OpenAPI documents inferred from web project sources.
//!
//! This library clones a repository (or reads a local directory), finds the
//! files that declare HTTP endpoints and produces one OpenAPI 3.0 document per
//! file, each with a documentation quality score. Nothing is executed: the
//! routes are recovered by static analysis of the source text.
//!
//! # Supported Frameworks
//!
//! - **Express**: router and app verb calls, read from the syntax tree with a pattern fallback
//! - **Next.js**: file-based API routes of the Pages and App routers
//! - **Fastify**, **Koa**, **hapi** and bare **Node.js `http`** servers
//! - **Laravel**: route files and resource controllers
//! - **Symfony**: `#[Route]` attributes and `@Route` annotations
//!
//! Files of other projects are still covered by universal route patterns and
//! by `@swagger` / `@openapi` / `@OA\` documentation blocks.
//!
//! # Architecture
//!
//! 1. [`fetcher`] - Shallow clones into a workspace that is removed on drop
//! 2. [`detector`] - Detects frameworks from manifests and imports
//! 3. [`scanner`] - Walks priority directories and triages candidate files
//! 4. [`triage`] and [`doc_comments`] - Universal patterns and documentation blocks
//! 5. [`extractor`] - Framework-specific endpoint extraction
//! 6. [`openapi_builder`] and [`schema_generator`] - Per-file document synthesis
//! 7. [`scorer`] - Documentation quality score
//! 8. [`analyzer`] - Runs the pipeline and aggregates the results
//! 9. [`serializer`] - Writes results as YAML or JSON
//!
//! # Example Usage
//!
//! ```no_run
//! use openapi_from_repo::analyzer::Analyzer;
//! use openapi_from_repo::config::AnalyzerConfig;
//! use openapi_from_repo::serializer::serialize_yaml;
//!
//! let analyzer = Analyzer::new(AnalyzerConfig::default());
//! let result = analyzer.analyze_repository("https://github.com/acme/shop-api.git", Some("main"));
//! println!("{}", serialize_yaml(&result).unwrap());
//! ```
//!
//! # Command-Line Interface
//!
//! For command-line usage, see the [`cli`] module which provides a complete CLI application.

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod detector;
pub mod doc_comments;
pub mod enrichment;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod field_types;
pub mod openapi_builder;
pub mod parser;
pub mod scanner;
pub mod schema_generator;
pub mod scorer;
pub mod serializer;
pub mod triage;
