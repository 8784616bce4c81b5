//! Endpoint extraction for the supported web frameworks.
//!
//! Every framework family has its own extractor implementing
//! [`EndpointExtractor`]. The [`ExtractorRegistry`] maps a detected framework
//! to an ordered list of extractors: the first one yielding endpoints wins.
//!
//! # Supported Frameworks
//!
//! - **Express**: See [`express_ast::ExpressAstExtractor`] and [`express::ExpressExtractor`]
//! - **Symfony**: See [`symfony::SymfonyExtractor`]
//! - **Laravel**: See [`laravel::LaravelExtractor`]
//! - **Next.js**: See [`nextjs::NextJsExtractor`]
//! - **Fastify**: See [`fastify::FastifyExtractor`]
//! - **Koa**: See [`koa::KoaExtractor`]
//! - **Hapi**: See [`hapi::HapiExtractor`]
//! - **Node `http`**: See [`node_http::NodeHttpExtractor`]
//!
//! # Example
//!
//! ```no_run
//! use openapi_from_repo::config::AnalyzerConfig;
//! use openapi_from_repo::extractor::{EndpointExtractor, express::ExpressExtractor};
//! use std::path::Path;
//!
//! let config = AnalyzerConfig::default();
//! let extractor = ExpressExtractor::new(config.window);
//! let source = "router.get('/users', list);";
//! let result = extractor.parse(source, Path::new("routes/users.js")).unwrap();
//! println!("Found {} endpoints", result.endpoints.len());
//! ```

pub mod context;
pub mod express;
pub mod express_ast;
pub mod fastify;
pub mod hapi;
pub mod koa;
pub mod laravel;
pub mod nextjs;
pub mod node_http;
pub mod path;
pub mod symfony;

use crate::config::AnalyzerConfig;
use crate::detector::Framework;
use crate::field_types::{infer_field_type, FieldType};
use crate::openapi_builder::{OpenApiBuilder, OpenApiDocument};
use anyhow::Result;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Trait for extracting endpoints from a single source file.
///
/// Implementations know the routing idiom of one framework family. They never
/// look at other files: the orchestrator hands them the content of one file
/// at a time.
pub trait EndpointExtractor {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Extracts every endpoint declared in `content`.
    ///
    /// # Arguments
    ///
    /// * `content` - The file content
    /// * `file_path` - Path of the file relative to the workspace root
    fn parse(&self, content: &str, file_path: &Path) -> Result<ParseResult>;

    /// Which security scheme authenticated endpoints of this family use
    fn security_style(&self) -> SecurityStyle {
        SecurityStyle::Bearer
    }

    /// Converts a parse result into an OpenAPI document.
    fn synthesize(
        &self,
        result: &ParseResult,
        file_name: &str,
        config: &AnalyzerConfig,
    ) -> OpenApiDocument {
        OpenApiBuilder::new(config)
            .with_security_style(self.security_style())
            .add_parse_result(result, file_name)
            .build()
    }
}

/// Security scheme attached to authenticated operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityStyle {
    /// `Authorization: Bearer <jwt>`
    Bearer,
    /// Session cookie
    Cookie,
}

/// HTTP methods supported by endpoint extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
        HttpMethod::Options,
        HttpMethod::Head,
    ];

    /// Parse HTTP method from string, case-insensitively
    pub fn parse(method: &str) -> Option<HttpMethod> {
        match method.trim().to_lowercase().as_str() {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "delete" | "del" => Some(HttpMethod::Delete),
            "patch" => Some(HttpMethod::Patch),
            "head" => Some(HttpMethod::Head),
            "options" => Some(HttpMethod::Options),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
        }
    }

    /// Key used inside an OpenAPI path item
    pub fn as_lower(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Delete => "delete",
            HttpMethod::Patch => "patch",
            HttpMethod::Options => "options",
            HttpMethod::Head => "head",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The location where a parameter value is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
}

impl ParameterLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
        }
    }
}

/// A single parameter of an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub location: ParameterLocation,
    /// Always true for path parameters
    pub required: bool,
    pub field_type: FieldType,
    pub description: Option<String>,
}

impl Parameter {
    pub fn new(name: &str, location: ParameterLocation, required: bool) -> Self {
        Self {
            name: name.to_string(),
            location,
            required: required || location == ParameterLocation::Path,
            field_type: infer_field_type(name),
            description: None,
        }
    }

    pub fn path(name: &str) -> Self {
        Self::new(name, ParameterLocation::Path, true)
    }

    pub fn query(name: &str) -> Self {
        Self::new(name, ParameterLocation::Query, false)
    }
}

/// A field of a request body or of an inferred response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyField {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
}

impl BodyField {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: infer_field_type(name),
            required: false,
        }
    }

    pub fn typed(name: &str, field_type: FieldType, required: bool) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            required,
        }
    }
}

/// Request body inferred from the handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestBodyInfo {
    /// Name of a related model, when one could be found
    pub schema_name: Option<String>,
    pub fields: Vec<BodyField>,
}

/// A status code the handler is seen to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub status: u16,
    /// Payload keys, when the handler returns an object literal
    pub fields: Vec<BodyField>,
}

impl ResponseInfo {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            fields: Vec::new(),
        }
    }
}

/// A single (HTTP method, path) operation extracted from source code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub method: HttpMethod,
    /// Normalized path using `{name}` parameters
    pub path: String,
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBodyInfo>,
    pub responses: Vec<ResponseInfo>,
    pub requires_auth: bool,
    pub summary: Option<String>,
    pub handler_name: Option<String>,
}

impl Endpoint {
    /// Creates an endpoint with its path normalized and its path parameters filled in.
    pub fn new(method: HttpMethod, raw_path: &str) -> Self {
        let path = path::normalize_path(raw_path);
        let parameters = path::path_parameters(&path)
            .iter()
            .map(|name| Parameter::path(name))
            .collect();
        Self {
            method,
            path,
            parameters,
            request_body: None,
            responses: Vec::new(),
            requires_auth: false,
            summary: None,
            handler_name: None,
        }
    }

    /// Identity key: `METHOD:path`
    pub fn key(&self) -> String {
        format!("{}:{}", self.method.as_str(), self.path)
    }

    /// Adds a parameter unless one with the same name and location exists.
    pub fn add_parameter(&mut self, parameter: Parameter) {
        let exists = self
            .parameters
            .iter()
            .any(|p| p.name == parameter.name && p.location == parameter.location);
        if !exists {
            self.parameters.push(parameter);
        }
    }

    /// Adds a status code unless already present.
    pub fn add_response(&mut self, response: ResponseInfo) {
        match self
            .responses
            .iter_mut()
            .find(|r| r.status == response.status)
        {
            Some(existing) => {
                if existing.fields.is_empty() {
                    existing.fields = response.fields;
                }
            }
            None => self.responses.push(response),
        }
    }

    /// Adds body fields, creating the request body when needed.
    pub fn add_body_fields(&mut self, fields: Vec<BodyField>) {
        if fields.is_empty() {
            return;
        }
        let body = self.request_body.get_or_insert_with(RequestBodyInfo::default);
        for field in fields {
            if !body.fields.iter().any(|f| f.name == field.name) {
                body.fields.push(field);
            }
        }
    }
}

/// Result of analysing one file with one extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub endpoints: Vec<Endpoint>,
    /// Whether authentication middleware was seen anywhere in the file
    pub has_auth: bool,
    /// Framework idiom the file follows; `None` for the universal fallback
    pub flavor: Option<Framework>,
    /// Modules imported or required by the file
    pub imports: Vec<String>,
    /// Mount path when the file itself declares one
    pub mount_path: Option<String>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl ParseResult {
    pub fn new(flavor: Option<Framework>) -> Self {
        Self {
            endpoints: Vec::new(),
            has_auth: false,
            flavor,
            imports: Vec::new(),
            mount_path: None,
            seen: HashSet::new(),
        }
    }

    /// Adds an endpoint; returns false when its identity key was already seen.
    pub fn push_endpoint(&mut self, endpoint: Endpoint) -> bool {
        let key = endpoint.key();
        if !self.seen.insert(key.clone()) {
            debug!("Duplicate endpoint suppressed: {}", key);
            return false;
        }
        self.endpoints.push(endpoint);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Whether the file or any endpoint needs authentication
    pub fn uses_auth(&self) -> bool {
        self.has_auth || self.endpoints.iter().any(|e| e.requires_auth)
    }

    /// Another server framework the file imports instead of `flavor`'s own
    /// modules, if any.
    pub fn foreign_server_import(&self) -> Option<&str> {
        let own = |module: &str| match self.flavor {
            Some(framework) => server_framework(module) == Some(framework),
            None => false,
        };
        if self.imports.iter().any(|m| own(m)) {
            return None;
        }
        self.imports
            .iter()
            .map(String::as_str)
            .find(|m| server_framework(m).is_some_and(|f| Some(f) != self.flavor))
    }
}

/// Server framework a module specifier belongs to.
fn server_framework(module: &str) -> Option<Framework> {
    match module {
        "express" => Some(Framework::Express),
        "koa" | "@koa/router" | "koa-router" => Some(Framework::Koa),
        "fastify" => Some(Framework::Fastify),
        "@hapi/hapi" | "hapi" => Some(Framework::Hapi),
        _ => None,
    }
}

/// Ordered extraction strategies per framework.
pub struct ExtractorRegistry {
    entries: Vec<(Framework, Vec<Box<dyn EndpointExtractor>>)>,
}

impl ExtractorRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registry with every built-in extractor.
    ///
    /// Express is the only family with two strategies: the syntax tree
    /// extractor runs first and the pattern extractor only when the former
    /// finds nothing.
    pub fn with_defaults(config: &AnalyzerConfig) -> Self {
        let window = config.window;
        let mut registry = Self::empty();
        registry.register(
            Framework::Express,
            vec![
                Box::new(express_ast::ExpressAstExtractor::new()),
                Box::new(express::ExpressExtractor::new(window)),
            ],
        );
        registry.register(
            Framework::Symfony,
            vec![Box::new(symfony::SymfonyExtractor::new())],
        );
        registry.register(
            Framework::Laravel,
            vec![Box::new(laravel::LaravelExtractor::new())],
        );
        registry.register(
            Framework::NextJs,
            vec![Box::new(nextjs::NextJsExtractor::new(window))],
        );
        registry.register(
            Framework::Fastify,
            vec![Box::new(fastify::FastifyExtractor::new(window))],
        );
        registry.register(Framework::Koa, vec![Box::new(koa::KoaExtractor::new(window))]);
        registry.register(
            Framework::Hapi,
            vec![Box::new(hapi::HapiExtractor::new())],
        );
        registry.register(
            Framework::NodeHttp,
            vec![Box::new(node_http::NodeHttpExtractor::new())],
        );
        registry
    }

    /// Registers (or replaces) the strategies of a framework.
    pub fn register(&mut self, framework: Framework, strategies: Vec<Box<dyn EndpointExtractor>>) {
        self.entries.retain(|(f, _)| *f != framework);
        self.entries.push((framework, strategies));
    }

    pub fn strategies(&self, framework: Framework) -> &[Box<dyn EndpointExtractor>] {
        self.entries
            .iter()
            .find(|(f, _)| *f == framework)
            .map(|(_, s)| s.as_slice())
            .unwrap_or(&[])
    }
}

/// Compiles one of the built-in patterns.
pub(crate) fn pattern(source: &str) -> Regex {
    Regex::new(source).unwrap_or_else(|e| panic!("built-in pattern {:?} is invalid: {}", source, e))
}
