//! Cheap, framework-agnostic first pass over a file.
//!
//! Triage answers two questions without any framework knowledge: does the
//! file carry `@swagger`/`@openapi` documentation blocks, and which endpoints
//! can a small set of universal route patterns find in it. The endpoint
//! inventory doubles as the fallback when no framework extractor applies.

use crate::extractor::{pattern, Endpoint, HttpMethod, ParseResult};
use log::debug;
use regex::{Captures, Regex};

/// Outcome of triaging one file.
#[derive(Debug, Clone)]
pub struct TriageReport {
    pub has_doc_comments: bool,
    /// Number of documentation blocks
    pub doc_comment_count: usize,
    /// Endpoints found by the universal patterns
    pub fallback: ParseResult,
    /// Route keywords or universal endpoints were found
    pub looks_like_endpoint_file: bool,
}

impl TriageReport {
    pub fn is_api_relevant(&self) -> bool {
        self.has_doc_comments || self.looks_like_endpoint_file
    }
}

/// How a universal pattern exposes its method and path.
enum PatternShape {
    /// Group 1 = receiver, group 2 = verb, group 3 = path
    ReceiverVerbPath,
    /// Group 1 = verb, group 2 = path
    VerbPath,
    /// Group 1 = path, optional group 2 = comma-separated methods (GET when absent)
    PathMethods,
}

struct UniversalPattern {
    regex: Regex,
    shape: PatternShape,
    /// The pattern only applies when the file contains this marker
    requires: Option<&'static str>,
}

/// Receivers that are HTTP clients, not routers.
pub(crate) const CLIENT_RECEIVERS: &[&str] = &[
    "axios", "$http", "http", "fetch", "superagent", "request", "supertest", "cy", "client",
    "httpClient", "api", "agent", "ky", "got", "map", "params", "headers", "searchParams",
    "cache", "localStorage", "sessionStorage", "store", "config", "redis", "_",
];

/// Substrings that make a file look like it declares routes.
const ROUTE_KEYWORDS: &[&str] = &[
    "router.",
    "Router()",
    "app.get(",
    "app.post(",
    "Route::",
    "#[Route",
    "@Route(",
    "export async function GET",
    "export async function POST",
    "export function GET",
    "export function POST",
    "NextApiRequest",
    "server.route(",
    "fastify.",
    "createServer(",
    "@app.route",
    "urlpatterns",
    "extends Controller",
    "extends AbstractController",
    "req.method",
];

pub struct ContentTriage {
    doc_block: Regex,
    universal: Vec<UniversalPattern>,
}

impl Default for ContentTriage {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentTriage {
    pub fn new() -> Self {
        let universal = vec![
            UniversalPattern {
                regex: pattern(
                    r#"([A-Za-z_$][\w$]*)\.(get|post|put|delete|patch|options|head)\(\s*['"`](/[^'"`]*)['"`]"#,
                ),
                shape: PatternShape::ReceiverVerbPath,
                requires: None,
            },
            UniversalPattern {
                regex: pattern(r#"Route::(get|post|put|patch|delete|options)\(\s*['"]([^'"]*)['"]"#),
                shape: PatternShape::VerbPath,
                requires: None,
            },
            UniversalPattern {
                regex: pattern(
                    r#"@\w+\.route\(\s*['"]([^'"]+)['"](?:[^)]*?methods\s*=\s*[\[(]([^\])]*)[\])])?"#,
                ),
                shape: PatternShape::PathMethods,
                requires: None,
            },
            UniversalPattern {
                regex: pattern(
                    r#"#\[Route\(\s*(?:path:\s*)?['"]([^'"]+)['"](?:[^\]]*?methods:\s*\[([^\]]*)\])?"#,
                ),
                shape: PatternShape::PathMethods,
                requires: None,
            },
            UniversalPattern {
                regex: pattern(r#"\b(?:re_)?path\(\s*r?['"]\^?([^'"$]*)\$?['"]"#),
                shape: PatternShape::PathMethods,
                requires: Some("urlpatterns"),
            },
        ];

        Self {
            doc_block: pattern(r"(?s)/\*\*(.*?)\*/"),
            universal,
        }
    }

    pub fn analyze(&self, content: &str) -> TriageReport {
        let doc_comment_count = self.count_doc_blocks(content);
        let fallback = self.extract_universal(content);
        let looks_like_endpoint_file =
            !fallback.is_empty() || ROUTE_KEYWORDS.iter().any(|k| content.contains(k));

        TriageReport {
            has_doc_comments: doc_comment_count > 0,
            doc_comment_count,
            fallback,
            looks_like_endpoint_file,
        }
    }

    /// Number of `/** ... */` blocks carrying `@swagger`, `@openapi` or `@OA\`.
    pub fn count_doc_blocks(&self, content: &str) -> usize {
        self.doc_block
            .captures_iter(content)
            .filter(|c| {
                let body = &c[1];
                body.contains("@swagger") || body.contains("@openapi") || body.contains("@OA\\")
            })
            .count()
    }

    /// Endpoints found by the universal patterns, deduplicated by identity key.
    pub fn extract_universal(&self, content: &str) -> ParseResult {
        let mut result = ParseResult::new(None);

        for universal in &self.universal {
            if let Some(marker) = universal.requires {
                if !content.contains(marker) {
                    continue;
                }
            }
            for caps in universal.regex.captures_iter(content) {
                for (method, path) in Self::method_paths(&universal.shape, &caps) {
                    result.push_endpoint(Endpoint::new(method, &path));
                }
            }
        }

        debug!("Universal patterns found {} endpoints", result.endpoints.len());
        result
    }

    fn method_paths(shape: &PatternShape, caps: &Captures) -> Vec<(HttpMethod, String)> {
        match shape {
            PatternShape::ReceiverVerbPath => {
                if CLIENT_RECEIVERS.contains(&&caps[1]) {
                    return Vec::new();
                }
                HttpMethod::parse(&caps[2])
                    .map(|m| vec![(m, caps[3].to_string())])
                    .unwrap_or_default()
            }
            PatternShape::VerbPath => HttpMethod::parse(&caps[1])
                .map(|m| vec![(m, caps[2].to_string())])
                .unwrap_or_default(),
            PatternShape::PathMethods => {
                let path = caps[1].to_string();
                let methods: Vec<HttpMethod> = caps
                    .get(2)
                    .map(|m| {
                        m.as_str()
                            .split(',')
                            .filter_map(|s| {
                                HttpMethod::parse(s.trim().trim_matches(|c| c == '"' || c == '\''))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                if methods.is_empty() {
                    vec![(HttpMethod::Get, path)]
                } else {
                    methods.into_iter().map(|m| (m, path.clone())).collect()
                }
            }
        }
    }
}
