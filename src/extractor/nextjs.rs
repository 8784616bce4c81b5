use super::context::{block_after, destructured_names, neighbour_window, ContextAnalyzer, NEXT_IDIOM};
use super::path::normalize_path;
use super::{pattern, BodyField, Endpoint, EndpointExtractor, HttpMethod, ParseResult, ResponseInfo};
use crate::config::ContextWindow;
use crate::detector::Framework;
use anyhow::Result;
use log::debug;
use regex::Regex;
use std::path::Path;

/// Which Next.js router a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Router {
    /// `pages/api/**`: one default-export handler per file
    Pages,
    /// `app/**/route.ts`: one named export per HTTP method
    App,
}

/// Next.js file-route extractor
///
/// The URL comes from where the file lives, the methods from the handler.
pub struct NextJsExtractor {
    window: ContextWindow,
    method_check: Regex,
    method_guard: Regex,
    method_switch: Regex,
    method_case: Regex,
    named_export: Regex,
    session_check: Regex,
    auth_wrapper: Regex,
    status_option: Regex,
    json_binding: Regex,
    analyzer: ContextAnalyzer,
}

/// A method handled at some position of the file.
struct MethodBranch {
    method: HttpMethod,
    start: usize,
    end: usize,
}

impl NextJsExtractor {
    pub fn new(window: ContextWindow) -> Self {
        Self {
            window,
            method_check: pattern(r#"(?:req|request)\.method\s*===?\s*['"](\w+)['"]"#),
            method_guard: pattern(r#"(?:req|request)\.method\s*!==?\s*['"](\w+)['"]"#),
            method_switch: pattern(r"switch\s*\(\s*(?:req|request)\.method\s*\)"),
            method_case: pattern(r#"case\s+['"](\w+)['"]\s*:"#),
            named_export: pattern(
                r"export\s+(?:(?:async\s+)?function\s+|const\s+)(GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS)\b",
            ),
            session_check: pattern(
                r"\b(?:getServerSession|getSession|getToken|currentUser|verifyToken|requireSession)\s*\(|\bauth\(\)",
            ),
            auth_wrapper: pattern(r"export\s+default\s+with\w*(?:Auth|Session)\w*\s*\("),
            status_option: pattern(r"\bstatus\s*:\s*(\d{3})\b"),
            json_binding: pattern(r"(?:const|let)\s+(\w+)\s*=\s*await\s+(?:req|request)\.json\(\)"),
            analyzer: ContextAnalyzer::new(NEXT_IDIOM),
        }
    }

    fn pages_branches(&self, content: &str) -> Vec<MethodBranch> {
        let mut branches: Vec<MethodBranch> = self
            .method_check
            .captures_iter(content)
            .filter_map(|c| {
                let whole = c.get(0)?;
                // The branch ends with the block guarded by the check
                let end = block_after(content, whole.end())
                    .map(|(_, close)| close + 1)
                    .unwrap_or(whole.end());
                Some(MethodBranch {
                    method: HttpMethod::parse(&c[1])?,
                    start: whole.start(),
                    end,
                })
            })
            .collect();

        if self.method_switch.is_match(content) {
            branches.extend(self.method_case.captures_iter(content).filter_map(|c| {
                Some(MethodBranch {
                    method: HttpMethod::parse(&c[1])?,
                    start: c.get(0)?.start(),
                    end: c.get(0)?.end(),
                })
            }));
        }

        if branches.is_empty() {
            // `if (req.method !== 'POST') return 405` admits a single method
            let method = self
                .method_guard
                .captures(content)
                .and_then(|c| HttpMethod::parse(&c[1]))
                .unwrap_or(HttpMethod::Get);
            branches.push(MethodBranch {
                method,
                start: 0,
                end: content.len(),
            });
        }

        branches.sort_by_key(|b| b.start);
        branches
    }

    fn app_branches(&self, content: &str) -> Vec<MethodBranch> {
        self.named_export
            .captures_iter(content)
            .filter_map(|c| {
                let whole = c.get(0)?;
                let end = block_after(content, whole.end())
                    .map(|(_, close)| close + 1)
                    .unwrap_or(whole.end());
                Some(MethodBranch {
                    method: HttpMethod::parse(&c[1])?,
                    start: whole.start(),
                    end,
                })
            })
            .collect()
    }

    /// Fields read from a variable bound to `await request.json()`.
    fn json_body_fields(&self, text: &str) -> Vec<BodyField> {
        let mut fields = Vec::new();
        for caps in self.json_binding.captures_iter(text) {
            let var = regex::escape(&caps[1]);
            let dotted = pattern(&format!(r"\b{}\.([A-Za-z_$][\w$]*)", var));
            let destructured = pattern(&format!(r"(?:const|let)\s*\{{([^}}]*)\}}\s*=\s*{}\b", var));
            for c in dotted.captures_iter(text) {
                fields.push(BodyField::new(&c[1]));
            }
            for c in destructured.captures_iter(text) {
                fields.extend(destructured_names(&c[1]).iter().map(|n| BodyField::new(n)));
            }
        }
        fields
    }
}

impl EndpointExtractor for NextJsExtractor {
    fn name(&self) -> &'static str {
        "nextjs"
    }

    fn parse(&self, content: &str, file_path: &Path) -> Result<ParseResult> {
        let mut result = ParseResult::new(Some(Framework::NextJs));
        result.mount_path = Some("/".to_string());

        let relative = file_path.to_string_lossy().replace('\\', "/");
        let Some((route, router)) = route_from_file(&relative) else {
            debug!("{} is not a Next.js route file", relative);
            return Ok(result);
        };
        result.has_auth = self.auth_wrapper.is_match(content);

        let branches = match router {
            Router::Pages => self.pages_branches(content),
            Router::App => self.app_branches(content),
        };
        let spans: Vec<(usize, usize)> = branches.iter().map(|b| (b.start, b.end)).collect();

        for (index, branch) in branches.iter().enumerate() {
            let text = match router {
                Router::Pages => neighbour_window(content, &spans, index, self.window),
                Router::App => content.get(branch.start..branch.end).unwrap_or(""),
            };
            let mut endpoint = Endpoint::new(branch.method, &route);
            self.analyzer.analyze(text).apply_to(&mut endpoint);
            if self.session_check.is_match(text) {
                endpoint.requires_auth = true;
            }
            if !matches!(branch.method, HttpMethod::Get | HttpMethod::Head) {
                endpoint.add_body_fields(self.json_body_fields(text));
            }
            for caps in self.status_option.captures_iter(text) {
                if let Ok(status) = caps[1].parse::<u16>() {
                    endpoint.add_response(ResponseInfo::new(status));
                }
            }
            result.push_endpoint(endpoint);
        }

        debug!("{}: {} Next.js endpoints", relative, result.endpoints.len());
        Ok(result)
    }
}

/// URL path and router of a file, from its location under a router directory.
///
/// ```
/// use openapi_from_repo::extractor::nextjs::{route_from_file, Router};
///
/// assert_eq!(
///     route_from_file("src/pages/api/users/[id].ts"),
///     Some(("/api/users/{id}".to_string(), Router::Pages))
/// );
/// assert_eq!(
///     route_from_file("app/(shop)/api/orders/route.ts"),
///     Some(("/api/orders".to_string(), Router::App))
/// );
/// assert_eq!(route_from_file("app/page.tsx"), None);
/// ```
pub fn route_from_file(relative: &str) -> Option<(String, Router)> {
    let relative = relative.trim_start_matches("./");
    let (rest, router) = ["pages/api/", "src/pages/api/"]
        .iter()
        .find_map(|dir| relative.strip_prefix(dir).map(|rest| (format!("api/{}", rest), Router::Pages)))
        .or_else(|| {
            ["app/", "src/app/"]
                .iter()
                .find_map(|dir| relative.strip_prefix(dir).map(|rest| (rest.to_string(), Router::App)))
        })?;

    let without_ext = match rest.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => rest,
    };
    let mut segments: Vec<&str> = without_ext.split('/').filter(|s| !s.is_empty()).collect();

    match router {
        Router::App => {
            if segments.last() != Some(&"route") {
                return None;
            }
            segments.pop();
        }
        Router::Pages => {
            if segments.last() == Some(&"index") {
                segments.pop();
            }
        }
    }

    let kept: Vec<&str> = segments
        .into_iter()
        .filter(|s| !(s.starts_with('(') && s.ends_with(')')) && !s.starts_with('@'))
        .collect();
    Some((normalize_path(&format!("/{}", kept.join("/"))), router))
}
