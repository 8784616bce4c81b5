use super::context::{block_after, matching_delimiter};
use super::laravel::php_array_keys;
use super::path::join_paths;
use super::{
    pattern, BodyField, Endpoint, EndpointExtractor, HttpMethod, Parameter, ParseResult,
    ResponseInfo, SecurityStyle,
};
use crate::detector::Framework;
use anyhow::Result;
use log::debug;
use regex::Regex;
use std::path::Path;

/// Symfony controller extractor
///
/// Understands `#[Route(...)]` attributes and `@Route(...)` docblock
/// annotations. A route on the class is a prefix for every method route.
pub struct SymfonyExtractor {
    route_marker: Regex,
    class_keyword: Regex,
    leading_string: Regex,
    named_path: Regex,
    methods: Regex,
    function: Regex,
    guard: Regex,
    body_guard: Regex,
    request_field: Regex,
    payload_field: Regex,
    decoded_field: Regex,
    query_field: Regex,
    status_constant: Regex,
    status_literal: Regex,
    json_array: Regex,
}

/// A `Route` attribute or annotation with its argument text.
struct RouteMarker<'c> {
    start: usize,
    end: usize,
    arguments: &'c str,
}

impl SymfonyExtractor {
    pub fn new() -> Self {
        Self {
            route_marker: pattern(r"(?:#\[|@)Route\s*\("),
            class_keyword: pattern(r"(?m)^\s*(?:final\s+|abstract\s+)*class\s+\w+"),
            leading_string: pattern(r#"^\s*['"]([^'"]*)['"]"#),
            named_path: pattern(r#"\bpath\s*[:=]\s*['"]([^'"]*)['"]"#),
            methods: pattern(r#"\bmethods\s*[:=]\s*(\{[^}]*\}|\[[^\]]*\]|['"][^'"]*['"])"#),
            function: pattern(r"function\s+(\w+)\s*\("),
            guard: pattern(r"(?:#\[|@)(?:IsGranted|Security)\b"),
            body_guard: pattern(r"denyAccessUnlessGranted\(|->isGranted\(|->getUser\(\)"),
            request_field: pattern(r#"\$request->(?:request->|get)\w*\(\s*['"](\w+)['"]"#),
            payload_field: pattern(r#"getPayload\(\)->\w+\(\s*['"](\w+)['"]"#),
            decoded_field: pattern(r#"\$(?:data|payload|body|content)\[\s*['"](\w+)['"]\s*\]"#),
            query_field: pattern(r#"\$request->query->\w+\(\s*['"](\w+)['"]"#),
            status_constant: pattern(r"Response::HTTP_(\w+)"),
            status_literal: pattern(r"(?:json|JsonResponse|Response)\([^;]*?,\s*(\d{3})\s*[,)]"),
            json_array: pattern(r"(?:->json|new\s+JsonResponse)\(\s*\["),
        }
    }

    fn markers<'c>(&self, content: &'c str) -> Vec<RouteMarker<'c>> {
        self.route_marker
            .find_iter(content)
            .filter_map(|m| {
                let open = m.end() - 1;
                let close = matching_delimiter(content, open)?;
                Some(RouteMarker {
                    start: m.start(),
                    end: close + 1,
                    arguments: content.get(open + 1..close)?,
                })
            })
            .collect()
    }

    fn route_path(&self, arguments: &str) -> Option<String> {
        self.named_path
            .captures(arguments)
            .or_else(|| self.leading_string.captures(arguments))
            .map(|c| c[1].to_string())
    }

    fn route_methods(&self, arguments: &str) -> Vec<HttpMethod> {
        let declared: Vec<HttpMethod> = self
            .methods
            .captures(arguments)
            .map(|c| {
                c[1].split(|ch: char| !ch.is_ascii_alphabetic())
                    .filter_map(HttpMethod::parse)
                    .collect()
            })
            .unwrap_or_default();
        if declared.is_empty() {
            vec![HttpMethod::Get]
        } else {
            declared
        }
    }

    fn analyze_body(&self, body: &str, endpoint: &mut Endpoint) {
        if self.body_guard.is_match(body) {
            endpoint.requires_auth = true;
        }

        for caps in self.query_field.captures_iter(body) {
            endpoint.add_parameter(Parameter::query(&caps[1]));
        }

        if !matches!(endpoint.method, HttpMethod::Get | HttpMethod::Head) {
            let mut fields: Vec<BodyField> = self
                .request_field
                .captures_iter(body)
                .chain(self.payload_field.captures_iter(body))
                .map(|c| BodyField::new(&c[1]))
                .collect();
            if body.contains("json_decode(") || body.contains("toArray()") {
                fields.extend(
                    self.decoded_field
                        .captures_iter(body)
                        .map(|c| BodyField::new(&c[1])),
                );
            }
            endpoint.add_body_fields(fields);
        }

        for caps in self.status_constant.captures_iter(body) {
            if let Some(status) = status_for_constant(&caps[1]) {
                endpoint.add_response(ResponseInfo::new(status));
            }
        }
        for caps in self.status_literal.captures_iter(body) {
            if let Ok(status) = caps[1].parse::<u16>() {
                endpoint.add_response(ResponseInfo::new(status));
            }
        }
        if body.contains("createNotFoundException") || body.contains("NotFoundHttpException") {
            endpoint.add_response(ResponseInfo::new(404));
        }
        if body.contains("AccessDeniedException") || body.contains("createAccessDeniedException")
        {
            endpoint.add_response(ResponseInfo::new(403));
        }

        let payload = self
            .json_array
            .find_iter(body)
            .last()
            .and_then(|m| {
                let open = m.end() - 1;
                let close = matching_delimiter(body, open)?;
                body.get(open + 1..close)
            })
            .map(php_array_keys)
            .unwrap_or_default();
        if !payload.is_empty() {
            let status = endpoint
                .responses
                .iter()
                .map(|r| r.status)
                .find(|s| (200..300).contains(s))
                .unwrap_or(if endpoint.method == HttpMethod::Post { 201 } else { 200 });
            endpoint.add_response(ResponseInfo {
                status,
                fields: payload.iter().map(|k| BodyField::new(k)).collect(),
            });
        }
    }
}

impl Default for SymfonyExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointExtractor for SymfonyExtractor {
    fn name(&self) -> &'static str {
        "symfony"
    }

    fn security_style(&self) -> SecurityStyle {
        SecurityStyle::Cookie
    }

    fn parse(&self, content: &str, file_path: &Path) -> Result<ParseResult> {
        let mut result = ParseResult::new(Some(Framework::Symfony));
        result.mount_path = Some("/".to_string());

        let class_start = self
            .class_keyword
            .find(content)
            .map(|m| m.start())
            .unwrap_or(0);
        let markers = self.markers(content);

        let prefix = markers
            .iter()
            .filter(|m| m.end <= class_start)
            .last()
            .and_then(|m| self.route_path(m.arguments))
            .unwrap_or_default();
        if self
            .guard
            .is_match(content.get(..class_start).unwrap_or(""))
        {
            result.has_auth = true;
        }

        let mut previous_end = class_start;
        for marker in markers.iter().filter(|m| m.start >= class_start) {
            let Some(path) = self.route_path(marker.arguments) else {
                continue;
            };
            let Some(function) = content
                .get(marker.end..)
                .and_then(|rest| self.function.captures(rest))
            else {
                continue;
            };
            let function_start = marker.end + function.get(0).map(|m| m.start()).unwrap_or(0);
            let handler = function[1].to_string();

            let lower = previous_end.min(marker.start);
            let attributes = content.get(lower..function_start).unwrap_or("");
            let (body, body_end) = match block_after(content, function_start) {
                Some((open, close)) => (content.get(open..=close).unwrap_or(""), close + 1),
                None => ("", function_start),
            };

            for method in self.route_methods(marker.arguments) {
                let mut endpoint = Endpoint::new(method, &join_paths(&prefix, &path));
                endpoint.handler_name = Some(handler.clone());
                endpoint.requires_auth = self.guard.is_match(attributes);
                self.analyze_body(body, &mut endpoint);
                result.push_endpoint(endpoint);
            }
            previous_end = previous_end.max(body_end);
        }

        debug!(
            "{}: {} Symfony endpoints",
            file_path.display(),
            result.endpoints.len()
        );
        Ok(result)
    }
}

/// Status code of a `Response::HTTP_*` constant.
fn status_for_constant(name: &str) -> Option<u16> {
    let status = match name {
        "OK" => 200,
        "CREATED" => 201,
        "ACCEPTED" => 202,
        "NO_CONTENT" => 204,
        "MOVED_PERMANENTLY" => 301,
        "FOUND" => 302,
        "NOT_MODIFIED" => 304,
        "BAD_REQUEST" => 400,
        "UNAUTHORIZED" => 401,
        "FORBIDDEN" => 403,
        "NOT_FOUND" => 404,
        "METHOD_NOT_ALLOWED" => 405,
        "CONFLICT" => 409,
        "UNPROCESSABLE_ENTITY" => 422,
        "TOO_MANY_REQUESTS" => 429,
        "INTERNAL_SERVER_ERROR" => 500,
        "SERVICE_UNAVAILABLE" => 503,
        _ => return None,
    };
    Some(status)
}
