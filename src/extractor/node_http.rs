use super::context::{
    block_after, destructured_names, object_keys, ContextAnalyzer, EXPRESS_IDIOM,
};
use super::{pattern, BodyField, Endpoint, EndpointExtractor, HttpMethod, ParseResult, ResponseInfo};
use crate::detector::Framework;
use anyhow::Result;
use log::debug;
use regex::Regex;
use std::path::Path;

/// Extractor for servers built directly on `http.createServer`
///
/// Routing is hand written: URL comparisons and `switch` labels mark the
/// branches, method comparisons inside or next to a branch give its verbs.
pub struct NodeHttpExtractor {
    url_compare: Regex,
    url_prefix: Regex,
    url_case: Regex,
    method_compare: Regex,
    auth_header: Regex,
    write_head: Regex,
    stringified: Regex,
    parsed_destructure: Regex,
    parsed_binding: Regex,
    analyzer: ContextAnalyzer,
}

/// A URL branch of the request handler.
struct Branch {
    path: String,
    start: usize,
    end: usize,
}

impl NodeHttpExtractor {
    pub fn new() -> Self {
        Self {
            url_compare: pattern(
                r#"(?:\b(?:req|request)\.url|\bpathname|\burl|\bpath)\s*===?\s*['"`](/[^'"`]*)['"`]"#,
            ),
            url_prefix: pattern(r#"\.startsWith\(\s*['"`](/[^'"`]*)['"`]\s*\)"#),
            url_case: pattern(r#"case\s+['"`](/[^'"`]*)['"`]\s*:"#),
            method_compare: pattern(r#"\bmethod\s*===?\s*['"](\w+)['"]"#),
            auth_header: pattern(r#"(?i)headers(?:\.authorization|\[\s*['"]authorization['"]\s*\])"#),
            write_head: pattern(r"writeHead\(\s*(\d{3})"),
            stringified: pattern(r"JSON\.stringify\(\s*\{([^{}]*)\}"),
            parsed_destructure: pattern(r"(?:const|let)\s*\{([^}]*)\}\s*=\s*JSON\.parse\("),
            parsed_binding: pattern(r"(?:const|let)\s+(\w+)\s*=\s*JSON\.parse\("),
            analyzer: ContextAnalyzer::new(EXPRESS_IDIOM),
        }
    }

    fn branches(&self, content: &str) -> Vec<Branch> {
        let mut marks: Vec<(usize, usize, String)> = self
            .url_compare
            .captures_iter(content)
            .chain(self.url_prefix.captures_iter(content))
            .chain(self.url_case.captures_iter(content))
            .filter_map(|c| {
                let whole = c.get(0)?;
                Some((whole.start(), whole.end(), c[1].to_string()))
            })
            .collect();
        marks.sort_by_key(|m| m.0);

        let mut branches = Vec::with_capacity(marks.len());
        for (index, (start, end, path)) in marks.iter().enumerate() {
            let next = marks.get(index + 1).map(|m| m.0).unwrap_or(content.len());
            // A braced branch body ends the region early
            let block_end = block_after(content, *end)
                .filter(|(open, _)| *open < next)
                .map(|(_, close)| close + 1)
                .unwrap_or(next);
            branches.push(Branch {
                path: path.clone(),
                start: line_start(content, *start),
                end: block_end.min(next),
            });
        }
        branches
    }

    /// Methods a branch answers to: a comparison on the branch's own line
    /// wins, then comparisons inside the branch, then GET.
    fn branch_methods(&self, content: &str, branch: &Branch, path_start: usize) -> Vec<HttpMethod> {
        let own_line = content.get(branch.start..path_start).unwrap_or("");
        let same_line: Vec<HttpMethod> = self
            .method_compare
            .captures_iter(own_line)
            .filter_map(|c| HttpMethod::parse(&c[1]))
            .collect();
        if !same_line.is_empty() {
            return same_line;
        }

        let mut methods = Vec::new();
        let region = content.get(path_start..branch.end).unwrap_or("");
        for caps in self.method_compare.captures_iter(region) {
            if let Some(method) = HttpMethod::parse(&caps[1]) {
                if !methods.contains(&method) {
                    methods.push(method);
                }
            }
        }
        if methods.is_empty() {
            methods.push(HttpMethod::Get);
        }
        methods
    }

    fn parsed_body_fields(&self, text: &str) -> Vec<BodyField> {
        let mut fields: Vec<BodyField> = self
            .parsed_destructure
            .captures_iter(text)
            .flat_map(|c| destructured_names(&c[1]))
            .map(|n| BodyField::new(&n))
            .collect();
        for caps in self.parsed_binding.captures_iter(text) {
            let dotted = pattern(&format!(r"\b{}\.([A-Za-z_$][\w$]*)", regex::escape(&caps[1])));
            fields.extend(dotted.captures_iter(text).map(|c| BodyField::new(&c[1])));
        }
        fields
    }
}

impl Default for NodeHttpExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointExtractor for NodeHttpExtractor {
    fn name(&self) -> &'static str {
        "node-http"
    }

    fn parse(&self, content: &str, file_path: &Path) -> Result<ParseResult> {
        let mut result = ParseResult::new(Some(Framework::NodeHttp));
        result.mount_path = Some("/".to_string());

        for branch in self.branches(content) {
            let path_start = content
                .get(branch.start..)
                .and_then(|rest| rest.find(branch.path.as_str()))
                .map(|offset| branch.start + offset)
                .unwrap_or(branch.start);
            let text = content.get(branch.start..branch.end).unwrap_or("");
            let context = self.analyzer.analyze(text);
            let body = self.parsed_body_fields(text);
            let statuses: Vec<u16> = self
                .write_head
                .captures_iter(text)
                .filter_map(|c| c[1].parse().ok())
                .collect();
            let payload = self
                .stringified
                .captures_iter(text)
                .last()
                .map(|c| object_keys(&c[1]))
                .unwrap_or_default();
            let header_auth = self.auth_header.is_match(text);

            for method in self.branch_methods(content, &branch, path_start) {
                let mut endpoint = Endpoint::new(method, &branch.path);
                context.apply_to(&mut endpoint);
                if header_auth {
                    endpoint.requires_auth = true;
                }
                if !matches!(method, HttpMethod::Get | HttpMethod::Head) {
                    endpoint.add_body_fields(body.clone());
                }
                for status in &statuses {
                    endpoint.add_response(ResponseInfo::new(*status));
                }
                if !payload.is_empty() {
                    let status = statuses
                        .iter()
                        .copied()
                        .find(|s| (200..300).contains(s))
                        .unwrap_or(if method == HttpMethod::Post { 201 } else { 200 });
                    endpoint.add_response(ResponseInfo {
                        status,
                        fields: payload.iter().map(|k| BodyField::new(k)).collect(),
                    });
                }
                result.push_endpoint(endpoint);
            }
        }

        debug!(
            "{}: {} node http endpoints",
            file_path.display(),
            result.endpoints.len()
        );
        Ok(result)
    }
}

fn line_start(content: &str, position: usize) -> usize {
    content
        .get(..position)
        .and_then(|before| before.rfind('\n'))
        .map(|i| i + 1)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(content: &str) -> ParseResult {
        NodeHttpExtractor::new()
            .parse(content, Path::new("server.js"))
            .unwrap()
    }

    fn keys(result: &ParseResult) -> Vec<String> {
        result.endpoints.iter().map(|e| e.key()).collect()
    }

    #[test]
    fn test_conditions_with_methods() {
        let result = parse(
            r#"
const http = require('http');
http.createServer((req, res) => {
  if (req.url === '/health' && req.method === 'GET') {
    res.writeHead(200);
    res.end(JSON.stringify({ status: 'ok', uptime }));
  } else if (req.method === 'POST' && req.url === '/orders') {
    let raw = '';
    req.on('end', () => {
      const { sku, quantity } = JSON.parse(raw);
      res.writeHead(201, { 'Content-Type': 'application/json' });
      res.end(JSON.stringify({ id, sku }));
    });
  }
}).listen(3000);
"#,
        );
        assert_eq!(keys(&result), vec!["GET:/health", "POST:/orders"]);
        let health = &result.endpoints[0];
        assert_eq!(health.responses[0].status, 200);
        assert_eq!(health.responses[0].fields.len(), 2);

        let orders = &result.endpoints[1];
        let fields: Vec<&str> = orders
            .request_body
            .as_ref()
            .unwrap()
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(fields, vec!["sku", "quantity"]);
        assert!(orders.responses.iter().any(|r| r.status == 201 && r.fields.len() == 2));
    }

    #[test]
    fn test_nested_method_checks_and_switch() {
        let result = parse(
            r#"
const server = http.createServer((req, res) => {
  const { pathname } = new URL(req.url, 'http://localhost');
  switch (pathname) {
    case '/users':
      if (req.method === 'GET') return list(res);
      if (req.method === 'POST') return create(req, res);
      break;
    case '/me':
      if (!req.headers.authorization) { res.writeHead(401); return res.end(); }
      return me(res);
  }
});
"#,
        );
        assert_eq!(keys(&result), vec!["GET:/users", "POST:/users", "GET:/me"]);
        let me = &result.endpoints[2];
        assert!(me.requires_auth);
        assert!(me.responses.iter().any(|r| r.status == 401));
    }

    #[test]
    fn test_prefix_branch() {
        let result = parse("if (req.url.startsWith('/static/')) { serveStatic(req, res); }");
        assert_eq!(keys(&result), vec!["GET:/static"]);
    }
}
