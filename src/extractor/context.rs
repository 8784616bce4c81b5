//! Text-window heuristics shared by the pattern-based extractors.
//!
//! Extractors locate a route declaration, cut a window of text around it and
//! run a [`ContextAnalyzer`] over the window. The analyzer does not understand
//! scopes: it looks for authentication hints, parameter usage, body field
//! access, status codes and returned object literals.

use super::{BodyField, Endpoint, HttpMethod, Parameter, ResponseInfo};
use crate::config::ContextWindow;
use regex::Regex;

/// Where a framework keeps the pieces of an incoming request.
#[derive(Debug, Clone, Copy)]
pub struct RequestIdiom {
    pub body: &'static [&'static str],
    pub query: &'static [&'static str],
    pub params: &'static [&'static str],
}

pub const EXPRESS_IDIOM: RequestIdiom = RequestIdiom {
    body: &["req.body", "request.body"],
    query: &["req.query", "request.query"],
    params: &["req.params", "request.params"],
};

pub const FASTIFY_IDIOM: RequestIdiom = RequestIdiom {
    body: &["request.body", "req.body"],
    query: &["request.query", "req.query"],
    params: &["request.params", "req.params"],
};

pub const KOA_IDIOM: RequestIdiom = RequestIdiom {
    body: &["ctx.request.body", "ctx.body"],
    query: &["ctx.query", "ctx.request.query"],
    params: &["ctx.params"],
};

pub const HAPI_IDIOM: RequestIdiom = RequestIdiom {
    body: &["request.payload"],
    query: &["request.query"],
    params: &["request.params"],
};

pub const NEXT_IDIOM: RequestIdiom = RequestIdiom {
    body: &["req.body", "await req.json()", "await request.json()"],
    query: &["req.query"],
    params: &["params", "req.query"],
};

/// Everything the analyzer found inside one window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerContext {
    pub requires_auth: bool,
    pub path_params: Vec<String>,
    pub query_params: Vec<String>,
    pub body_fields: Vec<String>,
    pub statuses: Vec<u16>,
    pub response_fields: Vec<String>,
}

impl HandlerContext {
    /// Folds the findings into an endpoint.
    ///
    /// Path parameters are only kept when the path template declares them.
    /// Body fields are ignored for GET and HEAD.
    pub fn apply_to(&self, endpoint: &mut Endpoint) {
        if self.requires_auth {
            endpoint.requires_auth = true;
        }
        for name in &self.query_params {
            if !endpoint.path.contains(&format!("{{{}}}", name)) {
                endpoint.add_parameter(Parameter::query(name));
            }
        }
        if !matches!(endpoint.method, HttpMethod::Get | HttpMethod::Head) {
            endpoint.add_body_fields(self.body_fields.iter().map(|f| BodyField::new(f)).collect());
        }
        for status in &self.statuses {
            endpoint.add_response(ResponseInfo::new(*status));
        }
        if !self.response_fields.is_empty() {
            let success = self
                .statuses
                .iter()
                .copied()
                .find(|s| (200..300).contains(s))
                .unwrap_or(if endpoint.method == HttpMethod::Post { 201 } else { 200 });
            endpoint.add_response(ResponseInfo {
                status: success,
                fields: self
                    .response_fields
                    .iter()
                    .map(|f| BodyField::new(f))
                    .collect(),
            });
        }
    }
}

/// Regex-driven window analyzer for one request idiom.
pub struct ContextAnalyzer {
    auth: Regex,
    status_call: Regex,
    status_assign: Regex,
    response_object: Regex,
    body_dotted: Regex,
    body_bracket: Regex,
    body_destructured: Regex,
    query_dotted: Regex,
    query_destructured: Regex,
    query_search_params: Regex,
    params_dotted: Regex,
    params_destructured: Regex,
}

impl ContextAnalyzer {
    pub fn new(idiom: RequestIdiom) -> Self {
        let alternation = |objects: &[&str]| {
            objects
                .iter()
                .map(|o| regex::escape(o))
                .collect::<Vec<_>>()
                .join("|")
        };
        let body = alternation(idiom.body);
        let query = alternation(idiom.query);
        let params = alternation(idiom.params);

        Self {
            auth: super::pattern(
                r"(?i)\b(?:auth|authenticate|authenticated|authmiddleware|requireauth|requirelogin|isauthenticated|ensureauthenticated|ensureloggedin|isloggedin|verifytoken|verifyjwt|checkauth|protect|protected|jwtauth|authorize|passport\.authenticate)\b",
            ),
            status_call: super::pattern(
                r"\b(?:status|code|sendStatus|throw|redirect)\s*\(\s*(\d{3})\b",
            ),
            status_assign: super::pattern(r"\b(?:ctx|res|response)\.status(?:Code)?\s*=\s*(\d{3})\b"),
            response_object: super::pattern(
                r"(?:\.json|\.send|\.response|ctx\.body\s*=|Response\.json|NextResponse\.json)\s*\(?\s*\{([^{}]*)\}",
            ),
            body_dotted: super::pattern(&format!(r"(?:{})\.([A-Za-z_$][\w$]*)", body)),
            body_bracket: super::pattern(&format!(r#"(?:{})\[\s*['"]([\w$-]+)['"]\s*\]"#, body)),
            body_destructured: super::pattern(&format!(
                r"(?:const|let|var)\s*\{{([^}}]*)\}}\s*=\s*(?:await\s+)?(?:{})",
                body
            )),
            query_dotted: super::pattern(&format!(r"(?:{})\.([A-Za-z_$][\w$]*)", query)),
            query_destructured: super::pattern(&format!(
                r"(?:const|let|var)\s*\{{([^}}]*)\}}\s*=\s*(?:{})",
                query
            )),
            query_search_params: super::pattern(r#"searchParams\.get\(\s*['"]([\w-]+)['"]\s*\)"#),
            params_dotted: super::pattern(&format!(r"(?:{})\.([A-Za-z_$][\w$]*)", params)),
            params_destructured: super::pattern(&format!(
                r"(?:const|let|var)\s*\{{([^}}]*)\}}\s*=\s*(?:{})",
                params
            )),
        }
    }

    /// Runs every heuristic over `text`.
    pub fn analyze(&self, text: &str) -> HandlerContext {
        let mut ctx = HandlerContext {
            requires_auth: self.auth.is_match(text),
            ..HandlerContext::default()
        };

        for caps in self.params_dotted.captures_iter(text) {
            push_unique(&mut ctx.path_params, &caps[1]);
        }
        for caps in self.params_destructured.captures_iter(text) {
            for name in destructured_names(&caps[1]) {
                push_unique(&mut ctx.path_params, &name);
            }
        }

        for caps in self.query_dotted.captures_iter(text) {
            push_unique(&mut ctx.query_params, &caps[1]);
        }
        for caps in self.query_destructured.captures_iter(text) {
            for name in destructured_names(&caps[1]) {
                push_unique(&mut ctx.query_params, &name);
            }
        }
        for caps in self.query_search_params.captures_iter(text) {
            push_unique(&mut ctx.query_params, &caps[1]);
        }

        for caps in self.body_dotted.captures_iter(text) {
            push_unique(&mut ctx.body_fields, &caps[1]);
        }
        for caps in self.body_bracket.captures_iter(text) {
            push_unique(&mut ctx.body_fields, &caps[1]);
        }
        for caps in self.body_destructured.captures_iter(text) {
            for name in destructured_names(&caps[1]) {
                push_unique(&mut ctx.body_fields, &name);
            }
        }

        for caps in self
            .status_call
            .captures_iter(text)
            .chain(self.status_assign.captures_iter(text))
        {
            if let Ok(code) = caps[1].parse::<u16>() {
                if (100..600).contains(&code) && !ctx.statuses.contains(&code) {
                    ctx.statuses.push(code);
                }
            }
        }

        // The last literal is usually the success payload; early returns carry errors.
        if let Some(caps) = self.response_object.captures_iter(text).last() {
            ctx.response_fields = object_keys(&caps[1]);
        }

        // Method names of query/params objects are not fields.
        for list in [&mut ctx.query_params, &mut ctx.path_params, &mut ctx.body_fields] {
            list.retain(|name| !is_accessor_noise(name));
        }

        ctx
    }

    /// Whether `text` mentions an authentication hint.
    pub fn mentions_auth(&self, text: &str) -> bool {
        self.auth.is_match(text)
    }
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

fn is_accessor_noise(name: &str) -> bool {
    matches!(
        name,
        "get" | "set" | "has" | "toString" | "hasOwnProperty" | "length" | "map" | "filter"
            | "forEach" | "then" | "json" | "text"
    )
}

/// Names bound by a destructuring pattern such as `{ a, b: alias, c = 1, ...rest }`.
pub fn destructured_names(pattern: &str) -> Vec<String> {
    split_top_level(pattern)
        .into_iter()
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() || part.starts_with("...") {
                return None;
            }
            let name = part
                .split(|c| c == ':' || c == '=')
                .next()
                .unwrap_or("")
                .trim();
            is_identifier(name).then(|| name.to_string())
        })
        .collect()
}

/// Keys of an object literal body such as `id: user.id, name, 'email': x`.
pub fn object_keys(body: &str) -> Vec<String> {
    split_top_level(body)
        .into_iter()
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() || part.starts_with("...") {
                return None;
            }
            let key = part.split(':').next().unwrap_or("").trim();
            let key = key.trim_matches(|c| c == '"' || c == '\'' || c == '`');
            is_identifier(key).then(|| key.to_string())
        })
        .collect()
}

fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current);
    parts
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Cuts a window around `[start, end)`, clamped to `[lower, upper)` and to
/// character boundaries.
pub fn window_slice(
    content: &str,
    start: usize,
    end: usize,
    window: ContextWindow,
    lower: usize,
    upper: usize,
) -> &str {
    let mut from = start.saturating_sub(window.before).max(lower);
    let mut to = end.saturating_add(window.after).min(upper).min(content.len());
    while from > 0 && !content.is_char_boundary(from) {
        from -= 1;
    }
    while to < content.len() && !content.is_char_boundary(to) {
        to += 1;
    }
    if from >= to {
        return "";
    }
    &content[from..to]
}

/// Window of the `index`-th declaration, never reaching past the end of the
/// previous declaration's call nor into the next declaration.
///
/// `spans` holds `(start, call_end)` pairs in source order.
pub fn neighbour_window<'c>(
    content: &'c str,
    spans: &[(usize, usize)],
    index: usize,
    window: ContextWindow,
) -> &'c str {
    let Some(&(start, call_end)) = spans.get(index) else {
        return "";
    };
    let lower = index
        .checked_sub(1)
        .and_then(|i| spans.get(i))
        .map(|&(_, end)| end.min(start))
        .unwrap_or(0);
    let upper = spans
        .get(index + 1)
        .map(|&(next, _)| next)
        .unwrap_or(content.len());
    window_slice(content, start, call_end.max(start), window, lower, upper)
}

/// End of the call whose argument list opens at the first `(` at or after
/// `from`, or `from` itself when the call is unbalanced.
pub fn call_end(content: &str, from: usize) -> usize {
    content
        .get(from..)
        .and_then(|rest| rest.find('('))
        .and_then(|offset| matching_delimiter(content, from + offset))
        .map(|close| close + 1)
        .unwrap_or(from)
}

/// Index of the delimiter closing the one at `open_idx`, counting depth and
/// skipping string literals and comments.
pub fn matching_delimiter(content: &str, open_idx: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let open = *bytes.get(open_idx)?;
    let close = match open {
        b'{' => b'}',
        b'(' => b')',
        b'[' => b']',
        _ => return None,
    };

    let mut depth = 0usize;
    let mut i = open_idx;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'"' | b'\'' | b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Text of the `{ ... }` block starting at the first `{` at or after `from`.
pub fn block_after(content: &str, from: usize) -> Option<(usize, usize)> {
    let open = from + content.get(from..)?.find('{')?;
    let close = matching_delimiter(content, open)?;
    Some((open, close))
}
