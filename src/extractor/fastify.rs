use super::context::{
    block_after, call_end, matching_delimiter, neighbour_window, object_keys, ContextAnalyzer,
    FASTIFY_IDIOM,
};
use super::{
    pattern, BodyField, Endpoint, EndpointExtractor, HttpMethod, Parameter, ParseResult,
    ResponseInfo,
};
use crate::config::ContextWindow;
use crate::detector::Framework;
use crate::field_types::FieldType;
use crate::triage::CLIENT_RECEIVERS;
use anyhow::Result;
use log::debug;
use regex::Regex;
use std::path::Path;

/// Fastify route extractor
///
/// Handles the shorthand `fastify.get('/p', opts, handler)` and the full
/// `fastify.route({ method, url, handler })` declaration. JSON schemas given
/// in the route options type the body and querystring.
pub struct FastifyExtractor {
    window: ContextWindow,
    shorthand: Regex,
    full_route: Regex,
    route_method: Regex,
    route_url: Regex,
    hook_option: Regex,
    global_hook: Regex,
    schema_section: Regex,
    typed_property: Regex,
    required_list: Regex,
    return_object: Regex,
    analyzer: ContextAnalyzer,
}

struct Declaration {
    methods: Vec<HttpMethod>,
    path: String,
    start: usize,
    end: usize,
}

impl FastifyExtractor {
    pub fn new(window: ContextWindow) -> Self {
        Self {
            window,
            shorthand: pattern(
                r#"\b([A-Za-z_$][\w$]*)\.(get|post|put|delete|patch|options|head)\(\s*['"`](/[^'"`]*)['"`]"#,
            ),
            full_route: pattern(r"\b[A-Za-z_$][\w$]*\.route\(\s*\{"),
            route_method: pattern(r#"\bmethod\s*:\s*(\[[^\]]*\]|['"]\w+['"])"#),
            route_url: pattern(r#"\b(?:url|path)\s*:\s*['"`](/[^'"`]*)['"`]"#),
            hook_option: pattern(r"\b(?:preHandler|onRequest|preValidation)\s*:\s*([^\n]*)"),
            global_hook: pattern(
                r#"addHook\(\s*['"](?:onRequest|preHandler|preValidation)['"]\s*,\s*([^\n]*)"#,
            ),
            schema_section: pattern(r"\b(body|querystring)\s*:\s*\{"),
            typed_property: pattern(r#"([A-Za-z_]\w*)\s*:\s*\{\s*type\s*:\s*['"](\w+)['"]"#),
            required_list: pattern(r"\brequired\s*:\s*\[([^\]]*)\]"),
            return_object: pattern(r"\breturn\s*\{([^{}]*)\}"),
            analyzer: ContextAnalyzer::new(FASTIFY_IDIOM),
        }
    }

    fn declarations(&self, content: &str) -> Vec<Declaration> {
        let mut found = Vec::new();

        for caps in self.shorthand.captures_iter(content) {
            if CLIENT_RECEIVERS.contains(&&caps[1]) {
                continue;
            }
            let Some(method) = HttpMethod::parse(&caps[2]) else {
                continue;
            };
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            found.push(Declaration {
                methods: vec![method],
                path: caps[3].to_string(),
                start,
                end: call_end(content, start),
            });
        }

        for m in self.full_route.find_iter(content) {
            let open = m.end() - 1;
            let Some(close) = matching_delimiter(content, open) else {
                continue;
            };
            let options = &content[open..=close];
            let Some(url) = self.route_url.captures(options) else {
                continue;
            };
            let methods: Vec<HttpMethod> = self
                .route_method
                .captures(options)
                .map(|c| {
                    c[1].split(|ch: char| !ch.is_ascii_alphabetic())
                        .filter_map(HttpMethod::parse)
                        .collect()
                })
                .unwrap_or_default();
            if methods.is_empty() {
                continue;
            }
            found.push(Declaration {
                methods,
                path: url[1].to_string(),
                start: m.start(),
                end: close + 1,
            });
        }

        found.sort_by_key(|d| d.start);
        found
    }

    /// Typed fields of a `body` or `querystring` JSON schema in the route options.
    fn schema_fields(&self, options: &str, section: &str) -> Vec<BodyField> {
        let Some(caps) = self
            .schema_section
            .captures_iter(options)
            .find(|c| &c[1] == section)
        else {
            return Vec::new();
        };
        let Some((open, close)) = caps.get(0).and_then(|m| block_after(options, m.end() - 1))
        else {
            return Vec::new();
        };
        let schema = &options[open..=close];
        let required: Vec<String> = self
            .required_list
            .captures(schema)
            .map(|c| {
                c[1].split(',')
                    .map(|s| s.trim().trim_matches(|q| q == '\'' || q == '"').to_string())
                    .collect()
            })
            .unwrap_or_default();

        self.typed_property
            .captures_iter(schema)
            .filter(|c| &c[1] != "properties")
            .map(|c| {
                let name = &c[1];
                BodyField::typed(
                    name,
                    json_schema_type(&c[2]),
                    required.iter().any(|r| r == name),
                )
            })
            .collect()
    }
}

impl EndpointExtractor for FastifyExtractor {
    fn name(&self) -> &'static str {
        "fastify"
    }

    fn parse(&self, content: &str, file_path: &Path) -> Result<ParseResult> {
        let mut result = ParseResult::new(Some(Framework::Fastify));
        result.has_auth = self
            .global_hook
            .captures_iter(content)
            .any(|c| self.analyzer.mentions_auth(&c[1]));

        let declarations = self.declarations(content);
        let spans: Vec<(usize, usize)> = declarations.iter().map(|d| (d.start, d.end)).collect();

        for (index, declaration) in declarations.iter().enumerate() {
            let call = content.get(declaration.start..declaration.end).unwrap_or("");
            let text = neighbour_window(content, &spans, index, self.window);
            let context = self.analyzer.analyze(text);

            let hooked_auth = self
                .hook_option
                .captures_iter(call)
                .any(|c| self.analyzer.mentions_auth(&c[1]));
            let body_schema = self.schema_fields(call, "body");
            let query_schema = self.schema_fields(call, "querystring");
            let returned = self
                .return_object
                .captures_iter(call)
                .last()
                .map(|c| object_keys(&c[1]))
                .unwrap_or_default();

            for method in &declaration.methods {
                let mut endpoint = Endpoint::new(*method, &declaration.path);
                if !matches!(method, HttpMethod::Get | HttpMethod::Head) {
                    endpoint.add_body_fields(body_schema.clone());
                }
                for field in &query_schema {
                    let mut parameter = Parameter::query(&field.name);
                    parameter.field_type = field.field_type;
                    parameter.required = field.required;
                    endpoint.add_parameter(parameter);
                }
                context.apply_to(&mut endpoint);
                if hooked_auth {
                    endpoint.requires_auth = true;
                }
                if context.response_fields.is_empty() && !returned.is_empty() {
                    let status = if *method == HttpMethod::Post { 201 } else { 200 };
                    let status = endpoint
                        .responses
                        .iter()
                        .map(|r| r.status)
                        .find(|s| (200..300).contains(s))
                        .unwrap_or(status);
                    endpoint.add_response(ResponseInfo {
                        status,
                        fields: returned.iter().map(|k| BodyField::new(k)).collect(),
                    });
                }
                result.push_endpoint(endpoint);
            }
        }

        debug!(
            "{}: {} Fastify endpoints",
            file_path.display(),
            result.endpoints.len()
        );
        Ok(result)
    }
}

fn json_schema_type(name: &str) -> FieldType {
    match name {
        "integer" => FieldType::Integer,
        "number" => FieldType::Number,
        "boolean" => FieldType::Boolean,
        "array" => FieldType::Array,
        "object" => FieldType::Object,
        _ => FieldType::String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(content: &str) -> ParseResult {
        FastifyExtractor::new(ContextWindow::default())
            .parse(content, Path::new("src/routes/items.js"))
            .unwrap()
    }

    fn keys(result: &ParseResult) -> Vec<String> {
        result.endpoints.iter().map(|e| e.key()).collect()
    }

    #[test]
    fn test_shorthand_with_schema() {
        let result = parse(
            r#"
fastify.get('/items', async (request, reply) => {
  const { limit } = request.query;
  return { items: [], total: 0 };
});

fastify.post('/items', {
  preHandler: [fastify.authenticate],
  schema: {
    body: {
      type: 'object',
      required: ['name'],
      properties: {
        name: { type: 'string' },
        stock: { type: 'integer' }
      }
    }
  }
}, async (request, reply) => {
  reply.code(201);
  return { id: 1 };
});
"#,
        );
        assert_eq!(keys(&result), vec!["GET:/items", "POST:/items"]);

        let get = &result.endpoints[0];
        assert!(!get.requires_auth);
        assert_eq!(get.parameters[0].name, "limit");
        assert_eq!(get.responses[0].status, 200);
        assert_eq!(get.responses[0].fields.len(), 2);

        let post = &result.endpoints[1];
        assert!(post.requires_auth);
        let fields = &post.request_body.as_ref().unwrap().fields;
        assert_eq!(fields[0], BodyField::typed("name", FieldType::String, true));
        assert_eq!(fields[1], BodyField::typed("stock", FieldType::Integer, false));
        let created = post.responses.iter().find(|r| r.status == 201).unwrap();
        assert_eq!(created.fields[0].name, "id");
    }

    #[test]
    fn test_full_route_declaration() {
        let result = parse(
            r#"
server.route({
  method: ['PUT', 'PATCH'],
  url: '/items/:id',
  schema: { querystring: { type: 'object', properties: { force: { type: 'boolean' } } } },
  handler: async (request, reply) => {
    const { name } = request.body;
    reply.status(204).send();
  }
});
"#,
        );
        assert_eq!(keys(&result), vec!["PUT:/items/{id}", "PATCH:/items/{id}"]);
        let put = &result.endpoints[0];
        let force = put.parameters.iter().find(|p| p.name == "force").unwrap();
        assert_eq!(force.field_type, FieldType::Boolean);
        assert_eq!(put.request_body.as_ref().unwrap().fields[0].name, "name");
        assert!(put.responses.iter().any(|r| r.status == 204));
    }

    #[test]
    fn test_global_auth_hook() {
        let result = parse(
            "fastify.addHook('onRequest', fastify.authenticate);\nfastify.get('/me', async () => ({}));",
        );
        assert!(result.has_auth);
        assert!(result.uses_auth());
    }
}
