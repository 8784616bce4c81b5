use super::context::{matching_delimiter, object_keys, ContextAnalyzer, HAPI_IDIOM};
use super::{
    pattern, BodyField, Endpoint, EndpointExtractor, HttpMethod, Parameter, ParseResult,
    ResponseInfo,
};
use crate::detector::Framework;
use crate::field_types::FieldType;
use anyhow::Result;
use log::debug;
use regex::Regex;
use std::path::Path;

/// hapi route extractor
///
/// Reads the route configuration objects passed to `server.route(...)`, one
/// object or an array of them. Each object carries its own handler, so the
/// object text is the analysis window.
pub struct HapiExtractor {
    route_call: Regex,
    method: Regex,
    path: Regex,
    auth: Regex,
    default_auth: Regex,
    joi_object: Regex,
    joi_field: Regex,
    return_object: Regex,
    analyzer: ContextAnalyzer,
}

const ANY_METHOD: [HttpMethod; 5] = [
    HttpMethod::Get,
    HttpMethod::Post,
    HttpMethod::Put,
    HttpMethod::Patch,
    HttpMethod::Delete,
];

impl HapiExtractor {
    pub fn new() -> Self {
        Self {
            route_call: pattern(r"\.route\(\s*([\[{])"),
            method: pattern(r#"\bmethod\s*:\s*(\[[^\]]*\]|['"][\w*]+['"])"#),
            path: pattern(r#"\bpath\s*:\s*['"`](/[^'"`]*)['"`]"#),
            auth: pattern(r#"\bauth\s*:\s*(false|['"][^'"]*['"]|\{|[A-Za-z_$][\w$.]*)"#),
            default_auth: pattern(r"\.auth\.default\("),
            joi_object: pattern(r"\b(payload|query)\s*:\s*Joi\.object\(\s*\{"),
            joi_field: pattern(r"([A-Za-z_]\w*)\s*:\s*Joi\.(\w+)\(\)([^,\n]*)"),
            return_object: pattern(r"\breturn\s*\{([^{}]*)\}"),
            analyzer: ContextAnalyzer::new(HAPI_IDIOM),
        }
    }

    /// Text of every route configuration object in the file.
    fn route_objects<'c>(&self, content: &'c str) -> Vec<&'c str> {
        let mut objects = Vec::new();
        for caps in self.route_call.captures_iter(content) {
            let Some(open) = caps.get(1).map(|m| m.start()) else {
                continue;
            };
            let Some(close) = matching_delimiter(content, open) else {
                continue;
            };
            if &caps[1] == "{" {
                objects.push(&content[open..=close]);
                continue;
            }
            // Top-level objects of the array
            let mut cursor = open + 1;
            while cursor < close {
                let Some(offset) = content[cursor..close].find('{') else {
                    break;
                };
                let start = cursor + offset;
                let Some(end) = matching_delimiter(content, start) else {
                    break;
                };
                objects.push(&content[start..=end]);
                cursor = end + 1;
            }
        }
        objects
    }

    fn methods(&self, object: &str) -> Vec<HttpMethod> {
        let Some(caps) = self.method.captures(object) else {
            return Vec::new();
        };
        if caps[1].contains('*') {
            return ANY_METHOD.to_vec();
        }
        caps[1]
            .split(|c: char| !c.is_ascii_alphabetic())
            .filter_map(HttpMethod::parse)
            .collect()
    }

    /// Fields of a `payload: Joi.object({...})` or `query: Joi.object({...})` validator.
    fn joi_fields(&self, object: &str, section: &str) -> Vec<BodyField> {
        let Some(m) = self
            .joi_object
            .captures_iter(object)
            .find(|c| &c[1] == section)
            .and_then(|c| c.get(0))
        else {
            return Vec::new();
        };
        let open = m.end() - 1;
        let Some(close) = matching_delimiter(object, open) else {
            return Vec::new();
        };
        self.joi_field
            .captures_iter(&object[open..=close])
            .map(|c| {
                let chain = &c[3];
                let field_type = match &c[2] {
                    "number" if chain.contains(".integer()") => FieldType::Integer,
                    "number" => FieldType::Number,
                    "boolean" => FieldType::Boolean,
                    "array" => FieldType::Array,
                    "object" => FieldType::Object,
                    _ => FieldType::String,
                };
                BodyField::typed(&c[1], field_type, chain.contains(".required()"))
            })
            .collect()
    }
}

impl Default for HapiExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointExtractor for HapiExtractor {
    fn name(&self) -> &'static str {
        "hapi"
    }

    fn parse(&self, content: &str, file_path: &Path) -> Result<ParseResult> {
        let mut result = ParseResult::new(Some(Framework::Hapi));
        result.mount_path = Some("/".to_string());
        // A server-wide default strategy applies to every route without its own `auth`
        let default_auth = self.default_auth.is_match(content);

        for object in self.route_objects(content) {
            let Some(path) = self.path.captures(object).map(|c| c[1].to_string()) else {
                continue;
            };
            let requires_auth = self
                .auth
                .captures(object)
                .map(|c| &c[1] != "false")
                .unwrap_or(default_auth);
            let context = self.analyzer.analyze(object);
            let payload = self.joi_fields(object, "payload");
            let query = self.joi_fields(object, "query");
            let returned = self
                .return_object
                .captures_iter(object)
                .last()
                .map(|c| object_keys(&c[1]))
                .unwrap_or_default();

            for method in self.methods(object) {
                let mut endpoint = Endpoint::new(method, &path);
                if !matches!(method, HttpMethod::Get | HttpMethod::Head) {
                    endpoint.add_body_fields(payload.clone());
                }
                for field in &query {
                    let mut parameter = Parameter::query(&field.name);
                    parameter.field_type = field.field_type;
                    parameter.required = field.required;
                    endpoint.add_parameter(parameter);
                }
                context.apply_to(&mut endpoint);
                // `auth: false` opts out even when the handler mentions auth
                endpoint.requires_auth = requires_auth;
                if context.response_fields.is_empty() && !returned.is_empty() {
                    let status = endpoint
                        .responses
                        .iter()
                        .map(|r| r.status)
                        .find(|s| (200..300).contains(s))
                        .unwrap_or(if method == HttpMethod::Post { 201 } else { 200 });
                    endpoint.add_response(ResponseInfo {
                        status,
                        fields: returned.iter().map(|k| BodyField::new(k)).collect(),
                    });
                }
                result.push_endpoint(endpoint);
            }
        }

        debug!(
            "{}: {} hapi endpoints",
            file_path.display(),
            result.endpoints.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use crate::openapi_builder::OpenApiBuilder;
    use pretty_assertions::assert_eq;

    fn parse(content: &str) -> ParseResult {
        HapiExtractor::new()
            .parse(content, Path::new("lib/routes.js"))
            .unwrap()
    }

    fn keys(result: &ParseResult) -> Vec<String> {
        result.endpoints.iter().map(|e| e.key()).collect()
    }

    #[test]
    fn test_single_route_object() {
        let result = parse(
            r#"
server.route({
  method: 'GET',
  path: '/books/{isbn}',
  handler: (request, h) => {
    const { isbn } = request.params;
    return { isbn, title: 'x' };
  }
});
"#,
        );
        assert_eq!(keys(&result), vec!["GET:/books/{isbn}"]);
        let endpoint = &result.endpoints[0];
        assert!(!endpoint.requires_auth);
        assert_eq!(endpoint.responses[0].status, 200);
        assert_eq!(endpoint.responses[0].fields.len(), 2);
    }

    #[test]
    fn test_route_array_with_auth_and_validation() {
        let result = parse(
            r#"
server.route([
  {
    method: ['POST', 'PUT'],
    path: '/books/{id?}',
    options: {
      auth: 'jwt',
      validate: {
        payload: Joi.object({
          title: Joi.string().required(),
          pages: Joi.number().integer(),
          price: Joi.number()
        })
      },
      handler: (request, h) => h.response({ id: 1 }).code(201)
    }
  },
  {
    method: 'DELETE',
    path: '/books/{id}',
    options: { auth: false, handler: () => null }
  }
]);
"#,
        );
        assert_eq!(
            keys(&result),
            vec!["POST:/books/{id}", "PUT:/books/{id}", "DELETE:/books/{id}"]
        );
        let post = &result.endpoints[0];
        assert!(post.requires_auth);
        let fields = &post.request_body.as_ref().unwrap().fields;
        assert_eq!(
            fields,
            &vec![
                BodyField::typed("title", FieldType::String, true),
                BodyField::typed("pages", FieldType::Integer, false),
                BodyField::typed("price", FieldType::Number, false),
            ]
        );
        let created = post.responses.iter().find(|r| r.status == 201).unwrap();
        assert_eq!(created.fields[0].name, "id");
        assert!(!result.endpoints[2].requires_auth);
    }

    #[test]
    fn test_wildcard_method_and_default_auth() {
        let result = parse(
            "server.auth.default('session');\nserver.route({ method: '*', path: '/{any*}', handler: notFound });",
        );
        assert!(result.uses_auth());
        assert!(result.endpoints.iter().all(|e| e.requires_auth));
        assert_eq!(result.endpoints.len(), 5);
        assert_eq!(result.endpoints[0].path, "/{any}");
    }

    #[test]
    fn test_auth_false_opts_out_of_default_strategy() {
        let result = parse(
            r#"
server.auth.default('jwt');
server.route([
  { method: 'GET', path: '/health', options: { auth: false, handler: () => 'ok' } },
  { method: 'GET', path: '/orders', handler: listOrders }
]);
"#,
        );
        assert!(!result.has_auth);
        assert!(!result.endpoints[0].requires_auth);
        assert!(result.endpoints[1].requires_auth);

        let config = AnalyzerConfig::default();
        let doc = OpenApiBuilder::new(&config)
            .add_parse_result(&result, "lib/routes.js")
            .build();
        assert!(doc.paths["/health"].get.as_ref().unwrap().security.is_none());
        assert!(doc.paths["/orders"].get.as_ref().unwrap().security.is_some());
    }
}
