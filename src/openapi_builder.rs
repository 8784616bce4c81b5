use crate::config::AnalyzerConfig;
use crate::detector::Framework;
use crate::extractor::{Endpoint, HttpMethod, ParseResult, SecurityStyle};
use crate::schema_generator::{Schema, SchemaGenerator};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Description given to every synthesized document; scored as a placeholder.
pub const GENERATED_DESCRIPTION: &str = "Documentación generada automáticamente";

const JSON: &str = "application/json";

/// OpenAPI document builder
///
/// Turns the endpoints of one [`ParseResult`] into an [`OpenApiDocument`].
pub struct OpenApiBuilder<'a> {
    config: &'a AnalyzerConfig,
    /// OpenAPI info section
    info: Info,
    servers: Vec<Server>,
    /// Paths collection (URL path -> PathItem)
    paths: BTreeMap<String, PathItem>,
    schemas: SchemaGenerator,
    security_style: SecurityStyle,
    /// At least one operation references the security scheme
    uses_security: bool,
}

/// OpenAPI Info object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Info {
    /// API title
    pub title: String,
    /// API version
    pub version: String,
    /// API description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// OpenAPI Server object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// OpenAPI PathItem object - represents all operations for a single path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathItem {
    /// GET operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,
    /// POST operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
    /// PUT operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,
    /// DELETE operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,
    /// PATCH operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,
    /// OPTIONS operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,
    /// HEAD operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,
}

impl PathItem {
    pub fn slot(&self, method: HttpMethod) -> &Option<Operation> {
        match method {
            HttpMethod::Get => &self.get,
            HttpMethod::Post => &self.post,
            HttpMethod::Put => &self.put,
            HttpMethod::Delete => &self.delete,
            HttpMethod::Patch => &self.patch,
            HttpMethod::Options => &self.options,
            HttpMethod::Head => &self.head,
        }
    }

    pub fn slot_mut(&mut self, method: HttpMethod) -> &mut Option<Operation> {
        match method {
            HttpMethod::Get => &mut self.get,
            HttpMethod::Post => &mut self.post,
            HttpMethod::Put => &mut self.put,
            HttpMethod::Delete => &mut self.delete,
            HttpMethod::Patch => &mut self.patch,
            HttpMethod::Options => &mut self.options,
            HttpMethod::Head => &mut self.head,
        }
    }

    /// Operations present on this path, in method order
    pub fn operations(&self) -> impl Iterator<Item = (HttpMethod, &Operation)> + '_ {
        HttpMethod::ALL
            .iter()
            .filter_map(move |m| self.slot(*m).as_ref().map(|op| (*m, op)))
    }
}

/// OpenAPI Operation object - represents a single API operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Operation {
    /// Operation summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Operation description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Operation ID
    #[serde(rename = "operationId", skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Parameters (path, query, header)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<Parameter>>,
    /// Request body
    #[serde(rename = "requestBody", skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    /// Responses keyed by status code
    pub responses: BTreeMap<String, Response>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<BTreeMap<String, Vec<String>>>>,
}

/// OpenAPI Parameter object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Parameter location (path, query, header)
    #[serde(rename = "in")]
    pub location: String,
    /// Whether the parameter is required
    pub required: bool,
    /// Parameter schema
    pub schema: Schema,
    /// Parameter description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// OpenAPI RequestBody object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestBody {
    /// Request body description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the request body is required
    pub required: bool,
    /// Content types and their schemas
    pub content: BTreeMap<String, MediaType>,
}

/// OpenAPI MediaType object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaType {
    /// Schema for this media type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

/// OpenAPI Response object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Response {
    /// Response description
    pub description: String,
    /// Response content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<BTreeMap<String, MediaType>>,
}

impl Response {
    /// Whether any media type of the response declares a schema
    pub fn has_schema(&self) -> bool {
        self.content
            .iter()
            .flat_map(|c| c.values())
            .any(|m| m.schema.as_ref().map(|s| !s.is_empty()).unwrap_or(false))
    }

    /// Whether any media type of the response carries a non-empty example
    pub fn has_example(&self) -> bool {
        self.content.iter().flat_map(|c| c.values()).any(|m| {
            m.example.as_ref().map(is_populated).unwrap_or(false)
                || m.schema
                    .as_ref()
                    .and_then(|s| s.example.as_ref())
                    .map(is_populated)
                    .unwrap_or(false)
        })
    }
}

fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// OpenAPI SecurityScheme object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityScheme {
    #[serde(rename = "type")]
    pub scheme_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(rename = "bearerFormat", skip_serializing_if = "Option::is_none")]
    pub bearer_format: Option<String>,
    #[serde(rename = "in", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// OpenAPI Components object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Components {
    /// Schema definitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schemas: Option<BTreeMap<String, Schema>>,
    #[serde(rename = "securitySchemes", skip_serializing_if = "Option::is_none")]
    pub security_schemes: Option<BTreeMap<String, SecurityScheme>>,
}

/// Complete OpenAPI document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiDocument {
    /// OpenAPI version
    pub openapi: String,
    /// API info
    pub info: Info,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,
    /// API paths
    #[serde(default)]
    pub paths: BTreeMap<String, PathItem>,
    /// Components (schemas, security schemes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
}

impl OpenApiDocument {
    /// Empty document with the given info
    pub fn empty(info: Info) -> Self {
        Self {
            openapi: "3.0.0".to_string(),
            info,
            servers: Vec::new(),
            paths: BTreeMap::new(),
            components: None,
        }
    }

    /// Every operation as `(path, method, operation)`, paths sorted
    pub fn operations(&self) -> Vec<(&str, HttpMethod, &Operation)> {
        self.paths
            .iter()
            .flat_map(|(path, item)| {
                item.operations()
                    .map(move |(method, op)| (path.as_str(), method, op))
            })
            .collect()
    }

    pub fn operation_count(&self) -> usize {
        self.paths.values().map(|item| item.operations().count()).sum()
    }

    pub fn operation_mut(&mut self, path: &str, method: HttpMethod) -> Option<&mut Operation> {
        self.paths
            .get_mut(path)
            .and_then(|item| item.slot_mut(method).as_mut())
    }

    /// Inserts an operation, replacing any existing one for the same method and path
    pub fn insert_operation(&mut self, path: &str, method: HttpMethod, operation: Operation) {
        *self
            .paths
            .entry(path.to_string())
            .or_default()
            .slot_mut(method) = Some(operation);
    }

    /// Reusable schemas, if any were registered
    pub fn component_schemas(&self) -> Option<&BTreeMap<String, Schema>> {
        self.components
            .as_ref()
            .and_then(|c| c.schemas.as_ref())
            .filter(|s| !s.is_empty())
    }

    /// Adds schemas to `components.schemas`, keeping existing names
    pub fn add_component_schemas(&mut self, schemas: BTreeMap<String, Schema>) {
        if schemas.is_empty() {
            return;
        }
        let target = self
            .components
            .get_or_insert_with(Components::default)
            .schemas
            .get_or_insert_with(BTreeMap::new);
        for (name, schema) in schemas {
            target.entry(name).or_insert(schema);
        }
    }
}

/// Summary given to operations nothing better is known about.
pub fn auto_summary(method: HttpMethod, path: &str) -> String {
    format!("{} {}", method.as_str(), path)
}

impl<'a> OpenApiBuilder<'a> {
    pub fn new(config: &'a AnalyzerConfig) -> Self {
        Self {
            config,
            info: Info {
                title: "API".to_string(),
                version: "1.0.0".to_string(),
                description: Some(GENERATED_DESCRIPTION.to_string()),
            },
            servers: Vec::new(),
            paths: BTreeMap::new(),
            schemas: SchemaGenerator::new(),
            security_style: SecurityStyle::Bearer,
            uses_security: false,
        }
    }

    pub fn with_security_style(mut self, style: SecurityStyle) -> Self {
        self.security_style = style;
        self
    }

    /// Adds every endpoint of a parse result, titling the document after the file.
    ///
    /// # Arguments
    ///
    /// * `result` - Endpoints extracted from one file
    /// * `file_name` - Path of that file; its base name drives title and server
    pub fn add_parse_result(mut self, result: &ParseResult, file_name: &str) -> Self {
        let base_name = base_name(file_name);
        debug!(
            "Synthesizing {} endpoints from {}",
            result.endpoints.len(),
            file_name
        );
        self.info.title = format!("API {}", base_name);

        match result.mount_path.as_deref() {
            Some(mount) if mount != "/" && !mount.is_empty() => self.servers.push(Server {
                url: mount.to_string(),
                description: None,
            }),
            Some(_) => {}
            // File-route paths are absolute already.
            None if result.flavor == Some(Framework::NextJs) => {}
            None => {
                if let Some(server) = self.infer_server(&base_name) {
                    self.servers.push(server);
                }
            }
        }

        for endpoint in &result.endpoints {
            self.add_endpoint(endpoint, result.has_auth);
        }
        self
    }

    /// Adds one endpoint as an operation.
    pub fn add_endpoint(&mut self, endpoint: &Endpoint, file_requires_auth: bool) {
        debug!("Adding operation: {} {}", endpoint.method, endpoint.path);
        let secured = endpoint.requires_auth || file_requires_auth;
        let operation_id = operation_id(endpoint.method, &endpoint.path);

        let parameters: Vec<Parameter> = endpoint
            .parameters
            .iter()
            .map(|p| Parameter {
                name: p.name.clone(),
                location: p.location.as_str().to_string(),
                required: p.required,
                schema: SchemaGenerator::parameter_schema(p),
                description: p.description.clone(),
            })
            .collect();

        let request_body = endpoint
            .request_body
            .as_ref()
            .filter(|body| !body.fields.is_empty())
            .map(|body| {
                let name = match &body.schema_name {
                    Some(model) => format!("{}Request", model),
                    None => format!("{}Request", upper_first(&operation_id)),
                };
                let mut schema = SchemaGenerator::object_schema(&body.fields);
                let example = schema.example.clone();
                schema.example = None;
                let reference = self.schemas.register(&name, schema);
                RequestBody {
                    description: Some("Datos de la solicitud".to_string()),
                    required: true,
                    content: BTreeMap::from([(
                        JSON.to_string(),
                        MediaType {
                            schema: Some(reference),
                            example,
                        },
                    )]),
                }
            });

        let mut responses = BTreeMap::new();
        for response in &endpoint.responses {
            let content = (!response.fields.is_empty()).then(|| {
                let mut schema = SchemaGenerator::object_schema(&response.fields);
                let example = schema.example.take();
                BTreeMap::from([(
                    JSON.to_string(),
                    MediaType {
                        schema: Some(schema),
                        example,
                    },
                )])
            });
            responses.insert(
                response.status.to_string(),
                Response {
                    description: self.config.status_description(response.status),
                    content,
                },
            );
        }
        if !endpoint.responses.iter().any(|r| (200..300).contains(&r.status)) {
            let status = if endpoint.method == HttpMethod::Post { 201 } else { 200 };
            responses.insert(
                status.to_string(),
                Response {
                    description: self.config.status_description(status),
                    content: None,
                },
            );
        }

        let mut security = None;
        if secured {
            self.uses_security = true;
            responses.entry("401".to_string()).or_insert_with(|| Response {
                description: self.config.status_description(401),
                content: None,
            });
            security = Some(vec![BTreeMap::from([(
                security_scheme_name(self.security_style).to_string(),
                Vec::new(),
            )])]);
        }

        let operation = Operation {
            summary: Some(
                endpoint
                    .summary
                    .clone()
                    .unwrap_or_else(|| auto_summary(endpoint.method, &endpoint.path)),
            ),
            description: None,
            operation_id: Some(operation_id),
            tags: tag_for(&endpoint.path).map(|t| vec![t]),
            parameters: (!parameters.is_empty()).then_some(parameters),
            request_body,
            responses,
            security,
        };

        *self
            .paths
            .entry(endpoint.path.clone())
            .or_default()
            .slot_mut(endpoint.method) = Some(operation);
    }

    /// Build the final OpenAPI document
    pub fn build(self) -> OpenApiDocument {
        debug!("Building final OpenAPI document");
        let schemas = self.schemas.into_schemas();
        let security_schemes = self.uses_security.then(|| {
            BTreeMap::from([(
                security_scheme_name(self.security_style).to_string(),
                security_scheme(self.security_style),
            )])
        });

        let components = if schemas.is_empty() && security_schemes.is_none() {
            None
        } else {
            Some(Components {
                schemas: (!schemas.is_empty()).then_some(schemas),
                security_schemes,
            })
        };

        OpenApiDocument {
            openapi: "3.0.0".to_string(),
            info: self.info,
            servers: self.servers,
            paths: self.paths,
            components,
        }
    }

    fn infer_server(&self, base_name: &str) -> Option<Server> {
        let simple = !base_name.is_empty()
            && base_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        let generic = self
            .config
            .generic_server_names
            .iter()
            .any(|g| g.eq_ignore_ascii_case(base_name));
        (simple && !generic).then(|| Server {
            url: format!("/{}", base_name),
            description: None,
        })
    }
}

fn security_scheme_name(style: SecurityStyle) -> &'static str {
    match style {
        SecurityStyle::Bearer => "bearerAuth",
        SecurityStyle::Cookie => "cookieAuth",
    }
}

fn security_scheme(style: SecurityStyle) -> SecurityScheme {
    match style {
        SecurityStyle::Bearer => SecurityScheme {
            scheme_type: "http".to_string(),
            scheme: Some("bearer".to_string()),
            bearer_format: Some("JWT".to_string()),
            ..SecurityScheme::default()
        },
        SecurityStyle::Cookie => SecurityScheme {
            scheme_type: "apiKey".to_string(),
            location: Some("cookie".to_string()),
            name: Some("session".to_string()),
            ..SecurityScheme::default()
        },
    }
}

/// File name without directories or extension
pub fn base_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `getUsersById` style identifier built from method and path segments.
pub fn operation_id(method: HttpMethod, path: &str) -> String {
    let mut id = method.as_lower().to_string();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if let Some(param) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            id.push_str("By");
            id.push_str(&pascal_case(param));
        } else {
            id.push_str(&pascal_case(segment));
        }
    }
    id
}

fn tag_for(path: &str) -> Option<String> {
    path.split('/')
        .filter(|s| !s.is_empty() && !s.starts_with('{'))
        .find(|s| *s != "api" && !is_version_segment(s))
        .map(str::to_string)
}

fn is_version_segment(segment: &str) -> bool {
    segment
        .strip_prefix('v')
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn pascal_case(text: &str) -> String {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(upper_first)
        .collect()
}

fn upper_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
