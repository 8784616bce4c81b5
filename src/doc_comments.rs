//! `@swagger` / `@openapi` documentation blocks.
//!
//! JavaScript projects document routes with YAML inside `/** ... */` blocks,
//! PHP projects with `@OA\Get(...)` annotations. Both are turned into
//! OpenAPI operations that can either stand alone as a document or be merged
//! into a synthesized one, where they take precedence over generated text.

use crate::error::{Error, Result};
use crate::extractor::path::normalize_path;
use crate::extractor::{pattern, HttpMethod};
use crate::openapi_builder::{
    auto_summary, base_name, operation_id, Info, OpenApiDocument, Operation, GENERATED_DESCRIPTION,
};
use crate::schema_generator::Schema;
use log::{debug, warn};
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// One operation described by a documentation block.
#[derive(Debug, Clone, PartialEq)]
pub struct DocOperation {
    pub path: String,
    pub method: HttpMethod,
    pub operation: Operation,
}

/// Everything the documentation blocks of one file describe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocComments {
    pub operations: Vec<DocOperation>,
    pub schemas: BTreeMap<String, Schema>,
    /// Blocks that could not be parsed
    pub skipped_blocks: usize,
}

impl DocComments {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Standalone document built only from the blocks.
    pub fn to_document(&self, file_name: &str) -> OpenApiDocument {
        let mut doc = OpenApiDocument::empty(Info {
            title: format!("API {}", base_name(file_name)),
            version: "1.0.0".to_string(),
            description: Some(GENERATED_DESCRIPTION.to_string()),
        });
        self.merge_into(&mut doc);
        doc
    }

    /// Merges the documented operations into `doc`.
    ///
    /// Documented fields replace generated ones; operations the document does
    /// not have yet are added. Returns the number of operations touched.
    pub fn merge_into(&self, doc: &mut OpenApiDocument) -> usize {
        for documented in &self.operations {
            match doc.operation_mut(&documented.path, documented.method) {
                Some(existing) => merge_operation(existing, &documented.operation),
                None => {
                    let mut operation = documented.operation.clone();
                    if operation.operation_id.is_none() {
                        operation.operation_id =
                            Some(operation_id(documented.method, &documented.path));
                    }
                    if operation.summary.is_none() && operation.description.is_none() {
                        operation.summary = Some(auto_summary(documented.method, &documented.path));
                    }
                    doc.insert_operation(&documented.path, documented.method, operation);
                }
            }
        }
        doc.add_component_schemas(self.schemas.clone());
        self.operations.len()
    }
}

fn merge_operation(existing: &mut Operation, documented: &Operation) {
    if documented.summary.is_some() {
        existing.summary = documented.summary.clone();
    }
    if documented.description.is_some() {
        existing.description = documented.description.clone();
    }
    if documented.operation_id.is_some() {
        existing.operation_id = documented.operation_id.clone();
    }
    if documented.tags.is_some() {
        existing.tags = documented.tags.clone();
    }
    if let Some(parameters) = &documented.parameters {
        let target = existing.parameters.get_or_insert_with(Vec::new);
        for parameter in parameters {
            match target
                .iter_mut()
                .find(|p| p.name == parameter.name && p.location == parameter.location)
            {
                Some(slot) => *slot = parameter.clone(),
                None => target.push(parameter.clone()),
            }
        }
    }
    if documented.request_body.is_some() {
        existing.request_body = documented.request_body.clone();
    }
    for (status, response) in &documented.responses {
        existing.responses.insert(status.clone(), response.clone());
    }
    if documented.security.is_some() {
        existing.security = documented.security.clone();
    }
}

pub struct DocCommentExtractor {
    block: Regex,
    annotation: Regex,
    annotation_summary: Regex,
    annotation_description: Regex,
}

impl Default for DocCommentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocCommentExtractor {
    pub fn new() -> Self {
        Self {
            block: pattern(r"(?s)/\*\*(.*?)\*/"),
            annotation: pattern(
                r#"@OA\\(Get|Post|Put|Patch|Delete|Options|Head)\([\s*]*(?:path\s*=\s*)?"([^"]+)""#,
            ),
            annotation_summary: pattern(r#"\bsummary\s*=\s*"([^"]*)""#),
            annotation_description: pattern(r#"\bdescription\s*=\s*"([^"]*)""#),
        }
    }

    /// Parses every documentation block of `content`.
    ///
    /// A malformed block is logged and skipped; the remaining blocks are
    /// still processed.
    pub fn extract(&self, content: &str, file_name: &str) -> DocComments {
        let mut comments = DocComments::default();

        for (index, caps) in self.block.captures_iter(content).enumerate() {
            let body = &caps[1];
            let outcome = if body.contains("@swagger") || body.contains("@openapi") {
                self.parse_yaml_block(index, body)
            } else if body.contains("@OA\\") {
                Ok(self.parse_annotation_block(body))
            } else {
                continue;
            };

            match outcome {
                Ok((operations, schemas)) => {
                    comments.operations.extend(operations);
                    for (name, schema) in schemas {
                        comments.schemas.entry(name).or_insert(schema);
                    }
                }
                Err(e) => {
                    warn!("{}: {}", file_name, e);
                    comments.skipped_blocks += 1;
                }
            }
        }

        debug!(
            "{}: {} documented operations, {} blocks skipped",
            file_name,
            comments.operations.len(),
            comments.skipped_blocks
        );
        comments
    }

    fn parse_yaml_block(
        &self,
        index: usize,
        body: &str,
    ) -> Result<(Vec<DocOperation>, BTreeMap<String, Schema>)> {
        let block_error = |message: String| Error::CommentBlock { index, message };

        let yaml = block_yaml(body);
        if yaml.trim().is_empty() {
            return Ok((Vec::new(), BTreeMap::new()));
        }
        let parsed: serde_yaml::Value =
            serde_yaml::from_str(&yaml).map_err(|e| block_error(e.to_string()))?;
        let root = match yaml_to_json(parsed) {
            Value::Object(map) => map,
            _ => return Err(block_error("block is not a YAML mapping".to_string())),
        };

        let mut schemas = BTreeMap::new();
        if let Some(Value::Object(components)) = root.get("components") {
            if let Some(Value::Object(defined)) = components.get("schemas") {
                for (name, schema) in defined {
                    let schema: Schema = serde_json::from_value(schema.clone())
                        .map_err(|e| block_error(format!("schema {}: {}", name, e)))?;
                    schemas.insert(name.clone(), schema);
                }
            }
        }

        let paths = match root.get("paths") {
            Some(Value::Object(paths)) => Some(paths.clone()),
            _ => None,
        }
        .unwrap_or(root);

        let mut operations = Vec::new();
        for (raw_path, item) in paths {
            if !raw_path.starts_with('/') {
                continue;
            }
            let Value::Object(methods) = item else {
                continue;
            };
            let path = normalize_path(&raw_path);
            for (method_name, body) in methods {
                let Some(method) = HttpMethod::parse(&method_name) else {
                    continue;
                };
                let operation: Operation = serde_json::from_value(body)
                    .map_err(|e| block_error(format!("{} {}: {}", method, path, e)))?;
                operations.push(DocOperation {
                    path: path.clone(),
                    method,
                    operation,
                });
            }
        }
        Ok((operations, schemas))
    }

    fn parse_annotation_block(&self, body: &str) -> (Vec<DocOperation>, BTreeMap<String, Schema>) {
        let operations = self
            .annotation
            .captures_iter(body)
            .filter_map(|caps| {
                let method = HttpMethod::parse(&caps[1])?;
                let start = caps.get(0).map(|m| m.end()).unwrap_or(0);
                let rest = &body[start..];
                let operation = Operation {
                    summary: self
                        .annotation_summary
                        .captures(rest)
                        .map(|c| c[1].to_string()),
                    description: self
                        .annotation_description
                        .captures(rest)
                        .map(|c| c[1].to_string()),
                    ..Operation::default()
                };
                Some(DocOperation {
                    path: normalize_path(&caps[2]),
                    method,
                    operation,
                })
            })
            .collect();
        (operations, BTreeMap::new())
    }
}

/// YAML following the `@swagger`/`@openapi` marker, without comment decoration.
fn block_yaml(body: &str) -> String {
    let lines: Vec<&str> = body
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            match trimmed.strip_prefix('*') {
                Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
                None => trimmed,
            }
        })
        .skip_while(|line| !(line.contains("@swagger") || line.contains("@openapi")))
        .skip(1)
        .collect();

    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|l| strip_indent(l, indent))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drops up to `indent` leading whitespace characters, never splitting a character.
fn strip_indent(line: &str, indent: usize) -> &str {
    let start = line
        .char_indices()
        .take_while(|(_, c)| c.is_whitespace())
        .nth(indent)
        .map(|(i, _)| i);
    match start {
        Some(i) => &line[i..],
        None => line.trim_start(),
    }
}

/// Converts YAML into JSON, turning non-string keys (`200:`) into strings.
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut object = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    other => match yaml_to_json(other) {
                        Value::String(s) => s,
                        v => v.to_string(),
                    },
                };
                object.insert(key, yaml_to_json(value));
            }
            Value::Object(object)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}
