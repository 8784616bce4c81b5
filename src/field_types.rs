//! Field-type inference from field names.
//!
//! Every parser and the synthesizer share this table: when source code gives
//! no type information, the name of a field is the only hint available.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// JSON schema primitive a field is believed to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    /// Name used in the `type` keyword of an OpenAPI schema
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

/// Infers the type of a field from its name.
///
/// Substring checks run in a fixed order, so `user_email_id` is a string
/// (the email rule fires first).
pub fn infer_field_type(name: &str) -> FieldType {
    let lowered = name.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lowered.contains(n));

    if has(&["email"]) {
        FieldType::String
    } else if has(&["id", "count", "quantity"]) {
        FieldType::Integer
    } else if has(&["price", "amount", "total"]) {
        FieldType::Number
    } else if has(&["is_", "has_", "active"]) || starts_camel(&lowered, name) {
        FieldType::Boolean
    } else if has(&["date", "created", "updated"]) {
        FieldType::String
    } else if has(&["items", "list", "array"]) {
        FieldType::Array
    } else {
        FieldType::String
    }
}

/// `isActive` / `hasItems` in camelCase are booleans as well.
fn starts_camel(lowered: &str, original: &str) -> bool {
    ["is", "has"].iter().any(|prefix| {
        lowered.starts_with(prefix)
            && original
                .chars()
                .nth(prefix.len())
                .map(|c| c.is_ascii_uppercase())
                .unwrap_or(false)
    })
}

/// Optional `format` keyword for a field.
pub fn infer_format(name: &str) -> Option<&'static str> {
    let lowered = name.to_lowercase();
    if lowered.contains("email") {
        Some("email")
    } else if infer_field_type(name) == FieldType::String
        && ["date", "created", "updated"]
            .iter()
            .any(|n| lowered.contains(n))
    {
        Some("date-time")
    } else {
        None
    }
}

/// Illustrative example value for a field.
pub fn example_for(name: &str, field_type: FieldType) -> Value {
    let lowered = name.to_lowercase();
    match field_type {
        FieldType::String => {
            if lowered.contains("email") {
                json!("usuario@ejemplo.com")
            } else if infer_format(name) == Some("date-time") {
                json!("2024-01-15T10:30:00Z")
            } else if lowered.contains("name") || lowered.contains("nombre") {
                json!("Juan Pérez")
            } else if lowered.contains("password") {
                json!("********")
            } else if lowered.contains("url") {
                json!("https://ejemplo.com")
            } else if lowered.contains("phone") || lowered.contains("telefono") {
                json!("+34 600 000 000")
            } else {
                json!(format!("ejemplo_{}", lowered))
            }
        }
        FieldType::Integer => json!(1),
        FieldType::Number => json!(99.99),
        FieldType::Boolean => json!(true),
        FieldType::Array => json!([]),
        FieldType::Object => json!({}),
    }
}
