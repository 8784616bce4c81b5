use crate::extractor::{BodyField, Parameter};
use crate::field_types::{example_for, infer_format, FieldType};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Schema generator - turns inferred fields into OpenAPI schemas
///
/// Named object schemas are collected so the builder can expose them under
/// `components.schemas`.
pub struct SchemaGenerator {
    /// Registered schemas, keyed by component name
    schemas: BTreeMap<String, Schema>,
}

/// OpenAPI Schema definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// The type of the schema (string, integer, object, array, etc.)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    /// Properties for object types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Property>>,
    /// Required field names for object types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    /// Items schema for array types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    /// Reference to another schema
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Format for primitive types (e.g., "email", "date-time")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

/// Property definition for object schemas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// The type of the property
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    /// Reference to another schema
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Items schema for array properties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    /// Format for primitive types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

impl Schema {
    /// Whether the schema carries any type information at all
    pub fn is_empty(&self) -> bool {
        self.schema_type.is_none() && self.reference.is_none() && self.properties.is_none()
    }

    pub fn reference_to(name: &str) -> Self {
        Schema {
            reference: Some(format!("#/components/schemas/{}", name)),
            ..Schema::default()
        }
    }
}

impl SchemaGenerator {
    pub fn new() -> Self {
        Self {
            schemas: BTreeMap::new(),
        }
    }

    /// Schema of a single primitive field.
    pub fn field_schema(name: &str, field_type: FieldType) -> Schema {
        let items = (field_type == FieldType::Array).then(|| {
            Box::new(Schema {
                schema_type: Some("string".to_string()),
                ..Schema::default()
            })
        });
        Schema {
            schema_type: Some(field_type.as_str().to_string()),
            format: Self::format_for(name, field_type),
            items,
            ..Schema::default()
        }
    }

    /// Schema of a path or query parameter
    pub fn parameter_schema(parameter: &Parameter) -> Schema {
        Self::field_schema(&parameter.name, parameter.field_type)
    }

    /// Object schema (with an example) built from inferred fields.
    pub fn object_schema(fields: &[BodyField]) -> Schema {
        let properties = fields
            .iter()
            .map(|field| {
                let property = Property {
                    property_type: Some(field.field_type.as_str().to_string()),
                    format: Self::format_for(&field.name, field.field_type),
                    items: (field.field_type == FieldType::Array).then(|| {
                        Box::new(Schema {
                            schema_type: Some("string".to_string()),
                            ..Schema::default()
                        })
                    }),
                    ..Property::default()
                };
                (field.name.clone(), property)
            })
            .collect();

        let required: Vec<String> = fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.clone())
            .collect();

        Schema {
            schema_type: Some("object".to_string()),
            properties: Some(properties),
            required: (!required.is_empty()).then_some(required),
            example: Some(Self::example_object(fields)),
            ..Schema::default()
        }
    }

    /// Example payload with one illustrative value per field
    pub fn example_object(fields: &[BodyField]) -> Value {
        let mut object = Map::new();
        for field in fields {
            object.insert(field.name.clone(), example_for(&field.name, field.field_type));
        }
        Value::Object(object)
    }

    /// Registers `schema` as a reusable component and returns a reference to it.
    ///
    /// A name that is already taken keeps its first definition.
    pub fn register(&mut self, name: &str, schema: Schema) -> Schema {
        if !self.schemas.contains_key(name) {
            debug!("Registering component schema {}", name);
            self.schemas.insert(name.to_string(), schema);
        }
        Schema::reference_to(name)
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    pub fn into_schemas(self) -> BTreeMap<String, Schema> {
        self.schemas
    }

    fn format_for(name: &str, field_type: FieldType) -> Option<String> {
        if field_type != FieldType::String {
            return None;
        }
        infer_format(name).map(str::to_string)
    }
}

impl Default for SchemaGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ParameterLocation;
    use serde_json::json;

    #[test]
    fn test_field_schema_formats() {
        let email = SchemaGenerator::field_schema("email", FieldType::String);
        assert_eq!(email.schema_type.as_deref(), Some("string"));
        assert_eq!(email.format.as_deref(), Some("email"));

        let count = SchemaGenerator::field_schema("count", FieldType::Integer);
        assert_eq!(count.schema_type.as_deref(), Some("integer"));
        assert!(count.format.is_none());

        let items = SchemaGenerator::field_schema("items", FieldType::Array);
        assert_eq!(items.items.unwrap().schema_type.as_deref(), Some("string"));
    }

    #[test]
    fn test_parameter_schema_uses_inferred_type() {
        let parameter = Parameter::new("userId", ParameterLocation::Path, true);
        let schema = SchemaGenerator::parameter_schema(&parameter);
        assert_eq!(schema.schema_type.as_deref(), Some("integer"));
    }

    #[test]
    fn test_object_schema_with_required_fields_and_example() {
        let fields = vec![
            BodyField::typed("name", FieldType::String, true),
            BodyField::new("price"),
            BodyField::new("is_active"),
        ];
        let schema = SchemaGenerator::object_schema(&fields);

        assert_eq!(schema.schema_type.as_deref(), Some("object"));
        let properties = schema.properties.as_ref().unwrap();
        assert_eq!(properties["price"].property_type.as_deref(), Some("number"));
        assert_eq!(properties["is_active"].property_type.as_deref(), Some("boolean"));
        assert_eq!(schema.required, Some(vec!["name".to_string()]));

        let example = schema.example.unwrap();
        assert!(example.get("name").is_some());
        assert!(example["is_active"].is_boolean());
    }

    #[test]
    fn test_register_keeps_first_definition() {
        let mut generator = SchemaGenerator::new();
        let first = SchemaGenerator::object_schema(&[BodyField::new("title")]);
        let second = SchemaGenerator::object_schema(&[BodyField::new("body")]);

        let reference = generator.register("PostRequest", first.clone());
        generator.register("PostRequest", second);

        assert_eq!(
            reference.reference.as_deref(),
            Some("#/components/schemas/PostRequest")
        );
        assert_eq!(generator.get("PostRequest"), Some(&first));
        assert_eq!(generator.into_schemas().len(), 1);
    }

    #[test]
    fn test_schema_serialization_shape() {
        let schema = SchemaGenerator::field_schema("created_at", FieldType::String);
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value, json!({"type": "string", "format": "date-time"}));
    }
}
