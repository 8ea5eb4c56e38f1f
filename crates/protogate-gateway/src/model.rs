//! Validation models derived from protobuf message types.
//!
//! A [`ModelSchema`] describes the JSON shape of a message at the HTTP
//! boundary. Wire messages convert to validated [`ModelInstance`]s and back
//! through the protobuf JSON mapping.

use crate::error::{GatewayError, GatewayResult};
use prost_reflect::{DynamicMessage, FieldDescriptor, Kind, MessageDescriptor, SerializeOptions};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// How the model cache keys message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKeyPolicy {
    /// Bare message name; same-named types in different packages share a model
    #[default]
    Short,
    /// Fully qualified message name
    Qualified,
}

/// JSON kind of a field value
#[derive(Debug, Clone)]
pub enum FieldKind {
    Bool,
    /// Signed integers (`int32`, `sint64`, `sfixed32`, ...)
    Integer,
    /// Unsigned integers (`uint32`, `fixed64`, ...)
    Unsigned,
    Number,
    String,
    /// Base64 encoded string
    Bytes,
    Enum(Vec<String>),
    Message(MessageDescriptor),
    /// `google.protobuf.*` types with a special JSON form; any value is accepted
    WellKnown(String),
}

impl FieldKind {
    fn from_kind(kind: Kind) -> Self {
        match kind {
            Kind::Bool => FieldKind::Bool,
            Kind::Int32
            | Kind::Int64
            | Kind::Sint32
            | Kind::Sint64
            | Kind::Sfixed32
            | Kind::Sfixed64 => FieldKind::Integer,
            Kind::Uint32 | Kind::Uint64 | Kind::Fixed32 | Kind::Fixed64 => FieldKind::Unsigned,
            Kind::Float | Kind::Double => FieldKind::Number,
            Kind::String => FieldKind::String,
            Kind::Bytes => FieldKind::Bytes,
            Kind::Enum(e) => FieldKind::Enum(e.values().map(|v| v.name().to_string()).collect()),
            Kind::Message(m) if m.full_name().starts_with("google.protobuf.") => {
                FieldKind::WellKnown(m.full_name().to_string())
            }
            Kind::Message(m) => FieldKind::Message(m),
        }
    }

    /// Human readable name used in validation errors and OpenAPI output
    pub fn describe(&self) -> &str {
        match self {
            FieldKind::Bool => "boolean",
            FieldKind::Integer => "integer",
            FieldKind::Unsigned => "unsigned integer",
            FieldKind::Number => "number",
            FieldKind::String => "string",
            FieldKind::Bytes => "base64 string",
            FieldKind::Enum(_) => "enum",
            FieldKind::Message(m) => m.name(),
            FieldKind::WellKnown(name) => name,
        }
    }

    fn check(&self, value: Value, path: &str) -> Result<Value, ValidationError> {
        let ok = match self {
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Integer => {
                value.is_i64() || value.as_str().map_or(false, |s| s.parse::<i64>().is_ok())
            }
            FieldKind::Unsigned => {
                value.is_u64() || value.as_str().map_or(false, |s| s.parse::<u64>().is_ok())
            }
            FieldKind::Number => {
                value.is_number() || value.as_str().map_or(false, |s| s.parse::<f64>().is_ok())
            }
            FieldKind::String | FieldKind::Bytes => value.is_string(),
            FieldKind::Enum(values) => {
                value.is_i64() || value.as_str().map_or(false, |s| values.iter().any(|v| v == s))
            }
            FieldKind::Message(descriptor) => {
                return match value {
                    Value::Object(map) => ModelSchema::from_descriptor(descriptor)
                        .validate_object(map, path)
                        .map(Value::Object),
                    _ => Err(ValidationError::new(path, "expected an object")),
                };
            }
            FieldKind::WellKnown(_) => true,
        };

        if ok {
            Ok(value)
        } else {
            Err(ValidationError::new(
                path,
                format!("expected {}", self.describe()),
            ))
        }
    }
}

/// Field cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Repeated,
    /// String-keyed map; the field kind describes the values
    Map,
}

/// One field of a model
#[derive(Debug, Clone)]
pub struct ModelField {
    pub name: String,
    pub json_name: String,
    pub kind: FieldKind,
    pub cardinality: Cardinality,
}

impl ModelField {
    fn from_descriptor(field: &FieldDescriptor) -> Self {
        let (kind, cardinality) = if field.is_map() {
            let value_kind = match field.kind() {
                Kind::Message(entry) => FieldKind::from_kind(entry.map_entry_value_field().kind()),
                other => FieldKind::from_kind(other),
            };
            (value_kind, Cardinality::Map)
        } else if field.is_list() {
            (FieldKind::from_kind(field.kind()), Cardinality::Repeated)
        } else {
            (FieldKind::from_kind(field.kind()), Cardinality::Single)
        };

        Self {
            name: field.name().to_string(),
            json_name: field.json_name().to_string(),
            kind,
            cardinality,
        }
    }
}

/// Validation failure at a JSON path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {reason}")]
pub struct ValidationError {
    pub path: String,
    pub reason: String,
}

impl ValidationError {
    fn new(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Structural JSON model of a message type
#[derive(Debug, Clone)]
pub struct ModelSchema {
    name: String,
    full_name: String,
    fields: Vec<ModelField>,
}

impl ModelSchema {
    /// Derive the model of a message type, fields in declaration order
    pub fn from_descriptor(descriptor: &MessageDescriptor) -> Self {
        Self {
            name: descriptor.name().to_string(),
            full_name: descriptor.full_name().to_string(),
            fields: descriptor
                .fields()
                .map(|f| ModelField::from_descriptor(&f))
                .collect(),
        }
    }

    /// Model name (the message's short name unless renamed)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully qualified name of the underlying message type
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn fields(&self) -> &[ModelField] {
        &self.fields
    }

    /// Look a field up by proto or JSON name
    pub fn field(&self, name: &str) -> Option<&ModelField> {
        self.fields
            .iter()
            .find(|f| f.name == name || f.json_name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Structural variant with the named fields removed
    pub fn without_fields<S: AsRef<str>>(&self, excluded: &[S]) -> Self {
        Self {
            name: self.name.clone(),
            full_name: self.full_name.clone(),
            fields: self
                .fields
                .iter()
                .filter(|f| !excluded.iter().any(|e| e.as_ref() == f.name))
                .cloned()
                .collect(),
        }
    }

    /// Same model under another name
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Validate a JSON value into an instance.
    ///
    /// The value must be an object. JSON field names are normalized to proto
    /// names and `null` values are dropped.
    pub fn validate(&self, value: Value) -> Result<ModelInstance, ValidationError> {
        match value {
            Value::Object(map) => self.validate_object(map, "").map(ModelInstance),
            _ => Err(ValidationError::new("$", "expected a JSON object")),
        }
    }

    fn validate_object(
        &self,
        map: Map<String, Value>,
        path: &str,
    ) -> Result<Map<String, Value>, ValidationError> {
        let mut out = Map::new();

        for (key, value) in map {
            let field = self
                .field(&key)
                .ok_or_else(|| ValidationError::new(&join(path, &key), "unknown field"))?;

            if value.is_null() {
                continue;
            }

            let field_path = join(path, &field.name);
            let value = match field.cardinality {
                Cardinality::Single => field.kind.check(value, &field_path)?,
                Cardinality::Repeated => match value {
                    Value::Array(items) => Value::Array(
                        items
                            .into_iter()
                            .enumerate()
                            .map(|(i, item)| {
                                field.kind.check(item, &format!("{}[{}]", field_path, i))
                            })
                            .collect::<Result<_, _>>()?,
                    ),
                    _ => return Err(ValidationError::new(&field_path, "expected an array")),
                },
                Cardinality::Map => match value {
                    Value::Object(entries) => Value::Object(
                        entries
                            .into_iter()
                            .map(|(k, v)| {
                                let checked = field.kind.check(v, &join(&field_path, &k))?;
                                Ok((k, checked))
                            })
                            .collect::<Result<_, ValidationError>>()?,
                    ),
                    _ => return Err(ValidationError::new(&field_path, "expected an object")),
                },
            };

            out.insert(field.name.clone(), value);
        }

        Ok(out)
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

/// A validated JSON object keyed by proto field names
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ModelInstance(Map<String, Value>);

impl ModelInstance {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// A message type paired with its model
#[derive(Debug)]
pub struct MessageModel {
    descriptor: MessageDescriptor,
    schema: ModelSchema,
}

impl MessageModel {
    pub fn new(descriptor: MessageDescriptor) -> Self {
        let schema = ModelSchema::from_descriptor(&descriptor);
        Self { descriptor, schema }
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }
}

/// Derives and caches message models
#[derive(Debug, Default)]
pub struct ModelLoader {
    policy: CacheKeyPolicy,
    cache: HashMap<String, Arc<MessageModel>>,
}

impl ModelLoader {
    pub fn new(policy: CacheKeyPolicy) -> Self {
        Self {
            policy,
            cache: HashMap::new(),
        }
    }

    /// Load the model of a message type. The first load for a key is cached
    /// and every later load for that key returns the same model.
    pub fn load(&mut self, descriptor: &MessageDescriptor) -> Arc<MessageModel> {
        let key = match self.policy {
            CacheKeyPolicy::Short => descriptor.name(),
            CacheKeyPolicy::Qualified => descriptor.full_name(),
        };

        if let Some(model) = self.cache.get(key) {
            if model.descriptor.full_name() != descriptor.full_name() {
                warn!(
                    cached = model.descriptor.full_name(),
                    requested = descriptor.full_name(),
                    "Model cache key collision, reusing cached model"
                );
            }
            return Arc::clone(model);
        }

        debug!(message = descriptor.full_name(), "Derived model");
        let model = Arc::new(MessageModel::new(descriptor.clone()));
        self.cache.insert(key.to_string(), Arc::clone(&model));
        model
    }

    /// Number of cached models
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Serialize a wire message into a validated instance
pub fn message_to_model(
    message: &DynamicMessage,
    schema: &ModelSchema,
) -> GatewayResult<ModelInstance> {
    let options = SerializeOptions::new()
        .use_proto_field_name(true)
        .stringify_64_bit_integers(false)
        .skip_default_fields(true);

    let value = message
        .serialize_with_options(serde_json::value::Serializer, &options)
        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

    schema
        .validate(value)
        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

/// Build a wire message from an instance and explicit field values.
/// Explicit fields win over the instance's.
pub fn model_to_message(
    instance: Option<&ModelInstance>,
    fields: &Map<String, Value>,
    descriptor: &MessageDescriptor,
) -> GatewayResult<DynamicMessage> {
    let mut merged = instance.map(|i| i.0.clone()).unwrap_or_default();
    for (name, value) in fields {
        merged.insert(name.clone(), value.clone());
    }

    DynamicMessage::deserialize(descriptor.clone(), Value::Object(merged))
        .map_err(|e| GatewayError::InvalidRequestBody(e.to_string()))
}
