//! OpenAPI 3.0 document for the synthesized routes

use crate::mapping::{join_paths, HttpMethod};
use crate::model::{Cardinality, FieldKind, ModelField, ModelSchema};
use crate::route::{ParamType, RouteDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const PROBLEM_DETAILS: &str = "ProblemDetails";

/// OpenAPI 3.0 specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenApiSpec {
    pub openapi: String,
    pub info: OpenApiInfo,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub servers: Vec<OpenApiServer>,
    pub paths: BTreeMap<String, OpenApiPathItem>,
    pub components: OpenApiComponents,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenApiInfo {
    pub title: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenApiServer {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenApiPathItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<OpenApiOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<OpenApiOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<OpenApiOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<OpenApiOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<OpenApiOperation>,
}

impl OpenApiPathItem {
    pub fn operation(&self, method: HttpMethod) -> Option<&OpenApiOperation> {
        match method {
            HttpMethod::Get => self.get.as_ref(),
            HttpMethod::Post => self.post.as_ref(),
            HttpMethod::Put => self.put.as_ref(),
            HttpMethod::Patch => self.patch.as_ref(),
            HttpMethod::Delete => self.delete.as_ref(),
        }
    }

    fn slot(&mut self, method: HttpMethod) -> &mut Option<OpenApiOperation> {
        match method {
            HttpMethod::Get => &mut self.get,
            HttpMethod::Post => &mut self.post,
            HttpMethod::Put => &mut self.put,
            HttpMethod::Patch => &mut self.patch,
            HttpMethod::Delete => &mut self.delete,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApiOperation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub operation_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub parameters: Vec<OpenApiParameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<OpenApiRequestBody>,
    pub responses: BTreeMap<String, OpenApiResponse>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenApiParameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: String, // "path" or "query"
    pub required: bool,
    pub schema: OpenApiSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenApiRequestBody {
    pub required: bool,
    pub content: BTreeMap<String, OpenApiMediaType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenApiResponse {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<BTreeMap<String, OpenApiMediaType>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenApiMediaType {
    pub schema: OpenApiSchema,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApiSchema {
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub properties: BTreeMap<String, OpenApiSchema>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<OpenApiSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<Box<OpenApiSchema>>,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty", default)]
    pub enum_values: Vec<String>,
}

impl OpenApiSchema {
    fn typed(schema_type: &str, format: Option<&str>) -> Self {
        Self {
            schema_type: Some(schema_type.to_string()),
            format: format.map(str::to_string),
            ..Self::default()
        }
    }

    fn reference(name: &str) -> Self {
        Self {
            reference: Some(format!("#/components/schemas/{}", name)),
            ..Self::default()
        }
    }

    fn for_param(ty: ParamType) -> Self {
        match ty {
            ParamType::Int => Self::typed("integer", Some("int64")),
            ParamType::Float => Self::typed("number", Some("double")),
            ParamType::Str => Self::typed("string", None),
            ParamType::Bool => Self::typed("boolean", None),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenApiComponents {
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub schemas: BTreeMap<String, OpenApiSchema>,
}

impl OpenApiComponents {
    /// Register a model and the messages it references; returns a `$ref`.
    /// The first model registered under a name wins.
    fn register(&mut self, model: &ModelSchema) -> OpenApiSchema {
        if !self.schemas.contains_key(model.name()) {
            // placeholder so self-referencing messages terminate
            self.schemas
                .insert(model.name().to_string(), OpenApiSchema::default());
            let rendered = self.object(model);
            self.schemas.insert(model.name().to_string(), rendered);
        }
        OpenApiSchema::reference(model.name())
    }

    fn object(&mut self, model: &ModelSchema) -> OpenApiSchema {
        OpenApiSchema {
            schema_type: Some("object".to_string()),
            properties: model
                .fields()
                .iter()
                .map(|field| (field.name.clone(), self.field(field)))
                .collect(),
            ..OpenApiSchema::default()
        }
    }

    fn field(&mut self, field: &ModelField) -> OpenApiSchema {
        let value = self.kind(&field.kind);
        match field.cardinality {
            Cardinality::Single => value,
            Cardinality::Repeated => OpenApiSchema {
                schema_type: Some("array".to_string()),
                items: Some(Box::new(value)),
                ..OpenApiSchema::default()
            },
            Cardinality::Map => OpenApiSchema {
                schema_type: Some("object".to_string()),
                additional_properties: Some(Box::new(value)),
                ..OpenApiSchema::default()
            },
        }
    }

    fn kind(&mut self, kind: &FieldKind) -> OpenApiSchema {
        match kind {
            FieldKind::Bool => OpenApiSchema::typed("boolean", None),
            FieldKind::Integer => OpenApiSchema::typed("integer", Some("int64")),
            FieldKind::Unsigned => OpenApiSchema::typed("integer", Some("uint64")),
            FieldKind::Number => OpenApiSchema::typed("number", Some("double")),
            FieldKind::String => OpenApiSchema::typed("string", None),
            FieldKind::Bytes => OpenApiSchema::typed("string", Some("byte")),
            FieldKind::Enum(values) => OpenApiSchema {
                enum_values: values.clone(),
                ..OpenApiSchema::typed("string", None)
            },
            FieldKind::Message(descriptor) => {
                self.register(&ModelSchema::from_descriptor(descriptor))
            }
            FieldKind::WellKnown(name) => match name.as_str() {
                "google.protobuf.Timestamp" => OpenApiSchema::typed("string", Some("date-time")),
                "google.protobuf.Duration" | "google.protobuf.FieldMask" => {
                    OpenApiSchema::typed("string", None)
                }
                _ => OpenApiSchema {
                    description: Some(name.clone()),
                    ..OpenApiSchema::default()
                },
            },
        }
    }

    fn register_problem_details(&mut self) -> OpenApiSchema {
        let string = || OpenApiSchema::typed("string", None);
        let properties = BTreeMap::from([
            ("type".to_string(), string()),
            ("title".to_string(), string()),
            ("status".to_string(), OpenApiSchema::typed("integer", Some("int32"))),
            ("detail".to_string(), string()),
            ("instance".to_string(), string()),
            ("rpc_status".to_string(), string()),
        ]);

        self.schemas
            .entry(PROBLEM_DETAILS.to_string())
            .or_insert_with(|| OpenApiSchema {
                schema_type: Some("object".to_string()),
                description: Some("RFC 7807 Problem Details".to_string()),
                properties,
                required: vec!["type".to_string(), "title".to_string(), "status".to_string()],
                ..OpenApiSchema::default()
            });
        OpenApiSchema::reference(PROBLEM_DETAILS)
    }
}

fn json_content(media_type: &str, schema: OpenApiSchema) -> BTreeMap<String, OpenApiMediaType> {
    BTreeMap::from([(media_type.to_string(), OpenApiMediaType { schema })])
}

/// OpenAPI spec builder
pub struct OpenApiSpecBuilder {
    title: String,
    version: String,
    description: Option<String>,
    servers: Vec<OpenApiServer>,
    base_path: String,
}

impl OpenApiSpecBuilder {
    pub fn new(title: &str, version: &str) -> Self {
        Self {
            title: title.to_string(),
            version: version.to_string(),
            description: None,
            servers: Vec::new(),
            base_path: String::new(),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn server(mut self, url: &str, description: Option<&str>) -> Self {
        self.servers.push(OpenApiServer {
            url: url.to_string(),
            description: description.map(|s| s.to_string()),
        });
        self
    }

    /// Prefix of every documented path
    pub fn base_path(mut self, base_path: &str) -> Self {
        self.base_path = base_path.to_string();
        self
    }

    /// Render one operation per route and method
    pub fn build(self, routes: &[RouteDescriptor]) -> OpenApiSpec {
        let mut paths: BTreeMap<String, OpenApiPathItem> = BTreeMap::new();
        let mut components = OpenApiComponents::default();
        let problem = components.register_problem_details();

        for route in routes {
            let endpoint = &route.endpoint;

            let parameters = endpoint
                .schema
                .params
                .iter()
                .map(|param| OpenApiParameter {
                    name: param.name.clone(),
                    location: param.location.as_str().to_string(),
                    required: true,
                    schema: OpenApiSchema::for_param(param.ty),
                })
                .collect::<Vec<_>>();

            let request_body = endpoint.schema.body.as_ref().map(|body| OpenApiRequestBody {
                required: false,
                content: json_content("application/json", components.register(body)),
            });

            let success = match &route.response_model {
                Some(model) => OpenApiResponse {
                    description: "Successful response".to_string(),
                    content: Some(json_content(
                        "application/json",
                        components.register(model.schema()),
                    )),
                },
                None => OpenApiResponse {
                    description: "Successful response".to_string(),
                    content: None,
                },
            };
            let responses = BTreeMap::from([
                ("200".to_string(), success),
                (
                    "default".to_string(),
                    OpenApiResponse {
                        description: "Error response (Problem Details)".to_string(),
                        content: Some(json_content("application/problem+json", problem.clone())),
                    },
                ),
            ]);

            let operation = OpenApiOperation {
                summary: Some(format!("{}.{}", route.service, endpoint.procedure)),
                description: endpoint.description.clone(),
                operation_id: endpoint.name.clone(),
                parameters,
                request_body,
                responses,
                tags: vec![route.service.clone()],
            };

            let path_item = paths
                .entry(join_paths(&self.base_path, &route.path))
                .or_default();
            for method in &route.methods {
                *path_item.slot(*method) = Some(operation.clone());
            }
        }

        OpenApiSpec {
            openapi: "3.0.3".to_string(),
            info: OpenApiInfo {
                title: self.title,
                version: self.version,
                description: self.description,
            },
            servers: self.servers,
            paths,
            components,
        }
    }
}

impl OpenApiSpec {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
