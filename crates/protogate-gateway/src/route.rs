//! Route synthesis: one route per annotated method of a service

use crate::descriptor::{MethodDescriptor, ServiceDescriptor};
use crate::error::{GatewayError, GatewayResult};
use crate::mapping::{HttpMethod, UrlTemplate};
use crate::model::{message_to_model, model_to_message, MessageModel, ModelInstance, ModelSchema};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use heck::ToSnakeCase;
use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor};
use protogate_client::{Connector, Endpoint as RpcEndpoint, RpcChannel};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, Instrument};

/// Primitive type of a path or query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Int,
    Float,
    Str,
    Bool,
}

impl ParamType {
    /// Parse a declared type name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "int" | "integer" | "i32" | "i64" => Some(ParamType::Int),
            "float" | "double" | "number" | "f32" | "f64" => Some(ParamType::Float),
            "str" | "string" => Some(ParamType::Str),
            "bool" | "boolean" => Some(ParamType::Bool),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Str => "str",
            ParamType::Bool => "bool",
        }
    }

    /// Coerce a raw path or query string
    pub fn coerce(&self, raw: &str) -> Result<Value, String> {
        match self {
            ParamType::Int => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("expected an integer, got '{}'", raw)),
            ParamType::Float => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("expected a number, got '{}'", raw)),
            ParamType::Str => Ok(Value::String(raw.to_string())),
            ParamType::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
                _ => Err(format!("expected a boolean, got '{}'", raw)),
            },
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a parameter is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
}

impl ParamLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
        }
    }
}

/// One declared parameter of an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub location: ParamLocation,
}

/// Inputs an endpoint expects, in declaration order
#[derive(Debug, Clone)]
pub struct RequestSchema {
    pub params: Vec<ParamSpec>,
    /// Request model minus the parameter fields; absent when nothing is left
    pub body: Option<ModelSchema>,
}

/// Bound inputs of one request
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Coerced parameter values by field name
    pub params: Map<String, Value>,
    pub body: Option<ModelInstance>,
}

/// Request handler bound to one RPC procedure
pub type HandlerFn =
    Arc<dyn Fn(Invocation) -> BoxFuture<'static, GatewayResult<ModelInstance>> + Send + Sync>;

/// Named handler with its request schema
#[derive(Clone)]
pub struct Endpoint {
    /// snake_case of the method name
    pub name: String,
    /// Declared RPC method name
    pub procedure: String,
    pub schema: RequestSchema,
    /// Method documentation left after annotation stripping
    pub description: Option<String>,
    handler: HandlerFn,
}

impl Endpoint {
    pub fn new(
        name: impl Into<String>,
        procedure: impl Into<String>,
        schema: RequestSchema,
        handler: HandlerFn,
    ) -> Self {
        Self {
            name: name.into(),
            procedure: procedure.into(),
            schema,
            description: None,
            handler,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = if description.trim().is_empty() {
            None
        } else {
            Some(description)
        };
        self
    }

    /// Run the handler
    pub fn call(&self, invocation: Invocation) -> BoxFuture<'static, GatewayResult<ModelInstance>> {
        (self.handler)(invocation)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("procedure", &self.procedure)
            .field("schema", &self.schema)
            .finish()
    }
}

/// A synthesized HTTP route
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    /// Path template with `{name}` placeholders
    pub path: String,
    pub methods: Vec<HttpMethod>,
    pub endpoint: Endpoint,
    pub response_model: Option<Arc<MessageModel>>,
    /// Fully qualified RPC service the route calls
    pub service: String,
}

/// Client-side proxy for one RPC service
#[derive(Clone)]
pub struct ServiceStub {
    service: String,
    channel: Arc<dyn RpcChannel>,
}

impl ServiceStub {
    pub fn new(service: impl Into<String>, channel: Arc<dyn RpcChannel>) -> Self {
        Self {
            service: service.into(),
            channel,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Call `method` and decode its reply as `response`
    pub async fn unary(
        &self,
        method: &str,
        request: &DynamicMessage,
        response: &MessageDescriptor,
    ) -> GatewayResult<DynamicMessage> {
        let payload = Bytes::from(request.encode_to_vec());
        let reply = self.channel.unary(&self.service, method, payload).await?;

        DynamicMessage::decode(response.clone(), reply)
            .map_err(|e| GatewayError::Protobuf(format!("{} reply: {}", method, e)))
    }
}

impl fmt::Debug for ServiceStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceStub")
            .field("service", &self.service)
            .finish()
    }
}

/// Builds the routes of a service
pub struct RouteBuilder {
    connector: Arc<dyn Connector>,
}

impl RouteBuilder {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Validate service attributes, connect once, and emit one route per
    /// method in declaration order
    pub fn build(&self, service: &ServiceDescriptor) -> GatewayResult<Vec<RouteDescriptor>> {
        let endpoint = service_endpoint(service)?;
        let channel = self
            .connector
            .connect(&endpoint)
            .map_err(|e| GatewayError::Connect {
                service: service.rpc_service.clone(),
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        let stub = ServiceStub::new(service.rpc_service.clone(), channel);
        let base_path = service_base_path(service);

        let routes = service
            .methods
            .iter()
            .map(|method| build_route(&stub, &base_path, method))
            .collect::<GatewayResult<Vec<_>>>()?;

        info!(
            service = %service.rpc_service,
            upstream = %endpoint,
            routes = routes.len(),
            "Built service routes"
        );
        Ok(routes)
    }
}

fn service_endpoint(service: &ServiceDescriptor) -> GatewayResult<RpcEndpoint> {
    let required = |key: &str| {
        service
            .root
            .attr(key)
            .ok_or_else(|| GatewayError::MissingServiceAttribute {
                service: service.rpc_service.clone(),
                attribute: key.to_string(),
            })
    };

    let host = required("host")?;
    let port = required("port")?;
    let port = port
        .parse::<u16>()
        .map_err(|e| GatewayError::InvalidServiceAttribute {
            service: service.rpc_service.clone(),
            attribute: "port".to_string(),
            reason: e.to_string(),
        })?;

    Ok(RpcEndpoint::new(host, port))
}

/// Explicit `path`, else `/` + snake_case of the name without its
/// `Servicer`/`Service` suffix; never ends with `/`
pub fn service_base_path(service: &ServiceDescriptor) -> String {
    let path = match service.root.attr("path") {
        Some(path) => path.to_string(),
        None => {
            let name = service.name();
            let stem = name
                .strip_suffix("Servicer")
                .or_else(|| name.strip_suffix("Service"))
                .unwrap_or(name);
            format!("/{}", stem.to_snake_case())
        }
    };
    path.trim_end_matches('/').to_string()
}

/// Explicit `path`, else `/` + the method name
pub fn method_path(method: &MethodDescriptor) -> String {
    match method.attr("path") {
        Some(path) => path.to_string(),
        None => format!("/{}", method.name()),
    }
}

fn build_route(
    stub: &ServiceStub,
    base_path: &str,
    method: &MethodDescriptor,
) -> GatewayResult<RouteDescriptor> {
    let missing = |attribute: &str| GatewayError::MissingMethodAttribute {
        method: method.declaration.full_name().to_string(),
        attribute: attribute.to_string(),
    };
    let request = method.request.clone().ok_or_else(|| missing("request"))?;
    let response = method.response.clone().ok_or_else(|| missing("response"))?;

    let path = format!("{}{}", base_path, method_path(method));
    let template = UrlTemplate::new(&path)?;

    let mut params = Vec::with_capacity(method.params.len());
    for decl in &method.params {
        if request.descriptor().get_field_by_name(&decl.name).is_none() {
            return Err(GatewayError::UnknownParameter {
                method: method.declaration.full_name().to_string(),
                param: decl.name.clone(),
                message: request.descriptor().full_name().to_string(),
            });
        }
        let ty = ParamType::parse(&decl.type_name).ok_or_else(|| {
            GatewayError::UnknownParameterType {
                method: method.declaration.full_name().to_string(),
                param: decl.name.clone(),
                type_name: decl.type_name.clone(),
            }
        })?;
        let location = if template.has_parameter(&decl.name) {
            ParamLocation::Path
        } else {
            ParamLocation::Query
        };
        params.push(ParamSpec {
            name: decl.name.clone(),
            ty,
            location,
        });
    }

    let excluded: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
    let body = request.schema().without_fields(&excluded);
    let body = if body.is_empty() {
        None
    } else if excluded.is_empty() {
        Some(body)
    } else {
        let service = stub.service().rsplit('.').next().unwrap_or(stub.service());
        Some(body.renamed(format!("{}{}Body", service, method.name())))
    };

    let http_method = match method.attr("method") {
        Some(m) => HttpMethod::parse(m).ok_or_else(|| GatewayError::InvalidAttribute {
            declaration: method.declaration.full_name().to_string(),
            key: "method".to_string(),
            value: m.to_string(),
        })?,
        None => HttpMethod::Post,
    };

    let endpoint = Endpoint::new(
        method.name().to_snake_case(),
        method.name(),
        RequestSchema { params, body },
        handler(stub.clone(), method.name().to_string(), request, response.clone()),
    )
    .with_description(method.declaration.documentation());

    debug!(
        method = %http_method,
        path = %path,
        endpoint = %endpoint.name,
        "Built route"
    );

    Ok(RouteDescriptor {
        path,
        methods: vec![http_method],
        endpoint,
        response_model: Some(response),
        service: stub.service().to_string(),
    })
}

fn handler(
    stub: ServiceStub,
    procedure: String,
    request: Arc<MessageModel>,
    response: Arc<MessageModel>,
) -> HandlerFn {
    Arc::new(move |invocation: Invocation| -> BoxFuture<'static, GatewayResult<ModelInstance>> {
        let stub = stub.clone();
        let procedure = procedure.clone();
        let request = Arc::clone(&request);
        let response = Arc::clone(&response);
        let span = tracing::debug_span!(
            "rpc",
            rpc.service = %stub.service(),
            rpc.method = %procedure
        );

        Box::pin(
            async move {
                let message = model_to_message(
                    invocation.body.as_ref(),
                    &invocation.params,
                    request.descriptor(),
                )?;
                let reply = stub
                    .unary(&procedure, &message, response.descriptor())
                    .await?;
                message_to_model(&reply, response.schema())
            }
            .instrument(span),
        )
    })
}
