//! REST gateway router

use crate::error::{GatewayError, GatewayResult};
use crate::mapping::{join_paths, HttpMethod, UrlTemplate};
use crate::middleware::{cors, CorsConfig};
use crate::model::ModelInstance;
use crate::openapi::{OpenApiSpec, OpenApiSpecBuilder};
use crate::route::{Endpoint, Invocation, ParamLocation, RequestSchema, RouteDescriptor};
use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, on, MethodRouter},
    Json, Router,
};
use bytes::Bytes;
use protogate_core::ProblemDetails;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One mounted route, for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedRoute {
    pub method: HttpMethod,
    /// Full path template including the base path
    pub path: String,
    pub endpoint: String,
    pub service: String,
    pub procedure: String,
}

/// REST gateway over synthesized routes
pub struct RestGateway {
    router: Router,
    openapi_spec: OpenApiSpec,
    mounted: Vec<MountedRoute>,
}

impl RestGateway {
    /// Get the Axum router
    pub fn router(self) -> Router {
        self.router
    }

    pub fn openapi_spec(&self) -> &OpenApiSpec {
        &self.openapi_spec
    }

    pub fn openapi_json(&self) -> Result<String, serde_json::Error> {
        self.openapi_spec.to_json()
    }

    /// Mounted routes in registration order
    pub fn routes(&self) -> &[MountedRoute] {
        &self.mounted
    }
}

/// REST gateway builder
pub struct RestGatewayBuilder {
    routes: Vec<RouteDescriptor>,
    title: String,
    version: String,
    description: Option<String>,
    base_path: String,
    cors: Option<CorsConfig>,
}

impl RestGatewayBuilder {
    pub fn new(routes: Vec<RouteDescriptor>) -> Self {
        Self {
            routes,
            title: "protogate".to_string(),
            version: "1.0.0".to_string(),
            description: None,
            base_path: "/api/v1".to_string(),
            cors: None,
        }
    }

    /// Set API title
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    /// Set API version
    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Set API description
    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Set base path for all routes
    pub fn base_path(mut self, base_path: &str) -> Self {
        self.base_path = base_path.to_string();
        self
    }

    pub fn cors(mut self, cors: CorsConfig) -> Self {
        self.cors = Some(cors);
        self
    }

    /// Mount every route. Fails on two routes with the same method and path,
    /// or on templates the router cannot hold side by side.
    pub fn build(self) -> GatewayResult<RestGateway> {
        let mut templates: Vec<UrlTemplate> = Vec::new();
        let mut method_routers: BTreeMap<String, MethodRouter> = BTreeMap::new();
        let mut mounted = Vec::new();

        for route in &self.routes {
            let template = UrlTemplate::new(&join_paths(&self.base_path, &route.path))?;
            if let Some(existing) = templates.iter().find(|t| t.conflicts_with(&template)) {
                return Err(GatewayError::ConflictingRoute {
                    path: template.to_string(),
                    existing: existing.to_string(),
                });
            }
            if !templates.contains(&template) {
                templates.push(template.clone());
            }

            let endpoint = Arc::new(route.endpoint.clone());
            for method in &route.methods {
                if mounted
                    .iter()
                    .any(|m: &MountedRoute| m.method == *method && m.path == template.template())
                {
                    return Err(GatewayError::DuplicateRoute {
                        method: method.to_string(),
                        path: template.to_string(),
                    });
                }

                let method_router = on(method.filter(), dispatch).with_state(endpoint.clone());
                let axum_path = template.axum_path();
                let merged = match method_routers.remove(&axum_path) {
                    Some(existing) => existing.merge(method_router),
                    None => method_router,
                };
                method_routers.insert(axum_path, merged);

                debug!(method = %method, path = %template, endpoint = %endpoint.name, "Mounted route");
                mounted.push(MountedRoute {
                    method: *method,
                    path: template.to_string(),
                    endpoint: endpoint.name.clone(),
                    service: route.service.clone(),
                    procedure: endpoint.procedure.clone(),
                });
            }
        }

        let openapi_spec = self.build_openapi_spec();
        let openapi_doc = serde_json::to_value(&openapi_spec)?;

        let mut router = Router::new().route(
            "/openapi.json",
            get(move || async move { Json(openapi_doc) }),
        );
        for (path, method_router) in method_routers {
            router = router.route(&path, method_router);
        }
        router = router.fallback(not_found);

        if let Some(config) = self.cors {
            router = router.layer(middleware::from_fn_with_state(Arc::new(config), cors));
        }

        info!(routes = mounted.len(), base_path = %self.base_path, "REST gateway ready");
        Ok(RestGateway {
            router,
            openapi_spec,
            mounted,
        })
    }

    fn build_openapi_spec(&self) -> OpenApiSpec {
        let mut builder = OpenApiSpecBuilder::new(&self.title, &self.version).base_path(&self.base_path);

        if let Some(desc) = &self.description {
            builder = builder.description(desc);
        }

        builder.build(&self.routes)
    }
}

async fn dispatch(
    State(endpoint): State<Arc<Endpoint>>,
    OriginalUri(uri): OriginalUri,
    path: Option<Path<HashMap<String, String>>>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Json<ModelInstance>, GatewayResponse> {
    let path = path.map(|Path(params)| params).unwrap_or_default();
    let respond = |err: GatewayError| GatewayResponse::new(err).instance(uri.path());

    let invocation = bind_invocation(&endpoint.schema, &path, &query, &body).map_err(respond)?;
    let instance = endpoint.call(invocation).await.map_err(respond)?;
    Ok(Json(instance))
}

/// Coerce path and query parameters and validate the JSON body against the
/// request schema. An empty body counts as `{}`.
pub fn bind_invocation(
    schema: &RequestSchema,
    path: &HashMap<String, String>,
    query: &HashMap<String, String>,
    body: &[u8],
) -> GatewayResult<Invocation> {
    let mut params = Map::new();
    for param in &schema.params {
        let source = match param.location {
            ParamLocation::Path => path,
            ParamLocation::Query => query,
        };
        let raw = source
            .get(&param.name)
            .ok_or_else(|| GatewayError::InvalidParameter {
                name: param.name.clone(),
                reason: format!("missing {} parameter", param.location.as_str()),
            })?;
        let value = param
            .ty
            .coerce(raw)
            .map_err(|reason| GatewayError::InvalidParameter {
                name: param.name.clone(),
                reason,
            })?;
        params.insert(param.name.clone(), value);
    }

    let body = match &schema.body {
        Some(model) => {
            let value = if body.iter().all(u8::is_ascii_whitespace) {
                Value::Object(Map::new())
            } else {
                serde_json::from_slice(body)
                    .map_err(|e| GatewayError::InvalidRequestBody(format!("malformed JSON: {}", e)))?
            };
            let instance = model
                .validate(value)
                .map_err(|e| GatewayError::InvalidRequestBody(e.to_string()))?;
            Some(instance)
        }
        None => None,
    };

    Ok(Invocation { params, body })
}

async fn not_found(OriginalUri(uri): OriginalUri) -> Response {
    let problem = ProblemDetails::new(StatusCode::NOT_FOUND, "Not Found")
        .with_type("urn:protogate:gateway:not-found")
        .with_detail(format!("no route for {}", uri.path()))
        .with_instance(uri.path());
    problem_response(&problem)
}

fn problem_response(problem: &ProblemDetails) -> Response {
    let status = StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match problem.to_json() {
        Ok(body) => (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            body,
        )
            .into_response(),
        Err(_) => status.into_response(),
    }
}

/// Gateway error rendered as Problem Details
struct GatewayResponse {
    error: GatewayError,
    instance: Option<String>,
}

impl GatewayResponse {
    fn new(error: GatewayError) -> Self {
        Self {
            error,
            instance: None,
        }
    }

    fn instance(mut self, instance: &str) -> Self {
        self.instance = Some(instance.to_string());
        self
    }
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        let mut problem = self.error.to_problem_details();
        if problem.instance.is_none() {
            problem.instance = self.instance;
        }

        if problem.status >= 500 {
            error!(status = problem.status, error = %self.error, "Request failed");
        } else {
            warn!(status = problem.status, error = %self.error, "Request rejected");
        }
        problem_response(&problem)
    }
}
