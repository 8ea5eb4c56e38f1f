//! URL and HTTP method mapping for REST routes

use crate::error::{GatewayError, GatewayResult};
use crate::rules::is_placeholder;
use axum::routing::MethodFilter;
use std::fmt;

/// HTTP methods a route can be mounted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Parse HTTP method from string, ignoring case
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// axum method filter
    pub fn filter(&self) -> MethodFilter {
        match self {
            HttpMethod::Get => MethodFilter::GET,
            HttpMethod::Post => MethodFilter::POST,
            HttpMethod::Put => MethodFilter::PUT,
            HttpMethod::Patch => MethodFilter::PATCH,
            HttpMethod::Delete => MethodFilter::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// URL template with `{name}` path parameters.
/// Example: "/order/{id}/" or "/posts/{post_id}/comments/{comment_id}"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    template: String,
    segments: Vec<UrlSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum UrlSegment {
    /// Empty segments are kept so that trailing slashes survive
    Static(String),
    Parameter(String),
}

impl UrlTemplate {
    /// Parse a template. It must start with `/`.
    pub fn new(template: &str) -> GatewayResult<Self> {
        let invalid = |reason: String| GatewayError::InvalidRoutePath {
            path: template.to_string(),
            reason,
        };

        let rest = template
            .strip_prefix('/')
            .ok_or_else(|| invalid("must start with '/'".to_string()))?;

        let mut segments = Vec::new();
        if !rest.is_empty() {
            for part in rest.split('/') {
                if is_placeholder(part) {
                    segments.push(UrlSegment::Parameter(part[1..part.len() - 1].to_string()));
                } else if part.contains('{') || part.contains('}') {
                    return Err(invalid(format!("invalid parameter syntax in segment '{}'", part)));
                } else {
                    segments.push(UrlSegment::Static(part.to_string()));
                }
            }
        }

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    /// Get the template string
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Get parameter names from the template
    pub fn parameter_names(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter_map(|seg| match seg {
                UrlSegment::Parameter(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether `{name}` appears in the template
    pub fn has_parameter(&self, name: &str) -> bool {
        self.segments
            .iter()
            .any(|seg| matches!(seg, UrlSegment::Parameter(p) if p == name))
    }

    /// Path in axum's `:name` syntax
    pub fn axum_path(&self) -> String {
        self.render(|name| format!(":{}", name))
    }

    /// Whether both templates bind differently named parameters at the same
    /// position after a common prefix. Such routes cannot share one router.
    pub fn conflicts_with(&self, other: &UrlTemplate) -> bool {
        for pair in self.segments.iter().zip(&other.segments) {
            match pair {
                (UrlSegment::Static(a), UrlSegment::Static(b)) if a == b => {}
                (UrlSegment::Parameter(a), UrlSegment::Parameter(b)) if a == b => {}
                (UrlSegment::Parameter(_), UrlSegment::Parameter(_)) => return true,
                _ => return false,
            }
        }
        false
    }

    fn render(&self, param: impl Fn(&str) -> String) -> String {
        let mut out = String::from("/");
        let parts: Vec<String> = self
            .segments
            .iter()
            .map(|seg| match seg {
                UrlSegment::Static(s) => s.clone(),
                UrlSegment::Parameter(name) => param(name),
            })
            .collect();
        out.push_str(&parts.join("/"));
        out
    }
}

impl fmt::Display for UrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Concatenate a base path and a route path, avoiding a doubled `/`
pub fn join_paths(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    match (base.is_empty(), path.starts_with('/')) {
        (true, true) => path.to_string(),
        (true, false) => format!("/{}", path),
        (false, true) => format!("{}{}", base, path),
        (false, false) => format!("{}/{}", base, path),
    }
}
