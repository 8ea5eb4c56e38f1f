//! Service and method descriptors parsed from annotated declarations

use crate::annotation::{AnnotationParser, Annotations, Attributes, ParamDecl};
use crate::discovery::{LoadedGroup, MessageRegistry};
use crate::error::{GatewayError, GatewayResult};
use crate::model::{MessageModel, ModelLoader};
use crate::rules::{AttributeRules, InvalidAttributePolicy};
use prost_reflect::MessageDescriptor;
use prost_types::FileDescriptorProto;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Field number of `service` in `FileDescriptorProto`
const FILE_SERVICE_FIELD: i32 = 6;
/// Field number of `method` in `ServiceDescriptorProto`
const SERVICE_METHOD_FIELD: i32 = 2;

/// A service or method declaration with its documentation text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    name: String,
    full_name: String,
    documentation: String,
}

impl Declaration {
    pub fn new(
        name: impl Into<String>,
        full_name: impl Into<String>,
        documentation: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            documentation: documentation.into(),
        }
    }

    /// Declared name, e.g. `GetOrder`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully qualified name, e.g. `shop.v1.Order.GetOrder`
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn documentation(&self) -> &str {
        &self.documentation
    }

    /// Parse annotations without touching the documentation
    pub fn annotations(&self, parser: &AnnotationParser) -> Annotations {
        parser.parse(&self.documentation)
    }

    /// Parse annotations and strip the annotation lines from the
    /// documentation. A second call finds no annotations.
    pub fn take_annotations(&mut self, parser: &AnnotationParser) -> Annotations {
        let annotations = parser.parse(&self.documentation);
        self.documentation = annotations.remaining_doc.clone();
        annotations
    }
}

/// A declared RPC method with its proto signature
#[derive(Debug, Clone)]
pub struct MethodDeclaration {
    pub declaration: Declaration,
    pub input: MessageDescriptor,
    pub output: MessageDescriptor,
}

/// A declared RPC service and its methods in declaration order
#[derive(Debug, Clone)]
pub struct ServiceDeclaration {
    pub declaration: Declaration,
    pub methods: Vec<MethodDeclaration>,
}

/// Cleaned annotations of a service root or an included method
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub declaration: Declaration,
    pub attrs: Attributes,
    pub params: Vec<ParamDecl>,
    /// Always set for methods, never for the service root
    pub request: Option<Arc<MessageModel>>,
    pub response: Option<Arc<MessageModel>>,
}

impl MethodDescriptor {
    pub fn name(&self) -> &str {
        self.declaration.name()
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }
}

/// A service ready for route building
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    /// Fully qualified RPC service name the stub calls
    pub rpc_service: String,
    /// Service-level attributes (`host`, `port`, `path`)
    pub root: MethodDescriptor,
    pub methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    pub fn name(&self) -> &str {
        self.root.name()
    }
}

/// Turns loaded groups into service descriptors
#[derive(Debug, Clone)]
pub struct DescriptorParser {
    annotations: AnnotationParser,
    rules: AttributeRules,
    policy: InvalidAttributePolicy,
    strip_documentation: bool,
}

impl Default for DescriptorParser {
    fn default() -> Self {
        Self::new(AnnotationParser::default())
    }
}

impl DescriptorParser {
    pub fn new(annotations: AnnotationParser) -> Self {
        Self {
            annotations,
            rules: AttributeRules::default(),
            policy: InvalidAttributePolicy::default(),
            strip_documentation: true,
        }
    }

    pub fn rules(mut self, rules: AttributeRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn policy(mut self, policy: InvalidAttributePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether annotation lines are removed from declaration documentation
    pub fn strip_documentation(mut self, strip: bool) -> Self {
        self.strip_documentation = strip;
        self
    }

    /// Parse every service of a group, in declaration order
    pub fn parse_group(
        &self,
        group: LoadedGroup,
        loader: &mut ModelLoader,
    ) -> GatewayResult<Vec<ServiceDescriptor>> {
        let (services, registry) = group.into_parts();
        services
            .into_iter()
            .map(|service| self.parse_service(service, &registry, loader))
            .collect()
    }

    /// Parse one service declaration
    pub fn parse_service(
        &self,
        service: ServiceDeclaration,
        registry: &MessageRegistry,
        loader: &mut ModelLoader,
    ) -> GatewayResult<ServiceDescriptor> {
        let ServiceDeclaration {
            declaration: mut service_decl,
            methods,
        } = service;

        let annotations = self.read(&mut service_decl);
        let attrs = self
            .rules
            .clean(service_decl.full_name(), annotations.attrs, self.policy)?;
        let rpc_service = service_decl.full_name().to_string();
        let package = package_of(&rpc_service).to_string();

        let root = MethodDescriptor {
            declaration: service_decl,
            attrs,
            params: annotations.params,
            request: None,
            response: None,
        };

        let mut parsed = Vec::new();
        for method in methods {
            if let Some(descriptor) = self.parse_method(method, &package, registry, loader)? {
                parsed.push(descriptor);
            }
        }

        debug!(
            service = %rpc_service,
            methods = parsed.len(),
            "Parsed service annotations"
        );

        Ok(ServiceDescriptor {
            rpc_service,
            root,
            methods: parsed,
        })
    }

    fn parse_method(
        &self,
        method: MethodDeclaration,
        package: &str,
        registry: &MessageRegistry,
        loader: &mut ModelLoader,
    ) -> GatewayResult<Option<MethodDescriptor>> {
        let MethodDeclaration {
            mut declaration,
            input,
            output,
        } = method;

        let annotations = self.read(&mut declaration);
        let attrs = self
            .rules
            .clean(declaration.full_name(), annotations.attrs, self.policy)?;

        if attrs.is_empty() {
            debug!(method = declaration.full_name(), "No REST attributes, skipping");
            return Ok(None);
        }

        let mut resolve = |key: &str, signature: &MessageDescriptor| {
            let type_name = attrs
                .get(key)
                .ok_or_else(|| GatewayError::MissingMethodAttribute {
                    method: declaration.full_name().to_string(),
                    attribute: key.to_string(),
                })?;
            let descriptor = registry.get(type_name, package).ok_or_else(|| {
                GatewayError::UnknownMessageType {
                    declaration: declaration.full_name().to_string(),
                    type_name: type_name.clone(),
                }
            })?;

            if descriptor.full_name() != signature.full_name() {
                warn!(
                    method = declaration.full_name(),
                    attribute = key,
                    annotated = descriptor.full_name(),
                    declared = signature.full_name(),
                    "Annotated message type differs from the RPC signature"
                );
            }

            Ok::<_, GatewayError>(loader.load(&descriptor))
        };

        let request = resolve("request", &input)?;
        let response = resolve("response", &output)?;

        Ok(Some(MethodDescriptor {
            declaration,
            attrs,
            params: annotations.params,
            request: Some(request),
            response: Some(response),
        }))
    }

    fn read(&self, declaration: &mut Declaration) -> Annotations {
        if self.strip_documentation {
            declaration.take_annotations(&self.annotations)
        } else {
            declaration.annotations(&self.annotations)
        }
    }
}

fn package_of(full_name: &str) -> &str {
    full_name.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or("")
}

/// Leading comments of services and methods, keyed by fully qualified name.
///
/// Comments come from `SourceCodeInfo`, so descriptor sets must be produced
/// with `--include_source_info`.
pub fn leading_comments(files: &[FileDescriptorProto]) -> HashMap<String, String> {
    let mut comments = HashMap::new();

    for file in files {
        let Some(info) = &file.source_code_info else {
            continue;
        };

        for location in &info.location {
            let Some(text) = location.leading_comments.as_deref() else {
                continue;
            };

            let name = match location.path.as_slice() {
                [FILE_SERVICE_FIELD, s] => file
                    .service
                    .get(*s as usize)
                    .map(|svc| qualify(file.package(), svc.name())),
                [FILE_SERVICE_FIELD, s, SERVICE_METHOD_FIELD, m] => {
                    file.service.get(*s as usize).and_then(|svc| {
                        svc.method.get(*m as usize).map(|method| {
                            format!("{}.{}", qualify(file.package(), svc.name()), method.name())
                        })
                    })
                }
                _ => None,
            };

            if let Some(name) = name {
                comments.insert(name, normalize_comment(text));
            }
        }
    }

    comments
}

fn qualify(package: &str, name: &str) -> String {
    if package.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", package, name)
    }
}

/// protoc keeps the space after `//` and the final newline
fn normalize_comment(text: &str) -> String {
    text.trim_end_matches('\n')
        .split('\n')
        .map(|line| line.strip_prefix(' ').unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_take_annotations_is_destructive() {
        let parser = AnnotationParser::default();
        let mut decl = Declaration::new(
            "GetOrder",
            "shop.v1.Order.GetOrder",
            "Fetch one order.\n[REST] method=get",
        );

        let first = decl.take_annotations(&parser);
        assert_eq!(first.attrs["method"], "get");
        assert_eq!(decl.documentation(), "Fetch one order.");

        let second = decl.take_annotations(&parser);
        assert!(second.attrs.is_empty());
        assert!(second.params.is_empty());
    }

    #[test]
    fn test_pure_annotations_leave_documentation() {
        let parser = AnnotationParser::default();
        let decl = Declaration::new("Order", "shop.v1.Order", "[REST] host=localhost");
        assert_eq!(decl.annotations(&parser), decl.annotations(&parser));
        assert_eq!(decl.documentation(), "[REST] host=localhost");
    }

    #[test]
    fn test_leading_comments_from_source_info() {
        let comments = leading_comments(&[testing::order_file()]);
        assert_eq!(
            comments.get("shop.v1.Order").map(String::as_str),
            Some(testing::ORDER_SERVICE_DOC.trim_end_matches('\n'))
        );
        assert!(comments["shop.v1.Order.GetOrder"].contains("path=/{id}/"));
        assert!(!comments.contains_key("shop.v1.Order.Ping"));
    }

    #[test]
    fn test_normalize_comment() {
        assert_eq!(normalize_comment(" first\n  second\n"), "first\n second");
    }

    #[test]
    fn test_parse_group_skips_unannotated_methods() {
        let group = testing::order_group();
        let mut loader = ModelLoader::default();
        let services = DescriptorParser::default()
            .parse_group(group, &mut loader)
            .unwrap();

        assert_eq!(services.len(), 1);
        let service = &services[0];
        assert_eq!(service.rpc_service, "shop.v1.Order");
        assert_eq!(service.root.attr("host"), Some("localhost"));
        assert_eq!(service.root.attr("port"), Some("50051"));
        assert_eq!(service.root.declaration.documentation(), "Order service.");

        let names: Vec<_> = service.methods.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["GetOrder", "ListOrders"]);

        let get_order = &service.methods[0];
        assert_eq!(get_order.attr("method"), Some("GET"));
        assert_eq!(get_order.request.as_ref().unwrap().name(), "GetOrderRequest");
        assert_eq!(get_order.response.as_ref().unwrap().name(), "OrderResponse");
        assert_eq!(get_order.params[0].name, "id");
    }

    #[test]
    fn test_keep_documentation() {
        let group = testing::order_group();
        let mut loader = ModelLoader::default();
        let services = DescriptorParser::default()
            .strip_documentation(false)
            .parse_group(group, &mut loader)
            .unwrap();

        assert!(services[0]
            .root
            .declaration
            .documentation()
            .contains("[REST]"));
    }

    #[test]
    fn test_missing_response_attribute_fails() {
        let group = testing::group_with_docs(
            "[REST] host=localhost port=50051",
            &["[REST] request=GetOrderRequest method=get", "", ""],
        );
        let err = DescriptorParser::default()
            .parse_group(group, &mut ModelLoader::default())
            .unwrap_err();

        assert!(matches!(
            err,
            GatewayError::MissingMethodAttribute { ref attribute, .. } if attribute == "response"
        ));
    }

    #[test]
    fn test_unknown_message_type_fails() {
        let group = testing::group_with_docs(
            "[REST] host=localhost port=50051",
            &["[REST] request=Nope response=OrderResponse", "", ""],
        );
        let err = DescriptorParser::default()
            .parse_group(group, &mut ModelLoader::default())
            .unwrap_err();

        assert!(matches!(
            err,
            GatewayError::UnknownMessageType { ref type_name, .. } if type_name == "Nope"
        ));
    }

    #[test]
    fn test_only_invalid_method_attribute_excludes_method() {
        let group = testing::group_with_docs(
            "[REST] host=localhost port=50051",
            &["[REST] method=FOO", "", ""],
        );
        let services = DescriptorParser::default()
            .parse_group(group, &mut ModelLoader::default())
            .unwrap();

        assert!(services[0].methods.is_empty());
    }

    #[test]
    fn test_reject_policy_aborts() {
        let group = testing::group_with_docs(
            "[REST] host=localhost port=50051",
            &["[REST] method=FOO", "", ""],
        );
        let err = DescriptorParser::default()
            .policy(InvalidAttributePolicy::Reject)
            .parse_group(group, &mut ModelLoader::default())
            .unwrap_err();

        assert!(matches!(err, GatewayError::InvalidAttribute { .. }));
    }

    #[test]
    fn test_qualified_type_names_resolve() {
        let group = testing::group_with_docs(
            "[REST] host=localhost port=50051",
            &[
                "[REST] request=shop.v1.GetOrderRequest response=shop.v1.OrderResponse",
                "",
                "",
            ],
        );
        let services = DescriptorParser::default()
            .parse_group(group, &mut ModelLoader::default())
            .unwrap();

        assert_eq!(services[0].methods.len(), 1);
    }
}
