//! Attribute validation and normalization rules

use crate::annotation::Attributes;
use crate::error::{GatewayError, GatewayResult};
use crate::mapping::HttpMethod;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// What to do with an attribute its rule rejects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidAttributePolicy {
    /// Discard the attribute and keep going
    #[default]
    Drop,
    /// Abort assembly
    Reject,
}

/// Validator and normalizer for one attribute key
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeRule {
    pub validate: Option<fn(&str) -> bool>,
    pub normalize: Option<fn(&str) -> String>,
}

/// Registry of attribute rules. Keys without a rule are accepted as-is.
#[derive(Debug, Clone)]
pub struct AttributeRules {
    rules: HashMap<String, AttributeRule>,
}

impl AttributeRules {
    /// Registry without any rules
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Register (or replace) the rule for `key`
    pub fn register(&mut self, key: &str, rule: AttributeRule) -> &mut Self {
        self.rules.insert(key.to_string(), rule);
        self
    }

    /// Get the rule for `key`
    pub fn get(&self, key: &str) -> Option<&AttributeRule> {
        self.rules.get(key)
    }

    /// Validate and normalize every attribute of `declaration`
    pub fn clean(
        &self,
        declaration: &str,
        attrs: Attributes,
        policy: InvalidAttributePolicy,
    ) -> GatewayResult<Attributes> {
        let mut cleaned = Attributes::new();

        for (key, value) in attrs {
            let rule = self.rules.get(&key).copied().unwrap_or_default();

            if let Some(validate) = rule.validate {
                if !validate(&value) {
                    match policy {
                        InvalidAttributePolicy::Drop => {
                            warn!(declaration, key = %key, value = %value, "Dropping invalid attribute");
                            continue;
                        }
                        InvalidAttributePolicy::Reject => {
                            return Err(GatewayError::InvalidAttribute {
                                declaration: declaration.to_string(),
                                key,
                                value,
                            });
                        }
                    }
                }
            }

            let value = match rule.normalize {
                Some(normalize) => normalize(&value),
                None => value,
            };
            cleaned.insert(key, value);
        }

        Ok(cleaned)
    }
}

impl Default for AttributeRules {
    fn default() -> Self {
        let mut rules = Self::empty();
        rules
            .register(
                "method",
                AttributeRule {
                    validate: Some(validate_method),
                    normalize: Some(normalize_method),
                },
            )
            .register(
                "path",
                AttributeRule {
                    validate: Some(validate_path),
                    normalize: Some(normalize_path),
                },
            );
        rules
    }
}

/// GET, POST, PUT, PATCH or DELETE in any case
pub fn validate_method(value: &str) -> bool {
    HttpMethod::parse(value).is_some()
}

pub fn normalize_method(value: &str) -> String {
    value.to_uppercase()
}

/// Every `/`-separated segment is empty, alphanumeric, or a `{placeholder}`
pub fn validate_path(value: &str) -> bool {
    value.split('/').all(|segment| {
        segment.is_empty()
            || segment.chars().all(char::is_alphanumeric)
            || is_placeholder(segment)
    })
}

pub fn normalize_path(value: &str) -> String {
    if value.starts_with('/') {
        value.to_string()
    } else {
        format!("/{}", value)
    }
}

pub(crate) fn is_placeholder(segment: &str) -> bool {
    segment.len() > 2
        && segment.starts_with('{')
        && segment.ends_with('}')
        && segment[1..segment.len() - 1]
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_method_rule() {
        assert!(validate_method("get"));
        assert!(validate_method("Patch"));
        assert!(!validate_method("FOO"));
        assert!(!validate_method("head"));
        assert_eq!(normalize_method("delete"), "DELETE");
    }

    #[test]
    fn test_path_rule() {
        assert!(validate_path("/{id}/"));
        assert!(validate_path("orders/{order_id}/items"));
        assert!(validate_path("/"));
        assert!(!validate_path("/order-items"));
        assert!(!validate_path("/{}"));
        assert!(!validate_path("/pre{id}"));
        assert_eq!(normalize_path("orders"), "/orders");
        assert_eq!(normalize_path("/orders"), "/orders");
    }

    #[test]
    fn test_clean_normalizes_and_keeps_unknown_keys() {
        let rules = AttributeRules::default();
        let cleaned = rules
            .clean(
                "GetOrder",
                attrs(&[("method", "get"), ("path", "{id}"), ("request", "GetOrderRequest")]),
                InvalidAttributePolicy::Drop,
            )
            .unwrap();

        assert_eq!(cleaned["method"], "GET");
        assert_eq!(cleaned["path"], "/{id}");
        assert_eq!(cleaned["request"], "GetOrderRequest");
    }

    #[test]
    fn test_drop_policy_discards_invalid() {
        let rules = AttributeRules::default();
        let cleaned = rules
            .clean("GetOrder", attrs(&[("method", "FOO")]), InvalidAttributePolicy::Drop)
            .unwrap();
        assert!(cleaned.is_empty());
    }

    #[test]
    fn test_reject_policy_fails() {
        let rules = AttributeRules::default();
        let err = rules
            .clean("GetOrder", attrs(&[("method", "FOO")]), InvalidAttributePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidAttribute { ref key, .. } if key == "method"));
    }

    fn valid_port(value: &str) -> bool {
        value.parse::<u16>().is_ok()
    }

    #[test]
    fn test_custom_rule() {
        let mut rules = AttributeRules::empty();
        rules.register(
            "port",
            AttributeRule {
                validate: Some(valid_port),
                normalize: None,
            },
        );

        let cleaned = rules
            .clean(
                "Order",
                attrs(&[("port", "99999"), ("host", "localhost")]),
                InvalidAttributePolicy::Drop,
            )
            .unwrap();
        assert!(!cleaned.contains_key("port"));
        assert_eq!(cleaned["host"], "localhost");
        assert!(rules.get("method").is_none());
    }
}
