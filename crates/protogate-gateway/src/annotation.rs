//! REST annotation grammar embedded in declaration comments.
//!
//! An annotation line starts (after optional whitespace) with the marker and
//! carries `key=value` attributes and `name:type` parameter declarations:
//!
//! ```text
//! [REST] request=GetOrderRequest response=OrderResponse method=get path=/{id}/
//! [REST] id:int
//! ```
//!
//! Every other line is ordinary documentation.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Default annotation marker
pub const DEFAULT_MARKER: &str = "[REST]";

/// Attribute map, keyed by attribute name
pub type Attributes = BTreeMap<String, String>;

/// A `name:type` parameter declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    pub name: String,
    pub type_name: String,
}

/// Result of parsing one documentation text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    pub attrs: Attributes,
    /// Parameters in first-declaration order
    pub params: Vec<ParamDecl>,
    /// Documentation with annotation lines removed
    pub remaining_doc: String,
}

impl Annotations {
    fn set_param(&mut self, name: &str, type_name: &str) {
        match self.params.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.type_name = type_name.to_string(),
            None => self.params.push(ParamDecl {
                name: name.to_string(),
                type_name: type_name.to_string(),
            }),
        }
    }
}

/// Annotation parser for a given marker
#[derive(Debug, Clone)]
pub struct AnnotationParser {
    marker: String,
    line: Regex,
}

impl AnnotationParser {
    /// Create a parser recognizing `marker` at the start of a line
    pub fn new(marker: &str) -> Self {
        let line = format!(r"^\s*{}", regex::escape(marker));
        Self {
            marker: marker.to_string(),
            line: Regex::new(&line).expect("escaped marker is a valid regex"),
        }
    }

    /// The marker this parser recognizes
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Whether `line` is an annotation line
    pub fn is_annotation(&self, line: &str) -> bool {
        self.line.is_match(line)
    }

    /// Parse a documentation text.
    ///
    /// Attribute and parameter tokens are matched independently on every
    /// annotation line; a later token overrides an earlier one with the same
    /// key.
    pub fn parse(&self, doc: &str) -> Annotations {
        let mut annotations = Annotations::default();
        let mut kept = Vec::new();

        for line in doc.split('\n') {
            if !self.is_annotation(line) {
                kept.push(line);
                continue;
            }

            for caps in attr_regex().captures_iter(line) {
                annotations
                    .attrs
                    .insert(caps[1].to_string(), caps[2].to_string());
            }
            for caps in param_regex().captures_iter(line) {
                annotations.set_param(&caps[1], &caps[2]);
            }
        }

        annotations.remaining_doc = kept.join("\n");
        annotations
    }
}

impl Default for AnnotationParser {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}

/// `key=value` attribute token
fn attr_regex() -> &'static Regex {
    static ATTR: OnceLock<Regex> = OnceLock::new();
    ATTR.get_or_init(|| Regex::new(r"(\w+)\s*=\s*([\w/{}.]+)").expect("is valid regex"))
}

/// `name:type` parameter token
fn param_regex() -> &'static Regex {
    static PARAM: OnceLock<Regex> = OnceLock::new();
    PARAM.get_or_init(|| Regex::new(r"(\w+)\s*:\s*([\w/{}]+)").expect("is valid regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_regexes_are_shared() {
        let a = AnnotationParser::default();
        let b = AnnotationParser::new("@http");
        assert!(std::ptr::eq(attr_regex(), attr_regex()));
        assert!(std::ptr::eq(param_regex(), param_regex()));
        assert_eq!(
            a.parse("[REST] id:int").params,
            b.parse("@http id:int").params
        );
    }

    #[test]
    fn test_service_annotation() {
        let parser = AnnotationParser::default();
        let parsed = parser.parse(" Order service\n [REST] host=localhost port=50051");

        assert_eq!(parsed.attrs.get("host").map(String::as_str), Some("localhost"));
        assert_eq!(parsed.attrs.get("port").map(String::as_str), Some("50051"));
        assert!(parsed.params.is_empty());
        assert_eq!(parsed.remaining_doc, " Order service");
    }

    #[test]
    fn test_method_annotation_with_params() {
        let parser = AnnotationParser::default();
        let doc = "[REST] request=GetOrderRequest response=OrderResponse method=get path=/{id}/\n[REST] id:int";
        let parsed = parser.parse(doc);

        assert_eq!(parsed.attrs.len(), 4);
        assert_eq!(parsed.attrs["path"], "/{id}/");
        assert_eq!(parsed.attrs["request"], "GetOrderRequest");
        assert_eq!(
            parsed.params,
            vec![ParamDecl {
                name: "id".to_string(),
                type_name: "int".to_string()
            }]
        );
        assert_eq!(parsed.remaining_doc, "");
    }

    #[test]
    fn test_dotted_attribute_values() {
        let parser = AnnotationParser::default();
        let parsed = parser.parse("[REST] request=shop.v1.GetOrderRequest");
        assert_eq!(parsed.attrs["request"], "shop.v1.GetOrderRequest");
    }

    #[test]
    fn test_later_tokens_override() {
        let parser = AnnotationParser::default();
        let parsed = parser.parse("[REST] method=get id:int\n  [REST] method=post id:str page:int");

        assert_eq!(parsed.attrs["method"], "post");
        let params: Vec<_> = parsed
            .params
            .iter()
            .map(|p| (p.name.as_str(), p.type_name.as_str()))
            .collect();
        assert_eq!(params, vec![("id", "str"), ("page", "int")]);
    }

    #[test]
    fn test_marker_must_lead_the_line() {
        let parser = AnnotationParser::default();
        let parsed = parser.parse("see [REST] method=get");
        assert!(parsed.attrs.is_empty());
        assert_eq!(parsed.remaining_doc, "see [REST] method=get");
    }

    #[test]
    fn test_custom_marker() {
        let parser = AnnotationParser::new("@http");
        assert_eq!(parser.marker(), "@http");
        let parsed = parser.parse("@http method=delete\n[REST] method=get");
        assert_eq!(parsed.attrs["method"], "delete");
        assert_eq!(parsed.remaining_doc, "[REST] method=get");
    }

    #[test]
    fn test_pure_parse_is_idempotent() {
        let parser = AnnotationParser::default();
        let doc = "Fetch one order.\n[REST] method=get";
        assert_eq!(parser.parse(doc), parser.parse(doc));
    }

    #[test]
    fn test_empty_documentation() {
        let parsed = AnnotationParser::default().parse("");
        assert!(parsed.attrs.is_empty());
        assert!(parsed.params.is_empty());
        assert_eq!(parsed.remaining_doc, "");
    }
}
