use std::collections::HashMap;
use std::io::Read;

use serde::{Deserialize, Serialize};

/// Directive configuration document.
///
/// ```json
/// {
///   "exclusions": ["parse-as-csv", "invoke-http"],
///   "aliases": { "json-parser": "parse-as-json" }
/// }
/// ```
///
/// Both sections are optional. Excluded directives are rejected when a pipeline is configured;
/// aliases are resolved to their target before the catalogue lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<HashMap<String, String>>,
}

impl DirectiveConfig {
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn from_reader<R: Read>(reader: R) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }

    /// The alias target for `name`, or `name` itself.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases
            .as_ref()
            .and_then(|aliases| aliases.get(name))
            .map(String::as_str)
            .unwrap_or(name)
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclusions
            .as_ref()
            .is_some_and(|names| names.iter().any(|n| n == name))
    }
}

#[cfg(test)]
mod tests {
    use super::DirectiveConfig;
    use crate::directive::{Directive, ParsedDirective};
    use crate::error::DirectiveError;

    const FULL: &str = r#"
    {
        "exclusions" : ["parse-as-csv", "parse-as-excel", "set", "invoke-http"],
        "aliases" : {
            "json-parser" : "parse-as-json",
            "js-parser" : "parse-as-json"
        }
    }"#;

    #[test]
    fn parses_both_sections() {
        let config = DirectiveConfig::from_json_str(FULL).unwrap();
        assert_eq!(config.exclusions.as_ref().map(Vec::len), Some(4));
        assert_eq!(config.aliases.as_ref().map(|a| a.len()), Some(2));
    }

    #[test]
    fn parses_only_exclusions() {
        let config =
            DirectiveConfig::from_json_str(r#"{"exclusions": ["parse-as-csv", "set"]}"#).unwrap();
        assert_eq!(config.exclusions.as_ref().map(Vec::len), Some(2));
        assert!(config.aliases.is_none());
    }

    #[test]
    fn parses_only_aliases() {
        let config =
            DirectiveConfig::from_json_str(r#"{"aliases": {"js-parser": "parse-as-json"}}"#)
                .unwrap();
        assert!(config.exclusions.is_none());
        assert_eq!(config.resolve("js-parser"), "parse-as-json");
        assert_eq!(config.resolve("trim"), "trim");
    }

    #[test]
    fn parses_empty_document() {
        let config = DirectiveConfig::from_json_str("{}").unwrap();
        assert_eq!(config, DirectiveConfig::default());
        assert!(!config.is_excluded("anything"));
    }

    #[test]
    fn routing_honours_aliases_and_exclusions() {
        let config = DirectiveConfig::from_json_str(FULL).unwrap();

        let aliased = ParsedDirective::new(3, "json-parser", ["body"]);
        let d = Directive::from_parsed(&aliased, &config).unwrap();
        assert_eq!(d.name(), "parse-as-json");

        let excluded = ParsedDirective::new(4, "parse-as-csv", ["body", ","]);
        let err = Directive::from_parsed(&excluded, &config).unwrap_err();
        assert!(matches!(err, DirectiveError::Excluded { line: 4, .. }));
    }
}
