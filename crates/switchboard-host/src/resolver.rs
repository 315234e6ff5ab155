//! Server suggestion for URIs, tool names, and prompt names.
//!
//! Pure functions over aggregated snapshots. For URIs the match ladder is
//! exact > template > scheme; exact matches short-circuit the rest. Tools
//! and prompts match on exact name only.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::aggregate::{
    AggregatedPrompt, AggregatedResource, AggregatedResourceTemplate, AggregatedTool,
};

/// How a suggestion matched its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// The URI matched a concrete resource exactly.
    Exact,
    /// The URI matched a resource template.
    Template,
    /// Only the URI scheme matched a server's resources.
    Scheme,
    /// A tool or prompt name matched exactly.
    Name,
}

/// One ranked server suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// The suggested server.
    pub server_id: String,
    /// How the match happened.
    pub match_type: MatchType,
    /// Confidence in [0, 1].
    pub confidence: f64,
}

impl Suggestion {
    fn new(server_id: &str, match_type: MatchType, confidence: f64) -> Self {
        Self {
            server_id: server_id.to_string(),
            match_type,
            confidence,
        }
    }
}

/// Suggest servers for a resource URI.
pub fn resolve_resource_server(
    resources: &[AggregatedResource],
    templates: &[AggregatedResourceTemplate],
    uri: &str,
) -> Vec<Suggestion> {
    // Exact matches win outright.
    let exact: Vec<Suggestion> = resources
        .iter()
        .filter(|r| r.uri == uri)
        .map(|r| Suggestion::new(&r.server_id, MatchType::Exact, 1.0))
        .collect();
    if !exact.is_empty() {
        return exact;
    }

    let template: Vec<Suggestion> = templates
        .iter()
        .filter(|t| template_matches(&t.uri_template, uri))
        .map(|t| Suggestion::new(&t.server_id, MatchType::Template, 0.8))
        .collect();
    if !template.is_empty() {
        return template;
    }

    let Some(scheme) = uri_scheme(uri) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    resources
        .iter()
        .filter(|r| uri_scheme(&r.uri) == Some(scheme))
        .filter(|r| seen.insert(r.server_id.clone()))
        .map(|r| Suggestion::new(&r.server_id, MatchType::Scheme, 0.5))
        .collect()
}

/// Suggest servers for a tool name. Exact match only.
pub fn resolve_tool_server(tools: &[AggregatedTool], name: &str) -> Vec<Suggestion> {
    tools
        .iter()
        .filter(|t| t.name == name)
        .map(|t| Suggestion::new(&t.server_id, MatchType::Name, 1.0))
        .collect()
}

/// Suggest servers for a prompt name. Exact match only.
pub fn resolve_prompt_server(prompts: &[AggregatedPrompt], name: &str) -> Vec<Suggestion> {
    prompts
        .iter()
        .filter(|p| p.name == name)
        .map(|p| Suggestion::new(&p.server_id, MatchType::Name, 1.0))
        .collect()
}

/// The scheme prefix of a URI, up to and including the first colon.
fn uri_scheme(uri: &str) -> Option<&str> {
    uri.find(':').map(|idx| &uri[..=idx])
}

/// Whether a URI template matches a target URI.
///
/// Each `{placeholder}` becomes `.*`; everything else is matched literally,
/// anchored at both ends.
fn template_matches(template: &str, uri: &str) -> bool {
    let mut pattern = String::with_capacity(template.len() + 8);
    pattern.push('^');

    let mut rest = template;
    while let Some(open) = rest.find('{') {
        pattern.push_str(&regex::escape(&rest[..open]));
        match rest[open..].find('}') {
            Some(close) => {
                pattern.push_str(".*");
                rest = &rest[open + close + 1..];
            }
            None => {
                // Unbalanced brace: treat the remainder literally.
                pattern.push_str(&regex::escape(&rest[open..]));
                rest = "";
            }
        }
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');

    match regex::Regex::new(&pattern) {
        Ok(re) => re.is_match(uri),
        Err(e) => {
            tracing::warn!(template = %template, error = %e, "unusable URI template");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(server_id: &str, uri: &str) -> AggregatedResource {
        AggregatedResource {
            server_id: server_id.to_string(),
            uri: uri.to_string(),
            name: uri.to_string(),
            mime_type: None,
            size: None,
        }
    }

    fn template(server_id: &str, uri_template: &str) -> AggregatedResourceTemplate {
        AggregatedResourceTemplate {
            server_id: server_id.to_string(),
            id: "tpl".to_string(),
            name: "tpl".to_string(),
            uri_template: uri_template.to_string(),
            description: None,
        }
    }

    #[test]
    fn test_exact_match_wins_for_every_owner() {
        let resources = vec![
            resource("A", "file:///x.txt"),
            resource("B", "file:///x.txt"),
        ];
        let suggestions = resolve_resource_server(&resources, &[], "file:///x.txt");

        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].server_id, "A");
        assert_eq!(suggestions[1].server_id, "B");
        for s in &suggestions {
            assert_eq!(s.match_type, MatchType::Exact);
            assert_eq!(s.confidence, 1.0);
        }
    }

    #[test]
    fn test_exact_match_suppresses_template_match() {
        let resources = vec![resource("A", "file:///dynamic/42.txt")];
        let templates = vec![template("T", "file:///dynamic/{id}.txt")];

        let suggestions = resolve_resource_server(&resources, &templates, "file:///dynamic/42.txt");
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].server_id, "A");
        assert_eq!(suggestions[0].match_type, MatchType::Exact);
    }

    #[test]
    fn test_template_match() {
        let templates = vec![template("T", "file:///dynamic/{id}.txt")];
        let suggestions = resolve_resource_server(&[], &templates, "file:///dynamic/42.txt");

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].server_id, "T");
        assert_eq!(suggestions[0].match_type, MatchType::Template);
        assert_eq!(suggestions[0].confidence, 0.8);
    }

    #[test]
    fn test_template_is_anchored_and_literal_outside_placeholders() {
        let templates = vec![template("T", "file:///a.b/{id}")];

        // '.' outside a placeholder must not match arbitrary characters.
        assert!(resolve_resource_server(&[], &templates, "file:///aXb/1").is_empty());
        // Prefix-only matches must not count.
        assert!(
            resolve_resource_server(&[], &templates, "prefix file:///a.b/1").is_empty()
        );
        assert_eq!(
            resolve_resource_server(&[], &templates, "file:///a.b/1").len(),
            1
        );
    }

    #[test]
    fn test_scheme_fallback() {
        let resources = vec![resource("W", "http://api/x")];
        let suggestions = resolve_resource_server(&resources, &[], "http://other/y");

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].server_id, "W");
        assert_eq!(suggestions[0].match_type, MatchType::Scheme);
        assert_eq!(suggestions[0].confidence, 0.5);

        // Different scheme yields nothing.
        assert!(resolve_resource_server(&resources, &[], "ftp://host/f").is_empty());
    }

    #[test]
    fn test_scheme_fallback_dedupes_servers() {
        let resources = vec![
            resource("W", "http://api/x"),
            resource("W", "http://api/y"),
            resource("V", "http://api/z"),
        ];
        let suggestions = resolve_resource_server(&resources, &[], "http://other/q");
        assert_eq!(suggestions.len(), 2);
    }

    #[test]
    fn test_results_sorted_by_confidence() {
        // Each tier is homogeneous, so ordering within a call is trivially
        // non-increasing; assert it anyway across the tiers we can produce.
        let templates = vec![
            template("T1", "file:///{a}"),
            template("T2", "file:///{b}"),
        ];
        let suggestions = resolve_resource_server(&[], &templates, "file:///x");
        assert!(
            suggestions
                .windows(2)
                .all(|w| w[0].confidence >= w[1].confidence)
        );
    }

    #[test]
    fn test_tool_and_prompt_resolution() {
        let tools = vec![AggregatedTool {
            server_id: "A".to_string(),
            name: "search".to_string(),
            description: None,
            input_schema: None,
            annotations: None,
        }];
        let suggestions = resolve_tool_server(&tools, "search");
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].match_type, MatchType::Name);
        assert!(resolve_tool_server(&tools, "searchx").is_empty());

        let prompts = vec![AggregatedPrompt {
            server_id: "B".to_string(),
            name: "summarize".to_string(),
            description: None,
            arguments: None,
        }];
        assert_eq!(resolve_prompt_server(&prompts, "summarize").len(), 1);
        assert!(resolve_prompt_server(&prompts, "other").is_empty());
    }

    #[test]
    fn test_uri_scheme_extraction() {
        assert_eq!(uri_scheme("file:///x"), Some("file:"));
        assert_eq!(uri_scheme("http://a/b"), Some("http:"));
        assert_eq!(uri_scheme("no-scheme-here"), None);
    }
}
