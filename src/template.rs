//! Placeholder extraction and substitution.
//!
//! A placeholder is any `{{ ... }}` span; its name is the enclosed text with
//! surrounding whitespace trimmed. The body may contain any character except
//! the closing `}}`, and there is no nesting: `{{{a}}}` names `{a` and leaves a
//! trailing `}`. An opener with no matching closer is plain text.
//!
//! `\{{` is an escape: it renders as a literal `{{` and never opens a
//! placeholder.
//!
//! Extraction and substitution share one single-pass tokenizer, so a bound
//! value is written to the output exactly once and never rescanned.

use crate::bindings::VariableBindings;
use tracing::debug;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const ESCAPED_OPEN: &str = "\\{{";

/// One lexical piece of a template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Text copied verbatim to the output
    Literal(&'a str),
    /// A placeholder; `raw` is the full `{{ ... }}` span, `name` the trimmed body
    Placeholder { raw: &'a str, name: &'a str },
}

/// Split a template into literal text and placeholders.
///
/// Total over all input; concatenating the rendered segments with no
/// bindings reproduces the template minus its escape backslashes.
pub fn tokenize(template: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        // `\{{` keeps the braces as text and drops the backslash
        if rest[..start].ends_with('\\') {
            let backslash = start - 1;
            if backslash > 0 {
                segments.push(Segment::Literal(&rest[..backslash]));
            }
            segments.push(Segment::Literal(OPEN));
            rest = &rest[start + OPEN.len()..];
            continue;
        }

        let body_start = start + OPEN.len();
        let Some(close) = rest[body_start..].find(CLOSE) else {
            break;
        };
        let body_end = body_start + close;
        let span_end = body_end + CLOSE.len();

        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        segments.push(Segment::Placeholder {
            raw: &rest[start..span_end],
            name: rest[body_start..body_end].trim(),
        });
        rest = &rest[span_end..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    segments
}

/// Placeholder extraction and substitution for prompt templates
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateEngine;

impl TemplateEngine {
    /// Create a new template engine
    pub fn new() -> Self {
        Self
    }

    /// Distinct placeholder names in first-occurrence order
    pub fn extract_variables(&self, template: &str) -> Vec<String> {
        let mut variables: Vec<String> = Vec::new();
        for segment in tokenize(template) {
            if let Segment::Placeholder { name, .. } = segment {
                if !variables.iter().any(|v| v == name) {
                    variables.push(name.to_string());
                }
            }
        }

        debug!("Extracted {} variables from template", variables.len());
        variables
    }

    /// Replace every bound placeholder with its value.
    ///
    /// Values are inserted verbatim. Placeholders without a binding stay in
    /// the output exactly as written.
    pub fn render(&self, template: &str, bindings: &VariableBindings) -> String {
        let mut rendered = String::with_capacity(template.len());
        let mut substituted = 0usize;

        for segment in tokenize(template) {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Placeholder { raw, name } => match bindings.get(name) {
                    Some(value) => {
                        rendered.push_str(value);
                        substituted += 1;
                    }
                    None => rendered.push_str(raw),
                },
            }
        }

        debug!(
            "Rendered template with {} bindings ({} substitutions)",
            bindings.len(),
            substituted
        );
        rendered
    }

    /// Placeholder names that have no binding
    pub fn unbound_variables(&self, template: &str, bindings: &VariableBindings) -> Vec<String> {
        self.extract_variables(template)
            .into_iter()
            .filter(|name| !bindings.contains(name))
            .collect()
    }

    /// Escape literal `{{` sequences so the text survives as plain template text
    pub fn escape(&self, text: &str) -> String {
        text.replace(OPEN, ESCAPED_OPEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, &str)]) -> VariableBindings {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_extraction_order_and_dedup() {
        let engine = TemplateEngine::new();
        let template = "Hello {{name}}, order {{id}} is {{status}}. Bye {{ name }}!";
        let variables = engine.extract_variables(template);
        assert_eq!(variables, vec!["name", "id", "status"]);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let engine = TemplateEngine::new();
        let template = "{{b}} {{a}} {{c}} {{a}}";
        assert_eq!(
            engine.extract_variables(template),
            engine.extract_variables(template)
        );
    }

    #[test]
    fn test_extraction_edge_cases() {
        let engine = TemplateEngine::new();

        assert!(engine.extract_variables("no placeholders here").is_empty());
        assert!(engine.extract_variables("unterminated {{name").is_empty());
        assert_eq!(engine.extract_variables("{{{a}}}"), vec!["{a"]);
        assert_eq!(engine.extract_variables("{{a}}{{b}}"), vec!["a", "b"]);
        assert_eq!(engine.extract_variables("{{ first name }}"), vec!["first name"]);
        assert_eq!(engine.extract_variables("{{}}"), vec![""]);
        assert_eq!(engine.extract_variables("{{multi\nline}}"), vec!["multi\nline"]);
    }

    #[test]
    fn test_escaped_opener_is_not_a_placeholder() {
        let engine = TemplateEngine::new();
        let template = r"Write \{{var}} to reference {{topic}}";
        assert_eq!(engine.extract_variables(template), vec!["topic"]);

        let rendered = engine.render(template, &bindings(&[("var", "x"), ("topic", "inputs")]));
        assert_eq!(rendered, "Write {{var}} to reference inputs");
    }

    #[test]
    fn test_render_substitutes_bound_values() {
        let engine = TemplateEngine::new();
        let rendered = engine.render("Hi {{name}}!", &bindings(&[("name", "Alice")]));
        assert_eq!(rendered, "Hi Alice!");
    }

    #[test]
    fn test_render_keeps_unbound_placeholders() {
        let engine = TemplateEngine::new();
        let rendered = engine.render(
            "Hi {{name}}, your role is {{ role }}.",
            &bindings(&[("name", "Alice")]),
        );
        assert_eq!(rendered, "Hi Alice, your role is {{ role }}.");
    }

    #[test]
    fn test_render_replaces_every_occurrence() {
        let engine = TemplateEngine::new();
        let rendered = engine.render("{{x}}-{{x}}-{{ x }}", &bindings(&[("x", "1")]));
        assert_eq!(rendered, "1-1-1");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let engine = TemplateEngine::new();
        let rendered = engine.render(
            "{{a}} and {{b}}",
            &bindings(&[("a", "{{b}}"), ("b", "$1 (.*)")]),
        );
        assert_eq!(rendered, "{{b}} and $1 (.*)");
    }

    #[test]
    fn test_names_with_special_characters() {
        let engine = TemplateEngine::new();
        let rendered = engine.render("{{a.b*}} {{(x)}}", &bindings(&[("a.b*", "1"), ("(x)", "2")]));
        assert_eq!(rendered, "1 2");
    }

    #[test]
    fn test_unbound_variables() {
        let engine = TemplateEngine::new();
        let missing = engine.unbound_variables(
            "Hello {{name}}, you are a {{role}}.",
            &bindings(&[("name", "Alice")]),
        );
        assert_eq!(missing, vec!["role"]);
    }

    #[test]
    fn test_escape_round_trips_through_render() {
        let engine = TemplateEngine::new();
        let text = "literal {{braces}} here";
        let escaped = engine.escape(text);
        assert!(engine.extract_variables(&escaped).is_empty());
        assert_eq!(engine.render(&escaped, &VariableBindings::new()), text);
    }

    #[test]
    fn test_tokenize_segments() {
        let segments = tokenize("a {{ b }} c");
        assert_eq!(
            segments,
            vec![
                Segment::Literal("a "),
                Segment::Placeholder { raw: "{{ b }}", name: "b" },
                Segment::Literal(" c"),
            ]
        );
    }
}
