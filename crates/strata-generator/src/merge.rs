//! Include expansion: resolves `{{> name}}` markers against a cascade.
//!
//! Expansion is depth-first. The chain of fragments currently being expanded
//! is kept on a stack; a marker naming a fragment already on the stack is a
//! cycle and stays in the text untouched. The total number of substitutions
//! is capped so hostile inputs (wide fan-out rather than cycles) terminate
//! too.

use std::collections::BTreeSet;

use crate::cascade::Cascade;

/// Default cap on substitutions performed for one page.
pub const DEFAULT_MERGE_LIMIT: usize = 4000;

const OPEN: &str = "{{>";
const CLOSE: &str = "}}";

/// One include marker found in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker<'a> {
    /// Byte offset of `{{>`.
    pub start: usize,
    /// Byte offset just past `}}`.
    pub end: usize,
    pub name: &'a str,
}

/// Iterate over the well-formed include markers of `text`, in order.
pub fn markers(text: &str) -> Markers<'_> {
    Markers { text, pos: 0 }
}

/// Iterator returned by [`markers`].
#[derive(Debug, Clone)]
pub struct Markers<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Iterator for Markers<'a> {
    type Item = Marker<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(offset) = self.text[self.pos..].find(OPEN) {
            let start = self.pos + offset;
            match parse_marker(self.text, start) {
                Some((name, end)) => {
                    self.pos = end;
                    return Some(Marker { start, end, name });
                }
                None => self.pos = start + OPEN.len(),
            }
        }
        self.pos = self.text.len();
        None
    }
}

/// Parse the marker opening at `start`, returning its name and end offset.
fn parse_marker(text: &str, start: usize) -> Option<(&str, usize)> {
    let rest = &text[start + OPEN.len()..];
    let trimmed = rest.trim_start();
    let name_len = trimmed
        .find(|c: char| c.is_whitespace() || c == '}' || c == '{')
        .unwrap_or(trimmed.len());
    if name_len == 0 {
        return None;
    }
    let name = &trimmed[..name_len];
    let after = trimmed[name_len..].trim_start();
    if !after.starts_with(CLOSE) {
        return None;
    }
    let end = text.len() - after.len() + CLOSE.len();
    Some((name, end))
}

/// Result of merging one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The merged template text.
    pub body: String,
    /// Names referenced by a marker but absent from the cascade.
    pub unresolved: BTreeSet<String>,
    /// Include chains that led back to a fragment already being expanded.
    pub cycles: Vec<Vec<String>>,
    /// Whether the substitution cap was reached.
    pub truncated: bool,
    /// Whether the cascade had no root fragment.
    pub missing_root: bool,
    /// Number of substitutions performed.
    pub substitutions: usize,
}

impl MergeOutcome {
    /// Whether every marker was resolved.
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty() && self.cycles.is_empty() && !self.truncated
    }
}

/// Expand the fragment named `root` against `cascade`.
pub fn merge(cascade: &Cascade, root: &str, limit: usize) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    let Some(body) = cascade.get(root) else {
        outcome.missing_root = true;
        return outcome;
    };

    let mut expander = Expander {
        cascade,
        limit,
        stack: vec![root.to_string()],
        outcome: &mut outcome,
    };
    let mut out = String::with_capacity(body.len());
    expander.expand(body, &mut out);
    outcome.body = out;

    if outcome.truncated {
        tracing::warn!(root, limit, "include expansion hit the substitution limit");
    }
    for cycle in &outcome.cycles {
        tracing::debug!(chain = %cycle.join(" > "), "include cycle left unexpanded");
    }
    outcome
}

struct Expander<'a> {
    cascade: &'a Cascade,
    limit: usize,
    stack: Vec<String>,
    outcome: &'a mut MergeOutcome,
}

impl Expander<'_> {
    fn expand(&mut self, text: &str, out: &mut String) {
        let mut copied = 0;
        for marker in markers(text) {
            out.push_str(&text[copied..marker.start]);
            copied = marker.end;
            let literal = &text[marker.start..marker.end];

            if self.outcome.substitutions >= self.limit {
                self.outcome.truncated = true;
                out.push_str(literal);
                continue;
            }

            if self.stack.iter().any(|open| open == marker.name) {
                let mut chain = self.stack.clone();
                chain.push(marker.name.to_string());
                self.outcome.cycles.push(chain);
                out.push_str(literal);
                continue;
            }

            let Some(body) = self.cascade.get(marker.name) else {
                self.outcome.unresolved.insert(marker.name.to_string());
                out.push_str(literal);
                continue;
            };

            self.outcome.substitutions += 1;
            self.stack.push(marker.name.to_string());
            self.expand(body, out);
            self.stack.pop();
        }
        out.push_str(&text[copied..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cascade::OverridePolicy, fragment::Fragment};

    fn cascade(entries: &[(&str, &str)]) -> Cascade {
        entries.iter().fold(Cascade::new(), |c, (name, body)| {
            c.with(Fragment::new(*name, *body, ".html"), OverridePolicy::Overwrite)
        })
    }

    #[test]
    fn test_markers_parsing() {
        let text = "a{{> nav}}b{{>x}}c{{>   spaced   }}d{{> }}e{{> two words}}f{{>unterminated";
        let names: Vec<_> = markers(text).map(|m| m.name).collect();
        assert_eq!(names, ["nav", "x", "spaced"]);

        let first = markers(text).next().unwrap();
        assert_eq!(&text[first.start..first.end], "{{> nav}}");
    }

    #[test]
    fn test_three_level_chain() {
        let c = cascade(&[("index", "[{{> a}}]"), ("a", "a({{> b}})"), ("b", "b({{> c}})"), ("c", "c")]);
        let outcome = merge(&c, "index", DEFAULT_MERGE_LIMIT);
        assert_eq!(outcome.body, "[a(b(c))]");
        assert!(outcome.is_complete());
        assert_eq!(outcome.substitutions, 3);
    }

    #[test]
    fn test_self_reference_terminates() {
        let c = cascade(&[("index", "<{{> loop}}>"), ("loop", "x{{> loop}}")]);
        let outcome = merge(&c, "index", DEFAULT_MERGE_LIMIT);
        assert_eq!(outcome.body, "<x{{> loop}}>");
        assert_eq!(outcome.cycles, vec![vec!["index".to_string(), "loop".into(), "loop".into()]]);
        assert!(!outcome.truncated);
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let c = cascade(&[("index", "{{> a}}"), ("a", "A{{> b}}"), ("b", "B{{> a}}")]);
        let outcome = merge(&c, "index", DEFAULT_MERGE_LIMIT);
        assert_eq!(outcome.body, "AB{{> a}}");
        assert_eq!(outcome.cycles.len(), 1);
    }

    #[test]
    fn test_root_including_itself() {
        let c = cascade(&[("index", "top {{> index}}")]);
        let outcome = merge(&c, "index", DEFAULT_MERGE_LIMIT);
        assert_eq!(outcome.body, "top {{> index}}");
    }

    #[test]
    fn test_unknown_name_left_in_place() {
        let c = cascade(&[("index", "x {{> missing }} y")]);
        let outcome = merge(&c, "index", DEFAULT_MERGE_LIMIT);
        assert_eq!(outcome.body, "x {{> missing }} y");
        assert!(outcome.unresolved.contains("missing"));
    }

    #[test]
    fn test_limit_truncates() {
        let c = cascade(&[("index", "{{> a}}{{> a}}{{> a}}"), ("a", "a")]);
        let outcome = merge(&c, "index", 2);
        assert_eq!(outcome.body, "aa{{> a}}");
        assert!(outcome.truncated);
        assert_eq!(outcome.substitutions, 2);
    }

    #[test]
    fn test_wide_fan_out_is_bounded() {
        let c = cascade(&[
            ("index", "{{> a}}"),
            ("a", "{{> b}}{{> b}}{{> b}}{{> b}}"),
            ("b", "{{> c}}{{> c}}{{> c}}{{> c}}"),
            ("c", "{{> d}}{{> d}}{{> d}}{{> d}}"),
            ("d", "{{> e}}{{> e}}{{> e}}{{> e}}"),
            ("e", "{{> f}}{{> f}}{{> f}}{{> f}}"),
            ("f", "{{> g}}{{> g}}{{> g}}{{> g}}"),
            ("g", "x"),
        ]);
        let outcome = merge(&c, "index", 100);
        assert!(outcome.truncated);
        assert_eq!(outcome.substitutions, 100);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let outcome = merge(&Cascade::new(), "index", DEFAULT_MERGE_LIMIT);
        assert!(outcome.missing_root);
        assert!(outcome.body.is_empty());
    }

    #[test]
    fn test_plain_template_syntax_untouched() {
        let c = cascade(&[("index", "{{Title}} {{#IsRoot}}root{{/IsRoot}}")]);
        let outcome = merge(&c, "index", DEFAULT_MERGE_LIMIT);
        assert_eq!(outcome.body, "{{Title}} {{#IsRoot}}root{{/IsRoot}}");
    }
}
