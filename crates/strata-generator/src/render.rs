//! Template rendering of merged pages.
//!
//! The merged body of a page is a mustache-style template. [`HandlebarsRenderer`]
//! executes it with the [`PageContext`] fields and two section helpers:
//!
//! ```text
//! <title>{{Title}}</title>
//! {{#SubPages}}<a href="{{URL}}">{{Title}}</a>{{/SubPages}}
//! {{#IsRoot}}home{{/IsRoot}}
//! {{#IsCurrent about}}class="active"{{/IsCurrent}}
//! {{#IsParent docs}}in docs{{else}}elsewhere{{/IsParent}}
//! ```

use std::{fmt, ops::Range};

use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, JsonValue, Output, PathAndJson,
    RenderContext, RenderErrorReason, Renderable,
};
use thiserror::Error;

use crate::{context::PageContext, merge::markers};

/// Template execution failure.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RenderError {
    pub message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Executes a merged template against a page context.
pub trait Renderer: Send + Sync + fmt::Debug {
    fn render(&self, template: &str, page: &PageContext) -> Result<String, RenderError>;
}

/// Renderer backed by the handlebars engine.
///
/// A fresh registry is used per page so the section helpers see only that
/// page. Variables are HTML-escaped as in mustache; `{{{Title}}}` is not.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlebarsRenderer;

impl HandlebarsRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for HandlebarsRenderer {
    fn render(&self, template: &str, page: &PageContext) -> Result<String, RenderError> {
        let mut registry = Handlebars::new();
        registry.register_helper(
            "IsCurrent",
            Box::new(Section {
                name: "IsCurrent",
                page: page.clone(),
                test: PageContext::is_current,
            }),
        );
        registry.register_helper(
            "IsParent",
            Box::new(Section {
                name: "IsParent",
                page: page.clone(),
                test: PageContext::is_parent,
            }),
        );

        let source = protect_markers(template);
        registry
            .render_template(&source, page)
            .map_err(|e| RenderError::new(error_chain(&e)))
    }
}

/// Block helper rendering its body when `test` holds for the page and the
/// words given after the helper name, its `{{else}}` branch otherwise.
struct Section {
    name: &'static str,
    page: PageContext,
    test: fn(&PageContext, &str) -> bool,
}

impl HelperDef for Section {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        if h.params().is_empty() {
            return Err(RenderErrorReason::ParamNotFoundForIndex(self.name, 0).into());
        }
        let name = h.params().iter().map(word).collect::<Vec<_>>().join(" ");

        let branch = if (self.test)(&self.page, &name) {
            h.template()
        } else {
            h.inverse()
        };
        match branch {
            Some(template) => template.render(r, ctx, rc, out),
            None => Ok(()),
        }
    }
}

/// A bare word such as `about` is an unresolved path, not a lookup.
fn word(param: &PathAndJson<'_>) -> String {
    match param.value() {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => param.relative_path().cloned().unwrap_or_default(),
        other => other.to_string(),
    }
}

/// Escape unresolved include markers so they reach the output verbatim
/// instead of being executed as partials.
fn protect_markers(template: &str) -> String {
    let raw = raw_blocks(template);
    let mut out = String::with_capacity(template.len());
    let mut copied = 0;
    for marker in markers(template) {
        let escaped = template[..marker.start].ends_with('\\');
        if escaped || raw.iter().any(|block| block.contains(&marker.start)) {
            continue;
        }
        out.push_str(&template[copied..marker.start]);
        out.push('\\');
        copied = marker.start;
    }
    out.push_str(&template[copied..]);
    out
}

/// Byte ranges of `{{{{helper}}}}...{{{{/helper}}}}` raw blocks.
fn raw_blocks(template: &str) -> Vec<Range<usize>> {
    let mut blocks = Vec::new();
    let mut from = 0;
    while let Some(open) = template[from..].find("{{{{").map(|i| from + i) {
        let Some(close) = template[open + 4..].find("{{{{/").map(|i| open + 4 + i) else {
            break;
        };
        let end = template[close..]
            .find("}}}}")
            .map_or(template.len(), |i| close + i + 4);
        blocks.push(open..end);
        from = end;
    }
    blocks
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(err) = source {
        chain.push(err.to_string());
        source = err.source();
    }
    chain.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(template: &str, url: &str) -> Result<String, RenderError> {
        HandlebarsRenderer::new().render(template, &PageContext::new(url, &["child"]))
    }

    #[test]
    fn test_fields() {
        let out = render("{{Title}}|{{URL}}|{{IsRoot}}", "/docs/guide").unwrap();
        assert_eq!(out, "guide|/docs/guide|false");
    }

    #[test]
    fn test_sub_pages_section() {
        let out = render(
            "<h1>{{Title}}</h1>{{#SubPages}}<a href=\"{{URL}}\">{{Title}}</a>{{/SubPages}}",
            "/",
        )
        .unwrap();
        assert_eq!(out, "<h1></h1><a href=\"/child\">child</a>");
    }

    #[test]
    fn test_each_over_sub_pages() {
        let out = render("{{#each SubPages}}{{Title}};{{/each}}", "/docs").unwrap();
        assert_eq!(out, "child;");
    }

    #[test]
    fn test_is_root_section() {
        assert_eq!(render("{{#IsRoot}}home{{/IsRoot}}", "/").unwrap(), "home");
        assert_eq!(render("{{#IsRoot}}home{{/IsRoot}}", "/a").unwrap(), "");
    }

    #[test]
    fn test_predicate_sections() {
        let template = "{{#IsCurrent guide}}C{{/IsCurrent}}\
                        {{#IsParent docs}}P{{/IsParent}}\
                        {{#IsParent blog}}X{{else}}Y{{/IsParent}}";
        assert_eq!(render(template, "/docs/guide").unwrap(), "CPY");
        assert_eq!(render(template, "/blog").unwrap(), "X");
    }

    #[test]
    fn test_predicate_with_quoted_name() {
        let out = render("{{#IsCurrent \"guide\"}}C{{/IsCurrent}}", "/docs/guide").unwrap();
        assert_eq!(out, "C");
    }

    #[test]
    fn test_predicates_test_the_page_inside_sections() {
        let out = render(
            "{{#SubPages}}{{#IsParent docs}}{{Title}}{{/IsParent}}{{/SubPages}}",
            "/docs",
        )
        .unwrap();
        assert_eq!(out, "child");
    }

    #[test]
    fn test_variables_are_escaped() {
        assert_eq!(render("<b>{{Title}}</b>", "/a&b").unwrap(), "<b>a&amp;b</b>");
        assert_eq!(render("<b>{{{Title}}}</b>", "/a&b").unwrap(), "<b>a&b</b>");
    }

    #[test]
    fn test_residual_marker_kept_verbatim() {
        let out = render("x {{> missing}} y", "/").unwrap();
        assert_eq!(out, "x {{> missing}} y");
    }

    #[test]
    fn test_markers_in_raw_blocks_are_left_alone() {
        let template = "{{{{raw}}}}{{> a}}{{{{/raw}}}} {{> b}} \\{{> c}}";
        assert_eq!(
            protect_markers(template),
            "{{{{raw}}}}{{> a}}{{{{/raw}}}} \\{{> b}} \\{{> c}}"
        );
        assert_eq!(raw_blocks(template), [0..30]);
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let err = render("<h1>{{Title</h1>", "/").unwrap_err();
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_section_without_name() {
        assert!(render("{{#IsCurrent}}x{{/IsCurrent}}", "/").is_err());
    }
}
