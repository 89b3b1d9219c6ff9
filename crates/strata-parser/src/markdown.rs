//! Markdown to HTML conversion using pulldown-cmark.

use pulldown_cmark::{Options, Parser, html};

/// How pulldown-cmark writes the opening of an include marker in body text.
const ESCAPED_MARKER: &str = "{{&gt;";

/// Markdown renderer with the extensions fragments commonly rely on.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownParser {
    options: Options,
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownParser {
    /// Create a new markdown parser with default options.
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        Self { options }
    }

    /// Render a markdown document to HTML.
    ///
    /// Include markers such as `{{> nav}}` come out unescaped so the merge step
    /// can still resolve them.
    pub fn render(&self, content: &str) -> String {
        let parser = Parser::new_ext(content, self.options);
        let mut out = String::with_capacity(content.len() * 3 / 2);
        html::push_html(&mut out, parser);
        if out.contains(ESCAPED_MARKER) {
            out = out.replace(ESCAPED_MARKER, "{{>");
        }
        out
    }
}
