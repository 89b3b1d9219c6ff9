//! strata parser library
//!
//! Converts raw fragment bytes into the text that gets merged. Files whose
//! extension is a configured markdown extension go through [`MarkdownParser`];
//! everything else passes through unchanged.

pub mod markdown;

use std::path::Path;

pub use markdown::MarkdownParser;
use strata_core::ExtensionSet;

/// Render markdown bytes to HTML bytes.
pub fn render_markdown(input: &[u8]) -> Vec<u8> {
    MarkdownParser::new()
        .render(&String::from_utf8_lossy(input))
        .into_bytes()
}

/// Picks the conversion for a fragment from its file extension.
#[derive(Debug, Clone)]
pub struct ParserRegistry {
    markdown: MarkdownParser,
    markdown_extensions: ExtensionSet,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new(ExtensionSet::parse("md"))
    }
}

impl ParserRegistry {
    /// Create a registry treating `markdown_extensions` as markdown.
    pub fn new(markdown_extensions: ExtensionSet) -> Self {
        Self {
            markdown: MarkdownParser::new(),
            markdown_extensions,
        }
    }

    /// Whether `path` will be converted from markdown.
    pub fn is_markdown(&self, path: &Path) -> bool {
        self.markdown_extensions.matches(path)
    }

    /// Convert a fragment read from `path`.
    pub fn convert(&self, path: &Path, raw: &[u8]) -> String {
        let text = String::from_utf8_lossy(raw);
        if self.is_markdown(path) {
            tracing::trace!(path = %path.display(), "rendering markdown fragment");
            self.markdown.render(&text)
        } else {
            text.into_owned()
        }
    }

    /// Get the markdown parser.
    pub fn markdown(&self) -> &MarkdownParser {
        &self.markdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_markdown() {
        let registry = ParserRegistry::default();
        let html = registry.convert(Path::new("about/body.md"), b"# Title");
        assert_eq!(html.trim(), "<h1>Title</h1>");
    }

    #[test]
    fn test_registry_passthrough() {
        let registry = ParserRegistry::default();
        let raw = b"<h1>{{Title}}</h1>\n";
        assert_eq!(registry.convert(Path::new("index.html"), raw), "<h1>{{Title}}</h1>\n");
    }

    #[test]
    fn test_custom_markdown_extensions() {
        let registry = ParserRegistry::new(ExtensionSet::parse("markdown, mdown"));
        assert!(registry.is_markdown(Path::new("x.mdown")));
        assert!(!registry.is_markdown(Path::new("x.md")));
        assert_eq!(registry.convert(Path::new("x.md"), b"*raw*"), "*raw*");
    }

    #[test]
    fn test_render_markdown_bytes() {
        let out = render_markdown(b"plain");
        assert_eq!(String::from_utf8(out).unwrap().trim(), "<p>plain</p>");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let registry = ParserRegistry::default();
        let out = registry.convert(Path::new("x.txt"), &[0x66, 0xff, 0x6f]);
        assert_eq!(out, "f\u{fffd}o");
    }
}
