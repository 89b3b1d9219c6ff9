//! Page context: per-directory metadata handed to templates.

use std::path::{Component, Path};

use serde::Serialize;

/// A link to another page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PageLink {
    pub title: String,
    #[serde(rename = "URL")]
    pub url: String,
}

/// Read-only view over one directory's position in the site.
///
/// Templates see the fields as `Title`, `URL`, `IsRoot`, `SubPages` and
/// `Ancestors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PageContext {
    /// Last URL segment; empty for the root.
    pub title: String,
    /// Canonical URL: cleaned, absolute, no trailing slash.
    #[serde(rename = "URL")]
    pub url: String,
    pub is_root: bool,
    /// Immediate child directories, sorted by name.
    pub sub_pages: Vec<PageLink>,
    /// Enclosing pages from the first segment down to the parent.
    pub ancestors: Vec<PageLink>,
}

impl PageContext {
    /// Build the context of the page at `url`, listing `sub_dirs` as children.
    pub fn new<S: AsRef<str>>(url: &str, sub_dirs: &[S]) -> Self {
        let url = clean_url(url);
        let segments: Vec<&str> = segments(&url).collect();
        let title = segments.last().copied().unwrap_or_default().to_string();

        let mut ancestors = Vec::with_capacity(segments.len().saturating_sub(1));
        let mut prefix = String::new();
        for segment in segments.iter().take(segments.len().saturating_sub(1)) {
            prefix.push('/');
            prefix.push_str(segment);
            ancestors.push(PageLink {
                title: (*segment).to_string(),
                url: prefix.clone(),
            });
        }

        let mut names: Vec<&str> = sub_dirs.iter().map(AsRef::as_ref).collect();
        names.sort_unstable();
        let sub_pages = names
            .into_iter()
            .map(|name| PageLink {
                title: name.to_string(),
                url: join_url(&url, name),
            })
            .collect();

        Self {
            title,
            is_root: url == "/",
            url,
            sub_pages,
            ancestors,
        }
    }

    /// Whether this page is the one named `name`.
    pub fn is_current(&self, name: &str) -> bool {
        self.title == name
    }

    /// Whether `name` is one of the segments of this page's URL.
    pub fn is_parent(&self, name: &str) -> bool {
        segments(&self.url).any(|segment| segment == name)
    }
}

/// URL of the page for a directory at `relative` below the source root.
pub fn url_for(relative: &Path) -> String {
    let mut url = String::new();
    for component in relative.components() {
        if let Component::Normal(segment) = component {
            url.push('/');
            url.push_str(&segment.to_string_lossy());
        }
    }
    clean_url(&url)
}

/// Lexically clean a URL path: absolute, no empty, `.` or `..` segments and
/// no trailing slash.
pub fn clean_url(raw: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

fn segments(url: &str) -> impl Iterator<Item = &str> {
    url.split('/').filter(|s| !s.is_empty())
}

fn join_url(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_clean_url() {
        assert_eq!(clean_url(""), "/");
        assert_eq!(clean_url("/"), "/");
        assert_eq!(clean_url("blog//2024/"), "/blog/2024");
        assert_eq!(clean_url("/a/./b/../c"), "/a/c");
        assert_eq!(clean_url("/../.."), "/");
    }

    #[test]
    fn test_url_for() {
        assert_eq!(url_for(Path::new("")), "/");
        assert_eq!(url_for(&PathBuf::from("blog").join("first post")), "/blog/first post");
    }

    #[test]
    fn test_root_context() {
        let page = PageContext::new("/", &["blog", "about"]);
        assert!(page.is_root);
        assert_eq!(page.title, "");
        assert_eq!(page.url, "/");
        assert!(page.ancestors.is_empty());
        assert_eq!(
            page.sub_pages,
            vec![
                PageLink {
                    title: "about".into(),
                    url: "/about".into()
                },
                PageLink {
                    title: "blog".into(),
                    url: "/blog".into()
                },
            ]
        );
    }

    #[test]
    fn test_nested_context() {
        let page = PageContext::new("/docs/guide/install", &Vec::<String>::new());
        assert!(!page.is_root);
        assert_eq!(page.title, "install");
        assert_eq!(page.url, "/docs/guide/install");
        assert!(page.sub_pages.is_empty());
        let ancestors: Vec<_> = page.ancestors.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(ancestors, ["/docs", "/docs/guide"]);
    }

    #[test]
    fn test_predicates() {
        let page = PageContext::new("/docs/guide", &["a"]);
        assert!(page.is_current("guide"));
        assert!(!page.is_current("docs"));
        assert!(page.is_parent("docs"));
        assert!(page.is_parent("guide"));
        assert!(!page.is_parent("blog"));
        assert!(!page.is_parent(""));
        assert_eq!(page.sub_pages[0].url, "/docs/guide/a");
    }

    #[test]
    fn test_template_field_names() {
        let page = PageContext::new("/docs", &["a"]);
        let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(&page) else {
            panic!("context is not an object");
        };
        let mut names: Vec<_> = fields.keys().map(String::as_str).collect();
        names.sort_unstable();
        assert_eq!(names, ["Ancestors", "IsRoot", "SubPages", "Title", "URL"]);
        assert_eq!(fields["SubPages"][0]["URL"], "/docs/a");
    }
}
