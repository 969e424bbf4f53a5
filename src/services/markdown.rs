//! Markdown rendering service
//!
//! Post bodies are stored as Markdown and rendered on the server with
//! pulldown-cmark. Fenced code is highlighted with syntect.
//!
//! Rendering rules:
//! - every heading gets an id `heading-{n}`, numbered from 0 in document order
//! - absolute `http(s)` links open in a new tab
//! - link and image targets other than `http`, `https`, `mailto`, relative
//!   paths and `#` anchors are replaced by `#`
//! - raw HTML in the source is escaped and shown as text
//!
//! # Example
//!
//! ```
//! use byteblog::services::markdown::MarkdownRenderer;
//!
//! let renderer = MarkdownRenderer::new();
//! let html = renderer.render("# Hello World\n\nThis is **bold** text.");
//! assert!(html.contains("<h1 id=\"heading-0\">"));
//! assert!(html.contains("<strong>"));
//! ```

use once_cell::sync::Lazy;
use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

const DEFAULT_THEME: &str = "base16-ocean.dark";

/// One entry of a post's table of contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    /// Anchor id, identical to the one `render` puts on the heading
    pub id: String,
    pub text: String,
    /// 1 to 6
    pub level: u8,
}

/// A thread-safe Markdown renderer with syntax highlighting support.
#[derive(Clone)]
pub struct MarkdownRenderer {
    syntax_set: Arc<SyntaxSet>,
    theme_set: Arc<ThemeSet>,
    theme_name: String,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    /// Renderer using the "base16-ocean.dark" highlighting theme
    pub fn new() -> Self {
        Self::with_theme(DEFAULT_THEME)
    }

    /// Renderer with a specific syntect theme.
    ///
    /// Unknown names fall back to "base16-ocean.dark", then to whichever
    /// bundled theme sorts first.
    pub fn with_theme(theme_name: &str) -> Self {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let theme_set = ThemeSet::load_defaults();

        let validated = if theme_set.themes.contains_key(theme_name) {
            theme_name.to_string()
        } else if theme_set.themes.contains_key(DEFAULT_THEME) {
            DEFAULT_THEME.to_string()
        } else {
            theme_set.themes.keys().next().cloned().unwrap_or_default()
        };

        Self {
            syntax_set: Arc::new(syntax_set),
            theme_set: Arc::new(theme_set),
            theme_name: validated,
        }
    }

    fn parser_options() -> Options {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options
    }

    /// Renders Markdown text to HTML.
    pub fn render(&self, markdown: &str) -> String {
        let parser = Parser::new_ext(markdown, Self::parser_options());
        let events = self.process_events(parser);

        let mut html_output = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut html_output, events.into_iter());
        html_output
    }

    /// Headings of a document in order, with the ids `render` assigns.
    ///
    /// Lines inside fenced code blocks that look like headings are not
    /// headings and are skipped.
    pub fn extract_toc(&self, markdown: &str) -> Vec<TocEntry> {
        extract_toc(markdown)
    }

    fn process_events<'a>(&self, parser: Parser<'a>) -> Vec<Event<'a>> {
        let mut events = Vec::new();
        let mut heading_index = 0usize;
        let mut in_code_block = false;
        let mut code_lang: Option<String> = None;
        let mut code_content = String::new();

        for event in parser {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    in_code_block = true;
                    code_content.clear();
                    code_lang = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(|s| s.to_string()),
                        CodeBlockKind::Indented => None,
                    };
                }
                Event::End(TagEnd::CodeBlock) => {
                    in_code_block = false;
                    let block = match code_lang.take() {
                        Some(lang) => self.highlight_code(&code_content, &lang),
                        None => plain_code_block(&code_content),
                    };
                    events.push(Event::Html(block.into()));
                }
                Event::Text(text) if in_code_block => {
                    code_content.push_str(&text);
                }
                Event::Start(Tag::Heading {
                    level,
                    classes,
                    attrs,
                    ..
                }) => {
                    let id = format!("heading-{}", heading_index);
                    heading_index += 1;
                    events.push(Event::Start(Tag::Heading {
                        level,
                        id: Some(id.into()),
                        classes,
                        attrs,
                    }));
                }
                Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => {
                    let dest_url = safe_url(dest_url);
                    if is_external(&dest_url) {
                        let title_attr = if title.is_empty() {
                            String::new()
                        } else {
                            format!(" title=\"{}\"", html_escape(&title))
                        };
                        // The matching End(Link) still renders as "</a>".
                        events.push(Event::Html(
                            format!(
                                "<a href=\"{}\"{} target=\"_blank\" rel=\"noopener noreferrer\">",
                                html_escape(&dest_url),
                                title_attr
                            )
                            .into(),
                        ));
                    } else {
                        events.push(Event::Start(Tag::Link {
                            link_type,
                            dest_url,
                            title,
                            id,
                        }));
                    }
                }
                Event::Start(Tag::Image {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => {
                    events.push(Event::Start(Tag::Image {
                        link_type,
                        dest_url: safe_url(dest_url),
                        title,
                        id,
                    }));
                }
                // Raw HTML is shown, not interpreted
                Event::Html(raw) | Event::InlineHtml(raw) => {
                    events.push(Event::Text(raw));
                }
                _ => events.push(event),
            }
        }

        events
    }

    /// Highlight a fenced block, keeping the language as `data-lang` and a
    /// `language-*` class on the wrapper.
    fn highlight_code(&self, code: &str, lang: &str) -> String {
        let lang_attr = html_escape(lang);
        let syntax = self
            .syntax_set
            .find_syntax_by_token(lang)
            .or_else(|| self.syntax_set.find_syntax_by_extension(lang));

        let body = match (syntax, self.theme_set.themes.get(&self.theme_name)) {
            (Some(syntax), Some(theme)) => {
                highlighted_html_for_string(code, &self.syntax_set, syntax, theme)
                    .unwrap_or_else(|_| plain_code_block(code))
            }
            _ => format!(
                "<pre><code class=\"language-{}\">{}</code></pre>",
                lang_attr,
                html_escape(code)
            ),
        };

        format!(
            "<div class=\"code-block language-{0}\" data-lang=\"{0}\"><div class=\"code-lang\">{0}</div>{1}</div>\n",
            lang_attr, body
        )
    }
}

fn plain_code_block(code: &str) -> String {
    format!("<pre><code>{}</code></pre>\n", html_escape(code))
}

fn is_external(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Schemes a link or image may point at. Relative paths and `#` anchors
/// carry no scheme and are always kept.
const ALLOWED_SCHEMES: [&str; 3] = ["http", "https", "mailto"];

/// Link or image target with any other scheme replaced by `#`.
fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    if is_safe_url(&url) {
        url
    } else {
        CowStr::Borrowed("#")
    }
}

fn is_safe_url(url: &str) -> bool {
    // Browsers drop whitespace and control characters inside a scheme
    // ("java\tscript:"), so compare on the cleaned-up form.
    let cleaned: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();

    let scheme_end = match cleaned.find(':') {
        Some(i) => i,
        None => return true,
    };
    // A ':' after the first path, query or fragment delimiter is not a scheme
    if cleaned[..scheme_end].contains(['/', '?', '#']) {
        return true;
    }
    ALLOWED_SCHEMES.contains(&&cleaned[..scheme_end])
}

/// Escapes HTML special characters in a string.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Table of contents built from the same parser events `render` walks, so
/// numbering can never drift from the rendered ids.
pub fn extract_toc(markdown: &str) -> Vec<TocEntry> {
    let parser = Parser::new_ext(markdown, MarkdownRenderer::parser_options());
    let mut entries = Vec::new();
    let mut current: Option<(u8, String)> = None;

    for event in parser {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some((level as u8, String::new()));
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, buf)) = current.as_mut() {
                    buf.push_str(&text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, text)) = current.take() {
                    entries.push(TocEntry {
                        id: format!("heading-{}", entries.len()),
                        text: text.trim().to_string(),
                        level,
                    });
                }
            }
            _ => {}
        }
    }

    entries
}

static HEADING_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s+").unwrap());
static FENCED_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.*?)\*").unwrap());
static LIST_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[-*+]\s+").unwrap());
static BLOCKQUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^>\s+").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Markdown stripped to plain text for previews.
///
/// At most `max` characters, plus "..." when the stripped text was longer.
pub fn plain_excerpt(markdown: &str, max: usize) -> String {
    let text = HEADING_MARKER.replace_all(markdown, "");
    let text = FENCED_CODE.replace_all(&text, "");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = BOLD.replace_all(&text, "$1");
    let text = ITALIC.replace_all(&text, "$1");
    let text = LIST_BULLET.replace_all(&text, "");
    let text = BLOCKQUOTE.replace_all(&text, "");
    let text = LINK.replace_all(&text, "$1");
    let text = BLANK_LINES.replace_all(&text, "\n");
    let text = text.trim();

    if text.chars().count() > max {
        let mut cut: String = text.chars().take(max).collect();
        cut.push_str("...");
        cut
    } else {
        text.to_string()
    }
}
