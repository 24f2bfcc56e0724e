//! Readability-style extraction of the main content of an HTML page.
//!
//! Picks the first main-content container (`article`, `main`, ...), falling
//! back to `body`, strips boilerplate elements, and rewrites relative links
//! and image sources against the page URL.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::Extracted;
use crate::error::ExtractionError;

/// Longest excerpt derived from body text, in characters.
const EXCERPT_CHARS: usize = 200;

const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role='main']",
    "#content",
    "#main",
    ".post-content",
    ".entry-content",
    ".content",
    "body",
];

const BOILERPLATE_SELECTORS: &[&str] = &[
    "script", "style", "noscript", "iframe", "form", "nav", "header", "footer", "aside",
    ".nav", ".navbar", ".sidebar", ".menu", ".advertisement", ".ads", "#sidebar",
];

/// Extracts title, excerpt and cleaned content from `raw_html`.
///
/// # Errors
///
/// Returns `ExtractionError::NoContent` when the page has no readable text.
pub fn extract(raw_html: &str, base_url: &Url) -> Result<Extracted, ExtractionError> {
    let document = Html::parse_document(raw_html);

    let root = CONTENT_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| {
            document
                .select(&selector)
                .find(|el| !collapse_whitespace(&text_of(el)).is_empty())
        })
        .ok_or_else(|| ExtractionError::NoContent(base_url.to_string()))?;

    let content = absolutize_links(&strip_boilerplate(root), root, base_url);

    let title = meta_content(&document, "meta[property='og:title']")
        .or_else(|| first_text(&document, "title"))
        .or_else(|| first_text(&document, "h1"))
        .unwrap_or_default();

    let excerpt = meta_content(&document, "meta[name='description']")
        .or_else(|| meta_content(&document, "meta[property='og:description']"))
        .or_else(|| first_paragraph(root))
        .map(|text| truncate_chars(&text, EXCERPT_CHARS))
        .unwrap_or_default();

    Ok(Extracted {
        title,
        excerpt,
        content,
    })
}

fn text_of(element: &ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .find(|content| !content.is_empty())
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .map(|el| collapse_whitespace(&text_of(&el)))
        .find(|text| !text.is_empty())
}

fn first_paragraph(root: ElementRef<'_>) -> Option<String> {
    let selector = Selector::parse("p").ok()?;
    root.select(&selector)
        .map(|el| collapse_whitespace(&text_of(&el)))
        .find(|text| !text.is_empty())
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", text[..end].trim_end()),
        None => text.to_string(),
    }
}

/// Serialized HTML of `root` with boilerplate subtrees removed.
fn strip_boilerplate(root: ElementRef<'_>) -> String {
    let mut html = root.html();
    for selector in BOILERPLATE_SELECTORS.iter().filter_map(|s| Selector::parse(s).ok()) {
        for element in root.select(&selector) {
            html = html.replace(&element.html(), "");
        }
    }
    html
}

/// Rewrites relative `href`/`src` attributes under `root` to absolute URLs.
fn absolutize_links(html: &str, root: ElementRef<'_>, base_url: &Url) -> String {
    let mut html = html.to_string();
    for (selector, attr) in [("a[href]", "href"), ("img[src]", "src")] {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        for element in root.select(&selector) {
            let Some(value) = element.value().attr(attr) else {
                continue;
            };
            if Url::parse(value).is_ok() || value.starts_with('#') {
                continue;
            }
            if let Ok(absolute) = base_url.join(value) {
                html = html.replace(
                    &format!("{}=\"{}\"", attr, value),
                    &format!("{}=\"{}\"", attr, absolute),
                );
            }
        }
    }
    html
}
