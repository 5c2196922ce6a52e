use once_cell::sync::Lazy;
use regex::Regex;

/// Precompiled regex for stripping HTML tags
static HTML_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]+>").expect("Invalid HTML tag regex"));

/// Precompiled regex for collapsing whitespace
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

/// Strip HTML tags from text
pub fn strip_tags(html: &str) -> String {
    HTML_TAG_RE.replace_all(html, " ").to_string()
}

/// Decode the HTML entities Yandex pages actually emit
pub fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&apos;", "'")
}

/// Collapse whitespace runs into single spaces and trim
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").trim().to_string()
}

/// Strip tags, decode entities and collapse whitespace in one pass
pub fn clean_fragment(html: &str) -> String {
    collapse_whitespace(&decode_entities(&strip_tags(html)))
}
