//! Deriving one body format from the other.
//!
//! Both directions work on template source, so `${...}` placeholders pass
//! through untouched.

use std::sync::LazyLock;

use regex::Regex;

static INVISIBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!--.*?-->|<head\b.*?</head\s*>|<style\b.*?</style\s*>|<script\b.*?</script\s*>")
        .expect("invisible-content regex is valid")
});

static BLOCK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<\s*/?\s*(?:br|p|div|li|tr|h[1-6]|table|ul|ol|blockquote|pre|section|article|header|footer|hr)\b[^>]*>",
    )
    .expect("block-tag regex is valid")
});

static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex is valid"));

static INLINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("space regex is valid"));

/// Best-effort plain-text rendering of an HTML document.
///
/// Block elements become line breaks, inline markup is dropped, runs of
/// spaces and tabs collapse to one space, each line loses its leading
/// whitespace, and leading/trailing blank lines are trimmed.
pub fn html_to_text(html: &str) -> String {
    let visible = INVISIBLE.replace_all(html, "");
    // Source line breaks are insignificant in HTML.
    let flat = visible.replace(['\r', '\n'], " ");
    let blocks = BLOCK_TAG.replace_all(&flat, "\n");
    let stripped = ANY_TAG.replace_all(&blocks, "");
    let decoded = decode_entities(&stripped);
    let collapsed = INLINE_SPACE.replace_all(&decoded, " ");

    let mut lines: Vec<&str> = Vec::new();
    for line in collapsed.lines().map(str::trim) {
        // At most one blank line between paragraphs.
        if line.is_empty() && lines.last().is_some_and(|l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.first().is_some_and(|l| l.is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Wrap a plain-text body in a minimal HTML document.
///
/// Newlines become `<br>` and one `<img>` per tag is appended, in order,
/// each referencing its content-id.
pub fn text_to_html(text: &str, image_tags: &[&str]) -> String {
    let escaped = escape_text(text);

    let mut body = escaped.lines().collect::<Vec<_>>().join("<br>\n");
    for tag in image_tags {
        let tag = escape_text(tag).replace('"', "&quot;");
        body.push_str(&format!("\n<img src=\"cid:{tag}\" alt=\"{tag}\">"));
    }

    format!("<html>\n<body>\n{body}\n</body>\n</html>\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_inline_markup() {
        assert_eq!(
            html_to_text("<div><b>Bold</b> and <i>italic</i></div>"),
            "Bold and italic"
        );
    }

    #[test]
    fn blocks_become_lines_without_leading_space() {
        let html = "<html><head><title>x</title><style>p { color: red; }</style></head>\n\
                    <body>\n  <p>  Hello   ${name},</p>\n\t<p>See\tyou<br>at ${seat}</p>\n</body></html>";
        assert_eq!(html_to_text(html), "Hello ${name},\n\nSee you\nat ${seat}");
    }

    #[test]
    fn decodes_common_entities() {
        assert_eq!(
            html_to_text("<p>Fish &amp; chips &lt;3&nbsp;today</p>"),
            "Fish & chips <3 today"
        );
    }

    #[test]
    fn drops_comments_and_scripts() {
        let html = "<!-- hidden -->Visible<script>var x = 1;</script>";
        assert_eq!(html_to_text(html), "Visible");
    }

    #[test]
    fn text_to_html_wraps_escapes_and_appends_images() {
        let html = text_to_html("Dear ${name},\nA & B <ok>", &["logo", "map"]);
        assert!(html.starts_with("<html>"));
        assert!(html.contains("Dear ${name},<br>\nA &amp; B &lt;ok&gt;"));
        let logo = html.find("<img src=\"cid:logo\"").unwrap();
        let map = html.find("<img src=\"cid:map\"").unwrap();
        assert!(logo < map);
    }

    #[test]
    fn image_tags_are_escaped_inside_attributes() {
        let html = text_to_html("Hi", &["site \"map\" & <v2>"]);
        assert!(
            html.contains(
                "<img src=\"cid:site &quot;map&quot; &amp; &lt;v2&gt;\" \
                 alt=\"site &quot;map&quot; &amp; &lt;v2&gt;\">"
            ),
            "{html}"
        );
        assert_eq!(html.matches('"').count(), 4);
    }

    #[test]
    fn text_to_html_without_images() {
        let html = text_to_html("Hello", &[]);
        assert!(!html.contains("<img"));
        assert_eq!(html_to_text(&html), "Hello");
    }

    #[test]
    fn derived_html_round_trips_to_readable_text() {
        let html = text_to_html("Line one\nLine two", &[]);
        assert_eq!(html_to_text(&html), "Line one\nLine two");
    }
}
