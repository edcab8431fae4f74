//! HTML to plain text for message bodies.

use std::sync::LazyLock;

use regex::Regex;

static BLOCK_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*(br|/p|/div|/li|/tr|/h[1-6])\s*/?\s*>").expect("block pattern is valid")
});

static INVISIBLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<\s*(script|style|head)[^>]*>.*?<\s*/\s*(script|style|head)\s*>")
        .expect("invisible pattern is valid")
});

/// Extract readable text from an HTML body.
///
/// Drops `<script>`, `<style>` and `<head>` content, turns block-level
/// closers and `<br>` into line breaks, strips remaining tags, decodes the
/// common entities, and trims each line, dropping blank ones.
pub fn html_to_text(html: &str) -> String {
    let without_invisible = INVISIBLE_RE.replace_all(html, "");
    let with_breaks = BLOCK_BREAK_RE.replace_all(&without_invisible, "\n");

    let mut stripped = String::with_capacity(with_breaks.len());
    let mut in_tag = false;
    for ch in with_breaks.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }

    decode_entities(&stripped)
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_basic_tags() {
        assert_eq!(html_to_text("<p>Hello <b>world</b></p>"), "Hello world");
    }

    #[test]
    fn block_elements_become_lines() {
        let html = "<div>First line</div><div>Second line</div>Third<br>Fourth";
        assert_eq!(html_to_text(html), "First line\nSecond line\nThird\nFourth");
    }

    #[test]
    fn drops_style_and_script() {
        let html = "<html><head><title>x</title><style>p { color: red; }</style></head>\
                    <body><script>alert(1)</script><p>Printer is broken</p></body></html>";
        assert_eq!(html_to_text(html), "Printer is broken");
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(html_to_text("Tom &amp; Jerry&nbsp;&lt;3"), "Tom & Jerry <3");
    }

    #[test]
    fn plain_text_passthrough() {
        assert_eq!(html_to_text("just text"), "just text");
    }

    #[test]
    fn empty_input() {
        assert_eq!(html_to_text(""), "");
    }
}
