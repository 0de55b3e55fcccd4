use regex::Regex;

/// Markdown spans removed from post bodies, applied in this order:
/// links or images pointing at `upload://` references, links or images
/// with inline `data:` payloads, then any remaining image. Link text may
/// hold one level of balanced brackets.
static STRIP_PATTERNS: std::sync::LazyLock<Vec<Regex>> = std::sync::LazyLock::new(|| {
    vec![
        Regex::new(r"!?\[(?:[^\[\]\n]|\[[^\[\]\n]*\])*\]\(upload[^)\n]*\)").unwrap(),
        Regex::new(r"!?\[(?:[^\[\]\n]|\[[^\[\]\n]*\])*\]\(data[^)\n]*\)").unwrap(),
        Regex::new(r"!\[(?:[^\[\]\n]|\[[^\[\]\n]*\])*\]\([^)\n]*\)").unwrap(),
    ]
});

/// Remove image and upload markup whose targets are re-attached as real
/// attachments or cannot be resolved outside the forum.
///
/// The rules are reapplied until nothing changes, so the result is a fixed
/// point: `sanitize(&sanitize(s)) == sanitize(s)`.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let mut content = raw.to_string();
    loop {
        let mut cleaned = content.clone();
        for pattern in STRIP_PATTERNS.iter() {
            cleaned = pattern.replace_all(&cleaned, "").into_owned();
        }
        if cleaned == content {
            return cleaned;
        }
        content = cleaned;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_upload_data_and_image_spans() {
        let raw = "Before ![alt](upload://abc.png) middle ![alt](data:image/png;base64,iVBORw0KGgo=) and ![alt](http://x/y.png) after";
        let cleaned = sanitize(raw);

        assert!(!cleaned.contains("upload://abc"));
        assert!(!cleaned.contains("data:image/png"));
        assert!(!cleaned.contains("http://x/y.png"));
        assert_eq!(cleaned, "Before  middle  and  after");
    }

    #[test]
    fn test_removes_spans_with_bracketed_text() {
        assert_eq!(sanitize("a ![foo [bar]](upload://x.png) b"), "a  b");
        assert_eq!(sanitize("[see [1]](data:text/plain,hi)!"), "!");
        assert_eq!(sanitize("x ![a [b] c](https://e/i.gif) y"), "x  y");
    }

    #[test]
    fn test_removes_upload_links_without_bang() {
        let cleaned = sanitize("See [report.pdf|attachment](upload://xyz.pdf) for details");
        assert_eq!(cleaned, "See  for details");
    }

    #[test]
    fn test_keeps_plain_links() {
        let raw = "Read [the docs](https://example.com/docs) first.";
        assert_eq!(sanitize(raw), raw);
    }

    #[test]
    fn test_does_not_swallow_text_between_spans() {
        let raw = "![a](upload://one.png) keep this [b](https://example.com/page)";
        assert_eq!(sanitize(raw), " keep this [b](https://example.com/page)");
    }

    #[test]
    fn test_multiline_body() {
        let raw = "Line one\n![image|690x388](upload://abc.jpeg)\nLine three";
        assert_eq!(sanitize(raw), "Line one\n\nLine three");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "plain text",
            "![x](upload://a) [y](data:text/plain,hi) ![z](https://e/z.gif)",
            "[a]![b](c)(upload://u)",
            "![outer ![inner](x.png)](y.png)",
            "a ![foo [bar]](upload://x.png) b",
            "![deep [a [b]]](upload://x.png)",
            "",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_removal_exposing_upload_link() {
        // Removing the inner image leaves an upload link that must also go.
        assert_eq!(sanitize("[a]![b](c)(upload://u)"), "");
    }
}
