use regex::Regex;
use std::collections::HashSet;

/// Cleaned HTML shorter than this is treated as "not meaningful" and the
/// plain-text body is used instead.
pub const MIN_MEANINGFUL_CONTENT: usize = 10;
pub const EMPTY_CONTENT_PLACEHOLDER: &str = "(no content provided)";

/// Reduces an email HTML body to readable text. Intentionally decodes only
/// the handful of entities inbound mail actually uses; this is not a full
/// entity table and must not become one.
fn clean_html(html: &str) -> String {
    let script_re = Regex::new(r"(?is)<script\b[^>]*>.*?</script>").unwrap();
    let style_re = Regex::new(r"(?is)<style\b[^>]*>.*?</style>").unwrap();
    let noise_re =
        Regex::new(r"(?is)<!DOCTYPE[^>]*>|<\?xml.*?\?>|<meta[^>]*>|<link[^>]*>|<title\b[^>]*>.*?</title>")
            .unwrap();
    let br_re = Regex::new(r"(?i)<br\s*/?>").unwrap();
    let tag_re = Regex::new(r"<[^>]+>").unwrap();

    let without_scripts = script_re.replace_all(html, "");
    let without_styles = style_re.replace_all(&without_scripts, "");
    let without_noise = noise_re.replace_all(&without_styles, "");
    let with_newlines = br_re.replace_all(&without_noise, "\n");
    let text_only = tag_re.replace_all(&with_newlines, "");

    // &amp; goes last so "&amp;lt;" ends as "&lt;", not "<".
    let decoded = text_only
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    collapse_whitespace(&decoded)
}

fn collapse_whitespace(input: &str) -> String {
    let horizontal_re = Regex::new(r"[^\S\n]+").unwrap();
    let blank_lines_re = Regex::new(r"\n{3,}").unwrap();

    let normalized = input.replace("\r\n", "\n").replace('\r', "\n");
    let squeezed = horizontal_re.replace_all(&normalized, " ");
    let trimmed_lines: Vec<&str> = squeezed.split('\n').map(|line| line.trim()).collect();
    let rejoined = trimmed_lines.join("\n");
    blank_lines_re.replace_all(&rejoined, "\n\n").trim().to_string()
}

/// Prefers the HTML body; falls back to the plain body verbatim when the
/// cleaned HTML is too short to mean anything, and to a literal placeholder
/// when both are empty.
pub fn extract_clean_content(html: &str, plain: &str) -> String {
    let cleaned = if html.trim().is_empty() {
        String::new()
    } else {
        clean_html(html)
    };

    if cleaned.chars().count() >= MIN_MEANINGFUL_CONTENT {
        return cleaned;
    }
    if !plain.trim().is_empty() {
        return plain.to_string();
    }
    if !cleaned.trim().is_empty() {
        return cleaned;
    }
    EMPTY_CONTENT_PLACEHOLDER.to_string()
}

/// Strips all HTML from admin-supplied titles and section keys.
pub fn strip_all_html(input: &str) -> String {
    ammonia::Builder::new()
        .tags(HashSet::new())
        .clean(input)
        .to_string()
}

/// Sanitizes rich post bodies down to a safe markup subset. Scripting
/// attributes and tags are removed outright rather than escaped.
pub fn sanitize_post_content(input: &str) -> String {
    let tags: HashSet<&str> = [
        "h1", "h2", "h3", "h4", "b", "strong", "i", "em", "p", "br", "a", "ul", "ol", "li",
        "blockquote", "code", "pre", "hr", "img",
    ]
    .into_iter()
    .collect();
    let attributes: HashSet<&str> = ["src", "href", "alt", "title"].into_iter().collect();

    ammonia::Builder::new()
        .tags(tags)
        .generic_attributes(attributes)
        .link_rel(Some("nofollow ugc"))
        .clean(input)
        .to_string()
}

/// Static pages may embed reusable template posts with `[[template:<id>]]`
/// tokens; those ids become rows in `post_references`.
pub fn extract_template_refs(content: &str) -> Vec<String> {
    let token_re = Regex::new(
        r"\[\[template:([0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})\]\]",
    )
    .unwrap();
    let mut seen = HashSet::new();
    let mut refs = Vec::new();
    for capture in token_re.captures_iter(content) {
        let id = capture[1].to_lowercase();
        if seen.insert(id.clone()) {
            refs.push(id);
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_cleaned_html() {
        assert_eq!(
            extract_clean_content("<p>Hello <b>World</b>, neighbors</p>", "Hello World"),
            "Hello World, neighbors"
        );
    }

    #[test]
    fn empty_html_falls_back_to_plain() {
        assert_eq!(extract_clean_content("", "plain only"), "plain only");
    }

    #[test]
    fn short_cleaned_html_falls_back_to_plain_verbatim() {
        assert_eq!(
            extract_clean_content("<p>hi</p>", "the plain body wins here"),
            "the plain body wins here"
        );
    }

    #[test]
    fn both_empty_yields_placeholder() {
        assert_eq!(extract_clean_content("", "   "), EMPTY_CONTENT_PLACEHOLDER);
    }

    #[test]
    fn scripts_styles_and_noise_are_stripped_with_content() {
        let html = r#"<html><head><title>ignore me</title><meta charset="utf-8">
            <style>body { color: red; }</style></head>
            <body><script>alert("x")</script><p>Pool closed&nbsp;Friday &amp; Saturday</p></body></html>"#;
        assert_eq!(
            extract_clean_content(html, ""),
            "Pool closed Friday & Saturday"
        );
    }

    #[test]
    fn br_tags_become_newlines() {
        let html = "<p>Line one<br>Line two<br/>Line three</p>";
        assert_eq!(extract_clean_content(html, ""), "Line one\nLine two\nLine three");
    }

    #[test]
    fn decodes_only_the_common_entities() {
        let html = "<p>&lt;Gate&gt; &quot;code&quot; is 1234 &#39;til June &copy;</p>";
        assert_eq!(
            extract_clean_content(html, ""),
            "<Gate> \"code\" is 1234 'til June &copy;"
        );
    }

    #[test]
    fn template_refs_are_extracted_and_deduplicated() {
        let id = "6fa459ea-ee8a-3ca4-894e-db77e160355e";
        let content = format!(
            "Intro [[template:{id}]] middle [[template:{id}]] [[template:not-a-uuid]]",
        );
        assert_eq!(extract_template_refs(&content), vec![id.to_string()]);
        assert!(extract_template_refs("no tokens").is_empty());
    }
}
