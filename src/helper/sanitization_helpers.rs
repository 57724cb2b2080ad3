use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn code_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[\s\S]*?```").expect("code block regex is valid"))
}

fn slug_separator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("slug regex is valid"))
}

/// Escapes HTML in Markdown content while leaving fenced code blocks
/// untouched. Existing entities are decoded first so re-saving a post does
/// not double-escape it.
pub fn sanitize_markdown_content(markdown_input: &str) -> String {
    let mut code_blocks: Vec<String> = Vec::new();

    let with_placeholders = code_block_regex().replace_all(markdown_input, |caps: &regex::Captures| {
        code_blocks.push(caps[0].to_string());
        format!("__CODE_BLOCK_PLACEHOLDER_{}__", code_blocks.len() - 1)
    });

    let decoded = html_escape::decode_html_entities(&with_placeholders);
    let mut output = html_escape::encode_text(&decoded).to_string();

    for (i, block) in code_blocks.iter().enumerate() {
        let placeholder = format!("__CODE_BLOCK_PLACEHOLDER_{}__", i);
        output = output.replacen(&placeholder, block, 1);
    }
    output
}

/// Strips all HTML tags, for titles, excerpts, notes and display names.
pub fn strip_all_html(input: &str) -> String {
    ammonia::Builder::new()
        .tags(HashSet::new())
        .clean(input)
        .to_string()
}

/// Lowercase, ASCII alphanumerics joined by single hyphens.
pub fn slugify(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    slug_separator_regex()
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Slug for a post: the requested one if it survives slugification,
/// otherwise one derived from the title, otherwise from the post id.
pub fn post_slug(requested: Option<&str>, title: &str, post_id: &str) -> String {
    let from_request = requested.map(slugify).unwrap_or_default();
    if !from_request.is_empty() {
        return from_request;
    }
    let from_title = slugify(title);
    if !from_title.is_empty() {
        return from_title;
    }
    let short_id: String = post_id.chars().filter(|c| c.is_ascii_alphanumeric()).take(8).collect();
    format!("post-{}", short_id.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("  Hello, World!  "), "hello-world");
        assert_eq!(slugify("Rust & Actix -- 2024"), "rust-actix-2024");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn post_slug_falls_back_in_order() {
        assert_eq!(post_slug(Some("My Slug"), "Title", "abc"), "my-slug");
        assert_eq!(post_slug(Some("   "), "Title Here", "abc"), "title-here");
        assert_eq!(post_slug(None, "", "1a2b3c4d-5e6f"), "post-1a2b3c4d");
    }

    #[test]
    fn markdown_escapes_html_outside_code_blocks() {
        let input = "<script>x</script>\n```\n<b>kept</b>\n```";
        let out = sanitize_markdown_content(input);
        assert!(out.starts_with("&lt;script&gt;"));
        assert!(out.contains("<b>kept</b>"));
    }

    #[test]
    fn markdown_does_not_double_escape() {
        let once = sanitize_markdown_content("a < b");
        assert_eq!(sanitize_markdown_content(&once), once);
    }

    #[test]
    fn strip_removes_tags() {
        assert_eq!(strip_all_html("<em>Hi</em> there"), "Hi there");
    }
}
