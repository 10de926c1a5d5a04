use comrak::{markdown_to_html, ComrakOptions};
use lazy_static::lazy_static;
use regex::Regex;

use crate::policy::Policy;

lazy_static! {
    static ref MATH_INLINE: Regex =
        Regex::new(r"\$([^\$\n]+)\$").expect("Invalid MATH_INLINE regex pattern");
    static ref MATH_BLOCK: Regex =
        Regex::new(r"\$\$([^\$]+)\$\$").expect("Invalid MATH_BLOCK regex pattern");
    static ref MERMAID_BLOCK: Regex =
        Regex::new(r#"<pre><code class="language-mermaid">([^<]*)</code></pre>"#)
            .expect("Invalid MERMAID_BLOCK regex pattern");
}

/// Renders GFM markdown to HTML with math and mermaid placeholders. The result is not
/// sanitized; use [`to_safe_html`] for anything that reaches a browser.
pub fn to_html(src: &str) -> String {
    let opt = create_comrak_options();
    let mut html = markdown_to_html(src, &opt);
    html = patch_math_blocks(&html);
    html = patch_mermaid_blocks(&html);
    html
}

/// Renders markdown and routes the HTML through the sanitizer with `policy`.
pub fn to_safe_html(src: &str, policy: &Policy) -> String {
    let html = to_html(src);
    log::debug!("Rendered {} bytes of markdown to {} bytes of HTML", src.len(), html.len());
    crate::sanitize(&html, policy)
}

fn create_comrak_options() -> ComrakOptions<'static> {
    let mut opt = ComrakOptions::default();

    opt.extension.strikethrough = true;
    opt.extension.table = true;
    opt.extension.autolink = true;
    opt.extension.tasklist = true;
    opt.extension.superscript = true;
    opt.extension.footnotes = true;
    opt.extension.description_lists = true;

    opt.parse.smart = true;

    // Raw HTML in the source is escaped, never passed through.
    opt.render.unsafe_ = false;
    opt.render.escape = true;

    opt
}

pub fn patch_math_blocks(html: &str) -> String {
    // Block math first so `$$` is not read as two inline delimiters.
    let result = MATH_BLOCK.replace_all(
        html,
        r#"<div class="math-block" data-math="$1">$$$1$$</div>"#,
    );

    MATH_INLINE
        .replace_all(
            &result,
            r#"<span class="math-inline" data-math="$1">$$$1$$</span>"#,
        )
        .into_owned()
}

pub fn patch_mermaid_blocks(html: &str) -> String {
    MERMAID_BLOCK
        .replace_all(html, r#"<div class="mermaid">$1</div>"#)
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_markdown() {
        let md = "# Hello\n\nThis is **bold** and *italic*.";
        let html = to_html(md);
        assert!(html.contains("<h1>"));
        assert!(html.contains("<strong>"));
        assert!(html.contains("<em>"));
    }

    #[test]
    fn test_gfm_table() {
        let md = "| Header 1 | Header 2 |\n|----------|----------|\n| Cell 1   | Cell 2   |";
        let html = to_safe_html(md, &Policy::markdown());
        assert!(html.contains("<table>"));
        assert!(html.contains("<thead>"));
        assert!(html.contains("<tbody>"));
        assert!(html.contains("<td>Cell 1</td>"));
    }

    #[test]
    fn test_math_inline() {
        let md = "This is inline math: $a + b = c$.";
        let html = to_safe_html(md, &Policy::markdown());
        assert!(html.contains(r#"class="math-inline""#));
        assert!(html.contains(r#"data-math="a + b = c""#));
    }

    #[test]
    fn test_math_block() {
        let md = "$$\n\\int_0^1 x^2 dx = \\frac{1}{3}\n$$";
        let html = to_safe_html(md, &Policy::markdown());
        assert!(html.contains(r#"class="math-block""#));
    }

    #[test]
    fn test_mermaid() {
        let md = "```mermaid\ngraph LR\n  A --> B\n```";
        let html = to_safe_html(md, &Policy::markdown());
        assert!(html.contains(r#"<div class="mermaid">"#));
        assert!(html.contains("A --&gt; B"));
        assert!(!html.contains("<pre>"));
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let html = to_safe_html("<script>alert('XSS')</script>", &Policy::markdown());
        assert!(!html.contains("<script"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_links_get_rel() {
        let html = to_safe_html("[site](https://example.com)", &Policy::markdown());
        assert!(html.contains(
            r#"<a href="https://example.com" rel="noopener noreferrer">site</a>"#
        ));
    }

    #[test]
    fn test_script_links_are_neutralized() {
        let html = to_safe_html("[x](javascript:alert(1))", &Policy::markdown());
        assert!(!html.contains("javascript"));
        assert!(html.contains(">x</a>"));
    }

    #[test]
    fn test_basic_policy_drops_markdown_extras() {
        let html = to_safe_html("Math $a+b$ here", &Policy::basic());
        assert!(!html.contains("math-inline"));
        assert!(html.contains("<span>$a+b$</span>"));
    }
}
