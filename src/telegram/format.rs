//! Telegram HTML helpers

use once_cell::sync::Lazy;
use regex::Regex;

static PRE_CODE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<pre><code class="language-\w+">"#).unwrap());
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"<br\s*/?>").unwrap());
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Escape text for inclusion in an HTML-mode message
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Turn an HTML reply into a plain-text approximation.
///
/// Used when Telegram rejects the HTML (usually unbalanced or unsupported
/// tags in model output).
pub fn html_to_plain(html: &str) -> String {
    let text = html
        .replace("<b>", "*")
        .replace("</b>", "*")
        .replace("<i>", "_")
        .replace("</i>", "_");

    // Code blocks first, so <code> inside <pre> is not treated as inline
    let text = PRE_CODE_OPEN.replace_all(&text, "```\n");
    let text = text
        .replace("</code></pre>", "\n```")
        .replace("<pre>", "```\n")
        .replace("</pre>", "\n```")
        .replace("<code>", "`")
        .replace("</code>", "`");

    let text = LINE_BREAK.replace_all(&text, "\n");
    ANY_TAG.replace_all(&text, "").into_owned()
}

/// First `max` characters, with "..." when something was cut
pub fn preview(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b && c > d"), "a &lt; b &amp;&amp; c &gt; d");
        assert_eq!(escape_html("&lt;"), "&amp;lt;");
    }

    #[test]
    fn test_plain_fallback_formatting() {
        assert_eq!(html_to_plain("<b>bold</b> and <i>it</i>"), "*bold* and _it_");
        assert_eq!(html_to_plain("run <code>ls</code>"), "run `ls`");
        assert_eq!(
            html_to_plain("<pre><code class=\"language-rust\">fn main() {}</code></pre>"),
            "```\nfn main() {}\n```"
        );
        assert_eq!(html_to_plain("<pre>x</pre>"), "```\nx\n```");
        assert_eq!(html_to_plain("a<br>b<br/>c<br />d"), "a\nb\nc\nd");
        assert_eq!(html_to_plain("<u>under</u> <a href=\"x\">link</a>"), "under link");
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 100), "short");
        assert_eq!(preview(&"a".repeat(101), 100), format!("{}...", "a".repeat(100)));
        assert_eq!(preview("日本語テキスト", 3), "日本語...");
    }
}
