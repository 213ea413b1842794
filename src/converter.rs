use std::sync::LazyLock;

use regex::{Captures, Regex};

static HIDDEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!--.*?-->|<head\b.*?</head>|<script\b.*?</script>|<style\b.*?</style>")
        .unwrap()
});
static BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:p|br|div|h[1-6]|li|tr|table|center|blockquote)\b[^>]*>").unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static SOURCE_WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\r\n\t ]+").unwrap());
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9A-Fa-f]{1,6}|#[0-9]{1,7}|[A-Za-z][A-Za-z0-9]{1,9});").unwrap()
});
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").unwrap());
static BLANKS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

// Entities HTML knows but XML does not.
const HTML_ENTITIES: &[(&str, &str)] = &[
    ("nbsp", " "),
    ("sect", "§"),
    ("para", "¶"),
    ("copy", "©"),
    ("reg", "®"),
    ("ndash", "–"),
    ("mdash", "—"),
    ("lsquo", "‘"),
    ("rsquo", "’"),
    ("ldquo", "“"),
    ("rdquo", "”"),
];

/// Convert chapter markup to plain text, one visual block per line.
pub fn html_to_text(html: &str) -> String {
    let visible = HIDDEN_RE.replace_all(html, "");
    // Source line breaks are just whitespace; only block tags end a line.
    let reflowed = SOURCE_WS_RE.replace_all(&visible, " ");
    let broken = BREAK_RE.replace_all(&reflowed, "\n");
    let stripped = TAG_RE.replace_all(&broken, "");
    let decoded = decode_entities(&stripped);

    let lines: Vec<String> = decoded
        .lines()
        .map(|l| SPACES_RE.replace_all(l, " ").trim().to_string())
        .collect();
    let joined = lines.join("\n");
    BLANKS_RE.replace_all(&joined, "\n\n").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            resolve_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Decode one entity body (the part between `&` and `;`). Unknown names give `None`.
fn resolve_entity(body: &str) -> Option<String> {
    if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    if let Some(s) = quick_xml::escape::resolve_predefined_entity(body) {
        return Some(s.to_string());
    }
    HTML_ENTITIES
        .iter()
        .find(|(name, _)| *name == body)
        .map(|(_, s)| s.to_string())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_become_lines() {
        let html = r#"<html><head><title>FAMILY CODE</title><style>p {}</style></head>
<body><p style="text-align:center">FAMILY CODE</p><p>TITLE 1. THE MARRIAGE RELATIONSHIP</p>
<p>Sec.&nbsp;2.001.&nbsp;&nbsp;GENERAL DUTY TO ISSUE LICENSE.&nbsp;&nbsp;(a) A man &amp; a woman</p></body></html>"#;
        let text = html_to_text(html);
        let lines: Vec<_> = text.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(
            lines,
            [
                "FAMILY CODE",
                "TITLE 1. THE MARRIAGE RELATIONSHIP",
                "Sec. 2.001. GENERAL DUTY TO ISSUE LICENSE. (a) A man & a woman",
            ]
        );
    }

    #[test]
    fn scripts_and_comments_hidden() {
        let html = "<script>var x = '<p>no</p>';</script><!-- <p>gone</p> --><div>kept</div>";
        assert_eq!(html_to_text(html), "kept");
    }

    #[test]
    fn numeric_and_html_entities() {
        assert_eq!(html_to_text("<p>&#167; 1 &sect; 2 &quot;x&quot;</p>"), "§ 1 § 2 \"x\"");
    }

    #[test]
    fn unknown_entity_kept_verbatim() {
        assert_eq!(html_to_text("<p>a &bogus; b</p>"), "a &bogus; b");
    }

    #[test]
    fn entities_decode_independently() {
        assert_eq!(
            html_to_text("<p>Smith &amp; Jones &#167; 2.</p><p>Copyright &copy; 2020 &bogus;</p>"),
            "Smith & Jones § 2.\n\nCopyright © 2020 &bogus;"
        );
        assert_eq!(
            html_to_text("<p>Smith &amp; Jones &#x2014; R & D; &#xFFFFFF;</p>"),
            "Smith & Jones — R & D; &#xFFFFFF;"
        );
    }

    #[test]
    fn decoded_ampersand_is_not_decoded_again() {
        assert_eq!(html_to_text("<p>&amp;lt;</p>"), "&lt;");
    }

    #[test]
    fn wrapped_heading_stays_on_one_line() {
        let html = "<p>Sec. 1.001.  SHORT\nTITLE.  This code may be\r\n\tcited as the Family Code.</p>\n<p>Next</p>";
        assert_eq!(
            html_to_text(html),
            "Sec. 1.001. SHORT TITLE. This code may be cited as the Family Code.\n\nNext"
        );
        let seg = crate::parser::segment_document(&html_to_text(html), "FA", "f");
        assert_eq!(seg.records.len(), 1);
        assert_eq!(seg.records[0].section_name, "SHORT TITLE");
        assert_eq!(seg.records[0].text, "This code may be cited as the Family Code.\n\nNext");
    }

    #[test]
    fn blank_runs_collapse() {
        assert_eq!(html_to_text("<p>a</p><p></p><p></p><br><p>b</p>"), "a\n\nb");
    }

    #[test]
    fn inline_tags_do_not_split_lines() {
        assert_eq!(html_to_text("<p>Sec. 1.001. <b>NAME</b>. Body.</p>"), "Sec. 1.001. NAME. Body.");
    }
}
