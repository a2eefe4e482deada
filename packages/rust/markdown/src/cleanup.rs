//! Post-conversion cleanup pipeline for Markdown output.
//!
//! Each pass is a function `&str -> String` applied in sequence. Every pass
//! except the last runs only outside fenced code, so code bytes are never
//! touched after reinsertion.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use markdownizer_shared::strip_tracking;

use crate::fences::map_prose;

/// Run the full cleanup pipeline on Markdown with code already fenced.
pub(crate) fn run_pipeline(md: &str, base_url: Option<&Url>) -> String {
    let mut result = normalize_headings(md);
    result = map_prose(&result, clean_blank_lines);
    result = map_prose(&result, strip_leftover_html);
    result = map_prose(&result, |prose| resolve_links(prose, base_url));
    result = map_prose(&result, normalize_whitespace);
    result = collapse_outer_blank_lines(&result);
    ensure_trailing_newline(&result)
}

// ---------------------------------------------------------------------------
// Pass 1: Normalize heading levels
// ---------------------------------------------------------------------------

/// Ensure there's at most one H1 by demoting later ones.
fn normalize_headings(md: &str) -> String {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^#\s+(.+)$").expect("valid regex"));

    let mut seen_h1 = false;
    map_prose(md, |prose| {
        prose
            .split('\n')
            .map(|line| match H1_RE.captures(line) {
                Some(caps) if seen_h1 => format!("## {}", &caps[1]),
                Some(_) => {
                    seen_h1 = true;
                    line.to_string()
                }
                None => line.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

// ---------------------------------------------------------------------------
// Pass 2: Clean up excessive blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of blank lines into a single blank line.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Strip leftover HTML tags
// ---------------------------------------------------------------------------

/// Remove stray layout tags that survived the conversion, keeping their text.
fn strip_leftover_html(md: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"</?(?:div|span|section|article|aside|header|footer|figure|figcaption|details|summary|font|center)(?:\s[^>]*)?>",
        )
        .expect("valid regex")
    });

    HTML_TAG_RE.replace_all(md, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Resolve relative links and drop tracking parameters
// ---------------------------------------------------------------------------

fn resolve_links(md: &str, base_url: Option<&Url>) -> String {
    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(!?)\[([^\]]*)\]\(([^)\s]+)\)").expect("valid regex"));

    LINK_RE
        .replace_all(md, |caps: &regex::Captures| {
            let bang = &caps[1];
            let text = &caps[2];
            let href = &caps[3];

            if href.starts_with('#') || href.starts_with("mailto:") {
                return caps[0].to_string();
            }

            let absolute = if href.starts_with("http://") || href.starts_with("https://") {
                href.to_string()
            } else {
                match base_url.map(|base| base.join(href)) {
                    Some(Ok(resolved)) => resolved.to_string(),
                    _ => return caps[0].to_string(),
                }
            };

            // Images keep their full URL; only link targets are de-tracked.
            let target = if bang.is_empty() {
                strip_tracking(&absolute)
            } else {
                absolute
            };
            format!("{bang}[{text}]({target})")
        })
        .to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: Normalize whitespace
// ---------------------------------------------------------------------------

/// Remove trailing whitespace on lines.
fn normalize_whitespace(md: &str) -> String {
    md.split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 6: Document edges
// ---------------------------------------------------------------------------

/// Drop blank lines at the very start of the document.
fn collapse_outer_blank_lines(md: &str) -> String {
    md.trim_start_matches(['\n', ' ', '\t']).to_string()
}

/// Ensure the file ends with exactly one newline.
fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_end_matches('\n');
    format!("{trimmed}\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
