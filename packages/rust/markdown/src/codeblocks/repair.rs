//! Recovery of code that the converter emitted outside fenced blocks.
//!
//! Two shapes are recognized in prose:
//! - inline code spans that contain newlines
//! - runs of lines numbered 1, 2, 3... with the number glued to the code

use std::sync::LazyLock;

use regex::Regex;

use super::lines::{split_code_text, trim_blank_edges};
use super::{CodeBlock, ExtractionPass};
use crate::fences::map_prose;

/// Shortest numbered run worth promoting.
const MIN_RUN: usize = 3;

pub(crate) fn repair_fragments(markdown: &str, line_number_ratio: f64) -> String {
    let spans_fixed = map_prose(markdown, |prose| {
        promote_multiline_spans(prose, line_number_ratio)
    });
    map_prose(&spans_fixed, promote_numbered_runs)
}

// ---------------------------------------------------------------------------
// Multi-line inline spans
// ---------------------------------------------------------------------------

fn promote_multiline_spans(prose: &str, line_number_ratio: f64) -> String {
    static SPAN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("valid regex"));

    SPAN_RE
        .replace_all(prose, |caps: &regex::Captures| {
            let content = &caps[1];
            // Backticks paired across a paragraph break are not a code span.
            if !content.contains('\n')
                || content.contains("\n\n")
                || content.starts_with(char::is_whitespace)
            {
                return caps[0].to_string();
            }
            let raw = trim_blank_edges(split_code_text(content));
            if raw.len() < 2 {
                return caps[0].to_string();
            }
            let block = CodeBlock::detect(
                0,
                raw,
                None,
                false,
                line_number_ratio,
                ExtractionPass::Repair,
            );
            format!("\n\n{}\n\n", block.to_fenced())
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Numbered line runs
// ---------------------------------------------------------------------------

fn promote_numbered_runs(prose: &str) -> String {
    let lines: Vec<&str> = prose.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        let Some(body) = numbered_run(&lines[i..]) else {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        };

        let len = body.len();
        let raw: Vec<String> = lines[i..i + len].iter().map(|l| l.to_string()).collect();
        let block = CodeBlock::with_body(0, raw, body, true, ExtractionPass::Repair);

        if out.last().is_some_and(|l| !l.trim().is_empty()) {
            out.push(String::new());
        }
        out.push(block.to_fenced());
        i += len;
        if lines.get(i).is_some_and(|l| !l.trim().is_empty()) {
            out.push(String::new());
        }
    }

    out.join("\n")
}

/// Stripped lines of a sequentially numbered run at the start of `lines`.
fn numbered_run(lines: &[&str]) -> Option<Vec<String>> {
    let first = lines.first()?;
    if is_list_item(first) {
        return None;
    }
    let digits = first.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let start: u64 = first[..digits].parse().ok()?;

    let mut body = Vec::new();
    let mut glued = 0;
    for (offset, line) in lines.iter().enumerate() {
        let Some(expected) = start.checked_add(offset as u64) else {
            break;
        };
        let expected = expected.to_string();
        if is_list_item(line) || !line.starts_with(&expected) {
            break;
        }
        let rest = &line[expected.len()..];
        if !rest.starts_with(char::is_whitespace) {
            glued += 1;
        }
        body.push(rest.to_string());
    }

    // Prose like "2019 was a good year" has a space after the number.
    if body.len() < MIN_RUN
        || glued * 2 < body.len()
        || body.iter().all(|l| l.trim().is_empty())
    {
        return None;
    }
    Some(body)
}

fn is_list_item(line: &str) -> bool {
    static LIST_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\s*\d+[.)](\s|$)").expect("valid regex"));
    LIST_RE.is_match(line)
}
