//! Line-level heuristics for code blocks: line-number gutters, terminal
//! prompts, and whitespace trimming.

/// Number of leading ASCII digits in `line`.
pub fn leading_digits(line: &str) -> usize {
    line.bytes().take_while(u8::is_ascii_digit).count()
}

/// Fraction of non-empty lines whose content starts with a digit.
pub fn digit_prefixed_ratio(lines: &[String]) -> f64 {
    let non_empty: Vec<&String> = lines.iter().filter(|l| !l.trim().is_empty()).collect();
    if non_empty.is_empty() {
        return 0.0;
    }
    let numbered = non_empty.iter().filter(|l| leading_digits(l) > 0).count();
    numbered as f64 / non_empty.len() as f64
}

/// `true` when the block looks like it was captured together with its line-number gutter.
pub fn has_line_numbers(lines: &[String], threshold: f64) -> bool {
    digit_prefixed_ratio(lines) >= threshold
}

/// Remove the leading digit run from one line. A digits-only line becomes empty.
pub fn strip_line_number(line: &str) -> &str {
    &line[leading_digits(line)..]
}

pub fn strip_line_numbers(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .map(|l| strip_line_number(l).to_string())
        .collect()
}

/// `true` if `line` starts with a shell prompt.
pub fn is_prompt_line(line: &str) -> bool {
    let t = line.trim_start();
    t == "$" || t.starts_with("$ ") || t.starts_with("> ")
}

/// `true` when most non-empty lines start with a shell prompt.
pub fn looks_like_terminal(lines: &[String]) -> bool {
    let non_empty: Vec<&String> = lines.iter().filter(|l| !l.trim().is_empty()).collect();
    if non_empty.is_empty() {
        return false;
    }
    let prompts = non_empty.iter().filter(|l| is_prompt_line(l)).count();
    prompts * 2 > non_empty.len()
}

/// Drop blank lines at the start and end, keeping interior blank lines.
pub fn trim_blank_edges(mut lines: Vec<String>) -> Vec<String> {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    let first = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    lines.drain(..first);
    lines
}

/// Remove the indentation shared by every non-empty line.
pub fn dedent(lines: Vec<String>) -> Vec<String> {
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);
    if indent == 0 {
        return lines;
    }
    lines
        .into_iter()
        .map(|l| {
            if l.trim().is_empty() {
                String::new()
            } else {
                l[indent..].to_string()
            }
        })
        .collect()
}

/// Split raw code text into lines, normalizing line endings and invisible characters.
pub fn split_code_text(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .map(|l| l.replace('\u{200b}', "").replace('\u{a0}', " "))
        .collect()
}
