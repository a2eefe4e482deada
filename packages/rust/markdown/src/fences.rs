//! Fence-aware traversal of Markdown text.

/// Apply `f` to every stretch of text outside fenced code blocks.
///
/// Fenced blocks (including their fence lines) are copied through untouched.
/// A trailing newline on a prose stretch is preserved even if `f` drops it.
pub(crate) fn map_prose<F>(md: &str, mut f: F) -> String
where
    F: FnMut(&str) -> String,
{
    let mut out = String::with_capacity(md.len());
    let mut prose = String::new();
    let mut fence: Option<(char, usize)> = None;

    for line in md.split_inclusive('\n') {
        let body = line.trim_end_matches(['\n', '\r']);
        match fence {
            None => {
                if let Some(open) = fence_open(body) {
                    flush(&mut prose, &mut f, &mut out);
                    fence = Some(open);
                    out.push_str(line);
                } else {
                    prose.push_str(line);
                }
            }
            Some((ch, len)) => {
                out.push_str(line);
                if is_fence_close(body, ch, len) {
                    fence = None;
                }
            }
        }
    }
    flush(&mut prose, &mut f, &mut out);
    out
}

fn flush<F>(prose: &mut String, f: &mut F, out: &mut String)
where
    F: FnMut(&str) -> String,
{
    if prose.is_empty() {
        return;
    }
    let had_newline = prose.ends_with('\n');
    let mut mapped = f(prose);
    if had_newline && !mapped.ends_with('\n') {
        mapped.push('\n');
    }
    out.push_str(&mapped);
    prose.clear();
}

/// Fence character and length if `line` opens a fenced block.
pub(crate) fn fence_open(line: &str) -> Option<(char, usize)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let t = &line[indent..];
    let ch = t.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = t.chars().take_while(|c| *c == ch).count();
    if len < 3 {
        return None;
    }
    if ch == '`' && t[len..].contains('`') {
        return None;
    }
    Some((ch, len))
}

fn is_fence_close(line: &str, ch: char, len: usize) -> bool {
    let t = line.trim();
    t.len() >= len && t.chars().all(|c| c == ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_left_alone() {
        let md = "a b\n```\nA B\n```\nc d\n";
        let out = map_prose(md, |s| s.to_uppercase());
        assert_eq!(out, "A B\n```\nA B\n```\nC D\n");
    }

    #[test]
    fn longer_fence_needs_longer_close() {
        let md = "````\n```\ninner\n````\nafter";
        let out = map_prose(md, |s| s.replace("inner", "X").replace("after", "Y"));
        assert_eq!(out, "````\n```\ninner\n````\nY");
    }

    #[test]
    fn newline_before_fence_survives() {
        let md = "text  \n```\ncode\n```";
        let out = map_prose(md, |s| s.trim_end().to_string());
        assert_eq!(out, "text\n```\ncode\n```");
    }

    #[test]
    fn inline_triple_backticks_are_not_fences() {
        assert!(fence_open("```js").is_some());
        assert!(fence_open("~~~").is_some());
        assert!(fence_open("``` a ` b").is_none());
        assert!(fence_open("    ```").is_none());
        assert!(fence_open("``").is_none());
    }
}
