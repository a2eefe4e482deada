//! Three-pass code block detection over an HTML fragment.
//!
//! Pass order matters: once an element is captured, nothing inside it or
//! around it can be captured again.

use scraper::node::Text;
use scraper::{ElementRef, Html, Node, Selector};

use super::lines;
use super::placeholder::{PlaceholderKind, PlaceholderScheme};
use super::{CodeBlock, CodeBlockPipeline, ExtractionPass};

/// Selectors for wrappers emitted by common syntax highlighters and doc frameworks.
const HIGHLIGHTER_SELECTORS: &[&str] = &[
    "div.highlight",
    "figure.highlight",
    "div.codehilite",
    "div.sourceCode",
    ".hljs",
    ".prism-code",
    ".theme-code-block",
    "[class*=\"codeBlock\"]",
    "[class*=\"CodeBlock\"]",
    ".code-block",
    ".nx-code-block",
    "[class*=\"nextra-code\"]",
    ".vuepress-code-block",
    "div[class*=\"language-\"]",
    ".syntaxhighlighter",
    ".gist-data",
    ".CodeMirror-code",
    ".cm-content",
];

/// Tables that lay a line-number column beside the code (Pygments, Rouge,
/// highlightjs-line-numbers).
const GUTTER_TABLES: &str = "table.highlighttable, table.rouge-table, table.hljs-ln";

/// Elements that disqualify a container from the heuristic pass.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "pre", "table", "ul", "ol", "li", "h1", "h2", "h3", "h4", "h5", "h6", "section",
    "article", "blockquote", "figure", "header", "footer", "nav", "aside", "form",
];

/// Class fragments that mark a gutter of line numbers rendered beside the code.
const GUTTER_CLASSES: &[&str] = &[
    "linenumber",
    "line-number",
    "lineno",
    "linenos",
    "gutter",
    "hljs-ln-n",
    "line-numbers-rows",
];

/// Class names of per-line wrappers inside highlighted code.
const LINE_CLASSES: &[&str] = &["line", "token-line", "code-line", "cm-line", "ace_line", "view-line"];

/// Class fragments suggesting monospace rendering.
const MONOSPACE_HINTS: &[&str] = &["mono", "code", "console", "terminal", "snippet", "source"];

/// Class fragments marking terminal sessions.
const TERMINAL_HINTS: &[&str] = &["terminal", "console", "shell-session", "command-line"];

/// Characters that are rare in prose and common in code.
const CODE_SYMBOLS: &str = "{}[]()<>;=$#&|*/\\:_";

/// Inline code longer than this (in chars) is treated as a block even on one line.
const LONG_INLINE_CODE: usize = 60;

/// Output of extraction.
pub(crate) struct Extracted {
    pub html: String,
    pub blocks: Vec<CodeBlock>,
}

pub(crate) fn extract_blocks(
    html: &str,
    pipeline: &CodeBlockPipeline,
    scheme: &PlaceholderScheme,
) -> Extracted {
    let mut doc = Html::parse_fragment(html);

    let plan: Vec<_> = {
        let captured = capture(&doc);
        document_order(&doc, &captured)
            .into_iter()
            .enumerate()
            .map(|(id, (el, pass))| (el.id(), build_block(id, el, pass, pipeline)))
            .collect()
    };

    if plan.is_empty() {
        return Extracted {
            html: html.to_string(),
            blocks: Vec::new(),
        };
    }

    let mut blocks = Vec::with_capacity(plan.len());
    for (node_id, block) in plan {
        if let Some(mut node) = doc.tree.get_mut(node_id) {
            let token = scheme.token(PlaceholderKind::Code, block.id());
            node.insert_before(Node::Text(Text {
                text: token.as_str().into(),
            }));
            node.detach();
        }
        blocks.push(block);
    }

    Extracted {
        html: doc.root_element().inner_html(),
        blocks,
    }
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

fn capture(doc: &Html) -> Vec<(ElementRef<'_>, ExtractionPass)> {
    let mut captured: Vec<(ElementRef<'_>, ExtractionPass)> = Vec::new();

    // Pass 1: semantic markup. Gutter tables go first so their number
    // column is never taken for a block of its own.
    let table_sel = Selector::parse(GUTTER_TABLES).expect("valid selector");
    for el in doc.select(&table_sel) {
        if overlaps(el, &captured) || inside_code(el) {
            continue;
        }
        let source = code_source(el);
        if !code_text(source, is_preformatted(source)).trim().is_empty() {
            captured.push((el, ExtractionPass::Highlighter));
        }
    }

    let pre_sel = Selector::parse("pre").expect("valid selector");
    for el in doc.select(&pre_sel) {
        if !overlaps(el, &captured) && !in_gutter(el) && !code_text(el, true).trim().is_empty() {
            captured.push((el, ExtractionPass::Semantic));
        }
    }

    let inline_sel = Selector::parse("code, samp, kbd").expect("valid selector");
    for el in doc.select(&inline_sel) {
        if overlaps(el, &captured) {
            continue;
        }
        let text = code_text(el, true);
        let text = text.trim();
        if text.contains('\n') || text.chars().count() > LONG_INLINE_CODE {
            captured.push((el, ExtractionPass::Semantic));
        }
    }

    // Pass 2: leaf containers that look like code.
    let leaf_sel = Selector::parse("div, p").expect("valid selector");
    for el in doc.select(&leaf_sel) {
        if overlaps(el, &captured) || has_block_descendant(el) {
            continue;
        }
        if looks_like_code(el) {
            captured.push((el, ExtractionPass::Heuristic));
        }
    }

    // Pass 3: highlighter wrappers.
    for sel_str in HIGHLIGHTER_SELECTORS {
        let Ok(selector) = Selector::parse(sel_str) else {
            continue;
        };
        for el in doc.select(&selector) {
            if overlaps(el, &captured) {
                continue;
            }
            if code_text(el, false).trim().chars().count() >= 10 {
                captured.push((el, ExtractionPass::Highlighter));
            }
        }
    }

    captured
}

/// Captured elements sorted by position in the document.
fn document_order<'a>(
    doc: &'a Html,
    captured: &[(ElementRef<'a>, ExtractionPass)],
) -> Vec<(ElementRef<'a>, ExtractionPass)> {
    doc.root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter_map(|el| captured.iter().find(|(c, _)| c.id() == el.id()).copied())
        .collect()
}

/// `true` if `el` is, contains, or sits inside an already captured element.
fn overlaps(el: ElementRef<'_>, captured: &[(ElementRef<'_>, ExtractionPass)]) -> bool {
    captured.iter().any(|(c, _)| {
        c.id() == el.id()
            || el.ancestors().any(|a| a.id() == c.id())
            || c.ancestors().any(|a| a.id() == el.id())
    })
}

fn inside_code(el: ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| matches!(a.value().name(), "pre" | "code"))
}

fn in_gutter(el: ElementRef<'_>) -> bool {
    el.ancestors().filter_map(ElementRef::wrap).any(is_gutter)
}

/// Where a captured element's code actually lives.
///
/// For a gutter table whose code sits in one `<pre>` cell that `<pre>` is the
/// source; per-row tables are read whole, gutter cells skipped.
fn code_source(el: ElementRef<'_>) -> ElementRef<'_> {
    if el.value().name() != "table" {
        return el;
    }
    let pre_sel = Selector::parse("pre").expect("valid selector");
    el.select(&pre_sel)
        .find(|pre| !in_gutter(*pre))
        .unwrap_or(el)
}

fn has_block_descendant(el: ElementRef<'_>) -> bool {
    el.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .any(|d| BLOCK_TAGS.contains(&d.value().name()))
}

fn looks_like_code(el: ElementRef<'_>) -> bool {
    let text = code_text(el, false);
    let captured_lines: Vec<String> = lines::split_code_text(&text);
    let non_empty = captured_lines.iter().filter(|l| !l.trim().is_empty()).count();
    let density = symbol_density(&text);

    if has_monospace_hint(el) {
        non_empty >= 2 && (density >= 0.05 || lines::looks_like_terminal(&captured_lines))
    } else {
        non_empty >= 3 && density >= 0.15
    }
}

fn symbol_density(text: &str) -> f64 {
    let visible: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if visible.is_empty() {
        return 0.0;
    }
    let symbols = visible.iter().filter(|c| CODE_SYMBOLS.contains(**c)).count();
    symbols as f64 / visible.len() as f64
}

fn has_monospace_hint(el: ElementRef<'_>) -> bool {
    let value = el.value();
    let by_class = value.classes().any(|c| {
        let c = c.to_ascii_lowercase();
        MONOSPACE_HINTS.iter().any(|h| c.contains(h))
    });
    let by_style = value.attr("style").is_some_and(|s| {
        let s = s.to_ascii_lowercase().replace(' ', "");
        s.contains("monospace") || s.contains("white-space:pre")
    });
    by_class || by_style
}

// ---------------------------------------------------------------------------
// Block construction
// ---------------------------------------------------------------------------

fn build_block(
    id: usize,
    el: ElementRef<'_>,
    pass: ExtractionPass,
    pipeline: &CodeBlockPipeline,
) -> CodeBlock {
    let source = code_source(el);
    let preformatted = is_preformatted(source);
    let text = code_text(source, preformatted);
    let mut raw = lines::trim_blank_edges(lines::split_code_text(&text));
    if !preformatted {
        raw = lines::dedent(raw);
    }

    let mut language = detect_language(source, pipeline);
    if language.is_none() && source.id() != el.id() {
        language = detect_language(el, pipeline);
    }
    CodeBlock::detect(
        id,
        raw,
        language,
        has_terminal_hint(source) || has_terminal_hint(el),
        pipeline.line_number_ratio(),
        pass,
    )
}

/// `<pre>` content, and anything inside it, keeps its whitespace verbatim.
fn is_preformatted(el: ElementRef<'_>) -> bool {
    let name = el.value().name();
    if matches!(name, "pre" | "code" | "samp" | "kbd") {
        return true;
    }
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().name() == "pre")
}

/// Language hints: the element, then its first `<code>` child, then up to three ancestors.
fn detect_language(el: ElementRef<'_>, pipeline: &CodeBlockPipeline) -> Option<String> {
    let code_sel = Selector::parse("code").expect("valid selector");
    let languages = pipeline.languages();

    std::iter::once(el)
        .chain(el.select(&code_sel).take(1))
        .find_map(|c| languages.detect(c.value().attr("class"), data_lang(c)))
        .or_else(|| {
            // Wrapper classes are often layout names, so only prefixed hints count.
            el.ancestors()
                .filter_map(ElementRef::wrap)
                .take(3)
                .find_map(|c| languages.detect_prefixed(c.value().attr("class"), data_lang(c)))
        })
}

fn data_lang<'a>(el: ElementRef<'a>) -> Option<&'a str> {
    let value = el.value();
    value.attr("data-language").or_else(|| value.attr("data-lang"))
}

fn has_terminal_hint(el: ElementRef<'_>) -> bool {
    std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap).take(2))
        .any(|e| {
            e.value().classes().any(|c| {
                let c = c.to_ascii_lowercase();
                TERMINAL_HINTS.iter().any(|h| c.contains(h))
            })
        })
}

// ---------------------------------------------------------------------------
// Text collection
// ---------------------------------------------------------------------------

/// Visible code text of `el`, with `<br>` and per-line wrappers turned into newlines
/// and line-number gutters skipped.
fn code_text(el: ElementRef<'_>, preformatted: bool) -> String {
    let mut out = String::new();
    collect_text(el, preformatted, &mut out);
    out
}

fn collect_text(el: ElementRef<'_>, preformatted: bool, out: &mut String) {
    let mut after_line = false;
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                let mut s: &str = text;
                if s.trim_ascii().is_empty()
                    && (is_table_structure(el) || (!preformatted && s.contains('\n')))
                {
                    continue;
                }
                if after_line {
                    s = s.strip_prefix('\n').unwrap_or(s);
                }
                out.push_str(s);
                after_line = false;
            }
            Node::Element(element) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                if element.name() == "br" {
                    out.push('\n');
                    after_line = false;
                    continue;
                }
                if is_gutter(child_el) || matches!(element.name(), "script" | "style" | "button") {
                    continue;
                }
                if is_line_wrapper(child_el) {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                    collect_text(child_el, preformatted, out);
                    if !out.ends_with('\n') {
                        out.push('\n');
                    }
                    after_line = true;
                } else {
                    collect_text(child_el, preformatted, out);
                    after_line = false;
                }
            }
            _ => {}
        }
    }
}

/// Whitespace directly inside these is markup indentation, never code.
fn is_table_structure(el: ElementRef<'_>) -> bool {
    matches!(el.value().name(), "table" | "thead" | "tbody" | "tfoot" | "tr")
}

fn is_gutter(el: ElementRef<'_>) -> bool {
    el.value().classes().any(|c| {
        let c = c.to_ascii_lowercase();
        // Prism's plugin marker; its gutter is `line-numbers-rows`.
        c != "line-numbers" && GUTTER_CLASSES.iter().any(|g| c.contains(g))
    })
}

fn is_line_wrapper(el: ElementRef<'_>) -> bool {
    let value = el.value();
    matches!(value.name(), "div" | "tr")
        || value
            .classes()
            .any(|c| LINE_CLASSES.contains(&c.to_ascii_lowercase().as_str()))
}
