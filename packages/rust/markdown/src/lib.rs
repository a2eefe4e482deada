//! HTML-to-Markdown conversion for reconciled captures.
//!
//! Code blocks are lifted out before conversion and written back as fenced
//! blocks afterwards (see [`codeblocks`]); tables are rendered separately
//! because `htmd` flattens them. The result gets a cleanup pass and YAML
//! frontmatter.

pub mod codeblocks;
mod cleanup;
mod fences;
mod tables;

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, instrument};
use url::Url;

use markdownizer_shared::{MarkdownizerError, Result, redact_tokens, strip_tracking};

pub use codeblocks::{
    CodeBlock, CodeBlockPipeline, CodeBlockSummary, ExtractionPass, LanguageTable,
    PlaceholderScheme, PreparedDocument,
};

// ---------------------------------------------------------------------------
// Renderer seam
// ---------------------------------------------------------------------------

/// An HTML-to-Markdown converter.
///
/// Implementations may do anything to markup, but must pass plain text
/// through intact so placeholder tokens survive.
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, html: &str) -> Result<String>;
}

/// Default renderer backed by `htmd`.
#[derive(Debug, Clone)]
pub struct HtmdRenderer {
    skip_tags: Vec<&'static str>,
}

impl Default for HtmdRenderer {
    fn default() -> Self {
        Self {
            skip_tags: vec![
                "script", "style", "nav", "iframe", "noscript", "svg", "button", "form",
            ],
        }
    }
}

impl MarkdownRenderer for HtmdRenderer {
    fn render(&self, html: &str) -> Result<String> {
        let converter = htmd::HtmlToMarkdown::builder()
            .skip_tags(self.skip_tags.clone())
            .build();

        converter
            .convert(html)
            .map_err(|e| MarkdownizerError::Conversion(format!("htmd conversion failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of converting a chosen candidate to Markdown.
#[derive(Debug, Clone)]
pub struct ConvertResult {
    /// The final Markdown content (with frontmatter).
    pub markdown: String,
    /// Extracted or inferred page title.
    pub title: String,
    /// Approximate word count of the Markdown body (excluding frontmatter and code).
    pub word_count: usize,
    /// One entry per code block, in document order.
    pub code_blocks: Vec<CodeBlockSummary>,
}

/// Options for the HTML-to-Markdown conversion.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Source URL used for resolving relative links and frontmatter.
    pub source_url: String,
    /// Override title (if `None`, extracted from first H1).
    pub title: Option<String>,
    /// Timestamp for the `captured_at` frontmatter field.
    pub captured_at: Option<String>,
    /// Which candidate the content came from, for the `chosen` frontmatter field.
    pub chosen: Option<String>,
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Code block pipeline plus renderer. Cheap to clone and share across tasks.
#[derive(Clone)]
pub struct Converter {
    pipeline: CodeBlockPipeline,
    renderer: Arc<dyn MarkdownRenderer>,
}

impl Converter {
    pub fn new(pipeline: CodeBlockPipeline, renderer: Arc<dyn MarkdownRenderer>) -> Self {
        Self { pipeline, renderer }
    }

    pub fn pipeline(&self) -> &CodeBlockPipeline {
        &self.pipeline
    }

    /// Convert content HTML to clean Markdown with frontmatter.
    ///
    /// 1. Lift code blocks out behind placeholders
    /// 2. Lift tables out and render them separately
    /// 3. Convert the remaining HTML with the renderer
    /// 4. Restore tables, then reinsert code as fenced blocks
    /// 5. Repair code fragments the renderer broke apart
    /// 6. Run the cleanup pipeline and prepend frontmatter
    #[instrument(skip_all, fields(url = %redact_tokens(&opts.source_url)))]
    pub fn convert(&self, html: &str, opts: &ConvertOptions) -> Result<ConvertResult> {
        let prepared = self.pipeline.prepare(html);
        let code_blocks = prepared.summaries();

        let lifted = tables::lift_tables(prepared.html(), prepared.scheme());

        let raw_markdown = self.renderer.render(&lifted.html)?;
        debug!(raw_len = raw_markdown.len(), "renderer finished");

        let with_tables = tables::restore_tables(&raw_markdown, &lifted.tables, prepared.scheme());
        let with_code = prepared.reinsert(&with_tables)?;
        let repaired = self.pipeline.repair(&with_code);

        let base_url = Url::parse(&opts.source_url).ok();
        let cleaned = cleanup::run_pipeline(&repaired, base_url.as_ref());

        let title = opts
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| extract_title_from_markdown(&cleaned))
            .unwrap_or_else(|| "Untitled".to_string());

        let word_count = count_words(&cleaned);
        let frontmatter = build_frontmatter(opts, &title);
        let markdown = format!("{frontmatter}\n{cleaned}");

        debug!(
            title = %title,
            word_count,
            code_blocks = code_blocks.len(),
            final_len = markdown.len(),
            "conversion complete"
        );

        Ok(ConvertResult {
            markdown,
            title,
            word_count,
            code_blocks,
        })
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(CodeBlockPipeline::default(), Arc::new(HtmdRenderer::default()))
    }
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract title from the first H1 in the Markdown text.
fn extract_title_from_markdown(md: &str) -> Option<String> {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^# (.+)$").expect("valid regex"));

    let mut title = None;
    fences::map_prose(md, |p| {
        if title.is_none() {
            title = H1_RE.captures(p).map(|c| c[1].trim().to_string());
        }
        String::new()
    });
    title
}

/// Count words in Markdown body (excluding fenced code).
fn count_words(md: &str) -> usize {
    let mut count = 0;
    fences::map_prose(md, |prose| {
        count += prose
            .split_whitespace()
            .filter(|w| !w.chars().all(|c| c == '#'))
            .count();
        String::new()
    });
    count
}

/// Build a YAML frontmatter block.
fn build_frontmatter(opts: &ConvertOptions, title: &str) -> String {
    let mut fm = String::from("---\n");
    fm.push_str(&format!(
        "source_url: \"{}\"\n",
        escape_yaml_string(&strip_tracking(&opts.source_url))
    ));
    fm.push_str(&format!("title: \"{}\"\n", escape_yaml_string(title)));
    if let Some(ts) = &opts.captured_at {
        fm.push_str(&format!("captured_at: \"{}\"\n", escape_yaml_string(ts)));
    }
    if let Some(chosen) = &opts.chosen {
        fm.push_str(&format!("chosen: \"{}\"\n", escape_yaml_string(chosen)));
    }
    fm.push_str("---\n");
    fm
}

/// Escape special characters in a YAML string value.
fn escape_yaml_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_opts(url: &str) -> ConvertOptions {
        ConvertOptions {
            source_url: url.to_string(),
            ..Default::default()
        }
    }

    fn convert(html: &str, opts: &ConvertOptions) -> ConvertResult {
        Converter::default().convert(html, opts).expect("convert")
    }

    /// Renderer that drops everything, placeholders included.
    struct LossyRenderer;

    impl MarkdownRenderer for LossyRenderer {
        fn render(&self, _html: &str) -> Result<String> {
            Ok("nothing survived".into())
        }
    }

    /// Renderer that emits each paragraph twice.
    struct EchoRenderer;

    impl MarkdownRenderer for EchoRenderer {
        fn render(&self, html: &str) -> Result<String> {
            let inner = HtmdRenderer::default().render(html)?;
            Ok(format!("{inner}\n\n{inner}"))
        }
    }

    #[test]
    fn convert_simple_html() {
        let html = "<h1>Hello World</h1><p>Some text.</p>";
        let result = convert(html, &make_opts("https://example.com/page"));

        assert!(result.markdown.contains("# Hello World"));
        assert!(result.markdown.contains("Some text."));
        assert_eq!(result.title, "Hello World");
        assert!(result.word_count > 0);
    }

    #[test]
    fn convert_includes_frontmatter() {
        let html = "<h1>Test</h1><p>Body</p>";
        let result = convert(
            html,
            &ConvertOptions {
                source_url: "https://example.com/test?utm_source=x".into(),
                title: None,
                captured_at: Some("2024-01-15T10:30:00Z".into()),
                chosen: Some("browser".into()),
            },
        );

        assert!(result.markdown.starts_with("---\n"));
        assert!(result.markdown.contains("source_url: \"https://example.com/test\""));
        assert!(result.markdown.contains("title: \"Test\""));
        assert!(result.markdown.contains("captured_at: \"2024-01-15T10:30:00Z\""));
        assert!(result.markdown.contains("chosen: \"browser\""));
    }

    #[test]
    fn code_survives_byte_for_byte() {
        let html = r#"<h1>Code Example</h1>
            <p>Before the code.</p>
            <pre><code class="language-rust">fn main() {
    let s = "*not emphasis* &amp; [not a link](x)";
    println!("{s}");
}</code></pre>
            <p>After the code.</p>"#;

        let result = convert(html, &make_opts("https://example.com/code"));
        let expected = "```rust\nfn main() {\n    let s = \"*not emphasis* & [not a link](x)\";\n    println!(\"{s}\");\n}\n```";
        assert!(result.markdown.contains(expected), "got:\n{}", result.markdown);
        assert_eq!(result.code_blocks.len(), 1);
        assert_eq!(result.code_blocks[0].language.as_deref(), Some("rust"));
        let before = result.markdown.find("Before the code.").unwrap();
        let code = result.markdown.find("```rust").unwrap();
        let after = result.markdown.find("After the code.").unwrap();
        assert!(before < code && code < after);
    }

    #[test]
    fn gutter_numbers_removed_from_output() {
        let html = "<p>Example</p><pre>1from x import y\n2\n3def f():</pre>";
        let result = convert(html, &make_opts("https://example.com/"));
        assert!(result.markdown.contains("```\nfrom x import y\n\ndef f():\n```"));
        assert!(result.code_blocks[0].had_line_numbers);
    }

    #[test]
    fn highlight_table_becomes_one_fence() {
        let html = "<table class=\"highlighttable\"><tr>\
            <td class=\"linenos\"><div class=\"linenodiv\"><pre>1\n2\n3</pre></div></td>\
            <td class=\"code\"><div class=\"highlight\"><pre>import os\nx = 1\nprint(x)</pre></div></td>\
            </tr></table>";
        let result = convert(html, &make_opts("https://example.com/"));
        assert_eq!(result.code_blocks.len(), 1);
        assert!(
            result.markdown.contains("```\nimport os\nx = 1\nprint(x)\n```"),
            "got:\n{}",
            result.markdown
        );
        assert!(!result.markdown.contains("| ---"));
        assert_eq!(result.markdown.matches("```").count(), 2);
    }

    #[test]
    fn code_in_layout_table_is_not_a_table_cell() {
        let html = "<table><tr><td><p>Build it</p></td><td><pre>make build\nmake install</pre></td></tr></table>";
        let result = convert(html, &make_opts("https://example.com/"));
        assert!(
            result.markdown.contains("```\nmake build\nmake install\n```"),
            "got:\n{}",
            result.markdown
        );
        assert!(result.markdown.contains("Build it"));
        assert!(!result.markdown.contains("| ---"));
    }

    #[test]
    fn convert_preserves_tables() {
        let html = r#"<h1>Data</h1>
            <table>
                <thead><tr><th>Name</th><th>Value</th></tr></thead>
                <tbody>
                    <tr><td>foo</td><td>bar</td></tr>
                    <tr><td>baz</td><td>qux</td></tr>
                </tbody>
            </table>"#;

        let result = convert(html, &make_opts("https://example.com/data"));
        assert!(result.markdown.contains("| Name | Value |\n| --- | --- |\n| foo | bar |"));
    }

    #[test]
    fn convert_handles_lists() {
        let html = r#"<ul><li>Item one</li><li>Item two</li></ul>
            <ol><li>First</li><li>Second</li></ol>"#;
        let result = convert(html, &make_opts("https://example.com/lists"));
        assert!(result.markdown.contains("Item one"));
        assert!(result.markdown.contains("First"));
        assert!(!result.markdown.contains("```"));
    }

    #[test]
    fn convert_no_html_tags_in_output() {
        let html = r#"<h1>Clean Output</h1>
            <p>This should be <strong>clean</strong> markdown.</p>
            <div class="note"><p>A note.</p></div>"#;

        let result = convert(html, &make_opts("https://example.com/clean"));
        let body = result.markdown.split("---").nth(2).unwrap_or(&result.markdown);
        assert!(!body.contains("<p>"), "output contains <p> tags");
        assert!(!body.contains("<h1>"), "output contains <h1> tags");
    }

    #[test]
    fn convert_with_title_override() {
        let html = "<h1>Original</h1><p>Text</p>";
        let result = convert(
            html,
            &ConvertOptions {
                source_url: "https://example.com/".into(),
                title: Some("Custom \"Title\"".into()),
                ..Default::default()
            },
        );

        assert_eq!(result.title, "Custom \"Title\"");
        assert!(result.markdown.contains("title: \"Custom \\\"Title\\\"\""));
    }

    #[test]
    fn dropped_placeholder_is_an_error() {
        let converter = Converter::new(CodeBlockPipeline::default(), Arc::new(LossyRenderer));
        let err = converter
            .convert("<pre>x = 1</pre>", &make_opts("https://example.com/"))
            .unwrap_err();
        assert!(matches!(
            err,
            MarkdownizerError::PlaceholderMismatch { id: 0, occurrences: 0 }
        ));
    }

    #[test]
    fn duplicated_placeholder_is_an_error() {
        let converter = Converter::new(CodeBlockPipeline::default(), Arc::new(EchoRenderer));
        let err = converter
            .convert("<pre>x = 1</pre>", &make_opts("https://example.com/"))
            .unwrap_err();
        assert!(matches!(
            err,
            MarkdownizerError::PlaceholderMismatch { id: 0, occurrences: 2 }
        ));
    }

    #[test]
    fn words_in_code_are_not_counted() {
        assert_eq!(count_words("# Title\n\none two\n\n```\nthree four\n```\n"), 3);
    }

    #[test]
    fn title_ignores_code_comments() {
        let md = "```python\n# comment\n```\n\n# Real Title\n";
        assert_eq!(extract_title_from_markdown(md).as_deref(), Some("Real Title"));
    }
}
