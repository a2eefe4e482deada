//! Lossless code block handling around HTML-to-Markdown conversion.
//!
//! Code is lifted out of the HTML before the converter sees it, replaced by
//! opaque placeholder tokens, and written back as fenced blocks afterwards:
//!
//! 1. [`CodeBlockPipeline::prepare`] finds code blocks and swaps them for tokens
//! 2. the caller converts [`PreparedDocument::html`] to Markdown
//! 3. [`PreparedDocument::reinsert`] turns every token back into a fence
//! 4. [`CodeBlockPipeline::repair`] recovers code the converter broke apart

mod extract;
pub mod language;
pub mod lines;
pub mod placeholder;
mod repair;

use serde::Serialize;
use tracing::{debug, warn};

use markdownizer_shared::{CodeBlocksConfig, MarkdownizerError, Result};

pub use language::LanguageTable;
pub use placeholder::{PlaceholderKind, PlaceholderScheme};

// ---------------------------------------------------------------------------
// Code blocks
// ---------------------------------------------------------------------------

/// Which detection pass found a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionPass {
    /// `<pre>` and multi-line `<code>`/`<samp>`/`<kbd>`.
    Semantic,
    /// Monospace or symbol-dense leaf containers.
    Heuristic,
    /// Known syntax-highlighter wrappers.
    Highlighter,
    /// Recovered from converter output after the fact.
    Repair,
}

/// One code block lifted out of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    id: usize,
    raw_lines: Vec<String>,
    lines: Vec<String>,
    language: Option<String>,
    is_terminal_command: bool,
    had_line_numbers: bool,
    pass: ExtractionPass,
}

impl CodeBlock {
    /// Build a block from captured lines, detecting and stripping a line-number gutter.
    pub fn detect(
        id: usize,
        raw_lines: Vec<String>,
        language: Option<String>,
        terminal_hint: bool,
        line_number_ratio: f64,
        pass: ExtractionPass,
    ) -> Self {
        let had_line_numbers = lines::has_line_numbers(&raw_lines, line_number_ratio);
        let body = if had_line_numbers {
            lines::strip_line_numbers(&raw_lines)
        } else {
            raw_lines.clone()
        };
        let is_terminal_command = terminal_hint || lines::looks_like_terminal(&body);
        Self {
            id,
            raw_lines,
            lines: body,
            language,
            is_terminal_command,
            had_line_numbers,
            pass,
        }
    }

    /// Build a block whose body lines were already cleaned by the caller.
    pub(crate) fn with_body(
        id: usize,
        raw_lines: Vec<String>,
        body: Vec<String>,
        had_line_numbers: bool,
        pass: ExtractionPass,
    ) -> Self {
        let is_terminal_command = lines::looks_like_terminal(&body);
        Self {
            id,
            raw_lines,
            lines: body,
            language: None,
            is_terminal_command,
            had_line_numbers,
            pass,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Lines exactly as captured.
    pub fn raw_lines(&self) -> &[String] {
        &self.raw_lines
    }

    /// Lines that will be emitted (gutter removed if one was detected).
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn is_terminal_command(&self) -> bool {
        self.is_terminal_command
    }

    pub fn had_line_numbers(&self) -> bool {
        self.had_line_numbers
    }

    pub fn pass(&self) -> ExtractionPass {
        self.pass
    }

    /// Info string for the opening fence. Terminal blocks are always `shell`.
    pub fn fence_tag(&self) -> Option<&str> {
        if self.is_terminal_command {
            Some("shell")
        } else {
            self.language.as_deref()
        }
    }

    /// Render as a fenced block. The fence is longer than any backtick run in the body.
    pub fn to_fenced(&self) -> String {
        let body = self.lines.join("\n");
        let longest_run = body
            .split(|c| c != '`')
            .map(str::len)
            .max()
            .unwrap_or(0);
        let fence = "`".repeat((longest_run + 1).max(3));
        format!("{fence}{}\n{body}\n{fence}", self.fence_tag().unwrap_or(""))
    }

    pub fn summary(&self) -> CodeBlockSummary {
        CodeBlockSummary {
            id: self.id,
            language: self.fence_tag().map(str::to_string),
            is_terminal_command: self.is_terminal_command,
            had_line_numbers: self.had_line_numbers,
            line_count: self.lines.len(),
            pass: self.pass,
        }
    }
}

/// Serializable per-block diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeBlockSummary {
    pub id: usize,
    pub language: Option<String>,
    pub is_terminal_command: bool,
    pub had_line_numbers: bool,
    pub line_count: usize,
    pub pass: ExtractionPass,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Configured code block pipeline. Cheap to share; holds no per-document state.
#[derive(Debug, Clone)]
pub struct CodeBlockPipeline {
    languages: LanguageTable,
    line_number_ratio: f64,
}

impl CodeBlockPipeline {
    pub fn new(languages: LanguageTable, line_number_ratio: f64) -> Self {
        Self {
            languages,
            line_number_ratio,
        }
    }

    /// Build from the `[code_blocks]` config section.
    pub fn from_config(config: &CodeBlocksConfig) -> Result<Self> {
        let languages = LanguageTable::with_overrides(&config.language_aliases)?;
        Ok(Self::new(languages, config.line_number_ratio))
    }

    pub fn languages(&self) -> &LanguageTable {
        &self.languages
    }

    pub fn line_number_ratio(&self) -> f64 {
        self.line_number_ratio
    }

    /// Find every code block in `html` and replace it with a placeholder token.
    pub fn prepare(&self, html: &str) -> PreparedDocument {
        self.prepare_with(html, PlaceholderScheme::for_document(html))
    }

    /// Like [`prepare`](Self::prepare) with a caller-chosen namespace.
    pub fn prepare_with(&self, html: &str, scheme: PlaceholderScheme) -> PreparedDocument {
        let extracted = extract::extract_blocks(html, self, &scheme);
        debug!(blocks = extracted.blocks.len(), "code blocks extracted");
        PreparedDocument {
            html: extracted.html,
            blocks: extracted.blocks,
            scheme,
        }
    }

    /// Recover code fragments the converter left outside fences.
    pub fn repair(&self, markdown: &str) -> String {
        repair::repair_fragments(markdown, self.line_number_ratio)
    }
}

impl Default for CodeBlockPipeline {
    fn default() -> Self {
        Self::new(
            LanguageTable::builtin(),
            CodeBlocksConfig::default().line_number_ratio,
        )
    }
}

// ---------------------------------------------------------------------------
// Prepared document
// ---------------------------------------------------------------------------

/// HTML with code lifted out, plus the blocks waiting to be reinserted.
#[derive(Debug)]
pub struct PreparedDocument {
    html: String,
    blocks: Vec<CodeBlock>,
    scheme: PlaceholderScheme,
}

impl PreparedDocument {
    /// The HTML to hand to the converter.
    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn blocks(&self) -> &[CodeBlock] {
        &self.blocks
    }

    pub fn scheme(&self) -> &PlaceholderScheme {
        &self.scheme
    }

    pub fn summaries(&self) -> Vec<CodeBlockSummary> {
        self.blocks.iter().map(CodeBlock::summary).collect()
    }

    /// Replace every placeholder in `markdown` with its fenced block.
    ///
    /// Each token must appear exactly once. A missing, duplicated, or unknown
    /// token, or any other trace of the namespace, is an error.
    pub fn reinsert(self, markdown: &str) -> Result<String> {
        let found = self.scheme.find_tokens(PlaceholderKind::Code, markdown);

        let mut counts = vec![0usize; self.blocks.len()];
        for m in &found {
            match counts.get_mut(m.id) {
                Some(count) => *count += 1,
                None => {
                    let occurrences = found.iter().filter(|o| o.id == m.id).count();
                    return Err(MarkdownizerError::PlaceholderMismatch {
                        id: m.id,
                        occurrences,
                    });
                }
            }
        }
        if let Some((id, &occurrences)) = counts.iter().enumerate().find(|(_, c)| **c != 1) {
            warn!(id, occurrences, "placeholder did not survive conversion intact");
            return Err(MarkdownizerError::PlaceholderMismatch { id, occurrences });
        }

        let mut out = String::with_capacity(markdown.len() + self.blocks.len() * 64);
        let mut cursor = 0;
        for m in &found {
            out.push_str(&markdown[cursor..m.start]);
            open_block(&mut out);
            out.push_str(&self.blocks[m.id].to_fenced());
            close_block(&mut out, &markdown[m.end..]);
            cursor = m.end;
        }
        out.push_str(&markdown[cursor..]);

        if self.scheme.leaks_into(&out) {
            return Err(MarkdownizerError::Conversion(
                "converter mangled a code placeholder".into(),
            ));
        }

        Ok(out)
    }
}

/// Make sure a fence starts on its own line after a blank line.
fn open_block(out: &mut String) {
    if out.is_empty() || out.ends_with("\n\n") {
        return;
    }
    if out.ends_with('\n') {
        out.push('\n');
    } else {
        out.push_str("\n\n");
    }
}

/// Make sure whatever follows a fence starts after a blank line.
fn close_block(out: &mut String, rest: &str) {
    if rest.is_empty() || rest.starts_with("\n\n") {
        return;
    }
    if rest.starts_with('\n') {
        out.push('\n');
    } else {
        out.push_str("\n\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> CodeBlockPipeline {
        CodeBlockPipeline::default()
    }

    fn scheme() -> PlaceholderScheme {
        PlaceholderScheme::with_nonce("t3st")
    }

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn block_strips_gutter_and_renders_fence() {
        let block = CodeBlock::detect(
            0,
            lines(&["1from x import y", "2", "3def f():"]),
            Some("python".into()),
            false,
            0.7,
            ExtractionPass::Semantic,
        );
        assert!(block.had_line_numbers());
        assert_eq!(block.lines(), &["from x import y", "", "def f():"]);
        assert_eq!(block.raw_lines()[0], "1from x import y");
        assert_eq!(block.to_fenced(), "```python\nfrom x import y\n\ndef f():\n```");
    }

    #[test]
    fn terminal_blocks_render_as_shell() {
        let block = CodeBlock::detect(
            0,
            lines(&["$ cargo build", "$ cargo test"]),
            Some("bash".into()),
            false,
            0.7,
            ExtractionPass::Semantic,
        );
        assert!(block.is_terminal_command());
        assert!(block.to_fenced().starts_with("```shell\n"));
    }

    #[test]
    fn fence_outgrows_backticks_in_body() {
        let block = CodeBlock::detect(
            0,
            lines(&["echo ````"]),
            None,
            false,
            0.7,
            ExtractionPass::Semantic,
        );
        assert_eq!(block.to_fenced(), "`````\necho ````\n`````");
    }

    #[test]
    fn reinserts_in_place_with_blank_lines() {
        let html = r#"<p>Intro</p><pre><code class="language-js">let a = 1;</code></pre><p>Outro</p>"#;
        let prepared = pipeline().prepare_with(html, scheme());
        assert_eq!(prepared.blocks().len(), 1);
        let token = prepared.scheme().token(PlaceholderKind::Code, 0);
        assert!(prepared.html().contains(&token));
        assert!(!prepared.html().contains("let a = 1"));

        let md = format!("Intro\n\n{token}\n\nOutro");
        let out = prepared.reinsert(&md).expect("reinsert");
        assert_eq!(out, "Intro\n\n```javascript\nlet a = 1;\n```\n\nOutro");
    }

    #[test]
    fn inline_token_is_split_into_its_own_block() {
        let html = "<pre>x = 1</pre>";
        let prepared = pipeline().prepare_with(html, scheme());
        let token = prepared.scheme().token(PlaceholderKind::Code, 0);
        let out = prepared.reinsert(&format!("see {token} here")).expect("reinsert");
        assert_eq!(out, "see \n\n```\nx = 1\n```\n\n here");
    }

    #[test]
    fn missing_token_is_an_error() {
        let prepared = pipeline().prepare_with("<pre>x = 1</pre>", scheme());
        let err = prepared.reinsert("nothing here").unwrap_err();
        assert!(matches!(
            err,
            MarkdownizerError::PlaceholderMismatch { id: 0, occurrences: 0 }
        ));
    }

    #[test]
    fn duplicated_token_is_an_error() {
        let prepared = pipeline().prepare_with("<pre>x = 1</pre>", scheme());
        let token = prepared.scheme().token(PlaceholderKind::Code, 0);
        let err = prepared.reinsert(&format!("{token}\n{token}")).unwrap_err();
        assert!(matches!(
            err,
            MarkdownizerError::PlaceholderMismatch { id: 0, occurrences: 2 }
        ));
    }

    #[test]
    fn unknown_token_is_an_error() {
        let prepared = pipeline().prepare_with("<p>no code</p>", scheme());
        let stray = prepared.scheme().token(PlaceholderKind::Code, 3);
        let err = prepared.reinsert(&stray).unwrap_err();
        assert!(matches!(
            err,
            MarkdownizerError::PlaceholderMismatch { id: 3, occurrences: 1 }
        ));
    }

    #[test]
    fn mangled_token_is_an_error() {
        let prepared = pipeline().prepare_with("<p>no code</p>", scheme());
        let err = prepared.reinsert("oops MDZCODEt3stN0").unwrap_err();
        assert!(matches!(err, MarkdownizerError::Conversion(_)));
    }

    #[test]
    fn from_config_rejects_bad_alias() {
        let mut config = CodeBlocksConfig::default();
        config
            .language_aliases
            .insert("x".into(), "bad tag".into());
        let err = CodeBlockPipeline::from_config(&config).unwrap_err();
        assert!(matches!(err, MarkdownizerError::LanguageTable { .. }));
    }
}
