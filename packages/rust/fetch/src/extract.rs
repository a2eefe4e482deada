//! Server-side generic content extraction.
//!
//! Readability-style heuristics: take the first content container that has
//! text, fall back to `<body>`, and strip navigation chrome. Code containers
//! are never stripped, even when they sit inside chrome.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use markdownizer_reconcile::{ContentExtractor, FetchedPage};
use markdownizer_shared::{
    Candidate, CandidateSource, ExtractionMethod, MarkdownizerError, Result, redact_tokens,
};

/// Content containers, most specific first.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    r#"[role="main"]"#,
    ".post-content",
    ".entry-content",
    ".article-body",
    ".content",
    "#content",
];

/// Elements that are page chrome rather than content.
const CHROME_SELECTOR: &str = "nav, header, footer, aside, script, style, noscript, form, \
     iframe, button, .sidebar, .nav, .menu, .cookie-banner, [role=\"navigation\"]";

/// Extracts the main content of a fetched page.
#[derive(Debug, Clone, Default)]
pub struct ReadabilityExtractor;

impl ReadabilityExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl ContentExtractor for ReadabilityExtractor {
    fn extract(&self, page: &FetchedPage) -> Result<Candidate> {
        let doc = Html::parse_document(&page.html);

        let (container, confidence) = match main_container(&doc) {
            Some((el, selector)) => {
                debug!(selector, "content container found");
                (el.inner_html(), 0.8)
            }
            None => {
                static BODY: LazyLock<Selector> =
                    LazyLock::new(|| Selector::parse("body").expect("valid selector"));
                let body = doc
                    .select(&BODY)
                    .next()
                    .map(|b| b.inner_html())
                    .unwrap_or_default();
                (body, 0.5)
            }
        };

        let html = strip_chrome(&container);
        let text = visible_text(&html);
        if text.is_empty() {
            return Err(MarkdownizerError::Extraction(format!(
                "no readable content at {}",
                redact_tokens(&page.final_url)
            )));
        }

        Ok(Candidate::new(
            CandidateSource::ServerFetched,
            page_title(&doc),
            html,
            text,
            ExtractionMethod::ServerGeneric,
        )
        .with_confidence(confidence))
    }
}

/// The first container from [`CONTENT_SELECTORS`] that has any text.
fn main_container(doc: &Html) -> Option<(ElementRef<'_>, &'static str)> {
    CONTENT_SELECTORS.iter().find_map(|&sel_str| {
        let sel = Selector::parse(sel_str).ok()?;
        doc.select(&sel)
            .find(|el| el.text().any(|t| !t.trim().is_empty()))
            .map(|el| (el, sel_str))
    })
}

/// Remove chrome elements, keeping anything that is or holds code.
fn strip_chrome(html: &str) -> String {
    static CHROME: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse(CHROME_SELECTOR).expect("valid selector"));
    static CODE: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("pre, code").expect("valid selector"));

    let mut doc = Html::parse_fragment(html);
    let doomed: Vec<_> = doc
        .select(&CHROME)
        .filter(|el| !is_code_related(*el, &CODE))
        .map(|el| el.id())
        .collect();

    for id in doomed {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
    doc.root_element().inner_html()
}

fn is_code_related(el: ElementRef<'_>, code: &Selector) -> bool {
    let inside_code = el
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| matches!(a.value().name(), "pre" | "code"));
    inside_code || el.select(code).next().is_some()
}

/// Markup-stripped text, whitespace-collapsed.
fn visible_text(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let joined = doc.root_element().text().collect::<Vec<_>>().join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `og:title`, then the first `<h1>`, then `<title>`.
fn page_title(doc: &Html) -> String {
    static OG_TITLE: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(r#"meta[property="og:title"]"#).expect("valid selector")
    });
    static H1: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("h1").expect("valid selector"));
    static TITLE: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("title").expect("valid selector"));

    let clean = |s: String| s.split_whitespace().collect::<Vec<_>>().join(" ");

    doc.select(&OG_TITLE)
        .filter_map(|m| m.value().attr("content"))
        .map(|c| clean(c.to_string()))
        .chain(doc.select(&H1).map(|h| clean(h.text().collect())))
        .chain(doc.select(&TITLE).map(|t| clean(t.text().collect())))
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(html: &str) -> FetchedPage {
        FetchedPage {
            final_url: "https://example.com/post".into(),
            status: 200,
            html: html.into(),
        }
    }

    fn extract(html: &str) -> Result<Candidate> {
        ReadabilityExtractor::new().extract(&page(html))
    }

    #[test]
    fn prefers_article_and_strips_chrome() {
        let html = r#"<html><head><title>Site | Post</title></head><body>
            <nav><a href="/">Home</a></nav>
            <article>
              <h1>The Post</h1>
              <aside>Related links</aside>
              <p>Body text here.</p>
              <script>track()</script>
            </article>
            <footer>(c) Site</footer>
        </body></html>"#;
        let c = extract(html).unwrap();

        assert_eq!(c.source(), CandidateSource::ServerFetched);
        assert_eq!(c.extraction_method(), ExtractionMethod::ServerGeneric);
        assert_eq!(c.title(), "The Post");
        assert_eq!(c.plain_text(), "The Post Body text here.");
        assert!(!c.html_body().contains("Related links"));
        assert!(!c.html_body().contains("track()"));
        assert_eq!(c.confidence(), 0.8);
    }

    #[test]
    fn falls_back_to_body() {
        let html = "<html><body><header>Logo</header><div><p>Just a div.</p></div></body></html>";
        let c = extract(html).unwrap();
        assert_eq!(c.plain_text(), "Just a div.");
        assert_eq!(c.confidence(), 0.5);
    }

    #[test]
    fn skips_empty_main_shell() {
        let html = r#"<body><main></main><div class="content"><p>Real text</p></div></body>"#;
        let c = extract(html).unwrap();
        assert_eq!(c.plain_text(), "Real text");
    }

    #[test]
    fn keeps_code_inside_chrome() {
        let html = r#"<article>
            <p>Install it:</p>
            <aside class="tip"><pre><code>cargo install markdownizer</code></pre></aside>
        </article>"#;
        let c = extract(html).unwrap();
        assert!(c.html_body().contains("cargo install markdownizer"));
    }

    #[test]
    fn og_title_wins() {
        let html = r#"<html><head>
            <meta property="og:title" content="Open Graph Title">
            <title>Doc Title</title>
        </head><body><article><h1>Heading</h1><p>x</p></article></body></html>"#;
        assert_eq!(extract(html).unwrap().title(), "Open Graph Title");
    }

    #[test]
    fn chrome_only_page_fails() {
        let html = "<html><body><nav>Menu</nav><footer>Footer</footer></body></html>";
        let err = extract(html).unwrap_err();
        assert!(matches!(err, MarkdownizerError::Extraction(_)));
    }

    #[test]
    fn empty_page_fails() {
        assert!(extract("").is_err());
    }
}
