//! Language hint detection and alias normalization for fenced code blocks.
//!
//! Hints come only from markup (class tokens and `data-lang` attributes).
//! Content is never sniffed: a block without a hint renders untagged.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use markdownizer_shared::{MarkdownizerError, Result};

/// Built-in `(canonical, aliases)` table.
const BUILTIN_ALIASES: &[(&str, &[&str])] = &[
    // Scripting
    ("python", &["py", "py3", "python3", "pyw", "ipython"]),
    ("javascript", &["js", "jsx", "mjs", "cjs", "node", "nodejs", "ecmascript"]),
    ("typescript", &["ts", "tsx", "mts", "cts"]),
    ("ruby", &["rb", "gemspec", "rake"]),
    ("php", &["php3", "php4", "php5", "php7", "php8"]),
    ("perl", &["pl", "pm"]),
    ("lua", &[]),
    ("r", &["rlang", "rscript"]),
    ("julia", &["jl"]),
    ("elixir", &["ex", "exs"]),
    ("erlang", &["erl"]),
    ("clojure", &["clj", "cljs", "edn"]),
    ("shell", &["sh", "bash", "zsh", "ksh", "fish", "shellscript", "shell-session", "console", "terminal"]),
    ("powershell", &["ps", "ps1", "pwsh", "psm1"]),
    ("batch", &["bat", "cmd", "dos"]),
    // Systems and compiled
    ("rust", &["rs"]),
    ("go", &["golang"]),
    ("c", &["h"]),
    ("cpp", &["c++", "cc", "cxx", "hpp", "hh", "hxx"]),
    ("csharp", &["cs", "c#", "dotnet"]),
    ("java", &[]),
    ("kotlin", &["kt", "kts"]),
    ("scala", &["sc"]),
    ("swift", &[]),
    ("objectivec", &["objc", "objective-c", "obj-c", "mm"]),
    ("zig", &[]),
    ("haskell", &["hs"]),
    ("ocaml", &["ml"]),
    ("fsharp", &["fs", "f#"]),
    ("dart", &[]),
    ("solidity", &["sol"]),
    ("wasm", &["wat", "webassembly"]),
    // Data and markup
    ("html", &["xhtml", "htm", "html5", "vue", "svelte"]),
    ("xml", &["rss", "atom", "xsl", "xsd", "plist", "svg"]),
    ("css", &[]),
    ("scss", &[]),
    ("sass", &[]),
    ("less", &[]),
    ("json", &["jsonc", "json5", "geojson"]),
    ("yaml", &["yml"]),
    ("toml", &[]),
    ("ini", &["cfg", "conf", "properties", "editorconfig"]),
    ("markdown", &["md", "mdx", "mkd"]),
    ("latex", &["tex"]),
    ("sql", &["mysql", "postgres", "postgresql", "psql", "sqlite", "plsql", "tsql"]),
    ("graphql", &["gql"]),
    ("protobuf", &["proto"]),
    ("dockerfile", &["docker", "containerfile"]),
    ("makefile", &["make", "mk", "mf"]),
    ("nginx", &["nginxconf"]),
    ("diff", &["patch", "udiff"]),
    ("hcl", &["terraform", "tf"]),
    ("nix", &[]),
    ("cmake", &[]),
    ("groovy", &["gradle"]),
];

/// Class tokens that explicitly say "this block has no language".
const NO_LANGUAGE: &[&str] = &[
    "text",
    "txt",
    "plain",
    "plaintext",
    "none",
    "nohighlight",
    "no-highlight",
    "output",
];

/// Prefixes that introduce an explicit language in a class token.
const EXPLICIT_PREFIXES: &[&str] = &["language-", "lang-", "highlight-source-"];

/// Prefixes used by highlighters that only count when the suffix is a known alias.
const HIGHLIGHTER_PREFIXES: &[&str] = &["highlight-", "hljs-", "prism-", "brush-", "syntax-"];

/// Alias table mapping lower-case aliases to canonical fence tags.
#[derive(Debug, Clone)]
pub struct LanguageTable {
    aliases: HashMap<String, String>,
}

impl LanguageTable {
    /// The built-in table.
    pub fn builtin() -> Self {
        let mut aliases = HashMap::new();
        for (canonical, alts) in BUILTIN_ALIASES {
            aliases.insert((*canonical).to_string(), (*canonical).to_string());
            for alt in *alts {
                aliases.insert((*alt).to_string(), (*canonical).to_string());
            }
        }
        Self { aliases }
    }

    /// The built-in table with extra entries layered on top.
    ///
    /// Fails when an alias or canonical name could not be written on a fence line.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self> {
        let mut table = Self::builtin();
        for (alias, canonical) in overrides {
            let alias = alias.trim().to_ascii_lowercase();
            let canonical = canonical.trim().to_ascii_lowercase();
            if alias.is_empty() || alias.chars().any(char::is_whitespace) {
                return Err(MarkdownizerError::language_table(format!(
                    "alias {alias:?} must be a single non-empty token"
                )));
            }
            if !is_valid_fence_tag(&canonical) {
                return Err(MarkdownizerError::language_table(format!(
                    "canonical name {canonical:?} for alias {alias:?} is not a valid fence tag"
                )));
            }
            table.aliases.insert(canonical.clone(), canonical.clone());
            table.aliases.insert(alias, canonical);
        }
        Ok(table)
    }

    /// Canonical name for an alias, if known.
    pub fn canonical(&self, alias: &str) -> Option<&str> {
        self.aliases
            .get(&alias.trim().to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Number of aliases (canonical names included).
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Resolve one class token to a language.
    ///
    /// `Some(None)` means the token explicitly disables highlighting;
    /// `None` means the token carries no language information.
    fn resolve_token(&self, token: &str) -> Option<Option<String>> {
        let token = token.trim().to_ascii_lowercase();
        if token.is_empty() {
            return None;
        }

        for prefix in EXPLICIT_PREFIXES {
            if let Some(rest) = token.strip_prefix(prefix) {
                if NO_LANGUAGE.contains(&rest) {
                    return Some(None);
                }
                if let Some(canonical) = self.canonical(rest) {
                    return Some(Some(canonical.to_string()));
                }
                // An explicit but unknown language is still the author's choice.
                return is_valid_fence_tag(rest).then(|| Some(rest.to_string()));
            }
        }

        for prefix in HIGHLIGHTER_PREFIXES {
            if let Some(rest) = token.strip_prefix(prefix) {
                if let Some(canonical) = self.canonical(rest) {
                    return Some(Some(canonical.to_string()));
                }
            }
        }

        if NO_LANGUAGE.contains(&token.as_str()) {
            return Some(None);
        }

        self.canonical(&token).map(|c| Some(c.to_string()))
    }

    /// Detect a language from an element's class attribute and `data-lang`-style attribute.
    ///
    /// Explicit tokens win over bare aliases; the first explicit token wins.
    pub fn detect(&self, class_attr: Option<&str>, data_lang: Option<&str>) -> Option<String> {
        self.detect_tokens(class_attr, data_lang, true)
    }

    /// Like [`detect`](Self::detect), but bare alias tokens are ignored.
    ///
    /// For wrapper elements, whose classes are often layout names such as `md` or `node`.
    pub fn detect_prefixed(&self, class_attr: Option<&str>, data_lang: Option<&str>) -> Option<String> {
        self.detect_tokens(class_attr, data_lang, false)
    }

    fn detect_tokens(
        &self,
        class_attr: Option<&str>,
        data_lang: Option<&str>,
        allow_bare: bool,
    ) -> Option<String> {
        if let Some(lang) = data_lang.map(str::trim).filter(|l| !l.is_empty()) {
            return self.resolve_token(&format!("language-{lang}")).flatten();
        }

        let class_attr = class_attr?;

        // SyntaxHighlighter style: class="brush: js; gutter: false"
        static BRUSH_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"(?i)brush:\s*([\w#+-]+)").expect("valid regex"));
        if let Some(caps) = BRUSH_RE.captures(class_attr) {
            if let Some(canonical) = self.canonical(&caps[1]) {
                return Some(canonical.to_string());
            }
        }

        let tokens: Vec<&str> = class_attr.split_whitespace().collect();

        // First pass: explicit prefixes only.
        for token in &tokens {
            let lower = token.to_ascii_lowercase();
            if EXPLICIT_PREFIXES.iter().any(|p| lower.starts_with(p)) {
                if let Some(resolved) = self.resolve_token(token) {
                    return resolved;
                }
            }
        }

        // Second pass: highlighter prefixes and bare aliases.
        tokens
            .iter()
            .filter(|token| {
                allow_bare || {
                    let lower = token.to_ascii_lowercase();
                    HIGHLIGHTER_PREFIXES.iter().any(|p| lower.starts_with(p))
                }
            })
            .filter_map(|token| self.resolve_token(token))
            .next()
            .flatten()
    }
}

impl Default for LanguageTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// `true` if `tag` can sit on an opening fence line unchanged.
pub fn is_valid_fence_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.len() <= 32
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '#' | '-' | '_' | '.'))
}
