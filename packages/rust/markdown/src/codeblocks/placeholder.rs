//! Opaque placeholder tokens that survive HTML-to-Markdown conversion.
//!
//! A token is `MDZ<KIND><nonce>N<id>E`. The nonce is lower-case hex and is
//! chosen per document so a token can never collide with page text.

use uuid::Uuid;

/// What a placeholder stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    Code,
    Table,
}

impl PlaceholderKind {
    fn tag(self) -> &'static str {
        match self {
            Self::Code => "CODE",
            Self::Table => "TABLE",
        }
    }
}

/// One token occurrence found in converted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenMatch {
    pub start: usize,
    pub end: usize,
    pub id: usize,
}

/// Per-document placeholder namespace.
#[derive(Debug, Clone)]
pub struct PlaceholderScheme {
    nonce: String,
}

impl PlaceholderScheme {
    /// Fresh random namespace.
    pub fn new() -> Self {
        Self {
            nonce: Uuid::now_v7().simple().to_string(),
        }
    }

    /// Fixed namespace. Characters other than lower-case ASCII letters and digits are dropped.
    pub fn with_nonce(nonce: &str) -> Self {
        let nonce: String = nonce
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            .collect();
        Self { nonce }
    }

    /// A namespace guaranteed not to appear in `text`.
    pub fn for_document(text: &str) -> Self {
        loop {
            let scheme = Self::new();
            if !text.contains(&scheme.nonce) {
                return scheme;
            }
        }
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    fn prefix(&self, kind: PlaceholderKind) -> String {
        format!("MDZ{}{}N", kind.tag(), self.nonce)
    }

    /// The token for block `id`.
    pub fn token(&self, kind: PlaceholderKind, id: usize) -> String {
        format!("{}{id}E", self.prefix(kind))
    }

    /// Every well-formed token of `kind` in `text`, in order.
    pub fn find_tokens(&self, kind: PlaceholderKind, text: &str) -> Vec<TokenMatch> {
        let prefix = self.prefix(kind);
        let mut found = Vec::new();
        for (start, _) in text.match_indices(&prefix) {
            let rest = &text[start + prefix.len()..];
            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            if digits == 0 || rest.as_bytes().get(digits) != Some(&b'E') {
                continue;
            }
            if let Ok(id) = rest[..digits].parse::<usize>() {
                found.push(TokenMatch {
                    start,
                    end: start + prefix.len() + digits + 1,
                    id,
                });
            }
        }
        found
    }

    /// `true` if any trace of this namespace remains in `text`.
    pub fn leaks_into(&self, text: &str) -> bool {
        !self.nonce.is_empty() && text.contains(&self.nonce)
    }
}

impl Default for PlaceholderScheme {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_found_with_positions() {
        let scheme = PlaceholderScheme::with_nonce("abc123");
        let t0 = scheme.token(PlaceholderKind::Code, 0);
        let t12 = scheme.token(PlaceholderKind::Code, 12);
        let text = format!("intro {t0} middle {t12}.");
        let found = scheme.find_tokens(PlaceholderKind::Code, &text);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, 0);
        assert_eq!(&text[found[0].start..found[0].end], t0);
        assert_eq!(found[1].id, 12);
    }

    #[test]
    fn kinds_do_not_overlap() {
        let scheme = PlaceholderScheme::with_nonce("n1");
        let text = scheme.token(PlaceholderKind::Table, 0);
        assert!(scheme.find_tokens(PlaceholderKind::Code, &text).is_empty());
        assert_eq!(scheme.find_tokens(PlaceholderKind::Table, &text).len(), 1);
    }

    #[test]
    fn mangled_token_is_not_matched_but_leaks() {
        let scheme = PlaceholderScheme::with_nonce("n1");
        let text = "MDZCODEn1N7 and more";
        assert!(scheme.find_tokens(PlaceholderKind::Code, text).is_empty());
        assert!(scheme.leaks_into(text));
    }

    #[test]
    fn fresh_nonce_avoids_document_text() {
        let scheme = PlaceholderScheme::for_document("plain text");
        assert_eq!(scheme.nonce().len(), 32);
        assert!(!"plain text".contains(scheme.nonce()));
    }
}
