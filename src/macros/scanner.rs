//! Whitespace tokenizer shared by macro expansion and query parsing

/// Byte span of one whitespace-delimited token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token {
    pub start: usize,
    pub end: usize,
    /// Token contains a double-quoted section
    pub quoted: bool,
    /// A quote opened inside the token was never closed
    pub unterminated: bool,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

/// Split `text` on whitespace, keeping quoted sections (which may contain
/// whitespace) inside a single token.
pub(crate) fn tokens(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current: Option<Token> = None;
    let mut in_quote = false;

    for (index, ch) in text.char_indices() {
        if ch.is_whitespace() && !in_quote {
            if let Some(token) = current.take() {
                tokens.push(token);
            }
            continue;
        }

        let token = current.get_or_insert(Token {
            start: index,
            end: index,
            quoted: false,
            unterminated: false,
        });
        token.end = index + ch.len_utf8();

        if ch == '"' {
            token.quoted = true;
            in_quote = !in_quote;
        }
    }

    if let Some(mut token) = current {
        token.unterminated = in_quote;
        tokens.push(token);
    }

    tokens
}
