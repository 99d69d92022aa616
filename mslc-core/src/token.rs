//! Tokens handed to the parser.
//!
//! The preprocessor owns lexing proper (comments, macros, includes); the
//! compiler core only consumes its token stream. [`TokenList`] interns file
//! names so tokens can reference their origin without per-token allocation.
use std::fmt;

/// Lexical class of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Whitespace,
    Newline,
    Identifier,
    IntLit,
    FloatLit,
    StringLit,
    Symbol,
}

/// Interned file name handle. Valid only for the [`TokenList`] it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u32);

/// One preprocessed token with its source origin. Lines and columns are
/// 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub kind: TokenKind,
    pub file: FileId,
    pub line: u32,
    pub column: u32,
}

impl Token {
    pub fn is_whitespace(&self) -> bool {
        self.kind == TokenKind::Whitespace || self.kind == TokenKind::Newline
    }
}

/// Token storage plus the file name intern table.
#[derive(Debug, Default, Clone)]
pub struct TokenList {
    files: Vec<String>,
    tokens: Vec<Token>,
}

impl TokenList {
    pub fn new() -> TokenList {
        Default::default()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn file_name(&self, file: FileId) -> &str {
        &self.files[file.0 as usize]
    }

    /// File name of a token, for diagnostics.
    pub fn token_file(&self, token: &Token) -> &str {
        self.file_name(token.file)
    }

    pub fn intern_file(&mut self, name: &str) -> FileId {
        if let Some(idx) = self.files.iter().position(|x| x == name) {
            return FileId(idx as u32);
        }
        self.files.push(name.to_owned());
        FileId(self.files.len() as u32 - 1)
    }

    pub fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    /// Append tokens lexed from already-preprocessed source text.
    ///
    /// This is a minimal splitter for text that contains no comments or
    /// preprocessor directives; the real toolchain feeds tokens from the
    /// external preprocessor instead. Brackets and other punctuation are
    /// emitted one character at a time, which is what the element scanner
    /// expects for `[[`/`]]` stage filters.
    pub fn append_source(&mut self, file_name: &str, source: &str) {
        let file = self.intern_file(file_name);
        let mut line = 1u32;
        let mut column = 1u32;
        let mut chars = source.char_indices().peekable();
        while let Some(&(start, c)) = chars.peek() {
            let (kind, len) = if c == '\n' {
                (TokenKind::Newline, 1)
            } else if c.is_whitespace() {
                (TokenKind::Whitespace, run_len(source, start, |x| x != '\n' && x.is_whitespace()))
            } else if c == '_' || c.is_ascii_alphabetic() {
                (
                    TokenKind::Identifier,
                    run_len(source, start, |x| x == '_' || x.is_ascii_alphanumeric()),
                )
            } else if c.is_ascii_digit() {
                number_len(&source[start..])
            } else if c == '"' {
                (TokenKind::StringLit, string_len(&source[start..]))
            } else {
                (TokenKind::Symbol, c.len_utf8())
            };

            let value = &source[start..start + len];
            self.tokens.push(Token {
                value: value.to_owned(),
                kind,
                file,
                line,
                column,
            });
            if kind == TokenKind::Newline {
                line += 1;
                column = 1;
            } else {
                column += value.chars().count() as u32;
            }
            for _ in 0..value.chars().count() {
                chars.next();
            }
        }
    }
}

fn run_len(source: &str, start: usize, pred: impl Fn(char) -> bool) -> usize {
    source[start..]
        .char_indices()
        .find(|&(_, c)| !pred(c))
        .map(|(i, _)| i)
        .unwrap_or(source.len() - start)
}

/// Length and kind of a numeric literal at the start of `s`. Handles decimal,
/// octal, and hex integers plus floats with a fraction and/or exponent.
fn number_len(s: &str) -> (TokenKind, usize) {
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut kind = TokenKind::IntLit;
    if bytes.len() > 1 && bytes[0] == b'0' && (bytes[1] == b'x' || bytes[1] == b'X') {
        i = 2;
        while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
            i += 1;
        }
        return (kind, i);
    }
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        kind = TokenKind::FloatLit;
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            kind = TokenKind::FloatLit;
            i = j;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
    }
    (kind, i)
}

fn string_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    i
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.value)
    }
}
