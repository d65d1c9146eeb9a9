// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tokenizer for HCL native syntax.
//!
//! Quoted strings and heredocs are lexed eagerly into [`TemplatePart`]s:
//! literal chunks (with escapes already processed) and interpolation
//! sequences, each holding the tokens of the embedded expression.

use crate::diagnostics::{Diagnostic, Diagnostics, Pos, Range};

/// A lexed token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// What the token is.
    pub kind: TokenKind,
    /// Where it is.
    pub range: Range,
}

/// Kinds of tokens.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum TokenKind {
    Ident(String),
    Number(f64),
    /// A quoted string or heredoc.
    Template(Vec<TemplatePart>),
    OBrace,
    CBrace,
    OBrack,
    CBrack,
    OParen,
    CParen,
    Comma,
    Dot,
    Colon,
    DoubleColon,
    Question,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    And,
    Or,
    Bang,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    FatArrow,
    Ellipsis,
    Newline,
    Eof,
}

impl TokenKind {
    /// A short description for "expected X" style errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier {:?}", name),
            TokenKind::Number(_) => "number".to_string(),
            TokenKind::Template(_) => "string".to_string(),
            TokenKind::Newline => "newline".to_string(),
            TokenKind::Eof => "end of file".to_string(),
            other => format!("{:?}", other_symbol(other)),
        }
    }
}

fn other_symbol(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::OBrace => "{",
        TokenKind::CBrace => "}",
        TokenKind::OBrack => "[",
        TokenKind::CBrack => "]",
        TokenKind::OParen => "(",
        TokenKind::CParen => ")",
        TokenKind::Comma => ",",
        TokenKind::Dot => ".",
        TokenKind::Colon => ":",
        TokenKind::DoubleColon => "::",
        TokenKind::Question => "?",
        TokenKind::Assign => "=",
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Star => "*",
        TokenKind::Slash => "/",
        TokenKind::Percent => "%",
        TokenKind::And => "&&",
        TokenKind::Or => "||",
        TokenKind::Bang => "!",
        TokenKind::Equal => "==",
        TokenKind::NotEqual => "!=",
        TokenKind::Less => "<",
        TokenKind::LessEqual => "<=",
        TokenKind::Greater => ">",
        TokenKind::GreaterEqual => ">=",
        TokenKind::FatArrow => "=>",
        TokenKind::Ellipsis => "...",
        _ => "?",
    }
}

/// A piece of a quoted string or heredoc.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text with escapes processed.
    Literal(String, Range),
    /// An `${ ... }` interpolation, holding the tokens of its expression
    /// terminated by an [`TokenKind::Eof`] token.
    Interp(Vec<Token>, Range),
}

/// Lexes `src` into tokens. The token stream always ends with [`TokenKind::Eof`].
pub fn lex(src: &str, filename: &str) -> (Vec<Token>, Diagnostics) {
    let mut lexer = Lexer {
        src,
        chars: src.char_indices().collect(),
        idx: 0,
        line: 1,
        column: 1,
        filename,
        diags: Diagnostics::new(),
    };
    let mut tokens = Vec::new();
    loop {
        let tok = lexer.next_token();
        let done = tok.kind == TokenKind::Eof;
        tokens.push(tok);
        if done {
            break;
        }
    }
    (tokens, lexer.diags)
}

struct Lexer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    idx: usize,
    line: usize,
    column: usize,
    filename: &'a str,
    diags: Diagnostics,
}

impl<'a> Lexer<'a> {
    fn pos(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
            byte: self.byte_at(self.idx),
        }
    }

    fn byte_at(&self, idx: usize) -> usize {
        self.chars
            .get(idx)
            .map(|(b, _)| *b)
            .unwrap_or(self.src.len())
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).map(|(_, c)| *c)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.idx + offset).map(|(_, c)| *c)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.byte_at(self.idx)..].starts_with(s)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.idx += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    fn range_from(&self, start: Pos) -> Range {
        Range::new(self.filename, start, self.pos())
    }

    fn error(&mut self, summary: &str, detail: String, range: Range) {
        self.diags
            .push(Diagnostic::error(summary, detail).with_subject(&range));
    }

    fn skip_space_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.bump();
                }
                Some('#') => self.skip_line_comment(),
                Some('/') if self.peek_at(1) == Some('/') => self.skip_line_comment(),
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.pos();
                    self.bump_n(2);
                    loop {
                        if self.peek().is_none() {
                            let range = self.range_from(start);
                            self.error(
                                "Unterminated block comment",
                                "There is no closing marker for this block comment.".to_string(),
                                range,
                            );
                            break;
                        }
                        if self.starts_with("*/") {
                            self.bump_n(2);
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn next_token(&mut self) -> Token {
        self.skip_space_and_comments();
        let start = self.pos();
        let Some(c) = self.peek() else {
            return Token {
                kind: TokenKind::Eof,
                range: self.range_from(start),
            };
        };

        let kind = match c {
            '\n' => {
                self.bump();
                TokenKind::Newline
            }
            '"' => {
                self.bump();
                let parts = self.lex_quoted(start);
                TokenKind::Template(parts)
            }
            '<' if self.starts_with("<<") && self.heredoc_follows() => self.lex_heredoc(start),
            c if c.is_ascii_digit() => self.lex_number(),
            c if is_ident_start(c) => {
                let mut name = String::new();
                while let Some(c) = self.peek() {
                    if is_ident_continue(c) {
                        name.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                TokenKind::Ident(name)
            }
            _ => match self.lex_symbol() {
                Some(kind) => kind,
                None => {
                    self.bump();
                    let range = self.range_from(start);
                    self.error(
                        "Invalid character",
                        format!("This character is not used within the language: {:?}.", c),
                        range,
                    );
                    return self.next_token();
                }
            },
        };

        Token {
            kind,
            range: self.range_from(start),
        }
    }

    fn lex_symbol(&mut self) -> Option<TokenKind> {
        const SYMBOLS: &[(&str, TokenKind)] = &[
            ("...", TokenKind::Ellipsis),
            ("&&", TokenKind::And),
            ("||", TokenKind::Or),
            ("==", TokenKind::Equal),
            ("!=", TokenKind::NotEqual),
            ("<=", TokenKind::LessEqual),
            (">=", TokenKind::GreaterEqual),
            ("=>", TokenKind::FatArrow),
            ("::", TokenKind::DoubleColon),
            ("{", TokenKind::OBrace),
            ("}", TokenKind::CBrace),
            ("[", TokenKind::OBrack),
            ("]", TokenKind::CBrack),
            ("(", TokenKind::OParen),
            (")", TokenKind::CParen),
            (",", TokenKind::Comma),
            (".", TokenKind::Dot),
            (":", TokenKind::Colon),
            ("?", TokenKind::Question),
            ("=", TokenKind::Assign),
            ("+", TokenKind::Plus),
            ("-", TokenKind::Minus),
            ("*", TokenKind::Star),
            ("/", TokenKind::Slash),
            ("%", TokenKind::Percent),
            ("!", TokenKind::Bang),
            ("<", TokenKind::Less),
            (">", TokenKind::Greater),
        ];
        for (text, kind) in SYMBOLS {
            if self.starts_with(text) {
                self.bump_n(text.len());
                return Some(kind.clone());
            }
        }
        None
    }

    fn lex_number(&mut self) -> TokenKind {
        let start_byte = self.byte_at(self.idx);
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if matches!(self.peek_at(digit_at), Some(c) if c.is_ascii_digit()) {
                self.bump_n(digit_at);
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        let text = &self.src[start_byte..self.byte_at(self.idx)];
        TokenKind::Number(text.parse().unwrap_or(0.0))
    }

    /// Lexes the body of a quoted string after the opening quote.
    fn lex_quoted(&mut self, open: Pos) -> Vec<TemplatePart> {
        let mut parts = Vec::new();
        let mut lit = String::new();
        let mut lit_start = self.pos();
        loop {
            let Some(c) = self.peek() else {
                let range = self.range_from(open);
                self.error(
                    "Unterminated template string",
                    "No closing marker was found for the string.".to_string(),
                    range,
                );
                break;
            };
            match c {
                '"' => {
                    self.flush_literal(&mut parts, &mut lit, lit_start);
                    self.bump();
                    break;
                }
                '\n' => {
                    let range = self.range_from(open);
                    self.error(
                        "Invalid multi-line string",
                        "Quoted strings may not be split over multiple lines. To produce a multi-line string, either use the \\n escape to represent a newline character or use the \"heredoc\" multi-line template syntax.".to_string(),
                        range,
                    );
                    self.flush_literal(&mut parts, &mut lit, lit_start);
                    break;
                }
                '\\' => {
                    let esc_start = self.pos();
                    self.bump();
                    match self.bump() {
                        Some('n') => lit.push('\n'),
                        Some('r') => lit.push('\r'),
                        Some('t') => lit.push('\t'),
                        Some('"') => lit.push('"'),
                        Some('\\') => lit.push('\\'),
                        Some(u @ ('u' | 'U')) => {
                            let len = if u == 'u' { 4 } else { 8 };
                            let mut hex = String::new();
                            for _ in 0..len {
                                match self.peek() {
                                    Some(h) if h.is_ascii_hexdigit() => {
                                        hex.push(h);
                                        self.bump();
                                    }
                                    _ => break,
                                }
                            }
                            match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                                Some(ch) if hex.len() == len => lit.push(ch),
                                _ => {
                                    let range = self.range_from(esc_start);
                                    self.error(
                                        "Invalid escape sequence",
                                        "The \\u escape sequence requires a valid unicode code point.".to_string(),
                                        range,
                                    );
                                }
                            }
                        }
                        other => {
                            let range = self.range_from(esc_start);
                            self.error(
                                "Invalid escape sequence",
                                format!(
                                    "The symbol {:?} is not a valid escape sequence selector.",
                                    other.unwrap_or(' ')
                                ),
                                range,
                            );
                        }
                    }
                }
                _ => {
                    if self.lex_template_marker(&mut parts, &mut lit, &mut lit_start) {
                        continue;
                    }
                    lit.push(c);
                    self.bump();
                }
            }
        }
        parts
    }

    /// Handles `$${`, `%%{`, `${` and `%{` at the current position. Returns
    /// true if something was consumed.
    fn lex_template_marker(
        &mut self,
        parts: &mut Vec<TemplatePart>,
        lit: &mut String,
        lit_start: &mut Pos,
    ) -> bool {
        if self.starts_with("$${") {
            lit.push_str("${");
            self.bump_n(3);
            return true;
        }
        if self.starts_with("%%{") {
            lit.push_str("%{");
            self.bump_n(3);
            return true;
        }
        if self.starts_with("${") {
            self.flush_literal(parts, lit, *lit_start);
            let start = self.pos();
            self.bump_n(2);
            if self.peek() == Some('~') {
                self.bump();
            }
            let tokens = self.lex_interpolation(start);
            parts.push(TemplatePart::Interp(tokens, self.range_from(start)));
            *lit_start = self.pos();
            return true;
        }
        if self.starts_with("%{") {
            let start = self.pos();
            self.bump_n(2);
            let range = self.range_from(start);
            self.error(
                "Unsupported template directive",
                "Template directives are not supported in enos configuration; use a for expression or conditional inside an interpolation instead.".to_string(),
                range,
            );
            return true;
        }
        false
    }

    fn flush_literal(&self, parts: &mut Vec<TemplatePart>, lit: &mut String, start: Pos) {
        if !lit.is_empty() {
            parts.push(TemplatePart::Literal(
                std::mem::take(lit),
                self.range_from(start),
            ));
        }
    }

    /// Lexes tokens inside `${ ... }` up to and including the matching close brace.
    fn lex_interpolation(&mut self, start: Pos) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut depth = 0usize;
        loop {
            self.skip_space_and_comments();
            if self.peek() == Some('~') && self.peek_at(1) == Some('}') && depth == 0 {
                self.bump();
            }
            let tok = self.next_token();
            match tok.kind {
                TokenKind::OBrace => depth += 1,
                TokenKind::CBrace if depth == 0 => {
                    tokens.push(Token {
                        kind: TokenKind::Eof,
                        range: tok.range,
                    });
                    return tokens;
                }
                TokenKind::CBrace => depth -= 1,
                TokenKind::Eof => {
                    let range = self.range_from(start);
                    self.error(
                        "Unterminated template interpolation",
                        "There is no closing brace for this interpolation sequence.".to_string(),
                        range,
                    );
                    tokens.push(tok);
                    return tokens;
                }
                TokenKind::Newline => continue,
                _ => {}
            }
            tokens.push(tok);
        }
    }

    fn heredoc_follows(&self) -> bool {
        let mut offset = 2;
        if self.peek_at(offset) == Some('-') {
            offset += 1;
        }
        matches!(self.peek_at(offset), Some(c) if is_ident_start(c))
    }

    fn lex_heredoc(&mut self, start: Pos) -> TokenKind {
        self.bump_n(2);
        let strip = if self.peek() == Some('-') {
            self.bump();
            true
        } else {
            false
        };
        let mut marker = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                marker.push(c);
                self.bump();
            } else {
                break;
            }
        }
        while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
            self.bump();
        }
        if self.peek() != Some('\n') {
            let range = self.range_from(start);
            self.error(
                "Invalid heredoc introducer",
                "The heredoc marker must be followed immediately by a newline.".to_string(),
                range,
            );
            return TokenKind::Template(Vec::new());
        }
        self.bump();

        // Find the body lines and the closing marker line before lexing so
        // that `<<-` can compute the common indentation.
        let body_start_idx = self.idx;
        let mut line_starts = vec![self.idx];
        let mut close_idx = None;
        let mut i = self.idx;
        loop {
            let line_start = i;
            while i < self.chars.len() && self.chars[i].1 != '\n' {
                i += 1;
            }
            let line: String = self.chars[line_start..i].iter().map(|(_, c)| *c).collect();
            if line.trim() == marker {
                close_idx = Some(line_start);
                line_starts.pop();
                break;
            }
            if i >= self.chars.len() {
                break;
            }
            i += 1;
            line_starts.push(i);
        }

        let Some(close_idx) = close_idx else {
            let range = self.range_from(start);
            self.error(
                "Unterminated template string",
                format!("No closing marker {:?} was found for the heredoc.", marker),
                range,
            );
            while self.peek().is_some() {
                self.bump();
            }
            return TokenKind::Template(Vec::new());
        };

        let indent = if strip {
            line_starts
                .iter()
                .filter_map(|&ls| {
                    let mut n = 0;
                    let mut j = ls;
                    while j < close_idx && matches!(self.chars[j].1, ' ' | '\t') {
                        n += 1;
                        j += 1;
                    }
                    if j >= close_idx || self.chars[j].1 == '\n' {
                        None
                    } else {
                        Some(n)
                    }
                })
                .min()
                .unwrap_or(0)
        } else {
            0
        };

        let mut parts = Vec::new();
        let mut lit = String::new();
        let mut lit_start = self.pos();
        let mut at_line_start = self.idx == body_start_idx;
        while self.idx < close_idx {
            if at_line_start {
                let mut skipped = 0;
                while skipped < indent && matches!(self.peek(), Some(' ' | '\t')) {
                    self.bump();
                    skipped += 1;
                }
                at_line_start = false;
                continue;
            }
            let Some(c) = self.peek() else { break };
            if self.lex_template_marker(&mut parts, &mut lit, &mut lit_start) {
                continue;
            }
            lit.push(c);
            self.bump();
            if c == '\n' {
                at_line_start = true;
            }
        }
        self.flush_literal(&mut parts, &mut lit, lit_start);

        // Consume the closing marker line, leaving its newline for the parser.
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
        TokenKind::Template(parts)
    }
}

/// Returns true if `c` may start an identifier.
pub fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

/// Returns true if `c` may continue an identifier.
pub fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

/// Returns true if `s` is a valid HCL identifier.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_ident_start(c) => chars.all(is_ident_continue),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let (tokens, diags) = lex(src, "test.hcl");
        assert!(!diags.has_errors(), "{}", diags);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lex_attribute() {
        assert_eq!(
            kinds("foo = 1.5 # comment\n"),
            vec![
                TokenKind::Ident("foo".into()),
                TokenKind::Assign,
                TokenKind::Number(1.5),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lex_template_with_interpolation() {
        let toks = kinds(r#""a-${var.b}-\n$${lit}""#);
        let TokenKind::Template(parts) = &toks[0] else {
            panic!("expected template, got {:?}", toks[0]);
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], TemplatePart::Literal(s, _) if s == "a-"));
        let TemplatePart::Interp(inner, _) = &parts[1] else {
            panic!("expected interpolation");
        };
        let inner: Vec<_> = inner.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            inner,
            vec![
                TokenKind::Ident("var".into()),
                TokenKind::Dot,
                TokenKind::Ident("b".into()),
                TokenKind::Eof,
            ]
        );
        assert!(matches!(&parts[2], TemplatePart::Literal(s, _) if s == "-\n${lit}"));
    }

    #[test]
    fn test_lex_heredoc_strips_indent() {
        let toks = kinds("x = <<-EOT\n    hello\n      world\n    EOT\n");
        let TokenKind::Template(parts) = &toks[2] else {
            panic!("expected template");
        };
        assert!(matches!(&parts[0], TemplatePart::Literal(s, _) if s == "hello\n  world\n"));
        assert_eq!(toks[3], TokenKind::Newline);
    }

    #[test]
    fn test_lex_directive_is_error() {
        let (_, diags) = lex(r#"x = "%{ if true }y%{ endif }""#, "test.hcl");
        assert!(diags.has_errors());
    }

    #[test]
    fn test_identifiers() {
        assert!(is_valid_identifier("foo_bar-1"));
        assert!(!is_valid_identifier("1foo"));
        assert!(!is_valid_identifier(""));
    }
}
