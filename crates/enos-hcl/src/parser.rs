// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Recursive descent parser for HCL native syntax.

use crate::ast::{
    Attribute, BinaryOp, Block, Body, Expr, ExprKind, File, ForExpr, ObjectItem, TemplateItem,
    UnaryOp,
};
use crate::diagnostics::{Diagnostic, Diagnostics, Range};
use crate::lexer::{TemplatePart, Token, TokenKind, lex};
use crate::traversal::{Traversal, Traverser};
use crate::value::Value;

/// Parses a configuration file.
///
/// A file is always returned, even when it contains errors, so callers can
/// continue decoding whatever could be parsed.
pub fn parse(src: &str, filename: &str) -> (File, Diagnostics) {
    let (tokens, mut diags) = lex(src, filename);
    let mut parser = Parser::new(tokens);
    let body = parser.parse_body(false);
    diags.extend(parser.diags);
    (
        File {
            filename: filename.to_string(),
            body,
        },
        diags,
    )
}

/// Parses a standalone expression, such as a value given on the command line.
pub fn parse_expression(src: &str, filename: &str) -> (Option<Expr>, Diagnostics) {
    let (tokens, mut diags) = lex(src, filename);
    let mut parser = Parser::new(tokens);
    parser.skip_newlines();
    let expr = parser.parse_expr().ok();
    if expr.is_some() {
        parser.skip_newlines();
        let tok = parser.peek().clone();
        if tok.kind != TokenKind::Eof {
            parser.diags.push(
                Diagnostic::error(
                    "Extra characters after expression",
                    "An expression was successfully parsed, but extra characters were found after it.",
                )
                .with_subject(&tok.range),
            );
        }
    }
    diags.extend(parser.diags);
    (expr, diags)
}

type ParseResult<T> = Result<T, ()>;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
    diags: Diagnostics,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            nesting: 0,
            diags: Diagnostics::new(),
        }
    }

    fn peek(&mut self) -> &Token {
        if self.nesting > 0 {
            self.skip_newlines();
        }
        let idx = self.pos.min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn peek_kind(&mut self) -> TokenKind {
        self.peek().kind.clone()
    }

    fn peek_second_kind(&mut self) -> TokenKind {
        self.peek();
        let idx = (self.pos + 1).min(self.tokens.len() - 1);
        self.tokens[idx].kind.clone()
    }

    fn next(&mut self) -> Token {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    fn skip_newlines(&mut self) {
        while self.pos < self.tokens.len() && self.tokens[self.pos].kind == TokenKind::Newline {
            self.pos += 1;
        }
    }

    fn error(&mut self, summary: &str, detail: impl Into<String>, range: &Range) {
        self.diags
            .push(Diagnostic::error(summary, detail).with_subject(range));
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        let tok = self.peek().clone();
        if tok.kind == kind {
            self.next();
            Ok(tok)
        } else {
            self.error(
                &format!("Missing {}", what),
                format!("Expected {}, but found {}.", what, tok.kind.describe()),
                &tok.range,
            );
            Err(())
        }
    }

    /// Skips to the end of the current line, stepping over nested brackets.
    fn recover(&mut self) {
        let saved = self.nesting;
        self.nesting = 0;
        let mut depth = 0usize;
        loop {
            let kind = self.tokens[self.pos.min(self.tokens.len() - 1)].kind.clone();
            match kind {
                TokenKind::Eof => break,
                TokenKind::Newline if depth == 0 => break,
                TokenKind::OBrace | TokenKind::OBrack | TokenKind::OParen => depth += 1,
                TokenKind::CBrace if depth == 0 => break,
                TokenKind::CBrace | TokenKind::CBrack | TokenKind::CParen => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            self.pos += 1;
        }
        self.nesting = saved;
    }

    // ------------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------------

    fn parse_body(&mut self, closing: bool) -> Body {
        let start = self.peek().range.clone();
        let mut body = Body::default();
        loop {
            let tok = self.peek().clone();
            match &tok.kind {
                TokenKind::Newline => {
                    self.pos += 1;
                }
                TokenKind::Eof => {
                    if closing {
                        self.error(
                            "Unclosed configuration block",
                            "There is no closing brace for this block before the end of the file.",
                            &tok.range,
                        );
                    }
                    body.end_range = tok.range.clone();
                    break;
                }
                TokenKind::CBrace if closing => {
                    body.end_range = tok.range.clone();
                    self.pos += 1;
                    break;
                }
                TokenKind::Ident(name) => {
                    self.pos += 1;
                    if self.parse_body_item(name.clone(), tok.range.clone(), &mut body, closing).is_err() {
                        self.recover();
                    }
                }
                _ => {
                    self.error(
                        "Argument or block definition required",
                        "An argument or block definition is required here.",
                        &tok.range,
                    );
                    self.pos += 1;
                    self.recover();
                }
            }
        }
        body.range = Range::between(&start, &body.end_range);
        body
    }

    fn parse_body_item(
        &mut self,
        name: String,
        name_range: Range,
        body: &mut Body,
        closing: bool,
    ) -> ParseResult<()> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Assign => {
                self.next();
                let expr = self.parse_expr()?;
                self.expect_item_end(closing, "argument")?;
                if let Some(prev) = body.attribute(&name) {
                    let detail = format!(
                        "The argument {:?} was already set at {}. Each argument may be set only once.",
                        name, prev.name_range
                    );
                    self.error("Attribute redefined", detail, &name_range);
                    return Ok(());
                }
                let range = Range::between(&name_range, &expr.range);
                body.attributes.push(Attribute {
                    name,
                    expr,
                    name_range,
                    range,
                });
                Ok(())
            }
            _ => {
                let mut labels = Vec::new();
                let mut label_ranges = Vec::new();
                loop {
                    let tok = self.peek().clone();
                    match &tok.kind {
                        TokenKind::Ident(label) => {
                            self.next();
                            labels.push(label.clone());
                            label_ranges.push(tok.range.clone());
                        }
                        TokenKind::Template(parts) => {
                            self.next();
                            let label = match parts.as_slice() {
                                [] => String::new(),
                                [TemplatePart::Literal(s, _)] => s.clone(),
                                _ => {
                                    self.error(
                                        "Invalid block label",
                                        "Template sequences are not allowed in block labels.",
                                        &tok.range,
                                    );
                                    return Err(());
                                }
                            };
                            labels.push(label);
                            label_ranges.push(tok.range.clone());
                        }
                        TokenKind::OBrace => {
                            self.next();
                            break;
                        }
                        _ => {
                            self.error(
                                "Invalid block definition",
                                "Either a quoted string block label or an opening brace (\"{\") is expected here.",
                                &tok.range,
                            );
                            return Err(());
                        }
                    }
                }
                let def_range = match label_ranges.last() {
                    Some(last) => Range::between(&name_range, last),
                    None => name_range.clone(),
                };
                let inner = self.parse_body(true);
                let range = Range::between(&name_range, &inner.end_range);
                self.expect_item_end(closing, "block definition")?;
                body.blocks.push(Block {
                    type_name: name,
                    labels,
                    label_ranges,
                    body: inner,
                    type_range: name_range,
                    def_range,
                    range,
                });
                Ok(())
            }
        }
    }

    fn expect_item_end(&mut self, closing: bool, what: &str) -> ParseResult<()> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Newline => {
                self.next();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            TokenKind::CBrace if closing => Ok(()),
            _ => {
                self.error(
                    &format!("Missing newline after {}", what),
                    format!("An {} must end with a newline.", what),
                    &tok.range,
                );
                Err(())
            }
        }
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        let cond = self.parse_binary(0)?;
        if self.peek_kind() != TokenKind::Question {
            return Ok(cond);
        }
        self.next();
        let true_expr = self.parse_expr()?;
        self.expect(TokenKind::Colon, "false expression")?;
        let false_expr = self.parse_expr()?;
        let range = Range::between(&cond.range, &false_expr.range);
        Ok(Expr {
            kind: ExprKind::Conditional(Box::new(cond), Box::new(true_expr), Box::new(false_expr)),
            range,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> ParseResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let Some(op) = binary_op(&self.peek_kind()) else {
                break;
            };
            if op.precedence() <= min_prec {
                break;
            }
            self.next();
            let rhs = self.parse_binary(op.precedence())?;
            let range = Range::between(&lhs.range, &rhs.range);
            lhs = Expr {
                kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
                range,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let tok = self.peek().clone();
        let op = match tok.kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Negate,
            _ => return self.parse_postfix(),
        };
        self.next();
        let operand = self.parse_unary()?;
        let range = Range::between(&tok.range, &operand.range);
        if let (UnaryOp::Negate, ExprKind::Literal(Value::Number(n))) = (op, &operand.kind) {
            return Ok(Expr::literal(Value::Number(-n), range));
        }
        Ok(Expr {
            kind: ExprKind::Unary(op, Box::new(operand)),
            range,
        })
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.next();
                    let tok = self.next();
                    match tok.kind {
                        TokenKind::Ident(name) => {
                            expr = append_traverser(expr, Traverser::Attr(name, tok.range));
                        }
                        TokenKind::Number(n) => {
                            expr = append_traverser(
                                expr,
                                Traverser::Index(Value::Number(n), tok.range),
                            );
                        }
                        TokenKind::Star => {
                            let steps = self.parse_splat_steps(false)?;
                            let range = extend_range(&expr.range, &tok.range, &steps);
                            expr = Expr {
                                kind: ExprKind::Splat(Box::new(expr), steps),
                                range,
                            };
                        }
                        other => {
                            self.error(
                                "Invalid attribute name",
                                format!("An attribute name is required after a dot, found {}.", other.describe()),
                                &tok.range,
                            );
                            return Err(());
                        }
                    }
                }
                TokenKind::OBrack => {
                    let open = self.next();
                    if self.peek_kind() == TokenKind::Star
                        && self.peek_second_kind() == TokenKind::CBrack
                    {
                        self.next();
                        let close = self.next();
                        let steps = self.parse_splat_steps(true)?;
                        let range = extend_range(&expr.range, &close.range, &steps);
                        expr = Expr {
                            kind: ExprKind::Splat(Box::new(expr), steps),
                            range,
                        };
                        continue;
                    }
                    self.nesting += 1;
                    let key = self.parse_expr();
                    let close = self.expect(TokenKind::CBrack, "close bracket");
                    self.nesting -= 1;
                    let (key, close) = (key?, close?);
                    let range = Range::between(&open.range, &close.range);
                    expr = match key.kind {
                        ExprKind::Literal(v) => append_traverser(expr, Traverser::Index(v, range)),
                        _ => {
                            let full = Range::between(&expr.range, &close.range);
                            Expr {
                                kind: ExprKind::Index(Box::new(expr), Box::new(key)),
                                range: full,
                            }
                        }
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_splat_steps(&mut self, full: bool) -> ParseResult<Vec<Traverser>> {
        let mut steps = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    if matches!(self.peek_second_kind(), TokenKind::Ident(_)) {
                        self.next();
                        let tok = self.next();
                        if let TokenKind::Ident(name) = tok.kind {
                            steps.push(Traverser::Attr(name, tok.range));
                        }
                    } else {
                        break;
                    }
                }
                TokenKind::OBrack if full => {
                    let save = self.pos;
                    let open = self.next();
                    let tok = self.next();
                    let close = self.next();
                    match (&tok.kind, &close.kind) {
                        (TokenKind::Number(n), TokenKind::CBrack) => steps.push(Traverser::Index(
                            Value::Number(*n),
                            Range::between(&open.range, &close.range),
                        )),
                        _ => {
                            self.pos = save;
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(steps)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Number(n) => {
                self.next();
                Ok(Expr::literal(Value::Number(n), tok.range))
            }
            TokenKind::Ident(name) => {
                self.next();
                match name.as_str() {
                    "true" => return Ok(Expr::literal(Value::Bool(true), tok.range)),
                    "false" => return Ok(Expr::literal(Value::Bool(false), tok.range)),
                    "null" => return Ok(Expr::literal(Value::null(), tok.range)),
                    _ => {}
                }
                match self.peek_kind() {
                    TokenKind::OParen => self.parse_call(name, tok.range),
                    TokenKind::DoubleColon => {
                        let mut full = name;
                        while self.peek_kind() == TokenKind::DoubleColon {
                            self.next();
                            let part = self.next();
                            match part.kind {
                                TokenKind::Ident(p) => {
                                    full.push_str("::");
                                    full.push_str(&p);
                                }
                                other => {
                                    self.error(
                                        "Missing function name",
                                        format!("Expected a name after \"::\", found {}.", other.describe()),
                                        &part.range,
                                    );
                                    return Err(());
                                }
                            }
                        }
                        self.parse_call(full, tok.range)
                    }
                    _ => Ok(Expr {
                        kind: ExprKind::ScopeTraversal(Traversal(vec![Traverser::Root(
                            name,
                            tok.range.clone(),
                        )])),
                        range: tok.range,
                    }),
                }
            }
            TokenKind::Template(parts) => {
                self.next();
                self.build_template(parts, tok.range)
            }
            TokenKind::OParen => {
                self.next();
                self.nesting += 1;
                let inner = self.parse_expr();
                let close = self.expect(TokenKind::CParen, "close parenthesis");
                self.nesting -= 1;
                let (inner, close) = (inner?, close?);
                Ok(Expr {
                    kind: ExprKind::Parens(Box::new(inner)),
                    range: Range::between(&tok.range, &close.range),
                })
            }
            TokenKind::OBrack => {
                self.next();
                self.nesting += 1;
                let result = if matches!(self.peek_kind(), TokenKind::Ident(ref s) if s == "for") {
                    self.parse_for(tok.range.clone(), false)
                } else {
                    self.parse_tuple(tok.range.clone())
                };
                self.nesting -= 1;
                result
            }
            TokenKind::OBrace => {
                self.next();
                self.nesting += 1;
                let result = if matches!(self.peek_kind(), TokenKind::Ident(ref s) if s == "for") {
                    self.parse_for(tok.range.clone(), true)
                } else {
                    self.parse_object(tok.range.clone())
                };
                self.nesting -= 1;
                result
            }
            other => {
                self.error(
                    "Invalid expression",
                    format!("Expected the start of an expression, but found {}.", other.describe()),
                    &tok.range,
                );
                Err(())
            }
        }
    }

    fn parse_call(&mut self, name: String, name_range: Range) -> ParseResult<Expr> {
        self.next();
        self.nesting += 1;
        let mut args = Vec::new();
        let mut expand_final = false;
        let close = loop {
            if self.peek_kind() == TokenKind::CParen {
                break self.next();
            }
            let arg = match self.parse_expr() {
                Ok(arg) => arg,
                Err(()) => {
                    self.nesting -= 1;
                    return Err(());
                }
            };
            args.push(arg);
            match self.peek_kind() {
                TokenKind::Comma => {
                    self.next();
                }
                TokenKind::Ellipsis => {
                    self.next();
                    expand_final = true;
                    match self.expect(TokenKind::CParen, "close parenthesis") {
                        Ok(close) => break close,
                        Err(()) => {
                            self.nesting -= 1;
                            return Err(());
                        }
                    }
                }
                TokenKind::CParen => {}
                other => {
                    let range = self.peek().range.clone();
                    self.error(
                        "Missing argument separator",
                        format!("A comma is required to separate each function argument from the next, found {}.", other.describe()),
                        &range,
                    );
                    self.nesting -= 1;
                    return Err(());
                }
            }
        };
        self.nesting -= 1;
        Ok(Expr {
            kind: ExprKind::FunctionCall {
                name,
                args,
                expand_final,
                name_range: name_range.clone(),
            },
            range: Range::between(&name_range, &close.range),
        })
    }

    fn parse_tuple(&mut self, open: Range) -> ParseResult<Expr> {
        let mut items = Vec::new();
        loop {
            if self.peek_kind() == TokenKind::CBrack {
                let close = self.next();
                return Ok(Expr {
                    kind: ExprKind::Tuple(items),
                    range: Range::between(&open, &close.range),
                });
            }
            items.push(self.parse_expr()?);
            match self.peek_kind() {
                TokenKind::Comma => {
                    self.next();
                }
                TokenKind::CBrack => {}
                other => {
                    let range = self.peek().range.clone();
                    self.error(
                        "Missing item separator",
                        format!("Expected a comma to mark the beginning of the next item, found {}.", other.describe()),
                        &range,
                    );
                    return Err(());
                }
            }
        }
    }

    fn parse_object(&mut self, open: Range) -> ParseResult<Expr> {
        let mut items = Vec::new();
        loop {
            if self.peek_kind() == TokenKind::CBrace {
                let close = self.next();
                return Ok(Expr {
                    kind: ExprKind::Object(items),
                    range: Range::between(&open, &close.range),
                });
            }
            let key = self.parse_expr()?;
            let key = match key.as_keyword() {
                Some(word) if matches!(key.kind, ExprKind::ScopeTraversal(_)) => {
                    Expr::literal(Value::string(word), key.range)
                }
                _ => key,
            };
            let sep = self.next();
            if !matches!(sep.kind, TokenKind::Assign | TokenKind::Colon) {
                self.error(
                    "Missing key/value separator",
                    "Expected an equals sign (\"=\") to mark the beginning of the attribute value.",
                    &sep.range,
                );
                return Err(());
            }
            let value = self.parse_expr()?;
            items.push(ObjectItem { key, value });
            if self.peek_kind() == TokenKind::Comma {
                self.next();
            }
        }
    }

    fn parse_for(&mut self, open: Range, object: bool) -> ParseResult<Expr> {
        self.next();
        let first = self.parse_ident("iterator variable")?;
        let (key_var, value_var) = if self.peek_kind() == TokenKind::Comma {
            self.next();
            let second = self.parse_ident("value variable")?;
            (Some(first), second)
        } else {
            (None, first)
        };
        let in_tok = self.next();
        if !matches!(&in_tok.kind, TokenKind::Ident(s) if s == "in") {
            self.error(
                "Invalid 'for' expression",
                "The 'in' keyword is required after the iterator variable names.",
                &in_tok.range,
            );
            return Err(());
        }
        let collection = self.parse_expr()?;
        self.expect(TokenKind::Colon, "colon")?;

        let (key_expr, value_expr, group) = if object {
            let key = self.parse_expr()?;
            self.expect(TokenKind::FatArrow, "'=>'")?;
            let value = self.parse_expr()?;
            let group = if self.peek_kind() == TokenKind::Ellipsis {
                self.next();
                true
            } else {
                false
            };
            (Some(key), value, group)
        } else {
            (None, self.parse_expr()?, false)
        };

        let cond = if matches!(self.peek_kind(), TokenKind::Ident(ref s) if s == "if") {
            self.next();
            Some(self.parse_expr()?)
        } else {
            None
        };

        let close_kind = if object {
            TokenKind::CBrace
        } else {
            TokenKind::CBrack
        };
        let close = self.expect(close_kind, "end of 'for' expression")?;
        Ok(Expr {
            kind: ExprKind::For(Box::new(ForExpr {
                key_var,
                value_var,
                collection,
                key_expr,
                value_expr,
                cond,
                group,
            })),
            range: Range::between(&open, &close.range),
        })
    }

    fn parse_ident(&mut self, what: &str) -> ParseResult<String> {
        let tok = self.next();
        match tok.kind {
            TokenKind::Ident(name) => Ok(name),
            other => {
                self.error(
                    "Invalid 'for' expression",
                    format!("Expected the {} name, found {}.", what, other.describe()),
                    &tok.range,
                );
                Err(())
            }
        }
    }

    fn build_template(&mut self, parts: Vec<TemplatePart>, range: Range) -> ParseResult<Expr> {
        let has_interp = parts.iter().any(|p| matches!(p, TemplatePart::Interp(..)));
        if !has_interp {
            let text: String = parts
                .iter()
                .map(|p| match p {
                    TemplatePart::Literal(s, _) => s.as_str(),
                    TemplatePart::Interp(..) => "",
                })
                .collect();
            return Ok(Expr::literal(Value::String(text), range));
        }

        let mut items = Vec::new();
        let mut failed = false;
        for part in parts {
            match part {
                TemplatePart::Literal(s, _) => items.push(TemplateItem::Literal(s)),
                TemplatePart::Interp(tokens, interp_range) => {
                    let mut sub = Parser::new(tokens);
                    sub.nesting = 1;
                    match sub.parse_expr() {
                        Ok(expr) => {
                            let tok = sub.peek().clone();
                            if tok.kind != TokenKind::Eof {
                                sub.error(
                                    "Extra characters in interpolation",
                                    "Expected a closing brace to end the interpolation expression.",
                                    &tok.range,
                                );
                                failed = true;
                            }
                            items.push(TemplateItem::Interp(expr));
                        }
                        Err(()) => {
                            if sub.diags.is_empty() {
                                sub.error(
                                    "Invalid interpolation",
                                    "The interpolation sequence does not contain a valid expression.",
                                    &interp_range,
                                );
                            }
                            failed = true;
                        }
                    }
                    self.diags.extend(sub.diags);
                }
            }
        }
        if failed {
            return Err(());
        }

        if items.len() == 1 {
            if let Some(TemplateItem::Interp(inner)) = items.pop() {
                return Ok(Expr {
                    kind: ExprKind::TemplateWrap(Box::new(inner)),
                    range,
                });
            }
        }
        Ok(Expr {
            kind: ExprKind::Template(items),
            range,
        })
    }
}

fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Or => BinaryOp::Or,
        TokenKind::And => BinaryOp::And,
        TokenKind::Equal => BinaryOp::Equal,
        TokenKind::NotEqual => BinaryOp::NotEqual,
        TokenKind::Less => BinaryOp::Less,
        TokenKind::LessEqual => BinaryOp::LessEqual,
        TokenKind::Greater => BinaryOp::Greater,
        TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Subtract,
        TokenKind::Star => BinaryOp::Multiply,
        TokenKind::Slash => BinaryOp::Divide,
        TokenKind::Percent => BinaryOp::Modulo,
        _ => return None,
    })
}

fn append_traverser(expr: Expr, step: Traverser) -> Expr {
    let range = Range::between(&expr.range, step.range());
    match expr.kind {
        ExprKind::ScopeTraversal(mut t) => {
            t.0.push(step);
            Expr {
                kind: ExprKind::ScopeTraversal(t),
                range,
            }
        }
        ExprKind::RelativeTraversal(source, mut steps) => {
            steps.push(step);
            Expr {
                kind: ExprKind::RelativeTraversal(source, steps),
                range,
            }
        }
        kind => Expr {
            kind: ExprKind::RelativeTraversal(
                Box::new(Expr {
                    kind,
                    range: expr.range,
                }),
                vec![step],
            ),
            range,
        },
    }
}

fn extend_range(start: &Range, marker: &Range, steps: &[Traverser]) -> Range {
    match steps.last() {
        Some(last) => Range::between(start, last.range()),
        None => Range::between(start, marker),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> File {
        let (file, diags) = parse(src, "test.hcl");
        assert!(!diags.has_errors(), "unexpected diagnostics: {}", diags);
        file
    }

    #[test]
    fn test_parse_blocks_and_attributes() {
        let file = parse_ok(
            r#"
module "foo" {
  source = "./modules/foo"
  count  = 1
}

scenario "test" {
  step "one" { module = module.foo }
}
"#,
        );
        assert_eq!(file.body.blocks.len(), 2);
        let module = &file.body.blocks[0];
        assert_eq!(module.type_name, "module");
        assert_eq!(module.labels, vec!["foo".to_string()]);
        assert_eq!(module.body.attributes.len(), 2);
        let step = &file.body.blocks[1].body.blocks[0];
        let expr = &step.body.attribute("module").unwrap().expr;
        assert_eq!(expr.as_abs_traversal().unwrap().to_string(), "module.foo");
    }

    #[test]
    fn test_parse_precedence() {
        let (expr, diags) = parse_expression("1 + 2 * 3 == 7 && !false", "expr");
        assert!(!diags.has_errors());
        let expr = expr.unwrap();
        let ExprKind::Binary(BinaryOp::And, lhs, _) = &expr.kind else {
            panic!("expected &&, got {:?}", expr.kind);
        };
        assert!(matches!(lhs.kind, ExprKind::Binary(BinaryOp::Equal, ..)));
    }

    #[test]
    fn test_parse_object_keys_are_literal() {
        let (expr, _) = parse_expression("{ foo = 1, \"bar\" = 2, (var.x) = 3 }", "expr");
        let expr = expr.unwrap();
        let items = expr.as_object_items().unwrap();
        assert!(matches!(&items[0].key.kind, ExprKind::Literal(Value::String(s)) if s == "foo"));
        assert!(matches!(&items[1].key.kind, ExprKind::Literal(Value::String(s)) if s == "bar"));
        assert!(matches!(&items[2].key.kind, ExprKind::Parens(_)));
    }

    #[test]
    fn test_parse_multiline_collections() {
        parse_ok("x = [\n  \"a\",\n  \"b\",\n]\ny = {\n  a = 1\n  b = 2\n}\n");
    }

    #[test]
    fn test_parse_template_wrap() {
        let (expr, _) = parse_expression("\"${step.foo.bar}\"", "expr");
        let expr = expr.unwrap();
        assert!(matches!(expr.kind, ExprKind::TemplateWrap(_)));
        assert_eq!(expr.as_abs_traversal().unwrap().to_string(), "step.foo.bar");
    }

    #[test]
    fn test_parse_for_and_splat() {
        let (expr, diags) = parse_expression("{ for k, v in var.m : k => v.id... if v.ok }", "expr");
        assert!(!diags.has_errors(), "{}", diags);
        assert!(matches!(expr.unwrap().kind, ExprKind::For(_)));

        let (expr, diags) = parse_expression("var.list[*].id", "expr");
        assert!(!diags.has_errors(), "{}", diags);
        assert!(matches!(expr.unwrap().kind, ExprKind::Splat(..)));
    }

    #[test]
    fn test_parse_duplicate_attribute() {
        let (_, diags) = parse("a = 1\na = 2\n", "test.hcl");
        assert!(diags.has_errors());
        assert_eq!(diags.iter().next().unwrap().summary, "Attribute redefined");
    }

    #[test]
    fn test_parse_error_recovers() {
        let (file, diags) = parse("a = = 1\nb = 2\n", "test.hcl");
        assert!(diags.has_errors());
        assert!(file.body.attribute("b").is_some());
    }
}
