//! Expression parser
//!
//! A recursive descent parser with proper operator precedence. The same
//! grammar covers scalar expressions, quantities with unit suffixes,
//! object paths and spreadsheet-style cell ranges.
//!
//! Names are sensitive to spelling: `Box.Length` matches internal names
//! first, `<<Crate>>.Length` matches labels only, and `Doc#Box.Length`
//! pins the document. Function arguments are separated with `;` so that
//! `,` stays available as a decimal separator.

use crate::address::CellAddress;
use crate::ast::{unescape, ExprKind, Expression, Op, UnaryOp};
use crate::error::{ExprError, ExprResult};
use crate::functions;
use crate::path::{Component, ObjectIdentifier, PathString};
use partlab_core::{DocId, ObjId, Quantity, Unit};

/// Parse `text` into an expression owned by `owner`
///
/// # Example
/// ```rust
/// use partlab_core::{DocumentGraph, ObjId, DocId};
/// use partlab_expr::parser::parse;
///
/// let mut graph = DocumentGraph::new();
/// let doc = graph.new_document("Model").unwrap();
/// let owner = graph.document_mut(doc).unwrap().add_object("Box").unwrap();
///
/// let expr = parse(owner, "2 * (Length + 5 mm)").unwrap();
/// assert_eq!(expr.to_display_string(), "2 * (Length + 5 mm)");
/// ```
pub fn parse(owner: ObjId, text: &str) -> ExprResult<Expression> {
    let (tokens, bad) = scan(text);
    if let Some(pos) = bad {
        return Err(ExprError::Parse(format!(
            "unexpected character at offset {}",
            pos
        )));
    }
    let mut parser = Parser::new(owner, &tokens);
    let expr = parser.parse_expression()?;
    if !parser.is_at_end() {
        return Err(ExprError::Parse(format!(
            "unexpected trailing input near offset {}",
            parser.current_start()
        )));
    }
    Ok(expr)
}

/// Parse a standalone unit expression such as `mm`, `mm/s`, `mm^2` or `1/s`
pub fn parse_unit(text: &str) -> ExprResult<Expression> {
    let (tokens, bad) = scan(text);
    if let Some(pos) = bad {
        return Err(ExprError::Parse(format!(
            "unexpected character at offset {}",
            pos
        )));
    }
    let detached = ObjId {
        doc: DocId(0),
        idx: 0,
    };
    let mut parser = Parser::new(detached, &tokens);
    let expr = parser.parse_unit_literal()?;
    if !parser.is_at_end() {
        return Err(ExprError::Parse(format!("invalid unit '{}'", text)));
    }
    Ok(expr)
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Identifier(String),
    /// `<<...>>` quoted name or string, unescaped
    Quoted(String),
    /// `'...'` string literal, unescaped
    CharString(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Question,
    Colon,
    Semicolon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Hash,
    Dot,
}

/// A token with its byte span in the source text
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

/// Tokenize for syntax highlighting. Stops at the first character that does
/// not start a token and returns the tokens scanned up to that point.
pub fn tokenize(text: &str) -> Vec<Token> {
    scan(text).0
}

/// True when the token can stand alone as an identifier, for editor
/// completion
pub fn is_token_an_identifier(token: &Token) -> bool {
    matches!(token.kind, TokenKind::Identifier(_))
}

/// True when the token names a known unit symbol
pub fn is_token_a_unit(token: &Token) -> bool {
    match &token.kind {
        TokenKind::Identifier(name) => Unit::is_unit_symbol(name),
        _ => false,
    }
}

fn scan(text: &str) -> (Vec<Token>, Option<usize>) {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos] as char;
        if c.is_whitespace() {
            pos += 1;
            continue;
        }
        let start = pos;
        let kind = match c {
            '+' => {
                pos += 1;
                TokenKind::Plus
            }
            '-' => {
                pos += 1;
                TokenKind::Minus
            }
            '*' => {
                pos += 1;
                TokenKind::Star
            }
            '/' => {
                pos += 1;
                TokenKind::Slash
            }
            '%' => {
                pos += 1;
                TokenKind::Percent
            }
            '^' => {
                pos += 1;
                TokenKind::Caret
            }
            '?' => {
                pos += 1;
                TokenKind::Question
            }
            ':' => {
                pos += 1;
                TokenKind::Colon
            }
            ';' => {
                pos += 1;
                TokenKind::Semicolon
            }
            '(' => {
                pos += 1;
                TokenKind::LParen
            }
            ')' => {
                pos += 1;
                TokenKind::RParen
            }
            '[' => {
                pos += 1;
                TokenKind::LBracket
            }
            ']' => {
                pos += 1;
                TokenKind::RBracket
            }
            '#' => {
                pos += 1;
                TokenKind::Hash
            }
            '=' if bytes.get(pos + 1) == Some(&b'=') => {
                pos += 2;
                TokenKind::Eq
            }
            '!' if bytes.get(pos + 1) == Some(&b'=') => {
                pos += 2;
                TokenKind::Neq
            }
            '<' if bytes.get(pos + 1) == Some(&b'<') => match scan_quoted(text, pos) {
                Some((body, end)) => {
                    pos = end;
                    TokenKind::Quoted(body)
                }
                None => return (tokens, Some(pos)),
            },
            '<' if bytes.get(pos + 1) == Some(&b'=') => {
                pos += 2;
                TokenKind::Lte
            }
            '<' => {
                pos += 1;
                TokenKind::Lt
            }
            '>' if bytes.get(pos + 1) == Some(&b'=') => {
                pos += 2;
                TokenKind::Gte
            }
            '>' => {
                pos += 1;
                TokenKind::Gt
            }
            '\'' => match scan_char_string(text, pos) {
                Some((body, end)) => {
                    pos = end;
                    TokenKind::CharString(body)
                }
                None => return (tokens, Some(pos)),
            },
            '.' if bytes.get(pos + 1).is_some_and(|b| b.is_ascii_digit()) => {
                let (value, end) = scan_number(text, pos);
                pos = end;
                TokenKind::Number(value)
            }
            '.' => {
                pos += 1;
                TokenKind::Dot
            }
            c if c.is_ascii_digit() => {
                let (value, end) = scan_number(text, pos);
                pos = end;
                TokenKind::Number(value)
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                while pos < bytes.len() {
                    let b = bytes[pos] as char;
                    if b.is_ascii_alphanumeric() || b == '_' || b == '$' {
                        pos += 1;
                    } else {
                        break;
                    }
                }
                TokenKind::Identifier(text[start..pos].to_string())
            }
            _ => return (tokens, Some(pos)),
        };
        tokens.push(Token {
            kind,
            start,
            end: pos,
        });
    }
    (tokens, None)
}

// Decimal comma is accepted alongside decimal point; arguments use `;`.
fn scan_number(text: &str, start: usize) -> (f64, usize) {
    let bytes = text.as_bytes();
    let mut pos = start;
    let mut digits = String::new();

    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        digits.push(bytes[pos] as char);
        pos += 1;
    }
    match bytes.get(pos) {
        Some(b'.') => {
            digits.push('.');
            pos += 1;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                digits.push(bytes[pos] as char);
                pos += 1;
            }
        }
        Some(b',') if bytes.get(pos + 1).is_some_and(|b| b.is_ascii_digit()) => {
            digits.push('.');
            pos += 1;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                digits.push(bytes[pos] as char);
                pos += 1;
            }
        }
        _ => {}
    }
    if matches!(bytes.get(pos), Some(b'e') | Some(b'E')) {
        let mut exp_end = pos + 1;
        if matches!(bytes.get(exp_end), Some(b'+') | Some(b'-')) {
            exp_end += 1;
        }
        if bytes.get(exp_end).is_some_and(|b| b.is_ascii_digit()) {
            while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
                exp_end += 1;
            }
            digits.push_str(&text[pos..exp_end].replace(',', "."));
            pos = exp_end;
        }
    }
    (digits.parse().unwrap_or(0.0), pos)
}

fn scan_quoted(text: &str, start: usize) -> Option<(String, usize)> {
    // body runs from after `<<` to the first unescaped `>>`
    let bytes = text.as_bytes();
    let mut pos = start + 2;
    while pos < bytes.len() {
        if bytes[pos] == b'\\' {
            pos += 2;
            continue;
        }
        if bytes[pos] == b'>' && bytes.get(pos + 1) == Some(&b'>') {
            return Some((unescape(&text[start + 2..pos]), pos + 2));
        }
        pos += 1;
    }
    None
}

fn scan_char_string(text: &str, start: usize) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    let mut pos = start + 1;
    while pos < bytes.len() {
        if bytes[pos] == b'\\' {
            pos += 2;
            continue;
        }
        if bytes[pos] == b'\'' {
            return Some((unescape(&text[start + 1..pos]), pos + 1));
        }
        pos += 1;
    }
    None
}

struct Parser<'a> {
    owner: ObjId,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(owner: ObjId, tokens: &'a [Token]) -> Self {
        Self {
            owner,
            tokens,
            pos: 0,
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn current(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn current_start(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.start)
            .or_else(|| self.tokens.last().map(|t| t.end))
            .unwrap_or(0)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn expect(&mut self, expected: &TokenKind, what: &str) -> ExprResult<()> {
        if self.current() == Some(expected) {
            self.advance();
            Ok(())
        } else {
            Err(ExprError::Parse(format!(
                "expected {} near offset {}",
                what,
                self.current_start()
            )))
        }
    }

    // === Precedence climbing ===
    // conditional < comparison < additive < multiplicative < unary < power

    fn parse_expression(&mut self) -> ExprResult<Expression> {
        self.parse_conditional()
    }

    fn parse_conditional(&mut self) -> ExprResult<Expression> {
        let condition = self.parse_comparison()?;
        if self.current() != Some(&TokenKind::Question) {
            return Ok(condition);
        }
        self.advance();
        let true_expr = self.parse_conditional()?;
        self.expect(&TokenKind::Colon, "':'")?;
        let false_expr = self.parse_conditional()?;
        Ok(Expression::conditional(condition, true_expr, false_expr))
    }

    fn parse_comparison(&mut self) -> ExprResult<Expression> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current() {
                Some(TokenKind::Eq) => Op::Eq,
                Some(TokenKind::Neq) => Op::Neq,
                Some(TokenKind::Lt) => Op::Lt,
                Some(TokenKind::Lte) => Op::Lte,
                Some(TokenKind::Gt) => Op::Gt,
                Some(TokenKind::Gte) => Op::Gte,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expression::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> ExprResult<Expression> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current() {
                Some(TokenKind::Plus) => Op::Add,
                Some(TokenKind::Minus) => Op::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expression::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ExprResult<Expression> {
        let mut left = self.parse_power()?;
        loop {
            let op = match self.current() {
                Some(TokenKind::Star) => Op::Mul,
                Some(TokenKind::Slash) => Op::Div,
                Some(TokenKind::Percent) => Op::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_power()?;
            left = Expression::binary(op, left, right);
        }
        Ok(left)
    }

    // Unary sign binds tighter than `^`, so `-2 ^ 2` is `(-2) ^ 2`
    fn parse_power(&mut self) -> ExprResult<Expression> {
        let mut left = self.parse_unary()?;
        while self.current() == Some(&TokenKind::Caret) {
            self.advance();
            let right = self.parse_unary()?;
            left = Expression::binary(Op::Pow, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ExprResult<Expression> {
        match self.current() {
            Some(TokenKind::Minus) => {
                self.advance();
                Ok(Expression::unary(UnaryOp::Neg, self.parse_unary()?))
            }
            Some(TokenKind::Plus) => {
                self.advance();
                Ok(Expression::unary(UnaryOp::Pos, self.parse_unary()?))
            }
            _ => self.parse_postfix(),
        }
    }

    // Trailing accessors (`[...]`, `.name`) on non-path primaries become
    // components of the node; path primaries consume their own chain.
    fn parse_postfix(&mut self) -> ExprResult<Expression> {
        let mut expr = self.parse_primary()?;
        if matches!(expr.kind, ExprKind::Variable(_)) {
            return Ok(expr);
        }
        loop {
            match self.current() {
                Some(TokenKind::LBracket) => {
                    let comp = self.parse_bracket_component()?;
                    expr.add_component(comp);
                }
                Some(TokenKind::Dot) => {
                    let Some(TokenKind::Identifier(name)) = self.peek(1).cloned() else {
                        break;
                    };
                    self.advance();
                    self.advance();
                    expr.add_component(Component::Simple(name));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ExprResult<Expression> {
        match self.current().cloned() {
            Some(TokenKind::Number(value)) => {
                self.advance();
                self.parse_quantity(value)
            }
            Some(TokenKind::CharString(text)) => {
                self.advance();
                Ok(Expression::string(&text))
            }
            Some(TokenKind::Quoted(text)) => {
                // a quoted name followed by `#` or `.` starts a path,
                // otherwise it is a string literal
                match self.peek(1) {
                    Some(TokenKind::Hash) | Some(TokenKind::Dot) => self.parse_path(),
                    _ => {
                        self.advance();
                        Ok(Expression::string(&text))
                    }
                }
            }
            Some(TokenKind::LParen) => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            Some(TokenKind::Identifier(name)) => self.parse_identifier(&name),
            _ => Err(ExprError::Parse(format!(
                "unexpected token near offset {}",
                self.current_start()
            ))),
        }
    }

    fn parse_identifier(&mut self, name: &str) -> ExprResult<Expression> {
        if self.peek(1) == Some(&TokenKind::LParen) {
            return self.parse_function_call(name);
        }

        // A1:B2 forms a cell range over the owner's properties
        if let (Ok(begin), Some(TokenKind::Colon)) = (CellAddress::parse(name), self.peek(1)) {
            if let Some(TokenKind::Identifier(end_name)) = self.peek(2) {
                if let Ok(end) = CellAddress::parse(end_name) {
                    self.advance();
                    self.advance();
                    self.advance();
                    return Ok(Expression::new(ExprKind::Range {
                        owner: self.owner,
                        begin,
                        end,
                    }));
                }
            }
        }

        let path_follows = matches!(
            self.peek(1),
            Some(TokenKind::Hash) | Some(TokenKind::Dot) | Some(TokenKind::LBracket)
        );
        if !path_follows {
            if let Some(constant) = Expression::constant(name) {
                self.advance();
                return Ok(constant);
            }
            if Unit::is_unit_symbol(name) {
                return self.parse_unit_literal();
            }
        }
        self.parse_path()
    }

    fn parse_function_call(&mut self, name: &str) -> ExprResult<Expression> {
        // names outside the registry stay parseable as user-space calls
        // and fail when evaluated
        let f = functions::lookup(name).unwrap_or(functions::Function::User);
        self.advance();
        self.expect(&TokenKind::LParen, "'('")?;

        let mut args = Vec::new();
        if self.current() != Some(&TokenKind::RParen) {
            args.push(self.parse_expression()?);
            while self.current() == Some(&TokenKind::Semicolon) {
                self.advance();
                args.push(self.parse_expression()?);
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Expression::function(f, name, args)
    }

    // === Quantities and units ===

    fn parse_quantity(&mut self, value: f64) -> ExprResult<Expression> {
        let number = Expression::number(Quantity::dimensionless(value));
        match self.current() {
            Some(TokenKind::Identifier(name)) if Unit::is_unit_symbol(name) => {
                let unit = self.parse_unit_literal()?;
                Ok(Expression::binary(Op::Unit, number, unit))
            }
            _ => Ok(number),
        }
    }

    /// A unit term: `mm`, `mm^2`, `mm/s`, `1/s`
    fn parse_unit_literal(&mut self) -> ExprResult<Expression> {
        // reciprocal form: `1/s`, with an optional exponent
        if let (Some(TokenKind::Number(v)), Some(TokenKind::Slash)) =
            (self.current(), self.peek(1))
        {
            if *v == 1.0 {
                self.advance();
                self.advance();
                let mut text = self.expect_unit_symbol()?;
                if let (Some(TokenKind::Caret), Some(TokenKind::Number(exp))) =
                    (self.current(), self.peek(1))
                {
                    let exp = *exp;
                    if exp != exp.trunc() {
                        return Err(ExprError::Parse("unit exponent must be an integer".into()));
                    }
                    self.advance();
                    self.advance();
                    text.push('^');
                    text.push_str(&format!("{}", exp as i64));
                }
                let (unit, scale) = Unit::parse(&text)?;
                return Ok(Expression::unit(
                    Quantity::with_unit(1.0 / scale, unit.pow(-1)),
                    &format!("1/{}", text),
                ));
            }
        }

        let mut text = String::new();
        match self.current().cloned() {
            Some(TokenKind::Identifier(name)) if Unit::is_unit_symbol(&name) => {
                self.advance();
                text.push_str(&name);
            }
            _ => {
                return Err(ExprError::Parse(format!(
                    "expected a unit near offset {}",
                    self.current_start()
                )))
            }
        }

        loop {
            match (self.current(), self.peek(1)) {
                (Some(TokenKind::Caret), Some(TokenKind::Number(exp))) => {
                    let exp = *exp;
                    if exp != exp.trunc() {
                        return Err(ExprError::Parse("unit exponent must be an integer".into()));
                    }
                    self.advance();
                    self.advance();
                    text.push('^');
                    text.push_str(&format!("{}", exp as i64));
                }
                (Some(TokenKind::Slash), Some(TokenKind::Identifier(name)))
                    if Unit::is_unit_symbol(name) =>
                {
                    text.push('/');
                    text.push_str(name);
                    self.advance();
                    self.advance();
                }
                (Some(TokenKind::Star), Some(TokenKind::Identifier(name)))
                    if Unit::is_unit_symbol(name) =>
                {
                    text.push('*');
                    text.push_str(name);
                    self.advance();
                    self.advance();
                }
                _ => break,
            }
        }

        let (unit, scale) = Unit::parse(&text)?;
        Ok(Expression::unit(Quantity::with_unit(scale, unit), &text))
    }

    fn expect_unit_symbol(&mut self) -> ExprResult<String> {
        match self.current().cloned() {
            Some(TokenKind::Identifier(name)) if Unit::is_unit_symbol(&name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(ExprError::Parse(format!(
                "expected a unit near offset {}",
                self.current_start()
            ))),
        }
    }

    // === Object paths ===

    fn parse_path(&mut self) -> ExprResult<Expression> {
        let mut ident = ObjectIdentifier::new(self.owner);

        // optional `Doc#` prefix
        if self.peek(1) == Some(&TokenKind::Hash) {
            let doc = match self.current().cloned() {
                Some(TokenKind::Identifier(name)) => PathString::identifier(&name),
                Some(TokenKind::Quoted(name)) => PathString::label(&name),
                _ => {
                    return Err(ExprError::Parse(format!(
                        "expected a document name near offset {}",
                        self.current_start()
                    )))
                }
            };
            ident.set_document_name(doc);
            self.advance();
            self.advance();
            // with an explicit document the object segment is mandatory
            let obj = match self.current().cloned() {
                Some(TokenKind::Identifier(name)) => PathString::identifier(&name),
                Some(TokenKind::Quoted(name)) => PathString::label(&name),
                _ => {
                    return Err(ExprError::Parse(format!(
                        "expected an object name near offset {}",
                        self.current_start()
                    )))
                }
            };
            ident.set_object_name(obj);
            self.advance();
            self.expect(&TokenKind::Dot, "'.'")?;
        } else if let Some(TokenKind::Quoted(name)) = self.current().cloned() {
            // `<<Label>>.` names the object by label
            ident.set_object_name(PathString::label(&name));
            self.advance();
            self.expect(&TokenKind::Dot, "'.'")?;
        }

        if ident.has_explicit_object() {
            self.parse_sub_object(&mut ident)?;
        }
        self.parse_path_components(&mut ident)?;

        if ident.components().is_empty() {
            return Err(ExprError::Parse(format!(
                "expected a property name near offset {}",
                self.current_start()
            )));
        }
        Ok(Expression::variable(ident))
    }

    // A quoted segment with embedded dots, or a chain of `$Label` segments,
    // addresses sub-objects below the named object.
    fn parse_sub_object(&mut self, ident: &mut ObjectIdentifier) -> ExprResult<()> {
        if let Some(TokenKind::Quoted(body)) = self.current().cloned() {
            if self.peek(1) == Some(&TokenKind::Dot) {
                let mut sub = body;
                if !sub.ends_with('.') {
                    sub.push('.');
                }
                ident.set_sub_object_name(&sub);
                self.advance();
                self.advance();
                return Ok(());
            }
        }
        let mut sub = String::new();
        while let Some(TokenKind::Identifier(name)) = self.current() {
            if !name.starts_with('$') || self.peek(1) != Some(&TokenKind::Dot) {
                break;
            }
            sub.push_str(name);
            sub.push('.');
            self.advance();
            self.advance();
        }
        if !sub.is_empty() {
            ident.set_sub_object_name(&sub);
        }
        Ok(())
    }

    fn parse_path_components(&mut self, ident: &mut ObjectIdentifier) -> ExprResult<()> {
        loop {
            match self.current().cloned() {
                Some(TokenKind::Identifier(name)) => {
                    ident.add_component(Component::Simple(name));
                    self.advance();
                }
                // `Link.<<Part1.>>.Width`: a lone leading component turns
                // out to name the object once a sub-object chain follows
                Some(TokenKind::Quoted(body))
                    if ident.components().len() == 1
                        && !ident.has_explicit_object()
                        && self.peek(1) == Some(&TokenKind::Dot) =>
                {
                    let Some(Component::Simple(obj)) =
                        ident.components().first().cloned()
                    else {
                        break;
                    };
                    *ident = {
                        let mut promoted = ObjectIdentifier::new(self.owner);
                        promoted.set_object_name(PathString::identifier(&obj));
                        let mut sub = body;
                        if !sub.ends_with('.') {
                            sub.push('.');
                        }
                        promoted.set_sub_object_name(&sub);
                        promoted
                    };
                    self.advance();
                    self.advance();
                    continue;
                }
                _ => {
                    if ident.components().is_empty() {
                        break;
                    }
                    return Err(ExprError::Parse(format!(
                        "expected a property name near offset {}",
                        self.current_start()
                    )));
                }
            }
            while self.current() == Some(&TokenKind::LBracket) {
                let comp = self.parse_bracket_component()?;
                ident.add_component(comp);
            }
            if self.current() == Some(&TokenKind::Dot)
                && matches!(
                    self.peek(1),
                    Some(TokenKind::Identifier(_)) | Some(TokenKind::Quoted(_))
                )
            {
                self.advance();
                continue;
            }
            break;
        }
        Ok(())
    }

    fn parse_bracket_component(&mut self) -> ExprResult<Component> {
        self.expect(&TokenKind::LBracket, "'['")?;

        if let Some(TokenKind::Quoted(key)) = self.current().cloned() {
            self.advance();
            self.expect(&TokenKind::RBracket, "']'")?;
            return Ok(Component::Map(key));
        }
        if let Some(TokenKind::CharString(key)) = self.current().cloned() {
            self.advance();
            self.expect(&TokenKind::RBracket, "']'")?;
            return Ok(Component::Map(key));
        }

        let begin = self.parse_optional_index()?;
        if self.current() != Some(&TokenKind::Colon) {
            let index = begin.ok_or_else(|| {
                ExprError::Parse(format!(
                    "expected an index near offset {}",
                    self.current_start()
                ))
            })?;
            self.expect(&TokenKind::RBracket, "']'")?;
            return Ok(Component::Array(index));
        }

        self.advance();
        let end = self.parse_optional_index()?;
        let step = if self.current() == Some(&TokenKind::Colon) {
            self.advance();
            self.parse_optional_index()?
        } else {
            None
        };
        self.expect(&TokenKind::RBracket, "']'")?;
        Ok(Component::Range { begin, end, step })
    }

    fn parse_optional_index(&mut self) -> ExprResult<Option<i64>> {
        let negative = if self.current() == Some(&TokenKind::Minus) {
            self.advance();
            true
        } else {
            false
        };
        match self.current().cloned() {
            Some(TokenKind::Number(v)) => {
                if v != v.trunc() {
                    return Err(ExprError::Parse("index must be an integer".into()));
                }
                self.advance();
                let v = v as i64;
                Ok(Some(if negative { -v } else { v }))
            }
            _ if negative => Err(ExprError::Parse(format!(
                "expected an index near offset {}",
                self.current_start()
            ))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::evaluate;
    use partlab_core::{DocumentGraph, Value};
    use pretty_assertions::assert_eq;

    fn graph_with_owner() -> (DocumentGraph, ObjId) {
        let mut graph = DocumentGraph::new();
        let doc = graph.new_document("Model").unwrap();
        let owner = graph
            .document_mut(doc)
            .unwrap()
            .add_object("Sketch")
            .unwrap();
        (graph, owner)
    }

    fn roundtrip(text: &str) {
        let (_, owner) = graph_with_owner();
        let expr = parse(owner, text).unwrap();
        assert_eq!(expr.to_display_string(), text);
    }

    #[test]
    fn test_parse_arithmetic_precedence() {
        let (graph, owner) = graph_with_owner();
        let expr = parse(owner, "1 + 2 * 3").unwrap();
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from(7.0));

        let expr = parse(owner, "(1 + 2) * 3").unwrap();
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from(9.0));

        let expr = parse(owner, "2 ^ 3 ^ 2").unwrap();
        // left associative
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from(64.0));
    }

    #[test]
    fn test_parse_decimal_comma() {
        let (graph, owner) = graph_with_owner();
        let expr = parse(owner, "1,5 + 0.5").unwrap();
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from(2.0));
    }

    #[test]
    fn test_parse_quantity() {
        let (graph, owner) = graph_with_owner();
        let expr = parse(owner, "5 mm + 1 cm").unwrap();
        assert_eq!(
            evaluate(&graph, &expr).unwrap(),
            Value::from(Quantity::new(15.0, "mm").unwrap())
        );
    }

    #[test]
    fn test_parse_compound_unit() {
        let (graph, owner) = graph_with_owner();
        let expr = parse(owner, "4 mm^2").unwrap();
        assert_eq!(
            evaluate(&graph, &expr).unwrap(),
            Value::from(Quantity::new(4.0, "mm^2").unwrap())
        );

        let expr = parse(owner, "10 mm/s").unwrap();
        assert_eq!(
            evaluate(&graph, &expr).unwrap(),
            Value::from(Quantity::new(10.0, "mm/s").unwrap())
        );
    }

    #[test]
    fn test_parse_unit_division_binds_tighter() {
        let (graph, owner) = graph_with_owner();
        // 1/(8 mm), not (1/8) mm
        let expr = parse(owner, "1 / 8 mm").unwrap();
        let result = evaluate(&graph, &expr).unwrap();
        let q = result.as_quantity().unwrap();
        assert_eq!(q.unit(), Unit::LENGTH.pow(-1));
    }

    #[test]
    fn test_parse_unit_fn() {
        let expr = parse_unit("mm/s").unwrap();
        assert!(matches!(expr.kind, ExprKind::Unit { .. }));
        let expr = parse_unit("1/s").unwrap();
        let ExprKind::Unit { quantity, .. } = expr.kind else {
            panic!()
        };
        assert_eq!(quantity.unit(), Unit::TIME.pow(-1));
        assert!(parse_unit("nosuchunit").is_err());
    }

    #[test]
    fn test_parse_strings() {
        let (_, owner) = graph_with_owner();
        let expr = parse(owner, "<<hello world>>").unwrap();
        assert_eq!(expr.kind, ExprKind::String("hello world".into()));
        let expr = parse(owner, "'hello'").unwrap();
        assert_eq!(expr.kind, ExprKind::String("hello".into()));
        let expr = parse(owner, "<<a\\>b>>").unwrap();
        assert_eq!(expr.kind, ExprKind::String("a>b".into()));
    }

    #[test]
    fn test_parse_constants() {
        let (graph, owner) = graph_with_owner();
        let expr = parse(owner, "pi").unwrap();
        let result = evaluate(&graph, &expr).unwrap();
        let q = result.as_quantity().unwrap();
        assert!((q.value() - std::f64::consts::PI).abs() < 1e-15);

        let expr = parse(owner, "True ? 1 : 2").unwrap();
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from(1.0));
    }

    #[test]
    fn test_parse_function_call() {
        let (graph, owner) = graph_with_owner();
        let expr = parse(owner, "sqrt(4)").unwrap();
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from(2.0));

        let expr = parse(owner, "atan2(1; 1)").unwrap();
        let q = evaluate(&graph, &expr).unwrap().as_quantity().unwrap();
        assert!((q.value() - 45.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_function_parses_and_fails_at_evaluation() {
        let (graph, owner) = graph_with_owner();
        let expr = parse(owner, "frobnicate(1; 2)").unwrap();
        // the source name survives on the call node
        assert_eq!(expr.to_display_string(), "frobnicate(1; 2)");
        let err = evaluate(&graph, &expr).unwrap_err();
        assert!(err.to_string().contains("frobnicate"));
    }

    #[test]
    fn test_parse_wrong_arity_is_a_parse_error() {
        let (_, owner) = graph_with_owner();
        assert!(matches!(
            parse(owner, "sqrt(4; 2)"),
            Err(ExprError::ArgumentCount { .. })
        ));
    }

    #[test]
    fn test_parse_owner_relative_path() {
        let (mut graph, owner) = graph_with_owner();
        graph
            .object_mut(owner)
            .unwrap()
            .set_property("Width", Value::from(Quantity::new(4.0, "mm").unwrap()));
        let expr = parse(owner, "Width * 2").unwrap();
        assert_eq!(
            evaluate(&graph, &expr).unwrap(),
            Value::from(Quantity::new(8.0, "mm").unwrap())
        );
    }

    #[test]
    fn test_parse_label_path_roundtrip() {
        roundtrip("<<Crate>>.Length");
        roundtrip("Model#Box001.Length");
        roundtrip("<<My Doc>>#Box001.Length");
        roundtrip("Box001.Length");
        roundtrip("Cyl.Placement.Base.x");
    }

    #[test]
    fn test_parse_sub_object_path() {
        let (_, owner) = graph_with_owner();
        let expr = parse(owner, "Link.<<Part1.>>.Width").unwrap();
        let ExprKind::Variable(ident) = &expr.kind else {
            panic!()
        };
        assert_eq!(ident.object_name().map(|p| p.name.as_str()), Some("Link"));
        assert_eq!(ident.sub_object_name(), Some("Part1."));
        assert_eq!(ident.components().len(), 1);
        // single plain sub-object segments render without quoting
        assert_eq!(expr.to_display_string(), "Link.Part1.Width");
    }

    #[test]
    fn test_parse_label_sub_segments() {
        let (_, owner) = graph_with_owner();
        let expr = parse(owner, "<<Assembly>>.$Lid.Width").unwrap();
        let ExprKind::Variable(ident) = &expr.kind else {
            panic!()
        };
        assert_eq!(ident.sub_object_name(), Some("$Lid."));
        assert_eq!(ident.components().len(), 1);
    }

    #[test]
    fn test_parse_range() {
        let (_, owner) = graph_with_owner();
        let expr = parse(owner, "A1:B2").unwrap();
        assert!(matches!(expr.kind, ExprKind::Range { .. }));
        assert_eq!(expr.to_display_string(), "A1:B2");

        let expr = parse(owner, "sum(A1:A10)").unwrap();
        let ExprKind::Function { args, .. } = &expr.kind else {
            panic!()
        };
        assert!(matches!(args[0].kind, ExprKind::Range { .. }));
    }

    #[test]
    fn test_parse_pinned_range() {
        let (_, owner) = graph_with_owner();
        let expr = parse(owner, "$A$1:B2").unwrap();
        let ExprKind::Range { begin, .. } = expr.kind else {
            panic!()
        };
        assert!(begin.row_absolute);
        assert!(begin.col_absolute);
    }

    #[test]
    fn test_parse_components() {
        let (mut graph, owner) = graph_with_owner();
        graph.object_mut(owner).unwrap().set_property(
            "Points",
            Value::List(vec![Value::from(1.0), Value::from(2.0), Value::from(3.0)]),
        );
        let expr = parse(owner, "Points[-1]").unwrap();
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from(3.0));

        let expr = parse(owner, "Points[1:]").unwrap();
        assert_eq!(
            evaluate(&graph, &expr).unwrap(),
            Value::List(vec![Value::from(2.0), Value::from(3.0)])
        );

        let expr = parse(owner, "Points[::2]").unwrap();
        assert_eq!(
            evaluate(&graph, &expr).unwrap(),
            Value::List(vec![Value::from(1.0), Value::from(3.0)])
        );
    }

    #[test]
    fn test_parse_postfix_on_function_result() {
        let (graph, owner) = graph_with_owner();
        let expr = parse(owner, "list(10; 20)[1]").unwrap();
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from(20.0));

        let expr = parse(owner, "vector(1; 2; 3).y").unwrap();
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from(2.0));
    }

    #[test]
    fn test_parse_conditional() {
        let (graph, owner) = graph_with_owner();
        let expr = parse(owner, "1 < 2 ? 10 : 20").unwrap();
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from(10.0));
        assert_eq!(expr.to_display_string(), "1 < 2 ? 10 : 20");

        // nested conditionals are right associative
        let expr = parse(owner, "0 ? 1 : 0 ? 2 : 3").unwrap();
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from(3.0));
    }

    #[test]
    fn test_parse_map_key_component() {
        let (_, owner) = graph_with_owner();
        let expr = parse(owner, "Config[<<depth>>]").unwrap();
        let ExprKind::Variable(ident) = &expr.kind else {
            panic!()
        };
        assert_eq!(ident.components()[1], Component::Map("depth".into()));
    }

    #[test]
    fn test_parse_errors() {
        let (_, owner) = graph_with_owner();
        assert!(parse(owner, "1 +").is_err());
        assert!(parse(owner, "(1 + 2").is_err());
        assert!(parse(owner, "1 @ 2").is_err());
        assert!(parse(owner, "<<unterminated").is_err());
        assert!(parse(owner, "").is_err());
    }

    #[test]
    fn test_tokenize_partial_on_error() {
        let tokens = tokenize("1 + @ 2");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].kind, TokenKind::Plus);
        assert_eq!(tokens[1].start, 2);
    }

    #[test]
    fn test_unary_binds_tighter_than_power() {
        let (graph, owner) = graph_with_owner();
        let expr = parse(owner, "-2 ^ 2").unwrap();
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from(4.0));
        // a negative exponent is still a unary operand
        let expr = parse(owner, "2 ^ -1").unwrap();
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from(0.5));
        // negating a power takes explicit parentheses
        let expr = parse(owner, "-(2 ^ 2)").unwrap();
        assert_eq!(evaluate(&graph, &expr).unwrap(), Value::from(-4.0));
    }
}
