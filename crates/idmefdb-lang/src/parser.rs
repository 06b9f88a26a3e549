//! Recursive descent parser for criteria and selection strings.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Lexer, SpannedToken, Token};
use crate::span::{Span, Spanned};
use idmefdb_proto::CriterionOperator;

/// Parser over a single criteria or selection string.
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    source: &'source str,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            lexer: Lexer::new(source),
            source,
        }
    }

    /// Parse a complete criteria string.
    pub fn parse_criteria(&mut self) -> Result<CriteriaExpr, ParseError> {
        let expr = self.parse_or()?;
        self.expect_end()?;
        Ok(expr)
    }

    /// Parse a complete selection string: `object[/flag,...]`.
    pub fn parse_selected(&mut self) -> Result<SelectedExpr, ParseError> {
        let object = self.parse_object()?;
        let mut span = object.span;
        let mut flags = Vec::new();

        if let Some(slash) = self.eat(&Token::Slash)? {
            span = span.merge(slash.span);
            loop {
                let flag = self.expect_ident()?;
                span = span.merge(flag.span);
                flags.push(flag);
                if self.eat(&Token::Comma)?.is_none() {
                    break;
                }
            }
        }

        self.expect_end()?;
        Ok(SelectedExpr {
            object,
            flags,
            span,
        })
    }

    fn parse_or(&mut self) -> Result<CriteriaExpr, ParseError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or)?.is_some() {
            let right = self.parse_and()?;
            left = CriteriaExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<CriteriaExpr, ParseError> {
        let mut left = self.parse_unary()?;
        while self.eat(&Token::And)?.is_some() {
            let right = self.parse_unary()?;
            left = CriteriaExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<CriteriaExpr, ParseError> {
        if let Some(bang) = self.eat(&Token::Bang)? {
            let inner = self.parse_unary()?;
            let span = bang.span.merge(inner.span());
            return Ok(CriteriaExpr::Not(Box::new(inner), span));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<CriteriaExpr, ParseError> {
        if self.eat(&Token::LParen)?.is_some() {
            let expr = self.parse_or()?;
            self.expect_token(Token::RParen)?;
            return Ok(expr);
        }
        self.parse_criterion()
    }

    fn parse_criterion(&mut self) -> Result<CriteriaExpr, ParseError> {
        let path = self.parse_path()?;

        let Some(operator) = self.parse_operator()? else {
            let span = path.span;
            return Ok(CriteriaExpr::Criterion(CriterionExpr {
                path,
                operator: None,
                value: None,
                span,
            }));
        };

        let value = self.parse_value()?;
        let span = path.span.merge(value.span);
        Ok(CriteriaExpr::Criterion(CriterionExpr {
            path,
            operator: Some(operator),
            value: Some(value),
            span,
        }))
    }

    fn parse_operator(&mut self) -> Result<Option<Spanned<CriterionOperator>>, ParseError> {
        let operator = match self.lexer.peek()?.map(|t| &t.token) {
            Some(Token::Eq) => CriterionOperator::EQUAL,
            Some(Token::Ne) => CriterionOperator::NOT_EQUAL,
            Some(Token::Lt) => CriterionOperator::LESSER,
            Some(Token::Le) => CriterionOperator::LESSER_OR_EQUAL,
            Some(Token::Gt) => CriterionOperator::GREATER,
            Some(Token::Ge) => CriterionOperator::GREATER_OR_EQUAL,
            Some(Token::Substr) => CriterionOperator::SUBSTR,
            Some(Token::NotSubstr) => CriterionOperator::NOT_SUBSTR,
            Some(Token::Regex) => CriterionOperator::REGEX,
            Some(Token::NotRegex) => CriterionOperator::NOT_REGEX,
            _ => return Ok(None),
        };
        let tok = self.next_token()?;

        match self.eat(&Token::Star)? {
            Some(star) => Ok(Some(Spanned::new(operator.nocase(), tok.span.merge(star.span)))),
            None => Ok(Some(Spanned::new(operator, tok.span))),
        }
    }

    /// A quoted string, an unquoted run of adjacent tokens, or a sequence of
    /// `key:value` pairs.
    fn parse_value(&mut self) -> Result<Spanned<ValueExpr>, ParseError> {
        let tok = self.next_token()?;
        if !is_bare_token(&tok.token) {
            return match tok.token {
                Token::String(s) | Token::StringSingle(s) => {
                    Ok(Spanned::new(ValueExpr::Quoted(s), tok.span))
                }
                other => Err(ParseError::new(
                    format!("expected a value, found {}", other.describe()),
                    tok.span,
                )
                .with_hint("quote values containing spaces or operators")),
            };
        }

        let (tokens, span) = self.parse_bare_run(tok)?;
        let Some(pair) = broken_down_pair(&tokens) else {
            return Ok(Spanned::new(ValueExpr::Bare(self.slice(span)), span));
        };

        let mut pairs = vec![pair];
        let mut span = span;
        while matches!(self.lexer.peek()?.map(|t| &t.token), Some(Token::Ident(_))) {
            let first = self.next_token()?;
            let (tokens, run_span) = self.parse_bare_run(first)?;
            let pair = broken_down_pair(&tokens).ok_or_else(|| {
                ParseError::new(
                    format!("expected key:value, found '{}'", self.slice(run_span)),
                    run_span,
                )
            })?;
            pairs.push(pair);
            span = span.merge(run_span);
        }

        Ok(Spanned::new(ValueExpr::BrokenDown(pairs), span))
    }

    /// Consume tokens adjacent to `first` that may appear in an unquoted value.
    fn parse_bare_run(&mut self, first: SpannedToken) -> Result<(Vec<Token>, Span), ParseError> {
        let mut span = first.span;
        let mut tokens = vec![first.token];

        loop {
            match self.lexer.peek()? {
                Some(next) if next.span.start == span.end && is_bare_token(&next.token) => {}
                _ => break,
            }
            let next = self.next_token()?;
            span = span.merge(next.span);
            tokens.push(next.token);
        }

        Ok((tokens, span))
    }

    /// Parse an object path into its canonical text.
    fn parse_path(&mut self) -> Result<Spanned<String>, ParseError> {
        let first = self.expect_ident()?;
        let mut text = first.value;
        let mut span = first.span;

        if self.eat(&Token::LParen)?.is_some() {
            span = span.merge(self.parse_index(&mut text)?);
        }
        self.parse_path_tail(&mut text, &mut span)?;

        Ok(Spanned::new(text, span))
    }

    fn parse_path_tail(&mut self, text: &mut String, span: &mut Span) -> Result<(), ParseError> {
        while self.eat(&Token::Dot)?.is_some() {
            let segment = self.expect_ident()?;
            text.push('.');
            text.push_str(&segment.value);
            *span = span.merge(segment.span);

            if self.eat(&Token::LParen)?.is_some() {
                *span = span.merge(self.parse_index(text)?);
            }
        }
        Ok(())
    }

    /// Parse `n)` or `*)` after an opening parenthesis.
    fn parse_index(&mut self, text: &mut String) -> Result<Span, ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::Int(index) => text.push_str(&format!("({})", index)),
            Token::Star => text.push_str("(*)"),
            other => {
                return Err(ParseError::new(
                    format!("expected a list index, found {}", other.describe()),
                    tok.span,
                ))
            }
        }
        Ok(self.expect_token(Token::RParen)?.span)
    }

    fn parse_object(&mut self) -> Result<Spanned<ObjectExpr>, ParseError> {
        let tok = self.next_token()?;
        let name = match tok.token {
            Token::String(s) | Token::StringSingle(s) => {
                return Ok(Spanned::new(ObjectExpr::String(s), tok.span))
            }
            Token::Int(i) => return Ok(Spanned::new(ObjectExpr::Int(i), tok.span)),
            Token::Ident(name) => name,
            other => {
                return Err(ParseError::new(
                    format!("expected a path or function, found {}", other.describe()),
                    tok.span,
                ))
            }
        };

        let mut text = name;
        let mut span = tok.span;

        if self.eat(&Token::LParen)?.is_some() {
            let is_index = matches!(
                self.lexer.peek()?.map(|t| &t.token),
                Some(Token::Int(_) | Token::Star)
            );
            if !is_index {
                return self.parse_function_call(Spanned::new(text, tok.span));
            }
            span = span.merge(self.parse_index(&mut text)?);
        }
        self.parse_path_tail(&mut text, &mut span)?;

        Ok(Spanned::new(ObjectExpr::Path(text), span))
    }

    /// Parse the arguments of `name(` up to the closing parenthesis.
    fn parse_function_call(
        &mut self,
        name: Spanned<String>,
    ) -> Result<Spanned<ObjectExpr>, ParseError> {
        let mut args = Vec::new();

        let end = match self.eat(&Token::RParen)? {
            Some(close) => close.span,
            None => loop {
                args.push(self.parse_object()?);
                if self.eat(&Token::Comma)?.is_some() {
                    continue;
                }
                break self.expect_token(Token::RParen)?.span;
            },
        };

        let span = name.span.merge(end);
        Ok(Spanned::new(ObjectExpr::Function { name, args }, span))
    }

    fn slice(&self, span: Span) -> String {
        self.source
            .get(span.start..span.end)
            .unwrap_or_default()
            .to_string()
    }

    /// Consume the next token if it has the same kind as `expected`.
    fn eat(&mut self, expected: &Token) -> Result<Option<SpannedToken>, ParseError> {
        let matches = self
            .lexer
            .peek()?
            .is_some_and(|t| std::mem::discriminant(&t.token) == std::mem::discriminant(expected));
        if matches {
            self.lexer.next_token()
        } else {
            Ok(None)
        }
    }

    fn expect_ident(&mut self) -> Result<Spanned<String>, ParseError> {
        let tok = self.next_token()?;
        match tok.token {
            Token::Ident(name) => Ok(Spanned::new(name, tok.span)),
            other => Err(ParseError::new(
                format!("expected identifier, found {}", other.describe()),
                tok.span,
            )),
        }
    }

    fn expect_token(&mut self, expected: Token) -> Result<SpannedToken, ParseError> {
        let tok = self.next_token()?;
        if std::mem::discriminant(&tok.token) == std::mem::discriminant(&expected) {
            Ok(tok)
        } else {
            Err(ParseError::new(
                format!(
                    "expected {}, found {}",
                    expected.describe(),
                    tok.token.describe()
                ),
                tok.span,
            ))
        }
    }

    fn expect_end(&mut self) -> Result<(), ParseError> {
        match self.lexer.next_token()? {
            None => Ok(()),
            Some(tok) => Err(ParseError::new(
                format!("unexpected {}", tok.token.describe()),
                tok.span,
            )
            .with_hint("join criteria with '&&' or '||'")),
        }
    }

    /// Get the next token or error if EOF.
    fn next_token(&mut self) -> Result<SpannedToken, ParseError> {
        let eof = self.lexer.eof_span();
        self.lexer
            .next_token()?
            .ok_or_else(|| ParseError::new("unexpected end of input", eof))
    }
}

fn is_bare_token(token: &Token) -> bool {
    matches!(
        token,
        Token::Ident(_)
            | Token::Int(_)
            | Token::Float(_)
            | Token::Dot
            | Token::Colon
            | Token::Star
            | Token::Slash
    )
}

fn broken_down_pair(tokens: &[Token]) -> Option<(String, i64)> {
    match tokens {
        [Token::Ident(key), Token::Colon, Token::Int(value)] => Some((key.clone(), *value)),
        _ => None,
    }
}

/// Parse a criteria string into its syntax tree.
pub fn parse_criteria(source: &str) -> Result<CriteriaExpr, ParseError> {
    Parser::new(source).parse_criteria()
}

/// Parse a selection string into its syntax tree.
pub fn parse_selected(source: &str) -> Result<SelectedExpr, ParseError> {
    Parser::new(source).parse_selected()
}
