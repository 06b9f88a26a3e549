//! Lexer for criteria and selection strings using logos.

use crate::error::ParseError;
use crate::span::Span;
use logos::Logos;

/// Token types shared by the criteria and selection grammars.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // Boolean connectives
    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("!")]
    Bang,

    // Relations
    #[token("==")]
    #[token("=")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("<>")]
    Substr,
    #[token("!<>")]
    NotSubstr,
    #[token("~")]
    Regex,
    #[token("!~")]
    NotRegex,
    /// Case-insensitive suffix, or the wildcard index.
    #[token("*")]
    Star,

    // Identifier (one path segment, a unit or a flag name)
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // String literal (double-quoted)
    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len() - 1])
    })]
    String(String),

    // String literal (single-quoted)
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len() - 1])
    })]
    StringSingle(String),

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r"-?[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    // Punctuation
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("/")]
    Slash,
}

impl Token {
    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::And => "'&&'".into(),
            Token::Or => "'||'".into(),
            Token::Bang => "'!'".into(),
            Token::Eq => "'=='".into(),
            Token::Ne => "'!='".into(),
            Token::Lt => "'<'".into(),
            Token::Le => "'<='".into(),
            Token::Gt => "'>'".into(),
            Token::Ge => "'>='".into(),
            Token::Substr => "'<>'".into(),
            Token::NotSubstr => "'!<>'".into(),
            Token::Regex => "'~'".into(),
            Token::NotRegex => "'!~'".into(),
            Token::Star => "'*'".into(),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::String(s) | Token::StringSingle(s) => format!("string '{}'", s),
            Token::Int(i) => format!("integer {}", i),
            Token::Float(f) => format!("number {}", f),
            Token::Dot => "'.'".into(),
            Token::Comma => "','".into(),
            Token::Colon => "':'".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::Slash => "'/'".into(),
        }
    }
}

/// Unescape a string literal, handling common escape sequences.
fn unescape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some('\'') => result.push('\''),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }

    result
}

/// A token with its span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Lexer that produces spanned tokens and reports unrecognized input.
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
    peeked: Option<Option<SpannedToken>>,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
            peeked: None,
        }
    }

    /// Peek at the next token without consuming it.
    pub fn peek(&mut self) -> Result<Option<&SpannedToken>, ParseError> {
        if self.peeked.is_none() {
            let next = self.next_inner()?;
            self.peeked = Some(next);
        }
        Ok(self.peeked.as_ref().and_then(|o| o.as_ref()))
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Result<Option<SpannedToken>, ParseError> {
        match self.peeked.take() {
            Some(peeked) => Ok(peeked),
            None => self.next_inner(),
        }
    }

    fn next_inner(&mut self) -> Result<Option<SpannedToken>, ParseError> {
        match self.inner.next() {
            Some(Ok(token)) => Ok(Some(SpannedToken {
                token,
                span: self.inner.span().into(),
            })),
            Some(Err(())) => Err(ParseError::new(
                format!("unexpected input '{}'", self.inner.slice()),
                self.inner.span().into(),
            )),
            None => Ok(None),
        }
    }

    /// Span of the end of input.
    pub fn eof_span(&self) -> Span {
        let len = self.inner.source().len();
        Span::new(len, len)
    }

    pub fn source(&self) -> &'source str {
        self.inner.source()
    }
}

/// Tokenize a source string into a vector of spanned tokens.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, ParseError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}
