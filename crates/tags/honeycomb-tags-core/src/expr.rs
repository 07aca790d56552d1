//! Boolean tag expressions.
//!
//! Grammar, loosest binding first:
//! ```text
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | primary
//! primary := tag | "(" or ")"
//! ```

use std::fmt;

use crate::error::TagError;

/// Characters reserved by the expression grammar (whitespace is rejected separately).
pub const RESERVED: &[char] = &['!', '&', '|', '(', ')', '<', '>', '=', '~'];

/// Check that `tag` can be referenced unambiguously from an expression.
pub fn validate_tag(tag: &str) -> Result<(), TagError> {
    let reason = if tag.is_empty() {
        "tags cannot be empty".to_string()
    } else if let Some(c) = tag.chars().find(|c| c.is_whitespace()) {
        format!("whitespace {c:?} is not allowed")
    } else if let Some(c) = tag.chars().find(|c| RESERVED.contains(c)) {
        format!("'{c}' is reserved by the query grammar")
    } else {
        return Ok(());
    };
    Err(TagError::InvalidTag {
        tag: tag.to_string(),
        reason,
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagExpression {
    Tag(String),
    Not(Box<TagExpression>),
    And(Box<TagExpression>, Box<TagExpression>),
    Or(Box<TagExpression>, Box<TagExpression>),
}

impl TagExpression {
    pub fn parse(src: &str) -> Result<Self, TagError> {
        let tokens = tokenize(src)?;
        let mut parser = Parser {
            src,
            tokens: &tokens,
            pos: 0,
        };
        let expr = parser.or()?;
        match parser.peek() {
            None => Ok(expr),
            Some((at, token)) => Err(syntax(src, at, format!("unexpected {token}"))),
        }
    }

    /// Evaluate against a tag membership test.
    pub fn matches<F>(&self, has: &F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        match self {
            TagExpression::Tag(tag) => has(tag),
            TagExpression::Not(inner) => !inner.matches(has),
            TagExpression::And(a, b) => a.matches(has) && b.matches(has),
            TagExpression::Or(a, b) => a.matches(has) || b.matches(has),
        }
    }

    /// Every tag the expression mentions, in order of appearance.
    pub fn tags(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_tags(&mut out);
        out
    }

    fn collect_tags<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            TagExpression::Tag(tag) => out.push(tag),
            TagExpression::Not(inner) => inner.collect_tags(out),
            TagExpression::And(a, b) | TagExpression::Or(a, b) => {
                a.collect_tags(out);
                b.collect_tags(out);
            }
        }
    }
}

impl fmt::Display for TagExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagExpression::Tag(tag) => f.write_str(tag),
            TagExpression::Not(inner) => write!(f, "!{inner}"),
            TagExpression::And(a, b) => write!(f, "({a} && {b})"),
            TagExpression::Or(a, b) => write!(f, "({a} || {b})"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token<'a> {
    Tag(&'a str),
    Not,
    And,
    Or,
    Open,
    Close,
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Tag(tag) => write!(f, "tag '{tag}'"),
            Token::Not => f.write_str("'!'"),
            Token::And => f.write_str("'&&'"),
            Token::Or => f.write_str("'||'"),
            Token::Open => f.write_str("'('"),
            Token::Close => f.write_str("')'"),
        }
    }
}

fn syntax(src: &str, position: usize, message: impl Into<String>) -> TagError {
    TagError::Syntax {
        expr: src.to_string(),
        position,
        message: message.into(),
    }
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token<'_>)>, TagError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();
    while let Some((at, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '!' => Token::Not,
            '(' => Token::Open,
            ')' => Token::Close,
            '&' | '|' => {
                if chars.next_if(|(_, next)| *next == c).is_none() {
                    return Err(syntax(src, at, format!("expected '{c}{c}'")));
                }
                if c == '&' {
                    Token::And
                } else {
                    Token::Or
                }
            }
            '<' | '>' | '=' | '~' => {
                return Err(syntax(src, at, format!("'{c}' is not a supported operator")))
            }
            _ => {
                let mut end = at + c.len_utf8();
                while let Some((i, next)) =
                    chars.next_if(|(_, n)| !n.is_whitespace() && !RESERVED.contains(n))
                {
                    end = i + next.len_utf8();
                }
                Token::Tag(&src[at..end])
            }
        };
        tokens.push((at, token));
    }
    Ok(tokens)
}

struct Parser<'s, 't> {
    src: &'s str,
    tokens: &'t [(usize, Token<'s>)],
    pos: usize,
}

impl<'s, 't> Parser<'s, 't> {
    fn peek(&self) -> Option<(usize, &'t Token<'s>)> {
        self.tokens.get(self.pos).map(|(at, token)| (*at, token))
    }

    fn eat(&mut self, expected: &Token<'_>) -> bool {
        if self.peek().is_some_and(|(_, token)| token == expected) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn or(&mut self) -> Result<TagExpression, TagError> {
        let mut lhs = self.and()?;
        while self.eat(&Token::Or) {
            let rhs = self.and()?;
            lhs = TagExpression::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<TagExpression, TagError> {
        let mut lhs = self.unary()?;
        while self.eat(&Token::And) {
            let rhs = self.unary()?;
            lhs = TagExpression::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<TagExpression, TagError> {
        if self.eat(&Token::Not) {
            return Ok(TagExpression::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<TagExpression, TagError> {
        let Some((at, token)) = self.peek() else {
            return Err(syntax(self.src, self.src.len(), "unexpected end of expression"));
        };
        self.pos += 1;
        match token {
            Token::Tag(tag) => Ok(TagExpression::Tag(tag.to_string())),
            Token::Open => {
                let inner = self.or()?;
                if !self.eat(&Token::Close) {
                    let at = self.peek().map_or(self.src.len(), |(at, _)| at);
                    return Err(syntax(self.src, at, "expected ')'"));
                }
                Ok(inner)
            }
            other => Err(syntax(self.src, at, format!("unexpected {other}"))),
        }
    }
}
