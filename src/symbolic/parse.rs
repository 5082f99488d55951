//! Parsing of expressions from text.
//!
//! The input is normalized first: `**` is accepted as an alias of `^` and an
//! explicit multiplication is inserted between a digit and an adjacent letter
//! (`2x` becomes `2*x`, `x2` becomes `x*2`). The normalized text is then parsed
//! by a recursive descent parser with the usual precedence:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary ('^' unary)?
//! primary := number | name | name '(' expr ')' | '(' expr ')'
//! ```
//!
//! Exponentiation is right associative and binds tighter than unary minus, so
//! `-x^2` is `-(x^2)`.

use std::f64::consts;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use super::expr::{Expr, Func};

/// Error encountered while parsing an expression.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at position {position}")]
pub struct ParseError {
    message: String,
    position: usize,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }

    /// Description of the problem.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Character position in the normalized input where the problem was
    /// detected.
    pub fn position(&self) -> usize {
        self.position
    }
}

/// Parses an expression from text.
///
/// ```rust
/// use optcalc::symbolic::{parse, Point};
///
/// let f = parse("x^2 + 2y").unwrap();
/// let point: Point = [("x".to_string(), 1.0), ("y".to_string(), 3.0)].into();
/// assert_eq!(f.eval(&point), Ok(7.0));
/// ```
pub fn parse(text: &str) -> Result<Expr, ParseError> {
    let normalized = normalize(text);
    let tokens = tokenize(&normalized)?;

    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        end: normalized.chars().count(),
    };

    if tokens.is_empty() {
        return Err(ParseError::new("empty expression", 0));
    }

    let expr = parser.expr()?;

    match parser.peek() {
        None => Ok(expr),
        Some((token, position)) => Err(ParseError::new(
            format!("unexpected {}", token.describe()),
            position,
        )),
    }
}

/// Rewrites the shorthand notation into the canonical one.
pub(crate) fn normalize(text: &str) -> String {
    static DIGIT_LETTER: OnceLock<Regex> = OnceLock::new();
    static LETTER_DIGIT: OnceLock<Regex> = OnceLock::new();

    let digit_letter = DIGIT_LETTER.get_or_init(|| Regex::new(r"(\d)([a-zA-Z])").unwrap());
    let letter_digit = LETTER_DIGIT.get_or_init(|| Regex::new(r"([a-zA-Z])(\d)").unwrap());

    let text = text.trim().replace("**", "^");
    let text = digit_letter.replace_all(&text, "$1*$2").into_owned();
    letter_digit.replace_all(&text, "$1*$2").into_owned()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(value) => format!("number `{}`", value),
            Token::Name(name) => format!("name `{}`", name),
            Token::Plus => "`+`".to_string(),
            Token::Minus => "`-`".to_string(),
            Token::Star => "`*`".to_string(),
            Token::Slash => "`/`".to_string(),
            Token::Caret => "`^`".to_string(),
            Token::LParen => "`(`".to_string(),
            Token::RParen => "`)`".to_string(),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let chars = text.chars().collect::<Vec<_>>();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '^' => Token::Caret,
            '(' => Token::LParen,
            ')' => Token::RParen,
            c if c.is_ascii_digit() || c == '.' => {
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }

                let literal = chars[start..i].iter().collect::<String>();
                let value = literal.parse::<f64>().map_err(|_| {
                    ParseError::new(format!("invalid number `{}`", literal), start)
                })?;

                tokens.push((Token::Number(value), start));
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }

                let name = chars[start..i].iter().collect::<String>();
                tokens.push((Token::Name(name), start));
                continue;
            }
            c => {
                return Err(ParseError::new(
                    format!("unexpected character `{}`", c),
                    start,
                ))
            }
        };

        tokens.push((token, start));
        i += 1;
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [(Token, usize)],
    pos: usize,
    end: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<(&'a Token, usize)> {
        self.tokens.get(self.pos).map(|(token, at)| (token, *at))
    }

    fn advance(&mut self) -> Option<(&'a Token, usize)> {
        let next = self.peek();
        if next.is_some() {
            self.pos += 1;
        }
        next
    }

    fn eat(&mut self, expected: &Token) -> bool {
        match self.peek() {
            Some((token, _)) if token == expected => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.term()?;

        loop {
            if self.eat(&Token::Plus) {
                lhs = lhs + self.term()?;
            } else if self.eat(&Token::Minus) {
                lhs = lhs - self.term()?;
            } else {
                return Ok(lhs);
            }
        }
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;

        loop {
            if self.eat(&Token::Star) {
                lhs = lhs * self.unary()?;
            } else if self.eat(&Token::Slash) {
                lhs = lhs / self.unary()?;
            } else {
                return Ok(lhs);
            }
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Minus) {
            Ok(-self.unary()?)
        } else if self.eat(&Token::Plus) {
            self.unary()
        } else {
            self.power()
        }
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.primary()?;

        if self.eat(&Token::Caret) {
            Ok(base.pow(self.unary()?))
        } else {
            Ok(base)
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let (token, position) = self
            .advance()
            .ok_or_else(|| ParseError::new("unexpected end of expression", self.end))?;

        match token {
            Token::Number(value) => Ok(Expr::Const(*value)),
            Token::Name(name) => {
                if self.eat(&Token::LParen) {
                    let func = Func::from_name(name).ok_or_else(|| {
                        ParseError::new(format!("unknown function `{}`", name), position)
                    })?;
                    let arg = self.expr()?;
                    self.close_paren(position)?;
                    Ok(arg.apply(func))
                } else {
                    Ok(match name.as_str() {
                        "pi" => Expr::Const(consts::PI),
                        "E" => Expr::Const(consts::E),
                        _ => Expr::Var(name.clone()),
                    })
                }
            }
            Token::LParen => {
                let inner = self.expr()?;
                self.close_paren(position)?;
                Ok(inner)
            }
            token => Err(ParseError::new(
                format!("unexpected {}", token.describe()),
                position,
            )),
        }
    }

    fn close_paren(&mut self, opened_at: usize) -> Result<(), ParseError> {
        if self.eat(&Token::RParen) {
            Ok(())
        } else {
            let position = self.peek().map_or(self.end, |(_, at)| at);
            Err(ParseError::new(
                format!("unclosed parenthesis opened at position {}", opened_at),
                position,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crate::core::Point;

    fn point(pairs: &[(&str, f64)]) -> Point {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize("2x + x2"), "2*x + x*2");
        assert_eq!(normalize("x**2"), "x^2");
        assert_eq!(normalize("lambda_0"), "lambda_0");
    }

    #[test]
    fn precedence() {
        let p = point(&[("x", 3.0)]);

        assert_eq!(parse("-x^2").unwrap().eval(&p), Ok(-9.0));
        assert_eq!(parse("2^3^2").unwrap().eval(&p), Ok(512.0));
        assert_eq!(parse("1 + 2 * x").unwrap().eval(&p), Ok(7.0));
        assert_eq!(parse("(1 + 2) * x").unwrap().eval(&p), Ok(9.0));
        assert_relative_eq!(parse("x^-1").unwrap().eval(&p).unwrap(), 1.0 / 3.0);
        assert_eq!(parse("8 / 2 / 2").unwrap().eval(&p), Ok(2.0));
    }

    #[test]
    fn functions_and_constants() {
        let f = parse("sin(pi / 2) + log(E) + sqrt(.25) + abs(-2)").unwrap();
        assert_relative_eq!(f.eval(&Point::new()).unwrap(), 4.5);
    }

    #[test]
    fn implicit_multiplication() {
        let f = parse("2x + 3y").unwrap();
        assert_eq!(f.eval(&point(&[("x", 1.0), ("y", 2.0)])), Ok(8.0));
    }

    #[test]
    fn display_round_trip() {
        let samples = [
            "x^2 + y^2 - 2*x*y",
            "-x^2 + 3 / (1 + y)",
            "exp(-x) * sin(y) - 2^-x",
            "(x - 1)^2 - (-2) * y",
        ];
        let p = point(&[("x", 0.7), ("y", -1.3)]);

        for text in samples {
            let f = parse(text).unwrap();
            let g = parse(&f.to_string()).unwrap();
            assert_relative_eq!(f.eval(&p).unwrap(), g.eval(&p).unwrap());
        }
    }

    #[test]
    fn errors() {
        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
        assert!(parse("x +").is_err());
        assert!(parse("(x + 1").is_err());
        assert!(parse("x + 1)").is_err());
        assert!(parse("x $ y").is_err());
        assert!(parse("foo(x)").is_err());
        assert!(parse("1..2").is_err());

        let error = parse("x + #").unwrap_err();
        assert_eq!(error.position(), 4);
    }
}
