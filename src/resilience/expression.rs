//! Circuit breaker trip expressions.
//!
//! ```text
//! expr       := and ( "||" and )*
//! and        := term ( "&&" term )*
//! term       := "(" expr ")" | comparison
//! comparison := metric op number
//! metric     := NetworkErrorRatio()
//!             | LatencyAtQuantileMS(q)
//!             | ResponseCodeRatio(from, to, dividend_from, dividend_to)
//! op         := "<" | "<=" | ">" | ">=" | "==" | "!="
//! ```

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::resilience::window::MetricsSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("unexpected character `{0}` at offset {1}")]
    UnexpectedChar(char, usize),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: &'static str, found: String },

    #[error("unknown metric `{0}`")]
    UnknownMetric(String),

    #[error("metric `{name}` takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("argument `{0}` of ResponseCodeRatio is not a status code")]
    StatusCode(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    NetworkErrorRatio,
    LatencyAtQuantileMs(f64),
    ResponseCodeRatio(u16, u16, u16, u16),
}

impl Metric {
    fn value(&self, snapshot: &MetricsSnapshot) -> f64 {
        match *self {
            Metric::NetworkErrorRatio => snapshot.network_error_ratio(),
            Metric::LatencyAtQuantileMs(q) => snapshot.latency_at_quantile_ms(q),
            Metric::ResponseCodeRatio(a, b, c, d) => snapshot.response_code_ratio(a, b, c, d),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
        }
    }
}

/// A parsed trip condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Or(Box<Expression>, Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Compare { metric: Metric, op: CmpOp, value: f64 },
}

impl Expression {
    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> bool {
        match self {
            Expression::Or(a, b) => a.evaluate(snapshot) || b.evaluate(snapshot),
            Expression::And(a, b) => a.evaluate(snapshot) && b.evaluate(snapshot),
            Expression::Compare { metric, op, value } => op.apply(metric.value(snapshot), *value),
        }
    }
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = tokenize(s)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(tok) => Err(ExpressionError::UnexpectedToken {
                expected: "end of expression",
                found: tok.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    LParen,
    RParen,
    Comma,
    Op(CmpOp),
    And,
    Or,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "`{}`", name),
            Token::Number(n) => write!(f, "`{}`", n),
            Token::LParen => f.write_str("`(`"),
            Token::RParen => f.write_str("`)`"),
            Token::Comma => f.write_str("`,`"),
            Token::Op(op) => write!(f, "`{:?}`", op),
            Token::And => f.write_str("`&&`"),
            Token::Or => f.write_str("`||`"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '<' | '>' | '=' | '!' => {
                let (op, width) = match (c, next) {
                    ('<', Some('=')) => (CmpOp::Le, 2),
                    ('<', _) => (CmpOp::Lt, 1),
                    ('>', Some('=')) => (CmpOp::Ge, 2),
                    ('>', _) => (CmpOp::Gt, 1),
                    ('=', Some('=')) => (CmpOp::Eq, 2),
                    ('!', Some('=')) => (CmpOp::Ne, 2),
                    _ => return Err(ExpressionError::UnexpectedChar(c, i)),
                };
                tokens.push(Token::Op(op));
                i += width;
            }
            c if c.is_ascii_digit() || c == '.' || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse()
                    .map_err(|_| ExpressionError::UnexpectedChar(c, start))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            c => return Err(ExpressionError::UnexpectedChar(c, i)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ExpressionError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExpressionError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect(&mut self, want: Token, expected: &'static str) -> Result<(), ExpressionError> {
        let tok = self.next()?;
        if tok == want {
            Ok(())
        } else {
            Err(ExpressionError::UnexpectedToken {
                expected,
                found: tok.to_string(),
            })
        }
    }

    fn or(&mut self) -> Result<Expression, ExpressionError> {
        let mut lhs = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.and()?;
            lhs = Expression::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expression, ExpressionError> {
        let mut lhs = self.term()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expression::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expression, ExpressionError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.or()?;
            self.expect(Token::RParen, "`)`")?;
            return Ok(inner);
        }

        let metric = self.metric()?;
        let op = match self.next()? {
            Token::Op(op) => op,
            other => {
                return Err(ExpressionError::UnexpectedToken {
                    expected: "comparison operator",
                    found: other.to_string(),
                })
            }
        };
        let value = match self.next()? {
            Token::Number(n) => n,
            other => {
                return Err(ExpressionError::UnexpectedToken {
                    expected: "number",
                    found: other.to_string(),
                })
            }
        };
        Ok(Expression::Compare { metric, op, value })
    }

    fn metric(&mut self) -> Result<Metric, ExpressionError> {
        let name = match self.next()? {
            Token::Ident(name) => name,
            other => {
                return Err(ExpressionError::UnexpectedToken {
                    expected: "metric name",
                    found: other.to_string(),
                })
            }
        };
        self.expect(Token::LParen, "`(`")?;

        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                match self.next()? {
                    Token::Number(n) => args.push(n),
                    other => {
                        return Err(ExpressionError::UnexpectedToken {
                            expected: "number",
                            found: other.to_string(),
                        })
                    }
                }
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen, "`)`")?;

        let arity = |expected: usize| -> Result<(), ExpressionError> {
            if args.len() == expected {
                Ok(())
            } else {
                Err(ExpressionError::Arity {
                    name: name.clone(),
                    expected,
                    got: args.len(),
                })
            }
        };

        match name.as_str() {
            "NetworkErrorRatio" => {
                arity(0)?;
                Ok(Metric::NetworkErrorRatio)
            }
            "LatencyAtQuantileMS" => {
                arity(1)?;
                Ok(Metric::LatencyAtQuantileMs(args[0]))
            }
            "ResponseCodeRatio" => {
                arity(4)?;
                let code = |n: f64| -> Result<u16, ExpressionError> {
                    if n.fract() == 0.0 && (0.0..=1000.0).contains(&n) {
                        Ok(n as u16)
                    } else {
                        Err(ExpressionError::StatusCode(n.to_string()))
                    }
                };
                Ok(Metric::ResponseCodeRatio(
                    code(args[0])?,
                    code(args[1])?,
                    code(args[2])?,
                    code(args[3])?,
                ))
            }
            _ => Err(ExpressionError::UnknownMetric(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::window::{Outcome, RollingMetrics};
    use std::time::Duration;

    fn parse(s: &str) -> Result<Expression, ExpressionError> {
        s.parse()
    }

    #[test]
    fn parses_simple_comparison() {
        assert_eq!(
            parse("NetworkErrorRatio() > 0.5").unwrap(),
            Expression::Compare {
                metric: Metric::NetworkErrorRatio,
                op: CmpOp::Gt,
                value: 0.5
            }
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse(
            "LatencyAtQuantileMS(50.0) > 50 || NetworkErrorRatio() > 0.1 && ResponseCodeRatio(500, 600, 0, 600) >= 0.3",
        )
        .unwrap();
        match expr {
            Expression::Or(_, rhs) => assert!(matches!(*rhs, Expression::And(_, _))),
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn parentheses_group() {
        let expr = parse("(NetworkErrorRatio() > 0.1 || NetworkErrorRatio() < 0) && NetworkErrorRatio() != 1").unwrap();
        assert!(matches!(expr, Expression::And(_, _)));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(parse("Foo() > 1"), Err(ExpressionError::UnknownMetric(_))));
        assert!(matches!(parse("NetworkErrorRatio(1) > 1"), Err(ExpressionError::Arity { .. })));
        assert!(matches!(parse("NetworkErrorRatio() >"), Err(ExpressionError::UnexpectedEnd)));
        assert!(matches!(parse("NetworkErrorRatio() > 1 $"), Err(ExpressionError::UnexpectedChar('$', _))));
        assert!(matches!(parse("error-rate > 0.5"), Err(_)));
        assert!(matches!(parse("ResponseCodeRatio(500.5, 600, 0, 600) > 0"), Err(ExpressionError::StatusCode(_))));
        assert!(parse("").is_err());
    }

    #[test]
    fn evaluates_against_snapshot() {
        let metrics = RollingMetrics::default();
        metrics.record(Outcome::network_error(Duration::from_millis(5)));
        metrics.record(Outcome::response(200, Duration::from_millis(100)));
        let snap = metrics.snapshot();

        assert!(parse("NetworkErrorRatio() >= 0.5").unwrap().evaluate(&snap));
        assert!(!parse("NetworkErrorRatio() > 0.5").unwrap().evaluate(&snap));
        assert!(parse("LatencyAtQuantileMS(100) > 50").unwrap().evaluate(&snap));
        assert!(!parse("ResponseCodeRatio(500, 600, 0, 600) > 0").unwrap().evaluate(&snap));
    }
}
