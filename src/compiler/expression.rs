//! Closed expression language for pool-covenant coefficients.
//!
//! Coefficient columns are written as small formulas over loan fields:
//!
//! ```text
//! orig_amt
//! orig_amt * oltv / 100
//! (state == 'CA') * orig_amt
//! random_df['CSCORE_B'] >= 700
//! ```
//!
//! The grammar only admits field references, numeric and string literals,
//! `+ - * /`, unary minus, parentheses and the comparisons
//! `== != <= >= < >` (which evaluate to 1 or 0). `table['field']` is read
//! as a plain reference to `field`. Nothing else can be expressed, so a
//! configuration file cannot run code.

use crate::core::error::ExpressionError;
use crate::core::loan::{Loan, LoanField};
use crate::core::value::AttrValue;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn test(&self, ordering: Option<Ordering>) -> bool {
        match self {
            CompareOp::Eq => ordering == Some(Ordering::Equal),
            CompareOp::Ne => ordering != Some(Ordering::Equal),
            CompareOp::Lt => ordering == Some(Ordering::Less),
            CompareOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            CompareOp::Gt => ordering == Some(Ordering::Greater),
            CompareOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        }
    }
}

/// Parsed coefficient expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Field(LoanField),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn parse(source: &str) -> Result<Expr, ExpressionError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.compare()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(ExpressionError::UnexpectedToken {
                found: token.to_string(),
                expected: "end of expression",
            }),
        }
    }

    /// Evaluate against one loan, producing a coefficient.
    pub fn evaluate(&self, loan: &Loan) -> Result<f64, ExpressionError> {
        match self.value(loan)? {
            AttrValue::Number(n) => Ok(n),
            AttrValue::Text(_) => Err(ExpressionError::TextInArithmetic),
            AttrValue::Missing => Err(self.missing(loan)),
        }
    }

    /// Evaluate against every loan, in order.
    pub fn evaluate_column<'a, I>(&self, loans: I) -> Result<Vec<f64>, ExpressionError>
    where
        I: IntoIterator<Item = &'a Loan>,
    {
        loans.into_iter().map(|loan| self.evaluate(loan)).collect()
    }

    fn value(&self, loan: &Loan) -> Result<AttrValue, ExpressionError> {
        match self {
            Expr::Number(n) => Ok(AttrValue::Number(*n)),
            Expr::Text(s) => Ok(AttrValue::Text(s.clone())),
            Expr::Field(field) => Ok(loan.get(*field)),
            Expr::Neg(inner) => Ok(AttrValue::Number(-inner.number(loan)?)),
            Expr::Binary(op, lhs, rhs) => {
                let (a, b) = (lhs.number(loan)?, rhs.number(loan)?);
                let result = match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => {
                        if b == 0.0 {
                            return Err(ExpressionError::DivisionByZero);
                        }
                        a / b
                    }
                };
                Ok(AttrValue::Number(result))
            }
            Expr::Compare(op, lhs, rhs) => {
                let ordering = lhs.value(loan)?.partial_compare(&rhs.value(loan)?);
                Ok(AttrValue::Number(if op.test(ordering) { 1.0 } else { 0.0 }))
            }
        }
    }

    fn number(&self, loan: &Loan) -> Result<f64, ExpressionError> {
        match self.value(loan)? {
            AttrValue::Number(n) => Ok(n),
            AttrValue::Text(_) => Err(ExpressionError::TextInArithmetic),
            AttrValue::Missing => Err(self.missing(loan)),
        }
    }

    fn missing(&self, loan: &Loan) -> ExpressionError {
        ExpressionError::MissingValue {
            loan_id: loan.loan_id().to_string(),
            field: self.to_string(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Text(s) => write!(f, "'{}'", s),
            Expr::Field(field) => write!(f, "{}", field),
            Expr::Neg(inner) => write!(f, "-({})", inner),
            Expr::Binary(op, lhs, rhs) => {
                let symbol = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "/",
                };
                write!(f, "({} {} {})", lhs, symbol, rhs)
            }
            Expr::Compare(op, lhs, rhs) => {
                let symbol = match op {
                    CompareOp::Eq => "==",
                    CompareOp::Ne => "!=",
                    CompareOp::Lt => "<",
                    CompareOp::Le => "<=",
                    CompareOp::Gt => ">",
                    CompareOp::Ge => ">=",
                };
                write!(f, "({} {} {})", lhs, symbol, rhs)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "'{}'", s),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Op(op) => write!(f, "{}", op),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            _ if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '+' | '-' | '*' | '/' => {
                tokens.push(Token::Op(match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    _ => "/",
                }));
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let two = chars.get(i + 1) == Some(&'=');
                let op = match (c, two) {
                    ('=', true) => "==",
                    ('!', true) => "!=",
                    ('<', true) => "<=",
                    ('>', true) => ">=",
                    ('<', false) => "<",
                    ('>', false) => ">",
                    _ => return Err(ExpressionError::UnexpectedChar { found: c, offset: i }),
                };
                tokens.push(Token::Op(op));
                i += if two { 2 } else { 1 };
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == quote)
                    .map(|p| start + p)
                    .ok_or(ExpressionError::UnterminatedString)?;
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            _ if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == '_') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().filter(|&&ch| ch != '_').collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| ExpressionError::UnexpectedChar { found: c, offset: start })?;
                tokens.push(Token::Number(value));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => return Err(ExpressionError::UnexpectedChar { found: c, offset: i }),
        }
    }
    Ok(tokens)
}

/// Nesting allowed for parentheses and unary minus combined.
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn nested<T>(
        &mut self,
        inner: impl FnOnce(&mut Self) -> Result<T, ExpressionError>,
    ) -> Result<T, ExpressionError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExpressionError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let result = inner(self);
        self.depth -= 1;
        result
    }

    fn peek_op(&self, candidates: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if candidates.contains(op) => Some(*op),
            _ => None,
        }
    }

    fn expect(&mut self, expected: Token, label: &'static str) -> Result<(), ExpressionError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(ExpressionError::UnexpectedToken {
                found: token.to_string(),
                expected: label,
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }

    fn compare(&mut self) -> Result<Expr, ExpressionError> {
        let lhs = self.sum()?;
        let Some(op) = self.peek_op(&["==", "!=", "<=", ">=", "<", ">"]) else {
            return Ok(lhs);
        };
        self.pos += 1;
        let rhs = self.sum()?;
        let op = match op {
            "==" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            "<=" => CompareOp::Le,
            ">=" => CompareOp::Ge,
            "<" => CompareOp::Lt,
            _ => CompareOp::Gt,
        };
        Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)))
    }

    fn sum(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.product()?;
        while let Some(op) = self.peek_op(&["+", "-"]) {
            self.pos += 1;
            let rhs = self.product()?;
            let op = if op == "+" { BinaryOp::Add } else { BinaryOp::Sub };
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn product(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.unary()?;
        while let Some(op) = self.peek_op(&["*", "/"]) {
            self.pos += 1;
            let rhs = self.unary()?;
            let op = if op == "*" { BinaryOp::Mul } else { BinaryOp::Div };
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek_op(&["-"]).is_some() {
            self.pos += 1;
            let inner = self.nested(Self::unary)?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Text(s)),
            Some(Token::LParen) => {
                let inner = self.nested(Self::compare)?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LBracket) {
                    self.pos += 1;
                    let column = match self.next() {
                        Some(Token::Str(column)) => column,
                        Some(token) => {
                            return Err(ExpressionError::UnexpectedToken {
                                found: token.to_string(),
                                expected: "quoted column name",
                            })
                        }
                        None => return Err(ExpressionError::UnexpectedEnd),
                    };
                    self.expect(Token::RBracket, "']'")?;
                    resolve_field(&column)
                } else {
                    resolve_field(&name)
                }
            }
            Some(token) => Err(ExpressionError::UnexpectedToken {
                found: token.to_string(),
                expected: "number, field or '('",
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }
}

fn resolve_field(name: &str) -> Result<Expr, ExpressionError> {
    name.parse::<LoanField>()
        .map(Expr::Field)
        .map_err(|_| ExpressionError::UnknownField(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    fn loan() -> Loan {
        Loan::new("L-1", dec!(200_000))
            .with_ltv(80.0)
            .with_state("CA")
            .with_credit_score(720.0)
    }

    #[test]
    fn test_field_reference() {
        let expr = Expr::parse("orig_amt").unwrap();
        assert_eq!(expr, Expr::Field(LoanField::Amount));
        assert_relative_eq!(expr.evaluate(&loan()).unwrap(), 200_000.0);
    }

    #[test]
    fn test_table_subscript_is_a_field() {
        let expr = Expr::parse("random_df['CSCORE_B']").unwrap();
        assert_eq!(expr, Expr::Field(LoanField::CreditScore));
    }

    #[test]
    fn test_precedence() {
        let expr = Expr::parse("1 + orig_amt * oltv / 100").unwrap();
        assert_relative_eq!(expr.evaluate(&loan()).unwrap(), 160_001.0);
        let expr = Expr::parse("(1 + 2) * -3").unwrap();
        assert_relative_eq!(expr.evaluate(&loan()).unwrap(), -9.0);
    }

    #[test]
    fn test_comparison_yields_indicator() {
        let in_ca = Expr::parse("(state == 'CA') * orig_amt").unwrap();
        assert_relative_eq!(in_ca.evaluate(&loan()).unwrap(), 200_000.0);
        let high_score = Expr::parse("df[\"CSCORE_B\"] >= 740").unwrap();
        assert_relative_eq!(high_score.evaluate(&loan()).unwrap(), 0.0);
    }

    #[test]
    fn test_rejects_code() {
        assert!(Expr::parse("__import__('os').system('ls')").is_err());
        assert!(Expr::parse("orig_amt; 1").is_err());
        assert_eq!(
            Expr::parse("balance"),
            Err(ExpressionError::UnknownField("balance".into()))
        );
    }

    #[test]
    fn test_evaluation_errors() {
        let l = loan();
        assert_eq!(
            Expr::parse("oltv / 0").unwrap().evaluate(&l),
            Err(ExpressionError::DivisionByZero)
        );
        assert_eq!(
            Expr::parse("state * 2").unwrap().evaluate(&l),
            Err(ExpressionError::TextInArithmetic)
        );
        assert!(matches!(
            Expr::parse("dti").unwrap().evaluate(&l),
            Err(ExpressionError::MissingValue { .. })
        ));
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(Expr::parse("(oltv"), Err(ExpressionError::UnexpectedEnd));
        assert_eq!(Expr::parse("state == 'CA"), Err(ExpressionError::UnterminatedString));
        assert!(Expr::parse("oltv = 1").is_err());
        assert!(Expr::parse("").is_err());
    }

    #[test]
    fn test_nesting_is_bounded() {
        let parens = format!("{}1{}", "(".repeat(5000), ")".repeat(5000));
        assert_eq!(Expr::parse(&parens), Err(ExpressionError::TooDeep(MAX_DEPTH)));
        let minus = format!("{}oltv", "-".repeat(5000));
        assert_eq!(Expr::parse(&minus), Err(ExpressionError::TooDeep(MAX_DEPTH)));

        let shallow = format!("{}2{}", "(".repeat(20), ")".repeat(20));
        assert_relative_eq!(Expr::parse(&shallow).unwrap().evaluate(&loan()).unwrap(), 2.0);
    }

    #[test]
    fn test_column_evaluation() {
        let loans = vec![loan(), Loan::new("L-2", dec!(50_000)).with_state("NV")];
        let column = Expr::parse("state != 'CA'").unwrap().evaluate_column(&loans).unwrap();
        assert_eq!(column, vec![0.0, 1.0]);
    }
}
