use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single loan attribute, as read from a loan record or written in a
/// covenant.
///
/// Loan data is a mix of numeric measures (rates, LTVs, credit scores),
/// categorical codes (state, purpose, occupancy) and gaps. Covenants compare
/// against all three, so values carry their kind explicitly.
///
/// # Examples
///
/// ```
/// use facility_allocator::core::value::AttrValue;
///
/// assert_eq!(AttrValue::parse_literal("720"), AttrValue::Number(720.0));
/// assert_eq!(AttrValue::parse_literal("CA"), AttrValue::Text("CA".into()));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Number(f64),
    Text(String),
    Missing,
}

impl AttrValue {
    /// Interpret a configuration literal: numbers when they parse, text otherwise.
    pub fn parse_literal(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return AttrValue::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => AttrValue::Number(n),
            _ => AttrValue::Text(trimmed.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            AttrValue::Text(s) => s.trim().parse::<f64>().ok(),
            AttrValue::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, AttrValue::Missing)
    }

    /// Order two values, or `None` when they cannot be compared.
    ///
    /// Text that looks like a number is compared numerically against a
    /// number (`zip_3 = "940"` vs `940`).
    pub fn partial_compare(&self, other: &AttrValue) -> Option<Ordering> {
        match (self, other) {
            (AttrValue::Number(a), AttrValue::Number(b)) => a.partial_cmp(b),
            (AttrValue::Text(a), AttrValue::Text(b)) => Some(a.as_str().cmp(b.as_str())),
            (AttrValue::Text(_), AttrValue::Number(b)) => {
                self.as_number().and_then(|a| a.partial_cmp(b))
            }
            (AttrValue::Number(a), AttrValue::Text(_)) => {
                other.as_number().and_then(|b| a.partial_cmp(&b))
            }
            _ => None,
        }
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Number(n)
    }
}

impl From<Option<f64>> for AttrValue {
    fn from(n: Option<f64>) -> Self {
        n.map_or(AttrValue::Missing, AttrValue::Number)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Number(n) => write!(f, "{}", n),
            AttrValue::Text(s) => write!(f, "{}", s),
            AttrValue::Missing => Ok(()),
        }
    }
}

/// Comparison operator used by asset covenants.
///
/// Anything outside the four supported symbols is kept verbatim as
/// `Unknown` and never matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Le,
    Ge,
    Unknown(String),
}

impl Operator {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "==" => Operator::Eq,
            "!=" => Operator::Ne,
            "<=" => Operator::Le,
            ">=" => Operator::Ge,
            other => Operator::Unknown(other.to_string()),
        }
    }

    /// Apply the operator as `lhs <op> rhs`.
    ///
    /// Missing or mismatched operands fail every test except `!=`.
    pub fn apply(&self, lhs: &AttrValue, rhs: &AttrValue) -> bool {
        let ordering = lhs.partial_compare(rhs);
        match self {
            Operator::Eq => ordering == Some(Ordering::Equal),
            Operator::Ne => ordering != Some(Ordering::Equal),
            Operator::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            Operator::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            Operator::Unknown(_) => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Eq => write!(f, "=="),
            Operator::Ne => write!(f, "!="),
            Operator::Le => write!(f, "<="),
            Operator::Ge => write!(f, ">="),
            Operator::Unknown(s) => write!(f, "{}", s),
        }
    }
}
