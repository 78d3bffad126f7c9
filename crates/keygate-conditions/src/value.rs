//! Typed predicate arguments, comparison operators and return-value tests.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::{ConditionError, ConditionResult};

/// Maximum number of arguments passed to a remote predicate.
pub const MAX_ARGS: usize = 16;

/// Maximum number of elements in one array argument.
pub const MAX_ARRAY_LEN: usize = 64;

/// Maximum array nesting depth inside one argument.
pub const MAX_VALUE_DEPTH: usize = 4;

/// Maximum length of a string argument, in bytes.
pub const MAX_STRING_LEN: usize = 1024;

/// A serializable argument or result value of a remote predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConditionValue {
    /// A boolean.
    Bool(bool),
    /// An unsigned 256-bit integer (amounts in wei, token ids).
    Uint(U256),
    /// A signed 64-bit integer.
    Int(i64),
    /// A UTF-8 string.
    String(String),
    /// An EVM address.
    Address(Address),
    /// A homogeneous or mixed list of values.
    Array(Vec<ConditionValue>),
}

impl ConditionValue {
    /// Check size and nesting limits.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::Malformed`] if a limit is exceeded.
    pub fn validate(&self) -> ConditionResult<()> {
        self.validate_at(0)
    }

    fn validate_at(&self, depth: usize) -> ConditionResult<()> {
        match self {
            Self::String(s) if s.len() > MAX_STRING_LEN => Err(ConditionError::malformed(
                format!("string argument exceeds {MAX_STRING_LEN} bytes"),
            )),
            Self::Array(items) => {
                if depth >= MAX_VALUE_DEPTH {
                    return Err(ConditionError::malformed(format!(
                        "array arguments nested deeper than {MAX_VALUE_DEPTH}"
                    )));
                }
                if items.len() > MAX_ARRAY_LEN {
                    return Err(ConditionError::malformed(format!(
                        "array argument has more than {MAX_ARRAY_LEN} elements"
                    )));
                }
                items
                    .iter()
                    .try_for_each(|item| item.validate_at(depth.saturating_add(1)))
            },
            _ => Ok(()),
        }
    }

    /// Name of the value's kind, for error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Uint(_) => "uint",
            Self::Int(_) => "int",
            Self::String(_) => "string",
            Self::Address(_) => "address",
            Self::Array(_) => "array",
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Self::Uint(_) | Self::Int(_))
    }
}

impl From<bool> for ConditionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<U256> for ConditionValue {
    fn from(value: U256) -> Self {
        Self::Uint(value)
    }
}

impl From<u64> for ConditionValue {
    fn from(value: u64) -> Self {
        Self::Uint(U256::from(value))
    }
}

impl From<i64> for ConditionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ConditionValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Address> for ConditionValue {
    fn from(value: Address) -> Self {
        Self::Address(value)
    }
}

impl<T: Into<ConditionValue>> From<Vec<T>> for ConditionValue {
    fn from(values: Vec<T>) -> Self {
        Self::Array(values.into_iter().map(Into::into).collect())
    }
}

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    /// `=`
    #[serde(rename = "=")]
    Eq,
    /// `!=`
    #[serde(rename = "!=")]
    Ne,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
}

impl Comparator {
    /// Apply `lhs <op> rhs`.
    #[must_use]
    pub fn apply<T: Ord + ?Sized>(self, lhs: &T, rhs: &T) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }

    /// Whether the operator only tests equality.
    #[must_use]
    pub fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }

    /// The operator's symbol.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Comparator {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(Self::Eq),
            "!=" | "≠" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" | "≤" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" | "≥" => Ok(Self::Ge),
            other => Err(ConditionError::malformed(format!(
                "unknown comparator: {other}"
            ))),
        }
    }
}

/// What a remote predicate must return for its leaf to hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReturnValueTest {
    /// How the returned value is compared.
    pub comparator: Comparator,
    /// The value it is compared against.
    pub expected: ConditionValue,
}

impl ReturnValueTest {
    /// Create a test. Ordering comparators require a numeric expected value.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::Malformed`] if the comparator cannot apply to
    /// the expected value or the value breaks size limits.
    pub fn new(comparator: Comparator, expected: impl Into<ConditionValue>) -> ConditionResult<Self> {
        let test = Self {
            comparator,
            expected: expected.into(),
        };
        test.validate()?;
        Ok(test)
    }

    /// The predicate must return exactly `expected`.
    #[must_use]
    pub fn equals(expected: impl Into<ConditionValue>) -> Self {
        Self {
            comparator: Comparator::Eq,
            expected: expected.into(),
        }
    }

    /// The predicate must return `true`.
    #[must_use]
    pub fn is_true() -> Self {
        Self::equals(true)
    }

    /// Check the test is applicable.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::Malformed`] for an ordering comparator
    /// against a non-numeric value or an oversized value.
    pub fn validate(&self) -> ConditionResult<()> {
        self.expected.validate()?;
        if !self.comparator.is_equality() && !self.expected.is_numeric() {
            return Err(ConditionError::malformed(format!(
                "comparator {} cannot apply to a {} value",
                self.comparator,
                self.expected.kind()
            )));
        }
        Ok(())
    }

    /// Compare a returned value against the expectation.
    ///
    /// # Errors
    ///
    /// Returns a description of the mismatch when the returned value's kind
    /// differs from the expected one.
    pub fn matches(&self, actual: &ConditionValue) -> Result<bool, String> {
        use ConditionValue as V;
        let op = self.comparator;
        match (actual, &self.expected) {
            (V::Uint(a), V::Uint(e)) => Ok(op.apply(a, e)),
            (V::Int(a), V::Int(e)) => Ok(op.apply(a, e)),
            (a, e) if a.kind() == e.kind() && op.is_equality() => {
                Ok((a == e) == (op == Comparator::Eq))
            },
            (a, e) => Err(format!(
                "returned {} but expected {} {}",
                a.kind(),
                op,
                e.kind()
            )),
        }
    }
}
