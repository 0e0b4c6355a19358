//! Dotted order strings and the sibling insertion rule.
//!
//! An order like `"1.42.after.1"` parses into the token list
//! `[1, 42, "after", 1]`. Numeric tokens compare numerically, other tokens
//! lexically, and numbers sort before words. The words `before` and `after`
//! pin an item to the start or end of its sibling run at that level.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One component of a dotted order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderToken {
    Number(i64),
    Word(String),
}

impl OrderToken {
    fn parse(raw: &str) -> Self {
        raw.parse::<i64>()
            .map(Self::Number)
            .unwrap_or_else(|_| Self::Word(raw.to_string()))
    }

    pub fn is_before(&self) -> bool {
        matches!(self, Self::Word(w) if w == "before")
    }

    pub fn is_after(&self) -> bool {
        matches!(self, Self::Word(w) if w == "after")
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Word(a), Self::Word(b)) => a.cmp(b),
            (Self::Number(_), Self::Word(_)) => Ordering::Less,
            (Self::Word(_), Self::Number(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for OrderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Word(w) => f.write_str(w),
        }
    }
}

/// A parsed order. The empty order means "unordered".
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Order(Vec<OrderToken>);

impl Order {
    /// Parse a dotted order string. Blank input yields the empty order.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::default();
        }
        Self(raw.split('.').map(OrderToken::parse).collect())
    }

    pub fn tokens(&self) -> &[OrderToken] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether an item with this order goes in front of a sibling ordered
    /// `existing`.
    ///
    /// Tokens are compared position by position:
    ///
    /// - a new `after` token never goes in front;
    /// - an existing `before` token can only be preceded by another `before`;
    /// - a new `before` token, or an existing `after` token, goes in front;
    /// - otherwise the smaller token goes in front, and equal tokens defer
    ///   to the next position.
    ///
    /// When every shared position is equal, a strictly shorter order goes
    /// first (`2` before `2.1`). Unordered items never go in front of
    /// anything, so they keep their insertion order at the end of a run.
    pub fn goes_before(&self, existing: &Order) -> bool {
        if self.is_empty() {
            return false;
        }
        for (position, token) in self.0.iter().enumerate() {
            if token.is_after() {
                return false;
            }
            let Some(other) = existing.0.get(position) else {
                return false;
            };
            if other.is_before() && !token.is_before() {
                return false;
            }
            if token.is_before() || other.is_after() {
                return true;
            }
            match token.compare(other) {
                Ordering::Greater => return false,
                Ordering::Less => return true,
                Ordering::Equal => {}
            }
        }
        self.0.len() < existing.0.len()
    }

    /// Index at which an item with this order is inserted into `siblings`.
    pub fn insertion_index<'a, I>(&self, siblings: I) -> usize
    where
        I: IntoIterator<Item = &'a Order>,
    {
        let mut count = 0;
        for (index, existing) in siblings.into_iter().enumerate() {
            if self.goes_before(existing) {
                return index;
            }
            count = index + 1;
        }
        count
    }
}

impl FromStr for Order {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Order {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for Order {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<Order> for String {
    fn from(order: Order) -> Self {
        order.to_string()
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{token}")?;
        }
        Ok(())
    }
}
