//! Labels and label expressions.
//!
//! A session advertises a [`LabelSet`]; every send carries a [`LabelOp`]
//! predicate that the engine evaluates against the label sets of joined
//! sessions to decide who receives the message.

use std::fmt;
use std::mem;
use std::ops::Not;

use serde::{Deserialize, Serialize};

/// Duplicate-free, insertion-ordered set of labels held by a session.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(Vec<String>);

impl LabelSet {
    /// Create an empty label set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a label. Inserting an existing label is a no-op.
    pub fn insert(&mut self, label: impl AsRef<str>) {
        let label = label.as_ref();
        if self.contains(label) {
            return;
        }
        self.0.push(label.to_string());
    }

    /// Remove a label if present.
    pub fn remove(&mut self, label: &str) {
        self.0.retain(|l| l != label);
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.iter().any(|l| l == label)
    }

    /// Returns `true` if every label yielded by `labels` is in the set.
    pub fn contains_all<'a, I: IntoIterator<Item = &'a str>>(&self, labels: I) -> bool {
        labels.into_iter().all(|l| self.contains(l))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for LabelSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut set = Self::default();
        for label in iter {
            set.insert(label);
        }
        set
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0.join(", "))
    }
}

/// Build a [`LabelSet`], e.g. `labels!("network", "gpu")`.
#[macro_export]
macro_rules! labels {
    ($($x:expr),* $(,)?) => {
        {
            #[allow(unused_mut)]
            let mut set = $crate::label::LabelSet::default();
            $(set.insert(&$x);)*
            set
        }
    };
}

/// Boolean predicate over labels, used to address messages.
///
/// ```
/// use ipbus_types::LabelOp;
///
/// let op = LabelOp::from("gpu").and("linux").or(!LabelOp::from("busy"));
/// assert_eq!(op.to_string(), r#"(("gpu" & "linux") | !"busy")"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelOp {
    /// Matches every session.
    True,
    /// Matches no session.
    False,
    /// Matches sessions holding the label.
    Leaf(String),
    Not(Box<LabelOp>),
    And(Box<LabelOp>, Box<LabelOp>),
    Or(Box<LabelOp>, Box<LabelOp>),
}

impl LabelOp {
    /// Literal expression matching a single label.
    pub fn literal(label: impl Into<String>) -> Self {
        Self::Leaf(label.into())
    }

    /// Conjunction of `self` and `other`.
    pub fn and(self, other: impl Into<Self>) -> Self {
        Self::And(Box::new(self), Box::new(other.into()))
    }

    /// Disjunction of `self` and `other`.
    pub fn or(self, other: impl Into<Self>) -> Self {
        Self::Or(Box::new(self), Box::new(other.into()))
    }

    /// Toggle negation in place.
    ///
    /// A negated expression is unwrapped instead of double-wrapped; evaluation
    /// is the same either way.
    pub fn negate(&mut self) {
        let inner = mem::replace(self, Self::False);
        *self = match inner {
            Self::Not(inner) => *inner,
            Self::True => Self::False,
            Self::False => Self::True,
            other => Self::Not(Box::new(other)),
        };
    }

    /// Evaluate the expression against a session's labels.
    pub fn matches(&self, labels: &LabelSet) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::Leaf(label) => labels.contains(label),
            Self::Not(inner) => !inner.matches(labels),
            Self::And(left, right) => left.matches(labels) && right.matches(labels),
            Self::Or(left, right) => left.matches(labels) || right.matches(labels),
        }
    }
}

impl Not for LabelOp {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self::Not(Box::new(self))
    }
}

impl From<&str> for LabelOp {
    fn from(value: &str) -> Self {
        Self::Leaf(value.to_string())
    }
}

impl From<String> for LabelOp {
    fn from(value: String) -> Self {
        Self::Leaf(value)
    }
}

impl From<bool> for LabelOp {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

impl fmt::Display for LabelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
            Self::Leaf(label) => write!(f, "{label:?}"),
            Self::Not(inner) => write!(f, "!{inner}"),
            Self::And(left, right) => write!(f, "({left} & {right})"),
            Self::Or(left, right) => write!(f, "({left} | {right})"),
        }
    }
}
