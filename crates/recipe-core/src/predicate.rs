//! Metadata predicates over recipe attributes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::types::{attr, Attributes, Category, Difficulty};

/// Numeric comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn apply(&self, left: f64, right: f64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Gt => left > right,
            Self::Ge => left >= right,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// A single condition on one named attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Equals { key: String, value: Value },
    OneOf { key: String, values: Vec<Value> },
    Compare { key: String, cmp: Comparison, value: f64 },
}

impl Condition {
    /// Evaluate against an attribute map. A missing attribute never matches.
    pub fn matches(&self, attributes: &Attributes) -> bool {
        match self {
            Self::Equals { key, value } => attributes
                .get(key)
                .is_some_and(|actual| values_equal(actual, value)),
            Self::OneOf { key, values } => attributes
                .get(key)
                .is_some_and(|actual| values.iter().any(|v| values_equal(actual, v))),
            Self::Compare { key, cmp, value } => attributes
                .get(key)
                .and_then(Value::as_f64)
                .is_some_and(|actual| cmp.apply(actual, *value)),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Equals { key, .. } | Self::OneOf { key, .. } | Self::Compare { key, .. } => key,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals { key, value } => write!(f, "{} = {}", key, value),
            Self::OneOf { key, values } => {
                let rendered: Vec<String> = values.iter().map(Value::to_string).collect();
                write!(f, "{} in [{}]", key, rendered.join(", "))
            }
            Self::Compare { key, cmp, value } => write!(f, "{} {} {}", key, cmp.symbol(), value),
        }
    }
}

/// Numbers compare by value so `2` equals `2.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

/// A conjunction of attribute conditions. The empty predicate matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub conditions: Vec<Condition>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to equal `value`.
    pub fn equals(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Equals {
            key: key.to_string(),
            value: value.into(),
        });
        self
    }

    /// Require `key` to equal one of `values`.
    pub fn one_of<V: Into<Value>>(mut self, key: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.conditions.push(Condition::OneOf {
            key: key.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Require numeric attribute `key` to satisfy `cmp value`.
    pub fn compare(mut self, key: &str, cmp: Comparison, value: f64) -> Self {
        self.conditions.push(Condition::Compare {
            key: key.to_string(),
            cmp,
            value,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, attributes: &Attributes) -> bool {
        self.conditions.iter().all(|c| c.matches(attributes))
    }

    /// Derive category and difficulty conditions from keywords in a query.
    ///
    /// Recognizes the English keywords and the upstream Chinese labels of
    /// [`Category`] and [`Difficulty`]. Several matching categories become a
    /// `one_of` condition. A difficulty is only taken alongside a category:
    /// in "简单的红烧肉做法" the word describes the dish asked about, not a
    /// constraint on which recipes qualify.
    pub fn from_query(query: &str) -> Self {
        let lowered = query.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let categories: Vec<&'static str> = Category::ALL
            .iter()
            .filter(|c| {
                lowered.contains(c.label_zh()) || c.keywords().iter().any(|k| words.contains(k))
            })
            .map(|c| c.as_str())
            .collect();

        let mut predicate = Self::new();
        match categories.as_slice() {
            [] => return predicate,
            [single] => predicate = predicate.equals(attr::CATEGORY, *single),
            many => predicate = predicate.one_of(attr::CATEGORY, many.iter().copied()),
        }

        if let Some(difficulty) = difficulty_in(&lowered, &words) {
            predicate = predicate.equals(attr::DIFFICULTY, difficulty.as_str());
        }

        predicate
    }
}

/// The most specific difficulty named in the query.
///
/// "very easy" and "非常简单" win over "easy" and "简单".
fn difficulty_in(lowered: &str, words: &[&str]) -> Option<Difficulty> {
    const MOST_SPECIFIC_FIRST: [Difficulty; 5] = [
        Difficulty::VeryEasy,
        Difficulty::VeryHard,
        Difficulty::Easy,
        Difficulty::Hard,
        Difficulty::Medium,
    ];

    MOST_SPECIFIC_FIRST.into_iter().find(|d| {
        lowered.contains(d.label_zh())
            || d.keywords().iter().any(|k| {
                if k.contains(' ') {
                    lowered.contains(k)
                } else {
                    words.contains(k)
                }
            })
    })
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return f.write_str("*");
        }
        let parts: Vec<String> = self.conditions.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(" AND "))
    }
}
