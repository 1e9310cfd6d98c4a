//! Declarative queries over records
//!
//! A [`Selector`] maps dotted attribute paths to [`Comparator`]s. A record
//! matches when every constraint holds; a path that does not resolve on the
//! record fails its constraint. The same selectors drive cache lookups and
//! migration applicability, so both share one notion of "matches".

use crate::record::Record;
use crate::specification::RunSpecification;
use indexmap::IndexMap;
use provenant_core::{Error, Map, Result, Value};
use std::borrow::Cow;
use std::cell::OnceCell;
use std::cmp::Ordering;
use std::fmt;

/// Relative tolerance used for float parameters in [`Selector::from_value`]
pub const DEFAULT_RTOL: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq)]
pub enum Comparator {
    /// Equality with integer/float coercion
    Equal(Value),
    /// Same variant and same value, no coercion
    Is(Value),
    NotEqual(Value),
    /// Numbers (or sequences of numbers) within a relative tolerance
    Approx { value: Value, rtol: f64 },
    LessThan(Value),
    GreaterThan(Value),
    /// Sequence member, substring, or mapping key
    Contains(Value),
    /// Only requires the path to resolve
    Any,
}

impl Comparator {
    pub fn approx(value: impl Into<Value>) -> Self {
        Comparator::Approx {
            value: value.into(),
            rtol: DEFAULT_RTOL,
        }
    }

    pub fn matches(&self, actual: &Value) -> bool {
        match self {
            Comparator::Equal(expected) => loosely_equal(actual, expected),
            Comparator::Is(expected) => actual == expected,
            Comparator::NotEqual(expected) => !loosely_equal(actual, expected),
            Comparator::Approx { value, rtol } => approx_equal(actual, value, *rtol),
            Comparator::LessThan(bound) => compare(actual, bound) == Some(Ordering::Less),
            Comparator::GreaterThan(bound) => compare(actual, bound) == Some(Ordering::Greater),
            Comparator::Contains(needle) => contains(actual, needle),
            Comparator::Any => true,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Comparator::Equal(_) => "==",
            Comparator::Is(_) => "is",
            Comparator::NotEqual(_) => "!=",
            Comparator::Approx { .. } => "~=",
            Comparator::LessThan(_) => "<",
            Comparator::GreaterThan(_) => ">",
            Comparator::Contains(_) => "contains",
            Comparator::Any => "exists",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::Equal(v)
            | Comparator::Is(v)
            | Comparator::NotEqual(v)
            | Comparator::LessThan(v)
            | Comparator::GreaterThan(v)
            | Comparator::Contains(v) => write!(f, "{} {v}", self.symbol()),
            Comparator::Approx { value, rtol } => write!(f, "~= {value} (rtol {rtol})"),
            Comparator::Any => f.write_str(self.symbol()),
        }
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => a.as_f64() == b.as_f64(),
        (Value::List(x), Value::List(y))
        | (Value::Tuple(x), Value::Tuple(y))
        | (Value::Set(x), Value::Set(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| loosely_equal(l, r))
        }
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, l)| y.get(k).is_some_and(|r| loosely_equal(l, r)))
        }
        _ => a == b,
    }
}

fn approx_equal(actual: &Value, expected: &Value, rtol: f64) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(e)) => a == e || (a - e).abs() <= rtol * a.abs().max(e.abs()),
        _ => match (actual.as_slice(), expected.as_slice()) {
            (Some(x), Some(y)) => {
                x.len() == y.len() && x.iter().zip(y).all(|(l, r)| approx_equal(l, r, rtol))
            }
            _ => loosely_equal(actual, expected),
        },
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Timestamp(x), Value::Timestamp(y)) => Some(x.cmp(y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Str(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        Value::Map(_) | Value::Object(_) => needle
            .as_str()
            .is_some_and(|key| haystack.get(key).is_some()),
        _ => haystack
            .as_slice()
            .is_some_and(|items| items.iter().any(|item| loosely_equal(item, needle))),
    }
}

/// Conjunction of path constraints, an empty selector matches everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    constraints: IndexMap<String, Comparator>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constraint, replacing an earlier one on the same path
    pub fn with(mut self, path: impl Into<String>, comparator: Comparator) -> Self {
        self.constraints.insert(path.into(), comparator);
        self
    }

    pub fn equal(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(path, Comparator::Equal(value.into()))
    }

    pub fn is(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(path, Comparator::Is(value.into()))
    }

    /// Only records not superseded by a migration
    pub fn current(self) -> Self {
        self.is("migrated_to", Value::Null)
    }

    pub fn uid(uid: impl Into<String>) -> Self {
        Self::new().equal("run_specification.uid", uid.into())
    }

    /// Everything cached for the same computation at the same schema version
    pub fn fingerprint(spec: &RunSpecification) -> Self {
        Self::new()
            .equal("run_specification.name", spec.name())
            .equal(
                "run_specification.parameters",
                Value::Map(spec.parameters().clone()),
            )
            .equal("run_specification.version", spec.version())
            .current()
    }

    /// Flatten a nested mapping into equality constraints on dotted paths
    ///
    /// Floats become approximate comparisons with [`DEFAULT_RTOL`].
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Map(map) = value else {
            return Err(Error::configuration(format!(
                "a selector must be built from a mapping, got {}",
                value.type_name()
            )));
        };
        let mut selector = Self::new();
        flatten_into(&mut selector, "", map);
        Ok(selector)
    }

    /// Parse `path=value`, `path!=value`, `path<value`, `path>value` or `path~value`
    ///
    /// The value is read as JSON and falls back to a plain string.
    pub fn parse_constraint(expression: &str) -> Result<(String, Comparator)> {
        const OPERATORS: &[&str] = &["!=", "~", "<", ">", "="];
        let (index, operator) = OPERATORS
            .iter()
            .filter_map(|op| expression.find(op).map(|i| (i, *op)))
            .min_by_key(|(i, op)| (*i, std::cmp::Reverse(op.len())))
            .ok_or_else(|| {
                Error::configuration(format!(
                    "constraint '{expression}' must look like path=value"
                ))
            })?;

        let path = expression[..index].trim();
        if path.is_empty() {
            return Err(Error::configuration(format!(
                "constraint '{expression}' has no attribute path"
            )));
        }
        let value = parse_literal(expression[index + operator.len()..].trim());
        let comparator = match operator {
            "!=" => Comparator::NotEqual(value),
            "~" => Comparator::approx(value),
            "<" => Comparator::LessThan(value),
            ">" => Comparator::GreaterThan(value),
            _ => Comparator::Equal(value),
        };
        Ok((path.to_string(), comparator))
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn constraints(&self) -> impl Iterator<Item = (&str, &Comparator)> {
        self.constraints.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Paths into the result, the parameters or the uid/name/version aliases
    /// resolve on the record itself, the full view is only built for the rest
    pub fn matches(&self, record: &Record) -> bool {
        let view = OnceCell::new();
        self.constraints.iter().all(|(path, comparator)| {
            let segments: Vec<&str> = path.split('.').collect();
            let actual = match direct_lookup(record, &segments) {
                Some(found) => found,
                None => view
                    .get_or_init(|| record.to_value())
                    .lookup(&segments)
                    .map(Cow::Borrowed),
            };
            actual.is_some_and(|actual| comparator.matches(&actual))
        })
    }

}

/// `None` when the path needs the full record view
fn direct_lookup<'r>(record: &'r Record, segments: &[&str]) -> Option<Option<Cow<'r, Value>>> {
    let spec = &record.run_specification;
    let found = match segments {
        ["result", rest @ ..] => record.result.lookup(rest).map(Cow::Borrowed),
        ["parameters", key, rest @ ..] | ["run_specification", "parameters", key, rest @ ..] => spec
            .parameters()
            .get(*key)
            .and_then(|value| value.lookup(rest))
            .map(Cow::Borrowed),
        ["uid"] | ["run_specification", "uid"] => Some(Cow::Owned(Value::from(spec.uid()))),
        ["name"] | ["run_specification", "name"] => Some(Cow::Owned(Value::from(spec.name()))),
        ["version"] | ["run_specification", "version"] => {
            Some(Cow::Owned(Value::from(spec.version())))
        }
        _ => return None,
    };
    Some(found)
}

fn flatten_into(selector: &mut Selector, prefix: &str, map: &Map) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Map(nested) if !nested.is_empty() => flatten_into(selector, &path, nested),
            Value::Float(_) => {
                selector.constraints.insert(path, Comparator::approx(value.clone()));
            }
            other => {
                selector.constraints.insert(path, Comparator::Equal(other.clone()));
            }
        }
    }
}

/// Command line literal: JSON when it parses, a plain string otherwise
pub fn parse_literal(text: &str) -> Value {
    serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::from(text))
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (path, comparator)) in self.constraints.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{path} {comparator}")?;
        }
        f.write_str("}")
    }
}
