//! Dynamically shaped values carried by parameters and results
//!
//! A [`Value`] is what an instruction returns and what its parameters are made
//! of. Beyond the JSON primitives it knows about tuples, sets, numeric arrays,
//! timestamps, paths, external file references and tagged objects, so that a
//! result read back from the cache is equal to the one that was written.

mod array;
mod codec;

pub use array::{ArrayData, Complex, NdArray};
pub use codec::{decode, encode, TYPE_KEY, VALUE_KEY};

use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

/// Insertion ordered string keyed mapping
pub type Map = IndexMap<String, Value>;

/// A dynamically shaped value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex(Complex),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Always deduplicated and canonically ordered, build with [`Value::set`]
    Set(Vec<Value>),
    Map(Map),
    Array(NdArray),
    Timestamp(DateTime<Utc>),
    Path(PathBuf),
    File(ExternalFile),
    Object(Object),
}

/// Reference to an on-disk artifact owned by the cache once persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalFile {
    pub path: PathBuf,
    pub sha256: String,
}

impl ExternalFile {
    pub fn new(path: impl Into<PathBuf>, sha256: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sha256: sha256.into(),
        }
    }

    /// File name of the referenced artifact
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Custom object: a registered type identifier plus its attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub type_id: String,
    pub attrs: Map,
}

/// Typed structs that can travel inside a [`Value`] as tagged objects
pub trait Tagged: Serialize + DeserializeOwned {
    /// Identifier stored in the wire format and looked up on decode
    const TYPE_ID: &'static str;
}

impl Value {
    /// Build a normalized set value
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        let mut keyed: Vec<(String, Value)> = items
            .into_iter()
            .map(|v| (v.canonical_key(), v))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.dedup_by(|a, b| a.0 == b.0);
        Value::Set(keyed.into_iter().map(|(_, v)| v).collect())
    }

    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Tuple(items.into_iter().collect())
    }

    pub fn map<K: Into<String>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Wrap a typed struct as a tagged object
    pub fn from_tagged<T: Tagged>(item: &T) -> Result<Self> {
        match decode(&serde_json::to_value(item)?)? {
            Value::Map(attrs) => Ok(Value::Object(Object {
                type_id: T::TYPE_ID.to_string(),
                attrs,
            })),
            other => Err(Error::unknown_data_format(format!(
                "type '{}' must serialize to a mapping, got {}",
                T::TYPE_ID,
                other.type_name()
            ))),
        }
    }

    /// Recover a typed struct from a tagged object
    pub fn to_tagged<T: Tagged>(&self) -> Result<T> {
        match self {
            Value::Object(object) if object.type_id == T::TYPE_ID => {
                let attrs = encode(&Value::Map(object.attrs.clone()));
                serde_json::from_value(attrs).map_err(|e| {
                    Error::unknown_data_format(format!(
                        "object of type '{}' cannot be constructed: {e}",
                        T::TYPE_ID
                    ))
                })
            }
            Value::Object(object) => Err(Error::unknown_data_format(format!(
                "expected object of type '{}', found '{}'",
                T::TYPE_ID,
                object.type_id
            ))),
            other => Err(Error::unknown_data_format(format!(
                "expected object of type '{}', found {}",
                T::TYPE_ID,
                other.type_name()
            ))),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Complex(_) => "complex",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Array(_) => "ndarray",
            Value::Timestamp(_) => "datetime",
            Value::Path(_) => "path",
            Value::File(_) => "external_file",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view, integers are widened
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Value::Path(p) => Some(p),
            Value::File(f) => Some(&f.path),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            Value::Object(o) => Some(&o.attrs),
            _ => None,
        }
    }

    /// Elements of any sequence-like value
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) | Value::Tuple(v) | Value::Set(v) => Some(v),
            _ => None,
        }
    }

    /// Key lookup in maps and object attributes
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Walk a dotted path through maps, object attributes and sequence indices
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let mut current = self;
        for segment in path {
            let segment = segment.as_ref();
            current = match current {
                Value::Map(_) | Value::Object(_) => current.get(segment)?,
                Value::List(items) | Value::Tuple(items) => {
                    items.get(segment.parse::<usize>().ok()?)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Call `f` on every tagged object, depth first
    pub fn visit_objects<F>(&self, f: &mut F) -> Result<()>
    where
        F: FnMut(&Object) -> Result<()>,
    {
        match self {
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
                items.iter().try_for_each(|v| v.visit_objects(f))
            }
            Value::Map(map) => map.values().try_for_each(|v| v.visit_objects(f)),
            Value::Object(object) => {
                f(object)?;
                object.attrs.values().try_for_each(|v| v.visit_objects(f))
            }
            _ => Ok(()),
        }
    }

    /// Call `f` on every external file reference, allowing it to be rewritten
    pub fn visit_files_mut<F>(&mut self, f: &mut F) -> Result<()>
    where
        F: FnMut(&mut ExternalFile) -> Result<()>,
    {
        match self {
            Value::File(file) => f(file),
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
                items.iter_mut().try_for_each(|v| v.visit_files_mut(f))
            }
            Value::Map(map) => map.values_mut().try_for_each(|v| v.visit_files_mut(f)),
            Value::Object(object) => object
                .attrs
                .values_mut()
                .try_for_each(|v| v.visit_files_mut(f)),
            _ => Ok(()),
        }
    }

    /// Compact wire encoding, used for ordering set members
    pub fn canonical_key(&self) -> String {
        encode(self).to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Path(p) => write!(f, "{}", p.display()),
            other => write!(f, "{}", encode(other)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        encode(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        decode(&json).map_err(serde::de::Error::custom)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<PathBuf> for Value {
    fn from(p: PathBuf) -> Self {
        Value::Path(p)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Complex> for Value {
    fn from(c: Complex) -> Self {
        Value::Complex(c)
    }
}

impl From<NdArray> for Value {
    fn from(a: NdArray) -> Self {
        Value::Array(a)
    }
}

impl From<ExternalFile> for Value {
    fn from(f: ExternalFile) -> Self {
        Value::File(f)
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Value::Map(m)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct BandGap {
        gap: f64,
        direct: bool,
    }

    impl Tagged for BandGap {
        const TYPE_ID: &'static str = "test.bandgap";
    }

    #[test]
    fn test_set_is_normalized() {
        let a = Value::set(vec![Value::from(3), Value::from(1), Value::from(3)]);
        let b = Value::set(vec![Value::from(1), Value::from(3)]);
        assert_eq!(a, b);
        assert_eq!(a.as_slice().unwrap().len(), 2);
    }

    #[test]
    fn test_lookup_walks_maps_and_indices() {
        let value = Value::map([(
            "kpts",
            Value::map([("size", Value::from(vec![4, 4, 1]))]),
        )]);
        assert_eq!(
            value.lookup(&["kpts", "size", "2"]),
            Some(&Value::Int(1))
        );
        assert_eq!(value.lookup(&["kpts", "density"]), None);
        assert_eq!(value.lookup(&["kpts", "size", "x"]), None);
    }

    #[test]
    fn test_tagged_round_trip() {
        let gap = BandGap {
            gap: 1.25,
            direct: true,
        };
        let value = Value::from_tagged(&gap).unwrap();
        match &value {
            Value::Object(o) => assert_eq!(o.type_id, "test.bandgap"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(value.to_tagged::<BandGap>().unwrap(), gap);
    }

    #[test]
    fn test_to_tagged_rejects_other_type() {
        let value = Value::Object(Object {
            type_id: "something.else".into(),
            attrs: Map::new(),
        });
        assert!(matches!(
            value.to_tagged::<BandGap>(),
            Err(Error::UnknownDataFormat { .. })
        ));
    }

    #[test]
    fn test_visit_files_mut_rewrites_nested() {
        let mut value = Value::map([(
            "files",
            Value::from(vec![Value::File(ExternalFile::new("gs.gpw", "abc"))]),
        )]);
        value
            .visit_files_mut(&mut |f| {
                f.path = PathBuf::from("moved/gs.gpw");
                Ok(())
            })
            .unwrap();
        assert_eq!(
            value.lookup(&["files", "0"]).and_then(Value::as_path),
            Some(Path::new("moved/gs.gpw"))
        );
    }

    proptest::proptest! {
        #[test]
        fn test_set_ignores_order_and_duplicates(items in proptest::collection::vec(-50i64..50, 0..20)) {
            let forward = Value::set(items.iter().copied().map(Value::from));
            let backward = Value::set(items.iter().rev().copied().map(Value::from));
            let mut unique = items.clone();
            unique.sort_unstable();
            unique.dedup();
            proptest::prop_assert_eq!(&forward, &backward);
            proptest::prop_assert_eq!(forward.as_slice().map(<[Value]>::len), Some(unique.len()));
        }
    }
}
