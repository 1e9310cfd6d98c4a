//! JSON wire encoding of [`Value`]
//!
//! Shapes JSON has no native form for are written as
//! `{"__type__": <tag>, "value": ...}`. Decoding fails on tags it does not
//! know instead of handing back a plain mapping.

use super::{ArrayData, Complex, ExternalFile, Map, NdArray, Object, Value};
use crate::errors::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Number, Value as Json};
use std::path::PathBuf;

pub const TYPE_KEY: &str = "__type__";
pub const VALUE_KEY: &str = "value";
const TYPE_ID_KEY: &str = "type_id";

fn tagged(tag: &str, value: Json) -> Json {
    let mut map = serde_json::Map::new();
    map.insert(TYPE_KEY.to_string(), Json::String(tag.to_string()));
    map.insert(VALUE_KEY.to_string(), value);
    Json::Object(map)
}

fn encode_float(f: f64) -> Json {
    match Number::from_f64(f) {
        Some(n) => Json::Number(n),
        None => tagged("float", Json::String(non_finite_name(f).to_string())),
    }
}

fn non_finite_name(f: f64) -> &'static str {
    if f.is_nan() {
        "nan"
    } else if f.is_sign_positive() {
        "inf"
    } else {
        "-inf"
    }
}

// Array elements keep the bare string form for non-finite numbers
fn encode_array_float(f: f64) -> Json {
    Number::from_f64(f).map_or_else(|| Json::String(non_finite_name(f).to_string()), Json::Number)
}

fn encode_seq(items: &[Value]) -> Json {
    Json::Array(items.iter().map(encode).collect())
}

/// Encode a value into its JSON wire form
pub fn encode(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::Number((*i).into()),
        Value::Float(f) => encode_float(*f),
        Value::Complex(c) => tagged("complex", json!([encode_float(c.re), encode_float(c.im)])),
        Value::Str(s) => Json::String(s.clone()),
        Value::List(items) => encode_seq(items),
        Value::Tuple(items) => tagged("tuple", encode_seq(items)),
        Value::Set(items) => tagged("set", encode_seq(items)),
        Value::Map(map) if map.contains_key(TYPE_KEY) => tagged(
            "dict",
            Json::Array(
                map.iter()
                    .map(|(k, v)| json!([k, encode(v)]))
                    .collect(),
            ),
        ),
        Value::Map(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), encode(v)))
                .collect(),
        ),
        Value::Array(array) => encode_array(array),
        Value::Timestamp(t) => tagged(
            "datetime",
            Json::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        ),
        Value::Path(p) => tagged("path", Json::String(p.to_string_lossy().into_owned())),
        Value::File(f) => tagged(
            "external_file",
            json!({"path": f.path.to_string_lossy(), "sha256": f.sha256}),
        ),
        Value::Object(object) => {
            let mut map = serde_json::Map::new();
            map.insert(TYPE_KEY.to_string(), Json::String("object".to_string()));
            map.insert(TYPE_ID_KEY.to_string(), Json::String(object.type_id.clone()));
            map.insert(VALUE_KEY.to_string(), encode(&Value::Map(object.attrs.clone())));
            Json::Object(map)
        }
    }
}

fn encode_array(array: &NdArray) -> Json {
    let shape = json!(array.shape());
    match array.data() {
        ArrayData::Complex(values) => tagged(
            "complex_ndarray",
            json!({
                "shape": shape,
                "real": values.iter().map(|c| encode_array_float(c.re)).collect::<Vec<_>>(),
                "imag": values.iter().map(|c| encode_array_float(c.im)).collect::<Vec<_>>(),
            }),
        ),
        data => {
            let flat = match data {
                ArrayData::Bool(v) => json!(v),
                ArrayData::Int(v) => json!(v),
                ArrayData::Float(v) => Json::Array(v.iter().map(|f| encode_array_float(*f)).collect()),
                ArrayData::Complex(_) => unreachable!("complex arrays are encoded above"),
            };
            tagged("ndarray", json!([shape, data.dtype(), flat]))
        }
    }
}

fn format_error(message: impl Into<String>) -> Error {
    Error::unknown_data_format(message)
}

fn decode_float(json: &Json) -> Result<f64> {
    match json {
        Json::Number(n) => n
            .as_f64()
            .ok_or_else(|| format_error(format!("number {n} is not representable"))),
        Json::String(s) => match s.as_str() {
            "nan" => Ok(f64::NAN),
            "inf" => Ok(f64::INFINITY),
            "-inf" => Ok(f64::NEG_INFINITY),
            other => Err(format_error(format!("'{other}' is not a float"))),
        },
        Json::Object(map) if map.get(TYPE_KEY).and_then(Json::as_str) == Some("float") => {
            decode_float(map.get(VALUE_KEY).unwrap_or(&Json::Null))
        }
        other => Err(format_error(format!("expected a float, got {other}"))),
    }
}

fn expect_array<'a>(json: &'a Json, what: &str) -> Result<&'a Vec<Json>> {
    json.as_array()
        .ok_or_else(|| format_error(format!("{what} must be a list, got {json}")))
}

fn decode_seq(json: &Json, what: &str) -> Result<Vec<Value>> {
    expect_array(json, what)?.iter().map(decode).collect()
}

fn decode_shape(json: &Json) -> Result<Vec<usize>> {
    expect_array(json, "array shape")?
        .iter()
        .map(|d| {
            d.as_u64()
                .and_then(|d| usize::try_from(d).ok())
                .ok_or_else(|| format_error(format!("invalid array dimension {d}")))
        })
        .collect()
}

fn decode_ndarray(json: &Json) -> Result<NdArray> {
    let parts = expect_array(json, "ndarray")?;
    let [shape, dtype, flat] = parts.as_slice() else {
        return Err(format_error("ndarray must be [shape, dtype, data]"));
    };
    let shape = decode_shape(shape)?;
    let flat = expect_array(flat, "ndarray data")?;
    let data = match dtype.as_str() {
        Some("bool") => ArrayData::Bool(
            flat.iter()
                .map(|v| v.as_bool().ok_or_else(|| format_error(format!("{v} is not a bool"))))
                .collect::<Result<_>>()?,
        ),
        Some("int64") => ArrayData::Int(
            flat.iter()
                .map(|v| v.as_i64().ok_or_else(|| format_error(format!("{v} is not an int64"))))
                .collect::<Result<_>>()?,
        ),
        Some("float64") => ArrayData::Float(flat.iter().map(decode_float).collect::<Result<_>>()?),
        other => return Err(format_error(format!("unsupported array dtype {other:?}"))),
    };
    NdArray::new(shape, data)
}

fn decode_complex_ndarray(json: &Json) -> Result<NdArray> {
    let field = |name: &str| {
        json.get(name)
            .ok_or_else(|| format_error(format!("complex_ndarray is missing '{name}'")))
    };
    let shape = decode_shape(field("shape")?)?;
    let real = expect_array(field("real")?, "real part")?;
    let imag = expect_array(field("imag")?, "imaginary part")?;
    if real.len() != imag.len() {
        return Err(format_error("real and imaginary parts differ in length"));
    }
    let values = real
        .iter()
        .zip(imag)
        .map(|(re, im)| Ok(Complex::new(decode_float(re)?, decode_float(im)?)))
        .collect::<Result<Vec<_>>>()?;
    NdArray::new(shape, ArrayData::Complex(values))
}

fn decode_string<'a>(json: &'a Json, what: &str) -> Result<&'a str> {
    json.as_str()
        .ok_or_else(|| format_error(format!("{what} must be a string, got {json}")))
}

fn decode_tagged(tag: &str, map: &serde_json::Map<String, Json>) -> Result<Value> {
    let inner = map.get(VALUE_KEY).unwrap_or(&Json::Null);
    match tag {
        "float" => Ok(Value::Float(decode_float(inner)?)),
        "complex" => {
            let parts = expect_array(inner, "complex")?;
            let [re, im] = parts.as_slice() else {
                return Err(format_error("complex must be [re, im]"));
            };
            Ok(Value::Complex(Complex::new(decode_float(re)?, decode_float(im)?)))
        }
        "tuple" => Ok(Value::Tuple(decode_seq(inner, "tuple")?)),
        "set" => Ok(Value::set(decode_seq(inner, "set")?)),
        "dict" => {
            let mut out = Map::new();
            for pair in expect_array(inner, "dict")? {
                let pair = expect_array(pair, "dict entry")?;
                let [key, value] = pair.as_slice() else {
                    return Err(format_error("dict entries must be [key, value]"));
                };
                out.insert(decode_string(key, "dict key")?.to_string(), decode(value)?);
            }
            Ok(Value::Map(out))
        }
        "ndarray" => Ok(Value::Array(decode_ndarray(inner)?)),
        "complex_ndarray" => Ok(Value::Array(decode_complex_ndarray(inner)?)),
        "datetime" => {
            let text = decode_string(inner, "datetime")?;
            DateTime::parse_from_rfc3339(text)
                .map(|t| Value::Timestamp(t.with_timezone(&Utc)))
                .map_err(|e| format_error(format!("invalid datetime '{text}': {e}")))
        }
        "path" => Ok(Value::Path(PathBuf::from(decode_string(inner, "path")?))),
        "external_file" => {
            let path = decode_string(inner.get("path").unwrap_or(&Json::Null), "file path")?;
            let sha256 = decode_string(inner.get("sha256").unwrap_or(&Json::Null), "file digest")?;
            Ok(Value::File(ExternalFile::new(path, sha256)))
        }
        "object" => {
            let type_id = decode_string(map.get(TYPE_ID_KEY).unwrap_or(&Json::Null), "type_id")?;
            match decode(inner)? {
                Value::Map(attrs) => Ok(Value::Object(Object {
                    type_id: type_id.to_string(),
                    attrs,
                })),
                other => Err(format_error(format!(
                    "attributes of '{type_id}' must be a mapping, got {}",
                    other.type_name()
                ))),
            }
        }
        unknown => Err(format_error(format!("unknown type tag '{unknown}'"))),
    }
}

/// Decode a JSON wire form back into a value
pub fn decode(json: &Json) -> Result<Value> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Int(i)),
            None => Ok(Value::Float(decode_float(json)?)),
        },
        Json::String(s) => Ok(Value::Str(s.clone())),
        Json::Array(items) => Ok(Value::List(items.iter().map(decode).collect::<Result<_>>()?)),
        Json::Object(map) => match map.get(TYPE_KEY) {
            Some(Json::String(tag)) => decode_tagged(tag, map),
            Some(other) => Err(format_error(format!("type tag must be a string, got {other}"))),
            None => Ok(Value::Map(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), decode(v)?)))
                    .collect::<Result<_>>()?,
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn round_trip(value: &Value) -> Value {
        let text = serde_json::to_string(&encode(value)).unwrap();
        decode(&serde_json::from_str(&text).unwrap()).unwrap()
    }

    #[test]
    fn test_ndarray_with_overflowing_shape_fails() {
        let json = serde_json::json!({
            "__type__": "ndarray",
            "value": [[4294967296u64, 4294967296u64, 4294967296u64], "int64", []]
        });
        assert!(matches!(decode(&json), Err(Error::UnknownDataFormat { .. })));
    }

    #[test]
    fn test_float_stays_float() {
        assert_eq!(round_trip(&Value::Float(3.0)), Value::Float(3.0));
        assert_eq!(round_trip(&Value::Int(3)), Value::Int(3));
    }

    #[test]
    fn test_non_finite_floats() {
        assert_eq!(round_trip(&Value::Float(f64::INFINITY)), Value::Float(f64::INFINITY));
        match round_trip(&Value::Float(f64::NAN)) {
            Value::Float(f) => assert!(f.is_nan()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_tuple_distinct_from_list() {
        let tuple = Value::tuple(vec![Value::from(1), Value::from("a")]);
        let list = Value::from(vec![Value::from(1), Value::from("a")]);
        assert_eq!(round_trip(&tuple), tuple);
        assert_eq!(round_trip(&list), list);
        assert_ne!(round_trip(&tuple), list);
    }

    #[test]
    fn test_map_with_reserved_key() {
        let value = Value::map([(TYPE_KEY, Value::from("tuple")), ("x", Value::from(1))]);
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn test_complex_array() {
        let array = NdArray::new(
            vec![2],
            ArrayData::Complex(vec![Complex::new(1.0, -1.0), Complex::new(0.5, 2.0)]),
        )
        .unwrap();
        let encoded = encode(&Value::Array(array.clone()));
        assert_eq!(encoded[TYPE_KEY], "complex_ndarray");
        assert_eq!(round_trip(&Value::Array(array.clone())), Value::Array(array));
    }

    #[test]
    fn test_ndarray_layout() {
        let array = NdArray::new(vec![2, 2], ArrayData::Int(vec![1, 2, 3, 4])).unwrap();
        let encoded = encode(&Value::Array(array));
        assert_eq!(encoded[VALUE_KEY], json!([[2, 2], "int64", [1, 2, 3, 4]]));
    }

    #[test]
    fn test_timestamp_keeps_nanoseconds() {
        let t = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        assert_eq!(round_trip(&Value::Timestamp(t)), Value::Timestamp(t));
    }

    #[test]
    fn test_unknown_tag_fails() {
        let json = json!({"__type__": "pickle", "value": "gAN9cQAu"});
        assert!(matches!(decode(&json), Err(Error::UnknownDataFormat { .. })));
    }

    #[test]
    fn test_bad_array_dtype_fails() {
        let json = json!({"__type__": "ndarray", "value": [[1], "float16", [1.0]]});
        assert!(matches!(decode(&json), Err(Error::UnknownDataFormat { .. })));
    }
}
