//! Decoding of the JSON dialect older result files were written in
//!
//! Those files used ASE's encoder plus two extensions for sets and tuples:
//!
//! | wire form | value |
//! |---|---|
//! | `{"__ndarray__": [shape, dtype, flat]}` | `Array` (complex dtypes store re/im interleaved) |
//! | `{"__complex_ndarray__": [real, imag]}` | complex `Array` from nested lists |
//! | `{"__complex__": [re, im]}` | `Complex` |
//! | `{"__datetime__": "<iso 8601>"}` | `Timestamp` (naive times are UTC) |
//! | `{"__asr_type__": "set" \| "tuple", "value": [..]}` | `Set` / `Tuple` |
//! | `{"cls_id": .., "__dict__": {..}}` | `Object` |
//!
//! Any other `__name__` key is rejected instead of being read as a plain map.

use chrono::{DateTime, NaiveDateTime, Utc};
use provenant_core::{ArrayData, Complex, Error, Map, NdArray, Object, Result, Value};
use serde_json::Value as Json;

fn format_error(message: impl Into<String>) -> Error {
    Error::unknown_data_format(message)
}

fn is_tag(key: &str) -> bool {
    key.len() > 4 && key.starts_with("__") && key.ends_with("__")
}

fn list<'a>(json: &'a Json, what: &str) -> Result<&'a Vec<Json>> {
    json.as_array()
        .ok_or_else(|| format_error(format!("{what} must be a list, got {json}")))
}

fn float(json: &Json) -> Result<f64> {
    json.as_f64()
        .ok_or_else(|| format_error(format!("{json} is not a number")))
}

/// Decode one document of the legacy dialect
pub(super) fn decode_legacy(json: &Json) -> Result<Value> {
    match json {
        Json::Array(items) => Ok(Value::List(
            items.iter().map(decode_legacy).collect::<Result<_>>()?,
        )),
        Json::Object(map) => decode_object(map),
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::String(s) => Ok(Value::Str(s.clone())),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Int(i)),
            None => Ok(Value::Float(float(json)?)),
        },
    }
}

fn decode_object(map: &serde_json::Map<String, Json>) -> Result<Value> {
    if let Some(inner) = map.get("__ndarray__") {
        return decode_ndarray(inner).map(Value::Array);
    }
    if let Some(inner) = map.get("__complex_ndarray__") {
        return decode_complex_ndarray(inner).map(Value::Array);
    }
    if let Some(inner) = map.get("__complex__") {
        let parts = list(inner, "complex")?;
        let [re, im] = parts.as_slice() else {
            return Err(format_error("complex must be [re, im]"));
        };
        return Ok(Value::Complex(Complex::new(float(re)?, float(im)?)));
    }
    if let Some(inner) = map.get("__datetime__") {
        return decode_datetime(inner).map(Value::Timestamp);
    }
    if let Some(kind) = map.get("__asr_type__") {
        let items = list(map.get("value").unwrap_or(&Json::Null), "value")?
            .iter()
            .map(decode_legacy)
            .collect::<Result<Vec<_>>>()?;
        return match kind.as_str() {
            Some("set") => Ok(Value::set(items)),
            Some("tuple") => Ok(Value::Tuple(items)),
            _ => Err(format_error(format!("unknown legacy type {kind}"))),
        };
    }
    if let (Some(cls_id), Some(attrs)) = (map.get("cls_id"), map.get("__dict__")) {
        let type_id = cls_id
            .as_str()
            .ok_or_else(|| format_error(format!("cls_id must be a string, got {cls_id}")))?;
        return match decode_legacy(attrs)? {
            Value::Map(attrs) => Ok(Value::Object(Object {
                type_id: type_id.to_string(),
                attrs,
            })),
            other => Err(format_error(format!(
                "attributes of '{type_id}' must be a mapping, got {}",
                other.type_name()
            ))),
        };
    }
    if let Some(tag) = map.keys().find(|key| is_tag(key)) {
        return Err(format_error(format!("unknown legacy tag '{tag}'")));
    }

    let mut out = Map::new();
    for (key, value) in map {
        out.insert(key.clone(), decode_legacy(value)?);
    }
    Ok(Value::Map(out))
}

fn decode_shape(json: &Json) -> Result<Vec<usize>> {
    list(json, "array shape")?
        .iter()
        .map(|d| {
            d.as_u64()
                .and_then(|d| usize::try_from(d).ok())
                .ok_or_else(|| format_error(format!("invalid array dimension {d}")))
        })
        .collect()
}

fn decode_ndarray(json: &Json) -> Result<NdArray> {
    let parts = list(json, "__ndarray__")?;
    let [shape, dtype, flat] = parts.as_slice() else {
        return Err(format_error("__ndarray__ must be [shape, dtype, data]"));
    };
    let shape = decode_shape(shape)?;
    let flat = list(flat, "array data")?;
    let dtype = dtype
        .as_str()
        .ok_or_else(|| format_error(format!("array dtype must be a string, got {dtype}")))?;

    let data = if dtype == "bool" {
        ArrayData::Bool(
            flat.iter()
                .map(|v| v.as_bool().ok_or_else(|| format_error(format!("{v} is not a bool"))))
                .collect::<Result<_>>()?,
        )
    } else if dtype.starts_with("int") || dtype.starts_with("uint") {
        ArrayData::Int(
            flat.iter()
                .map(|v| v.as_i64().ok_or_else(|| format_error(format!("{v} is not an integer"))))
                .collect::<Result<_>>()?,
        )
    } else if dtype.starts_with("float") {
        ArrayData::Float(flat.iter().map(float).collect::<Result<_>>()?)
    } else if dtype.starts_with("complex") {
        if flat.len() % 2 != 0 {
            return Err(format_error("complex array data must hold re/im pairs"));
        }
        ArrayData::Complex(
            flat.chunks(2)
                .map(|pair| Ok(Complex::new(float(&pair[0])?, float(&pair[1])?)))
                .collect::<Result<_>>()?,
        )
    } else {
        return Err(format_error(format!("unsupported array dtype '{dtype}'")));
    };
    NdArray::new(shape, data)
}

/// Flatten nested lists row-major, returning the shape found on the way
fn flatten(json: &Json, depth: usize, shape: &mut Vec<usize>, out: &mut Vec<f64>) -> Result<()> {
    match json {
        Json::Array(items) => {
            match shape.get(depth) {
                Some(&len) if len != items.len() => {
                    return Err(format_error("ragged nested array"));
                }
                Some(_) => {}
                None if depth == shape.len() && out.is_empty() => shape.push(items.len()),
                None => return Err(format_error("ragged nested array")),
            }
            items.iter().try_for_each(|item| flatten(item, depth + 1, shape, out))
        }
        scalar if depth == shape.len() => {
            out.push(float(scalar)?);
            Ok(())
        }
        _ => Err(format_error("ragged nested array")),
    }
}

fn decode_complex_ndarray(json: &Json) -> Result<NdArray> {
    let parts = list(json, "__complex_ndarray__")?;
    let [real, imag] = parts.as_slice() else {
        return Err(format_error("__complex_ndarray__ must be [real, imag]"));
    };
    let (mut real_shape, mut real_flat) = (Vec::new(), Vec::new());
    flatten(real, 0, &mut real_shape, &mut real_flat)?;
    let (mut imag_shape, mut imag_flat) = (Vec::new(), Vec::new());
    flatten(imag, 0, &mut imag_shape, &mut imag_flat)?;
    if real_shape != imag_shape {
        return Err(format_error("real and imaginary parts differ in shape"));
    }
    let values = real_flat
        .into_iter()
        .zip(imag_flat)
        .map(|(re, im)| Complex::new(re, im))
        .collect();
    NdArray::new(real_shape, ArrayData::Complex(values))
}

fn decode_datetime(json: &Json) -> Result<DateTime<Utc>> {
    let text = json
        .as_str()
        .ok_or_else(|| format_error(format!("__datetime__ must be a string, got {json}")))?;
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Ok(time.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format_error(format!("invalid datetime '{text}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_ndarray_from_ase() {
        let value = decode_legacy(&json!({
            "forces": {"__ndarray__": [[2, 2], "float64", [1.0, 2.0, 3.0, 4.0]]},
            "cell": {"__ndarray__": [[3], "int32", [1, 0, 0]]}
        }))
        .unwrap();

        match value.get("forces") {
            Some(Value::Array(forces)) => {
                assert_eq!(forces.shape(), &[2, 2]);
                assert_eq!(forces.data(), &ArrayData::Float(vec![1.0, 2.0, 3.0, 4.0]));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(value.get("cell"), Some(Value::Array(a)) if a.dtype() == "int64"));
    }

    #[test]
    fn test_complex_arrays() {
        let interleaved = decode_legacy(&json!({"__ndarray__": [[2], "complex128", [1.0, -1.0, 0.5, 0.0]]})).unwrap();
        let nested = decode_legacy(&json!({"__complex_ndarray__": [[1.0, 0.5], [-1.0, 0.0]]})).unwrap();
        assert_eq!(interleaved, nested);

        let ragged = decode_legacy(&json!({"__complex_ndarray__": [[[1.0], [1.0, 2.0]], [[0.0], [0.0, 0.0]]]}));
        assert!(matches!(ragged, Err(Error::UnknownDataFormat { .. })));
    }

    #[test]
    fn test_sets_tuples_and_datetimes() {
        let value = decode_legacy(&json!({
            "symmetries": {"__asr_type__": "set", "value": [2, 1, 2]},
            "kpts": {"__asr_type__": "tuple", "value": [4, 4, 1]},
            "when": {"__datetime__": "2020-09-13T12:26:40.500000"},
            "gap": {"__complex__": [1.0, 0.0]}
        }))
        .unwrap();

        assert_eq!(value.get("symmetries"), Some(&Value::set(vec![Value::from(1), Value::from(2)])));
        assert_eq!(
            value.get("kpts"),
            Some(&Value::tuple(vec![Value::from(4), Value::from(4), Value::from(1)]))
        );
        let expected = Utc.timestamp_opt(1_600_000_000, 500_000_000).unwrap();
        assert_eq!(value.get("when"), Some(&Value::Timestamp(expected)));
        assert_eq!(value.get("gap"), Some(&Value::Complex(Complex::new(1.0, 0.0))));
    }

    #[test]
    fn test_objects_and_unknown_tags() {
        let object = decode_legacy(&json!({"cls_id": "asr.gs::Result", "__dict__": {"gap": 1.5}})).unwrap();
        assert!(matches!(&object, Value::Object(o) if o.type_id == "asr.gs::Result"));

        let unknown = decode_legacy(&json!({"__ase_objtype__": "atoms", "numbers": [14, 14]}));
        assert!(matches!(unknown, Err(Error::UnknownDataFormat { .. })));
    }
}
