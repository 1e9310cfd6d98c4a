//! `deserialize(serialize(v)) == v` for every value shape

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use provenant_core::{Annotated, ArrayData, Complex, ExternalFile, Map, NdArray, Value};
use provenant_record::{Record, Resources, RunSpecification, Serializer};
use std::path::PathBuf;

fn finite_float() -> impl Strategy<Value = f64> {
    prop::num::f64::NORMAL | prop::num::f64::ZERO
}

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        finite_float().prop_map(Value::Float),
        (finite_float(), finite_float()).prop_map(|(re, im)| Value::Complex(Complex::new(re, im))),
        "[a-zA-Z0-9 _.-]{0,12}".prop_map(Value::Str),
        (0i64..2_000_000_000, 0u32..1_000_000_000)
            .prop_map(|(secs, nanos)| Value::Timestamp(Utc.timestamp_opt(secs, nanos).unwrap())),
        "[a-z]{1,8}(/[a-z]{1,8}){0,2}".prop_map(|p| Value::Path(PathBuf::from(p))),
        ("[a-z]{1,8}\\.gpw", "[0-9a-f]{64}")
            .prop_map(|(p, sha)| Value::File(ExternalFile::new(p, sha))),
        prop::collection::vec(finite_float(), 0..6).prop_map(|v| Value::Array(NdArray::from_f64(v))),
        prop::collection::vec(any::<i64>(), 6)
            .prop_map(|v| Value::Array(NdArray::new(vec![2, 3], ArrayData::Int(v)).unwrap())),
        prop::collection::vec((finite_float(), finite_float()), 4).prop_map(|v| {
            let data = v.into_iter().map(|(re, im)| Complex::new(re, im)).collect();
            Value::Array(NdArray::new(vec![2, 2], ArrayData::Complex(data)).unwrap())
        }),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(Value::List),
            prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Tuple),
            prop::collection::vec(inner.clone(), 0..5).prop_map(Value::set),
            prop::collection::vec(("[a-z_]{1,8}", inner.clone()), 0..5)
                .prop_map(|entries| Value::Map(entries.into_iter().collect::<Map>())),
            inner.clone().prop_map(|v| Value::map([("__type__", v)])),
            inner.prop_map(|v| Value::from_tagged(&Annotated::new(v, "explained")).unwrap()),
        ]
    })
}

proptest! {
    #[test]
    fn value_round_trips(v in value()) {
        let serializer = Serializer::default();
        let text = serializer.serialize(&v).unwrap();
        prop_assert_eq!(serializer.deserialize(&text).unwrap(), v);
    }

    #[test]
    fn record_round_trips(result in value(), n in any::<i64>(), version in -1i64..5) {
        let serializer = Serializer::default();
        let mut params = Map::new();
        params.insert("n".into(), Value::from(n));
        let (_, resources) = Resources::measure(2, || ());
        let record = Record::new(RunSpecification::new("demo::main", params, version), result)
            .with_resources(resources)
            .with_tag("proptest");

        let text = serializer.serialize_record(&record).unwrap();
        prop_assert_eq!(serializer.deserialize_record(&text).unwrap(), record);
    }
}

#[test]
fn non_finite_floats_round_trip() {
    let serializer = Serializer::default();
    let value = Value::from(vec![Value::Float(f64::INFINITY), Value::Float(f64::NEG_INFINITY)]);
    let text = serializer.serialize(&value).unwrap();
    assert_eq!(serializer.deserialize(&text).unwrap(), value);

    let nan = serializer.deserialize(&serializer.serialize(&Value::Float(f64::NAN)).unwrap()).unwrap();
    assert!(nan.as_f64().unwrap().is_nan());
}
