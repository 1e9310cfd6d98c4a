//! JSON text serializer for results and records
//!
//! The wire encoding of individual values lives in `provenant_core::value`.
//! This layer adds the policy: a tagged object is only accepted when its type
//! id has been registered, so reading a file never constructs a type the
//! process does not know about.

use crate::record::Record;
use indexmap::IndexMap;
use provenant_core::{Annotated, Error, Result, Tagged, Value};
use std::sync::Arc;

/// Known constructible type ids
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: IndexMap<String, &'static str>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Registry holding the built-in types
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register::<Annotated<Value>>();
        registry
    }

    pub fn empty() -> Self {
        Self {
            types: IndexMap::new(),
        }
    }

    pub fn register<T: Tagged>(&mut self) -> &mut Self {
        self.types
            .insert(T::TYPE_ID.to_string(), std::any::type_name::<T>());
        self
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.types.contains_key(type_id)
    }

    pub fn type_ids(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Fail on the first tagged object whose type id is unknown
    pub fn validate(&self, value: &Value) -> Result<()> {
        value.visit_objects(&mut |object| {
            if self.contains(&object.type_id) {
                Ok(())
            } else {
                tracing::debug!(type_id = %object.type_id, "unregistered type id");
                Err(Error::unknown_data_format(format!(
                    "type id '{}' is not registered",
                    object.type_id
                )))
            }
        })
    }
}

/// Serializes values and records to JSON text and back
#[derive(Debug, Clone, Default)]
pub struct Serializer {
    registry: Arc<TypeRegistry>,
}

impl Serializer {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn serialize(&self, value: &Value) -> Result<String> {
        Ok(serde_json::to_string_pretty(value)?)
    }

    pub fn deserialize(&self, text: &str) -> Result<Value> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        let value = provenant_core::value::decode(&json)?;
        self.registry.validate(&value)?;
        Ok(value)
    }

    pub fn serialize_record(&self, record: &Record) -> Result<String> {
        Ok(serde_json::to_string_pretty(record)?)
    }

    pub fn deserialize_record(&self, text: &str) -> Result<Record> {
        let record: Record = serde_json::from_str(text).map_err(|e| {
            if e.is_data() {
                Error::unknown_data_format(format!("record cannot be decoded: {e}"))
            } else {
                Error::from(e)
            }
        })?;
        self.registry.validate(&record.result)?;
        for value in record.parameters().values() {
            self.registry.validate(value)?;
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specification::RunSpecification;
    use provenant_core::{Map, Object};

    fn unknown_object() -> Value {
        Value::Object(Object {
            type_id: "ase.Atoms".into(),
            attrs: Map::new(),
        })
    }

    #[test]
    fn test_annotated_is_builtin() {
        let serializer = Serializer::default();
        let value = Value::from_tagged(&Annotated::new(Value::from(1.5), "gap")).unwrap();
        let text = serializer.serialize(&value).unwrap();
        assert_eq!(serializer.deserialize(&text).unwrap(), value);
    }

    #[test]
    fn test_unregistered_type_fails_closed() {
        let serializer = Serializer::default();
        let text = serializer
            .serialize(&Value::from(vec![unknown_object()]))
            .unwrap();
        assert!(matches!(
            serializer.deserialize(&text),
            Err(Error::UnknownDataFormat { .. })
        ));
    }

    #[test]
    fn test_unknown_tag_fails() {
        let serializer = Serializer::default();
        let err = serializer
            .deserialize(r#"{"__type__": "pickle", "value": "gASV"}"#)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownDataFormat { .. }));
    }

    #[test]
    fn test_record_with_unknown_object_in_result() {
        let serializer = Serializer::default();
        let record = Record::new(RunSpecification::new("demo::main", Map::new(), 0), unknown_object());
        let text = serializer.serialize_record(&record).unwrap();
        assert!(matches!(
            serializer.deserialize_record(&text),
            Err(Error::UnknownDataFormat { .. })
        ));
    }

    #[test]
    fn test_record_round_trip() {
        let serializer = Serializer::default();
        let mut params = Map::new();
        params.insert("kpts".into(), Value::tuple([Value::from(4), Value::from(4)]));
        let record = Record::new(RunSpecification::new("demo::main", params, 2), 42)
            .with_dependencies(vec!["abc".into()]);

        let text = serializer.serialize_record(&record).unwrap();
        assert_eq!(serializer.deserialize_record(&text).unwrap(), record);
    }
}
