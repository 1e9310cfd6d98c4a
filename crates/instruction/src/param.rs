//! Parameter declarations and resolved parameter values

use provenant_core::{Error, Map, Result, Value};
use std::fmt;

/// Declaration of one instruction parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    /// `None` makes the parameter mandatory
    pub default: Option<Value>,
    pub help: String,
}

impl ParamSpec {
    /// Parameter with a default value
    pub fn new(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
            help: String::new(),
        }
    }

    /// Parameter the caller has to supply
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            help: String::new(),
        }
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }
}

/// Fully resolved parameters handed to an instruction body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: Map,
}

impl Parameters {
    pub fn new(values: Map) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Value of a parameter that has to be present
    pub fn value(&self, name: &str) -> Result<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| Error::configuration(format!("no parameter named '{name}'")))
    }

    pub fn i64(&self, name: &str) -> Result<i64> {
        let value = self.value(name)?;
        value.as_i64().ok_or_else(|| wrong_type(name, "an integer", value))
    }

    pub fn f64(&self, name: &str) -> Result<f64> {
        let value = self.value(name)?;
        value.as_f64().ok_or_else(|| wrong_type(name, "a number", value))
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        let value = self.value(name)?;
        value.as_str().ok_or_else(|| wrong_type(name, "a string", value))
    }

    pub fn bool(&self, name: &str) -> Result<bool> {
        let value = self.value(name)?;
        value.as_bool().ok_or_else(|| wrong_type(name, "a boolean", value))
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn as_map(&self) -> &Map {
        &self.values
    }

    pub fn into_map(self) -> Map {
        self.values
    }
}

impl From<Map> for Parameters {
    fn from(values: Map) -> Self {
        Self::new(values)
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

fn wrong_type(name: &str, expected: &str, value: &Value) -> Error {
    Error::configuration(format!(
        "parameter '{name}' should be {expected}, got {}",
        value.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let mut params = Parameters::default();
        params.set("n", 3);
        params.set("xc", "PBE");

        assert_eq!(params.i64("n").unwrap(), 3);
        assert_eq!(params.str("xc").unwrap(), "PBE");
        assert!(matches!(params.f64("xc"), Err(Error::Configuration { .. })));
        assert!(matches!(params.bool("missing"), Err(Error::Configuration { .. })));
    }
}
