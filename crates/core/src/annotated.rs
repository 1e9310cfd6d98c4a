//! Values carrying a human readable explanation

use crate::value::{Tagged, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// A payload plus the description shown next to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotated<T> {
    pub value: T,
    pub description: String,
}

impl<T> Annotated<T> {
    pub fn new(value: T, description: impl Into<String>) -> Self {
        Self {
            value,
            description: description.into(),
        }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for Annotated<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T: fmt::Display> fmt::Display for Annotated<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.value, self.description)
    }
}

impl Tagged for Annotated<Value> {
    const TYPE_ID: &'static str = "provenant.annotated";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deref_and_display() {
        let gap = Annotated::new(1.5_f64, "Band gap [eV]");
        assert_eq!(*gap + 0.5, 2.0);
        assert_eq!(gap.to_string(), "1.5 (Band gap [eV])");
    }

    #[test]
    fn test_travels_as_tagged_object() {
        let annotated = Annotated::new(Value::from(3), "Number of k-points");
        let value = Value::from_tagged(&annotated).unwrap();
        assert_eq!(value.get("description"), Some(&Value::from("Number of k-points")));
        assert_eq!(value.to_tagged::<Annotated<Value>>().unwrap(), annotated);
    }
}
