use chrono::{DateTime, Utc};
use provenant_core::{Map, Value};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Wall time and core count of one execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub execution_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub execution_end: Option<DateTime<Utc>>,
    /// Seconds
    #[serde(default)]
    pub execution_duration: Option<f64>,
    #[serde(default)]
    pub ncores: Option<usize>,
}

impl Resources {
    /// Run `f` and record how long it took
    pub fn measure<T>(ncores: usize, f: impl FnOnce() -> T) -> (T, Resources) {
        let start = Utc::now();
        let clock = Instant::now();
        let output = f();
        let duration = clock.elapsed().as_secs_f64();
        let resources = Resources {
            execution_start: Some(start),
            execution_end: Some(Utc::now()),
            execution_duration: Some(duration),
            ncores: Some(ncores),
        };
        (output, resources)
    }

    pub(crate) fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("execution_start".into(), self.execution_start.into());
        map.insert("execution_end".into(), self.execution_end.into());
        map.insert("execution_duration".into(), self.execution_duration.into());
        map.insert("ncores".into(), self.ncores.into());
        Value::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_measure() {
        let (answer, resources) = Resources::measure(4, || {
            std::thread::sleep(Duration::from_millis(10));
            42
        });
        assert_eq!(answer, 42);
        assert_eq!(resources.ncores, Some(4));
        assert!(resources.execution_duration.unwrap() >= 0.01);
        assert!(resources.execution_end.unwrap() >= resources.execution_start.unwrap());
    }

    #[test]
    fn test_missing_fields_deserialize_as_none() {
        let resources: Resources = serde_json::from_str(r#"{"ncores": 2}"#).unwrap();
        assert_eq!(resources.ncores, Some(2));
        assert_eq!(resources.execution_start, None);
    }
}
