use provenant_core::value::encode;
use provenant_core::{Map, Value, UID_PREFIX_LEN};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Fresh globally unique identifier, 32 lowercase hex characters
pub fn new_uid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Leading characters of a uid used in file and directory names
pub fn uid_prefix(uid: &str) -> &str {
    uid.get(..UID_PREFIX_LEN).unwrap_or(uid)
}

/// Immutable identity of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpecification {
    name: String,
    parameters: Map,
    version: i64,
    uid: String,
}

impl RunSpecification {
    /// New specification with a freshly generated uid
    pub fn new(name: impl Into<String>, parameters: Map, version: i64) -> Self {
        Self::build(name.into(), parameters, version, new_uid())
    }

    /// Rebuild a specification whose uid is already known
    pub fn from_parts(name: impl Into<String>, parameters: Map, version: i64, uid: impl Into<String>) -> Self {
        Self::build(name.into(), parameters, version, uid.into())
    }

    fn build(name: String, parameters: Map, version: i64, uid: String) -> Self {
        Self {
            name,
            parameters,
            version,
            uid,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &Map {
        &self.parameters
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Same computation under a new uid
    pub fn with_uid(&self) -> Self {
        Self::build(self.name.clone(), self.parameters.clone(), self.version, new_uid())
    }

    /// sha256 over name, parameters (keys sorted) and version
    ///
    /// Equal fingerprints mean the same computation regardless of uid or the
    /// order parameters were supplied in.
    pub fn fingerprint(&self) -> String {
        let parameters: BTreeMap<&str, serde_json::Value> = self
            .parameters
            .iter()
            .map(|(k, v)| (k.as_str(), encode(v)))
            .collect();
        let canonical = serde_json::json!([self.name, parameters, self.version]);
        hex::encode(Sha256::digest(canonical.to_string().as_bytes()))
    }

    /// `<name>-<uid prefix>`, used for record files and working directories
    pub fn file_stem(&self) -> String {
        format!("{}-{}", self.name, uid_prefix(&self.uid))
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }
}

impl fmt::Display for RunSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, (key, value)) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        write!(f, ") v{}", self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(n: i64, xc: &str) -> Map {
        let mut map = Map::new();
        map.insert("n".into(), Value::from(n));
        map.insert("xc".into(), Value::from(xc));
        map
    }

    #[test]
    fn test_uids_are_unique_hex() {
        let a = RunSpecification::new("demo::main", Map::new(), 0);
        let b = RunSpecification::new("demo::main", Map::new(), 0);
        assert_ne!(a.uid(), b.uid());
        assert_eq!(a.uid().len(), 32);
        assert!(a.uid().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_ignores_uid_and_key_order() {
        let a = RunSpecification::new("demo::main", params(3, "PBE"), 0);
        let mut reordered = Map::new();
        reordered.insert("xc".into(), Value::from("PBE"));
        reordered.insert("n".into(), Value::from(3));
        let b = RunSpecification::new("demo::main", reordered, 0);

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.with_uid().fingerprint());
    }

    #[test]
    fn test_fingerprint_distinguishes_version_and_parameters() {
        let base = RunSpecification::new("demo::main", params(3, "PBE"), 0);
        let bumped = RunSpecification::new("demo::main", params(3, "PBE"), 1);
        let changed = RunSpecification::new("demo::main", params(4, "PBE"), 0);
        assert_ne!(base.fingerprint(), bumped.fingerprint());
        assert_ne!(base.fingerprint(), changed.fingerprint());
    }

    #[test]
    fn test_file_stem_uses_uid_prefix() {
        let spec = RunSpecification::from_parts("demo::main", Map::new(), 0, "0123456789abcdef");
        assert_eq!(spec.file_stem(), "demo::main-0123456789");
        assert_eq!(uid_prefix("abc"), "abc");
    }

    #[test]
    fn test_display() {
        let spec = RunSpecification::new("demo::main", params(3, "PBE"), 2);
        assert_eq!(spec.to_string(), "demo::main(n=3, xc=\"PBE\") v2");
    }
}
