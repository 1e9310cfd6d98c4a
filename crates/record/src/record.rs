//! The record: provenance envelope around one computation

use crate::resources::Resources;
use crate::specification::RunSpecification;
use indexmap::IndexMap;
use provenant_core::{Map, Value};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A file produced by an instruction body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffect {
    pub sha256: String,
    /// Where the file was published, relative to the project directory
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub run_specification: RunSpecification,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub resources: Option<Resources>,
    #[serde(default)]
    pub side_effects: IndexMap<String, SideEffect>,
    /// File name to sha256 of every declared input
    #[serde(default)]
    pub required_files: IndexMap<String, String>,
    /// uids of the dependency records used, in order
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub migration_id: Option<String>,
    #[serde(default)]
    pub migrated_from: Option<String>,
    #[serde(default)]
    pub migrated_to: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Record {
    pub fn new(run_specification: RunSpecification, result: impl Into<Value>) -> Self {
        Self {
            run_specification,
            result: result.into(),
            resources: None,
            side_effects: IndexMap::new(),
            required_files: IndexMap::new(),
            dependencies: Vec::new(),
            migration_id: None,
            migrated_from: None,
            migrated_to: None,
            tags: Vec::new(),
        }
    }

    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn uid(&self) -> &str {
        self.run_specification.uid()
    }

    pub fn name(&self) -> &str {
        self.run_specification.name()
    }

    pub fn version(&self) -> i64 {
        self.run_specification.version()
    }

    pub fn parameters(&self) -> &Map {
        self.run_specification.parameters()
    }

    /// Not superseded by a migration
    pub fn is_current(&self) -> bool {
        self.migrated_to.is_none()
    }

    /// Value view walked by selectors
    ///
    /// All record fields under their own names, plus the shortcuts `uid`,
    /// `name`, `version` and `parameters` for the run specification fields.
    pub fn to_value(&self) -> Value {
        let spec = &self.run_specification;
        let parameters = Value::Map(spec.parameters().clone());

        let mut spec_map = Map::new();
        spec_map.insert("name".into(), spec.name().into());
        spec_map.insert("parameters".into(), parameters.clone());
        spec_map.insert("version".into(), spec.version().into());
        spec_map.insert("uid".into(), spec.uid().into());

        let side_effects = self
            .side_effects
            .iter()
            .map(|(name, effect)| {
                let mut entry = Map::new();
                entry.insert("sha256".into(), effect.sha256.clone().into());
                entry.insert("path".into(), Value::Path(effect.path.clone()));
                (name.clone(), Value::Map(entry))
            })
            .collect::<Map>();
        let required_files = self
            .required_files
            .iter()
            .map(|(name, digest)| (name.clone(), Value::from(digest.clone())))
            .collect::<Map>();

        let mut map = Map::new();
        map.insert("run_specification".into(), Value::Map(spec_map));
        map.insert("uid".into(), spec.uid().into());
        map.insert("name".into(), spec.name().into());
        map.insert("version".into(), spec.version().into());
        map.insert("parameters".into(), parameters);
        map.insert("result".into(), self.result.clone());
        map.insert(
            "resources".into(),
            self.resources.as_ref().map_or(Value::Null, Resources::to_value),
        );
        map.insert("side_effects".into(), Value::Map(side_effects));
        map.insert("required_files".into(), Value::Map(required_files));
        map.insert("dependencies".into(), self.dependencies.clone().into());
        map.insert("migration_id".into(), self.migration_id.clone().into());
        map.insert("migrated_from".into(), self.migrated_from.clone().into());
        map.insert("migrated_to".into(), self.migrated_to.clone().into());
        map.insert("tags".into(), self.tags.clone().into());
        Value::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> Record {
        let mut params = Map::new();
        params.insert("n".into(), Value::from(3));
        Record::new(RunSpecification::new("demo::main", params, 0), 42)
    }

    #[test]
    fn test_uid_matches_specification() {
        let record = demo();
        assert_eq!(record.uid(), record.run_specification.uid());
        assert!(record.is_current());
    }

    #[test]
    fn test_value_view_has_aliases() {
        let record = demo().with_tag("converged");
        let view = record.to_value();

        assert_eq!(view.lookup(&["name"]), Some(&Value::from("demo::main")));
        assert_eq!(
            view.lookup(&["run_specification", "parameters", "n"]),
            Some(&Value::Int(3))
        );
        assert_eq!(view.lookup(&["parameters", "n"]), Some(&Value::Int(3)));
        assert_eq!(view.lookup(&["migrated_to"]), Some(&Value::Null));
        assert_eq!(view.lookup(&["tags", "0"]), Some(&Value::from("converged")));
        assert_eq!(view.lookup(&["result"]), Some(&Value::Int(42)));
        assert_eq!(view.lookup(&["resources"]), Some(&Value::Null));
    }

    #[test]
    fn test_older_record_files_fill_defaults() {
        let json = serde_json::json!({
            "run_specification": {
                "name": "demo::main",
                "parameters": {},
                "version": 0,
                "uid": "0123456789abcdef0123456789abcdef"
            },
            "result": 1
        });
        let record: Record = serde_json::from_value(json).unwrap();
        assert!(record.side_effects.is_empty());
        assert!(record.migrated_to.is_none());
        assert_eq!(record.result, Value::Int(1));
    }
}
