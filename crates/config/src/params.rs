//! Project level parameter overrides read from `<root>/params.json`
//!
//! ```json
//! { "demo::main": { "n": 5 } }
//! ```

use indexmap::IndexMap;
use provenant_core::{Map, Result, ResultExt, Value};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterOverrides {
    by_instruction: IndexMap<String, Map>,
}

impl ParameterOverrides {
    /// Load the override file, a missing file means no overrides
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = provenant_utils::read_string(path)?;
        Self::parse(&content).with_context(|| format!("invalid parameter file '{}'", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let by_instruction: IndexMap<String, Map> = serde_json::from_str(content)?;
        Ok(Self { by_instruction })
    }

    /// Overrides for one instruction
    pub fn for_instruction(&self, name: &str) -> Option<&Map> {
        self.by_instruction.get(name)
    }

    pub fn set(&mut self, instruction: impl Into<String>, param: impl Into<String>, value: Value) {
        self.by_instruction
            .entry(instruction.into())
            .or_default()
            .insert(param.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.by_instruction.is_empty()
    }
}
