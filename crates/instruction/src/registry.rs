//! Everything a process knows how to run, built once at start-up

use crate::instruction::{canonical_name, Instruction};
use indexmap::{IndexMap, IndexSet};
use provenant_cache::{Migration, MigrationEngine};
use provenant_core::{Error, Result, Tagged};
use provenant_record::{Serializer, TypeRegistry};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Registry {
    instructions: IndexMap<String, Instruction>,
    migrations: MigrationEngine,
    types: TypeRegistry,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, instruction: Instruction) -> Result<&mut Self> {
        let name = instruction.name().to_string();
        if self.instructions.contains_key(&name) {
            return Err(Error::configuration(format!(
                "instruction '{name}' is registered twice"
            )));
        }
        self.instructions.insert(name, instruction);
        Ok(self)
    }

    pub fn register_migration(&mut self, migration: Migration) -> &mut Self {
        self.migrations.register(migration);
        self
    }

    /// Make a result type constructible when records are read back
    pub fn register_type<T: Tagged>(&mut self) -> &mut Self {
        self.types.register::<T>();
        self
    }

    /// Look an instruction up by any of its spellings
    pub fn get(&self, name: &str) -> Result<&Instruction> {
        self.instructions
            .get(&canonical_name(name))
            .ok_or_else(|| Error::unknown_instruction(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.instructions.keys().map(String::as_str)
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.values()
    }

    pub fn migrations(&self) -> &MigrationEngine {
        &self.migrations
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn serializer(&self) -> Serializer {
        Serializer::new(Arc::new(self.types.clone()))
    }

    /// Every dependency is registered and the dependency graph has no cycle
    pub fn validate(&self) -> Result<()> {
        for instruction in self.instructions.values() {
            for dependency in instruction.dependencies() {
                if !self.instructions.contains_key(dependency) {
                    return Err(Error::configuration(format!(
                        "'{}' depends on unknown instruction '{dependency}'",
                        instruction.name()
                    )));
                }
            }
        }

        let mut finished = IndexSet::new();
        for name in self.instructions.keys() {
            self.visit(name, &mut IndexSet::new(), &mut finished)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        path: &mut IndexSet<&'a str>,
        finished: &mut IndexSet<&'a str>,
    ) -> Result<()> {
        if finished.contains(name) {
            return Ok(());
        }
        if !path.insert(name) {
            let cycle: Vec<&str> = path.iter().copied().skip_while(|n| *n != name).collect();
            return Err(Error::configuration(format!(
                "dependency cycle: {} -> {name}",
                cycle.join(" -> ")
            )));
        }
        if let Some(instruction) = self.instructions.get(name) {
            for dependency in instruction.dependencies() {
                self.visit(dependency, path, finished)?;
            }
        }
        path.pop();
        finished.insert(name);
        Ok(())
    }
}
