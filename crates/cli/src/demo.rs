//! Built-in demonstration instructions
//!
//! A tiny stand-in for a recipe library: a structure is prepared, relaxed
//! and summarised, which is enough to exercise parameters, dependencies,
//! created files, tagged result types and a schema migration from the
//! command line.

use provenant_cache::Migration;
use provenant_core::{Annotated, Result, Tagged, Value};
use provenant_instruction::{InstructionBuilder, ParamSpec, Registry};
use provenant_record::{Comparator, Record, RunSpecification, Selector};
use serde::{Deserialize, Serialize};
use std::fs;

/// Outcome of `demo::relax`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaxResult {
    pub fmax: f64,
    pub steps: i64,
    pub energy: f64,
}

impl Tagged for RelaxResult {
    const TYPE_ID: &'static str = "demo.relax_result";
}

pub fn registry() -> Result<Registry> {
    let mut registry = Registry::new();
    registry.register_type::<RelaxResult>();

    registry.register(
        InstructionBuilder::new("demo", &["n"], |params, _| Ok(Value::from(params.i64("n")? * 14)))
            .description("Multiply a number, the smallest possible instruction")
            .version(1)
            .param(ParamSpec::new("n", 3).help("Number to multiply"))
            .build()?,
    )?;

    registry.register(
        InstructionBuilder::new("demo@structure", &["symbols"], |params, _| {
            let symbols = params.str("symbols")?;
            fs::write("structure.json", serde_json::json!({ "symbols": symbols }).to_string())?;
            Ok(Value::from(symbols))
        })
        .description("Write a structure file")
        .param(ParamSpec::new("symbols", "Si2"))
        .creates("structure.json")
        .build()?,
    )?;

    registry.register(
        InstructionBuilder::new("demo@relax", &["fmax"], |params, context| {
            let structure = fs::read_to_string(context.project_path("structure.json"))?;
            let fmax = params.f64("fmax")?;
            let steps = (0.1 / fmax).ceil() as i64;
            let relaxed = RelaxResult {
                fmax,
                steps,
                energy: -(structure.len() as f64) / 10.0,
            };
            Value::from_tagged(&relaxed)
        })
        .description("Relax the structure written by demo@structure")
        .param(ParamSpec::new("fmax", 0.01).help("Force convergence criterion [eV/Å]"))
        .requires("structure.json")
        .dependency("demo@structure")
        .build()?,
    )?;

    registry.register(
        InstructionBuilder::new("demo@summary", &[], |_, context| {
            let structure = fs::read_to_string(context.project_path("structure.json"))?;
            let summary = Annotated::new(Value::from(structure.len()), "Bytes in the structure file");
            Value::from_tagged(&summary)
        })
        .description("Summarise the structure, needs demo@structure to have run")
        .requires("structure.json")
        .build()?,
    )?;

    registry.register_migration(
        Migration::new(
            "demo.version_one",
            Selector::new()
                .equal("name", "demo::main")
                .with("version", Comparator::LessThan(Value::from(1))),
            |record: &Record| {
                let mut migrated = record.clone();
                migrated.run_specification =
                    RunSpecification::new(record.name(), record.parameters().clone(), 1);
                Ok(migrated)
            },
        )
        .description("Older and imported results of demo::main are valid under version one"),
    );

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_consistent() {
        let registry = registry().unwrap();
        registry.validate().unwrap();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["demo::main", "demo::structure", "demo::relax", "demo::summary"]
        );
        assert!(registry.types().contains(RelaxResult::TYPE_ID));
    }
}
