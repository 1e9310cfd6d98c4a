//! Instruction definitions and their builder
//!
//! An [`Instruction`] is a plain function plus everything needed to run it
//! reproducibly: a parameter schema, declared input and output files, the
//! instructions it depends on and a schema version. The builder validates
//! the declaration once, so a mistake surfaces when the registry is put
//! together instead of halfway through a computation.

use crate::param::{ParamSpec, Parameters};
use indexmap::IndexSet;
use provenant_core::{Error, Map, Result, Value, DEFAULT_STEP, STEP_SEPARATOR};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type Body = Arc<dyn Fn(&Parameters, &ExecutionContext) -> Result<Value> + Send + Sync>;
type ArgumentHook = Arc<dyn Fn(Parameters) -> Result<Parameters> + Send + Sync>;

/// `module@step` and bare `module` become `module::step` and `module::main`
pub fn canonical_name(name: &str) -> String {
    let name = name.replace('@', STEP_SEPARATOR);
    if name.contains(STEP_SEPARATOR) {
        name
    } else {
        format!("{name}{STEP_SEPARATOR}{DEFAULT_STEP}")
    }
}

/// What a body gets to know about the run it is part of
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub name: String,
    pub uid: String,
    /// Directory `requires` and `creates` are relative to
    pub project_dir: PathBuf,
    /// Working directory reserved for these parameters, also the current directory
    pub workdir: PathBuf,
    pub ncores: usize,
    pub writer: bool,
}

impl ExecutionContext {
    pub fn project_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.project_dir.join(relative)
    }
}

#[derive(Clone)]
pub struct Instruction {
    name: String,
    description: String,
    version: i64,
    params: Vec<ParamSpec>,
    requires: Vec<PathBuf>,
    creates: Vec<PathBuf>,
    dependencies: Vec<String>,
    delete_created: bool,
    hooks: Vec<ArgumentHook>,
    body: Body,
}

impl Instruction {
    pub fn builder<F>(name: &str, signature: &[&str], body: F) -> InstructionBuilder
    where
        F: Fn(&Parameters, &ExecutionContext) -> Result<Value> + Send + Sync + 'static,
    {
        InstructionBuilder::new(name, signature, body)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn requires(&self) -> &[PathBuf] {
        &self.requires
    }

    pub fn creates(&self) -> &[PathBuf] {
        &self.creates
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn delete_created(&self) -> bool {
        self.delete_created
    }

    /// Layer defaults, project overrides and call arguments, then run the hooks
    pub fn resolve_parameters(&self, overrides: Option<&Map>, args: &Map) -> Result<Parameters> {
        self.check_known(overrides, "the parameter file")?;
        self.check_known(Some(args), "the call arguments")?;

        let mut values = Map::new();
        for spec in &self.params {
            let value = args
                .get(&spec.name)
                .or_else(|| overrides.and_then(|o| o.get(&spec.name)))
                .or(spec.default.as_ref())
                .ok_or_else(|| {
                    Error::configuration(format!(
                        "parameter '{}' of '{}' has no value",
                        spec.name, self.name
                    ))
                })?;
            values.insert(spec.name.clone(), value.clone());
        }

        self.hooks
            .iter()
            .try_fold(Parameters::new(values), |params, hook| hook(params))
    }

    fn check_known(&self, values: Option<&Map>, origin: &str) -> Result<()> {
        let Some(values) = values else {
            return Ok(());
        };
        match values
            .keys()
            .find(|key| !self.params.iter().any(|p| &p.name == *key))
        {
            Some(unknown) => Err(Error::configuration(format!(
                "unknown parameter '{unknown}' for '{}' in {origin}",
                self.name
            ))),
            None => Ok(()),
        }
    }

    /// Run the body, wrapping any failure as an execution error
    pub fn call(&self, params: &Parameters, context: &ExecutionContext) -> Result<Value> {
        (self.body)(params, context).map_err(|e| match e {
            Error::Execution { .. } => e,
            other => Error::execution_with_source(&self.name, other.to_string(), other),
        })
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instruction")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("params", &self.params)
            .field("requires", &self.requires)
            .field("creates", &self.creates)
            .field("dependencies", &self.dependencies)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

/// Declares an instruction and validates it on [`build`](InstructionBuilder::build)
pub struct InstructionBuilder {
    name: String,
    signature: Vec<String>,
    description: String,
    version: i64,
    params: Vec<ParamSpec>,
    requires: Vec<PathBuf>,
    creates: Vec<PathBuf>,
    dependencies: Vec<String>,
    delete_created: bool,
    hooks: Vec<ArgumentHook>,
    body: Body,
}

impl InstructionBuilder {
    /// `signature` lists the argument names the body reads
    pub fn new<F>(name: &str, signature: &[&str], body: F) -> Self
    where
        F: Fn(&Parameters, &ExecutionContext) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: canonical_name(name),
            signature: signature.iter().map(|s| s.to_string()).collect(),
            description: String::new(),
            version: 0,
            params: Vec::new(),
            requires: Vec::new(),
            creates: Vec::new(),
            dependencies: Vec::new(),
            delete_created: true,
            hooks: Vec::new(),
            body: Arc::new(body),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// File that has to exist before the body runs
    pub fn requires(mut self, path: impl Into<PathBuf>) -> Self {
        self.requires.push(path.into());
        self
    }

    /// File the body produces
    pub fn creates(mut self, path: impl Into<PathBuf>) -> Self {
        self.creates.push(path.into());
        self
    }

    pub fn dependency(mut self, name: &str) -> Self {
        self.dependencies.push(canonical_name(name));
        self
    }

    /// Whether created files are removed before the body runs, on by default
    pub fn delete_created(mut self, delete: bool) -> Self {
        self.delete_created = delete;
        self
    }

    /// Rewrite the resolved parameters before the run specification is built
    pub fn argument_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(Parameters) -> Result<Parameters> + Send + Sync + 'static,
    {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<Instruction> {
        let name = &self.name;
        if name.split(STEP_SEPARATOR).any(str::is_empty) {
            return Err(Error::configuration(format!(
                "instruction name '{name}' needs a module and a step"
            )));
        }

        let mut declared = IndexSet::new();
        for spec in &self.params {
            if !declared.insert(spec.name.as_str()) {
                return Err(Error::configuration(format!(
                    "parameter '{}' of '{name}' is declared twice",
                    spec.name
                )));
            }
            if !self.signature.contains(&spec.name) {
                return Err(Error::configuration(format!(
                    "parameter '{}' is declared but '{name}' takes no such argument",
                    spec.name
                )));
            }
        }
        if let Some(undeclared) = self.signature.iter().find(|a| !declared.contains(a.as_str())) {
            return Err(Error::configuration(format!(
                "argument '{undeclared}' of '{name}' has no parameter declaration"
            )));
        }
        if self.dependencies.contains(name) {
            return Err(Error::configuration(format!("'{name}' depends on itself")));
        }

        tracing::trace!(name = %name, params = self.params.len(), "built instruction");
        Ok(Instruction {
            name: self.name,
            description: self.description,
            version: self.version,
            params: self.params,
            requires: self.requires,
            creates: self.creates,
            dependencies: self.dependencies,
            delete_created: self.delete_created,
            hooks: self.hooks,
            body: self.body,
        })
    }
}
