//! Running instructions against a cache
//!
//! [`Runtime::run`] resolves parameters, asks the cache for a current record
//! of the same computation and only on a miss walks the dependencies, checks
//! the required files and executes the body. The body runs inside its
//! reserved working directory, between the two halves of a file barrier.

use crate::instruction::{ExecutionContext, Instruction};
use crate::param::Parameters;
use crate::registry::Registry;
use crate::workdir::WorkDirRegistry;
use indexmap::IndexMap;
use parking_lot::Mutex;
use provenant_cache::Cache;
use provenant_config::{ParameterOverrides, Settings};
use provenant_core::{Error, Map, Result};
use provenant_record::{Record, Resources, RunSpecification, Selector, SideEffect};
use provenant_utils::logging::instruction_span;
use provenant_utils::{copy_atomic, sha256_file, ChdirGuard, FileBarrier};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Do not run dependencies whose outputs are missing
    pub skip_deps: bool,
}

#[derive(Debug)]
pub struct Runtime<'r> {
    registry: &'r Registry,
    settings: Settings,
    cache: Cache,
    overrides: ParameterOverrides,
    workdirs: WorkDirRegistry,
    // the working directory is process global
    cwd: Mutex<()>,
}

impl<'r> Runtime<'r> {
    /// Validate the registry and open the cache named in the settings
    pub fn open(registry: &'r Registry, settings: Settings) -> Result<Self> {
        registry.validate()?;
        let cache = Cache::from_settings(&settings, registry.serializer())?;
        let overrides = ParameterOverrides::load(&settings.params_file())?;
        Ok(Self {
            registry,
            workdirs: WorkDirRegistry::new(&settings),
            settings,
            cache,
            overrides,
            cwd: Mutex::new(()),
        })
    }

    /// Use a different cache, keeping the writer flag from the settings
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = cache.writer(self.settings.is_writer());
        self
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn workdirs(&self) -> &WorkDirRegistry {
        &self.workdirs
    }

    /// Run an instruction, or fetch its current record when one is cached
    pub fn run(&self, name: &str, args: &Map, options: RunOptions) -> Result<Record> {
        let instruction = self.registry.get(name)?;
        let params = instruction
            .resolve_parameters(self.overrides.for_instruction(instruction.name()), args)?;
        let spec = RunSpecification::new(instruction.name(), params.into_map(), instruction.version());

        let _span = instruction_span(spec.name(), spec.uid()).entered();
        self.cache
            .get_or_compute(&spec, |spec| self.execute(instruction, spec, options))
    }

    fn execute(&self, instruction: &Instruction, spec: &RunSpecification, options: RunOptions) -> Result<Record> {
        let dependencies = self.resolve_dependencies(instruction, options)?;

        let missing: Vec<PathBuf> = instruction
            .requires()
            .iter()
            .filter(|path| !self.settings.project_path(path).exists())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(Error::requirements_not_met(spec.name(), missing));
        }
        let required_files = instruction
            .requires()
            .iter()
            .map(|path| -> Result<(String, String)> {
                Ok((path.display().to_string(), sha256_file(&self.settings.project_path(path))?))
            })
            .collect::<Result<IndexMap<_, _>>>()?;

        let workdir = self.workdirs.get_or_create(spec)?;
        let created: Vec<PathBuf> = instruction
            .creates()
            .iter()
            .map(|path| self.settings.project_path(path))
            .collect();
        let barrier = FileBarrier::new(created, self.settings.poll_config())
            .delete(instruction.delete_created())
            .writer(self.settings.is_writer());
        let context = ExecutionContext {
            name: spec.name().to_string(),
            uid: spec.uid().to_string(),
            project_dir: self.settings.project_dir.clone(),
            workdir: workdir.clone(),
            ncores: self.settings.ncores,
            writer: self.settings.is_writer(),
        };
        let params = Parameters::new(spec.parameters().clone());

        tracing::info!(name = spec.name(), workdir = %workdir.display(), "executing");
        let (result, resources) = Resources::measure(self.settings.ncores, || {
            barrier.run(|| {
                let value = {
                    let _cwd = self.cwd.lock();
                    let _dir = ChdirGuard::enter(&workdir, true)?;
                    instruction.call(&params, &context)?
                };
                self.publish(instruction, &workdir)?;
                Ok(value)
            })
        });
        let result = result?;

        let mut side_effects = IndexMap::new();
        for path in instruction.creates() {
            let sha256 = sha256_file(&self.settings.project_path(path))?;
            side_effects.insert(
                path.display().to_string(),
                SideEffect {
                    sha256,
                    path: path.clone(),
                },
            );
        }

        let mut record = Record::new(spec.clone(), result)
            .with_resources(resources)
            .with_dependencies(dependencies);
        record.side_effects = side_effects;
        record.required_files = required_files;
        tracing::info!(
            name = spec.name(),
            uid = record.uid(),
            duration = record.resources.as_ref().and_then(|r| r.execution_duration),
            "finished"
        );
        Ok(record)
    }

    /// Run dependencies whose outputs are missing, returning the uids used
    ///
    /// A dependency without declared outputs always goes through the cache,
    /// which makes it a lookup once it has run.
    fn resolve_dependencies(&self, instruction: &Instruction, options: RunOptions) -> Result<Vec<String>> {
        let mut uids = Vec::new();
        for name in instruction.dependencies() {
            let dependency = self.registry.get(name)?;
            let outputs_present = !dependency.creates().is_empty()
                && dependency
                    .creates()
                    .iter()
                    .all(|path| self.settings.project_path(path).exists());

            if outputs_present || options.skip_deps {
                if let Some(uid) = self.latest_current_uid(dependency.name())? {
                    uids.push(uid);
                }
                continue;
            }

            tracing::info!(dependency = %name, of = instruction.name(), "running dependency");
            let record = self.run(name, &Map::new(), options)?;
            uids.push(record.uid().to_string());
        }
        Ok(uids)
    }

    fn latest_current_uid(&self, name: &str) -> Result<Option<String>> {
        let selector = Selector::new().equal("run_specification.name", name).current();
        Ok(self
            .cache
            .select(Some(&selector))?
            .into_iter()
            .max_by_key(|r| r.resources.as_ref().and_then(|res| res.execution_end))
            .map(|r| r.uid().to_string()))
    }

    /// Move created files written relative to the working directory into the project
    fn publish(&self, instruction: &Instruction, workdir: &Path) -> Result<()> {
        if !self.settings.is_writer() {
            return Ok(());
        }
        for relative in instruction.creates() {
            let source = workdir.join(relative);
            let target = self.settings.project_path(relative);
            if source == target || !source.exists() {
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| Error::file_system(parent, "create directory", e))?;
            }
            if fs::rename(&source, &target).is_err() {
                copy_atomic(&source, &target)?;
                fs::remove_file(&source).map_err(|e| Error::file_system(&source, "remove file", e))?;
            }
            tracing::debug!(file = %relative.display(), "published created file");
        }
        Ok(())
    }
}
