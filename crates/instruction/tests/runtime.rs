use provenant_config::{Settings, SettingsLoader};
use provenant_core::{Error, Map, Result, Value};
use provenant_instruction::{InstructionBuilder, ParamSpec, Registry, RunOptions, Runtime};
use provenant_record::Selector;
use provenant_utils::sha256_hex;
use serial_test::serial;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn settings(dir: &TempDir) -> Settings {
    SettingsLoader::new()
        .directory(dir.path())
        .initialize(true)
        .poll_interval(Duration::from_millis(5))
        .barrier_timeout(Some(Duration::from_secs(2)))
        .load()
        .unwrap()
}

fn args(entries: &[(&str, Value)]) -> Map {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// `demo::prepare` writes structure.json, `demo::relax` needs it
fn pipeline(prepared: Arc<AtomicUsize>, relaxed: Arc<AtomicUsize>) -> Registry {
    let prepare = InstructionBuilder::new("demo@prepare", &[], move |_, _| {
        prepared.fetch_add(1, Ordering::SeqCst);
        fs::write("structure.json", r#"{"symbols": "Si2"}"#)?;
        Ok(Value::from("Si2"))
    })
    .creates("structure.json")
    .build()
    .unwrap();

    let relax = InstructionBuilder::new("demo@relax", &["fmax"], move |params, context| {
        relaxed.fetch_add(1, Ordering::SeqCst);
        let structure = fs::read_to_string(context.project_path("structure.json"))?;
        Ok(Value::map([
            ("fmax", Value::from(params.f64("fmax")?)),
            ("input_length", Value::from(structure.len())),
        ]))
    })
    .param(ParamSpec::new("fmax", 0.01))
    .requires("structure.json")
    .dependency("demo@prepare")
    .build()
    .unwrap();

    let mut registry = Registry::new();
    registry.register(prepare).unwrap().register(relax).unwrap();
    registry
}

#[test]
#[serial]
fn test_missing_requirements_fail_before_body() {
    let temp_dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut registry = Registry::new();
    registry
        .register(
            InstructionBuilder::new("demo", &[], move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            })
            .requires("input.txt")
            .build()
            .unwrap(),
        )
        .unwrap();
    let runtime = Runtime::open(&registry, settings(&temp_dir)).unwrap();

    match runtime.run("demo", &Map::new(), RunOptions::default()) {
        Err(Error::RequirementsNotMet { instruction, missing }) => {
            assert_eq!(instruction, "demo::main");
            assert_eq!(missing, vec![std::path::PathBuf::from("input.txt")]);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(runtime.cache().select(None).unwrap().is_empty());
}

#[test]
#[serial]
fn test_computes_once_per_parameters() {
    let temp_dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut registry = Registry::new();
    registry
        .register(
            InstructionBuilder::new("demo", &["n"], move |params, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::from(params.i64("n")? * 14))
            })
            .param(ParamSpec::new("n", 3))
            .build()
            .unwrap(),
        )
        .unwrap();
    let runtime = Runtime::open(&registry, settings(&temp_dir)).unwrap();

    let first = runtime.run("demo", &Map::new(), RunOptions::default()).unwrap();
    let second = runtime.run("demo::main", &Map::new(), RunOptions::default()).unwrap();
    assert_eq!(first.result, Value::from(42));
    assert_eq!(first.uid(), second.uid());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let other = runtime
        .run("demo", &args(&[("n", Value::from(4))]), RunOptions::default())
        .unwrap();
    assert_eq!(other.result, Value::from(56));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let resources = first.resources.unwrap();
    assert!(resources.execution_duration.is_some());
    assert_eq!(resources.ncores, Some(runtime.settings().ncores));
}

#[test]
#[serial]
fn test_dependencies_run_when_outputs_missing() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let prepared = Arc::new(AtomicUsize::new(0));
    let relaxed = Arc::new(AtomicUsize::new(0));
    let registry = pipeline(prepared.clone(), relaxed.clone());
    let runtime = Runtime::open(&registry, settings(&temp_dir))?;

    let record = runtime.run("demo@relax", &Map::new(), RunOptions::default())?;
    assert_eq!(prepared.load(Ordering::SeqCst), 1);
    assert_eq!(relaxed.load(Ordering::SeqCst), 1);

    let structure = temp_dir.path().join("structure.json");
    assert!(structure.exists());
    let prepare_record = runtime
        .cache()
        .get(&Selector::new().equal("name", "demo::prepare"))?;
    assert_eq!(record.dependencies, vec![prepare_record.uid().to_string()]);
    assert_eq!(
        record.required_files.get("structure.json"),
        Some(&sha256_hex(&fs::read(&structure).unwrap()))
    );

    // outputs present: the dependency is not run again, its record is still linked
    let looser = runtime.run(
        "demo@relax",
        &args(&[("fmax", Value::from(0.05))]),
        RunOptions::default(),
    )?;
    assert_eq!(prepared.load(Ordering::SeqCst), 1);
    assert_eq!(relaxed.load(Ordering::SeqCst), 2);
    assert_eq!(looser.dependencies, record.dependencies);
    Ok(())
}

#[test]
#[serial]
fn test_skip_deps_leaves_requirements_unmet() {
    let temp_dir = TempDir::new().unwrap();
    let prepared = Arc::new(AtomicUsize::new(0));
    let registry = pipeline(prepared.clone(), Arc::new(AtomicUsize::new(0)));
    let runtime = Runtime::open(&registry, settings(&temp_dir)).unwrap();

    let result = runtime.run("demo@relax", &Map::new(), RunOptions { skip_deps: true });

    assert!(matches!(result, Err(Error::RequirementsNotMet { .. })));
    assert_eq!(prepared.load(Ordering::SeqCst), 0);
}

#[test]
#[serial]
fn test_created_files_are_published_and_hashed() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let mut registry = Registry::new();
    registry.register(
        InstructionBuilder::new("asr.gs@calculate", &[], |_, context| {
            let here = std::env::current_dir()?.canonicalize()?;
            fs::write("gs.gpw", "wavefunctions")?;
            Ok(Value::from(here == context.workdir.canonicalize()?))
        })
        .creates("gs.gpw")
        .build()?,
    )?;
    let runtime = Runtime::open(&registry, settings(&temp_dir))?;
    let before = std::env::current_dir().unwrap();

    let record = runtime.run("asr.gs@calculate", &Map::new(), RunOptions::default())?;

    assert_eq!(record.result, Value::from(true));
    assert_eq!(std::env::current_dir().unwrap(), before);
    let published = temp_dir.path().join("gs.gpw");
    assert_eq!(fs::read_to_string(&published).unwrap(), "wavefunctions");
    let side_effect = &record.side_effects["gs.gpw"];
    assert_eq!(side_effect.sha256, sha256_hex(b"wavefunctions"));
    assert_eq!(side_effect.path, std::path::PathBuf::from("gs.gpw"));
    Ok(())
}

#[test]
#[serial]
fn test_working_directory_is_reused() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let mut registry = Registry::new();
    registry.register(
        InstructionBuilder::new("demo", &["n"], |_, context| {
            Ok(Value::from(context.workdir.clone()))
        })
        .param(ParamSpec::new("n", 1))
        .build()?,
    )?;
    let runtime = Runtime::open(&registry, settings(&temp_dir))?;

    let first = runtime.run("demo", &Map::new(), RunOptions::default())?;
    runtime.cache().remove(None)?;
    let second = runtime.run("demo", &Map::new(), RunOptions::default())?;
    let different = runtime.run("demo", &args(&[("n", Value::from(2))]), RunOptions::default())?;

    assert_ne!(first.uid(), second.uid());
    assert_eq!(first.result, second.result);
    assert_ne!(first.result, different.result);
    assert_eq!(runtime.workdirs().entries()?.len(), 2);
    Ok(())
}

#[test]
#[serial]
fn test_parameter_file_overrides_defaults() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let settings = settings(&temp_dir);
    fs::write(settings.params_file(), r#"{"demo::main": {"n": 5}}"#).unwrap();

    let mut registry = Registry::new();
    registry.register(
        InstructionBuilder::new("demo", &["n", "xc"], |params, _| {
            Ok(Value::from(params.i64("n")?))
        })
        .param(ParamSpec::new("n", 1))
        .param(ParamSpec::new("xc", "LDA"))
        .build()?,
    )?;
    let runtime = Runtime::open(&registry, settings)?;

    let from_file = runtime.run("demo", &Map::new(), RunOptions::default())?;
    assert_eq!(from_file.result, Value::from(5));
    assert_eq!(from_file.run_specification.parameter("xc"), Some(&Value::from("LDA")));

    let from_call = runtime.run("demo", &args(&[("n", Value::from(9))]), RunOptions::default())?;
    assert_eq!(from_call.result, Value::from(9));

    let unknown = runtime.run("demo", &args(&[("ecut", Value::from(400))]), RunOptions::default());
    assert!(matches!(unknown, Err(Error::Configuration { .. })));
    Ok(())
}

#[test]
#[serial]
fn test_barrier_times_out_when_output_never_appears() {
    let temp_dir = TempDir::new().unwrap();
    let settings = SettingsLoader::new()
        .directory(temp_dir.path())
        .initialize(true)
        .poll_interval(Duration::from_millis(5))
        .barrier_timeout(Some(Duration::from_millis(50)))
        .load()
        .unwrap();
    let mut registry = Registry::new();
    registry
        .register(
            InstructionBuilder::new("demo", &[], |_, _| Ok(Value::Null))
                .creates("results.json")
                .build()
                .unwrap(),
        )
        .unwrap();
    let runtime = Runtime::open(&registry, settings).unwrap();

    let result = runtime.run("demo", &Map::new(), RunOptions::default());

    assert!(matches!(result, Err(Error::BarrierTimeout { .. })));
    assert!(runtime.cache().select(None).unwrap().is_empty());
}

#[test]
#[serial]
fn test_unknown_instruction() {
    let temp_dir = TempDir::new().unwrap();
    let registry = Registry::new();
    let runtime = Runtime::open(&registry, settings(&temp_dir)).unwrap();

    assert!(matches!(
        runtime.run("asr.nothing", &Map::new(), RunOptions::default()),
        Err(Error::UnknownInstruction { .. })
    ));
}
