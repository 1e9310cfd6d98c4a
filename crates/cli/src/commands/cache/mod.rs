use crate::demo;
use clap::Subcommand;
use provenant_cache::{Cache, LegacyFileSystemBackend};
use provenant_config::Settings;
use provenant_core::{Error, Result};
use provenant_record::{uid_prefix, Record, Selector, Serializer};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// List records, optionally filtered
    Ls {
        /// Constraint such as `name=demo::main` or `parameters.n>2`, repeatable
        #[arg(short = 'w', long = "where", value_name = "PATH=VALUE")]
        constraints: Vec<String>,

        /// Include records superseded by a migration
        #[arg(long)]
        all: bool,
    },
    /// Print one record, looked up by uid or uid prefix
    Show { uid: String },
    /// Remove every record matching the constraints
    Rm {
        #[arg(short = 'w', long = "where", value_name = "PATH=VALUE", required = true)]
        constraints: Vec<String>,
    },
    /// Bring records up to the current schema
    Migrate {
        /// Only print the migrations that would run
        #[arg(long)]
        dry_run: bool,
    },
    /// Import flat result files written by older versions
    ImportLegacy {
        /// Directory to scan (defaults to the project directory)
        dir: Option<PathBuf>,
    },
}

impl CacheCommands {
    pub fn execute(self, settings: &Settings) -> Result<()> {
        let registry = demo::registry()?;
        let serializer = registry.serializer();
        let cache = Cache::from_settings(settings, serializer.clone())?;

        match self {
            CacheCommands::Ls { constraints, all } => {
                let mut selector = parse_selector(&constraints)?;
                if !all {
                    selector = selector.current();
                }
                let records = cache.select(Some(&selector))?;
                for record in &records {
                    match render(record, &serializer) {
                        Ok(line) => println!("{line}"),
                        Err(e) if !settings.test_mode => {
                            tracing::warn!(uid = record.uid(), error = %e, "could not render record");
                        }
                        Err(e) => return Err(e),
                    }
                }
                tracing::info!(count = records.len(), "listed records");
                Ok(())
            }
            CacheCommands::Show { uid } => {
                let record = find_by_prefix(&cache, &uid)?;
                println!("{}", serializer.serialize_record(&record)?);
                Ok(())
            }
            CacheCommands::Rm { constraints } => {
                let selector = parse_selector(&constraints)?;
                let removed = cache.remove(Some(&selector))?;
                for record in &removed {
                    tracing::info!(uid = record.uid(), name = record.name(), "removed record");
                }
                println!("removed {} record(s)", removed.len());
                Ok(())
            }
            CacheCommands::Migrate { dry_run } => {
                let engine = registry.migrations();
                if dry_run {
                    for record in cache.select(Some(&Selector::new().current()))? {
                        let chain = engine.plan(&record)?;
                        if !chain.is_empty() {
                            println!("{} {}: {}", uid_prefix(record.uid()), record.name(), chain.join(" -> "));
                        }
                    }
                    return Ok(());
                }

                let report = engine.migrate_all(&cache)?;
                for step in &report.applied {
                    println!(
                        "{} -> {} ({})",
                        uid_prefix(&step.from_uid),
                        uid_prefix(&step.to_uid),
                        step.migration
                    );
                }
                if settings.test_mode {
                    if let Some((uid, error)) = report.failures.into_iter().next() {
                        tracing::error!(uid = %uid, "migration failed in test mode");
                        return Err(error);
                    }
                }
                Ok(())
            }
            CacheCommands::ImportLegacy { dir } => {
                let dir = dir.unwrap_or_else(|| settings.project_dir.clone());
                let legacy = LegacyFileSystemBackend::new(dir, serializer)?;
                let imported = cache.import_legacy(&legacy)?;
                println!("imported {} record(s)", imported.len());
                Ok(())
            }
        }
    }
}

fn parse_selector(constraints: &[String]) -> Result<Selector> {
    constraints.iter().try_fold(Selector::new(), |selector, expression| {
        let (path, comparator) = Selector::parse_constraint(expression)?;
        Ok(selector.with(path, comparator))
    })
}

fn find_by_prefix(cache: &Cache, prefix: &str) -> Result<Record> {
    let selector = Selector::uid(prefix);
    let mut matching: Vec<Record> = cache
        .select(None)?
        .into_iter()
        .filter(|r| r.uid().starts_with(prefix))
        .collect();
    match matching.len() {
        0 => Err(Error::no_match(selector)),
        1 => Ok(matching.remove(0)),
        count => Err(Error::ambiguous_match(selector, count)),
    }
}

fn render(record: &Record, serializer: &Serializer) -> Result<String> {
    let result = serializer.serialize(&record.result)?;
    let result = result.split_whitespace().collect::<Vec<_>>().join(" ");
    let lineage = match &record.migrated_to {
        Some(to) => format!("  [migrated to {}]", uid_prefix(to)),
        None => String::new(),
    };
    Ok(format!(
        "{}  {}  {}  {}{lineage}",
        uid_prefix(record.uid()),
        record.run_specification,
        result,
        record
            .resources
            .as_ref()
            .and_then(|r| r.execution_duration)
            .map_or_else(String::new, |d| format!("{d:.2}s")),
    ))
}
