//! Selector gated record migrations
//!
//! A migration rewrites a record from an older schema into a newer one. The
//! engine repeatedly picks the most eager migration whose selector matches,
//! applies it through [`Cache::migrate_record`] and looks again, until no
//! migration applies. Selectors test for the absence of whatever a migration
//! fixes, which makes running the engine twice a no-op.

use crate::cache::Cache;
use provenant_core::{Error, Result};
use provenant_record::{Record, Selector};
use std::fmt;
use std::sync::Arc;

/// Upper bound on steps applied to one record
pub const MAX_MIGRATION_STEPS: usize = 100;

type Transform = Arc<dyn Fn(&Record) -> Result<Record> + Send + Sync>;

#[derive(Clone)]
pub struct Migration {
    id: String,
    description: String,
    selector: Selector,
    eagerness: i32,
    transform: Transform,
}

impl Migration {
    pub fn new<F>(id: impl Into<String>, selector: Selector, transform: F) -> Self
    where
        F: Fn(&Record) -> Result<Record> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            description: String::new(),
            selector,
            eagerness: 0,
            transform: Arc::new(transform),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Higher runs first when several migrations apply
    pub fn eagerness(mut self, eagerness: i32) -> Self {
        self.eagerness = eagerness;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn applies_to(&self, record: &Record) -> bool {
        record.is_current() && self.selector.matches(record)
    }

    pub fn apply(&self, record: &Record) -> Result<Record> {
        (self.transform)(record).map_err(|e| match e {
            Error::Migration { .. } => e,
            other => Error::migration(&self.id, other.to_string()),
        })
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("selector", &self.selector)
            .field("eagerness", &self.eagerness)
            .finish_non_exhaustive()
    }
}

/// One applied migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    pub migration: String,
    pub from_uid: String,
    pub to_uid: String,
}

/// Outcome of migrating a whole cache
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub applied: Vec<MigrationStep>,
    /// Record uid and the error that stopped its chain
    pub failures: Vec<(String, Error)>,
}

impl MigrationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MigrationEngine {
    migrations: Vec<Migration>,
}

impl MigrationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, migration: Migration) -> &mut Self {
        self.migrations.push(migration);
        self
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Most eager applicable migration, earliest registered on ties
    pub fn next_applicable(&self, record: &Record) -> Option<&Migration> {
        self.migrations
            .iter()
            .enumerate()
            .filter(|(_, m)| m.applies_to(record))
            .max_by_key(|(index, m)| (m.eagerness, std::cmp::Reverse(*index)))
            .map(|(_, m)| m)
    }

    /// Chain of migrations that would run for `record`, without touching a cache
    pub fn plan(&self, record: &Record) -> Result<Vec<String>> {
        let mut current = record.clone();
        let mut chain = Vec::new();
        while let Some(migration) = self.next_applicable(&current) {
            if chain.len() >= MAX_MIGRATION_STEPS {
                return Err(non_terminating(migration, record));
            }
            current = migration.apply(&current)?;
            current.migrated_to = None;
            chain.push(migration.id().to_string());
        }
        Ok(chain)
    }

    /// Migrate one record to the newest schema, returning the final record
    pub fn migrate(&self, cache: &Cache, record: &Record) -> Result<(Record, Vec<MigrationStep>)> {
        let mut current = record.clone();
        let mut steps = Vec::new();
        while let Some(migration) = self.next_applicable(&current) {
            if steps.len() >= MAX_MIGRATION_STEPS {
                return Err(non_terminating(migration, record));
            }
            let _span = provenant_utils::logging::migration_span(migration.id(), current.uid()).entered();
            let migrated = migration.apply(&current)?;
            let migrated = cache.migrate_record(&current, migrated, migration.id())?;
            steps.push(MigrationStep {
                migration: migration.id().to_string(),
                from_uid: current.uid().to_string(),
                to_uid: migrated.uid().to_string(),
            });
            current = migrated;
        }
        Ok((current, steps))
    }

    /// Migrate every current record in the cache
    ///
    /// Failures are collected per record so the caller decides whether one
    /// broken record is fatal.
    pub fn migrate_all(&self, cache: &Cache) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        let current = cache.select(Some(&Selector::new().current()))?;
        for record in current {
            match self.migrate(cache, &record) {
                Ok((_, steps)) => report.applied.extend(steps),
                Err(e) => {
                    tracing::warn!(uid = record.uid(), error = %e, "migration failed");
                    report.failures.push((record.uid().to_string(), e));
                }
            }
        }
        tracing::info!(
            applied = report.applied.len(),
            failed = report.failures.len(),
            "migrated cache"
        );
        Ok(report)
    }
}

fn non_terminating(migration: &Migration, record: &Record) -> Error {
    Error::migration(
        migration.id(),
        format!(
            "record '{}' still matches after {MAX_MIGRATION_STEPS} migrations, a selector never stops matching",
            record.uid()
        ),
    )
}
