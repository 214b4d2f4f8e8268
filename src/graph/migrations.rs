// Schema migration chain. Each migration is totally ordered by its
// version; the runner applies pending migrations and refuses to start
// if an unknown higher version is already recorded (§4.1).

use anyhow::{bail, Result};
use std::future::Future;
use std::pin::Pin;

pub type MigrationFn =
    for<'a> fn(&'a mut super::store::InMemoryGraphStore) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>>;

pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub up: MigrationFn,
    pub down: Option<MigrationFn>,
}

/// The current schema version this build knows how to produce. A store
/// opened with `run_migrations: false` (the read-only viewer flag, §9)
/// and a version mismatch is a hard error rather than a silent reopen.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

fn migration_v1<'a>(
    _store: &'a mut super::store::InMemoryGraphStore,
) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>> {
    Box::pin(async move {
        // v1 is the baseline schema (§3); the in-memory engine's table
        // set is fixed at construction, so there is nothing to mutate —
        // this migration exists to anchor `applied_migrations`.
        Ok(())
    })
}

pub fn chain() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        name: "baseline_schema",
        up: migration_v1,
        down: None,
    }]
}

/// Apply every migration with `version > current_version`, in order,
/// recording each as complete. Returns the new current version.
pub async fn run_pending(
    store: &mut super::store::InMemoryGraphStore,
    current_version: u32,
    run_migrations: bool,
) -> Result<u32> {
    let chain = chain();
    let highest_known = chain.iter().map(|m| m.version).max().unwrap_or(0);

    if current_version > highest_known {
        bail!(
            "store schema version {current_version} is newer than this build knows \
             how to read (highest known: {highest_known})"
        );
    }

    if !run_migrations {
        if current_version != highest_known {
            bail!(
                "read-only open requires schema version {highest_known}, found {current_version}"
            );
        }
        return Ok(current_version);
    }

    let mut version = current_version;
    for migration in chain.into_iter().filter(|m| m.version > current_version) {
        (migration.up)(store).await?;
        store.record_migration(migration.version, migration.name);
        version = migration.version;
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_versions_are_totally_ordered() {
        let chain = chain();
        let mut versions: Vec<u32> = chain.iter().map(|m| m.version).collect();
        let sorted = {
            let mut v = versions.clone();
            v.sort();
            v
        };
        versions.sort();
        assert_eq!(versions, sorted);
    }
}
