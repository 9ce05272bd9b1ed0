//! Named deep snapshots of the topology model.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::errors::{BlockplanError, BlockplanResult};
use crate::model::Container;

#[derive(Debug, Clone)]
struct BackupEntry {
    containers: Vec<Container>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct BackupStore {
    states: HashMap<String, BackupEntry>,
}

impl BackupStore {
    pub fn new() -> Self {
        BackupStore::default()
    }

    /// `create(name)`: snapshot the given live container list under
    /// `name`, replacing any existing state of that name.
    pub fn create(&mut self, name: &str, containers: &[Container]) {
        self.states.insert(name.to_string(), BackupEntry { containers: containers.to_vec(), created_at: Utc::now() });
    }

    /// When `name` was captured, if it exists.
    pub fn created_at(&self, name: &str) -> Option<DateTime<Utc>> {
        self.states.get(name).map(|e| e.created_at)
    }

    /// `remove(name)`: empty name removes every stored state.
    pub fn remove(&mut self, name: &str) {
        if name.is_empty() {
            self.states.clear();
        } else {
            self.states.remove(name);
        }
    }

    pub fn check(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn list(&self) -> Vec<&str> {
        self.states.keys().map(|s| s.as_str()).collect()
    }

    /// `restore(name)`: the container list to splice into the live
    /// model, or `BACKUP_STATE_NOT_FOUND`.
    pub fn restore(&self, name: &str) -> BlockplanResult<Vec<Container>> {
        self.states
            .get(name)
            .map(|e| e.containers.clone())
            .ok_or_else(|| BlockplanError::BackupStateNotFound(name.to_string()))
    }

    /// `equal(lhs, rhs, verbose)`: empty name means "the live model",
    /// which the caller must pass in as `lhs_live`/`rhs_live` when the
    /// respective name is empty.
    pub fn equal(&self, lhs: &[Container], rhs: &[Container], verbose: bool) -> bool {
        if lhs.len() != rhs.len() {
            if verbose {
                tracing::debug!(lhs_len = lhs.len(), rhs_len = rhs.len(), "backup states differ in container count");
            }
            return false;
        }
        let mut equal = true;
        for l in lhs {
            match rhs.iter().find(|r| r.name == l.name && r.kind.rank() == l.kind.rank()) {
                Some(r) if containers_equal(l, r) => {}
                Some(r) => {
                    equal = false;
                    if verbose {
                        tracing::debug!(container = %l.name, "backup states differ for matched container");
                        let _ = r;
                    } else {
                        return false;
                    }
                }
                None => {
                    equal = false;
                    if verbose {
                        tracing::debug!(container = %l.name, "container present on one side only");
                    } else {
                        return false;
                    }
                }
            }
        }
        equal
    }
}

fn containers_equal(lhs: &Container, rhs: &Container) -> bool {
    lhs.device == rhs.device
        && lhs.deleted == rhs.deleted
        && lhs.created == rhs.created
        && lhs.volumes.len() == rhs.volumes.len()
        && lhs
            .volumes
            .iter()
            .all(|lv| rhs.volumes.iter().any(|rv| rv.device == lv.device && rv.size_kb == lv.size_kb && rv.mount_point == lv.mount_point))
}

impl crate::engine::Engine {
    pub fn create_backup_state(&self, name: &str) {
        let snapshot = self.model().snapshot();
        self.backups_mut().create(name, &snapshot);
    }

    pub fn backup_created_at(&self, name: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        self.backups().created_at(name)
    }

    pub fn remove_backup_state(&self, name: &str) {
        self.backups_mut().remove(name);
    }

    pub fn check_backup_state(&self, name: &str) -> bool {
        self.backups().check(name)
    }

    pub fn list_backup_states(&self) -> Vec<String> {
        self.backups().list().into_iter().map(String::from).collect()
    }

    /// `restoreBackupState(name)`: replaces the live container list
    /// entirely.
    pub fn restore_backup_state(&self, name: &str) -> BlockplanResult<()> {
        let containers = self.backups().restore(name)?;
        self.model_mut().replace_container_list(containers);
        Ok(())
    }

    /// `equalBackupStates(lhs, rhs, verbose)`: empty name means the live
    /// model.
    pub fn equal_backup_states(&self, lhs: &str, rhs: &str, verbose: bool) -> BlockplanResult<bool> {
        let live = self.model().snapshot();
        let lhs_list = if lhs.is_empty() { live.clone() } else { self.backups().restore(lhs)? };
        let rhs_list = if rhs.is_empty() { live } else { self.backups().restore(rhs)? };
        Ok(self.backups().equal(&lhs_list, &rhs_list, verbose))
    }
}
