//! The topology model.
//!
//! Holds an ordered list of containers. The model is single-writer:
//! mutations are only allowed from mutation-API handlers or from
//! discovery/commit. Invariant enforcement happens on insertion
//! and on commit boundaries; the model itself does not schedule work.

pub mod container;
pub mod used_by;
pub mod volume;

pub use container::{Container, ContainerKind, LabelKind, PartitionTableInfo};
pub use used_by::{UsedBy, UsedByKind};
pub use volume::{EncryptionKind, FsKind, MountBy, OriginalState, PendingFlags, Volume};

use crate::errors::{BlockplanError, BlockplanResult};

/// The full set of containers known to the engine, in the canonical
/// cross-kind ranking of: DISK, DASD, MD, LOOP, LVM, DMRAID,
/// DMMULTIPATH, DM, NFS, and by `sort_ordinal` within a kind.
#[derive(Debug, Clone, Default)]
pub struct TopologyModel {
    containers: Vec<Container>,
}

impl TopologyModel {
    pub fn new() -> Self {
        TopologyModel { containers: Vec::new() }
    }

    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    pub fn containers_mut(&mut self) -> &mut [Container] {
        &mut self.containers
    }

    /// Iterate containers of a given kind, in sort-ordinal order, that
    /// pass `pred` (most callers pass `|c| !c.deleted`).
    pub fn containers_by_kind<'a>(
        &'a self,
        kind: ContainerKind,
        pred: impl Fn(&Container) -> bool + 'a,
    ) -> impl Iterator<Item = &'a Container> + 'a {
        let mut matching: Vec<&Container> = self
            .containers
            .iter()
            .filter(move |c| c.kind.rank() == kind.rank() && pred(c))
            .collect();
        matching.sort_by_key(|c| c.sort_ordinal);
        matching.into_iter()
    }

    /// Iterate every container in fixed cross-kind / sort-ordinal order.
    pub fn containers_ordered(&self) -> Vec<&Container> {
        let mut all: Vec<&Container> = self.containers.iter().collect();
        all.sort();
        all
    }

    /// Iterate volumes of a given filesystem kind across all containers,
    /// passing `pred`.
    pub fn volumes_by_fs_kind<'a>(
        &'a self,
        fs_kind: FsKind,
        pred: impl Fn(&Volume) -> bool + 'a,
    ) -> impl Iterator<Item = &'a Volume> + 'a {
        self.containers
            .iter()
            .flat_map(|c| c.volumes.iter())
            .filter(move |v| v.fs_kind == fs_kind && pred(v))
    }

    pub fn find_container(&self, name: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.name == name && !c.deleted)
    }

    pub fn find_container_mut(&mut self, name: &str) -> Option<&mut Container> {
        self.containers.iter_mut().find(|c| c.name == name && !c.deleted)
    }

    pub fn find_container_by_device(&self, device: &str) -> Option<&Container> {
        self.containers
            .iter()
            .find(|c| !c.deleted && (c.device.to_string_lossy() == device || c.alt_names.iter().any(|a| a == device)))
    }

    /// Find a volume by device path or alternate name; returns the owning
    /// container's name alongside it.
    pub fn find_volume(&self, device: &str) -> Option<(&Container, &Volume)> {
        self.containers.iter().find_map(|c| {
            c.volumes
                .iter()
                .find(|v| !v.pending.delete && (v.device.to_string_lossy() == device || v.alt_names.iter().any(|a| a == device)))
                .map(|v| (c, v))
        })
    }

    pub fn find_volume_mut(&mut self, device: &str) -> Option<(&mut Container, usize)> {
        for c in self.containers.iter_mut() {
            if let Some(idx) = c
                .volumes
                .iter()
                .position(|v| !v.pending.delete && (v.device.to_string_lossy() == device || v.alt_names.iter().any(|a| a == device)))
            {
                return Some((c, idx));
            }
        }
        None
    }

    /// Insert a container, enforcing the `(name, kind)` uniqueness
    /// invariant.
    pub fn add_container(&mut self, container: Container) -> BlockplanResult<()> {
        if self
            .containers
            .iter()
            .any(|c| !c.deleted && c.name == container.name && c.kind.rank() == container.kind.rank())
        {
            return Err(BlockplanError::ContainerExists(container.name));
        }
        self.containers.push(container);
        Ok(())
    }

    /// Remove a container. When `physical` is true the container is
    /// dropped from the model outright (used by commit after a
    /// successful DECREASE, and by the immediate removal of
    /// created-then-deleted containers before commit). When `physical`
    /// is false the container is merely flagged `deleted=true`.
    pub fn remove_container(&mut self, name: &str, physical: bool) {
        if physical {
            self.containers.retain(|c| c.name != name);
        } else if let Some(c) = self.containers.iter_mut().find(|c| c.name == name) {
            c.deleted = true;
            if c.created {
                // A container marked deleted whose created=true is
                // removed immediately from the model: no on-disk effect.
                let name = c.name.clone();
                self.containers.retain(|c| c.name != name);
            }
        }
    }

    /// Replace the entire container list. Used by backup restore.
    pub fn replace_container_list(&mut self, list: Vec<Container>) {
        self.containers = list;
    }

    /// Deep-clone the container list for a backup snapshot.
    pub fn snapshot(&self) -> Vec<Container> {
        self.containers.clone()
    }
}
