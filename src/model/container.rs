//! Container: the abstract owner of one or more volumes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::used_by::UsedBy;
use super::volume::Volume;

/// The closed set of container kinds.
///
/// Ranking order across kinds when iterating the whole model:
/// DISK, DASD, MD, LOOP, LVM, DMRAID, DMMULTIPATH, DM, NFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerKind {
    Disk,
    Dasd,
    Md,
    Lvm,
    Loop,
    Dm,
    Dmraid,
    Dmmultipath,
    Nfs,
}

impl ContainerKind {
    /// Position in the fixed cross-kind ranking used by model iteration.
    pub fn rank(self) -> u8 {
        match self {
            ContainerKind::Disk => 0,
            ContainerKind::Dasd => 1,
            ContainerKind::Md => 2,
            ContainerKind::Loop => 3,
            ContainerKind::Lvm => 4,
            ContainerKind::Dmraid => 5,
            ContainerKind::Dmmultipath => 6,
            ContainerKind::Dm => 7,
            ContainerKind::Nfs => 8,
        }
    }

    /// Whether this kind bears a partition table (disk-like container).
    pub fn is_partitioned(self) -> bool {
        matches!(
            self,
            ContainerKind::Disk | ContainerKind::Dasd | ContainerKind::Dmraid | ContainerKind::Dmmultipath
        )
    }
}

/// Partition-table label kind, for partitioned containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelKind {
    Msdos,
    Gpt,
    Dasd,
    Mac,
    Sun,
    Loop,
    Unknown,
}

/// Cylinder geometry and slot accounting for partition-table–bearing
/// containers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionTableInfo {
    pub label: LabelKind,
    pub cylinders: u64,
    pub heads: u32,
    pub sectors: u32,
    pub cylinder_size_kb: u64,
    pub num_primary: u32,
    pub has_extended: bool,
    pub num_logical: u32,
    /// Partition number of the extended partition, when `has_extended`.
    pub extended_index: Option<u32>,
    /// Label-specific maximum of primary (+extended) slots.
    pub max_primary: u32,
    /// Label-specific maximum of logical slots (bounded by the minor
    /// number ceiling as well as the label).
    pub max_logical: u32,
}

impl PartitionTableInfo {
    pub fn primary_possible(&self) -> bool {
        self.num_primary + if self.has_extended { 1 } else { 0 } < self.max_primary
    }

    pub fn extended_possible(&self) -> bool {
        self.primary_possible() && self.allows_extended() && !self.has_extended
    }

    pub fn logical_possible(&self) -> bool {
        self.has_extended && self.num_logical < self.max_logical.saturating_sub(self.max_primary)
    }

    pub fn allows_extended(&self) -> bool {
        matches!(self.label, LabelKind::Msdos)
    }
}

/// A disk-like aggregate that owns volumes (disk, VG, md-set, loop-set,
/// nfs-set, dm-set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub device: PathBuf,
    pub kind: ContainerKind,
    pub sort_ordinal: i64,
    pub deleted: bool,
    pub created: bool,
    pub volumes: Vec<Volume>,
    pub partition_table: Option<PartitionTableInfo>,
    pub used_by: UsedBy,
    pub alt_names: Vec<String>,
}

impl Container {
    pub fn new(name: impl Into<String>, device: PathBuf, kind: ContainerKind, sort_ordinal: i64) -> Self {
        Container {
            name: name.into(),
            device,
            kind,
            sort_ordinal,
            deleted: false,
            created: false,
            volumes: Vec::new(),
            partition_table: None,
            used_by: UsedBy::none(),
            alt_names: Vec::new(),
        }
    }

    /// A container may only be physically removed by commit if all of its
    /// volumes are `deleted=true` and no external `usedBy` reference
    /// points to it.
    pub fn physically_removable(&self) -> bool {
        self.volumes.iter().all(|v| v.pending.delete) && self.used_by.is_none()
    }
}

/// Total ordering used by the commit sort rules: compares
/// container kind rank first, then sort ordinal within the same kind.
impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.kind.rank() == other.kind.rank() && self.sort_ordinal == other.sort_ordinal
    }
}
impl Eq for Container {}
impl PartialOrd for Container {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Container {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.kind
            .rank()
            .cmp(&other.kind.rank())
            .then(self.sort_ordinal.cmp(&other.sort_ordinal))
    }
}
