//! Volume: the abstract unit of usable storage inside a container.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::used_by::UsedBy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FsKind {
    FsUnknown,
    FsNone,
    Ext2,
    Ext3,
    Reiserfs,
    Xfs,
    Jfs,
    Vfat,
    Ntfs,
    Hfs,
    HfsPlus,
    Swap,
    Nfs,
}

impl FsKind {
    pub fn is_unknown(self) -> bool {
        matches!(self, FsKind::FsUnknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MountBy {
    Device,
    Id,
    Path,
    Uuid,
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionKind {
    None,
    Twofish,
    TwofishOld,
    Twofish256,
    Luks,
}

/// Pending-state flags tracked between mutation and commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFlags {
    pub create: bool,
    pub format: bool,
    pub resize: bool,
    pub delete: bool,
    pub mount_change: bool,
}

/// Pre-edit snapshot used by the commit planner to detect change
/// direction (grow vs shrink, mount added vs removed, etc). Frozen at
/// discovery or at the moment of the first mutation, until commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalState {
    pub size_kb: u64,
    pub mount_point: Option<String>,
    pub fstab_options: Vec<String>,
}

/// The reserved mount-point sentinel for swap volumes. Never prefixed
/// with the root-filesystem prefix.
pub const SWAP_MOUNT: &str = "swap";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    /// Name of the owning container; resolved through the topology model,
    /// never an owning reference.
    pub container_name: String,
    pub device: PathBuf,
    /// Partition number / md number / loop number / dm minor, if any.
    pub index: Option<u32>,
    pub size_kb: u64,
    pub fs_kind: FsKind,
    pub uuid: Option<String>,
    pub label: Option<String>,
    pub mount_point: Option<String>,
    pub mount_by: MountBy,
    pub fstab_options: Vec<String>,
    pub mkfs_options: Option<String>,
    pub tunefs_options: Option<String>,
    pub encryption: EncryptionKind,
    pub crypt_password: Option<String>,
    pub pending: PendingFlags,
    pub original: OriginalState,
    pub used_by: UsedBy,
    pub alt_names: Vec<String>,
    pub desc_text: String,
    pub ignore_fstab: bool,
    /// Set by `addFstabOptions`/discovery when a fresh fstab line was
    /// added this commit pass; cleared unconditionally at the end of
    /// every `commit()` call.
    pub fstab_added: bool,
    /// Stripe count, meaningful only for LVM logical volumes. Used by
    /// the INCREASE commit sort to place striped LVs before linear ones.
    pub stripes: u32,
}

impl Volume {
    pub fn new(container_name: impl Into<String>, device: PathBuf, size_kb: u64) -> Self {
        let original = OriginalState {
            size_kb,
            mount_point: None,
            fstab_options: Vec::new(),
        };
        Volume {
            container_name: container_name.into(),
            device,
            index: None,
            size_kb,
            fs_kind: FsKind::FsUnknown,
            uuid: None,
            label: None,
            mount_point: None,
            mount_by: MountBy::Device,
            fstab_options: Vec::new(),
            mkfs_options: None,
            tunefs_options: None,
            encryption: EncryptionKind::None,
            crypt_password: None,
            pending: PendingFlags::default(),
            original,
            used_by: UsedBy::none(),
            alt_names: Vec::new(),
            desc_text: String::new(),
            ignore_fstab: false,
            fstab_added: false,
            stripes: 1,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mount_point.is_some()
    }

    pub fn has_orig_mount(&self) -> bool {
        self.original.mount_point.is_some()
    }

    pub fn needs_shrink(&self) -> bool {
        self.pending.resize && self.size_kb < self.original.size_kb
    }

    pub fn needs_grow(&self) -> bool {
        self.pending.resize && self.size_kb > self.original.size_kb
    }

    pub fn is_swap_mount(&self) -> bool {
        self.mount_point.as_deref() == Some(SWAP_MOUNT)
    }

    /// Freeze `original` to the current size/mount/fstab state. Called at
    /// discovery time and at the moment a volume first becomes pending.
    pub fn freeze_original(&mut self) {
        self.original = OriginalState {
            size_kb: self.size_kb,
            mount_point: self.mount_point.clone(),
            fstab_options: self.fstab_options.clone(),
        };
    }
}

/// Natural ordering: by numeric index, then device path. The fallback
/// comparator for FORMAT ordering and the partition-number tie-break in
/// the DECREASE sort.
impl PartialEq for Volume {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.device == other.device
    }
}
impl Eq for Volume {}
impl PartialOrd for Volume {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Volume {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index).then(self.device.cmp(&other.device))
    }
}
