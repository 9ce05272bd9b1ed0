//! Already-parsed system-state inputs: discovery never reads
//! `/proc/partitions`, `/sys/block/*`, `/etc/fstab`, or any other raw
//! OS file itself — that parsing is an external collaborator's job. It
//! only consumes the structured form below, obtained through an
//! [`InputSource`].

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::BlockplanResult;
use crate::model::{EncryptionKind, FsKind, MountBy};

/// One entry of the kernel block-device enumeration (`/sys/block/*`
/// equivalent). `range > 1`, or a name starting with `dasd`, marks a
/// full disk; `range == 1` with a `/xen/vbd`-style device path and a
/// trailing digit marks a XEN partitioned disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BlockDevice {
    pub name: String,
    pub range: u32,
    pub size_kb: u64,
    pub device_symlink: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PartitionEntry {
    pub device: String,
    pub disk: String,
    pub number: u32,
    pub size_kb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: String,
    pub fs_kind: Option<String>,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FstabEntry {
    pub dentry: String,
    pub mount: String,
    pub fs: String,
    pub opts: Vec<String>,
    pub freq: u32,
    pub passno: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BlkidEntry {
    pub device: String,
    pub fs_kind: Option<String>,
    pub uuid: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MdStatEntry {
    pub name: String,
    pub level: String,
    pub devices: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LvmVg {
    pub name: String,
    pub pe_size_kb: u64,
    pub lvm1: bool,
    pub pvs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LvmLv {
    pub vg: String,
    pub name: String,
    pub size_kb: u64,
    pub stripes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DmEntry {
    pub name: String,
    pub kind: String,
    pub devices: Vec<String>,
    pub size_kb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoopEntry {
    pub name: String,
    pub backing_file: String,
    pub size_kb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NfsEntry {
    pub server_path: String,
    pub mount_point: String,
    pub size_kb: u64,
}

/// Udev symlink directories: alternate names keyed by canonical device.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UdevMaps {
    pub by_id: HashMap<String, Vec<String>>,
    pub by_path: HashMap<String, Vec<String>>,
}

/// The full set of already-parsed system state discovery consumes.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SystemInputs {
    pub block_devices: Vec<BlockDevice>,
    pub partitions: Vec<PartitionEntry>,
    pub mdstat: Vec<MdStatEntry>,
    pub dmraid: Vec<DmEntry>,
    pub dmmultipath: Vec<DmEntry>,
    pub lvm_vgs: Vec<LvmVg>,
    pub lvm_lvs: Vec<LvmLv>,
    pub dm_other: Vec<DmEntry>,
    pub loops: Vec<LoopEntry>,
    pub nfs: Vec<NfsEntry>,
    pub mounts: Vec<MountEntry>,
    pub fstab: Vec<FstabEntry>,
    pub blkid: Vec<BlkidEntry>,
    pub udev: UdevMaps,
}

pub fn parse_fs_kind(name: &str) -> FsKind {
    match name.to_ascii_lowercase().as_str() {
        "ext2" => FsKind::Ext2,
        "ext3" => FsKind::Ext3,
        "reiserfs" => FsKind::Reiserfs,
        "xfs" => FsKind::Xfs,
        "jfs" => FsKind::Jfs,
        "vfat" | "fat32" | "fat16" => FsKind::Vfat,
        "ntfs" => FsKind::Ntfs,
        "hfs" => FsKind::Hfs,
        "hfsplus" => FsKind::HfsPlus,
        "swap" => FsKind::Swap,
        "nfs" | "nfs4" => FsKind::Nfs,
        "" => FsKind::FsNone,
        _ => FsKind::FsUnknown,
    }
}

pub fn parse_mount_by(name: &str) -> MountBy {
    match name {
        "id" => MountBy::Id,
        "path" => MountBy::Path,
        "uuid" => MountBy::Uuid,
        "label" => MountBy::Label,
        _ => MountBy::Device,
    }
}

pub fn parse_encryption(name: &str) -> EncryptionKind {
    match name {
        "twofish" => EncryptionKind::Twofish,
        "twofish_old" => EncryptionKind::TwofishOld,
        "twofish256" => EncryptionKind::Twofish256,
        "luks" => EncryptionKind::Luks,
        _ => EncryptionKind::None,
    }
}

/// Supplies [`SystemInputs`] to discovery. The real-mode implementation
/// lives outside this crate (it is the caller's job to parse
/// `/proc/partitions`/`/sys/block`/etc); [`TestModeInputSource`] is the
/// only implementation carried here, reading the per-kind JSON dump
/// files in a fixture directory.
pub trait InputSource: Send + Sync {
    fn load(&self) -> BlockplanResult<SystemInputs>;
}

/// Reads every `<kind>.json` file under a test directory; any file
/// that is missing contributes an empty default rather than an error.
pub struct TestModeInputSource {
    pub dump_dir: PathBuf,
}

impl TestModeInputSource {
    fn read<T: serde::de::DeserializeOwned + Default>(&self, file_name: &str) -> T {
        let path = self.dump_dir.join(file_name);
        match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => T::default(),
        }
    }
}

impl InputSource for TestModeInputSource {
    fn load(&self) -> BlockplanResult<SystemInputs> {
        Ok(SystemInputs {
            block_devices: self.read("block_devices.json"),
            partitions: self.read("partitions.json"),
            mdstat: self.read("mdstat.json"),
            dmraid: self.read("dmraid.json"),
            dmmultipath: self.read("dmmultipath.json"),
            lvm_vgs: self.read("lvm_vgs.json"),
            lvm_lvs: self.read("lvm_lvs.json"),
            dm_other: self.read("dm_other.json"),
            loops: self.read("loops.json"),
            nfs: self.read("nfs.json"),
            mounts: self.read("mounts.json"),
            fstab: self.read("fstab.json"),
            blkid: self.read("blkid.json"),
            udev: self.read("udev.json"),
        })
    }
}

/// No inputs at all: used when the caller hasn't wired a real-mode
/// source yet; discovery then leaves the model empty.
#[derive(Default)]
pub struct EmptyInputSource;

impl InputSource for EmptyInputSource {
    fn load(&self) -> BlockplanResult<SystemInputs> {
        Ok(SystemInputs::default())
    }
}
