//! The error taxonomy of the storage engine.
//!
//! Every public entry point returns [`BlockplanResult`]. Variant names are
//! stable identities a caller can match on; they are not meant to be
//! formatted for end users directly — that's a caller-side concern.

use thiserror::Error;

pub type BlockplanResult<T> = Result<T, BlockplanError>;

#[derive(Debug, Error)]
pub enum BlockplanError {
    // ---- engine-wide -------------------------------------------------
    #[error("engine is read-only")]
    ChangeReadonly,
    /// Returned when a mutation is attempted before construction (the
    /// initial discovery pass) has finished.
    #[error("engine handle is not ready")]
    MemoryExhausted,
    #[error("storage is locked by process {pid}")]
    Lock { pid: u32 },

    // ---- lookup --------------------------------------------------------
    #[error("disk not found: {0}")]
    DiskNotFound(String),
    #[error("volume not found: {0}")]
    VolumeNotFound(String),
    #[error("LVM volume group not found: {0}")]
    LvmVgNotFound(String),
    #[error("LVM logical volume not found: {0}")]
    LvmLvNotFound(String),
    #[error("md device not found: {0}")]
    MdNotFound(String),
    #[error("loop device not found: {0}")]
    LoopNotFound(String),
    #[error("dmraid container not found: {0}")]
    DmraidCoNotFound(String),
    #[error("dmmultipath container not found: {0}")]
    DmmultipathCoNotFound(String),
    #[error("container not found: {0}")]
    ContainerNotFound(String),
    #[error("backup state not found: {0}")]
    BackupStateNotFound(String),
    #[error("container already exists: {0}")]
    ContainerExists(String),

    // ---- validation ----------------------------------------------------
    #[error("invalid LVM volume group name: {0}")]
    VgInvalidName(String),
    #[error("invalid md device name: {0}")]
    MdInvalidName(String),
    #[error("invalid LVM device: {0}")]
    LvmInvalidDevice(String),
    #[error("invalid fstab value: {0}")]
    InvalidFstabValue(String),
    #[error("no fstab entry pointer for volume: {0}")]
    NoFstabPtr(String),

    // ---- consistency ----------------------------------------------------
    #[error("disk used by: {0}")]
    DiskUsedBy(String),
    #[error("volume {0} is used by another entity; recursive removal required")]
    RemoveUsedVolume(String),
    #[error("partition removal requested on a non-partitioned container: {0}")]
    RemovePartitionInvalidContainer(String),
    #[error("area change requested on an invalid container: {0}")]
    ChangeAreaInvalidContainer(String),
    #[error("partition id change requested on an invalid container: {0}")]
    ChangePartitionIdInvalidContainer(String),
    #[error("resize requested on an invalid container: {0}")]
    ResizeInvalidContainer(String),
    #[error("disk cannot be initialized: {0}")]
    DiskInitNotPossible(String),
    #[error("usedBy references an owner of unknown type: {0}")]
    RemoveUsingUnknownType(String),
    #[error("LVM volume group already exists: {0}")]
    LvmVgExists(String),

    // ---- execution ----------------------------------------------------
    #[error("device node did not appear in time: {0}")]
    DeviceNodeNotFound(String),
    #[error("zeroing device failed: {0}")]
    ZeroDeviceFailed(String),
    #[error("newly created loop device could not be found: {0}")]
    CreatedLoopNotFound(String),

    // ---- external-command / I/O plumbing -------------------------------
    #[error("system command failed: {0}")]
    CommandFailed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BlockplanError {
    /// True for the handful of variants the commit executor is permitted
    /// to tolerate under the `ignoreError` rule in the DECREASE stage
    /// (see `commit::sort::ignore_error`). Not used for general retrying.
    pub fn is_disk_decrease_superseded(&self) -> bool {
        matches!(self, BlockplanError::CommandFailed(_))
    }
}
