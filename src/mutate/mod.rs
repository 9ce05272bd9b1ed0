//! The mutation API: library-style calls that stage changes to
//! the topology model, plus the per-kind commit handlers the executor
//! dispatches into.
//!
//! Every public mutation follows the same seven steps: assert
//! initialized, reject if read-only, locate the target, validate,
//! mutate the model, invalidate the free-info cache entry, call
//! `checkCache`. The helpers below implement the first two and the
//! last two so each operation only has to write steps 3-5.

pub mod dm;
pub mod loopdev;
pub mod lvm;
pub mod md;
pub mod nfs;
pub mod partition;
pub mod volume;

use crate::commit::{CommitAction, Stage, Target};
use crate::engine::Engine;
use crate::errors::BlockplanResult;
use crate::model::{Container, ContainerKind, UsedByKind};

pub(crate) fn begin(engine: &Engine) -> BlockplanResult<()> {
    engine.assert_init()?;
    engine.check_readonly()
}

/// Step 6-7: invalidate the free-info cache entry and auto-commit
/// unless caching is enabled.
pub(crate) fn finish(engine: &Engine, device: &str) -> BlockplanResult<()> {
    engine.invalidate_free_info(device);
    engine.check_cache()
}

/// Dispatch one commit action to the handler for its container kind.
/// DISK/DASD/DMRAID/DMMULTIPATH share one partitioned-container code path
/// rather than four near-duplicates.
pub(crate) fn commit_action(engine: &Engine, action: &CommitAction) -> BlockplanResult<()> {
    match action.kind {
        ContainerKind::Disk | ContainerKind::Dasd | ContainerKind::Dmraid | ContainerKind::Dmmultipath => {
            partition::commit_changes(engine, action)
        }
        ContainerKind::Lvm => lvm::commit_changes(engine, action),
        ContainerKind::Md => md::commit_changes(engine, action),
        ContainerKind::Loop => loopdev::commit_changes(engine, action),
        ContainerKind::Dm => dm::commit_changes(engine, action),
        ContainerKind::Nfs => nfs::commit_changes(engine, action),
    }
}

/// Route a recursive volume removal through the owner's removal path:
/// MD/DM owners are themselves represented as a single volume, so
/// removal goes back through `volume::remove_volume` on the owner's
/// device; LVM goes through `removeLvmVg` by name. DMRAID/DMMULTIPATH
/// owners are a deliberate no-op (see DESIGN.md).
pub(crate) fn remove_using(engine: &Engine, kind: UsedByKind, owner_name: &str, owner_device: &str) -> BlockplanResult<()> {
    match kind {
        UsedByKind::None => Ok(()),
        UsedByKind::Md | UsedByKind::Dm => volume::remove_volume(engine, owner_device, true),
        UsedByKind::Lvm => lvm::remove_lvm_vg(engine, owner_name),
        UsedByKind::Dmraid | UsedByKind::Dmmultipath => Ok(()),
    }
}

pub(crate) fn target_container<'a>(containers: &'a [Container], action: &CommitAction) -> Option<&'a Container> {
    let name = match &action.target {
        Target::Container { name } => name,
        Target::Volume { container_name, .. } => container_name,
    };
    containers.iter().find(|c| &c.name == name)
}

pub(crate) fn is_container_decrease(action: &CommitAction) -> bool {
    action.stage == Stage::Decrease && action.target.is_container()
}
