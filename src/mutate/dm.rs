//! Device-mapper containers: plain DM targets plus `removeDmraid`. DMRAID
//! and DMMULTIPATH containers themselves are partitioned containers and
//! share `mutate::partition`'s commit path; this module only covers the
//! DM kind and the `removeDmraid` entry point.

use crate::commit::{CommitAction, Stage, Target};
use crate::engine::Engine;
use crate::errors::{BlockplanError, BlockplanResult};

/// `removeDmraid(name)`: tear down a dmraid set. Recursive removal
/// through `usedBy` for DMRAID and DMMULTIPATH owners is a no-op (see
/// `mutate::remove_using`); this entry point is the only supported way
/// to remove one.
pub fn remove_dmraid(engine: &Engine, name: &str) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let container = model.find_container_mut(name).ok_or_else(|| BlockplanError::DmraidCoNotFound(name.to_string()))?;
        for v in container.volumes.iter_mut() {
            v.pending.delete = true;
        }
        container.deleted = true;
    }
    super::finish(engine, name)
}

pub fn commit_changes(engine: &Engine, action: &CommitAction) -> BlockplanResult<()> {
    match &action.target {
        Target::Container { name } => commit_container(engine, name, action.stage),
        Target::Volume { device, .. } => commit_volume(engine, device, action.stage),
    }
}

fn commit_container(engine: &Engine, name: &str, stage: Stage) -> BlockplanResult<()> {
    match stage {
        Stage::Decrease => {
            engine.syscmd().run(&["dmsetup", "remove", name])?.ok()?;
            let mut model = engine.model_mut();
            if model.find_container(name).map(|c| c.physically_removable()).unwrap_or(false) {
                model.remove_container(name, true);
            }
            Ok(())
        }
        Stage::Increase => engine.syscmd().run(&["dmsetup", "create", name]).map(|_| ()),
        Stage::Format | Stage::Mount => Ok(()),
    }
}

fn commit_volume(engine: &Engine, device: &str, stage: Stage) -> BlockplanResult<()> {
    match stage {
        Stage::Decrease => Ok(()),
        Stage::Increase => {
            let mut model = engine.model_mut();
            if let Some((container, idx)) = model.find_volume_mut(device) {
                container.volumes[idx].pending.create = false;
                container.volumes[idx].freeze_original();
            }
            Ok(())
        }
        Stage::Format => super::volume::format_commit(engine, device),
        Stage::Mount => super::volume::mount_commit(engine, device),
    }
}
