//! NFS mounts. An NFS container is a thin shell holding a
//! single volume; there is no on-disk partitioning step, so DECREASE
//! and INCREASE at the container level are no-ops and all the work
//! happens at the volume's MOUNT stage.

use std::path::PathBuf;

use crate::commit::{CommitAction, Stage, Target};
use crate::engine::Engine;
use crate::errors::{BlockplanError, BlockplanResult};
use crate::model::{Container, ContainerKind, FsKind, Volume};

/// `addNfsDevice(server_path, mount_point, size_kb)`.
pub fn add_nfs_device(engine: &Engine, server_path: &str, mount_point: &str, size_kb: u64) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        if model.find_container(server_path).is_some() {
            return Err(BlockplanError::ContainerExists(server_path.to_string()));
        }
        let mut container = Container::new(server_path, PathBuf::from(server_path), ContainerKind::Nfs, model.containers().len() as i64);
        container.created = true;
        let mut volume = Volume::new(server_path, PathBuf::from(server_path), size_kb);
        volume.fs_kind = FsKind::Nfs;
        volume.mount_point = Some(mount_point.to_string());
        volume.pending.create = true;
        volume.pending.mount_change = true;
        container.volumes.push(volume);
        model.add_container(container)?;
    }
    super::finish(engine, server_path)
}

/// `checkNfsDevice`: probes the server's export size via a transient
/// mount (routed through the free-info probe).
pub fn check_nfs_device(engine: &Engine, server_path: &str) -> BlockplanResult<u64> {
    let info = crate::freeinfo::get_free_info(engine, server_path, false)?;
    Ok(info.df_free_kb + info.used_kb)
}

pub fn commit_changes(engine: &Engine, action: &CommitAction) -> BlockplanResult<()> {
    match &action.target {
        Target::Container { .. } => Ok(()),
        Target::Volume { device, .. } => commit_volume(engine, device, action.stage),
    }
}

fn commit_volume(engine: &Engine, device: &str, stage: Stage) -> BlockplanResult<()> {
    match stage {
        Stage::Decrease => {
            let mount_point = {
                let model = engine.model();
                model.find_volume(device).and_then(|(_, v)| v.mount_point.clone())
            };
            if let Some(mp) = mount_point {
                engine.syscmd().umount(std::path::Path::new(&mp))?;
            }
            let mut model = engine.model_mut();
            model.remove_container(device, true);
            Ok(())
        }
        Stage::Increase | Stage::Format => {
            let mut model = engine.model_mut();
            if let Some((container, idx)) = model.find_volume_mut(device) {
                container.volumes[idx].pending.create = false;
                container.volumes[idx].pending.format = false;
            }
            Ok(())
        }
        Stage::Mount => super::volume::mount_commit(engine, device),
    }
}
