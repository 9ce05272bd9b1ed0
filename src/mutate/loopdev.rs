//! Loop-file-backed containers.

use std::path::{Path, PathBuf};

use crate::commit::{CommitAction, Stage, Target};
use crate::engine::Engine;
use crate::errors::{BlockplanError, BlockplanResult};
use crate::model::{Container, ContainerKind, EncryptionKind, FsKind, Volume};

/// `createFileLoop`: newly created loops default to EXT3+LUKS unless
/// reusing an existing backing file.
pub fn create_file_loop(engine: &Engine, backing_file: &Path, size_kb: u64, reuse_existing: bool) -> BlockplanResult<String> {
    super::begin(engine)?;
    let device;
    {
        let mut model = engine.model_mut();
        let number = model.containers_by_kind(ContainerKind::Loop, |_| true).count() as u32;
        let name = format!("loop{number}");
        let dev = PathBuf::from(format!("/dev/{name}"));
        device = dev.to_string_lossy().into_owned();
        let mut container = Container::new(&name, dev.clone(), ContainerKind::Loop, number as i64);
        container.created = true;
        let mut volume = Volume::new(&name, dev, size_kb);
        volume.pending.create = true;
        if !reuse_existing {
            volume.fs_kind = FsKind::Ext3;
            volume.encryption = EncryptionKind::Luks;
        }
        volume.desc_text = backing_file.display().to_string();
        container.volumes.push(volume);
        model.add_container(container)?;
    }
    super::finish(engine, &device)?;
    Ok(device)
}

/// `modifyFileLoop`: change the backing file or size of an existing loop.
pub fn modify_file_loop(engine: &Engine, device: &str, backing_file: &Path, size_kb: u64) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::LoopNotFound(device.to_string()))?;
        container.volumes[idx].desc_text = backing_file.display().to_string();
        container.volumes[idx].size_kb = size_kb;
        container.volumes[idx].pending.resize = true;
    }
    super::finish(engine, device)
}

/// `removeFileLoop(removeFile)`.
pub fn remove_file_loop(engine: &Engine, device: &str, remove_file: bool) -> BlockplanResult<()> {
    super::begin(engine)?;
    let backing_file;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::LoopNotFound(device.to_string()))?;
        backing_file = container.volumes[idx].desc_text.clone();
        container.volumes[idx].pending.delete = true;
        container.deleted = true;
    }
    if remove_file && !backing_file.is_empty() && engine.syscmd().path_exists(Path::new(&backing_file)) {
        engine.syscmd().remove_file(Path::new(&backing_file))?;
    }
    super::finish(engine, device)
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
            engine.syscmd().run(&["losetup", "-d", &format!("/dev/{name}")])?.ok()?;
            let mut model = engine.model_mut();
            if model.find_container(name).map(|c| c.physically_removable()).unwrap_or(false) {
                model.remove_container(name, true);
            }
            Ok(())
        }
        Stage::Increase => {
            let backing_file = {
                let model = engine.model();
                model
                    .find_container(name)
                    .and_then(|c| c.volumes.first())
                    .map(|v| v.desc_text.clone())
                    .unwrap_or_default()
            };
            engine.syscmd().run(&["losetup", &format!("/dev/{name}"), &backing_file])?.ok()?;
            engine.syscmd().wait_for_device(Path::new(&format!("/dev/{name}")))
        }
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
