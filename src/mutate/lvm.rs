//! LVM volume groups and logical volumes.

use std::path::PathBuf;

use crate::commit::{CommitAction, Stage, Target};
use crate::engine::Engine;
use crate::errors::{BlockplanError, BlockplanResult};
use crate::model::{Container, ContainerKind, UsedBy, UsedByKind, Volume};

const INVALID_VG_CHARS: &[char] = &['"', '\'', ' ', '/', '\n', '\t', ':', '*', '?'];

fn validate_vg_name(name: &str) -> BlockplanResult<()> {
    if name.is_empty() || name.chars().any(|c| INVALID_VG_CHARS.contains(&c)) {
        return Err(BlockplanError::VgInvalidName(name.to_string()));
    }
    Ok(())
}

/// `createLvmVg(name, pe_size_kb, lvm1, pvs)`.
pub fn create_lvm_vg(engine: &Engine, name: &str, pe_size_kb: u64, lvm1: bool, pvs: &[String]) -> BlockplanResult<()> {
    super::begin(engine)?;
    validate_vg_name(name)?;
    {
        let mut model = engine.model_mut();
        if model.find_container(name).is_some() {
            return Err(BlockplanError::LvmVgExists(name.to_string()));
        }
        for pv in pvs {
            let (container, idx) = model.find_volume_mut(pv).ok_or_else(|| BlockplanError::LvmInvalidDevice(pv.clone()))?;
            container.volumes[idx].used_by = UsedBy::new(UsedByKind::Lvm, name, format!("/dev/{name}"));
        }
        let mut container = Container::new(name, PathBuf::from(format!("/dev/{name}")), ContainerKind::Lvm, model.containers().len() as i64);
        container.created = true;
        container.alt_names.push(format!("pe_size={pe_size_kb}"));
        if lvm1 {
            container.alt_names.push("lvm1".to_string());
        }
        model.add_container(container)?;
    }
    super::finish(engine, name)
}

/// `removeLvmVg`.
pub fn remove_lvm_vg(engine: &Engine, name: &str) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let container = model.find_container_mut(name).ok_or_else(|| BlockplanError::LvmVgNotFound(name.to_string()))?;
        for v in container.volumes.iter_mut() {
            v.pending.delete = true;
        }
        container.deleted = true;
        if container.created {
            let name = container.name.clone();
            model.remove_container(&name, true);
        }
    }
    super::finish(engine, name)
}

/// `extendLvmVg`/`shrinkLvmVg`: add or remove physical volumes.
pub fn extend_lvm_vg(engine: &Engine, name: &str, pvs: &[String]) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        if model.find_container(name).is_none() {
            return Err(BlockplanError::LvmVgNotFound(name.to_string()));
        }
        for pv in pvs {
            let (container, idx) = model.find_volume_mut(pv).ok_or_else(|| BlockplanError::LvmInvalidDevice(pv.clone()))?;
            container.volumes[idx].used_by = UsedBy::new(UsedByKind::Lvm, name, format!("/dev/{name}"));
        }
    }
    super::finish(engine, name)
}

pub fn shrink_lvm_vg(engine: &Engine, name: &str, pvs: &[String]) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        if model.find_container(name).is_none() {
            return Err(BlockplanError::LvmVgNotFound(name.to_string()));
        }
        for pv in pvs {
            if let Some((container, idx)) = model.find_volume_mut(pv) {
                container.volumes[idx].used_by = UsedBy::none();
            }
        }
    }
    super::finish(engine, name)
}

/// `createLvmLv(vg, name, size_mb, stripes) -> device`.
pub fn create_lvm_lv(engine: &Engine, vg: &str, name: &str, size_mb: u64, stripes: u32) -> BlockplanResult<String> {
    super::begin(engine)?;
    let device;
    {
        let mut model = engine.model_mut();
        let container = model.find_container_mut(vg).ok_or_else(|| BlockplanError::LvmVgNotFound(vg.to_string()))?;
        let dev = PathBuf::from(format!("/dev/{vg}/{name}"));
        device = dev.to_string_lossy().into_owned();
        let mut volume = Volume::new(vg, dev, size_mb * 1024);
        volume.stripes = stripes.max(1);
        volume.pending.create = true;
        container.volumes.push(volume);
    }
    super::finish(engine, &device)?;
    Ok(device)
}

/// `removeLvmLv(vg, name)`.
pub fn remove_lvm_lv(engine: &Engine, vg: &str, name: &str) -> BlockplanResult<()> {
    let device = format!("/dev/{vg}/{name}");
    remove_lvm_lv_by_device(engine, &device)
}

/// `removeLvmLvByDevice(device)`.
pub fn remove_lvm_lv_by_device(engine: &Engine, device: &str) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::LvmLvNotFound(device.to_string()))?;
        container.volumes[idx].pending.delete = true;
    }
    super::finish(engine, device)
}

/// `changeLvStripeCount`/`changeLvStripeSize`.
pub fn change_lv_stripe_count(engine: &Engine, device: &str, stripes: u32) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::LvmLvNotFound(device.to_string()))?;
        container.volumes[idx].stripes = stripes.max(1);
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
            engine.syscmd().run(&["vgremove", "-f", name])?.ok()?;
            let mut model = engine.model_mut();
            if model.find_container(name).map(|c| c.physically_removable()).unwrap_or(false) {
                model.remove_container(name, true);
            }
            Ok(())
        }
        Stage::Increase => {
            let pvs: Vec<String> = {
                let model = engine.model();
                model
                    .containers()
                    .iter()
                    .flat_map(|c| c.volumes.iter())
                    .filter(|v| v.used_by.kind == UsedByKind::Lvm && v.used_by.owner_name == name)
                    .map(|v| v.device.to_string_lossy().into_owned())
                    .collect()
            };
            let mut argv = vec!["vgcreate".to_string(), format!("/dev/{name}")];
            argv.extend(pvs);
            let argv_ref: Vec<&str> = argv.iter().map(|s| s.as_str()).collect();
            engine.syscmd().run(&argv_ref)?.ok()?;
            Ok(())
        }
        Stage::Format | Stage::Mount => Ok(()),
    }
}

fn commit_volume(engine: &Engine, device: &str, stage: Stage) -> BlockplanResult<()> {
    match stage {
        Stage::Decrease => {
            engine.syscmd().run(&["lvremove", "-f", device])?.ok()?;
            let mut model = engine.model_mut();
            if let Some((container, idx)) = model.find_volume_mut(device) {
                container.volumes.remove(idx);
            }
            Ok(())
        }
        Stage::Increase => {
            let stripes = {
                let model = engine.model();
                model.find_volume(device).map(|(_, v)| v.stripes).unwrap_or(1)
            };
            engine.syscmd().run(&["lvcreate", "-i", &stripes.to_string(), device])?.ok()?;
            engine.syscmd().wait_for_device(std::path::Path::new(device))?;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_vg_name_rejects_reserved_characters() {
        assert!(validate_vg_name("ok-name").is_ok());
        assert!(validate_vg_name("").is_err());
        assert!(validate_vg_name("bad name").is_err());
        assert!(validate_vg_name("bad/name").is_err());
    }
}
