//! Software RAID arrays.

use std::path::PathBuf;

use crate::commit::{CommitAction, Stage, Target};
use crate::engine::Engine;
use crate::errors::{BlockplanError, BlockplanResult};
use crate::model::{Container, ContainerKind, UsedBy, UsedByKind, Volume};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaidType {
    Raid0,
    Raid1,
    Raid5,
    Raid6,
    Raid10,
    Multipath,
}

fn validate_md_name(name: &str) -> BlockplanResult<()> {
    if !name.starts_with("md") || name["md".len()..].parse::<u32>().is_err() {
        return Err(BlockplanError::MdInvalidName(name.to_string()));
    }
    Ok(())
}

/// `computeMdSize`: the canonical sizing law over the raw component
/// device sizes in kB.
pub fn compute_md_size(raid_type: RaidType, device_sizes_kb: &[u64]) -> u64 {
    if device_sizes_kb.is_empty() {
        return 0;
    }
    let min = *device_sizes_kb.iter().min().unwrap();
    let n = device_sizes_kb.len() as u64;
    match raid_type {
        RaidType::Raid0 => device_sizes_kb.iter().sum(),
        RaidType::Raid1 | RaidType::Multipath => min,
        RaidType::Raid5 => min * n.saturating_sub(1),
        RaidType::Raid6 => min * n.saturating_sub(2),
        RaidType::Raid10 => min * n / 2,
    }
}

/// `createMd(name, raid_type, devices)`.
pub fn create_md(engine: &Engine, name: &str, raid_type: RaidType, devices: &[String]) -> BlockplanResult<()> {
    super::begin(engine)?;
    validate_md_name(name)?;
    let device_path = format!("/dev/{name}");
    {
        let mut model = engine.model_mut();
        if model.find_container(name).is_some() {
            return Err(BlockplanError::ContainerExists(name.to_string()));
        }
        let sizes: Vec<u64> = devices
            .iter()
            .map(|d| model.find_volume(d).map(|(_, v)| v.size_kb).unwrap_or(0))
            .collect();
        for dev in devices {
            let (container, idx) = model.find_volume_mut(dev).ok_or_else(|| BlockplanError::VolumeNotFound(dev.clone()))?;
            container.volumes[idx].used_by = UsedBy::new(UsedByKind::Md, name, device_path.clone());
        }
        let mut container = Container::new(name, PathBuf::from(&device_path), ContainerKind::Md, model.containers().len() as i64);
        container.created = true;
        let mut volume = Volume::new(name, PathBuf::from(&device_path), compute_md_size(raid_type, &sizes));
        volume.pending.create = true;
        container.volumes.push(volume);
        model.add_container(container)?;
    }
    super::finish(engine, &device_path)
}

/// `createMdAny`: pick the next unused md number automatically.
pub fn create_md_any(engine: &Engine, raid_type: RaidType, devices: &[String]) -> BlockplanResult<String> {
    let model = engine.model();
    let used: Vec<u32> = model
        .containers_by_kind(ContainerKind::Md, |_| true)
        .filter_map(|c| c.name.strip_prefix("md").and_then(|n| n.parse().ok()))
        .collect();
    drop(model);
    let number = (0..).find(|n| !used.contains(n)).unwrap();
    let name = format!("md{number}");
    create_md(engine, &name, raid_type, devices)?;
    Ok(format!("/dev/{name}"))
}

/// `removeMd(name, destroy_sb)`.
pub fn remove_md(engine: &Engine, name: &str, destroy_sb: bool) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let container = model.find_container_mut(name).ok_or_else(|| BlockplanError::MdNotFound(name.to_string()))?;
        for v in container.volumes.iter_mut() {
            v.pending.delete = true;
            v.desc_text = if destroy_sb { "destroy-superblock".to_string() } else { String::new() };
        }
        container.deleted = true;
        // Once the real root is mounted during an install, the array is
        // known safe to wipe regardless of the caller-supplied destroy_sb.
        if engine.is_root_mounted() && engine.mode().is_install_system() {
            for v in container.volumes.iter_mut() {
                v.desc_text = "destroy-superblock".to_string();
            }
        }
        if container.created {
            let name = container.name.clone();
            model.remove_container(&name, true);
        }
    }
    super::finish(engine, name)
}

/// `extendMd`/`shrinkMd`: add or remove component devices.
pub fn extend_md(engine: &Engine, name: &str, devices: &[String]) -> BlockplanResult<()> {
    super::begin(engine)?;
    let device_path = format!("/dev/{name}");
    {
        let mut model = engine.model_mut();
        if model.find_container(name).is_none() {
            return Err(BlockplanError::MdNotFound(name.to_string()));
        }
        for dev in devices {
            let (container, idx) = model.find_volume_mut(dev).ok_or_else(|| BlockplanError::VolumeNotFound(dev.clone()))?;
            container.volumes[idx].used_by = UsedBy::new(UsedByKind::Md, name, device_path.clone());
        }
    }
    super::finish(engine, &device_path)
}

pub fn shrink_md(engine: &Engine, name: &str, devices: &[String]) -> BlockplanResult<()> {
    super::begin(engine)?;
    let device_path = format!("/dev/{name}");
    {
        let mut model = engine.model_mut();
        if model.find_container(name).is_none() {
            return Err(BlockplanError::MdNotFound(name.to_string()));
        }
        for dev in devices {
            if let Some((container, idx)) = model.find_volume_mut(dev) {
                container.volumes[idx].used_by = UsedBy::none();
            }
        }
    }
    super::finish(engine, &device_path)
}

pub fn change_md_type(engine: &Engine, name: &str) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let container = model.find_container_mut(name).ok_or_else(|| BlockplanError::MdNotFound(name.to_string()))?;
        for v in container.volumes.iter_mut() {
            v.pending.resize = true;
        }
    }
    super::finish(engine, name)
}

pub fn change_md_chunk(engine: &Engine, name: &str, chunk_kb: u64) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let container = model.find_container_mut(name).ok_or_else(|| BlockplanError::MdNotFound(name.to_string()))?;
        for v in container.volumes.iter_mut() {
            v.desc_text = format!("chunk={chunk_kb}");
        }
    }
    super::finish(engine, name)
}

pub fn change_md_parity(engine: &Engine, name: &str, parity: &str) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let container = model.find_container_mut(name).ok_or_else(|| BlockplanError::MdNotFound(name.to_string()))?;
        for v in container.volumes.iter_mut() {
            v.desc_text = format!("parity={parity}");
        }
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
            engine.syscmd().run(&["mdadm", "--stop", &format!("/dev/{name}")])?.ok()?;
            let mut model = engine.model_mut();
            if model.find_container(name).map(|c| c.physically_removable()).unwrap_or(false) {
                model.remove_container(name, true);
            }
            Ok(())
        }
        Stage::Increase => {
            let members: Vec<String> = {
                let model = engine.model();
                model
                    .containers()
                    .iter()
                    .flat_map(|c| c.volumes.iter())
                    .filter(|v| v.used_by.kind == UsedByKind::Md && v.used_by.owner_name == name)
                    .map(|v| v.device.to_string_lossy().into_owned())
                    .collect()
            };
            let mut argv = vec!["mdadm".to_string(), "--create".to_string(), format!("/dev/{name}")];
            argv.extend(members);
            let argv_ref: Vec<&str> = argv.iter().map(|s| s.as_str()).collect();
            engine.syscmd().run(&argv_ref)?.ok()?;
            engine.syscmd().wait_for_device(std::path::Path::new(&format!("/dev/{name}")))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_md_size_matches_canonical_formulas() {
        assert_eq!(compute_md_size(RaidType::Raid0, &[100, 200, 300]), 600);
        assert_eq!(compute_md_size(RaidType::Raid1, &[100, 200]), 100);
        assert_eq!(compute_md_size(RaidType::Raid5, &[100 * 1024, 200 * 1024, 300 * 1024]), 100 * 1024 * 2);
        assert_eq!(compute_md_size(RaidType::Raid6, &[100, 200, 300, 400]), 200);
        assert_eq!(compute_md_size(RaidType::Raid10, &[100, 100, 100, 100]), 200);
    }

    #[test]
    fn compute_md_size_empty_is_zero() {
        assert_eq!(compute_md_size(RaidType::Raid0, &[]), 0);
    }
}
