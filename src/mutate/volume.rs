//! Volume-wide mutations that apply regardless of the owning
//! container's kind, plus the shared FORMAT/MOUNT
//! commit handlers every kind-specific module calls into.

use regex::Regex;

use crate::engine::Engine;
use crate::errors::{BlockplanError, BlockplanResult};
use crate::model::{EncryptionKind, FsKind, MountBy};

pub fn change_format_volume(engine: &Engine, device: &str, fs_kind: FsKind) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        container.volumes[idx].fs_kind = fs_kind;
        container.volumes[idx].pending.format = true;
    }
    super::finish(engine, device)
}

pub fn change_label_volume(engine: &Engine, device: &str, label: &str) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        container.volumes[idx].label = Some(label.to_string());
        container.volumes[idx].pending.mount_change = true;
    }
    super::finish(engine, device)
}

/// `eraseLabelVolume`: deliberately skips `checkCache` (see DESIGN.md).
/// Every sibling mutator here calls `super::finish`; this one does not.
pub fn erase_label_volume(engine: &Engine, device: &str) -> BlockplanResult<()> {
    super::begin(engine)?;
    let mut model = engine.model_mut();
    let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
    container.volumes[idx].label = None;
    Ok(())
}

pub fn change_mkfs_opt_volume(engine: &Engine, device: &str, options: &str) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        container.volumes[idx].mkfs_options = Some(options.to_string());
    }
    super::finish(engine, device)
}

pub fn change_tunefs_opt_volume(engine: &Engine, device: &str, options: &str) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        container.volumes[idx].tunefs_options = Some(options.to_string());
    }
    super::finish(engine, device)
}

pub fn change_desc_text(engine: &Engine, device: &str, text: &str) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        container.volumes[idx].desc_text = text.to_string();
    }
    super::finish(engine, device)
}

/// `changeMountPoint`: unmounting then remounting is handled by the
/// MOUNT-stage commit handler when it observes the mount point differs
/// from `original.mount_point` on an already-mounted volume.
pub fn change_mount_point(engine: &Engine, device: &str, mount_point: Option<&str>) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        if container.volumes[idx].mount_point.is_none() {
            container.volumes[idx].freeze_original();
        }
        container.volumes[idx].mount_point = mount_point.map(|s| s.to_string());
        container.volumes[idx].pending.mount_change = true;
    }
    super::finish(engine, device)
}

pub fn change_mount_by(engine: &Engine, device: &str, mount_by: MountBy) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        container.volumes[idx].mount_by = mount_by;
        container.volumes[idx].pending.mount_change = true;
    }
    super::finish(engine, device)
}

pub fn change_fstab_options(engine: &Engine, device: &str, options: Vec<String>) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        container.volumes[idx].fstab_options = options;
        container.volumes[idx].fstab_added = true;
        container.volumes[idx].pending.mount_change = true;
    }
    super::finish(engine, device)
}

/// `addFstabOptions`: set-union with the existing options, order
/// preserved, idempotent and commutative under re-ordering of the
/// argument.
pub fn add_fstab_options(engine: &Engine, device: &str, options: &[String]) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        let existing = &mut container.volumes[idx].fstab_options;
        for opt in options {
            if !existing.contains(opt) {
                existing.push(opt.clone());
            }
        }
        container.volumes[idx].fstab_added = true;
        container.volumes[idx].pending.mount_change = true;
    }
    super::finish(engine, device)
}

/// `removeFstabOptions`: regex-based removal — every existing option
/// matching any of `patterns` is dropped.
pub fn remove_fstab_options(engine: &Engine, device: &str, patterns: &[String]) -> BlockplanResult<()> {
    super::begin(engine)?;
    let regexes: Vec<Regex> = patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|_| BlockplanError::InvalidFstabValue(p.clone())))
        .collect::<BlockplanResult<_>>()?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        container.volumes[idx].fstab_options.retain(|opt| !regexes.iter().any(|re| re.is_match(opt)));
        container.volumes[idx].pending.mount_change = true;
    }
    super::finish(engine, device)
}

pub fn set_crypt(engine: &Engine, device: &str, enabled: bool) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        container.volumes[idx].encryption = if enabled { EncryptionKind::Luks } else { EncryptionKind::None };
        container.volumes[idx].pending.format = true;
    }
    super::finish(engine, device)
}

pub fn set_crypt_type(engine: &Engine, device: &str, kind: EncryptionKind) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        container.volumes[idx].encryption = kind;
        container.volumes[idx].pending.format = true;
    }
    super::finish(engine, device)
}

pub fn set_crypt_password(engine: &Engine, device: &str, password: &str) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        container.volumes[idx].crypt_password = Some(password.to_string());
    }
    super::finish(engine, device)
}

pub fn forget_crypt_password(engine: &Engine, device: &str) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        container.volumes[idx].crypt_password = None;
    }
    super::finish(engine, device)
}

pub fn get_crypt_password(engine: &Engine, device: &str) -> BlockplanResult<Option<String>> {
    let model = engine.model();
    let (_, volume) = model.find_volume(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
    Ok(volume.crypt_password.clone())
}

pub fn set_ignore_fstab(engine: &Engine, device: &str, ignore: bool) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        container.volumes[idx].ignore_fstab = ignore;
    }
    super::finish(engine, device)
}

/// `resizeVolume{,NoFs}`: `keep_fs=true` corresponds to the `NoFs`
/// variant, which resizes the block device without touching its
/// filesystem.
pub fn resize_volume(engine: &Engine, device: &str, new_size_kb: u64, keep_fs: bool) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        let volume = &mut container.volumes[idx];
        if volume.original.size_kb == volume.size_kb {
            volume.freeze_original();
        }
        volume.size_kb = new_size_kb;
        volume.pending.resize = true;
        if keep_fs {
            volume.desc_text = "no-fs-resize".to_string();
        }
    }
    super::finish(engine, device)
}

pub fn forget_resize_volume(engine: &Engine, device: &str) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        let volume = &mut container.volumes[idx];
        volume.size_kb = volume.original.size_kb;
        volume.pending.resize = false;
    }
    super::finish(engine, device)
}

/// `removeVolume`: if the volume is consumed by something else,
/// `recursive` must be set, and the owner is removed first via
/// [`super::remove_using`].
pub fn remove_volume(engine: &Engine, device: &str, recursive: bool) -> BlockplanResult<()> {
    super::begin(engine)?;
    let used_by = {
        let model = engine.model();
        let (_, volume) = model.find_volume(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        volume.used_by.clone()
    };
    if !used_by.is_none() {
        if !recursive {
            return Err(BlockplanError::RemoveUsedVolume(device.to_string()));
        }
        super::remove_using(engine, used_by.kind, &used_by.owner_name, &used_by.owner_device)?;
    }
    {
        let mut model = engine.model_mut();
        if let Some((container, idx)) = model.find_volume_mut(device) {
            container.volumes[idx].pending.delete = true;
        }
    }
    super::finish(engine, device)
}

/// Shared FORMAT-stage commit handler: run `mkfs`-equivalent, clear the
/// pending flag.
pub(crate) fn format_commit(engine: &Engine, device: &str) -> BlockplanResult<()> {
    let (fs_kind, mkfs_options) = {
        let model = engine.model();
        let (_, volume) = model.find_volume(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        (volume.fs_kind, volume.mkfs_options.clone())
    };
    if !fs_kind.is_unknown() && fs_kind != FsKind::FsNone {
        let mut argv = vec!["mkfs".to_string(), "-t".to_string(), fs_kind_name(fs_kind).to_string()];
        if let Some(opts) = mkfs_options {
            argv.push(opts);
        }
        argv.push(device.to_string());
        let argv_ref: Vec<&str> = argv.iter().map(|s| s.as_str()).collect();
        engine.syscmd().run(&argv_ref)?.ok()?;
    }
    let mut model = engine.model_mut();
    if let Some((container, idx)) = model.find_volume_mut(device) {
        container.volumes[idx].pending.format = false;
        container.volumes[idx].pending.resize = false;
        container.volumes[idx].freeze_original();
    }
    Ok(())
}

/// Shared MOUNT-stage commit handler: if the volume is already mounted
/// at a different path than its current target, unmount first, then
/// mount/update fstab as needed.
pub(crate) fn mount_commit(engine: &Engine, device: &str) -> BlockplanResult<()> {
    let (current_mount, target_mount, fs_kind, options) = {
        let model = engine.model();
        let (_, volume) = model.find_volume(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        (volume.original.mount_point.clone(), volume.mount_point.clone(), volume.fs_kind, volume.fstab_options.join(","))
    };

    if let Some(prev) = &current_mount {
        if Some(prev.as_str()) != target_mount.as_deref() && prev != crate::model::volume::SWAP_MOUNT {
            engine.syscmd().umount(std::path::Path::new(prev))?;
        }
    }
    if let Some(target) = &target_mount {
        if target != crate::model::volume::SWAP_MOUNT {
            engine
                .syscmd()
                .mount(std::path::Path::new(device), std::path::Path::new(target), fs_kind_name(fs_kind), &options)?;
        }
    }

    let mut model = engine.model_mut();
    if let Some((container, idx)) = model.find_volume_mut(device) {
        container.volumes[idx].pending.mount_change = false;
        container.volumes[idx].freeze_original();
    }
    Ok(())
}

fn fs_kind_name(kind: FsKind) -> &'static str {
    match kind {
        FsKind::Ext2 => "ext2",
        FsKind::Ext3 => "ext3",
        FsKind::Reiserfs => "reiserfs",
        FsKind::Xfs => "xfs",
        FsKind::Jfs => "jfs",
        FsKind::Vfat => "vfat",
        FsKind::Ntfs => "ntfs",
        FsKind::Hfs => "hfs",
        FsKind::HfsPlus => "hfsplus",
        FsKind::Swap => "swap",
        FsKind::Nfs => "nfs",
        FsKind::FsNone | FsKind::FsUnknown => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineOptions;
    use crate::model::{Container, ContainerKind, Volume};
    use crate::syscmd::FakeSystemCommand;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn test_engine() -> Engine {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("lock");
        std::mem::forget(dir);
        Engine::new(EngineOptions::default(), Arc::new(FakeSystemCommand::new()), &lock_path).unwrap()
    }

    #[test]
    fn add_fstab_options_is_idempotent() {
        let engine = test_engine();
        {
            let mut model = engine.model_mut();
            let mut container = Container::new("sda", PathBuf::from("/dev/sda"), ContainerKind::Disk, 0);
            container.volumes.push(Volume::new("sda", PathBuf::from("/dev/sda1"), 1024));
            model.add_container(container).unwrap();
        }
        add_fstab_options(&engine, "/dev/sda1", &["noatime".to_string()]).unwrap();
        add_fstab_options(&engine, "/dev/sda1", &["noatime".to_string()]).unwrap();
        let model = engine.model();
        let (_, v) = model.find_volume("/dev/sda1").unwrap();
        assert_eq!(v.fstab_options, vec!["noatime".to_string()]);
    }

    #[test]
    fn remove_fstab_options_matches_regex() {
        let engine = test_engine();
        {
            let mut model = engine.model_mut();
            let mut container = Container::new("sda", PathBuf::from("/dev/sda"), ContainerKind::Disk, 0);
            let mut v = Volume::new("sda", PathBuf::from("/dev/sda1"), 1024);
            v.fstab_options = vec!["noatime".to_string(), "user_xattr".to_string()];
            container.volumes.push(v);
            model.add_container(container).unwrap();
        }
        remove_fstab_options(&engine, "/dev/sda1", &["^user_.*".to_string()]).unwrap();
        let model = engine.model();
        let (_, v) = model.find_volume("/dev/sda1").unwrap();
        assert_eq!(v.fstab_options, vec!["noatime".to_string()]);
    }
}
