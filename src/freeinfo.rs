//! The free-space/resize probe cache.

use std::collections::HashMap;
use std::path::PathBuf;

use regex::Regex;

use crate::engine::Engine;
use crate::errors::{BlockplanError, BlockplanResult};
use crate::model::FsKind;

const WINDOWS_MARKERS: &[&str] = &["boot.ini", "msdos.sys", "io.sys", "config.sys", "MSDOS.SYS", "IO.SYS", "bootmgr", "$Boot"];

#[derive(Debug, Clone, Copy, Default)]
pub struct FreeInfo {
    pub resize_free_kb: u64,
    pub df_free_kb: u64,
    pub used_kb: u64,
    pub looks_like_windows: bool,
    pub looks_like_efi: bool,
    pub resize_ok: bool,
}

#[derive(Debug, Default)]
pub struct FreeInfoCache {
    entries: HashMap<String, FreeInfo>,
}

impl FreeInfoCache {
    pub fn new() -> Self {
        FreeInfoCache::default()
    }

    pub fn get(&self, device: &str) -> Option<FreeInfo> {
        self.entries.get(device).copied()
    }

    pub fn put(&mut self, device: &str, info: FreeInfo) {
        self.entries.insert(device.to_string(), info);
    }

    /// Invalidated on any mutation of the device's size, format, or
    /// encryption.
    pub fn invalidate(&mut self, device: &str) {
        self.entries.remove(device);
    }
}

/// `getFreeInfo(device, use_cache)`.
pub fn get_free_info(engine: &Engine, device: &str, use_cache: bool) -> BlockplanResult<FreeInfo> {
    if use_cache {
        if let Some(info) = engine.inner.free_info.read().get(device) {
            return Ok(info);
        }
    }

    let (fs_kind, mount_point, is_mounted) = {
        let model = engine.model();
        let (_, volume) = model.find_volume(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        (volume.fs_kind, volume.mount_point.clone(), volume.is_mounted())
    };

    if fs_kind.is_unknown() {
        let info = FreeInfo::default();
        engine.inner.free_info.write().put(device, info);
        return Ok(info);
    }

    let (mount_path, transient) = match &mount_point {
        Some(mp) if is_mounted => (PathBuf::from(mp), false),
        _ => (engine.tempdir().join("freeinfo-probe"), true),
    };

    if transient {
        std::fs::create_dir_all(&mount_path).ok();
        let options = if fs_kind == FsKind::Ntfs { "show_sys_files" } else { "" };
        engine.syscmd().mount(std::path::Path::new(device), &mount_path, fs_kind_name(fs_kind), options)?;
    }

    let (block_size, blocks, blocks_free, blocks_avail) = engine.syscmd().statvfs(&mount_path)?;
    let df_free_kb = blocks_free * block_size / 1024;
    let used_kb = (blocks - blocks_free) * block_size / 1024;

    let (resize_free_kb, resize_ok) = if fs_kind == FsKind::Ntfs {
        probe_ntfsresize(engine, device)
    } else {
        (blocks_avail * block_size / 1024, true)
    };

    let looks_like_efi = fs_kind == FsKind::Vfat && engine.syscmd().path_exists(&mount_path.join("efi"));
    let looks_like_windows = !looks_like_efi && WINDOWS_MARKERS.iter().any(|m| engine.syscmd().path_exists(&mount_path.join(m)));

    if transient {
        engine.syscmd().umount(&mount_path)?;
    }

    let info = FreeInfo { resize_free_kb, df_free_kb, used_kb, looks_like_windows, looks_like_efi, resize_ok };
    engine.inner.free_info.write().put(device, info);
    Ok(info)
}

fn probe_ntfsresize(engine: &Engine, device: &str) -> (u64, bool) {
    let output = match engine.syscmd().run(&["ntfsresize", "-f", "-i", device]) {
        Ok(o) => o,
        Err(_) => return (0, false),
    };
    let re = Regex::new(r"might resize at (\d+)").unwrap();
    match re.captures(&output.stdout).and_then(|c| c.get(1)).and_then(|m| m.as_str().parse::<u64>().ok()) {
        Some(bytes) => (bytes / 1024, true),
        None => (0, false),
    }
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

    #[test]
    fn cache_round_trips() {
        let mut cache = FreeInfoCache::new();
        assert!(cache.get("/dev/sda1").is_none());
        cache.put("/dev/sda1", FreeInfo { df_free_kb: 100, ..Default::default() });
        assert_eq!(cache.get("/dev/sda1").unwrap().df_free_kb, 100);
        cache.invalidate("/dev/sda1");
        assert!(cache.get("/dev/sda1").is_none());
    }
}
