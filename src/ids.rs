//! Device-name and identifier utilities.
//!
//! Pure functions over strings and paths; nothing here touches the live
//! system. Ill-formed input returns a best-effort result rather than an
//! error — callers further up the stack decide whether that result is
//! usable.

use std::path::{Path, PathBuf};

/// Canonicalize a device reference into its `/dev/...` form.
///
/// Rewrites sysfs-style `!` separators to `/` (e.g. `cciss!c0d0` ->
/// `cciss/c0d0`) and prepends `/dev/` unless already present.
pub fn canonicalize(name: &str) -> PathBuf {
    let rewritten = name.replace('!', "/");
    if rewritten.starts_with("/dev/") {
        PathBuf::from(rewritten)
    } else {
        PathBuf::from("/dev").join(rewritten)
    }
}

/// Split a partition device into `(disk_device, partition_number)`.
///
/// Handles both the `/dev/sdaN` and `/dev/xxxpN` conventions (the latter
/// used by nvme, md, loop, and dm devices). Returns `(dev, 0)` for inputs
/// that don't look like a partitioned device.
pub fn split_disk_partition(dev: &str) -> (String, u32) {
    let trimmed = dev.trim_end_matches('/');
    let bytes = trimmed.as_bytes();
    let mut i = bytes.len();
    while i > 0 && bytes[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i == bytes.len() || i == 0 {
        return (trimmed.to_string(), 0);
    }
    let number: u32 = match trimmed[i..].parse() {
        Ok(n) => n,
        Err(_) => return (trimmed.to_string(), 0),
    };
    let stem = &trimmed[..i];
    let disk = if let Some(base) = stem.strip_suffix('p') {
        if base.ends_with(|c: char| c.is_ascii_digit()) {
            base.to_string()
        } else {
            stem.to_string()
        }
    } else {
        stem.to_string()
    };
    (disk, number)
}

/// Whether partitions of `disk` take the `p<N>` suffix form.
///
/// Applies to md, loop, dm, and nvme-style device names, where the base
/// name already ends in a digit and a bare numeric suffix would be
/// ambiguous.
pub fn needs_p_separator(disk: &str) -> bool {
    let base = disk.rsplit('/').next().unwrap_or(disk);
    base.starts_with("md")
        || base.starts_with("loop")
        || base.starts_with("dm-")
        || (base.starts_with("nvme") && base.ends_with(|c: char| c.is_ascii_digit()))
}

/// Alternate-name lookup used by [`resolve`]; implemented by the topology
/// model so resolution can fall back to every known symlink for a volume.
pub trait AlternateNameLookup {
    fn resolve_alternate(&self, alias: &str) -> Option<PathBuf>;
}

/// Resolve any of: a bare kernel name, a `/dev/mapper/...` symlink, a
/// `/dev/disk/by-{id,path,uuid,label}/...` symlink, `UUID=...`, or
/// `LABEL=...`, to a canonical device path.
///
/// Falls back to `lookup`'s alternate-name lists (populated by discovery
/// from udev) when the alias isn't a recognizable pattern on its own.
pub fn resolve(alias: &str, lookup: &dyn AlternateNameLookup) -> PathBuf {
    if let Some(uuid) = alias.strip_prefix("UUID=") {
        if let Some(path) = lookup.resolve_alternate(uuid) {
            return path;
        }
        return canonicalize(uuid);
    }
    if let Some(label) = alias.strip_prefix("LABEL=") {
        if let Some(path) = lookup.resolve_alternate(label) {
            return path;
        }
        return canonicalize(label);
    }
    if alias.starts_with("/dev/mapper/")
        || alias.starts_with("/dev/disk/by-id/")
        || alias.starts_with("/dev/disk/by-path/")
        || alias.starts_with("/dev/disk/by-uuid/")
        || alias.starts_with("/dev/disk/by-label/")
    {
        if let Some(path) = lookup.resolve_alternate(alias) {
            return path;
        }
        return PathBuf::from(alias);
    }
    if let Some(path) = lookup.resolve_alternate(alias) {
        return path;
    }
    canonicalize(alias)
}

/// Short kernel name of a device path (no `/dev/` prefix).
pub fn short_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_rewrites_bang_and_prefixes() {
        assert_eq!(canonicalize("cciss!c0d0"), PathBuf::from("/dev/cciss/c0d0"));
        assert_eq!(canonicalize("sda"), PathBuf::from("/dev/sda"));
        assert_eq!(canonicalize("/dev/sda"), PathBuf::from("/dev/sda"));
    }

    #[test]
    fn split_disk_partition_handles_sda_style() {
        assert_eq!(split_disk_partition("/dev/sda1"), ("/dev/sda".to_string(), 1));
        assert_eq!(split_disk_partition("/dev/sda12"), ("/dev/sda".to_string(), 12));
    }

    #[test]
    fn split_disk_partition_handles_p_separator() {
        assert_eq!(split_disk_partition("/dev/md0p1"), ("/dev/md0".to_string(), 1));
        assert_eq!(split_disk_partition("/dev/nvme0n1p3"), ("/dev/nvme0n1".to_string(), 3));
    }

    #[test]
    fn split_disk_partition_unknown_falls_back_to_zero() {
        assert_eq!(split_disk_partition("/dev/vg0/lv0"), ("/dev/vg0/lv0".to_string(), 0));
    }

    #[test]
    fn needs_p_separator_for_stacked_devices() {
        assert!(needs_p_separator("/dev/md0"));
        assert!(needs_p_separator("/dev/loop0"));
        assert!(needs_p_separator("/dev/nvme0n1"));
        assert!(!needs_p_separator("/dev/sda"));
    }
}
