//! Partitioned containers: DISK, DASD, DMRAID, DMMULTIPATH. All four
//! share one partition-table commit path instead of four near-identical
//! ones.

use std::path::PathBuf;

use crate::commit::{CommitAction, Stage, Target};
use crate::engine::Engine;
use crate::errors::{BlockplanError, BlockplanResult};
use crate::ids;
use crate::model::{Container, ContainerKind, LabelKind, PartitionTableInfo, Volume};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    Primary,
    Extended,
    Logical,
}

/// `cylinderToKb`/`kbToCylinder`: convert between a disk's cylinder
/// geometry and kB using its `cylinder_size_kb`.
pub fn cylinder_to_kb(table: &PartitionTableInfo, cylinders: u64) -> u64 {
    cylinders * table.cylinder_size_kb
}

pub fn kb_to_cylinder(table: &PartitionTableInfo, kb: u64) -> u64 {
    if table.cylinder_size_kb == 0 {
        0
    } else {
        kb.div_ceil(table.cylinder_size_kb)
    }
}

fn default_table_for_label(label: LabelKind) -> PartitionTableInfo {
    let (max_primary, max_logical) = match label {
        LabelKind::Msdos => (4, 64),
        LabelKind::Gpt => (128, 128),
        LabelKind::Mac | LabelKind::Sun => (16, 16),
        LabelKind::Dasd => (3, 3),
        LabelKind::Loop | LabelKind::Unknown => (1, 1),
    };
    PartitionTableInfo {
        label,
        cylinders: 0,
        heads: 255,
        sectors: 63,
        cylinder_size_kb: 8225,
        num_primary: 0,
        has_extended: false,
        num_logical: 0,
        extended_index: None,
        max_primary,
        max_logical,
    }
}

/// `defaultDiskLabel`: the label a freshly initialized disk gets absent
/// caller override (msdos below 2TiB-equivalent cylinder counts, gpt
/// otherwise — approximated here by a caller-supplied disk size).
pub fn default_disk_label(size_kb: u64) -> LabelKind {
    const TWO_TIB_KB: u64 = 2 * 1024 * 1024 * 1024;
    if size_kb > TWO_TIB_KB {
        LabelKind::Gpt
    } else {
        LabelKind::Msdos
    }
}

pub fn default_disk_label_size(size_kb: u64) -> PartitionTableInfo {
    default_table_for_label(default_disk_label(size_kb))
}

/// `initializeDisk`: replace the disk's partition table, removing every
/// volume on it. Fails if the disk is in use.
pub fn initialize_disk(engine: &Engine, disk: &str, label: LabelKind) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let container = model
            .find_container_mut(disk)
            .ok_or_else(|| BlockplanError::DiskNotFound(disk.to_string()))?;
        if !container.used_by.is_none() {
            return Err(BlockplanError::DiskUsedBy(disk.to_string()));
        }
        if !container.kind.is_partitioned() {
            return Err(BlockplanError::DiskInitNotPossible(disk.to_string()));
        }
        for v in container.volumes.iter_mut() {
            v.pending.delete = true;
        }
        container.partition_table = Some(default_table_for_label(label));
    }
    super::finish(engine, disk)
}

/// `destroyPartitionTable`: remove every partition and clear the table.
pub fn destroy_partition_table(engine: &Engine, disk: &str) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let container = model
            .find_container_mut(disk)
            .ok_or_else(|| BlockplanError::DiskNotFound(disk.to_string()))?;
        for v in container.volumes.iter_mut() {
            v.pending.delete = true;
        }
    }
    super::finish(engine, disk)
}

fn slot_available(table: &PartitionTableInfo, kind: PartitionKind) -> bool {
    match kind {
        PartitionKind::Primary => table.primary_possible(),
        PartitionKind::Extended => table.extended_possible(),
        PartitionKind::Logical => table.logical_possible(),
    }
}

/// `nextFreePartition`: the lowest partition number of the requested
/// kind not already occupied.
pub fn next_free_partition(container: &Container, kind: PartitionKind) -> u32 {
    let table = match &container.partition_table {
        Some(t) => t,
        None => return 1,
    };
    let start = match kind {
        PartitionKind::Primary | PartitionKind::Extended => 1,
        PartitionKind::Logical => table.max_primary + 1,
    };
    let end = match kind {
        PartitionKind::Primary | PartitionKind::Extended => table.max_primary,
        PartitionKind::Logical => table.max_logical,
    };
    let used: Vec<u32> = container.volumes.iter().filter(|v| !v.pending.delete).filter_map(|v| v.index).collect();
    (start..=end).find(|n| !used.contains(n)).unwrap_or(end)
}

/// `getUnusedPartitionSlots`: every free primary/logical slot number.
pub fn unused_partition_slots(container: &Container) -> Vec<(u32, PartitionKind)> {
    let table = match &container.partition_table {
        Some(t) => t,
        None => return Vec::new(),
    };
    let used: Vec<u32> = container.volumes.iter().filter(|v| !v.pending.delete).filter_map(|v| v.index).collect();
    let mut slots = Vec::new();
    if table.primary_possible() {
        slots.extend((1..=table.max_primary).filter(|n| !used.contains(n)).map(|n| (n, PartitionKind::Primary)));
    }
    if table.has_extended {
        slots.extend(
            (table.max_primary + 1..=table.max_logical)
                .filter(|n| !used.contains(n))
                .map(|n| (n, PartitionKind::Logical)),
        );
    }
    slots
}

/// `createPartitionKb`: shared implementation behind
/// `createPartition`/`createPartitionAny`/`createPartitionMax`, all of
/// which convert their unit (cylinders, "any", "max") to a kB size
/// before calling this.
pub fn create_partition_kb(engine: &Engine, disk: &str, kind: PartitionKind, size_kb: u64) -> BlockplanResult<String> {
    super::begin(engine)?;
    let device;
    {
        let mut model = engine.model_mut();
        let container = model
            .find_container_mut(disk)
            .ok_or_else(|| BlockplanError::DiskNotFound(disk.to_string()))?;
        if !container.kind.is_partitioned() {
            return Err(BlockplanError::RemovePartitionInvalidContainer(disk.to_string()));
        }
        {
            let table = container
                .partition_table
                .as_ref()
                .ok_or_else(|| BlockplanError::DiskInitNotPossible(disk.to_string()))?;
            if !slot_available(table, kind) {
                return Err(BlockplanError::ChangeAreaInvalidContainer(disk.to_string()));
            }
        }
        let number = next_free_partition(container, kind);
        let table = container.partition_table.as_mut().unwrap();
        match kind {
            PartitionKind::Primary => table.num_primary += 1,
            PartitionKind::Extended => {
                table.has_extended = true;
                table.extended_index = Some(number);
            }
            PartitionKind::Logical => table.num_logical += 1,
        }
        let dev = partition_device_name(&container.device, number);
        device = dev.to_string_lossy().into_owned();
        let mut volume = Volume::new(container.name.clone(), dev, size_kb);
        volume.index = Some(number);
        volume.pending.create = true;
        container.volumes.push(volume);
    }
    super::finish(engine, &device)?;
    Ok(device)
}

pub fn partition_device_name(disk: &std::path::Path, number: u32) -> PathBuf {
    let base = disk.to_string_lossy();
    let name = ids::short_name(disk);
    if ids::needs_p_separator(&name) {
        PathBuf::from(format!("{base}p{number}"))
    } else {
        PathBuf::from(format!("{base}{number}"))
    }
}

/// Release the partition-table slot held by `index`: a logical partition
/// decrements `num_logical`; the extended partition clears `has_extended`
/// and drops every logical partition behind it (removing the extended
/// partition removes its logicals); any other (primary) index decrements
/// `num_primary`.
fn release_partition_slot(container: &mut Container, index: Option<u32>) {
    let Some(table) = container.partition_table.as_mut() else { return };
    let Some(index) = index else { return };
    if table.extended_index == Some(index) {
        table.has_extended = false;
        table.extended_index = None;
        table.num_logical = 0;
        for v in container.volumes.iter_mut() {
            if v.index.is_some_and(|n| n > table.max_primary) {
                v.pending.delete = true;
            }
        }
    } else if index > table.max_primary {
        table.num_logical = table.num_logical.saturating_sub(1);
    } else {
        table.num_primary = table.num_primary.saturating_sub(1);
    }
}

/// `removePartition`.
pub fn remove_partition(engine: &Engine, device: &str, recursive: bool) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        let used_by = container.volumes[idx].used_by.clone();
        if !used_by.is_none() {
            if !recursive {
                return Err(BlockplanError::RemoveUsedVolume(device.to_string()));
            }
            drop(model);
            super::remove_using(engine, used_by.kind, &used_by.owner_name, &used_by.owner_device)?;
            let mut model = engine.model_mut();
            if let Some((container, idx)) = model.find_volume_mut(device) {
                let index = container.volumes[idx].index;
                container.volumes[idx].pending.delete = true;
                release_partition_slot(container, index);
            }
        } else {
            let index = container.volumes[idx].index;
            container.volumes[idx].pending.delete = true;
            release_partition_slot(container, index);
        }
    }
    super::finish(engine, device)
}

/// `updatePartitionArea`/`resizePartition{,NoFs}`: both funnel through
/// `resizeVolume`, which handles the grow/shrink-direction bookkeeping
/// shared by every kind.
pub fn resize_partition(engine: &Engine, device: &str, new_size_kb: u64, keep_fs: bool) -> BlockplanResult<()> {
    super::volume::resize_volume(engine, device, new_size_kb, keep_fs)
}

pub fn change_partition_id(engine: &Engine, device: &str, id_text: &str) -> BlockplanResult<()> {
    super::begin(engine)?;
    {
        let mut model = engine.model_mut();
        let (container, idx) = model.find_volume_mut(device).ok_or_else(|| BlockplanError::VolumeNotFound(device.to_string()))?;
        if !container.kind.is_partitioned() {
            return Err(BlockplanError::ChangePartitionIdInvalidContainer(device.to_string()));
        }
        container.volumes[idx].desc_text = format!("id={id_text}");
        container.volumes[idx].pending.mount_change = true;
    }
    super::finish(engine, device)
}

/// The stage executor's entry point for a partitioned container or one
/// of its volumes.
pub fn commit_changes(engine: &Engine, action: &CommitAction) -> BlockplanResult<()> {
    match &action.target {
        Target::Container { name } => commit_container(engine, name, action.stage),
        Target::Volume { device, .. } => commit_volume(engine, device, action.stage),
    }
}

fn commit_container(engine: &Engine, name: &str, stage: Stage) -> BlockplanResult<()> {
    match stage {
        Stage::Decrease => {
            let label = {
                let model = engine.model();
                let container = model.find_container(name).ok_or_else(|| BlockplanError::DiskNotFound(name.to_string()))?;
                container
                    .partition_table
                    .as_ref()
                    .map(|t| t.label)
                    .unwrap_or(LabelKind::Unknown)
            };
            engine
                .syscmd()
                .run(&["parted", "-s", &device_path(engine, name)?, "mklabel", label_name(label)])?
                .ok()?;
            let mut model = engine.model_mut();
            if model.find_container(name).map(|c| c.physically_removable()).unwrap_or(false) {
                model.remove_container(name, true);
            }
            Ok(())
        }
        Stage::Increase => {
            let path = device_path(engine, name)?;
            engine.syscmd().wait_for_device(std::path::Path::new(&path))
        }
        Stage::Format | Stage::Mount => Ok(()),
    }
}

fn commit_volume(engine: &Engine, device: &str, stage: Stage) -> BlockplanResult<()> {
    match stage {
        Stage::Decrease => {
            engine.syscmd().run(&["parted", "-s", device, "rm"])?.ok()?;
            let mut model = engine.model_mut();
            if let Some((container, idx)) = model.find_volume_mut(device) {
                container.volumes.remove(idx);
            }
            Ok(())
        }
        Stage::Increase => {
            engine.syscmd().run(&["parted", "-s", device, "mkpart"])?.ok()?;
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

fn device_path(engine: &Engine, name: &str) -> BlockplanResult<String> {
    let model = engine.model();
    model
        .find_container(name)
        .map(|c| c.device.to_string_lossy().into_owned())
        .ok_or_else(|| BlockplanError::DiskNotFound(name.to_string()))
}

fn label_name(label: LabelKind) -> &'static str {
    match label {
        LabelKind::Msdos => "msdos",
        LabelKind::Gpt => "gpt",
        LabelKind::Mac => "mac",
        LabelKind::Sun => "sun",
        LabelKind::Dasd => "dasd",
        LabelKind::Loop | LabelKind::Unknown => "loop",
    }
}

pub fn is_partitioned_kind(kind: ContainerKind) -> bool {
    kind.is_partitioned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_disk_label_picks_gpt_for_large_disks() {
        assert_eq!(default_disk_label(4 * 1024 * 1024 * 1024), LabelKind::Gpt);
        assert_eq!(default_disk_label(1024), LabelKind::Msdos);
    }

    #[test]
    fn next_free_partition_skips_used_numbers() {
        let mut container = Container::new("sda", PathBuf::from("/dev/sda"), ContainerKind::Disk, 0);
        container.partition_table = Some(default_table_for_label(LabelKind::Msdos));
        let mut v1 = Volume::new("sda", PathBuf::from("/dev/sda1"), 1024);
        v1.index = Some(1);
        container.volumes.push(v1);
        assert_eq!(next_free_partition(&container, PartitionKind::Primary), 2);
    }

    #[test]
    fn extended_partition_does_not_consume_a_primary_slot() {
        let mut table = default_table_for_label(LabelKind::Msdos);
        table.num_primary = 2;
        table.has_extended = true;
        table.extended_index = Some(4);
        assert!(table.primary_possible());
    }

    #[test]
    fn releasing_extended_slot_clears_it_and_drops_logicals() {
        let mut container = Container::new("sda", PathBuf::from("/dev/sda"), ContainerKind::Disk, 0);
        container.partition_table = Some(default_table_for_label(LabelKind::Msdos));
        let table = container.partition_table.as_mut().unwrap();
        table.num_primary = 1;
        table.has_extended = true;
        table.extended_index = Some(4);
        table.num_logical = 2;
        let mut logical = Volume::new("sda", PathBuf::from("/dev/sda5"), 1024);
        logical.index = Some(5);
        container.volumes.push(logical);

        release_partition_slot(&mut container, Some(4));

        let table = container.partition_table.as_ref().unwrap();
        assert!(!table.has_extended);
        assert_eq!(table.extended_index, None);
        assert_eq!(table.num_logical, 0);
        assert!(container.volumes[0].pending.delete);
    }

    #[test]
    fn releasing_logical_slot_decrements_num_logical_only() {
        let mut container = Container::new("sda", PathBuf::from("/dev/sda"), ContainerKind::Disk, 0);
        container.partition_table = Some(default_table_for_label(LabelKind::Msdos));
        let table = container.partition_table.as_mut().unwrap();
        table.has_extended = true;
        table.extended_index = Some(4);
        table.num_logical = 1;

        release_partition_slot(&mut container, Some(5));

        let table = container.partition_table.as_ref().unwrap();
        assert!(table.has_extended);
        assert_eq!(table.num_logical, 0);
    }
}
