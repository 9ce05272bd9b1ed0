//! Software RAID discovery, run after disks so
//! component device sizes are already in the model.

use std::path::PathBuf;

use crate::ids;
use crate::model::{Container, ContainerKind, TopologyModel, UsedBy, UsedByKind, Volume};
use crate::mutate::md::{compute_md_size, RaidType};

use super::inputs::SystemInputs;

fn raid_type_of(level: &str) -> RaidType {
    match level.to_ascii_lowercase().as_str() {
        "raid0" | "0" => RaidType::Raid0,
        "raid5" | "5" => RaidType::Raid5,
        "raid6" | "6" => RaidType::Raid6,
        "raid10" | "10" => RaidType::Raid10,
        "multipath" => RaidType::Multipath,
        _ => RaidType::Raid1,
    }
}

pub fn discover(model: &mut TopologyModel, inputs: &SystemInputs) {
    let mut ordinal = 0i64;
    for entry in &inputs.mdstat {
        let device = ids::canonicalize(&entry.name);
        let device_path = device.to_string_lossy().into_owned();
        let raid_type = raid_type_of(&entry.level);

        let mut sizes = Vec::new();
        for dev in &entry.devices {
            let dev_path = ids::canonicalize(dev);
            if let Some((_, volume)) = model.find_volume(&dev_path.to_string_lossy()) {
                sizes.push(volume.size_kb);
            }
        }
        for dev in &entry.devices {
            let dev_canon = ids::canonicalize(dev).to_string_lossy().into_owned();
            if let Some((container, idx)) = model.find_volume_mut(&dev_canon) {
                container.volumes[idx].used_by = UsedBy::new(UsedByKind::Md, ids::short_name(&device), device_path.clone());
            }
        }

        let mut container = Container::new(ids::short_name(&device), device.clone(), ContainerKind::Md, ordinal);
        ordinal += 1;
        let mut volume = Volume::new(container.name.clone(), device, compute_md_size(raid_type, &sizes));
        volume.freeze_original();
        container.volumes.push(volume);
        let _ = model.add_container(container);
    }
}

pub fn device_path(name: &str) -> PathBuf {
    ids::canonicalize(name)
}
