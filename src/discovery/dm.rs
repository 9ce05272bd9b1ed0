//! Device-mapper discovery: DMRAID, DMMULTIPATH (both partitioned
//! containers), and plain DM targets.

use crate::ids;
use crate::model::{Container, ContainerKind, TopologyModel, UsedBy, UsedByKind, Volume};

use super::inputs::{DmEntry, SystemInputs};

fn mark_members_used(model: &mut TopologyModel, kind: UsedByKind, owner_name: &str, owner_device: &str, devices: &[String]) {
    for dev in devices {
        let canon = ids::canonicalize(dev).to_string_lossy().into_owned();
        if let Some((container, idx)) = model.find_volume_mut(&canon) {
            container.volumes[idx].used_by = UsedBy::new(kind, owner_name, owner_device);
        }
    }
}

fn discover_partitioned(model: &mut TopologyModel, entries: &[DmEntry], kind: ContainerKind, used_by_kind: UsedByKind, ordinal_start: i64) {
    let mut ordinal = ordinal_start;
    for entry in entries {
        let device = ids::canonicalize(&entry.name);
        let device_path = device.to_string_lossy().into_owned();
        mark_members_used(model, used_by_kind, &entry.name, &device_path, &entry.devices);

        let mut container = Container::new(entry.name.clone(), device.clone(), kind, ordinal);
        ordinal += 1;
        let mut volume = Volume::new(container.name.clone(), device, entry.size_kb);
        volume.freeze_original();
        container.volumes.push(volume);
        let _ = model.add_container(container);
    }
}

pub fn discover_dmraid(model: &mut TopologyModel, inputs: &SystemInputs) {
    discover_partitioned(model, &inputs.dmraid, ContainerKind::Dmraid, UsedByKind::Dmraid, 0);
}

pub fn discover_dmmultipath(model: &mut TopologyModel, inputs: &SystemInputs) {
    discover_partitioned(model, &inputs.dmmultipath, ContainerKind::Dmmultipath, UsedByKind::Dmmultipath, 0);
}

pub fn discover_other(model: &mut TopologyModel, inputs: &SystemInputs) {
    let mut ordinal = 0i64;
    for entry in &inputs.dm_other {
        let device = ids::canonicalize(&entry.name);
        let device_path = device.to_string_lossy().into_owned();
        mark_members_used(model, UsedByKind::Dm, &entry.name, &device_path, &entry.devices);

        let mut container = Container::new(entry.name.clone(), device.clone(), ContainerKind::Dm, ordinal);
        ordinal += 1;
        let mut volume = Volume::new(container.name.clone(), device, entry.size_kb);
        volume.freeze_original();
        container.volumes.push(volume);
        let _ = model.add_container(container);
    }
}
