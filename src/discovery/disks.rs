//! Disk and DASD discovery.

use std::path::PathBuf;

use crate::ids;
use crate::model::{Container, ContainerKind, TopologyModel, Volume};

use super::inputs::SystemInputs;

pub fn discover(model: &mut TopologyModel, inputs: &SystemInputs) {
    let mut ordinal = 0i64;
    for bd in &inputs.block_devices {
        let is_full_disk = bd.range > 1 || bd.name.starts_with("dasd");
        if !is_full_disk {
            continue;
        }
        let kind = if bd.name.starts_with("dasd") { ContainerKind::Dasd } else { ContainerKind::Disk };
        let device = ids::canonicalize(&bd.name);
        let mut container = Container::new(ids::short_name(&device), device.clone(), kind, ordinal);
        ordinal += 1;

        for alt in alternate_names(inputs, &device) {
            container.alt_names.push(alt);
        }

        for part in inputs.partitions.iter().filter(|p| ids::canonicalize(&p.disk) == device) {
            let part_device = ids::canonicalize(&part.device);
            let mut volume = Volume::new(container.name.clone(), part_device.clone(), part.size_kb);
            volume.index = Some(part.number);
            volume.freeze_original();
            for alt in alternate_names(inputs, &part_device) {
                volume.alt_names.push(alt);
            }
            container.volumes.push(volume);
        }

        if container.volumes.is_empty() {
            // No partitions attached and not a usable whole-disk entry: discard.
            continue;
        }
        let _ = model.add_container(container);
    }
}

fn alternate_names(inputs: &SystemInputs, device: &std::path::Path) -> Vec<String> {
    let canonical = device.to_string_lossy().into_owned();
    let mut names = Vec::new();
    if let Some(ids) = inputs.udev.by_id.get(&canonical) {
        names.extend(ids.iter().cloned());
    }
    if let Some(paths) = inputs.udev.by_path.get(&canonical) {
        names.extend(paths.iter().cloned());
    }
    names
}

pub fn device_alt_names(inputs: &SystemInputs, device: &PathBuf) -> Vec<String> {
    alternate_names(inputs, device)
}
