//! Loop-file discovery.

use crate::model::{Container, ContainerKind, TopologyModel, Volume};

use super::inputs::SystemInputs;

pub fn discover(model: &mut TopologyModel, inputs: &SystemInputs) {
    let mut ordinal = 0i64;
    for entry in &inputs.loops {
        let device = std::path::PathBuf::from(format!("/dev/{}", entry.name));
        let mut container = Container::new(entry.name.clone(), device.clone(), ContainerKind::Loop, ordinal);
        ordinal += 1;
        let mut volume = Volume::new(container.name.clone(), device, entry.size_kb);
        volume.desc_text = entry.backing_file.clone();
        volume.freeze_original();
        container.volumes.push(volume);
        let _ = model.add_container(container);
    }
}
