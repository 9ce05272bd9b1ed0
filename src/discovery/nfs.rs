//! NFS discovery, last in the fixed ordering.

use crate::model::{Container, ContainerKind, FsKind, TopologyModel, Volume};

use super::inputs::SystemInputs;

pub fn discover(model: &mut TopologyModel, inputs: &SystemInputs) {
    let mut ordinal = 0i64;
    for entry in &inputs.nfs {
        let mut container = Container::new(entry.server_path.clone(), std::path::PathBuf::from(&entry.server_path), ContainerKind::Nfs, ordinal);
        ordinal += 1;
        let mut volume = Volume::new(container.name.clone(), std::path::PathBuf::from(&entry.server_path), entry.size_kb);
        volume.fs_kind = FsKind::Nfs;
        volume.mount_point = Some(entry.mount_point.clone());
        volume.freeze_original();
        container.volumes.push(volume);
        let _ = model.add_container(container);
    }
}
