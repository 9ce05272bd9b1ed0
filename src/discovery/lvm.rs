//! LVM discovery.

use crate::model::{Container, ContainerKind, TopologyModel, UsedBy, UsedByKind, Volume};

use super::inputs::SystemInputs;

pub fn discover(model: &mut TopologyModel, inputs: &SystemInputs) {
    let mut ordinal = 0i64;
    for vg in &inputs.lvm_vgs {
        let device_path = format!("/dev/{}", vg.name);
        for pv in &vg.pvs {
            if let Some((container, idx)) = model.find_volume_mut(pv) {
                container.volumes[idx].used_by = UsedBy::new(UsedByKind::Lvm, vg.name.clone(), device_path.clone());
            }
        }
        let mut container = Container::new(vg.name.clone(), std::path::PathBuf::from(&device_path), ContainerKind::Lvm, ordinal);
        ordinal += 1;
        container.alt_names.push(format!("pe_size={}", vg.pe_size_kb));
        if vg.lvm1 {
            container.alt_names.push("lvm1".to_string());
        }
        for lv in inputs.lvm_lvs.iter().filter(|lv| lv.vg == vg.name) {
            let dev = std::path::PathBuf::from(format!("/dev/{}/{}", lv.vg, lv.name));
            let mut volume = Volume::new(vg.name.clone(), dev, lv.size_kb);
            volume.stripes = lv.stripes.max(1);
            volume.freeze_original();
            container.volumes.push(volume);
        }
        let _ = model.add_container(container);
    }
}
