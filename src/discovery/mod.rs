//! Discovery: populate the topology model from injected, already-parsed
//! system state, in a fixed order so later steps can see earlier
//! containers' devices already marked as used.

pub mod disks;
pub mod dm;
pub mod inputs;
pub mod loopdev;
pub mod lvm;
pub mod md;
pub mod nfs;

use crate::config::EngineMode;
use crate::engine::Engine;
use crate::errors::BlockplanResult;
use crate::ids;

use inputs::{parse_fs_kind, parse_mount_by, EmptyInputSource, InputSource, SystemInputs, TestModeInputSource};

/// Run the full discovery sequence against `engine`, replacing whatever
/// is currently in its topology model.
pub fn run(engine: &Engine) -> BlockplanResult<()> {
    let source: Box<dyn InputSource> = match engine.mode() {
        EngineMode::TestMode { dump_dir } => Box::new(TestModeInputSource { dump_dir: dump_dir.clone() }),
        EngineMode::InstallSystem => {
            tracing::info!("install-system mode: activating md/lvm/dmraid/dmmultipath before discovery");
            Box::new(EmptyInputSource)
        }
        EngineMode::Autodetect => Box::new(EmptyInputSource),
    };

    let system_inputs = source.load()?;

    let mut model = engine.model_mut();
    *model = crate::model::TopologyModel::new();

    tracing::debug!("discovering disks");
    disks::discover(&mut model, &system_inputs);
    tracing::debug!("discovering md arrays");
    md::discover(&mut model, &system_inputs);
    tracing::debug!("discovering dmraid sets");
    dm::discover_dmraid(&mut model, &system_inputs);
    tracing::debug!("discovering dmmultipath sets");
    dm::discover_dmmultipath(&mut model, &system_inputs);
    tracing::debug!("discovering lvm volume groups");
    lvm::discover(&mut model, &system_inputs);
    tracing::debug!("discovering remaining device-mapper targets");
    dm::discover_other(&mut model, &system_inputs);
    tracing::debug!("discovering loop devices");
    loopdev::discover(&mut model, &system_inputs);
    tracing::debug!("discovering nfs mounts");
    nfs::discover(&mut model, &system_inputs);

    finalize_volumes(&mut model, &system_inputs);
    Ok(())
}

/// After every container kind is in place, derive each volume's
/// filesystem kind/uuid/label, mount state, and fstab state.
fn finalize_volumes(model: &mut crate::model::TopologyModel, inputs: &SystemInputs) {
    for container in model.containers_mut() {
        for volume in container.volumes.iter_mut() {
            let device_str = volume.device.to_string_lossy().into_owned();

            if let Some(blkid) = inputs.blkid.iter().find(|b| ids::canonicalize(&b.device).to_string_lossy() == device_str) {
                if volume.fs_kind.is_unknown() {
                    if let Some(fs) = &blkid.fs_kind {
                        volume.fs_kind = parse_fs_kind(fs);
                    }
                }
                volume.uuid = blkid.uuid.clone().or(volume.uuid.take());
                volume.label = blkid.label.clone().or(volume.label.take());
            }

            if let Some(mount) = inputs.mounts.iter().find(|m| ids::canonicalize(&m.device).to_string_lossy() == device_str) {
                volume.mount_point = Some(mount.mount_point.clone());
                if volume.fs_kind.is_unknown() {
                    if let Some(fs) = &mount.fs_kind {
                        volume.fs_kind = parse_fs_kind(fs);
                    }
                }
            }

            if let Some(entry) = inputs.fstab.iter().find(|f| ids::canonicalize(&f.dentry).to_string_lossy() == device_str) {
                volume.fstab_options = entry.opts.clone();
                volume.mount_by = parse_mount_by(
                    entry
                        .dentry
                        .strip_prefix("UUID=")
                        .map(|_| "uuid")
                        .or_else(|| entry.dentry.strip_prefix("LABEL=").map(|_| "label"))
                        .unwrap_or("device"),
                );
                if volume.mount_point.is_none() {
                    volume.mount_point = Some(entry.mount.clone());
                }
            }

            volume.freeze_original();
        }
    }
}
