//! The commit-sort rules, expressed as total orderings and kept separate
//! from the executor so each rule can be tested in isolation.

use std::cmp::Ordering;

use crate::model::{Container, ContainerKind, Volume};

use super::action::{CommitAction, Stage, Target};

/// Container ordering for a stage: DECREASE sorts containers "upward"
/// (highest ordinal first) so a stacking consumer is torn down before
/// its producer; every other stage sorts "downward" (producers first).
pub fn sort_containers(stage: Stage, containers: &mut [&Container]) {
    match stage {
        Stage::Decrease => containers.sort_by(|a, b| b.cmp(a)),
        _ => containers.sort_by(|a, b| a.cmp(b)),
    }
}

/// Volume ordering within a stage.
pub fn sort_volumes(stage: Stage, volumes: &mut Vec<&Volume>, containers: &[Container]) {
    match stage {
        Stage::Decrease => {
            volumes.reverse();
            volumes.sort_by(|a, b| cmp_vol_delete(b, a, containers));
        }
        Stage::Increase => {
            volumes.sort_by(|a, b| cmp_vol_create(b, a));
        }
        Stage::Mount => {
            volumes.sort_by(|a, b| cmp_vol_mount(b, a));
        }
        Stage::Format => {
            volumes.sort_by(|a, b| a.cmp(b));
        }
    }
}

fn container_kind_of<'a>(v: &Volume, containers: &'a [Container]) -> Option<ContainerKind> {
    containers.iter().find(|c| c.name == v.container_name).map(|c| c.kind)
}

/// DECREASE-stage volume ordering: mounted volumes precede unmounted;
/// among unmounted, shrink-needing volumes precede others; otherwise
/// compare by container-relative order, where volumes owned by a
/// DISK-kind container compare by partition number (so higher-numbered
/// partitions are removed first, required for msdos extended-partition
/// slot recycling) and everything else falls back to the generic natural
/// order (see DESIGN.md for how the DISK-kind gate here was settled).
fn cmp_vol_delete(rhs: &Volume, lhs: &Volume, containers: &[Container]) -> Ordering {
    if rhs.is_mounted() == lhs.is_mounted() {
        if rhs.is_mounted() {
            rhs.mount_point.cmp(&lhs.mount_point)
        } else if rhs.needs_shrink() == lhs.needs_shrink() {
            let rhs_disk = container_kind_of(rhs, containers) == Some(ContainerKind::Disk);
            if !rhs_disk {
                rhs.cmp(lhs)
            } else {
                rhs.index.cmp(&lhs.index)
            }
        } else {
            rhs.needs_shrink().cmp(&lhs.needs_shrink())
        }
    } else {
        rhs.is_mounted().cmp(&lhs.is_mounted())
    }
}

/// INCREASE-stage volume ordering: within LVM, stripe count descending
/// then natural order; other kinds by natural order directly. Ensures
/// striped LVs are allocated before linear ones.
fn cmp_vol_create(rhs: &Volume, lhs: &Volume) -> Ordering {
    rhs.stripes.cmp(&lhs.stripes).then(rhs.cmp(lhs))
}

/// MOUNT-stage volume ordering: `swap` entries last; volumes with a
/// pre-existing mount before volumes without one; ties by mount path
/// ascending (shorter/parent paths mount first).
fn cmp_vol_mount(rhs: &Volume, lhs: &Volume) -> Ordering {
    if rhs.is_swap_mount() {
        Ordering::Greater
    } else if lhs.is_swap_mount() {
        Ordering::Less
    } else if rhs.has_orig_mount() != lhs.has_orig_mount() {
        // rhs having an original mount sorts first (i.e. compares "less").
        lhs.has_orig_mount().cmp(&rhs.has_orig_mount())
    } else {
        rhs.mount_point.cmp(&lhs.mount_point)
    }
}

/// Merge sorted container and volume action lists, then re-sort the
/// merged list by the `(stage, container-kind)` tuple so actions on a
/// given kind stay grouped.
pub fn merge_and_group(stage: Stage, container_actions: Vec<CommitAction>, volume_actions: Vec<CommitAction>) -> Vec<CommitAction> {
    let mut merged = container_actions;
    merged.extend(volume_actions);
    merged.sort_by_key(|a| (stage_rank(a.stage), a.kind.rank()));
    merged
}

fn stage_rank(stage: Stage) -> u8 {
    match stage {
        Stage::Decrease => 0,
        Stage::Increase => 1,
        Stage::Format => 2,
        Stage::Mount => 3,
    }
}

/// `ignoreError`: a failing action is tolerated when it is a
/// non-container DISK DECREASE and some later action in the same stage's
/// list is a container DISK DECREASE — removing the whole partition
/// table supersedes the per-partition failure.
pub fn ignore_error(failing_index: usize, remaining: &[CommitAction]) -> bool {
    let failing = match remaining.get(failing_index) {
        Some(a) => a,
        None => return false,
    };
    if failing.target.is_container() || failing.stage != Stage::Decrease || failing.kind != ContainerKind::Disk {
        return false;
    }
    remaining[failing_index + 1..]
        .iter()
        .any(|a| a.target.is_container() && a.stage == Stage::Decrease && a.kind == ContainerKind::Disk)
}

pub fn is_loop(kind: ContainerKind) -> bool {
    matches!(kind, ContainerKind::Loop)
}

pub fn not_loop(kind: ContainerKind) -> bool {
    !is_loop(kind)
}

pub fn target_device(target: &Target) -> &str {
    match target {
        Target::Container { name } => name,
        Target::Volume { device, .. } => device,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Container, ContainerKind, Volume};
    use std::path::PathBuf;

    fn disk(name: &str, ordinal: i64) -> Container {
        Container::new(name, PathBuf::from(format!("/dev/{name}")), ContainerKind::Disk, ordinal)
    }

    fn vol(container: &str, index: u32) -> Volume {
        let mut v = Volume::new(container, PathBuf::from(format!("/dev/{container}{index}")), 1024);
        v.index = Some(index);
        v
    }

    #[test]
    fn decrease_removes_higher_numbered_partitions_first() {
        let containers = vec![disk("sda", 0)];
        let v1 = vol("sda", 1);
        let v2 = vol("sda", 2);
        let v5 = vol("sda", 5);
        let mut volumes = vec![&v1, &v2, &v5];
        sort_volumes(Stage::Decrease, &mut volumes, &containers);
        let order: Vec<u32> = volumes.iter().map(|v| v.index.unwrap()).collect();
        assert_eq!(order, vec![5, 2, 1]);
    }

    #[test]
    fn mount_sorts_swap_last_and_shorter_paths_first() {
        let mut v1 = vol("sda", 1);
        v1.mount_point = Some("/".to_string());
        v1.original.mount_point = Some("/".to_string());
        let mut v2 = vol("sda", 2);
        v2.mount_point = Some("/home".to_string());
        v2.original.mount_point = Some("/home".to_string());
        let mut v3 = vol("sda", 3);
        v3.mount_point = Some(crate::model::volume::SWAP_MOUNT.to_string());
        v3.original.mount_point = Some(crate::model::volume::SWAP_MOUNT.to_string());
        let mut volumes = vec![&v2, &v3, &v1];
        sort_volumes(Stage::Mount, &mut volumes, &[]);
        let order: Vec<&str> = volumes.iter().map(|v| v.mount_point.as_deref().unwrap()).collect();
        assert_eq!(order, vec!["/", "/home", "swap"]);
    }

    #[test]
    fn ignore_error_tolerates_partition_failure_before_disk_decrease() {
        let actions = vec![
            CommitAction {
                stage: Stage::Decrease,
                kind: ContainerKind::Disk,
                target: Target::Volume { container_name: "sda".into(), device: "/dev/sda1".into() },
                destructive: true,
                description: String::new(),
            },
            CommitAction {
                stage: Stage::Decrease,
                kind: ContainerKind::Disk,
                target: Target::Container { name: "sda".into() },
                destructive: true,
                description: String::new(),
            },
        ];
        assert!(ignore_error(0, &actions));
        assert!(!ignore_error(1, &actions));
    }
}
