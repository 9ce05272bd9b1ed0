//! The staged commit planner and executor.
//!
//! `Engine::commit` runs two passes — loop containers after everything
//! else — and within each pass the four fixed stages in order. Sorting
//! lives in [`sort`]; action records in [`action`]; this module only
//! wires planning to execution and implements error tolerance.

pub mod action;
pub mod sort;

use crate::engine::Engine;
use crate::errors::{BlockplanError, BlockplanResult};
use crate::model::ContainerKind;
use crate::mutate;

pub use action::{CommitAction, Stage, Target, STAGES};

impl Engine {
    /// Apply every pending change to the live system, in the fixed
    /// stage order, loop containers last.
    pub fn commit(&self) -> BlockplanResult<()> {
        self.set_last_action("commit");
        self.set_extended_error(String::new());

        let result = self.commit_pair(sort::not_loop).and_then(|_| self.commit_pair(sort::is_loop));

        if let Err(ref e) = result {
            tracing::warn!(error = %e, "commit failed");
            self.dump_object_list();
        }
        result
    }

    fn commit_pair(&self, selector: impl Fn(ContainerKind) -> bool + Copy) -> BlockplanResult<()> {
        for stage in STAGES {
            self.commit_stage(stage, selector)?;
        }
        Ok(())
    }

    fn commit_stage(&self, stage: Stage, selector: impl Fn(ContainerKind) -> bool) -> BlockplanResult<()> {
        let actions = self.plan_stage(stage, &selector);
        if actions.is_empty() {
            return Ok(());
        }
        tracing::info!(stage = ?stage, count = actions.len(), "executing commit stage");

        let mut index = 0;
        while index < actions.len() {
            if let Err(e) = mutate::commit_action(self, &actions[index]) {
                if !e.is_disk_decrease_superseded() || !sort::ignore_error(index, &actions) {
                    return Err(e);
                }
                tracing::debug!(action = ?actions[index], error = %e, "tolerated commit error");
            }
            index += 1;
        }

        tracing::debug!(stage = ?stage, "re-read device-mapper and partition state after stage");
        Ok(())
    }

    /// Build, sort, and merge the container- and volume-level work lists
    /// for one stage, restricted to containers `selector` accepts.
    fn plan_stage(&self, stage: Stage, selector: &impl Fn(ContainerKind) -> bool) -> Vec<CommitAction> {
        let model = self.model();
        let containers: Vec<&crate::model::Container> = model.containers().iter().filter(|c| !c.deleted && selector(c.kind)).collect();

        let mut pending_containers: Vec<&crate::model::Container> = containers
            .iter()
            .copied()
            .filter(|c| container_is_pending(c, stage))
            .collect();
        sort::sort_containers(stage, &mut pending_containers);
        let container_actions: Vec<CommitAction> = pending_containers
            .iter()
            .map(|c| CommitAction {
                stage,
                kind: c.kind,
                target: Target::Container { name: c.name.clone() },
                destructive: stage == Stage::Decrease,
                description: format!("{stage:?} container {}", c.name),
            })
            .collect();

        let mut pending_volumes: Vec<&crate::model::Volume> = containers
            .iter()
            .flat_map(|c| c.volumes.iter())
            .filter(|v| volume_is_pending(v, stage))
            .collect();
        sort::sort_volumes(stage, &mut pending_volumes, model.containers());
        let volume_actions: Vec<CommitAction> = pending_volumes
            .iter()
            .map(|v| {
                let kind = model.find_container(&v.container_name).map(|c| c.kind).unwrap_or(ContainerKind::Disk);
                CommitAction {
                    stage,
                    kind,
                    target: Target::Volume { container_name: v.container_name.clone(), device: v.device.to_string_lossy().into_owned() },
                    destructive: stage == Stage::Decrease,
                    description: format!("{stage:?} volume {}", v.device.display()),
                }
            })
            .collect();

        sort::merge_and_group(stage, container_actions, volume_actions)
    }
}

fn container_is_pending(c: &crate::model::Container, stage: Stage) -> bool {
    match stage {
        Stage::Decrease => c.deleted,
        Stage::Increase => c.created,
        Stage::Format | Stage::Mount => false,
    }
}

fn volume_is_pending(v: &crate::model::Volume, stage: Stage) -> bool {
    match stage {
        Stage::Decrease => v.pending.delete,
        Stage::Increase => v.pending.create,
        Stage::Format => v.pending.format,
        Stage::Mount => v.pending.mount_change,
    }
}

/// A failure the executor raised that the caller should surface without
/// retrying (kept for symmetry with `errors::BlockplanError::is_disk_decrease_superseded`).
pub fn is_fatal(err: &BlockplanError) -> bool {
    !err.is_disk_decrease_superseded()
}
