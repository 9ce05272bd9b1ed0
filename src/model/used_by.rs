//! The `usedBy` back-reference.

use serde::{Deserialize, Serialize};

/// The kind of entity that consumes a volume or container in a stacking
/// relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UsedByKind {
    None,
    Md,
    Dm,
    Lvm,
    Dmraid,
    Dmmultipath,
}

/// Set by discovery and by mutations that introduce a stacking
/// relationship. Consulted by the mutation API and the commit planner,
/// but never owned by them: removing the owner must explicitly clear it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedBy {
    pub kind: UsedByKind,
    pub owner_name: String,
    pub owner_device: String,
}

impl UsedBy {
    pub fn none() -> Self {
        UsedBy {
            kind: UsedByKind::None,
            owner_name: String::new(),
            owner_device: String::new(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.kind == UsedByKind::None
    }

    pub fn new(kind: UsedByKind, owner_name: impl Into<String>, owner_device: impl Into<String>) -> Self {
        UsedBy {
            kind,
            owner_name: owner_name.into(),
            owner_device: owner_device.into(),
        }
    }
}

impl Default for UsedBy {
    fn default() -> Self {
        UsedBy::none()
    }
}
