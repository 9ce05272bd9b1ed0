//! `blockplan`: topology model, discovery, staged commit engine, and
//! backup/restore for system storage configuration.
//!
//! The crate is organized around the stages of the control flow:
//! [`ids`] and [`model`] are the pure data layer; [`discovery`]
//! populates the model; [`mutate`] stages changes to it; [`commit`]
//! plans and executes those changes against the live system through
//! [`syscmd`]; [`backup`] snapshots and restores the model; [`freeinfo`]
//! caches per-device resize headroom. [`engine`] ties all of it
//! together behind one cloneable handle.

pub mod backup;
pub mod commit;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod errors;
pub mod freeinfo;
pub mod ids;
pub mod lock;
pub mod model;
pub mod mutate;
pub mod syscmd;

pub use backup::BackupStore;
pub use config::{Callbacks, EngineMode, EngineOptions, FeatureToggles, Sysconfig};
pub use engine::{open_engine, Engine};
pub use errors::{BlockplanError, BlockplanResult};
pub use freeinfo::FreeInfo;
pub use model::{Container, ContainerKind, TopologyModel, Volume};
pub use syscmd::{RealSystemCommand, SystemCommand};
