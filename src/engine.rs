//! The engine: construction, the process lock, the tempdir, cache-changes
//! mode, and callbacks, tying the topology model, discovery, the commit
//! executor, and the system-command capability together behind one
//! handle.
//!
//! A small `Clone`-able handle wrapping an `Arc<Inner>`, with each piece
//! of mutable state behind its own lock rather than one big lock around
//! everything.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tempfile::TempDir;

use crate::backup::BackupStore;
use crate::config::{Callbacks, EngineMode, EngineOptions, FeatureToggles, Sysconfig};
use crate::errors::{BlockplanError, BlockplanResult};
use crate::freeinfo::FreeInfoCache;
use crate::lock::{LockMode, ProcessLock};
use crate::model::TopologyModel;
use crate::syscmd::SystemCommand;

/// Shared, cloneable handle to the storage engine. All clones share the
/// same state; the process lock and tempdir live as long as the last
/// clone does.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

pub(crate) struct EngineInner {
    pub(crate) model: RwLock<TopologyModel>,
    pub(crate) backups: RwLock<BackupStore>,
    pub(crate) free_info: RwLock<FreeInfoCache>,
    pub(crate) syscmd: Arc<dyn SystemCommand>,
    pub(crate) options: EngineOptions,
    pub(crate) mode: EngineMode,
    pub(crate) toggles: FeatureToggles,
    pub(crate) sysconfig: Sysconfig,
    pub(crate) callbacks: Callbacks,
    pub(crate) cache_changes: AtomicBool,
    pub(crate) tempdir: TempDir,
    pub(crate) _lock: ProcessLock,
    pub(crate) last_action: RwLock<String>,
    pub(crate) extended_error: RwLock<String>,
    pub(crate) root_mounted: AtomicBool,
    pub(crate) initialized: AtomicBool,
}

impl Engine {
    /// Construct a new engine: acquires the process-wide advisory lock,
    /// creates the unique tempdir, and runs discovery to populate the
    /// topology model.
    pub fn new(options: EngineOptions, syscmd: Arc<dyn SystemCommand>, lock_path: &std::path::Path) -> BlockplanResult<Self> {
        let lock_mode = if options.readonly { LockMode::Shared } else { LockMode::Exclusive };
        let lock = ProcessLock::acquire(lock_path, lock_mode)?;
        let tempdir = TempDir::new()?;
        let mode = EngineMode::from_env();
        let toggles = FeatureToggles::from_env();
        let sysconfig = Sysconfig::load(std::path::Path::new("/etc/sysconfig/storage"));

        let inner = EngineInner {
            model: RwLock::new(TopologyModel::new()),
            backups: RwLock::new(BackupStore::new()),
            free_info: RwLock::new(FreeInfoCache::new()),
            syscmd,
            options,
            mode,
            toggles,
            sysconfig,
            callbacks: Callbacks::default(),
            cache_changes: AtomicBool::new(false),
            tempdir,
            _lock: lock,
            last_action: RwLock::new(String::new()),
            extended_error: RwLock::new(String::new()),
            root_mounted: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
        };

        let engine = Engine { inner: Arc::new(inner) };
        crate::discovery::run(&engine)?;
        engine.inner.initialized.store(true, Ordering::SeqCst);
        Ok(engine)
    }

    pub fn tempdir(&self) -> &std::path::Path {
        self.inner.tempdir.path()
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.options.readonly
    }

    pub fn mode(&self) -> &EngineMode {
        &self.inner.mode
    }

    pub fn toggles(&self) -> FeatureToggles {
        self.inner.toggles
    }

    pub fn sysconfig(&self) -> Sysconfig {
        self.inner.sysconfig
    }

    pub fn callbacks(&self) -> &Callbacks {
        &self.inner.callbacks
    }

    pub fn syscmd(&self) -> &Arc<dyn SystemCommand> {
        &self.inner.syscmd
    }

    pub fn model(&self) -> parking_lot::RwLockReadGuard<'_, TopologyModel> {
        self.inner.model.read()
    }

    pub fn model_mut(&self) -> parking_lot::RwLockWriteGuard<'_, TopologyModel> {
        self.inner.model.write()
    }

    pub fn last_action(&self) -> String {
        self.inner.last_action.read().clone()
    }

    pub fn extended_error(&self) -> String {
        self.inner.extended_error.read().clone()
    }

    pub(crate) fn set_last_action(&self, text: impl Into<String>) {
        *self.inner.last_action.write() = text.into();
    }

    pub(crate) fn set_extended_error(&self, text: impl Into<String>) {
        *self.inner.extended_error.write() = text.into();
    }

    /// Every mutation asserts the engine has finished construction
    /// (discovery has run) before touching the model.
    pub(crate) fn assert_init(&self) -> BlockplanResult<()> {
        if self.inner.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BlockplanError::MemoryExhausted)
        }
    }

    /// A dedicated error code if the engine is read-only.
    pub(crate) fn check_readonly(&self) -> BlockplanResult<()> {
        if self.inner.options.readonly {
            Err(BlockplanError::ChangeReadonly)
        } else {
            Ok(())
        }
    }

    /// Cache-changes mode: when enabled,
    /// mutations only update the model; the caller commits explicitly.
    pub fn set_cache_changes(&self, enabled: bool) {
        self.inner.cache_changes.store(enabled, Ordering::SeqCst);
    }

    pub fn cache_changes(&self) -> bool {
        self.inner.cache_changes.load(Ordering::SeqCst)
    }

    /// Auto-commits if caching is disabled; called at the end of every
    /// mutation.
    pub(crate) fn check_cache(&self) -> BlockplanResult<()> {
        if self.cache_changes() {
            Ok(())
        } else {
            self.commit()
        }
    }

    /// Called once the real root filesystem is mounted during
    /// installation, so MD/LVM/DM removal can bypass the usual
    /// root-mount safety checks for devices now known to be safe to tear
    /// down.
    pub fn root_mounted(&self) {
        self.inner.root_mounted.store(true, Ordering::SeqCst);
    }

    pub fn is_root_mounted(&self) -> bool {
        self.inner.root_mounted.load(Ordering::SeqCst)
    }

    pub(crate) fn invalidate_free_info(&self, device: &str) {
        self.inner.free_info.write().invalidate(device);
    }

    pub fn backups(&self) -> parking_lot::RwLockReadGuard<'_, BackupStore> {
        self.inner.backups.read()
    }

    pub fn backups_mut(&self) -> parking_lot::RwLockWriteGuard<'_, BackupStore> {
        self.inner.backups.write()
    }

    /// Structured dump of every container/volume's pending flags, logged
    /// when `commit()` fails.
    pub(crate) fn dump_object_list(&self) {
        let model = self.model();
        for c in model.containers() {
            tracing::warn!(
                container = %c.name,
                kind = ?c.kind,
                created = c.created,
                deleted = c.deleted,
                "pending container state after failed commit"
            );
            for v in &c.volumes {
                tracing::warn!(
                    volume = %v.device.display(),
                    create = v.pending.create,
                    format = v.pending.format,
                    resize = v.pending.resize,
                    delete = v.pending.delete,
                    mount_change = v.pending.mount_change,
                    "pending volume state after failed commit"
                );
            }
        }
    }
}

/// A factory returning either a ready engine handle, or the PID of the
/// process holding a conflicting lock.
pub fn open_engine(options: EngineOptions, syscmd: Arc<dyn SystemCommand>, lock_path: PathBuf) -> Result<Engine, u32> {
    match Engine::new(options, syscmd, &lock_path) {
        Ok(engine) => Ok(engine),
        Err(BlockplanError::Lock { pid }) => Err(pid),
        Err(other) => {
            tracing::error!(error = %other, "failed to construct storage engine");
            Err(0)
        }
    }
}
