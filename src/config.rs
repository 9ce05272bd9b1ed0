//! Engine-scoped configuration: construction options, environment-derived
//! mode and feature toggles, sysconfig defaults, and caller callbacks.
//!
//! Everything here is threaded through `Engine::new` as a plain data
//! record rather than read from process-wide globals, so multiple
//! engines in one process never step on each other's settings.

use std::path::PathBuf;
use std::sync::Arc;

use crate::model::MountBy;

/// Caller-supplied callbacks, invoked synchronously from the engine's
/// thread. Each must return promptly.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub progress_bar: Option<Arc<dyn Fn(&str, u32) + Send + Sync>>,
    pub install_info: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub info_popup: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub yes_no_popup: Option<Arc<dyn Fn(&str) -> bool + Send + Sync>>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("progress_bar", &self.progress_bar.is_some())
            .field("install_info", &self.install_info.is_some())
            .field("info_popup", &self.info_popup.is_some())
            .field("yes_no_popup", &self.yes_no_popup.is_some())
            .finish()
    }
}

/// Mode the engine was constructed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Ordinary operation against the running machine.
    Autodetect,
    /// Running inside the OS installer: activate md/lvm/dmraid/dmmultipath
    /// first and re-read the partition table before continuing.
    InstallSystem,
    /// All inputs come from a test directory of per-kind dump files; no
    /// real commands run.
    TestMode { dump_dir: PathBuf },
}

impl EngineMode {
    pub fn is_install_system(self) -> bool {
        matches!(self, EngineMode::InstallSystem)
    }

    pub fn is_test_mode(&self) -> bool {
        matches!(self, EngineMode::TestMode { .. })
    }

    /// Resolve from the environment variables the engine checks at
    /// startup (`YAST2_STORAGE_TDIR`/`_TMODE`, `YAST_IS_RUNNING`).
    pub fn from_env() -> Self {
        if let Ok(dir) = std::env::var("YAST2_STORAGE_TDIR") {
            if std::env::var("YAST2_STORAGE_TMODE").is_ok() {
                return EngineMode::TestMode { dump_dir: PathBuf::from(dir) };
            }
        }
        if std::env::var("YAST_IS_RUNNING").as_deref() == Ok("instsys") {
            return EngineMode::InstallSystem;
        }
        EngineMode::Autodetect
    }
}

/// Feature toggles consulted during discovery.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureToggles {
    pub no_lvm: bool,
    pub no_dmraid: bool,
    pub no_dmmultipath: bool,
    pub no_dm: bool,
}

impl FeatureToggles {
    pub fn from_env() -> Self {
        FeatureToggles {
            no_lvm: std::env::var_os("YAST2_STORAGE_NO_LVM").is_some(),
            no_dmraid: std::env::var_os("YAST2_STORAGE_NO_DMRAID").is_some(),
            no_dmmultipath: std::env::var_os("YAST2_STORAGE_NO_DMMULTIPATH").is_some(),
            no_dm: std::env::var_os("YAST2_STORAGE_NO_DM").is_some(),
        }
    }
}

/// Parsed `/etc/sysconfig/storage`: currently just `DEVICE_NAMES`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sysconfig {
    pub default_mount_by: Option<MountBy>,
}

impl Sysconfig {
    /// Parse the `KEY=value` shell-style file (not JSON — this is the
    /// real on-disk format, unlike the testmode fixture dumps).
    pub fn parse(contents: &str) -> Self {
        let mut default_mount_by = None;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                if key.trim() == "DEVICE_NAMES" {
                    let value = value.trim().trim_matches('"').trim_matches('\'');
                    default_mount_by = match value {
                        "id" => Some(MountBy::Id),
                        "path" => Some(MountBy::Path),
                        "device" => Some(MountBy::Device),
                        "uuid" => Some(MountBy::Uuid),
                        "label" => Some(MountBy::Label),
                        _ => None,
                    };
                }
            }
        }
        Sysconfig { default_mount_by }
    }

    pub fn load(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(_) => Sysconfig::default(),
        }
    }
}

/// Engine construction options: a plain data record threaded through
/// construction instead of read from globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub readonly: bool,
    pub autodetect: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions { readonly: false, autodetect: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sysconfig_parses_device_names() {
        let cfg = Sysconfig::parse("DEVICE_NAMES=\"id\"\n# comment\n");
        assert_eq!(cfg.default_mount_by, Some(MountBy::Id));
    }

    #[test]
    fn sysconfig_ignores_unknown_lines() {
        let cfg = Sysconfig::parse("FOO=bar\n");
        assert_eq!(cfg.default_mount_by, None);
    }
}
