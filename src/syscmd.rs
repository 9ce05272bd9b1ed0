//! The external-command capability.
//!
//! Everything the core doesn't implement itself — partitioners, `mkfs`,
//! `mount`, LVM/`mdadm`/device-mapper tools, `losetup`, `dd`, `blkid`,
//! `udevadm settle`, `ntfsresize`, NFS probing — is reached through this
//! single trait. Gating every external call behind one capability (rather
//! than three call sites per kind) lets tests substitute a scripted fake
//! deterministically; discovery's `testmode` path is this trait's
//! canonical consumer.
//!
//! The engine is single-threaded cooperative: there are no suspension
//! points in the model-manipulation layer, only synchronous blocking on
//! the calling thread.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::{BlockplanError, BlockplanResult};

/// The result of running an external command: exit status plus captured
/// stdout/stderr, enough for callers to parse tool-specific output (e.g.
/// `ntfsresize -f -i`'s "might resize at <n>" line).
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    pub fn ok(self) -> BlockplanResult<CommandOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(BlockplanError::CommandFailed(format!(
                "exit {}: {}",
                self.status,
                self.stderr.trim()
            )))
        }
    }
}

/// Everything the core needs from the outside world, synchronously.
///
/// Implementations block the calling thread; the engine never polls or
/// suspends around one of these calls.
pub trait SystemCommand: Send + Sync {
    /// Run an argv-style command and capture its result.
    fn run(&self, argv: &[&str]) -> BlockplanResult<CommandOutput>;

    /// `mount(2)`-equivalent, with the same `(source, target, fstype,
    /// options)` shape as the real syscall so the freeinfo probe
    /// can issue transient mounts without going through a shell.
    fn mount(&self, source: &Path, target: &Path, fs_kind: &str, options: &str) -> BlockplanResult<()>;

    fn umount(&self, target: &Path) -> BlockplanResult<()>;

    /// `statvfs(2)`-equivalent: `(block_size, blocks, blocks_free,
    /// blocks_avail)`.
    fn statvfs(&self, path: &Path) -> BlockplanResult<(u64, u64, u64, u64)>;

    /// Whether `path` exists, for the free-space probe's Windows/EFI
    /// heuristics and for `removeFileLoop`'s optional
    /// backing-file deletion.
    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn remove_file(&self, path: &Path) -> BlockplanResult<()>;

    fn zero_device(&self, device: &Path, count_kb: u64) -> BlockplanResult<()>;

    /// Block until the given device node appears (or times out), the way
    /// `udevadm settle` plus a stat-retry loop does in the real engine.
    fn wait_for_device(&self, device: &Path) -> BlockplanResult<()>;

    /// Send SIGSTOP/SIGCONT to suspend or resume the hardware-abstraction
    /// daemon around a commit, if one is being tracked.
    fn suspend_hald(&self) -> BlockplanResult<()> {
        Ok(())
    }
    fn resume_hald(&self) -> BlockplanResult<()> {
        Ok(())
    }
}

/// The real implementation: shells out via `std::process::Command` and
/// the `nix`/`libc` syscalls directly.
pub struct RealSystemCommand {
    hald_pid: Option<u32>,
}

impl RealSystemCommand {
    pub fn new() -> Self {
        RealSystemCommand { hald_pid: None }
    }

    pub fn with_hald_pid(hald_pid: Option<u32>) -> Self {
        RealSystemCommand { hald_pid }
    }
}

impl Default for RealSystemCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCommand for RealSystemCommand {
    fn run(&self, argv: &[&str]) -> BlockplanResult<CommandOutput> {
        let (prog, args) = argv.split_first().ok_or_else(|| BlockplanError::CommandFailed("empty argv".into()))?;
        tracing::debug!(cmd = %argv.join(" "), "running system command");
        let output = std::process::Command::new(prog).args(args).output()?;
        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn mount(&self, source: &Path, target: &Path, fs_kind: &str, options: &str) -> BlockplanResult<()> {
        use nix::mount::{mount, MsFlags};
        let fstype = if fs_kind.is_empty() { None } else { Some(fs_kind) };
        let data = if options.is_empty() { None } else { Some(options) };
        mount(Some(source), target, fstype, MsFlags::empty(), data)
            .map_err(|e| BlockplanError::CommandFailed(format!("mount {source:?} -> {target:?}: {e}")))
    }

    fn umount(&self, target: &Path) -> BlockplanResult<()> {
        nix::mount::umount(target).map_err(|e| BlockplanError::CommandFailed(format!("umount {target:?}: {e}")))
    }

    fn statvfs(&self, path: &Path) -> BlockplanResult<(u64, u64, u64, u64)> {
        let stat = nix::sys::statvfs::statvfs(path).map_err(|e| BlockplanError::CommandFailed(format!("statvfs {path:?}: {e}")))?;
        Ok((stat.fragment_size(), stat.blocks(), stat.blocks_free(), stat.blocks_available()))
    }

    fn remove_file(&self, path: &Path) -> BlockplanResult<()> {
        std::fs::remove_file(path).map_err(BlockplanError::from)
    }

    fn zero_device(&self, device: &Path, count_kb: u64) -> BlockplanResult<()> {
        self.run(&[
            "dd",
            "if=/dev/zero",
            &format!("of={}", device.display()),
            "bs=1024",
            &format!("count={count_kb}"),
        ])?
        .ok()
        .map(|_| ())
        .map_err(|_| BlockplanError::ZeroDeviceFailed(device.display().to_string()))
    }

    fn wait_for_device(&self, device: &Path) -> BlockplanResult<()> {
        let _ = self.run(&["udevadm", "settle"]);
        for _ in 0..50 {
            if device.exists() {
                return Ok(());
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        Err(BlockplanError::DeviceNodeNotFound(device.display().to_string()))
    }

    fn suspend_hald(&self) -> BlockplanResult<()> {
        if let Some(pid) = self.hald_pid {
            let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), nix::sys::signal::Signal::SIGSTOP);
        }
        Ok(())
    }

    fn resume_hald(&self) -> BlockplanResult<()> {
        if let Some(pid) = self.hald_pid {
            let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), nix::sys::signal::Signal::SIGCONT);
        }
        Ok(())
    }
}

/// A scripted fake for `testmode` and for unit tests: records every call
/// it receives and returns canned results, never touching the real
/// system.
#[derive(Default)]
pub struct FakeSystemCommand {
    pub calls: parking_lot::Mutex<Vec<String>>,
    pub scripted_outputs: HashMap<String, CommandOutput>,
    pub existing_paths: parking_lot::Mutex<Vec<PathBuf>>,
}

impl FakeSystemCommand {
    pub fn new() -> Self {
        FakeSystemCommand::default()
    }

    pub fn with_output(mut self, argv_joined: &str, output: CommandOutput) -> Self {
        self.scripted_outputs.insert(argv_joined.to_string(), output);
        self
    }
}

impl SystemCommand for FakeSystemCommand {
    fn run(&self, argv: &[&str]) -> BlockplanResult<CommandOutput> {
        let joined = argv.join(" ");
        self.calls.lock().push(joined.clone());
        Ok(self.scripted_outputs.get(&joined).cloned().unwrap_or_default())
    }

    fn mount(&self, source: &Path, target: &Path, _fs_kind: &str, _options: &str) -> BlockplanResult<()> {
        self.calls.lock().push(format!("mount {} {}", source.display(), target.display()));
        Ok(())
    }

    fn umount(&self, target: &Path) -> BlockplanResult<()> {
        self.calls.lock().push(format!("umount {}", target.display()));
        Ok(())
    }

    fn statvfs(&self, _path: &Path) -> BlockplanResult<(u64, u64, u64, u64)> {
        Ok((4096, 1_000_000, 500_000, 500_000))
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.existing_paths.lock().iter().any(|p| p == path)
    }

    fn remove_file(&self, path: &Path) -> BlockplanResult<()> {
        self.calls.lock().push(format!("rm {}", path.display()));
        Ok(())
    }

    fn zero_device(&self, device: &Path, count_kb: u64) -> BlockplanResult<()> {
        self.calls.lock().push(format!("zero {} {count_kb}", device.display()));
        Ok(())
    }

    fn wait_for_device(&self, device: &Path) -> BlockplanResult<()> {
        self.calls.lock().push(format!("wait-for {}", device.display()));
        Ok(())
    }
}
