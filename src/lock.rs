//! The process-wide advisory lock.
//!
//! Uses an `flock`-based lock file holding the owning PID, with liveness
//! checked against `/proc` so a stale lock left by a crashed process
//! doesn't wedge the next run.
//!
//! Only one exclusive instance may exist at a time; multiple read-only
//! instances may coexist with at most one exclusive one.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::errors::{BlockplanError, BlockplanResult};

/// Kind of lock acquired at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

pub struct ProcessLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl ProcessLock {
    /// Acquire the lock at `path`, failing with
    /// [`BlockplanError::Lock`] carrying the competing PID if another
    /// process already holds an incompatible lock.
    pub fn acquire(path: &Path, mode: LockMode) -> BlockplanResult<Self> {
        let mut file = OpenOptions::new().create(true).read(true).write(true).open(path)?;

        let flock_flags = match mode {
            LockMode::Shared => libc::LOCK_SH | libc::LOCK_NB,
            LockMode::Exclusive => libc::LOCK_EX | libc::LOCK_NB,
        };

        // SAFETY: `file` stays open for the duration of the flock call and
        // for the lifetime of the returned `ProcessLock`.
        let rc = unsafe { libc::flock(std::os::unix::io::AsRawFd::as_raw_fd(&file), flock_flags) };
        if rc != 0 {
            let pid = read_pid(&mut file).unwrap_or(0);
            if pid != 0 && is_process_alive(pid) {
                return Err(BlockplanError::Lock { pid });
            }
            // Stale lock: the recorded PID is gone. Try once more, this
            // time without NB so we don't spin, then proceed — a crashed
            // holder cannot be holding flock anyway, so the first call
            // failing while the PID is dead means we raced a close(); a
            // second attempt should succeed immediately.
            let rc2 = unsafe { libc::flock(std::os::unix::io::AsRawFd::as_raw_fd(&file), flock_flags) };
            if rc2 != 0 {
                return Err(BlockplanError::Lock { pid });
            }
        }

        write_pid(&mut file, std::process::id())?;
        tracing::debug!(path = %path.display(), mode = ?mode, "acquired storage process lock");
        Ok(ProcessLock { file, path: path.to_path_buf(), mode })
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        unsafe {
            libc::flock(std::os::unix::io::AsRawFd::as_raw_fd(&self.file), libc::LOCK_UN);
        }
        tracing::debug!(path = %self.path.display(), "released storage process lock");
    }
}

fn read_pid(file: &mut File) -> BlockplanResult<u32> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)?;
    Ok(buf.trim().parse().unwrap_or(0))
}

fn write_pid(file: &mut File, pid: u32) -> BlockplanResult<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{pid}")?;
    file.flush()?;
    Ok(())
}

/// Check if a process with the given PID exists, via a null signal.
pub fn is_process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_process_alive_current() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn is_process_alive_bogus_pid() {
        assert!(!is_process_alive(999_999_999));
    }

    #[test]
    fn exclusive_lock_conflicts_with_second_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock");
        let first = ProcessLock::acquire(&path, LockMode::Exclusive).unwrap();
        assert_eq!(first.mode(), LockMode::Exclusive);
        let second = ProcessLock::acquire(&path, LockMode::Exclusive);
        assert!(second.is_err());
    }
}
