//! Parent lifecycle: spawns the init process via `clone3`, hands off its
//! argv over a pipe, and waits or detaches (spec.md §4.I).
//!
//! Grounded on `sbox::tasks::InitTask::start`'s clone3 + pipe handshake,
//! trimmed to the single clone this design needs (no nested cgroup-ns
//! clone, no user namespace) since the child re-execs itself into the
//! `init` subcommand rather than running init logic in-process.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};
use std::path::Path;

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::{chdir, close, dup2, execv, pipe, Pid};
use tracing::debug;

use crate::clone3::{clone3, Clone as CloneOutcome, CloneArgs};
use crate::error::{is_no_such_process, MydockerError, Result};

const COMMAND_PIPE_FD: RawFd = 3;

pub struct SpawnedChild {
    pub pid: Pid,
    command_tx: Option<OwnedFd>,
}

impl SpawnedChild {
    /// Writes the command line and the container's extra environment to
    /// the pipe and closes the write end, unblocking the child's read in
    /// `init::run_init`. Per spec.md §9 the parent must close the write
    /// end or the child deadlocks. Wire format: the argv line, then one
    /// `KEY=VALUE` entry per remaining line.
    pub fn send_command(&mut self, cmds: &[String], env: &[String]) -> Result<()> {
        let tx = self.command_tx.take().expect("send_command called twice");
        let mut file = File::from(tx);
        let mut payload = cmds.join(" ");
        for entry in env {
            payload.push('\n');
            payload.push_str(entry);
        }
        file.write_all(payload.as_bytes())
            .map_err(|e| MydockerError::system_call("write command pipe", e))?;
        Ok(())
        // `file` drops here, closing the write end.
    }
}

/// Spawns the container init process: re-execs `/proc/self/exe init` in
/// new PID/IPC/mount/net/UTS namespaces (no user namespace, per spec.md
/// §9), with its working directory set to `merged` and its stdio wired
/// for foreground or detached operation.
pub fn spawn(merged: &Path, tty: bool, detach: bool, log_path: Option<&Path>) -> Result<SpawnedChild> {
    if tty == detach {
        return Err(MydockerError::UserInput(
            "exactly one of tty or detach must be set".into(),
        ));
    }

    let (rx, tx) = pipe().map_err(|e| MydockerError::system_call("pipe", e))?;

    let log_fd = if detach {
        let path = log_path.expect("detached spawn requires a log path");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| MydockerError::system_call(format!("open log file {}", path.display()), e))?;
        Some(file.into_raw_fd())
    } else {
        None
    };

    let mut clone_args = CloneArgs::default();
    clone_args.flag_newns();
    clone_args.flag_newpid();
    clone_args.flag_newnet();
    clone_args.flag_newipc();
    clone_args.flag_newuts();
    clone_args.exit_signal_sigchld();

    match unsafe { clone3(&clone_args) } {
        Ok(CloneOutcome::Child) => {
            let _ = close(tx.as_raw_fd());
            child_exec(rx.as_raw_fd(), merged, log_fd);
            unreachable!("child_exec never returns")
        }
        Ok(CloneOutcome::Parent(pid)) => {
            let _ = close(rx.as_raw_fd());
            if let Some(fd) = log_fd {
                let _ = close(fd);
            }
            debug!(pid = pid.as_raw(), "container init process cloned");
            Ok(SpawnedChild {
                pid,
                command_tx: Some(tx),
            })
        }
        Err(e) => Err(MydockerError::system_call("clone3", e)),
    }
}

/// Runs entirely inside the freshly cloned child: wires stdio, chdirs
/// into the overlay `merged` directory, moves the pipe read end to fd 3,
/// and execs `/proc/self/exe init`. Never returns.
fn child_exec(rx: RawFd, merged: &Path, log_fd: Option<RawFd>) -> ! {
    let abort = |context: &str| -> ! {
        eprintln!("mydocker: init child failed: {context}");
        unsafe { nix::libc::_exit(1) }
    };

    if let Some(fd) = log_fd {
        if dup2(fd, 0).is_err() || dup2(fd, 1).is_err() || dup2(fd, 2).is_err() {
            abort("dup2 log fd onto stdio");
        }
        let _ = close(fd);
    }

    if rx != COMMAND_PIPE_FD {
        if dup2(rx, COMMAND_PIPE_FD).is_err() {
            abort("dup2 pipe onto fd 3");
        }
        let _ = close(rx);
    }

    if chdir(merged).is_err() {
        abort("chdir into overlay merged directory");
    }

    let exe = match CString::new("/proc/self/exe".as_bytes()) {
        Ok(c) => c,
        Err(_) => abort("build /proc/self/exe CString"),
    };
    let argv = [exe.clone(), CString::new("init".as_bytes()).unwrap()];
    match execv(&exe, &argv) {
        Ok(_) => unreachable!(),
        Err(_) => abort("execv /proc/self/exe init"),
    }
}

/// Waits for a foreground container to exit.
pub fn wait_foreground(pid: Pid) -> Result<()> {
    waitpid(pid, Some(WaitPidFlag::__WALL)).map_err(|e| MydockerError::system_call("waitpid", e))?;
    Ok(())
}

/// Sends SIGTERM; a process that has already exited is treated as
/// success (spec.md §7's BenignRace policy).
pub fn stop(pid: Pid) -> Result<()> {
    match kill(pid, Signal::SIGTERM) {
        Ok(()) => Ok(()),
        Err(e) if is_no_such_process(&e) => Ok(()),
        Err(e) => Err(MydockerError::system_call(format!("kill {pid}"), e)),
    }
}
