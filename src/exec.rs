//! Exec-into-running-container adapter (spec.md §4.J).
//!
//! `setns(CLONE_NEWPID, ...)` requires a single-threaded caller, so the
//! join must happen at the very top of `main`, before a tokio runtime
//! (or anything else) spawns threads. This module is that pre-init
//! branch: gated on the `mydocker_pid`/`mydocker_cmd` re-exec handshake,
//! it joins namespaces and re-execs itself into the plain `exec`
//! subcommand, which then execs the user's command.

use std::ffi::CString;
use std::fs;
use std::os::fd::AsRawFd;

use nix::sched::{setns, CloneFlags};
use nix::unistd::execvpe;

use crate::error::{MydockerError, Result};

pub const PID_ENV: &str = "mydocker_pid";
pub const CMD_ENV: &str = "mydocker_cmd";

/// argv[1] marker for the final exec stage, checked directly against
/// `std::env::args()` before any CLI parsing — this is not a clap
/// subcommand because it must never collide with the user-facing
/// `exec <id> <argv...>` command.
pub const FINAL_EXEC_MARKER: &str = "__mydocker_exec_child__";

/// True when this process is the re-exec'd namespace-join helper.
pub fn is_join_handshake() -> bool {
    std::env::var_os(PID_ENV).is_some()
}

const NAMESPACE_ORDER: &[(&str, CloneFlags)] = &[
    ("ipc", CloneFlags::CLONE_NEWIPC),
    ("uts", CloneFlags::CLONE_NEWUTS),
    ("net", CloneFlags::CLONE_NEWNET),
    ("pid", CloneFlags::CLONE_NEWPID),
    ("mnt", CloneFlags::CLONE_NEWNS),
];

/// Runs the pre-init join: must be called before any other thread
/// exists in this process. On success this never returns — it execs
/// `/proc/self/exe exec`, which performs the final exec into the user
/// command.
pub fn run_join_and_reexec() -> Result<()> {
    let pid = std::env::var(PID_ENV).map_err(|_| MydockerError::UserInput(format!("{PID_ENV} not set")))?;
    let cmd = std::env::var(CMD_ENV).map_err(|_| MydockerError::UserInput(format!("{CMD_ENV} not set")))?;

    for (kind, flag) in NAMESPACE_ORDER {
        let path = format!("/proc/{pid}/ns/{kind}");
        let file = fs::File::open(&path).map_err(|e| MydockerError::system_call(format!("open {path}"), e))?;
        setns(file.as_raw_fd(), *flag).map_err(|e| MydockerError::system_call(format!("setns {kind}"), e))?;
    }

    let environ = target_environ(&pid)?;
    let exe = CString::new("/proc/self/exe").unwrap();
    let argv = [exe.clone(), CString::new(FINAL_EXEC_MARKER).unwrap(), CString::new(cmd).unwrap()];
    execvpe(&exe, &argv, &environ).map_err(|e| MydockerError::system_call("execve /proc/self/exe exec", e))?;
    unreachable!("execve replaces the process image on success")
}

/// Performs the final exec of the user's command once namespaces have
/// been joined and `/proc/self/exe exec` has re-entered as a fresh,
/// single-purpose process.
pub fn run_final_exec(cmd: &str) -> Result<()> {
    let parts: Vec<&str> = cmd.split(' ').filter(|s| !s.is_empty()).collect();
    if parts.is_empty() {
        return Err(MydockerError::UserInput("empty exec command".into()));
    }
    let argv: Vec<CString> = parts.iter().map(|p| CString::new(*p).unwrap()).collect();
    nix::unistd::execvp(&argv[0], &argv).map_err(|e| MydockerError::system_call(format!("execve {}", parts[0]), e))?;
    unreachable!("execve replaces the process image on success")
}

/// Reads `/proc/<pid>/environ`, splitting on NUL. The file conventionally
/// ends with a NUL, which would otherwise yield one trailing empty
/// string; that entry is dropped (spec.md §9 leaves this choice to the
/// implementer).
fn target_environ(pid: &str) -> Result<Vec<CString>> {
    let path = format!("/proc/{pid}/environ");
    let raw = fs::read(&path).map_err(|e| MydockerError::system_call(format!("read {path}"), e))?;
    Ok(raw
        .split(|&b| b == 0)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| CString::new(chunk).expect("proc environ entries are NUL-free once split"))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_order_matches_spec() {
        let kinds: Vec<&str> = NAMESPACE_ORDER.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, ["ipc", "uts", "net", "pid", "mnt"]);
    }
}
