//! Container init process, PID 1 inside the new namespaces (spec.md §4.H).
//!
//! Mount sequencing mirrors `sbox::mounts::BaseMounts`, pared down to the
//! `proc` + `/dev` pair this spec calls for; the pivot-root dance is new
//! (the teacher never pivots, it mounts onto a prepared rootfs instead).

use std::ffi::CString;
use std::fs;
use std::io::Read;
use std::os::fd::{FromRawFd, RawFd};
use std::path::Path;

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::unistd::{chdir, execvpe, pivot_root};
use tracing::debug;

use crate::error::{MydockerError, Result};

const COMMAND_PIPE_FD: RawFd = 3;

/// Reads the argv line and extra environment from the inherited pipe (fd
/// 3), closing it after the read completes as spec.md §9 requires to
/// avoid a descriptor leak. Wire format: the argv line, then one
/// `KEY=VALUE` entry per remaining line (see `runtime::SpawnedChild::send_command`).
fn read_command_and_env() -> Result<(Vec<String>, Vec<String>)> {
    let mut file = unsafe { fs::File::from_raw_fd(COMMAND_PIPE_FD) };
    let mut buf = String::new();
    file.read_to_string(&mut buf)
        .map_err(|e| MydockerError::system_call("read command pipe", e))?;
    drop(file);
    let mut lines = buf.split('\n');
    let argv = lines
        .next()
        .unwrap_or("")
        .split(' ')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    let env = lines.filter(|l| !l.is_empty()).map(String::from).collect();
    Ok((argv, env))
}

/// Builds the exec environment: the current (inherited) environment with
/// any key the container's `-e` flags override removed, followed by
/// those extra `KEY=VALUE` entries — spec.md §4.I, "inherits environment
/// plus the container's extra environment".
fn build_envp(extra: &[String]) -> Vec<CString> {
    let extra_keys: std::collections::HashSet<&str> =
        extra.iter().filter_map(|e| e.split_once('=').map(|(k, _)| k)).collect();

    let mut envp: Vec<CString> = std::env::vars()
        .filter(|(k, _)| !extra_keys.contains(k.as_str()))
        .map(|(k, v)| CString::new(format!("{k}={v}")).expect("env var contains NUL"))
        .collect();
    envp.extend(extra.iter().map(|e| CString::new(e.as_str()).expect("env var contains NUL")));
    envp
}

fn detach_mount_propagation() -> Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| MydockerError::system_call("mount MS_PRIVATE|MS_REC on /", e))
}

/// Bind-mounts the current directory onto itself, then swaps it in as
/// the new root, leaving the previous root mounted at `.pivot_root` for
/// immediate detach.
fn do_pivot_root() -> Result<()> {
    let cwd = std::env::current_dir().map_err(|e| MydockerError::system_call("getcwd", e))?;
    mount(
        Some(&cwd),
        &cwd,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| MydockerError::system_call(format!("bind-mount {} onto itself", cwd.display()), e))?;

    let pivot_dir = cwd.join(".pivot_root");
    fs::create_dir_all(&pivot_dir)
        .map_err(|e| MydockerError::system_call(format!("mkdir {}", pivot_dir.display()), e))?;

    pivot_root(&cwd, &pivot_dir).map_err(|e| MydockerError::system_call("pivot_root", e))?;

    chdir("/").map_err(|e| MydockerError::system_call("chdir /", e))?;

    let old_root = Path::new("/.pivot_root");
    umount2(old_root, MntFlags::MNT_DETACH)
        .map_err(|e| MydockerError::system_call("umount2 /.pivot_root", e))?;
    fs::remove_dir(old_root).map_err(|e| MydockerError::system_call("rmdir /.pivot_root", e))?;
    Ok(())
}

fn mount_proc_and_dev() -> Result<()> {
    mount(
        Some("proc"),
        "/proc",
        Some("proc"),
        MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
        None::<&str>,
    )
    .map_err(|e| MydockerError::system_call("mount proc", e))?;

    mount(
        Some("tmpfs"),
        "/dev",
        Some("tmpfs"),
        MsFlags::MS_NOSUID | MsFlags::MS_STRICTATIME,
        Some("mode=755"),
    )
    .map_err(|e| MydockerError::system_call("mount tmpfs on /dev", e))
}

/// Entry point for the `init` subcommand: reads argv from the pipe,
/// performs the mount + pivot-root sequence, and execs the user command.
/// On success this never returns.
pub fn run_init() -> Result<()> {
    let (argv, env) = read_command_and_env()?;
    if argv.is_empty() {
        return Err(MydockerError::UserInput("empty command".into()));
    }
    debug!(?argv, ?env, "init: running command");

    detach_mount_propagation()?;
    do_pivot_root()?;
    mount_proc_and_dev()?;

    let program = CString::new(argv[0].as_bytes())
        .map_err(|e| MydockerError::system_call("command contains NUL", std::io::Error::other(e)))?;
    let args: Vec<CString> = argv
        .iter()
        .map(|a| CString::new(a.as_bytes()).unwrap())
        .collect();
    let envp = build_envp(&env);
    execvpe(&program, &args, &envp).map_err(|e| MydockerError::system_call(format!("execve {}", argv[0]), e))?;
    unreachable!("execve replaces the process image on success")
}
