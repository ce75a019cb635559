//! Cgroups v1 controller adapter (spec.md §4.B).
//!
//! Each controller resolves its absolute mount point by scanning
//! `/proc/self/mountinfo`, the way `sbox::Cgroup::current` resolves the
//! calling process's own cgroup, generalized here to per-controller
//! mount discovery rather than a single unified hierarchy.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use nix::unistd::Pid;
use tracing::debug;

use crate::error::{MydockerError, Result};
use crate::state::ResourceConfig;

const CGROUP_PROCS_FILE: &str = "tasks";

/// Resolves the host mount point for a cgroup v1 controller by scanning
/// `/proc/self/mountinfo` for a line whose comma-separated superblock
/// options include the controller name, taking that line's mount target
/// (field index 4), mirroring the original's `FindCgroupMountpoint`.
pub fn find_cgroup_mountpoint(controller: &str) -> Result<PathBuf> {
    let file = fs::File::open("/proc/self/mountinfo")
        .map_err(|e| MydockerError::system_call("open /proc/self/mountinfo", e))?;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| MydockerError::system_call("read /proc/self/mountinfo", e))?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(opts) = fields.last() else { continue };
        if opts.split(',').any(|opt| opt == controller) {
            if let Some(target) = fields.get(4) {
                return Ok(PathBuf::from(target));
            }
        }
    }
    Err(MydockerError::NotFound(format!(
        "no mountpoint for cgroup controller {controller}"
    )))
}

/// Joins the controller's mount point with a container-relative group
/// path, creating the directory when `auto_create` is set and absent.
pub fn cgroup_path(controller: &str, group_rel_path: &str, auto_create: bool) -> Result<PathBuf> {
    let root = find_cgroup_mountpoint(controller)?;
    let abs_path = root.join(group_rel_path);
    if abs_path.is_dir() {
        return Ok(abs_path);
    }
    if auto_create {
        fs::create_dir_all(&abs_path)
            .map_err(|e| MydockerError::system_call(format!("mkdir {}", abs_path.display()), e))?;
        return Ok(abs_path);
    }
    Err(MydockerError::NotFound(format!(
        "cgroup path does not exist: {}",
        abs_path.display()
    )))
}

fn write_control_file(path: &Path, value: &str) -> Result<()> {
    fs::write(path, value).map_err(|e| MydockerError::system_call(format!("write {}", path.display()), e))
}

/// One per-subsystem adapter: `set`, `apply`, `remove`.
pub trait Subsystem: Send + Sync {
    fn name(&self) -> &'static str;

    fn set(&self, group_rel_path: &str, res: &ResourceConfig) -> Result<()>;

    fn apply(&self, group_rel_path: &str, pid: Pid, res: &ResourceConfig) -> Result<()>;

    fn remove(&self, group_rel_path: &str) -> Result<()>;
}

fn apply_pid(controller: &str, group_rel_path: &str, pid: Pid) -> Result<()> {
    // spec.md §9: autoCreate=false for apply, the group was already
    // created by `set`.
    let path = cgroup_path(controller, group_rel_path, false)?;
    write_control_file(&path.join(CGROUP_PROCS_FILE), &pid.as_raw().to_string())
}

fn remove_group(controller: &str, group_rel_path: &str) -> Result<()> {
    let path = cgroup_path(controller, group_rel_path, false)?;
    debug!(controller, path = %path.display(), "removing cgroup");
    fs::remove_dir_all(&path).map_err(|e| MydockerError::system_call(format!("rmdir {}", path.display()), e))
}

pub struct CpuSubsystem;

impl Subsystem for CpuSubsystem {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn set(&self, group_rel_path: &str, res: &ResourceConfig) -> Result<()> {
        if res.cpus.is_empty() {
            return Ok(());
        }
        let cpus: f64 = res
            .cpus
            .parse()
            .map_err(|_| MydockerError::UserInput(format!("invalid cpu quota: {}", res.cpus)))?;
        let path = cgroup_path(self.name(), group_rel_path, true)?;
        let quota = (100_000.0 * cpus).floor() as i64;
        write_control_file(&path.join("cpu.cfs_quota_us"), &quota.to_string())
    }

    fn apply(&self, group_rel_path: &str, pid: Pid, res: &ResourceConfig) -> Result<()> {
        if res.cpus.is_empty() {
            return Ok(());
        }
        apply_pid(self.name(), group_rel_path, pid)
    }

    fn remove(&self, group_rel_path: &str) -> Result<()> {
        remove_group(self.name(), group_rel_path)
    }
}

pub struct CpusetSubsystem;

impl Subsystem for CpusetSubsystem {
    fn name(&self) -> &'static str {
        "cpuset"
    }

    fn set(&self, group_rel_path: &str, res: &ResourceConfig) -> Result<()> {
        if res.cpu_set.is_empty() {
            return Ok(());
        }
        let path = cgroup_path(self.name(), group_rel_path, true)?;
        write_control_file(&path.join("cpuset.cpus"), &res.cpu_set)
    }

    fn apply(&self, group_rel_path: &str, pid: Pid, res: &ResourceConfig) -> Result<()> {
        if res.cpu_set.is_empty() {
            return Ok(());
        }
        apply_pid(self.name(), group_rel_path, pid)
    }

    fn remove(&self, group_rel_path: &str) -> Result<()> {
        remove_group(self.name(), group_rel_path)
    }
}

pub struct MemorySubsystem;

impl Subsystem for MemorySubsystem {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn set(&self, group_rel_path: &str, res: &ResourceConfig) -> Result<()> {
        if res.memory_limit.is_empty() {
            return Ok(());
        }
        let path = cgroup_path(self.name(), group_rel_path, true)?;
        write_control_file(&path.join("memory.limit_in_bytes"), &res.memory_limit)
    }

    fn apply(&self, group_rel_path: &str, pid: Pid, res: &ResourceConfig) -> Result<()> {
        if res.memory_limit.is_empty() {
            return Ok(());
        }
        apply_pid(self.name(), group_rel_path, pid)
    }

    fn remove(&self, group_rel_path: &str) -> Result<()> {
        remove_group(self.name(), group_rel_path)
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn cpu_quota_uses_fixed_period() {
        // 100000 * 0.5 = 50000, matching spec.md §4.B.
        let cpus: f64 = "0.5".parse().unwrap();
        assert_eq!((100_000.0 * cpus).floor() as i64, 50_000);
    }
}
