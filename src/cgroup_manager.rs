//! Fan-out across cgroup controllers (spec.md §4.C).

use nix::unistd::Pid;
use tracing::warn;

use crate::cgroup::{CpuSubsystem, CpusetSubsystem, MemorySubsystem, Subsystem};
use crate::error::Result;
use crate::state::ResourceConfig;

pub struct CgroupManager {
    group_rel_path: String,
    subsystems: Vec<Box<dyn Subsystem>>,
}

impl CgroupManager {
    pub fn new(group_rel_path: impl Into<String>) -> Self {
        Self {
            group_rel_path: group_rel_path.into(),
            subsystems: vec![
                Box::new(CpuSubsystem),
                Box::new(MemorySubsystem),
                Box::new(CpusetSubsystem),
            ],
        }
    }

    pub fn set(&self, res: &ResourceConfig) -> Result<()> {
        for sub in &self.subsystems {
            sub.set(&self.group_rel_path, res)?;
        }
        Ok(())
    }

    pub fn apply(&self, pid: Pid, res: &ResourceConfig) -> Result<()> {
        for sub in &self.subsystems {
            sub.apply(&self.group_rel_path, pid, res)?;
        }
        Ok(())
    }

    /// Removes every controller's group. Every controller is attempted
    /// even if an earlier one failed (spec.md §9: "the design chooses
    /// full iteration"); the first error encountered is returned.
    pub fn destroy(&self) -> Result<()> {
        let mut first_err = None;
        for sub in &self.subsystems {
            if let Err(e) = sub.remove(&self.group_rel_path) {
                warn!(controller = sub.name(), error = %e, "cgroup teardown failed, continuing");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
