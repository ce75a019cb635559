//! User-facing half of `exec` (spec.md §4.J): reads the container
//! descriptor, sets the re-exec handshake env vars, and re-execs itself.
//! The pre-init branch that actually performs the `setns` join lives in
//! `crate::exec` and runs before this command dispatch is ever reached.

use std::os::unix::process::CommandExt;

use crate::error::{MydockerError, Result};
use crate::exec::{CMD_ENV, PID_ENV};
use crate::state::{self, ContainerStatus};

pub fn exec(id: &str, argv: &[String]) -> Result<()> {
    let descriptor = state::find_container(id).ok_or_else(|| MydockerError::NotFound(format!("container not found: {id}")))?;
    if descriptor.status != ContainerStatus::Running {
        return Err(MydockerError::Conflict(format!("container {id} is not running")));
    }
    if argv.is_empty() {
        return Err(MydockerError::UserInput("exec requires a command".into()));
    }

    let exe = std::env::current_exe().map_err(|e| MydockerError::system_call("current_exe", e))?;
    let err = std::process::Command::new(exe)
        .env(PID_ENV, descriptor.pid.to_string())
        .env(CMD_ENV, argv.join(" "))
        .exec();
    Err(MydockerError::system_call("re-exec for namespace join", err))
}
