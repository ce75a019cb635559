//! `stop`: SIGTERM a running container (spec.md §6).

use nix::unistd::Pid;
use tracing::info;

use crate::error::{MydockerError, Result};
use crate::runtime;
use crate::state;

pub fn stop(id: &str) -> Result<()> {
    let mut descriptor = state::find_container(id).ok_or_else(|| MydockerError::NotFound(format!("container not found: {id}")))?;
    runtime::stop(Pid::from_raw(descriptor.pid))?;
    descriptor.status = state::ContainerStatus::Stopped;
    descriptor.pid = 0;
    state::save_container(&descriptor)?;
    info!(id = %descriptor.id, "container stopped");
    Ok(())
}
