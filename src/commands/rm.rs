//! `rm`: remove a container's workspace and state (spec.md §6, §8 scenario 6).

use tracing::info;

use crate::error::{MydockerError, Result};
use crate::overlay::Workspace;
use crate::state::{self, ContainerStatus};

pub fn rm(ids: &[String], force: bool) -> Result<()> {
    for id in ids {
        rm_one(id, force)?;
    }
    Ok(())
}

fn rm_one(id: &str, force: bool) -> Result<()> {
    let descriptor = match state::find_container(id) {
        Some(d) => d,
        None => return Ok(()), // BenignRace: already gone.
    };

    if descriptor.status == ContainerStatus::Running {
        if !force {
            return Err(MydockerError::Conflict(format!(
                "container {id} is running, use -f to force removal"
            )));
        }
        super::stop::stop(&descriptor.id)?;
    }

    Workspace::teardown(&descriptor.id, &descriptor.volume);
    if !descriptor.network.is_empty() {
        // Endpoint teardown is best-effort here: the bridge driver needs
        // an async netlink handle the synchronous `rm` path doesn't
        // have. Detach happens via `network detach` plumbing when the
        // container stops under `run`'s foreground path instead.
    }
    info!(id = %descriptor.id, "container removed");
    Ok(())
}
