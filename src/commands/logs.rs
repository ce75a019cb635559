//! `logs`: dump a detached container's log file (spec.md §6).

use crate::error::{MydockerError, Result};
use crate::paths;
use crate::state;

pub fn logs(id: &str) -> Result<()> {
    let descriptor = state::find_container(id).ok_or_else(|| MydockerError::NotFound(format!("container not found: {id}")))?;
    let log_path = paths::container_log_path(&descriptor.id);
    let contents = std::fs::read_to_string(&log_path).map_err(|e| MydockerError::persistence(log_path, e))?;
    print!("{contents}");
    Ok(())
}
