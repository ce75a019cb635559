//! `commit`: tar a container's merged filesystem into a new image
//! (spec.md §6).

use std::process::Command;

use crate::error::{MydockerError, Result};
use crate::paths;
use crate::state;

pub fn commit(id: &str, image_name: &str) -> Result<()> {
    let descriptor = state::find_container(id).ok_or_else(|| MydockerError::NotFound(format!("container not found: {id}")))?;
    let merged = paths::overlay_merged(&descriptor.id);
    let image_dir = paths::image_dir();
    std::fs::create_dir_all(&image_dir).map_err(|e| MydockerError::system_call(format!("mkdir {}", image_dir.display()), e))?;
    let tar_path = paths::image_tar_path(image_name);

    let output = Command::new("tar")
        .arg("-cf")
        .arg(&tar_path)
        .arg("-C")
        .arg(&merged)
        .arg(".")
        .output()
        .map_err(|e| MydockerError::system_call("spawn tar", e))?;
    if !output.status.success() {
        return Err(MydockerError::system_call(
            "commit image",
            std::io::Error::other(String::from_utf8_lossy(&output.stderr).into_owned()),
        ));
    }
    Ok(())
}
