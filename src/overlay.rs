//! Overlay workspace manager (spec.md §4.D).
//!
//! Creates the lower/upper/work/merged quartet, untars the base image into
//! `lower`, mounts the overlay at `merged`, and optionally bind-mounts a
//! volume. Adapted from `sbox::OverlayMount`'s mount-data construction,
//! generalized to the single-base-image layout this spec uses instead of
//! an arbitrary lowerdir stack.

use std::path::{Path, PathBuf};
use std::process::Command;

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use tracing::warn;

use crate::error::{MydockerError, Result};
use crate::paths;

pub struct Workspace {
    pub id: String,
    pub lower: PathBuf,
    pub upper: PathBuf,
    pub work: PathBuf,
    pub merged: PathBuf,
    pub volume: Option<(PathBuf, PathBuf)>,
}

fn mkdir_p(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| MydockerError::system_call(format!("mkdir -p {}", path.display()), e))
}

/// Splits a `HOST:CONTAINER` volume spec.
fn parse_volume(volume: &str) -> Result<(PathBuf, PathBuf)> {
    let mut parts = volume.splitn(2, ':');
    let host = parts.next().filter(|s| !s.is_empty());
    let container = parts.next().filter(|s| !s.is_empty());
    match (host, container) {
        (Some(h), Some(c)) => Ok((PathBuf::from(h), PathBuf::from(c))),
        _ => Err(MydockerError::UserInput(format!(
            "volume must be HOST:CONTAINER, got {volume}"
        ))),
    }
}

impl Workspace {
    /// `mkdir -p` is idempotent, so calling this twice for the same id
    /// before any mount has happened succeeds both times (spec.md §8
    /// scenario 5).
    pub fn new_workspace(id: &str, image_name: &str, volume: &str) -> Result<Self> {
        mkdir_p(&paths::containers_dir())?;
        mkdir_p(&paths::overlay_root())?;
        mkdir_p(&paths::image_dir())?;

        let lower = paths::overlay_lower(id);
        let upper = paths::overlay_upper(id);
        let merged = paths::overlay_merged(id);
        let work = paths::overlay_work(id);
        mkdir_p(&lower)?;
        mkdir_p(&upper)?;
        mkdir_p(&merged)?;
        mkdir_p(&work)?;

        let image_tar = paths::image_tar_path(image_name);
        if !image_tar.is_file() {
            return Err(MydockerError::NotFound(format!("image not found: {}", image_tar.display())));
        }
        untar(&image_tar, &lower)?;

        mount_overlay(&lower, &upper, &work, &merged)?;

        let volume = if volume.is_empty() {
            None
        } else {
            let (host, container_rel) = parse_volume(volume)?;
            let container_path = join_container_relative(&merged, &container_rel);
            mkdir_p(&host)?;
            mkdir_p(&container_path)?;
            bind_mount(&host, &container_path)?;
            Some((host, container_path))
        };

        Ok(Workspace {
            id: id.to_string(),
            lower,
            upper,
            work,
            merged,
            volume,
        })
    }

    /// Unmounts bind first, then overlay, then removes the state and fs
    /// directories. Every step is attempted even if an earlier one failed
    /// (spec.md §4.D teardown semantics); errors are logged, not returned.
    pub fn teardown(id: &str, volume: &str) {
        let merged = paths::overlay_merged(id);
        if !volume.is_empty() {
            if let Ok((_, container_rel)) = parse_volume(volume) {
                let container_path = join_container_relative(&merged, &container_rel);
                if let Err(e) = umount2(&container_path, MntFlags::MNT_DETACH) {
                    warn!(path = %container_path.display(), error = %e, "volume unmount failed");
                }
            }
        }
        if let Err(e) = umount2(&merged, MntFlags::MNT_DETACH) {
            warn!(path = %merged.display(), error = %e, "overlay unmount failed");
        }
        if let Err(e) = std::fs::remove_dir_all(paths::container_dir(id)) {
            warn!(id, error = %e, "removing container state dir failed");
        }
        if let Err(e) = std::fs::remove_dir_all(paths::overlay_root().join(id)) {
            warn!(id, error = %e, "removing overlay dirs failed");
        }
    }
}

fn join_container_relative(merged: &Path, container_rel: &Path) -> PathBuf {
    let rel = container_rel.strip_prefix("/").unwrap_or(container_rel);
    merged.join(rel)
}

fn untar(tar_path: &Path, dest: &Path) -> Result<()> {
    let output = Command::new("tar")
        .arg("-xf")
        .arg(tar_path)
        .arg("-C")
        .arg(dest)
        .output()
        .map_err(|e| MydockerError::system_call("spawn tar", e))?;
    if !output.status.success() {
        return Err(MydockerError::system_call(
            "untar image",
            std::io::Error::other(String::from_utf8_lossy(&output.stderr).into_owned()),
        ));
    }
    Ok(())
}

fn mount_overlay(lower: &Path, upper: &Path, work: &Path, merged: &Path) -> Result<()> {
    let data = format!(
        "lowerdir={},upperdir={},workdir={}",
        lower.display(),
        upper.display(),
        work.display()
    );
    mount(
        Some("overlay"),
        merged,
        Some("overlay"),
        MsFlags::empty(),
        Some(data.as_str()),
    )
    .map_err(|e| MydockerError::system_call(format!("mount overlay at {}", merged.display()), e))
}

fn bind_mount(host: &Path, container_path: &Path) -> Result<()> {
    mount(
        Some(host),
        container_path,
        None::<&str>,
        MsFlags::MS_BIND,
        None::<&str>,
    )
    .map_err(|e| MydockerError::system_call(format!("bind mount {} -> {}", host.display(), container_path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_volume_requires_both_sides() {
        assert!(parse_volume("/host:/container").is_ok());
        assert!(parse_volume("/host").is_err());
        assert!(parse_volume(":/container").is_err());
        assert!(parse_volume("/host:").is_err());
    }

    #[test]
    fn join_container_relative_strips_leading_slash() {
        let merged = Path::new("/var/lib/mydocker/overlay2/abc/merged");
        assert_eq!(
            join_container_relative(merged, Path::new("/data")),
            merged.join("data")
        );
    }
}
