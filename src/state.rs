//! Container descriptor + state store (spec.md §3, §4.K).

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{MydockerError, Result};
use crate::id::{hash_str, HashInput};
use crate::paths::{self, MODE_0755};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Running,
    Stopped,
    Exited,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContainerStatus::Running => "running",
            ContainerStatus::Stopped => "stopped",
            ContainerStatus::Exited => "exited",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memory_limit: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpus: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu_set: String,
}

/// Fields that seed the container id (spec.md §3: "derived via SHA-256 of
/// a canonical rendering of {name, tty, detach, volume, createAt}").
/// Kept separate from `ContainerDescriptor` so the hash input is fixed
/// regardless of which other fields the descriptor later grows.
pub struct IdSeed<'a> {
    pub name: &'a str,
    pub tty: bool,
    pub detach: bool,
    pub volume: &'a str,
    pub create_at: &'a str,
}

impl HashInput for IdSeed<'_> {
    fn canonical_text(&self) -> String {
        format!(
            "{}\x1f{}\x1f{}\x1f{}\x1f{}",
            self.name, self.tty, self.detach, self.volume, self.create_at
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerDescriptor {
    pub id: String,
    pub name: String,
    #[serde(rename = "imageName")]
    pub image_name: String,
    pub pid: i32,
    pub cmds: Vec<String>,
    pub status: ContainerStatus,
    pub tty: bool,
    pub detach: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub volume: String,
    #[serde(default)]
    pub environment: Vec<String>,
    #[serde(rename = "resourceConfig")]
    pub resource_config: ResourceConfig,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network: String,
    #[serde(default, rename = "portMapping")]
    pub port_mapping: Vec<String>,
    #[serde(rename = "createAt")]
    pub create_at: String,
}

impl ContainerDescriptor {
    /// Builds a new descriptor, deriving its id from the fields the spec
    /// fixes as the hash seed. `pid` starts at 0 (not yet running).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: Option<String>,
        image_name: String,
        cmds: Vec<String>,
        tty: bool,
        detach: bool,
        volume: String,
        environment: Vec<String>,
        resource_config: ResourceConfig,
        network: String,
        port_mapping: Vec<String>,
        create_at: String,
    ) -> Self {
        let seed = IdSeed {
            name: name.as_deref().unwrap_or(""),
            tty,
            detach,
            volume: &volume,
            create_at: &create_at,
        };
        let id = hash_str(&seed);
        let name = name.unwrap_or_else(|| paths::first_n(&id, 12).to_string());
        ContainerDescriptor {
            id,
            name,
            image_name,
            pid: 0,
            cmds,
            status: ContainerStatus::Exited,
            tty,
            detach,
            volume,
            environment,
            resource_config,
            network,
            port_mapping,
            create_at,
        }
    }

    pub fn short_id(&self) -> &str {
        paths::first_n(&self.id, 12)
    }
}

/// Whole-file JSON replacement with mode 0755, per spec.md §4.K.
pub fn write_json<T: Serialize>(path: &std::path::Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| MydockerError::persistence(parent, e))?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| MydockerError::persistence(path, e))?;
    fs::write(path, &bytes).map_err(|e| MydockerError::persistence(path, e))?;
    let mut perms = fs::metadata(path)
        .map_err(|e| MydockerError::persistence(path, e))?
        .permissions();
    use std::os::unix::fs::PermissionsExt;
    perms.set_mode(MODE_0755);
    fs::set_permissions(path, perms).map_err(|e| MydockerError::persistence(path, e))?;
    Ok(())
}

pub fn read_json<T: for<'de> Deserialize<'de>>(path: &std::path::Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| MydockerError::persistence(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| MydockerError::persistence(path, e))
}

pub fn save_container(descriptor: &ContainerDescriptor) -> Result<()> {
    write_json(&paths::container_config_path(&descriptor.id), descriptor)
}

pub fn load_container(path: &std::path::Path) -> Result<ContainerDescriptor> {
    read_json(path)
}

/// Looks up a container by id/short-id/name substring, matching
/// `findJsonFilePath` + `getContainerInfo` in the original.
pub fn find_container(needle: &str) -> Option<ContainerDescriptor> {
    let path = paths::find_json_file(&paths::containers_dir(), needle)?;
    load_container(&path).ok()
}

pub fn list_containers() -> Vec<ContainerDescriptor> {
    paths::walk_json_files(&paths::containers_dir())
        .into_iter()
        .filter_map(|p| load_container(&p).ok())
        .collect()
}

pub fn container_config_json_path(id: &str) -> PathBuf {
    paths::container_config_path(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_id_is_deterministic() {
        let build = || {
            ContainerDescriptor::new(
                Some("demo".into()),
                "busybox".into(),
                vec!["sh".into()],
                true,
                false,
                String::new(),
                vec![],
                ResourceConfig::default(),
                String::new(),
                vec![],
                "2026-01-01 00:00:00".into(),
            )
        };
        assert_eq!(build().id, build().id);
    }

    #[test]
    fn default_name_is_first_twelve_chars_of_id() {
        let c = ContainerDescriptor::new(
            None,
            "busybox".into(),
            vec!["sh".into()],
            true,
            false,
            String::new(),
            vec![],
            ResourceConfig::default(),
            String::new(),
            vec![],
            "2026-01-01 00:00:00".into(),
        );
        assert_eq!(c.name, paths::first_n(&c.id, 12));
    }
}
