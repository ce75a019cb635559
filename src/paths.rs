//! Deterministic per-container paths and the fixed on-disk layout
//! (spec.md §6). `home_dir` is the one piece of "configuration" this
//! crate has: overridable via `MYDOCKER_HOME` so tests don't need root.

use std::path::{Path, PathBuf};

pub const DEFAULT_HOME: &str = "/var/lib/mydocker";
pub const MODE_0755: u32 = 0o755;

pub fn home_dir() -> PathBuf {
    match std::env::var_os("MYDOCKER_HOME") {
        Some(v) => PathBuf::from(v),
        None => PathBuf::from(DEFAULT_HOME),
    }
}

pub fn containers_dir() -> PathBuf {
    home_dir().join("containers")
}

pub fn container_dir(id: &str) -> PathBuf {
    containers_dir().join(id)
}

pub fn container_config_path(id: &str) -> PathBuf {
    container_dir(id).join("config.json")
}

pub fn container_log_path(id: &str) -> PathBuf {
    container_dir(id).join(format!("{id}.log"))
}

pub fn image_dir() -> PathBuf {
    home_dir().join("image")
}

pub fn image_tar_path(name: &str) -> PathBuf {
    image_dir().join(format!("{name}.tar"))
}

pub fn overlay_root() -> PathBuf {
    home_dir().join("overlay2")
}

pub fn overlay_lower(id: &str) -> PathBuf {
    overlay_root().join(id).join("lower")
}

pub fn overlay_upper(id: &str) -> PathBuf {
    overlay_root().join(id).join("upper")
}

pub fn overlay_work(id: &str) -> PathBuf {
    overlay_root().join(id).join("work")
}

pub fn overlay_merged(id: &str) -> PathBuf {
    overlay_root().join(id).join("merged")
}

pub fn network_dir() -> PathBuf {
    home_dir().join("network")
}

pub fn network_descriptor_dir() -> PathBuf {
    network_dir().join("network")
}

pub fn network_descriptor_path(name: &str) -> PathBuf {
    network_descriptor_dir().join(format!("{name}.json"))
}

pub fn ipam_dir() -> PathBuf {
    network_dir().join("ipam")
}

pub fn ipam_state_path() -> PathBuf {
    ipam_dir().join("subnet.json")
}

/// Safe truncation: never panics if `id` is shorter than `n`.
pub fn first_n(id: &str, n: usize) -> &str {
    match id.char_indices().nth(n) {
        Some((byte_idx, _)) => &id[..byte_idx],
        None => id,
    }
}

/// Recursive walk collecting every `.json` file under `dir`.
pub fn walk_json_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    walk_json_files_into(dir, &mut out);
    out
}

fn walk_json_files_into(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_json_files_into(&path, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            out.push(path);
        }
    }
}

/// Finds the unique `.json` file under `dir` whose path contains `needle`
/// (enables short-ID lookup), mirroring the original's
/// `findJsonFilePath`/substring-match discovery.
pub fn find_json_file(dir: &Path, needle: &str) -> Option<PathBuf> {
    walk_json_files(dir)
        .into_iter()
        .find(|p| p.to_string_lossy().contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_n_truncates_safely() {
        assert_eq!(first_n("abcdef", 3), "abc");
        assert_eq!(first_n("ab", 5), "ab");
        assert_eq!(first_n("", 5), "");
    }
}
