//! Preset/state path construction: plugin state is written under `<dir>/effect-<id>[/<relative>]`, with parent
//! directories created on demand. This module only builds and ensures the path; the actual
//! serialization is the plugin's own state interface (out of scope).

use std::path::{Path, PathBuf};

use crate::error::{HostError, HostResult};

/// Builds `<dir>/effect-<id>[/<relative>]`, matching the original's naming convention exactly.
pub fn instance_state_dir(dir: &Path, instance_id: i32) -> PathBuf {
    dir.join(format!("effect-{instance_id}"))
}

pub fn instance_state_path(dir: &Path, instance_id: i32, relative: &str) -> PathBuf {
    instance_state_dir(dir, instance_id).join(relative)
}

/// Ensures the instance's state directory (and any intermediate components of `relative`) exist,
/// returning the full path ready to be written to. Called by `preset_save` before handing the
/// path to the plugin's state interface.
pub fn ensure_state_path(dir: &Path, instance_id: i32, relative: &str) -> HostResult<PathBuf> {
    let path = instance_state_path(dir, instance_id, relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|_| HostError::MemoryAllocation)?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_expected_layout() {
        let dir = Path::new("/tmp/mod-host-presets");
        assert_eq!(
            instance_state_path(dir, 7, "state.ttl"),
            PathBuf::from("/tmp/mod-host-presets/effect-7/state.ttl")
        );
    }

    #[test]
    fn ensure_state_path_creates_parent_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let path = ensure_state_path(tmp.path(), 3, "nested/state.ttl").unwrap();
        assert!(path.parent().unwrap().is_dir());
    }
}
