//! Keyed license file lookup: a plugin that declares a license requirement is checked against
//! `$MOD_KEYS_PATH/<sha1(license_uri)>`. This is a real, minimal implementation (a SHA-1 digest
//! plus a file probe) — not a stub — but the cryptographic/licensing business logic beyond "does
//! a same-named file exist" is out of scope here.

use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

use crate::error::HostError;

/// Environment variable naming the license key directory, consulted when `HostConfig`'s
/// `keys_path` override isn't set.
pub const MOD_KEYS_PATH_VAR: &str = "MOD_KEYS_PATH";

/// Hex-encodes the SHA-1 digest of `license_uri`, matching the original's key filename scheme.
pub fn key_filename(license_uri: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(license_uri.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Resolves the keys directory: `override_dir` (from `--keys-path`) if set, else `$MOD_KEYS_PATH`.
pub fn keys_dir(override_dir: Option<&Path>) -> Option<PathBuf> {
    override_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(MOD_KEYS_PATH_VAR).map(PathBuf::from))
}

/// Fails with `INSTANCE_UNLICENSED` if `license_uri` is set but no matching key file exists under
/// the resolved keys directory. A plugin with no license requirement (`license_uri == None`)
/// always passes.
pub fn check_license(override_dir: Option<&Path>, license_uri: Option<&str>) -> Result<(), HostError> {
    let Some(uri) = license_uri else {
        return Ok(());
    };
    let Some(dir) = keys_dir(override_dir) else {
        return Err(HostError::InstanceUnlicensed);
    };
    let path = dir.join(key_filename(uri));
    if path.is_file() {
        Ok(())
    } else {
        Err(HostError::InstanceUnlicensed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_license_requirement_always_passes() {
        assert!(check_license(None, None).is_ok());
    }

    #[test]
    fn missing_key_file_is_unlicensed() {
        let tmp = tempfile::tempdir().unwrap();
        let result = check_license(Some(tmp.path()), Some("urn:example:license"));
        assert_eq!(result, Err(HostError::InstanceUnlicensed));
    }

    #[test]
    fn matching_key_file_passes() {
        let tmp = tempfile::tempdir().unwrap();
        let filename = key_filename("urn:example:license");
        std::fs::write(tmp.path().join(filename), b"ok").unwrap();
        assert!(check_license(Some(tmp.path()), Some("urn:example:license")).is_ok());
    }
}
