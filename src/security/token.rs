//! Gateway bearer token: generated once, stored owner-only, compared in
//! constant time.

use std::{fs, path::Path, path::PathBuf};

use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::error::{CoreError, Result};

/// Path of the persisted bearer token inside the workspace.
pub fn token_path(workspace: &Path) -> PathBuf {
    workspace.join(".gateway-token")
}

/// Load the existing token, or generate a 256-bit random token and persist it
/// with owner-only permissions.
pub fn load_or_create_token(workspace: &Path) -> Result<String> {
    let path = token_path(workspace);

    if path.exists() {
        return fs::read_to_string(&path)
            .map(|s| s.trim().to_string())
            .map_err(|e| CoreError::fatal(format!("failed to read gateway token: {e}")));
    }

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = hex::encode(bytes);

    fs::create_dir_all(workspace)
        .map_err(|e| CoreError::fatal(format!("failed to create workspace: {e}")))?;
    fs::write(&path, &token)
        .map_err(|e| CoreError::fatal(format!("failed to write gateway token: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&path)
            .map_err(|e| CoreError::fatal(format!("failed to stat gateway token: {e}")))?
            .permissions();
        perms.set_mode(0o600);
        fs::set_permissions(&path, perms)
            .map_err(|e| CoreError::fatal(format!("failed to restrict gateway token: {e}")))?;
    }

    log::info!("gateway token written to {}", path.display());
    Ok(token)
}

/// Constant-time equality. Length differences return false without timing
/// leakage on the matching prefix.
pub fn token_matches(expected: &str, provided: &str) -> bool {
    if expected.len() != provided.len() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn generates_256_bit_hex_token() {
        let dir = TempDir::new().unwrap();
        let token = load_or_create_token(dir.path()).unwrap();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn second_load_returns_same_token() {
        let dir = TempDir::new().unwrap();
        let first = load_or_create_token(dir.path()).unwrap();
        let second = load_or_create_token(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        load_or_create_token(dir.path()).unwrap();
        let mode = fs::metadata(token_path(dir.path())).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn exact_token_accepted() {
        assert!(token_matches("abcdef0123", "abcdef0123"));
    }

    #[test]
    fn one_byte_deviation_rejected() {
        let token = "abcdef0123456789";
        for i in 0..token.len() {
            let mut bad: Vec<u8> = token.as_bytes().to_vec();
            bad[i] ^= 0x01;
            let bad = String::from_utf8(bad).unwrap();
            assert!(!token_matches(token, &bad), "deviation at byte {i} must fail");
        }
    }

    #[test]
    fn length_mismatch_rejected() {
        assert!(!token_matches("abc", "abcd"));
        assert!(!token_matches("abcd", "abc"));
    }
}
