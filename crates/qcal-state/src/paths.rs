//! Default locations of the machine state and the node store.

use std::path::PathBuf;

use crate::error::{StateError, StateResult};

/// Environment variable overriding the state file.
pub const STATE_PATH_ENV: &str = "QCAL_STATE_PATH";

/// Environment variable overriding the node store root.
pub const STORAGE_ROOT_ENV: &str = "QCAL_STORAGE_ROOT";

/// `~/.qcal`.
pub fn qcal_home() -> StateResult<PathBuf> {
    let home = dirs::home_dir().ok_or(StateError::NoHomeDir)?;
    Ok(home.join(".qcal"))
}

/// State file: `$QCAL_STATE_PATH`, else `~/.qcal/state.json`.
pub fn default_state_path() -> StateResult<PathBuf> {
    match std::env::var_os(STATE_PATH_ENV) {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Ok(qcal_home()?.join("state.json")),
    }
}

/// Node store root: `$QCAL_STORAGE_ROOT`, else `~/.qcal/data`.
pub fn default_storage_root() -> StateResult<PathBuf> {
    match std::env::var_os(STORAGE_ROOT_ENV) {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Ok(qcal_home()?.join("data")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_under_home() {
        // only meaningful when the variables are unset in the test environment
        if std::env::var_os(STATE_PATH_ENV).is_none() {
            let path = default_state_path().unwrap();
            assert!(path.ends_with(".qcal/state.json"));
        }
        if std::env::var_os(STORAGE_ROOT_ENV).is_none() {
            let path = default_storage_root().unwrap();
            assert!(path.ends_with(".qcal/data"));
        }
    }
}
