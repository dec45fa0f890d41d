//! Data directory resolution.

use std::path::PathBuf;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "NEWSWIRE_DATA_DIR";

/// Resolve the data directory from the process environment.
///
/// Priority:
/// 1. `NEWSWIRE_DATA_DIR`
/// 2. `~/.newswire`
/// 3. `.newswire` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    resolve_data_dir_with(|key| std::env::var(key).ok(), dirs::home_dir())
}

/// Same as [`resolve_data_dir`] with injectable env lookup and home dir.
pub fn resolve_data_dir_with(
    lookup: impl Fn(&str) -> Option<String>,
    home: Option<PathBuf>,
) -> PathBuf {
    if let Some(dir) = lookup(DATA_DIR_ENV).filter(|d| !d.trim().is_empty()) {
        return PathBuf::from(dir);
    }

    match home {
        Some(home) => home.join(".newswire"),
        None => PathBuf::from(".newswire"),
    }
}
