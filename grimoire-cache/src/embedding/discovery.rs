//! Model cache directory discovery
//!
//! Finds where embedding model files live across installation scenarios.

use std::path::{Path, PathBuf};

/// Resolve the model cache directory with priority:
/// 1. Explicit directory from configuration
/// 2. GRIMOIRE_MODELS_PATH environment variable
/// 3. FASTEMBED_CACHE_DIR environment variable
/// 4. User home directory (~/.grimoire/models)
/// 5. `./.grimoire/models` relative to the working directory
pub fn find_models_dir(configured: Option<&Path>) -> PathBuf {
    if let Some(dir) = configured {
        log::debug!("Using configured models dir: {}", dir.display());
        return dir.to_path_buf();
    }

    if let Ok(models_path) = std::env::var("GRIMOIRE_MODELS_PATH") {
        log::debug!("Using GRIMOIRE_MODELS_PATH: {}", models_path);
        return PathBuf::from(models_path);
    }

    if let Ok(cache_dir) = std::env::var("FASTEMBED_CACHE_DIR") {
        log::debug!("Using FASTEMBED_CACHE_DIR: {}", cache_dir);
        return PathBuf::from(cache_dir);
    }

    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        return PathBuf::from(home).join(".grimoire").join("models");
    }

    PathBuf::from(".grimoire").join("models")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_dir_wins() {
        let dir = PathBuf::from("/opt/grimoire/models");
        assert_eq!(find_models_dir(Some(&dir)), dir);
    }

    #[test]
    fn test_fallback_is_models_dir() {
        let dir = find_models_dir(None);
        // Either an env override or a path ending in models
        assert!(!dir.as_os_str().is_empty());
    }
}
