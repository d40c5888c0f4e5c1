use std::env;
use std::path::{Path, PathBuf};

use log::debug;

use super::error::GameError;

#[cfg(windows)]
const JAVA_BIN: &str = "java.exe";
#[cfg(not(windows))]
const JAVA_BIN: &str = "java";

/// Resolves the Java binary used to launch the game. A configured
/// `javaPath` wins; otherwise `JAVA_HOME` and then `PATH` are probed.
pub fn resolve_java(configured: &str) -> Result<PathBuf, GameError> {
    if !configured.is_empty() {
        let path = Path::new(configured);
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(GameError::Launch(format!(
            "configured javaPath '{}' does not exist; fix it in settings",
            configured
        )));
    }

    if let Ok(home) = env::var("JAVA_HOME") {
        let candidate = Path::new(&home).join("bin").join(JAVA_BIN);
        if candidate.is_file() {
            debug!("resolved java from JAVA_HOME: {}", candidate.display());
            return Ok(candidate);
        }
    }

    if let Some(found) = env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths)
            .map(|dir| dir.join(JAVA_BIN))
            .find(|candidate| candidate.is_file())
    }) {
        debug!("resolved java from PATH: {}", found.display());
        return Ok(found);
    }

    Err(GameError::Launch(
        "no java runtime found; install a JDK or set javaPath in settings".into(),
    ))
}
