//! Script persistence

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::{Result, ScriptError};

/// Destination for a finished recording
pub trait ScriptSink: Send {
    /// Persist the complete script text
    ///
    /// # Errors
    ///
    /// Returns error if the script cannot be stored
    fn write_script(&mut self, script: &str) -> Result<()>;
}

/// Writes the script to a markdown file, replacing any previous recording
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    /// Create a sink for a file path
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScriptSink for FileSink {
    fn write_script(&mut self, script: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = File::create(&self.path)?;
        file.write_all(script.as_bytes())?;
        file.sync_all()?;

        debug!(
            "Wrote script {} ({} bytes)",
            self.path.display(),
            script.len()
        );
        Ok(())
    }
}

/// Keeps the script in memory; clones share the same buffer
#[derive(Clone, Default)]
pub struct MemorySink {
    script: Arc<Mutex<Option<String>>>,
}

impl MemorySink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The last script written, if any
    #[must_use]
    pub fn script(&self) -> Option<String> {
        self.script
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl ScriptSink for MemorySink {
    fn write_script(&mut self, script: &str) -> Result<()> {
        let mut guard = self
            .script
            .lock()
            .map_err(|_| ScriptError::Other("Script buffer lock poisoned".to_string()))?;
        *guard = Some(script.to_string());
        Ok(())
    }
}

/// Read a previously recorded script
///
/// # Errors
///
/// Returns error if the file cannot be read
pub fn read_script(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        ScriptError::Other(format!("Failed to read script {}: {e}", path.display()))
    })
}
