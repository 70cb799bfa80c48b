use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::config::NodeConfig;

/// Append-only fault log written in debug builds of the node configuration.
/// One `Error: <message>` line per faulted cycle; never rotated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticLog {
    path: PathBuf,
}

impl DiagnosticLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &NodeConfig) -> Option<Self> {
        if !config.debug {
            return None;
        }
        config
            .diagnostic_log_path
            .as_deref()
            .filter(|path| !path.trim().is_empty())
            .map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, message: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "Error: {message}")
    }
}
