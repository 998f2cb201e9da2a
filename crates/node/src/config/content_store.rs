use std::path::PathBuf;

use serde::Deserialize;

/// Location of the local content copies.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentStoreConfig {
    #[serde(default = "default_path")]
    pub path: PathBuf,
}

impl Default for ContentStoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
        }
    }
}

fn default_path() -> PathBuf {
    PathBuf::from(".delta/blocks")
}
