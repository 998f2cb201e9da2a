mod content_store;
mod dispatcher;
mod logging;
mod resources;
mod scheduler;
mod state;


pub use content_store::*;
pub use dispatcher::*;
pub use logging::*;
pub use resources::*;
pub use scheduler::*;
pub use state::*;

use std::path::Path;

use serde::Deserialize;

use crate::error::NodeError;

/// Top-level configuration for a Delta node, loaded from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeltaConfig {
    /// Deal store backend.
    #[serde(default)]
    pub state: StateConfig,
    /// Dispatcher workers and retry policy.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    /// Retry/cleanup scheduler.
    #[serde(default)]
    pub scheduler: SchedulerSection,
    /// Admission control sizing.
    #[serde(default)]
    pub resources: ResourcesConfig,
    /// Local content copies.
    #[serde(default)]
    pub content_store: ContentStoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DeltaConfig {
    /// Parse a configuration document.
    pub fn from_toml(contents: &str) -> Result<Self, NodeError> {
        toml::from_str(contents).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Load the configuration at `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }
}
