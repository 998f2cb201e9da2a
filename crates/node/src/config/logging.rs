use serde::Deserialize;

/// Log output configuration.
///
/// `RUST_LOG` overrides `filter` when set.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `"info,delta_engine=debug"`.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit one JSON object per event instead of human-readable lines.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

fn default_filter() -> String {
    "info".to_owned()
}
