use thiserror::Error;

/// Errors that can occur when running a Delta node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state error: {0}")]
    State(#[from] delta_state::StateError),

    #[error("provider error: {0}")]
    Provider(#[from] delta_provider::ProviderError),

    #[error(transparent)]
    Engine(#[from] delta_engine::EngineError),
}
