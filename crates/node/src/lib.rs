pub mod config;
pub mod error;
pub mod node;
pub mod state_factory;
pub mod telemetry;

pub use config::DeltaConfig;
pub use error::NodeError;
pub use node::{Node, NodeHandle, build_engine};
