pub mod data_uri;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod poll;
pub mod proxy;

pub use error::{ChainError, GatewayError};
pub use gateway::{GatewayConfig, HttpInferenceGateway, InferenceGateway};
pub use orchestrator::{ChainOrchestrator, OrchestratorConfig};
pub use poll::{poll_until_settled, PollPolicy};
