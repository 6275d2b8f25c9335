pub mod error;
pub mod http_gateway;
pub mod orchestrator;
pub mod ports;
pub mod types;

pub use error::{DeviceError, DispenseError, DispenseErrorKind};
pub use http_gateway::HttpDeviceGateway;
pub use orchestrator::{DispenseOrchestrator, DispenseSettings, MAX_RETRY};
pub use ports::DeviceGatewayPort;
pub use types::{
    CommandAck, CompletionAck, CompletionOutcome, CompletionRef, DeviceStatus, DispenseAck,
    DispenseAttempt, DispenseState, RequestId,
};
