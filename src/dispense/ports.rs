use async_trait::async_trait;

use crate::dispense::{
    error::DeviceError,
    types::{DeviceStatus, DispenseAck, RequestId},
};

/// Dispenser hardware. `dispense` only acknowledges the command; the
/// physical cycle completes later.
#[async_trait]
pub trait DeviceGatewayPort: Send + Sync {
    async fn dispense(&self, slot: u8, request_id: &RequestId)
    -> Result<DispenseAck, DeviceError>;

    async fn status(&self) -> Result<DeviceStatus, DeviceError>;
}
