use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::dispense::{
    error::DeviceError,
    ports::DeviceGatewayPort,
    types::{DeviceStatus, DispenseAck, RequestId},
};

const ERROR_BODY_LIMIT: usize = 256;

/// Talks to the dispenser firmware over plain HTTP:
/// `GET {base}/dispense?slot=<n>&request_id=<id>` and `GET {base}/status`.
pub struct HttpDeviceGateway {
    client: Client,
    base_url: String,
    dispense_timeout: Duration,
    status_timeout: Duration,
}

impl HttpDeviceGateway {
    pub fn new(
        base_url: impl Into<String>,
        dispense_timeout: Duration,
        status_timeout: Duration,
    ) -> Result<Self, DeviceError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(DeviceError::Protocol(format!(
                "dispenser url '{base_url}' must be http or https"
            )));
        }
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(status_timeout.min(dispense_timeout))
            .build()
            .map_err(|err| DeviceError::Unreachable(format!("http client build failed: {err}")))?;
        Ok(Self {
            client,
            base_url,
            dispense_timeout,
            status_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T, DeviceError> {
        let url = format!("{}/{path}", self.base_url);
        tracing::debug!(
            target: "device_gateway",
            url = %url,
            query = ?query,
            "device_request"
        );

        let response = self
            .client
            .get(&url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| map_transport_error(err, timeout))?;
        let response = ensure_success(response).await?;
        let body = response
            .text()
            .await
            .map_err(|err| map_transport_error(err, timeout))?;
        serde_json::from_str(&body)
            .map_err(|err| DeviceError::Protocol(format!("unexpected {path} payload: {err}")))
    }
}

#[async_trait]
impl DeviceGatewayPort for HttpDeviceGateway {
    async fn dispense(
        &self,
        slot: u8,
        request_id: &RequestId,
    ) -> Result<DispenseAck, DeviceError> {
        self.get_json(
            "dispense",
            &[
                ("slot", slot.to_string()),
                ("request_id", request_id.to_string()),
            ],
            self.dispense_timeout,
        )
        .await
    }

    async fn status(&self) -> Result<DeviceStatus, DeviceError> {
        self.get_json("status", &[], self.status_timeout).await
    }
}

fn map_transport_error(err: reqwest::Error, timeout: Duration) -> DeviceError {
    if err.is_timeout() {
        DeviceError::Timeout(timeout)
    } else {
        DeviceError::Unreachable(err.to_string())
    }
}

async fn ensure_success(response: Response) -> Result<Response, DeviceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > ERROR_BODY_LIMIT {
        let mut cut = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(DeviceError::Status {
        status: status.as_u16(),
        body,
    })
}
