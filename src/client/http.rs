//! HTTP implementation of the device API

use std::fmt::Display;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use spatial_shared::codec::EventDecoder;
use spatial_shared::Device;
use tracing::debug;
use uuid::Uuid;

use super::{ApiError, CommandRequest, DeviceApi, TelemetryStream};
use crate::config::DeviceApiConfig;

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// Device API reached over HTTP with JSON bodies
///
/// No request timeout is set on the client itself: attempt timeouts belong
/// to the retry layer, and telemetry streams stay open indefinitely.
#[derive(Debug, Clone)]
pub struct HttpDeviceApi {
    base_url: Url,
    client: Client,
}

impl HttpDeviceApi {
    pub fn new(config: &DeviceApiConfig) -> Result<Self, ApiError> {
        Self::with_builder(config, Client::builder())
    }

    fn with_builder(config: &DeviceApiConfig, builder: ClientBuilder) -> Result<Self, ApiError> {
        let base_url = Url::parse(config.endpoint.trim()).map_err(|e| {
            ApiError::Transport(format!("invalid endpoint '{}': {}", config.endpoint, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Transport(format!(
                "endpoint '{}' cannot carry a path",
                config.endpoint
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(key) = &config.api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| ApiError::Transport(format!("invalid API key: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = builder
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self { base_url, client })
    }

    /// Base URL with each segment appended percent-encoded, so ids can't
    /// escape their path position
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Turn non-success statuses into `ApiError::Status`
    async fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let response = self.client.get(url).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    /// Body of a successful response: JSON when it parses, otherwise the
    /// raw text, `null` when empty
    async fn body_value(response: Response) -> Result<Value, ApiError> {
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())))
    }
}

/// Decode a chunked event-stream body into telemetry payloads
///
/// Bad events are yielded as errors and decoding continues. A chunk error is
/// yielded once and ends the stream.
fn decode_events<S, B, E>(chunks: S) -> TelemetryStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    stream::unfold(
        (Box::pin(chunks), EventDecoder::new(), false),
        |(mut chunks, mut decoder, finished)| async move {
            if finished {
                return None;
            }
            loop {
                match decoder.decode_telemetry() {
                    Ok(Some(payload)) => return Some((Ok(payload), (chunks, decoder, false))),
                    Ok(None) => {}
                    Err(e) => return Some((Err(ApiError::from(e)), (chunks, decoder, false))),
                }
                match chunks.next().await {
                    Some(Ok(bytes)) => decoder.extend(bytes.as_ref()),
                    Some(Err(e)) => {
                        let error = ApiError::Transport(e.to_string());
                        return Some((Err(error), (chunks, decoder, true)));
                    }
                    None => return None,
                }
            }
        },
    )
    .boxed()
}

#[async_trait]
impl DeviceApi for HttpDeviceApi {
    async fn health(&self) -> Result<Value, ApiError> {
        let response = self.client.get(self.url(&["health"])).send().await?;
        Self::body_value(Self::check(response).await?).await
    }

    async fn list_devices(&self) -> Result<Vec<Device>, ApiError> {
        self.get_json(self.url(&["devices"])).await
    }

    async fn get_device(&self, device_id: &str) -> Result<Device, ApiError> {
        self.get_json(self.url(&["devices", device_id])).await
    }

    async fn submit_command(&self, request: &CommandRequest) -> Result<Value, ApiError> {
        debug!(
            "POST /commands {} {} -> {}",
            request.command_id, request.action, request.device_id
        );
        let response = self
            .client
            .post(self.url(&["commands"]))
            .json(request)
            .send()
            .await?;
        Self::body_value(Self::check(response).await?).await
    }

    async fn get_command(&self, command_id: Uuid) -> Result<Value, ApiError> {
        let id = command_id.to_string();
        self.get_json(self.url(&["commands", &id])).await
    }

    async fn cancel_command(&self, command_id: Uuid) -> Result<(), ApiError> {
        let id = command_id.to_string();
        let response = self
            .client
            .post(self.url(&["commands", &id, "cancel"]))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn telemetry_stream(&self, device_id: &str) -> Result<TelemetryStream, ApiError> {
        let response = self
            .client
            .get(self.url(&["devices", device_id, "telemetry", "stream"]))
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(decode_events(response.bytes_stream()))
    }
}
