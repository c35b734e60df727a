//! HTTP client for the real backbone.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use url::Url;

use crate::envelope::{OutboundMessage, CONTENT_TYPE as MULTIPART_CONTENT_TYPE, SERVICE};
use crate::error::Result;
use crate::transport::{classify, HealthStatus, SpineTransport, TransportResponse};

const DEFAULT_PRESCRIPTION_PATH: &str = "Prescription";
const HEALTHCHECK_PATH: &str = "healthcheck";

#[derive(Debug, Clone)]
pub struct LiveClientConfig {
    /// Base URL; relative polling URLs are resolved against it.
    pub base_url: Url,
    pub prescription_path: String,
    /// Sent as `nhsd-asid` on polls.
    pub from_asid: String,
    pub timeout: Duration,
}

impl LiveClientConfig {
    pub fn new(base_url: Url, from_asid: impl Into<String>) -> Self {
        Self {
            base_url,
            prescription_path: DEFAULT_PRESCRIPTION_PATH.to_string(),
            from_asid: from_asid.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct LiveSpineClient {
    client: Client,
    config: LiveClientConfig,
}

impl LiveSpineClient {
    pub fn new(config: LiveClientConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn prescription_url(&self) -> Result<Url> {
        Ok(self.config.base_url.join(&self.config.prescription_path)?)
    }

    fn resolve(&self, polling_url: &str) -> Result<Url> {
        match Url::parse(polling_url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(self.config.base_url.join(polling_url)?),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SpineTransport for LiveSpineClient {
    async fn send(&self, message: &OutboundMessage) -> Result<TransportResponse> {
        let address = self.prescription_url()?;
        tracing::info!(
            %address,
            interaction_id = %message.interaction_id,
            message_id = %message.message_id,
            "Sending message to Spine"
        );

        let response = self
            .client
            .post(address)
            .header(CONTENT_TYPE, MULTIPART_CONTENT_TYPE)
            .header("SOAPAction", format!("{SERVICE}/{}", message.interaction_id))
            .header("NHSD-Request-ID", &message.message_id)
            .body(message.body.clone())
            .send()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed post request for message"))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        let classified = classify(status, &headers, body)?;
        tracing::info!(status = status.as_u16(), pollable = matches!(classified, TransportResponse::Pollable { .. }), "Spine responded");
        Ok(classified)
    }

    async fn poll(&self, polling_url: &str) -> Result<TransportResponse> {
        let address = self.resolve(polling_url)?;
        tracing::info!(%address, "Polling Spine");

        let response = self
            .client
            .get(address)
            .header("nhsd-asid", &self.config.from_asid)
            .send()
            .await
            .inspect_err(|e| tracing::error!(error = %e, polling_url, "Failed polling request"))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        classify(status, &headers, body)
    }

    async fn status(&self) -> Result<HealthStatus> {
        let address = self.config.base_url.join(HEALTHCHECK_PATH)?;
        let response = self.client.get(address).send().await?;
        let status = response.status();
        Ok(HealthStatus {
            pass: status.is_success(),
            status_code: status.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> LiveSpineClient {
        LiveSpineClient::new(LiveClientConfig::new(Url::parse(base).unwrap(), "200000001285")).unwrap()
    }

    #[test]
    fn resolves_relative_and_absolute_polling_urls() {
        let client = client("https://spine.example/");
        assert_eq!(
            client.resolve("/_poll/abc").unwrap().as_str(),
            "https://spine.example/_poll/abc"
        );
        assert_eq!(
            client.resolve("https://other.example/_poll/abc").unwrap().as_str(),
            "https://other.example/_poll/abc"
        );
    }

    #[test]
    fn prescription_url_joins_path() {
        assert_eq!(
            client("https://spine.example/").prescription_url().unwrap().as_str(),
            "https://spine.example/Prescription"
        );
    }
}
