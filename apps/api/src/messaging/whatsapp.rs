//! WhatsApp client: the single point of entry for Evolution API calls.
//!
//! Numbers are normalised before sending; the gateway expects digits only.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::EvolutionConfig;
use crate::leads::phone::normalize_phone;

#[derive(Debug, Error)]
pub enum WhatsAppError {
    #[error("WhatsApp gateway is not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway error (status {status}): {message}")]
    Gateway { status: u16, message: String },
}

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    number: &'a str,
    text: &'a str,
}

#[derive(Clone)]
pub struct WhatsAppClient {
    client: Client,
    config: Option<EvolutionConfig>,
}

impl WhatsAppClient {
    pub fn new(config: Option<EvolutionConfig>, timeout: Duration) -> Result<Self, WhatsAppError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            config,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    /// Sends a plain text message. Returns the normalised number it was sent to.
    pub async fn send_text(&self, phone: &str, text: &str) -> Result<String, WhatsAppError> {
        let config = self.config.as_ref().ok_or(WhatsAppError::NotConfigured)?;
        let number = normalize_phone(phone);
        let url = format!("{}/message/sendText/{}", config.base_url, config.instance);
        debug!("Sending WhatsApp message to {number}");

        let response = self
            .client
            .post(&url)
            .header("apikey", &config.api_key)
            .json(&SendTextRequest {
                number: &number,
                text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(WhatsAppError::Gateway {
                status: status.as_u16(),
                message,
            });
        }

        info!("WhatsApp message delivered to gateway for {number}");
        Ok(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> WhatsAppClient {
        WhatsAppClient::new(
            Some(EvolutionConfig {
                base_url: base_url.to_string(),
                api_key: "secret".into(),
                instance: "vendas".into(),
            }),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_text_normalises_number() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/sendText/vendas"))
            .and(header("apikey", "secret"))
            .and(body_json(json!({"number": "5511999999999", "text": "Olá!"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"key": {"id": "1"}})))
            .expect(1)
            .mount(&server)
            .await;

        let sent_to = test_client(&server.uri())
            .send_text("(11) 99999-9999", "Olá!")
            .await
            .unwrap();
        assert_eq!(sent_to, "5511999999999");
    }

    #[tokio::test]
    async fn test_gateway_failure_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("instance not connected"))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .send_text("5511999999999", "Olá!")
            .await
            .unwrap_err();
        match err {
            WhatsAppError::Gateway { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "instance not connected");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_client() {
        let client = WhatsAppClient::new(None, Duration::from_secs(1)).unwrap();
        assert!(!client.is_configured());
        assert!(matches!(
            client.send_text("5511999999999", "oi").await,
            Err(WhatsAppError::NotConfigured)
        ));
    }
}
