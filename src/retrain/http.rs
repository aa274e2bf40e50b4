//! HTTP retrain trigger
//!
//! Posts a retrain request to the forecasting service. The service
//! refits its ensemble for the entity; `force_fresh` asks it to bypass
//! any cached model.

use super::RetrainTrigger;
use crate::types::EntityKey;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client,
};
use serde_json::json;
use std::time::Duration;

pub struct HttpRetrainTrigger {
    client: Client,
    endpoint: String,
}

impl HttpRetrainTrigger {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RetrainTrigger for HttpRetrainTrigger {
    async fn request(&self, entity: &EntityKey, force_fresh: bool) -> Result<()> {
        let payload = json!({
            "asset": entity.asset,
            "currency": entity.currency,
            "force_fresh": force_fresh,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .context("Failed to reach retrain endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("Retrain request rejected: {} - {}", status, text);
        }
        Ok(())
    }
}
