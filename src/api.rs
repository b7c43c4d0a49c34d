use crate::structs::*;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend answered {0}")]
    Status(StatusCode),

    #[error("unexpected body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The two backend endpoints the view talks to.
#[async_trait]
pub trait TransitApi: Send + Sync {
    async fn nearby_stops(&self, at: LatLon, line: &str) -> Result<Vec<Stop>, ApiError>;

    async fn arrival(&self, stop_id: &str, line: &str) -> Result<Arrival, ApiError>;
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        BackendClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {} {:?}", url, query);

        let resp = self
            .client
            .get(url)
            .query(query)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, "reqwest/0.11.13")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status(status));
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str::<T>(&body)?)
    }
}

#[async_trait]
impl TransitApi for BackendClient {
    async fn nearby_stops(&self, at: LatLon, line: &str) -> Result<Vec<Stop>, ApiError> {
        self.get_json(
            "/api/nearby_stops",
            &[
                ("lat", at.lat.to_string()),
                ("lon", at.lon.to_string()),
                ("line", line.to_string()),
            ],
        )
        .await
    }

    async fn arrival(&self, stop_id: &str, line: &str) -> Result<Arrival, ApiError> {
        self.get_json(
            "/api/arrival",
            &[("stop_id", stop_id.to_string()), ("line", line.to_string())],
        )
        .await
    }
}
