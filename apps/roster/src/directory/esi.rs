//! EVE Swagger Interface client.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::{AllianceRecord, CharacterRecord, CorporationRecord, Directory};
use crate::error::{Error, Result};

#[derive(Clone)]
pub struct EsiClient {
    base_url: String,
    http: reqwest::Client,
}

impl EsiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = format!("{}{path}?datasource=tranquility", self.base_url);
        tracing::debug!(%url, "fetching directory record");

        let resp = self.http.get(&url).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(resp.json().await?)),
            status => {
                tracing::warn!(%status, %path, "directory returned an error");
                Err(Error::transient(format!("directory returned {status} for {path}")))
            }
        }
    }
}

#[async_trait]
impl Directory for EsiClient {
    async fn get_alliance(&self, id: i64) -> Result<Option<AllianceRecord>> {
        self.fetch(&format!("/alliances/{id}/")).await
    }

    async fn get_corporation(&self, id: i64) -> Result<Option<CorporationRecord>> {
        self.fetch(&format!("/corporations/{id}/")).await
    }

    async fn get_character(&self, id: i64) -> Result<Option<CharacterRecord>> {
        self.fetch(&format!("/characters/{id}/")).await
    }
}
