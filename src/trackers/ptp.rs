use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::http::TrackerHttp;
use super::Tracker;
use crate::core::config::PtpConfig;
use crate::core::error::TrackerError;
use crate::models::Torrent;

const TRACKER: &str = "ptp";
const BASE_URL: &str = "https://passthepopcorn.me";

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResponse {
    #[serde(default)]
    result: String,
    #[serde(default)]
    result_details: String,
}

/// PassThePopcorn torrent lookup API
pub struct Ptp {
    endpoint: String,
    api_user: String,
    api_key: String,
    http: TrackerHttp,
}

impl Ptp {
    pub fn new(config: &PtpConfig) -> Result<Self, TrackerError> {
        Ok(Self::with_http(config, BASE_URL, TrackerHttp::new(TRACKER)?))
    }

    pub fn with_http(config: &PtpConfig, base_url: &str, http: TrackerHttp) -> Self {
        Self {
            endpoint: format!("{}/torrents.php", base_url.trim_end_matches('/')),
            api_user: config.api_user.clone(),
            api_key: config.api_key.clone(),
            http,
        }
    }
}

#[async_trait]
impl Tracker for Ptp {
    fn name(&self) -> &'static str {
        "PTP"
    }

    fn check(&self, host: &str) -> bool {
        host.contains("passthepopcorn.me")
    }

    async fn is_unregistered(&self, torrent: &Torrent) -> Result<bool, TrackerError> {
        let url = Url::parse_with_params(&self.endpoint, &[("infohash", torrent.hash.as_str())])
            .map_err(|err| TrackerError::Url {
                tracker: TRACKER,
                reason: err.to_string(),
            })?;

        let response = self
            .http
            .send(|client| {
                client
                    .get(url.clone())
                    .header("ApiUser", &self.api_user)
                    .header("ApiKey", &self.api_key)
            })
            .await?;
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|source| TrackerError::Decode {
                tracker: TRACKER,
                source,
            })?;

        Ok(body.result == "ERROR" && body.result_details == "Unregistered Torrent")
    }
}
