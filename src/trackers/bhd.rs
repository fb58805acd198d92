use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http::TrackerHttp;
use super::Tracker;
use crate::core::config::BhdConfig;
use crate::core::error::TrackerError;
use crate::models::Torrent;

const TRACKER: &str = "bhd";
const BASE_URL: &str = "https://beyond-hd.me";

#[derive(Serialize)]
struct SearchRequest<'a> {
    info_hash: &'a str,
    action: &'a str,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total_results: i64,
}

/// Beyond-HD torrent search API
pub struct Bhd {
    url: String,
    http: TrackerHttp,
}

impl Bhd {
    pub fn new(config: &BhdConfig) -> Result<Self, TrackerError> {
        Ok(Self::with_http(config, BASE_URL, TrackerHttp::new(TRACKER)?))
    }

    pub fn with_http(config: &BhdConfig, base_url: &str, http: TrackerHttp) -> Self {
        Self {
            url: format!(
                "{}/api/torrents/{}",
                base_url.trim_end_matches('/'),
                config.api_key
            ),
            http,
        }
    }
}

#[async_trait]
impl Tracker for Bhd {
    fn name(&self) -> &'static str {
        "BHD"
    }

    fn check(&self, host: &str) -> bool {
        host.contains("beyond-hd.me")
    }

    async fn is_unregistered(&self, torrent: &Torrent) -> Result<bool, TrackerError> {
        let payload = SearchRequest {
            info_hash: &torrent.hash,
            action: "search",
        };

        let response = self
            .http
            .send(|client| client.post(&self.url).json(&payload))
            .await?;
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|source| TrackerError::Decode {
                tracker: TRACKER,
                source,
            })?;

        Ok(body.total_results < 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trackers::http::RetryConfig;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::num::NonZeroU32;

    fn bhd(server: &MockServer) -> Bhd {
        let retry = RetryConfig {
            max_attempts: 1,
            ..Default::default()
        };
        let http = TrackerHttp::with_settings(TRACKER, NonZeroU32::new(1000).unwrap(), retry).unwrap();
        let config = BhdConfig {
            api_key: "secret".to_string(),
        };
        Bhd::with_http(&config, &server.base_url(), http)
    }

    fn torrent() -> Torrent {
        Torrent {
            hash: "abc123".to_string(),
            name: "Some.Movie.2020".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_check_host() {
        let server = MockServer::start();
        let tracker = bhd(&server);
        assert!(tracker.check("beyond-hd.me"));
        assert!(!tracker.check("passthepopcorn.me"));
    }

    #[tokio::test]
    async fn test_no_results_means_unregistered() {
        let server = MockServer::start_async().await;
        let search = server.mock(|when, then| {
            when.method(POST)
                .path("/api/torrents/secret")
                .json_body(json!({"info_hash": "abc123", "action": "search"}));
            then.status(200)
                .json_body(json!({"status_code": 0, "results": [], "total_results": 0, "success": true}));
        });

        assert!(bhd(&server).is_unregistered(&torrent()).await.unwrap());
        search.assert();
    }

    #[tokio::test]
    async fn test_found_torrent_is_registered() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/api/torrents/secret");
            then.status(200).json_body(json!({
                "results": [{"name": "Some.Movie.2020", "info_hash": "abc123"}],
                "total_results": 1,
                "success": true
            }));
        });

        assert!(!bhd(&server).is_unregistered(&torrent()).await.unwrap());
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/api/torrents/secret");
            then.status(403);
        });

        let err = bhd(&server).is_unregistered(&torrent()).await.unwrap_err();
        assert!(matches!(err, TrackerError::Status { tracker: "bhd", .. }));
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/api/torrents/secret");
            then.status(200).body("<html>maintenance</html>");
        });

        let err = bhd(&server).is_unregistered(&torrent()).await.unwrap_err();
        assert!(matches!(err, TrackerError::Decode { .. }));
    }
}
