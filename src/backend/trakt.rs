//! Trakt translation source.
//! Plain GETs against the public API; connection pooling via reqwest.

use std::time::Duration;

use tracing::{debug, warn};

use super::{BackendError, TranslationSource, UpstreamTranslation};
use crate::media::MediaTarget;

pub const TRAKT_API_HOST: &str = "https://api.trakt.tv";
const USER_AGENT: &str = "MyTV/1.0";

pub struct TraktClient {
    http: reqwest::Client,
    client_id: String,
    base_url: String,
    language: String,
}

impl TraktClient {
    /// Create a client. Reads `TRAKT_CLIENT_ID` from the environment.
    pub fn new(language: &str) -> Result<Self, BackendError> {
        let client_id = std::env::var("TRAKT_CLIENT_ID").map_err(|_| {
            BackendError::Config("TRAKT_CLIENT_ID environment variable not set".into())
        })?;
        Self::with_client_id(client_id, language)
    }

    pub fn with_client_id(
        client_id: impl Into<String>,
        language: &str,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BackendError::Http(e.to_string()))?;

        Ok(Self {
            http,
            client_id: client_id.into(),
            base_url: TRAKT_API_HOST.into(),
            language: language.into(),
        })
    }

    /// Point the client at another host (mirrors, local fixtures).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn translation_url(&self, target: MediaTarget) -> String {
        let lang = &self.language;
        let path = match target {
            MediaTarget::Movie { id } => format!("/movies/{id}/translations/{lang}"),
            MediaTarget::Show { id } => format!("/shows/{id}/translations/{lang}"),
            MediaTarget::Season { show_id, season } => {
                format!("/shows/{show_id}/seasons/{season}/translations/{lang}")
            }
        };
        format!("{}{}", self.base_url, path)
    }

    pub async fn movie_translations(&self, id: u32) -> Result<Vec<UpstreamTranslation>, BackendError> {
        self.get_translations(MediaTarget::movie(id)).await
    }

    pub async fn show_translations(&self, id: u32) -> Result<Vec<UpstreamTranslation>, BackendError> {
        self.get_translations(MediaTarget::show(id)).await
    }

    pub async fn season_translations(
        &self,
        show_id: u32,
        season: u32,
    ) -> Result<Vec<UpstreamTranslation>, BackendError> {
        self.get_translations(MediaTarget::season(show_id, season)).await
    }

    async fn get_translations(
        &self,
        target: MediaTarget,
    ) -> Result<Vec<UpstreamTranslation>, BackendError> {
        let url = self.translation_url(target);
        debug!(url = %url, "requesting translations");

        let resp = self
            .http
            .get(&url)
            .header("Content-Type", "application/json")
            .header("trakt-api-version", "2")
            .header("trakt-api-key", &self.client_id)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            warn!(%target, status = status.as_u16(), "translation request rejected");
            return Err(BackendError::Status(status.as_u16()));
        }

        resp.json::<Vec<UpstreamTranslation>>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

impl TranslationSource for TraktClient {
    async fn translations(
        &self,
        target: MediaTarget,
    ) -> Result<Vec<UpstreamTranslation>, BackendError> {
        self.get_translations(target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_translation_urls() {
        let client = TraktClient::with_client_id("id", "zh")
            .unwrap()
            .with_base_url("http://localhost:9000/");
        assert_eq!(
            client.translation_url(MediaTarget::movie(603)),
            "http://localhost:9000/movies/603/translations/zh"
        );
        assert_eq!(
            client.translation_url(MediaTarget::show(1390)),
            "http://localhost:9000/shows/1390/translations/zh"
        );
        assert_eq!(
            client.translation_url(MediaTarget::season(1390, 3)),
            "http://localhost:9000/shows/1390/seasons/3/translations/zh"
        );
    }

    #[test]
    fn decodes_upstream_listing() {
        let body = r#"[
            {"title":"黑客帝国","overview":"...","tagline":null,"language":"zh","country":"cn"},
            {"title":"駭客任務","overview":"...","language":"zh","country":"tw"}
        ]"#;
        let list: Vec<UpstreamTranslation> = serde_json::from_str(body).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].tagline, None);
        assert_eq!(list[1].country.as_deref(), Some("tw"));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let client = TraktClient::with_client_id("id", "zh")
            .unwrap()
            .with_base_url("http://127.0.0.1:1");
        let err = client.movie_translations(1).await.unwrap_err();
        assert!(matches!(err, BackendError::Http(_)));
    }
}
