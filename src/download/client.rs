//! HTTP client for the repository REST API.
//!
//! [`ContentClient`] logs in with the configured credentials, keeps the bearer
//! and anti-forgery tokens the API hands back, and fetches bitstream content
//! with the configured [`RetryPolicy`].

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Response};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{CONTENT_PATH, LOGIN_PATH, LOGOUT_PATH, TOKEN_QUERY_PARAM, XSRF_REQUEST_HEADER};
use super::error::FetchError;
use super::retry::{RetryDecision, RetryPolicy, classify_error, parse_retry_after};
use super::session::Session;
use crate::config::RepositoryConfig;
use crate::user_agent;
use crate::validation::{validate_token, validate_uuid};

/// Body and declared type of one fetched bitstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    /// Raw content bytes.
    pub bytes: Vec<u8>,
    /// `Content-Type` response header, if present.
    pub content_type: Option<String>,
}

/// Source of bitstream content.
///
/// The export engine depends on this seam rather than on [`ContentClient`], so
/// tests can substitute an in-memory source.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetches the content of one file identifier.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] once retries are exhausted or on a permanent failure.
    async fn fetch_content(
        &self,
        file_id: &str,
        token: Option<&str>,
    ) -> Result<FetchedContent, FetchError>;
}

/// Authenticated client for bitstream content.
///
/// Create one per run and call [`close`](Self::close) when done.
pub struct ContentClient {
    client: Client,
    api_url: Url,
    username: String,
    password: String,
    retry_policy: RetryPolicy,
    session: Mutex<Session>,
}

impl std::fmt::Debug for ContentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentClient")
            .field("api_url", &self.api_url.as_str())
            .field("username", &self.username)
            .field("retry_policy", &self.retry_policy)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl ContentClient {
    /// Builds a client from the repository configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the TLS backend cannot be initialized.
    pub fn new(config: &RepositoryConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .gzip(true)
            .cookie_store(true)
            .default_headers(headers)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(FetchError::ClientBuild)?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            retry_policy: config.retry_policy.clone(),
            session: Mutex::new(Session::default()),
        })
    }

    /// Snapshot of the current session.
    #[must_use]
    pub fn session(&self) -> Session {
        self.lock_session().clone()
    }

    /// Exchanges the configured credentials for a bearer credential.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Authentication`] if the login request fails, is
    /// answered with a non-2xx status, or carries no bearer credential.
    #[instrument(skip(self), fields(user = %self.username))]
    pub async fn authenticate(&self) -> Result<Session, FetchError> {
        let url = self.endpoint(LOGIN_PATH)?;

        let mut request = self
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .basic_auth(&self.username, Some(&self.password));
        if let Some(xsrf) = self.lock_session().xsrf() {
            request = request.header(XSRF_REQUEST_HEADER, xsrf);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::authentication(None, format!("login request failed: {e}")))?;

        let status = response.status();
        let mut session = self.lock_session();
        session.capture(response.headers());

        if !status.is_success() {
            return Err(FetchError::authentication(
                Some(status.as_u16()),
                "login rejected",
            ));
        }
        if !session.is_authenticated() {
            return Err(FetchError::authentication(
                Some(status.as_u16()),
                "login response carried no bearer credential",
            ));
        }

        info!("authenticated with repository API");
        Ok(session.clone())
    }

    /// Fetches bitstream content, retrying transient failures.
    ///
    /// With a short-lived `token` the request is authorized by query parameter
    /// and no login is attempted. Without one, a login happens first if no
    /// session is held.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Validation`] for a malformed identifier or token
    /// (before any request), or the last failure once retries are exhausted.
    #[instrument(skip(self, token), fields(file_id = %file_id))]
    pub async fn fetch_content(
        &self,
        file_id: &str,
        token: Option<&str>,
    ) -> Result<FetchedContent, FetchError> {
        let file_id = validate_uuid(file_id)?;
        let token = token.map(validate_token).transpose()?;
        let url = self.content_url(file_id, token)?;

        let mut attempt = 1;
        loop {
            let error = match self.fetch_once(&url, file_id, token).await {
                Ok(content) => return Ok(content),
                Err(error) => error,
            };

            match self.retry_policy.should_retry(classify_error(&error), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    let hint = match &error {
                        FetchError::RateLimited {
                            retry_after: Some(value),
                            ..
                        } => parse_retry_after(value, self.retry_policy.max_delay()),
                        _ => None,
                    };
                    let delay = self.retry_policy.delay_with_hint(delay, hint);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(attempt, reason = %reason, "giving up");
                    return Err(error);
                }
            }
        }
    }

    /// Logs out if a session is held and forgets all tokens.
    ///
    /// Logout failures are logged and otherwise ignored.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        let session = self.session();
        if !session.is_authenticated() {
            return;
        }

        match self.endpoint(LOGOUT_PATH) {
            Ok(url) => {
                let request = session.apply(self.client.post(url).header(ACCEPT, "application/json"));
                match request.send().await {
                    Ok(response) if response.status().is_success() => debug!("logged out"),
                    Ok(response) => debug!(status = response.status().as_u16(), "logout rejected"),
                    Err(error) => debug!(error = %error, "logout request failed"),
                }
            }
            Err(error) => debug!(error = %error, "logout skipped"),
        }

        self.lock_session().clear();
    }

    async fn fetch_once(
        &self,
        url: &Url,
        file_id: &str,
        token: Option<&str>,
    ) -> Result<FetchedContent, FetchError> {
        if token.is_none() && !self.lock_session().is_authenticated() {
            self.authenticate().await?;
        }

        let session = self.session();
        let response = session
            .apply(self.client.get(url.clone()))
            .send()
            .await
            .map_err(|e| FetchError::transport(url.as_str(), e))?;

        self.handle_response(response, url, file_id).await
    }

    async fn handle_response(
        &self,
        response: Response,
        url: &Url,
        file_id: &str,
    ) -> Result<FetchedContent, FetchError> {
        let status = response.status();
        {
            let mut session = self.lock_session();
            session.capture(response.headers());
            if status.as_u16() == 401 {
                session.clear_bearer();
            }
        }

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Err(FetchError::from_status(file_id, status.as_u16(), retry_after));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::transport(url.as_str(), e))?;

        debug!(bytes = bytes.len(), "content fetched");
        Ok(FetchedContent {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.api_url
            .join(path)
            .map_err(|source| FetchError::InvalidUrl {
                url: format!("{}{path}", self.api_url),
                source,
            })
    }

    fn content_url(&self, file_id: &str, token: Option<&str>) -> Result<Url, FetchError> {
        let path = CONTENT_PATH.replace("{id}", &urlencoding::encode(file_id));
        let mut url = self.endpoint(&path)?;
        if let Some(token) = token {
            url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);
        }
        Ok(url)
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ContentSource for ContentClient {
    async fn fetch_content(
        &self,
        file_id: &str,
        token: Option<&str>,
    ) -> Result<FetchedContent, FetchError> {
        ContentClient::fetch_content(self, file_id, token).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config(api_url: &str) -> RepositoryConfig {
        RepositoryConfig {
            api_url: Url::parse(api_url).unwrap(),
            username: "exporter@example.org".to_string(),
            password: "secret".to_string(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
        }
    }

    #[test]
    fn test_content_url_encodes_identifier_and_token() {
        let client = ContentClient::new(&config("https://repo.example.org/server/api/")).unwrap();
        let url = client
            .content_url("3f2504e0-4f89-11d3-9a0c-0305e82c3301", Some("abc_DEF-123"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://repo.example.org/server/api/core/bitstreams/3f2504e0-4f89-11d3-9a0c-0305e82c3301/content?authentication-token=abc_DEF-123"
        );
    }

    #[test]
    fn test_endpoint_keeps_api_prefix() {
        let client = ContentClient::new(&config("https://repo.example.org/server/api/")).unwrap();
        assert_eq!(
            client.endpoint(LOGIN_PATH).unwrap().as_str(),
            "https://repo.example.org/server/api/authn/login"
        );
    }

    #[tokio::test]
    async fn test_fetch_rejects_malformed_identifier_without_request() {
        // Unroutable base: any request would fail with a network error instead.
        let client = ContentClient::new(&config("http://127.0.0.1:9/api/")).unwrap();
        let result = client.fetch_content("../../etc/passwd", None).await;
        assert!(matches!(result, Err(FetchError::Validation(_))), "{result:?}");
    }

    #[tokio::test]
    async fn test_fetch_rejects_malformed_token_without_request() {
        let client = ContentClient::new(&config("http://127.0.0.1:9/api/")).unwrap();
        let result = client
            .fetch_content("3f2504e0-4f89-11d3-9a0c-0305e82c3301", Some("a b&c"))
            .await;
        assert!(matches!(result, Err(FetchError::Validation(_))), "{result:?}");
    }

    #[tokio::test]
    async fn test_close_without_session_is_noop() {
        let client = ContentClient::new(&config("http://127.0.0.1:9/api/")).unwrap();
        client.close().await;
        assert!(!client.session().is_authenticated());
    }
}
