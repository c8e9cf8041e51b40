//! Authenticated session state for the repository REST API.
//!
//! The API hands out two tokens: a bearer credential in the `Authorization`
//! response header after login, and an anti-forgery token in either a response
//! header or a cookie. Both may be rotated on any response, so the session is
//! refreshed from every response the client sees.

use reqwest::RequestBuilder;
use reqwest::header::{AUTHORIZATION, HeaderMap, SET_COOKIE};

use super::constants::{BEARER_PREFIX, XSRF_COOKIE, XSRF_REQUEST_HEADER, XSRF_RESPONSE_HEADER};

/// Tokens held between requests.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    bearer: Option<String>,
    xsrf: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .field("xsrf", &self.xsrf.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Session {
    /// Whether a bearer credential is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.bearer.is_some()
    }

    /// The held bearer credential, without the `Bearer ` prefix.
    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    /// The held anti-forgery token.
    #[must_use]
    pub fn xsrf(&self) -> Option<&str> {
        self.xsrf.as_deref()
    }

    /// Drops the bearer credential so the next request re-authenticates.
    pub fn clear_bearer(&mut self) {
        self.bearer = None;
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.bearer = None;
        self.xsrf = None;
    }

    /// Updates tokens from response headers. Returns whether anything changed.
    ///
    /// The `DSPACE-XSRF-TOKEN` header takes precedence over the cookie when a
    /// response carries both.
    pub fn capture(&mut self, headers: &HeaderMap) -> bool {
        let before = self.clone();

        if let Some(bearer) = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix(BEARER_PREFIX))
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            self.bearer = Some(bearer.to_string());
        }

        let header_xsrf = headers
            .get(XSRF_RESPONSE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        if let Some(token) = header_xsrf.map(str::to_string).or_else(|| xsrf_cookie(headers)) {
            self.xsrf = Some(token);
        }

        *self != before
    }

    /// Attaches the held tokens to an outgoing request.
    #[must_use]
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        let mut request = request;
        if let Some(bearer) = &self.bearer {
            request = request.bearer_auth(bearer);
        }
        if let Some(xsrf) = &self.xsrf {
            request = request.header(XSRF_REQUEST_HEADER, xsrf);
        }
        request
    }
}

/// Finds the anti-forgery cookie among `Set-Cookie` headers.
fn xsrf_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| name.trim() == XSRF_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}
