//! Constants for the repository REST API (endpoints, header and cookie names).

/// Login endpoint, relative to the API base URL.
pub const LOGIN_PATH: &str = "authn/login";

/// Logout endpoint, relative to the API base URL.
pub const LOGOUT_PATH: &str = "authn/logout";

/// Bitstream content endpoint template; `{id}` is replaced by the file identifier.
pub const CONTENT_PATH: &str = "core/bitstreams/{id}/content";

/// Query parameter carrying a short-lived token.
pub const TOKEN_QUERY_PARAM: &str = "authentication-token";

/// Response header carrying a fresh anti-forgery token.
pub const XSRF_RESPONSE_HEADER: &str = "DSPACE-XSRF-TOKEN";

/// Cookie carrying the anti-forgery token.
pub const XSRF_COOKIE: &str = "DSPACE-XSRF-COOKIE";

/// Request header echoing the anti-forgery token back.
pub const XSRF_REQUEST_HEADER: &str = "X-XSRF-TOKEN";

/// Prefix of the bearer credential in the `Authorization` header.
pub const BEARER_PREFIX: &str = "Bearer ";
